//! Reading WebAssembly modules into the IR.
//!
//! Binary decoding is delegated to `wasmparser` and text assembly to `wat`;
//! this module only lowers the decoded sections into module fields. Fields are
//! collected in section order and appended once the whole binary has been
//! seen, so names from the `name` custom section are bound like text-format
//! identifiers (with their `$` sigil).

mod body;

use crate::ir::*;
use crate::ReadOptions;
use anyhow::{bail, Context, Result};
use body::{lower_const_expr, BodyLowering};
use log::debug;
use std::sync::Arc;
use wasmparser::{
    Encoding, FunctionBody, KnownCustom, Name, NameMap, Parser, Payload, RefType, TypeRef,
    Validator,
};

/// Read a binary module.
pub fn read_binary(bytes: &[u8], options: &ReadOptions) -> Result<Module> {
    read_binary_named(bytes, None, options)
}

/// Assemble a text module with `wat`, then read the resulting binary.
pub fn read_text(text: &str, options: &ReadOptions) -> Result<Module> {
    read_text_named(text, None, options)
}

pub(crate) fn read_text_named(
    text: &str,
    filename: Option<Arc<str>>,
    options: &ReadOptions,
) -> Result<Module> {
    let bytes = wat::parse_str(text).context("assembling text module")?;
    read_binary_named(&bytes, filename, options)
}

pub(crate) fn read_binary_named(
    bytes: &[u8],
    filename: Option<Arc<str>>,
    options: &ReadOptions,
) -> Result<Module> {
    debug!("reading binary module ({} bytes)", bytes.len());

    if options.validate {
        Validator::new()
            .validate_all(bytes)
            .context("validating module")?;
    }

    let mut lowering = Lowering::new(Location::binary(filename, 0), options);
    for payload in Parser::new(0).parse_all(bytes) {
        let payload = payload.context("parsing wasm payload")?;
        lowering.payload(payload)?;
    }
    lowering.finish()
}

/// Index spaces that the `name` section can label.
#[derive(Debug, Clone, Copy)]
enum Space {
    Func,
    Table,
    Memory,
    Global,
    Tag,
    Type,
}

/// Section-by-section lowering state.
struct Lowering<'o> {
    options: &'o ReadOptions,
    file: Location,
    name: Option<String>,
    fields: Vec<ModuleField>,
    /// Type section, in index order.
    sigs: Vec<FuncSignature>,

    // Positions into `fields` per index space, imports included. Pushed in
    // the same order `Module::append_field` assigns indices, so index `i`
    // here is index `i` in the finished module.
    funcs: Vec<usize>,
    tables: Vec<usize>,
    memories: Vec<usize>,
    globals: Vec<usize>,
    tags: Vec<usize>,
    types: Vec<usize>,

    num_func_imports: usize,
    /// Next defined function to receive a code section entry.
    next_body: usize,
}

impl<'o> Lowering<'o> {
    fn new(file: Location, options: &'o ReadOptions) -> Self {
        Self {
            options,
            file,
            name: None,
            fields: Vec::new(),
            sigs: Vec::new(),
            funcs: Vec::new(),
            tables: Vec::new(),
            memories: Vec::new(),
            globals: Vec::new(),
            tags: Vec::new(),
            types: Vec::new(),
            num_func_imports: 0,
            next_body: 0,
        }
    }

    fn push(&mut self, offset: usize, kind: impl Into<ModuleFieldKind>) -> usize {
        let pos = self.fields.len();
        self.fields
            .push(ModuleField::new(self.file.at_offset(offset), kind));
        pos
    }

    fn sig(&self, type_index: u32) -> Result<FuncSignature> {
        self.sigs
            .get(type_index as usize)
            .cloned()
            .with_context(|| format!("unknown type index {}", type_index))
    }

    fn payload(&mut self, payload: Payload<'_>) -> Result<()> {
        match payload {
            Payload::Version {
                encoding: Encoding::Component,
                ..
            } => bail!("components are not supported"),

            Payload::TypeSection(reader) => {
                debug!("type section: {} entries", reader.count());
                for entry in reader.into_iter_with_offsets() {
                    let (offset, rec_group) = entry.context("reading rec group")?;
                    for sub_type in rec_group.types() {
                        let wasmparser::CompositeInnerType::Func(func_ty) =
                            &sub_type.composite_type.inner
                        else {
                            bail!("only function types are supported");
                        };
                        let sig = FuncSignature::new(
                            func_ty
                                .params()
                                .iter()
                                .map(|&vt| Type::from_wasmparser(vt))
                                .collect::<Result<_>>()?,
                            func_ty
                                .results()
                                .iter()
                                .map(|&vt| Type::from_wasmparser(vt))
                                .collect::<Result<_>>()?,
                        );
                        let pos = self.push(offset, FuncType::new(sig.clone()));
                        self.types.push(pos);
                        self.sigs.push(sig);
                    }
                }
            }

            Payload::ImportSection(reader) => {
                debug!("import section: {} entries", reader.count());
                for entry in reader.into_iter_with_offsets() {
                    let (offset, import) = entry.context("reading import")?;
                    let (module, field) = (import.module, import.name);
                    self.import(offset, import)
                        .with_context(|| format!("import {}.{}", module, field))?;
                }
            }

            Payload::FunctionSection(reader) => {
                for entry in reader.into_iter_with_offsets() {
                    let (offset, type_index) = entry.context("reading function type index")?;
                    let decl = FuncDeclaration::with_type(
                        Var::index(type_index).with_loc(self.file.at_offset(offset)),
                        self.sig(type_index)?,
                    );
                    let pos = self.push(offset, Func::new(decl));
                    self.funcs.push(pos);
                }
            }

            Payload::TableSection(reader) => {
                for entry in reader.into_iter_with_offsets() {
                    let (offset, table) = entry.context("reading table")?;
                    let table = table_decl(&table.ty)?;
                    let pos = self.push(offset, table);
                    self.tables.push(pos);
                }
            }

            Payload::MemorySection(reader) => {
                for entry in reader.into_iter_with_offsets() {
                    let (offset, memory) = entry.context("reading memory type")?;
                    let memory = memory_decl(&memory)?;
                    let pos = self.push(offset, memory);
                    self.memories.push(pos);
                }
            }

            Payload::TagSection(reader) => {
                for entry in reader.into_iter_with_offsets() {
                    let (offset, tag) = entry.context("reading tag")?;
                    let except = Exception::new(self.sig(tag.func_type_idx)?.param_types);
                    let pos = self.push(offset, except);
                    self.tags.push(pos);
                }
            }

            Payload::GlobalSection(reader) => {
                for entry in reader.into_iter_with_offsets() {
                    let (offset, global) = entry.context("reading global")?;
                    let init_expr = lower_const_expr(&global.init_expr, &self.file)
                        .context("global initializer")?;
                    let global = Global::new(
                        Type::from_wasmparser(global.ty.content_type)?,
                        global.ty.mutable,
                        init_expr,
                    );
                    let pos = self.push(offset, global);
                    self.globals.push(pos);
                }
            }

            Payload::ExportSection(reader) => {
                for entry in reader.into_iter_with_offsets() {
                    let (offset, export) = entry.context("reading export")?;
                    let kind = match export.kind {
                        wasmparser::ExternalKind::Func => ExternalKind::Func,
                        wasmparser::ExternalKind::Table => ExternalKind::Table,
                        wasmparser::ExternalKind::Memory => ExternalKind::Memory,
                        wasmparser::ExternalKind::Global => ExternalKind::Global,
                        wasmparser::ExternalKind::Tag => ExternalKind::Except,
                    };
                    let var = Var::index(export.index).with_loc(self.file.at_offset(offset));
                    self.push(offset, Export::new(export.name, kind, var));
                }
            }

            Payload::StartSection { func, range } => {
                let var = Var::index(func).with_loc(self.file.at_offset(range.start));
                self.push(range.start, ModuleFieldKind::Start(var));
            }

            Payload::ElementSection(reader) => {
                for entry in reader.into_iter_with_offsets() {
                    let (offset, element) = entry.context("reading element segment")?;
                    if let Some(segment) = self.elem_segment(element)? {
                        self.push(offset, segment);
                    }
                }
            }

            Payload::DataSection(reader) => {
                for entry in reader.into_iter_with_offsets() {
                    let (offset, data) = entry.context("reading data segment")?;
                    if let Some(segment) = self.data_segment(data)? {
                        self.push(offset, segment);
                    }
                }
            }

            Payload::CodeSectionStart { count, .. } => {
                let defined = self.funcs.len() - self.num_func_imports;
                if count as usize != defined {
                    bail!(
                        "code section has {} bodies for {} declared functions",
                        count,
                        defined
                    );
                }
            }

            Payload::CodeSectionEntry(body) => self.code_entry(body)?,

            Payload::CustomSection(reader) => {
                if let KnownCustom::Name(names) = reader.as_known() {
                    for name in names {
                        let name = name.context("reading name subsection")?;
                        self.apply_name(name)?;
                    }
                }
            }

            _ => {}
        }
        Ok(())
    }

    fn import(&mut self, offset: usize, import: wasmparser::Import<'_>) -> Result<()> {
        let (kind, space) = match import.ty {
            TypeRef::Func(type_index) => {
                let decl = FuncDeclaration::with_type(
                    Var::index(type_index).with_loc(self.file.at_offset(offset)),
                    self.sig(type_index)?,
                );
                (ImportKind::Func(Box::new(Func::new(decl))), Space::Func)
            }
            TypeRef::Table(ty) => (ImportKind::Table(table_decl(&ty)?), Space::Table),
            TypeRef::Memory(ty) => (ImportKind::Memory(memory_decl(&ty)?), Space::Memory),
            TypeRef::Global(ty) => {
                let global = Global::new(Type::from_wasmparser(ty.content_type)?, ty.mutable, vec![]);
                (ImportKind::Global(global), Space::Global)
            }
            TypeRef::Tag(ty) => {
                let except = Exception::new(self.sig(ty.func_type_idx)?.param_types);
                (ImportKind::Except(except), Space::Tag)
            }
        };

        let pos = self.push(offset, Import::new(import.module, import.name, kind));
        match space {
            Space::Func => {
                self.funcs.push(pos);
                self.num_func_imports += 1;
            }
            Space::Table => self.tables.push(pos),
            Space::Memory => self.memories.push(pos),
            Space::Global => self.globals.push(pos),
            Space::Tag => self.tags.push(pos),
            Space::Type => {}
        }
        Ok(())
    }

    fn elem_segment(&self, element: wasmparser::Element<'_>) -> Result<Option<ElemSegment>> {
        let (table_index, offset_expr) = match element.kind {
            wasmparser::ElementKind::Active {
                table_index,
                offset_expr,
            } => (table_index.unwrap_or(0), offset_expr),
            wasmparser::ElementKind::Passive | wasmparser::ElementKind::Declared => {
                // Only active segments have a place in the module.
                debug!("skipping non-active element segment");
                return Ok(None);
            }
        };

        let mut vars = Vec::new();
        match element.items {
            wasmparser::ElementItems::Functions(funcs) => {
                for entry in funcs.into_iter_with_offsets() {
                    let (offset, index) = entry.context("reading element func index")?;
                    vars.push(Var::index(index).with_loc(self.file.at_offset(offset)));
                }
            }
            wasmparser::ElementItems::Expressions(..) => {
                bail!("expression-based element segments are not supported");
            }
        }

        Ok(Some(ElemSegment {
            table_var: Var::index(table_index),
            offset: lower_const_expr(&offset_expr, &self.file).context("element offset")?,
            vars,
        }))
    }

    fn data_segment(&self, data: wasmparser::Data<'_>) -> Result<Option<DataSegment>> {
        match data.kind {
            wasmparser::DataKind::Active {
                memory_index,
                offset_expr,
            } => Ok(Some(DataSegment {
                memory_var: Var::index(memory_index),
                offset: lower_const_expr(&offset_expr, &self.file).context("data offset")?,
                data: data.data.to_vec(),
            })),
            wasmparser::DataKind::Passive => {
                debug!("skipping passive data segment");
                Ok(None)
            }
        }
    }

    fn code_entry(&mut self, body: FunctionBody<'_>) -> Result<()> {
        let func_index = self.num_func_imports + self.next_body;
        self.next_body += 1;
        let pos = *self
            .funcs
            .get(func_index)
            .with_context(|| format!("code entry {} has no declaration", func_index))?;

        let ModuleFieldKind::Func(func) = &self.fields[pos].kind else {
            bail!("function {} is not a definition", func_index);
        };
        let local_types = BodyLowering::locals(&body, func.num_params())
            .with_context(|| format!("reading locals of function {}", func_index))?;
        let exprs = if self.options.function_bodies {
            BodyLowering::new(&self.sigs, &self.file)
                .lower(&body)
                .with_context(|| format!("lowering body of function {}", func_index))?
        } else {
            Vec::new()
        };

        let ModuleFieldKind::Func(func) = &mut self.fields[pos].kind else {
            bail!("function {} is not a definition", func_index);
        };
        func.local_types = local_types;
        func.exprs = exprs;
        Ok(())
    }

    fn positions(&self, space: Space) -> &[usize] {
        match space {
            Space::Func => &self.funcs,
            Space::Table => &self.tables,
            Space::Memory => &self.memories,
            Space::Global => &self.globals,
            Space::Tag => &self.tags,
            Space::Type => &self.types,
        }
    }

    fn field_at(&mut self, space: Space, index: u32) -> Option<&mut ModuleFieldKind> {
        let pos = *self.positions(space).get(index as usize)?;
        self.fields.get_mut(pos).map(|field| &mut field.kind)
    }

    fn apply_name(&mut self, name: Name<'_>) -> Result<()> {
        match name {
            Name::Module { name, .. } => self.name = Some(sigil(name)),
            Name::Function(map) => self.apply_name_map(Space::Func, map)?,
            Name::Table(map) => self.apply_name_map(Space::Table, map)?,
            Name::Memory(map) => self.apply_name_map(Space::Memory, map)?,
            Name::Global(map) => self.apply_name_map(Space::Global, map)?,
            Name::Tag(map) => self.apply_name_map(Space::Tag, map)?,
            Name::Type(map) => self.apply_name_map(Space::Type, map)?,
            Name::Local(indirect) => {
                for entry in indirect {
                    let entry = entry.context("reading local names")?;
                    let func_index = entry.index;
                    for naming in entry.names {
                        let naming = naming.context("reading local name")?;
                        let loc = self.file.clone();
                        if let Some(func) = self.field_at(Space::Func, func_index).and_then(func_of)
                        {
                            bind_local(func, naming.index, naming.name, loc);
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn apply_name_map(&mut self, space: Space, map: NameMap<'_>) -> Result<()> {
        for naming in map {
            let naming = naming.context("reading name map")?;
            if let Some(slot) = self.field_at(space, naming.index).and_then(name_slot) {
                *slot = Some(sigil(naming.name));
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Module> {
        let defined = self.funcs.len() - self.num_func_imports;
        if self.next_body != defined {
            bail!(
                "{} functions declared but {} bodies found",
                defined,
                self.next_body
            );
        }

        let mut module = Module::new();
        module.loc = self.file;
        module.name = self.name;
        module.append_fields(self.fields);
        debug!(
            "read module: {} fields, {} funcs ({} imported)",
            module.fields().len(),
            module.num_funcs(),
            module.num_func_imports()
        );
        Ok(module)
    }
}

/// Text-format spelling of a `name` section entry.
fn sigil(name: &str) -> String {
    format!("${}", name)
}

fn name_slot(kind: &mut ModuleFieldKind) -> Option<&mut Option<String>> {
    match kind {
        ModuleFieldKind::Func(func) => Some(&mut func.name),
        ModuleFieldKind::Table(table) => Some(&mut table.name),
        ModuleFieldKind::Memory(memory) => Some(&mut memory.name),
        ModuleFieldKind::Global(global) => Some(&mut global.name),
        ModuleFieldKind::Except(except) => Some(&mut except.name),
        ModuleFieldKind::FuncType(func_type) => Some(&mut func_type.name),
        ModuleFieldKind::Import(import) => Some(match &mut import.kind {
            ImportKind::Func(func) => &mut func.name,
            ImportKind::Table(table) => &mut table.name,
            ImportKind::Memory(memory) => &mut memory.name,
            ImportKind::Global(global) => &mut global.name,
            ImportKind::Except(except) => &mut except.name,
        }),
        _ => None,
    }
}

fn func_of(kind: &mut ModuleFieldKind) -> Option<&mut Func> {
    match kind {
        ModuleFieldKind::Func(func) => Some(func),
        ModuleFieldKind::Import(Import {
            kind: ImportKind::Func(func),
            ..
        }) => Some(func),
        _ => None,
    }
}

/// Bind a local name. Indices below the parameter count name parameters; the
/// rest are offset into `local_types`.
fn bind_local(func: &mut Func, index: u32, name: &str, loc: Location) {
    let num_params = func.num_params();
    if index < num_params {
        func.param_bindings
            .insert(sigil(name), Binding::new(loc, index));
    } else {
        func.local_bindings
            .insert(sigil(name), Binding::new(loc, index - num_params));
    }
}

fn table_decl(ty: &wasmparser::TableType) -> Result<Table> {
    if ty.element_type != RefType::FUNCREF {
        bail!("unsupported table element type {:?}", ty.element_type);
    }
    if ty.table64 {
        bail!("64-bit tables are not supported");
    }
    Ok(Table::new(Limits::new(ty.initial, ty.maximum)))
}

fn memory_decl(ty: &wasmparser::MemoryType) -> Result<Memory> {
    if ty.memory64 {
        bail!("64-bit memories are not supported");
    }
    let mut limits = Limits::new(ty.initial, ty.maximum);
    limits.is_shared = ty.shared;
    Ok(Memory::new(limits))
}
