//! The module aggregate: an ordered list of fields plus per-kind views.

use super::binding::{Binding, BindingHash};
use super::decl::*;
use super::types::{Index, Location, Var, INVALID_INDEX};
use log::trace;

/// A top-level module field, owning exactly one declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleFieldKind {
    Func(Box<Func>),
    Global(Global),
    Import(Import),
    Export(Export),
    FuncType(FuncType),
    Table(Table),
    ElemSegment(ElemSegment),
    Memory(Memory),
    DataSegment(DataSegment),
    /// The start function.
    Start(Var),
    Except(Exception),
}

/// Fieldless discriminant of [`ModuleFieldKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleFieldType {
    Func,
    Global,
    Import,
    Export,
    FuncType,
    Table,
    ElemSegment,
    Memory,
    DataSegment,
    Start,
    Except,
}

impl ModuleFieldKind {
    pub fn ty(&self) -> ModuleFieldType {
        match self {
            ModuleFieldKind::Func(_) => ModuleFieldType::Func,
            ModuleFieldKind::Global(_) => ModuleFieldType::Global,
            ModuleFieldKind::Import(_) => ModuleFieldType::Import,
            ModuleFieldKind::Export(_) => ModuleFieldType::Export,
            ModuleFieldKind::FuncType(_) => ModuleFieldType::FuncType,
            ModuleFieldKind::Table(_) => ModuleFieldType::Table,
            ModuleFieldKind::ElemSegment(_) => ModuleFieldType::ElemSegment,
            ModuleFieldKind::Memory(_) => ModuleFieldType::Memory,
            ModuleFieldKind::DataSegment(_) => ModuleFieldType::DataSegment,
            ModuleFieldKind::Start(_) => ModuleFieldType::Start,
            ModuleFieldKind::Except(_) => ModuleFieldType::Except,
        }
    }
}

impl From<Func> for ModuleFieldKind {
    fn from(func: Func) -> Self {
        ModuleFieldKind::Func(Box::new(func))
    }
}

impl From<Global> for ModuleFieldKind {
    fn from(global: Global) -> Self {
        ModuleFieldKind::Global(global)
    }
}

impl From<Import> for ModuleFieldKind {
    fn from(import: Import) -> Self {
        ModuleFieldKind::Import(import)
    }
}

impl From<Export> for ModuleFieldKind {
    fn from(export: Export) -> Self {
        ModuleFieldKind::Export(export)
    }
}

impl From<FuncType> for ModuleFieldKind {
    fn from(func_type: FuncType) -> Self {
        ModuleFieldKind::FuncType(func_type)
    }
}

impl From<Table> for ModuleFieldKind {
    fn from(table: Table) -> Self {
        ModuleFieldKind::Table(table)
    }
}

impl From<ElemSegment> for ModuleFieldKind {
    fn from(segment: ElemSegment) -> Self {
        ModuleFieldKind::ElemSegment(segment)
    }
}

impl From<Memory> for ModuleFieldKind {
    fn from(memory: Memory) -> Self {
        ModuleFieldKind::Memory(memory)
    }
}

impl From<DataSegment> for ModuleFieldKind {
    fn from(segment: DataSegment) -> Self {
        ModuleFieldKind::DataSegment(segment)
    }
}

impl From<Exception> for ModuleFieldKind {
    fn from(except: Exception) -> Self {
        ModuleFieldKind::Except(except)
    }
}

/// A module field with the location it was declared at.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleField {
    pub loc: Location,
    pub kind: ModuleFieldKind,
}

impl ModuleField {
    pub fn new(loc: Location, kind: impl Into<ModuleFieldKind>) -> Self {
        Self {
            loc,
            kind: kind.into(),
        }
    }

    pub fn ty(&self) -> ModuleFieldType {
        self.kind.ty()
    }
}

/// One binding table per module namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleBindings {
    pub funcs: BindingHash,
    pub globals: BindingHash,
    pub tables: BindingHash,
    pub memories: BindingHash,
    pub func_types: BindingHash,
    pub exports: BindingHash,
    pub excepts: BindingHash,
}

// === Field projections ===
//
// Functions, tables, memories, globals and exceptions live either in their own
// field or inside an import; both share one index space.

fn as_func(kind: &ModuleFieldKind) -> Option<&Func> {
    match kind {
        ModuleFieldKind::Func(func) => Some(func),
        ModuleFieldKind::Import(Import {
            kind: ImportKind::Func(func),
            ..
        }) => Some(func),
        _ => None,
    }
}

fn as_func_mut(kind: &mut ModuleFieldKind) -> Option<&mut Func> {
    match kind {
        ModuleFieldKind::Func(func) => Some(func),
        ModuleFieldKind::Import(Import {
            kind: ImportKind::Func(func),
            ..
        }) => Some(func),
        _ => None,
    }
}

fn as_global(kind: &ModuleFieldKind) -> Option<&Global> {
    match kind {
        ModuleFieldKind::Global(global) => Some(global),
        ModuleFieldKind::Import(Import {
            kind: ImportKind::Global(global),
            ..
        }) => Some(global),
        _ => None,
    }
}

fn as_global_mut(kind: &mut ModuleFieldKind) -> Option<&mut Global> {
    match kind {
        ModuleFieldKind::Global(global) => Some(global),
        ModuleFieldKind::Import(Import {
            kind: ImportKind::Global(global),
            ..
        }) => Some(global),
        _ => None,
    }
}

fn as_table(kind: &ModuleFieldKind) -> Option<&Table> {
    match kind {
        ModuleFieldKind::Table(table) => Some(table),
        ModuleFieldKind::Import(Import {
            kind: ImportKind::Table(table),
            ..
        }) => Some(table),
        _ => None,
    }
}

fn as_memory(kind: &ModuleFieldKind) -> Option<&Memory> {
    match kind {
        ModuleFieldKind::Memory(memory) => Some(memory),
        ModuleFieldKind::Import(Import {
            kind: ImportKind::Memory(memory),
            ..
        }) => Some(memory),
        _ => None,
    }
}

fn as_except(kind: &ModuleFieldKind) -> Option<&Exception> {
    match kind {
        ModuleFieldKind::Except(except) => Some(except),
        ModuleFieldKind::Import(Import {
            kind: ImportKind::Except(except),
            ..
        }) => Some(except),
        _ => None,
    }
}

fn as_import(kind: &ModuleFieldKind) -> Option<&Import> {
    match kind {
        ModuleFieldKind::Import(import) => Some(import),
        _ => None,
    }
}

fn as_export(kind: &ModuleFieldKind) -> Option<&Export> {
    match kind {
        ModuleFieldKind::Export(export) => Some(export),
        _ => None,
    }
}

fn as_export_mut(kind: &mut ModuleFieldKind) -> Option<&mut Export> {
    match kind {
        ModuleFieldKind::Export(export) => Some(export),
        _ => None,
    }
}

fn as_func_type(kind: &ModuleFieldKind) -> Option<&FuncType> {
    match kind {
        ModuleFieldKind::FuncType(func_type) => Some(func_type),
        _ => None,
    }
}

fn as_elem_segment(kind: &ModuleFieldKind) -> Option<&ElemSegment> {
    match kind {
        ModuleFieldKind::ElemSegment(segment) => Some(segment),
        _ => None,
    }
}

fn as_elem_segment_mut(kind: &mut ModuleFieldKind) -> Option<&mut ElemSegment> {
    match kind {
        ModuleFieldKind::ElemSegment(segment) => Some(segment),
        _ => None,
    }
}

fn as_data_segment(kind: &ModuleFieldKind) -> Option<&DataSegment> {
    match kind {
        ModuleFieldKind::DataSegment(segment) => Some(segment),
        _ => None,
    }
}

fn as_data_segment_mut(kind: &mut ModuleFieldKind) -> Option<&mut DataSegment> {
    match kind {
        ModuleFieldKind::DataSegment(segment) => Some(segment),
        _ => None,
    }
}

/// A WebAssembly module.
///
/// `fields` is the authoritative declaration order. The per-kind position
/// vectors and the binding tables are derived views, kept in sync by
/// [`Module::append_field`], the only way to add a field. The position of a
/// declaration in its per-kind view is its index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub loc: Location,
    pub name: Option<String>,

    fields: Vec<ModuleField>,

    num_func_imports: Index,
    num_table_imports: Index,
    num_memory_imports: Index,
    num_global_imports: Index,
    num_except_imports: Index,

    // Positions into `fields`, one vector per index space.
    funcs: Vec<usize>,
    globals: Vec<usize>,
    imports: Vec<usize>,
    exports: Vec<usize>,
    func_types: Vec<usize>,
    tables: Vec<usize>,
    elem_segments: Vec<usize>,
    memories: Vec<usize>,
    data_segments: Vec<usize>,
    excepts: Vec<usize>,
    start: Option<usize>,

    bindings: ModuleBindings,
}

fn bind(hash: &mut BindingHash, name: Option<&str>, loc: &Location, index: usize) {
    if let Some(name) = name {
        hash.insert(name, Binding::new(loc.clone(), index as Index));
    }
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    // === Mutation ===

    /// Append a field at the end of the module and update every view.
    ///
    /// Returns the field's position in [`Module::fields`]. Named
    /// declarations are bound in their namespace; a repeated name shadows the
    /// earlier binding for lookups, and both declarations keep their index.
    /// Imports appended after definitions are recorded as given.
    pub fn append_field(&mut self, field: ModuleField) -> usize {
        let pos = self.fields.len();
        let loc = &field.loc;
        let b = &mut self.bindings;

        match &field.kind {
            ModuleFieldKind::Func(func) => {
                bind(&mut b.funcs, func.name.as_deref(), loc, self.funcs.len());
                self.funcs.push(pos);
            }
            ModuleFieldKind::Global(global) => {
                bind(&mut b.globals, global.name.as_deref(), loc, self.globals.len());
                self.globals.push(pos);
            }
            ModuleFieldKind::Import(import) => {
                let name = import.name();
                match &import.kind {
                    ImportKind::Func(_) => {
                        bind(&mut b.funcs, name, loc, self.funcs.len());
                        self.funcs.push(pos);
                        self.num_func_imports += 1;
                    }
                    ImportKind::Table(_) => {
                        bind(&mut b.tables, name, loc, self.tables.len());
                        self.tables.push(pos);
                        self.num_table_imports += 1;
                    }
                    ImportKind::Memory(_) => {
                        bind(&mut b.memories, name, loc, self.memories.len());
                        self.memories.push(pos);
                        self.num_memory_imports += 1;
                    }
                    ImportKind::Global(_) => {
                        bind(&mut b.globals, name, loc, self.globals.len());
                        self.globals.push(pos);
                        self.num_global_imports += 1;
                    }
                    ImportKind::Except(_) => {
                        bind(&mut b.excepts, name, loc, self.excepts.len());
                        self.excepts.push(pos);
                        self.num_except_imports += 1;
                    }
                }
                self.imports.push(pos);
            }
            ModuleFieldKind::Export(export) => {
                bind(&mut b.exports, Some(&export.name), loc, self.exports.len());
                self.exports.push(pos);
            }
            ModuleFieldKind::FuncType(func_type) => {
                bind(
                    &mut b.func_types,
                    func_type.name.as_deref(),
                    loc,
                    self.func_types.len(),
                );
                self.func_types.push(pos);
            }
            ModuleFieldKind::Table(table) => {
                bind(&mut b.tables, table.name.as_deref(), loc, self.tables.len());
                self.tables.push(pos);
            }
            ModuleFieldKind::ElemSegment(_) => self.elem_segments.push(pos),
            ModuleFieldKind::Memory(memory) => {
                bind(&mut b.memories, memory.name.as_deref(), loc, self.memories.len());
                self.memories.push(pos);
            }
            ModuleFieldKind::DataSegment(_) => self.data_segments.push(pos),
            ModuleFieldKind::Start(_) => self.start = Some(pos),
            ModuleFieldKind::Except(except) => {
                bind(&mut b.excepts, except.name.as_deref(), loc, self.excepts.len());
                self.excepts.push(pos);
            }
        }

        trace!("append {:?} field at position {}", field.ty(), pos);
        self.fields.push(field);
        pos
    }

    /// Append a sequence of fields in order.
    pub fn append_fields(&mut self, fields: impl IntoIterator<Item = ModuleField>) {
        for field in fields {
            self.append_field(field);
        }
    }

    /// Append an unnamed type-table entry for `sig` and return its index.
    ///
    /// Does not de-duplicate; see [`Module::ensure_func_type`].
    pub fn append_implicit_func_type(&mut self, loc: Location, sig: FuncSignature) -> Index {
        let index = self.func_types.len() as Index;
        self.append_field(ModuleField::new(loc, FuncType::new(sig)));
        index
    }

    /// Index of a type-table entry structurally equal to `sig`, appending an
    /// implicit one if none exists yet.
    pub fn ensure_func_type(&mut self, loc: Location, sig: &FuncSignature) -> Index {
        match self.get_func_type_index_by_sig(sig) {
            INVALID_INDEX => self.append_implicit_func_type(loc, sig.clone()),
            index => index,
        }
    }

    // === Fields and counters ===

    /// Every field in declaration order.
    pub fn fields(&self) -> &[ModuleField] {
        &self.fields
    }

    pub fn bindings(&self) -> &ModuleBindings {
        &self.bindings
    }

    pub fn num_func_imports(&self) -> Index {
        self.num_func_imports
    }

    pub fn num_table_imports(&self) -> Index {
        self.num_table_imports
    }

    pub fn num_memory_imports(&self) -> Index {
        self.num_memory_imports
    }

    pub fn num_global_imports(&self) -> Index {
        self.num_global_imports
    }

    pub fn num_except_imports(&self) -> Index {
        self.num_except_imports
    }

    // === Index-based accessors ===

    fn lookup<'a, T: ?Sized>(
        &'a self,
        positions: &[usize],
        index: Index,
        project: fn(&'a ModuleFieldKind) -> Option<&'a T>,
    ) -> Option<&'a T> {
        let pos = *positions.get(index as usize)?;
        project(&self.fields.get(pos)?.kind)
    }

    fn lookup_mut<'a, T: ?Sized>(
        fields: &'a mut [ModuleField],
        positions: &[usize],
        index: Index,
        project: fn(&'a mut ModuleFieldKind) -> Option<&'a mut T>,
    ) -> Option<&'a mut T> {
        let pos = *positions.get(index as usize)?;
        project(&mut fields.get_mut(pos)?.kind)
    }

    pub fn func(&self, index: Index) -> Option<&Func> {
        self.lookup(&self.funcs, index, as_func)
    }

    pub fn func_mut(&mut self, index: Index) -> Option<&mut Func> {
        Self::lookup_mut(&mut self.fields, &self.funcs, index, as_func_mut)
    }

    pub fn global(&self, index: Index) -> Option<&Global> {
        self.lookup(&self.globals, index, as_global)
    }

    pub fn global_mut(&mut self, index: Index) -> Option<&mut Global> {
        Self::lookup_mut(&mut self.fields, &self.globals, index, as_global_mut)
    }

    pub fn table(&self, index: Index) -> Option<&Table> {
        self.lookup(&self.tables, index, as_table)
    }

    pub fn memory(&self, index: Index) -> Option<&Memory> {
        self.lookup(&self.memories, index, as_memory)
    }

    pub fn except(&self, index: Index) -> Option<&Exception> {
        self.lookup(&self.excepts, index, as_except)
    }

    pub fn func_type(&self, index: Index) -> Option<&FuncType> {
        self.lookup(&self.func_types, index, as_func_type)
    }

    pub fn import(&self, index: Index) -> Option<&Import> {
        self.lookup(&self.imports, index, as_import)
    }

    pub fn export(&self, index: Index) -> Option<&Export> {
        self.lookup(&self.exports, index, as_export)
    }

    pub fn elem_segment(&self, index: Index) -> Option<&ElemSegment> {
        self.lookup(&self.elem_segments, index, as_elem_segment)
    }

    pub fn data_segment(&self, index: Index) -> Option<&DataSegment> {
        self.lookup(&self.data_segments, index, as_data_segment)
    }

    /// The start function reference, if the module declares one.
    pub fn start(&self) -> Option<&Var> {
        match &self.fields.get(self.start?)?.kind {
            ModuleFieldKind::Start(var) => Some(var),
            _ => None,
        }
    }

    /// Whether function `index` is an import rather than a definition.
    pub fn is_func_import(&self, index: Index) -> bool {
        self.is_import_at(&self.funcs, index)
    }

    /// Whether global `index` is an import rather than a definition.
    pub fn is_global_import(&self, index: Index) -> bool {
        self.is_import_at(&self.globals, index)
    }

    fn is_import_at(&self, positions: &[usize], index: Index) -> bool {
        positions
            .get(index as usize)
            .and_then(|&pos| self.fields.get(pos))
            .is_some_and(|field| matches!(field.kind, ModuleFieldKind::Import(_)))
    }

    // === Per-kind iteration ===

    fn view<'a, T: ?Sized>(
        &'a self,
        positions: &'a [usize],
        project: fn(&'a ModuleFieldKind) -> Option<&'a T>,
    ) -> impl Iterator<Item = &'a T> + 'a {
        positions
            .iter()
            .filter_map(move |&pos| project(&self.fields[pos].kind))
    }

    /// Functions in index order, imports included.
    pub fn funcs(&self) -> impl Iterator<Item = &Func> {
        self.view(&self.funcs, as_func)
    }

    pub fn globals(&self) -> impl Iterator<Item = &Global> {
        self.view(&self.globals, as_global)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.view(&self.tables, as_table)
    }

    pub fn memories(&self) -> impl Iterator<Item = &Memory> {
        self.view(&self.memories, as_memory)
    }

    pub fn excepts(&self) -> impl Iterator<Item = &Exception> {
        self.view(&self.excepts, as_except)
    }

    pub fn func_types(&self) -> impl Iterator<Item = &FuncType> {
        self.view(&self.func_types, as_func_type)
    }

    pub fn imports(&self) -> impl Iterator<Item = &Import> {
        self.view(&self.imports, as_import)
    }

    pub fn exports(&self) -> impl Iterator<Item = &Export> {
        self.view(&self.exports, as_export)
    }

    pub fn elem_segments(&self) -> impl Iterator<Item = &ElemSegment> {
        self.view(&self.elem_segments, as_elem_segment)
    }

    pub fn data_segments(&self) -> impl Iterator<Item = &DataSegment> {
        self.view(&self.data_segments, as_data_segment)
    }

    pub fn num_funcs(&self) -> Index {
        self.funcs.len() as Index
    }

    pub fn num_globals(&self) -> Index {
        self.globals.len() as Index
    }

    pub fn num_tables(&self) -> Index {
        self.tables.len() as Index
    }

    pub fn num_memories(&self) -> Index {
        self.memories.len() as Index
    }

    pub fn num_excepts(&self) -> Index {
        self.excepts.len() as Index
    }

    pub fn num_func_types(&self) -> Index {
        self.func_types.len() as Index
    }

    pub fn num_imports(&self) -> Index {
        self.imports.len() as Index
    }

    pub fn num_exports(&self) -> Index {
        self.exports.len() as Index
    }

    // Mutable iteration for passes that rewrite vars or bodies in place.
    // Field kinds and positions cannot change through these, so the views
    // stay valid. Renaming a declaration here does not rebind it.

    /// Functions in index order, imports included.
    pub fn funcs_mut(&mut self) -> impl Iterator<Item = &mut Func> {
        self.fields.iter_mut().filter_map(|f| as_func_mut(&mut f.kind))
    }

    pub fn globals_mut(&mut self) -> impl Iterator<Item = &mut Global> {
        self.fields.iter_mut().filter_map(|f| as_global_mut(&mut f.kind))
    }

    pub fn exports_mut(&mut self) -> impl Iterator<Item = &mut Export> {
        self.fields.iter_mut().filter_map(|f| as_export_mut(&mut f.kind))
    }

    pub fn elem_segments_mut(&mut self) -> impl Iterator<Item = &mut ElemSegment> {
        self.fields
            .iter_mut()
            .filter_map(|f| as_elem_segment_mut(&mut f.kind))
    }

    pub fn data_segments_mut(&mut self) -> impl Iterator<Item = &mut DataSegment> {
        self.fields
            .iter_mut()
            .filter_map(|f| as_data_segment_mut(&mut f.kind))
    }

    pub fn start_mut(&mut self) -> Option<&mut Var> {
        match &mut self.fields.get_mut(self.start?)?.kind {
            ModuleFieldKind::Start(var) => Some(var),
            _ => None,
        }
    }

    // === Var resolution ===
    //
    // An index var is returned verbatim (callers validate bounds); a name var
    // is looked up in its namespace and yields INVALID_INDEX when unbound.

    pub fn get_func_index(&self, var: &Var) -> Index {
        self.bindings.funcs.find_index(var)
    }

    pub fn get_global_index(&self, var: &Var) -> Index {
        self.bindings.globals.find_index(var)
    }

    pub fn get_table_index(&self, var: &Var) -> Index {
        self.bindings.tables.find_index(var)
    }

    pub fn get_memory_index(&self, var: &Var) -> Index {
        self.bindings.memories.find_index(var)
    }

    pub fn get_except_index(&self, var: &Var) -> Index {
        self.bindings.excepts.find_index(var)
    }

    pub fn get_func_type_index(&self, var: &Var) -> Index {
        self.bindings.func_types.find_index(var)
    }

    /// Index of the first type-table entry whose signature equals `sig`.
    pub fn get_func_type_index_by_sig(&self, sig: &FuncSignature) -> Index {
        self.func_types()
            .position(|func_type| func_type.sig == *sig)
            .map_or(INVALID_INDEX, |index| index as Index)
    }

    /// Type index for a declaration: its explicit type var if present,
    /// otherwise a structural match on its inline signature.
    pub fn get_func_type_index_by_decl(&self, decl: &FuncDeclaration) -> Index {
        match &decl.type_var {
            Some(var) => self.get_func_type_index(var),
            None => self.get_func_type_index_by_sig(&decl.sig),
        }
    }

    pub fn get_func(&self, var: &Var) -> Option<&Func> {
        self.func(self.get_func_index(var))
    }

    pub fn get_func_mut(&mut self, var: &Var) -> Option<&mut Func> {
        let index = self.get_func_index(var);
        self.func_mut(index)
    }

    pub fn get_global(&self, var: &Var) -> Option<&Global> {
        self.global(self.get_global_index(var))
    }

    pub fn get_global_mut(&mut self, var: &Var) -> Option<&mut Global> {
        let index = self.get_global_index(var);
        self.global_mut(index)
    }

    pub fn get_table(&self, var: &Var) -> Option<&Table> {
        self.table(self.get_table_index(var))
    }

    pub fn get_memory(&self, var: &Var) -> Option<&Memory> {
        self.memory(self.get_memory_index(var))
    }

    pub fn get_except(&self, var: &Var) -> Option<&Exception> {
        self.except(self.get_except_index(var))
    }

    pub fn get_func_type(&self, var: &Var) -> Option<&FuncType> {
        self.func_type(self.get_func_type_index(var))
    }

    /// Export by external name. Exports have no positional form.
    pub fn get_export(&self, name: &str) -> Option<&Export> {
        self.export(self.bindings.exports.find_index_by_name(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::{Expr, ExprKind};
    use crate::ir::types::{Const, ExternalKind, Limits, Type};

    fn field(kind: impl Into<ModuleFieldKind>) -> ModuleField {
        ModuleField::new(Location::default(), kind)
    }

    fn imported_func(name: &str) -> Import {
        Import::new(
            "env",
            name,
            ImportKind::Func(Box::new(Func::default().with_name(format!("${}", name)))),
        )
    }

    #[test]
    fn test_imports_share_index_space_with_definitions() {
        let mut module = Module::new();
        module.append_field(field(imported_func("log")));
        module.append_field(field(Func::default().with_name("$main")));
        module.append_field(field(imported_func("late")));

        assert_eq!(module.num_funcs(), 3);
        assert_eq!(module.num_func_imports(), 2);
        assert_eq!(module.num_imports(), 2);
        assert_eq!(module.get_func_index(&Var::name("$log")), 0);
        assert_eq!(module.get_func_index(&Var::name("$main")), 1);
        // An import after a definition is recorded as given.
        assert_eq!(module.get_func_index(&Var::name("$late")), 2);
        assert!(module.is_func_import(0));
        assert!(!module.is_func_import(1));
        assert!(module.is_func_import(2));
        assert!(!module.is_func_import(3));
    }

    #[test]
    fn test_start_field() {
        let mut module = Module::new();
        assert!(module.start().is_none());
        module.append_field(field(Func::default()));
        module.append_field(ModuleField::new(
            Location::default(),
            ModuleFieldKind::Start(Var::name("$f")),
        ));
        assert_eq!(module.start(), Some(&Var::name("$f")));

        if let Some(start) = module.start_mut() {
            start.resolve(0);
        }
        assert_eq!(module.start(), Some(&Var::index(0)));
    }

    #[test]
    fn test_get_export_by_name_only() {
        let mut module = Module::new();
        module.append_field(field(Func::default()));
        module.append_field(field(Export::new("run", ExternalKind::Func, Var::index(0))));

        let export = module.get_export("run").expect("export should exist");
        assert_eq!(export.kind, ExternalKind::Func);
        assert!(module.get_export("missing").is_none());
    }

    #[test]
    fn test_decl_type_index_prefers_type_var() {
        let mut module = Module::new();
        let sig = FuncSignature::new(vec![Type::I32], vec![]);
        module.append_field(field(FuncType {
            name: Some("$t".to_string()),
            sig: FuncSignature::default(),
        }));
        module.append_implicit_func_type(Location::default(), sig.clone());

        let by_var = FuncDeclaration::with_type(Var::name("$t"), sig.clone());
        assert_eq!(module.get_func_type_index_by_decl(&by_var), 0);

        let inline = FuncDeclaration::with_sig(sig);
        assert_eq!(module.get_func_type_index_by_decl(&inline), 1);
    }

    #[test]
    fn test_mutable_iteration_rewrites_in_place() {
        let mut module = Module::new();
        module.append_field(field(imported_func("log")));
        module.append_field(field(Func::default()));
        module.append_field(field(Export::new("e", ExternalKind::Func, Var::name("$log"))));
        module.append_field(field(ElemSegment {
            table_var: Var::index(0),
            offset: vec![Expr::const_(Const::i32(0))],
            vars: vec![Var::name("$log")],
        }));

        assert_eq!(module.funcs_mut().count(), 2);

        let resolved = module.get_func_index(&Var::name("$log"));
        for export in module.exports_mut() {
            export.var.resolve(resolved);
        }
        for segment in module.elem_segments_mut() {
            for var in &mut segment.vars {
                var.resolve(resolved);
            }
        }
        if let Some(func) = module.func_mut(1) {
            func.exprs.push(Expr::new(ExprKind::Nop));
        }

        assert_eq!(module.get_export("e").map(|e| &e.var), Some(&Var::index(0)));
        assert_eq!(
            module.elem_segment(0).map(|s| s.vars.clone()),
            Some(vec![Var::index(0)])
        );
        assert!(module.func(1).is_some_and(|f| f.has_body()));
        assert!(module.func(0).is_some_and(|f| !f.has_body()));
    }

    #[test]
    fn test_out_of_range_lookups_are_none() {
        let mut module = Module::new();
        module.append_field(field(Memory::new(Limits::new(1, None))));
        assert!(module.get_memory(&Var::index(0)).is_some());
        assert!(module.get_memory(&Var::index(1)).is_none());
        assert!(module.get_memory(&Var::index(INVALID_INDEX)).is_none());
        assert!(module.get_table(&Var::name("$t")).is_none());
        assert!(module.func_mut(0).is_none());
    }

    #[test]
    fn test_global_imports_are_counted() {
        let mut module = Module::new();
        let mut imported = Global::new(Type::I32, false, vec![]);
        imported.name = Some("$g".to_string());
        module.append_field(field(Import::new("env", "g", ImportKind::Global(imported))));
        module.append_field(field(Global::new(
            Type::I64,
            true,
            vec![Expr::const_(Const::i64(7))],
        )));

        assert_eq!(module.num_global_imports(), 1);
        assert!(module.is_global_import(0));
        assert_eq!(module.get_global(&Var::name("$g")).map(|g| g.ty), Some(Type::I32));
        assert_eq!(module.global(1).map(|g| g.mutable), Some(true));
        assert_eq!(module.globals_mut().count(), 2);
        if let Some(global) = module.get_global_mut(&Var::index(1)) {
            global.mutable = false;
        }
        assert_eq!(module.global(1).map(|g| g.mutable), Some(false));
    }
}
