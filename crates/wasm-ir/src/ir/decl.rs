//! Per-kind declarations owned by module fields.

use super::binding::BindingHash;
use super::expr::ExprList;
use super::types::{ExternalKind, Index, Limits, Type, Var, INVALID_INDEX};

/// Parameter and result types of a function.
///
/// Equality is structural: two signatures are equal iff both type sequences
/// are element-wise equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FuncSignature {
    pub param_types: Vec<Type>,
    pub result_types: Vec<Type>,
}

impl FuncSignature {
    pub fn new(param_types: Vec<Type>, result_types: Vec<Type>) -> Self {
        Self {
            param_types,
            result_types,
        }
    }

    pub fn num_params(&self) -> Index {
        self.param_types.len() as Index
    }

    pub fn num_results(&self) -> Index {
        self.result_types.len() as Index
    }

    pub fn param_type(&self, index: Index) -> Option<Type> {
        self.param_types.get(index as usize).copied()
    }

    pub fn result_type(&self, index: Index) -> Option<Type> {
        self.result_types.get(index as usize).copied()
    }
}

/// An entry of the module's type table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FuncType {
    pub name: Option<String>,
    pub sig: FuncSignature,
}

impl FuncType {
    pub fn new(sig: FuncSignature) -> Self {
        Self { name: None, sig }
    }

    pub fn num_params(&self) -> Index {
        self.sig.num_params()
    }

    pub fn num_results(&self) -> Index {
        self.sig.num_results()
    }

    pub fn param_type(&self, index: Index) -> Option<Type> {
        self.sig.param_type(index)
    }

    pub fn result_type(&self, index: Index) -> Option<Type> {
        self.sig.result_type(index)
    }
}

/// How a function states its type: by reference to the type table, inline,
/// or both (the text format allows a `(type $t)` alongside explicit params).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FuncDeclaration {
    /// Set when the declaration references a `FuncType`.
    pub type_var: Option<Var>,
    pub sig: FuncSignature,
}

impl FuncDeclaration {
    pub fn with_sig(sig: FuncSignature) -> Self {
        Self {
            type_var: None,
            sig,
        }
    }

    pub fn with_type(type_var: Var, sig: FuncSignature) -> Self {
        Self {
            type_var: Some(type_var),
            sig,
        }
    }

    pub fn has_func_type(&self) -> bool {
        self.type_var.is_some()
    }

    pub fn num_params(&self) -> Index {
        self.sig.num_params()
    }

    pub fn num_results(&self) -> Index {
        self.sig.num_results()
    }

    pub fn param_type(&self, index: Index) -> Option<Type> {
        self.sig.param_type(index)
    }

    pub fn result_type(&self, index: Index) -> Option<Type> {
        self.sig.result_type(index)
    }
}

/// A function. Imported functions use this type too, with an empty body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Func {
    pub name: Option<String>,
    pub decl: FuncDeclaration,
    /// Declared locals, indexed after the parameters.
    pub local_types: Vec<Type>,
    /// Parameter names → parameter index.
    pub param_bindings: BindingHash,
    /// Local names → index within `local_types` (not offset by params).
    pub local_bindings: BindingHash,
    pub exprs: ExprList,
}

impl Func {
    pub fn new(decl: FuncDeclaration) -> Self {
        Self {
            decl,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn num_params(&self) -> Index {
        self.decl.num_params()
    }

    pub fn num_results(&self) -> Index {
        self.decl.num_results()
    }

    pub fn param_type(&self, index: Index) -> Option<Type> {
        self.decl.param_type(index)
    }

    pub fn result_type(&self, index: Index) -> Option<Type> {
        self.decl.result_type(index)
    }

    pub fn num_locals(&self) -> Index {
        self.local_types.len() as Index
    }

    pub fn num_params_and_locals(&self) -> Index {
        self.num_params() + self.num_locals()
    }

    /// Resolve a local var. Params come first, locals after them.
    ///
    /// Index vars are returned as-is; unbound names give `INVALID_INDEX`.
    pub fn get_local_index(&self, var: &Var) -> Index {
        if let Some(index) = var.as_index() {
            return index;
        }
        let index = self.param_bindings.find_index(var);
        if index != INVALID_INDEX {
            return index;
        }
        let index = self.local_bindings.find_index(var);
        if index == INVALID_INDEX {
            return INVALID_INDEX;
        }
        self.num_params() + index
    }

    /// Type of a param or local, if the var resolves to one.
    pub fn get_local_type(&self, var: &Var) -> Option<Type> {
        let index = self.get_local_index(var);
        if index == INVALID_INDEX {
            return None;
        }
        match index.checked_sub(self.num_params()) {
            None => self.param_type(index),
            Some(local) => self.local_types.get(local as usize).copied(),
        }
    }

    /// Name of every param then every local, `None` where unnamed.
    pub fn local_names(&self) -> Vec<Option<&str>> {
        let mut names = self
            .param_bindings
            .reverse_mapping(self.num_params() as usize);
        names.extend(
            self.local_bindings
                .reverse_mapping(self.local_types.len()),
        );
        names
    }

    /// Whether any expressions were recorded for the body. Both import stubs
    /// and defined functions with an empty body report `false`; use
    /// `Module::is_func_import` to tell them apart.
    pub fn has_body(&self) -> bool {
        !self.exprs.is_empty()
    }
}

/// A global variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: Option<String>,
    pub ty: Type,
    pub mutable: bool,
    /// Constant initializer; empty for imported globals.
    pub init_expr: ExprList,
}

impl Global {
    pub fn new(ty: Type, mutable: bool, init_expr: ExprList) -> Self {
        Self {
            name: None,
            ty,
            mutable,
            init_expr,
        }
    }
}

/// A table of references.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: Option<String>,
    pub elem_limits: Limits,
    pub elem_type: Type,
}

impl Table {
    pub fn new(elem_limits: Limits) -> Self {
        Self {
            name: None,
            elem_limits,
            elem_type: Type::Funcref,
        }
    }
}

/// A linear memory; limits are in 64 KiB pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Memory {
    pub name: Option<String>,
    pub page_limits: Limits,
}

impl Memory {
    pub fn new(page_limits: Limits) -> Self {
        Self {
            name: None,
            page_limits,
        }
    }
}

/// An exception type: the values carried when thrown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exception {
    pub name: Option<String>,
    pub sig: Vec<Type>,
}

impl Exception {
    pub fn new(sig: Vec<Type>) -> Self {
        Self { name: None, sig }
    }
}

/// The imported entity.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportKind {
    Func(Box<Func>),
    Table(Table),
    Memory(Memory),
    Global(Global),
    Except(Exception),
}

/// An import: `module_name.field_name` bound to a local declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module_name: String,
    pub field_name: String,
    pub kind: ImportKind,
}

impl Import {
    pub fn new(
        module_name: impl Into<String>,
        field_name: impl Into<String>,
        kind: ImportKind,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            field_name: field_name.into(),
            kind,
        }
    }

    pub fn external_kind(&self) -> ExternalKind {
        match self.kind {
            ImportKind::Func(_) => ExternalKind::Func,
            ImportKind::Table(_) => ExternalKind::Table,
            ImportKind::Memory(_) => ExternalKind::Memory,
            ImportKind::Global(_) => ExternalKind::Global,
            ImportKind::Except(_) => ExternalKind::Except,
        }
    }

    /// Local name of the imported declaration.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            ImportKind::Func(f) => f.name.as_deref(),
            ImportKind::Table(t) => t.name.as_deref(),
            ImportKind::Memory(m) => m.name.as_deref(),
            ImportKind::Global(g) => g.name.as_deref(),
            ImportKind::Except(e) => e.name.as_deref(),
        }
    }
}

/// An export of a module entity under an external name.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub kind: ExternalKind,
    pub var: Var,
}

impl Export {
    pub fn new(name: impl Into<String>, kind: ExternalKind, var: Var) -> Self {
        Self {
            name: name.into(),
            kind,
            var,
        }
    }
}

/// Function references written into a table at instantiation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElemSegment {
    pub table_var: Var,
    /// Constant expression giving the first table slot.
    pub offset: ExprList,
    pub vars: Vec<Var>,
}

/// Bytes written into a memory at instantiation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSegment {
    pub memory_var: Var,
    pub offset: ExprList,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::binding::Binding;
    use crate::ir::types::Location;

    #[test]
    fn test_signature_equality_is_structural() {
        let a = FuncSignature::new(vec![Type::I32, Type::I32], vec![Type::I32]);
        let b = FuncSignature::new(vec![Type::I32, Type::I32], vec![Type::I32]);
        assert_eq!(a, b);

        let no_result = FuncSignature::new(vec![Type::I32], vec![]);
        let one_result = FuncSignature::new(vec![Type::I32], vec![Type::I32]);
        assert_ne!(no_result, one_result);

        let swapped = FuncSignature::new(vec![Type::I64, Type::I32], vec![]);
        let ordered = FuncSignature::new(vec![Type::I32, Type::I64], vec![]);
        assert_ne!(swapped, ordered);
    }

    #[test]
    fn test_declaration_accessors() {
        let sig = FuncSignature::new(vec![Type::F32, Type::I64], vec![Type::F64]);
        let decl = FuncDeclaration::with_type(Var::name("$t"), sig.clone());
        assert!(decl.has_func_type());
        assert_eq!(decl.num_params(), 2);
        assert_eq!(decl.num_results(), 1);
        assert_eq!(decl.param_type(1), Some(Type::I64));
        assert_eq!(decl.result_type(0), Some(Type::F64));
        assert_eq!(decl.param_type(2), None);

        let inline = FuncDeclaration::with_sig(sig);
        assert!(!inline.has_func_type());
    }

    fn func_with_locals() -> Func {
        let mut func = Func::new(FuncDeclaration::with_sig(FuncSignature::new(
            vec![Type::I32, Type::I64],
            vec![],
        )));
        func.local_types = vec![Type::F32, Type::F64];
        func.param_bindings
            .insert("$p0", Binding::new(Location::default(), 0));
        func.local_bindings
            .insert("$l1", Binding::new(Location::default(), 1));
        func
    }

    #[test]
    fn test_get_local_index() {
        let func = func_with_locals();
        assert_eq!(func.num_params_and_locals(), 4);
        assert_eq!(func.get_local_index(&Var::name("$p0")), 0);
        // Locals are numbered after the params.
        assert_eq!(func.get_local_index(&Var::name("$l1")), 3);
        assert_eq!(func.get_local_index(&Var::index(2)), 2);
        assert_eq!(func.get_local_index(&Var::name("$nope")), INVALID_INDEX);
    }

    #[test]
    fn test_get_local_type() {
        let func = func_with_locals();
        assert_eq!(func.get_local_type(&Var::name("$p0")), Some(Type::I32));
        assert_eq!(func.get_local_type(&Var::index(1)), Some(Type::I64));
        assert_eq!(func.get_local_type(&Var::name("$l1")), Some(Type::F64));
        assert_eq!(func.get_local_type(&Var::index(9)), None);
        assert_eq!(func.get_local_type(&Var::name("$nope")), None);
    }

    #[test]
    fn test_local_names() {
        let func = func_with_locals();
        assert_eq!(func.local_names(), vec![Some("$p0"), None, None, Some("$l1")]);
    }

    #[test]
    fn test_import_kind() {
        let import = Import::new(
            "env",
            "mem",
            ImportKind::Memory(Memory::new(Limits::new(1, Some(2)))),
        );
        assert_eq!(import.external_kind(), ExternalKind::Memory);
        assert_eq!(import.name(), None);

        let func = Func::default().with_name("$log");
        let import = Import::new("env", "log", ImportKind::Func(Box::new(func)));
        assert_eq!(import.external_kind(), ExternalKind::Func);
        assert_eq!(import.name(), Some("$log"));
    }
}
