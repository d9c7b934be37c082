//! Integration tests for the module aggregate.
//!
//! These build modules field by field, the way a text reader would, and check
//! that order, index spaces and name lookups stay consistent.

use wasm_ir::ir::*;

fn field(kind: impl Into<ModuleFieldKind>) -> ModuleField {
    ModuleField::new(Location::default(), kind)
}

fn named_func(name: &str) -> Func {
    Func::default().with_name(name)
}

fn named_global(name: &str, ty: Type) -> Global {
    let mut global = Global::new(ty, false, vec![Expr::const_(Const::i32(0))]);
    global.name = Some(name.to_string());
    global
}

fn named_memory(name: &str) -> Memory {
    let mut memory = Memory::new(Limits::new(1, Some(2)));
    memory.name = Some(name.to_string());
    memory
}

#[test]
fn test_append_preserves_order() {
    let mut module = Module::new();
    let fields = vec![
        field(FuncType::new(FuncSignature::default())),
        field(named_memory("$mem")),
        field(named_func("$f")),
        field(Export::new("f", ExternalKind::Func, Var::name("$f"))),
        field(named_global("$g", Type::I32)),
        field(DataSegment::default()),
        ModuleField::new(Location::default(), ModuleFieldKind::Start(Var::index(0))),
    ];
    let expected: Vec<_> = fields.iter().map(ModuleField::ty).collect();

    module.append_fields(fields);

    let actual: Vec<_> = module.fields().iter().map(ModuleField::ty).collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_append_returns_field_position() {
    let mut module = Module::new();
    assert_eq!(module.append_field(field(named_func("$a"))), 0);
    assert_eq!(module.append_field(field(named_global("$g", Type::I64))), 1);
    assert_eq!(module.append_field(field(named_func("$b"))), 2);
    // Field positions differ from per-kind indices.
    assert_eq!(module.get_func_index(&Var::name("$b")), 1);
}

#[test]
fn test_index_coherence_across_kinds() {
    let mut module = Module::new();
    let names = ["$zero", "$one", "$two"];
    for name in names {
        module.append_field(field(named_func(name)));
        module.append_field(field(named_global(name, Type::F32)));
        module.append_field(field(named_memory(name)));
    }

    for (i, name) in names.iter().enumerate() {
        let i = i as Index;
        let by_name = Var::name(*name);
        let by_index = Var::index(i);

        assert_eq!(module.get_func_index(&by_name), i);
        assert_eq!(module.get_global_index(&by_name), i);
        assert_eq!(module.get_memory_index(&by_name), i);

        let func = module.get_func(&by_name).map(|f| f.name.clone());
        assert_eq!(func, module.get_func(&by_index).map(|f| f.name.clone()));
        let global = module.get_global(&by_name).map(|g| g.name.clone());
        assert_eq!(global, module.get_global(&by_index).map(|g| g.name.clone()));
        let memory = module.get_memory(&by_name).map(|m| m.name.clone());
        assert_eq!(memory, module.get_memory(&by_index).map(|m| m.name.clone()));
    }

    let iterated: Vec<_> = module.funcs().filter_map(|f| f.name.as_deref()).collect();
    assert_eq!(iterated, names);
}

#[test]
fn test_imports_and_definitions_share_index_space() {
    let mut module = Module::new();
    let mut imported = Func::default().with_name("$print");
    imported.decl = FuncDeclaration::with_sig(FuncSignature::new(vec![Type::I32], vec![]));
    module.append_field(field(Import::new(
        "spectest",
        "print_i32",
        ImportKind::Func(Box::new(imported)),
    )));
    module.append_field(field(named_func("$main")));

    assert_eq!(module.num_func_imports(), 1);
    assert_eq!(module.get_func_index(&Var::name("$print")), 0);
    assert_eq!(module.get_func_index(&Var::name("$main")), 1);
    assert_eq!(module.get_func(&Var::index(0)).map(|f| f.num_params()), Some(1));

    let import = module.import(0).expect("import should be recorded");
    assert_eq!(import.module_name, "spectest");
    assert_eq!(import.external_kind(), ExternalKind::Func);
}

#[test]
fn test_duplicate_name_last_definition_wins() {
    let mut module = Module::new();
    module.append_field(field(named_func("$f")));
    module.append_field(field(named_func("$f")));

    assert_eq!(module.num_funcs(), 2);
    assert_eq!(module.get_func_index(&Var::name("$f")), 1);
    // The earlier definition keeps its slot.
    assert!(module.get_func(&Var::index(0)).is_some());

    let duplicates: Vec<_> = module.bindings().funcs.duplicates().collect();
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].1.len(), 2);
}

#[test]
fn test_structural_signature_equality() {
    let a = FuncSignature::new(vec![Type::I32, Type::I64], vec![Type::F32]);
    let b = FuncSignature::new(vec![Type::I32, Type::I64], vec![Type::F32]);
    let swapped = FuncSignature::new(vec![Type::I64, Type::I32], vec![Type::F32]);
    let fewer_results = FuncSignature::new(vec![Type::I32, Type::I64], vec![]);

    assert_eq!(a, b);
    assert_ne!(a, swapped);
    assert_ne!(a, fewer_results);
}

#[test]
fn test_ensure_func_type_deduplicates() {
    let mut module = Module::new();
    let unary = FuncSignature::new(vec![Type::I32], vec![Type::I32]);
    let binary = FuncSignature::new(vec![Type::I32, Type::I32], vec![Type::I32]);

    assert_eq!(module.get_func_type_index_by_sig(&unary), INVALID_INDEX);

    let first = module.ensure_func_type(Location::default(), &unary);
    let second = module.ensure_func_type(Location::default(), &binary);
    let again = module.ensure_func_type(Location::default(), &unary);

    assert_eq!(first, 0);
    assert_eq!(second, 1);
    assert_eq!(again, first);
    assert_eq!(module.num_func_types(), 2);
    assert_eq!(module.get_func_type_index_by_sig(&binary), 1);

    // An explicit append does not deduplicate.
    let dup = module.append_implicit_func_type(Location::default(), unary.clone());
    assert_eq!(dup, 2);
    assert_eq!(module.get_func_type_index_by_sig(&unary), 0);
}

#[test]
fn test_unresolved_names_yield_invalid_index() {
    let mut module = Module::new();
    module.append_field(field(named_func("$f")));

    let missing = Var::name("$nope");
    assert_eq!(module.get_func_index(&missing), INVALID_INDEX);
    assert_eq!(module.get_global_index(&missing), INVALID_INDEX);
    assert_eq!(module.get_table_index(&missing), INVALID_INDEX);
    assert_eq!(module.get_memory_index(&missing), INVALID_INDEX);
    assert_eq!(module.get_except_index(&missing), INVALID_INDEX);
    assert_eq!(module.get_func_type_index(&missing), INVALID_INDEX);

    assert!(module.get_func(&missing).is_none());
    assert!(module.get_func_type(&missing).is_none());
    assert!(module.get_except(&missing).is_none());
    assert!(module.get_export("nope").is_none());

    // Index vars pass through unchecked, but getters bounds-check.
    assert_eq!(module.get_func_index(&Var::index(7)), 7);
    assert!(module.get_func(&Var::index(7)).is_none());
}

#[test]
fn test_exceptions_and_tables() {
    let mut module = Module::new();
    let mut except = Exception::new(vec![Type::I32, Type::F64]);
    except.name = Some("$e".to_string());
    module.append_field(field(except));

    let mut table = Table::new(Limits::new(4, None));
    table.name = Some("$t".to_string());
    module.append_field(field(table));
    module.append_field(field(ElemSegment {
        table_var: Var::name("$t"),
        offset: vec![Expr::const_(Const::i32(0))],
        vars: vec![Var::index(0)],
    }));

    assert_eq!(module.get_except(&Var::name("$e")).map(|e| e.sig.len()), Some(2));
    let table = module.get_table(&Var::name("$t")).expect("table should resolve");
    assert_eq!(table.elem_type, Type::Funcref);
    assert_eq!(table.elem_limits.initial, 4);

    let segment = module.elem_segments().next().expect("one segment");
    assert_eq!(module.get_table_index(&segment.table_var), 0);
}
