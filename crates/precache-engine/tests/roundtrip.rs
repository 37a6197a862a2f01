//! End-to-end save/restore scenarios against two independent `SimRuntime`
//! instances, exercising `CacheEngine::save_incremental`/
//! `restore_incremental` as a black box: every assertion here goes through
//! `Host` queries on the restoring runtime, never through a position or id
//! that only the engine's internals see.
//!
//! The two runtimes never share an `Arena`, so ids never compare equal
//! across them — what they do share is the process-wide `Symbol` interner
//! and the external module/type-name identifiers a fixture helper installs
//! identically on both sides, which is exactly how a real worker and a
//! real restoring process agree on what "Base.Int64" means.

use precache_common::{intern, CacheError};
use precache_engine::CacheEngine;
use precache_host::{
    Binding, BindingFlags, CodeInstanceDef, Host, MethodDef, MethodFlags, MethodInstanceDef,
    MethodTableDef, ModuleDef, ObjectRef, Relocatability, SimRuntime, TypeDef, TypeFlags, TypeId,
    TypeNameDef, TypeNameFlags, WORLD_INFINITY,
};

fn identity() -> precache_engine::PlatformBanner {
    precache_format::RuntimeIdentity {
        pointer_size: 8,
        platform_uname: "Linux".into(),
        platform_arch: "x86_64".into(),
        runtime_version: "1.0.0".into(),
        build_branch: "main".into(),
        build_commit: "cafef00d".into(),
    }
}

/// Installs the same external `Base.Int64` that every fixture below relies
/// on to resolve a signature type across two independent runtimes.
fn base_runtime_with_int64(rt: &mut SimRuntime) -> (precache_host::ModuleId, TypeId) {
    let module = rt.insert_module(ModuleDef::new(intern("Base"), None, (1, 0), 1));
    let name = rt.insert_type_name(TypeNameDef {
        module,
        name: intern("Int64"),
        internal: false,
        field_names: vec![],
        primary_wrapper: None,
        method_table: None,
        hash: 0,
        flags: TypeNameFlags::empty(),
        max_methods: 0,
        uninitialized_count: 0,
        atomic_fields: 0,
        const_fields: 0,
    });
    let ty = rt.lookup_or_insert_type(TypeDef {
        type_name: name,
        parameters: vec![],
        super_type: None,
        field_types: vec![],
        layout: None,
        singleton: false,
        flags: TypeFlags::CONCRETE,
        hash: 0,
    });
    (module, ty)
}

#[test]
fn identity_round_trip_preserves_chain_and_applies_world_rule() {
    let mut save_rt = SimRuntime::new(5);
    let (_, int64) = base_runtime_with_int64(&mut save_rt);

    let a_mod = save_rt.insert_module(ModuleDef::new(intern("A"), None, (10, 0), 1));
    let table = save_rt.insert_method_table(MethodTableDef::default());
    let method = save_rt.insert_method(MethodDef {
        module: a_mod,
        owner_table: table,
        name: intern("f"),
        signature: vec![int64],
        specializations: vec![],
        roots: vec![],
        file: intern("a.jl"),
        line: 1,
        nargs: 1,
        flags: MethodFlags::empty(),
    });
    save_rt.insert_method_into_table(table, method);

    let mi = save_rt.insert_method_instance(MethodInstanceDef {
        method: Some(method),
        spec_types: vec![int64],
        sparam_values: vec![],
        backedges: vec![],
        code: None,
    });
    save_rt.method_mut(method).specializations.push(mi);

    let code = save_rt.insert_code_instance(CodeInstanceDef {
        def: mi,
        min_world: 0,
        max_world: WORLD_INFINITY,
        inferred: Some(vec![1, 2, 3]),
        rettype: int64,
        relocatability: Relocatability::Relocatable,
        validate: false,
        cacheable: true,
        next: None,
    });
    save_rt.method_instance_mut(mi).code = Some(code);

    save_rt.module_mut(a_mod).set_binding(Binding {
        name: intern("f"),
        value: Some(ObjectRef::Method(method)),
        owner: a_mod,
        flags: BindingFlags::CONSTANT,
        ty: None,
    });

    let identity = identity();
    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("identity.precache");

    let mut save_engine = CacheEngine::new();
    save_engine
        .save_incremental(&save_rt, &[a_mod], &identity, &path)
        .expect("save_incremental");

    let mut restore_rt = SimRuntime::new(49);
    base_runtime_with_int64(&mut restore_rt);
    let mut restore_engine = CacheEngine::new();
    let report = restore_engine
        .restore_incremental(&mut restore_rt, &path, &identity)
        .expect("restore_incremental");

    assert_eq!(report.restored_modules.len(), 1);
    assert_eq!(report.init_order, report.restored_modules);
    let restored_mod = report.restored_modules[0];
    assert_eq!(restore_rt.module(restored_mod).name.as_str().as_ref(), "A");

    let binding = restore_rt
        .module(restored_mod)
        .bindings
        .get(&intern("f"))
        .expect("binding f was restored");
    let Some(ObjectRef::Method(restored_method)) = binding.value else {
        panic!("binding f did not resolve to a method");
    };
    assert_eq!(restore_rt.method(restored_method).name.as_str().as_ref(), "f");

    let restored_mi = restore_rt.method(restored_method).specializations[0];
    let restored_code = restore_rt
        .method_instance(restored_mi)
        .code
        .expect("specialization kept its code instance");
    let ci = restore_rt.code_instance(restored_code);

    let restored_world = restore_rt.world().current();
    assert_eq!(
        ci.min_world, restored_world,
        "a code instance saved with validate=false re-takes the restoring world as its min_world"
    );
    assert_eq!(ci.max_world, WORLD_INFINITY);
    assert_eq!(ci.inferred.as_deref(), Some(&[1u8, 2, 3][..]));
}

/// Shared setup for both external-edge scenarios: worklist module `B`
/// defines `g`, which calls external (module `A`, not in the worklist)
/// method `f`. `f`'s method instance lists `g`'s as a back-edge, which is
/// how the edge collector discovers the call at all.
struct ExternalEdgeFixture {
    save_rt: SimRuntime,
    b_mod: precache_host::ModuleId,
    g_code_max_world: u64,
    path: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

fn build_external_edge_fixture() -> ExternalEdgeFixture {
    let mut save_rt = SimRuntime::new(5);
    let (_, int64) = base_runtime_with_int64(&mut save_rt);

    let a_mod = save_rt.insert_module(ModuleDef::new(intern("A"), None, (20, 0), 1));
    let table_a = save_rt.insert_method_table(MethodTableDef::default());
    let f_method = save_rt.insert_method(MethodDef {
        module: a_mod,
        owner_table: table_a,
        name: intern("f"),
        signature: vec![int64],
        specializations: vec![],
        roots: vec![],
        file: intern("a.jl"),
        line: 1,
        nargs: 1,
        flags: MethodFlags::empty(),
    });
    save_rt.insert_method_into_table(table_a, f_method);
    let f_mi = save_rt.insert_method_instance(MethodInstanceDef {
        method: Some(f_method),
        spec_types: vec![int64],
        sparam_values: vec![],
        backedges: vec![],
        code: None,
    });

    let b_mod = save_rt.insert_module(ModuleDef::new(intern("B"), None, (21, 0), 1));
    let table_b = save_rt.insert_method_table(MethodTableDef::default());
    let g_method = save_rt.insert_method(MethodDef {
        module: b_mod,
        owner_table: table_b,
        name: intern("g"),
        signature: vec![],
        specializations: vec![],
        roots: vec![],
        file: intern("b.jl"),
        line: 1,
        nargs: 0,
        flags: MethodFlags::empty(),
    });
    save_rt.insert_method_into_table(table_b, g_method);
    let g_mi = save_rt.insert_method_instance(MethodInstanceDef {
        method: Some(g_method),
        spec_types: vec![],
        sparam_values: vec![],
        backedges: vec![],
        code: None,
    });
    save_rt.method_mut(g_method).specializations.push(g_mi);
    save_rt.method_instance_mut(f_mi).backedges.push(g_mi);

    let g_code_max_world = 777;
    let g_code = save_rt.insert_code_instance(CodeInstanceDef {
        def: g_mi,
        min_world: 0,
        max_world: g_code_max_world,
        inferred: Some(vec![9]),
        rettype: int64,
        relocatability: Relocatability::Relocatable,
        validate: false,
        cacheable: true,
        next: None,
    });
    save_rt.method_instance_mut(g_mi).code = Some(g_code);

    save_rt.module_mut(b_mod).set_binding(Binding {
        name: intern("g"),
        value: Some(ObjectRef::Method(g_method)),
        owner: b_mod,
        flags: BindingFlags::CONSTANT,
        ty: None,
    });

    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("edge.precache");
    let mut engine = CacheEngine::new();
    engine
        .save_incremental(&save_rt, &[b_mod], &identity(), &path)
        .expect("save_incremental");

    ExternalEdgeFixture {
        save_rt,
        b_mod,
        g_code_max_world,
        path,
        _dir: dir,
    }
}

fn restored_g_code(restore_rt: &SimRuntime, restored_mod: precache_host::ModuleId) -> precache_host::CodeInstanceDef {
    let binding = restore_rt
        .module(restored_mod)
        .bindings
        .get(&intern("g"))
        .expect("binding g was restored");
    let Some(ObjectRef::Method(restored_method)) = binding.value else {
        panic!("binding g did not resolve to a method");
    };
    let restored_mi = restore_rt.method(restored_method).specializations[0];
    let restored_code = restore_rt
        .method_instance(restored_mi)
        .code
        .expect("g's specialization kept its code instance");
    restore_rt.code_instance(restored_code).clone()
}

#[test]
fn external_edge_valid_promotes_caller_to_infinite_max_world() {
    let fixture = build_external_edge_fixture();
    let _ = &fixture.save_rt;

    let mut restore_rt = SimRuntime::new(100);
    base_runtime_with_int64(&mut restore_rt);
    restore_rt.insert_module(ModuleDef::new(intern("A"), None, (20, 0), 1));

    let mut engine = CacheEngine::new();
    let report = engine
        .restore_incremental(&mut restore_rt, &fixture.path, &identity())
        .expect("restore_incremental");
    let restored_mod = report
        .restored_modules
        .iter()
        .copied()
        .find(|&m| restore_rt.module(m).name == intern("B"))
        .expect("B was restored");

    let ci = restored_g_code(&restore_rt, restored_mod);
    assert_eq!(
        ci.max_world, WORLD_INFINITY,
        "the only match for f's signature on the restoring side is the freshly materialized stub, so the edge verifies"
    );
    assert!(ci.max_world > fixture.g_code_max_world);
}

#[test]
fn external_edge_invalidated_leaves_caller_world_bound_stale() {
    let fixture = build_external_edge_fixture();
    let _ = &fixture.b_mod;

    let mut restore_rt = SimRuntime::new(100);
    let (_, int64) = base_runtime_with_int64(&mut restore_rt);
    restore_rt.insert_module(ModuleDef::new(intern("A"), None, (20, 0), 1));

    // A competing method instance with `f`'s exact signature, already
    // present before the cache loads: the live match-set for that
    // signature now diverges from what was cached at save time, so the
    // edge must be rejected rather than promoted.
    restore_rt.insert_method_instance(MethodInstanceDef {
        method: None,
        spec_types: vec![int64],
        sparam_values: vec![],
        backedges: vec![],
        code: None,
    });

    let mut engine = CacheEngine::new();
    let report = engine
        .restore_incremental(&mut restore_rt, &fixture.path, &identity())
        .expect("restore_incremental");
    let restored_mod = report
        .restored_modules
        .iter()
        .copied()
        .find(|&m| restore_rt.module(m).name == intern("B"))
        .expect("B was restored");

    let ci = restored_g_code(&restore_rt, restored_mod);
    assert_eq!(
        ci.max_world, fixture.g_code_max_world,
        "a diverged match-set must leave the caller's code instance un-promoted"
    );
}

/// A self-referential type-name (its own `primary_wrapper` points back at
/// the type it names) must resolve without infinite recursion and settle
/// on one consistent id, the same way a recursive struct's own field would.
#[test]
fn cyclic_type_reference_resolves_to_one_consistent_type() {
    let mut save_rt = SimRuntime::new(1);
    let (_, int64) = base_runtime_with_int64(&mut save_rt);

    let a_mod = save_rt.insert_module(ModuleDef::new(intern("A"), None, (30, 0), 1));
    let node_name = save_rt.insert_type_name(TypeNameDef {
        module: a_mod,
        name: intern("Node"),
        internal: true,
        field_names: vec![intern("next")],
        primary_wrapper: None,
        method_table: None,
        hash: 7,
        flags: TypeNameFlags::MUTABLE,
        max_methods: 0,
        uninitialized_count: 0,
        atomic_fields: 0,
        const_fields: 0,
    });
    let node_ty = save_rt.lookup_or_insert_type(TypeDef {
        type_name: node_name,
        parameters: vec![],
        super_type: None,
        field_types: vec![],
        layout: None,
        singleton: false,
        flags: TypeFlags::empty(),
        hash: 7,
    });
    // Close both cycles: the type-name's primary wrapper is the type
    // itself, and the type's one field is itself (a self-referential
    // linked node).
    save_rt.type_name_mut(node_name).primary_wrapper = Some(node_ty);
    {
        let def = save_rt.type_mut(node_ty);
        def.field_types = vec![node_ty];
        def.super_type = Some(int64);
    }

    let table = save_rt.insert_method_table(MethodTableDef::default());
    let method = save_rt.insert_method(MethodDef {
        module: a_mod,
        owner_table: table,
        name: intern("make_node"),
        signature: vec![node_ty],
        specializations: vec![],
        roots: vec![],
        file: intern("a.jl"),
        line: 1,
        nargs: 1,
        flags: MethodFlags::empty(),
    });
    save_rt.insert_method_into_table(table, method);
    save_rt.module_mut(a_mod).set_binding(Binding {
        name: intern("make_node"),
        value: Some(ObjectRef::Method(method)),
        owner: a_mod,
        flags: BindingFlags::CONSTANT,
        ty: None,
    });

    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("cyclic.precache");
    let mut save_engine = CacheEngine::new();
    save_engine
        .save_incremental(&save_rt, &[a_mod], &identity(), &path)
        .expect("save_incremental");

    let mut restore_rt = SimRuntime::new(1);
    base_runtime_with_int64(&mut restore_rt);
    let mut restore_engine = CacheEngine::new();
    let report = restore_engine
        .restore_incremental(&mut restore_rt, &path, &identity())
        .expect("restore_incremental");

    let restored_mod = report.restored_modules[0];
    let binding = restore_rt
        .module(restored_mod)
        .bindings
        .get(&intern("make_node"))
        .expect("binding make_node was restored");
    let Some(ObjectRef::Method(restored_method)) = binding.value else {
        panic!("binding make_node did not resolve to a method");
    };
    let restored_sig = restore_rt.method(restored_method).signature.clone();
    assert_eq!(restored_sig.len(), 1);
    let restored_ty = restored_sig[0];

    let def = restore_rt.type_def(restored_ty);
    assert_eq!(
        def.field_types,
        vec![restored_ty],
        "the self-referential field must resolve to the same id as the type itself"
    );
    let restored_name_id = def.type_name;
    assert_eq!(
        restore_rt.type_name(restored_name_id).primary_wrapper,
        Some(restored_ty),
        "the type-name's own wrapper must also close back onto the same type id"
    );
}

/// Two bindings that both reference the same singleton type must
/// materialize to one identical object, not two independently restored
/// copies — the shared backref position is what `Encoder` collapses both
/// references onto during save.
#[test]
fn singleton_uniqueness_across_two_bindings() {
    let mut save_rt = SimRuntime::new(1);
    base_runtime_with_int64(&mut save_rt);

    let a_mod = save_rt.insert_module(ModuleDef::new(intern("A"), None, (40, 0), 1));
    let nothing_name = save_rt.insert_type_name(TypeNameDef {
        module: a_mod,
        name: intern("Nothing"),
        internal: true,
        field_names: vec![],
        primary_wrapper: None,
        method_table: None,
        hash: 0,
        flags: TypeNameFlags::empty(),
        max_methods: 0,
        uninitialized_count: 0,
        atomic_fields: 0,
        const_fields: 0,
    });
    let nothing_ty = save_rt.lookup_or_insert_type(TypeDef {
        type_name: nothing_name,
        parameters: vec![],
        super_type: None,
        field_types: vec![],
        layout: None,
        singleton: true,
        flags: TypeFlags::CONCRETE | TypeFlags::HAS_INSTANCE,
        hash: 0,
    });

    save_rt.module_mut(a_mod).set_binding(Binding {
        name: intern("first"),
        value: Some(ObjectRef::Type(nothing_ty)),
        owner: a_mod,
        flags: BindingFlags::CONSTANT,
        ty: None,
    });
    save_rt.module_mut(a_mod).set_binding(Binding {
        name: intern("second"),
        value: Some(ObjectRef::Type(nothing_ty)),
        owner: a_mod,
        flags: BindingFlags::CONSTANT,
        ty: None,
    });

    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("singleton.precache");
    let mut save_engine = CacheEngine::new();
    save_engine
        .save_incremental(&save_rt, &[a_mod], &identity(), &path)
        .expect("save_incremental");

    let mut restore_rt = SimRuntime::new(1);
    base_runtime_with_int64(&mut restore_rt);
    let mut restore_engine = CacheEngine::new();
    let report = restore_engine
        .restore_incremental(&mut restore_rt, &path, &identity())
        .expect("restore_incremental");

    let restored_mod = report.restored_modules[0];
    let module = restore_rt.module(restored_mod);
    let Some(ObjectRef::Type(first)) = module.bindings.get(&intern("first")).unwrap().value else {
        panic!("binding first did not resolve to a type");
    };
    let Some(ObjectRef::Type(second)) = module.bindings.get(&intern("second")).unwrap().value else {
        panic!("binding second did not resolve to a type");
    };
    assert_eq!(first, second, "both bindings must share the one restored singleton type id");
    assert!(restore_rt.type_def(first).singleton);
}

#[test]
fn header_rejection_reports_incompatible_identity() {
    let mut save_rt = SimRuntime::new(1);
    let a_mod = save_rt.insert_module(ModuleDef::new(intern("A"), None, (50, 0), 1));

    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("header.precache");
    let mut save_engine = CacheEngine::new();
    save_engine
        .save_incremental(&save_rt, &[a_mod], &identity(), &path)
        .expect("save_incremental");

    let mut mismatched = identity();
    mismatched.runtime_version = "2.0.0".into();

    let mut restore_rt = SimRuntime::new(1);
    let mut restore_engine = CacheEngine::new();
    let err = restore_engine
        .restore_incremental(&mut restore_rt, &path, &mismatched)
        .expect_err("a runtime-version mismatch must be rejected before any module is touched");
    assert!(matches!(err, CacheError::HeaderIncompatible(_)));

    let bytes = std::fs::read(&path).expect("read saved cache file");
    assert!(!CacheEngine::read_verify_header(&bytes, &mismatched).expect("read_verify_header"));
    assert!(CacheEngine::read_verify_header(&bytes, &identity()).expect("read_verify_header"));
}
