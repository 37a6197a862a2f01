use precache_common::intern;
use precache_host::{
    Host, ModuleDef, SimRuntime, TypeDef, TypeFlags, TypeNameDef, TypeNameFlags,
};

fn int64_type(rt: &mut SimRuntime) -> precache_host::TypeId {
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
    rt.lookup_or_insert_type(TypeDef {
        type_name: name,
        parameters: vec![],
        super_type: None,
        field_types: vec![],
        layout: None,
        singleton: false,
        flags: TypeFlags::CONCRETE,
        hash: 0,
    })
}

#[test]
fn hash_consing_returns_same_id_for_structurally_equal_types() {
    let mut rt = SimRuntime::new(0);
    let a = int64_type(&mut rt);
    // Re-derive the same structural key through a second lookup_or_insert.
    let ty = rt.type_def(a).clone();
    let b = rt.lookup_or_insert_type(ty);
    assert_eq!(a, b, "two structurally equal types must be the same object");
}

#[test]
fn method_match_filters_by_signature() {
    use precache_host::MethodInstanceDef;

    let mut rt = SimRuntime::new(0);
    let int64 = int64_type(&mut rt);
    let mi = rt.insert_method_instance(MethodInstanceDef {
        method: None,
        spec_types: vec![int64],
        sparam_values: vec![],
        backedges: vec![],
        code: None,
    });

    let matches = rt.method_match(&[int64], 0);
    assert_eq!(matches, vec![mi]);

    let empty_sig: Vec<precache_host::TypeId> = vec![];
    assert!(rt.method_match(&empty_sig, 0).is_empty());
}

#[test]
fn module_round_trip_by_uuid() {
    let mut rt = SimRuntime::new(0);
    let uuid = (42, 7);
    let id = rt.insert_module(ModuleDef::new(intern("precache_host_test_mod"), None, uuid, 1));
    assert_eq!(rt.find_module(uuid), Some(id));
    assert_eq!(rt.module(id).name.as_str().as_ref(), "precache_host_test_mod");
}
