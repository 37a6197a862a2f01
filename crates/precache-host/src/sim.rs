//! An in-memory stand-in for "the running process" (SPEC_FULL §3
//! SUPPLEMENT). Exact nominal signature matching only — no variance or
//! generic-bound resolution — since reproducing a full type system's
//! `method_match` is out of scope per §1.

use crate::arena::Arena;
use crate::gc::GcState;
use crate::host::Host;
use crate::ids::{
    CodeInstanceId, MethodId, MethodInstanceId, MethodTableId, ModuleId, TypeId, TypeNameId,
};
use crate::method::{CodeInstanceDef, MethodDef, MethodInstanceDef};
use crate::module::ModuleDef;
use crate::types::{MethodTableDef, TypeDef, TypeNameDef, TypeStructuralKey};
use crate::world::WorldCounter;
use precache_common::Symbol;
use rustc_hash::FxHashMap;

#[derive(Default)]
pub struct SimRuntime {
    types: Arena<TypeId, TypeDef>,
    type_cache: FxHashMap<TypeStructuralKey, TypeId>,
    type_names: Arena<TypeNameId, TypeNameDef>,
    type_name_index: FxHashMap<(ModuleId, Symbol), TypeNameId>,
    method_tables: Arena<MethodTableId, MethodTableDef>,
    methods: Arena<MethodId, MethodDef>,
    method_instances: Arena<MethodInstanceId, MethodInstanceDef>,
    code_instances: Arena<CodeInstanceId, CodeInstanceDef>,
    modules: Arena<ModuleId, ModuleDef>,
    module_by_uuid: FxHashMap<(u64, u64), ModuleId>,
    world: WorldCounter,
    gc: GcState,
}

impl SimRuntime {
    pub fn new(initial_world: u64) -> Self {
        Self {
            world: WorldCounter::new(initial_world),
            ..Default::default()
        }
    }

    pub fn types_len(&self) -> usize {
        self.types.len()
    }
}

fn signatures_intersect(a: &[TypeId], b: &[TypeId]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

impl Host for SimRuntime {
    fn lookup_or_insert_type(&mut self, ty: TypeDef) -> TypeId {
        let key = ty.structural_key();
        if let Some(&id) = self.type_cache.get(&key) {
            return id;
        }
        let id = self.types.insert(ty);
        self.type_cache.insert(key, id);
        id
    }

    fn lookup_type(&self, ty: &TypeDef) -> Option<TypeId> {
        self.type_cache.get(&ty.structural_key()).copied()
    }

    fn type_def(&self, id: TypeId) -> &TypeDef {
        self.types.get(id).expect("dangling TypeId")
    }

    fn type_mut(&mut self, id: TypeId) -> &mut TypeDef {
        self.types.get_mut(id).expect("dangling TypeId")
    }

    fn method_match(&self, signature: &[TypeId], _world: u64) -> Vec<MethodInstanceId> {
        // Nominal signature matching only (no per-world insertion/deletion
        // tracking in this simulated runtime — see module doc comment).
        self.method_instances
            .iter()
            .filter(|(_, mi)| signatures_intersect(&mi.spec_types, signature))
            .map(|(id, _)| id)
            .collect()
    }

    fn type_intersection(&self, sig1: &[TypeId], sig2: &[TypeId]) -> bool {
        signatures_intersect(sig1, sig2)
    }

    fn find_module(&self, uuid: (u64, u64)) -> Option<ModuleId> {
        self.module_by_uuid.get(&uuid).copied()
    }

    fn find_module_by_path(&self, parent: ModuleId, name: Symbol) -> Option<ModuleId> {
        self.modules
            .get(parent)
            .and_then(|m| m.children.iter().find(|&&c| self.modules.get(c).map(|m| m.name) == Some(name)))
            .copied()
    }

    fn module(&self, id: ModuleId) -> &ModuleDef {
        self.modules.get(id).expect("dangling ModuleId")
    }

    fn module_mut(&mut self, id: ModuleId) -> &mut ModuleDef {
        self.modules.get_mut(id).expect("dangling ModuleId")
    }

    fn insert_module(&mut self, module: ModuleDef) -> ModuleId {
        let uuid = module.uuid;
        let id = self.modules.insert(module);
        self.module_by_uuid.insert(uuid, id);
        id
    }

    fn method_table(&self, id: MethodTableId) -> &MethodTableDef {
        self.method_tables.get(id).expect("dangling MethodTableId")
    }

    fn method_table_mut(&mut self, id: MethodTableId) -> &mut MethodTableDef {
        self.method_tables
            .get_mut(id)
            .expect("dangling MethodTableId")
    }

    fn insert_method_table(&mut self, table: MethodTableDef) -> MethodTableId {
        self.method_tables.insert(table)
    }

    fn find_method(
        &self,
        table: MethodTableId,
        signature: &[TypeId],
        _module: ModuleId,
    ) -> Option<MethodId> {
        self.method_table(table)
            .defs
            .iter()
            .copied()
            .find(|&m| signatures_intersect(&self.method(m).signature, signature))
    }

    fn method(&self, id: MethodId) -> &MethodDef {
        self.methods.get(id).expect("dangling MethodId")
    }

    fn method_mut(&mut self, id: MethodId) -> &mut MethodDef {
        self.methods.get_mut(id).expect("dangling MethodId")
    }

    fn insert_method(&mut self, def: MethodDef) -> MethodId {
        self.methods.insert(def)
    }

    fn insert_method_into_table(&mut self, table: MethodTableId, method: MethodId) {
        if let Some(t) = self.method_tables.get_mut(table) {
            if !t.defs.contains(&method) {
                t.defs.push(method);
            }
        }
    }

    fn method_instance(&self, id: MethodInstanceId) -> &MethodInstanceDef {
        self.method_instances
            .get(id)
            .expect("dangling MethodInstanceId")
    }

    fn method_instance_mut(&mut self, id: MethodInstanceId) -> &mut MethodInstanceDef {
        self.method_instances
            .get_mut(id)
            .expect("dangling MethodInstanceId")
    }

    fn insert_method_instance(&mut self, def: MethodInstanceDef) -> MethodInstanceId {
        self.method_instances.insert(def)
    }

    fn method_instance_count(&self) -> u32 {
        self.method_instances.len() as u32
    }

    fn method_table_count(&self) -> u32 {
        self.method_tables.len() as u32
    }

    fn find_or_insert_specialization(
        &mut self,
        method: MethodId,
        spec_types: &[TypeId],
        def: MethodInstanceDef,
    ) -> MethodInstanceId {
        if let Some(&existing) = self.method(method).specializations.iter().find(|&&mi| {
            signatures_intersect(&self.method_instance(mi).spec_types, spec_types)
        }) {
            return existing;
        }
        let id = self.method_instances.insert(def);
        self.method_mut(method).specializations.push(id);
        id
    }

    fn code_instance(&self, id: CodeInstanceId) -> &CodeInstanceDef {
        self.code_instances.get(id).expect("dangling CodeInstanceId")
    }

    fn code_instance_mut(&mut self, id: CodeInstanceId) -> &mut CodeInstanceDef {
        self.code_instances
            .get_mut(id)
            .expect("dangling CodeInstanceId")
    }

    fn insert_code_instance(&mut self, def: CodeInstanceDef) -> CodeInstanceId {
        self.code_instances.insert(def)
    }

    fn type_name(&self, id: TypeNameId) -> &TypeNameDef {
        self.type_names.get(id).expect("dangling TypeNameId")
    }

    fn type_name_mut(&mut self, id: TypeNameId) -> &mut TypeNameDef {
        self.type_names.get_mut(id).expect("dangling TypeNameId")
    }

    fn insert_type_name(&mut self, def: TypeNameDef) -> TypeNameId {
        let key = (def.module, def.name);
        let id = self.type_names.insert(def);
        self.type_name_index.insert(key, id);
        id
    }

    fn find_type_name(&self, module: ModuleId, name: Symbol) -> Option<TypeNameId> {
        self.type_name_index.get(&(module, name)).copied()
    }

    fn world(&self) -> &WorldCounter {
        &self.world
    }

    fn gc(&self) -> &GcState {
        &self.gc
    }

    fn preferences_hash(&self) -> u64 {
        // A stable, deterministic stand-in: the count of loaded modules.
        // Real preference hashing is user-callable host code (§6) and out
        // of scope for this workspace.
        self.modules.len() as u64
    }
}
