//! The collaborator interfaces §1 names as out of scope and treats as
//! external: the host type system's hash-consed type cache, method
//! matching, and type intersection, plus the module system's binding
//! tables. The engine only ever calls through this trait; `SimRuntime` is
//! the one implementation in this workspace (§3 SUPPLEMENT).

use crate::ids::{MethodId, MethodInstanceId, MethodTableId, ModuleId, TypeId, TypeNameId};
use crate::method::{CodeInstanceDef, MethodDef, MethodInstanceDef};
use crate::module::ModuleDef;
use crate::types::{MethodTableDef, TypeDef, TypeNameDef};
use precache_common::Symbol;

/// The running process the engine restores state into. Every method here
/// corresponds to a named collaborator in §1 / §4.6.
pub trait Host {
    /// `TypeCache::lookup_or_insert` (§1, §4.6 step 1): canonicalizes a
    /// freshly decoded type against the process-wide hash-consed cache.
    fn lookup_or_insert_type(&mut self, ty: TypeDef) -> TypeId;

    /// Structural lookup without inserting, used to check
    /// `TypeCache::lookup(T) = T` (§8 round-trip property 2).
    fn lookup_type(&self, ty: &TypeDef) -> Option<TypeId>;

    fn type_def(&self, id: TypeId) -> &TypeDef;
    /// Mutable access to an already-canonicalized type, needed only to
    /// patch `field_types`/`super_type` in place once a self-referential
    /// family (e.g. a recursive struct) has been given its id but its body
    /// still points back at itself (§9 "placeholders constructed
    /// uninitialized and filled in place").
    fn type_mut(&mut self, id: TypeId) -> &mut TypeDef;

    /// `method_match(signature, world)` (§1, §4.6 step 5/6): all methods
    /// whose signature intersects `signature` in `world`.
    fn method_match(&self, signature: &[TypeId], world: u64) -> Vec<MethodInstanceId>;

    /// `type_intersection(sig1, sig2)` (§1, §4.6 step 3): used both for the
    /// specialization cache lookup and for computing a callee's match-set.
    fn type_intersection(&self, sig1: &[TypeId], sig2: &[TypeId]) -> bool;

    fn find_module(&self, uuid: (u64, u64)) -> Option<ModuleId>;
    fn find_module_by_path(&self, parent: ModuleId, name: Symbol) -> Option<ModuleId>;
    fn module(&self, id: ModuleId) -> &ModuleDef;
    fn module_mut(&mut self, id: ModuleId) -> &mut ModuleDef;
    fn insert_module(&mut self, module: ModuleDef) -> ModuleId;

    fn method_table(&self, id: MethodTableId) -> &MethodTableDef;
    fn method_table_mut(&mut self, id: MethodTableId) -> &mut MethodTableDef;
    fn insert_method_table(&mut self, table: MethodTableDef) -> MethodTableId;

    /// Look up a method already installed in `table` by `(signature, module, primary_world)`
    /// (§4.6 step 3), without inserting.
    fn find_method(
        &self,
        table: MethodTableId,
        signature: &[TypeId],
        module: ModuleId,
    ) -> Option<MethodId>;
    fn method(&self, id: MethodId) -> &MethodDef;
    fn method_mut(&mut self, id: MethodId) -> &mut MethodDef;
    fn insert_method(&mut self, def: MethodDef) -> MethodId;

    /// Inserts `method` into `table`, tolerating (never panicking on)
    /// dispatch conflicts (§4.6 step 2: "not allowed to crash on conflict").
    fn insert_method_into_table(&mut self, table: MethodTableId, method: MethodId);

    fn method_instance(&self, id: MethodInstanceId) -> &MethodInstanceDef;
    fn method_instance_mut(&mut self, id: MethodInstanceId) -> &mut MethodInstanceDef;
    fn insert_method_instance(&mut self, def: MethodInstanceDef) -> MethodInstanceId;
    /// Total number of method instances the runtime has ever allocated
    /// (`MethodInstanceId`s `0..count` are all valid) — the edge collector
    /// (§4.4) walks every instance's back-edges, not just the worklist's.
    fn method_instance_count(&self) -> u32;
    /// Total number of method tables allocated, for the same reason.
    fn method_table_count(&self) -> u32;
    /// Look up or insert a specialization of `method` for `spec_types` into
    /// its specialization cache (§4.6 step 3).
    fn find_or_insert_specialization(
        &mut self,
        method: MethodId,
        spec_types: &[TypeId],
        def: MethodInstanceDef,
    ) -> MethodInstanceId;

    fn code_instance(&self, id: crate::ids::CodeInstanceId) -> &CodeInstanceDef;
    fn code_instance_mut(&mut self, id: crate::ids::CodeInstanceId) -> &mut CodeInstanceDef;
    fn insert_code_instance(&mut self, def: CodeInstanceDef) -> crate::ids::CodeInstanceId;

    fn type_name(&self, id: TypeNameId) -> &TypeNameDef;
    /// Same placeholder-then-fill need as `type_mut`: a type-name's
    /// `primary_wrapper` is itself a type whose fields reference the
    /// type-name back, so the type-name has to exist before its own
    /// wrapper can be built.
    fn type_name_mut(&mut self, id: TypeNameId) -> &mut TypeNameDef;
    fn insert_type_name(&mut self, def: TypeNameDef) -> TypeNameId;
    fn find_type_name(&self, module: ModuleId, name: Symbol) -> Option<TypeNameId>;

    fn world(&self) -> &crate::world::WorldCounter;
    fn gc(&self) -> &crate::gc::GcState;

    /// User-callable preference-hash computation (§6 dependency_block
    /// "preferences_hash"); the only points besides `unique_deps` at which
    /// runtime code runs at the deserializer's (temporarily advanced)
    /// world (§5 "Suspension points").
    fn preferences_hash(&self) -> u64;
}
