//! §4.6 passes 1/3 (type and method/method-instance recaching) and the
//! uniquing table they share. Every `resolve_*` function is memoized by
//! backref [`Position`] in `resolved`, and inserts its own placeholder id
//! into that map *before* recursing into fields that might reference the
//! same position again — that ordering is what lets a cyclic family (a
//! recursive struct, a type-name whose `primary_wrapper` is itself) resolve
//! without infinite recursion (§9 "placeholders constructed uninitialized
//! and filled in place").

use rustc_hash::FxHashMap;

use precache_codec::{
    DecodedMethod, DecodedMethodInstance, DecodedMethodTableRef, DecodedModule, DecodedObject,
    DecodedType, DecodedTypeName, DecodedValue, LoadBackrefs, Position,
};
use precache_common::{intern, CacheError, CacheResult, Symbol};
use precache_host::{
    Binding, CodeInstanceDef, Host, MethodDef, MethodFlags, MethodInstanceDef, MethodInstanceId,
    MethodTableDef, ModuleDef, ObjectRef, TypeDef, TypeFlags, TypeId, TypeNameDef,
};

pub struct Materializer<'a, H: Host> {
    host: &'a mut H,
    backrefs: &'a LoadBackrefs,
    current_world: u64,
    resolved: FxHashMap<Position, ObjectRef>,
    restored_modules: Vec<precache_host::ModuleId>,
    queued_roots: Vec<(precache_host::MethodId, Symbol, Vec<ObjectRef>)>,
    external_queued: Vec<MethodInstanceId>,
    validate_flagged: Vec<precache_host::CodeInstanceId>,
}

impl<'a, H: Host> Materializer<'a, H> {
    pub fn new(host: &'a mut H, backrefs: &'a LoadBackrefs, current_world: u64) -> Self {
        Self {
            host,
            backrefs,
            current_world,
            resolved: FxHashMap::default(),
            restored_modules: Vec::new(),
            queued_roots: Vec::new(),
            external_queued: Vec::new(),
            validate_flagged: Vec::new(),
        }
    }

    pub fn resolved(&self) -> &FxHashMap<Position, ObjectRef> {
        &self.resolved
    }

    pub fn take_restored_modules(&mut self) -> Vec<precache_host::ModuleId> {
        std::mem::take(&mut self.restored_modules)
    }

    pub fn take_queued_roots(&mut self) -> Vec<(precache_host::MethodId, Symbol, Vec<ObjectRef>)> {
        std::mem::take(&mut self.queued_roots)
    }

    pub fn take_external_queued(&mut self) -> Vec<MethodInstanceId> {
        std::mem::take(&mut self.external_queued)
    }

    pub fn take_validate_flagged(&mut self) -> Vec<precache_host::CodeInstanceId> {
        std::mem::take(&mut self.validate_flagged)
    }

    fn decoded(&self, pos: Position) -> CacheResult<DecodedObject> {
        Ok(self.backrefs.get(pos)?.clone())
    }

    pub fn resolve_object_ref(&mut self, pos: Position) -> CacheResult<ObjectRef> {
        if let Some(&obj) = self.resolved.get(&pos) {
            return Ok(obj);
        }
        match self.decoded(pos)? {
            DecodedObject::Type(t) => Ok(ObjectRef::Type(self.resolve_type(pos, t)?)),
            DecodedObject::TypeName(tn) => Ok(ObjectRef::TypeName(self.resolve_type_name(pos, tn)?)),
            DecodedObject::Module(m) => Ok(ObjectRef::Module(self.resolve_module(pos, m)?)),
            DecodedObject::MethodTable(mt) => {
                Ok(ObjectRef::MethodTable(self.resolve_method_table(pos, mt)?))
            }
            DecodedObject::Method(m) => Ok(ObjectRef::Method(self.resolve_method(pos, m)?)),
            DecodedObject::MethodInstance(mi) => {
                Ok(ObjectRef::MethodInstance(self.resolve_method_instance(pos, mi)?))
            }
        }
    }

    pub fn resolve_type_ref(&mut self, pos: Position) -> CacheResult<TypeId> {
        match self.resolve_object_ref(pos)? {
            ObjectRef::Type(id) => Ok(id),
            other => Err(CacheError::corrupt(format!(
                "expected a type reference, found {other:?}"
            ))),
        }
    }

    pub fn resolve_type_name_ref(&mut self, pos: Position) -> CacheResult<precache_host::TypeNameId> {
        match self.resolve_object_ref(pos)? {
            ObjectRef::TypeName(id) => Ok(id),
            other => Err(CacheError::corrupt(format!(
                "expected a type-name reference, found {other:?}"
            ))),
        }
    }

    pub fn resolve_module_ref(&mut self, pos: Position) -> CacheResult<precache_host::ModuleId> {
        match self.resolve_object_ref(pos)? {
            ObjectRef::Module(id) => Ok(id),
            other => Err(CacheError::corrupt(format!(
                "expected a module reference, found {other:?}"
            ))),
        }
    }

    pub fn resolve_method_table_ref(&mut self, pos: Position) -> CacheResult<precache_host::MethodTableId> {
        match self.resolve_object_ref(pos)? {
            ObjectRef::MethodTable(id) => Ok(id),
            other => Err(CacheError::corrupt(format!(
                "expected a method-table reference, found {other:?}"
            ))),
        }
    }

    pub fn resolve_method_ref(&mut self, pos: Position) -> CacheResult<precache_host::MethodId> {
        match self.resolve_object_ref(pos)? {
            ObjectRef::Method(id) => Ok(id),
            other => Err(CacheError::corrupt(format!(
                "expected a method reference, found {other:?}"
            ))),
        }
    }

    pub fn resolve_method_instance_ref(&mut self, pos: Position) -> CacheResult<MethodInstanceId> {
        match self.resolve_object_ref(pos)? {
            ObjectRef::MethodInstance(id) => Ok(id),
            other => Err(CacheError::corrupt(format!(
                "expected a method-instance reference, found {other:?}"
            ))),
        }
    }

    /// A root or binding value that isn't itself an addressable object
    /// (a plain symbol, string, number, ...) has nowhere to live in this
    /// workspace's `ObjectRef`-only binding/root model; it's dropped with a
    /// warning rather than failing the whole load, mirroring how §7
    /// absorbs partial-validity outcomes rather than erroring on them.
    fn resolve_maybe_object(&mut self, v: DecodedValue) -> CacheResult<Option<ObjectRef>> {
        match v {
            DecodedValue::Object(pos) => Ok(Some(self.resolve_object_ref(pos)?)),
            DecodedValue::Singleton(pos) => Ok(Some(ObjectRef::Type(self.resolve_type_ref(pos)?))),
            other => {
                tracing::warn!(?other, "dropping a non-object root/binding value: no ObjectRef representation");
                Ok(None)
            }
        }
    }

    fn resolve_type(&mut self, pos: Position, t: DecodedType) -> CacheResult<TypeId> {
        if let Some(ObjectRef::Type(id)) = self.resolved.get(&pos) {
            return Ok(*id);
        }
        let type_name = self.resolve_type_name_ref(t.type_name)?;
        let mut parameters = Vec::with_capacity(t.parameters.len());
        for p in &t.parameters {
            parameters.push(self.resolve_type_ref(*p)?);
        }
        let shell = TypeDef {
            type_name,
            parameters,
            super_type: None,
            field_types: Vec::new(),
            layout: None,
            singleton: false,
            flags: TypeFlags::empty(),
            hash: 0,
        };
        let existed = self.host.lookup_type(&shell).is_some();
        let id = self.host.lookup_or_insert_type(shell);
        self.resolved.insert(pos, ObjectRef::Type(id));

        if !existed {
            if let Some(full) = t.full {
                let super_type = match full.super_type {
                    Some(p) => Some(self.resolve_type_ref(p)?),
                    None => None,
                };
                let mut field_types = Vec::with_capacity(full.field_types.len());
                for f in &full.field_types {
                    field_types.push(self.resolve_type_ref(*f)?);
                }
                let def = self.host.type_mut(id);
                def.super_type = super_type;
                def.field_types = field_types;
                def.layout = full.layout;
                def.singleton = full.singleton_instance.is_some();
                def.flags = full.flags;
                def.hash = full.hash;
            }
        }
        Ok(id)
    }

    fn resolve_type_name(&mut self, pos: Position, tn: DecodedTypeName) -> CacheResult<precache_host::TypeNameId> {
        if let Some(ObjectRef::TypeName(id)) = self.resolved.get(&pos) {
            return Ok(*id);
        }
        let module = self.resolve_module_ref(tn.module)?;
        let existing = self.host.find_type_name(module, tn.name);
        let id = existing.unwrap_or_else(|| {
            self.host.insert_type_name(TypeNameDef {
                module,
                name: tn.name,
                internal: tn.internal,
                field_names: tn.field_names.clone(),
                primary_wrapper: None,
                method_table: None,
                hash: tn.hash,
                flags: tn.flags,
                max_methods: tn.max_methods,
                uninitialized_count: tn.uninitialized_count,
                atomic_fields: tn.atomic_fields,
                const_fields: tn.const_fields,
            })
        });
        self.resolved.insert(pos, ObjectRef::TypeName(id));

        if existing.is_none() {
            let primary_wrapper = match tn.primary_wrapper {
                Some(p) => Some(self.resolve_type_ref(p)?),
                None => None,
            };
            let method_table = match tn.method_table {
                Some(p) => Some(self.resolve_method_table_ref(p)?),
                None => None,
            };
            let def = self.host.type_name_mut(id);
            def.primary_wrapper = primary_wrapper;
            def.method_table = method_table;
        }
        Ok(id)
    }

    fn resolve_module(&mut self, pos: Position, m: DecodedModule) -> CacheResult<precache_host::ModuleId> {
        if let Some(ObjectRef::Module(id)) = self.resolved.get(&pos) {
            return Ok(*id);
        }
        match m {
            DecodedModule::ExternalTopLevel { uuid } => {
                let id = self.host.find_module(uuid).ok_or_else(|| {
                    CacheError::manifest(format!(
                        "external top-level module {uuid:?} is not loaded in the restoring process"
                    ))
                })?;
                self.resolved.insert(pos, ObjectRef::Module(id));
                Ok(id)
            }
            DecodedModule::ExternalNested { name, parent } => {
                let parent_id = self.resolve_module_ref(parent)?;
                let id = self.host.find_module_by_path(parent_id, name).ok_or_else(|| {
                    CacheError::manifest(format!(
                        "external submodule {} not found under its resolved parent",
                        name.as_str()
                    ))
                })?;
                self.resolved.insert(pos, ObjectRef::Module(id));
                Ok(id)
            }
            DecodedModule::Internal {
                name,
                parent,
                bindings,
                usings,
                is_top_mod,
                uuid,
                build_id,
            } => {
                let parent_id = match parent {
                    Some(p) => Some(self.resolve_module_ref(p)?),
                    None => None,
                };
                let id = self.host.insert_module(ModuleDef::new(name, parent_id, uuid, build_id));
                self.resolved.insert(pos, ObjectRef::Module(id));
                self.restored_modules.push(id);
                if let Some(parent_id) = parent_id {
                    self.host.module_mut(parent_id).children.push(id);
                }

                let mut resolved_usings = Vec::with_capacity(usings.len());
                for u in &usings {
                    resolved_usings.push(self.resolve_module_ref(*u)?);
                }
                self.host.module_mut(id).usings = resolved_usings;
                self.host.module_mut(id).is_top_mod = is_top_mod;

                for b in bindings {
                    let value = match b.value {
                        Some(v) => self.resolve_maybe_object(v)?,
                        None => None,
                    };
                    let ty = match b.ty {
                        Some(t) => Some(self.resolve_type_ref(t)?),
                        None => None,
                    };
                    self.host.module_mut(id).set_binding(Binding {
                        name: b.name,
                        value,
                        owner: id,
                        flags: b.flags,
                        ty,
                    });
                }
                Ok(id)
            }
        }
    }

    fn resolve_method_table(&mut self, pos: Position, mt: precache_codec::DecodedMethodTable) -> CacheResult<precache_host::MethodTableId> {
        if let Some(ObjectRef::MethodTable(id)) = self.resolved.get(&pos) {
            return Ok(*id);
        }
        let id = self.host.insert_method_table(MethodTableDef::default());
        self.resolved.insert(pos, ObjectRef::MethodTable(id));

        for def_pos in &mt.defs {
            let method_id = self.resolve_method_ref(*def_pos)?;
            self.host.insert_method_into_table(id, method_id);
        }
        let mut backedges = Vec::with_capacity(mt.backedges.len());
        for (sig, caller) in &mt.backedges {
            let mut sig_ids = Vec::with_capacity(sig.len());
            for t in sig {
                sig_ids.push(self.resolve_type_ref(*t)?);
            }
            let caller_id = self.resolve_method_instance_ref(*caller)?;
            backedges.push((sig_ids, caller_id));
        }
        self.host.method_table_mut(id).backedges = backedges;
        Ok(id)
    }

    fn resolve_method(&mut self, pos: Position, dm: DecodedMethod) -> CacheResult<precache_host::MethodId> {
        if let Some(ObjectRef::Method(id)) = self.resolved.get(&pos) {
            return Ok(*id);
        }
        let module = self.resolve_module_ref(dm.module)?;
        let mut signature = Vec::with_capacity(dm.signature.len());
        for t in &dm.signature {
            signature.push(self.resolve_type_ref(*t)?);
        }
        let owner_table = match dm.owner_table {
            DecodedMethodTableRef::ByType(p) => self.resolve_method_table_ref(p)?,
            DecodedMethodTableRef::ByModuleAndName(..) => {
                return Err(CacheError::corrupt(
                    "method-table-by-name references are never produced by this format's encoder",
                ));
            }
        };

        if dm.external {
            // §4.6 pass 3 (external method, looked up rather than
            // inserted): find the matching method already installed in
            // `owner_table`. Fall back to inserting a stub so a partially
            // populated restoring process (this workspace's `SimRuntime`
            // in particular) doesn't fail load outright.
            let id = self.host.find_method(owner_table, &signature, module).unwrap_or_else(|| {
                self.host.insert_method(MethodDef {
                    module,
                    owner_table,
                    name: intern(""),
                    signature: signature.clone(),
                    specializations: Vec::new(),
                    roots: Vec::new(),
                    file: intern(""),
                    line: 0,
                    nargs: signature.len() as u32,
                    flags: MethodFlags::empty(),
                })
            });
            self.resolved.insert(pos, ObjectRef::Method(id));
            if let Some(q) = dm.queued_new_roots {
                let mut roots = Vec::with_capacity(q.roots.len());
                for r in q.roots {
                    if let Some(obj) = self.resolve_maybe_object(r)? {
                        roots.push(obj);
                    }
                }
                self.queued_roots.push((id, q.worklist_key, roots));
            }
            return Ok(id);
        }

        let id = self.host.insert_method(MethodDef {
            module,
            owner_table,
            name: dm.internal.name,
            signature,
            specializations: Vec::new(),
            roots: Vec::new(),
            file: dm.internal.file,
            line: dm.internal.line,
            nargs: dm.internal.nargs,
            flags: dm.internal.flags,
        });
        self.host.insert_method_into_table(owner_table, id);
        self.resolved.insert(pos, ObjectRef::Method(id));

        let mut specializations = Vec::with_capacity(dm.internal.specializations.len());
        for s in &dm.internal.specializations {
            specializations.push(self.resolve_method_instance_ref(*s)?);
        }
        let mut roots = Vec::with_capacity(dm.internal.roots.len());
        for r in dm.internal.roots {
            if let Some(obj) = self.resolve_maybe_object(r)? {
                roots.push(obj);
            }
        }
        let def = self.host.method_mut(id);
        def.specializations = specializations;
        def.roots = roots;
        Ok(id)
    }

    fn resolve_method_instance(&mut self, pos: Position, dmi: DecodedMethodInstance) -> CacheResult<MethodInstanceId> {
        if let Some(ObjectRef::MethodInstance(id)) = self.resolved.get(&pos) {
            return Ok(*id);
        }
        match dmi {
            DecodedMethodInstance::NoMethod { spec_types } => {
                let mut spec = Vec::with_capacity(spec_types.len());
                for t in &spec_types {
                    spec.push(self.resolve_type_ref(*t)?);
                }
                let id = self.host.insert_method_instance(MethodInstanceDef {
                    method: None,
                    spec_types: spec,
                    sparam_values: Vec::new(),
                    backedges: Vec::new(),
                    code: None,
                });
                self.resolved.insert(pos, ObjectRef::MethodInstance(id));
                Ok(id)
            }
            DecodedMethodInstance::Internal {
                spec_types,
                method,
                sparam_values,
                backedges,
                code,
            } => {
                let method_id = self.resolve_method_ref(method)?;
                let mut spec = Vec::with_capacity(spec_types.len());
                for t in &spec_types {
                    spec.push(self.resolve_type_ref(*t)?);
                }
                let id = self.host.insert_method_instance(MethodInstanceDef {
                    method: Some(method_id),
                    spec_types: spec,
                    sparam_values: Vec::new(),
                    backedges: Vec::new(),
                    code: None,
                });
                self.resolved.insert(pos, ObjectRef::MethodInstance(id));

                let mut sparams = Vec::with_capacity(sparam_values.len());
                for t in &sparam_values {
                    sparams.push(self.resolve_type_ref(*t)?);
                }
                let mut be = Vec::with_capacity(backedges.len());
                for b in &backedges {
                    be.push(self.resolve_method_instance_ref(*b)?);
                }
                let code_id = match code {
                    Some(head) => Some(self.resolve_code_instance_chain(*head)?),
                    None => None,
                };
                let def = self.host.method_instance_mut(id);
                def.sparam_values = sparams;
                def.backedges = be;
                def.code = code_id;
                Ok(id)
            }
            DecodedMethodInstance::ExternalQueued { spec_types, method } => {
                let method_id = self.resolve_method_ref(method)?;
                let mut spec = Vec::with_capacity(spec_types.len());
                for t in &spec_types {
                    spec.push(self.resolve_type_ref(*t)?);
                }
                let def = MethodInstanceDef {
                    method: Some(method_id),
                    spec_types: spec.clone(),
                    sparam_values: Vec::new(),
                    backedges: Vec::new(),
                    code: None,
                };
                let id = self.host.find_or_insert_specialization(method_id, &spec, def);
                self.resolved.insert(pos, ObjectRef::MethodInstance(id));
                self.external_queued.push(id);
                Ok(id)
            }
        }
    }

    fn resolve_code_instance_chain(
        &mut self,
        ci: precache_codec::DecodedCodeInstance,
    ) -> CacheResult<precache_host::CodeInstanceId> {
        let def_mi = self.resolve_method_instance_ref(ci.def)?;
        // §4.7: a code instance whose `validate` flag was cleared at save
        // time re-receives `min_world = current_world` on load.
        let min_world = if ci.validate { ci.min_world } else { self.current_world };
        let rettype = match ci.rettype {
            Some(p) => self.resolve_type_ref(p)?,
            None => self
                .host
                .method_instance(def_mi)
                .spec_types
                .first()
                .copied()
                .unwrap_or(TypeId(0)),
        };
        let next = match ci.next {
            Some(boxed) => Some(self.resolve_code_instance_chain(*boxed)?),
            None => None,
        };
        let id = self.host.insert_code_instance(CodeInstanceDef {
            def: def_mi,
            min_world,
            max_world: ci.max_world,
            inferred: ci.inferred,
            rettype,
            relocatability: ci.relocatability,
            validate: ci.validate,
            cacheable: true,
            next,
        });
        if ci.validate {
            self.validate_flagged.push(id);
        }
        Ok(id)
    }
}
