//! The save-side value codec (§4.3): dispatch on runtime kind, writing a
//! tag then the body in the fixed field order the format specifies.

use byteorder::{LittleEndian, WriteBytesExt};
use rustc_hash::FxHashSet;

use precache_common::limits::SMALL_INT_RANGE;
use precache_common::{CacheError, CacheResult, Symbol};
use precache_host::{
    ArrayPayload, ArrayValue, CodeInstanceId, GenericRecord, Host, MethodDef, MethodFlags,
    MethodId, MethodInstanceDef, MethodInstanceId, MethodTableId, ModuleId, ObjectRef,
    Relocatability, TypeId, TypeNameId, UnionAll, Value,
};
use precache_tags::{common_symbols, wellknown, Tag, WellKnownValue, STRUCTURAL_TAG_COUNT};

use crate::finalizer::{FinalizerAction, FinalizerList};
use crate::position::Position;
use crate::primitives::*;
use crate::save_backrefs::SaveBackrefs;

/// Threaded from `precache-engine`'s `save_incremental` (§0.5 supplement
/// 2): whether a method instance with zero cacheable code instances in
/// its chain should fail the whole save, or simply carry no code.
#[derive(Clone, Copy, Debug)]
pub struct EncodeOptions {
    pub require_one_cacheable: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            require_one_cacheable: true,
        }
    }
}

pub struct Encoder<'a, H: Host> {
    host: &'a H,
    /// Every module id belonging to the worklist, transitively — supplied
    /// by the caller, which is where "is this module internal" is a
    /// simple membership test rather than an ancestor walk this crate
    /// would otherwise have to reimplement.
    worklist_modules: &'a FxHashSet<ModuleId>,
    backrefs: SaveBackrefs,
    finalizers: FinalizerList,
    options: EncodeOptions,
    out: Vec<u8>,
    /// External top-level modules referenced from the payload, in first-
    /// encountered order — `precache-engine` turns this into the
    /// `mod_list` manifest once encoding finishes.
    external_top_level_modules: Vec<ModuleId>,
    external_top_level_seen: FxHashSet<ModuleId>,
}

impl<'a, H: Host> Encoder<'a, H> {
    pub fn new(
        host: &'a H,
        worklist_modules: &'a FxHashSet<ModuleId>,
        options: EncodeOptions,
    ) -> Self {
        Self {
            host,
            worklist_modules,
            backrefs: SaveBackrefs::new(),
            finalizers: FinalizerList::new(),
            options,
            out: Vec::new(),
            external_top_level_modules: Vec::new(),
            external_top_level_seen: FxHashSet::default(),
        }
    }

    pub fn finish(self) -> (Vec<u8>, FinalizerList) {
        (self.out, self.finalizers)
    }

    pub fn position_of(&self, obj: ObjectRef) -> Option<Position> {
        self.backrefs.position_of(obj)
    }

    /// External top-level modules referenced anywhere in the payload, in
    /// first-encountered order (§6 `mod_list`).
    pub fn external_top_level_modules(&self) -> &[ModuleId] {
        &self.external_top_level_modules
    }

    fn write_tag(&mut self, tag: Tag) -> CacheResult<()> {
        self.out.write_u8(tag.as_byte())?;
        Ok(())
    }

    fn is_internal_module(&self, id: ModuleId) -> bool {
        self.worklist_modules.contains(&id)
    }

    fn type_is_internal(&self, id: TypeId) -> bool {
        let def = self.host.type_def(id);
        self.type_name_is_internal(def.type_name)
    }

    fn type_name_is_internal(&self, id: TypeNameId) -> bool {
        self.is_internal_module(self.host.type_name(id).module)
    }

    fn method_is_internal(&self, id: MethodId) -> bool {
        self.is_internal_module(self.host.method(id).module)
    }

    fn method_instance_is_internal(&self, id: MethodInstanceId) -> bool {
        match self.host.method_instance(id).method {
            Some(m) => self.method_is_internal(m),
            None => true,
        }
    }

    // ---- top-level value dispatch -------------------------------------

    pub fn encode_value(&mut self, v: &Value) -> CacheResult<()> {
        match v {
            Value::Null => self.write_tag(Tag::Null),
            Value::Symbol(sym) => self.encode_symbol_value(*sym),
            Value::Bool(b) => {
                self.write_tag(Tag::UInt8)?;
                self.out.write_u8(*b as u8)?;
                Ok(())
            }
            Value::UInt8(b) => {
                self.write_tag(Tag::UInt8)?;
                self.out.write_u8(*b)?;
                Ok(())
            }
            Value::Int32(i) => self.encode_int32(*i),
            Value::Int64(i) => self.encode_int64(*i),
            Value::BigInt { negative, limbs } => self.encode_bigint(*negative, limbs),
            Value::Str(s) => {
                self.write_tag(Tag::Str)?;
                write_str(&mut self.out, s)
            }
            Value::Svec(items) => self.encode_svec(items),
            Value::Array(arr) => self.encode_array(arr),
            Value::UnionAll(ua) => self.encode_union_all(ua),
            Value::GenericRecord(gr) => self.encode_generic_record(gr),
            Value::Singleton(ty) => self.encode_singleton(*ty),
            Value::Object(obj) => self.encode_object(*obj),
        }
    }

    fn encode_symbol_value(&mut self, sym: Symbol) -> CacheResult<()> {
        if let Some(idx) = common_symbols::index_of(sym) {
            self.write_tag(Tag::CommonSymbol)?;
            self.out.write_u8(idx)?;
            return Ok(());
        }
        let s = sym.as_str();
        if s.len() < 0xFF {
            self.write_tag(Tag::SymbolShort)?;
            write_len_u8(&mut self.out, s.len())?;
        } else {
            self.write_tag(Tag::SymbolLong)?;
            write_len_u32(&mut self.out, s.len())?;
        }
        self.out.write_all(s.as_bytes())?;
        Ok(())
    }

    fn encode_int64(&mut self, i: i64) -> CacheResult<()> {
        if SMALL_INT_RANGE.contains(&i) {
            if let Some(idx) = wellknown::index_of(&WellKnownValue::SmallInt64(i as i8)) {
                self.out.write_u8(STRUCTURAL_TAG_COUNT + idx)?;
                return Ok(());
            }
        }
        if let Ok(short) = i32::try_from(i) {
            self.write_tag(Tag::Int64Short)?;
            self.out.write_i32::<LittleEndian>(short)?;
        } else {
            self.write_tag(Tag::Int64)?;
            self.out.write_i64::<LittleEndian>(i)?;
        }
        Ok(())
    }

    fn encode_int32(&mut self, i: i32) -> CacheResult<()> {
        if SMALL_INT_RANGE.contains(&(i as i64)) {
            if let Some(idx) = wellknown::index_of(&WellKnownValue::SmallInt32(i as i8)) {
                self.out.write_u8(STRUCTURAL_TAG_COUNT + idx)?;
                return Ok(());
            }
        }
        if let Ok(short) = i8::try_from(i) {
            self.write_tag(Tag::Int32Short)?;
            self.out.write_i8(short)?;
        } else {
            self.write_tag(Tag::Int32)?;
            self.out.write_i32::<LittleEndian>(i)?;
        }
        Ok(())
    }

    fn encode_bigint(&mut self, negative: bool, limbs: &[u64]) -> CacheResult<()> {
        self.write_tag(Tag::BigInt)?;
        self.out.write_u8(negative as u8)?;
        write_len_u32(&mut self.out, limbs.len())?;
        for limb in limbs {
            self.out.write_u64::<LittleEndian>(*limb)?;
        }
        Ok(())
    }

    fn encode_svec(&mut self, items: &[Value]) -> CacheResult<()> {
        if is_long_form(items.len()) {
            self.write_tag(Tag::SvecLong)?;
            write_len_u32(&mut self.out, items.len())?;
        } else {
            self.write_tag(Tag::SvecShort)?;
            write_len_u8(&mut self.out, items.len())?;
        }
        for item in items {
            self.encode_value(item)?;
        }
        Ok(())
    }

    fn encode_array(&mut self, arr: &ArrayValue) -> CacheResult<()> {
        if arr.dims.len() == 1 {
            self.write_tag(Tag::Array1d)?;
        } else {
            self.write_tag(Tag::ArrayNd)?;
            self.out.write_u32::<LittleEndian>(arr.dims.len() as u32)?;
        }
        for d in &arr.dims {
            self.out.write_u32::<LittleEndian>(*d)?;
        }
        let mut flags = 0u8;
        if arr.has_ptr {
            flags |= 1;
        }
        if arr.is_union {
            flags |= 2;
        }
        self.out.write_u8(flags)?;
        self.out.write_u32::<LittleEndian>(arr.elsize)?;
        self.encode_object(ObjectRef::Type(arr.element_type))?;
        match &arr.payload {
            ArrayPayload::Pointers(items) => {
                self.out.write_u8(0)?;
                write_len_u32(&mut self.out, items.len())?;
                for item in items {
                    match item {
                        Some(v) => self.encode_value(v)?,
                        None => self.write_tag(Tag::NullPointer)?,
                    }
                }
            }
            ArrayPayload::InlineWithPointers { bytes, pointer_slots } => {
                self.out.write_u8(1)?;
                write_bytes_u32_len(&mut self.out, bytes)?;
                write_len_u32(&mut self.out, pointer_slots.len())?;
                for (offset, v) in pointer_slots {
                    self.out.write_u32::<LittleEndian>(*offset)?;
                    self.encode_value(v)?;
                }
            }
            ArrayPayload::FlatBits { bytes, elem_tags } => {
                self.out.write_u8(2)?;
                write_bytes_u32_len(&mut self.out, bytes)?;
                match elem_tags {
                    Some(tags) => {
                        self.out.write_u8(1)?;
                        write_bytes_u32_len(&mut self.out, tags)?;
                    }
                    None => self.out.write_u8(0)?,
                }
            }
        }
        Ok(())
    }

    fn encode_union_all(&mut self, ua: &UnionAll) -> CacheResult<()> {
        self.write_tag(Tag::UnionAll)?;
        match ua {
            UnionAll::Named { module, name } => {
                self.out.write_u8(1)?;
                self.encode_object(ObjectRef::Module(*module))?;
                write_symbol(&mut self.out, *name)?;
            }
            UnionAll::Inline { var, body } => {
                self.out.write_u8(0)?;
                self.encode_object(ObjectRef::Type(*var))?;
                self.encode_value(body)?;
            }
        }
        Ok(())
    }

    fn encode_generic_record(&mut self, gr: &GenericRecord) -> CacheResult<()> {
        if is_long_form(gr.bytes.len()) {
            self.write_tag(Tag::GenericLong)?;
            write_len_u32(&mut self.out, gr.bytes.len())?;
        } else {
            self.write_tag(Tag::GenericShort)?;
            write_len_u8(&mut self.out, gr.bytes.len())?;
        }
        self.encode_object(ObjectRef::Type(gr.ty))?;
        self.out.write_all(&gr.bytes)?;
        write_len_u32(&mut self.out, gr.pointer_slots.len())?;
        for (offset, v) in &gr.pointer_slots {
            self.out.write_u32::<LittleEndian>(*offset)?;
            self.encode_value(v)?;
        }
        Ok(())
    }

    fn encode_singleton(&mut self, ty: TypeId) -> CacheResult<()> {
        self.write_tag(Tag::Singleton)?;
        self.encode_object(ObjectRef::Type(ty))
    }

    // ---- object graph, backref-aware -----------------------------------

    /// Dispatches an object-graph entity that can appear wherever a
    /// `Value` can: writes a backref tag if already seen, otherwise a
    /// kind-specific structural tag and its full body (§4.2/§4.3).
    pub fn encode_object(&mut self, obj: ObjectRef) -> CacheResult<()> {
        match obj {
            ObjectRef::Type(id) => {
                let external = !self.type_is_internal(id);
                self.write_backref_or(obj, external, Tag::DataType, |enc| enc.encode_type_body(id))
            }
            ObjectRef::Method(id) => {
                let external = !self.method_is_internal(id);
                self.write_backref_or(obj, external, Tag::Method, |enc| enc.encode_method_body(id))
            }
            ObjectRef::MethodInstance(id) => {
                let external = !self.method_instance_is_internal(id);
                self.write_backref_or(obj, external, Tag::MethodInstance, |enc| {
                    enc.encode_method_instance_body(id)
                })
            }
            ObjectRef::CodeInstance(id) => {
                // Code instances are exclusively owned by the chain
                // rooted at a method instance's `code` field (§3); they
                // are never aliased from elsewhere, so they bypass the
                // backref table entirely (§4.3 "recursive encode of
                // `next`" is a plain nested write, not a shared object).
                self.encode_code_instance_chain(id)
            }
            ObjectRef::Module(id) => {
                self.write_backref_or(obj, false, Tag::Module, |enc| enc.encode_module_body(id))
            }
            ObjectRef::TypeName(id) => self.encode_type_name_ref(id),
            ObjectRef::MethodTable(id) => self.encode_method_table_ref(id),
        }
    }

    fn write_backref_or(
        &mut self,
        obj: ObjectRef,
        external: bool,
        tag: Tag,
        body: impl FnOnce(&mut Self) -> CacheResult<()>,
    ) -> CacheResult<()> {
        let (pos, is_new) = self.backrefs.position_of_or_assign(obj);
        if is_new {
            self.write_tag(tag)?;
            body(self)
        } else {
            pos.needs_unique(external).write(&mut self.out)
        }
    }

    /// A type-name is only ever reached as a named field of something
    /// else (a type's full record, a module's manifest lookup), but it is
    /// still a shared object that can be backref'd, so it gets its own
    /// introducing tag (`Tag::TypeName`) like every other object kind.
    fn encode_type_name_ref(&mut self, id: TypeNameId) -> CacheResult<()> {
        self.write_backref_or(ObjectRef::TypeName(id), false, Tag::TypeName, |enc| {
            enc.encode_type_name_body(id)
        })
    }

    fn encode_method_table_ref(&mut self, id: MethodTableId) -> CacheResult<()> {
        self.write_backref_or(ObjectRef::MethodTable(id), false, Tag::MethodTable, |enc| {
            let table = enc.host.method_table(id).clone();
            write_len_u32(&mut enc.out, table.defs.len())?;
            for m in &table.defs {
                enc.encode_object(ObjectRef::Method(*m))?;
            }
            write_len_u32(&mut enc.out, table.backedges.len())?;
            for (sig, caller) in &table.backedges {
                write_len_u32(&mut enc.out, sig.len())?;
                for t in sig {
                    enc.encode_object(ObjectRef::Type(*t))?;
                }
                enc.encode_object(ObjectRef::MethodInstance(*caller))?;
            }
            Ok(())
        })
    }

    // ---- §4.3 Type ------------------------------------------------------

    fn encode_type_body(&mut self, id: TypeId) -> CacheResult<()> {
        let def = self.host.type_def(id).clone();
        let internal = self.type_name_is_internal(def.type_name);
        let sub_tag: u8 = if internal { 5 } else { 6 };
        self.out.write_u8(sub_tag)?;
        self.encode_type_name_ref(def.type_name)?;
        write_len_u32(&mut self.out, def.parameters.len())?;
        for p in &def.parameters {
            self.encode_object(ObjectRef::Type(*p))?;
        }
        if sub_tag == 6 {
            // External primary: type-name + parameters is the whole body.
            return Ok(());
        }
        self.out.write_u32::<LittleEndian>(def.flags.bits() as u32)?;
        self.out.write_u32::<LittleEndian>(def.hash)?;
        match &def.super_type {
            Some(s) => {
                self.out.write_u8(1)?;
                self.encode_object(ObjectRef::Type(*s))?;
            }
            None => self.out.write_u8(0)?,
        }
        write_len_u32(&mut self.out, def.field_types.len())?;
        for f in &def.field_types {
            self.encode_object(ObjectRef::Type(*f))?;
        }
        use precache_host::Layout;
        match &def.layout {
            None => self.out.write_u8(0xFF)?,
            Some(Layout::LikeArray) => self.out.write_u8(1)?,
            Some(Layout::LikeUnit) => self.out.write_u8(2)?,
            Some(Layout::LikePointer) => self.out.write_u8(3)?,
            Some(Layout::Verbatim {
                size,
                field_offsets,
                pointer_offsets,
            }) => {
                self.out.write_u8(0)?;
                self.out.write_u32::<LittleEndian>(*size)?;
                write_len_u32(&mut self.out, field_offsets.len())?;
                for o in field_offsets {
                    self.out.write_u32::<LittleEndian>(*o)?;
                }
                write_len_u32(&mut self.out, pointer_offsets.len())?;
                for o in pointer_offsets {
                    self.out.write_u32::<LittleEndian>(*o)?;
                }
            }
        }
        self.out.write_u8(def.singleton as u8)?;
        Ok(())
    }

    fn encode_type_name_body(&mut self, id: TypeNameId) -> CacheResult<()> {
        let def = self.host.type_name(id).clone();
        self.out.write_u8(def.internal as u8)?;
        self.encode_object(ObjectRef::Module(def.module))?;
        write_symbol(&mut self.out, def.name)?;
        if !def.internal {
            return Ok(());
        }
        write_len_u32(&mut self.out, def.field_names.len())?;
        for f in &def.field_names {
            write_symbol(&mut self.out, *f)?;
        }
        match def.primary_wrapper {
            Some(t) => {
                self.out.write_u8(1)?;
                self.encode_object(ObjectRef::Type(t))?;
            }
            None => self.out.write_u8(0)?,
        }
        match def.method_table {
            Some(mt) => {
                self.out.write_u8(1)?;
                self.encode_method_table_ref(mt)?;
            }
            None => self.out.write_u8(0)?,
        }
        self.out.write_u32::<LittleEndian>(def.hash)?;
        self.out.write_u8(def.flags.bits())?;
        self.out.write_u32::<LittleEndian>(def.max_methods)?;
        self.out.write_u32::<LittleEndian>(def.uninitialized_count)?;
        self.out.write_u64::<LittleEndian>(def.atomic_fields)?;
        self.out.write_u64::<LittleEndian>(def.const_fields)?;
        Ok(())
    }

    // ---- §4.3 Module ----------------------------------------------------

    fn encode_module_body(&mut self, id: ModuleId) -> CacheResult<()> {
        let def = self.host.module(id).clone();
        write_symbol(&mut self.out, def.name)?;
        let internal = self.is_internal_module(id);
        if !internal {
            match def.parent {
                // External, non-top-level (tag byte 1): walked up to an
                // already-resolved or further-external parent.
                Some(p) => {
                    self.out.write_u8(1)?;
                    self.encode_object(ObjectRef::Module(p))?;
                }
                // External, top-level (tag byte 2): resolved on load by
                // UUID against the already-loaded module manifest
                // (§6 `mod_list`), not walked as a nested body.
                None => {
                    self.out.write_u8(2)?;
                    self.out.write_u64::<LittleEndian>(def.uuid.0)?;
                    self.out.write_u64::<LittleEndian>(def.uuid.1)?;
                    if self.external_top_level_seen.insert(id) {
                        self.external_top_level_modules.push(id);
                    }
                }
            }
            return Ok(());
        }
        self.out.write_u8(0)?;
        match def.parent {
            Some(p) => {
                self.out.write_u8(1)?;
                self.encode_object(ObjectRef::Module(p))?;
                if self.is_internal_module(p) {
                    let (pos, _) = self.backrefs.position_of_or_assign(ObjectRef::Module(id));
                    self.finalizers
                        .push(pos, FinalizerAction::ReinsertSubmoduleBinding);
                }
            }
            None => self.out.write_u8(0)?,
        }
        for (name, binding) in &def.bindings {
            write_symbol(&mut self.out, *name)?;
            match &binding.value {
                Some(obj) => {
                    self.out.write_u8(1)?;
                    self.encode_object(*obj)?;
                }
                None => self.out.write_u8(0)?,
            }
            match binding.ty {
                Some(t) => {
                    self.out.write_u8(1)?;
                    self.encode_object(ObjectRef::Type(t))?;
                }
                None => self.out.write_u8(0)?,
            }
            self.out.write_u8(binding.flags.bits())?;
        }
        // Terminating null name (§4.3 Module).
        self.out.write_u32::<LittleEndian>(0)?;
        write_len_u32(&mut self.out, def.usings.len())?;
        for u in &def.usings {
            self.encode_object(ObjectRef::Module(*u))?;
        }
        self.out.write_u8(def.is_top_mod as u8)?;
        self.out.write_u64::<LittleEndian>(def.uuid.0)?;
        self.out.write_u64::<LittleEndian>(def.uuid.1)?;
        self.out.write_u64::<LittleEndian>(def.build_id)?;
        Ok(())
    }

    // ---- §4.3 Method / Method instance / Code instance ------------------

    fn encode_method_body(&mut self, id: MethodId) -> CacheResult<()> {
        let def: MethodDef = self.host.method(id).clone();
        if def.is_opaque_closure() {
            // §0.5 supplement 1: reject at encode time, not at flush time.
            return Err(CacheError::semantic(format!(
                "method {} is an opaque closure; opaque closures cannot be cached",
                def.name.as_str()
            )));
        }
        let internal = self.is_internal_module(def.module);
        let mut mode = 0u8;
        const INTERNAL: u8 = 1 << 0;
        const EXTERNAL_MT: u8 = 1 << 1;
        const HAS_NEW_ROOTS: u8 = 1 << 2;
        if internal {
            mode |= INTERNAL;
        } else {
            mode |= EXTERNAL_MT;
            if !def.roots.is_empty() {
                mode |= HAS_NEW_ROOTS;
            }
        }
        self.out.write_u8(mode)?;
        write_len_u32(&mut self.out, def.signature.len())?;
        for t in &def.signature {
            self.encode_object(ObjectRef::Type(*t))?;
        }
        self.encode_object(ObjectRef::Module(def.module))?;
        self.encode_method_table_ref(def.owner_table)?;

        if mode & EXTERNAL_MT != 0 {
            if mode & HAS_NEW_ROOTS != 0 {
                write_symbol(&mut self.out, def.name)?;
                write_len_u32(&mut self.out, def.roots.len())?;
                for r in &def.roots {
                    self.encode_object(*r)?;
                }
            }
            return Ok(());
        }

        write_len_u32(&mut self.out, def.specializations.len())?;
        for mi in &def.specializations {
            self.encode_object(ObjectRef::MethodInstance(*mi))?;
        }
        write_symbol(&mut self.out, def.name)?;
        write_symbol(&mut self.out, def.file)?;
        self.out.write_u32::<LittleEndian>(def.line)?;
        self.out.write_u32::<LittleEndian>(def.nargs)?;
        self.out.write_u16::<LittleEndian>(
            (def.flags & (MethodFlags::IS_VARARG | MethodFlags::PURE | MethodFlags::CONST_PROP)).bits(),
        )?;
        write_len_u32(&mut self.out, def.roots.len())?;
        for r in &def.roots {
            self.encode_object(*r)?;
        }
        Ok(())
    }

    fn encode_method_instance_body(&mut self, id: MethodInstanceId) -> CacheResult<()> {
        let def: MethodInstanceDef = self.host.method_instance(id).clone();
        let internal = match def.method {
            Some(m) => self.method_is_internal(m),
            None => true,
        };
        let internal_code: u8 = match def.method {
            None => 0,
            Some(_) if internal => 2,
            Some(_) => 3,
        };
        self.out.write_u8(internal_code)?;
        write_len_u32(&mut self.out, def.spec_types.len())?;
        for t in &def.spec_types {
            self.encode_object(ObjectRef::Type(*t))?;
        }
        match def.method {
            Some(m) => {
                self.out.write_u8(1)?;
                self.encode_object(ObjectRef::Method(m))?;
            }
            None => self.out.write_u8(0)?,
        }
        if internal_code != 2 {
            return Ok(());
        }
        write_len_u32(&mut self.out, def.sparam_values.len())?;
        for t in &def.sparam_values {
            self.encode_object(ObjectRef::Type(*t))?;
        }
        // Filtered back-edges: only edges whose source is internal or
        // queued (§4.3). `SimRuntime` has no separate queued-external-MI
        // set, so "internal" is the whole filter here.
        let filtered: Vec<MethodInstanceId> = def
            .backedges
            .iter()
            .copied()
            .filter(|caller| self.method_instance_is_internal(*caller))
            .collect();
        write_len_u32(&mut self.out, filtered.len())?;
        for caller in &filtered {
            self.encode_object(ObjectRef::MethodInstance(*caller))?;
        }
        match def.code {
            Some(head) if self.chain_has_cacheable(head) => {
                self.out.write_u8(1)?;
                self.encode_code_instance_chain(head)?;
            }
            Some(_) if self.options.require_one_cacheable => {
                return Err(CacheError::semantic(
                    "code instance chain has no cacheable entry and skipping is not permitted",
                ));
            }
            Some(_) | None => self.out.write_u8(0)?,
        }
        Ok(())
    }

    /// Whether `id` or any link reachable through its `next` chain is
    /// cacheable — used to decide, before writing a single byte, whether a
    /// "has code"/"has next" flag of 1 can legitimately be followed by an
    /// encoded chain (§0.5 supplement 2).
    fn chain_has_cacheable(&self, mut id: CodeInstanceId) -> bool {
        loop {
            let def = self.host.code_instance(id);
            if def.cacheable {
                return true;
            }
            match def.next {
                Some(next) => id = next,
                None => return false,
            }
        }
    }

    /// §4.3 Code instance: "entries that carry a `PartialOpaque` return
    /// type that cannot be cached are skipped (the chain continues with
    /// `next`)." Callers only reach this once `chain_has_cacheable` has
    /// confirmed a cacheable entry lies ahead, so running out of links
    /// without finding one here means a caller skipped that check.
    /// Code instances are exclusively owned by this chain, so each link
    /// is a plain nested write (tag + fields), not a backref-tracked
    /// object — see `encode_object`'s `CodeInstance` arm.
    fn encode_code_instance_chain(&mut self, id: CodeInstanceId) -> CacheResult<()> {
        let def = self.host.code_instance(id).clone();
        if !def.cacheable {
            return match def.next {
                Some(next) => self.encode_code_instance_chain(next),
                None => Err(CacheError::semantic(
                    "internal: chain_has_cacheable reported a cacheable entry but none was found",
                )),
            };
        }
        self.write_tag(Tag::CodeInstance)?;
        let mut flags = 0u8;
        if def.validate {
            flags |= 1;
        }
        if matches!(def.relocatability, Relocatability::NotRelocatable) {
            flags |= 2;
        }
        self.out.write_u8(flags)?;
        self.encode_object(ObjectRef::MethodInstance(def.def))?;
        // min/max world must precede the conditional block below so the
        // decoder already knows `min_world` before deciding whether to
        // read it.
        self.out.write_u64::<LittleEndian>(def.min_world)?;
        self.out.write_u64::<LittleEndian>(def.max_world)?;
        if def.validate || def.min_world == 0 {
            match &def.inferred {
                Some(bytes) => {
                    self.out.write_u8(1)?;
                    write_bytes_u32_len(&mut self.out, bytes)?;
                }
                None => self.out.write_u8(0)?,
            }
            self.encode_object(ObjectRef::Type(def.rettype))?;
        }
        match def.next {
            Some(next) if self.chain_has_cacheable(next) => {
                self.out.write_u8(1)?;
                self.encode_code_instance_chain(next)?;
            }
            Some(_) | None => self.out.write_u8(0)?,
        }
        Ok(())
    }
}
