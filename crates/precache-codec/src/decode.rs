//! The load-side value codec (§4.3): the mirror image of `encode.rs`,
//! reading the same fixed tag/field order back into the placeholder
//! object graph in `decoded.rs`. Needs no `Host` — materializing a
//! `DecodedObject` into a live object is the recaching pipeline's job,
//! not this crate's.

use std::io::{Cursor, Read};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};

use precache_common::{CacheError, CacheResult};
use precache_host::{BindingFlags, Layout, MethodFlags, Relocatability, TypeFlags, TypeNameFlags};
use precache_tags::{common_symbols, wellknown, Tag, TagKind, WellKnownValue};

use crate::decoded::*;
use crate::load_backrefs::LoadBackrefs;
use crate::position::{Position, StoredPosition};
use crate::primitives::*;

pub struct Decoder<'a> {
    input: Cursor<&'a [u8]>,
    backrefs: LoadBackrefs,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            input: Cursor::new(bytes),
            backrefs: LoadBackrefs::new(),
        }
    }

    pub fn into_backrefs(self) -> LoadBackrefs {
        self.backrefs
    }

    fn read_tag(&mut self) -> CacheResult<TagKind> {
        let byte = self.input.read_u8()?;
        Tag::classify(byte)
    }

    fn resolve_backref(&mut self, stored: StoredPosition) -> DecodedValue {
        if stored.flag {
            self.backrefs.mark_flagged(stored.position);
        }
        DecodedValue::Object(stored.position)
    }

    // ---- top-level value dispatch --------------------------------------

    pub fn decode_value(&mut self) -> CacheResult<DecodedValue> {
        match self.read_tag()? {
            TagKind::WellKnown(idx) => self.decode_wellknown(idx),
            TagKind::Structural(tag) => self.decode_structural(tag),
        }
    }

    fn decode_wellknown(&mut self, idx: u8) -> CacheResult<DecodedValue> {
        let wk = wellknown::by_index(idx)
            .ok_or_else(|| CacheError::corrupt(format!("unknown well-known index {idx}")))?;
        Ok(match wk {
            WellKnownValue::SmallInt64(i) => DecodedValue::Int64(i as i64),
            WellKnownValue::SmallInt32(i) => DecodedValue::Int32(i as i32),
            WellKnownValue::EmptyTuple => DecodedValue::Svec(Vec::new()),
            WellKnownValue::EmptyString => DecodedValue::Str(Arc::from("")),
            // Primitive types, builtin type objects, the empty vector and
            // the current task's root all need a live `Host` to resolve
            // to anything — the recaching pipeline looks these up by
            // name/kind rather than by position.
            other => DecodedValue::WellKnown(other),
        })
    }

    fn decode_structural(&mut self, tag: Tag) -> CacheResult<DecodedValue> {
        match tag {
            Tag::Null => Ok(DecodedValue::Null),
            Tag::ShortBackref => {
                let stored = StoredPosition::read_short(&mut self.input)?;
                Ok(self.resolve_backref(stored))
            }
            Tag::Backref => {
                let stored = StoredPosition::read_long(&mut self.input)?;
                Ok(self.resolve_backref(stored))
            }
            Tag::SymbolShort => {
                let len = read_len_u8(&mut self.input)?;
                self.read_symbol_body(len)
            }
            Tag::SymbolLong => {
                let len = read_len_u32(&mut self.input)?;
                self.read_symbol_body(len)
            }
            Tag::CommonSymbol => {
                let idx = self.input.read_u8()?;
                let sym = common_symbols::by_index(idx)
                    .ok_or_else(|| CacheError::corrupt(format!("unknown common-symbol index {idx}")))?;
                Ok(DecodedValue::Symbol(sym))
            }
            Tag::SvecShort => {
                let len = read_len_u8(&mut self.input)?;
                self.decode_svec(len)
            }
            Tag::SvecLong => {
                let len = read_len_u32(&mut self.input)?;
                self.decode_svec(len)
            }
            Tag::Array1d => self.decode_array(1),
            Tag::ArrayNd => {
                let ndim = self.input.read_u32::<LittleEndian>()? as usize;
                self.decode_array(ndim)
            }
            Tag::DataType => {
                let pos = self.backrefs.reserve_next();
                let body = self.decode_type_body(pos)?;
                self.backrefs.fill(pos, DecodedObject::Type(body));
                Ok(DecodedValue::Object(pos))
            }
            Tag::Method => {
                let pos = self.backrefs.reserve_next();
                let body = self.decode_method_body()?;
                self.backrefs.fill(pos, DecodedObject::Method(body));
                Ok(DecodedValue::Object(pos))
            }
            Tag::MethodInstance => {
                let pos = self.backrefs.reserve_next();
                let body = self.decode_method_instance_body()?;
                self.backrefs.fill(pos, DecodedObject::MethodInstance(body));
                Ok(DecodedValue::Object(pos))
            }
            Tag::Module => {
                let pos = self.backrefs.reserve_next();
                let body = self.decode_module_body()?;
                self.backrefs.fill(pos, DecodedObject::Module(body));
                Ok(DecodedValue::Object(pos))
            }
            Tag::TypeName => {
                let pos = self.backrefs.reserve_next();
                let body = self.decode_type_name_body()?;
                self.backrefs.fill(pos, DecodedObject::TypeName(body));
                Ok(DecodedValue::Object(pos))
            }
            Tag::MethodTable => {
                let pos = self.backrefs.reserve_next();
                let body = self.decode_method_table_body()?;
                self.backrefs.fill(pos, DecodedObject::MethodTable(body));
                Ok(DecodedValue::Object(pos))
            }
            Tag::Int64 => Ok(DecodedValue::Int64(self.input.read_i64::<LittleEndian>()?)),
            Tag::Int64Short => Ok(DecodedValue::Int64(self.input.read_i32::<LittleEndian>()? as i64)),
            Tag::Int32 => Ok(DecodedValue::Int32(self.input.read_i32::<LittleEndian>()?)),
            Tag::Int32Short => Ok(DecodedValue::Int32(self.input.read_i8()? as i32)),
            Tag::UInt8 => Ok(DecodedValue::UInt8(self.input.read_u8()?)),
            Tag::Str => Ok(DecodedValue::Str(read_arc_str(&mut self.input)?)),
            Tag::Singleton => {
                let ty = self.decode_object_ref()?;
                Ok(DecodedValue::Singleton(ty))
            }
            Tag::GenericShort => {
                let len = read_len_u8(&mut self.input)?;
                self.decode_generic_record(len)
            }
            Tag::GenericLong => {
                let len = read_len_u32(&mut self.input)?;
                self.decode_generic_record(len)
            }
            Tag::UnionAll => self.decode_union_all(),
            Tag::BigInt => self.decode_bigint(),
            Tag::NullPointer => Err(CacheError::corrupt(
                "NULL_POINTER is only valid inside an array payload or a skipped code-instance chain, not as a bare value",
            )),
            Tag::TypeNameByBuiltinIndex | Tag::TypeVar | Tag::CoreModule | Tag::BaseModule => {
                Err(CacheError::corrupt(format!(
                    "tag {tag:?} is reserved and not produced by this format's encoder"
                )))
            }
        }
    }

    fn read_symbol_body(&mut self, len: usize) -> CacheResult<DecodedValue> {
        let mut buf = vec![0u8; len];
        self.input.read_exact(&mut buf)?;
        let s = String::from_utf8(buf)
            .map_err(|e| CacheError::corrupt(format!("symbol is not valid utf-8: {e}")))?;
        Ok(DecodedValue::Symbol(precache_common::intern(&s)))
    }

    /// Reads one `Value` and requires it to be an object backref
    /// (`DecodedValue::Object`) — used for fields that are always a
    /// type/module/method reference rather than an arbitrary value.
    fn decode_object_ref(&mut self) -> CacheResult<Position> {
        match self.decode_value()? {
            DecodedValue::Object(pos) => Ok(pos),
            other => Err(CacheError::corrupt(format!(
                "expected an object reference, found {other:?}"
            ))),
        }
    }

    fn decode_svec(&mut self, len: usize) -> CacheResult<DecodedValue> {
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(self.decode_value()?);
        }
        Ok(DecodedValue::Svec(items))
    }

    fn decode_array(&mut self, ndim: usize) -> CacheResult<DecodedValue> {
        let mut dims = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            dims.push(self.input.read_u32::<LittleEndian>()?);
        }
        let flags = self.input.read_u8()?;
        let has_ptr = flags & 1 != 0;
        let is_union = flags & 2 != 0;
        let elsize = self.input.read_u32::<LittleEndian>()?;
        let element_type = self.decode_object_ref()?;
        let kind = self.input.read_u8()?;
        let payload = match kind {
            0 => {
                let len = read_len_u32(&mut self.input)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    let byte = self.input.read_u8()?;
                    if byte == Tag::NullPointer.as_byte() {
                        items.push(None);
                    } else {
                        let value = match Tag::classify(byte)? {
                            TagKind::WellKnown(idx) => self.decode_wellknown(idx)?,
                            TagKind::Structural(tag) => self.decode_structural(tag)?,
                        };
                        items.push(Some(value));
                    }
                }
                DecodedArrayPayload::Pointers(items)
            }
            1 => {
                let bytes = read_bytes_u32_len(&mut self.input)?;
                let slot_count = read_len_u32(&mut self.input)?;
                let mut pointer_slots = Vec::with_capacity(slot_count);
                for _ in 0..slot_count {
                    let offset = self.input.read_u32::<LittleEndian>()?;
                    let value = self.decode_value()?;
                    pointer_slots.push((offset, value));
                }
                DecodedArrayPayload::InlineWithPointers { bytes, pointer_slots }
            }
            2 => {
                let bytes = read_bytes_u32_len(&mut self.input)?;
                let has_elem_tags = self.input.read_u8()?;
                let elem_tags = if has_elem_tags == 1 {
                    Some(read_bytes_u32_len(&mut self.input)?)
                } else {
                    None
                };
                DecodedArrayPayload::FlatBits { bytes, elem_tags }
            }
            other => return Err(CacheError::corrupt(format!("unknown array payload kind {other}"))),
        };
        Ok(DecodedValue::Array(Box::new(DecodedArray {
            dims,
            element_type,
            has_ptr,
            is_union,
            elsize,
            payload,
        })))
    }

    fn decode_union_all(&mut self) -> CacheResult<DecodedValue> {
        let kind = self.input.read_u8()?;
        let ua = if kind == 1 {
            let module = self.decode_object_ref()?;
            let name = self.read_symbol_field()?;
            DecodedUnionAll::Named { module, name }
        } else {
            let var = self.decode_object_ref()?;
            let body = Box::new(self.decode_value()?);
            DecodedUnionAll::Inline { var, body }
        };
        Ok(DecodedValue::UnionAll(Box::new(ua)))
    }

    fn decode_generic_record(&mut self, len: usize) -> CacheResult<DecodedValue> {
        let ty = self.decode_object_ref()?;
        let mut bytes = vec![0u8; len];
        self.input.read_exact(&mut bytes)?;
        let slot_count = read_len_u32(&mut self.input)?;
        let mut pointer_slots = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            let offset = self.input.read_u32::<LittleEndian>()?;
            let value = self.decode_value()?;
            pointer_slots.push((offset, value));
        }
        Ok(DecodedValue::GenericRecord(Box::new(DecodedGenericRecord {
            ty,
            bytes,
            pointer_slots,
        })))
    }

    fn decode_bigint(&mut self) -> CacheResult<DecodedValue> {
        let negative = self.input.read_u8()? != 0;
        let len = read_len_u32(&mut self.input)?;
        let mut limbs = Vec::with_capacity(len);
        for _ in 0..len {
            limbs.push(self.input.read_u64::<LittleEndian>()?);
        }
        Ok(DecodedValue::BigInt { negative, limbs })
    }

    fn read_symbol_field(&mut self) -> CacheResult<precache_common::Symbol> {
        read_symbol(&mut self.input)
    }

    // ---- §4.3 Type -------------------------------------------------------

    fn decode_type_body(&mut self, pos: Position) -> CacheResult<DecodedType> {
        let sub_tag = self.input.read_u8()?;
        let type_name = self.decode_object_ref()?;
        let param_count = read_len_u32(&mut self.input)?;
        let mut parameters = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            parameters.push(self.decode_object_ref()?);
        }
        if sub_tag == 6 {
            return Ok(DecodedType {
                type_name,
                parameters,
                full: None,
            });
        }
        if sub_tag != 5 {
            return Err(CacheError::corrupt(format!("unknown type sub-tag {sub_tag}")));
        }
        let flags = TypeFlags::from_bits_truncate(self.input.read_u32::<LittleEndian>()? as u16);
        let hash = self.input.read_u32::<LittleEndian>()?;
        let super_type = if self.input.read_u8()? == 1 {
            Some(self.decode_object_ref()?)
        } else {
            None
        };
        let field_count = read_len_u32(&mut self.input)?;
        let mut field_types = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            field_types.push(self.decode_object_ref()?);
        }
        let layout_tag = self.input.read_u8()?;
        let layout = match layout_tag {
            0xFF => None,
            1 => Some(Layout::LikeArray),
            2 => Some(Layout::LikeUnit),
            3 => Some(Layout::LikePointer),
            0 => {
                let size = self.input.read_u32::<LittleEndian>()?;
                let field_offset_count = read_len_u32(&mut self.input)?;
                let mut field_offsets = Vec::with_capacity(field_offset_count);
                for _ in 0..field_offset_count {
                    field_offsets.push(self.input.read_u32::<LittleEndian>()?);
                }
                let pointer_offset_count = read_len_u32(&mut self.input)?;
                let mut pointer_offsets = Vec::with_capacity(pointer_offset_count);
                for _ in 0..pointer_offset_count {
                    pointer_offsets.push(self.input.read_u32::<LittleEndian>()?);
                }
                Some(Layout::Verbatim {
                    size,
                    field_offsets,
                    pointer_offsets,
                })
            }
            other => return Err(CacheError::corrupt(format!("unknown layout tag {other}"))),
        };
        let has_singleton = self.input.read_u8()? != 0;
        Ok(DecodedType {
            type_name,
            parameters,
            full: Some(DecodedTypeBody {
                super_type,
                field_types,
                layout,
                singleton_instance: if has_singleton {
                    Some(DecodedValue::Singleton(pos))
                } else {
                    None
                },
                flags,
                hash,
            }),
        })
    }

    fn decode_type_name_body(&mut self) -> CacheResult<DecodedTypeName> {
        let internal = self.input.read_u8()? != 0;
        let module = self.decode_object_ref()?;
        let name = self.read_symbol_field()?;
        if !internal {
            return Ok(DecodedTypeName {
                module,
                name,
                internal,
                field_names: Vec::new(),
                primary_wrapper: None,
                method_table: None,
                hash: 0,
                flags: TypeNameFlags::empty(),
                max_methods: 0,
                uninitialized_count: 0,
                atomic_fields: 0,
                const_fields: 0,
            });
        }
        let field_count = read_len_u32(&mut self.input)?;
        let mut field_names = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            field_names.push(self.read_symbol_field()?);
        }
        let primary_wrapper = if self.input.read_u8()? == 1 {
            Some(self.decode_object_ref()?)
        } else {
            None
        };
        let method_table = if self.input.read_u8()? == 1 {
            Some(self.decode_object_ref()?)
        } else {
            None
        };
        let hash = self.input.read_u32::<LittleEndian>()?;
        let flags = TypeNameFlags::from_bits_truncate(self.input.read_u8()?);
        let max_methods = self.input.read_u32::<LittleEndian>()?;
        let uninitialized_count = self.input.read_u32::<LittleEndian>()?;
        let atomic_fields = self.input.read_u64::<LittleEndian>()?;
        let const_fields = self.input.read_u64::<LittleEndian>()?;
        Ok(DecodedTypeName {
            module,
            name,
            internal,
            field_names,
            primary_wrapper,
            method_table,
            hash,
            flags,
            max_methods,
            uninitialized_count,
            atomic_fields,
            const_fields,
        })
    }

    fn decode_method_table_body(&mut self) -> CacheResult<DecodedMethodTable> {
        let def_count = read_len_u32(&mut self.input)?;
        let mut defs = Vec::with_capacity(def_count);
        for _ in 0..def_count {
            defs.push(self.decode_object_ref()?);
        }
        let backedge_count = read_len_u32(&mut self.input)?;
        let mut backedges = Vec::with_capacity(backedge_count);
        for _ in 0..backedge_count {
            let sig_len = read_len_u32(&mut self.input)?;
            let mut sig = Vec::with_capacity(sig_len);
            for _ in 0..sig_len {
                sig.push(self.decode_object_ref()?);
            }
            let caller = self.decode_object_ref()?;
            backedges.push((sig, caller));
        }
        Ok(DecodedMethodTable { defs, backedges })
    }

    // ---- §4.3 Module ------------------------------------------------------

    fn decode_module_body(&mut self) -> CacheResult<DecodedModule> {
        let name = self.read_symbol_field()?;
        let external = self.input.read_u8()?;
        if external == 1 {
            let parent = self.decode_object_ref()?;
            return Ok(DecodedModule::ExternalNested { name, parent });
        }
        if external == 2 {
            let uuid_hi = self.input.read_u64::<LittleEndian>()?;
            let uuid_lo = self.input.read_u64::<LittleEndian>()?;
            return Ok(DecodedModule::ExternalTopLevel {
                uuid: (uuid_hi, uuid_lo),
            });
        }
        let has_parent = self.input.read_u8()?;
        let parent = if has_parent == 1 {
            Some(self.decode_object_ref()?)
        } else {
            None
        };
        let mut bindings = Vec::new();
        loop {
            let binding_name = self.read_symbol_field_or_terminator()?;
            let Some(binding_name) = binding_name else {
                break;
            };
            let value = if self.input.read_u8()? == 1 {
                Some(self.decode_value()?)
            } else {
                None
            };
            let ty = if self.input.read_u8()? == 1 {
                Some(self.decode_object_ref()?)
            } else {
                None
            };
            let flags = BindingFlags::from_bits_truncate(self.input.read_u8()?);
            bindings.push(DecodedBinding {
                name: binding_name,
                value,
                owner: Position(u64::MAX), // filled in by the recaching pipeline once `id` is known.
                flags,
                ty,
            });
        }
        let using_count = read_len_u32(&mut self.input)?;
        let mut usings = Vec::with_capacity(using_count);
        for _ in 0..using_count {
            usings.push(self.decode_object_ref()?);
        }
        let is_top_mod = self.input.read_u8()? != 0;
        let uuid_hi = self.input.read_u64::<LittleEndian>()?;
        let uuid_lo = self.input.read_u64::<LittleEndian>()?;
        let build_id = self.input.read_u64::<LittleEndian>()?;
        Ok(DecodedModule::Internal {
            name,
            parent,
            bindings,
            usings,
            is_top_mod,
            uuid: (uuid_hi, uuid_lo),
            build_id,
        })
    }

    /// Reads one length-prefixed symbol, or `None` if the length field is
    /// the terminating zero (§4.3 Module: "a terminating null name").
    fn read_symbol_field_or_terminator(&mut self) -> CacheResult<Option<precache_common::Symbol>> {
        let len = self.input.read_u32::<LittleEndian>()?;
        if len == 0 {
            return Ok(None);
        }
        let mut buf = vec![0u8; len as usize];
        self.input.read_exact(&mut buf)?;
        let s = String::from_utf8(buf)
            .map_err(|e| CacheError::corrupt(format!("binding name is not valid utf-8: {e}")))?;
        Ok(Some(precache_common::intern(&s)))
    }

    // ---- §4.3 Method / Method instance / Code instance --------------------

    fn decode_method_body(&mut self) -> CacheResult<DecodedMethod> {
        const INTERNAL: u8 = 1 << 0;
        const EXTERNAL_MT: u8 = 1 << 1;
        const HAS_NEW_ROOTS: u8 = 1 << 2;
        let mode = self.input.read_u8()?;
        let sig_len = read_len_u32(&mut self.input)?;
        let mut signature = Vec::with_capacity(sig_len);
        for _ in 0..sig_len {
            signature.push(self.decode_object_ref()?);
        }
        let module = self.decode_object_ref()?;
        let owner_table_pos = self.decode_object_ref()?;
        let owner_table = DecodedMethodTableRef::ByType(owner_table_pos);

        if mode & EXTERNAL_MT != 0 {
            let queued_new_roots = if mode & HAS_NEW_ROOTS != 0 {
                let worklist_key = self.read_symbol_field()?;
                let root_count = read_len_u32(&mut self.input)?;
                let mut roots = Vec::with_capacity(root_count);
                for _ in 0..root_count {
                    roots.push(self.decode_value()?);
                }
                Some(DecodedQueuedRoots { worklist_key, roots })
            } else {
                None
            };
            return Ok(DecodedMethod {
                signature,
                module,
                owner_table,
                external: true,
                internal: DecodedMethodInternal {
                    specializations: Vec::new(),
                    name: precache_common::intern(""),
                    file: precache_common::intern(""),
                    line: 0,
                    nargs: 0,
                    flags: MethodFlags::empty(),
                    roots: Vec::new(),
                },
                queued_new_roots,
            });
        }

        let spec_count = read_len_u32(&mut self.input)?;
        let mut specializations = Vec::with_capacity(spec_count);
        for _ in 0..spec_count {
            specializations.push(self.decode_object_ref()?);
        }
        let name = self.read_symbol_field()?;
        let file = self.read_symbol_field()?;
        let line = self.input.read_u32::<LittleEndian>()?;
        let nargs = self.input.read_u32::<LittleEndian>()?;
        let flags = MethodFlags::from_bits_truncate(self.input.read_u16::<LittleEndian>()?);
        let root_count = read_len_u32(&mut self.input)?;
        let mut roots = Vec::with_capacity(root_count);
        for _ in 0..root_count {
            roots.push(self.decode_value()?);
        }
        let _ = INTERNAL; // mode bit consumed only for documentation; both branches are fully determined by EXTERNAL_MT.
        Ok(DecodedMethod {
            signature,
            module,
            owner_table,
            external: false,
            internal: DecodedMethodInternal {
                specializations,
                name,
                file,
                line,
                nargs,
                flags,
                roots,
            },
            queued_new_roots: None,
        })
    }

    fn decode_method_instance_body(&mut self) -> CacheResult<DecodedMethodInstance> {
        let internal_code = self.input.read_u8()?;
        let spec_count = read_len_u32(&mut self.input)?;
        let mut spec_types = Vec::with_capacity(spec_count);
        for _ in 0..spec_count {
            spec_types.push(self.decode_object_ref()?);
        }
        let method = if self.input.read_u8()? == 1 {
            Some(self.decode_object_ref()?)
        } else {
            None
        };
        match internal_code {
            0 => Ok(DecodedMethodInstance::NoMethod { spec_types }),
            3 => {
                let method = method.ok_or_else(|| {
                    CacheError::corrupt("external-queued method instance is missing its method reference")
                })?;
                Ok(DecodedMethodInstance::ExternalQueued { spec_types, method })
            }
            2 => {
                let method = method.ok_or_else(|| {
                    CacheError::corrupt("internal method instance is missing its method reference")
                })?;
                let sparam_count = read_len_u32(&mut self.input)?;
                let mut sparam_values = Vec::with_capacity(sparam_count);
                for _ in 0..sparam_count {
                    sparam_values.push(self.decode_object_ref()?);
                }
                let backedge_count = read_len_u32(&mut self.input)?;
                let mut backedges = Vec::with_capacity(backedge_count);
                for _ in 0..backedge_count {
                    backedges.push(self.decode_object_ref()?);
                }
                let code = if self.input.read_u8()? == 1 {
                    Some(Box::new(self.decode_code_instance_chain()?))
                } else {
                    None
                };
                Ok(DecodedMethodInstance::Internal {
                    spec_types,
                    method,
                    sparam_values,
                    backedges,
                    code,
                })
            }
            other => Err(CacheError::corrupt(format!(
                "unsupported method-instance internal-code {other}"
            ))),
        }
    }

    /// Reads one code-instance chain link and everything after it. Code
    /// instances are exclusively owned by this chain (§3) and never
    /// consume a backref position of their own on either side of the wire
    /// — the caller only calls this when it already read a "has
    /// code"/"has next" byte of 1, so a `NULL_POINTER` tag here is always
    /// a corrupt stream, never a legitimately empty chain.
    fn decode_code_instance_chain(&mut self) -> CacheResult<DecodedCodeInstance> {
        let byte = self.input.read_u8()?;
        if byte == Tag::NullPointer.as_byte() {
            return Err(CacheError::corrupt(
                "code-instance chain has no cacheable entry but the method instance claimed to have code",
            ));
        }
        if byte != Tag::CodeInstance.as_byte() {
            return Err(CacheError::corrupt(format!(
                "expected CODE_INSTANCE tag, found byte {byte}"
            )));
        }
        let flags = self.input.read_u8()?;
        let validate = flags & 1 != 0;
        let relocatability = if flags & 2 != 0 {
            Relocatability::NotRelocatable
        } else {
            Relocatability::Relocatable
        };
        let def = self.decode_object_ref()?;
        let min_world = self.input.read_u64::<LittleEndian>()?;
        let max_world = self.input.read_u64::<LittleEndian>()?;
        let (inferred, rettype) = if validate || min_world == 0 {
            let inferred = if self.input.read_u8()? == 1 {
                Some(read_bytes_u32_len(&mut self.input)?)
            } else {
                None
            };
            let rettype = self.decode_object_ref()?;
            (inferred, Some(rettype))
        } else {
            (None, None)
        };
        let next = if self.input.read_u8()? == 1 {
            Some(Box::new(self.decode_code_instance_chain()?))
        } else {
            None
        };
        Ok(DecodedCodeInstance {
            def,
            validate,
            // This format never writes a separate constant-return value
            // or an explicit precompile flag; both are left at their
            // inert defaults for forward compatibility with
            // `decoded.rs`'s fuller shape.
            const_return: None,
            precompile: false,
            min_world,
            max_world,
            inferred,
            rettype,
            relocatability,
            next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finalizer::FinalizerList;
    use crate::position::Position as Pos;
    use crate::save_backrefs::SaveBackrefs;
    use byteorder::WriteBytesExt;
    use precache_tags::Tag;

    #[test]
    fn decodes_null() {
        let bytes = vec![Tag::Null.as_byte()];
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(dec.decode_value().unwrap(), DecodedValue::Null));
    }

    #[test]
    fn decodes_small_int64_wellknown() {
        let bytes = vec![
            precache_tags::STRUCTURAL_TAG_COUNT + wellknown::index_of(&WellKnownValue::SmallInt64(5)).unwrap(),
        ];
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(dec.decode_value().unwrap(), DecodedValue::Int64(5)));
    }

    #[test]
    fn decodes_int64_short_form() {
        let mut bytes = vec![Tag::Int64Short.as_byte()];
        bytes.write_i32::<LittleEndian>(70_000).unwrap();
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(dec.decode_value().unwrap(), DecodedValue::Int64(70_000)));
    }

    #[test]
    fn decodes_short_backref_and_flags_it() {
        let mut bytes = Vec::new();
        Pos(3).needs_unique(true).write(&mut bytes).unwrap();
        let mut dec = Decoder::new(&bytes);
        let v = dec.decode_value().unwrap();
        assert!(matches!(v, DecodedValue::Object(Pos(3))));
        assert_eq!(dec.backrefs.flag_ref_list(), &[Pos(3)]);
    }

    #[test]
    fn decodes_symbol_short_form() {
        let mut bytes = vec![Tag::SymbolShort.as_byte()];
        bytes.write_u8(3).unwrap();
        bytes.extend_from_slice(b"foo");
        let mut dec = Decoder::new(&bytes);
        match dec.decode_value().unwrap() {
            DecodedValue::Symbol(s) => assert_eq!(s.as_str(), "foo"),
            other => panic!("expected symbol, got {other:?}"),
        }
    }

    #[test]
    fn decodes_common_symbol() {
        let idx = common_symbols::index_of(precache_common::intern("Base")).unwrap();
        let bytes = vec![Tag::CommonSymbol.as_byte(), idx];
        let mut dec = Decoder::new(&bytes);
        match dec.decode_value().unwrap() {
            DecodedValue::Symbol(s) => assert_eq!(s.as_str(), "Base"),
            other => panic!("expected symbol, got {other:?}"),
        }
    }

    #[test]
    fn decodes_empty_svec() {
        let bytes = vec![Tag::SvecShort.as_byte(), 0];
        let mut dec = Decoder::new(&bytes);
        match dec.decode_value().unwrap() {
            DecodedValue::Svec(items) => assert!(items.is_empty()),
            other => panic!("expected svec, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_a_handful_of_positions_through_save_and_load_backrefs() {
        // Not a byte-level round trip (no `Host` to source real objects
        // from yet) — just confirms `SaveBackrefs`'s implicit numbering
        // matches what `LoadBackrefs`/`Decoder::resolve_backref` expect.
        let mut save = SaveBackrefs::new();
        let obj_a = precache_host::ObjectRef::Module(precache_host::ModuleId(1));
        let obj_b = precache_host::ObjectRef::Module(precache_host::ModuleId(2));
        let (pos_a, _) = save.position_of_or_assign(obj_a);
        let (pos_b, _) = save.position_of_or_assign(obj_b);
        assert_eq!(pos_a, Pos(0));
        assert_eq!(pos_b, Pos(1));

        let mut load = LoadBackrefs::new();
        let r0 = load.reserve_next();
        let r1 = load.reserve_next();
        assert_eq!(r0, pos_a);
        assert_eq!(r1, pos_b);
        let _ = FinalizerList::new();
    }
}
