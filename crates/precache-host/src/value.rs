//! The dynamic `Value` sum-type the codec dispatches on (§9 design note:
//! "Reimplement as a sum-type (variant) per runtime kind, with an explicit
//! `Value` enum carrying a pointer to the concrete payload").

use crate::ids::{ObjectRef, TypeId};
use precache_common::Symbol;
use std::sync::Arc;

/// A parameterized-type abstraction (§4.3 Union-all).
#[derive(Clone, Debug)]
pub enum UnionAll {
    /// A known primary wrapper from a non-worklist module, referenced by
    /// name rather than inlined.
    Named {
        module: crate::ids::ModuleId,
        name: Symbol,
    },
    /// Bound type variable plus body, encoded inline.
    Inline { var: TypeId, body: Box<Value> },
}

/// One array payload shape (§4.3 Array). The host is a simulated runtime
/// with no raw memory layout, so "inline-with-pointers" and "flat bits" are
/// modeled as explicit byte buffers with pointer-slot offsets rather than
/// reinterpreted native structs — the wire shape is preserved even though
/// the in-memory representation differs from the original C layout.
#[derive(Clone, Debug)]
pub enum ArrayPayload {
    /// Every element is a recursively-encoded value; a null cpointer is its
    /// own sentinel so load reconstructs a null of the correct type.
    Pointers(Vec<Option<Value>>),
    /// Raw bytes with recursively-encoded values interleaved at fixed
    /// pointer offsets.
    InlineWithPointers {
        bytes: Vec<u8>,
        pointer_slots: Vec<(u32, Value)>,
    },
    /// Flat bits, optionally tagged per-element for bits-union arrays.
    FlatBits {
        bytes: Vec<u8>,
        elem_tags: Option<Vec<u8>>,
    },
}

#[derive(Clone, Debug)]
pub struct ArrayValue {
    pub dims: Vec<u32>,
    pub element_type: TypeId,
    pub has_ptr: bool,
    pub is_union: bool,
    pub elsize: u32,
    pub payload: ArrayPayload,
}

/// A generic record: a typed, fixed-layout blob with pointer slots
/// interleaved at known offsets (§4.3 Generic records).
#[derive(Clone, Debug)]
pub struct GenericRecord {
    pub ty: TypeId,
    pub bytes: Vec<u8>,
    pub pointer_slots: Vec<(u32, Value)>,
}

/// The heterogeneous value the codec's encoder/decoder dispatches on
/// (§4.3). Object-graph entities carry their arena id; the codec's backref
/// table keys on `ObjectRef`, not on this enum, since the same object may
/// be reached through many `Value::Object` occurrences.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Symbol(Symbol),
    Int64(i64),
    Int32(i32),
    UInt8(u8),
    /// GMP-style limb-size integer, §4.3 "Big integers".
    BigInt { negative: bool, limbs: Vec<u64> },
    Bool(bool),
    Str(Arc<str>),
    Svec(Vec<Value>),
    Array(Box<ArrayValue>),
    UnionAll(Box<UnionAll>),
    GenericRecord(Box<GenericRecord>),
    /// The decoded value of a singleton is the type's `instance` slot,
    /// resolved only after recaching (§4.3 Singletons).
    Singleton(TypeId),
    Object(ObjectRef),
}

impl Value {
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(obj) => Some(*obj),
            Value::Singleton(ty) => Some(ObjectRef::Type(*ty)),
            _ => None,
        }
    }
}
