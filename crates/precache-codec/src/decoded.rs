//! Load-side placeholder object graph (§4.6: "types, methods, method
//! instances, code instances all constructed as placeholder objects
//! pointing to one another through the backref vector"). Every
//! cross-reference here is a [`Position`] rather than a live host id —
//! the recaching pipeline is what turns positions into real ids by
//! materializing each `Decoded*` into the `Host` and recording the
//! mapping in the uniquing table.

use std::sync::Arc;

use precache_common::Symbol;
use precache_host::{BindingFlags, Layout, MethodFlags, Relocatability, TypeFlags, TypeNameFlags};
use precache_tags::WellKnownValue;

use crate::position::Position;

/// The value codec's decode-side counterpart to `precache_host::Value`:
/// identical shape, but object references are backref positions instead
/// of arena ids (§4.3).
#[derive(Clone, Debug)]
pub enum DecodedValue {
    Null,
    Symbol(Symbol),
    Int64(i64),
    Int32(i32),
    UInt8(u8),
    BigInt { negative: bool, limbs: Vec<u64> },
    Bool(bool),
    Str(Arc<str>),
    Svec(Vec<DecodedValue>),
    Array(Box<DecodedArray>),
    UnionAll(Box<DecodedUnionAll>),
    GenericRecord(Box<DecodedGenericRecord>),
    /// Resolved only after recaching (§4.3 Singletons) — holds the type's
    /// position, not the eventual instance value.
    Singleton(Position),
    Object(Position),
    /// A primitive type, builtin type object, the empty vector, or the
    /// current task's root (§4.1) — every well-known entry that needs a
    /// live host to resolve rather than being fully self-describing.
    WellKnown(WellKnownValue),
}

#[derive(Clone, Debug)]
pub enum DecodedUnionAll {
    Named { module: Position, name: Symbol },
    Inline { var: Position, body: Box<DecodedValue> },
}

#[derive(Clone, Debug)]
pub enum DecodedArrayPayload {
    Pointers(Vec<Option<DecodedValue>>),
    InlineWithPointers {
        bytes: Vec<u8>,
        pointer_slots: Vec<(u32, DecodedValue)>,
    },
    FlatBits {
        bytes: Vec<u8>,
        elem_tags: Option<Vec<u8>>,
    },
}

#[derive(Clone, Debug)]
pub struct DecodedArray {
    pub dims: Vec<u32>,
    pub element_type: Position,
    pub has_ptr: bool,
    pub is_union: bool,
    pub elsize: u32,
    pub payload: DecodedArrayPayload,
}

#[derive(Clone, Debug)]
pub struct DecodedGenericRecord {
    pub ty: Position,
    pub bytes: Vec<u8>,
    pub pointer_slots: Vec<(u32, DecodedValue)>,
}

/// §4.3 Type, full record form (sub-tags 0/5/10/11/12) or the shorter
/// external forms (sub-tags 6/7), distinguished by `external_stub`.
#[derive(Clone, Debug)]
pub struct DecodedType {
    pub type_name: Position,
    pub parameters: Vec<Position>,
    /// `Some` only for the full-record sub-tags; the external stub forms
    /// (6/7) carry no body beyond type-name + parameters.
    pub full: Option<DecodedTypeBody>,
}

#[derive(Clone, Debug)]
pub struct DecodedTypeBody {
    pub super_type: Option<Position>,
    pub field_types: Vec<Position>,
    pub layout: Option<Layout>,
    pub singleton_instance: Option<DecodedValue>,
    pub flags: TypeFlags,
    pub hash: u32,
}

#[derive(Clone, Debug)]
pub struct DecodedTypeName {
    pub module: Position,
    pub name: Symbol,
    pub internal: bool,
    pub field_names: Vec<Symbol>,
    pub primary_wrapper: Option<Position>,
    pub method_table: Option<Position>,
    pub hash: u32,
    pub flags: TypeNameFlags,
    pub max_methods: u32,
    pub uninitialized_count: u32,
    pub atomic_fields: u64,
    pub const_fields: u64,
}

#[derive(Clone, Debug)]
pub struct DecodedMethodTable {
    pub defs: Vec<Position>,
    pub backedges: Vec<(Vec<Position>, Position)>,
}

#[derive(Clone, Debug)]
pub struct DecodedBinding {
    pub name: Symbol,
    pub value: Option<DecodedValue>,
    pub owner: Position,
    pub flags: BindingFlags,
    pub ty: Option<Position>,
}

/// §4.3 Module: the two external forms carry just enough to resolve
/// against the already-loaded manifest; the internal form carries the
/// full binding table.
#[derive(Clone, Debug)]
pub enum DecodedModule {
    /// Tag byte 2: resolved by UUID against the already-loaded module
    /// manifest rather than walked as a nested body.
    ExternalTopLevel { uuid: (u64, u64) },
    /// Tag byte 1: resolved by walking up to an already-resolved parent.
    ExternalNested { name: Symbol, parent: Position },
    /// Tag byte 0.
    Internal {
        name: Symbol,
        parent: Option<Position>,
        bindings: Vec<DecodedBinding>,
        usings: Vec<Position>,
        is_top_mod: bool,
        uuid: (u64, u64),
        build_id: u64,
    },
}

/// §4.3 Method: serialization-mode byte determines which fields follow.
#[derive(Clone, Debug)]
pub struct DecodedMethod {
    pub signature: Vec<Position>,
    pub module: Position,
    /// External-method-table reference: either a type or a module+name
    /// pair, per the serialization-mode byte.
    pub owner_table: DecodedMethodTableRef,
    /// Whether the serialization-mode byte had `EXTERNAL_MT` set. The
    /// recaching pipeline (§4.6 steps 2/3) branches on this directly
    /// rather than inferring it from which fields of `internal` came back
    /// empty, since an internal method can legitimately have zero roots
    /// and zero specializations too.
    pub external: bool,
    pub internal: DecodedMethodInternal,
    pub queued_new_roots: Option<DecodedQueuedRoots>,
}

#[derive(Clone, Debug)]
pub enum DecodedMethodTableRef {
    ByType(Position),
    ByModuleAndName(Position, Symbol),
}

/// Present only when the serialization-mode byte has `INTERNAL` set.
#[derive(Clone, Debug)]
pub struct DecodedMethodInternal {
    pub specializations: Vec<Position>,
    pub name: Symbol,
    pub file: Symbol,
    pub line: u32,
    pub nargs: u32,
    pub flags: MethodFlags,
    pub roots: Vec<DecodedValue>,
}

/// Present only when `EXTERNAL_MT | HAS_NEW_ROOTS` is set.
#[derive(Clone, Debug)]
pub struct DecodedQueuedRoots {
    pub worklist_key: Symbol,
    pub roots: Vec<DecodedValue>,
}

/// §4.3 Method instance: the internal-code byte selects the variant.
#[derive(Clone, Debug)]
pub enum DecodedMethodInstance {
    /// 0: top-level thunk, no defining method.
    NoMethod {
        spec_types: Vec<Position>,
    },
    /// 2: internal (worklist method).
    Internal {
        spec_types: Vec<Position>,
        method: Position,
        sparam_values: Vec<Position>,
        backedges: Vec<Position>,
        /// Code instances are exclusively owned by this chain (§3) and
        /// never get a backref position of their own, so the chain is
        /// carried inline rather than through a `Position` indirection.
        code: Option<Box<DecodedCodeInstance>>,
    },
    /// 3: external but queued.
    ExternalQueued {
        spec_types: Vec<Position>,
        method: Position,
    },
}

/// §4.3 Code instance.
#[derive(Clone, Debug)]
pub struct DecodedCodeInstance {
    pub def: Position,
    pub validate: bool,
    pub const_return: Option<DecodedValue>,
    pub precompile: bool,
    pub min_world: u64,
    pub max_world: u64,
    pub inferred: Option<Vec<u8>>,
    pub rettype: Option<Position>,
    pub relocatability: Relocatability,
    pub next: Option<Box<DecodedCodeInstance>>,
}

/// One decoded object, keyed by its backref [`Position`] in
/// [`crate::load_backrefs::LoadBackrefs`]. Code instances are deliberately
/// absent here — they are exclusively owned by a method instance's `code`
/// chain and never consume a backref position of their own on either side
/// of the wire (§4.3).
#[derive(Clone, Debug)]
pub enum DecodedObject {
    Type(DecodedType),
    TypeName(DecodedTypeName),
    MethodTable(DecodedMethodTable),
    Module(DecodedModule),
    Method(DecodedMethod),
    MethodInstance(DecodedMethodInstance),
}
