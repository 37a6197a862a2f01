//! §3 Data Model: `Type`, `Type-name`, `Method table`.

use crate::ids::{MethodId, MethodTableId, ModuleId, TypeId, TypeNameId};
use bitflags::bitflags;
use precache_common::Symbol;

bitflags! {
    /// Type flag bits (§4.3 "Full record: ... flag bits").
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TypeFlags: u16 {
        const HAS_LAYOUT       = 1 << 0;
        const HAS_INSTANCE     = 1 << 1;
        const HAS_FREE_TYPEVARS = 1 << 2;
        const CONCRETE         = 1 << 3;
        const DISPATCH_TUPLE   = 1 << 4;
        const BITS_TYPE        = 1 << 5;
        const ZERO_INIT        = 1 << 6;
        const CONCRETE_SUBTYPE = 1 << 7;
        const CACHED_BY_HASH   = 1 << 8;
    }
}

bitflags! {
    /// Type-name flag bits (§4.3 Type-name: "flag bits (abstract, mutable, may-inline-alloc)").
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TypeNameFlags: u8 {
        const ABSTRACT         = 1 << 0;
        const MUTABLE          = 1 << 1;
        const MAY_INLINE_ALLOC = 1 << 2;
    }
}

/// How a type's memory layout is described (§4.3 Full record, `layout` field).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// 1: "same as the built-in array layout"
    LikeArray,
    /// 2: "same as the unit-type layout"
    LikeUnit,
    /// 3: "same as the built-in pointer layout"
    LikePointer,
    /// 0: verbatim layout bytes plus field descriptors and pointer offsets
    Verbatim {
        size: u32,
        field_offsets: Vec<u32>,
        pointer_offsets: Vec<u32>,
    },
}

/// One member of a hash-consed family of structurally-equal types (§3
/// "Types are globally hash-consed: two structurally equal types are the
/// same object.").
#[derive(Clone, Debug)]
pub struct TypeDef {
    pub type_name: TypeNameId,
    pub parameters: Vec<TypeId>,
    pub super_type: Option<TypeId>,
    pub field_types: Vec<TypeId>,
    pub layout: Option<Layout>,
    /// Some types have a unique singleton instance (§3).
    pub singleton: bool,
    pub flags: TypeFlags,
    pub hash: u32,
}

impl TypeDef {
    /// Structural identity used by the hash-consing cache
    /// (`TypeCache::lookup_or_insert`, §1). Two `TypeDef`s with equal keys
    /// are the same type.
    pub fn structural_key(&self) -> TypeStructuralKey {
        TypeStructuralKey {
            type_name: self.type_name,
            parameters: self.parameters.clone(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TypeStructuralKey {
    pub type_name: TypeNameId,
    pub parameters: Vec<TypeId>,
}

/// Identity of a family of types: owns the module, method table, and
/// primary wrapper (§3 Type-name).
#[derive(Clone, Debug)]
pub struct TypeNameDef {
    pub module: ModuleId,
    pub name: Symbol,
    /// Whether this type-name belongs to the worklist ("internal") or was
    /// defined elsewhere ("external", §4.3 Type sub-tags 6/7/11/12).
    pub internal: bool,
    // Internal-only fields (§4.3 Type-name):
    pub field_names: Vec<Symbol>,
    pub primary_wrapper: Option<TypeId>,
    pub method_table: Option<MethodTableId>,
    pub hash: u32,
    pub flags: TypeNameFlags,
    pub max_methods: u32,
    pub uninitialized_count: u32,
    pub atomic_fields: u64,
    pub const_fields: u64,
}

/// Ordered dispatch table for a family of methods; holds back-edges from
/// abstract callees (§3 Method table).
#[derive(Clone, Debug, Default)]
pub struct MethodTableDef {
    pub defs: Vec<MethodId>,
    /// `(signature, caller)` back-edge pairs recorded against abstract
    /// dispatch entries (§4.4).
    pub backedges: Vec<(Vec<TypeId>, crate::ids::MethodInstanceId)>,
}
