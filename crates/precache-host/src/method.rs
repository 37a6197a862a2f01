//! §3 Data Model: `Method`, `Method instance`, `Code instance`.

use crate::ids::{CodeInstanceId, MethodId, MethodInstanceId, MethodTableId, ModuleId, TypeId};
use bitflags::bitflags;
use precache_common::Symbol;

bitflags! {
    /// Method flag bits (§3 Method "flags"; the serialization-mode byte in
    /// §4.3 is distinct and lives on the codec side, not here).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MethodFlags: u16 {
        const IS_VARARG        = 1 << 0;
        const PURE              = 1 << 1;
        const IS_OPAQUE_CLOSURE = 1 << 2;
        const CONST_PROP        = 1 << 3;
    }
}

/// A source definition keyed by its type-signature (§3 Method).
#[derive(Clone, Debug)]
pub struct MethodDef {
    pub module: ModuleId,
    pub owner_table: MethodTableId,
    pub name: Symbol,
    /// The method's type-signature, encoded as a tuple of argument types.
    pub signature: Vec<TypeId>,
    pub specializations: Vec<MethodInstanceId>,
    /// Referenced constants (§3 "a roots array").
    pub roots: Vec<crate::ids::ObjectRef>,
    pub file: Symbol,
    pub line: u32,
    pub nargs: u32,
    pub flags: MethodFlags,
}

impl MethodDef {
    pub fn is_opaque_closure(&self) -> bool {
        self.flags.contains(MethodFlags::IS_OPAQUE_CLOSURE)
    }
}

/// A particular specialization of a method at concrete argument types
/// (§3 Method instance).
#[derive(Clone, Debug)]
pub struct MethodInstanceDef {
    /// `None` for a top-level thunk with no defining method (§4.3
    /// method-instance internal-code 0).
    pub method: Option<MethodId>,
    pub spec_types: Vec<TypeId>,
    pub sparam_values: Vec<TypeId>,
    /// Callers of this instance (§3 "a list of back-edges (callers)").
    pub backedges: Vec<MethodInstanceId>,
    /// Head of the code-instance chain (§3 "owns a chain of code instances").
    pub code: Option<CodeInstanceId>,
}

/// Whether a code instance is safe to reuse across processes (§3
/// Code instance "relocatability flag").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relocatability {
    Relocatable,
    NotRelocatable,
}

/// One compiled/inferred result for a method instance, valid over a
/// world-age range (§3 Code instance).
#[derive(Clone, Debug)]
pub struct CodeInstanceDef {
    pub def: MethodInstanceId,
    pub min_world: u64,
    pub max_world: u64,
    /// Opaque inferred IR blob; the JIT/compiler that produced it is out of
    /// scope (§1) — the engine only reads/writes this field.
    pub inferred: Option<Vec<u8>>,
    pub rettype: TypeId,
    pub relocatability: Relocatability,
    /// Whether this instance still needs edge verification before its
    /// `max_world` can be promoted (§4.6 step 8).
    pub validate: bool,
    /// `false` when this entry carries a `PartialOpaque` return type that
    /// cannot be cached (§4.3 Code instance); the codec skips it and
    /// continues down `next`.
    pub cacheable: bool,
    pub next: Option<CodeInstanceId>,
}

pub const WORLD_INFINITY: u64 = u64::MAX;

impl CodeInstanceDef {
    pub fn is_valid_at(&self, world: u64) -> bool {
        self.min_world <= world && world <= self.max_world
    }
}
