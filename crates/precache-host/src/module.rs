//! §3 Data Model: `Module`, `Binding`.

use crate::ids::{ModuleId, ObjectRef, TypeId};
use bitflags::bitflags;
use indexmap::IndexMap;
use precache_common::Symbol;

bitflags! {
    /// Binding flag bits (§3 Binding "flags (exported, constant, imported, deprecated)").
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BindingFlags: u8 {
        const EXPORTED   = 1 << 0;
        const CONSTANT   = 1 << 1;
        const IMPORTED   = 1 << 2;
        const DEPRECATED = 1 << 3;
    }
}

/// One slot in a module's binding table (§3 Binding).
#[derive(Clone, Debug)]
pub struct Binding {
    pub name: Symbol,
    pub value: Option<ObjectRef>,
    pub owner: ModuleId,
    pub flags: BindingFlags,
    pub ty: Option<TypeId>,
}

/// Named container with a bindings table, usings list, UUID, build-id, and
/// child modules (§3 Module).
#[derive(Clone, Debug)]
pub struct ModuleDef {
    pub name: Symbol,
    pub parent: Option<ModuleId>,
    /// Insertion-ordered so re-serialization is deterministic, matching the
    /// "followed by a terminating null name" fixed-order encoding in §4.3.
    pub bindings: IndexMap<Symbol, Binding>,
    pub usings: Vec<ModuleId>,
    pub children: Vec<ModuleId>,
    pub is_top_mod: bool,
    pub uuid: (u64, u64),
    pub build_id: u64,
}

impl ModuleDef {
    pub fn new(name: Symbol, parent: Option<ModuleId>, uuid: (u64, u64), build_id: u64) -> Self {
        Self {
            name,
            parent,
            bindings: IndexMap::new(),
            usings: Vec::new(),
            children: Vec::new(),
            is_top_mod: parent.is_none(),
            uuid,
            build_id,
        }
    }

    pub fn set_binding(&mut self, binding: Binding) {
        self.bindings.insert(binding.name, binding);
    }
}
