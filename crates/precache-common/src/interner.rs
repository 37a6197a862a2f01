//! Symbol interning.
//!
//! The cache format stores identifiers (method names, binding names, module
//! names, type-name fields) as length-prefixed UTF-8 and re-interns them on
//! load. A [`Symbol`] is the interned handle; two symbols compare equal iff
//! they were interned from the same byte string, matching the runtime's own
//! "one `Symbol` per name" invariant (§3, Symbol).

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

/// An interned name. Cheap to copy, compares by integer id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn as_str(self) -> Arc<str> {
        global_interner().resolve(self)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A sharded string interner, safe to call concurrently from other runtime
/// threads while a save/load is in flight (only the backref tables and edge
/// maps are exclusive to the engine; symbol interning is process-wide).
pub struct ShardedInterner {
    by_str: DashMap<Arc<str>, u32, FxBuildHasher>,
    by_id: DashMap<u32, Arc<str>, FxBuildHasher>,
    next: AtomicU32,
}

impl ShardedInterner {
    fn new() -> Self {
        Self {
            by_str: DashMap::default(),
            by_id: DashMap::default(),
            next: AtomicU32::new(0),
        }
    }

    pub fn intern(&self, name: &str) -> Symbol {
        if let Some(id) = self.by_str.get(name) {
            return Symbol(*id);
        }
        // Racing inserts are fine: the loser's id is simply never looked up again.
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let owned: Arc<str> = Arc::from(name);
        self.by_str.entry(owned.clone()).or_insert(id);
        let id = *self.by_str.get(name).expect("just inserted");
        self.by_id.entry(id).or_insert(owned);
        Symbol(id)
    }

    pub fn resolve(&self, sym: Symbol) -> Arc<str> {
        self.by_id
            .get(&sym.0)
            .map(|v| v.clone())
            .unwrap_or_else(|| Arc::from(""))
    }

    pub fn len(&self) -> usize {
        self.by_str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_str.is_empty()
    }
}

static GLOBAL: OnceLock<ShardedInterner> = OnceLock::new();

fn global_interner() -> &'static ShardedInterner {
    GLOBAL.get_or_init(ShardedInterner::new)
}

/// Interns `name` in the process-wide table, re-using an existing `Symbol`
/// if this exact byte string has been seen before.
pub fn intern(name: &str) -> Symbol {
    global_interner().intern(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_interns_to_same_symbol() {
        let a = intern("Base.Array");
        let b = intern("Base.Array");
        assert_eq!(a, b);
        assert_eq!(a.as_str().as_ref(), "Base.Array");
    }

    #[test]
    fn distinct_strings_intern_distinct_symbols() {
        let a = intern("precache_interner_distinct_a");
        let b = intern("precache_interner_distinct_b");
        assert_ne!(a, b);
    }
}
