//! The secondary 256-entry common-symbols table (§4.1): "the most frequent
//! interned names in two tiers (tier 1 sits in the main value table; tier 2
//! is addressed via a `COMMON_SYMBOL` tag + one index byte)."

use precache_common::{intern, Symbol};
use std::sync::OnceLock;

/// Names frequent enough to deserve a dedicated slot. Tier 1 (the first
/// `TIER1_LEN`) are reachable as ordinary well-known values; tier 2 needs
/// the explicit `COMMON_SYMBOL` tag byte.
const NAMES: &[&str] = &[
    "Base", "Core", "Main", "eval", "include", "getproperty", "setproperty!", "getindex",
    "setindex!", "length", "size", "show", "print", "println", "convert", "promote", "iterate",
    "call", "new", "nothing", "true", "false", "begin", "end", "function", "struct", "abstract",
    "mutable", "const", "global", "local", "return",
];

pub const TIER1_LEN: usize = 16;

pub const COMMON_SYMBOLS_SIZE: usize = 256;

static TABLE: OnceLock<Vec<Symbol>> = OnceLock::new();

fn table() -> &'static [Symbol] {
    TABLE.get_or_init(|| NAMES.iter().map(|n| intern(n)).collect())
}

pub fn by_index(index: u8) -> Option<Symbol> {
    table().get(index as usize).copied()
}

pub fn index_of(sym: Symbol) -> Option<u8> {
    table().iter().position(|&s| s == sym).map(|i| i as u8)
}

pub fn is_tier1(index: u8) -> bool {
    (index as usize) < TIER1_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let base = intern("Base");
        let idx = index_of(base).unwrap();
        assert_eq!(by_index(idx), Some(base));
    }

    #[test]
    fn table_within_budget() {
        assert!(table().len() <= COMMON_SYMBOLS_SIZE);
    }
}
