//! The static well-known-value table addressed by tags
//! `STRUCTURAL_TAG_COUNT..=255` (§4.1): "primitive types, the empty
//! tuple/string/vector, small boxed integers −0..20 in both int32 and int64
//! widths, the current task's root, built-in type objects."

use crate::tag::STRUCTURAL_TAG_COUNT;
use precache_common::{intern, Symbol};
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WellKnownValue {
    PrimitiveType(Symbol),
    BuiltinTypeObject(Symbol),
    EmptyTuple,
    EmptyString,
    EmptyVector,
    SmallInt32(i8),
    SmallInt64(i8),
    CurrentTaskRoot,
}

const PRIMITIVE_TYPE_NAMES: &[&str] = &[
    "Nothing", "Bool", "Int8", "Int16", "Int32", "Int64", "Int128", "UInt8", "UInt16", "UInt32",
    "UInt64", "UInt128", "Float16", "Float32", "Float64", "Char",
];

const BUILTIN_TYPE_OBJECT_NAMES: &[&str] = &[
    "DataType", "TypeName", "Method", "MethodInstance", "CodeInstance", "Module", "Symbol",
    "Array", "String", "Function", "Union", "UnionAll", "TypeVar",
];

fn build_table() -> Vec<WellKnownValue> {
    let mut table = Vec::with_capacity(256 - STRUCTURAL_TAG_COUNT as usize);
    for name in PRIMITIVE_TYPE_NAMES {
        table.push(WellKnownValue::PrimitiveType(intern(name)));
    }
    table.push(WellKnownValue::EmptyTuple);
    table.push(WellKnownValue::EmptyString);
    table.push(WellKnownValue::EmptyVector);
    table.push(WellKnownValue::CurrentTaskRoot);
    for name in BUILTIN_TYPE_OBJECT_NAMES {
        table.push(WellKnownValue::BuiltinTypeObject(intern(name)));
    }
    // Small boxed integers -0..20, both widths (§4.1).
    for i in 0..=20i8 {
        table.push(WellKnownValue::SmallInt32(i));
    }
    for i in 0..=20i8 {
        table.push(WellKnownValue::SmallInt64(i));
    }
    table
}

static TABLE: OnceLock<Vec<WellKnownValue>> = OnceLock::new();

fn table() -> &'static [WellKnownValue] {
    TABLE.get_or_init(build_table)
}

/// Looks up a well-known value by its index (the tag byte minus
/// `STRUCTURAL_TAG_COUNT`).
pub fn by_index(index: u8) -> Option<WellKnownValue> {
    table().get(index as usize).copied()
}

/// Finds the table index for `value`, if it is present — used by the
/// encoder to collapse a runtime singleton to one or two bytes instead of
/// a full backref round-trip.
pub fn index_of(value: &WellKnownValue) -> Option<u8> {
    table().iter().position(|v| v == value).map(|i| i as u8)
}

pub fn table_len() -> usize {
    table().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_index() {
        let v = WellKnownValue::PrimitiveType(intern("Int64"));
        let idx = index_of(&v).expect("Int64 should be in the well-known table");
        assert_eq!(by_index(idx), Some(v));
    }

    #[test]
    fn small_ints_both_widths_present() {
        assert!(index_of(&WellKnownValue::SmallInt32(0)).is_some());
        assert!(index_of(&WellKnownValue::SmallInt64(20)).is_some());
    }

    #[test]
    fn table_fits_in_remaining_tag_space() {
        assert!(table_len() + STRUCTURAL_TAG_COUNT as usize <= 256);
    }
}
