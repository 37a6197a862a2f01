//! §4.1: the fixed, single-byte tag palette. Tags `0..STRUCTURAL_TAG_COUNT`
//! are structural; tags `STRUCTURAL_TAG_COUNT..=255` index the well-known
//! value table (`wellknown.rs`).
//!
//! The two tables (this one and the well-known/common-symbols tables) must
//! be identical on the serializer and deserializer sides of any compatible
//! pair (§4.1 contract); changing either requires a format-version bump
//! (`precache_common::limits::FORMAT_VERSION`).

use precache_common::CacheError;

/// A structural tag: every byte value below [`STRUCTURAL_TAG_COUNT`] names
/// exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Null = 0,
    ShortBackref = 1,
    Backref = 2,
    SymbolShort = 3,
    SymbolLong = 4,
    SvecShort = 5,
    SvecLong = 6,
    Array1d = 7,
    ArrayNd = 8,
    DataType = 9,
    Method = 10,
    MethodInstance = 11,
    CodeInstance = 12,
    Module = 13,
    Int64 = 14,
    Int32 = 15,
    UInt8 = 16,
    Int64Short = 17,
    Int32Short = 18,
    Str = 19,
    Singleton = 20,
    CommonSymbol = 21,
    GenericShort = 22,
    GenericLong = 23,
    NullPointer = 24,
    TypeNameByBuiltinIndex = 25,
    UnionAll = 26,
    TypeVar = 27,
    CoreModule = 28,
    BaseModule = 29,
    BigInt = 30,
    /// A type-name and a method-table are reachable only as named fields
    /// of something else, never as a bare top-level value — but they are
    /// still shared, backref-able objects, so they need their own
    /// introducing tag just like `DataType`/`Method`/etc. (§4.2: without
    /// one, a new body's leading flag byte could collide with
    /// `SHORT_BACKREF`'s tag byte).
    TypeName = 31,
    MethodTable = 32,
}

/// Tags `0..STRUCTURAL_TAG_COUNT` are structural (`Tag`); at and above this
/// value a byte indexes the well-known value table instead.
pub const STRUCTURAL_TAG_COUNT: u8 = 33;

impl Tag {
    pub fn from_byte(byte: u8) -> Option<Tag> {
        use Tag::*;
        Some(match byte {
            0 => Null,
            1 => ShortBackref,
            2 => Backref,
            3 => SymbolShort,
            4 => SymbolLong,
            5 => SvecShort,
            6 => SvecLong,
            7 => Array1d,
            8 => ArrayNd,
            9 => DataType,
            10 => Method,
            11 => MethodInstance,
            12 => CodeInstance,
            13 => Module,
            14 => Int64,
            15 => Int32,
            16 => UInt8,
            17 => Int64Short,
            18 => Int32Short,
            19 => Str,
            20 => Singleton,
            21 => CommonSymbol,
            22 => GenericShort,
            23 => GenericLong,
            24 => NullPointer,
            25 => TypeNameByBuiltinIndex,
            26 => UnionAll,
            27 => TypeVar,
            28 => CoreModule,
            29 => BaseModule,
            30 => BigInt,
            31 => TypeName,
            32 => MethodTable,
            _ => return None,
        })
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parses a raw byte into either a structural tag or a well-known-table
    /// index, matching §4.1's "tags K..255 map to a static array".
    pub fn classify(byte: u8) -> Result<TagKind, CacheError> {
        if byte < STRUCTURAL_TAG_COUNT {
            let tag = Tag::from_byte(byte)
                .ok_or_else(|| CacheError::corrupt(format!("unknown structural tag {byte}")))?;
            Ok(TagKind::Structural(tag))
        } else {
            Ok(TagKind::WellKnown(byte - STRUCTURAL_TAG_COUNT))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagKind {
    Structural(Tag),
    WellKnown(u8),
}
