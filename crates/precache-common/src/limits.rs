//! Centralized limits and wire constants for the precache format.
//!
//! Centralizing these values documents the rationale for each one and keeps
//! the encoder and decoder from drifting apart on a magic number.

/// Size of the tag palette (§4.1). Tags 0..255 fit a single byte; the
/// structural tags occupy the low end, well-known values fill the rest.
pub const TAG_TABLE_SIZE: usize = 256;

/// Size of the secondary common-symbols table (§4.1), addressed via a
/// `COMMON_SYMBOL` tag plus one index byte.
pub const COMMON_SYMBOLS_SIZE: usize = 256;

/// Backref positions below this value are encoded with the 2-byte
/// `SHORT_BACKREF` tag; at or above it, the 4-byte `BACKREF` tag is used
/// (§4.2). Matches the stream's own `u16`/`u32` split.
pub const SHORT_BACKREF_LIMIT: u64 = 1 << 16;

/// Small boxed integers -0..20 get dedicated tag-table entries in both
/// 32-bit and 64-bit widths (§4.1), covering the overwhelmingly common case
/// of tiny indices and counters without a backref round-trip.
pub const SMALL_INT_RANGE: std::ops::RangeInclusive<i64> = 0..=20;

/// Magic bytes at the head of every cache file: an 8-byte PNG-style
/// signature so truncation and non-cache files are rejected before any
/// version check runs (§6).
pub const MAGIC: [u8; 8] = [0x99, b'P', b'R', b'E', b'C', b'A', b'C', b'H'];

/// Cache format version. Bumping this invalidates every prior cache file;
/// the engine makes no attempt at forward/backward compatibility (§1
/// Non-goals).
pub const FORMAT_VERSION: u16 = 1;

/// Byte-order mark written right after the version, so a reader built for
/// the opposite endianness fails fast instead of misinterpreting every
/// subsequent field.
pub const BYTE_ORDER_MARK: u16 = 0xFEFF;
