//! Backref positions (§4.2): "Positions are 0-indexed per serializer;
//! position 0 is reserved for the top module." The low bit of the stored
//! position is a flag meaning "needs unique-ing on load" (external types,
//! external methods, external method instances, singletons of external
//! types); the remaining bits are the plain position.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use precache_common::limits::SHORT_BACKREF_LIMIT;
use precache_common::{CacheError, CacheResult};
use precache_tags::Tag;
use std::io::{Read, Write};

/// A 0-indexed slot in the backref vector, as assigned on the save side
/// (real position from `SaveBackrefs`) or read back on the load side
/// (an index into `LoadBackrefs`'s position-indexed vector).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Position(pub u64);

impl Position {
    pub fn needs_unique(self, flag: bool) -> StoredPosition {
        StoredPosition {
            position: self,
            flag,
        }
    }
}

/// A position plus its unique-ing flag, ready to be written as a
/// `SHORT_BACKREF`/`BACKREF` tag + payload.
#[derive(Clone, Copy, Debug)]
pub struct StoredPosition {
    pub position: Position,
    pub flag: bool,
}

impl StoredPosition {
    fn stored_value(self) -> u64 {
        (self.position.0 << 1) | (self.flag as u64)
    }

    /// Writes the appropriate backref tag (`SHORT_BACKREF` below the
    /// 2-byte limit, `BACKREF` otherwise) followed by the stored value.
    pub fn write(self, out: &mut impl Write) -> CacheResult<()> {
        let stored = self.stored_value();
        if stored < SHORT_BACKREF_LIMIT {
            out.write_u8(Tag::ShortBackref.as_byte())?;
            out.write_u16::<LittleEndian>(stored as u16)?;
        } else {
            out.write_u8(Tag::Backref.as_byte())?;
            out.write_u32::<LittleEndian>(
                u32::try_from(stored)
                    .map_err(|_| CacheError::corrupt("backref position overflowed u32"))?,
            )?;
        }
        Ok(())
    }

    pub fn read_short(r: &mut impl Read) -> CacheResult<StoredPosition> {
        let stored = r.read_u16::<LittleEndian>()? as u64;
        Ok(Self::from_stored(stored))
    }

    pub fn read_long(r: &mut impl Read) -> CacheResult<StoredPosition> {
        let stored = r.read_u32::<LittleEndian>()? as u64;
        Ok(Self::from_stored(stored))
    }

    fn from_stored(stored: u64) -> StoredPosition {
        StoredPosition {
            position: Position(stored >> 1),
            flag: stored & 1 != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_position_round_trips_with_flag() {
        let mut buf = Vec::new();
        Position(42).needs_unique(true).write(&mut buf).unwrap();
        assert_eq!(buf[0], Tag::ShortBackref.as_byte());
        let mut cursor = &buf[1..];
        let stored = StoredPosition::read_short(&mut cursor).unwrap();
        assert_eq!(stored.position, Position(42));
        assert!(stored.flag);
    }

    #[test]
    fn large_position_uses_long_form() {
        let mut buf = Vec::new();
        Position(SHORT_BACKREF_LIMIT)
            .needs_unique(false)
            .write(&mut buf)
            .unwrap();
        assert_eq!(buf[0], Tag::Backref.as_byte());
    }
}
