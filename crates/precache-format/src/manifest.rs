//! §6 `work_list` and `mod_list`: both are the same repeated
//! `{ name, uuid_hi, uuid_lo, build_id }` shape terminated by a zero-length
//! name, so one reader/writer pair serves both.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use precache_common::CacheResult;

/// One module manifest record: enough to resolve against an already-loaded
/// module (by UUID) without touching the live `Host` (§6; the precache
/// engine is what turns this into a `ModuleId` via `Host::find_module`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleManifestEntry {
    pub name: String,
    pub uuid: (u64, u64),
    pub build_id: u64,
}

pub fn write_module_list(out: &mut impl Write, entries: &[ModuleManifestEntry]) -> CacheResult<()> {
    for e in entries {
        out.write_u32::<LittleEndian>(e.name.len() as u32)?;
        out.write_all(e.name.as_bytes())?;
        out.write_u64::<LittleEndian>(e.uuid.0)?;
        out.write_u64::<LittleEndian>(e.uuid.1)?;
        out.write_u64::<LittleEndian>(e.build_id)?;
    }
    out.write_u32::<LittleEndian>(0)?;
    Ok(())
}

pub fn read_module_list(r: &mut impl Read) -> CacheResult<Vec<ModuleManifestEntry>> {
    let mut entries = Vec::new();
    loop {
        let name_len = r.read_u32::<LittleEndian>()? as usize;
        if name_len == 0 {
            break;
        }
        let mut name_bytes = vec![0u8; name_len];
        r.read_exact(&mut name_bytes)?;
        let name = String::from_utf8(name_bytes)
            .map_err(|e| precache_common::CacheError::corrupt(format!("module name is not valid utf-8: {e}")))?;
        let uuid_hi = r.read_u64::<LittleEndian>()?;
        let uuid_lo = r.read_u64::<LittleEndian>()?;
        let build_id = r.read_u64::<LittleEndian>()?;
        entries.push(ModuleManifestEntry {
            name,
            uuid: (uuid_hi, uuid_lo),
            build_id,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_module_list() {
        let entries = vec![
            ModuleManifestEntry {
                name: "Base".into(),
                uuid: (1, 2),
                build_id: 3,
            },
            ModuleManifestEntry {
                name: "Core".into(),
                uuid: (4, 5),
                build_id: 6,
            },
        ];
        let mut buf = Vec::new();
        write_module_list(&mut buf, &entries).unwrap();
        let decoded = read_module_list(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn empty_list_is_just_the_terminator() {
        let mut buf = Vec::new();
        write_module_list(&mut buf, &[]).unwrap();
        assert_eq!(buf, 0u32.to_le_bytes());
    }
}
