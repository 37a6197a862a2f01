//! §6 `srctext_appendix`: the original source text archived alongside the
//! cache, addressed by the dependency block's patched pointer. Its
//! consumer (diffing archived source against disk to decide staleness) is
//! out of scope — this crate only frames the bytes.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use precache_common::{CacheError, CacheResult};

#[derive(Clone, Debug, PartialEq)]
pub struct SrcTextEntry {
    pub path: String,
    pub content: Vec<u8>,
}

pub fn write_srctext_appendix(out: &mut impl Write, entries: &[SrcTextEntry]) -> CacheResult<()> {
    for e in entries {
        out.write_u32::<LittleEndian>(e.path.len() as u32)?;
        out.write_all(e.path.as_bytes())?;
        out.write_u64::<LittleEndian>(e.content.len() as u64)?;
        out.write_all(&e.content)?;
    }
    out.write_u32::<LittleEndian>(0)?;
    Ok(())
}

pub fn read_srctext_appendix(r: &mut impl Read) -> CacheResult<Vec<SrcTextEntry>> {
    let mut entries = Vec::new();
    loop {
        let path_len = r.read_u32::<LittleEndian>()? as usize;
        if path_len == 0 {
            break;
        }
        let mut path_bytes = vec![0u8; path_len];
        r.read_exact(&mut path_bytes)?;
        let path = String::from_utf8(path_bytes)
            .map_err(|e| CacheError::corrupt(format!("srctext path is not valid utf-8: {e}")))?;
        let content_len = r.read_u64::<LittleEndian>()? as usize;
        let mut content = vec![0u8; content_len];
        r.read_exact(&mut content)?;
        entries.push(SrcTextEntry { path, content });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_srctext_appendix() {
        let entries = vec![SrcTextEntry {
            path: "src/a.jl".into(),
            content: b"module A end".to_vec(),
        }];
        let mut buf = Vec::new();
        write_srctext_appendix(&mut buf, &entries).unwrap();
        let decoded = read_srctext_appendix(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, entries);
    }
}
