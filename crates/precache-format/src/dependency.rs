//! §6 `dependency_block`: a skippable, length-prefixed section listing the
//! source files each worklist module depends on, the host preference
//! names that were consulted while compiling them, a preferences hash, and
//! a placeholder pointer patched in later with the `srctext_appendix`'s
//! real file offset.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use precache_common::{CacheError, CacheResult};

/// One dependency record: the source file's path, its modification time,
/// an optional index into the worklist ("provides" this module), and the
/// dotted module path that declared the dependency.
#[derive(Clone, Debug, PartialEq)]
pub struct DependencyEntry {
    pub path: String,
    pub mtime: f64,
    pub provides_index: u32,
    pub module_path: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DependencyBlock {
    pub entries: Vec<DependencyEntry>,
    pub preferences: Vec<String>,
    pub preferences_hash: u64,
}

fn write_len_str(out: &mut impl Write, s: &str) -> CacheResult<()> {
    out.write_u32::<LittleEndian>(s.len() as u32)?;
    out.write_all(s.as_bytes())?;
    Ok(())
}

fn read_len_str(r: &mut impl Read) -> CacheResult<String> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| CacheError::corrupt(format!("dependency string is not valid utf-8: {e}")))
}

fn write_body(out: &mut Vec<u8>, block: &DependencyBlock) -> CacheResult<()> {
    for e in &block.entries {
        write_len_str(out, &e.path)?;
        out.write_f64::<LittleEndian>(e.mtime)?;
        out.write_u32::<LittleEndian>(e.provides_index)?;
        write_len_str(out, &e.module_path)?;
    }
    out.write_u32::<LittleEndian>(0)?;
    for p in &block.preferences {
        write_len_str(out, p)?;
    }
    out.write_u32::<LittleEndian>(0)?;
    out.write_u64::<LittleEndian>(block.preferences_hash)?;
    Ok(())
}

/// Writes the dependency block, returning the byte offset (within `out`)
/// of the `srctext_pointer_placeholder` field so the caller can patch it
/// once the srctext appendix's real offset is known.
pub fn write_dependency_block(out: &mut Vec<u8>, block: &DependencyBlock) -> CacheResult<usize> {
    let mut body = Vec::new();
    write_body(&mut body, block)?;
    out.write_u64::<LittleEndian>(body.len() as u64)?;
    out.extend_from_slice(&body);
    let placeholder_offset = out.len();
    out.write_i64::<LittleEndian>(0)?;
    Ok(placeholder_offset)
}

/// Patches the placeholder written by [`write_dependency_block`] with the
/// srctext appendix's real offset.
pub fn patch_srctext_pointer(out: &mut [u8], placeholder_offset: usize, srctext_offset: i64) {
    out[placeholder_offset..placeholder_offset + 8].copy_from_slice(&srctext_offset.to_le_bytes());
}

pub fn read_dependency_block(r: &mut impl Read) -> CacheResult<(DependencyBlock, i64)> {
    let block_length = r.read_u64::<LittleEndian>()?;
    let mut body = vec![0u8; block_length as usize];
    r.read_exact(&mut body)?;
    let mut cursor = Cursor::new(&body);

    let mut entries = Vec::new();
    loop {
        let path_len = cursor.read_u32::<LittleEndian>()?;
        if path_len == 0 {
            break;
        }
        let mut path_bytes = vec![0u8; path_len as usize];
        cursor.read_exact(&mut path_bytes)?;
        let path = String::from_utf8(path_bytes)
            .map_err(|e| CacheError::corrupt(format!("dependency path is not valid utf-8: {e}")))?;
        let mtime = cursor.read_f64::<LittleEndian>()?;
        let provides_index = cursor.read_u32::<LittleEndian>()?;
        let module_path = read_len_str(&mut cursor)?;
        entries.push(DependencyEntry {
            path,
            mtime,
            provides_index,
            module_path,
        });
    }

    let mut preferences = Vec::new();
    loop {
        let name_len = cursor.read_u32::<LittleEndian>()?;
        if name_len == 0 {
            break;
        }
        let mut bytes = vec![0u8; name_len as usize];
        cursor.read_exact(&mut bytes)?;
        preferences.push(
            String::from_utf8(bytes)
                .map_err(|e| CacheError::corrupt(format!("preference name is not valid utf-8: {e}")))?,
        );
    }
    let preferences_hash = cursor.read_u64::<LittleEndian>()?;

    let srctext_pointer = r.read_i64::<LittleEndian>()?;
    Ok((
        DependencyBlock {
            entries,
            preferences,
            preferences_hash,
        },
        srctext_pointer,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_patches_pointer() {
        let block = DependencyBlock {
            entries: vec![DependencyEntry {
                path: "src/a.jl".into(),
                mtime: 12345.5,
                provides_index: 1,
                module_path: "A".into(),
            }],
            preferences: vec!["opt_level".into()],
            preferences_hash: 0xABCD,
        };
        let mut out = Vec::new();
        let placeholder = write_dependency_block(&mut out, &block).unwrap();
        patch_srctext_pointer(&mut out, placeholder, 999);

        let (decoded, srctext_pointer) = read_dependency_block(&mut std::io::Cursor::new(&out)).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(srctext_pointer, 999);
    }

    #[test]
    fn block_length_allows_skipping() {
        let block = DependencyBlock {
            entries: vec![],
            preferences: vec![],
            preferences_hash: 7,
        };
        let mut out = Vec::new();
        let placeholder = write_dependency_block(&mut out, &block).unwrap();
        patch_srctext_pointer(&mut out, placeholder, 0);
        let declared_len = u64::from_le_bytes(out[0..8].try_into().unwrap());
        // Total length minus the 8-byte block_length field and the
        // trailing 8-byte pointer must equal the declared body length.
        assert_eq!(declared_len as usize, out.len() - 8 - 8);
    }
}
