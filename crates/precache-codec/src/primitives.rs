//! Low-level byte-level helpers shared by every per-kind encoder/decoder:
//! length-prefixed symbols, strings, and raw byte blobs. Multi-byte
//! integers are little-endian throughout the payload (§4.3 footer note;
//! the file header's `format_version` field is the one big-endian
//! exception, handled in `precache-format`, not here).

use std::io::{Read, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use precache_common::{intern, CacheError, CacheResult, Symbol};

pub fn write_bytes_u32_len(out: &mut impl Write, bytes: &[u8]) -> CacheResult<()> {
    out.write_u32::<LittleEndian>(bytes.len() as u32)?;
    out.write_all(bytes)?;
    Ok(())
}

pub fn read_bytes_u32_len(r: &mut impl Read) -> CacheResult<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Symbol: length + UTF-8 bytes, re-interned on load (§4.3 Symbol).
pub fn write_symbol(out: &mut impl Write, sym: Symbol) -> CacheResult<()> {
    write_bytes_u32_len(out, sym.as_str().as_bytes())
}

pub fn read_symbol(r: &mut impl Read) -> CacheResult<Symbol> {
    let bytes = read_bytes_u32_len(r)?;
    let s = String::from_utf8(bytes)
        .map_err(|e| CacheError::corrupt(format!("symbol is not valid utf-8: {e}")))?;
    Ok(intern(&s))
}

pub fn write_str(out: &mut impl Write, s: &str) -> CacheResult<()> {
    write_bytes_u32_len(out, s.as_bytes())
}

pub fn read_arc_str(r: &mut impl Read) -> CacheResult<Arc<str>> {
    let bytes = read_bytes_u32_len(r)?;
    let s = String::from_utf8(bytes)
        .map_err(|e| CacheError::corrupt(format!("string is not valid utf-8: {e}")))?;
    Ok(Arc::from(s))
}

/// Every "short/long" pair in §4.3 (svec, generic records) is selected by
/// which *tag* the encoder writes (`SvecShort` vs `SvecLong`, and so on),
/// not by an in-band marker byte — this just centralizes the threshold
/// and the two body widths that follow whichever tag was chosen.
pub fn is_long_form(len: usize) -> bool {
    len >= 0xFF
}

pub fn write_len_u8(out: &mut impl Write, len: usize) -> CacheResult<()> {
    out.write_u8(u8::try_from(len).map_err(|_| CacheError::corrupt("short-form length overflowed u8"))?)?;
    Ok(())
}

pub fn read_len_u8(r: &mut impl Read) -> CacheResult<usize> {
    Ok(r.read_u8()? as usize)
}

pub fn write_len_u32(out: &mut impl Write, len: usize) -> CacheResult<()> {
    out.write_u32::<LittleEndian>(len as u32)?;
    Ok(())
}

pub fn read_len_u32(r: &mut impl Read) -> CacheResult<usize> {
    Ok(r.read_u32::<LittleEndian>()? as usize)
}
