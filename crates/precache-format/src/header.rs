//! §6 cache file header: magic, version, byte-order mark, pointer size, and
//! the NUL-terminated platform/build identity strings. `format_version` is
//! the one big-endian field in the whole format — everything past the
//! header is little-endian (§6 "Multi-byte integers are little-endian").

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use precache_common::limits::{BYTE_ORDER_MARK, FORMAT_VERSION, MAGIC};
use precache_common::{CacheError, CacheResult};

/// The running process's own identity, compared field-by-field against a
/// loaded cache's header (§6, §7 "header-incompatible").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeIdentity {
    pub pointer_size: u8,
    pub platform_uname: String,
    pub platform_arch: String,
    pub runtime_version: String,
    pub build_branch: String,
    pub build_commit: String,
}

/// The header as read off the wire, before any compatibility check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheHeader {
    pub format_version: u16,
    pub byte_order_mark: u16,
    pub identity: RuntimeIdentity,
}

impl CacheHeader {
    pub fn for_current_process(identity: RuntimeIdentity) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            byte_order_mark: BYTE_ORDER_MARK,
            identity,
        }
    }
}

fn write_cstr(out: &mut impl Write, s: &str) -> CacheResult<()> {
    out.write_all(s.as_bytes())?;
    out.write_u8(0)?;
    Ok(())
}

fn read_cstr(r: &mut impl Read) -> CacheResult<String> {
    let mut bytes = Vec::new();
    loop {
        let b = r.read_u8()?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8(bytes).map_err(|e| CacheError::corrupt(format!("platform string is not valid utf-8: {e}")))
}

pub fn write_header(out: &mut impl Write, header: &CacheHeader) -> CacheResult<()> {
    out.write_all(&MAGIC)?;
    out.write_u16::<BigEndian>(header.format_version)?;
    out.write_u16::<BigEndian>(header.byte_order_mark)?;
    out.write_u8(header.identity.pointer_size)?;
    write_cstr(out, &header.identity.platform_uname)?;
    write_cstr(out, &header.identity.platform_arch)?;
    write_cstr(out, &header.identity.runtime_version)?;
    write_cstr(out, &header.identity.build_branch)?;
    write_cstr(out, &header.identity.build_commit)?;
    Ok(())
}

pub fn read_header(r: &mut impl Read) -> CacheResult<CacheHeader> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(CacheError::header("magic signature mismatch"));
    }
    let format_version = r.read_u16::<BigEndian>()?;
    let byte_order_mark = r.read_u16::<BigEndian>()?;
    let pointer_size = r.read_u8()?;
    let platform_uname = read_cstr(r)?;
    let platform_arch = read_cstr(r)?;
    let runtime_version = read_cstr(r)?;
    let build_branch = read_cstr(r)?;
    let build_commit = read_cstr(r)?;
    Ok(CacheHeader {
        format_version,
        byte_order_mark,
        identity: RuntimeIdentity {
            pointer_size,
            platform_uname,
            platform_arch,
            runtime_version,
            build_branch,
            build_commit,
        },
    })
}

/// Quick compatibility probe (§6 `read_verify_header`): true only if every
/// header field matches the running process's own identity exactly. Never
/// errors on a mismatch — only on a truncated/unreadable stream, which is
/// itself evidence the file is not a cache file at all.
pub fn read_verify_header(r: &mut impl Read, expected: &RuntimeIdentity) -> CacheResult<bool> {
    let header = read_header(r)?;
    Ok(header.format_version == FORMAT_VERSION
        && header.byte_order_mark == BYTE_ORDER_MARK
        && &header.identity == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_identity() -> RuntimeIdentity {
        RuntimeIdentity {
            pointer_size: 8,
            platform_uname: "Linux".into(),
            platform_arch: "x86_64".into(),
            runtime_version: "1.0.0".into(),
            build_branch: "main".into(),
            build_commit: "deadbeef".into(),
        }
    }

    #[test]
    fn round_trips_header() {
        let header = CacheHeader::for_current_process(sample_identity());
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        let decoded = read_header(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn verify_rejects_bad_magic() {
        let mut buf = vec![0u8; 8];
        buf.extend_from_slice(&[0, 1, 0xFE, 0xFF, 8]);
        let err = read_header(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, CacheError::HeaderIncompatible(_)));
    }

    #[test]
    fn verify_rejects_identity_mismatch() {
        let header = CacheHeader::for_current_process(sample_identity());
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        let mut other = sample_identity();
        other.runtime_version = "2.0.0".into();
        let ok = read_verify_header(&mut Cursor::new(&buf), &other).unwrap();
        assert!(!ok);
    }

    #[test]
    fn verify_accepts_matching_identity() {
        let header = CacheHeader::for_current_process(sample_identity());
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        let ok = read_verify_header(&mut Cursor::new(&buf), &sample_identity()).unwrap();
        assert!(ok);
    }
}
