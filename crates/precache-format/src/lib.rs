//! Cache file framing (§6): the bit-exact header, work_list, dependency
//! block, mod_list, payload placement, and srctext appendix that wrap the
//! tag-stream `precache-codec` produces. This crate treats the payload as
//! an opaque byte blob — it never interprets a single tag byte.

pub mod dependency;
pub mod header;
pub mod manifest;
pub mod srctext;

pub use dependency::{read_dependency_block, write_dependency_block, DependencyBlock, DependencyEntry};
pub use header::{read_header, read_verify_header, write_header, CacheHeader, RuntimeIdentity};
pub use manifest::{read_module_list, write_module_list, ModuleManifestEntry};
pub use srctext::{read_srctext_appendix, write_srctext_appendix, SrcTextEntry};

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use precache_common::{CacheError, CacheResult};

/// Everything a loaded cache file decomposes into, with `payload` still an
/// opaque byte slice for `precache-codec::Decoder` to consume.
#[derive(Clone, Debug)]
pub struct CacheArtifact {
    pub header: CacheHeader,
    pub work_list: Vec<ModuleManifestEntry>,
    pub dependencies: DependencyBlock,
    pub mod_list: Vec<ModuleManifestEntry>,
    pub payload: Vec<u8>,
    pub srctext: Vec<SrcTextEntry>,
}

/// Assembles a complete cache file (§6 section order: header, work_list,
/// dependency_block, mod_list, payload, srctext_appendix), patching the
/// dependency block's srctext pointer once the appendix's real offset is
/// known.
pub fn write_cache_file(
    header: &CacheHeader,
    work_list: &[ModuleManifestEntry],
    dependencies: &DependencyBlock,
    mod_list: &[ModuleManifestEntry],
    payload: &[u8],
    srctext: &[SrcTextEntry],
) -> CacheResult<Vec<u8>> {
    let mut out = Vec::new();
    write_header(&mut out, header)?;
    write_module_list(&mut out, work_list)?;
    let placeholder_offset = write_dependency_block(&mut out, dependencies)?;
    write_module_list(&mut out, mod_list)?;
    out.extend_from_slice(payload);
    let srctext_offset = out.len() as i64;
    write_srctext_appendix(&mut out, srctext)?;
    dependency::patch_srctext_pointer(&mut out, placeholder_offset, srctext_offset);
    Ok(out)
}

/// Parses a complete cache file back into its sections. The payload's
/// extent is bounded by the dependency block's own (already-patched)
/// srctext pointer, so no separate length needs to be carried for it.
pub fn read_cache_file(bytes: &[u8]) -> CacheResult<CacheArtifact> {
    let mut cursor = Cursor::new(bytes);
    let header = read_header(&mut cursor)?;
    let work_list = read_module_list(&mut cursor)?;
    let (dependencies, srctext_offset) = read_dependency_block(&mut cursor)?;
    let mod_list = read_module_list(&mut cursor)?;

    let payload_start = cursor.position() as usize;
    let srctext_start = usize::try_from(srctext_offset)
        .map_err(|_| CacheError::corrupt("negative srctext pointer"))?;
    if srctext_start < payload_start || srctext_start > bytes.len() {
        return Err(CacheError::corrupt("srctext pointer out of range"));
    }
    let payload = bytes[payload_start..srctext_start].to_vec();

    let mut srctext_cursor = Cursor::new(&bytes[srctext_start..]);
    let srctext = read_srctext_appendix(&mut srctext_cursor)?;

    Ok(CacheArtifact {
        header,
        work_list,
        dependencies,
        mod_list,
        payload,
        srctext,
    })
}

/// Reads just enough of `bytes` to decide compatibility, without parsing
/// the manifest or payload (§6 `read_verify_header`).
pub fn verify_header_only(bytes: &[u8], expected: &RuntimeIdentity) -> CacheResult<bool> {
    let mut cursor = Cursor::new(bytes);
    read_verify_header(&mut cursor, expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> RuntimeIdentity {
        RuntimeIdentity {
            pointer_size: 8,
            platform_uname: "Linux".into(),
            platform_arch: "x86_64".into(),
            runtime_version: "1.0.0".into(),
            build_branch: "main".into(),
            build_commit: "cafebabe".into(),
        }
    }

    #[test]
    fn round_trips_a_full_cache_file() {
        let header = CacheHeader::for_current_process(identity());
        let work_list = vec![ModuleManifestEntry {
            name: "Foo".into(),
            uuid: (1, 2),
            build_id: 3,
        }];
        let deps = DependencyBlock {
            entries: vec![DependencyEntry {
                path: "src/Foo.jl".into(),
                mtime: 1.0,
                provides_index: 1,
                module_path: "Foo".into(),
            }],
            preferences: vec![],
            preferences_hash: 42,
        };
        let mod_list = vec![ModuleManifestEntry {
            name: "Base".into(),
            uuid: (4, 5),
            build_id: 6,
        }];
        let payload = vec![0xAA, 0xBB, 0xCC];
        let srctext = vec![SrcTextEntry {
            path: "src/Foo.jl".into(),
            content: b"module Foo end".to_vec(),
        }];

        let bytes =
            write_cache_file(&header, &work_list, &deps, &mod_list, &payload, &srctext).unwrap();
        let artifact = read_cache_file(&bytes).unwrap();

        assert_eq!(artifact.header, header);
        assert_eq!(artifact.work_list, work_list);
        assert_eq!(artifact.dependencies, deps);
        assert_eq!(artifact.mod_list, mod_list);
        assert_eq!(artifact.payload, payload);
        assert_eq!(artifact.srctext, srctext);
    }

    #[test]
    fn verify_header_only_does_not_need_the_rest_of_the_file() {
        let header = CacheHeader::for_current_process(identity());
        let mut truncated = Vec::new();
        write_header(&mut truncated, &header).unwrap();
        assert!(verify_header_only(&truncated, &identity()).unwrap());
    }

    #[test]
    fn corrupt_magic_is_format_corrupt_not_a_panic() {
        let bytes = vec![0u8; 4];
        let err = read_cache_file(&bytes).unwrap_err();
        assert!(matches!(err, CacheError::Io(_)) || matches!(err, CacheError::HeaderIncompatible(_)));
    }
}
