//! Result types for the §6 restore operations.

use precache_host::ModuleId;

/// Identity the caller asserts the running process has; compared against
/// the cache file's header (§6 format table, §7 item a).
pub type PlatformBanner = precache_format::RuntimeIdentity;

/// What `restore_incremental`/`restore_incremental_from_buffer` hand back
/// on success: the modules the cache file installed, and the order their
/// `__init__` hooks must run in (§4.6 "module-init list returned", §6).
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub restored_modules: Vec<ModuleId>,
    pub init_order: Vec<ModuleId>,
}
