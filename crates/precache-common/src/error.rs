//! Error taxonomy for the precache engine (§7).
//!
//! Header/manifest/format errors abort the operation and are returned to the
//! caller as [`CacheError`]. World-divergence and recaching failures are
//! *not* represented here: they are absorbed by the recaching pipeline and
//! surfaced as reduced validity, never as an `Err`.

use thiserror::Error;

/// Why a save or load operation failed outright.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache header incompatible: {0}")]
    HeaderIncompatible(String),

    #[error("module manifest mismatch: {0}")]
    ManifestMismatch(String),

    #[error("cache stream corrupt: {0}")]
    FormatCorrupt(String),

    #[error("cannot cache: {0}")]
    SemanticInvalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl CacheError {
    pub fn header(msg: impl Into<String>) -> Self {
        Self::HeaderIncompatible(msg.into())
    }

    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::ManifestMismatch(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::FormatCorrupt(msg.into())
    }

    pub fn semantic(msg: impl Into<String>) -> Self {
        Self::SemanticInvalid(msg.into())
    }
}
