//! §5 "not re-entrant": at most one save or load may be in flight against a
//! given [`crate::CacheEngine`] at a time. Mirrors `precache_host::gc`'s
//! acquire-guard-on-drop shape.

use std::sync::atomic::{AtomicBool, Ordering};

use precache_common::{CacheError, CacheResult};

#[derive(Default)]
pub struct ReentrancyGuard {
    active: AtomicBool,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> CacheResult<ReentrancyToken<'_>> {
        if self.active.swap(true, Ordering::AcqRel) {
            return Err(CacheError::semantic(
                "this cache engine does not support reentrant save/restore calls",
            ));
        }
        Ok(ReentrancyToken { flag: &self.active })
    }
}

pub struct ReentrancyToken<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ReentrancyToken<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
