//! §5 "a cooperative 'disable GC during deserialize' primitive" and the §9
//! design note modeling it as a scoped suspension token.

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide flag the real garbage collector would consult before
/// running a collection. The engine never collects itself; this is purely
/// the cooperative signal §1 describes the GC as honoring.
#[derive(Debug, Default)]
pub struct GcState {
    disabled: AtomicBool,
}

impl GcState {
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}

/// RAII guard acquired at the top of `save_incremental`/`restore_incremental`
/// and released on every exit path, including error returns (§5: "a scoped
/// acquisition, guaranteed release on all exit paths including errors").
pub struct GcDisableGuard<'a> {
    state: &'a GcState,
}

impl<'a> GcDisableGuard<'a> {
    pub fn acquire(state: &'a GcState) -> Self {
        state.disabled.store(true, Ordering::SeqCst);
        Self { state }
    }
}

impl Drop for GcDisableGuard<'_> {
    fn drop(&mut self) {
        self.state.disabled.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_disables_then_releases_on_drop() {
        let state = GcState::default();
        assert!(!state.is_disabled());
        {
            let _guard = GcDisableGuard::acquire(&state);
            assert!(state.is_disabled());
        }
        assert!(!state.is_disabled());
    }
}
