//! §4.7 World-counter integration and the §9 `with_world` design note.

use std::sync::atomic::{AtomicU64, Ordering};

/// The runtime's global monotonically increasing world counter (GLOSSARY
/// "World counter").
#[derive(Debug, Default)]
pub struct WorldCounter {
    current: AtomicU64,
}

impl WorldCounter {
    pub fn new(initial: u64) -> Self {
        Self {
            current: AtomicU64::new(initial),
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Reserves a fresh world by incrementing the counter, returning the
    /// new value (§4.7 "A fresh world is reserved at load start").
    pub fn reserve_fresh(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn set(&self, world: u64) -> u64 {
        self.current.swap(world, Ordering::SeqCst)
    }

    /// Temporarily advances the world counter for the duration of `f`, then
    /// restores it — used around the host callbacks the engine suspends
    /// into (preference hashing, unique-deps computation, §5 "Suspension
    /// points"). Modeled as an RAII-style guard per §9's design note rather
    /// than manual save/restore at each call site.
    pub fn with_world<R>(&self, world: u64, f: impl FnOnce() -> R) -> R {
        let previous = self.set(world);
        let _restore = WithWorld {
            counter: self,
            previous,
        };
        f()
    }
}

struct WithWorld<'a> {
    counter: &'a WorldCounter,
    previous: u64,
}

impl Drop for WithWorld<'_> {
    fn drop(&mut self) {
        self.counter.set(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_fresh_increments() {
        let w = WorldCounter::new(10);
        assert_eq!(w.reserve_fresh(), 11);
        assert_eq!(w.current(), 11);
    }

    #[test]
    fn with_world_restores_on_exit() {
        let w = WorldCounter::new(5);
        let observed = w.with_world(99, || w.current());
        assert_eq!(observed, 99);
        assert_eq!(w.current(), 5);
    }
}
