//! Recaching pipeline and public save/restore operations (§4.6, §4.7, §5,
//! §6): the layer that turns the codec's position-addressed decode and the
//! edge collector's forward graph into running host state, under a
//! GC-disable and not-reentrant guard pair.

pub mod engine;
pub mod extext;
pub mod materialize;
pub mod payload;
pub mod pipeline;
pub mod reentrancy;
pub mod report;

pub use engine::CacheEngine;
pub use report::{PlatformBanner, RestoreReport};
