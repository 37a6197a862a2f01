//! The precache tag registry (§4.1): a fixed, process-wide palette
//! assigning small integer tags to common runtime singletons so they
//! serialize as one or two bytes.

pub mod common_symbols;
pub mod tag;
pub mod wellknown;

pub use tag::{Tag, TagKind, STRUCTURAL_TAG_COUNT};
pub use wellknown::WellKnownValue;
