//! Backref table, value codec, and finalizer list (§4.2, §4.3, §4.5):
//! turns host objects into the flat byte stream the file format wraps,
//! and back into a position-addressed placeholder graph a recaching
//! pipeline can materialize.

pub mod decode;
pub mod decoded;
pub mod encode;
pub mod finalizer;
pub mod load_backrefs;
pub mod position;
pub mod primitives;
pub mod save_backrefs;

pub use decode::Decoder;
pub use decoded::{
    DecodedArray, DecodedArrayPayload, DecodedBinding, DecodedCodeInstance, DecodedGenericRecord,
    DecodedMethod, DecodedMethodInstance, DecodedMethodInternal, DecodedMethodTable,
    DecodedMethodTableRef, DecodedModule, DecodedObject, DecodedQueuedRoots, DecodedType,
    DecodedTypeBody, DecodedTypeName, DecodedUnionAll, DecodedValue,
};
pub use encode::{EncodeOptions, Encoder};
pub use finalizer::{FinalizerAction, FinalizerEntry, FinalizerList};
pub use load_backrefs::LoadBackrefs;
pub use position::{Position, StoredPosition};
pub use save_backrefs::SaveBackrefs;
