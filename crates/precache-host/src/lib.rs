//! Runtime object model the precache engine reads and writes (§3 Data
//! Model), plus an in-memory simulated runtime (`SimRuntime`) standing in
//! for the host collaborators §1 lists as out of scope.

pub mod arena;
pub mod gc;
pub mod host;
pub mod ids;
pub mod method;
pub mod module;
pub mod sim;
pub mod types;
pub mod value;
pub mod world;

pub use gc::{GcDisableGuard, GcState};
pub use host::Host;
pub use ids::{
    CodeInstanceId, MethodId, MethodInstanceId, MethodTableId, ModuleId, ObjectRef, TypeId,
    TypeNameId,
};
pub use method::{CodeInstanceDef, MethodDef, MethodFlags, MethodInstanceDef, Relocatability, WORLD_INFINITY};
pub use module::{Binding, BindingFlags, ModuleDef};
pub use sim::SimRuntime;
pub use types::{Layout, MethodTableDef, TypeDef, TypeFlags, TypeNameDef, TypeNameFlags, TypeStructuralKey};
pub use value::{ArrayPayload, ArrayValue, GenericRecord, UnionAll, Value};
pub use world::WorldCounter;
