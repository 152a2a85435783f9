//! Domain model: queue ids, task targets and callables, diagnostic contexts.

pub mod context;
pub mod ids;
pub mod target;

pub use context::DiagnosticContext;
pub use ids::{Id, IdMarker, QueueId};
pub use target::{
    Callback, ErrorCallback, Method, Owner, OwnerKey, Target, TaskResult, callback,
    error_callback, same_owner,
};
