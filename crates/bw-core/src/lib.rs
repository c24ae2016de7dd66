//! Shared wire types, time formats and error taxonomy for the batch worker
//! runtime. Kept dependency-light and free of I/O, mirroring the teacher's
//! `client-core` crate: small DTO/config types any of the other crates can
//! depend on without pulling in `reqwest`/`axum`.

pub mod error;
pub mod progress;
pub mod time;
pub mod work_item;

pub use error::{CoordinatorError, ExecutorError, WorkerError};
pub use progress::{
    DynamicSplitRequest, DynamicSplitResult, Progress, SourceOperationResponse,
    SuggestedStopPoint,
};
pub use work_item::{LeaseState, WorkItem, WorkItemKind, WorkerInfo};
