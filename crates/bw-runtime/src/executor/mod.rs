//! Executor capability consumed by the worker core (spec.md §4.3).
//!
//! The real map-task / source-split execution engines are out of scope
//! (spec.md §1) — these are small, honest simulations driven by the work
//! item's opaque payload, just enough to exercise every invariant in
//! spec.md §8 end to end. A tagged enum stands in for the trait-object
//! `Executor` the spec describes, the same way [`bw_core::WorkItemKind`]
//! stands in for the dynamically-typed payload it is built from (spec.md
//! §9's "dynamic-typed work payloads" redesign flag applies equally here).

mod map_task;
mod source_split;

pub use map_task::MapTaskExecutor;
pub use source_split::CustomSourceSplitExecutor;

use bw_core::{DynamicSplitRequest, DynamicSplitResult, ExecutorError, Progress, SourceOperationResponse, WorkItemKind};

pub enum WorkExecutor {
    MapTask(MapTaskExecutor),
    SourceSplit(CustomSourceSplitExecutor),
}

impl WorkExecutor {
    pub fn execute(&self) -> Result<(), ExecutorError> {
        match self {
            WorkExecutor::MapTask(e) => e.execute(),
            WorkExecutor::SourceSplit(e) => e.execute(),
        }
    }

    pub fn progress(&self) -> Progress {
        match self {
            WorkExecutor::MapTask(e) => e.progress(),
            WorkExecutor::SourceSplit(e) => e.progress(),
        }
    }

    pub fn request_dynamic_split(&self, req: DynamicSplitRequest) -> Option<DynamicSplitResult> {
        match self {
            WorkExecutor::MapTask(e) => e.request_dynamic_split(req),
            WorkExecutor::SourceSplit(e) => e.request_dynamic_split(req),
        }
    }

    /// `Some` only once a `SourceOperationSplitTask` executor has finished
    /// executing; `None` for map tasks (spec.md §4.3).
    pub fn source_split_response(&self) -> Option<SourceOperationResponse> {
        match self {
            WorkExecutor::MapTask(_) => None,
            WorkExecutor::SourceSplit(e) => e.response(),
        }
    }
}

/// Builds the executor matching a work item's kind. Per spec.md §9, an
/// unrecognized kind is unreachable given the closed [`WorkItemKind`] enum;
/// a malformed payload inside a known kind still fails construction.
pub fn build_executor(kind: &WorkItemKind) -> Result<WorkExecutor, ExecutorError> {
    match kind {
        WorkItemKind::MapTask(payload) => {
            Ok(WorkExecutor::MapTask(MapTaskExecutor::from_payload(payload)?))
        }
        WorkItemKind::SourceOperationSplitTask(payload) => Ok(WorkExecutor::SourceSplit(
            CustomSourceSplitExecutor::from_payload(payload)?,
        )),
    }
}
