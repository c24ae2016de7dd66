//! Progress and dynamic-split payloads exchanged between the worker and the
//! coordinator. Shapes are intentionally minimal: the real
//! `ApproximateProgress`/`DynamicSplitResult` schemas belong to the
//! coordinator API and are out of scope (spec.md §9, Open Questions).

use serde::{Deserialize, Serialize};

/// A point along a work item's progress, expressed as a fraction in `[0,
/// 1]` of the declared total work.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub fraction_consumed: f64,
}

/// A coordinator-suggested split point, carried on a progress-report
/// response and translated into a [`DynamicSplitRequest`] for the executor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuggestedStopPoint {
    pub fraction: f64,
}

/// Request passed to `Executor::request_dynamic_split`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicSplitRequest {
    pub fraction: f64,
}

impl From<SuggestedStopPoint> for DynamicSplitRequest {
    fn from(stop: SuggestedStopPoint) -> Self {
        DynamicSplitRequest { fraction: stop.fraction }
    }
}

/// The at-least-once-delivered result of a successful dynamic split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicSplitResult {
    pub residual_fraction: f64,
}

/// Response from a `SourceOperationSplitTask` executor, attached to the
/// completion report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOperationResponse {
    pub data: serde_json::Value,
}
