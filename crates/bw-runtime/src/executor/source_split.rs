//! Simulated `CustomSourceSplitExecutor` (spec.md §4.3): ignores dynamic
//! split requests and produces a final response once `execute` returns.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bw_core::{DynamicSplitRequest, DynamicSplitResult, ExecutorError, Progress, SourceOperationResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SourceSplitSpec {
    #[serde(default = "default_iterations")]
    iterations: u64,
    #[serde(default = "default_step_delay_ms")]
    step_delay_ms: u64,
    #[serde(default)]
    fail_message: Option<String>,
    #[serde(default)]
    result: serde_json::Value,
}

fn default_iterations() -> u64 {
    1
}
fn default_step_delay_ms() -> u64 {
    10
}

pub struct CustomSourceSplitExecutor {
    total_iterations: u64,
    step_delay: Duration,
    fail_message: Option<String>,
    result: serde_json::Value,
    iterations_done: AtomicU64,
    finished: AtomicBool,
}

impl CustomSourceSplitExecutor {
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, ExecutorError> {
        let spec: SourceSplitSpec = serde_json::from_value(payload.clone()).map_err(|e| {
            ExecutorError::Construction(format!("invalid source_operation_split_task payload: {e}"))
        })?;
        if spec.iterations == 0 {
            return Err(ExecutorError::Construction(
                "source_operation_split_task payload: iterations must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            total_iterations: spec.iterations,
            step_delay: Duration::from_millis(spec.step_delay_ms),
            fail_message: spec.fail_message,
            result: spec.result,
            iterations_done: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        })
    }

    pub fn execute(&self) -> Result<(), ExecutorError> {
        for _ in 0..self.total_iterations {
            std::thread::sleep(self.step_delay);
            self.iterations_done.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(msg) = &self.fail_message {
            return Err(ExecutorError::Execution(msg.clone()));
        }
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        let done = self.iterations_done.load(Ordering::Relaxed) as f64;
        Progress {
            fraction_consumed: (done / self.total_iterations as f64).clamp(0.0, 1.0),
        }
    }

    /// Source-split executors may ignore dynamic split requests entirely
    /// (spec.md §4.3).
    pub fn request_dynamic_split(&self, _req: DynamicSplitRequest) -> Option<DynamicSplitResult> {
        None
    }

    pub fn response(&self) -> Option<SourceOperationResponse> {
        if self.finished.load(Ordering::SeqCst) {
            Some(SourceOperationResponse {
                data: self.result.clone(),
            })
        } else {
            None
        }
    }
}
