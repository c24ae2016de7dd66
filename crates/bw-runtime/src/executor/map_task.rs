//! Simulated `MapTaskExecutor` (spec.md §4.3).
//!
//! Drives a declared number of iterations, optionally failing partway
//! through, and honors at most one dynamic split request — enough surface
//! to exercise the worker core and progress reporter without pretending to
//! run a real pipeline stage.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bw_core::{DynamicSplitRequest, DynamicSplitResult, ExecutorError, Progress};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct MapTaskSpec {
    #[serde(default = "default_iterations")]
    iterations: u64,
    #[serde(default = "default_step_delay_ms")]
    step_delay_ms: u64,
    #[serde(default)]
    fail_after_iterations: Option<u64>,
    #[serde(default)]
    fail_message: Option<String>,
    #[serde(default = "default_true")]
    splittable: bool,
}

fn default_iterations() -> u64 {
    1
}
fn default_step_delay_ms() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

pub struct MapTaskExecutor {
    total_iterations: u64,
    step_delay: Duration,
    fail_after_iterations: Option<u64>,
    fail_message: String,
    splittable: bool,
    split_used: AtomicBool,
    iterations_done: AtomicU64,
}

impl MapTaskExecutor {
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, ExecutorError> {
        let spec: MapTaskSpec = serde_json::from_value(payload.clone())
            .map_err(|e| ExecutorError::Construction(format!("invalid map_task payload: {e}")))?;
        if spec.iterations == 0 {
            return Err(ExecutorError::Construction(
                "map_task payload: iterations must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            total_iterations: spec.iterations,
            step_delay: Duration::from_millis(spec.step_delay_ms),
            fail_after_iterations: spec.fail_after_iterations,
            fail_message: spec.fail_message.unwrap_or_else(|| "boom".to_string()),
            splittable: spec.splittable,
            split_used: AtomicBool::new(false),
            iterations_done: AtomicU64::new(0),
        })
    }

    /// Runs to completion or failure. Takes `&self`: every mutable field is
    /// an atomic, so this can run on a blocking thread while the progress
    /// reporter concurrently calls [`Self::progress`] and
    /// [`Self::request_dynamic_split`] from the async side, matching
    /// spec.md §4.3's "thread-safe, callable while `Execute` runs" contract.
    pub fn execute(&self) -> Result<(), ExecutorError> {
        for i in 0..self.total_iterations {
            if let Some(fail_at) = self.fail_after_iterations {
                if i >= fail_at {
                    return Err(ExecutorError::Execution(format!(
                        "{}\n  at iteration {i} of {}",
                        self.fail_message, self.total_iterations
                    )));
                }
            }
            std::thread::sleep(self.step_delay);
            self.iterations_done.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        let done = self.iterations_done.load(Ordering::Relaxed) as f64;
        Progress {
            fraction_consumed: (done / self.total_iterations as f64).clamp(0.0, 1.0),
        }
    }

    pub fn request_dynamic_split(&self, req: DynamicSplitRequest) -> Option<DynamicSplitResult> {
        if !self.splittable || req.fraction >= 1.0 || req.fraction <= 0.0 {
            return None;
        }
        if self.split_used.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(DynamicSplitResult {
            residual_fraction: 1.0 - req.fraction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_to_completion() {
        let exec = MapTaskExecutor::from_payload(&serde_json::json!({
            "iterations": 3,
            "step_delay_ms": 0,
        }))
        .unwrap();
        exec.execute().unwrap();
        assert_eq!(exec.progress().fraction_consumed, 1.0);
    }

    #[test]
    fn fails_partway_with_message() {
        let exec = MapTaskExecutor::from_payload(&serde_json::json!({
            "iterations": 5,
            "step_delay_ms": 0,
            "fail_after_iterations": 2,
            "fail_message": "boom",
        }))
        .unwrap();
        let err = exec.execute().unwrap_err();
        assert!(err.details().contains("boom"));
    }

    #[test]
    fn split_is_one_shot() {
        let exec = MapTaskExecutor::from_payload(&serde_json::json!({"iterations": 10, "step_delay_ms": 0}))
            .unwrap();
        let first = exec.request_dynamic_split(DynamicSplitRequest { fraction: 0.6 });
        assert!(first.is_some());
        let second = exec.request_dynamic_split(DynamicSplitRequest { fraction: 0.7 });
        assert!(second.is_none());
    }

    #[test]
    fn rejects_invalid_payload() {
        let result = MapTaskExecutor::from_payload(&serde_json::json!({"iterations": 0}));
        assert!(result.is_err());
    }
}
