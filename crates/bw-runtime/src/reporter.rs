//! Progress reporter (spec.md §4.4): runs alongside the executor, sends
//! periodic non-completion status reports, and carries forward a pending
//! dynamic-split result for exactly one extra cycle.
//!
//! Grounded in the teacher's background-task-with-cooperative-stop pattern
//! (`client-engine/src/worker.rs`'s poll loop), adapted from a
//! daemon-thread-plus-1s-poll design to a `tokio::task` woken by
//! [`tokio::sync::Notify`] — the idiomatic async replacement spec.md §9
//! calls for, without changing the observable stop contract (`stopped`
//! still flips exactly once, on the way out).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bw_core::time::{parse_cloud_time, parse_duration_secs};
use bw_core::{CoordinatorError, DynamicSplitResult, WorkItem, WorkerInfo};
use chrono::Utc;
use tokio::sync::Notify;

use crate::coordinator::{CoordinatorClient, ReportStatusArgs};
use crate::executor::WorkExecutor;
use crate::memory;

const MIN_INTERVAL: Duration = Duration::from_secs(5);
const MAX_INTERVAL: Duration = Duration::from_secs(600);
const LEASE_RENEWAL_SAFETY: Duration = Duration::from_secs(5);

/// `nextInterval` from spec.md §4.4: never past the lease-renewal safety
/// margin, never slower than `MAX_INTERVAL`, never faster than
/// `MIN_INTERVAL` regardless of what the coordinator suggested.
pub fn next_interval(suggested_duration: &str, lease_expire_time: &str) -> Duration {
    let suggested = parse_duration_secs(suggested_duration);
    let deadline = match parse_cloud_time(lease_expire_time) {
        Some(expiry) => {
            ((expiry - Utc::now()).num_milliseconds() as f64 / 1000.0) - LEASE_RENEWAL_SAFETY.as_secs_f64()
        }
        None => 0.0,
    };
    let v = suggested.min(deadline);
    Duration::from_secs_f64(v.clamp(MIN_INTERVAL.as_secs_f64(), MAX_INTERVAL.as_secs_f64()))
}

/// Shared handle used to request a stop and observe that the reporter task
/// has actually exited. `Notify` replaces the original's 1s poll for
/// signaling the stop request; `stopped` is still a plain flag so `Stop()`
/// can wait on it without assuming the notify permit survives a race.
///
/// `notify` is woken with `notify_one()`, not `notify_waiters()`: the loop
/// is only parked on `self.notify.notified()` during one step of each
/// iteration (the `tokio::select!` below), so a `notify_waiters()` landing
/// while it's elsewhere — doing its top-of-loop checks, or awaiting
/// `report_status()` — would wake no one and be lost, stalling shutdown
/// for up to `MAX_INTERVAL`. `notify_one()` instead buffers a permit for
/// the next call to `.notified()` even when nothing is currently waiting.
pub struct ReporterHandle {
    stop_requested: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
    stopped_notify: Arc<Notify>,
    worker: Arc<WorkerInfo>,
    work_item: Arc<WorkItem>,
    client: Arc<CoordinatorClient>,
    desired_lease_duration: Duration,
    pending_split: tokio::sync::Mutex<Option<DynamicSplitResult>>,
}

impl ReporterHandle {
    /// Spawns the reporter loop and returns a handle to stop it later.
    /// `executor` is shared with the blocking `execute()` task; every method
    /// it exposes takes `&self`, so both sides can hold the same `Arc`
    /// concurrently (spec.md §4.3).
    pub fn start(
        worker: Arc<WorkerInfo>,
        work_item: Arc<WorkItem>,
        executor: Arc<WorkExecutor>,
        client: Arc<CoordinatorClient>,
        desired_lease_duration: Duration,
    ) -> (Arc<Self>, tokio::task::JoinHandle<()>) {
        let handle = Arc::new(Self {
            stop_requested: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            stopped_notify: Arc::new(Notify::new()),
            worker,
            work_item,
            client,
            desired_lease_duration,
            pending_split: tokio::sync::Mutex::new(None),
        });

        let task_handle = handle.clone();
        let join = tokio::spawn(async move { task_handle.run_loop(executor).await });

        (handle, join)
    }

    async fn run_loop(self: Arc<Self>, executor: Arc<WorkExecutor>) {
        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }

            memory::log_memory_usage_if_needed(&self.worker.worker_id, false);

            if self.work_item.is_done().await {
                break;
            }

            let progress = executor.progress();
            let pending = self.pending_split.lock().await.take();
            match self.report_status(Some(progress), pending).await {
                Ok(Some(stop_point)) => {
                    self.request_split_for(&executor, stop_point).await;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, work_item_id = %self.work_item.id, "progress report failed, will retry next cycle");
                }
            }

            let snapshot = self.work_item.snapshot().await;
            let sleep_for = next_interval(
                &snapshot.report_status_interval,
                &bw_core::time::format_cloud_time(snapshot.lease_expire_time),
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.notify.notified() => {}
            }
        }

        self.stopped.store(true, Ordering::SeqCst);
        self.stopped_notify.notify_waiters();
    }

    /// Sends one status report. On success, applies the lease-state update
    /// (skipped for completion reports, which carry no further lease) and
    /// returns any `suggestedStopPoint` the coordinator attached, so the
    /// caller can turn it into a dynamic-split request against the executor
    /// and hold the result for the *next* cycle rather than this same call
    /// (spec.md §4.4).
    async fn report_status(
        &self,
        progress: Option<bw_core::Progress>,
        pending_split: Option<DynamicSplitResult>,
    ) -> Result<Option<bw_core::SuggestedStopPoint>, CoordinatorError> {
        let completed = progress.is_none() && pending_split.is_none() && self.work_item.is_done().await;
        let snapshot = self.work_item.snapshot().await;
        let response = self
            .client
            .report_status(
                &self.worker,
                self.desired_lease_duration,
                &self.work_item.id,
                snapshot.next_report_index,
                ReportStatusArgs {
                    completed,
                    progress,
                    dynamic_split_result: pending_split,
                    source_operation_response: None,
                    exception_details: None,
                },
            )
            .await?;

        let Some(state) = response.work_item_service_states.into_iter().next() else {
            return Ok(None);
        };

        if !completed {
            let lease_expire_time = parse_cloud_time(&state.lease_expire_time).unwrap_or_else(Utc::now);
            self.work_item
                .apply_report_response(state.next_report_index, lease_expire_time, state.report_status_interval)
                .await;
        }

        Ok(state.suggested_stop_point)
    }

    /// Resolves a coordinator-suggested stop point into a split request for
    /// the executor, and stashes any resulting split for the next cycle.
    async fn request_split_for(&self, executor: &WorkExecutor, stop_point: bw_core::SuggestedStopPoint) {
        if let Some(result) = executor.request_dynamic_split(stop_point.into()) {
            *self.pending_split.lock().await = Some(result);
        }
    }

    /// `Stop()` from spec.md §4.4: request exit, wait for the loop to
    /// actually finish, then flush any still-pending split as one last
    /// report. That final send's failure propagates — a pending split is a
    /// correctness-bearing commitment, not best-effort telemetry.
    pub async fn stop(&self) -> Result<(), CoordinatorError> {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();

        // `notified()` must be created before checking `stopped`, not after
        // — otherwise a `notify_waiters()` landing between the check and
        // the await is silently missed (Notify's documented safe pattern).
        loop {
            let notified = self.stopped_notify.notified();
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            notified.await;
        }

        let pending = self.pending_split.lock().await.take();
        if let Some(split) = pending {
            self.report_status(None, Some(split)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_interval_clamps_to_min() {
        let lease = bw_core::time::format_cloud_time(Utc::now() + chrono::Duration::seconds(3600));
        let d = next_interval("0.1s", &lease);
        assert_eq!(d, MIN_INTERVAL);
    }

    #[test]
    fn next_interval_clamps_to_max() {
        let lease = bw_core::time::format_cloud_time(Utc::now() + chrono::Duration::seconds(10_000));
        let d = next_interval("100000s", &lease);
        assert_eq!(d, MAX_INTERVAL);
    }

    #[test]
    fn next_interval_respects_lease_safety_margin() {
        // Lease expires in 10s; safety margin is 5s, so deadline is ~5s,
        // which is within [MIN_INTERVAL, MAX_INTERVAL] and should win over
        // a much larger suggested interval.
        let lease = bw_core::time::format_cloud_time(Utc::now() + chrono::Duration::seconds(10));
        let d = next_interval("300s", &lease);
        assert!(d >= Duration::from_secs(4) && d <= Duration::from_secs(6));
    }

    #[test]
    fn next_interval_unparseable_lease_clamps_to_min() {
        let d = next_interval("30s", "not-a-timestamp");
        assert_eq!(d, MIN_INTERVAL);
    }
}
