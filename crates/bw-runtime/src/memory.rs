//! Resident-set-size logging, rate-limited across every caller (spec.md
//! §4.6). Grounded in the teacher's periodic-status-line pattern
//! (`client-engine/src/worker.rs` logs plot progress on a timer); here the
//! timer is a shared timestamp rather than a per-task interval so the
//! reporter loop and the per-item setup path share one budget.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

const RATE_LIMIT_SECONDS: i64 = 300;

static LAST_REPORT_EPOCH_SECS: AtomicI64 = AtomicI64::new(0);

/// Logs current RSS (MB) for `worker_id`, unless the last emission (across
/// all callers) was less than 300s ago. `force` bypasses the rate limit and
/// resets the window.
pub fn log_memory_usage_if_needed(worker_id: &str, force: bool) {
    let now = Utc::now().timestamp();

    if force {
        LAST_REPORT_EPOCH_SECS.store(now, Ordering::SeqCst);
    } else {
        let last = LAST_REPORT_EPOCH_SECS.load(Ordering::SeqCst);
        if now - last < RATE_LIMIT_SECONDS {
            return;
        }
        // Lose the race gracefully: if another caller just reset the
        // window, skip rather than double-log.
        if LAST_REPORT_EPOCH_SECS
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
    }

    let rss_mb = current_rss_mb();
    tracing::info!(worker_id, rss_mb, "worker memory usage");
}

/// Reads `VmRSS` from `/proc/self/status`. Returns `0` if unavailable
/// (non-Linux, sandboxed, or the file is missing), matching the spec's
/// "never fatal" framing for this diagnostic.
fn current_rss_mb() -> u64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return 0;
    };
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest
                .trim()
                .trim_end_matches(" kB")
                .parse()
                .unwrap_or(0);
            return kb / 1024;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_always_logs_without_panicking() {
        log_memory_usage_if_needed("worker-test", true);
    }

    #[test]
    fn rate_limited_call_does_not_panic() {
        log_memory_usage_if_needed("worker-test", true);
        log_memory_usage_if_needed("worker-test", false);
    }
}
