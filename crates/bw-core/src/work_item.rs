//! The leased unit of work and the per-call worker identity sent alongside it.
//!
//! `WorkItem`'s mutable lease-tracking fields are guarded by a single mutex,
//! exactly as spec'd: the executor side never touches them, the reporter
//! reads and writes them once per report cycle, and the lock is never held
//! across a network call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Immutable snapshot of worker identity, sent on every coordinator call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub project_id: String,
    pub job_id: String,
    pub work_types: Vec<String>,
    pub capabilities: Vec<String>,
    pub formatted_current_time: String,
}

/// Tagged payload a work item carries. Opaque to the worker core; only the
/// matching executor interprets the inner value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum WorkItemKind {
    MapTask(serde_json::Value),
    SourceOperationSplitTask(serde_json::Value),
}

impl WorkItemKind {
    pub fn label(&self) -> &'static str {
        match self {
            WorkItemKind::MapTask(_) => "map_task",
            WorkItemKind::SourceOperationSplitTask(_) => "source_operation_split_task",
        }
    }
}

/// The lease-tracking fields guarded by [`WorkItem`]'s lock.
#[derive(Debug, Clone)]
pub struct LeaseState {
    pub next_report_index: i64,
    pub lease_expire_time: DateTime<Utc>,
    pub report_status_interval: String,
    pub done: bool,
}

/// An active lease on a unit of work.
#[derive(Debug)]
pub struct WorkItem {
    pub id: String,
    pub kind: WorkItemKind,
    pub stage_name: Option<String>,
    state: Mutex<LeaseState>,
}

impl WorkItem {
    pub fn new(
        id: String,
        kind: WorkItemKind,
        stage_name: Option<String>,
        next_report_index: i64,
        lease_expire_time: DateTime<Utc>,
        report_status_interval: String,
    ) -> Self {
        Self {
            id,
            kind,
            stage_name,
            state: Mutex::new(LeaseState {
                next_report_index,
                lease_expire_time,
                report_status_interval,
                done: false,
            }),
        }
    }

    /// Snapshot the fields needed to send a report, without holding the lock
    /// across the subsequent network call.
    pub async fn snapshot(&self) -> LeaseState {
        self.state.lock().await.clone()
    }

    pub async fn is_done(&self) -> bool {
        self.state.lock().await.done
    }

    pub async fn mark_done(&self) {
        self.state.lock().await.done = true;
    }

    /// Applies a progress-report response to the item's lease state. Never
    /// called for completion reports (spec.md invariant: a completed item
    /// has no subsequent progress report).
    pub async fn apply_report_response(
        &self,
        next_report_index: i64,
        lease_expire_time: DateTime<Utc>,
        report_status_interval: String,
    ) {
        let mut state = self.state.lock().await;
        state.next_report_index = next_report_index;
        state.lease_expire_time = lease_expire_time;
        state.report_status_interval = report_status_interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item() -> WorkItem {
        WorkItem::new(
            "work-1".to_string(),
            WorkItemKind::MapTask(serde_json::json!({"iterations": 10})),
            Some("stage-a".to_string()),
            0,
            Utc::now() + Duration::seconds(60),
            "5s".to_string(),
        )
    }

    #[tokio::test]
    async fn starts_not_done() {
        let item = item();
        assert!(!item.is_done().await);
    }

    #[tokio::test]
    async fn mark_done_is_observed() {
        let item = item();
        item.mark_done().await;
        assert!(item.is_done().await);
    }

    #[tokio::test]
    async fn report_response_updates_snapshot() {
        let item = item();
        let new_expiry = Utc::now() + Duration::seconds(120);
        item.apply_report_response(7, new_expiry, "10s".to_string()).await;
        let snap = item.snapshot().await;
        assert_eq!(snap.next_report_index, 7);
        assert_eq!(snap.report_status_interval, "10s");
        assert_eq!(snap.lease_expire_time, new_expiry);
    }
}
