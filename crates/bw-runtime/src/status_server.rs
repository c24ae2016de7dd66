//! Introspection HTTP server (spec.md §4.5): binds an ephemeral local port
//! and answers any `GET` with a text dump of the worker's live tasks.
//!
//! The teacher has no HTTP server dependency; this module is grounded in
//! `cloud-debugging-service/src/server.rs`'s `axum::serve` +
//! `TcpListener::bind` shape, imported from the rest of the pack per
//! SPEC_FULL.md's ambient-stack section. Python's `sys._current_frames()`
//! has no Tokio equivalent, so "one section per live thread" is realized as
//! a small registry of named tasks the worker core registers and
//! deregisters around each unit of work (documented as a resolved open
//! question in DESIGN.md).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

/// One entry in the task registry: a human name and the last status line it
/// reported, e.g. the work item it's currently processing.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub id: u64,
    pub name: String,
    pub detail: String,
}

#[derive(Default)]
pub struct TaskRegistry {
    inner: std::sync::Mutex<Vec<TaskStatus>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl TaskRegistry {
    pub fn register(&self, name: impl Into<String>, detail: impl Into<String>) -> u64 {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.lock().unwrap().push(TaskStatus {
            id,
            name: name.into(),
            detail: detail.into(),
        });
        id
    }

    pub fn deregister(&self, id: u64) {
        self.inner.lock().unwrap().retain(|t| t.id != id);
    }

    fn dump(&self) -> String {
        let tasks = self.inner.lock().unwrap();
        if tasks.is_empty() {
            return "--- no live tasks ---\n".to_string();
        }
        let mut out = String::new();
        for task in tasks.iter() {
            out.push_str(&format!("--- Thread #{} name: {} ---\n{}\n", task.id, task.name, task.detail));
        }
        out
    }
}

async fn dump_handler(State(registry): State<Arc<TaskRegistry>>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain")],
        registry.dump(),
    )
}

/// Binds `127.0.0.1:0` and serves stack dumps for the lifetime of the
/// worker. Returns the bound address (so callers can log the ephemeral
/// port) and spawns the serve loop as a detached background task — the
/// server is never joined, matching spec.md §4.5.
pub async fn spawn(registry: Arc<TaskRegistry>) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    // No tracing/logging layer is attached, so request handling stays
    // silent — the idiomatic equivalent of overriding `log_message` to a
    // no-op.
    let app = Router::new()
        .route("/", get(dump_handler))
        .fallback(get(dump_handler))
        .with_state(registry);

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::warn!(error = %err, "status server exited");
        }
    });

    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_reports_empty_registry() {
        let registry = TaskRegistry::default();
        assert!(registry.dump().contains("no live tasks"));
    }

    #[test]
    fn dump_reports_registered_task() {
        let registry = TaskRegistry::default();
        let id = registry.register("lease-loop", "processing work-42");
        let dump = registry.dump();
        assert!(dump.contains("lease-loop"));
        assert!(dump.contains("work-42"));
        registry.deregister(id);
        assert!(registry.dump().contains("no live tasks"));
    }
}
