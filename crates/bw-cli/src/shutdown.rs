//! Ctrl-C handling, adapted from the teacher's `ShutdownController`
//! (`client/src/shutdown.rs`). The worker core only has one shutdown state
//! (cooperative stop checked at the top of each lease-loop iteration), so
//! this drops the teacher's graceful/immediate two-stage escalation down to
//! a single flag — a second Ctrl-C here still just sets the same flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn spawn_ctrl_c_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested, finishing current work item before exiting");
            shutdown.store(true, Ordering::SeqCst);
        }
    });
}
