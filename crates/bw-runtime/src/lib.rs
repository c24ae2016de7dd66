//! Async runtime for the batch worker: coordinator client, executors,
//! progress reporter, lease loop, status server and memory reporter.
//!
//! `bw-core` owns the wire types; everything in this crate is the I/O and
//! concurrency wired around them.

pub mod config;
pub mod coordinator;
pub mod executor;
pub mod memory;
pub mod reporter;
pub mod retry;
pub mod status_server;
pub mod worker;

pub use config::WorkerConfig;
pub use coordinator::CoordinatorClient;
pub use worker::WorkerCore;
