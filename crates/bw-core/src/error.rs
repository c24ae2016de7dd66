//! Error taxonomy shared by the coordinator client and worker runtime.
//!
//! Kept small and closed, in the style of the backend client's own error
//! enum: a handful of named cases callers can match on, everything else
//! folded into a string via [`CoordinatorError::Http`].

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Any HTTP-level failure (5xx, network error, malformed body). `HTTP
    /// 404` on lease ("no work available") is not an error at all — it
    /// surfaces as `Ok(None)` from `CoordinatorClient::lease_work` instead.
    #[error("coordinator request failed: {0}")]
    Http(String),

    /// The response body didn't match the expected schema.
    #[error("malformed coordinator response: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The work item's kind/payload could not be turned into an executor.
    #[error("could not construct executor: {0}")]
    Construction(String),

    /// The executor failed while running. The message is a formatted stack
    /// trace / error chain, matching spec.md's `exception_details` contract.
    #[error("{0}")]
    Execution(String),
}

impl ExecutorError {
    /// Renders this error the way `exception_details` is reported to the
    /// coordinator: a human-readable, multi-line-capable string.
    pub fn details(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("reporter shutdown failed: {0}")]
    ReporterShutdown(String),
}
