//! Worker core (spec.md §4.1): one-time setup, then the lease loop that
//! drives a single work item at a time through lease → execute → report.
//!
//! Grounded in the teacher's top-level engine loop (`client-engine/src/worker.rs`):
//! a `run()` that does setup once, then loops until told to stop, with every
//! iteration's errors caught, logged and turned into a short sleep rather
//! than an abort.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bw_core::{WorkItem, WorkerInfo};
use rand::Rng;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::WorkerConfig;
use crate::coordinator::{formatted_current_time, CoordinatorClient, ReportStatusArgs};
use crate::executor::build_executor;
use crate::memory;
use crate::reporter::ReporterHandle;
use crate::retry::{with_exponential_backoff, BackoffConfig};
use crate::status_server::{self, TaskRegistry};

const PICKLED_MAIN_SESSION_FILE: &str = "pickled_main_session";

#[derive(Debug, Deserialize)]
struct EnvironmentDescriptor {
    required_runtime_version: String,
}

pub struct WorkerCore {
    config: WorkerConfig,
    client: Arc<CoordinatorClient>,
    work_types: Vec<String>,
    capabilities: Vec<String>,
    shutdown: Arc<AtomicBool>,
    deferred_exception_details: Mutex<Option<String>>,
    task_registry: Arc<TaskRegistry>,
}

impl WorkerCore {
    pub fn new(
        config: WorkerConfig,
        client: CoordinatorClient,
        work_types: Vec<String>,
        capabilities: Vec<String>,
    ) -> Self {
        Self {
            config,
            client: Arc::new(client),
            work_types,
            capabilities,
            shutdown: Arc::new(AtomicBool::new(false)),
            deferred_exception_details: Mutex::new(None),
            task_registry: Arc::new(TaskRegistry::default()),
        }
    }

    /// Cooperative shutdown handle: the main loop checks this at the top of
    /// every iteration.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn worker_info(&self) -> WorkerInfo {
        WorkerInfo {
            worker_id: self.config.worker_id.clone(),
            project_id: self.config.project_id.clone(),
            job_id: self.config.job_id.clone(),
            work_types: self.work_types.clone(),
            capabilities: self.capabilities.clone(),
            formatted_current_time: formatted_current_time(),
        }
    }

    /// Blocks until `shutdown_handle()` is set. Performs one-time setup in
    /// the order spec.md §4.1 describes, then repeatedly leases and
    /// processes work items.
    pub async fn run(&self) -> std::io::Result<()> {
        if self.config.running_in_managed_env() {
            self.prime_managed_credentials();
        }

        self.run_sdk_compatibility_check().await;

        if self.deferred_exception_details.lock().await.is_none() {
            self.load_main_session().await;
        }

        let addr = status_server::spawn(self.task_registry.clone()).await?;
        tracing::info!(%addr, "status server listening");

        while !self.shutdown.load(Ordering::SeqCst) {
            self.run_iteration().await;
        }

        Ok(())
    }

    /// Credential acquisition is explicitly out of scope (spec.md §1); this
    /// only logs that the managed-environment path was taken, matching
    /// step 1 of the setup order.
    fn prime_managed_credentials(&self) {
        tracing::info!("running in managed environment, priming credential acquisition");
    }

    /// spec.md §4.1 step 2, restored from the original's
    /// `environment.check_sdk_compatibility`: compares a
    /// `required_runtime_version` descriptor against this crate's own
    /// version. Absence of the descriptor path skips the check entirely;
    /// any failure is captured as a deferred error rather than aborting.
    async fn run_sdk_compatibility_check(&self) {
        let Some(path) = &self.config.environment_info_path else {
            return;
        };
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => match serde_json::from_str::<EnvironmentDescriptor>(&contents) {
                Ok(descriptor) => {
                    let ours = env!("CARGO_PKG_VERSION");
                    if descriptor.required_runtime_version != ours {
                        let msg = format!(
                            "SDK compatibility check failed: coordinator requires {}, worker is {ours}",
                            descriptor.required_runtime_version
                        );
                        tracing::error!("{msg}");
                        *self.deferred_exception_details.lock().await = Some(msg);
                    }
                }
                Err(err) => {
                    let msg = format!("SDK compatibility check: malformed environment descriptor: {err}");
                    tracing::error!("{msg}");
                    *self.deferred_exception_details.lock().await = Some(msg);
                }
            },
            Err(err) => {
                let msg = format!("SDK compatibility check: could not read environment descriptor: {err}");
                tracing::error!("{msg}");
                *self.deferred_exception_details.lock().await = Some(msg);
            }
        }
    }

    /// spec.md §4.1 step 3. The loaded bytes have no consumer in scope
    /// (spec.md §1); loading them purely preserves the startup-ordering and
    /// deferred-error-capture behavior.
    async fn load_main_session(&self) {
        let path = self.config.local_staging_directory.join(PICKLED_MAIN_SESSION_FILE);
        match tokio::fs::read(&path).await {
            Ok(_bytes) => {
                tracing::info!(path = %path.display(), "loaded main session blob");
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "no main session blob found, continuing");
            }
            Err(err) => {
                let msg = format!("failed to load main session blob at {}: {err}", path.display());
                tracing::error!("{msg}");
                *self.deferred_exception_details.lock().await = Some(msg);
            }
        }
    }

    async fn run_iteration(&self) {
        let worker = self.worker_info();
        let leased = self
            .client
            .lease_work(&worker, self.config.default_lease_duration)
            .await;

        let (item, _state) = match leased {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                self.sleep_jittered_no_work().await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "lease request failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
                return;
            }
        };

        let work_item_id = item.id.clone();
        let stage_name = item.stage_name.clone().unwrap_or_default();
        let span = tracing::info_span!("work_item", work_item_id = %work_item_id, stage_name = %stage_name);
        let _enter = span.enter();

        let item = Arc::new(item);
        let deferred = self.deferred_exception_details.lock().await.take();

        let started = Instant::now();
        let registry_id = self
            .task_registry
            .register("lease-loop", format!("processing {work_item_id}"));

        self.do_work(item, deferred).await;

        self.task_registry.deregister(registry_id);
        tracing::info!(work_item_id = %work_item_id, duration_ms = started.elapsed().as_millis() as u64, "completed work item");
    }

    async fn sleep_jittered_no_work(&self) {
        let secs = rand::rng().random_range(0.5..=1.0);
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    /// `doWork` from spec.md §4.1.
    async fn do_work(&self, item: Arc<WorkItem>, deferred: Option<String>) {
        memory::log_memory_usage_if_needed(&self.config.worker_id, true);

        let worker = Arc::new(self.worker_info());

        if let Some(deferred_details) = deferred {
            self.report_completion(&worker, &item, Some(deferred_details), None)
                .await;
            item.mark_done().await;
            return;
        }

        let executor = match build_executor(&item.kind) {
            Ok(executor) => Arc::new(executor),
            Err(err) => {
                self.report_completion(&worker, &item, Some(err.details()), None).await;
                item.mark_done().await;
                return;
            }
        };

        let (reporter, reporter_join) = ReporterHandle::start(
            worker.clone(),
            item.clone(),
            executor.clone(),
            self.client.clone(),
            self.config.default_lease_duration,
        );

        let exec_for_blocking = executor.clone();
        let execute_result =
            tokio::task::spawn_blocking(move || exec_for_blocking.execute()).await;

        let mut exception_details = match execute_result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.details()),
            Err(join_err) => Some(format!("executor task panicked: {join_err}")),
        };

        if let Err(shutdown_err) = reporter.stop().await {
            tracing::error!(error = %shutdown_err, "reporter shutdown failed");
            if exception_details.is_none() {
                exception_details = Some(format!("reporter shutdown failed: {shutdown_err}"));
            }
        }
        drop(reporter_join);

        let source_response = executor.source_split_response();
        self.report_completion(&worker, &item, exception_details, source_response)
            .await;
        item.mark_done().await;
    }

    /// Sends the completion report, retrying with exponential backoff per
    /// spec.md §4.2. `"Finished processing"` is the external contract with
    /// test tooling and must be preserved verbatim.
    async fn report_completion(
        &self,
        worker: &WorkerInfo,
        item: &WorkItem,
        exception_details: Option<String>,
        source_operation_response: Option<bw_core::SourceOperationResponse>,
    ) {
        let snapshot = item.snapshot().await;
        let result = with_exponential_backoff(BackoffConfig::default(), || {
            let exception_details = exception_details.clone();
            let source_operation_response = source_operation_response.clone();
            async move {
                self.client
                    .report_status(
                        worker,
                        self.config.default_lease_duration,
                        &item.id,
                        snapshot.next_report_index,
                        ReportStatusArgs {
                            completed: true,
                            progress: None,
                            dynamic_split_result: None,
                            source_operation_response,
                            exception_details: exception_details.as_deref(),
                        },
                    )
                    .await
            }
        })
        .await;

        match (&result, &exception_details) {
            (Ok(_), None) => {
                tracing::info!(work_item_id = %item.id, "Finished processing {} successfully", item.id);
            }
            (Ok(_), Some(details)) => {
                tracing::warn!(work_item_id = %item.id, "Finished processing {} with exception: {details}", item.id);
            }
            (Err(err), _) => {
                tracing::error!(work_item_id = %item.id, error = %err, "completion report failed after retries");
            }
        }
    }
}
