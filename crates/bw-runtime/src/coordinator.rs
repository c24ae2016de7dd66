//! Typed HTTP client for the coordinator's lease/report-status API.
//!
//! Grounded in the teacher's `client-engine/src/backend.rs`: typed
//! request/response DTOs over a shared `reqwest::Client`, with a narrow
//! `thiserror` enum for the handful of failure modes callers need to branch
//! on and everything else folded into `CoordinatorError::Http`.

use std::time::Duration;

use bw_core::time::{format_cloud_time, format_duration_secs, parse_cloud_time, parse_duration_secs};
use bw_core::{CoordinatorError, DynamicSplitResult, Progress, SourceOperationResponse, WorkItem, WorkerInfo};
use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::retry::{with_exponential_backoff, BackoffConfig};

#[derive(Debug, Serialize)]
struct LeaseWorkRequest<'a> {
    worker: &'a WorkerInfo,
    desired_lease_duration: String,
}

#[derive(Debug, Deserialize)]
pub struct LeasedWorkItemDto {
    pub id: String,
    #[serde(flatten)]
    pub kind: bw_core::WorkItemKind,
    pub stage_name: Option<String>,
    pub next_report_index: i64,
    pub lease_expire_time: String,
    pub report_status_interval: String,
}

#[derive(Debug, Deserialize)]
struct LeaseWorkResponse {
    #[serde(default)]
    work_items: Vec<LeasedWorkItemDto>,
}

/// Outcome of one lease attempt, as seen by the retry combinator: only the
/// absence of an `Err` keeps it from being retried, so terminal 4xx
/// failures (anything but 404) are carried as a value here rather than as
/// an `Err`, the same way `NoWork` already is.
enum LeaseAttempt {
    NoWork,
    Response(LeaseWorkResponse),
    TerminalError(CoordinatorError),
}

#[derive(Debug, Serialize)]
struct ReportStatusRequestDto<'a> {
    worker: &'a WorkerInfo,
    work_item_id: &'a str,
    report_index: i64,
    desired_lease_duration: String,
    completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dynamic_split_result: Option<DynamicSplitResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_operation_response: Option<SourceOperationResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception_details: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkItemServiceState {
    pub next_report_index: i64,
    pub lease_expire_time: String,
    pub report_status_interval: String,
    pub suggested_stop_point: Option<bw_core::SuggestedStopPoint>,
}

#[derive(Debug, Deserialize)]
pub struct ReportStatusResponse {
    pub work_item_service_states: Vec<WorkItemServiceState>,
}

/// Inputs to a single `report_status` call. `completed` callers must leave
/// `progress` and `dynamic_split_result` `None` (spec.md §4.2).
pub struct ReportStatusArgs<'a> {
    pub completed: bool,
    pub progress: Option<Progress>,
    pub dynamic_split_result: Option<DynamicSplitResult>,
    pub source_operation_response: Option<SourceOperationResponse>,
    pub exception_details: Option<&'a str>,
}

pub struct CoordinatorClient {
    http: reqwest::Client,
    root_url: Url,
    lease_backoff: BackoffConfig,
}

impl CoordinatorClient {
    pub fn new(http: reqwest::Client, root_url: Url) -> Self {
        Self {
            http,
            root_url,
            lease_backoff: BackoffConfig::default(),
        }
    }

    /// Leases a work item. Returns `Ok(None)` on `HTTP 404` ("no work") or an
    /// empty work-item list; retries internally on 5xx/transport failures
    /// per spec.md §4.2; any other HTTP error (4xx other than 404) is
    /// propagated immediately, without retry, per spec.md §4.1 ("on other
    /// HTTP errors: propagate — the outer handler logs and sleeps 1s").
    pub async fn lease_work(
        &self,
        worker: &WorkerInfo,
        desired_lease_duration: Duration,
    ) -> Result<Option<(WorkItem, WorkItemServiceState)>, CoordinatorError> {
        let url = self
            .root_url
            .join("v1/work:lease")
            .map_err(|e| CoordinatorError::Http(e.to_string()))?;
        let body = LeaseWorkRequest {
            worker,
            desired_lease_duration: format_duration_secs(desired_lease_duration.as_secs_f64()),
        };

        // Only 5xx/transport failures are allowed to reach the retry
        // combinator as an `Err` (and thus get retried). 404 ("no work") and
        // every other non-retryable outcome are folded into `Ok(..)`
        // variants here so a single bad-but-terminal request never gets
        // retried up to 5x with backoff.
        let outcome = with_exponential_backoff(self.lease_backoff, || {
            let url = url.clone();
            let body = &body;
            async move {
                let res = self
                    .http
                    .post(url)
                    .json(body)
                    .send()
                    .await
                    .map_err(|e| CoordinatorError::Http(e.to_string()))?;
                if res.status() == StatusCode::NOT_FOUND {
                    return Ok(LeaseAttempt::NoWork);
                }
                if res.status().is_server_error() {
                    let status = res.status();
                    return Err(CoordinatorError::Http(format!("server error: {status}")));
                }
                if !res.status().is_success() {
                    let status = res.status();
                    let text = res.text().await.unwrap_or_default();
                    return Ok(LeaseAttempt::TerminalError(CoordinatorError::Http(format!(
                        "http {status}: {text}"
                    ))));
                }
                res.json::<LeaseWorkResponse>()
                    .await
                    .map(LeaseAttempt::Response)
                    .map_err(|e| CoordinatorError::Decode(e.to_string()))
            }
        })
        .await?;

        let parsed = match outcome {
            LeaseAttempt::NoWork => return Ok(None),
            LeaseAttempt::TerminalError(err) => return Err(err),
            LeaseAttempt::Response(parsed) => parsed,
        };

        let Some(dto) = parsed.work_items.into_iter().next() else {
            return Ok(None);
        };

        let lease_expire_time = parse_cloud_time(&dto.lease_expire_time).unwrap_or_else(Utc::now);
        let state = WorkItemServiceState {
            next_report_index: dto.next_report_index,
            lease_expire_time: dto.lease_expire_time.clone(),
            report_status_interval: dto.report_status_interval.clone(),
            suggested_stop_point: None,
        };
        let item = WorkItem::new(
            dto.id,
            dto.kind,
            dto.stage_name,
            dto.next_report_index,
            lease_expire_time,
            dto.report_status_interval,
        );
        Ok(Some((item, state)))
    }

    /// Sends a single status report. Never retries — callers decide whether
    /// a failed report is retried (progress reports are not; completion
    /// reports are, via [`crate::retry::with_exponential_backoff`] at the
    /// call site in `WorkerCore`).
    pub async fn report_status(
        &self,
        worker: &WorkerInfo,
        desired_lease_duration: Duration,
        work_item_id: &str,
        report_index: i64,
        args: ReportStatusArgs<'_>,
    ) -> Result<ReportStatusResponse, CoordinatorError> {
        if args.completed {
            debug_assert!(args.progress.is_none());
            debug_assert!(args.dynamic_split_result.is_none());
        }

        let url = self
            .root_url
            .join("v1/work:reportStatus")
            .map_err(|e| CoordinatorError::Http(e.to_string()))?;
        let body = ReportStatusRequestDto {
            worker,
            work_item_id,
            report_index,
            desired_lease_duration: format_duration_secs(desired_lease_duration.as_secs_f64()),
            completed: args.completed,
            progress: args.progress,
            dynamic_split_result: args.dynamic_split_result,
            source_operation_response: args.source_operation_response,
            exception_details: args.exception_details.map(str::to_string),
        };

        let res = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoordinatorError::Http(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(CoordinatorError::Http(format!("http {status}: {text}")));
        }

        res.json::<ReportStatusResponse>()
            .await
            .map_err(|e| CoordinatorError::Decode(e.to_string()))
    }
}

/// Formats "now" the way `WorkerInfo.formatted_current_time` must be
/// rendered: millisecond precision, computed fresh for each call (spec.md
/// §4.7; the teacher's `worker_info_for_client` reads a `@property` afresh
/// every time rather than caching it).
pub fn formatted_current_time() -> String {
    format_cloud_time(Utc::now())
}

/// Seconds-remaining helper used by the progress reporter's interval math;
/// kept here next to the wire format it parses.
pub fn seconds_until(deadline: &str) -> f64 {
    match parse_cloud_time(deadline) {
        Some(dt) => (dt - Utc::now()).num_milliseconds() as f64 / 1000.0,
        None => 0.0,
    }
}

/// Exposed for the reporter's `next_interval` computation, which parses a
/// coordinator-suggested interval string.
pub fn parse_suggested_interval(s: &str) -> f64 {
    parse_duration_secs(s)
}
