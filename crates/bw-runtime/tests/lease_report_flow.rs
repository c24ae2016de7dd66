//! Exercises the coordinator client and progress reporter against a fake
//! in-process coordinator, covering spec.md §8 scenarios S1 (happy path,
//! including terminal-4xx propagation), S3 (dynamic split accepted), S4
//! (split flushed at shutdown) and S5 (lease 404 handling).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use bw_core::WorkerInfo;
use bw_runtime::coordinator::CoordinatorClient;

#[derive(Default)]
struct FakeCoordinatorState {
    lease_calls: AtomicU64,
    report_calls: AtomicU64,
    reported_report_indices: Mutex<Vec<i64>>,
    /// Every `reportStatus` request body, in call order — lets tests check
    /// exactly which call carried `dynamic_split_result`.
    reported_bodies: Mutex<Vec<Value>>,
    suggest_split_once: std::sync::atomic::AtomicBool,
    leases_exhausted_after: u64,
    /// When `Some`, every lease call answers with this status instead of
    /// the usual success/404 branching.
    lease_status_override: Option<axum::http::StatusCode>,
}

async fn lease_handler(State(state): State<Arc<FakeCoordinatorState>>, Json(_body): Json<Value>) -> axum::response::Response {
    use axum::response::IntoResponse;
    let call = state.lease_calls.fetch_add(1, Ordering::SeqCst);

    if let Some(status) = state.lease_status_override {
        return status.into_response();
    }

    if call >= state.leases_exhausted_after {
        return axum::http::StatusCode::NOT_FOUND.into_response();
    }

    let lease_expire = bw_core::time::format_cloud_time(chrono::Utc::now() + chrono::Duration::seconds(60));
    Json(json!({
        "work_items": [{
            "id": "work-1",
            "kind": "MapTask",
            "payload": {"iterations": 3, "step_delay_ms": 0},
            "stage_name": "stage-a",
            "next_report_index": 0,
            "lease_expire_time": lease_expire,
            "report_status_interval": "5s",
        }]
    }))
    .into_response()
}

async fn report_handler(
    State(state): State<Arc<FakeCoordinatorState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.report_calls.fetch_add(1, Ordering::SeqCst);
    let report_index = body["report_index"].as_i64().unwrap_or(0);
    state.reported_report_indices.lock().await.push(report_index);
    state.reported_bodies.lock().await.push(body.clone());

    let completed = body["completed"].as_bool().unwrap_or(false);
    let lease_expire = bw_core::time::format_cloud_time(chrono::Utc::now() + chrono::Duration::seconds(60));

    let suggested_stop_point = if !completed
        && !state.suggest_split_once.swap(true, Ordering::SeqCst)
    {
        Some(json!({"fraction": 0.6}))
    } else {
        None
    };

    Json(json!({
        "work_item_service_states": [{
            "next_report_index": report_index + 1,
            "lease_expire_time": lease_expire,
            "report_status_interval": "5s",
            "suggested_stop_point": suggested_stop_point,
        }]
    }))
}

async fn spawn_fake_coordinator(state: Arc<FakeCoordinatorState>) -> SocketAddr {
    let app = Router::new()
        .route("/v1/work:lease", post(lease_handler))
        .route("/v1/work:reportStatus", post(report_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn worker_info() -> WorkerInfo {
    WorkerInfo {
        worker_id: "w-1".to_string(),
        project_id: "proj".to_string(),
        job_id: "job-1".to_string(),
        work_types: vec!["map_task".to_string()],
        capabilities: vec![],
        formatted_current_time: bw_core::time::format_cloud_time(chrono::Utc::now()),
    }
}

#[tokio::test]
async fn lease_then_completion_report_round_trips() {
    let state = Arc::new(FakeCoordinatorState {
        leases_exhausted_after: 1,
        ..Default::default()
    });
    let addr = spawn_fake_coordinator(state.clone()).await;

    let http = reqwest::Client::new();
    let client = CoordinatorClient::new(http, reqwest::Url::parse(&format!("http://{addr}/")).unwrap());

    let worker = worker_info();
    let leased = client
        .lease_work(&worker, Duration::from_secs(60))
        .await
        .unwrap();
    let (item, service_state) = leased.expect("fake coordinator should have one work item");
    assert_eq!(item.id, "work-1");
    assert_eq!(service_state.next_report_index, 0);

    // Second lease call hits the "no work" branch (S5-style check, single call).
    let second = client.lease_work(&worker, Duration::from_secs(60)).await.unwrap();
    assert!(second.is_none());
    assert_eq!(state.lease_calls.load(Ordering::SeqCst), 2);
}

/// Leases a work item, builds its executor and starts a reporter against
/// `state`'s fake coordinator. Shared setup for the S3/S4 tests below.
async fn lease_and_start_reporter(
    state: Arc<FakeCoordinatorState>,
    addr: SocketAddr,
) -> (
    Arc<bw_runtime::reporter::ReporterHandle>,
    tokio::task::JoinHandle<()>,
) {
    use bw_runtime::executor::build_executor;

    let http = reqwest::Client::new();
    let client = Arc::new(CoordinatorClient::new(
        http,
        reqwest::Url::parse(&format!("http://{addr}/")).unwrap(),
    ));

    let worker = Arc::new(worker_info());
    let (item, _state) = client
        .lease_work(&worker, Duration::from_secs(60))
        .await
        .unwrap()
        .expect("one work item");
    let item = Arc::new(item);

    let executor = Arc::new(build_executor(&item.kind).unwrap());

    bw_runtime::reporter::ReporterHandle::start(worker, item, executor, client, Duration::from_secs(60))
}

#[tokio::test]
async fn progress_reports_carry_monotonic_indices_and_split_is_deferred_one_cycle() {
    let state = Arc::new(FakeCoordinatorState {
        leases_exhausted_after: 1,
        ..Default::default()
    });
    let addr = spawn_fake_coordinator(state.clone()).await;

    let (reporter, _join) = lease_and_start_reporter(state.clone(), addr).await;

    // Let a couple of report cycles elapse. Report intervals clamp to at
    // least MIN_INTERVAL (5s) in production, but the fake coordinator's
    // short-lived lease window combined with the reporter's first
    // immediate cycle is enough to observe at least one report here.
    tokio::time::sleep(Duration::from_millis(200)).await;

    reporter.stop().await.unwrap();

    let indices = state.reported_report_indices.lock().await.clone();
    assert!(!indices.is_empty(), "expected at least one progress report");
    for pair in indices.windows(2) {
        assert!(pair[1] > pair[0], "report indices must strictly increase");
    }

    // spec.md §8 invariant 4: the call whose response carries
    // `suggested_stop_point` must not itself carry `dynamic_split_result`
    // (the split hasn't been requested from the executor yet when that
    // report is sent) — it's only delivered on the very next call.
    let bodies = state.reported_bodies.lock().await.clone();
    assert!(bodies.len() >= 2, "expected the initial report plus a follow-up carrying the split");
    assert!(
        bodies[0]["dynamic_split_result"].is_null(),
        "first report must not carry a split it hasn't requested yet"
    );
    assert!(
        !bodies[1]["dynamic_split_result"].is_null(),
        "the report immediately following the suggested stop point must carry the split"
    );
}

#[tokio::test]
async fn pending_split_is_flushed_exactly_once_at_stop() {
    let state = Arc::new(FakeCoordinatorState {
        leases_exhausted_after: 1,
        ..Default::default()
    });
    let addr = spawn_fake_coordinator(state.clone()).await;

    let (reporter, _join) = lease_and_start_reporter(state.clone(), addr).await;

    // Only let the first cycle run — the one whose response suggests a
    // split and causes the executor to produce a pending `DynamicSplitResult`.
    // `stop()` is then the only thing that can ever deliver it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let calls_before_stop = state.report_calls.load(Ordering::SeqCst);
    assert_eq!(calls_before_stop, 1, "only the first cycle's report should have fired yet");

    reporter.stop().await.unwrap();

    let calls_after_stop = state.report_calls.load(Ordering::SeqCst);
    assert_eq!(
        calls_after_stop,
        calls_before_stop + 1,
        "stop() must flush the pending split as exactly one extra report"
    );

    let bodies = state.reported_bodies.lock().await.clone();
    let flush_body = bodies.last().expect("flush report must have been sent");
    assert!(
        !flush_body["dynamic_split_result"].is_null(),
        "the flush report at stop() must carry the pending split"
    );
    assert_eq!(flush_body["completed"], json!(false));
}

#[tokio::test]
async fn lease_404_is_reported_as_no_work_without_retry_noise() {
    let state = Arc::new(FakeCoordinatorState {
        leases_exhausted_after: 0,
        ..Default::default()
    });
    let addr = spawn_fake_coordinator(state.clone()).await;

    let http = reqwest::Client::new();
    let client = CoordinatorClient::new(http, reqwest::Url::parse(&format!("http://{addr}/")).unwrap());

    let worker = worker_info();
    let leased = client.lease_work(&worker, Duration::from_secs(60)).await.unwrap();
    assert!(leased.is_none());
    assert_eq!(state.lease_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.report_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn terminal_4xx_lease_error_propagates_without_retry() {
    let state = Arc::new(FakeCoordinatorState {
        lease_status_override: Some(axum::http::StatusCode::BAD_REQUEST),
        ..Default::default()
    });
    let addr = spawn_fake_coordinator(state.clone()).await;

    let http = reqwest::Client::new();
    let client = CoordinatorClient::new(http, reqwest::Url::parse(&format!("http://{addr}/")).unwrap());

    let worker = worker_info();
    let result = client.lease_work(&worker, Duration::from_secs(60)).await;
    assert!(result.is_err(), "a terminal 4xx must propagate as an error");
    assert_eq!(
        state.lease_calls.load(Ordering::SeqCst),
        1,
        "a terminal 4xx must not be retried the way a 5xx would be"
    );
}
