//! Control-plane integration tests -- drive the HTTP surface end to end
//! against a stubbed browser backend.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use rewardpatrol::accounts::Account;
use rewardpatrol::api::{self, state::AppState};
use rewardpatrol::config::Config;
use rewardpatrol::controller::ExecutionController;
use rewardpatrol::page::{Activity, Page, PageError};
use rewardpatrol::runner::{PageDriver, RunnerLauncher, Session};
use rewardpatrol::scheduler::ScheduleCoordinator;

struct StubPage;

#[async_trait::async_trait]
impl Page for StubPage {
    fn url(&self) -> Option<String> {
        Some("https://rewards.example.com/dashboard".into())
    }

    async fn content(&self) -> Result<String, PageError> {
        Ok("x".repeat(500))
    }

    async fn has_element(&self, _selector: &str) -> Result<bool, PageError> {
        Ok(false)
    }

    async fn wait_visible(&self, _selector: &str, _timeout: Duration) -> Result<bool, PageError> {
        Ok(false)
    }

    async fn navigate(&self, _url: &str, _timeout: Duration) -> Result<(), PageError> {
        Ok(())
    }

    async fn wait_ready(&self, _timeout: Duration) -> Result<(), PageError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), PageError> {
        Ok(())
    }
}

/// Activity slow enough that a run is observably in flight.
struct SlowActivity;

#[async_trait::async_trait]
impl Activity for SlowActivity {
    fn name(&self) -> &str {
        "slow"
    }

    async fn run(&self, _page: &dyn Page) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }
}

struct StubDriver;

#[async_trait::async_trait]
impl PageDriver for StubDriver {
    async fn open(&self, _account: &Account) -> Result<Session> {
        let activities: Vec<Box<dyn Activity>> = (0..10)
            .map(|_| Box::new(SlowActivity) as Box<dyn Activity>)
            .collect();
        Ok(Session {
            page: Box::new(StubPage),
            activities,
        })
    }
}

struct Harness {
    app: axum::Router,
    controller: Arc<ExecutionController>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let accounts_path = dir.path().join("accounts.json");
    std::fs::write(
        &accounts_path,
        r#"[{"email": "alice@example.com", "password": "hunter2", "enabled": true}]"#,
    )
    .unwrap();

    let mut config = Config::default();
    config.accounts.path = accounts_path;

    let launcher = RunnerLauncher::new(
        config.run.clone(),
        config.accounts.path.clone(),
        Arc::new(StubDriver),
    );
    let controller = Arc::new(ExecutionController::new(Arc::new(launcher)));
    let scheduler = Arc::new(ScheduleCoordinator::new(
        config.schedule.clone(),
        Arc::clone(&controller),
    ));

    let state = AppState {
        config: Arc::new(config),
        controller: Arc::clone(&controller),
        scheduler,
    };
    Harness {
        app: api::router(state),
        controller,
        _dir: dir,
    }
}

async fn call(app: &axum::Router, method: &str, path: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

async fn call_json(
    app: &axum::Router,
    method: &str,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness();
    let (status, body) = call(&h.app, "GET", "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = harness();
    let (status, _) = call(&h.app, "GET", "/api/v1/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn idle_status_then_stop_is_refused() {
    let h = harness();

    let (_, status) = call(&h.app, "GET", "/api/v1/run/status").await;
    assert_eq!(status["running"], false);

    let (code, result) = call(&h.app, "POST", "/api/v1/run/stop").await;
    // Conflicts are structured results, not HTTP errors.
    assert_eq!(code, StatusCode::OK);
    assert_eq!(result["success"], false);
    assert_eq!(result["error"], "not running");
}

#[tokio::test(flavor = "multi_thread")]
async fn start_is_exclusive_and_stop_drains() {
    let h = harness();

    let (_, first) = call(&h.app, "POST", "/api/v1/run/start").await;
    assert_eq!(first["success"], true);

    let (_, second) = call(&h.app, "POST", "/api/v1/run/start").await;
    assert_eq!(second["success"], false);
    assert_eq!(second["error"], "already running");

    let (_, status) = call(&h.app, "GET", "/api/v1/run/status").await;
    assert_eq!(status["running"], true);
    assert!(status["processId"].is_u64());
    assert!(status["startedAt"].is_string());

    let (_, stopped) = call(&h.app, "POST", "/api/v1/run/stop").await;
    assert_eq!(stopped["success"], true);

    tokio::time::timeout(Duration::from_secs(5), h.controller.wait_idle())
        .await
        .expect("run should drain after stop");

    let (_, status) = call(&h.app, "GET", "/api/v1/run/status").await;
    assert_eq!(status["running"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn schedule_mirrors_run_state() {
    let h = harness();

    let (_, schedule) = call(&h.app, "GET", "/api/v1/schedule").await;
    assert_eq!(schedule["active"], true);
    assert_eq!(schedule["isRunning"], false);

    let (_, started) = call(&h.app, "POST", "/api/v1/run/start").await;
    assert_eq!(started["success"], true);

    let (_, schedule) = call(&h.app, "GET", "/api/v1/schedule").await;
    assert_eq!(schedule["isRunning"], true);

    h.controller.stop();
    tokio::time::timeout(Duration::from_secs(5), h.controller.wait_idle())
        .await
        .expect("run should drain after stop");
}

#[tokio::test]
async fn reschedule_moves_the_next_slot() {
    use chrono::{DateTime, Utc};

    let h = harness();
    let at: DateTime<Utc> = "2026-09-01T09:00:00Z".parse().unwrap();

    let (code, schedule) = call_json(
        &h.app,
        "POST",
        "/api/v1/schedule",
        serde_json::json!({ "nextRun": at }),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    let moved: DateTime<Utc> = schedule["nextRun"].as_str().unwrap().parse().unwrap();
    assert_eq!(moved, at);

    // The new slot sticks across reads.
    let (_, schedule) = call(&h.app, "GET", "/api/v1/schedule").await;
    let read: DateTime<Utc> = schedule["nextRun"].as_str().unwrap().parse().unwrap();
    assert_eq!(read, at);
}

#[tokio::test]
async fn accounts_are_redacted() {
    let h = harness();

    let (status, body) = call(&h.app, "GET", "/api/v1/accounts").await;
    assert_eq!(status, StatusCode::OK);

    let rendered = body.to_string();
    assert!(rendered.contains("al***@example.com"));
    assert!(!rendered.contains("hunter2"));
    assert!(!rendered.contains("alice@example.com"));
}
