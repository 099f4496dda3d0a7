//! API route definitions.
//!
//! The five control-plane operations plus health, schedule reconfiguration,
//! and the redacted account listing. Conflicts ("already running", "not
//! running") come back
//! as `{success: false, error}` with a 200 -- they are expected answers, not
//! HTTP faults.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::accounts::{self, AccountSummary};
use crate::api::state::AppState;
use crate::controller::{OpResult, RunStatus};
use crate::scheduler::ScheduleStatus;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/run/start", post(run_start))
        .route("/run/stop", post(run_stop))
        .route("/run/restart", post(run_restart))
        .route("/run/status", get(run_status))
        .route("/schedule", get(schedule_status).post(reschedule))
        .route("/accounts", get(list_accounts))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn run_start(State(state): State<AppState>) -> Json<OpResult> {
    Json(state.controller.start().await)
}

async fn run_stop(State(state): State<AppState>) -> Json<OpResult> {
    Json(state.controller.stop())
}

async fn run_restart(State(state): State<AppState>) -> Json<OpResult> {
    Json(state.controller.restart().await)
}

async fn run_status(State(state): State<AppState>) -> Json<RunStatus> {
    Json(state.controller.status())
}

async fn schedule_status(State(state): State<AppState>) -> Json<ScheduleStatus> {
    Json(state.scheduler.status())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RescheduleRequest {
    next_run: DateTime<Utc>,
}

/// Explicitly move the next slot; the only path allowed to pull it earlier.
async fn reschedule(
    State(state): State<AppState>,
    Json(request): Json<RescheduleRequest>,
) -> Json<ScheduleStatus> {
    state.scheduler.reschedule(request.next_run);
    Json(state.scheduler.status())
}

/// Redacted account list; raw credentials never cross this surface.
async fn list_accounts(State(state): State<AppState>) -> Json<Value> {
    match accounts::load(&state.config.accounts.path) {
        Ok(list) => {
            let summaries: Vec<AccountSummary> = list.iter().map(AccountSummary::from).collect();
            let total = summaries.len();
            Json(json!({ "data": summaries, "meta": { "total": total } }))
        }
        Err(e) => Json(json!({ "data": [], "meta": { "error": e.to_string() } })),
    }
}
