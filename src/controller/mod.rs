//! Execution control plane.
//!
//! Single authority over whether the automation is running. All state
//! transitions funnel through one mutex; the transition out of `Idle` is the
//! serialization point, so two simultaneous `start()` calls cannot both
//! succeed. Control operations return structured results, never errors --
//! "already running" and "not running" are expected answers, not faults.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How long `restart()` waits for the previous run to drain.
const RESTART_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle of the supervised run. `Starting` and `Stopping` are transient
/// so a concurrent request sees a definitive non-idle state instead of a
/// race window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Snapshot of the current run, safe to take from any state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Result of one control operation. `error` is present only on failure.
#[derive(Debug, Clone, Serialize)]
pub struct OpResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OpResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// A launched supervised run, as handed back by a [`Launcher`].
#[derive(Debug)]
pub struct LaunchedRun {
    pub run_id: Uuid,
    pub process_id: u32,
    /// Resolves when the run finishes; `Err` carries the failure message.
    pub done: oneshot::Receiver<Result<(), String>>,
}

/// Seam to whatever executes the automation. The controller hands the
/// launcher a cancellation token; the run is expected to observe it between
/// units of work and exit gracefully.
#[async_trait::async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, stop: CancellationToken) -> Result<LaunchedRun>;
}

struct Inner {
    state: RunState,
    run_id: Option<Uuid>,
    process_id: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    stop: Option<CancellationToken>,
    last_error: Option<String>,
}

impl Inner {
    fn reset(&mut self) {
        self.state = RunState::Idle;
        self.run_id = None;
        self.process_id = None;
        self.started_at = None;
        self.stop = None;
    }
}

/// Lifecycle controller for the one automation run.
///
/// Explicitly constructed and injected; schedulers and command surfaces hold
/// an `Arc` to the same instance rather than reaching for a global.
pub struct ExecutionController {
    launcher: Arc<dyn Launcher>,
    inner: Mutex<Inner>,
    idle: Notify,
}

impl ExecutionController {
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            inner: Mutex::new(Inner {
                state: RunState::Idle,
                run_id: None,
                process_id: None,
                started_at: None,
                stop: None,
                last_error: None,
            }),
            idle: Notify::new(),
        }
    }

    /// Start the supervised run.
    ///
    /// Rejected without side effects when a run is already underway; on a
    /// launch failure the controller returns to `Idle` and reports the cause.
    pub async fn start(self: &Arc<Self>) -> OpResult {
        let stop = CancellationToken::new();
        {
            let mut inner = self.inner.lock().expect("controller lock poisoned");
            if inner.state != RunState::Idle {
                return OpResult::err("already running");
            }
            inner.state = RunState::Starting;
            inner.stop = Some(stop.clone());
            inner.last_error = None;
        }

        match self.launcher.launch(stop).await {
            Ok(launched) => {
                let run_id = launched.run_id;
                {
                    let mut inner = self.inner.lock().expect("controller lock poisoned");
                    // A stop() issued mid-launch has already moved us to
                    // Stopping; keep that state and let the monitor drain.
                    if inner.state == RunState::Starting {
                        inner.state = RunState::Running;
                    }
                    inner.run_id = Some(run_id);
                    inner.process_id = Some(launched.process_id);
                    inner.started_at = Some(Utc::now());
                }
                info!(run_id = %run_id, "run started");

                let controller = Arc::clone(self);
                tokio::spawn(async move {
                    controller.monitor(run_id, launched.done).await;
                });
                OpResult::ok()
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "run launch failed");
                {
                    let mut inner = self.inner.lock().expect("controller lock poisoned");
                    inner.reset();
                    inner.last_error = Some(message.clone());
                }
                self.idle.notify_waiters();
                OpResult::err(message)
            }
        }
    }

    /// Signal the run to finish its current unit of work and exit.
    ///
    /// Fire-and-forget from the caller's perspective: success means the
    /// signal was delivered, not that the run has exited. The monitor task
    /// commits the `Idle` transition when it actually does.
    pub fn stop(&self) -> OpResult {
        let mut inner = self.inner.lock().expect("controller lock poisoned");
        if inner.state == RunState::Idle {
            return OpResult::err("not running");
        }
        inner.state = RunState::Stopping;
        if let Some(stop) = &inner.stop {
            stop.cancel();
        }
        info!("stop signal delivered");
        OpResult::ok()
    }

    /// `stop()` followed by `start()`, waiting for the previous run to drain
    /// in between. When nothing is running the stop refusal is absorbed and
    /// this is a plain start. Fails only if the drain exceeds its bound or
    /// the new start does.
    pub async fn restart(self: &Arc<Self>) -> OpResult {
        // No status pre-check: the run could drain between a check and the
        // stop. A "not running" refusal here just means there is nothing to
        // drain, so the restart degrades to a plain start.
        let stopped = self.stop();
        if stopped.success
            && tokio::time::timeout(RESTART_DRAIN_TIMEOUT, self.wait_idle())
                .await
                .is_err()
        {
            return OpResult::err("timed out waiting for the previous run to exit");
        }
        self.start().await
    }

    /// Pure read of the last fully-committed state.
    pub fn status(&self) -> RunStatus {
        let inner = self.inner.lock().expect("controller lock poisoned");
        let uptime_ms = inner
            .started_at
            .map(|t| (Utc::now() - t).num_milliseconds());
        RunStatus {
            running: inner.state != RunState::Idle,
            process_id: inner.process_id,
            run_id: inner.run_id,
            started_at: inner.started_at,
            uptime_ms,
            error_message: inner.last_error.clone(),
        }
    }

    /// Resolve once the controller is `Idle`.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            {
                let inner = self.inner.lock().expect("controller lock poisoned");
                if inner.state == RunState::Idle {
                    return;
                }
            }
            notified.await;
        }
    }

    async fn monitor(self: Arc<Self>, run_id: Uuid, done: oneshot::Receiver<Result<(), String>>) {
        let result = match done.await {
            Ok(result) => result,
            // Sender dropped without reporting: treat as an abnormal exit.
            Err(_) => Err("run ended without reporting a result".to_string()),
        };

        {
            let mut inner = self.inner.lock().expect("controller lock poisoned");
            inner.reset();
            match &result {
                Ok(()) => inner.last_error = None,
                Err(message) => inner.last_error = Some(message.clone()),
            }
        }
        self.idle.notify_waiters();

        match result {
            Ok(()) => info!(run_id = %run_id, "run finished"),
            Err(message) => warn!(run_id = %run_id, error = %message, "run failed"),
        }
    }
}
