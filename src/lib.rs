//! rewardpatrol -- unattended rewards-task automation.
//!
//! This crate provides the execution control plane (single-run lifecycle
//! controller), the unattended-run scheduler, the page validation and
//! recovery protocol every automated task passes through, and the HTTP
//! control surface that drives them remotely.

pub mod accounts;
pub mod api;
pub mod config;
pub mod controller;
pub mod page;
pub mod runner;
pub mod scheduler;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::controller::ExecutionController;
use crate::runner::{PageDriver, RunnerLauncher};
use crate::scheduler::ScheduleCoordinator;

/// Start the rewardpatrol daemon: control API, scheduler, and run supervisor.
///
/// `driver` is the browser backend sessions are opened through; the daemon
/// owns everything else.
pub async fn serve(bind: &str, config: Config, driver: Arc<dyn PageDriver>) -> Result<()> {
    let config = Arc::new(config);

    let launcher = RunnerLauncher::new(config.run.clone(), config.accounts.path.clone(), driver);
    let controller = Arc::new(ExecutionController::new(Arc::new(launcher)));

    let coordinator = Arc::new(ScheduleCoordinator::new(
        config.schedule.clone(),
        Arc::clone(&controller),
    ));

    let shutdown = CancellationToken::new();
    {
        let coordinator = Arc::clone(&coordinator);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            scheduler::engine::run_scheduler_loop(coordinator, shutdown).await;
        });
    }

    let state = api::state::AppState {
        config: Arc::clone(&config),
        controller: Arc::clone(&controller),
        scheduler: coordinator,
    };
    let app = api::router(state);

    let addr: std::net::SocketAddr = bind.parse().context("invalid bind address")?;
    tracing::info!(%addr, "rewardpatrol listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown, controller))
        .await?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken, controller: Arc<ExecutionController>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown requested");
    shutdown.cancel();
    // Let a running automation drain gracefully.
    if controller.status().running {
        controller.stop();
        controller.wait_idle().await;
    }
}
