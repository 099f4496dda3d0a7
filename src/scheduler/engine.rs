//! Scheduler execution loop.
//!
//! One evaluation per minute. The loop itself never starts anything; it only
//! feeds wall-clock time into [`ScheduleCoordinator::tick`], which owns the
//! due/skip decision.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::scheduler::ScheduleCoordinator;

const TICK_PERIOD: Duration = Duration::from_secs(60);

/// Drive the coordinator until `shutdown` fires.
pub async fn run_scheduler_loop(
    coordinator: Arc<ScheduleCoordinator>,
    shutdown: CancellationToken,
) {
    info!("scheduler engine started");

    let mut interval = tokio::time::interval(TICK_PERIOD);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                coordinator.tick(Utc::now()).await;
            }
            _ = shutdown.cancelled() => {
                info!("scheduler engine stopped");
                return;
            }
        }
    }
}
