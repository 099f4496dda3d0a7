//! Unattended run scheduling.
//!
//! Decides when the next run occurs and reconciles that with the
//! controller's single-run guarantee. "Already running" at tick time is a
//! benign, expected outcome: the run is skipped and the next slot is
//! computed from now, so manual runs never starve the schedule.

pub mod engine;

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cron::Schedule as CronSchedule;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ScheduleConfig;
use crate::controller::ExecutionController;

/// Schedule snapshot. `is_running` mirrors the controller at call time;
/// it is never cached here, so the two can never drift.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStatus {
    pub active: bool,
    pub is_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

struct Slots {
    next_run: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
}

/// Computes run slots and triggers the controller when one is due.
pub struct ScheduleCoordinator {
    config: ScheduleConfig,
    controller: Arc<ExecutionController>,
    slots: Mutex<Slots>,
}

impl ScheduleCoordinator {
    pub fn new(config: ScheduleConfig, controller: Arc<ExecutionController>) -> Self {
        if let Some(expr) = &config.cron {
            if CronSchedule::from_str(expr).is_err() {
                warn!(cron = %expr, "invalid cron expression, falling back to interval rule");
            }
        }
        Self {
            config,
            controller,
            slots: Mutex::new(Slots {
                next_run: None,
                last_run: None,
            }),
        }
    }

    /// Next run time strictly after `now`: the cron rule when one parses,
    /// otherwise the configured interval (default daily), plus random jitter.
    pub fn compute_next_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let base = self
            .config
            .cron
            .as_deref()
            .and_then(|expr| CronSchedule::from_str(expr).ok())
            .and_then(|schedule| schedule.after(&now).next())
            .unwrap_or_else(|| {
                let minutes = self.config.interval_minutes.unwrap_or(24 * 60).max(1);
                now + ChronoDuration::minutes(minutes as i64)
            });

        // Jitter only pushes forward, so the slot stays strictly after now.
        let jitter = if self.config.jitter_minutes > 0 {
            rand::thread_rng().gen_range(0..=self.config.jitter_minutes * 60)
        } else {
            0
        };
        base + ChronoDuration::seconds(jitter as i64)
    }

    /// One schedule evaluation.
    ///
    /// Attempts a start when the slot is due. An "already running" answer is
    /// logged as a skip and the slot still advances, as though the run had
    /// occurred. The slot never moves backward except through
    /// [`Self::reschedule`].
    pub async fn tick(&self, now: DateTime<Utc>) {
        if !self.config.enabled {
            return;
        }

        let due = {
            let mut slots = self.slots.lock().expect("scheduler lock poisoned");
            match slots.next_run {
                None => {
                    let next = self.compute_next_run(now);
                    info!(next_run = %next, "schedule armed");
                    slots.next_run = Some(next);
                    false
                }
                Some(next) => now >= next,
            }
        };
        if !due {
            return;
        }

        let result = self.controller.start().await;
        let next = self.compute_next_run(now);
        {
            let mut slots = self.slots.lock().expect("scheduler lock poisoned");
            slots.next_run = Some(next);
            if result.success {
                slots.last_run = Some(now);
            }
        }

        if result.success {
            info!(next_run = %next, "scheduled run started");
        } else {
            // Typically a manual run in progress; not an error.
            info!(
                reason = result.error.as_deref().unwrap_or("unknown"),
                next_run = %next,
                "scheduled run skipped"
            );
        }
    }

    /// Explicit reconfiguration of the next slot (the only path that may
    /// move it backward).
    pub fn reschedule(&self, at: DateTime<Utc>) {
        let mut slots = self.slots.lock().expect("scheduler lock poisoned");
        slots.next_run = Some(at);
        info!(next_run = %at, "schedule reconfigured");
    }

    pub fn status(&self) -> ScheduleStatus {
        let slots = self.slots.lock().expect("scheduler lock poisoned");
        ScheduleStatus {
            active: self.config.enabled,
            is_running: self.controller.status().running,
            next_run: slots.next_run,
            last_run: slots.last_run,
        }
    }
}
