//! The supervised automation run.
//!
//! Fans enabled accounts out over a bounded number of concurrent clusters.
//! Each cluster owns its own page, so no cross-cluster locking exists in the
//! validation path. Every activity is wrapped by the recovery protocol; a
//! bad page or a failed activity dents the summary, never the run. The stop
//! token is observed between activities: a graceful stop finishes the
//! current activity and then drains.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::accounts::{self, Account};
use crate::config::RunConfig;
use crate::controller::{LaunchedRun, Launcher};
use crate::page::recovery::{run_guarded, ActivityOutcome};
use crate::page::{Activity, Page};

/// One account's browser session: a page plus the activities discovered
/// on it. Produced by a [`PageDriver`], consumed by one cluster.
pub struct Session {
    pub page: Box<dyn Page>,
    pub activities: Vec<Box<dyn Activity>>,
}

/// Seam to the browser backend. Opening a session logs in (backend concern)
/// and lands on the rewards dashboard.
#[async_trait::async_trait]
pub trait PageDriver: Send + Sync {
    async fn open(&self, account: &Account) -> Result<Session>;
}

/// Tally of one run, merged across clusters.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub accounts: usize,
    pub account_errors: usize,
    pub completed: usize,
    pub skipped: usize,
    pub redirected: usize,
    pub mismatched: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &ActivityOutcome) {
        match outcome {
            ActivityOutcome::Completed => self.completed += 1,
            ActivityOutcome::SkippedInvalidPage(_) => self.skipped += 1,
            ActivityOutcome::RedirectedAndAborted(_) => self.redirected += 1,
            ActivityOutcome::DomainMismatch(_) => self.mismatched += 1,
            ActivityOutcome::Failed(_) => self.failed += 1,
        }
    }

    fn merge(&mut self, other: RunSummary) {
        self.accounts += other.accounts;
        self.account_errors += other.account_errors;
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.redirected += other.redirected;
        self.mismatched += other.mismatched;
        self.failed += other.failed;
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "accounts={} errors={} completed={} skipped={} redirected={} mismatched={} failed={}",
            self.accounts,
            self.account_errors,
            self.completed,
            self.skipped,
            self.redirected,
            self.mismatched,
            self.failed
        )
    }
}

/// Process every account, at most `config.clusters` concurrently.
pub async fn run_all(
    config: &RunConfig,
    accounts: Vec<Account>,
    driver: Arc<dyn PageDriver>,
    stop: CancellationToken,
) -> RunSummary {
    let clusters = config.clusters.max(1);
    let semaphore = Arc::new(Semaphore::new(clusters));
    info!(accounts = accounts.len(), clusters, "run starting");

    let mut handles = Vec::with_capacity(accounts.len());
    for account in accounts {
        let semaphore = Arc::clone(&semaphore);
        let driver = Arc::clone(&driver);
        let stop = stop.clone();
        let base_url = config.base_url.clone();
        let allowlist = config.allowed_domains.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("cluster semaphore closed");
            run_account(&account, driver.as_ref(), &base_url, &allowlist, &stop).await
        }));
    }

    let mut summary = RunSummary::default();
    for handle in handles {
        match handle.await {
            Ok(cluster_summary) => summary.merge(cluster_summary),
            Err(e) => {
                error!(error = %e, "cluster task panicked");
                summary.account_errors += 1;
            }
        }
    }

    info!(%summary, "run finished");
    summary
}

async fn run_account(
    account: &Account,
    driver: &dyn PageDriver,
    base_url: &str,
    allowlist: &[String],
    stop: &CancellationToken,
) -> RunSummary {
    let mut summary = RunSummary {
        accounts: 1,
        ..Default::default()
    };
    let who = account.redacted_email();

    if stop.is_cancelled() {
        info!(account = %who, "stop requested before this account started, skipping");
        return summary;
    }

    let session = match driver.open(account).await {
        Ok(session) => session,
        Err(e) => {
            error!(account = %who, error = %e, "failed to open session");
            summary.account_errors += 1;
            return summary;
        }
    };

    for activity in &session.activities {
        // Graceful stop: finish the current activity, never start the next.
        if stop.is_cancelled() {
            info!(account = %who, "stop requested, leaving remaining activities");
            break;
        }

        let outcome = run_guarded(
            session.page.as_ref(),
            activity.as_ref(),
            base_url,
            allowlist,
        )
        .await;
        summary.record(&outcome);
    }

    if let Err(e) = session.page.close().await {
        warn!(account = %who, error = %e, "closing session page failed");
    }
    summary
}

/// Launches the run as a supervised in-process task behind the controller's
/// [`Launcher`] seam. Accounts are re-read on every launch so edits to the
/// account file take effect on the next run.
pub struct RunnerLauncher {
    config: RunConfig,
    accounts_path: PathBuf,
    driver: Arc<dyn PageDriver>,
}

impl RunnerLauncher {
    pub fn new(config: RunConfig, accounts_path: PathBuf, driver: Arc<dyn PageDriver>) -> Self {
        Self {
            config,
            accounts_path,
            driver,
        }
    }
}

#[async_trait::async_trait]
impl Launcher for RunnerLauncher {
    async fn launch(&self, stop: CancellationToken) -> Result<LaunchedRun> {
        let all = accounts::load(&self.accounts_path).context("loading accounts for run")?;
        let enabled = accounts::enabled(&all);
        anyhow::ensure!(!enabled.is_empty(), "no enabled accounts configured");

        let run_id = Uuid::new_v4();
        let config = self.config.clone();
        let driver = Arc::clone(&self.driver);
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let summary = run_all(&config, enabled, driver, stop).await;
            let result = if summary.account_errors > 0 && summary.completed == 0 {
                Err(format!("run produced no completed activities ({summary})"))
            } else {
                Ok(())
            };
            let _ = tx.send(result);
        });

        Ok(LaunchedRun {
            run_id,
            process_id: std::process::id(),
            done: rx,
        })
    }
}
