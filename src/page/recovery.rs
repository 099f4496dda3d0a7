//! Bounded recovery around one activity.
//!
//! Pre-check the page, run the activity body, post-check the landing domain.
//! Recovery is a single redirect back to the dashboard with fixed timeouts --
//! never a retry loop, and never a re-check after the redirect. Nothing in
//! this module escapes as an error; every path ends in an [`ActivityOutcome`].

use std::time::Duration;

use tracing::{info, warn};

use crate::page::validator::{check_page_health, is_on_expected_domain};
use crate::page::{Activity, Page};

/// Bound on the single recovery navigation.
const RECOVERY_NAV_TIMEOUT: Duration = Duration::from_secs(15);

/// Bound on the post-redirect settle wait.
const RECOVERY_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal result of one guarded activity. Consumed for logging and the
/// run summary only; never aborts the surrounding run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityOutcome {
    Completed,
    /// Pre-check failed and the caller asked for the page to be closed.
    SkippedInvalidPage(String),
    /// Pre-check failed; one redirect to the dashboard was attempted.
    /// Returned whether or not the redirect itself succeeded.
    RedirectedAndAborted(String),
    /// The activity body ran but landed off the allow-listed domains.
    DomainMismatch(String),
    /// The activity body itself errored.
    Failed(String),
}

/// Run `activity` against `page` under the recovery protocol.
///
/// `base_url` is the canonical dashboard used for the recovery redirect;
/// `allowlist` holds the domain substrings the post-check accepts.
pub async fn run_guarded(
    page: &dyn Page,
    activity: &dyn Activity,
    base_url: &str,
    allowlist: &[String],
) -> ActivityOutcome {
    let name = activity.name();

    // Pre-check. The body is never invoked after a failed pre-check.
    let health = check_page_health(page).await;
    if health.invalid {
        let reason = health.reason.unwrap_or_else(|| "unknown".into());
        warn!(activity = name, %reason, "pre-check failed");

        if activity.close_on_invalid() {
            if let Err(e) = page.close().await {
                warn!(activity = name, error = %e, "closing invalid page failed");
            }
            return ActivityOutcome::SkippedInvalidPage(reason);
        }

        // Exactly one recovery redirect. A failed redirect is logged and
        // still yields the same outcome.
        if let Err(e) = page.navigate(base_url, RECOVERY_NAV_TIMEOUT).await {
            warn!(activity = name, error = %e, "recovery redirect failed");
        } else if let Err(e) = page.wait_ready(RECOVERY_READY_TIMEOUT).await {
            warn!(activity = name, error = %e, "recovery settle wait failed");
        }
        return ActivityOutcome::RedirectedAndAborted(reason);
    }

    // Body. Errors are caught here; they must not terminate the run.
    if let Err(e) = activity.run(page).await {
        warn!(activity = name, error = %e, "activity body failed");
        return ActivityOutcome::Failed(e.to_string());
    }

    // Post-check: soft domain verification only.
    let url = page.url().unwrap_or_default();
    if !is_on_expected_domain(&url, allowlist) {
        warn!(activity = name, %url, "activity landed off the expected domains");
        return ActivityOutcome::DomainMismatch(url);
    }

    info!(activity = name, "activity completed");
    ActivityOutcome::Completed
}
