//! Browser page abstraction -- validation and bounded recovery.

pub mod recovery;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(feature = "browser")]
pub mod chrome;

use std::time::Duration;

use anyhow::Result;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("browser backend error: {0}")]
    Backend(String),
}

/// Opaque handle to one browser page.
///
/// The control plane only needs URL/content retrieval, selector probes with
/// explicit timeouts, bounded navigation, and close. Concrete backends
/// (headless Chrome, test doubles) implement this.
#[async_trait::async_trait]
pub trait Page: Send + Sync {
    /// Current URL, or `None` when the page has no committed navigation.
    fn url(&self) -> Option<String>;

    /// Full page markup. May fail on a torn-down or crashed page.
    async fn content(&self) -> Result<String, PageError>;

    /// Whether an element matching `selector` exists right now (no waiting).
    async fn has_element(&self, selector: &str) -> Result<bool, PageError>;

    /// Wait up to `timeout` for an element matching `selector` to become
    /// visible. `Ok(false)` means the wait expired without a match.
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<bool, PageError>;

    /// Navigate to `url`, bounded by `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), PageError>;

    /// Wait up to `timeout` for the document to reach a settled state.
    async fn wait_ready(&self, timeout: Duration) -> Result<(), PageError>;

    /// Close the page. Idempotent; errors are reported, not fatal.
    async fn close(&self) -> Result<(), PageError>;
}

/// One discrete rewarded interaction performed against a validated page.
///
/// Implementations hold the DOM-level steps for a task type; the recovery
/// protocol wraps every invocation with pre- and post-checks.
#[async_trait::async_trait]
pub trait Activity: Send + Sync {
    fn name(&self) -> &str;

    /// When true, an invalid pre-check closes the page instead of
    /// redirecting it back to the dashboard.
    fn close_on_invalid(&self) -> bool {
        false
    }

    async fn run(&self, page: &dyn Page) -> Result<()>;
}
