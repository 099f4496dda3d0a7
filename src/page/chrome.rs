//! Headless Chrome backend for the [`Page`] capability.
//!
//! Requires Chrome/Chromium on the host and the `browser` cargo feature.
//! All CDP calls are blocking, so every method hops through
//! `spawn_blocking`. Authentication is expected to come from the launched
//! profile; this backend performs no site-specific login steps.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use headless_chrome::{Browser, Tab};
use tracing::{debug, info};

use crate::accounts::Account;
use crate::config::RunConfig;
use crate::page::validator::has_activity_content;
use crate::page::{Activity, Page, PageError};
use crate::runner::{PageDriver, Session};

/// Timeout a tab starts with, restored after any scoped override.
const TAB_DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// One Chrome tab behind the [`Page`] trait.
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, PageError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Tab>) -> Result<T, String> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || op(tab))
            .await
            .map_err(|e| PageError::Backend(format!("blocking task failed: {e}")))?
            .map_err(PageError::Backend)
    }
}

#[async_trait::async_trait]
impl Page for ChromePage {
    fn url(&self) -> Option<String> {
        let url = self.tab.get_url();
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }

    async fn content(&self) -> Result<String, PageError> {
        self.blocking(|tab| tab.get_content().map_err(|e| e.to_string()))
            .await
    }

    async fn has_element(&self, selector: &str) -> Result<bool, PageError> {
        let selector = selector.to_string();
        self.blocking(move |tab| Ok(tab.find_element(&selector).is_ok()))
            .await
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<bool, PageError> {
        let selector = selector.to_string();
        self.blocking(move |tab| {
            Ok(tab
                .wait_for_element_with_custom_timeout(&selector, timeout)
                .is_ok())
        })
        .await
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), PageError> {
        let url = url.to_string();
        self.blocking(move |tab| {
            // The timeout applies to this navigation only; restore the tab
            // default so later CDP calls keep their own bound.
            tab.set_default_timeout(timeout);
            let navigated = tab
                .navigate_to(&url)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| e.to_string());
            tab.set_default_timeout(TAB_DEFAULT_TIMEOUT);
            navigated
        })
        .await
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<(), PageError> {
        self.blocking(move |tab| {
            tab.wait_for_element_with_custom_timeout("body", timeout)
                .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), PageError> {
        self.blocking(|tab| {
            tab.close(true).map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
    }
}

/// Built-in activity: verify the dashboard actually presents earnable
/// content. Site-specific task types plug in as further [`Activity`]
/// implementations.
pub struct DashboardSweep;

#[async_trait::async_trait]
impl Activity for DashboardSweep {
    fn name(&self) -> &str {
        "dashboard-sweep"
    }

    async fn run(&self, page: &dyn Page) -> Result<()> {
        if has_activity_content(page).await {
            Ok(())
        } else {
            anyhow::bail!("no activity content on the dashboard")
        }
    }
}

/// Opens one Chrome tab per account session, landing on the dashboard.
/// The browser launches lazily on the first session and is shared.
pub struct ChromeDriver {
    config: RunConfig,
    browser: Mutex<Option<Browser>>,
}

impl ChromeDriver {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
        }
    }

    /// Blocking: launches the browser on first use and opens a fresh tab.
    pub fn raw_tab(&self) -> Result<Arc<Tab>> {
        let mut guard = self.browser.lock().expect("browser lock poisoned");
        if guard.is_none() {
            info!("launching headless Chrome");
            let browser = Browser::default().context("Chrome launch failed")?;
            *guard = Some(browser);
        }
        guard
            .as_ref()
            .expect("browser just initialized")
            .new_tab()
            .context("opening browser tab failed")
    }
}

#[async_trait::async_trait]
impl PageDriver for ChromeDriver {
    async fn open(&self, account: &Account) -> Result<Session> {
        debug!(account = %account.redacted_email(), "opening dashboard session");

        // Browser launch and tab creation are blocking CDP calls.
        let tab = tokio::task::block_in_place(|| self.raw_tab())?;
        let page = ChromePage::new(tab);
        page.navigate(&self.config.base_url, Duration::from_secs(15))
            .await
            .context("navigating to the dashboard failed")?;
        page.wait_ready(Duration::from_secs(10))
            .await
            .context("dashboard never settled")?;

        Ok(Session {
            page: Box::new(page),
            activities: vec![Box::new(DashboardSweep)],
        })
    }
}
