//! Page health classification.
//!
//! Stateless, layered cheap-to-expensive checks: URL string inspection before
//! content retrieval before DOM probes before full-text scans, so a healthy
//! page resolves after the cheapest check and a network failure resolves
//! before any DOM work. Classification never errors -- a failed check is
//! itself a classification.

use std::time::Duration;

use tracing::debug;

use crate::page::Page;

/// Minimum markup length below which a page is considered degenerate.
const MIN_CONTENT_LEN: usize = 100;

/// Per-selector visibility probe bound for async-rendered activity content.
const VISIBILITY_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Chromium renders its own error pages under this scheme.
const BROWSER_ERROR_SCHEME: &str = "chrome-error://";

/// Marker class Chromium puts on the document body of a network error page.
const NET_ERROR_MARKER: &str = "body.neterror";

/// Text signatures of HTTP and network failures as rendered into page text
/// or markup. Matched case-sensitively; these appear verbatim.
const ERROR_SIGNATURES: &[&str] = &[
    "ERR_CONNECTION_RESET",
    "ERR_CONNECTION_REFUSED",
    "ERR_CONNECTION_TIMED_OUT",
    "ERR_NAME_NOT_RESOLVED",
    "ERR_INTERNET_DISCONNECTED",
    "ERR_TIMED_OUT",
    "DNS_PROBE_FINISHED_NXDOMAIN",
    "400 Bad Request",
    "403 Forbidden",
    "404 Not Found",
    "500 Internal Server Error",
    "502 Bad Gateway",
    "503 Service Unavailable",
    "504 Gateway Timeout",
    "This page isn't working",
    "This site can't be reached",
];

/// Selectors that indicate an interactive task is present on the page.
/// Probed cheaply (existence) first.
const ACTIVITY_SELECTORS: &[&str] = &[
    "#quizStart",
    ".quizOption",
    ".pollOption",
    ".optionContainer",
    ".rewardCard",
    "[data-task-id]",
];

/// Subset of [`ACTIVITY_SELECTORS`] that render asynchronously and warrant a
/// short visibility wait when the existence pass finds nothing.
const ASYNC_ACTIVITY_SELECTORS: &[&str] = &["#quizStart", ".rewardCard"];

/// Result of one health check. Immutable, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCheckResult {
    pub invalid: bool,
    pub reason: Option<String>,
}

impl PageCheckResult {
    fn valid() -> Self {
        Self {
            invalid: false,
            reason: None,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            invalid: true,
            reason: Some(reason.into()),
        }
    }
}

/// Classify the navigable/content state of a page.
///
/// Ordered, short-circuiting checks; first match wins. Errors raised by the
/// page handle are caught and converted into an invalid classification --
/// this function never propagates an error.
pub async fn check_page_health(page: &dyn Page) -> PageCheckResult {
    // 1. Blank or uncommitted URL.
    let url = page.url().unwrap_or_default();
    if url.is_empty() || url == "about:blank" {
        return PageCheckResult::invalid("blank page");
    }

    // 2. The browser's own error page.
    if url.starts_with(BROWSER_ERROR_SCHEME) {
        return PageCheckResult::invalid("browser error page");
    }

    // 3. Content retrieval, with a degenerate-length floor.
    let content = match page.content().await {
        Ok(c) => c,
        Err(e) => {
            debug!(url = %url, error = %e, "content retrieval failed during health check");
            return PageCheckResult::invalid(format!("page check failed: {e}"));
        }
    };
    // Character count, not bytes: multibyte pages must not pass on byte
    // length alone.
    if content.chars().count() < MIN_CONTENT_LEN {
        return PageCheckResult::invalid("empty page content");
    }

    // 4. Network-error marker class on the document root.
    match page.has_element(NET_ERROR_MARKER).await {
        Ok(true) => return PageCheckResult::invalid("network error"),
        Ok(false) => {}
        Err(e) => {
            debug!(url = %url, error = %e, "marker probe failed during health check");
            return PageCheckResult::invalid(format!("page check failed: {e}"));
        }
    }

    // 5. Error signatures anywhere in the markup.
    for sig in ERROR_SIGNATURES {
        if content.contains(sig) {
            return PageCheckResult::invalid(format!("HTTP/network error: {sig}"));
        }
    }

    PageCheckResult::valid()
}

/// Whether the page currently shows interactive task content.
///
/// Cheap existence probes across the known selector catalogue first, then a
/// short bounded visibility wait for selectors that render asynchronously.
/// Returns `false` on any internal error; never errors.
pub async fn has_activity_content(page: &dyn Page) -> bool {
    for selector in ACTIVITY_SELECTORS {
        match page.has_element(selector).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                debug!(selector, error = %e, "activity probe failed");
                return false;
            }
        }
    }

    for selector in ASYNC_ACTIVITY_SELECTORS {
        match page.wait_visible(selector, VISIBILITY_PROBE_TIMEOUT).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                debug!(selector, error = %e, "visibility probe failed");
                return false;
            }
        }
    }

    false
}

/// Whether `url` belongs to one of the allow-listed domains.
/// Pure substring containment; order-independent.
pub fn is_on_expected_domain(url: &str, allowlist: &[String]) -> bool {
    allowlist.iter().any(|domain| url.contains(domain.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::testing::MockPage;

    #[tokio::test]
    async fn blank_url_is_invalid() {
        let page = MockPage {
            url: Some("about:blank".into()),
            ..Default::default()
        };
        let result = check_page_health(&page).await;
        assert!(result.invalid);
        assert_eq!(result.reason.as_deref(), Some("blank page"));
    }

    #[tokio::test]
    async fn empty_url_is_invalid() {
        let page = MockPage {
            url: Some(String::new()),
            ..Default::default()
        };
        let result = check_page_health(&page).await;
        assert!(result.invalid);
        assert_eq!(result.reason.as_deref(), Some("blank page"));

        let page = MockPage {
            url: None,
            ..Default::default()
        };
        let result = check_page_health(&page).await;
        assert_eq!(result.reason.as_deref(), Some("blank page"));
    }

    #[tokio::test]
    async fn browser_error_scheme_is_invalid() {
        let page = MockPage {
            url: Some("chrome-error://chromewebdata/".into()),
            ..Default::default()
        };
        let result = check_page_health(&page).await;
        assert!(result.invalid);
        assert_eq!(result.reason.as_deref(), Some("browser error page"));
    }

    #[tokio::test]
    async fn short_content_is_invalid() {
        let page = MockPage {
            content: Ok("<html></html>".into()),
            ..Default::default()
        };
        let result = check_page_health(&page).await;
        assert!(result.invalid);
        assert_eq!(result.reason.as_deref(), Some("empty page content"));
    }

    #[tokio::test]
    async fn content_length_is_measured_in_characters_not_bytes() {
        // 99 two-byte characters: 198 bytes, still below the floor.
        let page = MockPage {
            content: Ok("é".repeat(MIN_CONTENT_LEN - 1)),
            ..Default::default()
        };
        let result = check_page_health(&page).await;
        assert!(result.invalid);
        assert_eq!(result.reason.as_deref(), Some("empty page content"));

        let page = MockPage {
            content: Ok("é".repeat(MIN_CONTENT_LEN)),
            ..Default::default()
        };
        let result = check_page_health(&page).await;
        assert!(!result.invalid);
    }

    #[tokio::test]
    async fn content_retrieval_failure_is_invalid_not_an_error() {
        let page = MockPage {
            content: Err("tab crashed".into()),
            ..Default::default()
        };
        let result = check_page_health(&page).await;
        assert!(result.invalid);
        assert!(result.reason.unwrap().starts_with("page check failed:"));
    }

    #[tokio::test]
    async fn net_error_marker_is_invalid() {
        let page = MockPage {
            present_selectors: vec!["body.neterror"],
            ..Default::default()
        };
        let result = check_page_health(&page).await;
        assert!(result.invalid);
        assert_eq!(result.reason.as_deref(), Some("network error"));
    }

    #[tokio::test]
    async fn connection_reset_signature_is_invalid() {
        let mut body = "x".repeat(200);
        body.push_str("ERR_CONNECTION_RESET");
        let page = MockPage {
            content: Ok(body),
            ..Default::default()
        };
        let result = check_page_health(&page).await;
        assert!(result.invalid);
        assert!(result.reason.unwrap().contains("ERR_CONNECTION_RESET"));
    }

    #[tokio::test]
    async fn http_error_banner_is_invalid() {
        let mut body = "x".repeat(200);
        body.push_str("502 Bad Gateway");
        let page = MockPage {
            content: Ok(body),
            ..Default::default()
        };
        let result = check_page_health(&page).await;
        assert!(result.invalid);
        assert!(result.reason.unwrap().contains("502 Bad Gateway"));
    }

    #[tokio::test]
    async fn healthy_page_is_valid() {
        let page = MockPage::default();
        let result = check_page_health(&page).await;
        assert!(!result.invalid);
        assert!(result.reason.is_none());
    }

    #[tokio::test]
    async fn activity_content_found_by_existence_probe() {
        let page = MockPage {
            present_selectors: vec![".rewardCard"],
            ..Default::default()
        };
        assert!(has_activity_content(&page).await);
    }

    #[tokio::test]
    async fn activity_content_found_by_visibility_fallback() {
        let page = MockPage {
            visible_selectors: vec!["#quizStart"],
            ..Default::default()
        };
        assert!(has_activity_content(&page).await);
    }

    #[tokio::test]
    async fn no_activity_content_returns_false() {
        let page = MockPage::default();
        assert!(!has_activity_content(&page).await);
    }

    #[test]
    fn domain_allowlist_is_substring_containment() {
        let allow = vec!["rewards.example.com".to_string(), "tasks.example.net".to_string()];
        assert!(is_on_expected_domain(
            "https://rewards.example.com/earn?id=1",
            &allow
        ));
        assert!(is_on_expected_domain("https://tasks.example.net/", &allow));
        assert!(!is_on_expected_domain("https://evil.example.org/", &allow));
        assert!(!is_on_expected_domain("", &allow));
    }
}
