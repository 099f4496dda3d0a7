//! Scriptable page double shared by validator and recovery tests.

use std::sync::Mutex;
use std::time::Duration;

use crate::page::{Page, PageError};

pub(crate) struct MockPage {
    pub url: Option<String>,
    pub content: Result<String, String>,
    pub present_selectors: Vec<&'static str>,
    pub visible_selectors: Vec<&'static str>,
    /// Records navigate/close calls for assertions.
    pub log: Mutex<Vec<String>>,
    /// When set, navigate() fails with this reason.
    pub fail_navigation: Option<String>,
}

impl Default for MockPage {
    fn default() -> Self {
        Self {
            url: Some("https://rewards.example.com/dashboard".into()),
            content: Ok("x".repeat(500)),
            present_selectors: vec![],
            visible_selectors: vec![],
            log: Mutex::new(Vec::new()),
            fail_navigation: None,
        }
    }
}

impl MockPage {
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Page for MockPage {
    fn url(&self) -> Option<String> {
        self.url.clone()
    }

    async fn content(&self) -> Result<String, PageError> {
        self.content.clone().map_err(PageError::Backend)
    }

    async fn has_element(&self, selector: &str) -> Result<bool, PageError> {
        Ok(self.present_selectors.contains(&selector))
    }

    async fn wait_visible(&self, selector: &str, _timeout: Duration) -> Result<bool, PageError> {
        Ok(self.visible_selectors.contains(&selector))
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), PageError> {
        self.log.lock().unwrap().push(format!("navigate:{url}"));
        match &self.fail_navigation {
            Some(reason) => Err(PageError::Navigation {
                url: url.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn wait_ready(&self, _timeout: Duration) -> Result<(), PageError> {
        self.log.lock().unwrap().push("wait_ready".into());
        Ok(())
    }

    async fn close(&self) -> Result<(), PageError> {
        self.log.lock().unwrap().push("close".into());
        Ok(())
    }
}
