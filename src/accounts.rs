//! Read-only account list.
//!
//! Accounts come from a JSON file maintained outside this process. The core
//! never writes them back; any display path goes through the redacted
//! projection so credentials cannot leak into logs or API responses.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One rewards account. The password is carried for the browser backend only;
/// `Debug` and the redacted projection never reveal it.
#[derive(Clone, Deserialize)]
pub struct Account {
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("email", &self.redacted_email())
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl Account {
    /// First two characters of the local part plus the domain,
    /// e.g. `al***@example.com`.
    pub fn redacted_email(&self) -> String {
        match self.email.split_once('@') {
            Some((local, domain)) => {
                let head: String = local.chars().take(2).collect();
                format!("{head}***@{domain}")
            }
            None => {
                let head: String = self.email.chars().take(2).collect();
                format!("{head}***")
            }
        }
    }
}

/// Redacted projection handed to status surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub email: String,
    pub enabled: bool,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            email: account.redacted_email(),
            enabled: account.enabled,
        }
    }
}

/// Load the account list from `path`.
pub fn load(path: &Path) -> Result<Vec<Account>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read account file: {}", path.display()))?;
    let accounts: Vec<Account> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse account file: {}", path.display()))?;
    Ok(accounts)
}

/// Enabled accounts only, in file order.
pub fn enabled(accounts: &[Account]) -> Vec<Account> {
    accounts.iter().filter(|a| a.enabled).cloned().collect()
}
