//! TOML configuration for the rewardpatrol daemon.
//!
//! Layered model with compiled-in defaults, environment variable override for
//! the config file path, and a standard filesystem location.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the daemon process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub run: RunConfig,
    pub schedule: ScheduleConfig,
    pub accounts: AccountsConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `REWARDPATROL_CONFIG` environment variable.
    /// 2. `/etc/rewardpatrol/rewardpatrol.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("REWARDPATROL_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "REWARDPATROL_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/rewardpatrol/rewardpatrol.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

/// Control API listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bind address for the control API. Loopback by default: the daemon
    /// carries no user allow-list, so exposure is an explicit decision.
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7690".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Automation run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Canonical dashboard URL; the recovery redirect target.
    pub base_url: String,
    /// Domain substrings an activity is allowed to land on.
    pub allowed_domains: Vec<String>,
    /// Number of account flows processed concurrently.
    pub clusters: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: "https://rewards.example.com/".to_string(),
            allowed_domains: vec![
                "rewards.example.com".to_string(),
                "tasks.example.net".to_string(),
            ],
            clusters: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// Unattended run scheduling.
///
/// Either a 5-field cron expression or a fixed interval in minutes; the cron
/// rule wins when both are set. Jitter is added on top of every computed
/// next-run time so unattended runs are not perfectly periodic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Cron expression, e.g. `"0 0 9 * * *"` (seconds-resolution, 6 fields
    /// accepted by the parser; classic 5-field forms also parse).
    pub cron: Option<String>,
    /// Fixed interval between runs, in minutes.
    pub interval_minutes: Option<u64>,
    /// Upper bound on the random delay added to each computed run time.
    pub jitter_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: None,
            interval_minutes: Some(24 * 60),
            jitter_minutes: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Where the read-only account file lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// Path to the JSON account list.
    pub path: PathBuf,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("accounts.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = Config::default();

        assert_eq!(cfg.api.bind, "127.0.0.1:7690");

        assert_eq!(cfg.run.base_url, "https://rewards.example.com/");
        assert_eq!(cfg.run.allowed_domains.len(), 2);
        assert_eq!(cfg.run.clusters, 2);

        assert!(cfg.schedule.enabled);
        assert!(cfg.schedule.cron.is_none());
        assert_eq!(cfg.schedule.interval_minutes, Some(24 * 60));
        assert_eq!(cfg.schedule.jitter_minutes, 30);

        assert_eq!(cfg.accounts.path, PathBuf::from("accounts.json"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [schedule]
            cron = "0 0 9 * * *"
            jitter_minutes = 5
            "#,
        )
        .unwrap();

        assert_eq!(cfg.schedule.cron.as_deref(), Some("0 0 9 * * *"));
        assert_eq!(cfg.schedule.jitter_minutes, 5);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.api.bind, "127.0.0.1:7690");
        assert_eq!(cfg.run.clusters, 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [run]
            base_url = "https://rewards.example.org/"
            clusters = 4
            "#
        )
        .unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.run.base_url, "https://rewards.example.org/");
        assert_eq!(cfg.run.clusters, 4);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = Config::load(Path::new("/nonexistent/rewardpatrol.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
