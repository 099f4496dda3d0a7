use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use rewardpatrol::config::Config;

const DEFAULT_API: &str = "http://127.0.0.1:7690";

#[derive(Parser)]
#[command(
    name = "rewardpatrol",
    about = "Unattended rewards-task automation with scheduling and remote control",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML config file (default: REWARDPATROL_CONFIG or
    /// /etc/rewardpatrol/rewardpatrol.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (control API + scheduler + run supervisor)
    Serve {
        /// Bind address override
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the automation once in the foreground, without the daemon
    Run,

    /// Health-check a single page URL and print the classification
    Probe {
        /// URL to open
        #[arg(long)]
        url: String,
    },

    /// Ask a running daemon to start a run now
    Trigger {
        #[arg(long, default_value = DEFAULT_API)]
        api: String,
    },

    /// Show the daemon's run status
    Status {
        #[arg(long, default_value = DEFAULT_API)]
        api: String,
    },

    /// Show the daemon's schedule status
    Schedule {
        #[arg(long, default_value = DEFAULT_API)]
        api: String,
    },

    /// Move the daemon's next scheduled run to an explicit time
    Reschedule {
        #[arg(long, default_value = DEFAULT_API)]
        api: String,

        /// New next-run time, RFC 3339 (e.g. 2026-09-01T09:00:00Z)
        #[arg(long)]
        at: String,
    },

    /// Ask a running daemon to stop the current run gracefully
    Stop {
        #[arg(long, default_value = DEFAULT_API)]
        api: String,
    },

    /// Ask a running daemon to restart the current run
    Restart {
        #[arg(long, default_value = DEFAULT_API)]
        api: String,
    },

    /// List configured accounts (redacted)
    Accounts,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.api.bind.clone());
            tracing::info!(%bind, "starting rewardpatrol daemon");
            let driver = browser_driver(&config)?;
            rewardpatrol::serve(&bind, config, driver).await?;
        }
        Commands::Run => {
            run_once(config).await?;
        }
        Commands::Probe { url } => {
            probe(&url).await?;
        }
        Commands::Trigger { api } => {
            post_op(&api, "/run/start").await?;
        }
        Commands::Status { api } => {
            let status = get_json(&api, "/run/status").await?;
            println!(
                "Running:    {}",
                status["running"].as_bool().unwrap_or(false)
            );
            if let Some(pid) = status["processId"].as_u64() {
                println!("Process ID: {pid}");
            }
            if let Some(started) = status["startedAt"].as_str() {
                println!("Started at: {started}");
            }
            if let Some(uptime) = status["uptimeMs"].as_i64() {
                println!("Uptime:     {}s", uptime / 1000);
            }
            if let Some(error) = status["errorMessage"].as_str() {
                println!("Last error: {error}");
            }
        }
        Commands::Schedule { api } => {
            let status = get_json(&api, "/schedule").await?;
            println!("Active:   {}", status["active"].as_bool().unwrap_or(false));
            println!(
                "Running:  {}",
                status["isRunning"].as_bool().unwrap_or(false)
            );
            println!(
                "Next run: {}",
                status["nextRun"].as_str().unwrap_or("not scheduled")
            );
            println!("Last run: {}", status["lastRun"].as_str().unwrap_or("never"));
        }
        Commands::Reschedule { api, at } => {
            let at: chrono::DateTime<chrono::Utc> = at
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid --at time (expected RFC 3339): {e}"))?;
            let status = post_json(&api, "/schedule", serde_json::json!({ "nextRun": at })).await?;
            println!(
                "Next run: {}",
                status["nextRun"].as_str().unwrap_or("not scheduled")
            );
        }
        Commands::Stop { api } => {
            post_op(&api, "/run/stop").await?;
        }
        Commands::Restart { api } => {
            post_op(&api, "/run/restart").await?;
        }
        Commands::Accounts => {
            let accounts = rewardpatrol::accounts::load(&config.accounts.path)?;
            if accounts.is_empty() {
                println!("No accounts configured.");
            } else {
                println!("{:<30} | Enabled", "Account");
                println!("{:-<30}-|--------", "");
                for account in &accounts {
                    println!("{:<30} | {}", account.redacted_email(), account.enabled);
                }
            }
        }
    }

    Ok(())
}

/// POST one control operation and render the structured result verbatim.
async fn post_op(api: &str, path: &str) -> Result<()> {
    let url = format!("{api}/api/v1{path}");
    let response: serde_json::Value = reqwest::Client::new()
        .post(&url)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("daemon unreachable at {api}: {e}"))?
        .json()
        .await?;

    if response["success"].as_bool().unwrap_or(false) {
        println!("OK");
    } else {
        println!(
            "Refused: {}",
            response["error"].as_str().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn post_json(api: &str, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
    let url = format!("{api}/api/v1{path}");
    let response = reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("daemon unreachable at {api}: {e}"))?
        .json()
        .await?;
    Ok(response)
}

async fn get_json(api: &str, path: &str) -> Result<serde_json::Value> {
    let url = format!("{api}/api/v1{path}");
    let response = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("daemon unreachable at {api}: {e}"))?
        .json()
        .await?;
    Ok(response)
}

#[cfg(feature = "browser")]
fn browser_driver(
    config: &Config,
) -> Result<std::sync::Arc<dyn rewardpatrol::runner::PageDriver>> {
    Ok(std::sync::Arc::new(
        rewardpatrol::page::chrome::ChromeDriver::new(config.run.clone()),
    ))
}

#[cfg(not(feature = "browser"))]
fn browser_driver(
    _config: &Config,
) -> Result<std::sync::Arc<dyn rewardpatrol::runner::PageDriver>> {
    anyhow::bail!("built without a browser backend; rebuild with --features browser")
}

#[cfg(feature = "browser")]
async fn run_once(config: Config) -> Result<()> {
    use tokio_util::sync::CancellationToken;

    let accounts = rewardpatrol::accounts::load(&config.accounts.path)?;
    let enabled = rewardpatrol::accounts::enabled(&accounts);
    anyhow::ensure!(!enabled.is_empty(), "no enabled accounts configured");

    let driver = browser_driver(&config)?;
    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("stop requested, finishing the current activity");
            stop.cancel();
        });
    }

    let summary = rewardpatrol::runner::run_all(&config.run, enabled, driver, stop).await;
    println!("Run finished: {summary}");
    Ok(())
}

#[cfg(not(feature = "browser"))]
async fn run_once(_config: Config) -> Result<()> {
    anyhow::bail!("built without a browser backend; rebuild with --features browser")
}

#[cfg(feature = "browser")]
async fn probe(url: &str) -> Result<()> {
    use std::time::Duration;

    use rewardpatrol::page::chrome::{ChromeDriver, ChromePage};
    use rewardpatrol::page::validator::check_page_health;
    use rewardpatrol::page::Page;

    let driver = ChromeDriver::new(rewardpatrol::config::RunConfig::default());
    let tab = tokio::task::block_in_place(|| driver.raw_tab())?;
    let page = ChromePage::new(tab);
    page.navigate(url, Duration::from_secs(15)).await?;

    let result = check_page_health(&page).await;
    if result.invalid {
        println!(
            "INVALID: {}",
            result.reason.as_deref().unwrap_or("no reason recorded")
        );
    } else {
        println!("VALID");
    }
    let _ = page.close().await;
    Ok(())
}

#[cfg(not(feature = "browser"))]
async fn probe(_url: &str) -> Result<()> {
    anyhow::bail!("built without a browser backend; rebuild with --features browser")
}
