//! Desktop tracking daemon
//!
//! Replays fixes from a newline-delimited JSON file and delivers them to the
//! collector. Configured through the environment:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `GEOTRACK_COLLECTOR_URL` | Collector batch endpoint (required) |
//! | `GEOTRACK_SUBJECT_ID` | Subject stamped on every sample (required) |
//! | `GEOTRACK_COLLECTOR_TOKEN` | Bearer token for the collector |
//! | `GEOTRACK_FIX_FILE` | Fix file to replay, default `<data dir>/fixes.jsonl` |
//! | `GEOTRACK_DATA_DIR` | State directory, default the per-user data dir |
//! | `GEOTRACK_LOG_FORMAT` | `pretty`, `json` or `compact` |
//! | `GEOTRACK_LOG_LEVEL` | `trace`, `debug`, `info`, `warn` or `error` |
//! | `GEOTRACK_START_TRACKING` | `true` switches tracking on and persists it |
//!
//! Without `GEOTRACK_START_TRACKING` the persisted tracking preference decides
//! whether capture resumes; queued samples are delivered either way.

use anyhow::{bail, Context};
use bridge_desktop::{default_data_dir, DesktopNetworkMonitor, ReplayLocationProvider};
use bridge_traits::time::LogLevel;
use core_runtime::config::AgentConfig;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::TrackingAgent;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(logging_config()?)?;

    let data_dir = std::env::var_os("GEOTRACK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(default_data_dir);
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let fix_file = std::env::var_os("GEOTRACK_FIX_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("fixes.jsonl"));

    let mut builder = AgentConfig::builder()
        .database_path(data_dir.join("samples.db"))
        .collector_url(required_var("GEOTRACK_COLLECTOR_URL")?)
        .subject_id(required_var("GEOTRACK_SUBJECT_ID")?)
        .location_provider(Arc::new(ReplayLocationProvider::new(fix_file)))
        .network_monitor(Arc::new(DesktopNetworkMonitor::new()));
    if let Ok(token) = std::env::var("GEOTRACK_COLLECTOR_TOKEN") {
        builder = builder.collector_token(token);
    }

    let agent = TrackingAgent::bootstrap(builder.build()?).await?;
    agent.start().await?;
    let start_tracking = match std::env::var("GEOTRACK_START_TRACKING") {
        Ok(value) => parse_flag(&value)?,
        Err(_) => false,
    };
    if start_tracking {
        agent.start_tracking().await?;
    }
    let status = agent.status().await?;
    info!(
        tracking = status.tracking_enabled,
        capture_running = status.capture_running,
        pending = status.pending_count,
        "geotrackd running, press Ctrl+C to stop"
    );

    wait_for_shutdown().await?;

    info!("Shutting down");
    agent.shutdown().await;
    Ok(())
}

fn required_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("Expected a boolean for GEOTRACK_START_TRACKING, got {other:?}"),
    }
}

fn logging_config() -> anyhow::Result<LoggingConfig> {
    let mut config = LoggingConfig::default();
    if let Ok(format) = std::env::var("GEOTRACK_LOG_FORMAT") {
        config = config.with_format(format.parse::<LogFormat>()?);
    }
    if let Ok(level) = std::env::var("GEOTRACK_LOG_LEVEL") {
        let level = match level.to_ascii_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            other => bail!("Unknown log level: {other}"),
        };
        config = config.with_level(level);
    }
    Ok(config)
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("installing SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("waiting for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true").unwrap());
        assert!(parse_flag(" ON ").unwrap());
        assert!(!parse_flag("0").unwrap());
        assert!(!parse_flag("").unwrap());
        assert!(parse_flag("maybe").is_err());
    }
}
