use std::path::PathBuf;

use anyhow::{Context, Result};
use baton_core::config::BatonConfig;
use clap::{Args, Parser};

/// Configuration source shared by every command.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Configuration file path. Defaults apply when it does not exist.
    #[arg(short, long, default_value = "baton.toml")]
    pub config: PathBuf,

    /// Rendezvous address (overrides config).
    #[arg(long)]
    pub bind: Option<String>,

    /// Idle timeout in milliseconds (overrides config).
    #[arg(long)]
    pub idle_timeout_ms: Option<u64>,

    /// Heartbeat interval in milliseconds (overrides config).
    #[arg(long)]
    pub heartbeat_interval_ms: Option<u64>,

    /// Pause between role attempts in milliseconds (overrides config).
    #[arg(long)]
    pub retry_backoff_ms: Option<u64>,

    /// Shutdown deadline in milliseconds (overrides config).
    #[arg(long)]
    pub shutdown_deadline_ms: Option<u64>,

    /// Log level filter (overrides config; `RUST_LOG` still wins).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON logs.
    #[arg(long)]
    pub json_logs: bool,
}

impl ConfigArgs {
    /// Load the file (or defaults), apply overrides, validate.
    pub fn load(&self) -> Result<BatonConfig> {
        let mut config = BatonConfig::from_file_or_default(&self.config)
            .with_context(|| format!("Failed to load {}", self.config.display()))?;
        self.apply(&mut config);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn apply(&self, config: &mut BatonConfig) {
        if let Some(bind) = &self.bind {
            config.cluster.bind_addr = bind.clone();
        }
        if let Some(ms) = self.idle_timeout_ms {
            config.cluster.idle_timeout_ms = ms;
        }
        if let Some(ms) = self.heartbeat_interval_ms {
            config.cluster.heartbeat_interval_ms = Some(ms);
        }
        if let Some(ms) = self.retry_backoff_ms {
            config.cluster.retry_backoff_ms = ms;
        }
        if let Some(ms) = self.shutdown_deadline_ms {
            config.shutdown.deadline_ms = ms;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json_format = true;
        }
    }
}

/// Print the effective configuration as TOML.
#[derive(Parser)]
pub struct ConfigCommand {
    #[command(flatten)]
    pub args: ConfigArgs,
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        let config = self.args.load()?;
        print!("{}", config.to_toml()?);
        Ok(())
    }
}
