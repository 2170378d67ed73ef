mod config;
mod run;

pub use config::ConfigCommand;
pub use run::RunCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// baton - leader/follower rendezvous over a single TCP address
#[derive(Parser)]
#[command(name = "baton")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Contend for the rendezvous address until interrupted.
    Run(RunCommand),

    /// Print the effective configuration.
    Config(ConfigCommand),
}

impl Cli {
    /// Execute the CLI command, returning the process exit code.
    pub async fn execute(self) -> Result<i32> {
        match self.command {
            Commands::Run(cmd) => cmd.execute().await,
            Commands::Config(cmd) => cmd.execute().map(|()| 0),
        }
    }
}
