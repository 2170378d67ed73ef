use anyhow::Result;
use baton::Baton;
use baton_core::config::LoggingConfig;
use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

use super::config::ConfigArgs;

/// Contend for the rendezvous address until interrupted.
#[derive(Parser)]
pub struct RunCommand {
    #[command(flatten)]
    pub args: ConfigArgs,
}

impl RunCommand {
    /// Execute the run command, returning the process exit code.
    pub async fn execute(self) -> Result<i32> {
        let config = self.args.load()?;
        init_tracing(&config.logging);

        println!();
        println!(
            "  {}  v{}",
            style("baton").bold().cyan(),
            env!("CARGO_PKG_VERSION")
        );
        println!(
            "  Rendezvous at {}",
            style(&config.cluster.bind_addr).cyan()
        );
        println!();

        let baton = Baton::builder().config(config).build()?;
        let report = baton.run().await?;

        if report.is_clean() {
            println!("\n  {}", style("Stopped").bold());
        } else {
            eprintln!(
                "\n  {} shutdown deadline elapsed",
                style("Forced exit:").bold().red()
            );
        }

        Ok(report.exit_code())
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}
