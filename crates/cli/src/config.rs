//! Top-level CLI configuration.

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

/// Inspect cluster membership and exercise node-addressed RPC.
#[derive(Debug, Parser)]
#[command(name = "nodectl", version)]
pub struct CliConfig {
    /// Log filter used when RUST_LOG is unset (e.g. "debug", "transport=trace").
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Install logging, run the command, print its result.
    pub fn run(self) -> anyhow::Result<()> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => self
                .log_level
                .parse::<EnvFilter>()
                .with_context(|| format!("invalid log level {:?}", self.log_level))?,
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start runtime")?;
        let result = runtime.block_on(self.command.execute())?;
        println!("{}", result);
        Ok(())
    }
}
