//! CLI commands.

mod config;
mod run;
mod status;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use crate::client::ApiClient;
use crate::config::Config;
use crate::output::OutputFormat;

/// recyclectl - replace every task of a service, one at a time.
#[derive(Debug, Parser)]
#[command(name = "recyclectl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Control-plane gateway URL (overrides config and RECYCLE_API_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "RECYCLE_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Recycle every running task of a service.
    Run(run::RunCommand),

    /// Show whether a service can be recycled right now.
    Status(status::StatusCommand),

    /// Show the effective configuration.
    Config(config::ConfigCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let format = match self.format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        };

        let mut config = Config::load()?;
        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
        }

        crate::init_tracing(&config.log_level, self.log_format);

        let ctx = CommandContext { config, format };

        match self.command {
            Commands::Run(cmd) => cmd.run(ctx).await,
            Commands::Status(cmd) => cmd.run(ctx).await,
            Commands::Config(cmd) => cmd.run(ctx),
            Commands::Version => {
                println!("recyclectl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Get an API client for the configured gateway.
    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.config)
    }
}
