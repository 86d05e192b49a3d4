//! Config command (inspect configuration).

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::Config;
use crate::output::{print_json, print_output, OutputFormat};

/// Config command.
#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration (token masked).
    Show,

    /// Print the config file location.
    Path,
}

#[derive(Debug, serde::Serialize, tabled::Tabled)]
struct Setting {
    #[tabled(rename = "Key")]
    key: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

impl ConfigCommand {
    pub fn run(self, ctx: super::CommandContext) -> Result<()> {
        match self.command {
            ConfigCommands::Show => {
                let config = ctx.config.redacted();
                match ctx.format {
                    OutputFormat::Json => print_json(&config),
                    OutputFormat::Table => print_output(&settings(&config), ctx.format),
                }
            }
            ConfigCommands::Path => println!("{}", Config::path()?.display()),
        }
        Ok(())
    }
}

fn settings(config: &Config) -> Vec<Setting> {
    let optional = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    vec![
        Setting {
            key: "api_url",
            value: config.api_url.clone(),
        },
        Setting {
            key: "api_token",
            value: optional(&config.api_token),
        },
        Setting {
            key: "webhook_url",
            value: optional(&config.webhook_url),
        },
        Setting {
            key: "stability_max_attempts",
            value: config.stability_max_attempts.to_string(),
        },
        Setting {
            key: "stability_poll_interval_secs",
            value: config.stability_poll_interval_secs.to_string(),
        },
        Setting {
            key: "execution_ceiling_secs",
            value: config
                .execution_ceiling_secs
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
        },
        Setting {
            key: "log_level",
            value: config.log_level.clone(),
        },
    ]
}
