//! Run command (recycle a service).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use recycle_core::{
    notify_all, Notifier, RecycleConfig, RestoreOutcome, TaskRecycler, TokioSleeper,
};
use recycle_id::{ClusterName, ServiceName};
use tracing::info;

use crate::config::Config;
use crate::error::CliError;
use crate::event::RecycleEvent;
use crate::gateway::HttpControlPlane;
use crate::notify::WebhookNotifier;
use crate::output::print_report;

use super::CommandContext;

/// Run command - stop and replace each running task in turn.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Cluster name or ARN.
    #[arg(long, required_unless_present = "event", conflicts_with = "event")]
    cluster: Option<String>,

    /// Service name or ARN.
    #[arg(long, required_unless_present = "event", conflicts_with = "event")]
    service: Option<String>,

    /// Read cluster, service and options from a JSON event file.
    #[arg(long)]
    event: Option<PathBuf>,

    /// Recycle at current capacity instead of adding a temporary task.
    #[arg(long)]
    no_maintain_service_state: bool,

    /// Seconds to pause after each replaced task.
    #[arg(long)]
    wait_time: Option<u64>,

    /// Stability polls before giving up.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Seconds between stability polls.
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Skip the webhook notification.
    #[arg(long)]
    no_notify: bool,
}

impl RunCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let config = self.build_config(&ctx.config)?;
        let client = ctx.client()?;
        let plane = Arc::new(HttpControlPlane::new(client));

        info!(
            cluster = %config.cluster_name,
            service = %config.service_name,
            api_url = %ctx.config.api_url,
            "Recycling service"
        );

        let recycler = TaskRecycler::new(config, plane.clone(), plane, Arc::new(TokioSleeper));
        let report = recycler.run().await;

        if !self.no_notify {
            if let Some(url) = &ctx.config.webhook_url {
                let webhook = WebhookNotifier::new(url.clone());
                let notifiers: [&dyn Notifier; 1] = [&webhook];
                notify_all(&notifiers, &report).await;
            }
        }

        print_report(&report, ctx.format);

        if report.succeeded() {
            return Ok(());
        }

        let restore_to = match &report.capacity {
            RestoreOutcome::Failed { desired, .. } => Some(*desired),
            _ => None,
        };
        Err(CliError::RunFailed {
            run_id: report.run_id,
            restore_to,
        }
        .into())
    }

    /// Merge the event file, config and flags into a run configuration.
    fn build_config(&self, config: &Config) -> Result<RecycleConfig, CliError> {
        let base = match &self.event {
            Some(path) => RecycleEvent::from_file(path)?.into_config()?,
            None => {
                let cluster = self.cluster.as_deref().unwrap_or_default();
                let service = self.service.as_deref().unwrap_or_default();
                RecycleConfig::new(
                    ClusterName::parse(cluster).map_err(anyhow::Error::from)?,
                    ServiceName::parse(service).map_err(anyhow::Error::from)?,
                )
            }
        };

        let mut stability = config.stability();
        if let Some(max_attempts) = self.max_attempts {
            stability.max_attempts = max_attempts;
        }
        if let Some(poll_interval) = self.poll_interval {
            stability.poll_interval_secs = poll_interval;
        }

        let mut run_config = base
            .with_stability(stability)
            .with_execution_ceiling_secs(config.execution_ceiling_secs);
        if self.no_maintain_service_state {
            run_config.maintain_service_state = false;
        }
        if let Some(wait_time) = self.wait_time {
            run_config.wait_time_secs = wait_time;
        }

        run_config
            .validate()
            .map_err(|e| CliError::Other(anyhow::Error::from(e)))?;
        Ok(run_config)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunCommand,
    }

    fn parse(args: &[&str]) -> RunCommand {
        let mut argv = vec!["run"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().run
    }

    #[test]
    fn test_flags_build_config() {
        let cmd = parse(&[
            "--cluster",
            "prod",
            "--service",
            "web",
            "--no-maintain-service-state",
            "--wait-time",
            "0",
            "--max-attempts",
            "10",
        ]);
        let config = cmd.build_config(&Config::default()).unwrap();

        assert_eq!(config.cluster_name.as_str(), "prod");
        assert!(!config.maintain_service_state);
        assert_eq!(config.wait_time_secs, 0);
        assert_eq!(config.stability.max_attempts, 10);
        assert_eq!(config.stability.poll_interval_secs, 15);
        assert_eq!(config.execution_ceiling_secs, Some(900));
    }

    #[test]
    fn test_flags_override_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        fs::write(
            &path,
            r#"{"cluster_name": "prod", "service_name": "web", "wait_time": "60"}"#,
        )
        .unwrap();

        let cmd = parse(&["--event", path.to_str().unwrap(), "--poll-interval", "5"]);
        let config = cmd.build_config(&Config::default()).unwrap();
        assert_eq!(config.service_name.as_str(), "web");
        assert_eq!(config.wait_time_secs, 60);
        assert_eq!(config.stability.poll_interval_secs, 5);
        assert!(config.maintain_service_state);

        let cmd = parse(&["--event", path.to_str().unwrap(), "--wait-time", "5"]);
        assert_eq!(cmd.build_config(&Config::default()).unwrap().wait_time_secs, 5);
    }

    #[test]
    fn test_event_conflicts_with_names() {
        let result = TestCli::try_parse_from(["run", "--event", "e.json", "--cluster", "prod"]);
        assert!(result.is_err());

        let result = TestCli::try_parse_from(["run", "--cluster", "prod"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let cmd = parse(&["--cluster", "prod", "--service", "web", "--max-attempts", "0"]);
        assert!(cmd.build_config(&Config::default()).is_err());
    }

    #[test]
    fn test_invalid_service_name() {
        let cmd = parse(&["--cluster", "prod", "--service", "web service"]);
        assert!(cmd.build_config(&Config::default()).is_err());
    }
}
