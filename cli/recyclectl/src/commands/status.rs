//! Status command (pre-flight check for a recycle run).

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use recycle_core::{
    ControlPlane, ConvergenceStatus, InflationDecision, ScalableTargetInfo, ScalingInspector,
    ServiceState,
};
use recycle_id::{ClusterName, ServiceName, TaskId};
use serde::Serialize;

use crate::error::CliError;
use crate::gateway::HttpControlPlane;
use crate::output::{print_info, print_json, print_warning, OutputFormat};

use super::CommandContext;

/// Status command - show service state, tasks and the inflation plan.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Cluster name or ARN.
    #[arg(long)]
    cluster: String,

    /// Service name or ARN.
    #[arg(long)]
    service: String,
}

#[derive(Debug, Serialize)]
struct StatusView {
    cluster_name: ClusterName,
    service_name: ServiceName,
    state: ServiceState,
    convergence: ConvergenceStatus,
    task_ids: Vec<TaskId>,
    scalable_target: Option<ScalableTargetInfo>,
    inflation_plan: InflationDecision,
}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let cluster = ClusterName::parse(&self.cluster)?;
        let service = ServiceName::parse(&self.service)?;
        let plane = Arc::new(HttpControlPlane::new(ctx.client()?));

        let state = plane
            .describe_service(&cluster, &service)
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => CliError::NotFound(format!(
                    "Service '{}' not found in cluster '{}'",
                    service, cluster
                )),
                e => CliError::Other(e.into()),
            })?;
        let task_ids = plane
            .list_tasks(&cluster, &service)
            .await
            .map_err(anyhow::Error::from)?;
        let scalable_target = ScalingInspector::new(plane).inspect(&cluster, &service).await;
        let inflation_plan =
            ScalingInspector::plan_inflation(state.desired_count, scalable_target.as_ref());

        let view = StatusView {
            cluster_name: cluster,
            service_name: service,
            convergence: state.convergence(),
            state,
            task_ids,
            scalable_target,
            inflation_plan,
        };

        match ctx.format {
            OutputFormat::Json => print_json(&view),
            OutputFormat::Table => print_status(&view),
        }
        Ok(())
    }
}

fn print_status(view: &StatusView) {
    println!(
        "{} {}/{}",
        "Service".bold(),
        view.cluster_name,
        view.service_name
    );
    print_info(&format!("State: {}", view.state.summary()));
    for task_id in &view.task_ids {
        println!("  {}", task_id);
    }
    match &view.scalable_target {
        Some(target) => print_info(&format!(
            "Autoscaling: min {} max {}",
            target.min_capacity, target.max_capacity
        )),
        None => print_info("Autoscaling: not registered"),
    }
    print_info(&format!("Inflation plan: {:?}", view.inflation_plan));

    match view.convergence {
        ConvergenceStatus::Converged if view.task_ids.len() as u32 == view.state.running_count => {
            println!("{}", "Ready to recycle".green().bold());
        }
        ConvergenceStatus::Diverged => {
            print_warning("Current rollout failed; recycling would be refused");
        }
        _ => print_warning("Service is not steady; recycling would be refused"),
    }
}
