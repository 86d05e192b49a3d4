//! Collaborator interfaces.
//!
//! The recycler talks to the outside world only through these traits:
//! - [`ControlPlane`]: service and task operations
//! - [`ScalingRegistry`]: autoscaling registrations
//! - [`Sleeper`]: every suspension point (poll delays and pacing)
//! - [`Notifier`]: report hand-off after the run
//!
//! Production clients live in the CLI; tests use `recycle-testing`.

use std::time::Duration;

use async_trait::async_trait;
use recycle_id::{ClusterName, ServiceName, TaskId};
use tracing::{info, warn};

use crate::error::{ControlPlaneError, NotifyError};
use crate::model::{ScalableTargetInfo, ServiceState, TaskDescription};
use crate::report::RecycleReport;

/// Result type for collaborator calls.
pub type PlaneResult<T> = Result<T, ControlPlaneError>;

/// Container service control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Describe a service.
    async fn describe_service(
        &self,
        cluster: &ClusterName,
        service: &ServiceName,
    ) -> PlaneResult<ServiceState>;

    /// List tasks of a service whose desired status is RUNNING.
    async fn list_tasks(
        &self,
        cluster: &ClusterName,
        service: &ServiceName,
    ) -> PlaneResult<Vec<TaskId>>;

    /// Describe tasks. Unknown IDs are omitted from the result.
    async fn describe_tasks(
        &self,
        cluster: &ClusterName,
        task_ids: &[TaskId],
    ) -> PlaneResult<Vec<TaskDescription>>;

    /// Stop a task.
    async fn stop_task(
        &self,
        cluster: &ClusterName,
        task_id: &TaskId,
        reason: &str,
    ) -> PlaneResult<()>;

    /// Set the desired count of a service.
    async fn update_desired_count(
        &self,
        cluster: &ClusterName,
        service: &ServiceName,
        desired_count: u32,
    ) -> PlaneResult<()>;
}

/// Autoscaling registry.
#[async_trait]
pub trait ScalingRegistry: Send + Sync {
    /// Look up the scalable target for a resource. `None` if not registered.
    async fn describe_scalable_target(
        &self,
        resource_id: &str,
    ) -> PlaneResult<Option<ScalableTargetInfo>>;
}

/// Suspension point used by every wait in the recycler.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Receives the final report.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &RecycleReport) -> Result<(), NotifyError>;
}

/// Hand the report to every notifier. Failures are logged and never change
/// the run outcome.
pub async fn notify_all(notifiers: &[&dyn Notifier], report: &RecycleReport) {
    for notifier in notifiers {
        match notifier.notify(report).await {
            Ok(()) => info!(run_id = %report.run_id, "Report delivered"),
            Err(e) => warn!(run_id = %report.run_id, error = %e, "Failed to deliver report"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_advances_timer() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(30)).await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
