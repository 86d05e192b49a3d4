//! Service state reader.
//!
//! Captures the [`ServiceSnapshot`] a run iterates over and restores to.
//! Desired count and task listing come from two separate calls, so the
//! reader brackets the listing with two describes and only accepts the pair
//! when both describes agree.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use recycle_id::{ClusterName, ServiceName, TaskId};
use tracing::{debug, info, instrument};

use crate::error::{ControlPlaneError, RecycleError, RecycleResult};
use crate::model::{ServiceSnapshot, ServiceState, ServiceStatus};
use crate::plane::ControlPlane;

/// Number of describe/list/describe passes before giving up on a consistent read.
pub const CONSISTENCY_READS: u32 = 3;

/// Reads a consistent snapshot of a service.
pub struct ServiceStateReader {
    plane: Arc<dyn ControlPlane>,
}

impl ServiceStateReader {
    pub fn new(plane: Arc<dyn ControlPlane>) -> Self {
        Self { plane }
    }

    /// Read the snapshot. No side effects.
    #[instrument(skip(self), fields(cluster = %cluster, service = %service))]
    pub async fn read_snapshot(
        &self,
        cluster: &ClusterName,
        service: &ServiceName,
    ) -> RecycleResult<ServiceSnapshot> {
        for pass in 1..=CONSISTENCY_READS {
            let before = self.describe(cluster, service).await?;
            let task_ids = self
                .plane
                .list_tasks(cluster, service)
                .await
                .map_err(|e| not_found_as_missing(e, cluster, service))?;
            let after = self.describe(cluster, service).await?;

            if before.desired_count != after.desired_count
                || before.running_count != after.running_count
            {
                debug!(
                    pass,
                    before = %before.summary(),
                    after = %after.summary(),
                    "Service changed while reading, re-reading"
                );
                continue;
            }

            let snapshot = Self::validate(cluster, service, &after, task_ids)?;
            info!(
                desired_count = snapshot.original_desired_count,
                task_count = snapshot.task_count(),
                "Captured service snapshot"
            );
            return Ok(snapshot);
        }

        Err(RecycleError::ServiceUnstable {
            service: service.clone(),
            detail: format!(
                "desired or running count kept changing across {} reads",
                CONSISTENCY_READS
            ),
        })
    }

    async fn describe(
        &self,
        cluster: &ClusterName,
        service: &ServiceName,
    ) -> RecycleResult<ServiceState> {
        let state = self
            .plane
            .describe_service(cluster, service)
            .await
            .map_err(|e| not_found_as_missing(e, cluster, service))?;

        if state.status == ServiceStatus::Inactive {
            return Err(RecycleError::ServiceNotFound {
                cluster: cluster.clone(),
                service: service.clone(),
            });
        }

        Ok(state)
    }

    fn validate(
        cluster: &ClusterName,
        service: &ServiceName,
        state: &ServiceState,
        task_ids: Vec<TaskId>,
    ) -> RecycleResult<ServiceSnapshot> {
        let unstable = |detail: String| RecycleError::ServiceUnstable {
            service: service.clone(),
            detail,
        };

        if state.status == ServiceStatus::Draining {
            return Err(unstable("service is draining".to_string()));
        }

        if !state.is_steady() {
            return Err(unstable(format!(
                "deployment in progress ({})",
                state.summary()
            )));
        }

        let original_task_ids = dedup_preserving_order(task_ids);
        if original_task_ids.len() != state.desired_count as usize {
            return Err(unstable(format!(
                "{} tasks listed but desired count is {}",
                original_task_ids.len(),
                state.desired_count
            )));
        }

        Ok(ServiceSnapshot {
            cluster_name: cluster.clone(),
            service_name: service.clone(),
            original_desired_count: state.desired_count,
            original_task_ids,
            taken_at: Utc::now(),
        })
    }
}

fn not_found_as_missing(
    err: ControlPlaneError,
    cluster: &ClusterName,
    service: &ServiceName,
) -> RecycleError {
    if err.is_not_found() {
        RecycleError::ServiceNotFound {
            cluster: cluster.clone(),
            service: service.clone(),
        }
    } else {
        RecycleError::ControlPlane(err)
    }
}

fn dedup_preserving_order(ids: Vec<TaskId>) -> Vec<TaskId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_preserving_order() {
        let ids: Vec<TaskId> = ["t2", "t1", "t2", "t3"]
            .iter()
            .map(|s| TaskId::parse(s).unwrap())
            .collect();
        let deduped = dedup_preserving_order(ids);
        let names: Vec<&str> = deduped.iter().map(|t| t.as_str()).collect();
        assert_eq!(names, vec!["t2", "t1", "t3"]);
    }
}
