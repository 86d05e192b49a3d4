//! Stability waiter.
//!
//! Bounded, cooperative polling: at most `max_attempts` probes with a fixed
//! sleep between them and none after the last, so a wait never exceeds
//! `max_attempts × poll_interval`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use recycle_id::{ClusterName, ServiceName, TaskId};
use tracing::{debug, info, warn};

use crate::error::{RecycleError, RecycleResult};
use crate::model::{ConvergenceStatus, StabilityPolicy, TaskLastStatus};
use crate::plane::{ControlPlane, Sleeper};

/// Polls the control plane until a condition holds or the budget runs out.
#[derive(Clone)]
pub struct StabilityWaiter {
    plane: Arc<dyn ControlPlane>,
    sleeper: Arc<dyn Sleeper>,
    policy: StabilityPolicy,
}

impl StabilityWaiter {
    pub fn new(
        plane: Arc<dyn ControlPlane>,
        sleeper: Arc<dyn Sleeper>,
        policy: StabilityPolicy,
    ) -> Self {
        Self {
            plane,
            sleeper,
            policy,
        }
    }

    pub fn policy(&self) -> &StabilityPolicy {
        &self.policy
    }

    /// Wait until the service reports a steady state.
    ///
    /// Returns the number of polls it took.
    pub async fn wait_for_stable(
        &self,
        cluster: &ClusterName,
        service: &ServiceName,
    ) -> RecycleResult<u32> {
        let mut waited = Duration::ZERO;

        for attempt in 1..=self.policy.max_attempts {
            let state = self.plane.describe_service(cluster, service).await?;

            match state.convergence() {
                ConvergenceStatus::Converged => {
                    info!(
                        service = %service,
                        attempt,
                        desired_count = state.desired_count,
                        "Service is stable"
                    );
                    return Ok(attempt);
                }
                ConvergenceStatus::Diverged => {
                    warn!(
                        service = %service,
                        attempt,
                        state = %state.summary(),
                        "Service rollout failed, still waiting"
                    );
                }
                ConvergenceStatus::Converging => {
                    debug!(
                        service = %service,
                        attempt,
                        state = %state.summary(),
                        "Service not stable yet"
                    );
                }
            }

            waited = waited.saturating_add(self.pause(attempt).await);
        }

        Err(RecycleError::StabilityTimeout {
            service: service.clone(),
            attempts: self.policy.max_attempts,
            waited,
        })
    }

    /// Wait until a task not in `exclude` is RUNNING.
    ///
    /// Candidates are checked in listing order; the first running one wins.
    pub async fn wait_for_replacement(
        &self,
        cluster: &ClusterName,
        service: &ServiceName,
        stopped: &TaskId,
        exclude: &HashSet<TaskId>,
    ) -> RecycleResult<TaskId> {
        let mut waited = Duration::ZERO;

        for attempt in 1..=self.policy.max_attempts {
            let candidates: Vec<TaskId> = self
                .plane
                .list_tasks(cluster, service)
                .await?
                .into_iter()
                .filter(|id| !exclude.contains(id))
                .collect();

            if !candidates.is_empty() {
                let described = self.plane.describe_tasks(cluster, &candidates).await?;
                let running = candidates.iter().find(|id| {
                    described
                        .iter()
                        .any(|d| &d.task_id == *id && d.last_status == TaskLastStatus::Running)
                });

                if let Some(replacement) = running {
                    info!(
                        task_id = %stopped,
                        replacement_task_id = %replacement,
                        attempt,
                        "Replacement task running"
                    );
                    return Ok(replacement.clone());
                }
            }

            debug!(
                task_id = %stopped,
                attempt,
                candidates = candidates.len(),
                "No running replacement yet"
            );
            waited = waited.saturating_add(self.pause(attempt).await);
        }

        Err(RecycleError::ReplacementTimeout {
            task_id: stopped.clone(),
            attempts: self.policy.max_attempts,
            waited,
        })
    }

    /// Sleep between polls, never after the last one.
    async fn pause(&self, attempt: u32) -> Duration {
        if attempt >= self.policy.max_attempts {
            return Duration::ZERO;
        }
        let interval = self.policy.poll_interval();
        self.sleeper.sleep(interval).await;
        interval
    }
}
