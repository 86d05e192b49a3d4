//! Data model for a recycle run.
//!
//! - [`RecycleConfig`]: operator input, immutable for the run
//! - [`ServiceState`] / [`TaskDescription`]: what the control plane reports
//! - [`ServiceSnapshot`]: the baseline captured once at run start
//! - [`TaskOutcome`]: per-task progress, forward-only
//! - [`RecycleRun`]: the aggregate, finalized exactly once

use std::time::Duration;

use chrono::{DateTime, Utc};
use recycle_id::{ClusterName, RunId, ServiceName, TaskId};
use serde::{Deserialize, Serialize};

use crate::capacity::{InflationState, RestoreOutcome};
use crate::error::{RecycleError, RecycleResult};
use crate::{DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_WAIT_TIME_SECS};

// =============================================================================
// Configuration
// =============================================================================

/// Polling budget for stability and replacement waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityPolicy {
    /// Maximum number of polls before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between polls, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl StabilityPolicy {
    /// Delay between polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Upper bound on the time a single wait can take.
    pub fn budget(&self) -> Duration {
        self.poll_interval().saturating_mul(self.max_attempts)
    }
}

/// Input parameters for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecycleConfig {
    pub cluster_name: ClusterName,
    pub service_name: ServiceName,

    /// Raise desired count by one while recycling.
    #[serde(default = "default_true")]
    pub maintain_service_state: bool,

    /// Pause after each replaced task, in seconds.
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: u64,

    #[serde(default)]
    pub stability: StabilityPolicy,

    /// Wall-clock ceiling imposed by the host, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_ceiling_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_wait_time_secs() -> u64 {
    DEFAULT_WAIT_TIME_SECS
}

impl RecycleConfig {
    /// Create a config with default settings.
    pub fn new(cluster_name: ClusterName, service_name: ServiceName) -> Self {
        Self {
            cluster_name,
            service_name,
            maintain_service_state: true,
            wait_time_secs: DEFAULT_WAIT_TIME_SECS,
            stability: StabilityPolicy::default(),
            execution_ceiling_secs: None,
        }
    }

    pub fn with_maintain_service_state(mut self, maintain: bool) -> Self {
        self.maintain_service_state = maintain;
        self
    }

    pub fn with_wait_time_secs(mut self, secs: u64) -> Self {
        self.wait_time_secs = secs;
        self
    }

    pub fn with_stability(mut self, stability: StabilityPolicy) -> Self {
        self.stability = stability;
        self
    }

    pub fn with_execution_ceiling_secs(mut self, secs: Option<u64>) -> Self {
        self.execution_ceiling_secs = secs;
        self
    }

    /// Pause between tasks.
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs)
    }

    /// Check settings that types alone cannot enforce.
    pub fn validate(&self) -> RecycleResult<()> {
        if self.stability.max_attempts == 0 {
            return Err(RecycleError::InvalidConfig(
                "stability max_attempts must be at least 1".to_string(),
            ));
        }
        if self.execution_ceiling_secs == Some(0) {
            return Err(RecycleError::InvalidConfig(
                "execution ceiling must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Worst-case duration of a run over `task_count` tasks.
    ///
    /// Every task costs a replacement wait, a stability wait and the pause;
    /// inflation and the post-restore settle add one wait each.
    pub fn worst_case_duration(&self, task_count: usize) -> Duration {
        let tasks = u32::try_from(task_count).unwrap_or(u32::MAX);
        let waits = tasks.saturating_mul(2).saturating_add(2);
        self.stability
            .budget()
            .saturating_mul(waits)
            .saturating_add(self.wait_time().saturating_mul(tasks))
    }
}

// =============================================================================
// Control plane view
// =============================================================================

/// Lifecycle status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Active,
    Draining,
    Inactive,
}

/// Role of a deployment within a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Primary,
    Active,
    Inactive,
}

/// Progress of a deployment rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RolloutState {
    Completed,
    InProgress,
    Failed,
}

/// One deployment of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub id: String,
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_state: Option<RolloutState>,
}

/// Service state as reported by `describe_service`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub status: ServiceStatus,
    pub desired_count: u32,
    pub running_count: u32,
    #[serde(default)]
    pub pending_count: u32,
    #[serde(default)]
    pub deployments: Vec<DeploymentState>,
}

/// Convergence status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    /// Running matches desired and no rollout is in flight.
    Converged,

    /// Tasks are starting or stopping, or a rollout is in progress.
    Converging,

    /// The current rollout failed; the service needs intervention.
    Diverged,
}

impl ConvergenceStatus {
    /// Returns true if the service has converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

impl ServiceState {
    /// Classify the service.
    pub fn convergence(&self) -> ConvergenceStatus {
        let live: Vec<&DeploymentState> = self
            .deployments
            .iter()
            .filter(|d| d.status != DeploymentStatus::Inactive)
            .collect();

        let primary_failed = live.iter().any(|d| {
            d.status == DeploymentStatus::Primary && d.rollout_state == Some(RolloutState::Failed)
        });
        if primary_failed {
            return ConvergenceStatus::Diverged;
        }

        let single_settled_primary = matches!(
            live.as_slice(),
            [d] if d.status == DeploymentStatus::Primary
                && matches!(d.rollout_state, None | Some(RolloutState::Completed))
        );

        if single_settled_primary
            && self.running_count == self.desired_count
            && self.pending_count == 0
        {
            ConvergenceStatus::Converged
        } else {
            ConvergenceStatus::Converging
        }
    }

    /// Returns true if the service is in a steady state.
    pub fn is_steady(&self) -> bool {
        self.convergence().is_converged()
    }

    /// Short description used in logs and errors.
    pub fn summary(&self) -> String {
        format!(
            "desired={} running={} pending={} deployments={}",
            self.desired_count,
            self.running_count,
            self.pending_count,
            self.deployments.len()
        )
    }
}

/// Last reported status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskLastStatus {
    Provisioning,
    Pending,
    Activating,
    Running,
    Deactivating,
    Stopping,
    Deprovisioning,
    Stopped,
    #[serde(other)]
    Unknown,
}

/// Task as reported by `describe_tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub task_id: TaskId,
    pub last_status: TaskLastStatus,
}

/// Autoscaling registration for a service's desired count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalableTargetInfo {
    pub resource_id: String,
    pub min_capacity: u32,
    pub max_capacity: u32,
}

// =============================================================================
// Snapshot
// =============================================================================

/// Baseline captured once at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub cluster_name: ClusterName,
    pub service_name: ServiceName,
    pub original_desired_count: u32,
    /// In listing order, without duplicates.
    pub original_task_ids: Vec<TaskId>,
    pub taken_at: DateTime<Utc>,
}

impl ServiceSnapshot {
    pub fn task_count(&self) -> usize {
        self.original_task_ids.len()
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.original_task_ids.contains(task_id)
    }
}

// =============================================================================
// Task outcomes
// =============================================================================

/// Progress of a single original task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Stopped,
    Replaced,
    Stable,
    Failed,
}

impl TaskStatus {
    /// Returns true for STABLE and FAILED.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stable | Self::Failed)
    }

    /// Success path is strictly sequential; any live state may fail.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Stopped)
            | (Self::Stopped, Self::Replaced)
            | (Self::Replaced, Self::Stable) => true,
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Stopped => "STOPPED",
            Self::Replaced => "REPLACED",
            Self::Stable => "STABLE",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Outcome record for one original task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stabilized_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskOutcome {
    /// Record a task entering recycling.
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            stopped_at: None,
            replacement_task_id: None,
            stabilized_at: None,
            error: None,
        }
    }

    fn advance(&mut self, next: TaskStatus) -> RecycleResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(RecycleError::InvalidTransition {
                subject: self.task_id.to_string(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_stopped(&mut self, at: DateTime<Utc>) -> RecycleResult<()> {
        self.advance(TaskStatus::Stopped)?;
        self.stopped_at = Some(at);
        Ok(())
    }

    pub fn mark_replaced(&mut self, replacement: TaskId) -> RecycleResult<()> {
        self.advance(TaskStatus::Replaced)?;
        self.replacement_task_id = Some(replacement);
        Ok(())
    }

    pub fn mark_stable(&mut self, at: DateTime<Utc>) -> RecycleResult<()> {
        self.advance(TaskStatus::Stable)?;
        self.stabilized_at = Some(at);
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> RecycleResult<()> {
        self.advance(TaskStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

// =============================================================================
// Run aggregate
// =============================================================================

/// Terminal or in-flight status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    InProgress,
    Succeeded,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// The run aggregate.
///
/// Only the recycler loop and the capacity controller mutate it.
#[derive(Debug, Clone)]
pub struct RecycleRun {
    pub run_id: RunId,
    pub config: RecycleConfig,
    pub snapshot: ServiceSnapshot,
    pub scalable_target: Option<ScalableTargetInfo>,
    pub outcomes: Vec<TaskOutcome>,
    pub inflation: InflationState,
    pub restoration: RestoreOutcome,
    pub settled_after_restore: Option<bool>,
    pub fatal_error: Option<String>,
    pub overall_status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RecycleRun {
    pub fn new(
        run_id: RunId,
        config: RecycleConfig,
        snapshot: ServiceSnapshot,
        scalable_target: Option<ScalableTargetInfo>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            config,
            snapshot,
            scalable_target,
            outcomes: Vec::new(),
            inflation: InflationState::NotRequested,
            restoration: RestoreOutcome::NotNeeded,
            settled_after_restore: None,
            fatal_error: None,
            overall_status: RunStatus::InProgress,
            started_at,
            finished_at: None,
        }
    }

    /// True when the restore update succeeded.
    pub fn capacity_restored(&self) -> bool {
        matches!(self.restoration, RestoreOutcome::Restored)
    }

    /// Original tasks that never entered recycling.
    pub fn not_attempted(&self) -> &[TaskId] {
        let started = self.outcomes.len().min(self.snapshot.original_task_ids.len());
        &self.snapshot.original_task_ids[started..]
    }

    /// Set the terminal status. May only be called once.
    pub fn finalize(&mut self, fatal: Option<&RecycleError>, at: DateTime<Utc>) -> RecycleResult<()> {
        if self.overall_status != RunStatus::InProgress {
            return Err(RecycleError::InvalidTransition {
                subject: self.run_id.to_string(),
                from: self.overall_status.to_string(),
                to: "finalized".to_string(),
            });
        }

        self.fatal_error = fatal.map(ToString::to_string);

        let all_stable = self
            .outcomes
            .iter()
            .all(|o| o.status == TaskStatus::Stable);
        let restore_ok = !matches!(self.restoration, RestoreOutcome::Failed { .. });
        let inflate_ok = !matches!(self.inflation, InflationState::Failed { .. });

        self.overall_status = if fatal.is_none()
            && all_stable
            && self.not_attempted().is_empty()
            && restore_ok
            && inflate_ok
        {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        self.finished_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str) -> TaskId {
        TaskId::parse(id).unwrap()
    }

    fn snapshot(ids: &[&str]) -> ServiceSnapshot {
        ServiceSnapshot {
            cluster_name: ClusterName::parse("prod").unwrap(),
            service_name: ServiceName::parse("web").unwrap(),
            original_desired_count: ids.len() as u32,
            original_task_ids: ids.iter().map(|id| task(id)).collect(),
            taken_at: Utc::now(),
        }
    }

    fn run(ids: &[&str]) -> RecycleRun {
        let snapshot = snapshot(ids);
        let config = RecycleConfig::new(snapshot.cluster_name.clone(), snapshot.service_name.clone());
        RecycleRun::new(RunId::new(), config, snapshot, None, Utc::now())
    }

    fn steady(desired: u32) -> ServiceState {
        ServiceState {
            status: ServiceStatus::Active,
            desired_count: desired,
            running_count: desired,
            pending_count: 0,
            deployments: vec![DeploymentState {
                id: "ecs-svc/1".to_string(),
                status: DeploymentStatus::Primary,
                rollout_state: Some(RolloutState::Completed),
            }],
        }
    }

    #[test]
    fn test_convergence_steady() {
        assert_eq!(steady(3).convergence(), ConvergenceStatus::Converged);
    }

    #[test]
    fn test_convergence_pending_tasks() {
        let mut state = steady(3);
        state.pending_count = 1;
        assert_eq!(state.convergence(), ConvergenceStatus::Converging);

        let mut state = steady(3);
        state.running_count = 2;
        assert!(!state.is_steady());
    }

    #[test]
    fn test_convergence_rollout_in_progress() {
        let mut state = steady(2);
        state.deployments.push(DeploymentState {
            id: "ecs-svc/2".to_string(),
            status: DeploymentStatus::Active,
            rollout_state: None,
        });
        assert_eq!(state.convergence(), ConvergenceStatus::Converging);

        let mut state = steady(2);
        state.deployments[0].rollout_state = Some(RolloutState::InProgress);
        assert_eq!(state.convergence(), ConvergenceStatus::Converging);
    }

    #[test]
    fn test_convergence_inactive_deployments_ignored() {
        let mut state = steady(2);
        state.deployments.push(DeploymentState {
            id: "ecs-svc/0".to_string(),
            status: DeploymentStatus::Inactive,
            rollout_state: Some(RolloutState::Completed),
        });
        assert!(state.is_steady());
    }

    #[test]
    fn test_convergence_failed_rollout() {
        let mut state = steady(2);
        state.deployments[0].rollout_state = Some(RolloutState::Failed);
        assert_eq!(state.convergence(), ConvergenceStatus::Diverged);
    }

    #[test]
    fn test_task_outcome_success_path() {
        let mut outcome = TaskOutcome::new(task("t1"));
        outcome.mark_stopped(Utc::now()).unwrap();
        outcome.mark_replaced(task("t9")).unwrap();
        outcome.mark_stable(Utc::now()).unwrap();
        assert_eq!(outcome.status, TaskStatus::Stable);
        assert_eq!(outcome.replacement_task_id, Some(task("t9")));
    }

    #[test]
    fn test_task_outcome_rejects_backward_and_skipped_transitions() {
        let mut outcome = TaskOutcome::new(task("t1"));
        assert!(outcome.mark_replaced(task("t9")).is_err());
        assert!(outcome.mark_stable(Utc::now()).is_err());

        outcome.mark_stopped(Utc::now()).unwrap();
        assert!(outcome.mark_stopped(Utc::now()).is_err());
    }

    #[test]
    fn test_task_outcome_failed_is_terminal() {
        let mut outcome = TaskOutcome::new(task("t1"));
        outcome.mark_stopped(Utc::now()).unwrap();
        outcome.mark_failed("timed out").unwrap();
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert!(outcome.mark_failed("again").is_err());
        assert!(outcome.mark_replaced(task("t9")).is_err());
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: RecycleConfig =
            serde_json::from_str(r#"{"cluster_name":"prod","service_name":"web"}"#).unwrap();
        assert!(config.maintain_service_state);
        assert_eq!(config.wait_time(), Duration::from_secs(30));
        assert_eq!(config.stability.max_attempts, 40);
        assert_eq!(config.stability.poll_interval(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_attempts() {
        let config = RecycleConfig::new(
            ClusterName::parse("prod").unwrap(),
            ServiceName::parse("web").unwrap(),
        )
        .with_stability(StabilityPolicy {
            max_attempts: 0,
            poll_interval_secs: 15,
        });
        assert!(matches!(
            config.validate(),
            Err(RecycleError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_worst_case_duration() {
        let config = RecycleConfig::new(
            ClusterName::parse("prod").unwrap(),
            ServiceName::parse("web").unwrap(),
        )
        .with_stability(StabilityPolicy {
            max_attempts: 4,
            poll_interval_secs: 10,
        })
        .with_wait_time_secs(30);
        // 3 tasks: 8 waits of 40s plus 3 pauses of 30s
        assert_eq!(config.worst_case_duration(3), Duration::from_secs(410));
    }

    #[test]
    fn test_worst_case_duration_saturates() {
        let config = RecycleConfig::new(
            ClusterName::parse("prod").unwrap(),
            ServiceName::parse("web").unwrap(),
        )
        .with_stability(StabilityPolicy {
            max_attempts: u32::MAX,
            poll_interval_secs: u64::MAX / 4,
        })
        .with_wait_time_secs(u64::MAX / 2);

        assert_eq!(config.stability.budget(), Duration::MAX);
        assert_eq!(config.worst_case_duration(3), Duration::MAX);
        assert_eq!(config.worst_case_duration(usize::MAX), Duration::MAX);
    }

    #[test]
    fn test_finalize_only_once() {
        let mut run = run(&["t1"]);
        let mut outcome = TaskOutcome::new(task("t1"));
        outcome.mark_stopped(Utc::now()).unwrap();
        outcome.mark_replaced(task("t2")).unwrap();
        outcome.mark_stable(Utc::now()).unwrap();
        run.outcomes.push(outcome);

        run.finalize(None, Utc::now()).unwrap();
        assert_eq!(run.overall_status, RunStatus::Succeeded);
        assert!(run.finalize(None, Utc::now()).is_err());
    }

    #[test]
    fn test_finalize_fails_when_tasks_not_attempted() {
        let mut run = run(&["t1", "t2"]);
        let mut outcome = TaskOutcome::new(task("t1"));
        outcome.mark_failed("gone").unwrap();
        run.outcomes.push(outcome);

        assert_eq!(run.not_attempted(), &[task("t2")]);
        run.finalize(None, Utc::now()).unwrap();
        assert_eq!(run.overall_status, RunStatus::Failed);
    }
}
