//! Recycle report.
//!
//! Pure aggregation of a finished run into the structure handed to
//! notifiers and printed by the CLI.

use chrono::{DateTime, Utc};
use recycle_id::{ClusterName, RunId, ServiceName, TaskId};
use serde::{Deserialize, Serialize};

use crate::capacity::{InflationState, RestoreOutcome};
use crate::error::{RecycleError, Severity};
use crate::model::{RecycleConfig, RecycleRun, RunStatus, TaskOutcome, TaskStatus};

/// Task counts by terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub stable: usize,
    pub failed: usize,
    pub not_attempted: usize,
}

/// The most severe error of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalError {
    pub severity: Severity,
    pub message: String,
}

/// Immutable summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecycleReport {
    pub run_id: RunId,
    pub cluster_name: ClusterName,
    pub service_name: ServiceName,
    pub overall_status: RunStatus,
    pub maintain_service_state: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_desired_count: Option<u32>,
    pub counts: TaskCounts,
    pub tasks: Vec<TaskOutcome>,
    pub not_attempted: Vec<TaskId>,
    pub inflation: InflationState,
    pub capacity: RestoreOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_after_restore: Option<bool>,
    pub requires_manual_intervention: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<FatalError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
}

impl RecycleReport {
    pub fn succeeded(&self) -> bool {
        self.overall_status == RunStatus::Succeeded
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Builds [`RecycleReport`]s.
pub struct RecycleReportBuilder;

impl RecycleReportBuilder {
    /// Summarize a finalized run.
    ///
    /// `fatal` is the error that ended the loop early, if any. A failed
    /// capacity restore outranks it and is reported as critical.
    pub fn from_run(run: &RecycleRun, fatal: Option<&RecycleError>) -> RecycleReport {
        let not_attempted = run.not_attempted().to_vec();
        let counts = TaskCounts {
            total: run.snapshot.task_count(),
            stable: count(&run.outcomes, TaskStatus::Stable),
            failed: count(&run.outcomes, TaskStatus::Failed),
            not_attempted: not_attempted.len(),
        };
        let finished_at = run.finished_at.unwrap_or_else(Utc::now);

        RecycleReport {
            run_id: run.run_id,
            cluster_name: run.snapshot.cluster_name.clone(),
            service_name: run.snapshot.service_name.clone(),
            overall_status: run.overall_status,
            maintain_service_state: run.config.maintain_service_state,
            original_desired_count: Some(run.snapshot.original_desired_count),
            counts,
            tasks: run.outcomes.clone(),
            not_attempted,
            inflation: run.inflation.clone(),
            capacity: run.restoration.clone(),
            settled_after_restore: run.settled_after_restore,
            requires_manual_intervention: matches!(run.restoration, RestoreOutcome::Failed { .. }),
            fatal_error: worst_error(&run.restoration, fatal),
            started_at: run.started_at,
            finished_at,
            elapsed_seconds: elapsed_seconds(run.started_at, finished_at),
        }
    }

    /// Summarize a run that stopped before taking a snapshot.
    pub fn precondition_failed(
        run_id: RunId,
        config: &RecycleConfig,
        err: &RecycleError,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> RecycleReport {
        RecycleReport {
            run_id,
            cluster_name: config.cluster_name.clone(),
            service_name: config.service_name.clone(),
            overall_status: RunStatus::Failed,
            maintain_service_state: config.maintain_service_state,
            original_desired_count: None,
            counts: TaskCounts::default(),
            tasks: Vec::new(),
            not_attempted: Vec::new(),
            inflation: InflationState::NotRequested,
            capacity: RestoreOutcome::NotNeeded,
            settled_after_restore: None,
            requires_manual_intervention: false,
            fatal_error: Some(fatal_error(err)),
            started_at,
            finished_at,
            elapsed_seconds: elapsed_seconds(started_at, finished_at),
        }
    }
}

fn count(outcomes: &[TaskOutcome], status: TaskStatus) -> usize {
    outcomes.iter().filter(|o| o.status == status).count()
}

fn fatal_error(err: &RecycleError) -> FatalError {
    FatalError {
        severity: err.severity(),
        message: err.to_string(),
    }
}

fn worst_error(restoration: &RestoreOutcome, fatal: Option<&RecycleError>) -> Option<FatalError> {
    let RestoreOutcome::Failed { error, .. } = restoration else {
        return fatal.map(fatal_error);
    };
    let message = match fatal {
        Some(err) => format!("{}; run had already aborted: {}", error, err),
        None => error.clone(),
    };
    Some(FatalError {
        severity: Severity::Critical,
        message,
    })
}

fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 1000.0
}
