//! Task recycler.
//!
//! Drives one run end to end:
//!
//! ```text
//! read snapshot -> inspect scaling -> inflate -> for each original task:
//!     stop -> wait for replacement -> wait for stable -> pause
//! -> restore -> report
//! ```
//!
//! Task N+1 is never stopped before task N is STABLE or FAILED, and only
//! task IDs captured in the snapshot are ever stopped.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use recycle_id::{RunId, TaskId};
use tracing::{error, info, instrument, warn};

use crate::capacity::{CapacityController, RestoreOutcome};
use crate::error::{RecycleError, RecycleResult};
use crate::model::{RecycleConfig, RecycleRun, TaskOutcome};
use crate::plane::{ControlPlane, ScalingRegistry, Sleeper};
use crate::report::{RecycleReport, RecycleReportBuilder};
use crate::scaling::ScalingInspector;
use crate::snapshot::ServiceStateReader;
use crate::stability::StabilityWaiter;

/// Reason attached to every stop request.
pub const STOP_REASON: &str = "Task recycling process";

/// Run one recycle against the given collaborators.
pub async fn recycle(
    config: RecycleConfig,
    plane: Arc<dyn ControlPlane>,
    registry: Arc<dyn ScalingRegistry>,
    sleeper: Arc<dyn Sleeper>,
) -> RecycleReport {
    TaskRecycler::new(config, plane, registry, sleeper).run().await
}

/// Orchestrates a recycle run.
pub struct TaskRecycler {
    config: RecycleConfig,
    plane: Arc<dyn ControlPlane>,
    registry: Arc<dyn ScalingRegistry>,
    sleeper: Arc<dyn Sleeper>,
}

impl TaskRecycler {
    pub fn new(
        config: RecycleConfig,
        plane: Arc<dyn ControlPlane>,
        registry: Arc<dyn ScalingRegistry>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config,
            plane,
            registry,
            sleeper,
        }
    }

    /// Execute the run. Always returns a terminal report.
    #[instrument(
        skip(self),
        fields(
            cluster = %self.config.cluster_name,
            service = %self.config.service_name,
            run_id = tracing::field::Empty,
        )
    )]
    pub async fn run(&self) -> RecycleReport {
        let run_id = RunId::new();
        let started_at = Utc::now();
        tracing::Span::current().record("run_id", tracing::field::display(&run_id));

        info!(
            maintain_service_state = self.config.maintain_service_state,
            wait_time_secs = self.config.wait_time_secs,
            "Starting task recycle"
        );

        let cluster = &self.config.cluster_name;
        let service = &self.config.service_name;

        let snapshot = match self.config.validate() {
            Ok(()) => {
                ServiceStateReader::new(Arc::clone(&self.plane))
                    .read_snapshot(cluster, service)
                    .await
            }
            Err(e) => Err(e),
        };
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Precondition failed, nothing changed");
                return RecycleReportBuilder::precondition_failed(
                    run_id,
                    &self.config,
                    &e,
                    started_at,
                    Utc::now(),
                );
            }
        };

        self.check_execution_budget(snapshot.task_count());

        let target = ScalingInspector::new(Arc::clone(&self.registry))
            .inspect(cluster, service)
            .await;
        let decision =
            ScalingInspector::plan_inflation(snapshot.original_desired_count, target.as_ref());

        let waiter = StabilityWaiter::new(
            Arc::clone(&self.plane),
            Arc::clone(&self.sleeper),
            self.config.stability,
        );
        let mut capacity = CapacityController::new(Arc::clone(&self.plane), waiter.clone());
        let mut run = RecycleRun::new(run_id, self.config.clone(), snapshot, target, started_at);

        let fatal = match capacity
            .inflate(&run.snapshot, decision, self.config.maintain_service_state)
            .await
        {
            Ok(()) => self.recycle_tasks(&mut run, &waiter).await.err(),
            Err(e) => Some(e),
        };
        if let Some(e) = &fatal {
            error!(error = %e, "Recycling aborted, restoring capacity");
        }
        run.inflation = capacity.inflation().clone();

        run.restoration = capacity.restore(&run.snapshot).await;
        if run.restoration == RestoreOutcome::Restored {
            let settled = waiter.wait_for_stable(cluster, service).await;
            if let Err(e) = &settled {
                warn!(error = %e, "Service did not settle after restoring capacity");
            }
            run.settled_after_restore = Some(settled.is_ok());
        }

        if let Err(e) = run.finalize(fatal.as_ref(), Utc::now()) {
            error!(error = %e, "Run finalized twice");
        }

        let report = RecycleReportBuilder::from_run(&run, fatal.as_ref());
        info!(
            overall_status = %report.overall_status,
            stable = report.counts.stable,
            failed = report.counts.failed,
            not_attempted = report.counts.not_attempted,
            requires_manual_intervention = report.requires_manual_intervention,
            elapsed_seconds = report.elapsed_seconds,
            "Task recycle finished"
        );
        report
    }

    /// Walk the original task list. Returns the error that aborted the loop.
    async fn recycle_tasks(
        &self,
        run: &mut RecycleRun,
        waiter: &StabilityWaiter,
    ) -> RecycleResult<()> {
        let cluster = &run.snapshot.cluster_name;
        let service = &run.snapshot.service_name;
        let originals: HashSet<TaskId> = run.snapshot.original_task_ids.iter().cloned().collect();
        let mut claimed: HashSet<TaskId> = HashSet::new();
        let total = run.snapshot.task_count();
        let wait_time = self.config.wait_time();

        for (index, task_id) in run.snapshot.original_task_ids.iter().enumerate() {
            info!(task_id = %task_id, position = index + 1, total, "Recycling task");
            run.outcomes.push(TaskOutcome::new(task_id.clone()));
            let outcome = &mut run.outcomes[index];

            // Anything already running before the stop cannot be its replacement.
            let before_stop = match self.plane.list_tasks(cluster, service).await {
                Ok(ids) => ids,
                Err(e) => {
                    let err = RecycleError::from(e);
                    outcome.mark_failed(err.to_string())?;
                    return Err(err);
                }
            };

            if let Err(source) = self.plane.stop_task(cluster, task_id, STOP_REASON).await {
                let err = RecycleError::TaskStop {
                    task_id: task_id.clone(),
                    source,
                };
                warn!(task_id = %task_id, error = %err, "Skipping task");
                outcome.mark_failed(err.to_string())?;
                continue;
            }
            outcome.mark_stopped(Utc::now())?;

            let mut exclude: HashSet<TaskId> = before_stop.into_iter().collect();
            exclude.extend(originals.iter().cloned());
            exclude.extend(claimed.iter().cloned());

            let replacement = match waiter
                .wait_for_replacement(cluster, service, task_id, &exclude)
                .await
            {
                Ok(replacement) => replacement,
                Err(e) => {
                    outcome.mark_failed(e.to_string())?;
                    return Err(e);
                }
            };
            claimed.insert(replacement.clone());
            outcome.mark_replaced(replacement)?;

            if let Err(e) = waiter.wait_for_stable(cluster, service).await {
                outcome.mark_failed(e.to_string())?;
                return Err(e);
            }
            outcome.mark_stable(Utc::now())?;

            if !wait_time.is_zero() {
                info!(task_id = %task_id, wait_time_secs = wait_time.as_secs(), "Pausing before next task");
                self.sleeper.sleep(wait_time).await;
            }
        }

        Ok(())
    }

    fn check_execution_budget(&self, task_count: usize) {
        let Some(ceiling) = self.config.execution_ceiling_secs else {
            return;
        };

        let worst_case = self.config.worst_case_duration(task_count);
        if worst_case.as_secs() > ceiling {
            warn!(
                task_count,
                worst_case_secs = worst_case.as_secs(),
                execution_ceiling_secs = ceiling,
                "Worst-case run exceeds the execution ceiling; capacity may be left inflated if the host stops the run"
            );
        }
    }
}
