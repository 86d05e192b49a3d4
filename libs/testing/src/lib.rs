//! # recycle-testing
//!
//! In-memory simulation of a container service for recycler tests.
//!
//! [`FakeCluster`] implements [`ControlPlane`] and [`ScalingRegistry`] over a
//! single service and a tiny scheduler: every `describe_service` or
//! `list_tasks` call advances the scheduler one step. A step promotes
//! pending tasks to RUNNING, then launches (as PENDING) or removes tasks
//! until the live count matches desired. A stopped task is therefore
//! replaced two polls later and the service is steady again right after.
//!
//! Every call is recorded in a journal, including sleeps taken through
//! [`FakeCluster::sleeper`], so tests can assert on the exact order of
//! mutations and pauses without sleeping in real time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use recycle_core::{
    ControlPlane, ControlPlaneError, DeploymentState, DeploymentStatus, Notifier, NotifyError,
    PlaneResult, RecycleConfig, RecycleReport, RolloutState, ScalableTargetInfo, ScalingRegistry,
    ServiceState, ServiceStatus, Sleeper, StabilityPolicy, TaskDescription, TaskLastStatus,
    TaskRecycler,
};
use recycle_id::{scalable_resource_id, ClusterName, ServiceName, TaskId};
use tracing::debug;

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DescribeService { stable: bool },
    ListTasks,
    DescribeTasks(Vec<TaskId>),
    StopTask(TaskId),
    UpdateDesiredCount(u32),
    DescribeScalableTarget(String),
    Sleep(Duration),
}

/// Condensed view of the journal for sequence assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The service was observed steady (consecutive observations collapse).
    Stable,
    Stop(String),
    SetDesired(u32),
    Pause(u64),
}

#[derive(Debug, Clone)]
struct FakeTask {
    id: TaskId,
    status: TaskLastStatus,
}

#[derive(Debug)]
struct State {
    cluster: ClusterName,
    service: ServiceName,
    exists: bool,
    desired: u32,
    tasks: Vec<FakeTask>,
    stopped: Vec<TaskId>,
    successful_stops: usize,
    next_task: u32,
    journal: Vec<Call>,

    frozen: bool,
    rollout_stuck: bool,
    stop_failures: HashSet<TaskId>,
    update_failures: HashSet<u32>,
    freeze_after_stops: Option<usize>,
    stall_after_stops: Option<usize>,
    scale_out_after_stops: Option<usize>,
    scalable_target: Option<ScalableTargetInfo>,
    scaling_error: bool,
}

impl State {
    fn launch(&mut self, status: TaskLastStatus) -> TaskId {
        self.next_task += 1;
        let id = task_id(&format!("task-{}", self.next_task));
        self.tasks.push(FakeTask {
            id: id.clone(),
            status,
        });
        id
    }

    /// Advance the scheduler one step.
    fn tick(&mut self) {
        if self.frozen {
            return;
        }

        for task in &mut self.tasks {
            task.status = TaskLastStatus::Running;
        }

        let live = self.tasks.len() as u32;
        if live < self.desired {
            for _ in live..self.desired {
                let id = self.launch(TaskLastStatus::Pending);
                debug!(task_id = %id, "[FAKE] Launched task");
            }
        } else if live > self.desired {
            let excess = (live - self.desired) as usize;
            let keep = self.tasks.len() - excess;
            for task in self.tasks.drain(keep..) {
                debug!(task_id = %task.id, "[FAKE] Scaled in task");
                self.stopped.push(task.id);
            }
        }
    }

    fn counts(&self) -> (u32, u32) {
        let running = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskLastStatus::Running)
            .count() as u32;
        let pending = self.tasks.len() as u32 - running;
        (running, pending)
    }

    fn service_state(&self) -> ServiceState {
        let (running, pending) = self.counts();
        let rollout_state = if self.rollout_stuck {
            RolloutState::InProgress
        } else {
            RolloutState::Completed
        };
        ServiceState {
            status: ServiceStatus::Active,
            desired_count: self.desired,
            running_count: running,
            pending_count: pending,
            deployments: vec![DeploymentState {
                id: "ecs-svc/1".to_string(),
                status: DeploymentStatus::Primary,
                rollout_state: Some(rollout_state),
            }],
        }
    }

    fn missing(&self) -> ControlPlaneError {
        ControlPlaneError::NotFound(format!("service {}/{}", self.cluster, self.service))
    }
}

/// Simulated cluster hosting one service.
#[derive(Debug, Clone)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    /// A steady service `cluster/service` with `desired` running tasks
    /// named `task-1`, `task-2`, ...
    pub fn new(cluster: &str, service: &str, desired: u32) -> Self {
        let mut state = State {
            cluster: ClusterName::parse(cluster).expect("valid cluster name"),
            service: ServiceName::parse(service).expect("valid service name"),
            exists: true,
            desired,
            tasks: Vec::new(),
            stopped: Vec::new(),
            successful_stops: 0,
            next_task: 0,
            journal: Vec::new(),
            frozen: false,
            rollout_stuck: false,
            stop_failures: HashSet::new(),
            update_failures: HashSet::new(),
            freeze_after_stops: None,
            stall_after_stops: None,
            scale_out_after_stops: None,
            scalable_target: None,
            scaling_error: false,
        };
        for _ in 0..desired {
            state.launch(TaskLastStatus::Running);
        }
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake cluster state poisoned")
    }

    pub fn cluster_name(&self) -> ClusterName {
        self.lock().cluster.clone()
    }

    pub fn service_name(&self) -> ServiceName {
        self.lock().service.clone()
    }

    /// Config for this service with a small, fast poll budget.
    pub fn config(&self) -> RecycleConfig {
        RecycleConfig::new(self.cluster_name(), self.service_name()).with_stability(
            StabilityPolicy {
                max_attempts: 5,
                poll_interval_secs: 1,
            },
        )
    }

    /// Build a recycler wired to this cluster and its sleeper.
    pub fn recycler(&self, config: RecycleConfig) -> TaskRecycler {
        TaskRecycler::new(
            config,
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.sleeper()),
        )
    }

    /// A sleeper that records into this cluster's journal and returns at once.
    pub fn sleeper(&self) -> FakeSleeper {
        FakeSleeper {
            state: Arc::clone(&self.state),
        }
    }

    // -------------------------------------------------------------------------
    // Knobs
    // -------------------------------------------------------------------------

    /// Make the service (and cluster) unknown to the control plane.
    pub fn remove_service(&self) {
        self.lock().exists = false;
    }

    /// Stop requests for `task` fail with NotFound.
    pub fn fail_stop(&self, task: &str) {
        self.lock().stop_failures.insert(task_id(task));
    }

    /// Desired-count updates to `desired` fail with Conflict.
    pub fn fail_update_to(&self, desired: u32) {
        self.lock().update_failures.insert(desired);
    }

    /// The scheduler stops reacting after the `n`th successful stop.
    pub fn freeze_after_stops(&self, n: usize) {
        self.lock().freeze_after_stops = Some(n);
    }

    /// The deployment reports a rollout in progress from the `n`th stop on.
    pub fn stall_rollout_after_stops(&self, n: usize) {
        self.lock().stall_after_stops = Some(n);
    }

    /// Something outside the run raises desired count by one after the `n`th stop.
    pub fn scale_out_after_stops(&self, n: usize) {
        self.lock().scale_out_after_stops = Some(n);
    }

    /// Freeze the scheduler now.
    pub fn freeze(&self) {
        self.lock().frozen = true;
    }

    /// Mark the current rollout as in progress.
    pub fn start_rollout(&self) {
        self.lock().rollout_stuck = true;
    }

    /// Add a running task without touching desired count.
    pub fn add_stray_task(&self) -> TaskId {
        self.lock().launch(TaskLastStatus::Running)
    }

    /// Register a scalable target for the service.
    pub fn set_scalable_target(&self, min_capacity: u32, max_capacity: u32) {
        let mut state = self.lock();
        let resource_id = scalable_resource_id(&state.cluster, &state.service);
        state.scalable_target = Some(ScalableTargetInfo {
            resource_id,
            min_capacity,
            max_capacity,
        });
    }

    /// Scalable target lookups fail.
    pub fn fail_scaling_lookups(&self) {
        self.lock().scaling_error = true;
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn journal(&self) -> Vec<Call> {
        self.lock().journal.clone()
    }

    pub fn desired_count(&self) -> u32 {
        self.lock().desired
    }

    /// Task IDs currently live, in launch order.
    pub fn live_tasks(&self) -> Vec<TaskId> {
        self.lock().tasks.iter().map(|t| t.id.clone()).collect()
    }

    /// Tasks the recycler asked to stop, in order.
    pub fn stop_requests(&self) -> Vec<TaskId> {
        self.journal()
            .into_iter()
            .filter_map(|c| match c {
                Call::StopTask(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Desired-count updates, in order.
    pub fn desired_updates(&self) -> Vec<u32> {
        self.journal()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateDesiredCount(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Mutations, stable observations and pacing sleeps.
    ///
    /// Sleeps shorter than `pause` are poll delays and are dropped.
    pub fn timeline(&self, pause: Duration) -> Vec<Step> {
        let mut steps: Vec<Step> = Vec::new();
        for call in self.journal() {
            let step = match call {
                Call::DescribeService { stable: true } => Step::Stable,
                Call::StopTask(id) => Step::Stop(id.into_inner()),
                Call::UpdateDesiredCount(n) => Step::SetDesired(n),
                Call::Sleep(d) if !pause.is_zero() && d >= pause => Step::Pause(d.as_secs()),
                _ => continue,
            };
            if step == Step::Stable && steps.last() == Some(&Step::Stable) {
                continue;
            }
            steps.push(step);
        }
        steps
    }
}

/// Build a task ID, panicking on invalid input.
pub fn task_id(s: &str) -> TaskId {
    TaskId::parse(s).expect("valid task id")
}

#[async_trait]
impl ControlPlane for FakeCluster {
    async fn describe_service(
        &self,
        _cluster: &ClusterName,
        _service: &ServiceName,
    ) -> PlaneResult<ServiceState> {
        let mut state = self.lock();
        if !state.exists {
            return Err(state.missing());
        }
        state.tick();
        let service_state = state.service_state();
        state.journal.push(Call::DescribeService {
            stable: service_state.is_steady(),
        });
        Ok(service_state)
    }

    async fn list_tasks(
        &self,
        _cluster: &ClusterName,
        _service: &ServiceName,
    ) -> PlaneResult<Vec<TaskId>> {
        let mut state = self.lock();
        if !state.exists {
            return Err(state.missing());
        }
        state.tick();
        state.journal.push(Call::ListTasks);
        Ok(state.tasks.iter().map(|t| t.id.clone()).collect())
    }

    async fn describe_tasks(
        &self,
        _cluster: &ClusterName,
        task_ids: &[TaskId],
    ) -> PlaneResult<Vec<TaskDescription>> {
        let mut state = self.lock();
        state.journal.push(Call::DescribeTasks(task_ids.to_vec()));

        let described = task_ids
            .iter()
            .filter_map(|id| {
                if let Some(task) = state.tasks.iter().find(|t| &t.id == id) {
                    Some(TaskDescription {
                        task_id: id.clone(),
                        last_status: task.status,
                    })
                } else if state.stopped.contains(id) {
                    Some(TaskDescription {
                        task_id: id.clone(),
                        last_status: TaskLastStatus::Stopped,
                    })
                } else {
                    None
                }
            })
            .collect();
        Ok(described)
    }

    async fn stop_task(
        &self,
        _cluster: &ClusterName,
        task_id: &TaskId,
        _reason: &str,
    ) -> PlaneResult<()> {
        let mut state = self.lock();
        state.journal.push(Call::StopTask(task_id.clone()));

        let position = state.tasks.iter().position(|t| &t.id == task_id);
        let position = match position {
            Some(p) if !state.stop_failures.contains(task_id) => p,
            _ => return Err(ControlPlaneError::NotFound(format!("task {}", task_id))),
        };

        state.tasks.remove(position);
        state.stopped.push(task_id.clone());

        state.successful_stops += 1;
        let stops = state.successful_stops;

        if state.freeze_after_stops == Some(stops) {
            state.frozen = true;
        }
        if state.stall_after_stops == Some(stops) {
            state.rollout_stuck = true;
        }
        if state.scale_out_after_stops == Some(stops) {
            state.desired += 1;
        }
        Ok(())
    }

    async fn update_desired_count(
        &self,
        _cluster: &ClusterName,
        _service: &ServiceName,
        desired_count: u32,
    ) -> PlaneResult<()> {
        let mut state = self.lock();
        state.journal.push(Call::UpdateDesiredCount(desired_count));

        if state.update_failures.contains(&desired_count) {
            return Err(ControlPlaneError::Conflict(format!(
                "desired count {} rejected",
                desired_count
            )));
        }
        state.desired = desired_count;
        Ok(())
    }
}

#[async_trait]
impl ScalingRegistry for FakeCluster {
    async fn describe_scalable_target(
        &self,
        resource_id: &str,
    ) -> PlaneResult<Option<ScalableTargetInfo>> {
        let mut state = self.lock();
        state
            .journal
            .push(Call::DescribeScalableTarget(resource_id.to_string()));

        if state.scaling_error {
            return Err(ControlPlaneError::Api {
                status: 500,
                message: "registry unavailable".to_string(),
            });
        }
        Ok(state
            .scalable_target
            .clone()
            .filter(|t| t.resource_id == resource_id))
    }
}

/// Sleeper that records into the cluster journal.
#[derive(Debug, Clone)]
pub struct FakeSleeper {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Sleeper for FakeSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.journal.push(Call::Sleep(duration));
        }
    }
}

/// Notifier that keeps every report it receives.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    reports: Mutex<Vec<RecycleReport>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose deliveries always fail (after recording).
    pub fn failing() -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn reports(&self) -> Vec<RecycleReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, report: &RecycleReport) -> Result<(), NotifyError> {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
        if self.fail {
            return Err(NotifyError("smtp relay refused connection".to_string()));
        }
        Ok(())
    }
}
