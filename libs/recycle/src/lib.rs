//! Sequential task recycling for container services.
//!
//! Replaces every running task of a service one at a time, as an
//! alternative to a forced redeploy. Key concepts:
//!
//! - **Snapshot**: desired count and task IDs captured once at run start.
//!   It is both the iteration source and the restore target.
//! - **Inflation**: desired count is optionally raised by one so the service
//!   keeps full capacity while a task is being replaced.
//! - **Stability**: running equals desired and no rollout is in flight.
//!   The recycler waits for it after every single replacement.
//!
//! # Invariants
//!
//! - Task N+1 is never stopped before task N is STABLE or FAILED
//! - Only tasks captured in the snapshot are ever stopped
//! - Desired count is written at most twice per run (inflate, restore), and
//!   restored whenever the inflate update was issued
//! - Every wait is bounded by `max_attempts × poll_interval`
//! - Nothing is retried; a failed run is re-invoked by the operator

use std::time::Duration;

pub mod capacity;
pub mod error;
pub mod model;
pub mod plane;
pub mod recycler;
pub mod report;
pub mod scaling;
pub mod snapshot;
pub mod stability;

pub use capacity::{CapacityController, InflationState, RestoreOutcome};
pub use error::{ControlPlaneError, NotifyError, RecycleError, RecycleResult, Severity};
pub use model::{
    ConvergenceStatus, DeploymentState, DeploymentStatus, RecycleConfig, RecycleRun,
    RolloutState, RunStatus, ScalableTargetInfo, ServiceSnapshot, ServiceState, ServiceStatus,
    StabilityPolicy, TaskDescription, TaskLastStatus, TaskOutcome, TaskStatus,
};
pub use plane::{
    notify_all, ControlPlane, Notifier, PlaneResult, ScalingRegistry, Sleeper, TokioSleeper,
};
pub use recycler::{recycle, TaskRecycler, STOP_REASON};
pub use report::{FatalError, RecycleReport, RecycleReportBuilder, TaskCounts};
pub use scaling::{InflationDecision, ScalingInspector};
pub use snapshot::ServiceStateReader;
pub use stability::StabilityWaiter;

/// Default pause between replaced tasks, in seconds.
pub const DEFAULT_WAIT_TIME_SECS: u64 = 30;

/// Default number of stability polls.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 40;

/// Default delay between stability polls, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Default host execution ceiling (a serverless function's maximum duration).
pub const DEFAULT_EXECUTION_CEILING: Duration = Duration::from_secs(15 * 60);
