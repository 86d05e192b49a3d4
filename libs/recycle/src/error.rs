//! Error types for the recycler and its collaborators.

use std::time::Duration;

use recycle_id::{ClusterName, ServiceName, TaskId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for recycler operations.
pub type RecycleResult<T> = Result<T, RecycleError>;

/// Errors returned by a control plane or scaling registry client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlPlaneError {
    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current resource state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The control plane rejected the request.
    #[error("control plane error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never reached the control plane or the response was unreadable.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ControlPlaneError {
    /// Returns true if the error indicates a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A notifier could not deliver the report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Recycler errors.
#[derive(Debug, Error)]
pub enum RecycleError {
    /// The service or its cluster does not exist.
    #[error("service {service} not found in cluster {cluster}")]
    ServiceNotFound {
        cluster: ClusterName,
        service: ServiceName,
    },

    /// The service was not in a steady state when the snapshot was taken.
    #[error("service {service} is not steady: {detail}")]
    ServiceUnstable {
        service: ServiceName,
        detail: String,
    },

    /// An original task could not be stopped.
    #[error("failed to stop task {task_id}: {source}")]
    TaskStop {
        task_id: TaskId,
        #[source]
        source: ControlPlaneError,
    },

    /// The service did not reach a steady state within the poll budget.
    #[error("service {service} not stable after {attempts} polls ({waited:?})")]
    StabilityTimeout {
        service: ServiceName,
        attempts: u32,
        waited: Duration,
    },

    /// No replacement for a stopped task reached RUNNING within the poll budget.
    #[error("no replacement for task {task_id} running after {attempts} polls ({waited:?})")]
    ReplacementTimeout {
        task_id: TaskId,
        attempts: u32,
        waited: Duration,
    },

    /// Raising the desired count failed.
    #[error("failed to set desired count to {desired}: {source}")]
    CapacityUpdate {
        desired: u32,
        #[source]
        source: ControlPlaneError,
    },

    /// Restoring the original desired count failed.
    #[error("failed to restore desired count to {desired}: {source}")]
    CapacityRestore {
        desired: u32,
        #[source]
        source: ControlPlaneError,
    },

    /// The run configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A state transition was attempted out of order.
    #[error("invalid transition for {subject}: {from} -> {to}")]
    InvalidTransition {
        subject: String,
        from: String,
        to: String,
    },

    /// Any other control plane failure.
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),
}

/// How an error affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Detected before any mutation; nothing to roll back.
    Precondition,

    /// Affects a single task; the run continues.
    Task,

    /// Aborts the recycle loop; capacity restoration still runs.
    Fatal,

    /// Leaves the service at a non-original capacity.
    Critical,
}

impl RecycleError {
    /// Classify the error.
    pub fn severity(&self) -> Severity {
        match self {
            Self::ServiceNotFound { .. } | Self::ServiceUnstable { .. } | Self::InvalidConfig(_) => {
                Severity::Precondition
            }
            Self::TaskStop { .. } => Severity::Task,
            Self::StabilityTimeout { .. }
            | Self::ReplacementTimeout { .. }
            | Self::CapacityUpdate { .. }
            | Self::InvalidTransition { .. }
            | Self::ControlPlane(_) => Severity::Fatal,
            Self::CapacityRestore { .. } => Severity::Critical,
        }
    }

    /// Returns true if the error is a poll budget exhaustion.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::StabilityTimeout { .. } | Self::ReplacementTimeout { .. }
        )
    }
}
