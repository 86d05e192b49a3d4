//! Capacity controller.
//!
//! The only writer of the service's desired count. Per run it issues at
//! most one inflate update and at most one restore update, and the restore
//! happens whenever the inflate update was issued.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{RecycleError, RecycleResult};
use crate::model::ServiceSnapshot;
use crate::plane::ControlPlane;
use crate::scaling::InflationDecision;
use crate::stability::StabilityWaiter;

/// What happened to desired count before recycling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InflationState {
    /// `maintain_service_state` was off.
    NotRequested,

    /// Inflation was requested but the decision was to skip it.
    Skipped { decision: InflationDecision },

    /// Desired count was raised and the service settled.
    Inflated { from: u32, to: u32 },

    /// The update was issued but the run could not proceed.
    Failed { from: u32, to: u32, error: String },
}

/// Result of the restore step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestoreOutcome {
    /// Desired count was never changed.
    NotNeeded,

    /// Desired count is back at its original value.
    Restored,

    /// The restore update failed; the service needs manual attention.
    Failed { desired: u32, error: String },
}

/// Raises and restores desired count.
pub struct CapacityController {
    plane: Arc<dyn ControlPlane>,
    waiter: StabilityWaiter,
    inflate_called: bool,
    update_issued: bool,
    inflation: InflationState,
    restoration: Option<RestoreOutcome>,
}

impl CapacityController {
    pub fn new(plane: Arc<dyn ControlPlane>, waiter: StabilityWaiter) -> Self {
        Self {
            plane,
            waiter,
            inflate_called: false,
            update_issued: false,
            inflation: InflationState::NotRequested,
            restoration: None,
        }
    }

    pub fn inflation(&self) -> &InflationState {
        &self.inflation
    }

    /// True once an inflate update has been sent, whether or not it succeeded.
    pub fn update_issued(&self) -> bool {
        self.update_issued
    }

    /// Raise desired count by one and wait for the service to settle.
    ///
    /// No-op unless `maintain` is set and the decision is to inflate.
    pub async fn inflate(
        &mut self,
        snapshot: &ServiceSnapshot,
        decision: InflationDecision,
        maintain: bool,
    ) -> RecycleResult<()> {
        if self.inflate_called {
            return Err(RecycleError::InvalidTransition {
                subject: "capacity".to_string(),
                from: "inflated".to_string(),
                to: "inflated".to_string(),
            });
        }
        self.inflate_called = true;

        if !maintain {
            self.inflation = InflationState::NotRequested;
            return Ok(());
        }

        let to = match decision {
            InflationDecision::Inflate { to } => to,
            skip => {
                warn!(
                    service = %snapshot.service_name,
                    decision = ?skip,
                    "Skipping capacity inflation"
                );
                self.inflation = InflationState::Skipped { decision: skip };
                return Ok(());
            }
        };
        let from = snapshot.original_desired_count;

        info!(service = %snapshot.service_name, from, to, "Inflating desired count");
        self.update_issued = true;

        let result = self
            .plane
            .update_desired_count(&snapshot.cluster_name, &snapshot.service_name, to)
            .await
            .map_err(|source| RecycleError::CapacityUpdate { desired: to, source });

        let result = match result {
            Ok(()) => self
                .waiter
                .wait_for_stable(&snapshot.cluster_name, &snapshot.service_name)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };

        self.inflation = match &result {
            Ok(()) => InflationState::Inflated { from, to },
            Err(e) => InflationState::Failed {
                from,
                to,
                error: e.to_string(),
            },
        };
        result
    }

    /// Put desired count back to the snapshot value.
    ///
    /// Sends exactly one update if inflation was issued; never retries.
    /// Repeated calls return the first outcome.
    pub async fn restore(&mut self, snapshot: &ServiceSnapshot) -> RestoreOutcome {
        if let Some(outcome) = &self.restoration {
            return outcome.clone();
        }

        let outcome = if !self.update_issued {
            RestoreOutcome::NotNeeded
        } else {
            let desired = snapshot.original_desired_count;
            match self
                .plane
                .update_desired_count(&snapshot.cluster_name, &snapshot.service_name, desired)
                .await
            {
                Ok(()) => {
                    info!(service = %snapshot.service_name, desired, "Restored desired count");
                    RestoreOutcome::Restored
                }
                Err(source) => {
                    let err = RecycleError::CapacityRestore { desired, source };
                    error!(
                        service = %snapshot.service_name,
                        desired,
                        error = %err,
                        "Capacity restore failed, manual intervention required"
                    );
                    RestoreOutcome::Failed {
                        desired,
                        error: err.to_string(),
                    }
                }
            }
        };

        self.restoration = Some(outcome.clone());
        outcome
    }
}
