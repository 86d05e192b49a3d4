//! Scaling inspector.
//!
//! Reads the autoscaling registration for a service so inflation does not
//! push desired count past the registered maximum, where the autoscaler
//! would immediately scale it back.

use std::sync::Arc;

use recycle_id::{scalable_resource_id, ClusterName, ServiceName};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::ScalableTargetInfo;
use crate::plane::ScalingRegistry;

/// What the capacity controller should do before recycling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum InflationDecision {
    /// Raise desired count to `to`.
    Inflate { to: u32 },

    /// `desired + 1` would exceed the registered maximum.
    SkipAboveMax { max_capacity: u32 },

    /// The service has no tasks; there is nothing to keep available.
    SkipEmpty,
}

/// Reads scalable targets. Read-only.
pub struct ScalingInspector {
    registry: Arc<dyn ScalingRegistry>,
}

impl ScalingInspector {
    pub fn new(registry: Arc<dyn ScalingRegistry>) -> Self {
        Self { registry }
    }

    /// Look up the scalable target. Registry errors degrade to `None`.
    pub async fn inspect(
        &self,
        cluster: &ClusterName,
        service: &ServiceName,
    ) -> Option<ScalableTargetInfo> {
        let resource_id = scalable_resource_id(cluster, service);

        match self.registry.describe_scalable_target(&resource_id).await {
            Ok(Some(target)) => {
                debug!(
                    resource_id = %target.resource_id,
                    min_capacity = target.min_capacity,
                    max_capacity = target.max_capacity,
                    "Found scalable target"
                );
                Some(target)
            }
            Ok(None) => {
                debug!(resource_id = %resource_id, "No scalable target registered");
                None
            }
            Err(e) => {
                warn!(
                    resource_id = %resource_id,
                    error = %e,
                    "Failed to read scalable target, treating service as unscaled"
                );
                None
            }
        }
    }

    /// Decide whether inflating by one is compatible with the registration.
    pub fn plan_inflation(
        desired_count: u32,
        target: Option<&ScalableTargetInfo>,
    ) -> InflationDecision {
        if desired_count == 0 {
            return InflationDecision::SkipEmpty;
        }

        let to = desired_count.saturating_add(1);
        match target {
            Some(t) if to > t.max_capacity => InflationDecision::SkipAboveMax {
                max_capacity: t.max_capacity,
            },
            _ => InflationDecision::Inflate { to },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(min: u32, max: u32) -> ScalableTargetInfo {
        ScalableTargetInfo {
            resource_id: "service/prod/web".to_string(),
            min_capacity: min,
            max_capacity: max,
        }
    }

    #[test]
    fn test_plan_without_target() {
        assert_eq!(
            ScalingInspector::plan_inflation(3, None),
            InflationDecision::Inflate { to: 4 }
        );
    }

    #[test]
    fn test_plan_within_bounds() {
        assert_eq!(
            ScalingInspector::plan_inflation(3, Some(&target(1, 4))),
            InflationDecision::Inflate { to: 4 }
        );
    }

    #[test]
    fn test_plan_at_max() {
        assert_eq!(
            ScalingInspector::plan_inflation(4, Some(&target(1, 4))),
            InflationDecision::SkipAboveMax { max_capacity: 4 }
        );
    }

    #[test]
    fn test_plan_empty_service() {
        assert_eq!(
            ScalingInspector::plan_inflation(0, None),
            InflationDecision::SkipEmpty
        );
    }
}
