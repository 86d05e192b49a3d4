//! Typed identifier definitions.
//!
//! Names are validated strings owned by the operator or the control plane.
//! Run IDs are ULID-based so reports sort by start time.

use crate::{define_id, define_name, IdError};

/// Maximum length of a cluster or service name.
pub const MAX_RESOURCE_NAME_LEN: usize = 255;

/// Maximum length of a task identifier (bare id or ARN).
pub const MAX_TASK_ID_LEN: usize = 2048;

const ARN_PREFIX: &str = "arn:";

// =============================================================================
// Control plane resources
// =============================================================================

define_name!(ClusterName, "cluster name", validate_resource_name);
define_name!(ServiceName, "service name", validate_resource_name);
define_name!(TaskId, "task id", validate_task_id);

// =============================================================================
// Runs
// =============================================================================

define_id!(RunId, "run");

// =============================================================================
// Validators
// =============================================================================

/// Cluster and service names: letters, digits, hyphens and underscores,
/// or a full ARN.
fn validate_resource_name(kind: &'static str, s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty { kind });
    }

    if s.starts_with(ARN_PREFIX) {
        return validate_opaque(kind, s, MAX_TASK_ID_LEN);
    }

    let len = s.chars().count();
    if len > MAX_RESOURCE_NAME_LEN {
        return Err(IdError::TooLong {
            kind,
            len,
            max: MAX_RESOURCE_NAME_LEN,
        });
    }

    if let Some(found) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(IdError::InvalidCharacter { kind, found });
    }

    Ok(())
}

fn validate_task_id(kind: &'static str, s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty { kind });
    }
    validate_opaque(kind, s, MAX_TASK_ID_LEN)
}

/// Opaque identifiers only need to be printable and free of whitespace.
fn validate_opaque(kind: &'static str, s: &str, max: usize) -> Result<(), IdError> {
    let len = s.chars().count();
    if len > max {
        return Err(IdError::TooLong { kind, len, max });
    }

    if let Some(found) = s.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(IdError::InvalidCharacter { kind, found });
    }

    Ok(())
}

impl ClusterName {
    /// Short name of the cluster: the last path segment of an ARN, or the
    /// name itself.
    #[must_use]
    pub fn short_name(&self) -> &str {
        short_name(self.as_str())
    }
}

impl ServiceName {
    /// Short name of the service: the last path segment of an ARN, or the
    /// name itself.
    #[must_use]
    pub fn short_name(&self) -> &str {
        short_name(self.as_str())
    }
}

fn short_name(s: &str) -> &str {
    if s.starts_with(ARN_PREFIX) {
        s.rsplit('/').next().unwrap_or(s)
    } else {
        s
    }
}

/// Resource ID under which the scaling registry tracks a service's desired
/// count: `service/{cluster}/{service}`.
#[must_use]
pub fn scalable_resource_id(cluster: &ClusterName, service: &ServiceName) -> String {
    format!("service/{}/{}", cluster.short_name(), service.short_name())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_service_name_accepts_plain_name() {
        let name: ServiceName = "web-api_v2".parse().unwrap();
        assert_eq!(name.as_str(), "web-api_v2");
        assert_eq!(name.to_string(), "web-api_v2");
    }

    #[test]
    fn test_service_name_empty() {
        let result: Result<ServiceName, _> = "".parse();
        assert!(result.unwrap_err().is_empty());
    }

    #[test]
    fn test_cluster_name_invalid_character() {
        let result: Result<ClusterName, _> = "prod cluster".parse();
        assert!(matches!(
            result.unwrap_err(),
            IdError::InvalidCharacter { found: ' ', .. }
        ));
    }

    #[test]
    fn test_cluster_name_too_long() {
        let long = "a".repeat(MAX_RESOURCE_NAME_LEN + 1);
        let result = ClusterName::parse(&long);
        assert!(matches!(result.unwrap_err(), IdError::TooLong { .. }));
    }

    #[test]
    fn test_arn_names_use_last_segment() {
        let cluster = ClusterName::parse("arn:aws:ecs:eu-west-1:123456789012:cluster/prod").unwrap();
        let service =
            ServiceName::parse("arn:aws:ecs:eu-west-1:123456789012:service/prod/web").unwrap();
        assert_eq!(cluster.short_name(), "prod");
        assert_eq!(service.short_name(), "web");
        assert_eq!(scalable_resource_id(&cluster, &service), "service/prod/web");
    }

    #[test]
    fn test_task_id_accepts_arn() {
        let id = TaskId::parse("arn:aws:ecs:eu-west-1:123456789012:task/prod/0a1b2c3d").unwrap();
        assert!(id.as_str().ends_with("0a1b2c3d"));
    }

    #[test]
    fn test_task_id_rejects_whitespace() {
        assert!(TaskId::parse("task 1").is_err());
    }

    #[test]
    fn test_name_deserialize_validates() {
        let ok: ServiceName = serde_json::from_str("\"web\"").unwrap();
        assert_eq!(ok.as_str(), "web");

        let err = serde_json::from_str::<ServiceName>("\"bad name\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        assert!(s.starts_with("run_"));
        let parsed: RunId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_run_id_invalid_prefix() {
        let result: Result<RunId, _> = "job_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(result.unwrap_err().is_prefix_error());
    }

    #[test]
    fn test_run_id_json_roundtrip() {
        let id = RunId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    proptest! {
        #[test]
        fn prop_valid_resource_names_roundtrip(s in "[A-Za-z0-9_-]{1,255}") {
            let name = ServiceName::parse(&s).unwrap();
            prop_assert_eq!(name.as_str(), s.as_str());
            let json = serde_json::to_string(&name).unwrap();
            let back: ServiceName = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, name);
        }

        #[test]
        fn prop_names_with_spaces_rejected(a in "[a-z]{1,10}", b in "[a-z]{1,10}") {
            let candidate = format!("{a} {b}");
            prop_assert!(ClusterName::parse(&candidate).is_err());
        }
    }
}
