//! # recycle-id
//!
//! Identifier and name types for the task recycler.
//!
//! ## Design Principles
//!
//! - Names handed to the control plane are validated once, at the edge
//! - Cluster, service, and task identifiers are distinct types and cannot be mixed
//! - Every type has a canonical string form and roundtrips through serde
//!
//! ## Formats
//!
//! Cluster and service names follow the container service naming rules:
//! 1-255 characters drawn from letters, digits, `-` and `_`. Both may also be
//! given as a full resource ARN (`arn:...`).
//!
//! Task identifiers are opaque strings assigned by the control plane (a bare
//! task id or a task ARN). They are only checked for shape, never parsed.
//!
//! Recycle runs get a locally generated, time-ordered ID: `run_{ulid}`.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
