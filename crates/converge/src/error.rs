//! Error types for convergence runs.
//!
//! Two families live here. [`Error`] is the fatal pre-flight taxonomy: any
//! of these aborts a run before the first apply. [`FailureKind`] classifies
//! contained per-resource failures, which are recorded in the run report
//! while the rest of the run continues.

use crate::resource::{ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal pre-flight errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A declaration failed validation: missing or unknown attribute,
    /// empty name, duplicate id, or a reference to an undeclared resource.
    #[error("invalid resource {id}: {reason}")]
    InvalidResource {
        /// Id of the offending declaration
        id: String,
        /// What made it invalid
        reason: String,
    },

    /// No provider is registered for a declared resource kind.
    #[error("no provider registered for resource kind '{0}'")]
    NoProvider(ResourceKind),

    /// The explicit dependency edges form a cycle.
    #[error("dependency cycle detected: {}", format_cycle(.ids))]
    CycleDetected {
        /// The resources on the cycle, in edge order
        ids: Vec<ResourceId>,
    },
}

impl Error {
    /// Shorthand for [`Error::InvalidResource`].
    pub fn invalid_resource(id: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidResource {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

fn format_cycle(ids: &[ResourceId]) -> String {
    let mut parts: Vec<String> = ids.iter().map(ToString::to_string).collect();
    if let Some(first) = parts.first().cloned() {
        parts.push(first);
    }
    parts.join(" -> ")
}

/// Classification of contained per-resource failures.
///
/// These never abort a run; they mark a single resource as failed in the
/// report and cascade skips to its dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider's state query or apply call returned an error
    Provider,
    /// The provider call exceeded the configured per-resource timeout
    Timeout,
    /// A deferred notification failed at drain time
    Notification,
}

impl FailureKind {
    /// Short human-readable label for report output.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Provider => "provider failure",
            Self::Timeout => "timed out",
            Self::Notification => "notification failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_every_resource() {
        let ids = vec![
            ResourceId::new(ResourceKind::Package, "a"),
            ResourceId::new(ResourceKind::Service, "b"),
            ResourceId::new(ResourceKind::Directory, "c"),
        ];
        let err = Error::CycleDetected { ids };
        let msg = err.to_string();
        assert!(msg.contains("package[a]"));
        assert!(msg.contains("service[b]"));
        assert!(msg.contains("directory[c]"));
        assert!(msg.contains(" -> "));
        // The cycle closes back on the first resource
        assert!(msg.ends_with("package[a]"));
    }

    #[test]
    fn test_invalid_resource_shorthand() {
        let err = Error::invalid_resource("package[curl]", "duplicate resource id");
        assert_eq!(
            err.to_string(),
            "invalid resource package[curl]: duplicate resource id"
        );
    }

    #[test]
    fn test_failure_kind_descriptions() {
        assert_eq!(FailureKind::Provider.description(), "provider failure");
        assert_eq!(FailureKind::Timeout.description(), "timed out");
        assert_eq!(FailureKind::Notification.description(), "notification failed");
    }
}
