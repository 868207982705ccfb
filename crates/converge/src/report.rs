//! Run report: ordered per-resource outcomes plus fired notifications.
//!
//! The report is the sole output of a run. Entries appear in execution
//! order, notification entries after all resource entries. Summary counts
//! cover resource entries only; notification outcomes are exposed
//! separately and never affect the success verdict.

use crate::error::FailureKind;
use crate::resource::{Action, ResourceId};
use serde::{Deserialize, Serialize};

/// Terminal outcome of one resource, or of one fired notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Apply ran and changed the system
    Converged,
    /// Current state already matched, or the provider's own re-check
    /// found nothing to do
    Unchanged,
    /// The provider call failed; dependents are skipped
    Failed { kind: FailureKind, error: String },
    /// Not attempted because an explicit dependency failed or was skipped
    Skipped { reason: String },
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// One report line. `action` is set on notification entries only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    pub outcome: Outcome,
}

impl ReportEntry {
    pub fn is_notification(&self) -> bool {
        self.action.is_some()
    }
}

/// Outcome counts over resource entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub converged: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.converged + self.unchanged + self.failed + self.skipped
    }

    /// A run succeeds iff no resource failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Ordered record of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource outcome.
    pub fn record(&mut self, id: ResourceId, outcome: Outcome) {
        self.entries.push(ReportEntry {
            id,
            action: None,
            outcome,
        });
    }

    /// Append the outcome of a drained notification.
    pub fn record_notification(&mut self, id: ResourceId, action: Action, outcome: Outcome) {
        self.entries.push(ReportEntry {
            id,
            action: Some(action),
            outcome,
        });
    }

    /// All entries in record order.
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Resource entries only, in execution order.
    pub fn resources(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| !e.is_notification())
    }

    /// Notification entries only, in fire order.
    pub fn notifications(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.is_notification())
    }

    /// Outcome of a resource (not notification) entry by id.
    pub fn outcome_of(&self, id: &ResourceId) -> Option<&Outcome> {
        self.resources().find(|e| &e.id == id).map(|e| &e.outcome)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for entry in self.resources() {
            match entry.outcome {
                Outcome::Converged => summary.converged += 1,
                Outcome::Unchanged => summary.unchanged += 1,
                Outcome::Failed { .. } => summary.failed += 1,
                Outcome::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.summary().is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    fn id(kind: ResourceKind, name: &str) -> ResourceId {
        ResourceId::new(kind, name)
    }

    #[test]
    fn test_summary_counts_resources_only() {
        let mut report = RunReport::new();
        report.record(id(ResourceKind::Package, "varnish"), Outcome::Converged);
        report.record(id(ResourceKind::Service, "varnish"), Outcome::Unchanged);
        report.record(
            id(ResourceKind::Execute, "migrate"),
            Outcome::Failed {
                kind: FailureKind::Provider,
                error: "exit status 1".into(),
            },
        );
        report.record_notification(
            id(ResourceKind::Service, "varnish"),
            Action::Restart,
            Outcome::Converged,
        );

        let summary = report.summary();
        assert_eq!(summary.converged, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.total(), 3);
        assert!(!summary.is_success());
        assert_eq!(report.notifications().count(), 1);
    }

    #[test]
    fn test_notification_failure_does_not_fail_the_run() {
        let mut report = RunReport::new();
        report.record(id(ResourceKind::Package, "varnish"), Outcome::Converged);
        report.record_notification(
            id(ResourceKind::Service, "varnish"),
            Action::Restart,
            Outcome::Failed {
                kind: FailureKind::Notification,
                error: "systemctl restart failed".into(),
            },
        );
        assert!(report.is_success());
    }

    #[test]
    fn test_outcome_of_skips_notification_entries() {
        let mut report = RunReport::new();
        let service = id(ResourceKind::Service, "varnish");
        report.record(service.clone(), Outcome::Unchanged);
        report.record_notification(
            service.clone(),
            Action::Restart,
            Outcome::Converged,
        );
        assert_eq!(report.outcome_of(&service), Some(&Outcome::Unchanged));
    }
}
