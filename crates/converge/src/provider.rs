//! Provider trait and registry.
//!
//! A provider knows how to query and enforce one resource kind's state.
//! Side effects are confined to [`Provider::apply`] and
//! [`Provider::notify`]; state queries must be read-only. Providers must
//! be individually idempotent: a second `apply` with no intervening
//! external change reports `changed = false`.

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::resource::{Action, Resource, ResourceKind};
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Current or desired state of a resource as its provider sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// The resource exists and is configured. `details` refines the match
    /// (content hash, pinned version, service flags); two `Present` states
    /// are equal only when their details agree.
    Present { details: Option<String> },
    /// The resource does not exist
    Absent,
    /// The resource exists but differs from the declaration
    Modified { from: String, to: String },
    /// The provider could not determine the state
    Unknown,
}

impl State {
    /// `Present` with no distinguishing details.
    pub fn present() -> Self {
        Self::Present { details: None }
    }

    /// `Present` refined by a detail string.
    pub fn present_with(details: impl Into<String>) -> Self {
        Self::Present {
            details: Some(details.into()),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present { details: Some(d) } => write!(f, "present ({d})"),
            Self::Present { details: None } => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
            Self::Modified { from, to } => write!(f, "modified ({from} -> {to})"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of one apply call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applied {
    /// Whether the system was actually mutated
    pub changed: bool,
}

impl Applied {
    pub fn changed() -> Self {
        Self { changed: true }
    }

    pub fn unchanged() -> Self {
        Self { changed: false }
    }
}

/// Capability set for one resource kind.
pub trait Provider: Send + Sync {
    /// The resource kind this provider converges.
    fn kind(&self) -> ResourceKind;

    /// Query the current state. Must not mutate the system.
    fn current_state(&self, resource: &Resource, ctx: &RunContext) -> anyhow::Result<State>;

    /// Compute the declared target state for comparison against current.
    ///
    /// Most kinds converge to plain presence; override when the target
    /// carries content (a rendered template's hash, a pinned version).
    fn desired_state(&self, _resource: &Resource, _ctx: &RunContext) -> anyhow::Result<State> {
        Ok(State::present())
    }

    /// Converge the resource. Must re-check before mutating so a second
    /// call with no external change reports `changed = false`.
    fn apply(&self, resource: &Resource, ctx: &RunContext) -> anyhow::Result<Applied>;

    /// Fire a deferred notification action at this resource.
    fn notify(&self, resource: &Resource, action: Action, _ctx: &RunContext) -> anyhow::Result<()> {
        bail!(
            "resource kind '{}' does not support '{action}' notifications",
            resource.kind()
        )
    }
}

/// Registry mapping resource kinds to providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ResourceKind, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own kind, replacing any previous one.
    pub fn register<P: Provider + 'static>(&mut self, provider: P) {
        self.register_arc(Arc::new(provider));
    }

    pub fn register_arc(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Look up the provider for a kind.
    pub fn lookup(&self, kind: ResourceKind) -> Result<&Arc<dyn Provider>> {
        self.providers.get(&kind).ok_or(Error::NoProvider(kind))
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.providers.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.providers.keys().copied()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Bindings;

    struct NullProvider;

    impl Provider for NullProvider {
        fn kind(&self) -> ResourceKind {
            ResourceKind::Execute
        }

        fn current_state(&self, _r: &Resource, _ctx: &RunContext) -> anyhow::Result<State> {
            Ok(State::Absent)
        }

        fn apply(&self, _r: &Resource, _ctx: &RunContext) -> anyhow::Result<Applied> {
            Ok(Applied::unchanged())
        }
    }

    #[test]
    fn test_lookup_missing_kind() {
        let registry = ProviderRegistry::new();
        let err = registry.lookup(ResourceKind::Service).err().unwrap();
        assert!(err.to_string().contains("no provider registered"));
        assert!(err.to_string().contains("service"));
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ProviderRegistry::new();
        registry.register(NullProvider);
        assert!(registry.contains(ResourceKind::Execute));
        assert!(registry.lookup(ResourceKind::Execute).is_ok());
        assert_eq!(registry.kinds().collect::<Vec<_>>(), [ResourceKind::Execute]);
    }

    #[test]
    fn test_default_notify_is_unsupported() {
        let provider = NullProvider;
        let resource = Resource::new(ResourceKind::Execute, "true");
        let bindings = Bindings::new();
        let ctx = RunContext::new(&bindings);
        let err = provider
            .notify(&resource, Action::Restart, &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("does not support 'restart'"));
    }

    #[test]
    fn test_present_states_compare_by_details() {
        assert_eq!(State::present(), State::present());
        assert_eq!(State::present_with("abc"), State::present_with("abc"));
        assert_ne!(State::present_with("abc"), State::present_with("def"));
        assert_ne!(State::present(), State::present_with("abc"));
    }
}
