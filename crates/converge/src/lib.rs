//! # Converge
//!
//! A minimal convergent configuration engine: declare the desired state
//! of a host as an ordered list of resources, then converge the host to
//! that state idempotently.
//!
//! ## Core Concepts
//!
//! - **Resource**: one declared unit of desired state (`package[curl]`,
//!   `service[varnish]`), a kind plus attributes
//! - **Provider**: queries and enforces one resource kind's state;
//!   the only component that touches the system
//! - **Catalog / Graph**: validated declarations plus explicit `requires`
//!   edges, with declaration sequence as the deterministic tie-break
//! - **Engine**: walks the graph, applies idempotent transitions, fires
//!   deferred notifications once per (target, action)
//! - **RunReport**: ordered per-resource outcomes, the sole run output
//!
//! ## Example
//!
//! ```ignore
//! use converge::{Applied, Bindings, Engine, Provider, ProviderRegistry, Resource,
//!                ResourceKind, RunContext, State};
//!
//! struct TouchProvider;
//!
//! impl Provider for TouchProvider {
//!     fn kind(&self) -> ResourceKind {
//!         ResourceKind::Directory
//!     }
//!
//!     fn current_state(&self, r: &Resource, _ctx: &RunContext) -> anyhow::Result<State> {
//!         let path = r.attr_str("path").unwrap_or_else(|| r.name());
//!         Ok(if std::path::Path::new(path).is_dir() {
//!             State::present()
//!         } else {
//!             State::Absent
//!         })
//!     }
//!
//!     fn apply(&self, r: &Resource, _ctx: &RunContext) -> anyhow::Result<Applied> {
//!         let path = r.attr_str("path").unwrap_or_else(|| r.name());
//!         if std::path::Path::new(path).is_dir() {
//!             return Ok(Applied::unchanged());
//!         }
//!         std::fs::create_dir_all(path)?;
//!         Ok(Applied::changed())
//!     }
//! }
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register(TouchProvider);
//! let engine = Engine::new(registry);
//!
//! let resources = vec![Resource::new(ResourceKind::Directory, "/tmp/demo")];
//! let report = engine.run(resources, &Bindings::new())?;
//! assert!(report.is_success());
//! ```
//!
//! ## Failure model
//!
//! Pre-flight problems (invalid declarations, dangling references,
//! cycles, missing providers) abort the run before anything is touched.
//! Past pre-flight a run is fail-soft: a provider error or timeout fails
//! that one resource, skips its dependents, and the rest of the run
//! continues.

pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod notify;
pub mod provider;
pub mod report;
pub mod resource;

pub use context::{Bindings, RunContext};
pub use engine::{Engine, PlannedChange, RunOptions};
pub use error::{Error, FailureKind, Result};
pub use graph::Graph;
pub use notify::NotificationQueue;
pub use provider::{Applied, Provider, ProviderRegistry, State};
pub use report::{Outcome, ReportEntry, RunReport, Summary};
pub use resource::{Action, AttrValue, Catalog, Notify, Resource, ResourceId, ResourceKind};
