//! Convergence engine: walks the graph in order, applies state
//! transitions, drains deferred notifications.
//!
//! A run is fail-soft past pre-flight: provider errors and timeouts mark
//! the one resource failed, cascade skips to its dependents, and the walk
//! continues. `Err` from [`Engine::run`] means the run never started.

use crate::context::{Bindings, RunContext};
use crate::error::{FailureKind, Result};
use crate::graph::Graph;
use crate::notify::NotificationQueue;
use crate::provider::{Provider, ProviderRegistry, State};
use crate::report::{Outcome, RunReport};
use crate::resource::{Catalog, Resource, ResourceId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Run-level options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Default cap on a single provider call. A resource's own timeout
    /// takes precedence; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// A difference reported by [`Engine::plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedChange {
    pub id: ResourceId,
    pub current: State,
    pub desired: State,
}

/// The convergence engine: a provider registry plus run options.
pub struct Engine {
    registry: ProviderRegistry,
    options: RunOptions,
}

impl Engine {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self::with_options(registry, RunOptions::default())
    }

    pub fn with_options(registry: ProviderRegistry, options: RunOptions) -> Self {
        Self { registry, options }
    }

    /// Pre-flight only: validate declarations, references, cycles, and
    /// provider coverage. Touches nothing.
    pub fn validate(&self, resources: Vec<Resource>) -> Result<()> {
        let catalog = Catalog::from_resources(resources)?;
        self.preflight(&catalog)?;
        Ok(())
    }

    /// Read-only preview: current vs desired for every resource that
    /// differs, in execution order. Probe errors degrade to
    /// [`State::Unknown`] rather than aborting.
    pub fn plan(&self, resources: Vec<Resource>, bindings: &Bindings) -> Result<Vec<PlannedChange>> {
        let catalog = Catalog::from_resources(resources)?;
        let graph = self.preflight(&catalog)?;
        let ctx = RunContext::new(bindings);

        let mut changes = Vec::new();
        for &i in graph.order() {
            let resource = &catalog.resources()[i];
            let provider = self.registry.lookup(resource.kind())?;
            let current = provider.current_state(resource, &ctx).unwrap_or_else(|err| {
                log::warn!("state probe failed for {}: {err:#}", resource.id());
                State::Unknown
            });
            let desired = provider.desired_state(resource, &ctx).unwrap_or_else(|err| {
                log::warn!("desired state failed for {}: {err:#}", resource.id());
                State::Unknown
            });
            if current != desired {
                changes.push(PlannedChange {
                    id: resource.id().clone(),
                    current,
                    desired,
                });
            }
        }
        Ok(changes)
    }

    /// Converge a node: validate, walk the graph in order, drain
    /// notifications, return the report.
    pub fn run(&self, resources: Vec<Resource>, bindings: &Bindings) -> Result<RunReport> {
        let catalog = Catalog::from_resources(resources)?;
        let graph = self.preflight(&catalog)?;

        let mut report = RunReport::new();
        let mut queue = NotificationQueue::new();
        let mut outcomes: Vec<Option<Outcome>> = vec![None; catalog.len()];

        for &i in graph.order() {
            let resource = &catalog.resources()[i];

            let blocker = graph.deps_of(i).iter().copied().find(|&j| {
                outcomes[j]
                    .as_ref()
                    .is_some_and(|o| o.is_failed() || o.is_skipped())
            });
            let outcome = match blocker {
                Some(j) => {
                    let dep = &catalog.resources()[j];
                    let why = if outcomes[j].as_ref().is_some_and(Outcome::is_failed) {
                        "failed"
                    } else {
                        "was skipped"
                    };
                    let reason = format!("dependency {} {why}", dep.id());
                    log::debug!("skipping {}: {reason}", resource.id());
                    Outcome::Skipped { reason }
                }
                None => {
                    let provider = self.registry.lookup(resource.kind())?;
                    self.converge_resource(provider, resource, bindings, &mut queue)
                }
            };
            report.record(resource.id().clone(), outcome.clone());
            outcomes[i] = Some(outcome);
        }

        self.drain_notifications(&catalog, bindings, queue, &outcomes, &mut report);
        Ok(report)
    }

    fn preflight(&self, catalog: &Catalog) -> Result<Graph> {
        let graph = Graph::build(catalog)?;
        for resource in catalog.resources() {
            self.registry.lookup(resource.kind())?;
        }
        Ok(graph)
    }

    /// Drive one resource to a terminal outcome. Never returns an error;
    /// provider failures are contained in the outcome.
    fn converge_resource(
        &self,
        provider: &Arc<dyn Provider>,
        resource: &Resource,
        bindings: &Bindings,
        queue: &mut NotificationQueue,
    ) -> Outcome {
        let timeout = resource.timeout().or(self.options.timeout);

        let current = match guarded_call(provider, resource, bindings, timeout, |p, r, ctx| {
            p.current_state(r, ctx)
        }) {
            Guarded::TimedOut => return timeout_outcome("state check", timeout),
            Guarded::Done(Err(err)) => return provider_failure(err),
            Guarded::Done(Ok(state)) => state,
        };
        let desired = match guarded_call(provider, resource, bindings, timeout, |p, r, ctx| {
            p.desired_state(r, ctx)
        }) {
            Guarded::TimedOut => return timeout_outcome("state check", timeout),
            Guarded::Done(Err(err)) => return provider_failure(err),
            Guarded::Done(Ok(state)) => state,
        };

        if current == desired {
            log::debug!("{} already converged ({current})", resource.id());
            return Outcome::Unchanged;
        }
        log::debug!("{}: {current} -> {desired}", resource.id());

        match guarded_call(provider, resource, bindings, timeout, |p, r, ctx| {
            p.apply(r, ctx)
        }) {
            Guarded::TimedOut => timeout_outcome("apply", timeout),
            Guarded::Done(Err(err)) => provider_failure(err),
            Guarded::Done(Ok(applied)) => {
                if applied.changed {
                    for notify in resource.notifies() {
                        queue.enqueue(notify.target.clone(), notify.action);
                    }
                    Outcome::Converged
                } else {
                    Outcome::Unchanged
                }
            }
        }
    }

    /// Fire the collapsed notification queue. Targets that failed or were
    /// skipped get their notification withheld and recorded as skipped.
    fn drain_notifications(
        &self,
        catalog: &Catalog,
        bindings: &Bindings,
        queue: NotificationQueue,
        outcomes: &[Option<Outcome>],
        report: &mut RunReport,
    ) {
        for notify in queue.drain() {
            let Some(i) = catalog.index_of(&notify.target) else {
                continue; // targets were validated pre-flight
            };
            let resource = &catalog.resources()[i];
            let action = notify.action;

            let withheld = outcomes[i]
                .as_ref()
                .is_some_and(|o| o.is_failed() || o.is_skipped());
            if withheld {
                report.record_notification(
                    notify.target,
                    action,
                    Outcome::Skipped {
                        reason: "target did not converge".into(),
                    },
                );
                continue;
            }

            let Ok(provider) = self.registry.lookup(resource.kind()) else {
                continue; // coverage was validated pre-flight
            };
            let timeout = resource.timeout().or(self.options.timeout);
            let outcome = match guarded_call(provider, resource, bindings, timeout, move |p, r, ctx| {
                p.notify(r, action, ctx)
            }) {
                Guarded::TimedOut => timeout_outcome(action.as_str(), timeout),
                Guarded::Done(Err(err)) => Outcome::Failed {
                    kind: FailureKind::Notification,
                    error: format!("{err:#}"),
                },
                Guarded::Done(Ok(())) => {
                    log::debug!("fired {action} on {}", notify.target);
                    Outcome::Converged
                }
            };
            report.record_notification(notify.target, action, outcome);
        }
    }
}

// ============================================================================
// Timeout guard
// ============================================================================

enum Guarded<T> {
    Done(anyhow::Result<T>),
    TimedOut,
}

/// Run a provider call, optionally bounded by a timeout.
///
/// The bounded path clones the call inputs into a helper thread and waits
/// on a channel; on expiry the thread is abandoned and the result, if it
/// ever arrives, is dropped with it.
fn guarded_call<T, F>(
    provider: &Arc<dyn Provider>,
    resource: &Resource,
    bindings: &Bindings,
    timeout: Option<Duration>,
    call: F,
) -> Guarded<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Provider, &Resource, &RunContext) -> anyhow::Result<T> + Send + 'static,
{
    let Some(limit) = timeout else {
        let ctx = RunContext::new(bindings);
        return Guarded::Done(call(provider.as_ref(), resource, &ctx));
    };

    let provider = Arc::clone(provider);
    let resource = resource.clone();
    let bindings = bindings.clone();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let ctx = RunContext::new(&bindings);
        let _ = tx.send(call(provider.as_ref(), &resource, &ctx));
    });

    match rx.recv_timeout(limit) {
        Ok(result) => Guarded::Done(result),
        Err(mpsc::RecvTimeoutError::Timeout) => Guarded::TimedOut,
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Guarded::Done(Err(anyhow::anyhow!("provider call panicked")))
        }
    }
}

fn timeout_outcome(what: &str, timeout: Option<Duration>) -> Outcome {
    let error = match timeout {
        Some(limit) => format!("{what} timed out after {limit:?}"),
        None => format!("{what} timed out"),
    };
    Outcome::Failed {
        kind: FailureKind::Timeout,
        error,
    }
}

fn provider_failure(err: anyhow::Error) -> Outcome {
    Outcome::Failed {
        kind: FailureKind::Provider,
        error: format!("{err:#}"),
    }
}
