//! Service resource - systemd units

use anyhow::{Context, Result};
use converge::{Action, Applied, AttrValue, Provider, Resource, ResourceKind, RunContext, State};

use crate::runner;

/// Converges systemd units to a running/enabled state and receives
/// restart/reload/enable notifications.
#[derive(Debug, Clone, Copy)]
pub struct ServiceProvider;

/// Declared target: `running` defaults to true, `enabled` only
/// participates when declared.
fn declared(resource: &Resource) -> (bool, Option<bool>) {
    let running = resource.attr_bool("running", true);
    let enabled = resource.attr("enabled").and_then(AttrValue::as_bool);
    (running, enabled)
}

fn state_details(running: bool, enabled: Option<bool>) -> String {
    let mut details = if running { "running" } else { "stopped" }.to_string();
    if let Some(enabled) = enabled {
        details.push_str(if enabled { ", enabled" } else { ", disabled" });
    }
    details
}

fn is_active(unit: &str) -> bool {
    runner::run_quiet("systemctl", &["is-active", "--quiet", unit])
}

fn is_enabled(unit: &str) -> bool {
    runner::run_quiet("systemctl", &["is-enabled", "--quiet", unit])
}

fn systemctl(verb: &str, unit: &str) -> Result<()> {
    runner::run_capture("systemctl", &[verb, unit])
        .with_context(|| format!("Failed to {verb} {unit}"))?;
    Ok(())
}

impl Provider for ServiceProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Service
    }

    fn current_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        let unit = resource.name();
        let (_, want_enabled) = declared(resource);
        let enabled = want_enabled.map(|_| is_enabled(unit));
        Ok(State::present_with(state_details(is_active(unit), enabled)))
    }

    fn desired_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        let (running, enabled) = declared(resource);
        Ok(State::present_with(state_details(running, enabled)))
    }

    fn apply(&self, resource: &Resource, _ctx: &RunContext) -> Result<Applied> {
        let unit = resource.name();
        let (want_running, want_enabled) = declared(resource);
        let mut changed = false;

        if let Some(want) = want_enabled {
            if is_enabled(unit) != want {
                systemctl(if want { "enable" } else { "disable" }, unit)?;
                changed = true;
            }
        }
        if is_active(unit) != want_running {
            systemctl(if want_running { "start" } else { "stop" }, unit)?;
            changed = true;
        }

        Ok(if changed {
            Applied::changed()
        } else {
            Applied::unchanged()
        })
    }

    fn notify(&self, resource: &Resource, action: Action, _ctx: &RunContext) -> Result<()> {
        let verb = match action {
            Action::Restart => "restart",
            Action::Reload => "reload",
            Action::Enable => "enable",
        };
        systemctl(verb, resource.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_details_cover_declared_attributes_only() {
        assert_eq!(state_details(true, None), "running");
        assert_eq!(state_details(false, None), "stopped");
        assert_eq!(state_details(true, Some(true)), "running, enabled");
        assert_eq!(state_details(false, Some(false)), "stopped, disabled");
    }

    #[test]
    fn test_declared_defaults_to_running() {
        let resource = Resource::new(ResourceKind::Service, "varnish");
        assert_eq!(declared(&resource), (true, None));

        let resource = resource.with_attr("running", false).with_attr("enabled", true);
        assert_eq!(declared(&resource), (false, Some(true)));
    }
}
