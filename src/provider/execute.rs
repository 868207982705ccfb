//! Execute resource - one-shot shell commands with a `creates` guard

use anyhow::{Context, Result, bail};
use converge::{Applied, Provider, Resource, ResourceKind, RunContext, State};
use std::path::PathBuf;
use std::process::Command;

use crate::paths;

/// Runs a shell command. With `creates`, the command is skipped once the
/// named path exists; without it, every run executes and counts as a
/// change.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteProvider;

/// The command string; the resource name doubles as the command when no
/// `command` attribute is declared.
fn command_of(resource: &Resource) -> &str {
    resource.attr_str("command").unwrap_or_else(|| resource.name())
}

/// Guard path; relative values resolve against `cwd`, like the command.
fn creates_path(resource: &Resource) -> Option<PathBuf> {
    let creates = paths::expand(resource.attr_str("creates")?);
    match resource.attr_str("cwd") {
        Some(cwd) if creates.is_relative() => Some(paths::expand(cwd).join(creates)),
        _ => Some(creates),
    }
}

fn guard_satisfied(resource: &Resource) -> bool {
    creates_path(resource).is_some_and(|creates| creates.exists())
}

fn run_command(resource: &Resource) -> Result<()> {
    let command = command_of(resource);

    let mut cmd = match resource.attr_str("user") {
        Some(user) => {
            let mut cmd = Command::new("sudo");
            cmd.args(["-u", user, "sh", "-c", command]);
            cmd
        }
        None => {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        }
    };
    if let Some(cwd) = resource.attr_str("cwd") {
        cmd.current_dir(paths::expand(cwd));
    }

    let output = cmd
        .output()
        .with_context(|| format!("Failed to execute: {command}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("Command failed ({}): {}", output.status, stderr.trim());
    }
    log::debug!(
        "execute[{}]: {}",
        resource.name(),
        String::from_utf8_lossy(&output.stdout).trim()
    );
    Ok(())
}

impl Provider for ExecuteProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Execute
    }

    fn current_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        if guard_satisfied(resource) {
            Ok(State::present())
        } else {
            Ok(State::Absent)
        }
    }

    fn apply(&self, resource: &Resource, _ctx: &RunContext) -> Result<Applied> {
        if guard_satisfied(resource) {
            return Ok(Applied::unchanged());
        }
        run_command(resource)?;
        Ok(Applied::changed())
    }
}
