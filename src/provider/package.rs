//! Package resource - apt/dpkg packages

use anyhow::{Context, Result};
use converge::{Applied, Provider, Resource, ResourceKind, RunContext, State};
use std::process::Command;

use crate::runner;

/// Installs apt packages, optionally pinned to an exact version.
#[derive(Debug, Clone, Copy)]
pub struct PackageProvider;

/// Version of an installed package, or None when absent.
fn installed_version(name: &str) -> Result<Option<String>> {
    let output = Command::new("dpkg-query")
        .args(["-W", "-f", "${db:Status-Status}\t${Version}", name])
        .output()
        .context("Failed to run dpkg-query")?;

    // dpkg-query exits non-zero when the package is unknown
    if !output.status.success() {
        return Ok(None);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    match stdout.trim().split_once('\t') {
        Some(("installed", version)) => Ok(Some(version.to_string())),
        _ => Ok(None),
    }
}

fn install(resource: &Resource) -> Result<()> {
    let spec = match resource.attr_str("version") {
        Some(version) => format!("{}={version}", resource.name()),
        None => resource.name().to_string(),
    };
    runner::run_capture_env(
        "apt-get",
        &["install", "-y", &spec],
        &[("DEBIAN_FRONTEND", "noninteractive")],
    )
    .with_context(|| format!("Failed to install package {}", resource.name()))?;
    Ok(())
}

impl Provider for PackageProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Package
    }

    fn current_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        let Some(version) = installed_version(resource.name())? else {
            return Ok(State::Absent);
        };

        Ok(match resource.attr_str("version") {
            Some(want) if want != version => State::Modified {
                from: version,
                to: want.to_string(),
            },
            Some(_) => State::present_with(version),
            None => State::present(),
        })
    }

    fn desired_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        Ok(match resource.attr_str("version") {
            Some(version) => State::present_with(version),
            None => State::present(),
        })
    }

    fn apply(&self, resource: &Resource, ctx: &RunContext) -> Result<Applied> {
        if self.current_state(resource, ctx)? == self.desired_state(resource, ctx)? {
            return Ok(Applied::unchanged());
        }

        install(resource)?;
        Ok(Applied::changed())
    }
}
