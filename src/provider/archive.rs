//! Archive resource - fetch and extract tarballs

use anyhow::{Context, Result, bail};
use converge::{Applied, Provider, Resource, ResourceKind, RunContext, State};
use flate2::read::GzDecoder;
use std::fs;
use std::path::PathBuf;

use super::{fetch_bytes, required_str};
use crate::paths;

/// Keeps a runaway download from filling the disk.
const MAX_ARCHIVE_SIZE: u64 = 512 * 1024 * 1024;

/// Fetches a tarball (http(s) URL or local path) and unpacks it into
/// `target_dir`. The mandatory `creates` path is the idempotence guard:
/// once it exists the archive is never fetched again.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveProvider;

fn target_dir(resource: &Resource) -> Result<PathBuf> {
    Ok(paths::expand(required_str(resource, "target_dir")?))
}

/// Guard path; relative values resolve against `target_dir`.
fn creates_path(resource: &Resource) -> Result<PathBuf> {
    let creates = paths::expand(required_str(resource, "creates")?);
    Ok(if creates.is_absolute() {
        creates
    } else {
        target_dir(resource)?.join(creates)
    })
}

fn unpack(bytes: &[u8], target: &std::path::Path) -> Result<()> {
    // Sniff for gzip; plain tar passes through
    if bytes.starts_with(&[0x1f, 0x8b]) {
        tar::Archive::new(GzDecoder::new(bytes))
            .unpack(target)
            .context("Failed to unpack gzipped archive")
    } else {
        tar::Archive::new(bytes)
            .unpack(target)
            .context("Failed to unpack archive")
    }
}

impl Provider for ArchiveProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Archive
    }

    fn current_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        if creates_path(resource)?.exists() {
            Ok(State::present())
        } else {
            Ok(State::Absent)
        }
    }

    fn apply(&self, resource: &Resource, _ctx: &RunContext) -> Result<Applied> {
        let creates = creates_path(resource)?;
        if creates.exists() {
            return Ok(Applied::unchanged());
        }

        let target = target_dir(resource)?;
        fs::create_dir_all(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;

        let source = required_str(resource, "source")?;
        log::debug!("archive[{}]: fetching {source}", resource.name());
        let bytes = fetch_bytes(source, MAX_ARCHIVE_SIZE)?;
        unpack(&bytes, &target).with_context(|| format!("Failed to extract {source}"))?;

        // A wrong guard would re-extract on every run; fail loudly instead
        if !creates.exists() {
            bail!(
                "Extracted {source} but guard path {} was not created",
                creates.display()
            );
        }
        Ok(Applied::changed())
    }
}
