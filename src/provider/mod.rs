//! Host providers - concrete convergence for each resource kind
//!
//! Every provider probes current state, compares it to the declared
//! state, and mutates the host only when the two differ:
//! - probes use cheap read-only commands or fs calls
//! - apply performs the narrowest mutation that closes the gap
//! - an already-correct host reports `Applied::unchanged()`

use anyhow::{Context, Result, bail};
use converge::{ProviderRegistry, Resource};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::render::VarRenderer;
use crate::{paths, runner};

/// Registry wired with every provider this binary ships.
pub fn host_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(PackageProvider);
    registry.register(AptRepositoryProvider::new());
    registry.register(DirectoryProvider);
    registry.register(TemplateProvider::new(Box::new(VarRenderer)));
    registry.register(ServiceProvider);
    registry.register(ExecuteProvider);
    registry.register(LinkProvider);
    registry.register(ArchiveProvider);
    registry
}

// ===== Shared helpers =====

/// Filesystem path a resource manages: its `path`-like attribute when
/// declared, otherwise the resource name. `~` and env vars expand.
pub(crate) fn path_attr(resource: &Resource, attr: &str) -> PathBuf {
    paths::expand(resource.attr_str(attr).unwrap_or_else(|| resource.name()))
}

/// Attribute that catalog validation guarantees for the kind.
pub(crate) fn required_str<'r>(resource: &'r Resource, attr: &str) -> Result<&'r str> {
    resource
        .attr_str(attr)
        .with_context(|| format!("{} is missing required attribute '{attr}'", resource.id()))
}

/// Read bytes from an http(s) URL or a local path.
pub(crate) fn fetch_bytes(source: &str, limit: u64) -> Result<Vec<u8>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let agent = ureq::Agent::new_with_defaults();
        let mut response = agent
            .get(source)
            .call()
            .with_context(|| format!("Failed to fetch {source}"))?;
        response
            .body_mut()
            .with_config()
            .limit(limit)
            .read_to_vec()
            .with_context(|| format!("Failed to read body from {source}"))
    } else {
        let path = paths::expand(source);
        fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

/// Parse an octal mode string such as "0644" or "755".
pub(crate) fn parse_mode(mode: &str) -> Result<u32> {
    u32::from_str_radix(mode, 8).with_context(|| format!("Invalid file mode '{mode}'"))
}

pub(crate) fn current_mode(path: &Path) -> Result<u32> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(metadata.permissions().mode() & 0o7777)
}

pub(crate) fn owner_group(path: &Path) -> Result<(String, String)> {
    let path_str = path.to_string_lossy();
    let out = runner::run_capture("stat", &["-c", "%U %G", &path_str])?;
    let mut parts = out.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(owner), Some(group)) => Ok((owner.to_string(), group.to_string())),
        _ => bail!("Unexpected stat output for {}: '{out}'", path.display()),
    }
}

fn chown(path: &Path, owner: Option<&str>, group: Option<&str>) -> Result<()> {
    let spec = match (owner, group) {
        (Some(owner), Some(group)) => format!("{owner}:{group}"),
        (Some(owner), None) => owner.to_string(),
        (None, Some(group)) => format!(":{group}"),
        (None, None) => return Ok(()),
    };
    let path_str = path.to_string_lossy();
    runner::run_capture("chown", &[&spec, &path_str])
        .with_context(|| format!("Failed to chown {} to {spec}", path.display()))?;
    Ok(())
}

/// Bring mode/owner/group of an existing path in line with the declared
/// attributes. Returns whether anything had to change.
pub(crate) fn apply_file_attrs(resource: &Resource, path: &Path) -> Result<bool> {
    let mut changed = false;

    if let Some(mode) = resource.attr_str("mode") {
        let want = parse_mode(mode)?;
        if current_mode(path)? != want {
            fs::set_permissions(path, fs::Permissions::from_mode(want))
                .with_context(|| format!("Failed to set mode on {}", path.display()))?;
            changed = true;
        }
    }

    let owner = resource.attr_str("owner");
    let group = resource.attr_str("group");
    if owner.is_some() || group.is_some() {
        let (have_owner, have_group) = owner_group(path)?;
        let owner_drift = owner.is_some_and(|want| want != have_owner);
        let group_drift = group.is_some_and(|want| want != have_group);
        if owner_drift || group_drift {
            chown(path, owner, group)?;
            changed = true;
        }
    }

    Ok(changed)
}

/// Declared mode/owner/group as a detail string, or None when the
/// resource declares none of them. Mode is normalized so "644" and
/// "0644" compare equal.
pub(crate) fn declared_details(resource: &Resource) -> Result<Option<String>> {
    let mut parts = Vec::new();
    if let Some(mode) = resource.attr_str("mode") {
        parts.push(format!("mode={:04o}", parse_mode(mode)?));
    }
    if let Some(owner) = resource.attr_str("owner") {
        parts.push(format!("owner={owner}"));
    }
    if let Some(group) = resource.attr_str("group") {
        parts.push(format!("group={group}"));
    }
    Ok((!parts.is_empty()).then(|| parts.join(", ")))
}

/// The path's actual values for exactly the attributes the resource
/// declares, formatted to compare against [`declared_details`].
pub(crate) fn actual_details(resource: &Resource, path: &Path) -> Result<Option<String>> {
    let mut parts = Vec::new();
    if resource.attr_str("mode").is_some() {
        parts.push(format!("mode={:04o}", current_mode(path)?));
    }
    let want_owner = resource.attr_str("owner").is_some();
    let want_group = resource.attr_str("group").is_some();
    if want_owner || want_group {
        let (owner, group) = owner_group(path)?;
        if want_owner {
            parts.push(format!("owner={owner}"));
        }
        if want_group {
            parts.push(format!("group={group}"));
        }
    }
    Ok((!parts.is_empty()).then(|| parts.join(", ")))
}

// ===== Re-export submodules =====

pub mod apt_repository;
pub mod archive;
pub mod directory;
pub mod execute;
pub mod link;
pub mod package;
pub mod service;
pub mod template;

pub use apt_repository::AptRepositoryProvider;
pub use archive::ArchiveProvider;
pub use directory::DirectoryProvider;
pub use execute::ExecuteProvider;
pub use link::LinkProvider;
pub use package::PackageProvider;
pub use service::ServiceProvider;
pub use template::TemplateProvider;
