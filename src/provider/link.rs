//! Link resource - managed symlinks

use anyhow::{Context, Result, bail};
use converge::{Applied, Provider, Resource, ResourceKind, RunContext, State};
use std::fs;
use std::path::{Path, PathBuf};

use super::required_str;
use crate::paths;

/// Creates or deletes symlinks. The resource name is the link path;
/// `to` is where it points. `action = "delete"` converges to absence.
#[derive(Debug, Clone, Copy)]
pub struct LinkProvider;

#[derive(Debug)]
enum LinkState {
    Missing,
    Correct,
    WrongTarget(PathBuf),
    FileExists,
}

fn deletes(resource: &Resource) -> bool {
    resource.attr_str("action") == Some("delete")
}

fn check_current(link: &Path, to: &Path) -> Result<LinkState> {
    if !link.exists() && !link.is_symlink() {
        return Ok(LinkState::Missing);
    }

    if link.is_symlink() {
        let link_target = fs::read_link(link).context("Failed to read symlink")?;

        // Canonicalize for comparison
        let expected = to.canonicalize().unwrap_or_else(|_| to.to_path_buf());
        let actual = if link_target.is_absolute() {
            link_target.canonicalize().unwrap_or(link_target)
        } else {
            link.parent()
                .map(|p| p.join(&link_target))
                .and_then(|p| p.canonicalize().ok())
                .unwrap_or(link_target)
        };

        if expected == actual {
            Ok(LinkState::Correct)
        } else {
            Ok(LinkState::WrongTarget(actual))
        }
    } else {
        Ok(LinkState::FileExists)
    }
}

fn create_link(link: &Path, to: &Path) -> Result<()> {
    if !to.exists() {
        bail!("Link target does not exist: {}", to.display());
    }

    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
    }

    if link.is_symlink() {
        fs::remove_file(link)
            .with_context(|| format!("Failed to remove existing symlink: {}", link.display()))?;
    }

    std::os::unix::fs::symlink(to, link).with_context(|| {
        format!("Failed to create symlink: {} -> {}", link.display(), to.display())
    })
}

impl Provider for LinkProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Link
    }

    fn current_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        let link = paths::expand(resource.name());

        if deletes(resource) {
            return Ok(if link.is_symlink() {
                State::present()
            } else {
                State::Absent
            });
        }

        let to = paths::expand(required_str(resource, "to")?);
        match check_current(&link, &to)? {
            LinkState::Missing => Ok(State::Absent),
            LinkState::Correct => Ok(State::present_with(format!("-> {}", to.display()))),
            LinkState::WrongTarget(actual) => Ok(State::Modified {
                from: actual.to_string_lossy().to_string(),
                to: to.to_string_lossy().to_string(),
            }),
            LinkState::FileExists => Ok(State::Modified {
                from: "regular file".to_string(),
                to: format!("symlink -> {}", to.display()),
            }),
        }
    }

    fn desired_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        if deletes(resource) {
            return Ok(State::Absent);
        }
        let to = paths::expand(required_str(resource, "to")?);
        Ok(State::present_with(format!("-> {}", to.display())))
    }

    fn apply(&self, resource: &Resource, _ctx: &RunContext) -> Result<Applied> {
        let link = paths::expand(resource.name());

        if deletes(resource) {
            if !link.is_symlink() {
                if link.exists() {
                    bail!("{} is not a symlink, refusing to delete", link.display());
                }
                return Ok(Applied::unchanged());
            }
            fs::remove_file(&link)
                .with_context(|| format!("Failed to remove symlink: {}", link.display()))?;
            return Ok(Applied::changed());
        }

        let to = paths::expand(required_str(resource, "to")?);
        match check_current(&link, &to)? {
            LinkState::Correct => Ok(Applied::unchanged()),
            LinkState::Missing | LinkState::WrongTarget(_) => {
                create_link(&link, &to)?;
                Ok(Applied::changed())
            }
            LinkState::FileExists => {
                bail!("File exists at {}, refusing to replace with symlink", link.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::Bindings;

    #[test]
    fn test_creates_link_then_settles() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("current");
        let link = dir.path().join("bin/app");
        fs::create_dir(&target).unwrap();

        let bindings = Bindings::new();
        let ctx = RunContext::new(&bindings);
        let resource = Resource::new(ResourceKind::Link, link.to_string_lossy())
            .with_attr("to", target.to_string_lossy().to_string());

        assert_eq!(LinkProvider.current_state(&resource, &ctx).unwrap(), State::Absent);
        assert!(LinkProvider.apply(&resource, &ctx).unwrap().changed);
        assert_eq!(fs::read_link(&link).unwrap(), target);
        assert!(!LinkProvider.apply(&resource, &ctx).unwrap().changed);
    }

    #[test]
    fn test_wrong_target_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("v1");
        let new = dir.path().join("v2");
        let link = dir.path().join("current");
        fs::create_dir(&old).unwrap();
        fs::create_dir(&new).unwrap();
        std::os::unix::fs::symlink(&old, &link).unwrap();

        let bindings = Bindings::new();
        let ctx = RunContext::new(&bindings);
        let resource = Resource::new(ResourceKind::Link, link.to_string_lossy())
            .with_attr("to", new.to_string_lossy().to_string());

        assert!(matches!(
            LinkProvider.current_state(&resource, &ctx).unwrap(),
            State::Modified { .. }
        ));
        assert!(LinkProvider.apply(&resource, &ctx).unwrap().changed);
        assert_eq!(fs::read_link(&link).unwrap(), new);
    }

    #[test]
    fn test_regular_file_never_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let link = dir.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(&link, "precious").unwrap();

        let bindings = Bindings::new();
        let ctx = RunContext::new(&bindings);
        let resource = Resource::new(ResourceKind::Link, link.to_string_lossy())
            .with_attr("to", target.to_string_lossy().to_string());

        assert!(LinkProvider.apply(&resource, &ctx).is_err());
        assert_eq!(fs::read_to_string(&link).unwrap(), "precious");
    }

    #[test]
    fn test_delete_action_removes_link() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let link = dir.path().join("stale");
        fs::create_dir(&target).unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let bindings = Bindings::new();
        let ctx = RunContext::new(&bindings);
        let resource =
            Resource::new(ResourceKind::Link, link.to_string_lossy()).with_attr("action", "delete");

        assert!(LinkProvider.apply(&resource, &ctx).unwrap().changed);
        assert!(!link.is_symlink());
        assert!(!LinkProvider.apply(&resource, &ctx).unwrap().changed);
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bindings = Bindings::new();
        let ctx = RunContext::new(&bindings);
        let resource = Resource::new(
            ResourceKind::Link,
            dir.path().join("lnk").to_string_lossy(),
        )
        .with_attr("to", dir.path().join("ghost").to_string_lossy().to_string());

        let err = LinkProvider.apply(&resource, &ctx).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
