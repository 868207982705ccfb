//! Directory resource - directories with mode and ownership

use anyhow::{Context, Result, bail};
use converge::{Applied, Provider, Resource, ResourceKind, RunContext, State};
use std::fs;

use super::{actual_details, apply_file_attrs, declared_details, path_attr};

/// Creates directories (with parents) and converges mode/owner/group.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryProvider;

impl Provider for DirectoryProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Directory
    }

    fn current_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        let path = path_attr(resource, "path");
        if !path.exists() {
            return Ok(State::Absent);
        }
        if !path.is_dir() {
            return Ok(State::Modified {
                from: "regular file".to_string(),
                to: "directory".to_string(),
            });
        }
        Ok(State::Present {
            details: actual_details(resource, &path)?,
        })
    }

    fn desired_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        Ok(State::Present {
            details: declared_details(resource)?,
        })
    }

    fn apply(&self, resource: &Resource, _ctx: &RunContext) -> Result<Applied> {
        let path = path_attr(resource, "path");
        let mut changed = false;

        if path.exists() && !path.is_dir() {
            bail!("{} exists but is not a directory", path.display());
        }
        if !path.is_dir() {
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            changed = true;
        }
        if apply_file_attrs(resource, &path)? {
            changed = true;
        }

        Ok(if changed {
            Applied::changed()
        } else {
            Applied::unchanged()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::Bindings;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_creates_nested_directories_then_settles() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c");
        let bindings = Bindings::new();
        let ctx = RunContext::new(&bindings);
        let resource = Resource::new(ResourceKind::Directory, target.to_string_lossy());

        assert_eq!(DirectoryProvider.current_state(&resource, &ctx).unwrap(), State::Absent);
        assert!(DirectoryProvider.apply(&resource, &ctx).unwrap().changed);
        assert!(target.is_dir());
        assert!(!DirectoryProvider.apply(&resource, &ctx).unwrap().changed);
    }

    #[test]
    fn test_mode_drift_detected_and_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cache");
        fs::create_dir(&target).unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o700)).unwrap();

        let bindings = Bindings::new();
        let ctx = RunContext::new(&bindings);
        let resource = Resource::new(ResourceKind::Directory, target.to_string_lossy())
            .with_attr("mode", "0755");

        let current = DirectoryProvider.current_state(&resource, &ctx).unwrap();
        let desired = DirectoryProvider.desired_state(&resource, &ctx).unwrap();
        assert_ne!(current, desired);

        assert!(DirectoryProvider.apply(&resource, &ctx).unwrap().changed);
        assert_eq!(
            fs::metadata(&target).unwrap().permissions().mode() & 0o7777,
            0o755
        );
        assert_eq!(
            DirectoryProvider.current_state(&resource, &ctx).unwrap(),
            desired
        );
    }

    #[test]
    fn test_file_in_the_way_fails_apply() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("occupied");
        fs::write(&target, "not a dir").unwrap();

        let bindings = Bindings::new();
        let ctx = RunContext::new(&bindings);
        let resource = Resource::new(ResourceKind::Directory, target.to_string_lossy());

        let err = DirectoryProvider.apply(&resource, &ctx).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
