//! Template file resource - rendered config files with change detection

use anyhow::{Context, Result};
use converge::{Applied, Provider, Resource, ResourceKind, RunContext, State};
use std::fs;

use super::{actual_details, apply_file_attrs, declared_details, path_attr, required_str};
use crate::paths;
use crate::render::Render;

/// Renders a template against the run's bindings and converges the
/// target file to the rendered content, comparing by content hash.
pub struct TemplateProvider {
    renderer: Box<dyn Render>,
}

impl TemplateProvider {
    pub fn new(renderer: Box<dyn Render>) -> Self {
        Self { renderer }
    }

    fn rendered(&self, resource: &Resource, ctx: &RunContext) -> Result<Vec<u8>> {
        let source = required_str(resource, "source")?;
        let template = paths::expand(source);
        self.renderer
            .render(&template, ctx.bindings)
            .with_context(|| format!("Failed to render {}", template.display()))
    }
}

/// Short content fingerprint for state comparison and display.
fn content_hash(bytes: &[u8]) -> String {
    format!("blake3:{}", &blake3::hash(bytes).to_hex()[..12])
}

fn details(hash: String, attrs: Option<String>) -> Option<String> {
    Some(match attrs {
        Some(attrs) => format!("{hash}, {attrs}"),
        None => hash,
    })
}

impl Provider for TemplateProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::TemplateFile
    }

    fn current_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        let path = path_attr(resource, "path");
        if !path.exists() {
            return Ok(State::Absent);
        }
        let content =
            fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(State::Present {
            details: details(content_hash(&content), actual_details(resource, &path)?),
        })
    }

    fn desired_state(&self, resource: &Resource, ctx: &RunContext) -> Result<State> {
        let rendered = self.rendered(resource, ctx)?;
        Ok(State::Present {
            details: details(content_hash(&rendered), declared_details(resource)?),
        })
    }

    fn apply(&self, resource: &Resource, ctx: &RunContext) -> Result<Applied> {
        let path = path_attr(resource, "path");
        let rendered = self.rendered(resource, ctx)?;
        let mut changed = false;

        let current = fs::read(&path).ok();
        if current.as_deref() != Some(rendered.as_slice()) {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&path, &rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
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
    use crate::render::VarRenderer;
    use converge::Bindings;

    fn provider() -> TemplateProvider {
        TemplateProvider::new(Box::new(VarRenderer))
    }

    #[test]
    fn test_renders_and_writes_then_settles() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("default.vcl.tmpl");
        let target = dir.path().join("default.vcl");
        fs::write(&template, "backend default { .host = \"{{ backend_host }}\"; }\n").unwrap();

        let mut bindings = Bindings::new();
        bindings.set("backend_host", "10.0.0.5");
        let ctx = RunContext::new(&bindings);
        let resource = Resource::new(ResourceKind::TemplateFile, target.to_string_lossy())
            .with_attr("source", template.to_string_lossy().to_string());

        assert_eq!(provider().current_state(&resource, &ctx).unwrap(), State::Absent);
        assert!(provider().apply(&resource, &ctx).unwrap().changed);
        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "backend default { .host = \"10.0.0.5\"; }\n"
        );
        assert!(!provider().apply(&resource, &ctx).unwrap().changed);
        assert_eq!(
            provider().current_state(&resource, &ctx).unwrap(),
            provider().desired_state(&resource, &ctx).unwrap()
        );
    }

    #[test]
    fn test_binding_change_rewrites_target() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("conf.tmpl");
        let target = dir.path().join("conf");
        fs::write(&template, "port={{ port }}\n").unwrap();

        let resource = Resource::new(ResourceKind::TemplateFile, target.to_string_lossy())
            .with_attr("source", template.to_string_lossy().to_string());

        let mut bindings = Bindings::new();
        bindings.set("port", "6081");
        assert!(
            provider()
                .apply(&resource, &RunContext::new(&bindings))
                .unwrap()
                .changed
        );

        bindings.set("port", "8080");
        let ctx = RunContext::new(&bindings);
        assert_ne!(
            provider().current_state(&resource, &ctx).unwrap(),
            provider().desired_state(&resource, &ctx).unwrap()
        );
        assert!(provider().apply(&resource, &ctx).unwrap().changed);
        assert_eq!(fs::read_to_string(&target).unwrap(), "port=8080\n");
    }

    #[test]
    fn test_missing_template_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bindings = Bindings::new();
        let ctx = RunContext::new(&bindings);
        let resource = Resource::new(
            ResourceKind::TemplateFile,
            dir.path().join("out").to_string_lossy(),
        )
        .with_attr("source", dir.path().join("nope.tmpl").to_string_lossy().to_string());

        assert!(provider().desired_state(&resource, &ctx).is_err());
        assert!(provider().apply(&resource, &ctx).is_err());
    }

    #[test]
    fn test_mode_converged_alongside_content() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.tmpl");
        let target = dir.path().join("out");
        fs::write(&template, "static\n").unwrap();

        let bindings = Bindings::new();
        let ctx = RunContext::new(&bindings);
        let resource = Resource::new(ResourceKind::TemplateFile, target.to_string_lossy())
            .with_attr("source", template.to_string_lossy().to_string())
            .with_attr("mode", "0600");

        assert!(provider().apply(&resource, &ctx).unwrap().changed);
        assert_eq!(
            fs::metadata(&target).unwrap().permissions().mode() & 0o7777,
            0o600
        );
        assert!(!provider().apply(&resource, &ctx).unwrap().changed);
    }
}
