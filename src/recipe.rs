//! Recipe files - TOML declarations of a host's desired state.
//!
//! A recipe is a `[bindings]` table plus an ordered `[[resources]]` array.
//! Array order matters: it is the execution order absent explicit
//! `requires` edges. String attributes, resource names, and reference
//! targets may interpolate `{{ binding }}` placeholders; an unknown
//! binding fails the load.
//!
//! # Example
//!
//! ```toml
//! [bindings]
//! backend_host = "127.0.0.1"
//!
//! [[resources]]
//! type = "package"
//! name = "varnish"
//!
//! [[resources]]
//! type = "template_file"
//! name = "/etc/varnish/default.vcl"
//! source = "templates/default.vcl.tmpl"
//! mode = "0644"
//! notifies = [{ action = "restart", target = "service[varnish]" }]
//!
//! [[resources]]
//! type = "service"
//! name = "varnish"
//! ```

use anyhow::{Context as _, Result, bail};
use converge::{Action, AttrValue, Bindings, Resource, ResourceId, ResourceKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::render::substitute;

/// A parsed recipe file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    /// Optional name shown in summaries and history
    pub name: Option<String>,

    /// Node-scoped variables available to interpolation and templates
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,

    /// Ordered resource declarations
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

/// One `[[resources]]` table.
#[derive(Debug, Deserialize)]
pub struct ResourceEntry {
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub name: String,

    /// `kind[name]` references that must converge before this resource
    #[serde(default)]
    pub requires: Vec<String>,

    /// Notifications fired if this resource changes
    #[serde(default)]
    pub notifies: Vec<NotifyEntry>,

    /// Per-resource timeout in seconds for provider calls
    pub timeout: Option<u64>,

    /// Kind-specific attributes
    #[serde(flatten)]
    pub attrs: BTreeMap<String, AttrValue>,
}

#[derive(Debug, Deserialize)]
pub struct NotifyEntry {
    pub action: Action,
    pub target: String,
}

impl Recipe {
    /// Load and parse a recipe from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe: {}", path.display()))?;
        let recipe: Recipe = toml::from_str(&content)
            .with_context(|| format!("Failed to parse recipe: {}", path.display()))?;
        Ok(recipe)
    }

    /// Display name for summaries: the recipe's own name, or its path.
    pub fn display_name(&self, path: &Path) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| path.display().to_string())
    }

    /// Recipe bindings merged with CLI overrides; overrides win.
    pub fn merged_bindings(&self, overrides: &[(String, String)]) -> Bindings {
        let mut bindings = Bindings::from(self.bindings.clone());
        for (key, value) in overrides {
            bindings.set(key.clone(), value.clone());
        }
        bindings
    }

    /// Convert entries to engine resources, interpolating `{{ binding }}`
    /// placeholders in names, string attributes, and reference targets.
    pub fn to_resources(&self, bindings: &Bindings) -> Result<Vec<Resource>> {
        self.resources
            .iter()
            .map(|entry| entry.to_resource(bindings))
            .collect()
    }
}

impl ResourceEntry {
    fn to_resource(&self, bindings: &Bindings) -> Result<Resource> {
        let at = |what: &str| format!("in {}[{}] {what}", self.kind, self.name);

        let name = substitute(&self.name, bindings).with_context(|| at("name"))?;
        let mut resource = Resource::new(self.kind, name);

        for (key, value) in &self.attrs {
            let value = match value {
                AttrValue::String(s) => {
                    AttrValue::String(substitute(s, bindings).with_context(|| at(key))?)
                }
                AttrValue::List(items) => AttrValue::List(
                    items
                        .iter()
                        .map(|item| substitute(item, bindings))
                        .collect::<Result<Vec<_>>>()
                        .with_context(|| at(key))?,
                ),
                other => other.clone(),
            };
            resource = resource.with_attr(key, value);
        }

        for target in &self.requires {
            let target = substitute(target, bindings).with_context(|| at("requires"))?;
            resource = resource.with_requires(ResourceId::parse(&target)?);
        }
        for notify in &self.notifies {
            let target = substitute(&notify.target, bindings).with_context(|| at("notifies"))?;
            resource = resource.with_notify(ResourceId::parse(&target)?, notify.action);
        }
        if let Some(secs) = self.timeout {
            resource = resource.with_timeout(Duration::from_secs(secs));
        }
        Ok(resource)
    }
}

/// Parse CLI `--bind KEY=VALUE` overrides.
pub fn parse_binds(binds: &[String]) -> Result<Vec<(String, String)>> {
    binds
        .iter()
        .map(|bind| match bind.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => bail!("Invalid --bind '{bind}': expected KEY=VALUE"),
        })
        .collect()
}

/// Locate the recipe file: explicit argument, `./recipe.toml`, then the
/// config directory.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let local = PathBuf::from("recipe.toml");
    if local.exists() {
        log::debug!("Using recipe from current directory");
        return Ok(local);
    }

    let fallback = crate::paths::config_dir()?.join("recipe.toml");
    if fallback.exists() {
        log::debug!("Using recipe from config dir: {}", fallback.display());
        return Ok(fallback);
    }

    bail!("No recipe found: pass a path, or create ./recipe.toml")
}
