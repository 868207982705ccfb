//! Resource model - typed desired-state declarations.
//!
//! A resource is an immutable declaration: a (kind, name) identity, a
//! kind-specific attribute map, explicit ordering dependencies, and
//! notification edges. Declarations are collected into a [`Catalog`],
//! which validates each one as it is added. Declaration order within a
//! catalog matters: it is the execution order absent explicit `requires`
//! edges.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

// ============================================================================
// Kinds
// ============================================================================

/// Resource kind. Selects the provider that converges the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Package,
    AptRepository,
    Directory,
    TemplateFile,
    Service,
    Execute,
    Link,
    Archive,
}

impl ResourceKind {
    /// All kinds, in declaration-syntax order.
    pub const ALL: [Self; 8] = [
        Self::Package,
        Self::AptRepository,
        Self::Directory,
        Self::TemplateFile,
        Self::Service,
        Self::Execute,
        Self::Link,
        Self::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::AptRepository => "apt_repository",
            Self::Directory => "directory",
            Self::TemplateFile => "template_file",
            Self::Service => "service",
            Self::Execute => "execute",
            Self::Link => "link",
            Self::Archive => "archive",
        }
    }

    /// Parse the snake_case kind name used in recipes and ids.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().find(|kind| kind.as_str() == s).copied()
    }

    /// Attributes a declaration of this kind must carry.
    fn required_attrs(&self) -> &'static [&'static str] {
        match self {
            Self::AptRepository => &["uri"],
            Self::TemplateFile => &["source"],
            Self::Archive => &["source", "target_dir", "creates"],
            _ => &[],
        }
    }

    /// Attributes a declaration of this kind may carry.
    fn allowed_attrs(&self) -> &'static [&'static str] {
        match self {
            Self::Package => &["version"],
            Self::AptRepository => &["uri", "distribution", "components", "key", "keyserver"],
            Self::Directory => &["path", "mode", "owner", "group"],
            Self::TemplateFile => &["source", "path", "mode", "owner", "group"],
            Self::Service => &["enabled", "running"],
            Self::Execute => &["command", "cwd", "user", "creates"],
            Self::Link => &["to", "action"],
            Self::Archive => &["source", "target_dir", "creates"],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Identity of a resource within a run: kind plus declared name.
///
/// Displays as `kind[name]`, e.g. `service[varnish]`, which is also the
/// syntax `requires` and `notifies` targets use.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Parse `kind[name]` reference syntax.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason: String| Error::invalid_resource(s, reason);

        let (kind_str, rest) = s
            .split_once('[')
            .ok_or_else(|| invalid("expected kind[name] syntax".into()))?;
        let name = rest
            .strip_suffix(']')
            .ok_or_else(|| invalid("expected kind[name] syntax".into()))?;
        let kind = ResourceKind::parse(kind_str)
            .ok_or_else(|| invalid(format!("unknown resource kind '{kind_str}'")))?;
        if name.is_empty() {
            return Err(invalid("resource name must not be empty".into()));
        }
        Ok(Self::new(kind, name))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

// ============================================================================
// Actions and notifications
// ============================================================================

/// Notification action fired at a target resource after the apply pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Restart,
    Reload,
    Enable,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Reload => "reload",
            Self::Enable => "enable",
        }
    }

    /// Rank used when collapsing queued actions for one target; higher wins.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Restart => 3,
            Self::Reload => 2,
            Self::Enable => 1,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A declared notification edge: fire `action` at `target` once, after
/// every resource has reached a terminal state, if the declaring resource
/// changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notify {
    pub target: ResourceId,
    pub action: Action,
}

// ============================================================================
// Attribute values
// ============================================================================

/// Attribute value. Untagged so recipe scalars map directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<String>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Value type name for validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::String(_) => "string",
            Self::List(_) => "list",
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

// ============================================================================
// Resource
// ============================================================================

/// A single declared unit of desired state.
#[derive(Debug, Clone)]
pub struct Resource {
    id: ResourceId,
    attributes: BTreeMap<String, AttrValue>,
    requires: Vec<ResourceId>,
    notifies: Vec<Notify>,
    timeout: Option<Duration>,
}

impl Resource {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(kind, name),
            attributes: BTreeMap::new(),
            requires: Vec::new(),
            notifies: Vec::new(),
            timeout: None,
        }
    }

    /// Set a kind-specific attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Add an explicit ordering dependency: `target` converges first.
    pub fn with_requires(mut self, target: ResourceId) -> Self {
        self.requires.push(target);
        self
    }

    /// Add a notification edge fired if this resource changes.
    pub fn with_notify(mut self, target: ResourceId, action: Action) -> Self {
        self.notifies.push(Notify { target, action });
        self
    }

    /// Cap how long a single provider call for this resource may run.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.id.kind
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// String attribute, or `None` if absent or a different type.
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(AttrValue::as_str)
    }

    /// Bool attribute with a default for absent or mistyped values.
    pub fn attr_bool(&self, name: &str, default: bool) -> bool {
        self.attr(name).and_then(AttrValue::as_bool).unwrap_or(default)
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    pub fn requires(&self) -> &[ResourceId] {
        &self.requires
    }

    pub fn notifies(&self) -> &[Notify] {
        &self.notifies
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// One-line human description for report and plan output.
    pub fn description(&self) -> String {
        match self.kind() {
            ResourceKind::Package => match self.attr_str("version") {
                Some(version) => format!("Install package {} ({version})", self.name()),
                None => format!("Install package {}", self.name()),
            },
            ResourceKind::AptRepository => format!("Configure apt repository {}", self.name()),
            ResourceKind::Directory => format!("Ensure directory {}", self.name()),
            ResourceKind::TemplateFile => format!("Render {}", self.name()),
            ResourceKind::Service => format!("Manage service {}", self.name()),
            ResourceKind::Execute => format!("Run {}", self.name()),
            ResourceKind::Link => {
                if self.attr_str("action") == Some("delete") {
                    format!("Remove link {}", self.name())
                } else {
                    format!("Link {}", self.name())
                }
            }
            ResourceKind::Archive => format!("Extract archive {}", self.name()),
        }
    }

    /// Validate the declaration in isolation: non-empty name, required
    /// attributes present, no attributes the kind does not understand.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::invalid_resource(&self.id, reason);

        if self.name().is_empty() {
            return Err(invalid("resource name must not be empty".into()));
        }
        for attr in self.kind().required_attrs() {
            if !self.attributes.contains_key(*attr) {
                return Err(invalid(format!("missing required attribute '{attr}'")));
            }
        }
        for (attr, value) in &self.attributes {
            if !self.kind().allowed_attrs().contains(&attr.as_str()) {
                return Err(invalid(format!(
                    "unknown attribute '{attr}' for kind '{}'",
                    self.kind()
                )));
            }
            let (wanted, ok) = match attr.as_str() {
                "enabled" | "running" => ("a boolean", value.as_bool().is_some()),
                "components" => ("a list of strings", value.as_list().is_some()),
                _ => ("a string", value.as_str().is_some()),
            };
            if !ok {
                return Err(invalid(format!(
                    "attribute '{attr}' must be {wanted}, got {}",
                    value.type_name()
                )));
            }
        }
        // A link needs somewhere to point unless it is being removed
        if self.kind() == ResourceKind::Link
            && self.attr_str("action") != Some("delete")
            && self.attr_str("to").is_none()
        {
            return Err(invalid(
                "missing required attribute 'to' (only 'action = \"delete\"' may omit it)".into(),
            ));
        }
        // A keyserver fetch has nothing to request without the key id
        if self.kind() == ResourceKind::AptRepository
            && self.attr_str("keyserver").is_some()
            && self.attr_str("key").is_none()
        {
            return Err(invalid(
                "missing required attribute 'key' ('keyserver' needs a key id to fetch)".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Ordered collection of validated declarations for one run.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    resources: Vec<Resource>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a declaration. Sequence of `declare` calls is
    /// the declaration order the engine falls back to.
    pub fn declare(&mut self, resource: Resource) -> Result<()> {
        resource.validate()?;
        if self.index_of(resource.id()).is_some() {
            return Err(Error::invalid_resource(
                resource.id(),
                "duplicate resource id",
            ));
        }
        self.resources.push(resource);
        Ok(())
    }

    /// Build a catalog from an ordered list of declarations.
    pub fn from_resources(resources: impl IntoIterator<Item = Resource>) -> Result<Self> {
        let mut catalog = Self::new();
        for resource in resources {
            catalog.declare(resource)?;
        }
        Ok(catalog)
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index_of(id).map(|i| &self.resources[i])
    }

    /// Declaration index of `id`, if declared.
    pub fn index_of(&self, id: &ResourceId) -> Option<usize> {
        self.resources.iter().position(|r| r.id() == id)
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_parse_round_trip() {
        let id = ResourceId::new(ResourceKind::Service, "varnish");
        assert_eq!(id.to_string(), "service[varnish]");
        assert_eq!(ResourceId::parse("service[varnish]").unwrap(), id);
    }

    #[test]
    fn test_id_parse_rejects_bad_syntax() {
        assert!(ResourceId::parse("varnish").is_err());
        assert!(ResourceId::parse("service[varnish").is_err());
        assert!(ResourceId::parse("service[]").is_err());

        let err = ResourceId::parse("cron[daily]").unwrap_err();
        assert!(err.to_string().contains("unknown resource kind 'cron'"));
    }

    #[test]
    fn test_kind_parse_matches_display() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceKind::parse("cron"), None);
    }

    #[test]
    fn test_action_priority_ordering() {
        assert!(Action::Restart.priority() > Action::Reload.priority());
        assert!(Action::Reload.priority() > Action::Enable.priority());
    }

    #[test]
    fn test_template_requires_source() {
        let resource = Resource::new(ResourceKind::TemplateFile, "/etc/motd");
        let err = resource.validate().unwrap_err();
        assert!(err.to_string().contains("missing required attribute 'source'"));

        let resource = Resource::new(ResourceKind::TemplateFile, "/etc/motd")
            .with_attr("source", "templates/motd.tmpl");
        assert!(resource.validate().is_ok());
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let resource = Resource::new(ResourceKind::Package, "curl").with_attr("verzion", "1.0");
        let err = resource.validate().unwrap_err();
        assert!(err.to_string().contains("unknown attribute 'verzion'"));
    }

    #[test]
    fn test_wrong_attribute_type_rejected() {
        let service = Resource::new(ResourceKind::Service, "nginx").with_attr("enabled", "yes");
        let err = service.validate().unwrap_err();
        assert!(err.to_string().contains("'enabled' must be a boolean, got string"));

        let dir =
            Resource::new(ResourceKind::Directory, "/var/cache/app").with_attr("mode", 644_i64);
        let err = dir.validate().unwrap_err();
        assert!(err.to_string().contains("'mode' must be a string, got integer"));

        let repo = Resource::new(ResourceKind::AptRepository, "pgdg")
            .with_attr("uri", "http://apt.postgresql.org/pub/repos/apt")
            .with_attr("components", "main");
        let err = repo.validate().unwrap_err();
        assert!(err.to_string().contains("'components' must be a list of strings"));
    }

    #[test]
    fn test_link_requires_target_unless_deleting() {
        let link = Resource::new(ResourceKind::Link, "/usr/local/bin/tool");
        assert!(link.validate().is_err());

        let link = Resource::new(ResourceKind::Link, "/usr/local/bin/tool")
            .with_attr("to", "/opt/tool/bin/tool");
        assert!(link.validate().is_ok());

        let link =
            Resource::new(ResourceKind::Link, "/usr/local/bin/tool").with_attr("action", "delete");
        assert!(link.validate().is_ok());
    }

    #[test]
    fn test_keyserver_requires_key_id() {
        let repo = Resource::new(ResourceKind::AptRepository, "pgdg")
            .with_attr("uri", "http://apt.postgresql.org/pub/repos/apt")
            .with_attr("keyserver", "hkp://keyserver.ubuntu.com");
        let err = repo.validate().unwrap_err();
        assert!(err.to_string().contains("missing required attribute 'key'"));

        let repo = repo.with_attr("key", "ACCC4CF8");
        assert!(repo.validate().is_ok());
    }

    #[test]
    fn test_catalog_rejects_duplicate_ids() {
        let mut catalog = Catalog::new();
        catalog
            .declare(Resource::new(ResourceKind::Package, "curl"))
            .unwrap();
        let err = catalog
            .declare(Resource::new(ResourceKind::Package, "curl").with_attr("version", "8.5"))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate resource id"));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_catalog_preserves_declaration_order() {
        let catalog = Catalog::from_resources([
            Resource::new(ResourceKind::Package, "varnish"),
            Resource::new(ResourceKind::Directory, "/var/cache/app"),
            Resource::new(ResourceKind::Service, "varnish"),
        ])
        .unwrap();

        let names: Vec<_> = catalog.resources().iter().map(Resource::name).collect();
        assert_eq!(names, ["varnish", "/var/cache/app", "varnish"]);
        assert_eq!(
            catalog.index_of(&ResourceId::new(ResourceKind::Service, "varnish")),
            Some(2)
        );
    }

    #[test]
    fn test_attr_accessors() {
        let resource = Resource::new(ResourceKind::Service, "nginx")
            .with_attr("enabled", false)
            .with_attr("running", true);
        assert!(!resource.attr_bool("enabled", true));
        assert!(resource.attr_bool("running", false));
        // Absent attribute falls back to the default
        assert!(resource.attr_bool("missing", true));
        assert_eq!(resource.attr_str("enabled"), None);
    }
}
