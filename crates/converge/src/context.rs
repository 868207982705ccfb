//! Run context and node bindings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node-scoped variable bindings.
///
/// Bindings parameterize a run: template rendering and attribute
/// interpolation read from them. The engine itself treats them as opaque
/// and only hands them to providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bindings(BTreeMap<String, String>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Merge `other` in; its entries win on conflict.
    pub fn merge(&mut self, other: Bindings) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for Bindings {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, String)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Context handed to every provider call in one run.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    /// Node bindings for this run
    pub bindings: &'a Bindings,
}

impl<'a> RunContext<'a> {
    pub fn new(bindings: &'a Bindings) -> Self {
        Self { bindings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_later_wins() {
        let mut bindings = Bindings::new();
        bindings.set("domain", "example.com");
        bindings.set("port", "80");

        let mut overrides = Bindings::new();
        overrides.set("port", "8080");

        bindings.merge(overrides);
        assert_eq!(bindings.get("domain"), Some("example.com"));
        assert_eq!(bindings.get("port"), Some("8080"));
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn test_from_iterator() {
        let bindings: Bindings = [("a".to_string(), "1".to_string())].into_iter().collect();
        assert_eq!(bindings.get("a"), Some("1"));
        assert_eq!(bindings.get("b"), None);
    }
}
