//! Template rendering - turns a template file plus node bindings into
//! file content.
//!
//! The engine never renders anything itself; the template provider holds a
//! boxed [`Render`] and treats its output as opaque bytes.

use anyhow::{Context, Result, bail};
use converge::Bindings;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Renders a template file against node bindings.
pub trait Render: Send + Sync {
    /// Render `template` to bytes using `bindings`.
    fn render(&self, template: &Path, bindings: &Bindings) -> Result<Vec<u8>>;
}

/// Default renderer: substitutes `{{ name }}` placeholders from bindings.
///
/// A placeholder naming an unknown binding fails the render instead of
/// expanding to the empty string.
#[derive(Debug, Default, Clone, Copy)]
pub struct VarRenderer;

impl Render for VarRenderer {
    fn render(&self, template: &Path, bindings: &Bindings) -> Result<Vec<u8>> {
        let content = fs::read_to_string(template)
            .with_context(|| format!("Failed to read template: {}", template.display()))?;
        let rendered = substitute(&content, bindings)
            .with_context(|| format!("Failed to render template: {}", template.display()))?;
        Ok(rendered.into_bytes())
    }
}

/// Replace `{{ name }}` placeholders in `text` from `bindings`.
pub fn substitute(text: &str, bindings: &Bindings) -> Result<String> {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap()
    });

    for caps in re.captures_iter(text) {
        let name = &caps[1];
        if bindings.get(name).is_none() {
            bail!("unknown binding '{name}'");
        }
    }

    let rendered = re.replace_all(text, |caps: &regex::Captures| {
        bindings.get(&caps[1]).unwrap_or_default().to_string()
    });
    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn bindings(pairs: &[(&str, &str)]) -> Bindings {
        let mut b = Bindings::new();
        for (k, v) in pairs {
            b.set(*k, *v);
        }
        b
    }

    #[test]
    fn test_substitute_basic() {
        let b = bindings(&[("domain", "cache.example.net")]);
        assert_eq!(
            substitute("backend {{domain}};", &b).unwrap(),
            "backend cache.example.net;"
        );
    }

    #[test]
    fn test_substitute_tolerates_inner_whitespace() {
        let b = bindings(&[("port", "6081")]);
        assert_eq!(substitute("listen {{ port }}", &b).unwrap(), "listen 6081");
        assert_eq!(substitute("listen {{  port  }}", &b).unwrap(), "listen 6081");
    }

    #[test]
    fn test_substitute_repeated_placeholder() {
        let b = bindings(&[("name", "varnish")]);
        assert_eq!(
            substitute("{{name}} and {{name}} again", &b).unwrap(),
            "varnish and varnish again"
        );
    }

    #[test]
    fn test_unknown_binding_fails_by_name() {
        let b = bindings(&[("domain", "x")]);
        let err = substitute("{{domain}} {{missing}}", &b).unwrap_err();
        assert!(err.to_string().contains("unknown binding 'missing'"));
    }

    #[test]
    fn test_text_without_placeholders_passes_through() {
        let b = Bindings::new();
        let text = "plain text, no placeholders, even { braces }";
        assert_eq!(substitute(text, &b).unwrap(), text);
    }

    #[test]
    fn test_var_renderer_renders_file() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("default.vcl.tmpl");
        let mut file = fs::File::create(&template).unwrap();
        writeln!(file, "backend default {{{{ backend_host }}}}").unwrap();

        let b = bindings(&[("backend_host", "127.0.0.1")]);
        let rendered = VarRenderer.render(&template, &b).unwrap();
        assert_eq!(
            String::from_utf8(rendered).unwrap(),
            "backend default 127.0.0.1\n"
        );
    }

    #[test]
    fn test_var_renderer_missing_template() {
        let err = VarRenderer
            .render(Path::new("/nonexistent/t.tmpl"), &Bindings::new())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read template"));
    }
}
