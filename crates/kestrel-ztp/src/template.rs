//! Template environment setup
//!
//! Templates are plain files in a directory; the set loads them by name on
//! demand. Auto-escaping is pinned to `None` for every template: the output
//! here is dhcpd configuration, shell and python source, and HTML entities in
//! any of those would break the consuming device.

use crate::error::Result;
use minijinja::{path_loader, AutoEscape, Environment};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A directory-backed set of artifact templates.
pub struct TemplateSet {
    env: Environment<'static>,
}

impl TemplateSet {
    /// Load templates from the given directory.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(dir.as_ref().to_path_buf()));
        env.set_auto_escape_callback(|_name| AutoEscape::None);
        Self { env }
    }

    /// Render one template by file name.
    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String> {
        Ok(self.env.get_template(name)?.render(ctx)?)
    }
}

/// Directory containing the templates bundled with this crate.
///
/// Deployments normally override this with their own template directory; the
/// bundled set is the default and what the tests render against.
pub fn bundled_templates_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("templates")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Quoted {
        server_url: String,
        config_url: String,
    }

    #[test]
    fn test_rendering_never_escapes_quotes() {
        let templates = TemplateSet::from_dir(bundled_templates_dir());
        let out = templates
            .render(
                crate::script::XR_SCRIPT_TEMPLATE,
                &Quoted {
                    server_url: "http://192.0.2.1:8080".to_string(),
                    config_url: "/configs/say \"hi\".conf".to_string(),
                },
            )
            .unwrap();

        assert!(out.contains("SERVER_URL=\"http://192.0.2.1:8080\""));
        assert!(out.contains("say \"hi\""));
        assert!(!out.contains("&#34;"));
        assert!(!out.contains("&quot;"));
    }

    #[test]
    fn test_missing_template_is_an_error() {
        let templates = TemplateSet::from_dir(bundled_templates_dir());
        assert!(templates.render("no-such-template", ()).is_err());
    }
}
