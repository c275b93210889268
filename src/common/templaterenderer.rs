//! templaterenderer.rs -- bind the query payload into the reply page.
//!
//! The template is loaded once at startup and is read-only after that.
//! HTML escaping belongs to this stage: the payload arrives raw and the
//! template engine escapes it as it is bound, with `escape_html`.
//
use crate::error::EdictError;
use crate::sanitize::escape_html;
use anyhow::{Error, anyhow};
use handlebars::Handlebars;
use serde::Serialize;
use std::path::Path;

/// The one placeholder in the reply template: `{{device}}`.
pub const PAYLOAD_PLACEHOLDER: &str = "device";

/// Registered template name
const TEMPLATE_NAME: &str = "reply";

/// Data bound into the template. Field name is the placeholder name.
#[derive(Serialize)]
struct ReplyData<'a> {
    device: &'a str,
}

/// Holds the compiled reply template.
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
}

impl TemplateRenderer {
    /// Compile a template from its source text.
    ///
    /// A probe render checks that the placeholder is there and is escaped.
    /// A template without it, or with a raw `{{{device}}}`, is refused.
    pub fn new(source: &str) -> Result<Self, Error> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(escape_html);
        handlebars
            .register_template_string(TEMPLATE_NAME, source)
            .map_err(|e| anyhow!("Reply template does not compile: {}", e))?;
        let renderer = Self { handlebars };
        const PROBE: &str = "<edict-probe>";
        let probe = renderer
            .render(PROBE)
            .map_err(|e| anyhow!("Reply template probe render failed: {}", e))?;
        if !probe.contains(&escape_html(PROBE)) || probe.contains(PROBE) {
            return Err(anyhow!(
                "Reply template must contain an escaped {{{{{}}}}} placeholder",
                PAYLOAD_PLACEHOLDER
            ));
        }
        Ok(renderer)
    }

    /// Load and compile a template file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Unable to read reply template {:?}: {}", path, e))?;
        log::info!("Loaded reply template {:?}", path);
        Self::new(&source)
    }

    /// Render the reply page for a raw payload.
    pub fn render(&self, payload: &str) -> Result<String, EdictError> {
        let data = ReplyData { device: payload };
        self.handlebars
            .render(TEMPLATE_NAME, &data)
            .map_err(|e| EdictError::Internal(anyhow!("Rendering reply template: {}", e)))
    }
}

#[test]
fn renders_and_escapes_once() {
    let renderer =
        TemplateRenderer::new("<html><body><pre>{{device}}</pre></body></html>").expect("compiles");
    let html = renderer.render("Make & model: <Acme>").unwrap();
    assert_eq!(
        html,
        "<html><body><pre>Make &amp; model: &lt;Acme&gt;</pre></body></html>"
    );
    //  Not escaped twice
    assert!(!html.contains("&amp;amp;"));
}

#[test]
fn plain_payload() {
    let renderer = TemplateRenderer::new("Result: {{device}}").expect("compiles");
    assert_eq!(renderer.render("device-info").unwrap(), "Result: device-info");
}

#[test]
fn refuses_bad_templates() {
    //  No placeholder
    assert!(TemplateRenderer::new("<html>nothing here</html>").is_err());
    //  Wrong placeholder. Strict mode fails the probe.
    assert!(TemplateRenderer::new("{{payload}}").is_err());
    //  Raw, unescaped binding
    assert!(TemplateRenderer::new("{{{device}}}").is_err());
    //  Doesn't compile
    assert!(TemplateRenderer::new("{{#if}}").is_err());
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("reply.html");
    std::fs::write(&path, "<p>{{ device }}</p>").expect("write");
    let renderer = TemplateRenderer::load(&path).expect("loads");
    assert_eq!(renderer.render("x").unwrap(), "<p>x</p>");
    assert!(TemplateRenderer::load(&dir.path().join("missing.html")).is_err());
}
