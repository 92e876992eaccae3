use std::path::Path;

use log::{debug, warn};
use serde::Serialize;
use tera::{Context, Tera};

use crate::error::BuildError;

/// Built-in layout used for any component the theme does not provide.
pub const FALLBACK_TEMPLATE: &str = "__grove_fallback.html";

const FALLBACK_LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{ title }} | {{ site.name }}</title>
<meta name="description" content="{{ site.description }}">
</head>
<body>
<main>
<h1>{{ title }}</h1>
{{ node.content | safe }}
{% if references %}<ul>{% for link in references %}<li><a href="{{ link.path }}">{{ link.title }}</a></li>{% endfor %}</ul>{% endif %}
{% if belongs_to %}<ul>{% for link in belongs_to %}<li><a href="{{ link.path }}">{{ link.title }}</a></li>{% endfor %}</ul>{% endif %}
</main>
</body>
</html>
"#;

/// Renders pages through the theme's tera templates.
pub struct Renderer {
    tera: Tera,
    global: Context,
}

impl Renderer {
    /// Load every `*.html` under `theme_dir`. A missing theme directory only
    /// leaves the built-in layout.
    pub fn new(theme_dir: &Path) -> Result<Self, BuildError> {
        let mut tera = if theme_dir.is_dir() {
            let pattern = format!("{}/**/*.html", theme_dir.display());
            debug!("Loading theme templates from {pattern}");
            Tera::new(&pattern)?
        } else {
            warn!(
                "Theme directory {} not found, using the built-in layout",
                theme_dir.display()
            );
            Tera::default()
        };
        tera.add_raw_template(FALLBACK_TEMPLATE, FALLBACK_LAYOUT)?;

        Ok(Self {
            tera,
            global: Context::new(),
        })
    }

    pub fn set_global_context<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        self.global.insert(key, value);
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    /// Render `template` with the global context plus `context`, using the
    /// built-in layout when the theme lacks it.
    pub fn render(&self, template: &str, context: &Context) -> Result<String, BuildError> {
        let mut merged = self.global.clone();
        merged.extend(context.clone());

        let name = if self.has_template(template) {
            template
        } else {
            warn!("Theme has no `{template}`, using the built-in layout");
            FALLBACK_TEMPLATE
        };
        Ok(self.tera.render(name, &merged)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_falls_back_without_theme() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = Renderer::new(&dir.path().join("missing")).unwrap();
        renderer.set_global_context("site", &json!({ "name": "Blog", "description": "" }));

        let mut context = Context::new();
        context.insert("title", "Hello");
        context.insert("node", &json!({ "content": "<p>Body</p>" }));

        let html = renderer.render("Post.html", &context).unwrap();
        assert!(html.contains("<title>Hello | Blog</title>"));
        assert!(html.contains("<p>Body</p>"));
    }

    #[test]
    fn test_uses_theme_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Post.html"), "post: {{ title }}").unwrap();

        let renderer = Renderer::new(dir.path()).unwrap();
        assert!(renderer.has_template("Post.html"));

        let mut context = Context::new();
        context.insert("title", "Hello");
        assert_eq!(renderer.render("Post.html", &context).unwrap(), "post: Hello");
    }
}
