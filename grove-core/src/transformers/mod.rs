//! File-family transformers that turn source files into HTML plus fields.

pub mod markdown;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::frontmatter;

pub use markdown::{MarkdownOptions, MarkdownPlugin};

/// Output of transforming one source file.
#[derive(Debug, Clone, Default)]
pub struct Transformed {
    pub front_matter: BTreeMap<String, Value>,
    pub html: String,
    /// Text of the first top-level heading, if any.
    pub title: Option<String>,
}

/// Resolved options for one transformer, tagged by family name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "family", content = "options", rename_all = "lowercase")]
pub enum TransformerConfig {
    Markdown(MarkdownOptions),
}

/// The transformer in `transformers` that handles files ending in `extension`.
pub fn for_extension<'a>(
    transformers: &'a BTreeMap<String, TransformerConfig>,
    extension: &str,
) -> Option<&'a TransformerConfig> {
    transformers
        .values()
        .find(|t| t.extensions().contains(&extension))
}

impl TransformerConfig {
    pub const MARKDOWN: &'static str = "markdown";

    pub fn default_markdown() -> Self {
        TransformerConfig::Markdown(MarkdownOptions::default())
    }

    /// Resolve a `[transformers.<family>]` entry.
    pub fn resolve(family: &str, value: toml::Value) -> Result<Self, ConfigError> {
        match family {
            Self::MARKDOWN => Ok(TransformerConfig::Markdown(MarkdownOptions::resolve(value)?)),
            other => Err(ConfigError::UnknownTransformer(other.to_string())),
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            TransformerConfig::Markdown(_) => &["md", "markdown"],
        }
    }

    pub fn transform(&self, source: &str) -> Result<Transformed, serde_yaml::Error> {
        let (front_matter, body) = frontmatter::split(source)?;
        match self {
            TransformerConfig::Markdown(options) => {
                let rendered = options.render(body);
                Ok(Transformed {
                    front_matter,
                    html: rendered.html,
                    title: rendered.title,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_unknown_family() {
        let err = TransformerConfig::resolve("asciidoc", toml::Value::Table(Default::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PluginResolution);
    }

    #[test]
    fn test_for_extension() {
        let mut transformers = BTreeMap::new();
        transformers.insert(
            TransformerConfig::MARKDOWN.to_string(),
            TransformerConfig::default_markdown(),
        );
        assert!(for_extension(&transformers, "md").is_some());
        assert!(for_extension(&transformers, "markdown").is_some());
        assert!(for_extension(&transformers, "txt").is_none());
    }

    #[test]
    fn test_transform_splits_front_matter() {
        let out = TransformerConfig::default_markdown()
            .transform("---\ntitle: Hi\n---\n# Heading\n\nText\n")
            .unwrap();
        assert_eq!(out.front_matter["title"], "Hi");
        assert_eq!(out.title.as_deref(), Some("Heading"));
        assert!(out.html.contains("<p>Text</p>"));
    }
}
