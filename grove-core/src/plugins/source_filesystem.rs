use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Source, SourceContext};
use crate::error::{BuildError, ConfigError};
use crate::scanner::GlobScanner;
use crate::store::{ContentStore, Node};

/// Options for `source-filesystem`: one content type read from files
/// matching a glob.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceFilesystemOptions {
    pub type_name: String,
    /// Glob relative to the project root, e.g. `content/posts/*.md`.
    pub path: String,
    #[serde(default)]
    pub refs: BTreeMap<String, RefRule>,
}

/// Materialize a field's values into nodes of another collection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RefRule {
    pub type_name: String,
    #[serde(default)]
    pub create: bool,
}

impl SourceFilesystemOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.type_name.trim().is_empty() {
            return Err("`type_name` must not be empty".into());
        }
        if self.path.trim().is_empty() {
            return Err("`path` must not be empty".into());
        }
        GlobScanner::new(".", &self.path).map_err(|e| format!("invalid `path` glob: {e}"))?;
        for (field, rule) in &self.refs {
            if rule.type_name.trim().is_empty() {
                return Err(format!("`refs.{field}.type_name` must not be empty"));
            }
        }
        Ok(())
    }
}

impl Source for SourceFilesystemOptions {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn refs(&self) -> &BTreeMap<String, RefRule> {
        &self.refs
    }

    fn load(&self, ctx: &SourceContext<'_>, store: &mut ContentStore) -> Result<(), BuildError> {
        store.ensure_collection(&self.type_name);

        let scanner = GlobScanner::new(ctx.root, &self.path)
            .map_err(|e| ConfigError::Schema(e.to_string()))?;
        let files = scanner.scan()?;
        info!("{}: {} file(s) match `{}`", self.type_name, files.len(), self.path);

        for relative in files {
            let extension = relative
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let transformer = ctx
                .transformer_for_extension(&extension)
                .ok_or_else(|| BuildError::NoTransformer(relative.clone()))?;

            let absolute = ctx.root.join(&relative);
            let source = std::fs::read_to_string(&absolute)
                .map_err(|e| BuildError::Io(absolute.clone(), e))?;
            let transformed = transformer
                .transform(&source)
                .map_err(|e| BuildError::FrontMatter(relative.clone(), e))?;

            let stem = relative
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let id = match transformed.front_matter.get("id") {
                Some(Value::String(id)) if !id.is_empty() => id.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => slug::slugify(&stem),
            };
            let title = match transformed.front_matter.get("title") {
                Some(Value::String(title)) => title.clone(),
                _ => transformed.title.clone().unwrap_or_else(|| stem.clone()),
            };

            let mut node = Node::new(&self.type_name, &id);
            node.fields.extend(transformed.front_matter);
            node.fields.insert("id".to_string(), Value::String(id.clone()));
            node.fields.insert("title".to_string(), Value::String(title));
            node.content = transformed.html;
            node.file_path = Some(relative.clone());

            debug!("{} `{}` from {}", self.type_name, id, relative.display());
            store.add_node(node)?;
        }

        Ok(())
    }
}
