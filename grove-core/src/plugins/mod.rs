//! Built-in plugins and the registry that resolves plugin identifiers.
//!
//! Each plugin owns its option schema. A declaration's `options` table is
//! handed to the plugin's parser only after its identifier resolves, so an
//! unknown identifier is reported as such rather than as a shape error.

pub mod fathom;
pub mod source_filesystem;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{BuildError, ConfigError};
use crate::store::ContentStore;
use crate::transformers::{self, TransformerConfig};

pub use fathom::FathomOptions;
pub use source_filesystem::{RefRule, SourceFilesystemOptions};

/// Whether pages are emitted for deployment or for local development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Production,
    Development,
}

/// What a source plugin sees while loading content.
pub struct SourceContext<'a> {
    pub root: &'a Path,
    pub transformers: &'a BTreeMap<String, TransformerConfig>,
}

impl SourceContext<'_> {
    pub fn transformer_for_extension(&self, extension: &str) -> Option<&TransformerConfig> {
        transformers::for_extension(self.transformers, extension)
    }
}

/// A plugin that adds nodes to the content store.
pub trait Source {
    fn type_name(&self) -> &str;

    fn refs(&self) -> &BTreeMap<String, RefRule>;

    fn load(&self, ctx: &SourceContext<'_>, store: &mut ContentStore) -> Result<(), BuildError>;
}

/// What a page hook knows about the page it is processing.
pub struct PageContext<'a> {
    pub path: &'a str,
    pub mode: BuildMode,
}

/// A plugin that rewrites every emitted HTML page.
pub trait PageHook: Send + Sync {
    fn process(&self, html: String, page: &PageContext<'_>) -> String;
}

/// Options of a resolved plugin, tagged by plugin identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "use", content = "options")]
pub enum PluginConfig {
    #[serde(rename = "source-filesystem")]
    SourceFilesystem(SourceFilesystemOptions),
    #[serde(rename = "fathom")]
    Fathom(FathomOptions),
}

impl PluginConfig {
    pub fn as_source(&self) -> Option<&dyn Source> {
        match self {
            PluginConfig::SourceFilesystem(options) => Some(options),
            PluginConfig::Fathom(_) => None,
        }
    }

    pub fn as_page_hook(&self) -> Option<&dyn PageHook> {
        match self {
            PluginConfig::Fathom(options) => Some(options),
            PluginConfig::SourceFilesystem(_) => None,
        }
    }
}

type PluginParser = fn(toml::Value) -> Result<PluginConfig, PluginOptionsError>;

/// Why a plugin refused its options.
pub enum PluginOptionsError {
    Shape(toml::de::Error),
    Invalid(String),
}

impl From<toml::de::Error> for PluginOptionsError {
    fn from(err: toml::de::Error) -> Self {
        PluginOptionsError::Shape(err)
    }
}

/// Maps plugin identifiers to their option parsers.
pub struct PluginRegistry {
    parsers: BTreeMap<&'static str, PluginParser>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PluginRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self {
            parsers: BTreeMap::new(),
        };
        registry.register("source-filesystem", |value| {
            let options: SourceFilesystemOptions = parse(value)?;
            options.validate().map_err(PluginOptionsError::Invalid)?;
            Ok(PluginConfig::SourceFilesystem(options))
        });
        registry.register("fathom", |value| {
            let options: FathomOptions = parse(value)?;
            options.validate().map_err(PluginOptionsError::Invalid)?;
            Ok(PluginConfig::Fathom(options))
        });
        registry
    }

    pub fn register(&mut self, id: &'static str, parser: PluginParser) {
        self.parsers.insert(id, parser);
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.parsers.keys().copied()
    }

    pub fn resolve(
        &self,
        index: usize,
        id: &str,
        options: toml::Table,
    ) -> Result<PluginConfig, ConfigError> {
        let parser = self.parsers.get(id).ok_or_else(|| ConfigError::UnknownPlugin {
            index,
            id: id.to_string(),
            known: self.identifiers().collect::<Vec<_>>().join(", "),
        })?;

        parser(toml::Value::Table(options)).map_err(|err| match err {
            PluginOptionsError::Shape(source) => ConfigError::PluginOptions {
                id: id.to_string(),
                source,
            },
            PluginOptionsError::Invalid(reason) => ConfigError::InvalidPluginOptions {
                id: id.to_string(),
                reason,
            },
        })
    }
}

fn parse<T: DeserializeOwned>(value: toml::Value) -> Result<T, toml::de::Error> {
    value.try_into()
}
