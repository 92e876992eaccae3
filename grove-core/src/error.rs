//! Error types for descriptor loading and site builds.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Broad category of a failure, used by the CLI to report what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    /// Malformed descriptor shape.
    Schema,
    /// A template or reference rule points at a type or field that does not exist.
    Reference,
    /// A declared plugin or transformer cannot be located.
    PluginResolution,
    /// Content that cannot be ingested (front matter, reference values).
    Content,
    Render,
}

/// Errors raised while loading and resolving a descriptor.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("descriptor parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid descriptor: {0}")]
    Schema(String),

    #[error("invalid template `{template}` for `{type_name}`: {reason}")]
    InvalidTemplate {
        type_name: String,
        template: String,
        reason: String,
    },

    #[error("content type `{0}` has more than one template")]
    DuplicateTemplate(String),

    #[error("template for `{0}` does not match any content type declared by a source or reference")]
    UnknownContentType(String),

    #[error("template `{template}` for `{type_name}` references unknown field `{field}`")]
    UnknownTemplateField {
        type_name: String,
        template: String,
        field: String,
    },

    #[error(
        "reference `{field}` targets `{type_name}`, which no source declares (set `create = true` to build it from values)"
    )]
    UnknownReferenceType { field: String, type_name: String },

    #[error("plugin #{index} `{id}` is not a known plugin (known: {known})")]
    UnknownPlugin {
        index: usize,
        id: String,
        known: String,
    },

    #[error("invalid options for plugin `{id}`: {source}")]
    PluginOptions {
        id: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid options for plugin `{id}`: {reason}")]
    InvalidPluginOptions { id: String, reason: String },

    #[error("`{0}` is not a known transformer")]
    UnknownTransformer(String),

    #[error("`{0}` is not a known markdown plugin")]
    UnknownMarkdownPlugin(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Io(..) => ErrorKind::Io,
            ConfigError::Toml(_)
            | ConfigError::Schema(_)
            | ConfigError::InvalidTemplate { .. }
            | ConfigError::PluginOptions { .. }
            | ConfigError::InvalidPluginOptions { .. } => ErrorKind::Schema,
            ConfigError::DuplicateTemplate(_)
            | ConfigError::UnknownContentType(_)
            | ConfigError::UnknownTemplateField { .. }
            | ConfigError::UnknownReferenceType { .. } => ErrorKind::Reference,
            ConfigError::UnknownPlugin { .. }
            | ConfigError::UnknownTransformer(_)
            | ConfigError::UnknownMarkdownPlugin(_) => ErrorKind::PluginResolution,
        }
    }
}

/// One reference value that matched no node in its target collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingReference {
    pub type_name: String,
    pub id: String,
    pub field: String,
    pub target: String,
    pub value: String,
}

impl fmt::Display for MissingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` node `{}`: `{}` refers to missing `{}` `{}`",
            self.type_name, self.id, self.field, self.target, self.value
        )
    }
}

/// Every unresolved reference found in a build, one entry per occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceErrors(pub Vec<MissingReference>);

impl fmt::Display for ReferenceErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unresolved reference(s)", self.0.len())?;
        for missing in &self.0 {
            write!(f, "\n  - {missing}")?;
        }
        Ok(())
    }
}

/// Errors raised while ingesting content and emitting the site.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error at `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to scan `{0}`")]
    Scan(PathBuf, #[source] walkdir::Error),

    #[error("no transformer handles `{0}`")]
    NoTransformer(PathBuf),

    #[error("invalid front matter in `{0}`")]
    FrontMatter(PathBuf, #[source] serde_yaml::Error),

    #[error("duplicate `{type_name}` node with id `{id}`")]
    DuplicateNode { type_name: String, id: String },

    #[error("`{type_name}` node `{id}` has no field `{field}` required by template `{template}`")]
    MissingField {
        type_name: String,
        id: String,
        field: String,
        template: String,
    },

    #[error("`{type_name}` node `{id}`: field `{field}` cannot be used in template `{template}`")]
    UnusableField {
        type_name: String,
        id: String,
        field: String,
        template: String,
    },

    #[error("`{type_name}` node `{id}`: field `{field}` cannot be used as a reference")]
    InvalidReference {
        type_name: String,
        id: String,
        field: String,
    },

    #[error("{0}")]
    References(ReferenceErrors),

    #[error("`{first}` and `{second}` both resolve to `{path}`")]
    PathConflict {
        path: String,
        first: String,
        second: String,
    },

    #[error("template error")]
    Template(#[from] tera::Error),
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::Config(e) => e.kind(),
            BuildError::Io(..) | BuildError::Scan(..) => ErrorKind::Io,
            BuildError::NoTransformer(_) => ErrorKind::PluginResolution,
            BuildError::FrontMatter(..)
            | BuildError::DuplicateNode { .. }
            | BuildError::InvalidReference { .. }
            | BuildError::PathConflict { .. } => ErrorKind::Content,
            BuildError::MissingField { .. }
            | BuildError::UnusableField { .. }
            | BuildError::References(_) => ErrorKind::Reference,
            BuildError::Template(_) => ErrorKind::Render,
        }
    }
}
