pub mod builder;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod frontmatter;
pub mod plugins;
pub mod route;
pub mod scanner;
pub mod store;
pub mod template;
pub mod transformers;

// Re-export main types
pub use builder::{NodeLink, RenderReport, Site, SiteBuilder, build_site};
pub use config::DESCRIPTOR_FILE;
pub use descriptor::{Descriptor, PluginDeclaration, SiteMetadata, TemplateRule};
pub use error::{BuildError, ConfigError, ErrorKind};
pub use plugins::{BuildMode, PageContext, PageHook, PluginConfig, PluginRegistry};
pub use store::{Collection, ContentStore, Node, NodeRef};
