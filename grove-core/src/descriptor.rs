//! The resolved, validated site descriptor.
//!
//! Resolution is all-or-nothing: any unknown plugin, malformed template, or
//! dangling reference fails the whole load and no descriptor is returned.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use log::debug;
use serde::Serialize;

use crate::config::{RawDescriptor, RawPlugin};
use crate::error::ConfigError;
use crate::plugins::{PageHook, PluginConfig, PluginRegistry, RefRule, Source};
use crate::route::PathTemplate;
use crate::store::REFERENCE_NODE_FIELDS;
use crate::transformers::{self, TransformerConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteMetadata {
    pub name: String,
    pub description: String,
    pub url: Option<String>,
    pub path_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateRule {
    pub type_name: String,
    pub template: PathTemplate,
    /// Theme template used to emit nodes of this type.
    pub component: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginDeclaration {
    pub id: String,
    pub config: PluginConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptor {
    pub site: SiteMetadata,
    pub templates: BTreeMap<String, TemplateRule>,
    pub plugins: Vec<PluginDeclaration>,
    pub transformers: BTreeMap<String, TransformerConfig>,
}

impl Descriptor {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading descriptor {}", path.display());
        Self::resolve(RawDescriptor::read(path)?, &PluginRegistry::builtin())
    }

    pub fn from_str(data: &str) -> Result<Self, ConfigError> {
        Self::resolve(RawDescriptor::parse(data)?, &PluginRegistry::builtin())
    }

    pub fn resolve(raw: RawDescriptor, registry: &PluginRegistry) -> Result<Self, ConfigError> {
        let site = resolve_site(&raw)?;

        let plugins = raw
            .plugins
            .into_iter()
            .enumerate()
            .map(|(index, RawPlugin { id, options })| {
                let config = registry.resolve(index, &id, options)?;
                Ok(PluginDeclaration { id, config })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let mut transformers = BTreeMap::new();
        for (family, value) in raw.transformers {
            let config = TransformerConfig::resolve(&family, value)?;
            transformers.insert(family, config);
        }
        transformers
            .entry(TransformerConfig::MARKDOWN.to_string())
            .or_insert_with(TransformerConfig::default_markdown);

        let mut templates = BTreeMap::new();
        for (type_name, path, component) in raw.templates.entries() {
            if type_name.trim().is_empty() {
                return Err(ConfigError::Schema("template type name must not be empty".into()));
            }
            let template =
                PathTemplate::parse(&path).map_err(|reason| ConfigError::InvalidTemplate {
                    type_name: type_name.clone(),
                    template: path.clone(),
                    reason,
                })?;
            let component = component.unwrap_or_else(|| format!("{type_name}.html"));
            let rule = TemplateRule {
                type_name: type_name.clone(),
                template,
                component,
            };
            if templates.insert(type_name.clone(), rule).is_some() {
                return Err(ConfigError::DuplicateTemplate(type_name));
            }
        }

        let descriptor = Self {
            site,
            templates,
            plugins,
            transformers,
        };
        descriptor.check_references()?;

        Ok(descriptor)
    }

    pub fn template_for(&self, type_name: &str) -> Option<&TemplateRule> {
        self.templates.get(type_name)
    }

    pub fn plugins(&self) -> &[PluginDeclaration] {
        &self.plugins
    }

    pub fn sources(&self) -> impl Iterator<Item = &dyn Source> {
        self.plugins.iter().filter_map(|p| p.config.as_source())
    }

    pub fn page_hooks(&self) -> impl Iterator<Item = &dyn PageHook> {
        self.plugins.iter().filter_map(|p| p.config.as_page_hook())
    }

    pub fn transformer_for_extension(&self, extension: &str) -> Option<&TransformerConfig> {
        transformers::for_extension(&self.transformers, extension)
    }

    /// Every type a source or reference rule declares.
    pub fn content_types(&self) -> BTreeSet<&str> {
        let mut types = BTreeSet::new();
        for source in self.sources() {
            types.insert(source.type_name());
            for rule in source.refs().values() {
                types.insert(rule.type_name.as_str());
            }
        }
        types
    }

    fn references(&self) -> impl Iterator<Item = (&str, &RefRule)> {
        self.sources()
            .flat_map(|source| source.refs().iter().map(|(field, rule)| (field.as_str(), rule)))
    }

    fn check_references(&self) -> Result<(), ConfigError> {
        let sourced: BTreeSet<&str> = self.sources().map(|s| s.type_name()).collect();
        let created: BTreeSet<&str> = self
            .references()
            .filter(|(_, rule)| rule.create)
            .map(|(_, rule)| rule.type_name.as_str())
            .collect();

        for (field, rule) in self.references() {
            let target = rule.type_name.as_str();
            if !rule.create && !sourced.contains(target) && !created.contains(target) {
                return Err(ConfigError::UnknownReferenceType {
                    field: field.to_string(),
                    type_name: rule.type_name.clone(),
                });
            }
        }

        for (type_name, rule) in &self.templates {
            let type_name = type_name.as_str();
            if !sourced.contains(type_name) && !created.contains(type_name) {
                return Err(ConfigError::UnknownContentType(type_name.to_string()));
            }

            // Nodes built from reference values only ever carry these fields,
            // so their templates can be checked before any content is read.
            if !sourced.contains(type_name) {
                if let Some(field) = rule.template.missing_field(&REFERENCE_NODE_FIELDS) {
                    return Err(ConfigError::UnknownTemplateField {
                        type_name: type_name.to_string(),
                        template: rule.template.as_str().to_string(),
                        field: field.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn resolve_site(raw: &RawDescriptor) -> Result<SiteMetadata, ConfigError> {
    if raw.site_name.trim().is_empty() {
        return Err(ConfigError::Schema("`site_name` must not be empty".into()));
    }

    if let Some(prefix) = &raw.path_prefix {
        if !prefix.starts_with('/') || prefix.ends_with('/') {
            return Err(ConfigError::Schema(format!(
                "`path_prefix` `{prefix}` must start with `/` and not end with one"
            )));
        }
    }

    Ok(SiteMetadata {
        name: raw.site_name.clone(),
        description: raw.site_description.clone(),
        url: raw.site_url.clone(),
        path_prefix: raw.path_prefix.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const BLOG: &str = r#"
site_name = "Shivam Mishra"
site_description = "Maintainer for Frappe & Frappe Charts"

[templates]
Post = "/:title"
Tag = "/tag/:id"

[[plugins]]
use = "source-filesystem"
[plugins.options]
type_name = "Post"
path = "content/posts/*.md"
refs = { tags = { type_name = "Tag", create = true } }

[[plugins]]
use = "fathom"
[plugins.options]
site_id = "PNSYY"
tracker_url = "http://stats.shivam.dev/tracker.js"
host = "shivam.dev"
debug = false

[transformers.markdown]
external_links_target = "_blank"
external_links_rel = ["nofollow", "noopener", "noreferrer"]
anchor_class_name = "icon icon-link"
plugins = ["highlight"]
"#;

    #[test]
    fn test_resolves_blog_descriptor() {
        let descriptor = Descriptor::from_str(BLOG).unwrap();
        assert_eq!(descriptor.site.name, "Shivam Mishra");
        assert_eq!(descriptor.plugins().len(), 2);
        assert_eq!(descriptor.plugins()[0].id, "source-filesystem");
        assert_eq!(descriptor.plugins()[1].id, "fathom");
        assert_eq!(descriptor.template_for("Post").unwrap().component, "Post.html");
        assert_eq!(descriptor.content_types().into_iter().collect::<Vec<_>>(), vec!["Post", "Tag"]);
        assert!(descriptor.transformer_for_extension("md").is_some());
    }

    #[test]
    fn test_loading_twice_is_identical() {
        let first = Descriptor::from_str(BLOG).unwrap();
        let second = Descriptor::from_str(BLOG).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_markdown_transformer_defaults_when_undeclared() {
        let descriptor = Descriptor::from_str("site_name = \"x\"").unwrap();
        assert_eq!(
            descriptor.transformers.get("markdown"),
            Some(&TransformerConfig::default_markdown())
        );
    }

    #[test]
    fn test_unknown_plugin_fails_load() {
        let text = BLOG.replace("use = \"fathom\"", "use = \"fathom-analytics\"");
        let err = Descriptor::from_str(&text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PluginResolution);
        assert!(matches!(
            err,
            ConfigError::UnknownPlugin { index: 1, ref known, .. } if known == "fathom, source-filesystem"
        ));
    }

    #[test]
    fn test_unknown_nested_markdown_plugin_fails_load() {
        let text = BLOG.replace("plugins = [\"highlight\"]", "plugins = [\"prismjs\"]");
        let err = Descriptor::from_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMarkdownPlugin(_)));
    }

    #[test]
    fn test_unknown_transformer_family_fails_load() {
        let text = format!("{BLOG}\n[transformers.asciidoc]\n");
        let err = Descriptor::from_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTransformer(_)));
    }

    #[test]
    fn test_duplicate_template_fails_load() {
        let text = r#"
site_name = "x"

[[templates]]
type_name = "Post"
path = "/:title"

[[templates]]
type_name = "Post"
path = "/posts/:id"

[[plugins]]
use = "source-filesystem"
options = { type_name = "Post", path = "*.md" }
"#;
        let err = Descriptor::from_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTemplate(ref t) if t == "Post"));
        assert_eq!(err.kind(), ErrorKind::Reference);
    }

    #[test]
    fn test_template_for_undeclared_type_fails_load() {
        let text = BLOG.replace("Tag = \"/tag/:id\"", "Author = \"/author/:id\"");
        let err = Descriptor::from_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownContentType(ref t) if t == "Author"));
    }

    #[test]
    fn test_reference_type_template_checks_fields_at_load() {
        let text = BLOG.replace("Tag = \"/tag/:id\"", "Tag = \"/tag/:slug\"");
        let err = Descriptor::from_str(&text).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownTemplateField { ref field, .. } if field == "slug"
        ));
    }

    #[test]
    fn test_reference_without_create_needs_a_source() {
        let text = BLOG.replace("create = true", "create = false");
        let err = Descriptor::from_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownReferenceType { .. }));
    }

    #[test]
    fn test_malformed_template_fails_load() {
        let text = BLOG.replace("Post = \"/:title\"", "Post = \":title\"");
        let err = Descriptor::from_str(&text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_path_prefix_shape() {
        assert!(Descriptor::from_str("site_name = \"x\"\npath_prefix = \"/blog\"").is_ok());
        assert!(Descriptor::from_str("site_name = \"x\"\npath_prefix = \"blog/\"").is_err());
    }
}
