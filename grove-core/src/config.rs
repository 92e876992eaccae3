//! The on-disk shape of `grove.toml`.
//!
//! ```toml
//! site_name = "My Blog"
//! site_description = "Notes and posts"
//!
//! [templates]
//! Post = "/:title"
//! Tag = "/tag/:id"
//!
//! [[plugins]]
//! use = "source-filesystem"
//! options = { type_name = "Post", path = "content/posts/*.md", refs = { tags = { type_name = "Tag", create = true } } }
//!
//! [transformers.markdown]
//! plugins = ["highlight"]
//! ```
//!
//! These types only mirror the file. [`crate::Descriptor`] resolves and
//! validates them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default descriptor file name, looked up in the project root.
pub const DESCRIPTOR_FILE: &str = "grove.toml";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawDescriptor {
    pub site_name: String,
    #[serde(default)]
    pub site_description: String,
    #[serde(default)]
    pub site_url: Option<String>,
    #[serde(default)]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub templates: RawTemplates,
    #[serde(default)]
    pub plugins: Vec<RawPlugin>,
    #[serde(default)]
    pub transformers: BTreeMap<String, toml::Value>,
}

impl RawDescriptor {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(data)?)
    }
}

/// Templates as a `type → path` table, or as a list of rules.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawTemplates {
    Map(BTreeMap<String, RawTemplateValue>),
    List(Vec<RawTemplateRule>),
}

impl Default for RawTemplates {
    fn default() -> Self {
        RawTemplates::Map(BTreeMap::new())
    }
}

impl RawTemplates {
    /// Every rule as `(type_name, path, component)`. Table entries come back
    /// sorted by type name, list entries in declaration order.
    pub fn entries(&self) -> Vec<(String, String, Option<String>)> {
        match self {
            RawTemplates::Map(map) => map
                .iter()
                .map(|(type_name, value)| match value {
                    RawTemplateValue::Path(path) => (type_name.clone(), path.clone(), None),
                    RawTemplateValue::Detailed { path, component } => {
                        (type_name.clone(), path.clone(), component.clone())
                    }
                })
                .collect(),
            RawTemplates::List(rules) => rules
                .iter()
                .map(|rule| (rule.type_name.clone(), rule.path.clone(), rule.component.clone()))
                .collect(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawTemplateValue {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        component: Option<String>,
    },
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawTemplateRule {
    pub type_name: String,
    pub path: String,
    #[serde(default)]
    pub component: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawPlugin {
    #[serde(rename = "use")]
    pub id: String,
    #[serde(default)]
    pub options: toml::Table,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_both_template_forms() {
        let map = RawDescriptor::parse(
            "site_name = \"x\"\n[templates]\nPost = \"/:title\"\nTag = { path = \"/tag/:id\", component = \"Tags.html\" }\n",
        )
        .unwrap();
        assert_eq!(
            map.templates.entries(),
            vec![
                ("Post".into(), "/:title".into(), None),
                ("Tag".into(), "/tag/:id".into(), Some("Tags.html".into())),
            ]
        );

        let list = RawDescriptor::parse(
            "site_name = \"x\"\n[[templates]]\ntype_name = \"Post\"\npath = \"/:title\"\n",
        )
        .unwrap();
        assert_eq!(list.templates.entries().len(), 1);
    }

    #[test]
    fn test_unknown_top_level_key_is_rejected() {
        let err = RawDescriptor::parse("site_name = \"x\"\ntemplate = {}\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_site_name_is_required() {
        assert!(RawDescriptor::parse("site_description = \"x\"\n").is_err());
    }

    #[test]
    fn test_read_reports_path() {
        let err = RawDescriptor::read("/definitely/not/here/grove.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here/grove.toml"));
    }
}
