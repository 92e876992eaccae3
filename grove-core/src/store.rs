use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::descriptor::TemplateRule;
use crate::error::{BuildError, MissingReference, ReferenceErrors};
use crate::plugins::RefRule;
use crate::route::PlaceholderError;

/// Fields every node created from a reference value carries.
pub const REFERENCE_NODE_FIELDS: [&str; 2] = ["id", "title"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRef {
    pub type_name: String,
    pub id: String,
}

/// A single content entity, such as one blog post or one tag.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
    /// Rendered HTML body; empty for nodes created from reference values.
    pub content: String,
    pub file_path: Option<PathBuf>,
    /// Resolved URL, set once templates are applied.
    pub path: Option<String>,
    /// Reference fields on this node, resolved to their targets.
    pub references: BTreeMap<String, Vec<NodeRef>>,
    /// Nodes that reference this one.
    pub belongs_to: Vec<NodeRef>,
}

impl Node {
    pub fn new(type_name: &str, id: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), Value::String(id.to_string()));
        Self {
            id: id.to_string(),
            type_name: type_name.to_string(),
            fields,
            content: String::new(),
            file_path: None,
            path: None,
            references: BTreeMap::new(),
            belongs_to: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn title(&self) -> &str {
        self.fields
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef {
            type_name: self.type_name.clone(),
            id: self.id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub type_name: String,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl Collection {
    fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, node: Node) -> Result<usize, BuildError> {
        if self.index.contains_key(&node.id) {
            return Err(BuildError::DuplicateNode {
                type_name: self.type_name.clone(),
                id: node.id,
            });
        }
        let position = self.nodes.len();
        self.index.insert(node.id.clone(), position);
        self.nodes.push(node);
        Ok(position)
    }
}

/// All collections ingested during a build, keyed by type name.
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    collections: BTreeMap<String, Collection>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_collection(&mut self, type_name: &str) -> &mut Collection {
        self.collections
            .entry(type_name.to_string())
            .or_insert_with(|| Collection::new(type_name))
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), BuildError> {
        let collection = self.ensure_collection(&node.type_name.clone());
        collection.push(node)?;
        Ok(())
    }

    pub fn collection(&self, type_name: &str) -> Option<&Collection> {
        self.collections.get(type_name)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    pub fn node(&self, node_ref: &NodeRef) -> Option<&Node> {
        self.collections
            .get(&node_ref.type_name)
            .and_then(|c| c.get(&node_ref.id))
    }

    /// Turn reference field values into links between nodes.
    ///
    /// Every `create` rule of every source runs first, so a rule without
    /// `create` sees every node that will exist regardless of declaration or
    /// field order. Misses are collected across all sources.
    pub fn materialize_refs(
        &mut self,
        sources: &[(&str, &BTreeMap<String, RefRule>)],
    ) -> Result<(), BuildError> {
        for &(source_type, rules) in sources {
            for (field, rule) in rules.iter().filter(|(_, rule)| rule.create) {
                let pending = self.reference_values(source_type, field)?;
                let target = self.ensure_collection(&rule.type_name);
                for value in pending.into_iter().flat_map(|(_, values)| values) {
                    if target.index.contains_key(&value) {
                        continue;
                    }
                    let mut node = Node::new(&rule.type_name, &value);
                    node.fields
                        .insert("title".to_string(), Value::String(value.clone()));
                    debug!("Created {} `{}`", rule.type_name, value);
                    target.push(node)?;
                }
            }
        }

        let mut missing = Vec::new();
        for &(source_type, rules) in sources {
            for (field, rule) in rules {
                self.link_field(source_type, field, rule, &mut missing)?;
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BuildError::References(ReferenceErrors(missing)))
        }
    }

    fn link_field(
        &mut self,
        source_type: &str,
        field: &str,
        rule: &RefRule,
        missing: &mut Vec<MissingReference>,
    ) -> Result<(), BuildError> {
        for (source_id, values) in self.reference_values(source_type, field)? {
            let source = NodeRef {
                type_name: source_type.to_string(),
                id: source_id,
            };
            let mut resolved = Vec::new();

            for value in values {
                let position = self
                    .collections
                    .get(&rule.type_name)
                    .and_then(|target| target.index.get(&value).copied());
                let (Some(position), Some(target)) =
                    (position, self.collections.get_mut(&rule.type_name))
                else {
                    missing.push(missing_reference(&source, field, rule, &value));
                    continue;
                };

                let target_node = &mut target.nodes[position];
                if !target_node.belongs_to.contains(&source) {
                    target_node.belongs_to.push(source.clone());
                }
                let target_ref = target_node.node_ref();
                if !resolved.contains(&target_ref) {
                    resolved.push(target_ref);
                }
            }

            if let Some(node) = self.node_mut(&source) {
                let ids = resolved.iter().map(|r| Value::String(r.id.clone())).collect();
                node.fields.insert(field.to_string(), Value::Array(ids));
                node.references.insert(field.to_string(), resolved);
            }
        }
        Ok(())
    }

    /// Apply each template to every node of its type. Fails on the first node
    /// that cannot fill a placeholder, and when two nodes land on one URL.
    pub fn resolve_paths(
        &mut self,
        templates: &BTreeMap<String, TemplateRule>,
        path_prefix: Option<&str>,
    ) -> Result<(), BuildError> {
        let mut taken: HashMap<String, String> = HashMap::new();

        for (type_name, rule) in templates {
            let Some(collection) = self.collections.get_mut(type_name) else {
                continue;
            };

            for node in &mut collection.nodes {
                let path = rule.template.render(node).map_err(|err| match err {
                    PlaceholderError::Missing(field) => BuildError::MissingField {
                        type_name: type_name.clone(),
                        id: node.id.clone(),
                        field,
                        template: rule.template.as_str().to_string(),
                    },
                    PlaceholderError::Unusable(field) => BuildError::UnusableField {
                        type_name: type_name.clone(),
                        id: node.id.clone(),
                        field,
                        template: rule.template.as_str().to_string(),
                    },
                })?;
                let path = match path_prefix {
                    Some(prefix) => format!("{prefix}{path}"),
                    None => path,
                };

                let label = format!("{} `{}`", type_name, node.id);
                if let Some(first) = taken.get(&path) {
                    return Err(BuildError::PathConflict {
                        path,
                        first: first.clone(),
                        second: label,
                    });
                }
                taken.insert(path.clone(), label);
                node.path = Some(path);
            }
        }

        Ok(())
    }

    fn node_mut(&mut self, node_ref: &NodeRef) -> Option<&mut Node> {
        let collection = self.collections.get_mut(&node_ref.type_name)?;
        let position = *collection.index.get(&node_ref.id)?;
        collection.nodes.get_mut(position)
    }

    fn reference_values(
        &self,
        source_type: &str,
        field: &str,
    ) -> Result<Vec<(String, Vec<String>)>, BuildError> {
        let Some(collection) = self.collections.get(source_type) else {
            return Ok(Vec::new());
        };

        let mut pending = Vec::new();
        for node in &collection.nodes {
            let Some(value) = node.field(field) else {
                continue;
            };
            let invalid = || BuildError::InvalidReference {
                type_name: source_type.to_string(),
                id: node.id.clone(),
                field: field.to_string(),
            };

            let mut values: Vec<String> = Vec::new();
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        let item = reference_value(item).ok_or_else(invalid)?;
                        if !values.contains(&item) {
                            values.push(item);
                        }
                    }
                }
                other => values.push(reference_value(other).ok_or_else(invalid)?),
            }
            pending.push((node.id.clone(), values));
        }

        Ok(pending)
    }
}

fn reference_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn missing_reference(source: &NodeRef, field: &str, rule: &RefRule, value: &str) -> MissingReference {
    MissingReference {
        type_name: source.type_name.clone(),
        id: source.id.clone(),
        field: field.to_string(),
        target: rule.type_name.clone(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::PathTemplate;
    use serde_json::json;

    fn post(id: &str, tags: Value) -> Node {
        let mut node = Node::new("Post", id);
        node.fields.insert("title".into(), json!(id));
        node.fields.insert("tags".into(), tags);
        node
    }

    fn tag_rule(create: bool) -> BTreeMap<String, RefRule> {
        BTreeMap::from([(
            "tags".to_string(),
            RefRule {
                type_name: "Tag".into(),
                create,
            },
        )])
    }

    fn template(type_name: &str, path: &str) -> BTreeMap<String, TemplateRule> {
        BTreeMap::from([(
            type_name.to_string(),
            TemplateRule {
                type_name: type_name.to_string(),
                template: PathTemplate::parse(path).unwrap(),
                component: format!("{type_name}.html"),
            },
        )])
    }

    #[test]
    fn test_create_builds_one_node_per_distinct_value() {
        let mut store = ContentStore::new();
        store.add_node(post("a", json!(["go", "rust"]))).unwrap();
        store.add_node(post("b", json!(["rust", "rust"]))).unwrap();
        store.add_node(post("c", json!("go"))).unwrap();

        store.materialize_refs(&[("Post", &tag_rule(true))]).unwrap();

        let tags = store.collection("Tag").unwrap();
        let ids: Vec<&str> = tags.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["go", "rust"]);
        assert_eq!(tags.get("go").unwrap().title(), "go");

        let rust = tags.get("rust").unwrap();
        let owners: Vec<&str> = rust.belongs_to.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(owners, vec!["a", "b"]);

        let b = store.collection("Post").unwrap().get("b").unwrap();
        assert_eq!(b.field("tags"), Some(&json!(["rust"])));
        assert_eq!(b.references["tags"].len(), 1);

        let c = store.collection("Post").unwrap().get("c").unwrap();
        assert_eq!(c.field("tags"), Some(&json!(["go"])));
    }

    #[test]
    fn test_missing_references_are_reported_per_occurrence() {
        let mut store = ContentStore::new();
        store.ensure_collection("Tag");
        store.add_node(Node::new("Tag", "go")).unwrap();
        store.add_node(post("a", json!(["go", "zig"]))).unwrap();
        store.add_node(post("b", json!(["zig"]))).unwrap();

        let err = store.materialize_refs(&[("Post", &tag_rule(false))]).unwrap_err();
        let BuildError::References(ReferenceErrors(missing)) = err else {
            panic!("expected reference errors, got {err:?}");
        };
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].id, "a");
        assert_eq!(missing[1].id, "b");
        assert!(missing.iter().all(|m| m.value == "zig"));
    }

    #[test]
    fn test_existing_reference_rule_sees_nodes_created_by_later_rules() {
        let mut store = ContentStore::new();
        let mut a = post("a", json!(["go"]));
        a.fields.insert("categories".into(), json!(["go"]));
        store.add_node(a).unwrap();

        // `categories` sorts before `tags`, which is the rule that creates `go`.
        let rules = BTreeMap::from([
            (
                "categories".to_string(),
                RefRule {
                    type_name: "Tag".into(),
                    create: false,
                },
            ),
            (
                "tags".to_string(),
                RefRule {
                    type_name: "Tag".into(),
                    create: true,
                },
            ),
        ]);
        store.materialize_refs(&[("Post", &rules)]).unwrap();

        let a = store.collection("Post").unwrap().get("a").unwrap();
        assert_eq!(a.field("categories"), Some(&json!(["go"])));
        assert_eq!(store.collection("Tag").unwrap().len(), 1);
    }

    #[test]
    fn test_rules_across_sources_are_order_independent() {
        let mut store = ContentStore::new();
        let mut note = Node::new("Note", "n");
        note.fields.insert("topics".into(), json!(["go"]));
        store.add_node(note).unwrap();
        store.add_node(post("a", json!(["go"]))).unwrap();

        let topics = BTreeMap::from([(
            "topics".to_string(),
            RefRule {
                type_name: "Tag".into(),
                create: false,
            },
        )]);
        let tags = tag_rule(true);
        store
            .materialize_refs(&[("Note", &topics), ("Post", &tags)])
            .unwrap();

        let go = store.collection("Tag").unwrap().get("go").unwrap();
        let owners: Vec<&str> = go.belongs_to.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(owners, vec!["n", "a"]);
    }

    #[test]
    fn test_create_reuses_sourced_nodes() {
        let mut store = ContentStore::new();
        let mut go = Node::new("Tag", "go");
        go.fields.insert("title".into(), json!("Go"));
        go.fields.insert("color".into(), json!("blue"));
        store.add_node(go).unwrap();
        store.add_node(post("a", json!(["go", "rust"]))).unwrap();

        store.materialize_refs(&[("Post", &tag_rule(true))]).unwrap();

        let tags = store.collection("Tag").unwrap();
        let ids: Vec<&str> = tags.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["go", "rust"]);

        let go = tags.get("go").unwrap();
        assert_eq!(go.title(), "Go");
        assert_eq!(go.field("color"), Some(&json!("blue")));
        assert_eq!(go.belongs_to, vec![NodeRef { type_name: "Post".into(), id: "a".into() }]);
    }

    #[test]
    fn test_object_reference_value_is_rejected() {
        let mut store = ContentStore::new();
        store.add_node(post("a", json!([{ "name": "go" }]))).unwrap();
        let err = store.materialize_refs(&[("Post", &tag_rule(true))]).unwrap_err();
        assert!(matches!(err, BuildError::InvalidReference { .. }));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut store = ContentStore::new();
        store.add_node(Node::new("Post", "a")).unwrap();
        let err = store.add_node(Node::new("Post", "a")).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateNode { .. }));
    }

    #[test]
    fn test_resolve_paths_applies_prefix() {
        let mut store = ContentStore::new();
        store.add_node(post("hello-world", json!([]))).unwrap();
        store
            .resolve_paths(&template("Post", "/:title"), Some("/blog"))
            .unwrap();
        let node = store.collection("Post").unwrap().get("hello-world").unwrap();
        assert_eq!(node.path.as_deref(), Some("/blog/hello-world"));
    }

    #[test]
    fn test_resolve_paths_rejects_missing_field() {
        let mut store = ContentStore::new();
        store.add_node(post("a", json!([]))).unwrap();
        let err = store
            .resolve_paths(&template("Post", "/:slug"), None)
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingField { ref field, .. } if field == "slug"));
    }

    #[test]
    fn test_resolve_paths_rejects_conflicts() {
        let mut store = ContentStore::new();
        let mut a = Node::new("Post", "a");
        a.fields.insert("title".into(), json!("Same"));
        let mut b = Node::new("Post", "b");
        b.fields.insert("title".into(), json!("same"));
        store.add_node(a).unwrap();
        store.add_node(b).unwrap();

        let err = store
            .resolve_paths(&template("Post", "/:title"), None)
            .unwrap_err();
        assert!(matches!(err, BuildError::PathConflict { ref path, .. } if path == "/same"));
    }
}
