//! URL path templates like `/blog/:year/:title`.

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::store::Node;

const DATE_PARTS: [&str; 3] = ["year", "month", "day"];
const RAW_SUFFIX: &str = "_raw";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Static(String),
    Field { name: String, raw: bool },
}

/// Why a placeholder could not be filled for a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderError {
    Missing(String),
    Unusable(String),
}

/// A parsed URL template. Placeholders start with `:` and run to the next
/// character that is not alphanumeric or `_`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    parts: Vec<Part>,
}

impl PathTemplate {
    pub fn parse(source: &str) -> Result<Self, String> {
        if !source.starts_with('/') {
            return Err("must start with `/`".into());
        }

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            if c != ':' {
                literal.push(c);
                continue;
            }

            let mut name = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                return Err("`:` must be followed by a field name".into());
            }

            if !literal.is_empty() {
                parts.push(Part::Static(std::mem::take(&mut literal)));
            }
            parts.push(match name.strip_suffix(RAW_SUFFIX) {
                Some(field) if !field.is_empty() => Part::Field {
                    name: field.to_string(),
                    raw: true,
                },
                _ => Part::Field { name, raw: false },
            });
        }
        if !literal.is_empty() {
            parts.push(Part::Static(literal));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Field names referenced by the template, in order, without repeats.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for part in &self.parts {
            if let Part::Field { name, .. } = part {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Whether a type whose nodes carry exactly `fields` can fill every placeholder.
    pub fn missing_field<'a>(&'a self, fields: &[&str]) -> Option<&'a str> {
        self.placeholders().into_iter().find(|name| {
            if fields.contains(name) {
                return false;
            }
            !(DATE_PARTS.contains(name) && fields.contains(&"date"))
        })
    }

    pub fn render(&self, node: &Node) -> Result<String, PlaceholderError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Static(text) => out.push_str(text),
                Part::Field { name, raw } => {
                    let value = lookup(node, name)?;
                    if *raw {
                        out.push_str(&value);
                    } else {
                        out.push_str(&slug::slugify(&value));
                    }
                }
            }
        }
        Ok(normalize(&out))
    }
}

impl Serialize for PathTemplate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

fn lookup(node: &Node, name: &str) -> Result<String, PlaceholderError> {
    if let Some(value) = node.field(name) {
        return scalar(value).ok_or_else(|| PlaceholderError::Unusable(name.to_string()));
    }

    if DATE_PARTS.contains(&name) {
        let date = node
            .field("date")
            .ok_or_else(|| PlaceholderError::Missing(name.to_string()))?;
        let date = scalar(date)
            .and_then(|s| parse_date(&s))
            .ok_or_else(|| PlaceholderError::Unusable("date".to_string()))?;
        let format = match name {
            "year" => "%Y",
            "month" => "%m",
            _ => "%d",
        };
        return Ok(date.format(format).to_string());
    }

    Err(PlaceholderError::Missing(name.to_string()))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => items.first().and_then(scalar),
        _ => None,
    }
}

// Accepts `YYYY-MM-DD` and anything starting with it, such as RFC 3339 timestamps.
fn parse_date(text: &str) -> Option<NaiveDate> {
    let prefix = text.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    for c in path.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(fields: Value) -> Node {
        let mut node = Node::new("Post", "hello");
        if let Value::Object(map) = fields {
            for (key, value) in map {
                node.fields.insert(key, value);
            }
        }
        node
    }

    #[test]
    fn test_title_placeholder() {
        let template = PathTemplate::parse("/:title").unwrap();
        let node = post(json!({ "title": "hello-world" }));
        assert_eq!(template.render(&node).unwrap(), "/hello-world");
    }

    #[test]
    fn test_values_are_slugified_unless_raw() {
        let node = post(json!({ "title": "Hello World!" }));
        let slugged = PathTemplate::parse("/posts/:title").unwrap();
        assert_eq!(slugged.render(&node).unwrap(), "/posts/hello-world");

        let raw = PathTemplate::parse("/posts/:title_raw").unwrap();
        assert_eq!(raw.render(&node).unwrap(), "/posts/Hello World!");
        assert_eq!(raw.placeholders(), vec!["title"]);
    }

    #[test]
    fn test_date_parts_come_from_date_field() {
        let template = PathTemplate::parse("/:year/:month/:day/:title").unwrap();
        let node = post(json!({ "title": "Launch", "date": "2021-03-07T10:00:00Z" }));
        assert_eq!(template.render(&node).unwrap(), "/2021/03/07/launch");
        assert_eq!(template.missing_field(&["title", "date"]), None);
        assert_eq!(template.missing_field(&["title"]), Some("year"));
    }

    #[test]
    fn test_missing_field_is_reported() {
        let template = PathTemplate::parse("/:slug").unwrap();
        let node = post(json!({ "title": "x" }));
        assert_eq!(
            template.render(&node),
            Err(PlaceholderError::Missing("slug".into()))
        );
    }

    #[test]
    fn test_list_uses_first_item_and_empty_is_unusable() {
        let template = PathTemplate::parse("/:category/:title").unwrap();
        let node = post(json!({ "title": "x", "category": ["Rust", "Go"] }));
        assert_eq!(template.render(&node).unwrap(), "/rust/x");

        let empty = post(json!({ "title": "x", "category": [] }));
        assert_eq!(
            template.render(&empty),
            Err(PlaceholderError::Unusable("category".into()))
        );
    }

    #[test]
    fn test_rejects_malformed_templates() {
        assert!(PathTemplate::parse(":title").is_err());
        assert!(PathTemplate::parse("/posts/:").is_err());
        assert!(PathTemplate::parse("/posts/:/x").is_err());
    }

    #[test]
    fn test_repeated_slashes_collapse() {
        let template = PathTemplate::parse("/tag//:id/").unwrap();
        let node = post(json!({}));
        assert_eq!(template.render(&node).unwrap(), "/tag/hello/");
    }
}
