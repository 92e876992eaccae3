use std::collections::BTreeMap;

use serde_json::Value;

/// Split a leading `---` fenced YAML block off `source`.
///
/// Returns the parsed fields and the remaining body. Sources without a
/// front matter block come back unchanged with no fields.
pub fn split(source: &str) -> Result<(BTreeMap<String, Value>, &str), serde_yaml::Error> {
    let Some(rest) = strip_fence(source) else {
        return Ok((BTreeMap::new(), source));
    };

    let mut offset = 0;
    let mut yaml_end = None;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            yaml_end = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }

    // An opening fence without a closing one is ordinary markdown.
    let Some((yaml_end, body_start)) = yaml_end else {
        return Ok((BTreeMap::new(), source));
    };

    let yaml = &rest[..yaml_end];
    let fields = if yaml.trim().is_empty() {
        BTreeMap::new()
    } else {
        serde_yaml::from_str(yaml)?
    };

    Ok((fields, &rest[body_start..]))
}

fn strip_fence(source: &str) -> Option<&str> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    source
        .strip_prefix("---\r\n")
        .or_else(|| source.strip_prefix("---\n"))
}
