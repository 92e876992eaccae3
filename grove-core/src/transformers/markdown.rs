use std::collections::HashSet;
use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd, html};
use serde::{Deserialize, Serialize};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::{SyntaxReference, SyntaxSet};

use crate::error::ConfigError;

// Initialize syntax highlighting resources once
static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

const DEFAULT_HIGHLIGHT_THEME: &str = "base16-ocean.dark";

/// Plugins that run inside the markdown transformer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "use", rename_all = "lowercase")]
pub enum MarkdownPlugin {
    /// Syntax highlighting for fenced code blocks.
    Highlight { theme: String },
}

impl MarkdownPlugin {
    fn resolve(id: &str, options: toml::Table) -> Result<Self, ConfigError> {
        match id {
            "highlight" => {
                let options: HighlightOptions = toml::Value::Table(options).try_into().map_err(
                    |source| ConfigError::PluginOptions {
                        id: id.to_string(),
                        source,
                    },
                )?;
                if !THEME_SET.themes.contains_key(&options.theme) {
                    return Err(ConfigError::InvalidPluginOptions {
                        id: id.to_string(),
                        reason: format!("unknown highlight theme `{}`", options.theme),
                    });
                }
                Ok(MarkdownPlugin::Highlight {
                    theme: options.theme,
                })
            }
            other => Err(ConfigError::UnknownMarkdownPlugin(other.to_string())),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct HighlightOptions {
    #[serde(default = "default_highlight_theme")]
    theme: String,
}

fn default_highlight_theme() -> String {
    DEFAULT_HIGHLIGHT_THEME.to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PluginEntry {
    Name(String),
    Declared {
        #[serde(rename = "use")]
        id: String,
        #[serde(default)]
        options: toml::Table,
    },
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawMarkdownOptions {
    external_links_target: String,
    external_links_rel: Vec<String>,
    anchor_class_name: String,
    autolink_headings: bool,
    plugins: Vec<PluginEntry>,
}

impl Default for RawMarkdownOptions {
    fn default() -> Self {
        let defaults = MarkdownOptions::default();
        Self {
            external_links_target: defaults.external_links_target,
            external_links_rel: defaults.external_links_rel,
            anchor_class_name: defaults.anchor_class_name,
            autolink_headings: defaults.autolink_headings,
            plugins: Vec::new(),
        }
    }
}

/// Options for the `markdown` transformer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkdownOptions {
    /// `target` for links leaving the site; empty leaves it off.
    pub external_links_target: String,
    pub external_links_rel: Vec<String>,
    pub anchor_class_name: String,
    pub autolink_headings: bool,
    pub plugins: Vec<MarkdownPlugin>,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            external_links_target: "_blank".to_string(),
            external_links_rel: vec![
                "nofollow".to_string(),
                "noopener".to_string(),
                "noreferrer".to_string(),
            ],
            anchor_class_name: "icon icon-link".to_string(),
            autolink_headings: true,
            plugins: Vec::new(),
        }
    }
}

/// Rendered markdown body.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub html: String,
    pub title: Option<String>,
}

impl MarkdownOptions {
    pub fn resolve(value: toml::Value) -> Result<Self, ConfigError> {
        let raw: RawMarkdownOptions =
            value
                .try_into()
                .map_err(|source| ConfigError::PluginOptions {
                    id: "markdown".to_string(),
                    source,
                })?;

        let plugins = raw
            .plugins
            .into_iter()
            .map(|entry| match entry {
                PluginEntry::Name(id) => MarkdownPlugin::resolve(&id, toml::Table::new()),
                PluginEntry::Declared { id, options } => MarkdownPlugin::resolve(&id, options),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            external_links_target: raw.external_links_target,
            external_links_rel: raw.external_links_rel,
            anchor_class_name: raw.anchor_class_name,
            autolink_headings: raw.autolink_headings,
            plugins,
        })
    }

    fn highlight_theme(&self) -> Option<&str> {
        self.plugins.iter().find_map(|plugin| match plugin {
            MarkdownPlugin::Highlight { theme } => Some(theme.as_str()),
        })
    }

    pub fn render(&self, source: &str) -> Rendered {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_HEADING_ATTRIBUTES;
        let events: Vec<Event> = Parser::new_ext(source, options)
            .map(|event| self.rewrite_link(event))
            .collect();

        let theme = self.highlight_theme();
        let mut ids = HeadingIds::default();
        let mut title = None;
        let mut processed_events = Vec::with_capacity(events.len());
        let mut i = 0;

        while i < events.len() {
            match &events[i] {
                Event::Start(Tag::Heading {
                    level, id, classes, ..
                }) => {
                    let mut inner = Vec::new();
                    i += 1; // Skip the start event
                    while i < events.len() && !matches!(events[i], Event::End(TagEnd::Heading(_))) {
                        inner.push(events[i].clone());
                        i += 1;
                    }

                    let text = plain_text(&inner);
                    if *level == HeadingLevel::H1 && title.is_none() {
                        title = Some(text.clone());
                    }
                    let id = ids.unique(match id {
                        Some(explicit) => explicit.to_string(),
                        None => slug::slugify(&text),
                    });

                    processed_events.push(Event::Html(self.heading_open(*level, &id, classes).into()));
                    processed_events.extend(inner);
                    processed_events.push(Event::Html(format!("</h{}>\n", *level as u32).into()));
                }
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang))) if theme.is_some() => {
                    // Collect all text events until the end of the code block
                    let mut code_content = String::new();
                    i += 1;
                    while i < events.len() {
                        match &events[i] {
                            Event::End(TagEnd::CodeBlock) => break,
                            Event::Text(text) => code_content.push_str(text),
                            _ => {}
                        }
                        i += 1;
                    }

                    let html = highlight(&code_content, lang, theme.unwrap_or(DEFAULT_HIGHLIGHT_THEME));
                    processed_events.push(Event::Html(html.into()));
                }
                other => processed_events.push(other.clone()),
            }
            i += 1;
        }

        let mut out = String::new();
        html::push_html(&mut out, processed_events.into_iter());

        Rendered { html: out, title }
    }

    fn rewrite_link<'a>(&self, event: Event<'a>) -> Event<'a> {
        let Event::Start(Tag::Link {
            ref dest_url,
            ref title,
            ..
        }) = event
        else {
            return event;
        };
        if !is_external(dest_url) {
            return event;
        }

        let mut anchor = format!("<a href=\"{}\"", html_escape::encode_quoted_attribute(dest_url));
        if !title.is_empty() {
            anchor.push_str(&format!(" title=\"{}\"", html_escape::encode_quoted_attribute(title)));
        }
        if !self.external_links_target.is_empty() {
            anchor.push_str(&format!(
                " target=\"{}\"",
                html_escape::encode_quoted_attribute(&self.external_links_target)
            ));
        }
        if !self.external_links_rel.is_empty() {
            anchor.push_str(&format!(
                " rel=\"{}\"",
                html_escape::encode_quoted_attribute(&self.external_links_rel.join(" "))
            ));
        }
        anchor.push('>');

        Event::InlineHtml(anchor.into())
    }

    fn heading_open(&self, level: HeadingLevel, id: &str, classes: &[CowStr]) -> String {
        let id = html_escape::encode_quoted_attribute(id);
        let mut open = format!("<h{} id=\"{}\"", level as u32, id);
        if !classes.is_empty() {
            let classes: Vec<&str> = classes.iter().map(|c| c.as_ref()).collect();
            open.push_str(&format!(
                " class=\"{}\"",
                html_escape::encode_quoted_attribute(&classes.join(" "))
            ));
        }
        open.push('>');

        if self.autolink_headings {
            open.push_str(&format!(
                "<a class=\"{}\" href=\"#{}\" aria-hidden=\"true\"></a>",
                html_escape::encode_quoted_attribute(&self.anchor_class_name),
                id
            ));
        }
        open
    }
}

fn is_external(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("//")
}

fn plain_text(events: &[Event]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
    }
    text.trim().to_string()
}

fn find_syntax(lang: &str) -> Option<&'static SyntaxReference> {
    SYNTAX_SET.find_syntax_by_token(lang).or_else(|| {
        // Fallback mappings for unsupported languages
        match lang {
            "toml" => SYNTAX_SET.find_syntax_by_name("YAML"),
            "vue" | "svelte" => SYNTAX_SET.find_syntax_by_name("HTML"),
            _ => None,
        }
    })
}

fn highlight(code: &str, lang: &str, theme: &str) -> String {
    let lang = lang
        .split(|c: char| c == ',' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    let plain = || {
        let class = if lang.is_empty() {
            String::new()
        } else {
            format!(" class=\"language-{}\"", html_escape::encode_quoted_attribute(lang))
        };
        format!("<pre><code{}>{}</code></pre>\n", class, html_escape::encode_text(code))
    };

    let (Some(syntax), Some(theme)) = (find_syntax(lang), THEME_SET.themes.get(theme)) else {
        return plain();
    };
    highlighted_html_for_string(code, &SYNTAX_SET, syntax, theme).unwrap_or_else(|_| plain())
}

/// Hands out heading ids, suffixing repeats with `-1`, `-2`, ... until the
/// id has not been handed out before.
#[derive(Default)]
struct HeadingIds {
    taken: HashSet<String>,
}

impl HeadingIds {
    fn unique(&mut self, base: String) -> String {
        let base = if base.is_empty() { "section".to_string() } else { base };
        let mut id = base.clone();
        let mut suffix = 1;
        while self.taken.contains(&id) {
            id = format!("{base}-{suffix}");
            suffix += 1;
        }
        self.taken.insert(id.clone());
        id
    }
}
