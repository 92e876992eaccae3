use serde::{Deserialize, Serialize};

use super::{BuildMode, PageContext, PageHook};

const DEFAULT_TRACKER_URL: &str = "//cdn.usefathom.com/tracker.js";

fn default_tracker_url() -> String {
    DEFAULT_TRACKER_URL.to_string()
}

/// Options for the `fathom` analytics plugin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FathomOptions {
    pub site_id: String,
    /// Point at a self-hosted instance instead of the Fathom CDN.
    #[serde(default = "default_tracker_url")]
    pub tracker_url: String,
    /// Only track page views served from this host.
    #[serde(default)]
    pub host: Option<String>,
    /// Also inject the snippet into development builds.
    #[serde(default)]
    pub debug: bool,
}

impl FathomOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.site_id.is_empty() || !self.site_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("`site_id` `{}` must be alphanumeric", self.site_id));
        }
        if self.tracker_url.trim().is_empty() {
            return Err("`tracker_url` must not be empty".into());
        }
        Ok(())
    }

    pub fn snippet(&self) -> String {
        let track = format!(
            "fathom('set', 'siteId', {});\nfathom('trackPageview');",
            js_string(&self.site_id)
        );
        let track = match &self.host {
            Some(host) => format!("if (window.location.host === {}) {{\n{track}\n}}", js_string(host)),
            None => track,
        };

        format!(
            r#"<script>
(function(f, a, t, h, o, m){{
a[h]=a[h]||function(){{(a[h].q=a[h].q||[]).push(arguments)}};
o=f.createElement('script'),m=f.getElementsByTagName('script')[0];
o.async=1; o.src=t; o.id='fathom-script';
m.parentNode.insertBefore(o,m)
}})(document, window, {}, 'fathom');
{track}
</script>
"#,
            js_string(&self.tracker_url)
        )
    }
}

impl PageHook for FathomOptions {
    fn process(&self, html: String, page: &PageContext<'_>) -> String {
        if page.mode == BuildMode::Development && !self.debug {
            return html;
        }
        inject(html, &self.snippet())
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace("</", "<\\/")
}

/// Insert before `</head>`, falling back to `</body>`, then to the end.
fn inject(html: String, snippet: &str) -> String {
    let position = html.rfind("</head>").or_else(|| html.rfind("</body>"));
    match position {
        Some(pos) => {
            let mut result = String::with_capacity(html.len() + snippet.len());
            result.push_str(&html[..pos]);
            result.push_str(snippet);
            result.push_str(&html[pos..]);
            result
        }
        None => html + snippet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> FathomOptions {
        FathomOptions {
            site_id: "PNSYY".into(),
            tracker_url: "http://stats.shivam.dev/tracker.js".into(),
            host: Some("shivam.dev".into()),
            debug: false,
        }
    }

    fn page(mode: BuildMode) -> PageContext<'static> {
        PageContext { path: "/hello", mode }
    }

    #[test]
    fn test_injects_before_head_close_in_production() {
        let html = "<html><head><title>x</title></head><body></body></html>".to_string();
        let out = options().process(html, &page(BuildMode::Production));

        let script = out.find("fathom-script").unwrap();
        assert!(script < out.find("</head>").unwrap());
        assert!(out.contains("\"http://stats.shivam.dev/tracker.js\""));
        assert!(out.contains("fathom('set', 'siteId', \"PNSYY\")"));
        assert!(out.contains("window.location.host === \"shivam.dev\""));
    }

    #[test]
    fn test_skips_development_unless_debug() {
        let html = "<html><head></head></html>".to_string();
        let out = options().process(html.clone(), &page(BuildMode::Development));
        assert_eq!(out, html);

        let debug = FathomOptions {
            debug: true,
            ..options()
        };
        let out = debug.process(html, &page(BuildMode::Development));
        assert!(out.contains("trackPageview"));
    }

    #[test]
    fn test_debug_still_injects_in_production() {
        let debug = FathomOptions {
            debug: true,
            ..options()
        };
        let out = debug.process("<head></head>".into(), &page(BuildMode::Production));
        assert!(out.contains("fathom('trackPageview')"));
        assert!(out.ends_with("</script>\n</head>"));
    }

    #[test]
    fn test_appends_without_head_or_body() {
        let out = options().process("<p>bare</p>".into(), &page(BuildMode::Production));
        assert!(out.starts_with("<p>bare</p><script>"));
    }

    #[test]
    fn test_no_host_guard_without_host() {
        let options = FathomOptions {
            host: None,
            ..options()
        };
        assert!(!options.snippet().contains("window.location.host"));
    }

    #[test]
    fn test_validate() {
        assert!(options().validate().is_ok());
        let bad = FathomOptions {
            site_id: "PN SYY".into(),
            ..options()
        };
        assert!(bad.validate().is_err());
    }
}
