//! Per-site presentation preferences.
//!
//! The store hands back one JSON document with defaults already merged with
//! the tenant's overrides. Numeric settings are kept as the raw strings the
//! board owner typed and parsed on use, clamped to safe bounds.

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::markdown::render_markdown;
use crate::models::{Link, List};

pub const DEFAULT_POSTS_PER_PAGE: usize = 7;
pub const MAX_POSTS_PER_PAGE: usize = 15;
pub const MAX_EXCERPT_CHARS: usize = 300;
pub const DEFAULT_FAVICON: &str = "http://lorempixel.com/32/32/";
/// Nav entry text that expands into the board's visible lists.
pub const LISTS_SENTINEL: &str = "__lists__";

static INCLUDE_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("http://localhost/").expect("valid include base url"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderPrefs {
    pub text: String,
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentPrefs {
    pub display: bool,
    #[serde(rename = "box")]
    pub comment_box: bool,
    pub webmentions: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub header: HeaderPrefs,
    pub comments: CommentPrefs,
    pub aside: String,
    pub favicon: String,
    pub domain: String,
    pub includes: Vec<String>,
    pub nav: Vec<Link>,
    #[serde(rename = "posts-per-page", deserialize_with = "lenient_string")]
    pub posts_per_page: String,
    #[serde(deserialize_with = "lenient_string")]
    pub excerpts: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            header: HeaderPrefs::default(),
            comments: CommentPrefs::default(),
            aside: String::new(),
            favicon: String::new(),
            domain: String::new(),
            includes: Vec::new(),
            nav: vec![Link {
                text: LISTS_SENTINEL.to_string(),
                url: String::new(),
            }],
            posts_per_page: String::new(),
            excerpts: String::new(),
        }
    }
}

impl Preferences {
    /// Decodes the stored document; malformed JSON falls back to defaults.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(prefs) => prefs,
            Err(err) => {
                warn!(error = %err, "malformed preferences JSON, using defaults");
                Self::default()
            }
        }
    }

    /// Cards per listing page, always within `1..=15`.
    pub fn posts_per_page(&self) -> usize {
        match self.posts_per_page.trim().parse::<i64>() {
            Ok(value) => value.clamp(1, MAX_POSTS_PER_PAGE as i64) as usize,
            Err(_) => DEFAULT_POSTS_PER_PAGE,
        }
    }

    /// Excerpt length in characters, 0 when excerpts are off.
    pub fn excerpt_limit(&self) -> usize {
        match self.excerpts.trim().parse::<i64>() {
            Ok(value) => value.clamp(0, MAX_EXCERPT_CHARS as i64) as usize,
            Err(_) => 0,
        }
    }

    pub fn show_excerpts(&self) -> bool {
        self.excerpt_limit() > 0
    }

    pub fn js_includes(&self) -> Vec<&str> {
        self.includes_with_suffix(".js")
    }

    pub fn css_includes(&self) -> Vec<&str> {
        self.includes_with_suffix(".css")
    }

    fn includes_with_suffix(&self, suffix: &str) -> Vec<&str> {
        self.includes
            .iter()
            .filter(|raw| include_path(raw).is_some_and(|path| path.ends_with(suffix)))
            .map(String::as_str)
            .collect()
    }

    /// Configured navigation with the lists sentinel expanded in place.
    pub fn nav_items(&self, lists: &[List]) -> Vec<Link> {
        let mut items = Vec::with_capacity(self.nav.len() + lists.len());
        for link in &self.nav {
            if link.text == LISTS_SENTINEL {
                items.extend(lists.iter().map(|list| Link {
                    text: list.name.clone(),
                    url: list.href(),
                }));
            } else {
                items.push(link.clone());
            }
        }
        items
    }

    pub fn has_header_image(&self) -> bool {
        !self.header.image.is_empty()
    }

    pub fn aside_html(&self) -> String {
        render_markdown(&self.aside)
    }

    pub fn favicon_url(&self) -> &str {
        if self.favicon.is_empty() {
            DEFAULT_FAVICON
        } else {
            &self.favicon
        }
    }
}

/// Path component of an include URL; relative and protocol-relative URLs
/// are accepted, unparsable ones yield `None`.
fn include_path(raw: &str) -> Option<String> {
    Url::options()
        .base_url(Some(&INCLUDE_BASE))
        .parse(raw.trim())
        .ok()
        .map(|url| url.path().to_string())
}

/// Accepts strings and numbers for settings owners type by hand.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs_with(posts: &str, excerpts: &str) -> Preferences {
        Preferences {
            posts_per_page: posts.to_string(),
            excerpts: excerpts.to_string(),
            ..Preferences::default()
        }
    }

    #[test]
    fn posts_per_page_is_clamped() {
        assert_eq!(prefs_with("", "").posts_per_page(), 7);
        assert_eq!(prefs_with("abc", "").posts_per_page(), 7);
        assert_eq!(prefs_with("4", "").posts_per_page(), 4);
        assert_eq!(prefs_with("100", "").posts_per_page(), 15);
        assert_eq!(prefs_with("-3", "").posts_per_page(), 1);
        assert_eq!(prefs_with("0", "").posts_per_page(), 1);
        assert_eq!(prefs_with("99999999999999999999999", "").posts_per_page(), 7);
    }

    #[test]
    fn posts_per_page_never_leaves_bounds() {
        for raw in [
            "",
            "x",
            "1",
            "15",
            "16",
            "-1",
            "1e3",
            " 9 ",
            "2147483648",
            "-9223372036854775808",
        ] {
            let value = prefs_with(raw, "").posts_per_page();
            assert!((1..=15).contains(&value), "{raw:?} -> {value}");
        }
    }

    #[test]
    fn excerpt_limit_is_clamped() {
        assert_eq!(prefs_with("", "").excerpt_limit(), 0);
        assert_eq!(prefs_with("", "nope").excerpt_limit(), 0);
        assert_eq!(prefs_with("", "120").excerpt_limit(), 120);
        assert_eq!(prefs_with("", "5000").excerpt_limit(), 300);
        assert_eq!(prefs_with("", "-10").excerpt_limit(), 0);
        assert!(!prefs_with("", "0").show_excerpts());
        assert!(prefs_with("", "1").show_excerpts());
    }

    #[test]
    fn json_document_decodes() {
        let prefs = Preferences::from_json(
            r#"{
                "header": {"text": "Hello", "image": "//img.example.com/h.png"},
                "comments": {"display": true, "box": false, "webmentions": true},
                "aside": "**side**",
                "includes": [
                    "//cdn.example.com/theme.css?v=2",
                    "/static/app.js",
                    "https://x.example.com/font.woff"
                ],
                "nav": [{"text": "Home", "url": "/"}, {"text": "__lists__", "url": ""}],
                "posts-per-page": "100",
                "excerpts": 40
            }"#,
        );
        assert_eq!(prefs.posts_per_page(), 15);
        assert_eq!(prefs.excerpt_limit(), 40);
        assert!(prefs.comments.display);
        assert!(prefs.comments.webmentions);
        assert!(prefs.has_header_image());
        assert_eq!(prefs.css_includes(), vec!["//cdn.example.com/theme.css?v=2"]);
        assert_eq!(prefs.js_includes(), vec!["/static/app.js"]);
        assert!(prefs.aside_html().contains("<strong>side</strong>"));
    }

    #[test]
    fn malformed_json_falls_back_to_defaults() {
        let prefs = Preferences::from_json("{not json");
        assert_eq!(prefs, Preferences::default());
        assert_eq!(prefs.posts_per_page(), DEFAULT_POSTS_PER_PAGE);
        assert_eq!(prefs.favicon_url(), DEFAULT_FAVICON);
    }

    #[test]
    fn malformed_include_urls_are_skipped() {
        let prefs = Preferences {
            includes: vec!["https://[broken/app.js".into(), "https://ok.example.com/app.js".into()],
            ..Preferences::default()
        };
        assert_eq!(prefs.js_includes(), vec!["https://ok.example.com/app.js"]);
        assert!(prefs.css_includes().is_empty());
    }

    fn link(text: &str, url: &str) -> Link {
        Link {
            text: text.into(),
            url: url.into(),
        }
    }

    fn list(name: &str, slug: &str) -> List {
        List {
            name: name.into(),
            slug: slug.into(),
            ..List::default()
        }
    }

    #[test]
    fn lists_sentinel_expands_in_place() {
        let prefs = Preferences {
            nav: vec![
                link("About", "/about/"),
                link(LISTS_SENTINEL, ""),
                link("Feed", "/feed.xml"),
            ],
            ..Preferences::default()
        };
        let lists = vec![list("Design", "design"), list("Code", "code")];
        let texts: Vec<_> = prefs
            .nav_items(&lists)
            .into_iter()
            .map(|link| (link.text, link.url))
            .collect();
        assert_eq!(
            texts,
            vec![
                ("About".to_string(), "/about/".to_string()),
                ("Design".to_string(), "/design/".to_string()),
                ("Code".to_string(), "/code/".to_string()),
                ("Feed".to_string(), "/feed.xml".to_string()),
            ]
        );
    }

    #[test]
    fn default_nav_lists_everything() {
        let lists = vec![list("Design", "design")];
        assert_eq!(Preferences::default().nav_items(&lists).len(), 1);
    }
}
