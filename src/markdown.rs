//! Markdown to HTML for card descriptions, comments and board text.
//!
//! Content authored in Trello links other cards through `trello.com/c/...`
//! URLs; those are rewritten to the site's own `/c/{shortlink}` permalinks
//! before rendering so readers stay on the mirrored site.

use std::borrow::Cow;

use markdown::{Options as MarkdownOptions, to_html_with_options};
use once_cell::sync::Lazy;
use regex::Regex;

static CARD_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\]\(https?://trello\.com/c/([^/)\s]+)(?:/[\w-]*)?\)")
        .expect("valid card link regex")
});

/// Rewrites markdown link targets pointing at Trello cards to local short links.
pub fn rewrite_card_links(input: &str) -> Cow<'_, str> {
    CARD_LINK.replace_all(input, "](/c/${1})")
}

fn markdown_options() -> MarkdownOptions {
    // GFM defaults keep raw HTML escaped, which is what we want for
    // user-authored board content.
    MarkdownOptions::gfm()
}

/// Renders markdown to HTML; blank input renders to an empty string.
pub fn render_markdown(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let rewritten = rewrite_card_links(trimmed);
    to_html_with_options(&rewritten, &markdown_options())
        .unwrap_or_else(|_| format!("<p>{}</p>", escape_html(&rewritten)))
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
