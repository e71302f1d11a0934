use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use tracing::warn;

use super::sanitize::sanitize;

static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Convert entry HTML into ASCII-safe markdown.
///
/// The raw HTML is sanitized before conversion. Parsing decodes entities
/// like `&rsquo;` back into non-ASCII characters, so the markdown is
/// sanitized again on the way out.
pub fn to_markdown(html: &str) -> String {
    let clean = sanitize(html);
    let markdown = htmd::convert(&clean).unwrap_or_else(|e| {
        warn!(error = %e, "Markdown conversion failed, falling back to plain text");
        let document = Html::parse_fragment(&clean);
        document.root_element().text().collect::<String>()
    });
    collapse_blank_lines(&sanitize(&markdown))
}

fn collapse_blank_lines(markdown: &str) -> String {
    BLANK_RUN_RE.replace_all(markdown, "\n\n").into_owned()
}
