use std::sync::LazyLock;

use scraper::{Html, Selector};

static OG_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"head meta[property="og:image"][content]"#).unwrap());

/// Return the page's declared thumbnail (`og:image`), if any.
///
/// Only the first tag counts. An empty value on that tag means no image.
pub fn extract_primary_image(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let content = document
        .select(&OG_IMAGE)
        .next()?
        .value()
        .attr("content")?;
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}
