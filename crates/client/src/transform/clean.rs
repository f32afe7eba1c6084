//! HTML cleaning and visible-text extraction.

use scraper::{Html, Selector};

/// Elements removed by the clean and text conversions.
pub const STRIPPED_ELEMENTS: &str = "script, style, iframe, frame";

/// Parse markup leniently. XML-declared documents are parsed as fragments.
pub fn parse(markup: &str) -> Html {
    if markup.trim_start().starts_with("<?xml") {
        Html::parse_fragment(markup)
    } else {
        Html::parse_document(markup)
    }
}

/// Detach every stripped element from the tree. Returns how many were removed.
pub fn strip(doc: &mut Html) -> usize {
    let selector = Selector::parse(STRIPPED_ELEMENTS).expect("invalid selector");
    let ids: Vec<_> = doc.select(&selector).map(|e| e.id()).collect();

    for id in &ids {
        if let Some(mut node) = doc.tree.get_mut(*id) {
            node.detach();
        }
    }
    ids.len()
}

/// Markup with scripts, styles and frames removed, re-serialized.
pub fn clean_html(markup: &str) -> String {
    let mut doc = parse(markup);
    let removed = strip(&mut doc);
    tracing::trace!(removed, "stripped elements");
    doc.html()
}

/// Visible text of the cleaned markup, one trimmed text node per line.
pub fn visible_text(markup: &str) -> String {
    let mut doc = parse(markup);
    strip(&mut doc);
    doc.root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
