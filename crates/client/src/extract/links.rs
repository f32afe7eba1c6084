//! Link harvesting from converted pages.

use std::collections::{HashMap, HashSet};

use scraper::{Html, Selector};

use crate::transform::Outbound;

/// Hyperlink targets of one page, in document order, duplicates kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    hrefs: Vec<String>,
}

impl LinkSet {
    /// Extract every `a[href]` from an HTML document.
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        let selector = Selector::parse("a[href]").expect("invalid selector");

        let hrefs = document
            .select(&selector)
            .filter_map(|element| element.value().attr("href"))
            .map(|href| href.trim().to_string())
            .collect();

        Self { hrefs }
    }

    /// Links of a converted response. Empty unless it is decodable markup.
    pub fn from_outbound(out: &Outbound) -> Self {
        match out.text() {
            Some(text) if out.is_html() => Self::from_html(text),
            _ => Self::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.hrefs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hrefs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hrefs.iter().map(String::as_str)
    }

    fn counts(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for href in self.iter() {
            *counts.entry(href).or_insert(0) += 1;
        }
        counts
    }

    /// Equal as unordered multisets.
    pub fn same_multiset(&self, other: &LinkSet) -> bool {
        self.len() == other.len() && self.counts() == other.counts()
    }

    /// Distinct links not present in `previous`, in first-appearance order.
    pub fn newly_seen<'a>(&'a self, previous: &LinkSet) -> Vec<&'a str> {
        let old: HashSet<&str> = previous.iter().collect();
        let mut seen = HashSet::new();
        self.iter()
            .filter(|href| !old.contains(href) && seen.insert(*href))
            .collect()
    }
}

/// Origin-relative path a link resolves to through the proxy.
///
/// Returns `None` for fragment-only links, links to other hosts and
/// non-http schemes. `local_base` is `http://localhost:<port>`.
pub fn prefetch_path(href: &str, local_base: &str) -> Option<String> {
    let href = href.split('#').next().unwrap_or_default().trim();

    let path = if let Some(rest) = href.strip_prefix(local_base) {
        if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('?')) {
            return None;
        }
        rest
    } else if href.starts_with("//") || has_scheme(href) {
        return None;
    } else {
        href
    };

    let path = path.trim_start_matches('/');
    if path.is_empty() { None } else { Some(path.to_string()) }
}

fn has_scheme(href: &str) -> bool {
    match href.find(':') {
        Some(colon) => !href[..colon].contains(['/', '?']),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: &str = "http://localhost:8888";

    fn set(hrefs: &[&str]) -> LinkSet {
        LinkSet { hrefs: hrefs.iter().map(|h| h.to_string()).collect() }
    }

    #[test]
    fn test_from_html_keeps_order_and_duplicates() {
        let html = r##"<html><body>
            <a href="/title/Pacman">Pacman</a>
            <a name="anchor">no href</a>
            <a href="#top">Top</a>
            <a href="/title/Pacman">again</a>
        </body></html>"##;
        let links = LinkSet::from_html(html);
        assert_eq!(links.iter().collect::<Vec<_>>(), vec!["/title/Pacman", "#top", "/title/Pacman"]);
    }

    #[test]
    fn test_from_html_no_links() {
        assert!(LinkSet::from_html("<p>No links here</p>").is_empty());
    }

    #[test]
    fn test_same_multiset_ignores_order() {
        assert!(set(&["a", "b", "a"]).same_multiset(&set(&["b", "a", "a"])));
        assert!(!set(&["a", "b", "a"]).same_multiset(&set(&["a", "b", "b"])));
        assert!(!set(&["a"]).same_multiset(&set(&["a", "a"])));
        assert!(LinkSet::default().same_multiset(&LinkSet::default()));
    }

    #[test]
    fn test_newly_seen_distinct() {
        let previous = set(&["/a", "/b"]);
        let current = set(&["/b", "/c", "/d", "/c"]);
        assert_eq!(current.newly_seen(&previous), vec!["/c", "/d"]);
    }

    #[test]
    fn test_newly_seen_against_empty() {
        let current = set(&["/a", "/a", "/b"]);
        assert_eq!(current.newly_seen(&LinkSet::default()), vec!["/a", "/b"]);
    }

    #[test]
    fn test_prefetch_path_local_absolute() {
        assert_eq!(prefetch_path("http://localhost:8888/wiki/Foo", LOCAL).as_deref(), Some("wiki/Foo"));
        assert_eq!(
            prefetch_path("http://localhost:8888/index.php?search=x#res", LOCAL).as_deref(),
            Some("index.php?search=x")
        );
    }

    #[test]
    fn test_prefetch_path_relative() {
        assert_eq!(prefetch_path("/title/Pacman#Usage", LOCAL).as_deref(), Some("title/Pacman"));
        assert_eq!(prefetch_path("title/Pacman", LOCAL).as_deref(), Some("title/Pacman"));
        assert_eq!(prefetch_path("/index.php?title=a:b", LOCAL).as_deref(), Some("index.php?title=a:b"));
    }

    #[test]
    fn test_prefetch_path_skips() {
        for href in [
            "#top",
            "/",
            "https://other.example.org/page",
            "//cdn.example.org/x.js",
            "mailto:root@example.org",
            "javascript:void(0)",
            "http://localhost:88889/wiki/Foo",
            "http://localhost:8888",
        ] {
            assert_eq!(prefetch_path(href, LOCAL), None, "{href}");
        }
    }
}
