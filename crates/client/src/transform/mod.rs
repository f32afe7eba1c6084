//! Response conversion for the browser.
//!
//! ### Link rewriting
//! - Every literal occurrence of the origin base URL in a textual body, and in
//!   the `Location` header, becomes `http://localhost:<port>`.
//! - Locally generated error pages are never rewritten, so the origin URL
//!   that failed stays visible.
//!
//! ### Modes
//! - Raw: link rewriting only. Bodies that are not valid UTF-8 pass through.
//! - Clean: rewriting, then `script`/`style`/`iframe`/`frame` removal.
//! - Text: rewriting and removal, then visible text. Always `text/plain`.
//!
//! Non-text bodies pass through unchanged in every mode, and the upstream
//! status code is always preserved.

pub mod clean;

use std::collections::BTreeMap;

use bytes::Bytes;
use reqwest::StatusCode;
use wikisearch_core::ConversionMode;

use crate::fetch::{OriginBase, Response};

pub use clean::{clean_html, visible_text};

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// The response as written back to the browser.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Outbound {
    /// Body as text, for logging and link extraction.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn is_html(&self) -> bool {
        matches!(classify(self.content_type.as_deref()), Kind::Markup)
    }
}

/// Failure converting a response body.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransformError {
    #[error("TRANSFORM_DECODE: {url} is not valid UTF-8: {reason}")]
    Decode { url: String, reason: String },
}

impl TransformError {
    /// Plain-text body carrying the error, keeping the upstream status.
    pub fn into_outbound(self, status: StatusCode) -> Outbound {
        Outbound {
            status,
            content_type: Some(TEXT_PLAIN.to_string()),
            headers: BTreeMap::new(),
            body: Bytes::from(self.to_string()),
        }
    }
}

/// Replaces the origin base URL with the local proxy base.
#[derive(Debug, Clone)]
pub struct LinkRewriter {
    from: String,
    to: String,
}

impl LinkRewriter {
    pub fn new(base: &OriginBase, port: u16) -> Self {
        Self { from: base.as_str().to_string(), to: format!("http://localhost:{port}") }
    }

    pub fn rewrite(&self, text: &str) -> String {
        text.replace(&self.from, &self.to)
    }

    /// Copy of `headers` with `location` pointed at the proxy.
    pub fn rewrite_headers(&self, headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                let value = if name == "location" { self.rewrite(value) } else { value.clone() };
                (name.clone(), value)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// HTML or XML documents, also assumed when no content type is given.
    Markup,
    /// Other text (css, javascript, json, plain).
    Text,
    Binary,
}

fn classify(content_type: Option<&str>) -> Kind {
    let Some(ct) = content_type else {
        return Kind::Markup;
    };
    let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match mime.as_str() {
        "" | "text/html" | "application/xhtml+xml" | "application/xml" | "text/xml" => Kind::Markup,
        "application/json" | "application/javascript" | "application/x-javascript" => Kind::Text,
        m if m.starts_with("text/") || m.ends_with("+xml") || m.ends_with("+json") => Kind::Text,
        _ => Kind::Binary,
    }
}

/// Turns an upstream response into what the browser receives.
pub trait Converter: Send + Sync {
    /// Convert one response.
    fn convert(&self, response: &Response) -> Result<Outbound, TransformError>;

    fn mode(&self) -> ConversionMode;
}

/// Converter for `mode`, rewriting links under `base` to `localhost:<port>`.
pub fn converter_for(mode: ConversionMode, base: &OriginBase, port: u16) -> Box<dyn Converter> {
    let links = LinkRewriter::new(base, port);
    match mode {
        ConversionMode::Raw => Box::new(RawConverter { links }),
        ConversionMode::CleanHtml => Box::new(CleanConverter { links }),
        ConversionMode::Text => Box::new(TextConverter { links }),
    }
}

fn passthrough(response: &Response, links: &LinkRewriter) -> Outbound {
    let headers = if response.synthetic { response.headers.clone() } else { links.rewrite_headers(&response.headers) };
    Outbound { status: response.status, content_type: response.content_type.clone(), headers, body: response.body.clone() }
}

fn decode<'a>(response: &'a Response) -> Result<&'a str, TransformError> {
    std::str::from_utf8(&response.body)
        .map_err(|e| TransformError::Decode { url: response.url.clone(), reason: e.to_string() })
}

/// Decoded body with links pointed at the proxy, unless the page is ours.
fn rewritten(response: &Response, links: &LinkRewriter) -> Result<String, TransformError> {
    let text = decode(response)?;
    Ok(if response.synthetic { text.to_string() } else { links.rewrite(text) })
}

pub struct RawConverter {
    links: LinkRewriter,
}

impl Converter for RawConverter {
    fn convert(&self, response: &Response) -> Result<Outbound, TransformError> {
        let mut out = passthrough(response, &self.links);
        if classify(response.content_type.as_deref()) == Kind::Binary {
            return Ok(out);
        }
        match rewritten(response, &self.links) {
            Ok(text) => out.body = Bytes::from(text),
            Err(e) => tracing::debug!("forwarding undecodable body unchanged: {e}"),
        }
        Ok(out)
    }

    fn mode(&self) -> ConversionMode {
        ConversionMode::Raw
    }
}

pub struct CleanConverter {
    links: LinkRewriter,
}

impl Converter for CleanConverter {
    fn convert(&self, response: &Response) -> Result<Outbound, TransformError> {
        let mut out = passthrough(response, &self.links);
        let kind = classify(response.content_type.as_deref());
        if kind == Kind::Binary {
            return Ok(out);
        }
        let text = rewritten(response, &self.links)?;
        out.body = match kind {
            Kind::Markup => Bytes::from(clean_html(&text)),
            _ => Bytes::from(text),
        };
        Ok(out)
    }

    fn mode(&self) -> ConversionMode {
        ConversionMode::CleanHtml
    }
}

pub struct TextConverter {
    links: LinkRewriter,
}

impl Converter for TextConverter {
    fn convert(&self, response: &Response) -> Result<Outbound, TransformError> {
        let mut out = passthrough(response, &self.links);
        out.content_type = Some(TEXT_PLAIN.to_string());
        match classify(response.content_type.as_deref()) {
            Kind::Binary => {}
            Kind::Markup => out.body = Bytes::from(visible_text(&clean_html(&rewritten(response, &self.links)?))),
            Kind::Text => out.body = Bytes::from(rewritten(response, &self.links)?),
        }
        Ok(out)
    }

    fn mode(&self) -> ConversionMode {
        ConversionMode::Text
    }
}
