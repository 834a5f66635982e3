//! # Response Module
//!
//! A read-only view over one completed HTTP attempt.
//!
//! ## Overview
//!
//! `Response` wraps the raw bytes of a fetched body together with the
//! transport-level attributes (status, final URL after redirects, headers)
//! and the originating request's metadata. Two derived views are computed
//! lazily and cached:
//!
//! - [`text`](Response::text): the decoded body. The decode chain first
//!   honors a `charset=` declaration embedded in the leading bytes, then
//!   the `Content-Type` header charset, then lossy UTF-8. The first access
//!   locks the decoding in; it never fails.
//! - [`selector`](Response::selector): an HTML document parsed once from
//!   `text`, queried through CSS selectors.
//!
//! The cached document is not `Send`, so a `Response` lives and dies inside
//! the synchronous callback invocation; the engine never holds one across
//! an await point.

use std::cell::OnceCell;
use std::fmt;

use bytes::Bytes;
use encoding_rs::Encoding;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::request::{Meta, RETRY_TIMES_KEY, Request};

/// How many leading bytes are scanned for an embedded `charset=` marker.
const CHARSET_SCAN_WINDOW: usize = 1024;

/// Transport-level result of one attempt, before the request metadata is
/// attached. Produced by the engine's fetch step.
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A completed HTTP result with lazily-decoded views.
pub struct Response {
    status: StatusCode,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
    meta: Meta,
    text: OnceCell<String>,
    document: OnceCell<Html>,
}

impl Response {
    pub(crate) fn new(raw: RawResponse, meta: Meta) -> Self {
        Response {
            status: raw.status,
            url: raw.url,
            headers: raw.headers,
            body: raw.body,
            meta,
            text: OnceCell::new(),
            document: OnceCell::new(),
        }
    }

    /// HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Final URL, after any redirects followed by the transport.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body bytes, fetched exactly once per attempt.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Metadata of the originating request.
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// The decoded body text. Decoded on first access and cached; always
    /// resolves to some string regardless of how broken the declared
    /// charset is.
    pub fn text(&self) -> &str {
        self.text
            .get_or_init(|| decode_body(&self.headers, &self.body))
    }

    /// The parsed HTML document, built once from [`text`](Response::text).
    pub fn selector(&self) -> &Html {
        self.document
            .get_or_init(|| Html::parse_document(self.text()))
    }

    /// Runs a CSS selector query against the parsed document.
    pub fn css(&self, query: &str) -> anyhow::Result<Vec<ElementRef<'_>>> {
        let selector = Selector::parse(query)
            .map_err(|e| anyhow::anyhow!("invalid css selector {:?}: {}", query, e))?;
        Ok(self.selector().select(&selector).collect())
    }

    /// Resolves a possibly-relative href against the final URL.
    pub fn join_url(&self, href: &str) -> Result<Url, url::ParseError> {
        self.url.join(href)
    }

    /// Builds a follow-up request for an href found on this page. The
    /// current metadata is carried forward, minus the retry counter, which
    /// belongs to this request's identity and not to derived ones.
    pub fn follow<T>(&self, href: &str) -> Result<Request<T>, url::ParseError> {
        let mut meta = self.meta.clone();
        meta.remove(RETRY_TIMES_KEY);
        Ok(Request::new(self.join_url(href)?).with_meta(meta))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Response {} {}>", self.status.as_u16(), self.url)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

/// Decode-fallback chain: embedded `charset=` marker, then the
/// `Content-Type` header charset, then lossy UTF-8.
fn decode_body(headers: &HeaderMap, body: &[u8]) -> String {
    if let Some(encoding) = embedded_charset(body) {
        let (text, _, had_errors) = encoding.decode(body);
        if !had_errors {
            return text.into_owned();
        }
        debug!(
            "declared charset {} did not decode cleanly, falling back",
            encoding.name()
        );
    }
    if let Some(encoding) = header_charset(headers) {
        return encoding.decode(body).0.into_owned();
    }
    String::from_utf8_lossy(body).into_owned()
}

/// Scans the leading bytes for a `charset=` declaration (as found in meta
/// tags or XML prologs) and resolves its label. Unknown labels yield
/// `None`, pushing the decode down the fallback chain.
fn embedded_charset(body: &[u8]) -> Option<&'static Encoding> {
    let window = &body[..body.len().min(CHARSET_SCAN_WINDOW)];
    let marker = b"charset=";
    let start = window
        .windows(marker.len())
        .position(|w| w.eq_ignore_ascii_case(marker))?
        + marker.len();
    let label = charset_label(&window[start..]);
    if label.is_empty() {
        return None;
    }
    Encoding::for_label(label)
}

/// Charset named by the `Content-Type` header, if any.
fn header_charset(headers: &HeaderMap) -> Option<&'static Encoding> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let idx = content_type.to_ascii_lowercase().find("charset=")?;
    let label = charset_label(content_type[idx + "charset=".len()..].as_bytes());
    Encoding::for_label(label)
}

/// Extracts a charset label: skips a leading quote and stops at the first
/// delimiter or quote.
fn charset_label(bytes: &[u8]) -> &[u8] {
    let bytes = if bytes.first().is_some_and(|b| *b == b'"' || *b == b'\'') {
        &bytes[1..]
    } else {
        bytes
    };
    let end = bytes
        .iter()
        .position(|b| matches!(b, b'"' | b'\'' | b';' | b'>' | b'/' | b' ' | b'\t' | b'\r' | b'\n'))
        .unwrap_or(bytes.len());
    &bytes[..end]
}
