//! # Request Module
//!
//! Defines the `Request` type: an immutable description of one HTTP call
//! plus a metadata map that carries the retry counter and arbitrary
//! user context across the lifetime of a logical crawl.
//!
//! ## Overview
//!
//! A `Request` is constructed by the caller (or yielded by a callback as an
//! `Output::Request`) and consumed exactly once per attempt by the engine.
//! Construction normalizes headers: a default header set with a randomized
//! User-Agent is assigned only when no explicit headers were given. From
//! then on the transport argument set is fixed; the sole mutable piece of
//! state is the metadata map, which is also the only channel for
//! retry-count propagation. A retried request is the same value with an
//! incremented counter, not a new identity.
//!
//! ## Example
//!
//! ```rust,ignore
//! use scuttle::{Output, Request};
//!
//! let request = Request::<serde_json::Value>::get("https://example.com")?
//!     .with_timeout(std::time::Duration::from_secs(10))
//!     .with_meta_entry("depth", 0)
//!     .with_callback(|response| {
//!         Ok(vec![Output::Item(serde_json::json!({ "url": response.url().as_str() }))])
//!     });
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::IndexedRandom;
use reqwest::Method;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::error::CrawlError;
use crate::response::Response;
use crate::router::Output;

/// Arbitrary per-request context, carried across retries and available to
/// callbacks through [`Response::meta`](crate::Response::meta).
pub type Meta = HashMap<String, Value>;

/// A parsing callback: receives the built `Response` and yields zero or
/// more outputs, consumed eagerly by the output router.
pub type Callback<T> = Arc<dyn Fn(Response) -> anyhow::Result<Vec<Output<T>>> + Send + Sync>;

/// Metadata key under which the retry counter is stored.
pub(crate) const RETRY_TIMES_KEY: &str = "retry_times";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool of User-Agent strings a fresh request picks from at random.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:65.0) Gecko/20100101 Firefox/65.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/73.0.3683.103 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/64.0.3282.140 Safari/537.36 Edge/18.17763",
    "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/30.0.1599.101",
    "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/38.0.2125.122",
    "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/39.0.2171.95",
    "Mozilla/5.0 (Windows NT 5.1; U; en; rv:1.8.1) Gecko/20061208 Firefox/2.0.0 Opera 9.50",
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:34.0) Gecko/20100101 Firefox/34.0",
];

/// An immutable description of one HTTP call, parameterized over the item
/// type its callback may produce.
pub struct Request<T> {
    /// Target URL.
    pub url: Url,
    /// HTTP method, GET unless constructed via [`Request::form`] or
    /// [`Request::json`].
    pub method: Method,
    /// Query parameters appended to the URL.
    pub params: Vec<(String, String)>,
    /// Request headers, normalized at construction.
    pub headers: HeaderMap,
    /// Cookies sent with this request, in addition to the shared jar.
    pub cookies: Vec<(String, String)>,
    /// Per-attempt transport timeout.
    pub timeout: Duration,
    /// Optional proxy for this request only.
    pub proxy: Option<Url>,
    /// Urlencoded form body, set by [`Request::form`].
    pub form: Option<Vec<(String, String)>>,
    /// JSON body, set by [`Request::json`].
    pub json: Option<Value>,
    /// Callback invoked with the built response. Absent callbacks are
    /// logged and the response is discarded.
    pub callback: Option<Callback<T>>,
    /// Mutable per-request context; the only channel for retry counters.
    pub meta: Meta,
}

impl<T> Request<T> {
    /// Creates a GET request with the default header set.
    pub fn new(url: Url) -> Self {
        Request {
            url,
            method: Method::GET,
            params: Vec::new(),
            headers: default_headers(),
            cookies: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
            form: None,
            json: None,
            callback: None,
            meta: Meta::new(),
        }
    }

    /// Creates a GET request from a string URL.
    pub fn get(url: &str) -> Result<Self, CrawlError> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Creates a POST request carrying an urlencoded form body.
    pub fn form(url: Url, fields: Vec<(String, String)>) -> Self {
        let mut request = Self::new(url);
        request.method = Method::POST;
        request.form = Some(fields);
        request
    }

    /// Creates a POST request carrying a JSON body.
    pub fn json(url: Url, body: Value) -> Self {
        let mut request = Self::new(url);
        request.method = Method::POST;
        request.json = Some(body);
        request
    }

    /// Overrides the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Replaces the header set entirely. Explicit headers suppress the
    /// defaults assigned at construction.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Inserts a single header into the current set. Invalid names or
    /// values are logged and skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (name.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!("ignoring invalid header: {}", name),
        }
        self
    }

    /// Appends a query parameter.
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    /// Appends a cookie sent with this request.
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets the per-attempt transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Routes this request through the given proxy.
    pub fn with_proxy(mut self, proxy: Url) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Sets the parsing callback.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(Response) -> anyhow::Result<Vec<Output<T>>> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Replaces the metadata map.
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// Inserts a single metadata entry.
    pub fn with_meta_entry(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    /// Number of times this request has already been retried, read from
    /// the metadata map (0 when absent).
    pub fn retry_count(&self) -> u64 {
        self.meta
            .get(RETRY_TIMES_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Increments the retry counter in place and returns the new value.
    pub(crate) fn bump_retry_count(&mut self) -> u64 {
        let retries = self.retry_count() + 1;
        self.meta.insert(RETRY_TIMES_KEY.to_string(), retries.into());
        retries
    }
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Request {
            url: self.url.clone(),
            method: self.method.clone(),
            params: self.params.clone(),
            headers: self.headers.clone(),
            cookies: self.cookies.clone(),
            timeout: self.timeout,
            proxy: self.proxy.clone(),
            form: self.form.clone(),
            json: self.json.clone(),
            callback: self.callback.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<T> fmt::Display for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Request {} {}>", self.method, self.url)
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("url", &self.url.as_str())
            .field("method", &self.method)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
    let agent = USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .expect("user agent pool is not empty");
    headers.insert(USER_AGENT, HeaderValue::from_static(agent));
    headers
}
