//! # Builder Module
//!
//! Provides the `CrawlerBuilder`, a fluent API for constructing and
//! configuring [`Crawler`] instances.
//!
//! ## Overview
//!
//! The builder gathers the engine's configuration knobs (concurrency
//! limit, retry budget, inter-request delay, queue discipline, cookie
//! handling), the optional result sink and the seed requests, validates
//! them, and constructs the shared transport session. Misconfiguration
//! fails fast at [`build`](CrawlerBuilder::build) with
//! [`CrawlError::Configuration`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use scuttle::{CrawlerBuilder, QueueDiscipline, Request};
//!
//! let crawler = CrawlerBuilder::new()
//!     .concurrent_requests(16)
//!     .max_retries(2)
//!     .discipline(QueueDiscipline::Fifo)
//!     .result_sink(|item: serde_json::Value| {
//!         println!("{item}");
//!         Ok(())
//!     })
//!     .build()?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::crawler::Crawler;
use crate::error::CrawlError;
use crate::queue::QueueDiscipline;
use crate::request::{Callback, Request};
use crate::response::Response;
use crate::router::{Output, ResultSink};

/// Configuration for the engine's scheduling behaviour.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of concurrently in-flight fetches per cycle.
    pub concurrent_requests: usize,
    /// How many times a transiently failed request is re-attempted before
    /// being dropped.
    pub max_retries: u64,
    /// Fixed delay applied before each fetch (rate limiting).
    pub download_delay: Duration,
    /// Ordering policy of the pending-request queue, fixed for the
    /// engine's lifetime.
    pub discipline: QueueDiscipline,
    /// Whether the shared transport session keeps a cookie jar.
    pub handle_cookies: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            concurrent_requests: 10,
            max_retries: 3,
            download_delay: Duration::ZERO,
            discipline: QueueDiscipline::Lifo,
            handle_cookies: true,
        }
    }
}

/// Fluent builder for [`Crawler`] instances.
pub struct CrawlerBuilder<T> {
    config: CrawlerConfig,
    sink: Option<ResultSink<T>>,
    default_callback: Option<Callback<T>>,
    requests: Vec<Request<T>>,
}

impl<T> Default for CrawlerBuilder<T> {
    fn default() -> Self {
        CrawlerBuilder {
            config: CrawlerConfig::default(),
            sink: None,
            default_callback: None,
            requests: Vec::new(),
        }
    }
}

impl<T> CrawlerBuilder<T> {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration at once.
    pub fn config(mut self, config: CrawlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the maximum number of concurrently in-flight fetches.
    pub fn concurrent_requests(mut self, limit: usize) -> Self {
        self.config.concurrent_requests = limit;
        self
    }

    /// Sets the retry budget for transient failures.
    pub fn max_retries(mut self, retries: u64) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Sets the fixed delay applied before each fetch.
    pub fn download_delay(mut self, delay: Duration) -> Self {
        self.config.download_delay = delay;
        self
    }

    /// Sets the queue discipline (FIFO: breadth-first, LIFO: depth-first).
    pub fn discipline(mut self, discipline: QueueDiscipline) -> Self {
        self.config.discipline = discipline;
        self
    }

    /// Enables or disables the shared cookie jar.
    pub fn handle_cookies(mut self, enabled: bool) -> Self {
        self.config.handle_cookies = enabled;
        self
    }

    /// Sets the function invoked once per non-request output.
    pub fn result_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Sets the callback used for requests that carry none of their own.
    /// Spider entry points bind `Spider::parse` here so derived requests
    /// are parsed without explicit wiring.
    pub fn default_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(Response) -> anyhow::Result<Vec<Output<T>>> + Send + Sync + 'static,
    {
        self.default_callback = Some(Arc::new(callback));
        self
    }

    /// Adds one seed request.
    pub fn request(mut self, request: Request<T>) -> Self {
        self.requests.push(request);
        self
    }

    /// Adds a batch of seed requests.
    pub fn requests(mut self, requests: impl IntoIterator<Item = Request<T>>) -> Self {
        self.requests.extend(requests);
        self
    }

    /// Validates the configuration, constructs the transport session and
    /// builds the engine with the seed requests enqueued.
    pub fn build(self) -> Result<Crawler<T>, CrawlError> {
        if self.config.concurrent_requests == 0 {
            return Err(CrawlError::Configuration(
                "concurrent_requests must be greater than 0".into(),
            ));
        }

        let client = Client::builder()
            .cookie_store(self.config.handle_cookies)
            .build()?;

        let crawler = Crawler::new(client, &self.config, self.sink, self.default_callback);
        for request in self.requests {
            crawler.add_request(request);
        }
        Ok(crawler)
    }
}
