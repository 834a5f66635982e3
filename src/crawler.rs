//! # Crawler Module
//!
//! The core scheduler: drives concurrency-bounded fetch cycles over the
//! pending-request queue.
//!
//! ## Overview
//!
//! The `Crawler` owns the queue, the shared transport session (a
//! `reqwest::Client` holding the connection pool and optional cookie jar),
//! the output router and a stat collector. [`run`](Crawler::run) drains the
//! queue in cycles: each cycle pulls up to `concurrent_requests` requests,
//! spawns one fetch-and-process task per request, and waits for the whole
//! cycle at a barrier before pulling the next. In-flight fetches therefore
//! never exceed the configured limit, and a request enqueued mid-cycle (a
//! retry or a discovered link) only runs in a later cycle.
//!
//! ## Fault isolation
//!
//! Transient transport errors (connection failures, timeouts) are retried
//! up to `max_retries`, with the counter carried in the request's metadata;
//! exhausted requests are dropped with a log line. Every other error
//! (non-transient transport failures, callback errors, sink errors) is
//! logged and terminates only that request's branch of work. Nothing short
//! of construction-time misconfiguration aborts the crawl as a whole.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::{COOKIE, HeaderValue};
use reqwest::{Client, Proxy};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::builder::CrawlerConfig;
use crate::error::{CrawlError, is_transient};
use crate::queue::{QueueDiscipline, RequestQueue};
use crate::request::{Callback, Request};
use crate::response::{RawResponse, Response};
use crate::router::{OutputRouter, ResultSink};
use crate::stats::StatCollector;

/// The crawl engine. Owns the pending-request queue and drives
/// concurrency-bounded fetch cycles until the queue is drained.
pub struct Crawler<T> {
    queue: Arc<RequestQueue<T>>,
    router: Arc<OutputRouter<T>>,
    client: Client,
    stats: Arc<StatCollector>,
    default_callback: Option<Callback<T>>,
    concurrent_requests: usize,
    max_retries: u64,
    download_delay: Duration,
    discipline: QueueDiscipline,
    closed: AtomicBool,
}

impl<T> Crawler<T> {
    pub(crate) fn new(
        client: Client,
        config: &CrawlerConfig,
        sink: Option<ResultSink<T>>,
        default_callback: Option<Callback<T>>,
    ) -> Self {
        let stats = Arc::new(StatCollector::new());
        let queue = Arc::new(RequestQueue::new(config.discipline));
        let router = Arc::new(OutputRouter::new(
            Arc::clone(&queue),
            sink,
            Arc::clone(&stats),
        ));
        Crawler {
            queue,
            router,
            client,
            stats,
            default_callback,
            concurrent_requests: config.concurrent_requests,
            max_retries: config.max_retries,
            download_delay: config.download_delay,
            discipline: config.discipline,
            closed: AtomicBool::new(false),
        }
    }

    /// Seeds a request onto the pending queue.
    pub fn add_request(&self, request: Request<T>) {
        self.queue.push(request);
        self.stats.increment_requests_enqueued();
    }

    /// Number of requests currently awaiting an attempt.
    pub fn pending_requests(&self) -> usize {
        self.queue.len()
    }

    /// The crawl's statistics collector.
    pub fn stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.stats)
    }

    /// Releases the engine. Logs the final stats line; the transport
    /// session is torn down when its last clone drops. Idempotent, and
    /// also invoked implicitly when the engine is discarded.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("crawler closed. stats: {}", self.stats);
    }
}

impl<T: Send + 'static> Crawler<T> {
    /// Drains the queue to empty, cycle by cycle, then returns.
    pub async fn run(&self) -> Result<(), CrawlError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CrawlError::Configuration(
                "crawler has already been closed".into(),
            ));
        }
        info!(
            "starting crawl: concurrent_requests={}, max_retries={}, discipline={:?}",
            self.concurrent_requests, self.max_retries, self.discipline
        );

        loop {
            let cycle = self.queue.pull(self.concurrent_requests);
            if cycle.is_empty() {
                break;
            }
            trace!("starting cycle of {} requests", cycle.len());

            let mut tasks = JoinSet::new();
            for request in cycle {
                tasks.spawn(fetch_and_process(
                    self.client.clone(),
                    request,
                    Arc::clone(&self.queue),
                    Arc::clone(&self.router),
                    Arc::clone(&self.stats),
                    self.default_callback.clone(),
                    self.download_delay,
                    self.max_retries,
                ));
            }

            // Cycle barrier: every task of this cycle finishes before the
            // next pull.
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    error!("a fetch task failed: {}", err);
                }
            }
        }

        info!("crawl finished, queue drained");
        Ok(())
    }
}

impl<T> Drop for Crawler<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// One fetch-and-process task: optional rate-limit delay, transport call,
/// response construction, callback invocation and output routing.
#[allow(clippy::too_many_arguments)]
async fn fetch_and_process<T: Send + 'static>(
    client: Client,
    request: Request<T>,
    queue: Arc<RequestQueue<T>>,
    router: Arc<OutputRouter<T>>,
    stats: Arc<StatCollector>,
    default_callback: Option<Callback<T>>,
    download_delay: Duration,
    max_retries: u64,
) {
    if !download_delay.is_zero() {
        tokio::time::sleep(download_delay).await;
    }

    let retries = request.retry_count();
    if retries > 0 {
        debug!("retrying download: {} (retried {} times)", request, retries);
    }

    stats.increment_requests_sent();
    match fetch(&client, &request).await {
        Ok(raw) => {
            stats.increment_requests_succeeded();
            stats.record_response_status(raw.status.as_u16());
            stats.add_bytes_downloaded(raw.body.len());
            debug!(
                "downloaded <Response {} {}> ({} bytes)",
                raw.status.as_u16(),
                raw.url,
                raw.body.len()
            );
            handle_response(raw, request, default_callback, &router);
        }
        Err(err) if is_transient(&err) => {
            stats.increment_requests_failed();
            retry_request(request, &err, &queue, &stats, max_retries);
        }
        Err(err) => {
            stats.increment_requests_failed();
            error!("error downloading {}: {}", request, err);
        }
    }
}

/// Performs one transport call with the request's frozen argument set.
async fn fetch<T>(client: &Client, request: &Request<T>) -> Result<RawResponse, reqwest::Error> {
    // A per-request proxy cannot be attached to the shared session, so
    // such attempts get a one-off client.
    let proxied;
    let client = match &request.proxy {
        Some(proxy) => {
            proxied = Client::builder()
                .proxy(Proxy::all(proxy.clone())?)
                .build()?;
            &proxied
        }
        None => client,
    };

    let mut builder = client
        .request(request.method.clone(), request.url.clone())
        .headers(request.headers.clone())
        .timeout(request.timeout);
    if !request.params.is_empty() {
        builder = builder.query(&request.params);
    }
    if let Some(form) = &request.form {
        builder = builder.form(form);
    }
    if let Some(json) = &request.json {
        builder = builder.json(json);
    }
    if !request.cookies.is_empty() {
        let cookie = request
            .cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            builder = builder.header(COOKIE, value);
        }
    }

    let response = builder.send().await?;
    let status = response.status();
    let url = response.url().clone();
    let headers = response.headers().clone();
    let body = response.bytes().await?;
    Ok(RawResponse {
        status,
        url,
        headers,
        body,
    })
}

/// Builds the response, invokes the callback and routes its outputs.
///
/// Synchronous on purpose: the response holds a non-`Send` parsed document
/// and must not live across an await point.
fn handle_response<T>(
    raw: RawResponse,
    request: Request<T>,
    default_callback: Option<Callback<T>>,
    router: &OutputRouter<T>,
) {
    let Some(callback) = request.callback.clone().or(default_callback) else {
        warn!("no callback to parse {}", request);
        return;
    };
    let label = format!("<Response {} {}>", raw.status.as_u16(), raw.url);
    let response = Response::new(raw, request.meta);
    match callback(response) {
        Ok(outputs) => router.route_all(outputs),
        Err(err) => error!("error parsing {}: {:#}", label, err),
    }
}

/// Re-enqueues a transiently failed request, or drops it once the retry
/// budget is spent.
fn retry_request<T>(
    mut request: Request<T>,
    reason: &reqwest::Error,
    queue: &RequestQueue<T>,
    stats: &StatCollector,
    max_retries: u64,
) {
    let retries = request.retry_count();
    if retries < max_retries {
        let attempt = request.bump_retry_count();
        debug!(
            "preparing to retry {} caused by {} ({} of {} retries)",
            request, reason, attempt, max_retries
        );
        stats.increment_requests_retried();
        queue.push(request);
    } else {
        stats.increment_requests_dropped();
        debug!("gave up on {} after {} retries: {}", request, retries, reason);
    }
}
