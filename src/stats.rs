//! # Statistics Module
//!
//! Collects counters about the crawl's operation.
//!
//! ## Overview
//!
//! The `StatCollector` tracks request outcomes (sent, succeeded, failed,
//! retried, dropped), routed results and downloaded bytes, all behind
//! atomic counters so concurrently finishing fetch tasks can update them
//! without coordination. A summary line is logged when the engine closes;
//! callers can also snapshot the collector at any time or export it as
//! JSON.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

/// Collects and stores statistics about the crawl's operation.
#[derive(Debug)]
pub struct StatCollector {
    start_time: Instant,

    pub requests_enqueued: AtomicUsize,
    pub requests_sent: AtomicUsize,
    pub requests_succeeded: AtomicUsize,
    pub requests_failed: AtomicUsize,
    pub requests_retried: AtomicUsize,
    pub requests_dropped: AtomicUsize,

    pub results_crawled: AtomicUsize,
    pub total_bytes_downloaded: AtomicUsize,
    pub response_status_counts: Arc<dashmap::DashMap<u16, usize>>,
}

/// A consistent copy of the counters, used for reporting.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatsSnapshot {
    pub requests_enqueued: usize,
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub requests_retried: usize,
    pub requests_dropped: usize,
    pub results_crawled: usize,
    pub total_bytes_downloaded: usize,
    pub response_status_counts: HashMap<u16, usize>,
    pub elapsed: Duration,
}

impl StatCollector {
    pub(crate) fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            requests_enqueued: AtomicUsize::new(0),
            requests_sent: AtomicUsize::new(0),
            requests_succeeded: AtomicUsize::new(0),
            requests_failed: AtomicUsize::new(0),
            requests_retried: AtomicUsize::new(0),
            requests_dropped: AtomicUsize::new(0),
            results_crawled: AtomicUsize::new(0),
            total_bytes_downloaded: AtomicUsize::new(0),
            response_status_counts: Arc::new(dashmap::DashMap::new()),
        }
    }

    /// Creates a snapshot of the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut status_counts = HashMap::new();
        for entry in self.response_status_counts.iter() {
            let (code, count) = entry.pair();
            status_counts.insert(*code, *count);
        }
        StatsSnapshot {
            requests_enqueued: self.requests_enqueued.load(Ordering::SeqCst),
            requests_sent: self.requests_sent.load(Ordering::SeqCst),
            requests_succeeded: self.requests_succeeded.load(Ordering::SeqCst),
            requests_failed: self.requests_failed.load(Ordering::SeqCst),
            requests_retried: self.requests_retried.load(Ordering::SeqCst),
            requests_dropped: self.requests_dropped.load(Ordering::SeqCst),
            results_crawled: self.results_crawled.load(Ordering::SeqCst),
            total_bytes_downloaded: self.total_bytes_downloaded.load(Ordering::SeqCst),
            response_status_counts: status_counts,
            elapsed: self.start_time.elapsed(),
        }
    }

    pub(crate) fn increment_requests_enqueued(&self) {
        self.requests_enqueued.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_succeeded(&self) {
        self.requests_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_retried(&self) {
        self.requests_retried.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_dropped(&self) {
        self.requests_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_results_crawled(&self) {
        self.results_crawled.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_response_status(&self, status_code: u16) {
        *self
            .response_status_counts
            .entry(status_code)
            .or_insert(0) += 1;
    }

    pub(crate) fn add_bytes_downloaded(&self, bytes: usize) {
        self.total_bytes_downloaded
            .fetch_add(bytes, Ordering::SeqCst);
    }

    /// Exports the current counters as a JSON string.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        let status_string = if snapshot.response_status_counts.is_empty() {
            "none".to_string()
        } else {
            let mut entries: Vec<_> = snapshot.response_status_counts.iter().collect();
            entries.sort();
            entries
                .iter()
                .map(|(code, count)| format!("{}: {}", code, count))
                .collect::<Vec<String>>()
                .join(", ")
        };
        write!(
            f,
            "duration: {:?}, requests: enqueued: {}, sent: {}, ok: {}, fail: {}, retry: {}, drop: {}, results: {}, downloaded: {} B, status: {}",
            snapshot.elapsed,
            snapshot.requests_enqueued,
            snapshot.requests_sent,
            snapshot.requests_succeeded,
            snapshot.requests_failed,
            snapshot.requests_retried,
            snapshot.requests_dropped,
            snapshot.results_crawled,
            snapshot.total_bytes_downloaded,
            status_string
        )
    }
}
