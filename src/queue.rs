//! # Queue Module
//!
//! The pending-request queue: the crawling frontier the engine drains in
//! bounded cycles.
//!
//! Two disciplines are supported, fixed at engine construction: FIFO for
//! breadth-first traversal of discovered links, LIFO for depth-first.
//! Enqueue is safe from many concurrently finishing tasks; the engine is
//! the single consumer and pulls whole batches between cycles.

use std::collections::VecDeque;
use std::str::FromStr;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::CrawlError;
use crate::request::Request;

/// Ordering policy for the pending-request queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueDiscipline {
    /// First in, first out: breadth-first traversal.
    Fifo,
    /// Last in, first out: depth-first traversal.
    Lifo,
}

impl FromStr for QueueDiscipline {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(QueueDiscipline::Fifo),
            "lifo" => Ok(QueueDiscipline::Lifo),
            other => Err(CrawlError::Configuration(format!(
                "queue discipline expects \"fifo\" or \"lifo\", got {:?}",
                other
            ))),
        }
    }
}

/// A mutable ordered collection of requests awaiting an attempt.
pub(crate) struct RequestQueue<T> {
    discipline: QueueDiscipline,
    items: Mutex<VecDeque<Request<T>>>,
}

impl<T> RequestQueue<T> {
    pub fn new(discipline: QueueDiscipline) -> Self {
        RequestQueue {
            discipline,
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueues a request for a later cycle.
    pub fn push(&self, request: Request<T>) {
        trace!("enqueueing {}", request);
        self.items.lock().push_back(request);
    }

    fn pop(items: &mut VecDeque<Request<T>>, discipline: QueueDiscipline) -> Option<Request<T>> {
        match discipline {
            QueueDiscipline::Fifo => items.pop_front(),
            QueueDiscipline::Lifo => items.pop_back(),
        }
    }

    /// Pulls up to `max` requests in one locked pass. Returns fewer only
    /// when the queue underflows; never waits for more items.
    pub fn pull(&self, max: usize) -> Vec<Request<T>> {
        let mut items = self.items.lock();
        let mut batch = Vec::with_capacity(max.min(items.len()));
        while batch.len() < max {
            match Self::pop(&mut items, self.discipline) {
                Some(request) => batch.push(request),
                None => break,
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
