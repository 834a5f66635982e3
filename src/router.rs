//! # Router Module
//!
//! Classifies every value a callback produces and dispatches it.
//!
//! ## Overview
//!
//! Callbacks yield a sequence of [`Output`] values. Each one is either a
//! further [`Request`](crate::Request), which the router pushes back onto
//! the pending queue, or a terminal item, which it forwards to the
//! configured result sink. This is the sole way new work enters the system
//! once the crawl is running. The variant type is closed and matched
//! exhaustively; there is no runtime type sniffing.
//!
//! Sink failures are logged and never propagate to the engine.

use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::queue::RequestQueue;
use crate::request::Request;
use crate::stats::StatCollector;

/// One value produced by a parsing callback.
pub enum Output<T> {
    /// A further request to enqueue for a later cycle.
    Request(Box<Request<T>>),
    /// A terminal result, forwarded to the result sink.
    Item(T),
}

impl<T> Output<T> {
    /// Wraps a request as an output.
    pub fn request(request: Request<T>) -> Self {
        Output::Request(Box::new(request))
    }

    /// Wraps a terminal item as an output.
    pub fn item(item: T) -> Self {
        Output::Item(item)
    }
}

impl<T> From<Request<T>> for Output<T> {
    fn from(request: Request<T>) -> Self {
        Output::request(request)
    }
}

/// Caller-supplied function invoked once per terminal item, in completion
/// order.
pub type ResultSink<T> = Arc<dyn Fn(T) -> anyhow::Result<()> + Send + Sync>;

/// Routes callback outputs back into the queue or out to the result sink.
pub struct OutputRouter<T> {
    queue: Arc<RequestQueue<T>>,
    sink: Option<ResultSink<T>>,
    stats: Arc<StatCollector>,
}

impl<T> OutputRouter<T> {
    pub(crate) fn new(
        queue: Arc<RequestQueue<T>>,
        sink: Option<ResultSink<T>>,
        stats: Arc<StatCollector>,
    ) -> Self {
        OutputRouter { queue, sink, stats }
    }

    /// Dispatches a single output.
    pub fn route(&self, output: Output<T>) {
        match output {
            Output::Request(request) => {
                trace!("routing {} back to the queue", request);
                self.queue.push(*request);
                self.stats.increment_requests_enqueued();
            }
            Output::Item(item) => {
                self.stats.increment_results_crawled();
                match &self.sink {
                    Some(sink) => {
                        if let Err(err) = sink(item) {
                            error!("error processing result: {:#}", err);
                        }
                    }
                    None => debug!("crawled result discarded, no result sink configured"),
                }
            }
        }
    }

    /// Dispatches every output of one callback invocation, eagerly and in
    /// order. An empty sequence is a no-op.
    pub fn route_all(&self, outputs: Vec<Output<T>>) {
        for output in outputs {
            self.route(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueDiscipline;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn router(
        sink: Option<ResultSink<u32>>,
    ) -> (OutputRouter<u32>, Arc<RequestQueue<u32>>) {
        let queue = Arc::new(RequestQueue::new(QueueDiscipline::Fifo));
        let stats = Arc::new(StatCollector::new());
        (OutputRouter::new(queue.clone(), sink, stats), queue)
    }

    #[test]
    fn requests_are_enqueued() {
        let (router, queue) = router(None);
        router.route(Output::request(Request::get("https://a.test/").unwrap()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn items_reach_the_sink_once_each() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_by_sink = seen.clone();
        let sink: ResultSink<u32> = Arc::new(move |item| {
            seen_by_sink.fetch_add(item as usize, Ordering::SeqCst);
            Ok(())
        });
        let (router, queue) = router(Some(sink));
        router.route_all(vec![Output::item(1), Output::item(2)]);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn sink_errors_do_not_propagate() {
        let sink: ResultSink<u32> = Arc::new(|_| anyhow::bail!("sink exploded"));
        let (router, _queue) = router(Some(sink));
        // Must not panic or abort routing of later outputs.
        router.route_all(vec![Output::item(1), Output::item(2)]);
    }

    #[test]
    fn empty_output_is_a_no_op() {
        let (router, queue) = router(None);
        router.route_all(Vec::new());
        assert!(queue.is_empty());
    }
}
