//! # scuttle
//!
//! A small asynchronous crawling engine: seed it with HTTP requests, and
//! it fetches them with bounded concurrency, hands each decoded response
//! to the request's callback, routes callback outputs back into the queue
//! (further requests) or out to a result sink (everything else), and
//! retries transient failures up to a configured budget.
//!
//! ## Example
//!
//! ```rust,ignore
//! use scuttle::{CrawlerBuilder, Output, QueueDiscipline, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), scuttle::CrawlError> {
//!     let crawler = CrawlerBuilder::new()
//!         .concurrent_requests(8)
//!         .discipline(QueueDiscipline::Fifo)
//!         .result_sink(|item: serde_json::Value| {
//!             println!("{item}");
//!             Ok(())
//!         })
//!         .build()?;
//!
//!     crawler.add_request(Request::get("https://example.com")?.with_callback(
//!         |response| {
//!             let mut outputs = Vec::new();
//!             for link in response.css("a[href]")? {
//!                 if let Some(href) = link.value().attr("href") {
//!                     outputs.push(Output::request(response.follow(href)?));
//!                 }
//!             }
//!             outputs.push(Output::item(serde_json::json!({
//!                 "url": response.url().as_str(),
//!                 "status": response.status().as_u16(),
//!             })));
//!             Ok(outputs)
//!         },
//!     ));
//!
//!     crawler.run().await?;
//!     crawler.close();
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod crawler;
pub mod error;
pub mod prelude;
pub mod queue;
pub mod request;
pub mod response;
pub mod router;
pub mod spider;
pub mod stats;

pub use builder::{CrawlerBuilder, CrawlerConfig};
pub use crawler::Crawler;
pub use error::CrawlError;
pub use queue::QueueDiscipline;
pub use request::{Callback, Meta, Request};
pub use response::Response;
pub use router::{Output, OutputRouter, ResultSink};
pub use spider::{Spider, crawl, crawl_with};
pub use stats::{StatCollector, StatsSnapshot};

pub use reqwest::{Method, StatusCode};
pub use url::Url;
