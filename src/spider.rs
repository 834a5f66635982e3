//! # Spider Module
//!
//! The `Spider` trait bundles a crawl's parsing logic, its start requests
//! and its result handling into one type, and [`crawl`] wires it to an
//! explicitly owned engine.
//!
//! ## Example
//!
//! ```rust,ignore
//! use scuttle::{crawl, Output, Response, Spider};
//!
//! struct LinkSpider;
//!
//! impl Spider for LinkSpider {
//!     type Item = String;
//!
//!     fn start_urls(&self) -> Vec<&'static str> {
//!         vec!["https://example.com"]
//!     }
//!
//!     fn parse(&self, response: Response) -> anyhow::Result<Vec<Output<String>>> {
//!         let mut outputs = Vec::new();
//!         for link in response.css("a[href]")? {
//!             if let Some(href) = link.value().attr("href") {
//!                 outputs.push(Output::request(response.follow(href)?));
//!             }
//!         }
//!         outputs.push(Output::item(response.url().to_string()));
//!         Ok(outputs)
//!     }
//!
//!     fn process_result(&self, item: String) -> anyhow::Result<()> {
//!         println!("visited {item}");
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> Result<(), scuttle::CrawlError> {
//! crawl(LinkSpider).await
//! # }
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::builder::{CrawlerBuilder, CrawlerConfig};
use crate::error::CrawlError;
use crate::request::Request;
use crate::response::Response;
use crate::router::Output;

/// Defines the contract for a spider: where a crawl starts, how responses
/// are parsed and what happens to terminal results.
pub trait Spider: Send + Sync + 'static {
    /// The type of terminal result this spider produces.
    type Item: Send + 'static;

    /// Initial URLs to start crawling from.
    fn start_urls(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Generates the initial requests. The default maps
    /// [`start_urls`](Spider::start_urls) to plain GET requests; requests
    /// without a callback get [`parse`](Spider::parse) attached by the
    /// crawl entry point.
    fn start_requests(&self) -> Result<Vec<Request<Self::Item>>, CrawlError> {
        self.start_urls().into_iter().map(Request::get).collect()
    }

    /// Parses a response into further requests and terminal results.
    fn parse(&self, response: Response) -> anyhow::Result<Vec<Output<Self::Item>>>;

    /// Handles one terminal result. The default discards it with a log
    /// line.
    fn process_result(&self, _item: Self::Item) -> anyhow::Result<()> {
        debug!("crawled result discarded by default process_result");
        Ok(())
    }

    /// Invoked once after the crawl has finished and the engine closed.
    fn closed(&self) {}
}

/// Runs a spider to completion with the default configuration.
pub async fn crawl<S: Spider>(spider: S) -> Result<(), CrawlError> {
    crawl_with(spider, CrawlerConfig::default()).await
}

/// Runs a spider to completion with an explicit configuration.
pub async fn crawl_with<S: Spider>(spider: S, config: CrawlerConfig) -> Result<(), CrawlError> {
    let spider = Arc::new(spider);

    let sink_spider = Arc::clone(&spider);
    let parse_spider = Arc::clone(&spider);
    let crawler = CrawlerBuilder::new()
        .config(config)
        .result_sink(move |item| sink_spider.process_result(item))
        .default_callback(move |response| parse_spider.parse(response))
        .build()?;

    for request in spider.start_requests()? {
        crawler.add_request(request);
    }

    let result = crawler.run().await;
    crawler.close();
    spider.closed();
    result
}
