//! A "prelude" for users of the `scuttle` crate.
//!
//! Re-exports the types needed by nearly every crawl.
//!
//! # Example
//!
//! ```
//! use scuttle::prelude::*;
//! ```

pub use crate::{
    // Core structs
    Crawler,
    CrawlerBuilder,
    CrawlerConfig,
    Output,
    QueueDiscipline,
    Request,
    Response,
    // Core trait and entry points
    Spider,
    crawl,
    crawl_with,
    // Errors
    CrawlError,
};

pub use url::Url;
