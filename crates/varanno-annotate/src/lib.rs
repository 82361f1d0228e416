//! varanno Annotation Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! A disciplined client for the Ensembl Variant Effect Predictor.
//!
//! # Overview
//!
//! - **Detection**: classify raw variant strings and derive a canonical key (`detect`)
//! - **Caching**: TTL cache of normalized results keyed by canonical key (`cache`)
//! - **Rate Limiting**: sliding-window limiter shared by every caller (`rate_limit`)
//! - **Upstream**: the [`oracle::VepOracle`] seam and its HTTP implementation (`oracle`)
//! - **Annotation**: detection, cache, limiter and upstream wired together (`client`)
//! - **Batch Enrichment**: fault-tolerant runs over many variants (`enrich`, `store`)
//!
//! # Example
//!
//! ```no_run
//! use varanno_annotate::{AnnotationClient, AnnotatorConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = AnnotatorConfig::load()?;
//! let client = AnnotationClient::from_config(&config)?;
//!
//! let result = client.annotate("17:41234470:T:A").await?;
//! println!("{} ({})", result.consequence, result.impact);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod detect;
pub mod enrich;
pub mod error;
pub mod oracle;
pub mod rate_limit;
pub mod store;

// Re-export commonly used types
pub use cache::ResponseCache;
pub use client::AnnotationClient;
pub use config::AnnotatorConfig;
pub use detect::{detect, VariantFormat, VariantQuery};
pub use enrich::{EnrichmentJob, EnrichmentStats, RetryPolicy};
pub use error::AnnotateError;
pub use rate_limit::RateLimiter;
pub use store::{AnnotationStore, JsonFileStore, MemoryStore};
