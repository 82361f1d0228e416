//! varanno Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the varanno workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`VarannoError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Types**: the normalized annotation model returned to callers
//!
//! # Example
//!
//! ```
//! use varanno_common::types::{AnnotationResult, Impact};
//!
//! let result = AnnotationResult::new("missense_variant", Impact::Moderate, "15.8")
//!     .with_score(Some(28.5));
//! assert!(result.impact.is_damaging());
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, VarannoError};
pub use types::{AnnotationResult, Impact};
