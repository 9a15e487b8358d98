//! Tweetload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the tweetload workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`IngestError`] and the [`Result`] alias
//! - **Catalog**: the entity tables, their columns, natural keys and merge tiers
//! - **Hashing**: coordination-free tag identifiers
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use tweetload_common::catalog::EntityTable;
//! use tweetload_common::hashing::tag_id;
//!
//! let descriptor = EntityTable::Hashtags.descriptor();
//! assert_eq!(descriptor.columns, &["id", "tag"]);
//! assert_eq!(tag_id("rust"), tag_id("rust"));
//! ```

pub mod catalog;
pub mod error;
pub mod hashing;
pub mod logging;

// Re-export commonly used types
pub use error::{IngestError, Result};
