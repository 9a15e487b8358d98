//! Tweetload ingest library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Parallel extraction of tweet archives into per-table row files, followed by
//! a tier-ordered, idempotent merge into PostgreSQL.
//!
//! # Stages
//!
//! 1. [`arena::ExtractionArena`] fans [`partition::PartitionWorker`]s out over
//!    disjoint sets of input files. Each worker runs the [`extract::Extractor`]
//!    on every document and writes rows to its own row files.
//! 2. [`scheduler::MergeScheduler`] runs [`loader::TableLoader`] tasks tier by
//!    tier: users, places and hashtags; then tweets; then the tweet children.
//! 3. [`integrity::IntegrityReporter`] counts rows and dangling references.
//!
//! [`pipeline::Pipeline`] ties the stages together.

pub mod arena;
pub mod cli;
pub mod config;
pub mod extract;
pub mod integrity;
pub mod loader;
pub mod partition;
pub mod pipeline;
pub mod report;
pub mod rowfile;
pub mod sanitize;
pub mod scheduler;

pub use config::PipelineConfig;
pub use pipeline::Pipeline;
