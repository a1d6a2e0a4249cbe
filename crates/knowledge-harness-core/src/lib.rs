//! # Knowledge Harness Core
//!
//! Shared, I/O-free logic for Knowledge Harness: record models, metadata
//! header parsing, similarity scoring, filename resolution, roadmap graph
//! construction, project step extraction, and the store abstraction.
//!
//! This crate contains no tokio, sqlx, or filesystem access. Anything that
//! needs a disk or a database is reached through the [`store::Store`] and
//! [`steps::GuideLookup`] traits, implemented by the native shell.

pub mod duplicates;
pub mod error;
pub mod frontmatter;
pub mod models;
pub mod resolve;
pub mod roadmap;
pub mod similarity;
pub mod steps;
pub mod store;

pub use error::KbError;
pub use models::{KnowledgeRecord, Level, QueryFilters};
pub use store::Store;
