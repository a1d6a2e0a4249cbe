//! # Knowledge Harness
//!
//! Ingests a directory-organized markdown knowledge base into SQLite with
//! full-text search, vets new documents against near-duplicates, and builds
//! prerequisite roadmaps.
//!
//! The pure logic (parsing, similarity, resolution, roadmap and step
//! extraction) lives in `knowledge_harness_core`. This crate is the native
//! shell around it: configuration, the SQLite store, the corpus scanner and
//! the `kb` command runners.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite + FTS5 `Store` implementation |
//! | [`scanner`] | Corpus directory walk and per-file parsing |
//! | [`ingest`] | Bulk reindex |
//! | [`projects`] | Project brief pipeline |
//! | [`search`] | Search and listing output |
//! | [`get`] | Single-document lookups |
//! | [`roadmap`] | Roadmap output and export |
//! | [`authoring`] | Duplicate checks and admission |
//! | [`links`] | Broken link report |
//! | [`stats`] | Summaries |
//! | [`progress`] | Reindex progress on stderr |

pub mod authoring;
pub mod config;
pub mod db;
pub mod get;
pub mod ingest;
pub mod links;
pub mod migrate;
pub mod progress;
pub mod projects;
pub mod roadmap;
pub mod scanner;
pub mod search;
pub mod sqlite_store;
pub mod stats;
