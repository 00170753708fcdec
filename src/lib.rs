// SPDX-License-Identifier: MPL-2.0
//! # articles-updates-report
//!
//! Counts the articles of a MediaWiki wiki that received a genuine human update within a date range, and lists who made those updates.
//!
//! ## Overview
//!
//! `articles-updates-report` answers one analytical question over the edit history of a wiki: "how many distinct articles (optionally restricted to a category) were updated by a human within a date range, and by whom?"
//!
//! An update is a revision that:
//!
//! - belongs to a non-redirect page in the main namespace,
//! - has a parent revision (page creations are not updates),
//! - lies within the requested dates, both ends inclusive,
//! - was not made by the bulk find/replace tool, recognized by its edit summary,
//! - was not made by a member of an automation group (unless bots are explicitly included).
//!
//! **Key Features:**
//!
//! - **Typed Filters**: Every report query is a freshly built, immutable [`predicate::Predicate`]. Nothing leaks from one query into the next.
//! - **Debug Breakdown**: Editors can be listed with and without bots and partitioned into humans and bots.
//! - **Pluggable Storage**: The engine talks to a [`store::RevisionStore`]. The crate ships an in-memory store that can be populated from XML dumps.
//! - **Localized Wikis**: The bulk edit signature is derived from the wiki's localized edit summary template, category prefixes accept the localized namespace name.
//!
//! ## Getting Started
//!
//! ### Basic Usage
//!
//! Here's a minimal example of a report over a hand-built store:
//!
//! ```rust
//! use articles_updates_report::{
//!     config::ReportConfig,
//!     engine::ReportEngine,
//!     params::ReportParameters,
//!     store::{InMemoryStore, PageRecord, RevisionRecord},
//! };
//! use chrono::{NaiveDate, TimeZone, Utc};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = InMemoryStore::new();
//!     store.insert_page(PageRecord {
//!         id: 1,
//!         namespace: 0,
//!         title: "Rust".into(),
//!         is_redirect: false,
//!     });
//!     let alice = store.ensure_actor("Alice", Some(1));
//!     store.insert_revision(RevisionRecord {
//!         id: 11,
//!         parent_id: Some(10),
//!         timestamp: Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap(),
//!         page_id: 1,
//!         actor_id: alice,
//!         comment: Some("expand history section".into()),
//!     })?;
//!
//!     let engine = ReportEngine::new(store, &ReportConfig::default())?;
//!     let params = ReportParameters::new(
//!         NaiveDate::from_ymd_opt(2024, 1, 1),
//!         NaiveDate::from_ymd_opt(2024, 1, 31),
//!     )
//!     .with_debug_breakdown(true);
//!
//!     let outcome = engine.run(&params)?;
//!     assert_eq!(outcome.updated_pages, 1);
//!     let editors = outcome.editors.unwrap_or_default();
//!     assert!(editors.humans.contains("Alice"));
//!     Ok(())
//! }
//! ```
//!
//! ### Reporting on an XML Dump
//!
//! A full history dump (`pages-meta-history`) can be loaded into the in-memory store:
//!
//! ```rust,no_run
//! use articles_updates_report::{
//!     config::ReportConfig, dump_parser::DumpParser, engine::ReportEngine,
//!     params::ReportParameters, store::InMemoryStore,
//! };
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let xml_dump = File::open("dewiktionary-20240901-pages-meta-history.xml")?;
//!     let mut parser = DumpParser::new(BufReader::new(xml_dump))?;
//!
//!     let mut store = InMemoryStore::new();
//!     parser.load_into(&mut store)?;
//!
//!     let engine = ReportEngine::new(store, &ReportConfig::default())?;
//!     let params = ReportParameters::from_form(
//!         Some("2024-01-01"),
//!         Some("2024-01-31"),
//!         Some("Kategorie:Deutsch"),
//!         false,
//!     )?;
//!     println!("{}", engine.count_distinct_updated_pages(&params)?);
//!     Ok(())
//! }
//! ```
//!
//! Dumps do not contain user group memberships. Register them with [`store::InMemoryStore::add_group_membership`] before running a report, otherwise every editor is classified as human.
//!
//! ## Modules and API
//!
//! ### `engine` Module
//!
//! **Purpose**: Runs reports.
//!
//! - `count_distinct_updated_pages()` counts updated articles, excluding bots.
//! - `distinct_editors()` lists editors with or without bots.
//! - `partition_editors()` splits the editors into humans and bots.
//! - `updated_pages()` lists the updated articles with their latest update.
//! - `run()` combines the count with the optional breakdown.
//!
//! ### `predicate` Module
//!
//! **Purpose**: Composes the filter of a report query. A `Predicate` prints as the SQL-like condition it stands for, which is logged at `debug` level.
//!
//! ### `store` Module
//!
//! **Purpose**: The `RevisionStore` trait, category key normalization and the `InMemoryStore`.
//!
//! ### `actors`, `bulk_edit`, `config` and `params` Modules
//!
//! **Purpose**: Automated actor classification, bulk edit recognition, engine configuration and report parameters (including validation of form input).
//!
//! ### `dump_parser` Module
//!
//! **Purpose**: Parses Wikimedia XML dumps and loads them into an `InMemoryStore`.
//!
//! ## Features and Configuration
//!
//! ### Logging and Error Handling
//!
//! - Uses the `tracing` crate for logging. Composed predicates are logged at `debug` level, store inconsistencies at `error` level.
//! - The parser is designed to recover from errors when possible. Enable the `strict` feature to make the parser terminate upon encountering errors.
//!
//! **Example**:
//!
//! ```toml
//! [dependencies]
//! articles-updates-report = { version = "0.1.0", features = ["strict"] }
//! ```
//!
//! ## Limitations
//!
//! - **XML Format Compatibility**: Tested with Wikimedia dump XML format version 0.11.
//! - **Category Membership**: Categories are taken from the wikitext of the latest revision. Categories added by templates are not detected.
//!
//! ## Licensing
//!
//! This project is licensed under the Mozilla Public License 2.0.

pub mod actors;
pub mod bulk_edit;
pub mod config;
pub mod dump_parser;
pub mod engine;
pub mod params;
pub mod predicate;
pub mod store;

#[cfg(test)]
mod test_support;
