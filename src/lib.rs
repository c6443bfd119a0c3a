//! # article_harvest
//!
//! Extracts structured records (title, date, author, content) from news
//! article pages using per-publisher instruction tables, and fetches those
//! pages in resumable batches that retry transient failures a bounded
//! number of times.
//!
//! ## Architecture
//!
//! 1. **Fetching**: [`fetch::BatchCoordinator`] walks a batch of URLs (or a
//!    keyword search) through a [`fetch::DocumentSource`], one at a time.
//! 2. **Identification**: [`sites::SiteIdentityResolver`] maps each page's
//!    canonical URL to a [`models::Publisher`].
//! 3. **Extraction**: [`extract::RecordExtractor`] looks up the publisher's
//!    [`registry::InstructionSet`] and resolves each field through ordered
//!    fallback query groups evaluated by a [`selector::SelectorEngine`].
//! 4. **Output**: [`outputs::json`] writes records and skipped URLs per
//!    keyword.
//!
//! [`pipeline::Harvester`] wires the steps together.

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod outputs;
pub mod pipeline;
pub mod registry;
pub mod selector;
pub mod sites;
pub mod utils;
