//! Page scrapers for the news portal.
//!
//! Scraping follows the usual two phases:
//!
//! 1. **Indexing**: [`links`] walks search-result pages and collects article
//!    links.
//! 2. **Fetching**: [`article`] downloads each article page and reads its
//!    fields through the fallback chains in [`selector`].
//!
//! Parsing is synchronous and never spans an await point; only fetching is
//! async.

pub mod article;
pub mod links;
pub mod selector;
