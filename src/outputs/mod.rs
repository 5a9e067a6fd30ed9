//! Output generation.
//!
//! - [`json`]: per-day intermediate artifacts, merged selections, crawl
//!   results and run statistics, all as JSON files.

pub mod json;
