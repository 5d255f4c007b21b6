//! spot-harvest: fetch pages from spot-sharing sources under per-source rate
//! limits, pull coordinates out of free text, validate, deduplicate and store.

pub mod acquisition;
pub mod audit;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod extraction;
pub mod pipeline;
pub mod pool;
pub mod stealth;
pub mod trust;
