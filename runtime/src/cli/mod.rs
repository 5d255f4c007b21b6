//! CLI subcommand implementations for the spot-harvest binary.

pub mod fetch_cmd;
pub mod fingerprint_cmd;
pub mod ingest_cmd;
pub mod output;
pub mod report;
pub mod sessions_cmd;
pub mod setup;
