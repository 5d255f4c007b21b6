//! Ingest pipeline: orchestration, page parsing, spot storage, run reports.

pub mod orchestrator;
pub mod parser;
pub mod report;
pub mod storage;

pub use orchestrator::{Capabilities, Pipeline, SourceProfile};
pub use parser::{PageParser, SourcePost, TextPageParser};
pub use report::RunSummary;
pub use storage::{MemorySpotStore, SpotStore, SqliteSpotStore};
