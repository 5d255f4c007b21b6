//! Append-only audit trail of ingest runs.

pub mod logger;
