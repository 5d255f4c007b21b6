//! JSONL audit logger: one line per finished ingest run.

use crate::pipeline::report::RunSummary;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A single audit event.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent<'a> {
    pub timestamp: String,
    pub command: &'a str,
    pub status: &'a str,
    pub duration_ms: Option<i64>,
    pub summary: &'a RunSummary,
}

/// Append-only JSONL audit logger.
pub struct AuditLogger {
    file: File,
    path: PathBuf,
}

impl AuditLogger {
    /// Open or create the audit log file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open audit log: {}", path.display()))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Default location: ~/.spot-harvest/audit.jsonl.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".spot-harvest")
            .join("audit.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log an audit event.
    pub fn log(&mut self, event: &AuditEvent<'_>) -> Result<()> {
        let json = serde_json::to_string(event)?;
        writeln!(self.file, "{json}")?;
        Ok(())
    }

    /// Log a finished run.
    pub fn log_run(&mut self, command: &str, summary: &RunSummary) -> Result<()> {
        let status = if summary.cancelled { "cancelled" } else { "ok" };
        self.log(&AuditEvent {
            timestamp: Utc::now().to_rfc3339(),
            command,
            status,
            duration_ms: summary.elapsed_ms(),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_are_appended_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");

        let mut summary = RunSummary::new("forum");
        summary.stored = 3;
        summary.finish();
        {
            let mut logger = AuditLogger::open(&path).unwrap();
            logger.log_run("ingest", &summary).unwrap();
        }
        let mut logger = AuditLogger::open(&path).unwrap();
        logger.log_run("fetch", &summary).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["command"], "ingest");
        assert_eq!(first["summary"]["stored"], 3);
        assert_eq!(first["summary"]["source_key"], "forum");
    }
}
