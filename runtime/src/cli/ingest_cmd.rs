//! `spot-harvest ingest`: push already-parsed posts through the pipeline.

use crate::acquisition::fetcher::BoundedFetcher;
use crate::audit::logger::AuditLogger;
use crate::cli::output::{self, Styled};
use crate::cli::{report, setup};
use crate::config::HarvestConfig;
use crate::pipeline::{Pipeline, RunSummary, SourcePost, TextPageParser};
use crate::pool::rate_governor::RateGovernor;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Read JSONL posts. Malformed lines are logged and skipped.
pub fn read_posts(reader: impl BufRead, source_override: Option<&str>) -> Result<Vec<SourcePost>> {
    let mut posts = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line.context("failed to read posts")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SourcePost>(&line) {
            Ok(mut post) => {
                if let Some(key) = source_override {
                    post.source_key = key.to_string();
                }
                posts.push(post);
            }
            Err(e) => warn!(line = n + 1, error = %e, "skipping malformed post"),
        }
    }
    Ok(posts)
}

/// Posts grouped by source key, in key order.
pub fn group_by_source(posts: Vec<SourcePost>) -> BTreeMap<String, Vec<SourcePost>> {
    let mut groups: BTreeMap<String, Vec<SourcePost>> = BTreeMap::new();
    for post in posts {
        groups.entry(post.source_key.clone()).or_default().push(post);
    }
    groups
}

pub async fn run(
    config: &HarvestConfig,
    input: &Path,
    source: Option<&str>,
    db: Option<PathBuf>,
) -> Result<()> {
    let s = Styled::new();
    let file = std::fs::File::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let posts = read_posts(BufReader::new(file), source)?;

    let store = setup::open_spots(&setup::spot_db_path(db))?;
    let sessions = setup::open_sessions(config)?;
    let governor = Arc::new(RateGovernor::new(config));
    let fetcher = BoundedFetcher::with_reqwest(config, governor, sessions)?;
    let pipeline = Pipeline::new(config, Arc::new(fetcher), store, Arc::new(TextPageParser::new()));

    let mut audit = AuditLogger::open(&AuditLogger::default_path())?;
    let mut summaries: Vec<RunSummary> = Vec::new();
    for (key, group) in group_by_source(posts) {
        let summary = pipeline.ingest_posts(&key, &group);
        audit.log_run("ingest", &summary)?;
        summaries.push(summary);
    }

    if output::is_json() {
        output::print_json(&summaries);
        return Ok(());
    }
    if summaries.is_empty() {
        eprintln!("  {} No posts in {}", s.warn_sym(), input.display());
        return Ok(());
    }
    for summary in &summaries {
        report::print_summary(&s, summary);
    }
    Ok(())
}
