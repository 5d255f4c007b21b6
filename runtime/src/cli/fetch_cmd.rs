//! `spot-harvest fetch`: fetch pages for one source and ingest what they contain.

use crate::acquisition::cancel::cancel_pair;
use crate::acquisition::fetcher::BoundedFetcher;
use crate::audit::logger::AuditLogger;
use crate::cli::output::{self, Styled};
use crate::cli::{report, setup};
use crate::config::HarvestConfig;
use crate::error::PipelineError;
use crate::pipeline::{Capabilities, Pipeline, SourceProfile, TextPageParser};
use crate::pool::rate_governor::RateGovernor;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Options for one fetch run.
pub struct FetchArgs {
    pub source: String,
    pub urls: Vec<String>,
    pub urls_file: Option<PathBuf>,
    pub capabilities: Capabilities,
    pub batch_size: usize,
    pub db: Option<PathBuf>,
}

/// URLs from the command line plus one per line of `file`, `#` comments skipped.
pub fn collect_urls(urls: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut all: Vec<String> = urls.to_vec();
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        all.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(String::from),
        );
    }
    Ok(all)
}

pub async fn run(config: &HarvestConfig, args: FetchArgs) -> Result<()> {
    let s = Styled::new();
    let urls = collect_urls(&args.urls, args.urls_file.as_deref())?;
    if urls.is_empty() {
        bail!("no URLs given");
    }

    let store = setup::open_spots(&setup::spot_db_path(args.db))?;
    let sessions = setup::open_sessions(config)?;
    let governor = Arc::new(RateGovernor::new(config));

    let (cancel, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, cancelling run");
            cancel.cancel();
        }
    });

    let fetcher = BoundedFetcher::with_reqwest(config, governor, sessions)?.with_cancel(token.clone());
    let pipeline = Pipeline::new(config, Arc::new(fetcher), store, Arc::new(TextPageParser::new()))
        .with_cancel(token);
    let profile = SourceProfile::new(&args.source)
        .with_capabilities(args.capabilities)
        .with_batch_size(args.batch_size);

    let summary = match pipeline.run(&profile, &urls).await {
        Ok(summary) => summary,
        Err(PipelineError::Cancelled(summary)) => {
            eprintln!("  {} Run cancelled; nothing from the interrupted batch was stored.", s.warn_sym());
            *summary
        }
        Err(e) => return Err(e.into()),
    };

    AuditLogger::open(&AuditLogger::default_path())?.log_run("fetch", &summary)?;

    if output::is_json() {
        output::print_json(&summary);
    } else if !output::is_quiet() {
        report::print_summary(&s, &summary);
    }
    Ok(())
}
