//! `spot-harvest sessions`: inspect and clear stored sessions.

use crate::cli::output::{self, Styled};
use crate::cli::setup;
use crate::config::HarvestConfig;
use anyhow::Result;

pub fn list(config: &HarvestConfig) -> Result<()> {
    let s = Styled::new();
    let store = setup::open_sessions(config)?;
    let mut infos = Vec::new();
    for key in store.list()? {
        if let Some(info) = store.info(&key)? {
            infos.push(info);
        }
    }

    if output::is_json() {
        output::print_json(&infos);
        return Ok(());
    }
    if infos.is_empty() {
        eprintln!("  No stored sessions.");
        return Ok(());
    }
    output::print_section(&s, "Sessions");
    for info in &infos {
        let sym = if info.is_valid { s.ok_sym() } else { s.fail_sym() };
        let remaining = if info.is_valid {
            output::format_duration((info.remaining_hours * 3600.0).max(0.0) as u64)
        } else {
            s.red("expired")
        };
        output::print_check(
            &sym,
            &info.source_key,
            &format!("{} cookies, {remaining} left", info.cookie_count),
        );
    }
    Ok(())
}

pub fn clear(config: &HarvestConfig, key: Option<&str>) -> Result<()> {
    let s = Styled::new();
    let store = setup::open_sessions(config)?;
    let keys = match key {
        Some(k) => vec![k.to_string()],
        None => store.list()?,
    };
    let mut cleared = Vec::new();
    for k in keys {
        if store.invalidate(&k)? {
            cleared.push(k);
        }
    }

    if output::is_json() {
        output::print_json(&serde_json::json!({ "cleared": cleared }));
    } else if cleared.is_empty() {
        eprintln!("  {} Nothing to clear.", s.info_sym());
    } else {
        for k in &cleared {
            eprintln!("  {} Cleared session for {}", s.ok_sym(), s.bold(k));
        }
    }
    Ok(())
}
