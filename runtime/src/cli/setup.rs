//! Process setup shared by every subcommand: tracing, config, stores.

use crate::acquisition::session_store::{SessionStore, SqliteBackend};
use crate::config::{self, HarvestConfig};
use crate::pipeline::storage::SqliteSpotStore;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Overrides the spot database path.
pub const DB_ENV: &str = "SPOT_HARVEST_DB";

/// Initialize tracing on stderr. `RUST_LOG` wins over the default directive.
pub fn init_tracing(json: bool, verbose: bool) {
    let directive = if verbose {
        "spot_harvest=debug"
    } else {
        "spot_harvest=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Config from `--config`, or the default search path.
pub fn load_config(path: Option<&Path>) -> Result<HarvestConfig> {
    let cfg = match path {
        Some(p) => config::load_from(p)?,
        None => config::load_default()?,
    };
    Ok(cfg)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// SQLite-backed session store at ~/.spot-harvest/sessions.db.
pub fn open_sessions(config: &HarvestConfig) -> Result<Arc<SessionStore>> {
    let path = SqliteBackend::default_path();
    ensure_parent(&path)?;
    let backend = SqliteBackend::open(&path)
        .with_context(|| format!("failed to open session store {}", path.display()))?;
    Ok(Arc::new(SessionStore::new(Arc::new(backend), config.session.ttl())))
}

/// Spot database path: `--db`, then `$SPOT_HARVEST_DB`, then the default.
pub fn spot_db_path(cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| std::env::var_os(DB_ENV).map(PathBuf::from))
        .unwrap_or_else(SqliteSpotStore::default_path)
}

pub fn open_spots(path: &Path) -> Result<Arc<SqliteSpotStore>> {
    ensure_parent(path)?;
    let store = SqliteSpotStore::open(path)
        .with_context(|| format!("failed to open spot database {}", path.display()))?;
    Ok(Arc::new(store))
}
