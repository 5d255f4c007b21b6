//! Locate and read the configuration file, then apply environment overrides.

use super::HarvestConfig;
use crate::error::ConfigError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config path.
pub const CONFIG_ENV: &str = "SPOT_HARVEST_CONFIG";
const MAX_CONCURRENT_ENV: &str = "SPOT_HARVEST_MAX_CONCURRENT";

/// Load configuration from an explicit TOML file.
pub fn load_from(path: &Path) -> Result<HarvestConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: HarvestConfig = toml::from_str(&content)?;
    apply_env_overrides(&mut cfg)?;
    cfg.validate()?;
    info!("loaded config from {}", path.display());
    Ok(cfg)
}

/// Load configuration using env var + fallbacks:
/// 1) $SPOT_HARVEST_CONFIG
/// 2) config/harvest.toml
/// 3) ~/.spot-harvest/harvest.toml
/// 4) built-in defaults
pub fn load_default() -> Result<HarvestConfig, ConfigError> {
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(ConfigError::invalid(format!(
                "{CONFIG_ENV} points to non-existent path {}",
                pb.display()
            )));
        }
        return load_from(&pb);
    }

    let local = PathBuf::from("config/harvest.toml");
    if local.exists() {
        return load_from(&local);
    }

    if let Some(home) = dirs::home_dir() {
        let p = home.join(".spot-harvest").join("harvest.toml");
        if p.exists() {
            return load_from(&p);
        }
    }

    debug!("no config file found, using defaults");
    let mut cfg = HarvestConfig::default();
    apply_env_overrides(&mut cfg)?;
    cfg.validate()?;
    Ok(cfg)
}

fn apply_env_overrides(cfg: &mut HarvestConfig) -> Result<(), ConfigError> {
    if let Ok(v) = std::env::var(MAX_CONCURRENT_ENV) {
        cfg.fetch.max_concurrent = v.trim().parse().map_err(|_| {
            ConfigError::invalid(format!("{MAX_CONCURRENT_ENV} is not a number: {v}"))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
            [fetch]
            maxConcurrent = 8
            perHostFraction = 0.5

            [[extraction.gazetteer]]
            name = "Saint-Béat"
            lat = 42.9139
            lon = 0.6911
            "#
        )
        .unwrap();

        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg.fetch.per_host_limit(), 4);
        assert_eq!(cfg.extraction.gazetteer.len(), 1);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_from(Path::new("/nonexistent/harvest.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
