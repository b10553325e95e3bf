//! Loading `SoaConfig` from a TOML file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use soa_model::SoaConfig;
use tracing::debug;

/// Load configuration from `path`, or the built-in defaults when absent.
pub fn load_config(path: Option<&Path>) -> Result<SoaConfig> {
    let Some(path) = path else {
        return Ok(SoaConfig::default());
    };
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let config = parse_config(&contents).with_context(|| format!("load config {}", path.display()))?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Parse and range-check a TOML configuration.
pub fn parse_config(contents: &str) -> Result<SoaConfig> {
    let config: SoaConfig = toml::from_str(contents).context("parse TOML")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_uses_defaults() {
        let config = load_config(None).expect("defaults");
        assert_eq!(config, SoaConfig::default());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let error = parse_config("[reconcile]\nactivity_min_similarity = 1.5\n")
            .expect_err("invalid threshold");
        assert!(format!("{error:#}").contains("activity_min_similarity"));
    }

    #[test]
    fn validation_cap_is_read() {
        let config = parse_config("[validation]\nmax_violations = 25\n").expect("config");
        assert_eq!(config.validation.max_violations, Some(25));
        assert!((config.validation.weight(soa_model::EntityKind::Activity) - 3.0).abs() < 1e-9);
    }
}
