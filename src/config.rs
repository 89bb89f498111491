//! Navigator configuration
//!
//! Loaded from YAML. Every field has a default, so an empty document is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Environment variable overriding [`NavigatorConfig::random_seed`].
pub const SEED_ENV_VAR: &str = "SEQNAV_RANDOM_SEED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Seed for selection and randomization. Entropy when absent.
    pub random_seed: Option<u64>,
    /// Keep a structured sequencing log alongside the tracing output.
    pub record_sequencing_log: bool,
    /// Whether the table of contents runs a validity simulation per node.
    pub evaluate_toc_rules: bool,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            random_seed: None,
            record_sequencing_log: false,
            evaluate_toc_rules: true,
        }
    }
}

impl NavigatorConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).context("invalid navigator configuration")
    }

    /// Load a YAML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_yaml_str(&text)?.with_env_overrides()?;
        info!(path = %path.display(), "loaded navigator configuration");
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(seed) = std::env::var(SEED_ENV_VAR) {
            self.random_seed = Some(
                seed.parse()
                    .with_context(|| format!("{SEED_ENV_VAR} must be an unsigned integer"))?,
            );
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = NavigatorConfig::from_yaml_str("").unwrap();
        assert_eq!(config, NavigatorConfig::default());
        assert!(config.evaluate_toc_rules);
    }

    #[test]
    fn test_partial_document() {
        let config = NavigatorConfig::from_yaml_str("random_seed: 42\nrecord_sequencing_log: true\n")
            .unwrap();
        assert_eq!(config.random_seed, Some(42));
        assert!(config.record_sequencing_log);
        assert!(config.evaluate_toc_rules);
    }

    #[test]
    fn test_unknown_shape_is_rejected() {
        assert!(NavigatorConfig::from_yaml_str("random_seed: [1, 2]").is_err());
    }
}
