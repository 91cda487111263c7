//! Consortium configuration
//!
//! Loaded from TOML, overridden by `CONSORTIUM_<SECTION>_<KEY>` environment
//! variables, then validated. Every field has a default so an empty file is a
//! valid configuration.

mod traits;

pub use traits::Config;

use crate::errors::{ConsortiumError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "CONSORTIUM_";

/// Governance behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Count the proposer's own approval when a proposal is submitted
    pub proposer_votes_on_submit: bool,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            proposer_votes_on_submit: true,
        }
    }
}

/// Recovery behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Recovery threshold used at genesis until a proposal changes it
    pub default_threshold: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            default_threshold: 1,
        }
    }
}

/// Bounded wait behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Deadline used when the caller does not supply one
    pub default_timeout_ms: u64,
    /// First sleep between probes
    pub initial_backoff_ms: u64,
    /// Upper bound on a single sleep
    pub max_backoff_ms: u64,
    /// Growth factor between sleeps
    pub backoff_multiplier: f64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 3_000,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Member selection behavior
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Seed for randomized selection; `None` selects deterministically
    pub seed: Option<u64>,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsortiumConfig {
    /// Governance section
    pub governance: GovernanceConfig,
    /// Recovery section
    pub recovery: RecoveryConfig,
    /// Wait section
    pub wait: WaitConfig,
    /// Selection section
    pub selection: SelectionConfig,
}

impl ConsortiumConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConsortiumError::invalid(format!("Invalid TOML: {e}")))
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ConsortiumError::invalid(format!("Invalid value for {key}: {e}")))
}

impl Config for ConsortiumConfig {
    type Error = ConsortiumError;

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConsortiumError::invalid(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let rest = rest.to_lowercase();
            let Some((section, key)) = rest.split_once('_') else {
                continue;
            };
            self.set_from_string(&format!("{section}.{key}"), &value)?;
        }
        Ok(())
    }

    fn set_from_string(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "governance.proposer_votes_on_submit" => {
                self.governance.proposer_votes_on_submit = parse_value(key, value)?;
            }
            "recovery.default_threshold" => {
                self.recovery.default_threshold = parse_value(key, value)?;
            }
            "wait.default_timeout_ms" => self.wait.default_timeout_ms = parse_value(key, value)?,
            "wait.initial_backoff_ms" => self.wait.initial_backoff_ms = parse_value(key, value)?,
            "wait.max_backoff_ms" => self.wait.max_backoff_ms = parse_value(key, value)?,
            "wait.backoff_multiplier" => self.wait.backoff_multiplier = parse_value(key, value)?,
            "selection.seed" => self.selection.seed = Some(parse_value(key, value)?),
            _ => {
                return Err(ConsortiumError::invalid(format!(
                    "Unknown configuration key: {key}"
                )))
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.recovery.default_threshold == 0 {
            return Err(ConsortiumError::invalid(
                "recovery.default_threshold must be at least 1",
            ));
        }
        if self.wait.initial_backoff_ms == 0 {
            return Err(ConsortiumError::invalid(
                "wait.initial_backoff_ms must be at least 1",
            ));
        }
        if self.wait.max_backoff_ms < self.wait.initial_backoff_ms {
            return Err(ConsortiumError::invalid(
                "wait.max_backoff_ms must not be below wait.initial_backoff_ms",
            ));
        }
        if !self.wait.backoff_multiplier.is_finite() || self.wait.backoff_multiplier < 1.0 {
            return Err(ConsortiumError::invalid(
                "wait.backoff_multiplier must be a finite value >= 1.0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_validate() {
        let config = ConsortiumConfig::defaults();
        assert!(config.validate().is_ok());
        assert!(config.governance.proposer_votes_on_submit);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ConsortiumConfig::from_toml_str(
            r#"
            [recovery]
            default_threshold = 2

            [wait]
            default_timeout_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.recovery.default_threshold, 2);
        assert_eq!(config.wait.default_timeout_ms, 500);
        assert_eq!(config.wait.initial_backoff_ms, 100);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ConsortiumConfig::default();
        config
            .merge_with_vars(vec![
                ("CONSORTIUM_SELECTION_SEED".to_string(), "42".to_string()),
                (
                    "CONSORTIUM_GOVERNANCE_PROPOSER_VOTES_ON_SUBMIT".to_string(),
                    "false".to_string(),
                ),
                ("PATH".to_string(), "/usr/bin".to_string()),
            ])
            .unwrap();
        assert_eq!(config.selection.seed, Some(42));
        assert!(!config.governance.proposer_votes_on_submit);
    }

    #[test]
    fn test_unknown_env_key_rejected() {
        let mut config = ConsortiumConfig::default();
        let result = config.merge_with_vars(vec![(
            "CONSORTIUM_WAIT_FOREVER".to_string(),
            "1".to_string(),
        )]);
        assert_matches!(result, Err(ConsortiumError::Invalid { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("consortium.toml");
        std::fs::write(
            &path,
            "[governance]\nproposer_votes_on_submit = false\n\n[selection]\nseed = 7\n",
        )
        .unwrap();

        let config = ConsortiumConfig::load_from_file(&path).unwrap();
        assert!(!config.governance.proposer_votes_on_submit);
        assert_eq!(config.selection.seed, Some(7));
        assert_eq!(config.recovery.default_threshold, 1);

        let loaded = ConsortiumConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(loaded.selection.seed, Some(7));
    }

    #[test]
    fn test_load_validates_file_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("consortium.toml");
        std::fs::write(&path, "[wait]\ninitial_backoff_ms = 0\n").unwrap();

        assert!(ConsortiumConfig::load_from_file(&path).is_ok());
        assert_matches!(
            ConsortiumConfig::load(Some(path.as_path())),
            Err(ConsortiumError::Invalid { .. })
        );
    }

    #[test]
    fn test_load_from_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert_matches!(
            ConsortiumConfig::load_from_file(&temp_dir.path().join("absent.toml")),
            Err(ConsortiumError::Invalid { .. })
        );
    }

    #[test]
    fn test_validation_rejects_zero_threshold() {
        let mut config = ConsortiumConfig::default();
        config.recovery.default_threshold = 0;
        assert!(config.validate().is_err());
    }
}
