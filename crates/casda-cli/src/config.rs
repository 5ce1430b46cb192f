//! # Driver Configuration
//!
//! Resolution order, lowest to highest precedence:
//!
//! 1. built-in defaults,
//! 2. the YAML file given with `--config`,
//! 3. `CASDA_STATE_DIR` / `CASDA_MAX_TICKS`,
//! 4. the `--state-dir` / `--max-ticks` flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding `state_dir`.
pub const ENV_STATE_DIR: &str = "CASDA_STATE_DIR";
/// Environment variable overriding `max_ticks`.
pub const ENV_MAX_TICKS: &str = "CASDA_MAX_TICKS";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Settings for the polling driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DepositConfig {
    /// Directory holding `<sbid>.json` and `<sbid>.signals.json`.
    pub state_dir: PathBuf,
    /// Upper bound of polling calls per `progress` invocation.
    pub max_ticks: u32,
    /// Treat every readiness signal as complete.
    pub auto_complete: bool,
    /// Move encapsulation-bound artefacts from PROCESSING to ENCAPSULATING between ticks.
    pub simulate_jobs: bool,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".casda").join("observations"),
            max_ticks: 64,
            auto_complete: true,
            simulate_jobs: true,
            log_format: LogFormat::Text,
        }
    }
}

impl DepositConfig {
    /// Parse a YAML document. Missing keys take their defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("invalid deposit configuration")
    }

    /// Read a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup(ENV_STATE_DIR).filter(|v| !v.is_empty()) {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(ticks) = lookup(ENV_MAX_TICKS).filter(|v| !v.is_empty()) {
            self.max_ticks = ticks.trim().parse().with_context(|| {
                format!("{ENV_MAX_TICKS} must be a positive integer, got {ticks:?}")
            })?;
        }
        Ok(())
    }

    /// Full resolution: file, process environment, flags.
    pub fn resolve(
        path: Option<&Path>,
        state_dir: Option<&Path>,
        max_ticks: Option<u32>,
    ) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        if let Some(dir) = state_dir {
            config.state_dir = dir.to_path_buf();
        }
        if let Some(ticks) = max_ticks {
            config.max_ticks = ticks;
        }
        anyhow::ensure!(config.max_ticks > 0, "max_ticks must be at least 1");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DepositConfig::default();
        assert_eq!(config.state_dir, PathBuf::from(".casda/observations"));
        assert_eq!(config.max_ticks, 64);
        assert!(config.auto_complete);
        assert!(config.simulate_jobs);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = DepositConfig::from_yaml("max_ticks: 5\nlog_format: json\n").unwrap();
        assert_eq!(config.max_ticks, 5);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.auto_complete);
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(DepositConfig::from_yaml("max_tick: 5\n").is_err());
    }

    #[test]
    fn env_overrides() {
        let mut config = DepositConfig::default();
        config
            .apply_env(|key| match key {
                ENV_STATE_DIR => Some("/var/casda".to_string()),
                ENV_MAX_TICKS => Some("12".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/var/casda"));
        assert_eq!(config.max_ticks, 12);
    }

    #[test]
    fn bad_env_ticks_rejected() {
        let mut config = DepositConfig::default();
        let result = config.apply_env(|key| (key == ENV_MAX_TICKS).then(|| "many".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn load_from_file_and_flags_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casda.yaml");
        std::fs::write(&path, "state_dir: /from/file\nmax_ticks: 3\nauto_complete: false\n")
            .unwrap();

        let config = DepositConfig::load(&path).unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/from/file"));
        assert!(!config.auto_complete);

        let flagged = dir.path().join("flagged");
        let resolved =
            DepositConfig::resolve(Some(path.as_path()), Some(flagged.as_path()), Some(9))
                .unwrap();
        assert_eq!(resolved.state_dir, flagged);
        assert_eq!(resolved.max_ticks, 9);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DepositConfig::load(&dir.path().join("absent.yaml")).is_err());
    }
}
