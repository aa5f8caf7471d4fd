//! Host-level configuration: defaults for a `RunConfig` plus kernel runtime tunables,
//! loaded with a fallback chain (explicit path, project-local file, user config dir, defaults).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::governor::{Budgets, Mode, RiskPolicy};

/// Top-level configuration for the `taskkernel` binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunDefaults,
    pub harness: HarnessDefaults,
}

impl Config {
    /// Load with fallback chain: explicit path, then `.taskkernel.yml`, then the user config
    /// dir, then built-in defaults. Failures to parse a discovered file are logged and skipped
    /// rather than aborting, except for an explicitly-named path, which must load successfully.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".taskkernel.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(err) => tracing::warn!("failed to load config from {}: {err}", local_config.display()),
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("taskkernel").join("taskkernel.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(err) => tracing::warn!("failed to load config from {}: {err}", user_config.display()),
                }
            }
        }

        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|err| KernelError::Config(err.to_string()))?;
        tracing::info!("loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Defaults applied to a fresh run when the CLI doesn't override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDefaults {
    #[serde(rename = "mode")]
    pub mode: Mode,

    #[serde(rename = "checkpoint-interval")]
    pub checkpoint_interval: u32,

    #[serde(rename = "budgets")]
    pub budgets: Budgets,

    #[serde(rename = "risk-policy")]
    pub risk_policy: RiskPolicy,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            checkpoint_interval: 10,
            budgets: Budgets::default(),
            risk_policy: RiskPolicy::default(),
        }
    }
}

/// Defaults applied when running the test harness from the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessDefaults {
    #[serde(rename = "fail-fast")]
    pub fail_fast: bool,
}

impl Default for HarnessDefaults {
    fn default() -> Self {
        Self { fail_fast: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.run.checkpoint_interval, 10);
        assert!(!config.harness.fail_fast);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let yaml = "run:\n  checkpoint-interval: 25\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.run.checkpoint_interval, 25);
        assert!(!config.harness.fail_fast);
    }

    #[test]
    fn harness_section_deserializes() {
        let yaml = "harness:\n  fail-fast: true\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.harness.fail_fast);
    }
}
