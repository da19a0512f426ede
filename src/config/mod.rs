use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::catalog::MutantKind;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Test runner settings
    #[serde(default)]
    pub test: TestConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Gate thresholds, in percent
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Per-operator enable overrides, keyed by operator name
    /// (e.g. `invert_logical = true`)
    #[serde(default)]
    pub operators: HashMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Test runner binary
    #[serde(default = "default_runner")]
    pub runner: String,

    /// `--features` passthrough
    #[serde(default)]
    pub features: Option<String>,

    /// `-j` override for mutation test runs
    #[serde(default)]
    pub jobs: Option<u32>,

    /// Per-mutation deadline is `2s + baseline * coefficient`
    #[serde(default = "default_timeout_coefficient")]
    pub timeout_coefficient: u32,

    /// Run the whole suite per mutation instead of the candidate's package
    #[serde(default)]
    pub integration: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Worker count; defaults to the machine's available parallelism
    #[serde(default)]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Minimum test efficacy in percent, 0 disables the gate
    #[serde(default)]
    pub efficacy: f64,

    /// Minimum mutation coverage in percent, 0 disables the gate
    #[serde(default)]
    pub mutant_coverage: f64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_runner() -> String {
    "cargo".to_string()
}

fn default_timeout_coefficient() -> u32 {
    3
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            runner: default_runner(),
            features: None,
            jobs: None,
            timeout_coefficient: default_timeout_coefficient(),
            integration: false,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            efficacy: 0.0,
            mutant_coverage: 0.0,
        }
    }
}

impl Config {
    /// Load configuration from file, or fall back to defaults when no file
    /// exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::default_config_path);

        let config: Config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config from {:?}", path))?;
                toml::from_str(&contents)
                    .with_context(|| format!("failed to parse config from {:?}", path))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "mutiny", "mutiny")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The mutation kinds this run enumerates: catalog defaults plus the
    /// per-operator overrides.
    pub fn enabled_kinds(&self) -> Vec<MutantKind> {
        MutantKind::ALL
            .into_iter()
            .filter(|kind| {
                self.operators
                    .get(kind.key())
                    .copied()
                    .unwrap_or_else(|| kind.enabled_by_default())
            })
            .collect()
    }

    /// Resolved worker count.
    pub fn workers(&self) -> usize {
        self.engine.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    fn validate(&self) -> Result<()> {
        for (name, bound) in [
            ("thresholds.efficacy", self.thresholds.efficacy),
            ("thresholds.mutant_coverage", self.thresholds.mutant_coverage),
        ] {
            if !(0.0..=100.0).contains(&bound) {
                anyhow::bail!("{name} must be within [0, 100], got {bound}");
            }
        }

        for key in self.operators.keys() {
            if !MutantKind::ALL.iter().any(|k| k.key() == key) {
                anyhow::bail!("unknown operator {key:?} in [operators]");
            }
        }

        Ok(())
    }
}
