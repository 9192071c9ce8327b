//! Run configuration stored in `sectrun.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::DriverOptions;
use crate::registry::RunOrder;
use crate::session::SessionOptions;

pub const DEFAULT_CONFIG_PATH: &str = "sectrun.toml";

/// Run configuration (TOML).
///
/// Every field is optional in the file. CLI flags override what is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    pub order: RunOrder,

    /// Seed for `order = "random"`; unset means a fresh shuffle per run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Name filters, each a comma-separated list of prefixes.
    pub filters: Vec<String>,

    /// Print every section start and end, not just failures.
    pub verbose: bool,

    /// Treat a panic escaping a test body as fatal for the whole run.
    pub panic_is_fatal: bool,

    /// Upper bound on cycles for a single test case.
    pub max_cycles: u32,

    /// Write a JSON summary of the run here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let driver = DriverOptions::default();
        Self {
            order: RunOrder::default(),
            seed: None,
            filters: Vec::new(),
            verbose: false,
            panic_is_fatal: driver.panic_is_fatal,
            max_cycles: driver.max_cycles,
            summary_path: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_cycles == 0 {
            return Err(anyhow!("max_cycles must be > 0"));
        }
        if self.filters.iter().any(|filter| filter.trim().is_empty()) {
            return Err(anyhow!("filters must not contain empty entries"));
        }
        if self.seed.is_some() && self.order != RunOrder::Random {
            return Err(anyhow!("seed is only meaningful with order = \"random\""));
        }
        if self
            .summary_path
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            return Err(anyhow!("summary_path must not be empty"));
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            order: self.order,
            seed: self.seed,
            driver: DriverOptions {
                panic_is_fatal: self.panic_is_fatal,
                max_cycles: self.max_cycles,
            },
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = RunConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RunConfig::default());
        assert!(cfg.panic_is_fatal);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sectrun.toml");
        let cfg = RunConfig {
            order: RunOrder::Random,
            seed: Some(42),
            filters: vec!["math".to_string()],
            summary_path: Some(PathBuf::from("out/summary.json")),
            ..RunConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sectrun.toml");
        fs::write(&path, "order = \"declaration\"\nverbose = true\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.order, RunOrder::Declaration);
        assert!(cfg.verbose);
        assert_eq!(cfg.max_cycles, RunConfig::default().max_cycles);
    }

    #[test]
    fn seed_without_random_order_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sectrun.toml");
        fs::write(&path, "seed = 3\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("seed is only meaningful"));
    }

    #[test]
    fn unknown_order_fails_to_parse() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sectrun.toml");
        fs::write(&path, "order = \"sideways\"\n").expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn session_options_carry_driver_settings() {
        let cfg = RunConfig {
            panic_is_fatal: false,
            max_cycles: 12,
            ..RunConfig::default()
        };
        let options = cfg.session_options();
        assert!(!options.driver.panic_is_fatal);
        assert_eq!(options.driver.max_cycles, 12);
    }
}
