//! Run settings, loaded from an optional TOML file.
//!
//! Every key is optional; anything left out falls back to the defaults
//! below, which reproduce the classic behaviour: files land in the current
//! directory, elements are drawn from `1..=100`, five checkpoints per shard.

use crate::error::{MatmulError, Result};
use crate::log::LogLevel;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub partial_prefix: String,
    pub final_result_file: String,
    pub log_file: String,
    pub min_value: i64,
    pub max_value: i64,
    pub checkpoints_per_shard: usize,
    pub log_poll_interval_ms: u64,
    pub result_timeout_secs: u64,
    pub echo_to_console: bool,
    pub log_matrices: bool,
    pub min_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            partial_prefix: "partial_result".to_string(),
            final_result_file: "final_result.txt".to_string(),
            log_file: "matrix_multiplication.log".to_string(),
            min_value: 1,
            max_value: 100,
            checkpoints_per_shard: 5,
            log_poll_interval_ms: 100,
            result_timeout_secs: 300,
            echo_to_console: true,
            log_matrices: true,
            min_level: LogLevel::Info,
        }
    }
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|err| MatmulError::config(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| MatmulError::io(path, err))?;
        Self::from_toml(&content)
    }

    /// Loads `path` if given, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_value > self.max_value {
            return Err(MatmulError::config(format!(
                "min_value ({}) must not exceed max_value ({})",
                self.min_value, self.max_value
            )));
        }
        let magnitude = self.min_value.unsigned_abs().max(self.max_value.unsigned_abs());
        if magnitude
            .checked_mul(magnitude)
            .map_or(true, |square| square > i64::MAX as u64)
        {
            return Err(MatmulError::config(format!(
                "values up to {magnitude} in magnitude overflow a 64-bit product"
            )));
        }
        if self.checkpoints_per_shard == 0 {
            return Err(MatmulError::config("checkpoints_per_shard must be at least 1"));
        }
        if self.log_poll_interval_ms == 0 {
            return Err(MatmulError::config("log_poll_interval_ms must be at least 1"));
        }
        if self.result_timeout_secs == 0 {
            return Err(MatmulError::config("result_timeout_secs must be at least 1"));
        }
        for (field, value) in [
            ("partial_prefix", &self.partial_prefix),
            ("final_result_file", &self.final_result_file),
            ("log_file", &self.log_file),
        ] {
            if value.trim().is_empty() {
                return Err(MatmulError::config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(&self.log_file)
    }

    pub fn final_result_path(&self) -> PathBuf {
        self.output_dir.join(&self.final_result_file)
    }

    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_millis(self.log_poll_interval_ms)
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }
}
