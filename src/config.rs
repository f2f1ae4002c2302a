//! Compiler configuration
//!
//! Every field has a default, so `{}` is a valid configuration file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::planner::{ExplainConfig, OptimizerConfig};
use crate::psl::PslLimits;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default)]
    pub psl: PslLimits,

    #[serde(default = "default_max_filter_depth")]
    pub max_filter_depth: usize,

    #[serde(default = "default_max_filter_conditions")]
    pub max_filter_conditions: usize,

    /// Applied to non-aggregate queries without a page size
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Used when the query has no timeout; 0 disables the deadline
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub explain: ExplainConfig,
}

fn default_max_filter_depth() -> usize {
    16
}
fn default_max_filter_conditions() -> usize {
    256
}
fn default_page_size() -> u32 {
    50
}
fn default_max_page_size() -> u32 {
    1000
}
fn default_timeout_ms() -> u64 {
    5000
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            psl: PslLimits::default(),
            max_filter_depth: default_max_filter_depth(),
            max_filter_conditions: default_max_filter_conditions(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            default_timeout_ms: default_timeout_ms(),
            optimizer: OptimizerConfig::default(),
            explain: ExplainConfig::default(),
        }
    }
}

impl CompilerConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: CompilerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("psl.max_patterns", self.psl.max_patterns),
            ("psl.max_segments", self.psl.max_segments),
            ("psl.max_recursive_wildcards", self.psl.max_recursive_wildcards),
            ("max_filter_depth", self.max_filter_depth),
            ("max_filter_conditions", self.max_filter_conditions),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }

        if self.default_page_size == 0 {
            return Err(ConfigError::Invalid("default_page_size must be > 0".into()));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid(format!(
                "default_page_size {} exceeds max_page_size {}",
                self.default_page_size, self.max_page_size
            )));
        }

        self.optimizer.validate().map_err(ConfigError::Invalid)?;
        if !(self.explain.misestimate_ratio > 1.0) {
            return Err(ConfigError::Invalid(
                "explain.misestimate_ratio must be > 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = write_config("{}");
        let config = CompilerConfig::load(file.path()).unwrap();
        assert_eq!(config, CompilerConfig::default());
        assert_eq!(config.psl.max_patterns, 200);
        assert_eq!(config.default_page_size, 50);
    }

    #[test]
    fn test_partial_override() {
        let file = write_config(r#"{"max_page_size": 200, "optimizer": {"index_selectivity_threshold": 0.05}}"#);
        let config = CompilerConfig::load(file.path()).unwrap();
        assert_eq!(config.max_page_size, 200);
        assert_eq!(config.optimizer.index_selectivity_threshold, 0.05);
        assert_eq!(config.optimizer.nested_loop_max_rows, 16);
    }

    #[test]
    fn test_rejects_zero_limits() {
        let file = write_config(r#"{"max_filter_depth": 0}"#);
        let err = CompilerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let file = write_config(r#"{"optimizer": {"index_selectivity_threshold": 1.5}}"#);
        assert!(CompilerConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = CompilerConfig::load(Path::new("/nonexistent/querycraft.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{not json");
        assert!(matches!(
            CompilerConfig::load(file.path()).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
