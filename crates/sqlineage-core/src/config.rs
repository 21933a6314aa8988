//! Configuration schema (sqlineage.toml)

use serde::{Deserialize, Serialize};

/// How a canonical table folds a new column list into the one it holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMergePolicy {
    /// Set union, first-seen order. Columns are never dropped.
    Union,

    /// Replace the stored list wholesale when the new list is strictly larger
    LargestWins,
}

impl Default for ColumnMergePolicy {
    fn default() -> Self {
        Self::Union
    }
}

/// Table and column aggregation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Column merge policy
    #[serde(default)]
    pub column_merge: ColumnMergePolicy,

    /// Separator for edge column values that name several columns
    #[serde(default = "default_column_delimiter")]
    pub column_delimiter: String,
}

fn default_column_delimiter() -> String {
    ",".to_string()
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            column_merge: ColumnMergePolicy::default(),
            column_delimiter: default_column_delimiter(),
        }
    }
}

/// Realtime update settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Capacity of the raw-record event channel
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Hold edges whose endpoint table is not known yet and replay them later
    #[serde(default = "default_true")]
    pub park_orphan_edges: bool,

    /// Upper bound of parked edges per run; beyond it edges are dropped
    #[serde(default = "default_max_parked")]
    pub max_parked_edges_per_run: usize,
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_max_parked() -> usize {
    10_000
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            park_orphan_edges: true,
            max_parked_edges_per_run: default_max_parked(),
        }
    }
}

/// Query settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Maximum number of search results
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn default_search_limit() -> usize {
    50
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Aggregation settings
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Realtime settings
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Query settings
    #[serde(default)]
    pub query: QueryConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file if it exists, otherwise use defaults
    pub fn load_or_default(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregation.column_delimiter.is_empty() {
            return Err(ConfigError::InvalidValue(
                "aggregation.column_delimiter must not be empty".to_string(),
            ));
        }
        if self.realtime.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "realtime.queue_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.aggregation.column_merge, ColumnMergePolicy::Union);
        assert_eq!(config.aggregation.column_delimiter, ",");
        assert_eq!(config.query.search_limit, 50);
        assert!(config.realtime.park_orphan_edges);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = Config::from_toml(
            r#"
            [aggregation]
            column_merge = "largest_wins"

            [realtime]
            park_orphan_edges = false
            "#,
        )
        .unwrap();

        assert_eq!(config.aggregation.column_merge, ColumnMergePolicy::LargestWins);
        assert_eq!(config.aggregation.column_delimiter, ",");
        assert!(!config.realtime.park_orphan_edges);
        assert_eq!(config.realtime.queue_capacity, 1024);
    }

    #[test]
    fn rejects_empty_delimiter() {
        let result = Config::from_toml("[aggregation]\ncolumn_delimiter = \"\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = Config::load_or_default(std::path::Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
