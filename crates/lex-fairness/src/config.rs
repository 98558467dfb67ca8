//! Configuration types for bias analysis and explanation generation.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic analyzer setup.

use crate::types::TaskMode;
use serde::{Deserialize, Serialize};

/// Default number of rows handed to the prediction function per call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Default number of attribution entries included in a prompt.
pub const DEFAULT_TOP_K: usize = 50;

/// Default number of counterfactual rows described in a prompt.
pub const DEFAULT_MAX_COUNTERFACTUALS: usize = 2;

/// Configuration for [`BiasAnalyzer`](crate::analyzer::BiasAnalyzer).
///
/// Use [`AnalyzerConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use lex_fairness::config::AnalyzerConfig;
/// use lex_fairness::TaskMode;
///
/// let config = AnalyzerConfig::builder()
///     .mode(TaskMode::Regression)
///     .batch_size(256)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Task type of the model under analysis.
    /// Default: Classification
    pub mode: TaskMode,

    /// Rows per prediction call. Batching bounds the work handed to the
    /// prediction function; it never changes the predictions.
    /// Default: 64
    pub batch_size: usize,

    /// Column holding the targets when they are not supplied explicitly.
    /// Overrides the dataset's own target column when set.
    /// Default: None
    pub target_column: Option<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            mode: TaskMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            target_column: None,
        }
    }
}

impl AnalyzerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.batch_size == 0 {
            return Err(ConfigValidationError::InvalidBatchSize(self.batch_size));
        }

        if let Some(column) = &self.target_column
            && column.trim().is_empty()
        {
            return Err(ConfigValidationError::EmptyTargetColumn);
        }

        Ok(())
    }
}

/// Configuration for [`GptExplainer`](crate::narrative::GptExplainer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// Task type of the model being explained.
    /// Default: Classification
    pub mode: TaskMode,

    /// Maximum number of feature-attribution entries placed in the prompt.
    /// Default: 50
    pub top_k: usize,

    /// Whether counterfactual examples are added to classification prompts.
    /// Default: true
    pub include_counterfactual: bool,

    /// Maximum number of counterfactual rows described in the prompt.
    /// Default: 2
    pub max_counterfactuals: usize,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            mode: TaskMode::default(),
            top_k: DEFAULT_TOP_K,
            include_counterfactual: true,
            max_counterfactuals: DEFAULT_MAX_COUNTERFACTUALS,
        }
    }
}

impl NarrativeConfig {
    /// Create a new configuration builder.
    pub fn builder() -> NarrativeConfigBuilder {
        NarrativeConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.top_k == 0 {
            return Err(ConfigValidationError::InvalidTopK(self.top_k));
        }
        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid batch size: {0} (must be at least 1)")]
    InvalidBatchSize(usize),

    #[error("Target column name must not be empty")]
    EmptyTargetColumn,

    #[error("Invalid top_k: {0} (must be at least 1)")]
    InvalidTopK(usize),
}

impl From<ConfigValidationError> for crate::error::BiasError {
    fn from(err: ConfigValidationError) -> Self {
        crate::error::BiasError::InvalidConfiguration(err.to_string())
    }
}

/// Builder for [`AnalyzerConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct AnalyzerConfigBuilder {
    mode: Option<TaskMode>,
    batch_size: Option<usize>,
    target_column: Option<String>,
}

impl AnalyzerConfigBuilder {
    /// Set the task type.
    pub fn mode(mut self, mode: TaskMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the number of rows per prediction call.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Set the column targets are read from.
    pub fn target_column(mut self, column: impl Into<String>) -> Self {
        self.target_column = Some(column.into());
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `AnalyzerConfig` or an error if validation fails.
    pub fn build(self) -> Result<AnalyzerConfig, ConfigValidationError> {
        let config = AnalyzerConfig {
            mode: self.mode.unwrap_or_default(),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            target_column: self.target_column,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Builder for [`NarrativeConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct NarrativeConfigBuilder {
    mode: Option<TaskMode>,
    top_k: Option<usize>,
    include_counterfactual: Option<bool>,
    max_counterfactuals: Option<usize>,
}

impl NarrativeConfigBuilder {
    /// Set the task type.
    pub fn mode(mut self, mode: TaskMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set how many attribution entries go into the prompt.
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Enable or disable counterfactual examples in the prompt.
    ///
    /// Counterfactuals are only ever used for classification models.
    pub fn include_counterfactual(mut self, include: bool) -> Self {
        self.include_counterfactual = Some(include);
        self
    }

    /// Set how many counterfactual rows are described.
    pub fn max_counterfactuals(mut self, max: usize) -> Self {
        self.max_counterfactuals = Some(max);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<NarrativeConfig, ConfigValidationError> {
        let config = NarrativeConfig {
            mode: self.mode.unwrap_or_default(),
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            include_counterfactual: self.include_counterfactual.unwrap_or(true),
            max_counterfactuals: self.max_counterfactuals.unwrap_or(DEFAULT_MAX_COUNTERFACTUALS),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.mode, TaskMode::Classification);
        assert_eq!(config.batch_size, 64);
        assert!(config.target_column.is_none());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AnalyzerConfig::builder()
            .mode(TaskMode::Regression)
            .batch_size(8)
            .target_column("income")
            .build()
            .unwrap();

        assert_eq!(config.mode, TaskMode::Regression);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.target_column.as_deref(), Some("income"));
    }

    #[test]
    fn test_validation_zero_batch_size() {
        let result = AnalyzerConfig::builder().batch_size(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidBatchSize(0)
        ));
    }

    #[test]
    fn test_validation_blank_target_column() {
        let result = AnalyzerConfig::builder().target_column("  ").build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::EmptyTargetColumn
        ));
    }

    #[test]
    fn test_validation_error_maps_to_invalid_configuration() {
        let err: crate::error::BiasError = ConfigValidationError::InvalidBatchSize(0).into();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
    }

    #[test]
    fn test_narrative_defaults_and_validation() {
        let config = NarrativeConfig::builder().build().unwrap();
        assert_eq!(config.top_k, 50);
        assert!(config.include_counterfactual);
        assert_eq!(config.max_counterfactuals, 2);

        assert!(matches!(
            NarrativeConfig::builder().top_k(0).build().unwrap_err(),
            ConfigValidationError::InvalidTopK(0)
        ));
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "mode": "regression",
            "batch_size": 16,
            "target_column": "price"
        }"#;

        let config: AnalyzerConfig = serde_json::from_str(json).expect("Should deserialize");
        assert_eq!(config.mode, TaskMode::Regression);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.target_column, Some("price".to_string()));
    }
}
