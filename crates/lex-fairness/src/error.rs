//! Error types for bias analysis and explanation generation.
//!
//! All validation happens eagerly at the start of analyzer construction or
//! of an `explain` call, so a failed call never leaves partial results behind.
//!
//! Errors are serializable so they can be emitted as JSON by the CLI.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the fairness crate.
#[derive(Error, Debug)]
pub enum BiasError {
    /// Invalid configuration provided (bad mode, missing predictor, bad batch size).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No target values were supplied and the dataset has no target column.
    #[error("Dataset has no label/target column; supply targets explicitly")]
    MissingTarget,

    /// The target column is neither integer- nor float-typed.
    #[error("Targets in column '{column}' must be integers or floats, found {dtype}")]
    InvalidTargetType { column: String, dtype: String },

    /// Column was not found in the dataset.
    #[error("Feature column '{0}' does not exist")]
    UnknownColumn(String),

    /// A referenced feature value never occurs in the chosen column.
    #[error("Feature value '{value}' does not exist in column '{column}'")]
    UnknownFeatureValue { column: String, value: String },

    /// A comparison group resolved to zero rows.
    #[error("Group {group} selected no rows in column '{column}'")]
    EmptyGroup { group: char, column: String },

    /// The prediction function failed or returned a malformed output.
    #[error("Prediction failed: {0}")]
    Prediction(String),

    /// The text-generation backend failed.
    #[error("Text generation failed: {0}")]
    TextGeneration(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error (for text generation, only with "ai" feature).
    #[cfg(feature = "ai")]
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BiasError>,
    },
}

impl BiasError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BiasError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code for machine consumers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::MissingTarget => "MISSING_TARGET",
            Self::InvalidTargetType { .. } => "INVALID_TARGET_TYPE",
            Self::UnknownColumn(_) => "UNKNOWN_COLUMN",
            Self::UnknownFeatureValue { .. } => "UNKNOWN_FEATURE_VALUE",
            Self::EmptyGroup { .. } => "EMPTY_GROUP",
            Self::Prediction(_) => "PREDICTION_FAILED",
            Self::TextGeneration(_) => "TEXT_GENERATION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            #[cfg(feature = "ai")]
            Self::HttpRequest(_) => "HTTP_REQUEST_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for BiasError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("BiasError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for fairness operations.
pub type Result<T> = std::result::Result<T, BiasError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| BiasError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(BiasError::MissingTarget.error_code(), "MISSING_TARGET");
        assert_eq!(
            BiasError::UnknownColumn("sex".to_string()).error_code(),
            "UNKNOWN_COLUMN"
        );
        assert_eq!(
            BiasError::EmptyGroup {
                group: 'B',
                column: "sex".to_string()
            }
            .error_code(),
            "EMPTY_GROUP"
        );
    }

    #[test]
    fn test_unknown_value_message_names_value() {
        let error = BiasError::UnknownFeatureValue {
            column: "race".to_string(),
            value: "Z".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("'Z'"));
        assert!(message.contains("race"));
    }

    #[test]
    fn test_error_serialization() {
        let error = BiasError::UnknownColumn("Age".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("UNKNOWN_COLUMN"));
        assert!(json.contains("Age"));
    }

    #[test]
    fn test_with_context() {
        let error = BiasError::UnknownColumn("test".to_string()).with_context("During explain");
        assert!(error.to_string().contains("During explain"));
        assert_eq!(error.error_code(), "UNKNOWN_COLUMN");
    }
}
