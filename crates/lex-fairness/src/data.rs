//! Tabular dataset wrapper used by the analyzer and explainers.
//!
//! [`TabularData`] pairs a polars `DataFrame` with an optional target column
//! and exposes the handful of operations the analyzer needs: column lookup,
//! row slicing, target extraction, and per-row feature values.

use crate::error::{BiasError, Result, ResultExt};
use crate::types::{FeatureValue, Label};
use crate::utils::{is_float_dtype, is_integer_dtype, parse_feature_literal, series_to_feature_values};
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

/// Read a CSV file with a header row.
///
/// Tries quote-aware parsing first and falls back to plain parsing for
/// files with stray quote characters.
pub fn read_csv(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(BiasError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input file not found: {}", path.display()),
        )));
    }

    let quoted = CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish());

    match quoted {
        Ok(df) => Ok(df),
        Err(e) => {
            debug!("Quoted CSV parse failed, retrying without quotes: {}", e);
            CsvReadOptions::default()
                .with_infer_schema_length(Some(100))
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_quote_char(None))
                .try_into_reader_with_file_path(Some(path.to_path_buf()))?
                .finish()
                .context(format!("reading {}", path.display()))
        }
    }
}

/// A feature table with an optional target column.
#[derive(Debug, Clone)]
pub struct TabularData {
    df: DataFrame,
    target_column: Option<String>,
}

impl TabularData {
    /// Wrap a DataFrame, optionally marking one column as the target.
    ///
    /// # Errors
    ///
    /// Returns [`BiasError::UnknownColumn`] if `target_column` is not in `df`.
    pub fn new(df: DataFrame, target_column: Option<String>) -> Result<Self> {
        if let Some(target) = &target_column
            && df.get_column_index(target).is_none()
        {
            return Err(BiasError::UnknownColumn(target.clone()));
        }
        Ok(Self { df, target_column })
    }

    /// Wrap a DataFrame that has no target column.
    pub fn features(df: DataFrame) -> Self {
        Self {
            df,
            target_column: None,
        }
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_inner(self) -> DataFrame {
        self.df
    }

    pub fn target_column(&self) -> Option<&str> {
        self.target_column.as_deref()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.df.get_column_index(name).is_some()
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.df.height()
    }

    /// Number of columns, including the target column if present.
    pub fn width(&self) -> usize {
        self.df.width()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    /// A contiguous batch of rows; `len` is clamped to the end of the table.
    pub fn slice(&self, offset: usize, len: usize) -> DataFrame {
        self.df.slice(offset as i64, len)
    }

    /// Rows at the given indices, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> Result<DataFrame> {
        let idx: Vec<IdxSize> = indices.iter().map(|&i| i as IdxSize).collect();
        let idx = IdxCa::from_vec("rows".into(), idx);
        self.df.take(&idx).context("Failed to select rows")
    }

    /// Extract the target column as labels.
    ///
    /// Integer columns yield [`Label::Class`], float columns [`Label::Value`].
    ///
    /// # Errors
    ///
    /// - [`BiasError::MissingTarget`] if no target column is set
    /// - [`BiasError::InvalidTargetType`] if the column is not numeric or contains nulls
    pub fn target_values(&self) -> Result<Vec<Label>> {
        let column = self.target_column.as_deref().ok_or(BiasError::MissingTarget)?;
        let series = self.df.column(column)?.as_materialized_series();
        let dtype = series.dtype();

        let invalid = |dtype: String| BiasError::InvalidTargetType {
            column: column.to_string(),
            dtype,
        };

        if series.null_count() > 0 {
            return Err(invalid(format!("{} with {} nulls", dtype, series.null_count())));
        }

        if is_integer_dtype(dtype) {
            let cast = series.cast(&DataType::Int64)?;
            Ok(cast.i64()?.into_no_null_iter().map(Label::Class).collect())
        } else if is_float_dtype(dtype) {
            let cast = series.cast(&DataType::Float64)?;
            Ok(cast.f64()?.into_no_null_iter().map(Label::Value).collect())
        } else {
            Err(invalid(dtype.to_string()))
        }
    }

    /// A view of the table without its target column.
    pub fn remove_target_column(&self) -> Result<TabularData> {
        match &self.target_column {
            Some(target) => Ok(TabularData {
                df: self.df.drop(target)?,
                target_column: None,
            }),
            None => Ok(self.clone()),
        }
    }

    /// Per-row values of a feature column.
    ///
    /// # Errors
    ///
    /// Returns [`BiasError::UnknownColumn`] if the column does not exist.
    pub fn feature_values(&self, column: &str) -> Result<Vec<FeatureValue>> {
        let series = self
            .df
            .column(column)
            .map_err(|_| BiasError::UnknownColumn(column.to_string()))?
            .as_materialized_series();
        Ok(series_to_feature_values(series)?)
    }

    /// Parse a user-supplied literal into a value typed like `column`.
    ///
    /// Used by the CLI, where every feature value arrives as a string.
    pub fn parse_feature_value(&self, column: &str, raw: &str) -> Result<FeatureValue> {
        let dtype = self
            .df
            .column(column)
            .map_err(|_| BiasError::UnknownColumn(column.to_string()))?
            .dtype()
            .clone();

        parse_feature_literal(raw, &dtype).ok_or_else(|| BiasError::UnknownFeatureValue {
            column: column.to_string(),
            value: raw.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df! {
            "feat" => &["X", "X", "Y", "Y"],
            "age" => &[20i64, 30, 40, 50],
            "label" => &[0i64, 1, 0, 1],
        }
        .unwrap()
    }

    #[test]
    fn test_read_csv_missing_file() {
        let err = read_csv("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, BiasError::Io(_)));
    }

    #[test]
    fn test_read_csv_infers_types() {
        let path = std::env::temp_dir().join(format!("lex_fairness_read_{}.csv", std::process::id()));
        std::fs::write(&path, "feat,age,label\nX,20,0\nY,30,1\n").unwrap();

        let df = read_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.column("age").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("feat").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_new_rejects_unknown_target() {
        let err = TabularData::new(sample(), Some("missing".to_string())).unwrap_err();
        assert!(matches!(err, BiasError::UnknownColumn(ref c) if c == "missing"));
    }

    #[test]
    fn test_target_values_integer() {
        let data = TabularData::new(sample(), Some("label".to_string())).unwrap();
        let targets = data.target_values().unwrap();
        assert_eq!(
            targets,
            vec![Label::Class(0), Label::Class(1), Label::Class(0), Label::Class(1)]
        );
    }

    #[test]
    fn test_target_values_float() {
        let df = df! {
            "x" => &[1i64, 2],
            "y" => &[0.5f64, 1.5],
        }
        .unwrap();
        let data = TabularData::new(df, Some("y".to_string())).unwrap();
        assert_eq!(
            data.target_values().unwrap(),
            vec![Label::Value(0.5), Label::Value(1.5)]
        );
    }

    #[test]
    fn test_target_values_missing_and_invalid() {
        let data = TabularData::features(sample());
        assert!(matches!(data.target_values(), Err(BiasError::MissingTarget)));

        let data = TabularData::new(sample(), Some("feat".to_string())).unwrap();
        assert!(matches!(
            data.target_values(),
            Err(BiasError::InvalidTargetType { .. })
        ));
    }

    #[test]
    fn test_target_values_rejects_nulls() {
        let df = df! {
            "x" => &[1i64, 2],
            "y" => &[Some(1i64), None],
        }
        .unwrap();
        let data = TabularData::new(df, Some("y".to_string())).unwrap();
        assert!(matches!(
            data.target_values(),
            Err(BiasError::InvalidTargetType { .. })
        ));
    }

    #[test]
    fn test_remove_target_column() {
        let data = TabularData::new(sample(), Some("label".to_string())).unwrap();
        let features = data.remove_target_column().unwrap();
        assert!(!features.has_column("label"));
        assert!(features.has_column("feat"));
        assert_eq!(features.width(), 2);
        assert!(features.target_column().is_none());
    }

    #[test]
    fn test_slice_and_take_rows() {
        let data = TabularData::features(sample());
        assert_eq!(data.slice(3, 64).height(), 1);

        let rows = data.take_rows(&[3, 0]).unwrap();
        let ages = rows.column("age").unwrap().as_materialized_series().i64().unwrap();
        assert_eq!(ages.get(0), Some(50));
        assert_eq!(ages.get(1), Some(20));
    }

    #[test]
    fn test_feature_values_unknown_column() {
        let data = TabularData::features(sample());
        assert!(matches!(
            data.feature_values("nope"),
            Err(BiasError::UnknownColumn(_))
        ));
        assert_eq!(data.feature_values("feat").unwrap().len(), 4);
    }

    #[test]
    fn test_parse_feature_value_by_dtype() {
        let data = TabularData::features(sample());
        assert_eq!(
            data.parse_feature_value("age", "30").unwrap(),
            FeatureValue::Int(30)
        );
        assert!(matches!(
            data.parse_feature_value("age", "thirty"),
            Err(BiasError::UnknownFeatureValue { .. })
        ));
    }

    #[test]
    fn test_parse_null_text_in_string_column() {
        let df = df! { "status" => &["null", "ok", "null"] }.unwrap();
        let data = TabularData::features(df);

        let value = data.parse_feature_value("status", "null").unwrap();
        assert_eq!(value, FeatureValue::from("null"));
        let values = data.feature_values("status").unwrap();
        assert_eq!(values.iter().filter(|v| **v == value).count(), 2);
    }
}
