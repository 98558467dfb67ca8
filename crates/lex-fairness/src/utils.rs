//! Shared dtype and value helpers.

use crate::types::FeatureValue;
use polars::prelude::*;

/// Check if a DataType is an integer type.
#[inline]
pub fn is_integer_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Check if a DataType is a floating point type.
#[inline]
pub fn is_float_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Convert every value of a Series into a hashable [`FeatureValue`].
///
/// Nulls become [`FeatureValue::Null`] so they form their own group.
pub fn series_to_feature_values(series: &Series) -> PolarsResult<Vec<FeatureValue>> {
    let dtype = series.dtype();

    let values = if is_integer_dtype(dtype) {
        let cast = series.cast(&DataType::Int64)?;
        cast.i64()?
            .into_iter()
            .map(|v| v.map_or(FeatureValue::Null, FeatureValue::Int))
            .collect()
    } else if is_float_dtype(dtype) {
        let cast = series.cast(&DataType::Float64)?;
        cast.f64()?
            .into_iter()
            .map(|v| v.map_or(FeatureValue::Null, FeatureValue::Float))
            .collect()
    } else if matches!(dtype, DataType::Boolean) {
        series
            .bool()?
            .into_iter()
            .map(|v| v.map_or(FeatureValue::Null, FeatureValue::Bool))
            .collect()
    } else {
        // Strings, categoricals, dates: compare by their string form
        let cast = series.cast(&DataType::String)?;
        cast.str()?
            .into_iter()
            .map(|v| v.map_or(FeatureValue::Null, |s| FeatureValue::Str(s.to_string())))
            .collect()
    };

    Ok(values)
}

/// Parse a raw string into a [`FeatureValue`] typed like `dtype`.
///
/// Returns `None` when the string cannot represent a value of that type.
/// `"null"` selects missing values in typed columns; text columns take it
/// literally.
pub fn parse_feature_literal(raw: &str, dtype: &DataType) -> Option<FeatureValue> {
    let trimmed = raw.trim();
    let is_text = !is_integer_dtype(dtype) && !is_float_dtype(dtype) && !matches!(dtype, DataType::Boolean);
    if !is_text && trimmed.eq_ignore_ascii_case("null") {
        return Some(FeatureValue::Null);
    }

    if is_integer_dtype(dtype) {
        trimmed.parse::<i64>().ok().map(FeatureValue::Int)
    } else if is_float_dtype(dtype) {
        trimmed.parse::<f64>().ok().map(FeatureValue::Float)
    } else if matches!(dtype, DataType::Boolean) {
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => Some(FeatureValue::Bool(true)),
            "false" => Some(FeatureValue::Bool(false)),
            _ => None,
        }
    } else {
        Some(FeatureValue::Str(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_predicates() {
        assert!(is_integer_dtype(&DataType::Int32));
        assert!(!is_integer_dtype(&DataType::Float64));
        assert!(is_float_dtype(&DataType::Float32));
        assert!(is_integer_dtype(&DataType::UInt8));
        assert!(!is_float_dtype(&DataType::String));
        assert!(!is_integer_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_series_to_feature_values_strings_with_null() {
        let series = Series::new("sex".into(), &[Some("M"), None, Some("F")]);
        let values = series_to_feature_values(&series).unwrap();
        assert_eq!(
            values,
            vec![
                FeatureValue::from("M"),
                FeatureValue::Null,
                FeatureValue::from("F")
            ]
        );
    }

    #[test]
    fn test_series_to_feature_values_numeric() {
        let series = Series::new("age".into(), &[30i32, 40, 30]);
        let values = series_to_feature_values(&series).unwrap();
        assert_eq!(values[0], FeatureValue::Int(30));
        assert_eq!(values[0], values[2]);

        let series = Series::new("score".into(), &[0.5f64, 1.5]);
        let values = series_to_feature_values(&series).unwrap();
        assert_eq!(values[1], FeatureValue::Float(1.5));
    }

    #[test]
    fn test_parse_feature_literal() {
        assert_eq!(
            parse_feature_literal("42", &DataType::Int64),
            Some(FeatureValue::Int(42))
        );
        assert_eq!(parse_feature_literal("4.2", &DataType::Int64), None);
        assert_eq!(
            parse_feature_literal("True", &DataType::Boolean),
            Some(FeatureValue::Bool(true))
        );
        assert_eq!(
            parse_feature_literal("Male", &DataType::String),
            Some(FeatureValue::from("Male"))
        );
        assert_eq!(
            parse_feature_literal("null", &DataType::Float64),
            Some(FeatureValue::Null)
        );
    }

    #[test]
    fn test_null_literal_is_text_in_string_columns() {
        assert_eq!(
            parse_feature_literal("null", &DataType::String),
            Some(FeatureValue::from("null"))
        );
        assert_eq!(
            parse_feature_literal("NULL", &DataType::Int64),
            Some(FeatureValue::Null)
        );
    }
}
