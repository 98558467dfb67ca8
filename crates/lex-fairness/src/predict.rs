//! Prediction functions and batched prediction over a dataset.
//!
//! The model being analyzed is a black box behind the [`Predictor`] trait.
//! [`predict_all`] feeds it fixed-size batches in row order and turns the
//! raw outputs into one [`Label`] per row.

use crate::data::TabularData;
use crate::error::{BiasError, Result};
use crate::observer::{AnalysisObserver, AnalysisStage, ProgressUpdate};
use crate::types::{Label, TaskMode};
use anyhow::anyhow;
use ndarray::{Array2, ArrayView1};
use polars::prelude::*;
use tracing::debug;

/// A model's prediction function.
///
/// For classification the output has one row per input row and one column
/// per class score. For regression any shape holding exactly one value per
/// input row is accepted; values are read in row-major order.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so an analyzer can be shared.
pub trait Predictor: Send + Sync {
    /// Predict a batch of rows.
    fn predict(&self, batch: &DataFrame) -> anyhow::Result<Array2<f64>>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "predictor"
    }
}

/// Wrapper that implements [`Predictor`] using a closure.
///
/// # Example
///
/// ```rust,ignore
/// let constant = ClosurePredictor::new(|batch: &DataFrame| {
///     Ok(Array2::from_elem((batch.height(), 2), 0.5))
/// });
/// ```
pub struct ClosurePredictor<F>
where
    F: Fn(&DataFrame) -> anyhow::Result<Array2<f64>> + Send + Sync,
{
    callback: F,
}

impl<F> ClosurePredictor<F>
where
    F: Fn(&DataFrame) -> anyhow::Result<Array2<f64>> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> Predictor for ClosurePredictor<F>
where
    F: Fn(&DataFrame) -> anyhow::Result<Array2<f64>> + Send + Sync,
{
    fn predict(&self, batch: &DataFrame) -> anyhow::Result<Array2<f64>> {
        (self.callback)(batch)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

/// Predictor that reads precomputed model outputs from columns of the batch.
///
/// Useful when a model has already been run offline and its scores were
/// exported next to the features: one column per class for classification,
/// a single column for regression.
#[derive(Debug, Clone)]
pub struct ColumnPredictor {
    columns: Vec<String>,
}

impl ColumnPredictor {
    /// # Errors
    ///
    /// Returns [`BiasError::InvalidConfiguration`] if `columns` is empty.
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(BiasError::InvalidConfiguration(
                "at least one score column is required".to_string(),
            ));
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Predictor for ColumnPredictor {
    fn predict(&self, batch: &DataFrame) -> anyhow::Result<Array2<f64>> {
        let rows = batch.height();
        let mut scores = Array2::<f64>::zeros((rows, self.columns.len()));

        for (j, name) in self.columns.iter().enumerate() {
            let column = batch
                .column(name)
                .map_err(|_| anyhow!("score column '{}' not found", name))?;
            let values = column.as_materialized_series().cast(&DataType::Float64)?;
            for (i, value) in values.f64()?.into_iter().enumerate() {
                scores[[i, j]] =
                    value.ok_or_else(|| anyhow!("null score in column '{}' at row {}", name, i))?;
            }
        }

        Ok(scores)
    }

    fn name(&self) -> &str {
        "columns"
    }
}

/// Index of the largest score; ties go to the lowest index.
fn argmax(row: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    for (i, &score) in row.iter().enumerate().skip(1) {
        if score > row[best] {
            best = i;
        }
    }
    best
}

/// Run `predictor` over every row of `data` in batches of `batch_size`.
///
/// Batches are contiguous and processed in order, so the result is the same
/// for every batch size given a deterministic predictor.
///
/// # Errors
///
/// - [`BiasError::InvalidConfiguration`] if `batch_size` is zero
/// - [`BiasError::Prediction`] if the predictor fails or returns a
///   mis-shaped output
pub fn predict_all(
    data: &TabularData,
    predictor: &dyn Predictor,
    mode: TaskMode,
    batch_size: usize,
    observer: Option<&dyn AnalysisObserver>,
) -> Result<Vec<Label>> {
    if batch_size == 0 {
        return Err(BiasError::InvalidConfiguration(
            "batch_size must be at least 1".to_string(),
        ));
    }

    let total = data.height();
    let mut predictions = Vec::with_capacity(total);
    let mut offset = 0;

    while offset < total {
        let batch = data.slice(offset, batch_size);
        let rows = batch.height();

        let output = predictor.predict(&batch).map_err(|e| {
            BiasError::Prediction(format!(
                "{} failed on rows {}..{}: {:#}",
                predictor.name(),
                offset,
                offset + rows,
                e
            ))
        })?;

        match mode {
            TaskMode::Classification => {
                if output.nrows() != rows {
                    return Err(BiasError::Prediction(format!(
                        "expected {} rows of class scores, got {}",
                        rows,
                        output.nrows()
                    )));
                }
                if output.ncols() == 0 {
                    return Err(BiasError::Prediction(
                        "class score rows are empty".to_string(),
                    ));
                }
                predictions.extend(output.rows().into_iter().map(|row| Label::Class(argmax(row) as i64)));
            }
            TaskMode::Regression => {
                if output.len() != rows {
                    return Err(BiasError::Prediction(format!(
                        "expected {} regression outputs, got {}",
                        rows,
                        output.len()
                    )));
                }
                predictions.extend(output.iter().map(|&v| Label::Value(v)));
            }
        }

        offset += rows;
        debug!("Predicted {}/{} rows", offset, total);
        if let Some(observer) = observer {
            observer.on_progress(&ProgressUpdate::with_items(
                AnalysisStage::Predicting,
                offset,
                total,
                format!("Predicted {} of {} rows", offset, total),
            ));
        }
    }

    Ok(predictions)
}
