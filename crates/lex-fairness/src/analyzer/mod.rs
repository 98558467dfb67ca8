//! The bias analyzer.
//!
//! [`BiasAnalyzer`] owns a dataset, its targets, and the model predictions
//! computed once at construction. Each [`explain`](BiasAnalyzer::explain)
//! call splits the rows into two groups by a feature column and evaluates
//! the registered fairness metrics over each group's labels.
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_fairness::{BiasAnalyzer, GroupSelector, LabelSelection, TabularData};
//!
//! let data = TabularData::new(df, Some("income".to_string()))?;
//! let analyzer = BiasAnalyzer::builder()
//!     .data(data)
//!     .predictor(model)
//!     .mode_str("classification")
//!     .build()?;
//!
//! let report = analyzer.explain("sex", &GroupSelector::single("Female"), LabelSelection::All)?;
//! println!("{}", report);
//! ```

mod groups;

pub use groups::FeatureIndex;

use crate::config::AnalyzerConfig;
use crate::data::TabularData;
use crate::error::{BiasError, Result};
use crate::metrics::{GroupOutcomes, MetricRegistry};
use crate::observer::{
    AnalysisObserver, AnalysisStage, ClosureProgressObserver, ClosureReportObserver,
    ObserverSet, ProgressUpdate,
};
use crate::predict::{ClosurePredictor, Predictor, predict_all};
use crate::types::{
    BiasReport, GroupSelector, GroupSplit, Label, LabelSelection, MetricResult, TaskMode,
};
use ndarray::Array2;
use polars::prelude::DataFrame;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Group-fairness analyzer for a classification or regression model.
///
/// Use [`BiasAnalyzer::builder()`] to construct one. All state is fixed at
/// construction, so `explain` only reads and can run concurrently.
pub struct BiasAnalyzer {
    mode: TaskMode,
    data: TabularData,
    predictor: Arc<dyn Predictor>,
    targets: Vec<Label>,
    predictions: Vec<Label>,
    all_labels: Vec<Label>,
    metrics: MetricRegistry,
    observer: Option<Arc<dyn AnalysisObserver>>,
}

static_assertions::assert_impl_all!(BiasAnalyzer: Send, Sync);

impl std::fmt::Debug for BiasAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BiasAnalyzer")
            .field("mode", &self.mode)
            .field("rows", &self.predictions.len())
            .field("predictor", &self.predictor.name())
            .field("all_labels", &self.all_labels.len())
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl BiasAnalyzer {
    /// Create a new analyzer builder.
    pub fn builder() -> BiasAnalyzerBuilder {
        BiasAnalyzerBuilder::default()
    }

    pub fn mode(&self) -> TaskMode {
        self.mode
    }

    /// Feature table used for prediction. The target column is removed when
    /// targets were read from it.
    pub fn data(&self) -> &TabularData {
        &self.data
    }

    pub fn predictor(&self) -> &dyn Predictor {
        self.predictor.as_ref()
    }

    pub fn targets(&self) -> &[Label] {
        &self.targets
    }

    /// Cached predictions, index-aligned with [`targets`](Self::targets).
    pub fn predictions(&self) -> &[Label] {
        &self.predictions
    }

    /// Default label set for metrics.
    ///
    /// Classification: distinct integer targets in ascending order.
    /// Regression: the raw target sequence, duplicates included.
    pub fn all_labels(&self) -> &[Label] {
        &self.all_labels
    }

    pub fn metrics(&self) -> &MetricRegistry {
        &self.metrics
    }

    /// Number of rows analyzed.
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(observer) = &self.observer {
            observer.on_progress(&update);
        }
    }

    /// Split rows into the two comparison groups without computing metrics.
    ///
    /// # Errors
    ///
    /// - [`BiasError::UnknownColumn`] if `feature_column` is not a feature
    /// - [`BiasError::UnknownFeatureValue`] if a referenced value never occurs
    pub fn split_groups(&self, feature_column: &str, selector: &GroupSelector) -> Result<GroupSplit> {
        if !self.data.has_column(feature_column) {
            return Err(BiasError::UnknownColumn(feature_column.to_string()));
        }

        let values = self.data.feature_values(feature_column)?;
        let index = FeatureIndex::build(feature_column, &values);
        debug!(
            "Indexed column '{}': {} distinct values over {} rows",
            feature_column,
            index.values().count(),
            values.len()
        );

        index.split(selector)
    }

    /// Compare two groups of `feature_column` with every registered metric.
    ///
    /// `labels` restricts the labels evaluated; [`LabelSelection::All`] uses
    /// [`all_labels`](Self::all_labels). Metrics that produce nothing are
    /// left out of the report.
    ///
    /// # Errors
    ///
    /// Validation runs before any metric is computed:
    /// - [`BiasError::UnknownColumn`]
    /// - [`BiasError::UnknownFeatureValue`]
    /// - [`BiasError::EmptyGroup`] if either group has no rows
    pub fn explain(
        &self,
        feature_column: &str,
        selector: &GroupSelector,
        labels: impl Into<LabelSelection>,
    ) -> Result<BiasReport> {
        self.report_progress(ProgressUpdate::new(
            AnalysisStage::Grouping,
            0.0,
            format!("Splitting rows on '{}'", feature_column),
        ));

        let split = self.split_groups(feature_column, selector)?;
        for (group, rows) in [('A', &split.group_a), ('B', &split.group_b)] {
            if rows.is_empty() {
                return Err(BiasError::EmptyGroup {
                    group,
                    column: feature_column.to_string(),
                });
            }
        }

        let labels = self.resolve_labels(labels.into());

        let pick = |source: &[Label], rows: &[usize]| -> Vec<Label> {
            rows.iter().map(|&i| source[i]).collect()
        };
        let targ_a = pick(&self.targets, &split.group_a);
        let targ_b = pick(&self.targets, &split.group_b);
        let pred_a = pick(&self.predictions, &split.group_a);
        let pred_b = pick(&self.predictions, &split.group_b);
        let outcomes = GroupOutcomes {
            targ_a: &targ_a,
            targ_b: &targ_b,
            pred_a: &pred_a,
            pred_b: &pred_b,
        };

        self.report_progress(ProgressUpdate::new(
            AnalysisStage::Metrics,
            0.0,
            format!("Evaluating {} metrics", self.metrics.metrics().len()),
        ));

        let mut metrics = Vec::with_capacity(self.metrics.metrics().len());
        for (metric, scores) in self.metrics.evaluate(&outcomes, &labels) {
            match scores {
                Some(scores) => metrics.push(MetricResult {
                    name: metric.name().to_string(),
                    scores,
                }),
                None => warn!("Metric {} is not implemented; omitted from report", metric),
            }
        }

        let report = BiasReport {
            feature_column: feature_column.to_string(),
            group_a_size: split.group_a.len(),
            group_b_size: split.group_b.len(),
            labels,
            metrics,
            generated_at: chrono::Utc::now().to_rfc3339(),
        };

        match &self.observer {
            Some(observer) => observer.on_report(&report),
            None => info!("{}", report),
        }
        self.report_progress(ProgressUpdate::complete("Bias analysis complete"));

        Ok(report)
    }

    fn resolve_labels(&self, selection: LabelSelection) -> Vec<Label> {
        match selection {
            LabelSelection::All => self.all_labels.clone(),
            LabelSelection::Single(label) => vec![label.for_mode(self.mode)],
            LabelSelection::Set(labels) => labels
                .into_iter()
                .map(|label| label.for_mode(self.mode))
                .collect(),
        }
    }
}

/// Default label universe for `mode`.
fn label_universe(targets: &[Label], mode: TaskMode) -> Vec<Label> {
    match mode {
        TaskMode::Classification => {
            // Integer cast truncates float targets, as with an int conversion.
            let classes: BTreeSet<i64> = targets
                .iter()
                .map(|label| match label {
                    Label::Class(c) => *c,
                    Label::Value(v) => *v as i64,
                })
                .collect();
            classes.into_iter().map(Label::Class).collect()
        }
        TaskMode::Regression => {
            // Raw targets double as labels; metrics then count exact matches
            // of continuous predictions, which rarely hit.
            debug!("Regression label universe uses {} raw target values", targets.len());
            targets
                .iter()
                .map(|label| label.for_mode(TaskMode::Regression))
                .collect()
        }
    }
}

/// Builder for [`BiasAnalyzer`].
///
/// # Example
///
/// ```rust,ignore
/// let analyzer = BiasAnalyzer::builder()
///     .data(data)
///     .predict_fn(|batch| Ok(model.predict_proba(batch)?))
///     .mode(TaskMode::Classification)
///     .batch_size(128)
///     .on_report(|report| println!("{}", report))
///     .build()?;
/// ```
#[derive(Default)]
pub struct BiasAnalyzerBuilder {
    data: Option<TabularData>,
    predictor: Option<Arc<dyn Predictor>>,
    config: Option<AnalyzerConfig>,
    mode: Option<TaskMode>,
    mode_str: Option<String>,
    batch_size: Option<usize>,
    targets: Option<Vec<Label>>,
    metrics: Option<MetricRegistry>,
    observers: Vec<Arc<dyn AnalysisObserver>>,
}

impl BiasAnalyzerBuilder {
    /// Set the dataset. If targets are not set explicitly, the dataset's
    /// target column supplies them.
    pub fn data(mut self, data: TabularData) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the model's prediction function.
    pub fn predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Set the prediction function from a closure.
    pub fn predict_fn<F>(mut self, predict: F) -> Self
    where
        F: Fn(&DataFrame) -> anyhow::Result<Array2<f64>> + Send + Sync + 'static,
    {
        self.predictor = Some(Arc::new(ClosurePredictor::new(predict)));
        self
    }

    /// Set a full configuration. Individual setters override its fields.
    pub fn config(mut self, config: AnalyzerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn mode(mut self, mode: TaskMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the mode by name; anything but "classification" or "regression"
    /// fails at [`build`](Self::build).
    pub fn mode_str(mut self, mode: impl Into<String>) -> Self {
        self.mode_str = Some(mode.into());
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Supply targets explicitly, one per row.
    ///
    /// The dataset is then used as given: a target column it carries is not
    /// removed, so the predictor sees it and it can serve as a grouping feature.
    pub fn targets(mut self, targets: impl IntoIterator<Item = Label>) -> Self {
        self.targets = Some(targets.into_iter().collect());
        self
    }

    /// Replace the default metric registry (DPL, DI).
    pub fn metrics(mut self, metrics: MetricRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attach an observer. Observers accumulate; each one receives every
    /// progress update and report.
    pub fn observer(mut self, observer: Arc<dyn AnalysisObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Receive each finished report through a closure.
    pub fn on_report<F>(self, callback: F) -> Self
    where
        F: Fn(&BiasReport) + Send + Sync + 'static,
    {
        self.observer(Arc::new(ClosureReportObserver::new(callback)))
    }

    /// Receive progress updates through a closure.
    pub fn on_progress<F>(self, callback: F) -> Self
    where
        F: Fn(&ProgressUpdate) + Send + Sync + 'static,
    {
        self.observer(Arc::new(ClosureProgressObserver::new(callback)))
    }

    /// Validate inputs, run the model over the dataset, and build the analyzer.
    ///
    /// # Errors
    ///
    /// - [`BiasError::InvalidConfiguration`] for a bad mode or batch size, a
    ///   missing predictor or dataset, or targets of the wrong length
    /// - [`BiasError::MissingTarget`] / [`BiasError::InvalidTargetType`] when
    ///   targets come from the dataset
    /// - [`BiasError::Prediction`] if the model fails
    pub fn build(self) -> Result<BiasAnalyzer> {
        let mut config = self.config.unwrap_or_default();
        if let Some(raw) = &self.mode_str {
            config.mode = raw.parse()?;
        } else if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        config.validate()?;

        let predictor = self.predictor.ok_or_else(|| {
            BiasError::InvalidConfiguration("a prediction function is required".to_string())
        })?;
        let data = self.data.ok_or_else(|| {
            BiasError::InvalidConfiguration("training data is required".to_string())
        })?;

        let data = match &config.target_column {
            Some(column) => TabularData::new(data.into_inner(), Some(column.clone()))?,
            None => data,
        };

        // Explicit targets leave the table untouched; otherwise the target
        // column is split off before the model sees the features.
        let (targets, features) = match self.targets {
            Some(targets) => {
                if targets.len() != data.height() {
                    return Err(BiasError::InvalidConfiguration(format!(
                        "{} targets supplied for {} rows",
                        targets.len(),
                        data.height()
                    )));
                }
                (targets, data)
            }
            None => (data.target_values()?, data.remove_target_column()?),
        };

        let mut observers = self.observers;
        let observer: Option<Arc<dyn AnalysisObserver>> = match observers.len() {
            0 => None,
            1 => observers.pop(),
            _ => Some(Arc::new(ObserverSet::new(observers))),
        };

        info!(
            "Computing {} predictions for {} rows (batch size {})",
            config.mode,
            features.height(),
            config.batch_size
        );
        let predictions = predict_all(
            &features,
            predictor.as_ref(),
            config.mode,
            config.batch_size,
            observer.as_deref(),
        )?;

        let all_labels = label_universe(&targets, config.mode);
        debug!("Label universe has {} entries", all_labels.len());

        Ok(BiasAnalyzer {
            mode: config.mode,
            data: features,
            predictor,
            targets,
            predictions,
            all_labels,
            metrics: self.metrics.unwrap_or_default(),
            observer,
        })
    }
}
