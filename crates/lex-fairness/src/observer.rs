//! Progress reporting and result observation for the bias analyzer.
//!
//! The analyzer never prints. Callers that want to watch batch prediction or
//! receive the human-readable dump of each report attach an
//! [`AnalysisObserver`]; without one, reports are logged through `tracing`.
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_fairness::BiasAnalyzer;
//!
//! let analyzer = BiasAnalyzer::builder()
//!     .data(data)
//!     .predictor(model)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?;
//! ```

use crate::types::BiasReport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Phases of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    /// Running the prediction function over the dataset
    Predicting,
    /// Building the feature index and resolving groups
    Grouping,
    /// Evaluating registered metrics
    Metrics,
    /// Analysis finished
    Complete,
}

impl AnalysisStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Predicting => "Predicting",
            Self::Grouping => "Resolving Groups",
            Self::Metrics => "Computing Metrics",
            Self::Complete => "Complete",
        }
    }
}

/// A progress update for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: AnalysisStage,

    /// Progress within the current stage (0.0 - 1.0)
    pub progress: f32,

    pub message: String,

    /// Rows or items processed so far in the stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    pub fn new(stage: AnalysisStage, progress: f32, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a progress update with item counts.
    pub fn with_items(
        stage: AnalysisStage,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            stage,
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: Some(current),
            items_total: Some(total),
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(AnalysisStage::Complete, 1.0, message)
    }
}

/// Receives progress updates and finished reports.
///
/// Implementations must be `Send + Sync`; `explain` takes `&self` and may be
/// called from several threads over the same analyzer.
pub trait AnalysisObserver: Send + Sync {
    /// Called as work progresses. Defaults to doing nothing.
    fn on_progress(&self, _update: &ProgressUpdate) {}

    /// Called once per successful `explain` with the finished report.
    /// Defaults to logging the report's human-readable form.
    fn on_report(&self, report: &BiasReport) {
        info!("{}", report);
    }
}

/// Observer that forwards progress updates to a closure.
pub struct ClosureProgressObserver<F>
where
    F: Fn(&ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressObserver<F>
where
    F: Fn(&ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> AnalysisObserver for ClosureProgressObserver<F>
where
    F: Fn(&ProgressUpdate) + Send + Sync,
{
    fn on_progress(&self, update: &ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Observer that forwards finished reports to a closure.
///
/// # Example
///
/// ```rust,ignore
/// BiasAnalyzer::builder()
///     .on_report(|report| println!("{}", report))
///     .build()?;
/// ```
pub struct ClosureReportObserver<F>
where
    F: Fn(&BiasReport) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureReportObserver<F>
where
    F: Fn(&BiasReport) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> AnalysisObserver for ClosureReportObserver<F>
where
    F: Fn(&BiasReport) + Send + Sync,
{
    fn on_report(&self, report: &BiasReport) {
        (self.callback)(report);
    }
}

/// Forwards every callback to each observer in registration order.
///
/// The analyzer builder collects one of these when more than one observer
/// is attached, so `.on_report(..).on_progress(..)` keeps both.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn AnalysisObserver>>,
}

impl ObserverSet {
    pub fn new(observers: Vec<Arc<dyn AnalysisObserver>>) -> Self {
        Self { observers }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl AnalysisObserver for ObserverSet {
    fn on_progress(&self, update: &ProgressUpdate) {
        for observer in &self.observers {
            observer.on_progress(update);
        }
    }

    fn on_report(&self, report: &BiasReport) {
        for observer in &self.observers {
            observer.on_report(report);
        }
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);
static_assertions::assert_impl_all!(ObserverSet: Send, Sync);
