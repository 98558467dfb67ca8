//! Group Fairness Analysis Library
//!
//! Model-agnostic bias metrics for tabular classifiers and regressors, built
//! with Rust and Polars.
//!
//! # Overview
//!
//! A [`BiasAnalyzer`] runs a model's prediction function over a dataset once,
//! caches the predicted labels, and then compares any two groups of rows
//! defined by a feature column:
//!
//! - **One value vs. the rest**: `sex = Female` against every other row
//! - **Two value lists**: `race in {A, B}` against `race in {C}`
//!
//! For each label of interest it reports:
//!
//! - **DPL**: difference in proportions of predicted labels, `q_a - q_b`
//! - **DI**: disparate impact, `q_b / (q_a + 1e-8)`
//!
//! The [`narrative`] module turns feature attributions and counterfactuals
//! into a chat prompt and asks an LLM to explain individual predictions.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lex_fairness::{BiasAnalyzer, GroupSelector, Label, LabelSelection, TabularData};
//! use ndarray::Array2;
//! use polars::prelude::*;
//!
//! let df = CsvReadOptions::default()
//!     .with_has_header(true)
//!     .try_into_reader_with_file_path(Some("adult.csv".into()))?
//!     .finish()?;
//! let data = TabularData::new(df, Some("income".to_string()))?;
//!
//! let analyzer = BiasAnalyzer::builder()
//!     .data(data)
//!     .predict_fn(move |batch| Ok(model.predict_proba(batch)?))
//!     .mode_str("classification")
//!     .build()?;
//!
//! // Female vs. everyone else, all labels
//! let report = analyzer.explain("sex", &GroupSelector::single("Female"), LabelSelection::All)?;
//! println!("{}", report);
//!
//! // Two explicit groups, label 1 only
//! let report = analyzer.explain(
//!     "race",
//!     &GroupSelector::two_groups(["Black", "Other"], ["White"]),
//!     Label::Class(1),
//! )?;
//! ```
//!
//! # Error Handling
//!
//! Every fallible operation returns [`Result`] with a [`BiasError`]. Input
//! problems (unknown column or value, empty group, bad mode) are reported
//! before any metric runs.

pub mod ai;
pub mod analyzer;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod narrative;
pub mod observer;
pub mod predict;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use analyzer::{BiasAnalyzer, BiasAnalyzerBuilder};
pub use config::{AnalyzerConfig, ConfigValidationError, NarrativeConfig};
pub use data::TabularData;
pub use error::{BiasError, Result, ResultExt};
pub use metrics::{BiasMetric, GroupOutcomes, MetricRegistry};
pub use narrative::{
    AttributionExplainer, AttributionExplanation, CounterfactualExplainer,
    CounterfactualExplanation, FeatureAttribution, GptExplainer, PlainTextExplanation,
    build_prompt,
};
pub use observer::{AnalysisObserver, AnalysisStage, ObserverSet, ProgressUpdate};
pub use predict::{ClosurePredictor, ColumnPredictor, Predictor};
pub use types::{
    BiasReport, FeatureValue, GroupSelector, GroupSplit, Label, LabelSelection, MetricResult,
    TaskMode,
};
