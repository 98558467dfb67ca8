//! Group-fairness metrics and the registry that orders them.
//!
//! Every metric is a pure function of the two groups' true and predicted
//! labels. Metrics are looked up through [`MetricRegistry`], an explicit
//! ordered list, so adding a metric means adding an entry rather than
//! following a naming convention.

use crate::error::{BiasError, Result};
use crate::types::Label;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Added to the disparate-impact denominator so a group that never predicts
/// a label yields a large finite ratio instead of a division by zero.
pub const DISPARATE_IMPACT_EPSILON: f64 = 1e-8;

/// Per-label metric scores.
pub type LabelScores = BTreeMap<Label, f64>;

/// Signature shared by every metric. `None` means the metric produced nothing.
pub type MetricFn = fn(&GroupOutcomes<'_>, &[Label]) -> Option<LabelScores>;

/// True and predicted labels of the two comparison groups.
///
/// Both prediction slices are non-empty whenever the analyzer hands this to a
/// metric; empty groups are rejected before evaluation.
#[derive(Debug, Clone, Copy)]
pub struct GroupOutcomes<'a> {
    pub targ_a: &'a [Label],
    pub targ_b: &'a [Label],
    pub pred_a: &'a [Label],
    pub pred_b: &'a [Label],
}

/// Names of the metrics the crate knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiasMetric {
    /// Difference in proportions of predicted labels.
    Dpl,
    /// Disparate impact.
    Di,
    /// Difference in conditional outcomes. Not implemented: always yields nothing.
    Dco,
}

impl BiasMetric {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dpl => "DPL",
            Self::Di => "DI",
            Self::Dco => "DCO",
        }
    }

    /// The function registered for this metric.
    pub fn function(&self) -> MetricFn {
        match self {
            Self::Dpl => difference_in_proportions,
            Self::Di => disparate_impact,
            Self::Dco => difference_in_conditional_outcomes,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DPL" => Some(Self::Dpl),
            "DI" => Some(Self::Di),
            "DCO" => Some(Self::Dco),
            _ => None,
        }
    }
}

impl fmt::Display for BiasMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fraction of `preds` equal to `label`.
///
/// Returns 0.0 for an empty slice; metric callers never pass one.
pub fn proportion(preds: &[Label], label: &Label) -> f64 {
    if preds.is_empty() {
        return 0.0;
    }
    let hits = preds.iter().filter(|p| *p == label).count();
    hits as f64 / preds.len() as f64
}

/// DPL: `q_a - q_b` per label, where `q` is the share of a group's
/// predictions equal to that label.
pub fn difference_in_proportions(outcomes: &GroupOutcomes<'_>, labels: &[Label]) -> Option<LabelScores> {
    Some(
        labels
            .iter()
            .map(|label| {
                let qa = proportion(outcomes.pred_a, label);
                let qb = proportion(outcomes.pred_b, label);
                (*label, qa - qb)
            })
            .collect(),
    )
}

/// DI: `q_b / (q_a + epsilon)` per label. The ratio is group B over group A.
pub fn disparate_impact(outcomes: &GroupOutcomes<'_>, labels: &[Label]) -> Option<LabelScores> {
    Some(
        labels
            .iter()
            .map(|label| {
                let qa = proportion(outcomes.pred_a, label);
                let qb = proportion(outcomes.pred_b, label);
                (*label, qb / (qa + DISPARATE_IMPACT_EPSILON))
            })
            .collect(),
    )
}

/// DCO placeholder. Registered by name so callers can ask for it, but it
/// computes nothing until conditional-outcome semantics are defined.
pub fn difference_in_conditional_outcomes(
    _outcomes: &GroupOutcomes<'_>,
    _labels: &[Label],
) -> Option<LabelScores> {
    None
}

/// Ordered list of metrics evaluated by the analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRegistry {
    entries: Vec<BiasMetric>,
}

impl Default for MetricRegistry {
    /// DPL then DI.
    fn default() -> Self {
        Self {
            entries: vec![BiasMetric::Dpl, BiasMetric::Di],
        }
    }
}

impl MetricRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registry holding the named metrics in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`BiasError::InvalidConfiguration`] for a name that is not
    /// "DPL", "DI" or "DCO".
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().try_fold(Self::empty(), |registry, name| {
            let name = name.as_ref();
            BiasMetric::from_name(name)
                .map(|metric| registry.with(metric))
                .ok_or_else(|| BiasError::InvalidConfiguration(format!("unknown metric '{}'", name)))
        })
    }

    /// Append a metric; a metric already present is not added twice.
    pub fn with(mut self, metric: BiasMetric) -> Self {
        if !self.entries.contains(&metric) {
            self.entries.push(metric);
        }
        self
    }

    pub fn metrics(&self) -> &[BiasMetric] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every registered metric in order.
    ///
    /// Metrics that produce nothing are returned with `None` so the caller can
    /// decide how to surface the gap.
    pub fn evaluate(
        &self,
        outcomes: &GroupOutcomes<'_>,
        labels: &[Label],
    ) -> Vec<(BiasMetric, Option<LabelScores>)> {
        self.entries
            .iter()
            .map(|metric| (*metric, (metric.function())(outcomes, labels)))
            .collect()
    }
}
