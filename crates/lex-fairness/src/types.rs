use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::BiasError;

// ============================================================================
// Task mode
// ============================================================================

/// The kind of model being analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// Predict function returns per-class scores; predictions are arg-max indices.
    #[default]
    Classification,
    /// Predict function returns one scalar per row.
    Regression,
}

impl TaskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Regression => "regression",
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskMode {
    type Err = BiasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classification" => Ok(Self::Classification),
            "regression" => Ok(Self::Regression),
            other => Err(BiasError::InvalidConfiguration(format!(
                "mode must be 'classification' or 'regression', got '{}'",
                other
            ))),
        }
    }
}

/// Collapse -0.0 onto 0.0 so equal floats share a bit pattern.
#[inline]
fn canonical_f64(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

// ============================================================================
// Labels
// ============================================================================

/// A target or predicted label.
///
/// Classification labels are integer class indices. Regression "labels" are
/// the raw float targets; metrics count exact matches against them.
#[derive(Debug, Clone, Copy)]
pub enum Label {
    Class(i64),
    Value(f64),
}

impl Label {
    /// Coerce this label into the representation used by `mode`.
    ///
    /// Integral values are treated as class indices under classification, and
    /// class indices become floats under regression, mirroring numeric equality.
    pub fn for_mode(self, mode: TaskMode) -> Label {
        match (self, mode) {
            (Label::Value(v), TaskMode::Classification)
                if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 =>
            {
                Label::Class(v as i64)
            }
            (Label::Class(c), TaskMode::Regression) => Label::Value(c as f64),
            (label, _) => label,
        }
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Label {}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Label::Class(a), Label::Class(b)) => a.cmp(b),
            (Label::Value(a), Label::Value(b)) => canonical_f64(*a).total_cmp(&canonical_f64(*b)),
            (Label::Class(_), Label::Value(_)) => Ordering::Less,
            (Label::Value(_), Label::Class(_)) => Ordering::Greater,
        }
    }
}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Label::Class(c) => {
                0u8.hash(state);
                c.hash(state);
            }
            Label::Value(v) => {
                1u8.hash(state);
                canonical_f64(*v).to_bits().hash(state);
            }
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Class(c) => write!(f, "{}", c),
            Label::Value(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Label {
    fn from(value: i64) -> Self {
        Label::Class(value)
    }
}

impl From<f64> for Label {
    fn from(value: f64) -> Self {
        Label::Value(value)
    }
}

impl FromStr for Label {
    type Err = BiasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(class) = trimmed.parse::<i64>() {
            return Ok(Label::Class(class));
        }
        trimmed
            .parse::<f64>()
            .map(Label::Value)
            .map_err(|_| BiasError::InvalidConfiguration(format!("invalid label '{}'", s)))
    }
}

/// Labels serialize as strings so they can key JSON objects.
impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LabelVisitor;

        impl Visitor<'_> for LabelVisitor {
            type Value = Label;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer, a float, or a numeric string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Label, E> {
                Ok(Label::Class(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Label, E> {
                i64::try_from(v)
                    .map(Label::Class)
                    .map_err(|_| E::custom(format!("label {} out of range", v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Label, E> {
                Ok(Label::Value(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Label, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(LabelVisitor)
    }
}

// ============================================================================
// Feature values
// ============================================================================

/// A single observed value of a feature column.
///
/// Grouping is by equality only. Floats compare bitwise after collapsing
/// signed zero, and an integral float equals the matching integer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(PartialEq, Eq, Hash)]
enum FeatureKey<'a> {
    Int(i64),
    Float(u64),
    Str(&'a str),
    Bool(bool),
    Null,
}

impl FeatureValue {
    fn key(&self) -> FeatureKey<'_> {
        match self {
            FeatureValue::Int(i) => FeatureKey::Int(*i),
            FeatureValue::Float(f) => {
                let f = canonical_f64(*f);
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    FeatureKey::Int(f as i64)
                } else {
                    FeatureKey::Float(f.to_bits())
                }
            }
            FeatureValue::Str(s) => FeatureKey::Str(s),
            FeatureValue::Bool(b) => FeatureKey::Bool(*b),
            FeatureValue::Null => FeatureKey::Null,
        }
    }
}

impl PartialEq for FeatureValue {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for FeatureValue {}

impl Hash for FeatureValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(i) => write!(f, "{}", i),
            FeatureValue::Float(v) => write!(f, "{}", v),
            FeatureValue::Str(s) => f.write_str(s),
            FeatureValue::Bool(b) => write!(f, "{}", b),
            FeatureValue::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Str(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Str(value)
    }
}

impl From<i64> for FeatureValue {
    fn from(value: i64) -> Self {
        FeatureValue::Int(value)
    }
}

impl From<i32> for FeatureValue {
    fn from(value: i32) -> Self {
        FeatureValue::Int(value as i64)
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Float(value)
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Bool(value)
    }
}

// ============================================================================
// Explain arguments
// ============================================================================

/// How the two comparison groups are chosen from a feature column.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupSelector {
    /// Group A holds rows equal to the value; group B holds every other row.
    SingleValue(FeatureValue),
    /// Group A holds rows matching any value of the first list, group B the second.
    ///
    /// Rows matching neither list are left out. Overlapping lists put the same
    /// row in both groups.
    TwoGroups(Vec<FeatureValue>, Vec<FeatureValue>),
}

impl GroupSelector {
    pub fn single(value: impl Into<FeatureValue>) -> Self {
        GroupSelector::SingleValue(value.into())
    }

    pub fn two_groups<A, B>(a: A, b: B) -> Self
    where
        A: IntoIterator,
        A::Item: Into<FeatureValue>,
        B: IntoIterator,
        B::Item: Into<FeatureValue>,
    {
        GroupSelector::TwoGroups(
            a.into_iter().map(Into::into).collect(),
            b.into_iter().map(Into::into).collect(),
        )
    }

    /// Every feature value this selector references, group A first.
    pub fn referenced_values(&self) -> Vec<&FeatureValue> {
        match self {
            GroupSelector::SingleValue(v) => vec![v],
            GroupSelector::TwoGroups(a, b) => a.iter().chain(b.iter()).collect(),
        }
    }
}

/// Restricts the labels metrics are evaluated over.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LabelSelection {
    /// Use the analyzer's label universe.
    #[default]
    All,
    /// A single label, wrapped into a singleton set.
    Single(Label),
    /// An explicit set of labels, evaluated in the given order.
    Set(Vec<Label>),
}

impl From<Label> for LabelSelection {
    fn from(label: Label) -> Self {
        LabelSelection::Single(label)
    }
}

impl From<Vec<Label>> for LabelSelection {
    fn from(labels: Vec<Label>) -> Self {
        LabelSelection::Set(labels)
    }
}

impl From<Option<Label>> for LabelSelection {
    fn from(label: Option<Label>) -> Self {
        label.map_or(LabelSelection::All, LabelSelection::Single)
    }
}

/// Row indices of the two comparison groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSplit {
    pub group_a: Vec<usize>,
    pub group_b: Vec<usize>,
}

impl GroupSplit {
    /// True when no row index appears in both groups.
    pub fn is_disjoint(&self) -> bool {
        let a: std::collections::HashSet<usize> = self.group_a.iter().copied().collect();
        !self.group_b.iter().any(|i| a.contains(i))
    }
}

// ============================================================================
// Results
// ============================================================================

/// Scores of one metric, keyed by label.
#[derive(Debug, Clone, Serialize)]
pub struct MetricResult {
    pub name: String,
    pub scores: BTreeMap<Label, f64>,
}

impl MetricResult {
    pub fn score(&self, label: impl Into<Label>) -> Option<f64> {
        self.scores.get(&label.into()).copied()
    }
}

/// Outcome of a single `explain` call.
#[derive(Debug, Clone, Serialize)]
pub struct BiasReport {
    pub feature_column: String,
    pub group_a_size: usize,
    pub group_b_size: usize,
    pub labels: Vec<Label>,
    /// Metrics in registry order.
    pub metrics: Vec<MetricResult>,
    pub generated_at: String,
}

impl BiasReport {
    /// Look up a metric by its registered name (e.g. "DPL").
    pub fn metric(&self, name: &str) -> Option<&MetricResult> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }
}

impl fmt::Display for BiasReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Bias analysis on '{}' (group A: {} rows, group B: {} rows)",
            self.feature_column, self.group_a_size, self.group_b_size
        )?;
        for metric in &self.metrics {
            let scores: Vec<String> = metric
                .scores
                .iter()
                .map(|(label, score)| format!("{}: {:.4}", label, score))
                .collect();
            writeln!(f, "  {}: {{{}}}", metric.name, scores.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_mode_parse() {
        assert_eq!("classification".parse::<TaskMode>().unwrap(), TaskMode::Classification);
        assert_eq!("regression".parse::<TaskMode>().unwrap(), TaskMode::Regression);

        let err = "clustering".parse::<TaskMode>().unwrap_err();
        assert!(matches!(err, BiasError::InvalidConfiguration(_)));
        // Exact match only
        assert!("Classification".parse::<TaskMode>().is_err());
    }

    #[test]
    fn test_label_for_mode() {
        assert_eq!(Label::Value(1.0).for_mode(TaskMode::Classification), Label::Class(1));
        assert_eq!(Label::Value(1.5).for_mode(TaskMode::Classification), Label::Value(1.5));
        assert_eq!(Label::Class(2).for_mode(TaskMode::Regression), Label::Value(2.0));
    }

    #[test]
    fn test_label_ordering_and_zero() {
        assert!(Label::Class(0) < Label::Class(1));
        assert!(Label::Value(-1.0) < Label::Value(0.5));
        assert_eq!(Label::Value(-0.0), Label::Value(0.0));
    }

    #[test]
    fn test_label_json_roundtrip_as_map_key() {
        let mut scores = BTreeMap::new();
        scores.insert(Label::Class(1), 0.25);
        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json, r#"{"1":0.25}"#);

        let label: Label = serde_json::from_str("3").unwrap();
        assert_eq!(label, Label::Class(3));
        let label: Label = serde_json::from_str("2.5").unwrap();
        assert_eq!(label, Label::Value(2.5));
        let label: Label = serde_json::from_str(r#""7""#).unwrap();
        assert_eq!(label, Label::Class(7));
    }

    #[test]
    fn test_feature_value_equality() {
        assert_eq!(FeatureValue::from("X"), FeatureValue::Str("X".to_string()));
        assert_eq!(FeatureValue::Int(3), FeatureValue::Float(3.0));
        assert_ne!(FeatureValue::Int(3), FeatureValue::Float(3.5));
        assert_ne!(FeatureValue::Str("1".to_string()), FeatureValue::Int(1));
        assert_eq!(FeatureValue::Null, FeatureValue::Null);
    }

    #[test]
    fn test_group_selector_referenced_values() {
        let selector = GroupSelector::two_groups(["X", "Y"], ["Z"]);
        let values: Vec<String> = selector
            .referenced_values()
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(values, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_group_split_disjoint() {
        let split = GroupSplit {
            group_a: vec![0, 1],
            group_b: vec![2, 3],
        };
        assert!(split.is_disjoint());

        let split = GroupSplit {
            group_a: vec![0, 1],
            group_b: vec![1, 2],
        };
        assert!(!split.is_disjoint());
    }

    #[test]
    fn test_report_display() {
        let mut scores = BTreeMap::new();
        scores.insert(Label::Class(0), 0.0);
        let report = BiasReport {
            feature_column: "feat".to_string(),
            group_a_size: 2,
            group_b_size: 2,
            labels: vec![Label::Class(0)],
            metrics: vec![MetricResult {
                name: "DPL".to_string(),
                scores,
            }],
            generated_at: String::new(),
        };
        let text = report.to_string();
        assert!(text.contains("'feat'"));
        assert!(text.contains("DPL: {0: 0.0000}"));
        assert_eq!(report.metric_names(), vec!["DPL"]);
    }
}
