//! Natural-language explanations of individual predictions.
//!
//! A [`GptExplainer`] combines a feature-attribution explainer and, for
//! classification, a counterfactual explainer. It renders their output
//! into a chat prompt and asks a [`TextGenerator`] to explain the
//! prediction in plain words. Both explainers are black boxes behind traits.

use crate::ai::{ChatPrompt, TextGenerator};
use crate::config::{DEFAULT_MAX_COUNTERFACTUALS, NarrativeConfig};
use crate::error::{BiasError, Result};
use crate::types::{FeatureValue, Label, TaskMode};
use crate::utils::series_to_feature_values;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Column in counterfactual frames holding the predicted label.
pub const COUNTERFACTUAL_LABEL_COLUMN: &str = "label";

// ============================================================================
// Explainer outputs
// ============================================================================

/// Importance of one feature for one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAttribution {
    pub feature: String,
    pub value: FeatureValue,
    pub score: f64,
}

impl FeatureAttribution {
    pub fn new(feature: impl Into<String>, value: impl Into<FeatureValue>, score: f64) -> Self {
        Self {
            feature: feature.into(),
            value: value.into(),
            score,
        }
    }
}

/// Feature attributions for one instance, most important first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionExplanation {
    /// The label being explained (the predicted class for classification).
    pub target_label: Label,
    pub attributions: Vec<FeatureAttribution>,
}

/// Counterfactual examples for one instance.
///
/// `query` is the single-row instance. `counterfactuals` holds candidate
/// rows with the same feature columns plus a `label` column.
#[derive(Debug, Clone)]
pub struct CounterfactualExplanation {
    pub query: DataFrame,
    pub counterfactuals: Option<DataFrame>,
}

/// Produces feature attributions, one explanation per input row.
pub trait AttributionExplainer: Send + Sync {
    fn explain(&self, instances: &DataFrame) -> anyhow::Result<Vec<AttributionExplanation>>;
}

/// Produces counterfactual examples, one explanation per input row.
pub trait CounterfactualExplainer: Send + Sync {
    fn explain(&self, instances: &DataFrame) -> anyhow::Result<Vec<CounterfactualExplanation>>;
}

// ============================================================================
// Prompt assembly
// ============================================================================

fn system_prompt(mode: TaskMode) -> String {
    format!(
        "You are an assistant for explaining prediction results generated \
         by a machine learning {} model. \
         Your decisions must always be made independently without seeking user assistance. \
         Your answers should be detailed and accurate for users to \
         understand why the model makes such predictions.",
        mode
    )
}

/// First row of every column as feature values, keyed by column name.
fn row_values(df: &DataFrame, row: usize) -> PolarsResult<Vec<(String, FeatureValue)>> {
    let mut values = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let series = column.as_materialized_series().slice(row as i64, 1);
        let value = series_to_feature_values(&series)?
            .into_iter()
            .next()
            .unwrap_or(FeatureValue::Null);
        values.push((column.name().to_string(), value));
    }
    Ok(values)
}

/// Lines describing how each counterfactual differs from the query.
///
/// Rows that change nothing are skipped but keep their index. Returns `None`
/// when the frames cannot be compared.
fn counterfactual_lines(
    explanation: &CounterfactualExplanation,
    target_label: &Label,
) -> PolarsResult<Option<Vec<String>>> {
    let Some(cfs) = &explanation.counterfactuals else {
        return Ok(None);
    };
    if cfs.height() == 0 || explanation.query.height() == 0 {
        return Ok(None);
    }
    let Ok(label_column) = cfs.column(COUNTERFACTUAL_LABEL_COLUMN) else {
        warn!("Counterfactuals have no '{}' column; skipping", COUNTERFACTUAL_LABEL_COLUMN);
        return Ok(None);
    };

    // Every line quotes the first counterfactual's label.
    let cf_label = series_to_feature_values(&label_column.as_materialized_series().slice(0, 1))?
        .into_iter()
        .next()
        .unwrap_or(FeatureValue::Null);
    let query = row_values(&explanation.query, 0)?;

    let mut lines = Vec::new();
    for i in 0..cfs.height() {
        let candidate = row_values(cfs, i)?;
        let changed: Vec<String> = query
            .iter()
            .filter(|(name, _)| name != COUNTERFACTUAL_LABEL_COLUMN)
            .filter_map(|(name, original)| {
                candidate
                    .iter()
                    .find(|(other, _)| other == name)
                    .filter(|(_, value)| value != original)
                    .map(|(_, value)| format!("\"{}\" = \"{}\"", name, value))
            })
            .collect();

        if !changed.is_empty() {
            lines.push(format!(
                "{}. If {}, then the predicted label will be label_{} instead of label_{}",
                i,
                changed.join(" and "),
                cf_label,
                target_label
            ));
        }
    }

    Ok(Some(lines))
}

/// Assemble the chat prompt for one instance.
///
/// The user message lists the first `top_k` attributions as
/// `i. "feature = value": score`, asks why the model predicted what it did,
/// and with counterfactuals quotes at most two of them.
pub fn build_prompt(
    attribution: &AttributionExplanation,
    counterfactual: Option<&CounterfactualExplanation>,
    mode: TaskMode,
    top_k: usize,
) -> ChatPrompt {
    build_prompt_with(attribution, counterfactual, mode, top_k, DEFAULT_MAX_COUNTERFACTUALS)
}

fn build_prompt_with(
    attribution: &AttributionExplanation,
    counterfactual: Option<&CounterfactualExplanation>,
    mode: TaskMode,
    top_k: usize,
    max_counterfactuals: usize,
) -> ChatPrompt {
    let scores: Vec<String> = attribution
        .attributions
        .iter()
        .take(top_k)
        .enumerate()
        .map(|(i, a)| format!("{}. \"{} = {}\": {:.4}", i, a.feature, a.value, a.score))
        .collect();

    let mut user = String::from(
        "Firstly, given the following feature importance scores in the format \
         \"<feature name>: <feature importance score>\":\n\n",
    );
    user.push_str(&scores.join("\n"));

    let question = match mode {
        TaskMode::Classification => format!(
            "Please explain why this example is classified as label_{}.",
            attribution.target_label
        ),
        TaskMode::Regression => "Please explain why this example has this predicted value.".to_string(),
    };
    user.push_str(&format!(
        "\n\n{}\nYour answer should be concise and accurate.",
        question
    ));

    if let Some(explanation) = counterfactual {
        match counterfactual_lines(explanation, &attribution.target_label) {
            Ok(Some(lines)) => {
                let shown: Vec<&str> = lines
                    .iter()
                    .take(max_counterfactuals)
                    .map(String::as_str)
                    .collect();
                user.push_str(
                    "\n\nThen given the following results generated by the MACE counterfactual explainer:\n\n",
                );
                user.push_str(&shown.join("\n"));
                user.push_str(
                    "\n\nPlease show how to change feature values to change the predicted label. \
                     \nYour answer should be concise and accurate.",
                );
            }
            Ok(None) => {}
            Err(e) => warn!("Could not read counterfactuals: {}", e),
        }
    }

    ChatPrompt::new(system_prompt(mode), user)
}

// ============================================================================
// Explainer
// ============================================================================

/// Generated text for one instance.
#[derive(Debug, Clone)]
pub struct PlainTextEntry {
    /// The explained row.
    pub instance: DataFrame,
    pub text: String,
}

/// Generated explanations, one per explained row.
#[derive(Debug, Clone, Default)]
pub struct PlainTextExplanation {
    entries: Vec<PlainTextEntry>,
}

impl PlainTextExplanation {
    pub fn add(&mut self, instance: DataFrame, text: impl Into<String>) {
        self.entries.push(PlainTextEntry {
            instance,
            text: text.into(),
        });
    }

    pub fn entries(&self) -> &[PlainTextEntry] {
        &self.entries
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Explains predictions in natural language through a chat model.
pub struct GptExplainer {
    attribution: Arc<dyn AttributionExplainer>,
    counterfactual: Option<Arc<dyn CounterfactualExplainer>>,
    generator: Arc<dyn TextGenerator>,
    config: NarrativeConfig,
}

impl std::fmt::Debug for GptExplainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GptExplainer")
            .field("uses_counterfactuals", &self.counterfactual.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(GptExplainer: Send, Sync);

impl GptExplainer {
    pub fn builder() -> GptExplainerBuilder {
        GptExplainerBuilder::default()
    }

    pub fn config(&self) -> &NarrativeConfig {
        &self.config
    }

    /// Whether counterfactuals feed into prompts.
    pub fn uses_counterfactuals(&self) -> bool {
        self.counterfactual.is_some()
    }

    /// Generate one explanation per row of `instances`.
    ///
    /// # Errors
    ///
    /// - [`BiasError::Prediction`] if an explainer fails or returns the
    ///   wrong number of explanations
    /// - [`BiasError::TextGeneration`] if the chat model fails
    pub fn explain(&self, instances: &DataFrame) -> Result<PlainTextExplanation> {
        let rows = instances.height();
        info!("Explaining {} instances with {}", rows, self.generator.name());

        let attributions = self
            .attribution
            .explain(instances)
            .map_err(|e| BiasError::Prediction(format!("attribution explainer failed: {:#}", e)))?;
        if attributions.len() != rows {
            return Err(BiasError::Prediction(format!(
                "attribution explainer returned {} explanations for {} rows",
                attributions.len(),
                rows
            )));
        }

        let counterfactuals = match &self.counterfactual {
            Some(explainer) => {
                let cfs = explainer.explain(instances).map_err(|e| {
                    BiasError::Prediction(format!("counterfactual explainer failed: {:#}", e))
                })?;
                if cfs.len() != rows {
                    return Err(BiasError::Prediction(format!(
                        "counterfactual explainer returned {} explanations for {} rows",
                        cfs.len(),
                        rows
                    )));
                }
                Some(cfs)
            }
            None => None,
        };

        let mut explanations = PlainTextExplanation::default();
        for (i, attribution) in attributions.iter().enumerate() {
            let counterfactual = counterfactuals.as_ref().map(|cfs| &cfs[i]);
            let prompt = build_prompt_with(
                attribution,
                counterfactual,
                self.config.mode,
                self.config.top_k,
                self.config.max_counterfactuals,
            );
            debug!("Prompt for row {}: {} chars", i, prompt.user.len());

            let text = self.generator.generate(&prompt).map_err(|e| {
                BiasError::TextGeneration(format!("{} failed on row {}: {:#}", self.generator.name(), i, e))
            })?;
            explanations.add(instances.slice(i as i64, 1), text);
        }

        Ok(explanations)
    }
}

/// Builder for [`GptExplainer`].
#[derive(Default)]
pub struct GptExplainerBuilder {
    attribution: Option<Arc<dyn AttributionExplainer>>,
    counterfactual: Option<Arc<dyn CounterfactualExplainer>>,
    generator: Option<Arc<dyn TextGenerator>>,
    config: Option<NarrativeConfig>,
    mode: Option<TaskMode>,
    top_k: Option<usize>,
}

impl GptExplainerBuilder {
    pub fn attribution(mut self, explainer: Arc<dyn AttributionExplainer>) -> Self {
        self.attribution = Some(explainer);
        self
    }

    /// Counterfactual explainer; ignored for regression.
    pub fn counterfactual(mut self, explainer: Arc<dyn CounterfactualExplainer>) -> Self {
        self.counterfactual = Some(explainer);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn config(mut self, config: NarrativeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn mode(mut self, mode: TaskMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn build(self) -> Result<GptExplainer> {
        let mut config = self.config.unwrap_or_default();
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        config.top_k = self.top_k.unwrap_or(config.top_k);
        config.validate()?;

        let attribution = self.attribution.ok_or_else(|| {
            BiasError::InvalidConfiguration("an attribution explainer is required".to_string())
        })?;
        let generator = self.generator.ok_or_else(|| {
            BiasError::InvalidConfiguration("a text generator is required".to_string())
        })?;

        let counterfactual = if config.include_counterfactual && config.mode == TaskMode::Classification {
            self.counterfactual
        } else {
            None
        };

        Ok(GptExplainer {
            attribution,
            counterfactual,
            generator,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn attribution() -> AttributionExplanation {
        AttributionExplanation {
            target_label: Label::Class(1),
            attributions: vec![
                FeatureAttribution::new("age", 42i64, 0.31234),
                FeatureAttribution::new("sex", "Female", -0.1),
            ],
        }
    }

    fn counterfactual() -> CounterfactualExplanation {
        CounterfactualExplanation {
            query: df! { "age" => &[42i64], "sex" => &["Female"] }.unwrap(),
            counterfactuals: Some(
                df! {
                    "age" => &[42i64, 30, 25, 20],
                    "sex" => &["Female", "Male", "Female", "Male"],
                    "label" => &[0i64, 0, 0, 0],
                }
                .unwrap(),
            ),
        }
    }

    struct FixedAttributions;

    impl AttributionExplainer for FixedAttributions {
        fn explain(&self, instances: &DataFrame) -> anyhow::Result<Vec<AttributionExplanation>> {
            Ok(vec![attribution(); instances.height()])
        }
    }

    struct FixedCounterfactuals;

    impl CounterfactualExplainer for FixedCounterfactuals {
        fn explain(&self, instances: &DataFrame) -> anyhow::Result<Vec<CounterfactualExplanation>> {
            Ok(vec![counterfactual(); instances.height()])
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<ChatPrompt>>,
    }

    impl TextGenerator for RecordingGenerator {
        fn generate(&self, prompt: &ChatPrompt) -> anyhow::Result<String> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.clone());
            Ok(format!("explanation {}", prompts.len()))
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_classification_prompt_text() {
        let prompt = build_prompt(&attribution(), None, TaskMode::Classification, 50);

        assert!(prompt.system.starts_with(
            "You are an assistant for explaining prediction results generated by a machine learning classification model."
        ));
        assert_eq!(
            prompt.user,
            "Firstly, given the following feature importance scores in the format \
             \"<feature name>: <feature importance score>\":\n\n\
             0. \"age = 42\": 0.3123\n\
             1. \"sex = Female\": -0.1000\n\n\
             Please explain why this example is classified as label_1.\n\
             Your answer should be concise and accurate."
        );
    }

    #[test]
    fn test_regression_prompt_question() {
        let prompt = build_prompt(&attribution(), None, TaskMode::Regression, 50);
        assert!(prompt.system.contains("machine learning regression model"));
        assert!(prompt.user.ends_with(
            "\n\nPlease explain why this example has this predicted value.\nYour answer should be concise and accurate."
        ));
    }

    #[test]
    fn test_top_k_truncates_scores() {
        let prompt = build_prompt(&attribution(), None, TaskMode::Classification, 1);
        assert!(prompt.user.contains("0. \"age = 42\""));
        assert!(!prompt.user.contains("sex = Female"));
    }

    #[test]
    fn test_counterfactual_block_lists_two_changed_rows() {
        let cf = counterfactual();
        let prompt = build_prompt(&attribution(), Some(&cf), TaskMode::Classification, 50);

        let block = prompt
            .user
            .split("MACE counterfactual explainer:\n\n")
            .nth(1)
            .unwrap();
        assert_eq!(
            block,
            "1. If \"age\" = \"30\" and \"sex\" = \"Male\", then the predicted label will be label_0 instead of label_1\n\
             2. If \"age\" = \"25\", then the predicted label will be label_0 instead of label_1\n\n\
             Please show how to change feature values to change the predicted label. \n\
             Your answer should be concise and accurate."
        );
    }

    #[test]
    fn test_missing_counterfactuals_add_nothing() {
        let cf = CounterfactualExplanation {
            query: df! { "age" => &[42i64] }.unwrap(),
            counterfactuals: None,
        };
        let with = build_prompt(&attribution(), Some(&cf), TaskMode::Classification, 50);
        let without = build_prompt(&attribution(), None, TaskMode::Classification, 50);
        assert_eq!(with, without);
    }

    #[test]
    fn test_attribution_json_round_trip_shape() {
        let json = r#"{
            "target_label": "1",
            "attributions": [
                {"feature": "age", "value": 42, "score": 0.5},
                {"feature": "sex", "value": "Female", "score": -0.25}
            ]
        }"#;
        let parsed: AttributionExplanation = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.target_label, Label::Class(1));
        assert_eq!(parsed.attributions[0].value, FeatureValue::Int(42));
        assert_eq!(parsed.attributions[1].value, FeatureValue::from("Female"));
    }

    #[test]
    fn test_explainer_generates_one_text_per_row() {
        let generator = Arc::new(RecordingGenerator::default());
        let explainer = GptExplainer::builder()
            .attribution(Arc::new(FixedAttributions))
            .counterfactual(Arc::new(FixedCounterfactuals))
            .generator(generator.clone())
            .build()
            .unwrap();
        assert!(explainer.uses_counterfactuals());

        let instances = df! { "age" => &[42i64, 51], "sex" => &["Female", "Male"] }.unwrap();
        let result = explainer.explain(&instances).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.texts().collect::<Vec<_>>(), vec!["explanation 1", "explanation 2"]);
        assert_eq!(result.entries()[1].instance.height(), 1);

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].user.contains("MACE counterfactual explainer"));
    }

    #[test]
    fn test_regression_ignores_counterfactuals() {
        let explainer = GptExplainer::builder()
            .attribution(Arc::new(FixedAttributions))
            .counterfactual(Arc::new(FixedCounterfactuals))
            .generator(Arc::new(RecordingGenerator::default()))
            .mode(TaskMode::Regression)
            .build()
            .unwrap();
        assert!(!explainer.uses_counterfactuals());
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = GptExplainer::builder()
            .generator(Arc::new(RecordingGenerator::default()))
            .build()
            .unwrap_err();
        assert!(matches!(err, BiasError::InvalidConfiguration(_)));

        let err = GptExplainer::builder()
            .attribution(Arc::new(FixedAttributions))
            .generator(Arc::new(RecordingGenerator::default()))
            .top_k(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, BiasError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_generator_failure_is_text_generation_error() {
        struct Failing;
        impl TextGenerator for Failing {
            fn generate(&self, _prompt: &ChatPrompt) -> anyhow::Result<String> {
                Err(anyhow::anyhow!("rate limited"))
            }
            fn name(&self) -> &str {
                "failing"
            }
        }

        let explainer = GptExplainer::builder()
            .attribution(Arc::new(FixedAttributions))
            .generator(Arc::new(Failing))
            .build()
            .unwrap();
        let err = explainer
            .explain(&df! { "age" => &[1i64] }.unwrap())
            .unwrap_err();
        assert!(matches!(err, BiasError::TextGeneration(ref m) if m.contains("rate limited")));
    }
}
