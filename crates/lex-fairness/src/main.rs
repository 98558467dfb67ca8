//! CLI entry point for group fairness analysis.

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use lex_fairness::data::read_csv;
use lex_fairness::{
    AttributionExplanation, BiasAnalyzer, ColumnPredictor, CounterfactualExplanation,
    GroupSelector, Label, LabelSelection, MetricRegistry, TabularData, TaskMode, build_prompt,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[cfg(feature = "ai")]
use lex_fairness::ai::{OpenAiConfig, OpenAiProvider, TextGenerator};

#[derive(Parser, Debug)]
#[command(
    author = "Lex Machina Team",
    version,
    about = "Group fairness analysis for tabular models",
    long_about = "Measure how a model's predicted labels differ between two groups of rows.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  OPENAI_API_KEY    API key for OpenAI (required for `prompt --send`)\n\n\
                  EXAMPLES:\n  \
                  # Female vs. everyone else, scores exported as p0,p1\n  \
                  lex-fairness bias -i scored.csv -t income -f sex --value Female --score-columns p0,p1\n\n  \
                  # Two explicit groups, label 1 only, JSON output\n  \
                  lex-fairness bias -i scored.csv -t income -f race --group-a Black,Other --group-b White \\\n      \
                  --label 1 --score-columns p0,p1 --json\n\n  \
                  # Build an explanation prompt from attribution scores\n  \
                  lex-fairness prompt --attribution shap.json"
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Suppress progress output (only show warnings and results)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute bias metrics between two groups of a feature column
    Bias(BiasArgs),
    /// Assemble (and optionally send) an LLM explanation prompt
    Prompt(PromptArgs),
}

#[derive(Args, Debug)]
struct BiasArgs {
    /// Path to the CSV file holding features, target and model scores
    #[arg(short, long)]
    input: PathBuf,

    /// Target column
    #[arg(short, long)]
    target: String,

    /// Feature column used to form the groups
    #[arg(short, long)]
    feature: String,

    /// Group A is this value; group B is every other row
    #[arg(long, conflicts_with_all = ["group_a", "group_b"], required_unless_present = "group_a")]
    value: Option<String>,

    /// Comma-separated values forming group A
    #[arg(long, value_delimiter = ',', requires = "group_b")]
    group_a: Option<Vec<String>>,

    /// Comma-separated values forming group B
    #[arg(long, value_delimiter = ',', requires = "group_a")]
    group_b: Option<Vec<String>>,

    /// Label to evaluate (repeatable). Defaults to every label.
    #[arg(long = "label")]
    labels: Vec<String>,

    /// Metric to compute (repeatable): DPL, DI, DCO. Defaults to DPL and DI.
    #[arg(long = "metric")]
    metrics: Vec<String>,

    /// Task type: classification or regression
    #[arg(short, long, default_value = "classification")]
    mode: String,

    /// Rows per prediction call
    #[arg(long, default_value = "64")]
    batch_size: usize,

    /// Comma-separated class score columns (classification)
    #[arg(long, value_delimiter = ',', conflicts_with = "score_column")]
    score_columns: Vec<String>,

    /// Predicted value column (regression)
    #[arg(long)]
    score_column: Option<String>,

    /// Output the report as JSON to stdout
    ///
    /// Disables all progress logs.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PromptArgs {
    /// JSON file with `target_label` and `attributions` (feature, value, score)
    #[arg(short, long)]
    attribution: PathBuf,

    /// Single-row CSV with the explained instance
    #[arg(long, requires = "counterfactuals")]
    query: Option<PathBuf>,

    /// CSV with counterfactual rows and a `label` column
    #[arg(long, requires = "query")]
    counterfactuals: Option<PathBuf>,

    /// Task type: classification or regression
    #[arg(short, long, default_value = "classification")]
    mode: String,

    /// Maximum number of attribution entries in the prompt
    #[arg(long, default_value = "50")]
    top_k: usize,

    /// Send the prompt to OpenAI and print the reply
    #[arg(long)]
    send: bool,

    /// OpenAI model
    #[arg(long, default_value = "gpt-3.5-turbo")]
    model: String,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout carries only JSON.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let json_output = matches!(&cli.command, Command::Bias(args) if args.json);
    init_logging(&cli.log_level, cli.quiet, json_output);

    dotenv().ok();

    match cli.command {
        Command::Bias(args) => run_bias(args),
        Command::Prompt(args) => run_prompt(args),
    }
}

fn run_bias(args: BiasArgs) -> Result<()> {
    info!("Loading dataset from: {}", args.input.display());
    let df = read_csv(&args.input)?;
    info!("Dataset loaded successfully: {:?}", df.shape());

    let data = TabularData::new(df, Some(args.target.clone()))?;

    // Raw CLI strings take the feature column's type
    let selector = match (&args.value, &args.group_a, &args.group_b) {
        (Some(value), _, _) => GroupSelector::SingleValue(data.parse_feature_value(&args.feature, value)?),
        (None, Some(a), Some(b)) => GroupSelector::TwoGroups(
            a.iter()
                .map(|v| data.parse_feature_value(&args.feature, v))
                .collect::<lex_fairness::Result<_>>()?,
            b.iter()
                .map(|v| data.parse_feature_value(&args.feature, v))
                .collect::<lex_fairness::Result<_>>()?,
        ),
        _ => return Err(anyhow!("provide --value or both --group-a and --group-b")),
    };

    let labels = args
        .labels
        .iter()
        .map(|raw| raw.parse::<Label>())
        .collect::<lex_fairness::Result<Vec<_>>>()?;
    let labels = match labels.len() {
        0 => LabelSelection::All,
        1 => LabelSelection::Single(labels[0]),
        _ => LabelSelection::Set(labels),
    };

    let predictor = match &args.score_column {
        Some(column) => ColumnPredictor::new([column.as_str()])?,
        None if !args.score_columns.is_empty() => ColumnPredictor::new(args.score_columns.iter().map(String::as_str))?,
        None => return Err(anyhow!("provide --score-columns (classification) or --score-column (regression)")),
    };

    let metrics = if args.metrics.is_empty() {
        MetricRegistry::default()
    } else {
        MetricRegistry::from_names(&args.metrics)?
    };

    let analyzer = BiasAnalyzer::builder()
        .data(data)
        .predictor(Arc::new(predictor))
        .metrics(metrics)
        .mode_str(&args.mode)
        .batch_size(args.batch_size)
        .on_report(|report| info!("Report ready: {} metrics", report.metrics.len()))
        .build()?;

    let report = analyzer.explain(&args.feature, &selector, labels)?;

    // User-facing output goes to stdout regardless of log level
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    Ok(())
}

fn run_prompt(args: PromptArgs) -> Result<()> {
    let mode: TaskMode = args.mode.parse()?;

    let raw = std::fs::read_to_string(&args.attribution)?;
    let attribution: AttributionExplanation = serde_json::from_str(&raw)?;

    let counterfactual = match (&args.query, &args.counterfactuals) {
        (Some(query), Some(cfs)) => Some(CounterfactualExplanation {
            query: read_csv(query)?,
            counterfactuals: Some(read_csv(cfs)?),
        }),
        _ => None,
    };
    // Counterfactuals only describe label changes
    let counterfactual = counterfactual.filter(|_| mode == TaskMode::Classification);

    let prompt = build_prompt(&attribution, counterfactual.as_ref(), mode, args.top_k);

    if !args.send {
        println!("[system]\n{}\n\n[user]\n{}", prompt.system, prompt.user);
        return Ok(());
    }

    send_prompt(&prompt, &args.model)
}

#[cfg(feature = "ai")]
fn send_prompt(prompt: &lex_fairness::ai::ChatPrompt, model: &str) -> Result<()> {
    let provider = OpenAiProvider::with_config(None, OpenAiConfig::builder().model(model).build())?;
    info!("Sending prompt to {} ({})", provider.name(), model);
    let reply = provider.generate(prompt)?;
    println!("{}", reply);
    Ok(())
}

#[cfg(not(feature = "ai"))]
fn send_prompt(_prompt: &lex_fairness::ai::ChatPrompt, _model: &str) -> Result<()> {
    Err(anyhow!("--send requires the `ai` feature"))
}
