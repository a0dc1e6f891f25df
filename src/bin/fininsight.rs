//! CLI binary for edgequake-fininsight.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AnalysisConfig`, writes the artifacts and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_fininsight::{
    analyze, inspect, write_artifacts, AnalysisConfig, AnalysisOutput, AnalysisProgressCallback,
    AnalysisStage, ArtifactOptions, ColumnMapping, InsightSection, ProgressCallback,
    TableSelection,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner with one log line per finished stage. The model stages run
/// concurrently, so their lines can arrive in any order.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

fn shorten(msg: &str, max: usize) -> String {
    if msg.chars().count() > max {
        let cut: String = msg.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        msg.to_string()
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_analysis_start(&self, source: &str, input_bytes: u64) {
        self.bar.println(format!(
            "{} {}  {}",
            cyan("◆"),
            bold(&format!("Analysing {source}")),
            dim(&format!("{:.1} KiB", input_bytes as f64 / 1024.0)),
        ));
        self.bar.set_prefix("Analysing");
    }

    fn on_stage_start(&self, stage: AnalysisStage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: AnalysisStage, detail: &str) {
        if stage == AnalysisStage::Input {
            return;
        }
        self.bar
            .println(format!("  {} {:<16} {}", green("✓"), stage, dim(detail)));
    }

    fn on_stage_error(&self, stage: AnalysisStage, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let mark = if stage == AnalysisStage::Ratios {
            yellow("!")
        } else {
            red("✗")
        };
        self.bar
            .println(format!("  {} {:<16} {}", mark, stage, shorten(error, 90)));
    }

    fn on_analysis_complete(&self, failed_sections: usize) {
        self.bar.finish_and_clear();
        if failed_sections == 0 {
            eprintln!("{} Analysis complete", green("✔"));
        } else {
            eprintln!(
                "{} Analysis complete  ({} model sections failed)",
                yellow("⚠"),
                red(&failed_sections.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a report, write Financial_Report.pdf to the current directory
  fininsight annual-report.pdf

  # Any OpenAI-compatible endpoint
  fininsight --endpoint https://api.openai.com/v1/chat/completions \
             --api-key $OPENAI_API_KEY --model gpt-4.1-mini report.pdf

  # From a URL, everything into ./out (report, data JSON, chart, analysis JSON)
  fininsight https://example.com/ar2024.pdf -o out --data-json --chart --analysis-json

  # Balance sheet and income statement in separate tables
  fininsight --tables merged report.pdf

  # Legacy layout: columns 1-4 are assets, liabilities, revenue, profit
  fininsight --columns positional report.pdf

  # Inspect PDF metadata (no API key needed)
  fininsight --inspect-only report.pdf

  # Full analysis as JSON on stdout
  fininsight --json report.pdf > analysis.json

ENVIRONMENT VARIABLES:
  FININSIGHT_ENDPOINT     OpenAI-style chat-completions URL
  FININSIGHT_API_KEY      Bearer key for the endpoint
  OPENAI_API_KEY          Used by the provider fallback when no endpoint is set
  ANTHROPIC_API_KEY       Provider fallback
  GEMINI_API_KEY          Provider fallback
  EDGEQUAKE_MODEL         Model ID
  EDGEQUAKE_PROVIDER      Provider name for the fallback (openai, anthropic, ...)
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter, overrides --verbose/--quiet
"#;

/// Financial ratios and model insights from annual-report PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "fininsight",
    version,
    about = "Extract financial ratios and LLM insights from annual-report PDFs",
    long_about = "Extract text and tables from an annual-report PDF, compute Debt-to-Equity, \
Profit Margin and Return on Assets, ask a language model for key insights and deep-dive \
analytics, and write a PDF summary.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Directory for the report and other artifacts.
    #[arg(short, long, env = "FININSIGHT_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// OpenAI-style chat-completions endpoint.
    #[arg(long, env = "FININSIGHT_ENDPOINT")]
    endpoint: Option<String>,

    /// Bearer API key for --endpoint.
    #[arg(long, env = "FININSIGHT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID sent to the endpoint or provider.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// edgequake-llm provider used when no endpoint is set.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Max output tokens per model call.
    #[arg(long, env = "FININSIGHT_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// Characters of report text sent with each prompt.
    #[arg(long, env = "FININSIGHT_TRUNCATION_LIMIT", default_value_t = 4000)]
    truncation_limit: usize,

    /// Number of key insights to request.
    #[arg(long, env = "FININSIGHT_INSIGHTS", default_value_t = 5)]
    insights: usize,

    /// Number of deep-dive analytics to request.
    #[arg(long, env = "FININSIGHT_ANALYTICS", default_value_t = 5)]
    analytics: usize,

    /// Also ask for recommendations based on the computed ratios.
    #[arg(long, env = "FININSIGHT_RECOMMENDATIONS")]
    recommendations: bool,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "FININSIGHT_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Retries per model call on transient failure.
    #[arg(long, env = "FININSIGHT_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-model-call timeout in seconds.
    #[arg(long, env = "FININSIGHT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FININSIGHT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Reject inputs larger than this many MiB.
    #[arg(long, env = "FININSIGHT_MAX_INPUT_MB", default_value_t = 50)]
    max_input_mb: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "FININSIGHT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// How table columns map to ratio inputs.
    #[arg(long, env = "FININSIGHT_COLUMNS", value_enum, default_value = "headers")]
    columns: ColumnsArg,

    /// Which tables feed the ratios.
    #[arg(long, env = "FININSIGHT_TABLES", value_enum, default_value = "per-table")]
    tables: TablesArg,

    /// Title printed at the top of the report.
    #[arg(long, env = "FININSIGHT_TITLE", default_value = "Financial Report")]
    title: String,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "FININSIGHT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Also write financial_data.json (extracted text and tables).
    #[arg(long)]
    data_json: bool,

    /// Also write ratios.png.
    #[arg(long)]
    chart: bool,

    /// Also write analysis.json (the full analysis).
    #[arg(long)]
    analysis_json: bool,

    /// Print the full analysis as JSON on stdout instead of a summary.
    #[arg(long)]
    json: bool,

    /// Print PDF metadata only, no analysis.
    #[arg(long)]
    inspect_only: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "FININSIGHT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FININSIGHT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FININSIGHT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ColumnsArg {
    Headers,
    Positional,
}

impl From<ColumnsArg> for ColumnMapping {
    fn from(v: ColumnsArg) -> Self {
        match v {
            ColumnsArg::Headers => ColumnMapping::default(),
            ColumnsArg::Positional => ColumnMapping::legacy_positional(),
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TablesArg {
    PerTable,
    Merged,
}

impl From<TablesArg> for TableSelection {
    fn from(v: TablesArg) -> Self {
        match v {
            TablesArg::PerTable => TableSelection::PerTable,
            TablesArg::Merged => TableSelection::Merged,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters, so INFO logs are
    // suppressed while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None).await?;
        let meta = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialise metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref d) = meta.creation_date {
                println!("Created:      {}", d);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new();
        Some(cb as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run analysis ─────────────────────────────────────────────────────
    let output = analyze(&cli.input, &config)
        .await
        .context("Analysis failed")?;

    let opts = ArtifactOptions {
        data_json: cli.data_json,
        chart: cli.chart,
        analysis_json: cli.analysis_json,
    };
    // The analysis is printed even when writing fails; the error is
    // returned afterwards so the exit code reflects it.
    let written = write_artifacts(&output, &cli.output_dir, &config, opts);

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        print_summary(&output);
    }

    let written = written.context("Failed to write report")?;
    if !cli.quiet {
        eprintln!(
            "{}  report  →  {}",
            green("✔"),
            bold(&written.report.display().to_string())
        );
        for path in [&written.data_json, &written.chart, &written.analysis_json]
            .into_iter()
            .flatten()
        {
            eprintln!("   {}", dim(&path.display().to_string()));
        }
        eprintln!(
            "   {} tables, {} ratio sets  —  {}ms total",
            output.stats.tables_found, output.stats.ratio_sets, output.stats.total_duration_ms
        );
    }

    Ok(())
}

fn print_section(section: &InsightSection) {
    println!("\n{}", bold(section.kind.title()));
    match section.placeholder() {
        Some(msg) => println!("  {}", red(&msg)),
        None => {
            for b in &section.bullets {
                println!("  • {b}");
            }
        }
    }
}

/// Human-readable results on stdout.
fn print_summary(output: &AnalysisOutput) {
    print_section(&output.insights);

    println!("\n{}", bold("Financial Ratios"));
    if output.ratios.is_empty() {
        println!("  {}", dim("No ratio data could be extracted."));
    }
    for set in &output.ratios {
        if output.ratios.len() > 1 {
            println!("  {}", cyan(&set.label()));
        }
        for ratio in set.ratios.iter() {
            let value = ratio.value.to_string();
            let value = if ratio.value.is_available() {
                value
            } else {
                yellow(&value)
            };
            println!("    {:<22} {}", ratio.name, value);
        }
    }

    print_section(&output.analytics);
    if let Some(ref rec) = output.recommendations {
        print_section(rec);
    }

    if !output.warnings.is_empty() {
        eprintln!();
        for w in &output.warnings {
            eprintln!("{} {}", yellow("!"), w);
        }
    }
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = AnalysisConfig::builder()
        .max_tokens(cli.max_tokens)
        .truncation_limit(cli.truncation_limit)
        .insight_count(cli.insights)
        .analytics_count(cli.analytics)
        .recommendations(cli.recommendations)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .max_input_bytes(cli.max_input_mb.saturating_mul(1024 * 1024))
        .column_mapping(cli.columns.into())
        .table_selection(cli.tables.into())
        .report_title(cli.title.clone());

    if let Some(ref endpoint) = cli.endpoint {
        builder = builder.endpoint(endpoint.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(ref dir) = cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(dir.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
