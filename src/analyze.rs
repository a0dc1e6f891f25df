//! Orchestrator: input → extraction → ratios ∥ insights → report.
//!
//! Extraction is the only stage whose failure aborts a run. Ratio problems
//! become warnings, and a failed model call becomes a placeholder section.
//! The report is assembled from whatever survived.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, SectionError};
use crate::output::{AnalysisOutput, AnalysisStats, DocumentMetadata, InsightSection, SectionKind};
use crate::pipeline::extract::{DocumentExtractor, PdfiumExtractor};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::llm::{self, InsightGenerator};
use crate::pipeline::{chart, report};
use crate::progress::AnalysisStage;
use crate::prompts;
use crate::ratios::calculate_all;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const REPORT_FILE_NAME: &str = "Financial_Report.pdf";
pub const DATA_FILE_NAME: &str = "financial_data.json";
pub const CHART_FILE_NAME: &str = "ratios.png";
pub const ANALYSIS_FILE_NAME: &str = "analysis.json";

/// Analyse a PDF file or URL.
///
/// # Errors
/// Returns `Err` only for fatal errors: unreadable input, not a PDF,
/// encrypted without the right password, or pdfium failure. Model and
/// ratio failures are recorded on the returned [`AnalysisOutput`].
pub async fn analyze(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, AnalysisError> {
    let start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting analysis: {}", input_str);

    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(AnalysisStage::Input);
    }
    let resolved =
        input::resolve_input(input_str, config.download_timeout_secs, config.max_input_bytes).await?;
    run(resolved, config, start).await
}

/// Analyse PDF bytes already in memory. `source` names them in messages.
///
/// # Example
/// ```rust,no_run
/// use edgequake_fininsight::{analyze_bytes, AnalysisConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("annual-report.pdf")?;
/// let config = AnalysisConfig::default();
/// let output = analyze_bytes(bytes, "annual-report.pdf", &config).await?;
/// for set in &output.ratios {
///     println!("{}", set.label());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn analyze_bytes(
    bytes: Vec<u8>,
    source: &str,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, AnalysisError> {
    let start = Instant::now();
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(AnalysisStage::Input);
    }
    input::validate_pdf_bytes(source, &bytes, config.max_input_bytes)?;
    run(
        ResolvedInput {
            source: source.to_string(),
            bytes,
        },
        config,
        start,
    )
    .await
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, AnalysisError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AnalysisError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(input_str, config))
}

/// Read PDF metadata without extracting tables or calling a model.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<DocumentMetadata, AnalysisError> {
    let resolved = input::resolve_input(
        input_str.as_ref(),
        config.download_timeout_secs,
        config.max_input_bytes,
    )
    .await?;
    extractor_for(config)
        .metadata(resolved.bytes, &resolved.source)
        .await
}

fn extractor_for(config: &AnalysisConfig) -> Arc<dyn DocumentExtractor> {
    match config.extractor {
        Some(ref e) => Arc::clone(e),
        None => Arc::new(PdfiumExtractor::new(
            config.pdfium_lib_path.clone(),
            config.password.clone(),
        )),
    }
}

fn stage_for(kind: SectionKind) -> AnalysisStage {
    match kind {
        SectionKind::Insights => AnalysisStage::Insights,
        SectionKind::Analytics => AnalysisStage::Analytics,
        SectionKind::Recommendations => AnalysisStage::Recommendations,
    }
}

async fn run(
    resolved: ResolvedInput,
    config: &AnalysisConfig,
    total_start: Instant,
) -> Result<AnalysisOutput, AnalysisError> {
    let ResolvedInput { source, bytes } = resolved;
    let input_bytes = bytes.len() as u64;
    let cb = config.progress_callback.as_ref();

    if let Some(cb) = cb {
        cb.on_stage_complete(AnalysisStage::Input, &format!("{} bytes", input_bytes));
        cb.on_analysis_start(&source, input_bytes);
    }

    // ── Step 1: Extract text and tables ──────────────────────────────────
    if let Some(cb) = cb {
        cb.on_stage_start(AnalysisStage::Extract);
    }
    let extract_start = Instant::now();
    let document = extractor_for(config).extract(bytes, &source).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    info!(
        "Extracted {} chars and {} tables from {} pages in {}ms",
        document.text.chars().count(),
        document.tables.len(),
        document.metadata.page_count,
        extract_duration_ms
    );
    if let Some(cb) = cb {
        cb.on_stage_complete(
            AnalysisStage::Extract,
            &format!(
                "{} pages, {} tables",
                document.metadata.page_count,
                document.tables.len()
            ),
        );
    }

    // ── Step 2: Ratios ───────────────────────────────────────────────────
    if let Some(cb) = cb {
        cb.on_stage_start(AnalysisStage::Ratios);
    }
    let ratio_report = calculate_all(&document.tables, &config.column_mapping, config.table_selection);
    if let Some(cb) = cb {
        cb.on_stage_complete(
            AnalysisStage::Ratios,
            &format!("{} ratio sets", ratio_report.sets.len()),
        );
        for w in &ratio_report.warnings {
            cb.on_stage_error(AnalysisStage::Ratios, &w.to_string());
        }
    }

    // ── Step 3: Model sections, concurrently ─────────────────────────────
    let llm_start = Instant::now();
    let generator = if document.text.trim().is_empty() {
        warn!("No text extracted from {}; skipping model calls", source);
        Generator::NoText
    } else {
        match llm::resolve_generator(config) {
            Ok(g) => Generator::Ready(g),
            Err(e) => {
                warn!("No model available: {}", e);
                Generator::Unavailable(e.to_string())
            }
        }
    };

    let insights_prompt =
        prompts::insights_prompt(&document.text, config.insight_count, config.truncation_limit);
    let analytics_prompt =
        prompts::analytics_prompt(&document.text, config.analytics_count, config.truncation_limit);
    let recommendations_prompt = if config.recommendations {
        let p = prompts::recommendations_prompt(&ratio_report.sets);
        if p.is_none() {
            debug!("No available ratios; recommendations skipped");
        }
        p
    } else {
        None
    };

    let (insights, analytics, recommendations) = tokio::join!(
        run_section(&generator, SectionKind::Insights, &insights_prompt, config),
        run_section(&generator, SectionKind::Analytics, &analytics_prompt, config),
        async {
            match recommendations_prompt {
                Some(ref p) => {
                    Some(run_section(&generator, SectionKind::Recommendations, p, config).await)
                }
                None => None,
            }
        }
    );
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    let mut output = AnalysisOutput {
        source,
        document,
        ratios: ratio_report.sets,
        warnings: ratio_report.warnings,
        insights,
        analytics,
        recommendations,
        stats: AnalysisStats::default(),
    };

    let failed_sections = output.sections().filter(|s| !s.is_ok()).count();
    output.stats = AnalysisStats {
        input_bytes,
        page_count: output.document.metadata.page_count,
        text_chars: output.document.text.chars().count(),
        tables_found: output.document.tables.len(),
        ratio_sets: output.ratios.len(),
        unavailable_ratios: output
            .ratios
            .iter()
            .map(|s| s.ratios.len() - s.ratios.available_count())
            .sum(),
        failed_sections,
        extract_duration_ms,
        llm_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Analysis complete: {} ratio sets, {} failed sections, {}ms",
        output.stats.ratio_sets, failed_sections, output.stats.total_duration_ms
    );
    if let Some(cb) = cb {
        cb.on_analysis_complete(failed_sections);
    }
    Ok(output)
}

enum Generator {
    Ready(Arc<dyn InsightGenerator>),
    NoText,
    Unavailable(String),
}

/// One model section with its progress events.
async fn run_section(
    generator: &Generator,
    kind: SectionKind,
    prompt: &str,
    config: &AnalysisConfig,
) -> InsightSection {
    let stage = stage_for(kind);
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(stage);
    }

    let section = match generator {
        Generator::Ready(g) => llm::generate_section(g, kind, prompt, config).await,
        Generator::NoText => InsightSection::failed(
            kind,
            SectionError::NoText {
                section: kind.name().to_string(),
            },
            0,
            0,
        ),
        Generator::Unavailable(detail) => InsightSection::failed(
            kind,
            SectionError::LlmFailed {
                section: kind.name().to_string(),
                retries: 0,
                detail: detail.clone(),
            },
            0,
            0,
        ),
    };

    if let Some(cb) = cb {
        match section.error {
            Some(ref e) => cb.on_stage_error(stage, &e.to_string()),
            None => cb.on_stage_complete(stage, &format!("{} points", section.bullets.len())),
        }
    }
    section
}

// ── Artifacts ────────────────────────────────────────────────────────────

/// Assemble the PDF report for a finished analysis.
pub fn build_report(output: &AnalysisOutput, config: &AnalysisConfig) -> Result<Vec<u8>, AnalysisError> {
    report::assemble_output(output, &config.report_title)
}

/// Write `bytes` to `path` through a temp file in the same directory, so a
/// reader never sees a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AnalysisError> {
    let write_err = |e: std::io::Error| AnalysisError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Which files [`write_artifacts`] produces besides the report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactOptions {
    /// `financial_data.json`: extracted text and tables.
    pub data_json: bool,
    /// `ratios.png`, when at least one ratio is available.
    pub chart: bool,
    /// `analysis.json`: the whole [`AnalysisOutput`].
    pub analysis_json: bool,
}

impl ArtifactOptions {
    pub fn all() -> Self {
        Self {
            data_json: true,
            chart: true,
            analysis_json: true,
        }
    }
}

/// Paths of the files written for one run.
#[derive(Debug, Clone, Default)]
pub struct WrittenArtifacts {
    pub report: PathBuf,
    pub data_json: Option<PathBuf>,
    pub chart: Option<PathBuf>,
    pub analysis_json: Option<PathBuf>,
}

fn json_err(e: serde_json::Error) -> AnalysisError {
    AnalysisError::Internal(format!("JSON serialisation failed: {e}"))
}

/// Write the report and the selected artifacts into `dir`.
pub fn write_artifacts(
    output: &AnalysisOutput,
    dir: &Path,
    config: &AnalysisConfig,
    opts: ArtifactOptions,
) -> Result<WrittenArtifacts, AnalysisError> {
    let report_path = dir.join(REPORT_FILE_NAME);
    write_atomic(&report_path, &build_report(output, config)?)?;
    info!("Report written to {}", report_path.display());

    let mut written = WrittenArtifacts {
        report: report_path,
        ..Default::default()
    };

    if opts.data_json {
        let path = dir.join(DATA_FILE_NAME);
        write_atomic(&path, output.document.to_json().map_err(json_err)?.as_bytes())?;
        written.data_json = Some(path);
    }

    if opts.chart {
        match chart::render_ratio_chart(&output.ratios)? {
            Some(png) => {
                let path = dir.join(CHART_FILE_NAME);
                write_atomic(&path, &png)?;
                written.chart = Some(path);
            }
            None => debug!("No available ratios; chart skipped"),
        }
    }

    if opts.analysis_json {
        let path = dir.join(ANALYSIS_FILE_NAME);
        let json = serde_json::to_string_pretty(output).map_err(json_err)?;
        write_atomic(&path, json.as_bytes())?;
        written.analysis_json = Some(path);
    }

    Ok(written)
}

/// Result of [`analyze_to_dir`]. A failed write does not discard the analysis.
#[derive(Debug)]
pub struct DirRun {
    pub output: AnalysisOutput,
    pub written: Result<WrittenArtifacts, AnalysisError>,
}

/// Analyse `input` and write the artifacts into `dir`.
pub async fn analyze_to_dir(
    input_str: impl AsRef<str>,
    dir: impl AsRef<Path>,
    config: &AnalysisConfig,
    opts: ArtifactOptions,
) -> Result<DirRun, AnalysisError> {
    let output = analyze(input_str, config).await?;
    let written = write_artifacts(&output, dir.as_ref(), config, opts);
    if let Err(ref e) = written {
        warn!("Writing artifacts failed: {}", e);
    }
    Ok(DirRun { output, written })
}
