//! # edgequake-fininsight
//!
//! Turn a company annual report (PDF) into financial ratios, model-written
//! insights and a downloadable PDF summary.
//!
//! ## Why this crate?
//!
//! Annual reports bury a handful of numbers that matter (assets,
//! liabilities, revenue, profit) in hundreds of pages of narrative. This
//! crate pulls the text and tables out with pdfium and computes leverage,
//! margin and return ratios from the tables. It asks a language model for
//! key insights and deeper analytics on the narrative, then assembles the
//! lot into a short report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL, size + magic check
//!  ├─ 2. Extract   page text + metadata via pdfium (spawn_blocking)
//!  ├─ 3. Tables    recover tables from the text layout
//!  ├─ 4. Ratios    Debt-to-Equity, Profit Margin, Return on Assets
//!  ├─ 5. Insights  key insights ∥ deep-dive analytics (timeout + retry)
//!  └─ 6. Report    PDF summary, extracted-data JSON, ratio chart
//! ```
//!
//! A failed model call never aborts a run: the section is replaced by a
//! placeholder and the ratios still reach the report.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_fininsight::{analyze, build_report, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalysisConfig::builder()
//!         .endpoint("https://api.openai.com/v1/chat/completions")
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .model("gpt-4.1-mini")
//!         .build()?;
//!     let output = analyze("annual-report.pdf", &config).await?;
//!     for set in &output.ratios {
//!         for ratio in set.ratios.iter() {
//!             println!("{}: {}", ratio.name, ratio.value);
//!         }
//!     }
//!     std::fs::write("Financial_Report.pdf", build_report(&output, &config)?)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fininsight` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-fininsight = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod ratios;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze, analyze_bytes, analyze_sync, analyze_to_dir, build_report, inspect, write_artifacts,
    ArtifactOptions, DirRun, WrittenArtifacts,
};
pub use config::{
    AnalysisConfig, AnalysisConfigBuilder, ColumnMapping, FieldAliases, FieldColumns,
    TableSelection,
};
pub use error::{AnalysisError, ApiError, MappingError, SectionError};
pub use output::{
    AnalysisOutput, AnalysisStats, DocumentMetadata, ExtractedDocument, ExtractedTable,
    InsightSection, RatioWarning, SectionKind, TableRatios,
};
pub use pipeline::extract::{DocumentExtractor, PdfiumExtractor};
pub use pipeline::llm::{HttpGenerator, InsightGenerator, ProviderGenerator};
pub use pipeline::report::assemble;
pub use progress::{AnalysisProgressCallback, AnalysisStage, NoopProgressCallback, ProgressCallback};
pub use ratios::{calculate, FinancialField, Ratio, RatioSet, RatioValue, UnavailableReason};
