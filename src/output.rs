//! Output types: extracted document, ratio sets, insight sections, stats.
//!
//! Everything here is request-scoped and `Serialize`, so the CLI can print
//! the whole [`AnalysisOutput`] as JSON.

use crate::error::SectionError;
use crate::ratios::RatioSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// PDF metadata, read without touching the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// A rectangular table recovered from the report. `rows[0]` is the header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTable {
    /// 1-indexed page the table was found on, when known.
    pub page: Option<usize>,
    pub rows: Vec<Vec<String>>,
}

impl ExtractedTable {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { page: None, rows }
    }

    pub fn on_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn header(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    pub fn column_count(&self) -> usize {
        self.header().len()
    }
}

/// Text and tables pulled out of one PDF.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Page texts joined with `\n`.
    pub text: String,
    pub tables: Vec<ExtractedTable>,
    pub metadata: DocumentMetadata,
}

impl ExtractedDocument {
    /// The downloadable extracted-data blob: `{"financial_text": …, "tables": […]}`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct ExtractedData<'a> {
            financial_text: &'a str,
            tables: Vec<&'a Vec<Vec<String>>>,
        }
        serde_json::to_string_pretty(&ExtractedData {
            financial_text: &self.text,
            tables: self.tables.iter().map(|t| &t.rows).collect(),
        })
    }
}

/// One ratio set and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRatios {
    /// 0-indexed table, or `None` for a merged set.
    pub table_index: Option<usize>,
    pub page: Option<usize>,
    /// Tables that contributed at least one column.
    pub source_tables: Vec<usize>,
    pub ratios: RatioSet,
}

impl TableRatios {
    /// Human label used in the report and the chart legend.
    pub fn label(&self) -> String {
        match (self.table_index, self.page) {
            (Some(i), Some(p)) => format!("Table {} (page {})", i + 1, p),
            (Some(i), None) => format!("Table {}", i + 1),
            (None, _) => "All tables".to_string(),
        }
    }
}

/// A degraded ratio or skipped table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioWarning {
    pub table_index: Option<usize>,
    pub message: String,
}

impl fmt::Display for RatioWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table_index {
            Some(i) => write!(f, "table {}: {}", i + 1, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Which model-generated section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Insights,
    Analytics,
    Recommendations,
}

impl SectionKind {
    pub fn name(&self) -> &'static str {
        match self {
            SectionKind::Insights => "insights",
            SectionKind::Analytics => "analytics",
            SectionKind::Recommendations => "recommendations",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            SectionKind::Insights => "Key Insights",
            SectionKind::Analytics => "Deep-Dive Analytics",
            SectionKind::Recommendations => "Recommendations",
        }
    }
}

/// Model output for one section, or the error that replaced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightSection {
    pub kind: SectionKind,
    /// Cleaned model text; empty when `error` is set.
    pub text: String,
    /// `text` split on line breaks, list markers removed.
    pub bullets: Vec<String>,
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: Option<SectionError>,
}

impl InsightSection {
    pub fn failed(kind: SectionKind, error: SectionError, attempts: u32, duration_ms: u64) -> Self {
        Self {
            kind,
            text: String::new(),
            bullets: Vec::new(),
            attempts,
            duration_ms,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Placeholder shown in place of a failed section.
    pub fn placeholder(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|e| format!("{} unavailable: {}", self.kind.title(), e))
    }
}

/// Timing and counts for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub input_bytes: u64,
    pub page_count: usize,
    pub text_chars: usize,
    pub tables_found: usize,
    pub ratio_sets: usize,
    pub unavailable_ratios: usize,
    pub failed_sections: usize,
    pub extract_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything one analysis run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    /// Input path, URL or caller-supplied name.
    pub source: String,
    pub document: ExtractedDocument,
    pub ratios: Vec<TableRatios>,
    pub warnings: Vec<RatioWarning>,
    pub insights: InsightSection,
    pub analytics: InsightSection,
    pub recommendations: Option<InsightSection>,
    pub stats: AnalysisStats,
}

impl AnalysisOutput {
    /// Sections in report order.
    pub fn sections(&self) -> impl Iterator<Item = &InsightSection> {
        [Some(&self.insights), Some(&self.analytics), self.recommendations.as_ref()]
            .into_iter()
            .flatten()
    }

    /// User-visible messages for every degraded part of the run.
    pub fn messages(&self) -> Vec<String> {
        let mut out: Vec<String> = self.sections().filter_map(InsightSection::placeholder).collect();
        out.extend(self.warnings.iter().map(|w| w.to_string()));
        out
    }

    pub fn is_degraded(&self) -> bool {
        self.sections().any(|s| !s.is_ok()) || !self.warnings.is_empty()
    }
}
