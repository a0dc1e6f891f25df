//! Configuration types for annual-report analysis.
//!
//! All pipeline behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. The endpoint, API key, token budget and
//! truncation limit are plain fields here; nothing is read from the process
//! environment by the library itself. The CLI maps its flags (and their
//! `env =` fallbacks) onto this struct.

use crate::error::{AnalysisError, MappingError};
use crate::pipeline::extract::DocumentExtractor;
use crate::pipeline::llm::InsightGenerator;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_TRUNCATION_LIMIT;
use crate::ratios::FinancialField;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default cap on input size: 50 MiB.
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 50 * 1024 * 1024;

/// Configuration for one analysis run.
///
/// # Example
/// ```rust
/// use edgequake_fininsight::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .endpoint("https://api.openai.com/v1/chat/completions")
///     .api_key("sk-test")
///     .max_tokens(800)
///     .truncation_limit(4000)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_tokens, 800);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// OpenAI-style chat-completions URL. When set, model calls go straight
    /// to this endpoint over HTTP; when `None`, an edgequake-llm provider is
    /// resolved instead.
    pub endpoint: Option<String>,

    /// Bearer token sent to `endpoint`.
    pub api_key: Option<String>,

    /// Model identifier sent in the request body / used for provider lookup.
    pub model: Option<String>,

    /// edgequake-llm provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed edgequake-llm provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed generator. Takes precedence over everything else.
    pub generator: Option<Arc<dyn InsightGenerator>>,

    /// Pre-constructed extractor. When `None`, pdfium is used.
    pub extractor: Option<Arc<dyn DocumentExtractor>>,

    /// Maximum output tokens per model call. Default: 1024.
    pub max_tokens: usize,

    /// Characters of report text sent with each prompt. Default: 4000.
    ///
    /// The remote model has an input-size limit; the prefix of an annual
    /// report (letter to shareholders, highlights) carries most of the signal.
    pub truncation_limit: usize,

    /// Number of key insights requested. Default: 5.
    pub insight_count: usize,

    /// Number of deep-dive analytics requested. Default: 5.
    pub analytics_count: usize,

    /// Ask the model for recommendations based on the computed ratios. Default: false.
    pub recommendations: bool,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Retry attempts after a transient model failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Inputs larger than this are rejected before parsing. Default: 50 MiB.
    pub max_input_bytes: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Directory containing the pdfium shared library. When `None`, the
    /// current directory and then the system library path are tried.
    pub pdfium_lib_path: Option<PathBuf>,

    /// How table headers map to the ratio inputs. Default: header aliases.
    pub column_mapping: ColumnMapping,

    /// Which tables feed the ratio calculator. Default: per table.
    pub table_selection: TableSelection,

    /// Title printed at the top of the PDF report.
    pub report_title: String,

    /// Custom system prompt. If None, uses built-in default.
    pub system_prompt: Option<String>,

    /// Stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: None,
            provider_name: None,
            provider: None,
            generator: None,
            extractor: None,
            max_tokens: 1024,
            truncation_limit: DEFAULT_TRUNCATION_LIMIT,
            insight_count: 5,
            analytics_count: 5,
            recommendations: false,
            temperature: 0.2,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            password: None,
            pdfium_lib_path: None,
            column_mapping: ColumnMapping::default(),
            table_selection: TableSelection::default(),
            report_title: "Financial Report".to_string(),
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("generator", &self.generator.as_ref().map(|_| "<dyn InsightGenerator>"))
            .field("extractor", &self.extractor.as_ref().map(|_| "<dyn DocumentExtractor>"))
            .field("max_tokens", &self.max_tokens)
            .field("truncation_limit", &self.truncation_limit)
            .field("insight_count", &self.insight_count)
            .field("analytics_count", &self.analytics_count)
            .field("recommendations", &self.recommendations)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_input_bytes", &self.max_input_bytes)
            .field("column_mapping", &self.column_mapping)
            .field("table_selection", &self.table_selection)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn InsightGenerator>) -> Self {
        self.config.generator = Some(generator);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.config.extractor = Some(extractor);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn truncation_limit(mut self, chars: usize) -> Self {
        self.config.truncation_limit = chars;
        self
    }

    pub fn insight_count(mut self, n: usize) -> Self {
        self.config.insight_count = n.max(1);
        self
    }

    pub fn analytics_count(mut self, n: usize) -> Self {
        self.config.analytics_count = n.max(1);
        self
    }

    pub fn recommendations(mut self, v: bool) -> Self {
        self.config.recommendations = v;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_input_bytes(mut self, bytes: u64) -> Self {
        self.config.max_input_bytes = bytes;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(dir.into());
        self
    }

    pub fn column_mapping(mut self, mapping: ColumnMapping) -> Self {
        self.config.column_mapping = mapping;
        self
    }

    pub fn table_selection(mut self, selection: TableSelection) -> Self {
        self.config.table_selection = selection;
        self
    }

    pub fn report_title(mut self, title: impl Into<String>) -> Self {
        self.config.report_title = title.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, AnalysisError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.truncation_limit == 0 {
            return Err(AnalysisError::InvalidConfig(
                "truncation_limit must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(AnalysisError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_input_bytes < 5 {
            return Err(AnalysisError::InvalidConfig(format!(
                "max_input_bytes is too small to hold a PDF header ({})",
                c.max_input_bytes
            )));
        }
        if let Some(ref url) = c.endpoint {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "endpoint must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if let ColumnMapping::Positional(ref cols) = c.column_mapping {
            if !cols.is_distinct() {
                return Err(AnalysisError::InvalidConfig(format!(
                    "positional columns must be distinct, got {cols:?}"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Column mapping ───────────────────────────────────────────────────────

/// Resolved column index for each ratio input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldColumns {
    pub total_assets: usize,
    pub total_liabilities: usize,
    pub revenue: usize,
    pub profit: usize,
}

impl FieldColumns {
    /// The legacy layout: `label, total_assets, total_liabilities, revenue, profit`.
    pub const LEGACY: FieldColumns = FieldColumns {
        total_assets: 1,
        total_liabilities: 2,
        revenue: 3,
        profit: 4,
    };

    pub fn get(&self, field: FinancialField) -> usize {
        match field {
            FinancialField::TotalAssets => self.total_assets,
            FinancialField::TotalLiabilities => self.total_liabilities,
            FinancialField::Revenue => self.revenue,
            FinancialField::Profit => self.profit,
        }
    }

    fn max_index(&self) -> usize {
        FinancialField::ALL
            .iter()
            .map(|f| self.get(*f))
            .max()
            .unwrap_or(0)
    }

    fn is_distinct(&self) -> bool {
        let mut cols: Vec<usize> = FinancialField::ALL.iter().map(|f| self.get(*f)).collect();
        cols.sort_unstable();
        cols.dedup();
        cols.len() == FinancialField::ALL.len()
    }
}

/// Header aliases per ratio input, matched case-insensitively after
/// punctuation is stripped. Earlier aliases win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAliases {
    pub total_assets: Vec<String>,
    pub total_liabilities: Vec<String>,
    pub revenue: Vec<String>,
    pub profit: Vec<String>,
}

impl Default for FieldAliases {
    fn default() -> Self {
        fn owned(v: &[&str]) -> Vec<String> {
            v.iter().map(|s| s.to_string()).collect()
        }
        Self {
            total_assets: owned(&["total assets", "assets"]),
            total_liabilities: owned(&["total liabilities", "liabilities"]),
            revenue: owned(&[
                "revenue",
                "total revenue",
                "revenue from operations",
                "net sales",
                "sales",
                "turnover",
                "total income",
            ]),
            profit: owned(&[
                "net profit",
                "profit",
                "net income",
                "profit after tax",
                "pat",
                "net earnings",
                "earnings",
            ]),
        }
    }
}

impl FieldAliases {
    pub fn for_field(&self, field: FinancialField) -> &[String] {
        match field {
            FinancialField::TotalAssets => &self.total_assets,
            FinancialField::TotalLiabilities => &self.total_liabilities,
            FinancialField::Revenue => &self.revenue,
            FinancialField::Profit => &self.profit,
        }
    }
}

/// How table columns are assigned to the four ratio inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnMapping {
    /// Match header cells against aliases (default).
    Headers(FieldAliases),
    /// Fixed column positions, for tables whose headers are unusable.
    Positional(FieldColumns),
}

impl Default for ColumnMapping {
    fn default() -> Self {
        ColumnMapping::Headers(FieldAliases::default())
    }
}

impl ColumnMapping {
    /// Positional mapping with the legacy column order.
    pub fn legacy_positional() -> Self {
        ColumnMapping::Positional(FieldColumns::LEGACY)
    }

    /// Resolve every field against `header`, failing on the first one that
    /// cannot be placed.
    pub fn resolve(&self, header: &[String]) -> Result<FieldColumns, MappingError> {
        if header.is_empty() {
            return Err(MappingError::EmptyTable);
        }
        match self {
            ColumnMapping::Positional(cols) => {
                let needed = cols.max_index() + 1;
                if header.len() < needed {
                    return Err(MappingError::TooFewColumns {
                        needed,
                        found: header.len(),
                    });
                }
                Ok(*cols)
            }
            ColumnMapping::Headers(aliases) => {
                let mut taken: Vec<usize> = Vec::with_capacity(4);
                let mut resolved = [0usize; 4];
                for (slot, field) in FinancialField::ALL.iter().enumerate() {
                    let col = match_header(header, aliases.for_field(*field), &taken).ok_or_else(
                        || MappingError::MissingField {
                            field: field.name().to_string(),
                            header: header.to_vec(),
                        },
                    )?;
                    taken.push(col);
                    resolved[slot] = col;
                }
                Ok(FieldColumns {
                    total_assets: resolved[0],
                    total_liabilities: resolved[1],
                    revenue: resolved[2],
                    profit: resolved[3],
                })
            }
        }
    }

    /// Resolve a single field, or `None` if the header does not carry it.
    pub fn resolve_field(&self, field: FinancialField, header: &[String]) -> Option<usize> {
        match self {
            ColumnMapping::Positional(cols) => {
                let col = cols.get(field);
                (col < header.len()).then_some(col)
            }
            ColumnMapping::Headers(aliases) => match_header(header, aliases.for_field(field), &[]),
        }
    }
}

/// Lowercase, replace punctuation with spaces, collapse whitespace.
pub(crate) fn normalise_header(cell: &str) -> String {
    cell.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Words marking a derived measure (a ratio or a change) rather than an
/// amount. Such headers never satisfy a word-contained match.
const DERIVED_MEASURE_WORDS: &[&str] = &[
    "margin", "ratio", "growth", "percent", "percentage", "change", "yoy", "per",
];

fn is_derived_measure(raw: &str, normalised: &str) -> bool {
    raw.contains('%')
        || normalised
            .split(' ')
            .any(|w| DERIVED_MEASURE_WORDS.contains(&w))
}

/// Exact alias matches beat word-contained matches; earlier aliases beat
/// later ones; columns in `taken` are never returned. Among contained
/// matches for one alias the header with the fewest words wins.
fn match_header(header: &[String], aliases: &[String], taken: &[usize]) -> Option<usize> {
    let normalised: Vec<String> = header.iter().map(|h| normalise_header(h)).collect();
    let free = |i: &usize| !taken.contains(i);

    for alias in aliases {
        let alias = normalise_header(alias);
        if let Some(i) = (0..normalised.len())
            .filter(free)
            .find(|&i| normalised[i] == alias)
        {
            return Some(i);
        }
    }
    for alias in aliases {
        let alias = normalise_header(alias);
        if alias.is_empty() {
            continue;
        }
        if let Some(i) = (0..normalised.len())
            .filter(free)
            .filter(|&i| !is_derived_measure(&header[i], &normalised[i]))
            .filter(|&i| contains_words(&normalised[i], &alias))
            .min_by_key(|&i| normalised[i].split(' ').count())
        {
            return Some(i);
        }
    }
    None
}

fn contains_words(haystack: &str, needle: &str) -> bool {
    let padded = format!(" {haystack} ");
    padded.contains(&format!(" {needle} "))
}

/// Which tables feed the ratio calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableSelection {
    /// One ratio set per table whose header maps all four fields (default).
    #[default]
    PerTable,
    /// Sum each field over every table that carries it, yielding one set.
    /// Use when the balance sheet and income statement are separate tables.
    Merged,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = AnalysisConfig::default();
        assert_eq!(c.max_tokens, 1024);
        assert_eq!(c.truncation_limit, 4000);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.table_selection, TableSelection::PerTable);
        assert!(matches!(c.column_mapping, ColumnMapping::Headers(_)));
    }

    #[test]
    fn builder_rejects_zero_tokens() {
        let err = AnalysisConfig::builder().max_tokens(0).build().unwrap_err();
        assert!(err.to_string().contains("max_tokens"));
    }

    #[test]
    fn builder_rejects_non_http_endpoint() {
        let err = AnalysisConfig::builder()
            .endpoint("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_duplicate_positions() {
        let cols = FieldColumns {
            total_assets: 1,
            total_liabilities: 1,
            revenue: 3,
            profit: 4,
        };
        let err = AnalysisConfig::builder()
            .column_mapping(ColumnMapping::Positional(cols))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("distinct"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = AnalysisConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn headers_resolve_in_any_order() {
        let h = header(&["Year", "Net Profit", "Revenue", "Total Liabilities", "Total Assets"]);
        let cols = ColumnMapping::default().resolve(&h).unwrap();
        assert_eq!(
            cols,
            FieldColumns {
                total_assets: 4,
                total_liabilities: 3,
                revenue: 2,
                profit: 1,
            }
        );
    }

    #[test]
    fn exact_match_beats_contained_match() {
        // "Current Assets" contains "assets" but "Total Assets" is exact.
        let h = header(&["Item", "Current Assets", "Total Assets", "Liabilities", "Sales", "Profit"]);
        let cols = ColumnMapping::default().resolve(&h).unwrap();
        assert_eq!(cols.total_assets, 2);
        assert_eq!(cols.total_liabilities, 3);
    }

    #[test]
    fn percentage_columns_are_not_amounts() {
        let h = header(&[
            "Segment",
            "Total Assets",
            "Total Liabilities",
            "Revenue",
            "Profit Margin (%)",
            "Profit Before Tax",
        ]);
        let cols = ColumnMapping::default().resolve(&h).unwrap();
        assert_eq!(cols.revenue, 3);
        assert_eq!(cols.profit, 5);

        let only_ratio = header(&["Item", "Assets", "Liabilities", "Sales", "Profit Margin"]);
        assert!(matches!(
            ColumnMapping::default().resolve(&only_ratio),
            Err(MappingError::MissingField { .. })
        ));
    }

    #[test]
    fn shortest_contained_header_wins() {
        let h = header(&["Item", "Operating Profit Before Exceptional Items", "Profit for the Year"]);
        assert_eq!(
            ColumnMapping::default().resolve_field(FinancialField::Profit, &h),
            Some(2)
        );
    }

    #[test]
    fn missing_field_fails_fast_with_field_name() {
        let h = header(&["Item", "Total Assets", "Total Liabilities", "Revenue"]);
        let err = ColumnMapping::default().resolve(&h).unwrap_err();
        match err {
            MappingError::MissingField { field, .. } => assert_eq!(field, "profit"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn positional_requires_five_columns() {
        let h = header(&["a", "b", "c", "d"]);
        let err = ColumnMapping::legacy_positional().resolve(&h).unwrap_err();
        assert_eq!(err, MappingError::TooFewColumns { needed: 5, found: 4 });
    }

    #[test]
    fn punctuation_is_ignored_in_headers() {
        assert_eq!(normalise_header("  Total-Assets (₹ Cr.) "), "total assets cr");
        let h = header(&["Particulars", "Total Assets (₹ Cr.)", "Total Liabilities", "Revenue", "PAT"]);
        let cols = ColumnMapping::default().resolve(&h).unwrap();
        assert_eq!(cols.total_assets, 1);
        assert_eq!(cols.profit, 4);
    }

    #[test]
    fn resolve_field_returns_none_when_absent() {
        let h = header(&["Item", "Revenue", "Net Income"]);
        let m = ColumnMapping::default();
        assert_eq!(m.resolve_field(FinancialField::Revenue, &h), Some(1));
        assert_eq!(m.resolve_field(FinancialField::TotalAssets, &h), None);
    }
}
