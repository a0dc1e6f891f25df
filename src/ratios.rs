//! Ratio calculator: summed table columns → Debt-to-Equity, Profit Margin,
//! Return on Assets.
//!
//! Every step is pure. Column meaning comes from a [`ColumnMapping`]
//! resolved against the table header; cells are coerced best-effort and
//! unparseable cells are left out of the sum. A ratio whose inputs are
//! missing, non-numeric or whose denominator is zero is stored as
//! [`RatioValue::Unavailable`] with a reason, and the other ratios are still
//! computed.

use crate::config::{ColumnMapping, TableSelection};
use crate::output::{ExtractedTable, RatioWarning, TableRatios};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

pub const DEBT_TO_EQUITY: &str = "Debt-to-Equity";
pub const PROFIT_MARGIN: &str = "Profit Margin (%)";
pub const RETURN_ON_ASSETS: &str = "Return on Assets (%)";

/// Ratio names in computation order.
pub const RATIO_NAMES: [&str; 3] = [DEBT_TO_EQUITY, PROFIT_MARGIN, RETURN_ON_ASSETS];

/// The four summed line items the ratios are built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialField {
    TotalAssets,
    TotalLiabilities,
    Revenue,
    Profit,
}

impl FinancialField {
    pub const ALL: [FinancialField; 4] = [
        FinancialField::TotalAssets,
        FinancialField::TotalLiabilities,
        FinancialField::Revenue,
        FinancialField::Profit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FinancialField::TotalAssets => "total_assets",
            FinancialField::TotalLiabilities => "total_liabilities",
            FinancialField::Revenue => "revenue",
            FinancialField::Profit => "profit",
        }
    }
}

impl fmt::Display for FinancialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Values ───────────────────────────────────────────────────────────────

/// Why a ratio could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnavailableReason {
    DivisionByZero,
    /// The column exists but no cell parsed as a number.
    NonNumeric { field: FinancialField },
    /// No table carried the column (merged selection only).
    MissingField { field: FinancialField },
    /// The quotient overflowed.
    NonFinite,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::DivisionByZero => f.write_str("division by zero"),
            UnavailableReason::NonNumeric { field } => write!(f, "no numeric values for {field}"),
            UnavailableReason::MissingField { field } => write!(f, "no {field} column"),
            UnavailableReason::NonFinite => f.write_str("result is not finite"),
        }
    }
}

/// A computed ratio, or the reason it is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioValue {
    Available(f64),
    Unavailable(UnavailableReason),
}

impl RatioValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            RatioValue::Available(v) => Some(*v),
            RatioValue::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, RatioValue::Available(_))
    }
}

impl fmt::Display for RatioValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatioValue::Available(v) => write!(f, "{v:.2}"),
            RatioValue::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

/// One named ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    pub name: String,
    pub value: RatioValue,
}

/// Ordered ratio name → value mapping. Insertion order is computation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatioSet {
    entries: Vec<Ratio>,
}

impl RatioSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`. A replaced entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: RatioValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|r| r.name == name) {
            Some(existing) => existing.value = value,
            None => self.entries.push(Ratio { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RatioValue> {
        self.entries.iter().find(|r| r.name == name).map(|r| &r.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ratio> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn available_count(&self) -> usize {
        self.entries.iter().filter(|r| r.value.is_available()).count()
    }
}

// ── Coercion ─────────────────────────────────────────────────────────────

static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)$").unwrap());

/// Best-effort numeric coercion of a table cell, as an exact amount.
///
/// Accepts thousands separators, currency symbols, a trailing `%`, unicode
/// minus and accounting negatives (`(1,234)`). Placeholders such as `-`,
/// `—`, `n/a` and empty cells yield `None`, as do amounts too large for a
/// [`Decimal`].
pub fn parse_amount(cell: &str) -> Option<Decimal> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if matches!(lower.as_str(), "-" | "—" | "–" | "n/a" | "na" | "nil" | "none") {
        return None;
    }

    let (body, negated) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (inner, true),
        None => (trimmed, false),
    };

    let cleaned: String = body
        .trim_end_matches('%')
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}' | '$' | '€' | '£' | '¥' | '₹'))
        .map(|c| if c == '−' { '-' } else { c })
        .collect();

    if !NUMERIC.is_match(&cleaned) {
        return None;
    }
    let (minus, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };
    let digits = digits.trim_end_matches('.');
    let value = if digits.starts_with('.') {
        Decimal::from_str(&format!("0{digits}")).ok()?
    } else {
        Decimal::from_str(digits).ok()?
    };
    Some(if minus != negated { -value } else { value })
}

/// [`parse_amount`] as a finite `f64`.
pub fn parse_cell(cell: &str) -> Option<f64> {
    parse_amount(cell)
        .and_then(|v| v.to_f64())
        .filter(|v| v.is_finite())
}

/// Total of one column over the data rows, with cell accounting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSum {
    pub total: Decimal,
    pub parsed: usize,
    pub skipped: usize,
}

/// Sum column `col` over `rows`, leaving out cells that do not parse.
/// Rows shorter than `col + 1` count as skipped.
pub fn sum_column(rows: &[Vec<String>], col: usize) -> ColumnSum {
    let mut sum = ColumnSum {
        total: Decimal::ZERO,
        parsed: 0,
        skipped: 0,
    };
    for row in rows {
        match row
            .get(col)
            .and_then(|c| parse_amount(c))
            .and_then(|v| sum.total.checked_add(v))
        {
            Some(total) => {
                sum.total = total;
                sum.parsed += 1;
            }
            None => sum.skipped += 1,
        }
    }
    sum
}

/// The summed value of a field, or why there is none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldTotal {
    Sum(Decimal),
    NonNumeric,
    Missing,
    /// Merged totals exceeded the [`Decimal`] range.
    Overflow,
}

impl FieldTotal {
    fn from_sum(sum: ColumnSum) -> Self {
        if sum.parsed == 0 {
            FieldTotal::NonNumeric
        } else {
            FieldTotal::Sum(sum.total)
        }
    }

    /// Fold another table's total for the same field into this one.
    fn merge(self, other: FieldTotal) -> FieldTotal {
        match (self, other) {
            (FieldTotal::Overflow, _) | (_, FieldTotal::Overflow) => FieldTotal::Overflow,
            (FieldTotal::Sum(a), FieldTotal::Sum(b)) => {
                a.checked_add(b).map_or(FieldTotal::Overflow, FieldTotal::Sum)
            }
            (FieldTotal::Sum(a), _) | (_, FieldTotal::Sum(a)) => FieldTotal::Sum(a),
            (FieldTotal::NonNumeric, _) | (_, FieldTotal::NonNumeric) => FieldTotal::NonNumeric,
            (FieldTotal::Missing, FieldTotal::Missing) => FieldTotal::Missing,
        }
    }

    fn resolve(self, field: FinancialField) -> Result<Decimal, UnavailableReason> {
        match self {
            FieldTotal::Sum(v) => Ok(v),
            FieldTotal::Overflow => Err(UnavailableReason::NonFinite),
            FieldTotal::NonNumeric => Err(UnavailableReason::NonNumeric { field }),
            FieldTotal::Missing => Err(UnavailableReason::MissingField { field }),
        }
    }
}

/// Summed inputs for one ratio set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldTotals {
    pub total_assets: FieldTotal,
    pub total_liabilities: FieldTotal,
    pub revenue: FieldTotal,
    pub profit: FieldTotal,
}

impl FieldTotals {
    pub fn missing() -> Self {
        Self {
            total_assets: FieldTotal::Missing,
            total_liabilities: FieldTotal::Missing,
            revenue: FieldTotal::Missing,
            profit: FieldTotal::Missing,
        }
    }

    pub fn get(&self, field: FinancialField) -> FieldTotal {
        match field {
            FinancialField::TotalAssets => self.total_assets,
            FinancialField::TotalLiabilities => self.total_liabilities,
            FinancialField::Revenue => self.revenue,
            FinancialField::Profit => self.profit,
        }
    }

    fn slot(&mut self, field: FinancialField) -> &mut FieldTotal {
        match field {
            FinancialField::TotalAssets => &mut self.total_assets,
            FinancialField::TotalLiabilities => &mut self.total_liabilities,
            FinancialField::Revenue => &mut self.revenue,
            FinancialField::Profit => &mut self.profit,
        }
    }

    /// Convenience constructor for known sums.
    pub fn from_values(
        total_assets: impl Into<Decimal>,
        total_liabilities: impl Into<Decimal>,
        revenue: impl Into<Decimal>,
        profit: impl Into<Decimal>,
    ) -> Self {
        Self {
            total_assets: FieldTotal::Sum(total_assets.into()),
            total_liabilities: FieldTotal::Sum(total_liabilities.into()),
            revenue: FieldTotal::Sum(revenue.into()),
            profit: FieldTotal::Sum(profit.into()),
        }
    }
}

// ── Ratios ───────────────────────────────────────────────────────────────

/// Round half away from zero to two decimals.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Zero is checked on the exact denominator; only the division is in `f64`.
fn quotient(numerator: Decimal, denominator: Decimal, scale: f64) -> RatioValue {
    if denominator.is_zero() {
        return RatioValue::Unavailable(UnavailableReason::DivisionByZero);
    }
    let (Some(n), Some(d)) = (numerator.to_f64(), denominator.to_f64()) else {
        return RatioValue::Unavailable(UnavailableReason::NonFinite);
    };
    let v = scale * n / d;
    if !v.is_finite() {
        return RatioValue::Unavailable(UnavailableReason::NonFinite);
    }
    RatioValue::Available(round2(v))
}

/// Compute the three ratios from summed inputs, in fixed order.
pub fn compute_ratios(totals: &FieldTotals) -> RatioSet {
    use FinancialField::*;

    let assets = totals.total_assets.resolve(TotalAssets);
    let liabilities = totals.total_liabilities.resolve(TotalLiabilities);
    let revenue = totals.revenue.resolve(Revenue);
    let profit = totals.profit.resolve(Profit);

    let debt_to_equity = match (assets.clone(), liabilities.clone()) {
        (Ok(a), Ok(l)) => match a.checked_sub(l) {
            Some(equity) => quotient(l, equity, 1.0),
            None => RatioValue::Unavailable(UnavailableReason::NonFinite),
        },
        (Err(r), _) | (_, Err(r)) => RatioValue::Unavailable(r),
    };
    let profit_margin = match (profit.clone(), revenue) {
        (Ok(p), Ok(r)) => quotient(p, r, 100.0),
        (Err(r), _) | (_, Err(r)) => RatioValue::Unavailable(r),
    };
    let return_on_assets = match (profit, assets) {
        (Ok(p), Ok(a)) => quotient(p, a, 100.0),
        (Err(r), _) | (_, Err(r)) => RatioValue::Unavailable(r),
    };

    let mut set = RatioSet::new();
    set.insert(DEBT_TO_EQUITY, debt_to_equity);
    set.insert(PROFIT_MARGIN, profit_margin);
    set.insert(RETURN_ON_ASSETS, return_on_assets);
    set
}

/// Sum the mapped columns of one table.
fn table_totals(table: &ExtractedTable, columns: &crate::config::FieldColumns) -> FieldTotals {
    let rows = table.data_rows();
    let mut totals = FieldTotals::missing();
    for field in FinancialField::ALL {
        let sum = sum_column(rows, columns.get(field));
        if sum.skipped > 0 {
            debug!(
                "{}: {} of {} cells not numeric, left out of the sum",
                field,
                sum.skipped,
                rows.len()
            );
        }
        *totals.slot(field) = FieldTotal::from_sum(sum);
    }
    totals
}

/// Compute one ratio set from one table.
///
/// Fails only when the header cannot be mapped; per-ratio problems are
/// recorded as [`RatioValue::Unavailable`].
pub fn calculate(
    table: &ExtractedTable,
    mapping: &ColumnMapping,
) -> Result<RatioSet, crate::error::MappingError> {
    let columns = mapping.resolve(table.header())?;
    Ok(compute_ratios(&table_totals(table, &columns)))
}

/// Ratio sets for a document plus warnings for everything that degraded.
#[derive(Debug, Clone, Default)]
pub struct RatioReport {
    pub sets: Vec<TableRatios>,
    pub warnings: Vec<RatioWarning>,
}

/// Run the ratio calculator over every extracted table.
pub fn calculate_all(
    tables: &[ExtractedTable],
    mapping: &ColumnMapping,
    selection: TableSelection,
) -> RatioReport {
    let mut report = match selection {
        TableSelection::PerTable => per_table(tables, mapping),
        TableSelection::Merged => merged(tables, mapping),
    };

    for set in &report.sets {
        for ratio in set.ratios.iter() {
            if let RatioValue::Unavailable(reason) = &ratio.value {
                report.warnings.push(RatioWarning {
                    table_index: set.table_index,
                    message: format!("{} unavailable: {}", ratio.name, reason),
                });
            }
        }
    }
    for w in &report.warnings {
        warn!("{}", w);
    }
    report
}

fn per_table(tables: &[ExtractedTable], mapping: &ColumnMapping) -> RatioReport {
    let mut report = RatioReport::default();
    let mut skipped = 0usize;
    for (i, table) in tables.iter().enumerate() {
        match mapping.resolve(table.header()) {
            Ok(columns) => {
                let ratios = compute_ratios(&table_totals(table, &columns));
                report.sets.push(TableRatios {
                    table_index: Some(i),
                    page: table.page,
                    source_tables: vec![i],
                    ratios,
                });
            }
            Err(e) => {
                debug!("Table {} not used for ratios: {}", i + 1, e);
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        report.warnings.push(RatioWarning {
            table_index: None,
            message: format!(
                "skipped: {skipped} of {} tables do not carry the ratio input columns",
                tables.len()
            ),
        });
    }
    report
}

fn merged(tables: &[ExtractedTable], mapping: &ColumnMapping) -> RatioReport {
    let mut report = RatioReport::default();
    if tables.is_empty() {
        return report;
    }

    let mut totals = FieldTotals::missing();
    let mut sources: Vec<usize> = Vec::new();
    for (i, table) in tables.iter().enumerate() {
        for field in FinancialField::ALL {
            if let Some(col) = mapping.resolve_field(field, table.header()) {
                let found = FieldTotal::from_sum(sum_column(table.data_rows(), col));
                let slot = totals.slot(field);
                *slot = slot.merge(found);
                if !sources.contains(&i) {
                    sources.push(i);
                }
            }
        }
    }

    if sources.is_empty() {
        report.warnings.push(RatioWarning {
            table_index: None,
            message: "no table carries any ratio input column".to_string(),
        });
        return report;
    }

    report.sets.push(TableRatios {
        table_index: None,
        page: None,
        source_tables: sources,
        ratios: compute_ratios(&totals),
    });
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> ExtractedTable {
        ExtractedTable::new(
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn value(set: &RatioSet, name: &str) -> Option<f64> {
        set.get(name).and_then(RatioValue::value)
    }

    #[test]
    fn reference_values() {
        let set = compute_ratios(&FieldTotals::from_values(1000, 400, 2000, 300));
        assert_eq!(value(&set, DEBT_TO_EQUITY), Some(0.67));
        assert_eq!(value(&set, PROFIT_MARGIN), Some(15.0));
        assert_eq!(value(&set, RETURN_ON_ASSETS), Some(30.0));
    }

    #[test]
    fn ratios_keep_fixed_order() {
        let set = compute_ratios(&FieldTotals::from_values(1000, 400, 2000, 300));
        let names: Vec<&str> = set.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, RATIO_NAMES);
    }

    #[test]
    fn zero_equity_is_unavailable_not_infinite() {
        let set = compute_ratios(&FieldTotals::from_values(500, 500, 2000, 300));
        assert_eq!(
            set.get(DEBT_TO_EQUITY),
            Some(&RatioValue::Unavailable(UnavailableReason::DivisionByZero))
        );
        // Independent ratios still computed.
        assert_eq!(value(&set, PROFIT_MARGIN), Some(15.0));
        assert_eq!(value(&set, RETURN_ON_ASSETS), Some(60.0));
    }

    #[test]
    fn zero_revenue_only_affects_margin() {
        let set = compute_ratios(&FieldTotals::from_values(1000, 400, 0, 300));
        assert_eq!(
            set.get(PROFIT_MARGIN),
            Some(&RatioValue::Unavailable(UnavailableReason::DivisionByZero))
        );
        assert_eq!(value(&set, DEBT_TO_EQUITY), Some(0.67));
        assert_eq!(value(&set, RETURN_ON_ASSETS), Some(30.0));
    }

    #[test]
    fn non_numeric_column_names_the_field() {
        let mut totals = FieldTotals::from_values(1000, 400, 2000, 300);
        totals.profit = FieldTotal::NonNumeric;
        let set = compute_ratios(&totals);
        let expected = RatioValue::Unavailable(UnavailableReason::NonNumeric {
            field: FinancialField::Profit,
        });
        assert_eq!(set.get(PROFIT_MARGIN), Some(&expected));
        assert_eq!(set.get(RETURN_ON_ASSETS), Some(&expected));
        assert_eq!(value(&set, DEBT_TO_EQUITY), Some(0.67));
    }

    #[test]
    fn parse_cell_best_effort() {
        assert_eq!(parse_cell("1,234.5"), Some(1234.5));
        assert_eq!(parse_cell(" $ 1 000 "), Some(1000.0));
        assert_eq!(parse_cell("(250)"), Some(-250.0));
        assert_eq!(parse_cell("−12"), Some(-12.0));
        assert_eq!(parse_cell("₹4,50,000"), Some(450000.0));
        assert_eq!(parse_cell("12.5%"), Some(12.5));
        assert_eq!(parse_cell(".5"), Some(0.5));
        assert_eq!(parse_cell("—"), None);
        assert_eq!(parse_cell("n/a"), None);
        assert_eq!(parse_cell(""), None);
        assert_eq!(parse_cell("abc"), None);
        assert_eq!(parse_cell("inf"), None);
        assert_eq!(parse_cell("NaN"), None);
        assert_eq!(parse_cell("1e5"), None);
    }

    #[test]
    fn oversized_digit_strings_are_not_numbers() {
        let huge = "9".repeat(400);
        assert_eq!(parse_cell(&huge), None);
        assert_eq!(parse_amount(&huge), None);

        let t = table(&[
            &["Segment", "Total Assets", "Total Liabilities", "Revenue", "Profit"],
            &["A", "1000", "400", huge.as_str(), "300"],
            &["B", "", "", "2000", ""],
        ]);
        let set = calculate(&t, &ColumnMapping::default()).unwrap();
        assert_eq!(value(&set, PROFIT_MARGIN), Some(15.0));
    }

    #[test]
    fn parse_amount_is_exact() {
        assert_eq!(parse_amount("50.10"), Some(Decimal::new(5010, 2)));
        assert_eq!(parse_amount("(0.5)"), Some(Decimal::new(-5, 1)));
        assert_eq!(parse_amount("5."), Some(Decimal::new(5, 0)));
    }

    #[test]
    fn equal_decimal_totals_leave_no_equity() {
        let t = table(&[
            &["Segment", "Total Assets", "Total Liabilities", "Revenue", "Profit"],
            &["A", "100.30", "50.10", "200", "30"],
            &["B", "", "50.20", "", ""],
        ]);
        let set = calculate(&t, &ColumnMapping::default()).unwrap();
        assert_eq!(
            set.get(DEBT_TO_EQUITY),
            Some(&RatioValue::Unavailable(UnavailableReason::DivisionByZero))
        );
        assert_eq!(value(&set, PROFIT_MARGIN), Some(15.0));
        assert_eq!(value(&set, RETURN_ON_ASSETS), Some(29.91));
    }

    #[test]
    fn non_numeric_cells_are_left_out_of_sum() {
        let t = table(&[
            &["Segment", "Total Assets", "Total Liabilities", "Revenue", "Profit"],
            &["Retail", "600", "250", "1200", "200"],
            &["Note 4", "see notes", "-", "n/a", "—"],
            &["Wholesale", "400", "150", "800", "100"],
        ]);
        let set = calculate(&t, &ColumnMapping::default()).unwrap();
        assert_eq!(value(&set, DEBT_TO_EQUITY), Some(0.67));
        assert_eq!(value(&set, PROFIT_MARGIN), Some(15.0));
        assert_eq!(value(&set, RETURN_ON_ASSETS), Some(30.0));
    }

    #[test]
    fn margin_column_is_not_read_as_profit() {
        let t = table(&[
            &[
                "Segment",
                "Total Assets",
                "Total Liabilities",
                "Revenue",
                "Profit Margin (%)",
                "Profit Before Tax",
            ],
            &["Retail", "1000", "400", "2000", "0.75", "300"],
        ]);
        let set = calculate(&t, &ColumnMapping::default()).unwrap();
        assert_eq!(value(&set, PROFIT_MARGIN), Some(15.0));
        assert_eq!(value(&set, RETURN_ON_ASSETS), Some(30.0));
    }

    #[test]
    fn legacy_positional_layout() {
        let t = table(&[
            &["", "A", "B", "C", "D"],
            &["FY24", "1000", "400", "2000", "300"],
        ]);
        let set = calculate(&t, &ColumnMapping::legacy_positional()).unwrap();
        assert_eq!(value(&set, DEBT_TO_EQUITY), Some(0.67));
    }

    #[test]
    fn per_table_summarises_unmappable_tables_in_one_warning() {
        let good = table(&[
            &["Item", "Total Assets", "Total Liabilities", "Revenue", "Net Profit"],
            &["FY24", "1000", "400", "2000", "300"],
        ]);
        let bad = table(&[&["Director", "Age"], &["A. Person", "54"]]);
        let report = calculate_all(
            &[bad.clone(), good, bad.clone(), bad],
            &ColumnMapping::default(),
            TableSelection::PerTable,
        );
        assert_eq!(report.sets.len(), 1);
        assert_eq!(report.sets[0].table_index, Some(1));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].table_index, None);
        assert!(report.warnings[0].message.starts_with("skipped: 3 of 4 tables"));
    }

    #[test]
    fn merged_combines_balance_sheet_and_income_statement() {
        let balance = table(&[
            &["Item", "Total Assets", "Total Liabilities"],
            &["FY24", "1000", "400"],
        ]);
        let income = table(&[&["Item", "Revenue", "Net Profit"], &["FY24", "2000", "300"]]);
        let report = calculate_all(
            &[balance, income],
            &ColumnMapping::default(),
            TableSelection::Merged,
        );
        assert_eq!(report.sets.len(), 1);
        let set = &report.sets[0];
        assert_eq!(set.table_index, None);
        assert_eq!(set.source_tables, vec![0, 1]);
        assert_eq!(value(&set.ratios, DEBT_TO_EQUITY), Some(0.67));
        assert_eq!(value(&set.ratios, PROFIT_MARGIN), Some(15.0));
        assert_eq!(value(&set.ratios, RETURN_ON_ASSETS), Some(30.0));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn merged_reports_missing_field() {
        let balance = table(&[
            &["Item", "Total Assets", "Total Liabilities"],
            &["FY24", "1000", "400"],
        ]);
        let report = calculate_all(&[balance], &ColumnMapping::default(), TableSelection::Merged);
        let set = &report.sets[0].ratios;
        assert_eq!(value(set, DEBT_TO_EQUITY), Some(0.67));
        assert_eq!(
            set.get(PROFIT_MARGIN),
            Some(&RatioValue::Unavailable(UnavailableReason::MissingField {
                field: FinancialField::Profit
            }))
        );
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn no_tables_no_sets() {
        for sel in [TableSelection::PerTable, TableSelection::Merged] {
            let report = calculate_all(&[], &ColumnMapping::default(), sel);
            assert!(report.sets.is_empty());
            assert!(report.warnings.is_empty());
        }
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut set = RatioSet::new();
        set.insert("a", RatioValue::Available(1.0));
        set.insert("b", RatioValue::Available(2.0));
        set.insert("a", RatioValue::Available(3.0));
        let names: Vec<&str> = set.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(set.get("a").and_then(RatioValue::value), Some(3.0));
    }

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(RatioValue::Available(15.0).to_string(), "15.00");
        assert_eq!(
            RatioValue::Unavailable(UnavailableReason::DivisionByZero).to_string(),
            "unavailable (division by zero)"
        );
    }
}
