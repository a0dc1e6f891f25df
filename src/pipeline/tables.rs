//! Table recovery from page text layout.
//!
//! pdfium returns text, not tables. Annual-report tables survive text
//! extraction as lines whose columns are separated by wide gaps, so a table
//! is a run of consecutive lines that split into the same number of cells
//! and carry numbers. The line right above the run becomes the header when
//! it looks like one; otherwise a generic header is synthesised so the
//! positional column mapping still works.

use crate::output::ExtractedTable;
use crate::ratios::parse_cell;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Two or more spaces, or any tab, separate cells.
static CELL_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+|\s{2,}").unwrap());

/// Split one text line into trimmed, non-empty cells.
pub fn split_cells(line: &str) -> Vec<String> {
    CELL_GAP
        .split(line.trim())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// A data row has at least two cells and a number after the first cell.
fn is_data_row(cells: &[String]) -> bool {
    cells.len() >= 2 && cells[1..].iter().any(|c| parse_cell(c).is_some())
}

/// A header has no numeric cell except possibly a year.
fn is_header_row(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells
            .iter()
            .all(|c| parse_cell(c).is_none() || looks_like_year(c))
}

fn looks_like_year(cell: &str) -> bool {
    let c = cell.trim().trim_start_matches("FY").trim_start_matches("fy");
    c.len() == 4 && c.chars().all(|ch| ch.is_ascii_digit())
}

/// Header line above a run, padded with an empty label cell when the
/// label column has no heading.
fn header_for(prev: Option<&Vec<String>>, width: usize) -> Vec<String> {
    if let Some(cells) = prev {
        if is_header_row(cells) {
            if cells.len() == width {
                return cells.clone();
            }
            if cells.len() + 1 == width {
                let mut padded = Vec::with_capacity(width);
                padded.push(String::new());
                padded.extend(cells.iter().cloned());
                return padded;
            }
        }
    }
    (1..=width).map(|i| format!("column_{i}")).collect()
}

/// Find every table in one page's text.
pub fn detect_tables(page_text: &str, page: usize) -> Vec<ExtractedTable> {
    let lines: Vec<Vec<String>> = page_text.lines().map(split_cells).collect();
    let mut tables = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !is_data_row(&lines[i]) {
            i += 1;
            continue;
        }
        let width = lines[i].len();
        let start = i;
        while i < lines.len() && lines[i].len() == width && is_data_row(&lines[i]) {
            i += 1;
        }

        let prev = start.checked_sub(1).map(|p| &lines[p]);
        let mut rows = vec![header_for(prev, width)];
        rows.extend(lines[start..i].iter().cloned());
        debug!(
            "Page {}: table with {} columns, {} data rows",
            page,
            width,
            rows.len() - 1
        );
        tables.push(ExtractedTable::new(rows).on_page(page));
    }

    tables
}
