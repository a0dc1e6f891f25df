//! Post-processing: deterministic cleanup of model-generated insight text.
//!
//! Even with "plain text, one point per line" in the system prompt, models
//! wrap answers in fences, number their points, bold the lead phrase or add
//! a heading. The report lays insights out as bullets, so this module turns
//! whatever came back into clean lines without touching their content.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so the fence regex
//! sees the raw response; invisible characters go before blank-line
//! collapsing so a line holding only a zero-width space counts as blank.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to a raw model response.
///
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Remove invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim trailing whitespace per line
/// 5. Collapse runs of blank lines to one
/// 6. Trim leading/trailing blank lines
pub fn clean_insight_text(input: &str) -> String {
    let s = strip_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Line endings ─────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Invisible characters ─────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 4: Trailing whitespace ──────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Blank lines ──────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Bullets ──────────────────────────────────────────────────────────────

/// `-`, `*`, `•`, `1.`, `1)` or `(1)` at the start of a line.
static RE_LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*•–](?:\s+|$)|\(?\d{1,2}[.)]\s+)").unwrap());

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+").unwrap());

/// Split cleaned text into one entry per non-empty line, with list
/// markers, heading hashes and bold markers removed.
pub fn split_bullets(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            let l = RE_HEADING.replace(l, "");
            let l = RE_LIST_MARKER.replace(&l, "");
            l.replace("**", "").replace("__", "").trim().to_string()
        })
        .filter(|l| !l.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences() {
        let raw = "```text\nRevenue rose.\nMargins held.\n```";
        assert_eq!(clean_insight_text(raw), "Revenue rose.\nMargins held.");
        let plain = "```\nOne line\n```\n";
        assert_eq!(clean_insight_text(plain), "One line");
    }

    #[test]
    fn inner_fences_untouched() {
        let raw = "Intro\n```\ncode\n```\nOutro";
        assert_eq!(clean_insight_text(raw), raw);
    }

    #[test]
    fn normalises_whitespace() {
        let raw = "\r\n\r\nFirst  \r\n\r\n\r\n\r\nSecond\u{200B}\t\r\n\r\n";
        assert_eq!(clean_insight_text(raw), "First\n\nSecond");
    }

    #[test]
    fn bullets_lose_markers() {
        let text = "## Key points\n1. **Revenue** grew 12%\n2) Debt fell\n- Cash up\n* Capex flat\n• Dividend raised\n\n(3) Outlook stable";
        assert_eq!(
            split_bullets(text),
            vec![
                "Key points",
                "Revenue grew 12%",
                "Debt fell",
                "Cash up",
                "Capex flat",
                "Dividend raised",
                "Outlook stable",
            ]
        );
    }

    #[test]
    fn numbers_inside_lines_survive() {
        assert_eq!(
            split_bullets("2024 revenue was 1,200 crore\n-5% margin change"),
            vec!["2024 revenue was 1,200 crore", "-5% margin change"]
        );
    }

    #[test]
    fn empty_input_gives_no_bullets() {
        assert!(split_bullets("").is_empty());
        assert!(split_bullets("\n  \n-  \n").is_empty());
        assert_eq!(clean_insight_text("  \n\n "), "");
    }
}
