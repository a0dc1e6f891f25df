//! Prompts for the insight model.
//!
//! Every prompt lives here so prompt changes never touch the retry or
//! orchestration code, and so tests can inspect them without a model.
//! [`crate::config::AnalysisConfig::system_prompt`] overrides
//! [`DEFAULT_SYSTEM_PROMPT`]; the user prompts are always built here.

use crate::output::TableRatios;

/// Characters of report text sent with each prompt unless configured otherwise.
pub const DEFAULT_TRUNCATION_LIMIT: usize = 4000;

/// Default system prompt for all insight calls.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a senior financial analyst reviewing a company's annual report.

Rules:
- Base every statement on the supplied report text or figures only.
- Quote concrete numbers (with units and periods) whenever the text gives them.
- Write one point per line. Do not number the lines and do not add headings.
- Do not add introductions, conclusions or disclaimers.
- If the text does not support a point, omit it rather than guess."#;

/// First `limit` characters of `text`, never splitting a UTF-8 sequence.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Prompt asking for `count` key insights from the report text.
pub fn insights_prompt(report_text: &str, count: usize, limit: usize) -> String {
    format!(
        "Provide {count} key insights from the following annual report. \
         Focus on performance, growth, profitability and risks.\n\n\
         Report:\n\"\"\"\n{}\n\"\"\"",
        truncate_chars(report_text, limit)
    )
}

/// Prompt asking for `count` deep-dive analytics from the report text.
pub fn analytics_prompt(report_text: &str, count: usize, limit: usize) -> String {
    format!(
        "Provide {count} deep-dive analytics from the following annual report. \
         Cover trends, segment performance, capital structure and cash flow \
         where the text allows.\n\n\
         Report:\n\"\"\"\n{}\n\"\"\"",
        truncate_chars(report_text, limit)
    )
}

/// Prompt asking for recommendations grounded in the computed ratios.
///
/// Returns `None` when there is no available ratio to talk about.
pub fn recommendations_prompt(sets: &[TableRatios]) -> Option<String> {
    let mut lines = Vec::new();
    for set in sets {
        for ratio in set.ratios.iter() {
            if let Some(v) = ratio.value.value() {
                lines.push(format!("- {} / {}: {:.2}", set.label(), ratio.name, v));
            }
        }
    }
    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "Analyze the following financial ratios. Provide three key insights \
         and recommendations.\n\n{}",
        lines.join("\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratios::{compute_ratios, FieldTotals, RatioSet};

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("₹₹₹₹", 2), "₹₹");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn insights_prompt_truncates_report() {
        let text = "x".repeat(DEFAULT_TRUNCATION_LIMIT + 500);
        let prompt = insights_prompt(&text, 5, DEFAULT_TRUNCATION_LIMIT);
        assert!(prompt.starts_with("Provide 5 key insights"));
        assert_eq!(prompt.matches('x').count(), DEFAULT_TRUNCATION_LIMIT);
    }

    #[test]
    fn analytics_prompt_names_count() {
        let prompt = analytics_prompt("Revenue rose.", 3, 100);
        assert!(prompt.contains("Provide 3 deep-dive analytics"));
        assert!(prompt.contains("Revenue rose."));
    }

    #[test]
    fn recommendations_prompt_lists_available_ratios_only() {
        let sets = vec![
            TableRatios {
                table_index: Some(0),
                page: Some(2),
                source_tables: vec![0],
                ratios: compute_ratios(&FieldTotals::from_values(1000, 1000, 2000, 300)),
            },
        ];
        let prompt = recommendations_prompt(&sets).unwrap();
        assert!(prompt.contains("Profit Margin (%): 15.00"));
        assert!(!prompt.contains("Debt-to-Equity"));
    }

    #[test]
    fn recommendations_prompt_none_without_values() {
        assert!(recommendations_prompt(&[]).is_none());
        let empty = TableRatios {
            table_index: None,
            page: None,
            source_tables: vec![],
            ratios: RatioSet::new(),
        };
        assert!(recommendations_prompt(&[empty]).is_none());
    }

    #[test]
    fn system_prompt_asks_for_one_point_per_line() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("one point per line"));
    }
}
