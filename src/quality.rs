//! Structural quality heuristic for produced Markdown.
//!
//! The score only looks at the generated text, never at the source
//! document, and is advisory: it is stored on the result but never changes
//! a conversion's status.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which family of backend produced the text; selects the base score and
/// the bonus table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityProfile {
    /// Deterministic local tool (pandoc).
    LocalTool,
    /// Text generated by a language model.
    LlmText,
    /// Hosted document parser tuned for scanned PDFs.
    ScannedParser,
}

/// A GFM table separator row, e.g. `|---|:---:|`.
static RE_TABLE_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*\|?\s*:?-{3,}:?\s*(\|\s*:?-{3,}:?\s*)+\|?\s*$").unwrap()
});

fn has_table(content: &str) -> bool {
    RE_TABLE_SEPARATOR.is_match(content)
}

fn non_ascii_ratio(content: &str) -> f64 {
    let total = content.chars().count();
    if total == 0 {
        return 0.0;
    }
    let non_ascii = content.chars().filter(|c| !c.is_ascii()).count();
    non_ascii as f64 / total as f64
}

/// Score `content` under `profile`. Always in `0..=100`.
pub fn score(content: &str, profile: QualityProfile) -> u8 {
    let len = content.chars().count();
    let h2 = content.contains("##");
    let h3 = content.contains("###");
    let table = has_table(content);

    let total: u32 = match profile {
        QualityProfile::LocalTool => {
            60 + bonus(len > 500, 10) + bonus(len > 2000, 10) + bonus(h2, 10) + bonus(table, 10)
        }
        QualityProfile::LlmText => {
            50 + bonus(len > 1000, 10)
                + bonus(len > 5000, 10)
                + bonus(h2, 10)
                + bonus(h3, 5)
                + bonus(table, 10)
                + bonus(non_ascii_ratio(content) > 0.1, 5)
        }
        QualityProfile::ScannedParser => {
            // Characters outside the BMP are usually OCR noise.
            let clean = content.chars().all(|c| (c as u32) <= 0xFFFF);
            70 + bonus(len > 1000, 5)
                + bonus(len > 5000, 5)
                + bonus(h2, 5)
                + bonus(h3, 5)
                + bonus(table, 5)
                + bonus(clean, 5)
        }
    };
    total.min(100) as u8
}

fn bonus(cond: bool, points: u32) -> u32 {
    if cond {
        points
    } else {
        0
    }
}
