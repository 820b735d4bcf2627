//! Deterministic clean-up of model-generated Markdown.
//!
//! Models sometimes wrap their answer in a ```` ```markdown ```` fence,
//! emit CRLF line endings, pad lines with trailing spaces or scatter
//! zero-width characters through the text. None of that is content, so it
//! is removed before the output is length-checked and written.
//!
//! Passes run in a fixed order:
//!
//! 1. strip one outer code fence
//! 2. normalise line endings to `\n`
//! 3. drop invisible format characters (ZWSP, BOM, soft hyphen, joiners)
//! 4. trim trailing whitespace and collapse runs of blank lines to one
//! 5. end with exactly one newline

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean raw model output. Idempotent.
pub fn clean_markdown(raw: &str) -> String {
    let text = strip_outer_fence(raw);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = text.replace(INVISIBLE, "");
    let text = tidy_lines(&text);
    finish(&text)
}

// ── Outer fence ─────────────────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```[ \t]*\z").unwrap());

fn strip_outer_fence(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => input,
    }
}

// ── Invisible characters ────────────────────────────────────────────────────

const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}',
];

// ── Line tidying ────────────────────────────────────────────────────────────

fn tidy_lines(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut blank_run = 0usize;
    for line in input.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn finish(input: &str) -> String {
    let body = input.trim_matches('\n');
    if body.is_empty() {
        String::new()
    } else {
        format!("{body}\n")
    }
}
