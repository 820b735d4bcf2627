//! YAML frontmatter prepended to converted documents.

use chrono::{DateTime, Local};
use std::path::Path;

/// Prepend a frontmatter block describing `source` and `tool`.
///
/// Content that already opens with `---` is returned unchanged so a
/// document never carries two headers.
pub fn add_frontmatter(content: &str, source: &Path, tool: &str) -> String {
    add_frontmatter_at(content, source, tool, Local::now())
}

pub(crate) fn add_frontmatter_at(
    content: &str,
    source: &Path,
    tool: &str,
    now: DateTime<Local>,
) -> String {
    if content.starts_with("---") {
        return content.to_string();
    }
    let title = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = source
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    format!(
        "---\n\
         title: {}\n\
         type: \"Document\"\n\
         date: \"{}\"\n\
         status: \"converted\"\n\
         source_file: {}\n\
         conversion_tool: {}\n\
         conversion_date: \"{}\"\n\
         ---\n\n{}",
        quote(&title),
        now.format("%Y-%m-%d"),
        quote(&file_name),
        quote(tool),
        now.to_rfc3339(),
        content
    )
}

/// A JSON string literal is also a valid YAML double-quoted scalar, with
/// control characters escaped.
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
