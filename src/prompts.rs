//! Conversion prompts sent to generation providers.
//!
//! Callers can override the default via
//! [`crate::config::ConverterConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default instruction sent with every document.
pub const DEFAULT_CONVERSION_PROMPT: &str = r#"Convert this document to clean, well-structured Markdown.

RULES:
1. Preserve all content accurately. Do NOT summarize or omit anything.
2. Use a proper heading hierarchy (# for the main title, ## for sections, ### for subsections).
3. Format tables using GFM pipe table syntax.
4. Keep the original numbering and bullet points.
5. Keep diacritics and special characters exactly as written.
6. Output ONLY Markdown: no explanations, no code fences around the answer.

START CONVERSION NOW:"#;

/// Instruction passed to the hosted parser alongside the upload.
pub const PARSER_INSTRUCTION: &str =
    "Extract all content as markdown. Preserve tables and structure.";

/// The prompt to use for `config`.
pub fn conversion_prompt(config: &crate::config::ConverterConfig) -> &str {
    config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_CONVERSION_PROMPT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConverterConfig;

    #[test]
    fn default_prompt_forbids_wrapping() {
        assert!(DEFAULT_CONVERSION_PROMPT.contains("no code fences"));
        let config = ConverterConfig::default();
        assert_eq!(conversion_prompt(&config), DEFAULT_CONVERSION_PROMPT);
    }

    #[test]
    fn override_wins() {
        let config = ConverterConfig::builder()
            .system_prompt("Only tables, please.")
            .build()
            .unwrap();
        assert_eq!(conversion_prompt(&config), "Only tables, please.");
    }
}
