//! Model-name → provider routing.
//!
//! Routing is an ordered rule list. Rules are matched as case-insensitive
//! substrings; the first match wins and unmatched names fall through to the
//! default kind.

use super::ProviderKind;
use serde::{Deserialize, Serialize};

/// One routing rule: models whose name contains `pattern` go to `provider`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub pattern: String,
    pub provider: ProviderKind,
}

impl RoutingRule {
    pub fn new(pattern: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            pattern: pattern.into().to_ascii_lowercase(),
            provider,
        }
    }

    fn matches(&self, model_lower: &str) -> bool {
        !self.pattern.is_empty() && model_lower.contains(&self.pattern)
    }
}

/// Ordered routing rules plus a fallback kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingTable {
    rules: Vec<RoutingRule>,
    default: ProviderKind,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new(ProviderKind::Gemini)
            .with_rule("deepseek", ProviderKind::DeepSeek)
            .with_rule("llama", ProviderKind::Groq)
            .with_rule("mixtral", ProviderKind::Groq)
            .with_rule("gemma", ProviderKind::Groq)
            .with_rule("gpt-", ProviderKind::OpenAi)
            .with_rule("gemini", ProviderKind::Gemini)
    }
}

impl RoutingTable {
    /// An empty table that sends everything to `default`.
    pub fn new(default: ProviderKind) -> Self {
        Self {
            rules: Vec::new(),
            default,
        }
    }

    /// Append a rule (lowest precedence so far).
    pub fn with_rule(mut self, pattern: impl Into<String>, provider: ProviderKind) -> Self {
        self.rules.push(RoutingRule::new(pattern, provider));
        self
    }

    /// Insert a rule ahead of every existing one.
    pub fn prepend(&mut self, rule: RoutingRule) {
        self.rules.insert(0, rule);
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn default_kind(&self) -> ProviderKind {
        self.default
    }

    /// Pick the provider kind for `model`. Pure function of the name.
    pub fn route(&self, model: &str) -> ProviderKind {
        let lower = model.to_ascii_lowercase();
        self.rules
            .iter()
            .find(|r| r.matches(&lower))
            .map(|r| r.provider)
            .unwrap_or(self.default)
    }
}
