//! Name → converter directory with priority-based auto-selection.
//!
//! Registration happens once at start-up through explicit
//! [`ConverterRegistry::register`] calls; the registry is then shared
//! read-only behind an `Arc`. Lower priority numbers are preferred, and
//! ties go to the converter registered first.

use crate::converter::{
    normalize_extension, Converter, ConverterContext, LlamaParseConverter, LlmConverter,
    PandocConverter,
};
use crate::error::MdConvertError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Builds a converter instance from the shared context.
pub type ConverterFactory = Arc<dyn Fn(&ConverterContext) -> Arc<dyn Converter> + Send + Sync>;

/// Priority given to converters registered without an explicit one.
pub const DEFAULT_PRIORITY: i32 = 100;

#[derive(Clone)]
struct Entry {
    name: String,
    priority: i32,
    factory: ConverterFactory,
}

/// Introspection record returned by [`ConverterRegistry::list_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConverterInfo {
    pub name: String,
    pub priority: i32,
    pub supported_extensions: Vec<String>,
}

#[derive(Clone, Default)]
pub struct ConverterRegistry {
    entries: Vec<Entry>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (&e.name, e.priority)))
            .finish()
    }
}

impl ConverterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// `pandoc` (10), `llamaparse` (30), `llm` (50).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(crate::converter::pandoc::NAME, 10, |ctx| {
            Arc::new(PandocConverter::new(ctx))
        });
        registry.register(crate::converter::llamaparse::NAME, 30, |ctx| {
            Arc::new(LlamaParseConverter::new(ctx))
        });
        registry.register(crate::converter::llm::NAME, 50, |ctx| {
            Arc::new(LlmConverter::new(ctx))
        });
        registry
    }

    /// Register `factory` under `name`.
    ///
    /// Re-registering a name replaces the previous entry but keeps its
    /// original position for tie-breaking.
    pub fn register<F>(&mut self, name: impl Into<String>, priority: i32, factory: F)
    where
        F: Fn(&ConverterContext) -> Arc<dyn Converter> + Send + Sync + 'static,
    {
        let entry = Entry {
            name: name.into(),
            priority,
            factory: Arc::new(factory),
        };
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, name: &str) -> Option<ConverterFactory> {
        self.entry(name).map(|e| Arc::clone(&e.factory))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Instantiate the converter registered as `name`.
    pub fn create(
        &self,
        name: &str,
        ctx: &ConverterContext,
    ) -> Result<Arc<dyn Converter>, MdConvertError> {
        self.entry(name)
            .map(|e| (e.factory)(ctx))
            .ok_or_else(|| MdConvertError::UnknownConverter {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Pick the preferred converter for `extension`.
    ///
    /// Every registered converter is built from `ctx` and asked whether it
    /// `supports` the extension; the survivors are stably sorted by priority
    /// and the first one wins. Building is cheap because the context already
    /// holds the HTTP client and the resolved `pandoc` path.
    pub fn auto_select(
        &self,
        extension: &str,
        ctx: &ConverterContext,
    ) -> Result<Arc<dyn Converter>, MdConvertError> {
        let ext = normalize_extension(extension);
        let mut candidates: Vec<(i32, Arc<dyn Converter>)> = self
            .entries
            .iter()
            .map(|e| (e.priority, (e.factory)(ctx)))
            .filter(|(_, c)| c.supports(&ext))
            .collect();
        candidates.sort_by_key(|(priority, _)| *priority);
        candidates
            .into_iter()
            .next()
            .map(|(_, c)| c)
            .ok_or(MdConvertError::NoConverterForExtension { extension: ext })
    }

    /// Registered converters in registration order.
    pub fn list_all(&self) -> Vec<ConverterInfo> {
        let ctx = ConverterContext::default();
        self.entries
            .iter()
            .map(|e| ConverterInfo {
                name: e.name.clone(),
                priority: e.priority,
                supported_extensions: (e.factory)(&ctx)
                    .supported_extensions()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every registration.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }
}
