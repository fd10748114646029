//! Defines a compiled [`Template`], the parsed node tree together with the
//! information needed to render it.

use std::collections::BTreeMap;

use crate::types::ast;
use crate::types::span::Span;

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Template {
    /// The normalized name, `None` for templates compiled from a string.
    pub name: Option<String>,
    pub source: String,
    pub scope: ast::Scope,
    pub blocks: Vec<ast::Block>,
    /// Maps block names to indexes into `blocks`.
    pub registry: BTreeMap<String, usize>,
    /// Whether the template extends another template.
    pub extends: bool,
}

impl Template {
    /// Returns the named block defined by this template.
    pub fn block(&self, name: &str) -> Option<&ast::Block> {
        self.registry.get(name).map(|&i| &self.blocks[i])
    }

    /// Returns the source text covered by the span.
    pub fn text(&self, span: Span) -> &str {
        &self.source.as_str()[span]
    }

    /// Returns the name used in error messages.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}
