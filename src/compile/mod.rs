//! Compile template source into a [`Template`] that can be rendered.
//!
//! This process has two stages:
//! - The lexer chunks the template source into tokens.
//! - The parser constructs the node tree from the token stream.
//!
//! Finally the named blocks are indexed so that templates extending this one
//! can find them.

mod lex;
mod parse;

pub(crate) use crate::compile::parse::Keyword;

use crate::types::program::Template;
use crate::{Engine, Result};

/// Compile a template.
pub fn template(engine: &Engine, name: Option<&str>, source: String) -> Result<Template> {
    let ast = parse::Parser::new(engine, &source)
        .parse_template()
        .map_err(|err| err.with_template_name(name))?;
    let registry = ast
        .blocks
        .iter()
        .enumerate()
        .map(|(i, block)| (block.name.clone(), i))
        .collect();
    Ok(Template {
        name: name.map(String::from),
        source,
        scope: ast.scope,
        blocks: ast.blocks,
        registry,
        extends: ast.extends,
    })
}
