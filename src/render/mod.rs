mod core;
mod expr;
mod fmt;
mod state;

use std::io;
use std::sync::Arc;

use crate::render::core::Renderer;
use crate::render::fmt::{Formatter, Writer};
use crate::types::program::Template;
use crate::{Context, Engine, Error, Result};

/// Render a template to a string.
pub(crate) fn to_string(engine: &Engine, template: &Arc<Template>, ctx: &mut Context) -> Result<String> {
    let mut s = String::with_capacity(template.source.len());
    let mut f = Formatter::with_string(&mut s);
    Renderer::new(engine).render(&mut f, template, ctx)?;
    Ok(s)
}

/// Render a template to the given writer.
///
/// If writing fails the underlying I/O error is returned instead of the
/// formatting error that aborted the render.
pub(crate) fn to_writer<W>(
    engine: &Engine,
    template: &Arc<Template>,
    ctx: &mut Context,
    writer: W,
) -> Result<()>
where
    W: io::Write,
{
    let mut w = Writer::new(writer);
    let mut f = Formatter::with_writer(&mut w);
    Renderer::new(engine)
        .render(&mut f, template, ctx)
        .map_err(|err| w.take_err().map(Error::from).unwrap_or(err))
}
