use std::fmt;
use std::io;

use crate::{Context, Value};

/// The sink that rendered output is written to.
///
/// Nested constructs such as `spaceless` or `create` render into a string
/// buffer first, everything else goes straight to the caller's buffer or
/// writer.
pub struct Formatter<'a> {
    buf: &'a mut (dyn fmt::Write + 'a),
}

/// Adapts an [`io::Write`] implementor so it can be used with a
/// [`Formatter`], remembering the I/O error that caused a write to fail.
pub struct Writer<W> {
    writer: W,
    err: Option<io::Error>,
}

impl<'a> Formatter<'a> {
    pub(crate) fn with_string(buf: &'a mut String) -> Self {
        Self { buf }
    }

    pub(crate) fn with_writer<W>(buf: &'a mut Writer<W>) -> Self
    where
        W: io::Write,
    {
        Self { buf }
    }

    /// Writes a value, passing it through the active escape policy unless the
    /// value is raw or escaping is disabled.
    pub(crate) fn write_value(
        &mut self,
        ctx: &mut Context,
        value: &Value,
        escaping: bool,
    ) -> fmt::Result {
        let text = value.to_string();
        if value.raw() || !escaping {
            self.buf.write_str(&text)
        } else {
            self.buf.write_str(&ctx.escape(&text))
        }
    }
}

impl fmt::Write for Formatter<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.buf.write_str(s)
    }

    #[inline]
    fn write_char(&mut self, c: char) -> fmt::Result {
        self.buf.write_char(c)
    }
}

impl<W> Writer<W>
where
    W: io::Write,
{
    pub fn new(writer: W) -> Self {
        Self { writer, err: None }
    }

    pub fn take_err(&mut self) -> Option<io::Error> {
        self.err.take()
    }
}

impl<W> fmt::Write for Writer<W>
where
    W: io::Write,
{
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.writer.write_all(s.as_bytes()).map_err(|e| {
            self.err = Some(e);
            fmt::Error
        })
    }
}
