use std::cmp::{max, min};
use std::fmt;
use std::io;
use std::path::Path;

use crate::types::span::Span;

/// A type alias for results in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while loading, compiling or rendering a template.
pub struct Error {
    kind: ErrorKind,
    msg: String,
    name: Option<String>,
    line: Option<usize>,
    pretty: Option<(String, Span)>,
    chain: Vec<Frame>,
    source: Option<io::Error>,
}

/// The category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The template source is malformed.
    Syntax,
    /// A template could not be found.
    Resolution,
    /// Rendering could not continue, e.g. the include depth was exceeded or
    /// a `create` tag was used without an output directory.
    Render,
    /// Writing output failed.
    Io,
}

/// A location in the include chain that was active when an error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The name of the template containing the tag.
    pub name: String,
    /// The line of the `include`, `extend` or `create` tag.
    pub line: usize,
}

impl Error {
    fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
            name: None,
            line: None,
            pretty: None,
            chain: Vec::new(),
            source: None,
        }
    }

    /// Constructs a new syntax error pointing at a span of the source.
    pub(crate) fn syntax(msg: impl Into<String>, source: &str, span: impl Into<Span>) -> Self {
        Self::new(ErrorKind::Syntax, msg).with_span(source, span.into())
    }

    /// Constructs a new error for a template that could not be found.
    pub(crate) fn resolution(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolution, msg)
    }

    /// Constructs a new fatal render error.
    pub(crate) fn render(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Render, msg)
    }

    /// Constructs an I/O error for the given path.
    pub(crate) fn io(err: io::Error, path: &Path) -> Self {
        let mut e = Self::new(ErrorKind::Io, format!("{}: {err}", path.display()));
        e.source = Some(err);
        e
    }

    pub(crate) fn max_include_depth(max: usize) -> Self {
        Self::render(format!("reached maximum include depth ({max})"))
    }

    /// Attaches the template name, unless one is already set.
    pub(crate) fn with_template_name(mut self, name: Option<&str>) -> Self {
        if self.name.is_none() {
            self.name = name.map(String::from);
        }
        self
    }

    /// Attaches the line number, unless one is already set.
    pub(crate) fn with_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    /// Attaches the offending source and span, unless already set.
    pub(crate) fn with_span(mut self, source: &str, span: Span) -> Self {
        if self.pretty.is_none() {
            self.line = Some(span.line(source));
            self.pretty = Some((source.to_owned(), span));
        }
        self
    }

    /// Attaches the include chain, unless one is already set.
    pub(crate) fn with_chain(mut self, chain: &[Frame]) -> Self {
        if self.chain.is_empty() {
            self.chain = chain.to_vec();
        }
        self
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message without any location information.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the name of the template the error occurred in, if known.
    pub fn template_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the 1-based line the error occurred on, if known.
    pub fn line(&self) -> Option<usize> {
        self.line
    }

    /// Returns the include chain, outermost first.
    pub fn chain(&self) -> &[Frame] {
        &self.chain
    }
}

#[cfg(feature = "serde")]
impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        Self::render(msg.to_string())
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let mut e = Self::new(ErrorKind::Io, err.to_string());
        e.source = Some(err);
        e
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Self::render("failed to write output")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_location(self, f)?;
        if let Some((source, span)) = &self.pretty {
            fmt_pretty(&self.msg, source, *span, f)?;
        }
        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_location(self, f)?;
        if f.alternate() {
            if let Some((source, span)) = &self.pretty {
                fmt_pretty(&self.msg, source, *span, f)?;
            }
        }
        Ok(())
    }
}

fn fmt_location(err: &Error, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (&err.name, err.line) {
        (Some(name), Some(line)) => write!(f, "{name}:{line}: {}", err.msg)?,
        (Some(name), None) => write!(f, "{name}: {}", err.msg)?,
        (None, Some(line)) => write!(f, "line {line}: {}", err.msg)?,
        (None, None) => f.write_str(&err.msg)?,
    }
    for frame in err.chain.iter().rev() {
        write!(f, "\n  included from {}:{}", frame.name, frame.line)?;
    }
    Ok(())
}

fn fmt_pretty(msg: &str, source: &str, span: Span, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let lines: Vec<_> = source.split_terminator('\n').collect();
    let (line, col) = span.line_col(source);
    let (line, code, col) = match lines.get(line) {
        Some(code) => (line, *code, display_width(&code[..min(col, code.len())])),
        // the span starts after the final newline
        None => {
            let code = lines.last().copied().unwrap_or_default();
            (lines.len().saturating_sub(1), code, display_width(code))
        }
    };
    let width = max(1, display_width(&source[span]));

    let num = (line + 1).to_string();
    let pad = display_width(&num);
    let underline = "^".repeat(width);

    write!(
        f,
        "\n\n \
        {0:pad$} |\n \
        {num:>} | {code}\n \
        {0:pad$} | {underline:>width$} {msg}\n",
        "",
        pad = pad,
        num = num,
        code = code,
        underline = underline,
        width = col + width,
        msg = msg
    )
}

#[cfg(feature = "unicode")]
fn display_width(s: &str) -> usize {
    unicode_width::UnicodeWidthStr::width(s)
}

#[cfg(not(feature = "unicode"))]
fn display_width(s: &str) -> usize {
    s.chars().count()
}
