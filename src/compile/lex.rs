use crate::compile::Keyword;
use crate::types::span::Span;
use crate::{Error, Result};

/// Splits a template source into tokens.
///
/// Raw text is yielded as a single [`Token::Raw`] between tags. Inside a tag
/// the source is split into the expression tokens that the parser works on.
/// Call [`.next()?`][Lexer::next] until it returns [`None`].
///
/// A `{% %}` or `{# #}` tag that is the only thing on its line is
/// *standalone*: its indentation and the line break that ends its line are
/// not part of the output.
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Lexer<'source> {
    pub source: &'source str,
    cursor: usize,
    mode: Mode,

    /// Set after a standalone tag. The next raw token starts after the end of
    /// the current line.
    skip_line_end: bool,

    /// A begin tag found while lexing raw text, returned by the following
    /// call.
    pending: Option<(Token, Span)>,
}

#[cfg_attr(internal_debug, derive(Debug))]
#[derive(Clone, Copy)]
enum Mode {
    /// Outside of any tag.
    Raw,
    /// Inside an expression or block tag.
    Tag(Tag),
    /// Inside a comment.
    Comment { standalone: bool },
}

#[cfg_attr(internal_debug, derive(Debug))]
#[derive(Clone, Copy)]
struct Tag {
    /// The span of the delimiter that opened the tag.
    begin: Span,
    /// The delimiter that closes the tag.
    end: Token,
    standalone: bool,
    /// Whether the previous token continues a path, e.g. `user.` or `user`.
    /// Inside a path digits are indexes and keywords are field names.
    in_path: bool,
}

/// The unit yielded by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Raw template text
    Raw,
    /// `{{`
    BeginExpr,
    /// `}}`
    EndExpr,
    /// `{%`
    BeginBlock,
    /// `%}`
    EndBlock,
    /// `{#`
    BeginComment,
    /// `#}`
    EndComment,
    /// `.`
    Dot,
    /// `|`
    Pipe,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `-`
    Minus,
    /// `=`
    Assign,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// Spaces, tabs and line breaks between tokens
    Whitespace,
    /// One of `not`, `and`, `or`, `true` or `false`
    Keyword,
    /// A tag name, binding or path segment
    Ident,
    /// A list index in a path, e.g. the `0` in `users.0`
    Index,
    /// An integer literal
    Number,
    /// A single or double quoted string literal
    String,
}

const DELIMITERS: [Token; 6] = [
    Token::BeginExpr,
    Token::EndExpr,
    Token::BeginBlock,
    Token::EndBlock,
    Token::BeginComment,
    Token::EndComment,
];

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            source,
            cursor: 0,
            mode: Mode::Raw,
            skip_line_end: false,
            pending: None,
        }
    }

    /// Returns the next token that is not whitespace.
    pub fn next(&mut self) -> Result<Option<(Token, Span)>> {
        while let Some((tk, span)) = self.lex()? {
            if tk != Token::Whitespace {
                return Ok(Some((tk, span)));
            }
        }
        Ok(None)
    }

    fn lex(&mut self) -> Result<Option<(Token, Span)>> {
        if let Some(pending) = self.pending.take() {
            return Ok(Some(pending));
        }
        if self.cursor >= self.source.len() {
            return Ok(None);
        }
        match self.mode {
            Mode::Raw => Ok(self.lex_raw()),
            Mode::Tag(tag) => self.lex_tag(tag).map(Some),
            Mode::Comment { standalone } => Ok(Some(self.lex_comment(standalone))),
        }
    }

    /// Lexes raw text up to the next begin delimiter.
    ///
    /// ```text
    /// raw text   {% tag %}
    /// ^          ^
    /// start      at
    /// ```
    fn lex_raw(&mut self) -> Option<(Token, Span)> {
        let mut start = self.cursor;
        if self.skip_line_end {
            self.skip_line_end = false;
            start = end_of_line(self.source, start);
            self.cursor = start;
            if start == self.source.len() {
                return None;
            }
        }

        let (tk, at) = match find_begin(self.source, start) {
            Some(found) => found,
            None => {
                self.cursor = self.source.len();
                return Some((Token::Raw, Span::from(start..self.cursor)));
            }
        };

        let begin = Span::from(at..at + 2);
        let end = tk.closing();
        let standalone = tk != Token::BeginExpr && self.is_standalone(start, at, end);
        self.cursor = begin.end;
        self.mode = match tk {
            Token::BeginComment => Mode::Comment { standalone },
            _ => Mode::Tag(Tag {
                begin,
                end,
                standalone,
                in_path: false,
            }),
        };

        let raw_end = if standalone {
            line_start(self.source, at)
        } else {
            at
        };
        if start < raw_end {
            self.pending = Some((tk, begin));
            Some((Token::Raw, Span::from(start..raw_end)))
        } else {
            Some((tk, begin))
        }
    }

    /// Lexes a single token inside an expression or block tag.
    fn lex_tag(&mut self, mut tag: Tag) -> Result<(Token, Span)> {
        let i = self.cursor;

        if let Some(delim) = delimiter_at(self.source, i) {
            if delim.is_begin() {
                return Err(self.err_unclosed(tag.begin, tag.end));
            }
            if delim != tag.end {
                return Err(self.err_unexpected_token(delim, i..i + 2));
            }
            self.mode = Mode::Raw;
            self.skip_line_end = tag.standalone;
            self.cursor = i + 2;
            return Ok((delim, Span::from(i..i + 2)));
        }

        let rest = &self.source[i..];
        let mut chars = rest.chars();
        let c = match chars.next() {
            Some(c) => c,
            None => return Err(self.err_unclosed(tag.begin, tag.end)),
        };
        let followed_by_eq = chars.next() == Some('=');

        let (tk, len) = match c {
            '.' => (Token::Dot, 1),
            '|' => (Token::Pipe, 1),
            ',' => (Token::Comma, 1),
            ':' => (Token::Colon, 1),
            '-' => (Token::Minus, 1),
            '(' => (Token::OpenParen, 1),
            ')' => (Token::CloseParen, 1),
            '=' if followed_by_eq => (Token::Eq, 2),
            '=' => (Token::Assign, 1),
            '<' if followed_by_eq => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if followed_by_eq => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            '!' if followed_by_eq => (Token::Ne, 2),
            '"' | '\'' => (Token::String, self.string_len(i, c)?),
            c if c.is_ascii_digit() => {
                let len = prefix_len(rest, |c| c.is_ascii_digit());
                let tk = if tag.in_path {
                    Token::Index
                } else {
                    Token::Number
                };
                (tk, len)
            }
            c if is_whitespace(c) => (Token::Whitespace, prefix_len(rest, is_whitespace)),
            c if is_ident_start(c) => {
                let len = prefix_len(rest, is_ident);
                let word = &rest[..len];
                let tk = if !tag.in_path && Keyword::all().contains(&word) {
                    Token::Keyword
                } else {
                    Token::Ident
                };
                (tk, len)
            }
            c => return Err(self.err_unexpected_character(i..i + c.len_utf8())),
        };

        tag.in_path = match tk {
            Token::Ident => true,
            Token::Dot | Token::Index => tag.in_path,
            _ => false,
        };
        self.mode = Mode::Tag(tag);
        self.cursor = i + len;
        Ok((tk, Span::from(i..i + len)))
    }

    /// Lexes the body of a comment, which is returned as raw text, and the
    /// closing delimiter. An unclosed comment runs to the end of the source.
    fn lex_comment(&mut self, standalone: bool) -> (Token, Span) {
        let i = self.cursor;
        let j = match self.source[i..].find(Token::EndComment.text()) {
            Some(d) => i + d,
            None => {
                self.cursor = self.source.len();
                return (Token::Raw, Span::from(i..self.cursor));
            }
        };
        let end = Span::from(j..j + 2);
        self.cursor = end.end;
        self.mode = Mode::Raw;
        self.skip_line_end = standalone;
        if i == j {
            (Token::EndComment, end)
        } else {
            self.pending = Some((Token::EndComment, end));
            (Token::Raw, Span::from(i..j))
        }
    }

    /// Returns whether the tag opened at `at` is alone on its line.
    ///
    /// Only whitespace may precede it on the line, and only whitespace may
    /// follow its closing delimiter up to the next line break. Raw text before
    /// `start` has already been emitted and cannot be trimmed.
    fn is_standalone(&self, start: usize, at: usize, end: Token) -> bool {
        let ls = line_start(self.source, at);
        if ls < start || !self.source[ls..at].chars().all(is_whitespace) {
            return false;
        }
        let after = match self.source[at + 2..].find(end.text()) {
            Some(d) => at + 2 + d + 2,
            None => return false,
        };
        self.source[after..]
            .split('\n')
            .next()
            .unwrap_or_default()
            .chars()
            .all(is_whitespace)
    }

    /// Returns the byte length of the string literal starting at `i`,
    /// including both quotes.
    fn string_len(&self, i: usize, quote: char) -> Result<usize> {
        let mut escaped = false;
        for (d, c) in self.source[i..].char_indices().skip(1) {
            match c {
                '\r' | '\n' => return Err(self.err_undelimited_string(i..i + d)),
                c if c == quote && !escaped => return Ok(d + 1),
                c => escaped = c == '\\' && !escaped,
            }
        }
        Err(self.err_undelimited_string(i..self.source.len()))
    }

    fn err_unclosed(&self, begin: Span, end: Token) -> Error {
        let what = end.opening().human();
        Error::syntax(format!("unclosed {what}"), self.source, begin)
    }

    fn err_unexpected_token(&self, tk: Token, span: impl Into<Span>) -> Error {
        Error::syntax(format!("unexpected {}", tk.human()), self.source, span)
    }

    fn err_unexpected_character(&self, span: impl Into<Span>) -> Error {
        Error::syntax("unexpected character", self.source, span)
    }

    fn err_undelimited_string(&self, span: impl Into<Span>) -> Error {
        Error::syntax("undelimited string", self.source, span)
    }
}

impl Token {
    pub fn human(&self) -> &'static str {
        match self {
            Self::Raw => "raw template",
            Self::BeginExpr => "begin expression",
            Self::EndExpr => "end expression",
            Self::BeginBlock => "begin block",
            Self::EndBlock => "end block",
            Self::BeginComment => "begin comment",
            Self::EndComment => "end comment",
            Self::Dot => "member access operator",
            Self::Pipe => "pipe",
            Self::Comma => "comma",
            Self::Colon => "colon",
            Self::Minus => "minus",
            Self::Assign => "assignment",
            Self::OpenParen => "opening parenthesis",
            Self::CloseParen => "closing parenthesis",
            Self::Eq => "`==`",
            Self::Ne => "`!=`",
            Self::Lt => "`<`",
            Self::Gt => "`>`",
            Self::Le => "`<=`",
            Self::Ge => "`>=`",
            Self::Whitespace => "whitespace",
            Self::Keyword => "keyword",
            Self::Ident => "identifier",
            Self::Index => "index",
            Self::String => "string",
            Self::Number => "number",
        }
    }

    /// The delimiter that closes a tag opened by this one.
    fn closing(self) -> Self {
        match self {
            Self::BeginExpr => Self::EndExpr,
            Self::BeginBlock => Self::EndBlock,
            Self::BeginComment => Self::EndComment,
            other => other,
        }
    }

    /// The delimiter that opens a tag closed by this one.
    fn opening(self) -> Self {
        match self {
            Self::EndExpr => Self::BeginExpr,
            Self::EndBlock => Self::BeginBlock,
            Self::EndComment => Self::BeginComment,
            other => other,
        }
    }

    /// The source text of a delimiter, empty for any other token.
    fn text(self) -> &'static str {
        match self {
            Self::BeginExpr => "{{",
            Self::EndExpr => "}}",
            Self::BeginBlock => "{%",
            Self::EndBlock => "%}",
            Self::BeginComment => "{#",
            Self::EndComment => "#}",
            _ => "",
        }
    }

    fn is_begin(self) -> bool {
        matches!(
            self,
            Self::BeginExpr | Self::BeginBlock | Self::BeginComment
        )
    }
}

/// Finds the first begin delimiter at or after `from`.
fn find_begin(source: &str, from: usize) -> Option<(Token, usize)> {
    let bytes = source.as_bytes();
    let mut i = from;
    while let Some(d) = source[i..].find('{') {
        let at = i + d;
        let tk = match bytes.get(at + 1) {
            Some(b'{') => Token::BeginExpr,
            Some(b'%') => Token::BeginBlock,
            Some(b'#') => Token::BeginComment,
            _ => {
                i = at + 1;
                continue;
            }
        };
        return Some((tk, at));
    }
    None
}

fn delimiter_at(source: &str, i: usize) -> Option<Token> {
    let rest = &source[i..];
    DELIMITERS.into_iter().find(|tk| rest.starts_with(tk.text()))
}

fn line_start(source: &str, i: usize) -> usize {
    source[..i].rfind('\n').map_or(0, |n| n + 1)
}

/// Skips spaces, tabs and carriage returns from `i`, then a single `\n`.
fn end_of_line(source: &str, i: usize) -> usize {
    let rest = &source[i..];
    let j = i + prefix_len(rest, |c| matches!(c, ' ' | '\t' | '\r'));
    match source[j..].starts_with('\n') {
        true => j + 1,
        false => j,
    }
}

/// The byte length of the longest prefix whose chars all match.
fn prefix_len(s: &str, pred: impl Fn(char) -> bool) -> usize {
    s.char_indices()
        .find(|&(_, c)| !pred(c))
        .map_or(s.len(), |(i, _)| i)
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

#[cfg(feature = "unicode")]
fn is_ident_start(c: char) -> bool {
    c == '_' || unicode_ident::is_xid_start(c)
}

#[cfg(feature = "unicode")]
fn is_ident(c: char) -> bool {
    unicode_ident::is_xid_continue(c)
}

#[cfg(not(feature = "unicode"))]
fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

#[cfg(not(feature = "unicode"))]
fn is_ident(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::{Lexer, Token};
    use crate::Result;

    use Token::*;

    #[test]
    fn lex_only_raw() {
        assert_eq!(lex("").unwrap(), []);
        assert_eq!(lex("a { b } % c #").unwrap(), [(Raw, "a { b } % c #")]);
    }

    #[test]
    fn lex_expression_tokens() {
        let tokens = lex("<{{ f(x, -7) | default: \"a\\\"b\" }}>").unwrap();
        assert_eq!(
            tokens,
            [
                (Raw, "<"),
                (BeginExpr, "{{"),
                (Whitespace, " "),
                (Ident, "f"),
                (OpenParen, "("),
                (Ident, "x"),
                (Comma, ","),
                (Whitespace, " "),
                (Minus, "-"),
                (Number, "7"),
                (CloseParen, ")"),
                (Whitespace, " "),
                (Pipe, "|"),
                (Whitespace, " "),
                (Ident, "default"),
                (Colon, ":"),
                (Whitespace, " "),
                (String, "\"a\\\"b\""),
                (Whitespace, " "),
                (EndExpr, "}}"),
                (Raw, ">"),
            ]
        );
    }

    #[cfg(feature = "unicode")]
    #[test]
    fn lex_unicode_ident() {
        let err = lex("{{ ім'я }}").unwrap_err();
        assert_eq!(err.message(), "undelimited string");
        let tokens = lex("{{ ціна }}").unwrap();
        assert_eq!(tokens[2], (Ident, "ціна"));
    }

    #[test]
    fn lex_comparison_operators() {
        let kinds: Vec<_> = lex("{% if a == 1 != b < c > d <= e >= f %}{% set g=h %}")
            .unwrap()
            .into_iter()
            .map(|(tk, _)| tk)
            .filter(|&tk| tk != Whitespace)
            .collect();
        assert_eq!(
            kinds,
            [
                BeginBlock, Ident, Ident, Eq, Number, Ne, Ident, Lt, Ident, Gt, Ident, Le, Ident,
                Ge, Ident, EndBlock, BeginBlock, Ident, Ident, Assign, Ident, EndBlock,
            ]
        );
    }

    #[test]
    fn lex_path_indexes_and_keywords() {
        let tokens = lex("{{ not rows.10.and or 10 }}").unwrap();
        assert_eq!(
            tokens,
            [
                (BeginExpr, "{{"),
                (Whitespace, " "),
                (Keyword, "not"),
                (Whitespace, " "),
                (Ident, "rows"),
                (Dot, "."),
                (Index, "10"),
                (Dot, "."),
                (Ident, "and"),
                (Whitespace, " "),
                (Keyword, "or"),
                (Whitespace, " "),
                (Number, "10"),
                (Whitespace, " "),
                (EndExpr, "}}"),
            ]
        );
    }

    #[test]
    fn lex_standalone_tags_take_their_line() {
        let tokens = lex("<ul>\n  {% for x in xs %}  \n  <li>\r\n\t{# c #}\r\n</ul>").unwrap();
        let raw: Vec<_> = tokens
            .into_iter()
            .filter(|&(tk, _)| tk == Raw)
            .map(|(_, s)| s)
            .collect();
        assert_eq!(raw, ["<ul>\n", "  <li>\r\n", " c ", "</ul>"]);
    }

    #[test]
    fn lex_standalone_tag_at_eof() {
        let tokens = lex("a\n{% endif %}\n").unwrap();
        assert_eq!(tokens.first(), Some(&(Raw, "a\n")));
        assert_eq!(tokens.last(), Some(&(EndBlock, "%}")));
    }

    #[test]
    fn lex_lines_with_other_content_are_kept() {
        let tokens = lex("  {{ x }}\n").unwrap();
        assert_eq!(tokens.first(), Some(&(Raw, "  ")));
        assert_eq!(tokens.last(), Some(&(Raw, "\n")));

        let tokens = lex("{% a %}{% b %}\nc").unwrap();
        assert_eq!(tokens.last(), Some(&(Raw, "\nc")));

        let tokens = lex("x {% a %}\ny").unwrap();
        assert_eq!(tokens.last(), Some(&(Raw, "\ny")));
    }

    #[test]
    fn lex_comments() {
        assert_eq!(
            lex("a{##}b").unwrap(),
            [(Raw, "a"), (BeginComment, "{#"), (EndComment, "#}"), (Raw, "b")]
        );
        assert_eq!(
            lex("a{# {{ %} # #}").unwrap(),
            [
                (Raw, "a"),
                (BeginComment, "{#"),
                (Raw, " {{ %} # "),
                (EndComment, "#}")
            ]
        );
        assert_eq!(
            lex("a{# open").unwrap(),
            [(Raw, "a"), (BeginComment, "{#"), (Raw, " open")]
        );
    }

    #[test]
    fn lex_errors() {
        let cases = [
            ("{{ a {% b", "unclosed begin expression"),
            ("{% a }}", "unexpected end expression"),
            ("{{ 'a }}", "undelimited string"),
            ("{{ \"a\nb\" }}", "undelimited string"),
            ("{{ a ! b }}", "unexpected character"),
            ("{{ a & b }}", "unexpected character"),
        ];
        for (source, msg) in cases {
            assert_eq!(lex(source).unwrap_err().message(), msg, "{source}");
        }
    }

    fn lex(source: &str) -> Result<Vec<(Token, &str)>> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        while let Some((tk, span)) = lexer.lex()? {
            tokens.push((tk, &source[span]));
        }
        assert!(lexer.lex()?.is_none());
        Ok(tokens)
    }
}
