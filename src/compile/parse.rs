use std::fmt::Display;

use crate::compile::lex::{Lexer, Token};
use crate::filters::Arity;
use crate::types::ast;
use crate::types::span::Span;
use crate::{Engine, Error, Result};

/// A parser that constructs an AST from a token stream.
///
/// Tags are parsed without recursion using a stack of partially parsed
/// blocks. Expressions are parsed by recursive descent, one function per
/// precedence level. The parser sometimes needs to peek at the next token to
/// know how to proceed and uses the `peeked` buffer to do this.
pub struct Parser<'engine, 'source> {
    /// The engine, used to resolve filters.
    engine: &'engine Engine,

    /// A lexer that tokenizes the template source.
    tokens: Lexer<'source>,

    /// Remember a peeked value, even if it was `None`
    peeked: Option<Option<(Token, Span)>>,

    /// The number of `cycle` tags parsed so far.
    cycles: usize,
}

/// Stores the state of a block tag during parsing.
enum State {
    /// A partial `if` statement.
    If {
        /// The condition of the `if` and of each `elif` clause.
        conds: Vec<ast::Expr>,
        /// Whether or not this `if` statement has an `else` clause.
        has_else: bool,
        span: Span,
    },

    /// A partial `for` statement.
    For {
        var: ast::Ident,
        iterable: ast::Expr,
        reversed: bool,
        /// Whether or not this `for` statement has an `empty` clause.
        has_empty: bool,
        span: Span,
    },

    Block {
        name: String,
        span: Span,
    },

    With {
        bindings: Vec<ast::Binding>,
        span: Span,
    },

    Spaceless {
        span: Span,
    },

    RecurseTree {
        expr: ast::Expr,
        span: Span,
    },

    Markers {
        var: ast::Ident,
        list: ast::Expr,
        pattern: ast::Expr,
        span: Span,
    },

    Msg {
        span: Span,
    },

    Range {
        var: ast::Ident,
        from: ast::Expr,
        to: ast::Expr,
        downto: bool,
        step: Option<ast::Expr>,
        span: Span,
    },

    Tabbing {
        span: Span,
    },
}

/// A parsed tag.
enum Block {
    If(ast::Expr),
    Elif(ast::Expr),
    Else,
    EndIf,
    For(ast::Ident, ast::Expr, bool),
    Empty,
    EndFor,
    Block(String),
    EndBlock,
    Extend(ast::Expr),
    Include(ast::Expr, Vec<ast::Binding>),
    With(Vec<ast::Binding>),
    EndWith,
    Spaceless,
    EndSpaceless,
    Cycle(Vec<ast::Expr>),
    Create(ast::Expr, ast::Expr),
    RecurseTree(ast::Expr),
    EndRecurseTree,
    Markers(ast::Ident, ast::Expr, ast::Expr),
    EndMarkers,
    Msg,
    EndMsg,
    Set(ast::Binding),
    Range(ast::Ident, ast::Expr, ast::Expr, bool, Option<ast::Expr>),
    EndRange,
    Tabbing,
    EndTabbing,
}

/// A reserved word in expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    Not,
    And,
    Or,
    True,
    False,
}

/// The name of a tag, e.g. `for` in `{% for x in xs %}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    If,
    Elif,
    Else,
    EndIf,
    For,
    Empty,
    EndFor,
    Block,
    EndBlock,
    Extend,
    Include,
    With,
    EndWith,
    Spaceless,
    EndSpaceless,
    Cycle,
    Create,
    RecurseTree,
    EndRecurseTree,
    Markers,
    EndMarkers,
    Msg,
    EndMsg,
    Set,
    Range,
    EndRange,
    Tabbing,
    EndTabbing,
}

#[derive(Clone, Copy)]
enum Sign {
    Neg,
    Pos,
}

impl<'engine, 'source> Parser<'engine, 'source> {
    /// Construct a new parser.
    pub fn new(engine: &'engine Engine, source: &'source str) -> Self {
        Self {
            engine,
            tokens: Lexer::new(source),
            peeked: None,
            cycles: 0,
        }
    }

    /// Parses a template.
    ///
    /// This function works using two stacks:
    /// - A stack of blocks e.g. `{% if cond %} ... {% else %}`.
    /// - A stack of scopes which collect each parsed statement.
    ///
    /// Named blocks are moved out of the tree into a separate list when their
    /// `endblock` is reached, leaving a reference in their place.
    pub fn parse_template(mut self) -> Result<ast::Template> {
        let mut blocks = vec![];
        let mut scopes = vec![ast::Scope::new()];
        let mut defs: Vec<ast::Block> = vec![];
        let mut extends = false;

        while let Some(next) = self.next()? {
            let stmt = match next {
                // Simply raw template, emit a single statement for it.
                (Token::Raw, span) => ast::Stmt::Raw(span),

                // The start of a comment, e.g. `{# ... #}`
                (Token::BeginComment, _) => {
                    if self.is_next(Token::Raw)? {
                        self.expect(Token::Raw)?;
                    }
                    self.expect(Token::EndComment)?;
                    continue;
                }

                // The start of an expression, e.g. `{{ user.name }}`
                (Token::BeginExpr, begin) => {
                    let expr = self.parse_expr()?;
                    let end = self.expect(Token::EndExpr)?;
                    let span = begin.combine(end);
                    ast::Stmt::InlineExpr(ast::InlineExpr { expr, span })
                }

                // The start of a tag, e.g. `{% if cond %}`
                (Token::BeginBlock, begin) => {
                    let block = self.parse_block()?;
                    let end = self.expect(Token::EndBlock)?;
                    let span = begin.combine(end);

                    match block {
                        // The start of an `if` statement. We must push a
                        // block to the block stack and a scope to the scope
                        // stack because an if statement starts a new scope.
                        Block::If(cond) => {
                            blocks.push(State::If {
                                conds: vec![cond],
                                has_else: false,
                                span,
                            });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        // An `elif` clause. We expect that the previous block
                        // was an `if` block without an `else` clause.
                        Block::Elif(cond) => {
                            let err = || self.err_unexpected_tag("elif", span);
                            match blocks.last_mut().ok_or_else(err)? {
                                State::If {
                                    conds,
                                    has_else: false,
                                    ..
                                } => conds.push(cond),
                                _ => return Err(err()),
                            }
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        // The `else` clause of an `if` statement.
                        Block::Else => {
                            let err = || self.err_unexpected_tag("else", span);
                            match blocks.last_mut().ok_or_else(err)? {
                                State::If {
                                    has_else: has_else @ false,
                                    ..
                                } => *has_else = true,
                                _ => return Err(err()),
                            }
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        // The end of an `if` statement. There is one scope
                        // per condition plus one for the `else` clause.
                        Block::EndIf => {
                            let err = || self.err_unexpected_tag("endif", span);
                            match blocks.pop().ok_or_else(err)? {
                                State::If {
                                    conds, has_else, ..
                                } => {
                                    let else_branch = has_else.then(|| scopes.pop().unwrap());
                                    let bodies = scopes.split_off(scopes.len() - conds.len());
                                    let branches = conds.into_iter().zip(bodies).collect();
                                    ast::Stmt::IfElse(ast::IfElse {
                                        branches,
                                        else_branch,
                                    })
                                }
                                _ => return Err(err()),
                            }
                        }

                        Block::For(var, iterable, reversed) => {
                            blocks.push(State::For {
                                var,
                                iterable,
                                reversed,
                                has_empty: false,
                                span,
                            });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        // The `empty` clause of a `for` statement, rendered
                        // when there is nothing to iterate over.
                        Block::Empty => {
                            let err = || self.err_unexpected_tag("empty", span);
                            match blocks.last_mut().ok_or_else(err)? {
                                State::For {
                                    has_empty: has_empty @ false,
                                    ..
                                } => *has_empty = true,
                                _ => return Err(err()),
                            }
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        Block::EndFor => {
                            let err = || self.err_unexpected_tag("endfor", span);
                            match blocks.pop().ok_or_else(err)? {
                                State::For {
                                    var,
                                    iterable,
                                    reversed,
                                    has_empty,
                                    ..
                                } => {
                                    let empty = has_empty.then(|| scopes.pop().unwrap());
                                    let body = scopes.pop().unwrap();
                                    ast::Stmt::ForLoop(ast::ForLoop {
                                        var,
                                        iterable,
                                        reversed,
                                        body,
                                        empty,
                                    })
                                }
                                _ => return Err(err()),
                            }
                        }

                        Block::Block(name) => {
                            blocks.push(State::Block { name, span });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        // The end of a named block. The body is stored in the
                        // template's block list so that templates extending
                        // this one can look it up by name.
                        Block::EndBlock => {
                            let err = || self.err_unexpected_tag("endblock", span);
                            match blocks.pop().ok_or_else(err)? {
                                State::Block { name, span } => {
                                    if defs.iter().any(|b| b.name == name) {
                                        return Err(Error::syntax(
                                            format!("block `{name}` is defined more than once"),
                                            self.source(),
                                            span,
                                        ));
                                    }
                                    let body = scopes.pop().unwrap();
                                    let id = defs.len();
                                    defs.push(ast::Block { name, body, span });
                                    ast::Stmt::Block(ast::BlockRef { id, span })
                                }
                                _ => return Err(err()),
                            }
                        }

                        Block::Extend(name) => {
                            if extends {
                                return Err(Error::syntax(
                                    "a template can only extend one other template",
                                    self.source(),
                                    span,
                                ));
                            }
                            extends = true;
                            ast::Stmt::Extend(ast::Extend { name, span })
                        }

                        Block::Include(name, bindings) => ast::Stmt::Include(ast::Include {
                            name,
                            bindings,
                            span,
                        }),

                        Block::With(bindings) => {
                            blocks.push(State::With { bindings, span });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        Block::EndWith => {
                            let err = || self.err_unexpected_tag("endwith", span);
                            match blocks.pop().ok_or_else(err)? {
                                State::With { bindings, .. } => {
                                    let body = scopes.pop().unwrap();
                                    ast::Stmt::With(ast::With { bindings, body })
                                }
                                _ => return Err(err()),
                            }
                        }

                        Block::Spaceless => {
                            blocks.push(State::Spaceless { span });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        Block::EndSpaceless => {
                            let err = || self.err_unexpected_tag("endspaceless", span);
                            match blocks.pop().ok_or_else(err)? {
                                State::Spaceless { .. } => {
                                    ast::Stmt::Spaceless(scopes.pop().unwrap())
                                }
                                _ => return Err(err()),
                            }
                        }

                        Block::Cycle(items) => {
                            let id = self.cycles;
                            self.cycles += 1;
                            ast::Stmt::Cycle(ast::Cycle { id, items })
                        }

                        Block::Create(target, template) => ast::Stmt::Create(ast::Create {
                            target,
                            template,
                            span,
                        }),

                        Block::RecurseTree(expr) => {
                            blocks.push(State::RecurseTree { expr, span });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        Block::EndRecurseTree => {
                            let err = || self.err_unexpected_tag("endrecursetree", span);
                            match blocks.pop().ok_or_else(err)? {
                                State::RecurseTree { expr, .. } => {
                                    let body = scopes.pop().unwrap();
                                    ast::Stmt::RecurseTree(ast::RecurseTree { expr, body })
                                }
                                _ => return Err(err()),
                            }
                        }

                        Block::Markers(var, list, pattern) => {
                            blocks.push(State::Markers {
                                var,
                                list,
                                pattern,
                                span,
                            });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        Block::EndMarkers => {
                            let err = || self.err_unexpected_tag("endmarkers", span);
                            match blocks.pop().ok_or_else(err)? {
                                State::Markers {
                                    var, list, pattern, ..
                                } => {
                                    let body = scopes.pop().unwrap();
                                    ast::Stmt::Markers(ast::Markers {
                                        var,
                                        list,
                                        pattern,
                                        body,
                                    })
                                }
                                _ => return Err(err()),
                            }
                        }

                        Block::Msg => {
                            blocks.push(State::Msg { span });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        Block::EndMsg => {
                            let err = || self.err_unexpected_tag("endmsg", span);
                            match blocks.pop().ok_or_else(err)? {
                                State::Msg { .. } => ast::Stmt::Msg(scopes.pop().unwrap()),
                                _ => return Err(err()),
                            }
                        }

                        Block::Set(binding) => ast::Stmt::Set(binding),

                        Block::Range(var, from, to, downto, step) => {
                            blocks.push(State::Range {
                                var,
                                from,
                                to,
                                downto,
                                step,
                                span,
                            });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        Block::EndRange => {
                            let err = || self.err_unexpected_tag("endrange", span);
                            match blocks.pop().ok_or_else(err)? {
                                State::Range {
                                    var,
                                    from,
                                    to,
                                    downto,
                                    step,
                                    ..
                                } => {
                                    let body = scopes.pop().unwrap();
                                    ast::Stmt::Range(ast::RangeLoop {
                                        var,
                                        from,
                                        to,
                                        downto,
                                        step,
                                        body,
                                    })
                                }
                                _ => return Err(err()),
                            }
                        }

                        Block::Tabbing => {
                            blocks.push(State::Tabbing { span });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        Block::EndTabbing => {
                            let err = || self.err_unexpected_tag("endtabbing", span);
                            match blocks.pop().ok_or_else(err)? {
                                State::Tabbing { .. } => ast::Stmt::Tabbing(scopes.pop().unwrap()),
                                _ => return Err(err()),
                            }
                        }
                    }
                }
                (tk, span) => {
                    panic!("lexer bug: received token `{tk:?}` at {span:?}");
                }
            };
            scopes.last_mut().unwrap().stmts.push(stmt);
        }

        if let Some(block) = blocks.first() {
            let (tag, span) = match block {
                State::If { span, .. } => ("if", span),
                State::For { span, .. } => ("for", span),
                State::Block { span, .. } => ("block", span),
                State::With { span, .. } => ("with", span),
                State::Spaceless { span } => ("spaceless", span),
                State::RecurseTree { span, .. } => ("recursetree", span),
                State::Markers { span, .. } => ("markers", span),
                State::Msg { span } => ("msg", span),
                State::Range { span, .. } => ("range", span),
                State::Tabbing { span } => ("tabbing", span),
            };
            return Err(Error::syntax(
                format!("unclosed `{tag}` tag"),
                self.source(),
                *span,
            ));
        }

        assert!(
            scopes.len() == 1,
            "parser bug: we should end with a single scope"
        );

        Ok(ast::Template {
            scope: scopes.remove(0),
            blocks: defs,
            extends,
        })
    }

    /// Parses the contents of a single tag. All of the following are valid.
    ///
    ///   for item in group.users reversed
    ///
    ///   include "footer.html" with year=2024
    ///
    ///   range i from 10 downto 0 step 2
    ///
    fn parse_block(&mut self) -> Result<Block> {
        let (tag, _) = self.parse_tag()?;
        match tag {
            Tag::If => Ok(Block::If(self.parse_expr()?)),
            Tag::Elif => Ok(Block::Elif(self.parse_expr()?)),
            Tag::Else => Ok(Block::Else),
            Tag::EndIf => Ok(Block::EndIf),
            Tag::For => {
                let var = self.parse_ident()?;
                self.expect_word("in")?;
                let iterable = self.parse_expr()?;
                let reversed = self.eat_word("reversed")?;
                Ok(Block::For(var, iterable, reversed))
            }
            Tag::Empty => Ok(Block::Empty),
            Tag::EndFor => Ok(Block::EndFor),
            Tag::Block => {
                let name = self.parse_ident()?;
                Ok(Block::Block(self.source()[name.span].to_owned()))
            }
            Tag::EndBlock => {
                // `{% endblock name %}` is accepted for readability.
                if self.is_next(Token::Ident)? {
                    self.parse_ident()?;
                }
                Ok(Block::EndBlock)
            }
            Tag::Extend => Ok(Block::Extend(self.parse_expr()?)),
            Tag::Include => {
                let name = self.parse_expr()?;
                let bindings = match self.eat_word("with")? {
                    true => self.parse_bindings()?,
                    false => Vec::new(),
                };
                Ok(Block::Include(name, bindings))
            }
            Tag::With => Ok(Block::With(self.parse_bindings()?)),
            Tag::EndWith => Ok(Block::EndWith),
            Tag::Spaceless => Ok(Block::Spaceless),
            Tag::EndSpaceless => Ok(Block::EndSpaceless),
            Tag::Cycle => {
                let mut items = vec![self.parse_expr()?];
                loop {
                    if self.is_next(Token::Comma)? {
                        self.expect(Token::Comma)?;
                    } else if self.is_next(Token::EndBlock)? {
                        break;
                    }
                    items.push(self.parse_expr()?);
                }
                Ok(Block::Cycle(items))
            }
            Tag::Create => {
                let target = self.parse_expr()?;
                self.expect_word("from")?;
                let template = self.parse_expr()?;
                Ok(Block::Create(target, template))
            }
            Tag::RecurseTree => Ok(Block::RecurseTree(self.parse_expr()?)),
            Tag::EndRecurseTree => Ok(Block::EndRecurseTree),
            Tag::Markers => {
                let var = self.parse_ident()?;
                self.expect_word("in")?;
                let list = self.parse_expr()?;
                self.expect_word("with")?;
                let pattern = self.parse_expr()?;
                Ok(Block::Markers(var, list, pattern))
            }
            Tag::EndMarkers => Ok(Block::EndMarkers),
            Tag::Msg => Ok(Block::Msg),
            Tag::EndMsg => Ok(Block::EndMsg),
            Tag::Set => Ok(Block::Set(self.parse_binding()?)),
            Tag::Range => {
                let var = self.parse_ident()?;
                self.expect_word("from")?;
                let from = self.parse_expr()?;
                let downto = match self.parse()? {
                    (Token::Ident, span) if &self.source()[span] == "to" => false,
                    (Token::Ident, span) if &self.source()[span] == "downto" => true,
                    (tk, span) => {
                        return Err(self.err_unexpected_token("`to` or `downto`", tk, span));
                    }
                };
                let to = self.parse_expr()?;
                let step = match self.eat_word("step")? {
                    true => Some(self.parse_expr()?),
                    false => None,
                };
                Ok(Block::Range(var, from, to, downto, step))
            }
            Tag::EndRange => Ok(Block::EndRange),
            Tag::Tabbing => Ok(Block::Tabbing),
            Tag::EndTabbing => Ok(Block::EndTabbing),
        }
    }

    /// Parses one or more `name=expr` bindings.
    ///
    ///   title="Hello" user=users.0
    ///
    fn parse_bindings(&mut self) -> Result<Vec<ast::Binding>> {
        let mut bindings = vec![self.parse_binding()?];
        loop {
            if self.is_next(Token::Comma)? {
                self.expect(Token::Comma)?;
            } else if !self.is_next(Token::Ident)? {
                break;
            }
            bindings.push(self.parse_binding()?);
        }
        Ok(bindings)
    }

    /// Parses a single `name=expr` binding.
    fn parse_binding(&mut self) -> Result<ast::Binding> {
        let name = self.parse_ident()?;
        self.expect(Token::Assign)?;
        let expr = self.parse_expr()?;
        Ok(ast::Binding { name, expr })
    }

    /// Parses an expression.
    ///
    /// This is the lowest precedence level, a chain of `or` operations.
    ///
    ///   user.is_admin or user.name == "root"
    ///
    fn parse_expr(&mut self) -> Result<ast::Expr> {
        let mut lhs = self.parse_and()?;
        while self.is_next_keyword(Keyword::Or)? {
            self.expect_keyword(Keyword::Or)?;
            let rhs = self.parse_and()?;
            lhs = ast::Expr::Logical(ast::Logical {
                op: ast::LogicalOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<ast::Expr> {
        let mut lhs = self.parse_not()?;
        while self.is_next_keyword(Keyword::And)? {
            self.expect_keyword(Keyword::And)?;
            let rhs = self.parse_not()?;
            lhs = ast::Expr::Logical(ast::Logical {
                op: ast::LogicalOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<ast::Expr> {
        if self.is_next_keyword(Keyword::Not)? {
            let span = self.expect_keyword(Keyword::Not)?;
            let expr = self.parse_not()?;
            let span = span.combine(expr.span());
            return Ok(ast::Expr::Not(ast::Not {
                expr: Box::new(expr),
                span,
            }));
        }
        self.parse_compare()
    }

    /// Parses an optional comparison between two filtered expressions.
    fn parse_compare(&mut self) -> Result<ast::Expr> {
        let lhs = self.parse_filtered()?;
        let op = match self.peek()? {
            Some((Token::Eq, _)) => ast::CompareOp::Eq,
            Some((Token::Ne, _)) => ast::CompareOp::Ne,
            Some((Token::Lt, _)) => ast::CompareOp::Lt,
            Some((Token::Gt, _)) => ast::CompareOp::Gt,
            Some((Token::Le, _)) => ast::CompareOp::Le,
            Some((Token::Ge, _)) => ast::CompareOp::Ge,
            _ => return Ok(lhs),
        };
        self.next()?;
        let rhs = self.parse_filtered()?;
        Ok(ast::Expr::Compare(ast::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }))
    }

    /// Parses a value with zero or more filters applied. For example:
    ///
    ///   user.name | lower | prepend: "Mr. "
    ///
    /// Filters are resolved against the engine here so that mistakes are
    /// reported when the template is compiled.
    fn parse_filtered(&mut self) -> Result<ast::Expr> {
        let mut expr = self.parse_primary()?;
        while self.is_next(Token::Pipe)? {
            self.expect(Token::Pipe)?;
            let name = self.parse_ident()?;
            let arg = if self.is_next(Token::Colon)? {
                self.expect(Token::Colon)?;
                Some(Box::new(self.parse_primary()?))
            } else {
                None
            };
            let span = match &arg {
                Some(arg) => expr.span().combine(arg.span()),
                None => expr.span().combine(name.span),
            };
            self.check_filter(name, arg.is_some(), span)?;
            expr = ast::Expr::Filter(ast::Filter {
                name,
                arg,
                receiver: Box::new(expr),
                span,
            });
        }
        Ok(expr)
    }

    fn check_filter(&self, name: ast::Ident, has_arg: bool, span: Span) -> Result<()> {
        let n = &self.source()[name.span];
        let filter = self.engine.filters.get(n).ok_or_else(|| {
            Error::syntax(format!("unknown filter `{n}`"), self.source(), name.span)
        })?;
        match (filter.arity, has_arg) {
            (Arity::None, true) => Err(Error::syntax(
                format!("filter `{n}` does not take an argument"),
                self.source(),
                span,
            )),
            (Arity::Required, false) => Err(Error::syntax(
                format!("filter `{n}` requires an argument"),
                self.source(),
                span,
            )),
            _ => Ok(()),
        }
    }

    /// Parses a literal, a variable, a call or a parenthesized expression.
    ///
    ///   users.2.name
    ///
    ///   "John Smith"
    ///
    ///   -150
    ///
    ///   format_date(post.date, "%Y")
    ///
    fn parse_primary(&mut self) -> Result<ast::Expr> {
        let expr = match self.parse()? {
            (Token::Keyword, span) => ast::Expr::Literal(self.parse_literal_bool(span)?),

            (Token::Minus, sign) => {
                let span = self.expect(Token::Number)?;
                let lit = self.parse_literal_integer(span, sign.combine(span), Sign::Neg)?;
                ast::Expr::Literal(lit)
            }

            (Token::Number, span) => {
                ast::Expr::Literal(self.parse_literal_integer(span, span, Sign::Pos)?)
            }

            (Token::String, span) => {
                let value = ast::Scalar::String(self.parse_string(span)?);
                ast::Expr::Literal(ast::Literal { value, span })
            }

            (Token::OpenParen, _) => {
                let expr = self.parse_expr()?;
                self.expect(Token::CloseParen)?;
                expr
            }

            (Token::Ident, span) => {
                let var = self.parse_var(span)?;
                if self.is_next(Token::OpenParen)? {
                    self.parse_invoke(var)?
                } else {
                    ast::Expr::Var(var)
                }
            }

            (tk, span) => {
                return Err(self.err_unexpected_token("expression", tk, span));
            }
        };
        Ok(expr)
    }

    /// Parses the arguments of a call.
    fn parse_invoke(&mut self, var: ast::Var) -> Result<ast::Expr> {
        self.expect(Token::OpenParen)?;
        let mut args = Vec::new();
        if !self.is_next(Token::CloseParen)? {
            loop {
                args.push(self.parse_expr()?);
                if !self.is_next(Token::Comma)? {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        let end = self.expect(Token::CloseParen)?;
        let span = var.span().combine(end);
        Ok(ast::Expr::Invoke(ast::Invoke { var, args, span }))
    }

    /// Parses a variable path.
    ///
    ///    user
    ///
    ///    user.names.0
    ///
    fn parse_var(&mut self, first: Span) -> Result<ast::Var> {
        let mut path = vec![ast::Key::Field(ast::Ident { span: first })];
        while self.is_next(Token::Dot)? {
            self.expect(Token::Dot)?;
            path.push(self.parse_key()?);
        }
        Ok(ast::Var { path })
    }

    /// Parses a path segment which is either an index or an identifier.
    fn parse_key(&mut self) -> Result<ast::Key> {
        match self.parse()? {
            (Token::Index, span) => {
                let value = self.source()[span].parse().map_err(|_| {
                    Error::syntax(
                        format!(
                            "base 10 literal out of range for unsigned {}-bit integer",
                            usize::BITS
                        ),
                        self.source(),
                        span,
                    )
                })?;
                Ok(ast::Key::Index(ast::Index { value, span }))
            }
            (Token::Ident, span) => Ok(ast::Key::Field(ast::Ident { span })),
            (tk, span) => Err(self.err_unexpected_token("identifier or index", tk, span)),
        }
    }

    /// Parses a boolean literal.
    fn parse_literal_bool(&mut self, span: Span) -> Result<ast::Literal> {
        let bool = match Keyword::from_str(&self.source()[span]) {
            Keyword::True => true,
            Keyword::False => false,
            kw => {
                return Err(self.err_unexpected_keyword(kw.human(), span));
            }
        };
        let value = ast::Scalar::Bool(bool);
        Ok(ast::Literal { value, span })
    }

    /// Parses a decimal integer.
    fn parse_literal_integer(&self, digits: Span, span: Span, sign: Sign) -> Result<ast::Literal> {
        let err = || {
            Error::syntax(
                "base 10 literal out of range for 64-bit integer",
                self.source(),
                span,
            )
        };
        let int = self.source()[digits]
            .bytes()
            .try_fold(0i64, |acc, d| {
                let x = i64::from(d - b'0');
                let value = acc.checked_mul(10)?;
                match sign {
                    Sign::Pos => value.checked_add(x),
                    Sign::Neg => value.checked_sub(x),
                }
            })
            .ok_or_else(err)?;
        let value = ast::Scalar::Integer(int);
        Ok(ast::Literal { value, span })
    }

    /// Parses a string and handles escape characters.
    fn parse_string(&self, span: Span) -> Result<String> {
        let raw = &self.source()[span];
        let inner = &raw[1..raw.len() - 1];
        if !inner.contains('\\') {
            return Ok(inner.to_owned());
        }
        let mut iter = inner.char_indices().map(|(i, c)| (span.start + 1 + i, c));
        let mut string = String::with_capacity(inner.len());
        while let Some((_, c)) = iter.next() {
            if c != '\\' {
                string.push(c);
                continue;
            }
            // The lexer guarantees a backslash is never the last character.
            let (i, esc) = match iter.next() {
                Some(next) => next,
                None => break,
            };
            let c = match esc {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                '\\' => '\\',
                '"' => '"',
                '\'' => '\'',
                _ => {
                    return Err(Error::syntax(
                        "unknown escape character",
                        self.source(),
                        i - 1..i + esc.len_utf8(),
                    ));
                }
            };
            string.push(c);
        }
        Ok(string)
    }

    /// Parses a tag name.
    fn parse_tag(&mut self) -> Result<(Tag, Span)> {
        let span = self.expect(Token::Ident)?;
        let name = &self.source()[span];
        match Tag::from_str(name) {
            Some(tag) => Ok((tag, span)),
            None => Err(Error::syntax(
                format!("unknown tag `{name}`"),
                self.source(),
                span,
            )),
        }
    }

    /// Expects the given keyword.
    fn expect_keyword(&mut self, exp: Keyword) -> Result<Span> {
        let span = self.expect(Token::Keyword)?;
        let kw = Keyword::from_str(&self.source()[span]);
        if kw != exp {
            let exp = exp.human();
            let kw = kw.human();
            return Err(Error::syntax(
                format!("expected keyword `{exp}`, found keyword `{kw}`"),
                self.source(),
                span,
            ));
        }
        Ok(span)
    }

    /// Expects an identifier with the given text, e.g. `in`.
    fn expect_word(&mut self, exp: &str) -> Result<Span> {
        match self.parse()? {
            (Token::Ident, span) if &self.source()[span] == exp => Ok(span),
            (tk, span) => Err(self.err_unexpected_token(format!("`{exp}`"), tk, span)),
        }
    }

    /// Consumes an identifier with the given text if it is next.
    fn eat_word(&mut self, exp: &str) -> Result<bool> {
        let found = matches!(
            self.peek()?,
            Some((Token::Ident, span)) if &self.source()[span] == exp
        );
        if found {
            self.next()?;
        }
        Ok(found)
    }

    /// Parses an identifier.
    fn parse_ident(&mut self) -> Result<ast::Ident> {
        let span = self.expect(Token::Ident)?;
        Ok(ast::Ident { span })
    }

    /// Parses any token.
    fn parse(&mut self) -> Result<(Token, Span)> {
        match self.next()? {
            Some((tk, sp)) => Ok((tk, sp)),
            None => Err(self.err_unexpected_eof("token")),
        }
    }

    /// Parses the specified token and returns its span.
    fn expect(&mut self, exp: Token) -> Result<Span> {
        match self.next()? {
            Some((tk, span)) if tk == exp => Ok(span),
            Some((tk, span)) => Err(self.err_unexpected_token(exp.human(), tk, span)),
            None => Err(self.err_unexpected_eof(exp.human())),
        }
    }

    /// Returns `true` if the next token is a keyword equal to the provided one.
    fn is_next_keyword(&mut self, exp: Keyword) -> Result<bool> {
        Ok(self
            .peek()?
            .map(|(tk, sp)| tk == Token::Keyword && Keyword::from_str(&self.source()[sp]) == exp)
            .unwrap_or(false))
    }

    /// Returns `true` if the next token is equal to the provided one.
    fn is_next(&mut self, token: Token) -> Result<bool> {
        Ok(self.peek()?.map(|(tk, _)| tk == token).unwrap_or(false))
    }

    /// Returns a copy of the next token without affecting the result of the
    /// following `.next()` call.
    fn peek(&mut self) -> Result<Option<(Token, Span)>> {
        match self.peeked {
            Some(peeked) => Ok(peeked),
            None => {
                let next = self.tokens.next()?;
                self.peeked = Some(next);
                Ok(next)
            }
        }
    }

    /// Returns the next token and span in the stream.
    fn next(&mut self) -> Result<Option<(Token, Span)>> {
        match self.peeked.take() {
            Some(v) => Ok(v),
            None => self.tokens.next(),
        }
    }

    fn source(&self) -> &'source str {
        self.tokens.source
    }

    fn err_unexpected_eof(&self, exp: impl Display) -> Error {
        let n = self.source().len();
        Error::syntax(format!("expected {exp}, found EOF"), self.source(), n..n)
    }

    fn err_unexpected_token(&self, exp: impl Display, got: Token, span: Span) -> Error {
        let got = got.human();
        Error::syntax(format!("expected {exp}, found {got}"), self.source(), span)
    }

    fn err_unexpected_keyword(&self, kw: impl Display, span: Span) -> Error {
        Error::syntax(format!("unexpected keyword `{kw}`"), self.source(), span)
    }

    fn err_unexpected_tag(&self, tag: &str, span: Span) -> Error {
        Error::syntax(format!("unexpected `{tag}` tag"), self.source(), span)
    }
}

impl Keyword {
    pub(crate) const fn all() -> &'static [&'static str] {
        &["not", "and", "or", "true", "false"]
    }

    const fn human(&self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::And => "and",
            Self::Or => "or",
            Self::True => "true",
            Self::False => "false",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "not" => Self::Not,
            "and" => Self::And,
            "or" => Self::Or,
            "true" => Self::True,
            "false" => Self::False,
            _ => unreachable!(),
        }
    }
}

impl Tag {
    fn from_str(s: &str) -> Option<Self> {
        let tag = match s {
            "if" => Self::If,
            "elif" => Self::Elif,
            "else" => Self::Else,
            "endif" => Self::EndIf,
            "for" => Self::For,
            "empty" => Self::Empty,
            "endfor" => Self::EndFor,
            "block" => Self::Block,
            "endblock" => Self::EndBlock,
            "extend" => Self::Extend,
            "include" => Self::Include,
            "with" => Self::With,
            "endwith" => Self::EndWith,
            "spaceless" => Self::Spaceless,
            "endspaceless" => Self::EndSpaceless,
            "cycle" => Self::Cycle,
            "create" => Self::Create,
            "recursetree" => Self::RecurseTree,
            "endrecursetree" => Self::EndRecurseTree,
            "markers" => Self::Markers,
            "endmarkers" => Self::EndMarkers,
            "msg" => Self::Msg,
            "endmsg" => Self::EndMsg,
            "set" => Self::Set,
            "range" => Self::Range,
            "endrange" => Self::EndRange,
            "tabbing" => Self::Tabbing,
            "endtabbing" => Self::EndTabbing,
            _ => return None,
        };
        Some(tag)
    }
}
