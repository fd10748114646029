//! AST representing a template.
//!
//! The tree is immutable once parsed and holds no reference counted values so
//! compiled templates can be shared between threads. Identifiers are stored as
//! spans into the template source.

use crate::types::span::Span;
use crate::Value;

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Template {
    pub scope: Scope,
    /// The named blocks defined anywhere in the template, indexed by
    /// [`BlockRef::id`].
    pub blocks: Vec<Block>,
    /// Whether the template contains an `extend` tag.
    pub extends: bool,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Scope {
    pub stmts: Vec<Stmt>,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub enum Stmt {
    Raw(Span),
    InlineExpr(InlineExpr),
    IfElse(IfElse),
    ForLoop(ForLoop),
    Block(BlockRef),
    Extend(Extend),
    Include(Include),
    With(With),
    Spaceless(Scope),
    Cycle(Cycle),
    Create(Create),
    RecurseTree(RecurseTree),
    Markers(Markers),
    Msg(Scope),
    Set(Binding),
    Range(RangeLoop),
    Tabbing(Scope),
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct InlineExpr {
    pub expr: Expr,
    pub span: Span,
}

/// An `if` statement with any number of `elif` clauses.
#[cfg_attr(internal_debug, derive(Debug))]
pub struct IfElse {
    pub branches: Vec<(Expr, Scope)>,
    pub else_branch: Option<Scope>,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct ForLoop {
    pub var: Ident,
    pub iterable: Expr,
    pub reversed: bool,
    pub body: Scope,
    pub empty: Option<Scope>,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Block {
    pub name: std::string::String,
    pub body: Scope,
    pub span: Span,
}

#[derive(Clone, Copy)]
#[cfg_attr(internal_debug, derive(Debug))]
pub struct BlockRef {
    pub id: usize,
    pub span: Span,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Extend {
    pub name: Expr,
    pub span: Span,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Include {
    pub name: Expr,
    pub bindings: Vec<Binding>,
    pub span: Span,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct With {
    pub bindings: Vec<Binding>,
    pub body: Scope,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Binding {
    pub name: Ident,
    pub expr: Expr,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Cycle {
    /// Identifies the cycle state of this tag within its template.
    pub id: usize,
    pub items: Vec<Expr>,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Create {
    pub target: Expr,
    pub template: Expr,
    pub span: Span,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct RecurseTree {
    pub expr: Expr,
    pub body: Scope,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Markers {
    pub var: Ident,
    pub list: Expr,
    pub pattern: Expr,
    pub body: Scope,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct RangeLoop {
    pub var: Ident,
    pub from: Expr,
    pub to: Expr,
    pub downto: bool,
    pub step: Option<Expr>,
    pub body: Scope,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub enum Expr {
    Literal(Literal),
    Var(Var),
    Invoke(Invoke),
    Filter(Filter),
    Not(Not),
    Logical(Logical),
    Compare(Compare),
}

/// A call with arguments, e.g. `user.greet("hi", name)`.
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Invoke {
    pub var: Var,
    pub args: Vec<Expr>,
    pub span: Span,
}

/// A filter applied to an expression, e.g. `name|default:"x"`.
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Filter {
    pub name: Ident,
    pub arg: Option<Box<Expr>>,
    pub receiver: Box<Expr>,
    pub span: Span,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Not {
    pub expr: Box<Expr>,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(internal_debug, derive(Debug))]
pub enum LogicalOp {
    And,
    Or,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Logical {
    pub op: LogicalOp,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(internal_debug, derive(Debug))]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Compare {
    pub op: CompareOp,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Var {
    pub path: Vec<Key>,
}

#[derive(Clone, Copy)]
#[cfg_attr(internal_debug, derive(Debug))]
pub enum Key {
    Index(Index),
    Field(Ident),
}

#[derive(Clone, Copy)]
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Index {
    pub value: usize,
    pub span: Span,
}

#[derive(Clone, Copy)]
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Ident {
    pub span: Span,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Literal {
    pub value: Scalar,
    pub span: Span,
}

/// A literal value. Kept separate from [`Value`] because values may hold
/// reference counted containers.
#[derive(Clone)]
#[cfg_attr(internal_debug, derive(Debug))]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    String(std::string::String),
}

impl Scope {
    pub const fn new() -> Self {
        Self { stmts: Vec::new() }
    }
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Self::Literal(lit) => lit.span,
            Self::Var(var) => var.span(),
            Self::Invoke(invoke) => invoke.span,
            Self::Filter(filter) => filter.span,
            Self::Not(not) => not.span,
            Self::Logical(logical) => logical.lhs.span().combine(logical.rhs.span()),
            Self::Compare(cmp) => cmp.lhs.span().combine(cmp.rhs.span()),
        }
    }
}

impl Var {
    pub fn span(&self) -> Span {
        self.first().span().combine(self.last().span())
    }

    pub fn first(&self) -> &Key {
        self.path.first().unwrap()
    }

    pub fn last(&self) -> &Key {
        self.path.last().unwrap()
    }

    pub fn rest(&self) -> &[Key] {
        &self.path[1..]
    }
}

impl Key {
    pub const fn span(&self) -> Span {
        match self {
            Key::Index(key) => key.span,
            Key::Field(key) => key.span,
        }
    }
}

impl Scalar {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Bool(b) => Value::from(*b),
            Self::Integer(i) => Value::from(*i),
            Self::String(s) => Value::from(s.as_str()),
        }
    }
}
