//! Expression evaluation.
//!
//! Evaluating an expression never fails. Missing variables, out of range
//! indexes and lookups on the wrong kind of value all produce the none value
//! and are reported at the `trace` level.

use std::cmp::Ordering;

use tracing::trace;

use crate::render::core::Renderer;
use crate::types::ast;
use crate::types::program::Template;
use crate::{Context, Value};

impl Renderer<'_> {
    pub(crate) fn eval(&self, t: &Template, ctx: &Context, expr: &ast::Expr) -> Value {
        match expr {
            ast::Expr::Literal(lit) => lit.value.to_value(),

            ast::Expr::Var(var) => self.resolve(t, ctx, var).invoked(),

            ast::Expr::Invoke(ast::Invoke { var, args, .. }) => {
                let f = self.resolve(t, ctx, var);
                if !f.is_callable() {
                    trace!("`{}` is not callable", t.text(var.span()));
                    return Value::default();
                }
                let args: Vec<_> = args.iter().map(|arg| self.eval(t, ctx, arg)).collect();
                f.call(&args)
            }

            ast::Expr::Filter(ast::Filter {
                name,
                arg,
                receiver,
                ..
            }) => {
                let value = self.eval(t, ctx, receiver);
                let arg = arg.as_ref().map(|arg| self.eval(t, ctx, arg));
                let name = t.text(name.span);
                match self.engine.filters.get(name) {
                    Some(filter) => filter.apply(&value, arg.as_ref()),
                    None => {
                        trace!("unknown filter `{name}`");
                        Value::default()
                    }
                }
            }

            ast::Expr::Not(ast::Not { expr, .. }) => Value::from(!self.eval(t, ctx, expr).to_bool()),

            ast::Expr::Logical(ast::Logical { op, lhs, rhs }) => {
                let lhs = self.eval(t, ctx, lhs).to_bool();
                let result = match op {
                    ast::LogicalOp::And => lhs && self.eval(t, ctx, rhs).to_bool(),
                    ast::LogicalOp::Or => lhs || self.eval(t, ctx, rhs).to_bool(),
                };
                Value::from(result)
            }

            ast::Expr::Compare(ast::Compare { op, lhs, rhs }) => {
                let lhs = self.eval(t, ctx, lhs);
                let rhs = self.eval(t, ctx, rhs);
                let ord = lhs.compare(&rhs);
                let result = match op {
                    ast::CompareOp::Eq => lhs == rhs,
                    ast::CompareOp::Ne => lhs != rhs,
                    ast::CompareOp::Lt => ord == Some(Ordering::Less),
                    ast::CompareOp::Gt => ord == Some(Ordering::Greater),
                    ast::CompareOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                    ast::CompareOp::Ge => {
                        matches!(ord, Some(Ordering::Greater | Ordering::Equal))
                    }
                };
                Value::from(result)
            }
        }
    }

    /// Resolves a path to a value.
    ///
    /// The first segment is looked up in the context, innermost scope first.
    /// Callables found along the way are invoked before descending into them,
    /// the final value is returned as is.
    fn resolve(&self, t: &Template, ctx: &Context, var: &ast::Var) -> Value {
        let first = t.text(var.first().span());
        let mut value = match ctx.get_ref(first) {
            Some(v) => v.clone(),
            None => {
                trace!("variable `{first}` not found");
                return Value::default();
            }
        };

        for key in var.rest() {
            let parent = value.invoked();
            let next = match key {
                ast::Key::Field(ident) => parent.lookup_field(t.text(ident.span)),
                ast::Key::Index(index) => parent.lookup_index(index.value),
            };
            value = match next {
                Some(v) => v,
                None => {
                    trace!(
                        "cannot look up `{}` in {}",
                        t.text(key.span()),
                        parent.human()
                    );
                    return Value::default();
                }
            };
        }

        value
    }
}
