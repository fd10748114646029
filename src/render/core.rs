use std::fmt::Write;
use std::fs;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::loader;
use crate::render::fmt::Formatter;
use crate::render::state::{loop_vars, RenderState};
use crate::types::ast;
use crate::types::program::Template;
use crate::types::span::Span;
use crate::value::{TemplateStruct, ValueKind};
use crate::{Context, Engine, Error, ErrorKind, Frame, Result, TemplateRef, Value};

/// Walks the node tree of a template and writes the output.
pub(crate) struct Renderer<'engine> {
    pub(crate) engine: &'engine Engine,
    state: RenderState,
}

impl<'engine> Renderer<'engine> {
    pub fn new(engine: &'engine Engine) -> Self {
        Self {
            engine,
            state: RenderState::new(),
        }
    }

    /// Renders a template.
    ///
    /// The context is left as it was found, even if rendering fails.
    pub fn render(
        mut self,
        f: &mut Formatter<'_>,
        t: &Arc<Template>,
        ctx: &mut Context,
    ) -> Result<()> {
        let depth = ctx.depth();
        let policy = ctx.active_escape_policy();
        let result = self.render_template(f, t, ctx);
        match &result {
            Ok(()) => debug_assert_eq!(ctx.depth(), depth, "unbalanced context scopes"),
            Err(_) => {
                ctx.unwind(depth);
                ctx.restore_escape_policy(policy);
            }
        }
        result
    }

    /// Renders a whole template.
    ///
    /// A template that extends another contributes only its blocks, so only
    /// its `extend` and `set` tags are evaluated.
    fn render_template(
        &mut self,
        f: &mut Formatter<'_>,
        t: &Arc<Template>,
        ctx: &mut Context,
    ) -> Result<()> {
        if !t.extends {
            return self.render_scope(f, t, ctx, &t.scope);
        }
        for stmt in &t.scope.stmts {
            match stmt {
                ast::Stmt::Extend(extend) => self.render_extend(f, t, ctx, extend)?,
                ast::Stmt::Set(binding) => self.render_set(t, ctx, binding),
                _ => {}
            }
        }
        Ok(())
    }

    fn render_scope(
        &mut self,
        f: &mut Formatter<'_>,
        t: &Arc<Template>,
        ctx: &mut Context,
        scope: &ast::Scope,
    ) -> Result<()> {
        for stmt in &scope.stmts {
            self.render_stmt(f, t, ctx, stmt)?;
        }
        Ok(())
    }

    /// Renders a scope into a new string.
    fn capture(
        &mut self,
        t: &Arc<Template>,
        ctx: &mut Context,
        scope: &ast::Scope,
    ) -> Result<String> {
        let mut buf = String::new();
        self.render_scope(&mut Formatter::with_string(&mut buf), t, ctx, scope)?;
        Ok(buf)
    }

    fn render_stmt(
        &mut self,
        f: &mut Formatter<'_>,
        t: &Arc<Template>,
        ctx: &mut Context,
        stmt: &ast::Stmt,
    ) -> Result<()> {
        match stmt {
            ast::Stmt::Raw(span) => {
                f.write_str(t.text(*span))?;
            }

            ast::Stmt::InlineExpr(ast::InlineExpr { expr, .. }) => {
                let value = self.eval(t, ctx, expr);
                f.write_value(ctx, &value, self.state.escaping)?;
            }

            ast::Stmt::IfElse(ast::IfElse {
                branches,
                else_branch,
            }) => {
                let branch = branches
                    .iter()
                    .find(|(cond, _)| self.eval(t, ctx, cond).to_bool())
                    .map(|(_, body)| body)
                    .or(else_branch.as_ref());
                if let Some(body) = branch {
                    self.render_scope(f, t, ctx, body)?;
                }
            }

            ast::Stmt::ForLoop(ast::ForLoop {
                var,
                iterable,
                reversed,
                body,
                empty,
            }) => {
                let mut items = elements(self.eval(t, ctx, iterable));
                if items.is_empty() {
                    if let Some(empty) = empty {
                        self.render_scope(f, t, ctx, empty)?;
                    }
                    return Ok(());
                }
                if *reversed {
                    items.reverse();
                }
                let name = t.text(var.span);
                let parent = ctx.get_ref("forloop").cloned();
                let len = items.len();
                for (i, item) in items.into_iter().enumerate() {
                    ctx.push();
                    ctx.set(name, item);
                    ctx.set("forloop", loop_vars(i, len, parent.clone()));
                    self.render_scope(f, t, ctx, body)?;
                    ctx.pop();
                }
            }

            ast::Stmt::Range(range) => self.render_range(f, t, ctx, range)?,

            ast::Stmt::Block(ast::BlockRef { id, .. }) => {
                let name = &t.blocks[*id].name;
                let defs = self.state.block_defs(t, name);
                self.render_block(f, &defs, name, ctx)?;
            }

            ast::Stmt::Extend(extend) => self.render_extend(f, t, ctx, extend)?,

            ast::Stmt::Include(ast::Include {
                name,
                bindings,
                span,
            }) => {
                let name = self.eval(t, ctx, name).to_string();
                let values: Vec<_> = bindings
                    .iter()
                    .map(|b| (t.text(b.name.span), self.eval(t, ctx, &b.expr)))
                    .collect();
                let included = self.load(t, &name, *span)?;

                self.push_frame(t, *span)?;
                let chain = mem::take(&mut self.state.chain);
                ctx.push();
                for (name, value) in values {
                    ctx.set(name, value);
                }
                self.render_template(f, included.template(), ctx)?;
                ctx.pop();
                self.state.chain = chain;
                self.state.frames.pop();
            }

            ast::Stmt::With(ast::With { bindings, body }) => {
                let values: Vec<_> = bindings
                    .iter()
                    .map(|b| (t.text(b.name.span), self.eval(t, ctx, &b.expr)))
                    .collect();
                ctx.push();
                for (name, value) in values {
                    ctx.set(name, value);
                }
                self.render_scope(f, t, ctx, body)?;
                ctx.pop();
            }

            ast::Stmt::Spaceless(body) => {
                let buf = self.capture(t, ctx, body)?;
                f.write_str(&ctx.remove_space(buf))?;
            }

            ast::Stmt::Cycle(ast::Cycle { id, items }) => {
                let i = self.state.next_cycle(t, *id, items.len());
                let value = self.eval(t, ctx, &items[i]);
                f.write_value(ctx, &value, self.state.escaping)?;
            }

            ast::Stmt::Create(create) => self.render_create(t, ctx, create)?,

            ast::Stmt::RecurseTree(ast::RecurseTree { expr, body }) => {
                let nodes = self.eval(t, ctx, expr);
                self.render_tree(f, t, ctx, nodes, body)?;
            }

            ast::Stmt::Markers(markers) => self.render_markers(f, t, ctx, markers)?,

            ast::Stmt::Msg(body) => {
                let escaping = mem::replace(&mut self.state.escaping, false);
                let result = self.capture(t, ctx, body);
                self.state.escaping = escaping;
                let msg = result?;
                info!(target: "quill::msg", "{msg}");
            }

            ast::Stmt::Set(binding) => self.render_set(t, ctx, binding),

            ast::Stmt::Tabbing(body) => {
                if self.state.tabbing == 0 {
                    ctx.enable_tabbing(true);
                }
                self.state.tabbing += 1;
                let result = self.render_scope(f, t, ctx, body);
                self.state.tabbing -= 1;
                if self.state.tabbing == 0 {
                    ctx.enable_tabbing(false);
                }
                result?;
            }
        }
        Ok(())
    }

    fn render_set(&self, t: &Template, ctx: &mut Context, binding: &ast::Binding) {
        let value = self.eval(t, ctx, &binding.expr);
        ctx.set(t.text(binding.name.span), value);
    }

    /// Renders the first of the given block definitions.
    ///
    /// Inside the body `block.super` holds the rendered output of the next
    /// definition.
    fn render_block(
        &mut self,
        f: &mut Formatter<'_>,
        defs: &[Arc<Template>],
        name: &str,
        ctx: &mut Context,
    ) -> Result<()> {
        let (t, rest) = match defs.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };
        let block = match t.block(name) {
            Some(block) => block,
            None => return Ok(()),
        };
        let parent = if rest.is_empty() {
            Value::default()
        } else {
            let mut buf = String::new();
            self.render_block(&mut Formatter::with_string(&mut buf), rest, name, ctx)?;
            Value::raw_string(buf)
        };
        let vars = TemplateStruct::alloc();
        vars.set("super", parent);

        ctx.push();
        ctx.set("block", vars);
        self.render_scope(f, t, ctx, &block.body)?;
        ctx.pop();
        Ok(())
    }

    /// Registers the template as the most derived level of the block chain
    /// and renders the template it extends.
    fn render_extend(
        &mut self,
        f: &mut Formatter<'_>,
        t: &Arc<Template>,
        ctx: &mut Context,
        extend: &ast::Extend,
    ) -> Result<()> {
        let name = self.eval(t, ctx, &extend.name).to_string();
        let base = self.load(t, &name, extend.span)?;

        self.push_frame(t, extend.span)?;
        self.state.chain.push(t.clone());
        self.render_template(f, base.template(), ctx)?;
        self.state.chain.pop();
        self.state.frames.pop();
        Ok(())
    }

    fn render_range(
        &mut self,
        f: &mut Formatter<'_>,
        t: &Arc<Template>,
        ctx: &mut Context,
        range: &ast::RangeLoop,
    ) -> Result<()> {
        let from = i128::from(self.eval(t, ctx, &range.from).to_int());
        let to = i128::from(self.eval(t, ctx, &range.to).to_int());
        let step = match &range.step {
            Some(step) => i128::from(self.eval(t, ctx, step).to_int()),
            None => 1,
        };
        if step <= 0 {
            return Ok(());
        }
        let distance = match range.downto {
            true => from - to,
            false => to - from,
        };
        if distance < 0 {
            return Ok(());
        }
        let len = usize::try_from(distance / step + 1).unwrap_or(usize::MAX);

        let name = t.text(range.var.span);
        let parent = ctx.get_ref("forloop").cloned();
        for i in 0..len {
            let offset = step * i as i128;
            let n = match range.downto {
                true => from - offset,
                false => from + offset,
            };
            ctx.push();
            // Both ends fit in an i64 so every value in between does too.
            ctx.set(name, n as i64);
            ctx.set("forloop", loop_vars(i, len, parent.clone()));
            self.render_scope(f, t, ctx, &range.body)?;
            ctx.pop();
        }
        Ok(())
    }

    /// Renders the body once per node, with `children` holding the output of
    /// the same body applied to the node's `children` field.
    fn render_tree(
        &mut self,
        f: &mut Formatter<'_>,
        t: &Arc<Template>,
        ctx: &mut Context,
        nodes: Value,
        body: &ast::Scope,
    ) -> Result<()> {
        for node in elements(nodes) {
            let children = node
                .lookup_field("children")
                .map(Value::invoked)
                .unwrap_or_default();
            let mut buf = String::new();
            self.render_tree(&mut Formatter::with_string(&mut buf), t, ctx, children, body)?;

            ctx.push();
            ctx.set("node", node);
            ctx.set("children", Value::raw_string(buf));
            self.render_scope(f, t, ctx, body)?;
            ctx.pop();
        }
        Ok(())
    }

    /// Writes the pattern, replacing each `@N` marker with the body rendered
    /// for the Nth element of the list.
    fn render_markers(
        &mut self,
        f: &mut Formatter<'_>,
        t: &Arc<Template>,
        ctx: &mut Context,
        markers: &ast::Markers,
    ) -> Result<()> {
        let items = elements(self.eval(t, ctx, &markers.list));
        let pattern = self.eval(t, ctx, &markers.pattern).to_string();
        let name = t.text(markers.var.span);

        let mut rest = pattern.as_str();
        while let Some(at) = rest.find('@') {
            let digits = rest[at + 1..]
                .bytes()
                .take_while(u8::is_ascii_digit)
                .count();
            if digits == 0 {
                f.write_str(&rest[..=at])?;
                rest = &rest[at + 1..];
                continue;
            }
            f.write_str(&rest[..at])?;
            let item = rest[at + 1..at + 1 + digits]
                .parse::<usize>()
                .ok()
                .and_then(|n| items.get(n));
            if let Some(item) = item {
                ctx.push();
                ctx.set(name, item.clone());
                self.render_scope(f, t, ctx, &markers.body)?;
                ctx.pop();
            }
            rest = &rest[at + 1 + digits..];
        }
        f.write_str(rest)?;
        Ok(())
    }

    /// Renders a template into a file under the output directory.
    fn render_create(
        &mut self,
        t: &Arc<Template>,
        ctx: &mut Context,
        create: &ast::Create,
    ) -> Result<()> {
        let target = self.eval(t, ctx, &create.target).to_string();
        let name = self.eval(t, ctx, &create.template).to_string();
        let path = match ctx.output_directory() {
            Some(dir) => dir.join(loader::normalize(&target)),
            None => {
                return Err(self.locate(
                    Error::render(format!("cannot create `{target}`, no output directory set")),
                    t,
                    create.span,
                ))
            }
        };
        let template = self.load(t, &name, create.span)?;

        self.push_frame(t, create.span)?;
        let chain = mem::take(&mut self.state.chain);
        let policy = ctx.active_escape_policy();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        ctx.select_escape_policy(ext);

        let mut buf = String::new();
        let mut out = Formatter::with_string(&mut buf);
        let result = self.render_template(&mut out, template.template(), ctx);
        ctx.restore_escape_policy(policy);
        result?;
        self.state.chain = chain;
        self.state.frames.pop();

        write_file(&path, &buf).map_err(|err| self.locate(err, t, create.span))?;
        debug!("created {}", path.display());
        Ok(())
    }

    /// Loads a template referenced by a tag.
    ///
    /// Errors in the loaded template itself are reported with the tag as the
    /// innermost frame of the chain.
    fn load(&self, t: &Template, name: &str, span: Span) -> Result<TemplateRef<'engine>> {
        let line = span.line(&t.source);
        self.engine
            .load_by_name(name, Some(line))
            .map_err(|err| match err.kind() {
                ErrorKind::Resolution => self.locate(err, t, span),
                _ => {
                    let mut chain = self.state.frames.clone();
                    chain.push(Frame {
                        name: t.display_name().to_owned(),
                        line,
                    });
                    err.with_chain(&chain)
                }
            })
    }

    fn push_frame(&mut self, t: &Template, span: Span) -> Result<()> {
        let max = self.engine.max_include_depth;
        if self.state.frames.len() >= max {
            return Err(self.locate(Error::max_include_depth(max), t, span));
        }
        self.state.frames.push(Frame {
            name: t.display_name().to_owned(),
            line: span.line(&t.source),
        });
        Ok(())
    }

    /// Attaches the location of a tag to an error raised while rendering it.
    fn locate(&self, err: Error, t: &Template, span: Span) -> Error {
        err.with_template_name(t.name.as_deref())
            .with_span(&t.source, span)
            .with_chain(&self.state.frames)
    }
}

/// Returns the values iterated over by `for`, `recursetree` and `markers`.
///
/// None iterates nothing, a list iterates its elements and any other value
/// iterates itself once.
fn elements(value: Value) -> Vec<Value> {
    match value.kind() {
        ValueKind::None => Vec::new(),
        ValueKind::List(list) => list.iter().collect(),
        _ => vec![value],
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| Error::io(err, parent))?;
    }
    fs::write(path, contents).map_err(|err| Error::io(err, path))
}
