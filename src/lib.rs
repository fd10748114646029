//! A Django style template engine.
//!
//! Templates are compiled into an immutable node tree and rendered against a
//! [`Context`], a stack of variable scopes. Host data is exposed through the
//! [`Struct`] and [`List`] capabilities, or converted from anything that
//! implements [`serde::Serialize`].
//!
//! # Features
//!
//! ### Syntax
//!
//! - Expressions: `{{ user.name }}`, `{{ user.roles.0 | upper }}`
//! - Conditionals: `{% if user.enabled and not user.banned %} ... {% endif %}`
//! - Loops: `{% for user in users %} ... {% empty %} ... {% endfor %}`
//! - Inheritance: `{% extend "base.html" %}`, `{% block body %}`
//! - Nested templates: `{% include "footer.html" with year=2024 %}`
//! - Output files: `{% create "index.html" from "page.html" %}`
//! - Comments: `{# ... #}`
//!
//! ### Engine
//!
//! - Templates loaded by name from a directory or registered in memory,
//!   cached per engine
//! - Builtin and host supplied filters, checked when a template is compiled
//! - Pluggable escape and whitespace policies
//! - Render to a [`String`] or any [`std::io::Write`] implementor
//!
//! # Getting started
//!
//! Your entry point is the [`Engine`] struct. The engine stores the template
//! directory, the filters and the compiled templates.
//!
//! ```
//! let mut engine = quill::Engine::new();
//! engine.add_template("hello", "Hello {{ user.name }}!")?;
//!
//! let mut ctx = quill::Context::new();
//! ctx.set("user", quill::value! { name: "John Smith" });
//!
//! let result = engine.load_by_name("hello", None)?.render(&mut ctx)?;
//! assert_eq!(result, "Hello John Smith!");
//! # Ok::<(), quill::Error>(())
//! ```
//!
//! A template that does not need to be stored can be compiled directly.
//!
//! ```
//! # let engine = quill::Engine::new();
//! let mut ctx = quill::Context::new();
//! ctx.set("items", vec![1, 2, 3]);
//!
//! let result = engine
//!     .compile("{% for i in items %}{{ i }}{% if not forloop.last %}, {% endif %}{% endfor %}")?
//!     .render(&mut ctx)?;
//! assert_eq!(result, "1, 2, 3");
//! # Ok::<(), quill::Error>(())
//! ```
//!
//! # Examples
//!
//! ### Render using structured data
//!
//! ```
//! #[derive(serde::Serialize)]
//! struct Data { user: User }
//!
//! #[derive(serde::Serialize)]
//! struct User { name: String }
//!
//! let data = Data { user: User { name: "John Smith".into() } };
//! let mut ctx = quill::Context::from_serialize(&data)?;
//!
//! let result = quill::Engine::new()
//!     .compile("Hello {{ user.name }}")?
//!     .render(&mut ctx)?;
//!
//! assert_eq!(result, "Hello John Smith");
//! # Ok::<(), quill::Error>(())
//! ```
//!
//! ### Add a custom filter
//!
//! ```
//! use quill::{Arity, Value};
//!
//! let mut engine = quill::Engine::new();
//! engine.add_filter("repeat", Arity::Required, |v, arg| {
//!     let n = arg.map(Value::to_int).unwrap_or(1).max(0) as usize;
//!     Value::from(v.to_string().repeat(n))
//! });
//!
//! let result = engine
//!     .compile("{{ 'ab' | repeat: 3 }}")?
//!     .render(&mut quill::Context::new())?;
//!
//! assert_eq!(result, "ababab");
//! # Ok::<(), quill::Error>(())
//! ```

mod compile;
mod context;
mod error;
mod filters;
mod loader;
mod macros;
mod render;
mod types;
mod value;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

pub use crate::context::{Context, Escape, Spaceless};
pub use crate::error::{Error, ErrorKind, Frame, Result};
pub use crate::filters::Arity;
#[cfg(feature = "serde")]
pub use crate::value::to_value;
pub use crate::value::{
    Cursor, Iter, List, ListRef, Struct, StructRef, TemplateList, TemplateStruct, Value, ValueKind,
};

use crate::filters::Registry;
use crate::loader::Cache;
use crate::types::program::Template;

/// The default maximum number of nested `include`, `extend` and `create`
/// tags.
const DEFAULT_MAX_INCLUDE_DEPTH: usize = 64;

/// The compilation and rendering engine.
///
/// An engine resolves template names, compiles templates and caches the
/// result. Engines are independent of each other, there is no global state.
///
/// # Threads
///
/// The compiled node tree is immutable and `Send + Sync`, but an engine is
/// neither: its cache uses a `RefCell` and host filters are not required to be
/// `Send`. Rendering happens on the thread that owns the engine, so a cached
/// template can not be rendered from two threads at once. Use one engine per
/// thread instead.
///
/// ```compile_fail
/// fn assert_sync<T: Sync>() {}
/// assert_sync::<quill::Engine>();
/// ```
pub struct Engine {
    template_dir: Option<PathBuf>,
    sources: BTreeMap<String, String>,
    pub(crate) filters: Registry,
    cache: Cache,
    pub(crate) max_include_depth: usize,
}

/// A handle to a compiled template.
///
/// Each handle to a cached template counts as one user of the cache entry,
/// dropping the handle releases it. See [`Engine::evict_unused`].
pub struct TemplateRef<'engine> {
    engine: &'engine Engine,
    template: Arc<Template>,
}

impl Default for Engine {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Construct a new engine with the builtin filters.
    pub fn new() -> Self {
        Self {
            template_dir: None,
            sources: BTreeMap::new(),
            filters: Registry::with_builtins(),
            cache: Cache::default(),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }

    /// Set the directory that templates are loaded from.
    ///
    /// Templates previously loaded from a directory are dropped from the
    /// cache.
    pub fn set_template_dir(&mut self, dir: impl Into<PathBuf>) {
        self.template_dir = Some(dir.into());
        self.cache.clear();
    }

    /// Returns the directory that templates are loaded from.
    #[inline]
    pub fn template_dir(&self) -> Option<&Path> {
        self.template_dir.as_deref()
    }

    /// Set the maximum number of nested `include`, `extend` and `create`
    /// tags.
    ///
    /// Defaults to 64.
    #[inline]
    pub fn set_max_include_depth(&mut self, depth: usize) {
        self.max_include_depth = depth;
    }

    /// Add a new filter to the engine, replacing any filter with the same
    /// name.
    ///
    /// The arity is checked when templates using the filter are compiled.
    pub fn add_filter<F>(&mut self, name: impl Into<String>, arity: Arity, f: F)
    where
        F: Fn(&Value, Option<&Value>) -> Value + 'static,
    {
        self.filters.insert(name, arity, f);
    }

    /// Add a template to the engine.
    ///
    /// The template is compiled immediately and stored under the normalized
    /// name. Templates added this way take priority over templates in the
    /// template directory.
    pub fn add_template(&mut self, name: &str, source: impl Into<String>) -> Result<()> {
        let name = loader::normalize(name);
        let source = source.into();
        let template = compile::template(self, Some(&name), source.clone())?;
        self.cache.insert(name.clone(), Arc::new(template), 0);
        self.sources.insert(name, source);
        Ok(())
    }

    /// Lookup a template by name, loading and compiling it if it is not
    /// cached.
    ///
    /// `from_line` is the line of the tag that refers to the template, if any,
    /// and is used to locate errors.
    pub fn load_by_name(&self, name: &str, from_line: Option<usize>) -> Result<TemplateRef<'_>> {
        let name = loader::normalize(name);
        if let Some(template) = self.cache.acquire(&name) {
            trace!("using cached template `{name}`");
            return Ok(TemplateRef {
                engine: self,
                template,
            });
        }

        let source = match self.sources.get(&name) {
            Some(source) => source.clone(),
            None => loader::read_source(self.template_dir(), &name).map_err(|err| match from_line {
                Some(line) => err.with_line(line),
                None => err,
            })?,
        };
        let template = Arc::new(compile::template(self, Some(&name), source)?);
        debug!("loaded template `{name}`");
        self.cache.insert(name, template.clone(), 1);
        Ok(TemplateRef {
            engine: self,
            template,
        })
    }

    /// Release a template handle.
    ///
    /// This is the same as dropping it.
    #[inline]
    pub fn unload(&self, template: TemplateRef<'_>) {
        drop(template);
    }

    /// Drop every cached template that has no handles, returning how many
    /// were dropped.
    ///
    /// Templates added with [`add_template`][Engine::add_template] are
    /// recompiled from their source the next time they are loaded.
    pub fn evict_unused(&self) -> usize {
        self.cache.evict_unused()
    }

    /// Returns whether a compiled template is cached under the name.
    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains(&loader::normalize(name))
    }

    /// Compile a template without storing it in the engine.
    pub fn compile(&self, source: impl Into<String>) -> Result<TemplateRef<'_>> {
        let template = compile::template(self, None, source.into())?;
        Ok(TemplateRef {
            engine: self,
            template: Arc::new(template),
        })
    }

    /// Forget a template added with [`add_template`][Engine::add_template].
    pub fn remove_template(&mut self, name: &str) {
        let name = loader::normalize(name);
        self.sources.remove(&name);
        self.cache.remove(&name);
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("template_dir", &self.template_dir)
            .field("templates", &self.sources.keys())
            .field("filters", &self.filters)
            .field("max_include_depth", &self.max_include_depth)
            .finish_non_exhaustive()
    }
}

impl<'engine> TemplateRef<'engine> {
    /// Render the template to a string.
    #[inline]
    pub fn render(&self, ctx: &mut Context) -> Result<String> {
        render::to_string(self.engine, &self.template, ctx)
    }

    /// Render the template to a writer.
    #[inline]
    pub fn render_to_writer<W>(&self, writer: W, ctx: &mut Context) -> Result<()>
    where
        W: io::Write,
    {
        render::to_writer(self.engine, &self.template, ctx, writer)
    }

    /// Render the template using any serializable struct or map as the
    /// global scope.
    #[cfg(feature = "serde")]
    pub fn render_from<S>(&self, data: S) -> Result<String>
    where
        S: serde::Serialize,
    {
        let mut ctx = Context::from_serialize(data)?;
        self.render(&mut ctx)
    }

    /// Returns the normalized name, `None` for templates compiled with
    /// [`Engine::compile`].
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.template.name.as_deref()
    }

    /// Returns the original template source.
    #[inline]
    pub fn source(&self) -> &str {
        &self.template.source
    }

    pub(crate) fn template(&self) -> &Arc<Template> {
        &self.template
    }
}

impl Clone for TemplateRef<'_> {
    fn clone(&self) -> Self {
        self.engine.cache.retain(&self.template);
        Self {
            engine: self.engine,
            template: self.template.clone(),
        }
    }
}

impl Drop for TemplateRef<'_> {
    fn drop(&mut self) {
        self.engine.cache.release(&self.template);
    }
}

impl fmt::Debug for TemplateRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRef")
            .field("name", &self.template.name)
            .finish_non_exhaustive()
    }
}
