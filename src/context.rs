//! The data a template is rendered with.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::Value;

/// An output format specific escaping policy, e.g. HTML entity escaping.
///
/// Policies are registered per file extension on a [`Context`] and selected
/// with [`Context::select_escape_policy`]. Every value written by
/// `{{ expr }}` passes through the active policy unless it is raw.
pub trait Escape {
    /// Escape the given text.
    fn escape(&mut self, text: &str) -> String;

    /// Switch tabbing mode on or off, see the `tabbing` tag.
    fn enable_tabbing(&mut self, _enable: bool) {}
}

/// A whitespace collapsing policy used by the `spaceless` tag.
pub trait Spaceless {
    /// Remove whitespace from the rendered body of a `spaceless` tag.
    fn remove(&mut self, text: &str) -> String;

    /// Reset any state kept between calls. Called before each `remove`.
    fn reset(&mut self) {}
}

/// A stack of variable scopes plus the output settings of a render.
///
/// Lookups search from the innermost scope outwards, [`set`][Context::set]
/// always writes into the innermost scope. The context starts with a single
/// global scope that can not be popped.
///
/// ```
/// let mut ctx = quill::Context::new();
/// ctx.set("name", "John");
/// ctx.push();
/// ctx.set("name", "Jane");
/// assert_eq!(ctx.get("name").to_string(), "Jane");
/// ctx.pop();
/// assert_eq!(ctx.get("name").to_string(), "John");
/// ```
pub struct Context {
    scopes: Vec<HashMap<String, Value>>,
    output_dir: Option<PathBuf>,
    escapes: HashMap<String, Box<dyn Escape>>,
    active_escape: Option<String>,
    spaceless: Option<Box<dyn Spaceless>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Construct a context holding an empty global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            output_dir: None,
            escapes: HashMap::new(),
            active_escape: None,
            spaceless: None,
        }
    }

    /// Construct a context whose global scope holds the fields of any
    /// serializable struct or map.
    #[cfg(feature = "serde")]
    pub fn from_serialize<S>(s: S) -> crate::Result<Self>
    where
        S: serde::Serialize,
    {
        let value = crate::to_value(s)?;
        let fields = match value.as_struct() {
            Some(fields) => fields,
            None => {
                return Err(crate::Error::render(format!(
                    "expected a struct or map for the context, found {}",
                    value.human()
                )))
            }
        };
        let mut ctx = Self::new();
        for name in fields.fields() {
            let v = fields.get(&name);
            ctx.set(name, v);
        }
        Ok(ctx)
    }

    /// Push a new innermost scope.
    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pop the innermost scope, dropping the values it holds.
    pub fn pop(&mut self) {
        debug_assert!(self.scopes.len() > 1, "attempted to pop the global scope");
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Bind a value in the innermost scope.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        // There is always at least the global scope.
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value.into());
        }
    }

    /// Look up a variable.
    ///
    /// A dotted name such as `user.roles.0` is resolved as a path. Unknown
    /// names resolve to the none value.
    pub fn get(&self, name: &str) -> Value {
        let mut segments = name.split('.');
        let first = segments.next().unwrap_or_default();
        let mut value = match self.get_ref(first) {
            Some(v) => v.clone().invoked(),
            None => return Value::default(),
        };
        for segment in segments {
            let next = match segment.parse::<usize>() {
                Ok(index) => value.lookup_index(index),
                Err(_) => value.lookup_field(segment),
            };
            value = match next {
                Some(v) => v.invoked(),
                None => return Value::default(),
            };
        }
        value
    }

    /// Borrow a variable from the innermost scope that defines it.
    pub fn get_ref(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Set the directory that `create` tags write into.
    pub fn set_output_directory(&mut self, dir: impl Into<PathBuf>) {
        self.output_dir = Some(dir.into());
    }

    /// Returns the directory that `create` tags write into.
    pub fn output_directory(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Register an escape policy for files with the given extension.
    pub fn set_escape_policy(&mut self, extension: &str, policy: Box<dyn Escape>) {
        self.escapes.insert(normalize_extension(extension), policy);
    }

    /// Make the policy registered for the extension the active one.
    ///
    /// Returns `false` and disables escaping if no policy is registered for
    /// the extension.
    pub fn select_escape_policy(&mut self, extension: &str) -> bool {
        let ext = normalize_extension(extension);
        if self.escapes.contains_key(&ext) {
            self.active_escape = Some(ext);
            true
        } else {
            self.active_escape = None;
            false
        }
    }

    /// Register the policy used by `spaceless` tags.
    pub fn set_spaceless_policy(&mut self, policy: Box<dyn Spaceless>) {
        self.spaceless = Some(policy);
    }

    pub(crate) fn active_escape_policy(&self) -> Option<String> {
        self.active_escape.clone()
    }

    pub(crate) fn restore_escape_policy(&mut self, ext: Option<String>) {
        self.active_escape = ext;
    }

    /// Escape text using the active policy.
    pub(crate) fn escape<'a>(&mut self, text: &'a str) -> Cow<'a, str> {
        match self.active_policy() {
            Some(policy) => Cow::Owned(policy.escape(text)),
            None => Cow::Borrowed(text),
        }
    }

    pub(crate) fn enable_tabbing(&mut self, enable: bool) {
        if let Some(policy) = self.active_policy() {
            policy.enable_tabbing(enable);
        }
    }

    /// Collapse whitespace using the registered policy, if any.
    pub(crate) fn remove_space(&mut self, text: String) -> String {
        match &mut self.spaceless {
            Some(policy) => {
                policy.reset();
                policy.remove(&text)
            }
            None => text,
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Drops scopes until `depth` remain. Used to recover after a failed
    /// render.
    pub(crate) fn unwind(&mut self, depth: usize) {
        self.scopes.truncate(depth.max(1));
    }

    fn active_policy(&mut self) -> Option<&mut Box<dyn Escape>> {
        let ext = self.active_escape.as_ref()?;
        self.escapes.get_mut(ext)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("scopes", &self.scopes)
            .field("output_dir", &self.output_dir)
            .field("escapes", &self.escapes.keys().collect::<Vec<_>>())
            .field("active_escape", &self.active_escape)
            .field("spaceless", &self.spaceless.is_some())
            .finish()
    }
}
