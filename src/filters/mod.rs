//! The filter registry.
//!
//! A filter transforms the value piped into it, optionally taking a single
//! argument, e.g. `{{ name|default:"anonymous" }}`. Filters are looked up
//! when a template is compiled so that unknown filters and wrong arity are
//! reported as syntax errors rather than silently rendering nothing.

mod builtins;

use std::collections::BTreeMap;
use std::fmt;

use crate::Value;

/// A filter function or closure.
///
/// The first argument is the piped value, the second is the argument given
/// after the colon, if any.
pub type FilterFn = dyn Fn(&Value, Option<&Value>) -> Value + 'static;

/// Whether a filter takes an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// The filter must be used without an argument, e.g. `{{ s|upper }}`.
    None,
    /// The filter may be used with or without an argument.
    Optional,
    /// The filter must be given an argument, e.g. `{{ s|default:"x" }}`.
    Required,
}

pub(crate) struct Filter {
    pub arity: Arity,
    f: Box<FilterFn>,
}

/// The set of filters known to an engine.
pub(crate) struct Registry {
    filters: BTreeMap<String, Filter>,
}

impl Filter {
    pub fn apply(&self, value: &Value, arg: Option<&Value>) -> Value {
        (self.f)(value, arg)
    }
}

impl Registry {
    /// Returns a registry containing the builtin filters.
    pub fn with_builtins() -> Self {
        let mut r = Self {
            filters: BTreeMap::new(),
        };
        r.binary("default", builtins::default);
        r.unary("length", builtins::length);
        r.binary("add", builtins::add);
        r.binary("divisibleby", builtins::divisibleby);
        r.unary("stripPath", builtins::strip_path);
        r.unary("nowrap", builtins::nowrap);
        r.binary("prepend", builtins::prepend);
        r.binary("append", builtins::append);
        r.unary("raw", builtins::raw);
        r.unary("upper", builtins::upper);
        r.unary("lower", builtins::lower);
        r.unary("hex", builtins::hex);
        r.binary("get", builtins::get);
        r.unary("list", builtins::list);
        r.unary("isAbsoluteURL", builtins::is_absolute_url);
        r
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, arity: Arity, f: F)
    where
        F: Fn(&Value, Option<&Value>) -> Value + 'static,
    {
        self.filters.insert(
            name.into(),
            Filter {
                arity,
                f: Box::new(f),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.filters.get(name)
    }

    fn unary(&mut self, name: &str, f: fn(&Value) -> Value) {
        self.insert(name, Arity::None, move |v, _| f(v));
    }

    fn binary(&mut self, name: &str, f: fn(&Value, &Value) -> Value) {
        // The parser guarantees the argument is present.
        self.insert(name, Arity::Required, move |v, arg| match arg {
            Some(arg) => f(v, arg),
            None => v.clone(),
        });
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.filters.keys()).finish()
    }
}
