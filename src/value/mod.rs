//! Defines the [`Value`] type, representing any data a template can see.

mod container;
mod from;
#[cfg(feature = "serde")]
mod ser;

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

pub use crate::value::container::{
    Cursor, Iter, List, ListRef, Struct, StructRef, TemplateList, TemplateStruct,
};
#[cfg(feature = "serde")]
pub use crate::value::ser::to_value;

/// Data to be rendered.
///
/// A value is one of a closed set of [kinds][ValueKind] plus a *raw* flag. The
/// raw flag is orthogonal to the kind, it tells the renderer to write the
/// value as-is instead of passing it through the active escape policy.
///
/// Structs and lists are shared handles. Cloning a value clones the handle,
/// not the data behind it.
#[derive(Clone, Default)]
pub struct Value {
    kind: ValueKind,
    raw: bool,
}

/// The kind of data held by a [`Value`].
#[derive(Clone, Default)]
pub enum ValueKind {
    #[default]
    None,
    Bool(bool),
    Integer(i64),
    String(String),
    Struct(StructRef),
    List(ListRef),
    Callable(Callable),
}

/// A host supplied function that can be called from a template.
///
/// Callables found while resolving a path are invoked with no arguments,
/// `{{ f(a, b) }}` invokes them with arguments.
#[derive(Clone)]
pub struct Callable(Rc<dyn Fn(&[Value]) -> Value>);

impl Value {
    /// Construct a value from a kind.
    #[inline]
    pub fn new(kind: ValueKind) -> Self {
        Self { kind, raw: false }
    }

    /// Construct a string value that bypasses escaping.
    #[inline]
    pub fn raw_string(s: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::String(s.into()),
            raw: true,
        }
    }

    /// Construct a callable value.
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        Self::new(ValueKind::Callable(Callable(Rc::new(f))))
    }

    /// Returns the kind of data held by this value.
    #[inline]
    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    /// Consumes the value, returning its kind.
    #[inline]
    pub fn into_kind(self) -> ValueKind {
        self.kind
    }

    /// Whether this value is written without escaping.
    #[inline]
    pub fn raw(&self) -> bool {
        self.raw
    }

    /// Set whether this value is written without escaping.
    #[inline]
    pub fn set_raw(&mut self, raw: bool) {
        self.raw = raw;
    }

    /// Returns the value with the raw flag set.
    #[inline]
    pub fn into_raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Returns the value with the raw flag set to `raw`.
    #[inline]
    pub fn with_raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self.kind, ValueKind::None)
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self.kind, ValueKind::Bool(_))
    }

    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(self.kind, ValueKind::Integer(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self.kind, ValueKind::String(_))
    }

    #[inline]
    pub fn is_struct(&self) -> bool {
        matches!(self.kind, ValueKind::Struct(_))
    }

    #[inline]
    pub fn is_list(&self) -> bool {
        matches!(self.kind, ValueKind::List(_))
    }

    #[inline]
    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ValueKind::Callable(_))
    }

    /// Returns the struct handle if this value is a struct.
    pub fn as_struct(&self) -> Option<&StructRef> {
        match &self.kind {
            ValueKind::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the list handle if this value is a list.
    pub fn as_list(&self) -> Option<&ListRef> {
        match &self.kind {
            ValueKind::List(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the string slice if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    /// Coerce the value to a boolean.
    ///
    /// None is false, integers are true when non-zero, strings when non-empty
    /// and lists when they have at least one element. Structs and callables
    /// are always true.
    pub fn to_bool(&self) -> bool {
        match &self.kind {
            ValueKind::None => false,
            ValueKind::Bool(b) => *b,
            ValueKind::Integer(i) => *i != 0,
            ValueKind::String(s) => !s.is_empty(),
            ValueKind::Struct(_) => true,
            ValueKind::List(l) => l.count() > 0,
            ValueKind::Callable(_) => true,
        }
    }

    /// Coerce the value to an integer.
    ///
    /// Strings are parsed as decimal integers, anything that is not a number
    /// becomes `0`.
    pub fn to_int(&self) -> i64 {
        match &self.kind {
            ValueKind::Bool(b) => i64::from(*b),
            ValueKind::Integer(i) => *i,
            ValueKind::String(s) => s.trim().parse().unwrap_or(0),
            ValueKind::List(l) => l.count() as i64,
            _ => 0,
        }
    }

    /// Returns the integer held by this value, also accepting strings that
    /// contain a decimal integer.
    pub(crate) fn integer_like(&self) -> Option<i64> {
        match &self.kind {
            ValueKind::Integer(i) => Some(*i),
            ValueKind::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Invokes the value if it is a callable, otherwise returns None.
    pub fn call(&self, args: &[Value]) -> Value {
        match &self.kind {
            ValueKind::Callable(Callable(f)) => f(args),
            _ => Value::default(),
        }
    }

    /// Compares two values for ordering.
    ///
    /// Integers compare numerically, everything else compares by string
    /// representation. Returns `None` if either side is None.
    pub(crate) fn compare(&self, other: &Self) -> Option<Ordering> {
        match (&self.kind, &other.kind) {
            (ValueKind::None, _) | (_, ValueKind::None) => None,
            (ValueKind::Integer(a), ValueKind::Integer(b)) => Some(a.cmp(b)),
            _ => Some(self.to_string().cmp(&other.to_string())),
        }
    }

    /// Looks up a named field. Returns `None` if this value is not a struct.
    pub(crate) fn lookup_field(&self, name: &str) -> Option<Value> {
        match &self.kind {
            ValueKind::Struct(s) => Some(s.get(name)),
            _ => None,
        }
    }

    /// Looks up a list element, or a struct field named by the index.
    ///
    /// Returns `None` if the index is out of range or the value is neither a
    /// list nor a struct.
    pub(crate) fn lookup_index(&self, index: usize) -> Option<Value> {
        match &self.kind {
            ValueKind::List(l) if index < l.count() => Some(l.at(index)),
            ValueKind::Struct(s) => Some(s.get(&index.to_string())),
            _ => None,
        }
    }

    /// Invokes a callable with no arguments, any other value is returned as
    /// is.
    pub(crate) fn invoked(self) -> Value {
        match &self.kind {
            ValueKind::Callable(_) => self.call(&[]),
            _ => self,
        }
    }

    pub(crate) fn human(&self) -> &'static str {
        match &self.kind {
            ValueKind::None => "none",
            ValueKind::Bool(_) => "bool",
            ValueKind::Integer(_) => "integer",
            ValueKind::String(_) => "string",
            ValueKind::Struct(_) => "struct",
            ValueKind::List(_) => "list",
            ValueKind::Callable(_) => "callable",
        }
    }
}

impl PartialEq for Value {
    /// Values of the same kind compare structurally, structs and lists by
    /// handle identity. Values of different kinds compare their string
    /// representations. A None value is never equal to anything.
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (ValueKind::None, _) | (_, ValueKind::None) => false,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Integer(a), ValueKind::Integer(b)) => a == b,
            (ValueKind::Struct(a), ValueKind::Struct(b)) => Rc::ptr_eq(a, b),
            (ValueKind::List(a), ValueKind::List(b)) => Rc::ptr_eq(a, b),
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    /// Formats the value as it would be written by a template.
    ///
    /// Structs and lists produce a diagnostic representation.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::None | ValueKind::Callable(_) => Ok(()),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Integer(i) => write!(f, "{i}"),
            ValueKind::String(s) => f.write_str(s),
            ValueKind::Struct(s) => {
                f.write_str("{")?;
                for (i, name) in s.fields().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {}", s.get(name))?;
                }
                f.write_str("}")
            }
            ValueKind::List(l) => {
                f.write_str("[")?;
                for (i, item) in l.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw {
            f.write_str("Raw(")?;
        }
        match &self.kind {
            ValueKind::None => f.write_str("None")?,
            ValueKind::Bool(b) => write!(f, "Bool({b})")?,
            ValueKind::Integer(i) => write!(f, "Integer({i})")?,
            ValueKind::String(s) => write!(f, "String({s:?})")?,
            ValueKind::Struct(_) => write!(f, "Struct({self})")?,
            ValueKind::List(_) => write!(f, "List({self})")?,
            ValueKind::Callable(_) => f.write_str("Callable")?,
        }
        if self.raw {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callable")
    }
}
