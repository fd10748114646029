//! Builtin filters.

use crate::value::{TemplateList, ValueKind};
use crate::Value;

/// Returns the argument if the value is falsy, otherwise the value.
pub fn default(v: &Value, arg: &Value) -> Value {
    match v.to_bool() {
        true => v.clone(),
        false => arg.clone(),
    }
}

/// Returns the number of elements in a list or characters in a string.
pub fn length(v: &Value) -> Value {
    match v.kind() {
        ValueKind::List(l) => Value::from(l.count()),
        ValueKind::String(s) => Value::from(s.chars().count()),
        _ => Value::default(),
    }
}

/// Adds two integers or concatenates two strings.
pub fn add(v: &Value, arg: &Value) -> Value {
    if v.is_none() {
        return arg.clone();
    }
    if let (Some(a), Some(b)) = (v.integer_like(), arg.integer_like()) {
        if let Some(sum) = a.checked_add(b) {
            return Value::from(sum);
        }
    }
    match (v.kind(), arg.kind()) {
        (ValueKind::String(a), ValueKind::String(b)) => Value::from(format!("{a}{b}")),
        _ => v.clone(),
    }
}

/// Returns whether an integer is evenly divisible by the argument.
pub fn divisibleby(v: &Value, arg: &Value) -> Value {
    match (v.kind(), arg.kind()) {
        (ValueKind::Integer(a), ValueKind::Integer(n)) if *n > 0 => Value::from(a % n == 0),
        _ => Value::from(false),
    }
}

/// Returns the part of a path after the last `/` or `\`.
pub fn strip_path(v: &Value) -> Value {
    match v.as_str() {
        Some(s) => match s.rfind(['/', '\\']) {
            Some(i) => Value::from(&s[i + 1..]),
            None => v.clone(),
        },
        None => v.clone(),
    }
}

/// Replaces spaces with no-break spaces.
pub fn nowrap(v: &Value) -> Value {
    match v.as_str() {
        Some(s) => Value::from(s.replace(' ', "\u{a0}")),
        None => v.clone(),
    }
}

/// Returns the argument followed by the value.
pub fn prepend(v: &Value, arg: &Value) -> Value {
    match concatenable(v) && concatenable(arg) {
        true => Value::from(format!("{arg}{v}")),
        false => v.clone(),
    }
}

/// Returns the value followed by the argument.
pub fn append(v: &Value, arg: &Value) -> Value {
    match concatenable(v) && concatenable(arg) {
        true => Value::from(format!("{v}{arg}")),
        false => v.clone(),
    }
}

fn concatenable(v: &Value) -> bool {
    v.is_string() || v.is_integer()
}

/// Marks the value so that it is written without escaping.
pub fn raw(v: &Value) -> Value {
    v.clone().into_raw()
}

pub fn upper(v: &Value) -> Value {
    match v.as_str() {
        Some(s) => Value::from(s.to_uppercase()),
        None => v.clone(),
    }
}

pub fn lower(v: &Value) -> Value {
    match v.as_str() {
        Some(s) => Value::from(s.to_lowercase()),
        None => v.clone(),
    }
}

/// Formats an integer as lowercase hexadecimal.
pub fn hex(v: &Value) -> Value {
    match v.kind() {
        ValueKind::Integer(i) => Value::from(format!("{i:x}")),
        _ => v.clone(),
    }
}

/// Returns the struct field named by the argument.
pub fn get(v: &Value, arg: &Value) -> Value {
    match v.as_struct() {
        Some(s) => s.get(&arg.to_string()),
        None => Value::default(),
    }
}

/// Returns a list unchanged, anything else wrapped in a single element list.
pub fn list(v: &Value) -> Value {
    match v.is_list() {
        true => v.clone(),
        false => Value::from(TemplateList::from_vec(vec![v.clone()])),
    }
}

pub fn is_absolute_url(v: &Value) -> Value {
    let abs = v.as_str().map_or(false, |s| {
        ["http:", "https:", "ftp:", "file:"]
            .iter()
            .any(|p| s.starts_with(p))
    });
    Value::from(abs)
}
