use std::rc::Rc;

use serde::ser::{Error as _, Serialize};

use crate::value::{TemplateStruct, ValueKind};
use crate::{to_value, Error, Result, Value};

pub struct SerializeMap {
    map: Rc<TemplateStruct>,
    next_key: Option<String>,
}

pub struct SerializeStructVariant {
    name: &'static str,
    map: SerializeMap,
}

impl SerializeMap {
    pub fn new() -> Self {
        Self {
            map: TemplateStruct::alloc(),
            next_key: None,
        }
    }
}

impl SerializeStructVariant {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            map: SerializeMap::new(),
        }
    }
}

/// Map keys become struct field names so they must serialize to something
/// with a sensible string representation.
fn to_key<T>(key: &T) -> Result<String>
where
    T: ?Sized + Serialize,
{
    let key = to_value(key)?;
    match key.kind() {
        ValueKind::String(_) | ValueKind::Integer(_) | ValueKind::Bool(_) => Ok(key.to_string()),
        _ => Err(Error::custom("map key must be a string")),
    }
}

impl serde::ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T: ?Sized>(&mut self, key: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.next_key = Some(to_key(key)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| Error::custom("map value serialized before its key"))?;
        self.map.set(key, to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Self::Ok> {
        Ok(Value::from(self.map))
    }
}

impl serde::ser::SerializeStruct for SerializeMap {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.map.set(key, to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Self::Ok> {
        Ok(Value::from(self.map))
    }
}

impl serde::ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        serde::ser::SerializeStruct::serialize_field(&mut self.map, key, value)
    }

    fn end(self) -> Result<Self::Ok> {
        let s = TemplateStruct::alloc();
        s.set(self.name, Value::from(self.map.map));
        Ok(Value::from(s))
    }
}
