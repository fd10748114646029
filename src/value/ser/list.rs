use serde::ser::Serialize;

use crate::value::{TemplateList, TemplateStruct};
use crate::{to_value, Error, Result, Value};

#[derive(Default)]
pub struct SerializeList {
    list: Vec<Value>,
}

pub struct SerializeTupleVariant {
    name: &'static str,
    list: SerializeList,
}

impl SerializeList {
    pub fn with_capacity(len: usize) -> Self {
        Self {
            list: Vec::with_capacity(len),
        }
    }

    fn push<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.list.push(to_value(value)?);
        Ok(())
    }

    fn finish(self) -> Value {
        Value::from(TemplateList::from_vec(self.list))
    }
}

impl SerializeTupleVariant {
    pub fn new(name: &'static str, len: usize) -> Self {
        Self {
            name,
            list: SerializeList::with_capacity(len),
        }
    }
}

impl serde::ser::SerializeSeq for SerializeList {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Self::Ok> {
        Ok(self.finish())
    }
}

impl serde::ser::SerializeTuple for SerializeList {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Self::Ok> {
        Ok(self.finish())
    }
}

impl serde::ser::SerializeTupleStruct for SerializeList {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Self::Ok> {
        Ok(self.finish())
    }
}

impl serde::ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.list.push(value)
    }

    fn end(self) -> Result<Self::Ok> {
        let s = TemplateStruct::alloc();
        s.set(self.name, self.list.finish());
        Ok(Value::from(s))
    }
}
