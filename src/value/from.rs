use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::value::{ListRef, StructRef, TemplateList, TemplateStruct, ValueKind};
use crate::Value;

impl From<ValueKind> for Value {
    fn from(kind: ValueKind) -> Self {
        Self::new(kind)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::new(ValueKind::Bool(b))
    }
}

macro_rules! impl_from_int {
    ($($ty:ty)+) => {
        $(
            impl From<$ty> for Value {
                fn from(i: $ty) -> Self {
                    Self::new(ValueKind::Integer(i64::from(i)))
                }
            }
        )+
    };
}

impl_from_int! { u8 u16 u32 i8 i16 i32 i64 }

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Self::new(ValueKind::Integer(i as i64))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::new(ValueKind::String(s))
    }
}

impl<'a> From<&'a str> for Value {
    fn from(s: &'a str) -> Self {
        Self::new(ValueKind::String(String::from(s)))
    }
}

impl<'a> From<Cow<'a, str>> for Value {
    fn from(s: Cow<'a, str>) -> Self {
        Self::new(ValueKind::String(s.into_owned()))
    }
}

impl From<StructRef> for Value {
    fn from(s: StructRef) -> Self {
        Self::new(ValueKind::Struct(s))
    }
}

impl From<ListRef> for Value {
    fn from(l: ListRef) -> Self {
        Self::new(ValueKind::List(l))
    }
}

impl From<Rc<TemplateStruct>> for Value {
    fn from(s: Rc<TemplateStruct>) -> Self {
        Self::new(ValueKind::Struct(s))
    }
}

impl From<Rc<TemplateList>> for Value {
    fn from(l: Rc<TemplateList>) -> Self {
        Self::new(ValueKind::List(l))
    }
}

impl<V> From<Vec<V>> for Value
where
    V: Into<Value>,
{
    fn from(list: Vec<V>) -> Self {
        TemplateList::from_vec(list.into_iter().map(Into::into).collect()).into()
    }
}

impl<V, const N: usize> From<[V; N]> for Value
where
    V: Into<Value>,
{
    fn from(list: [V; N]) -> Self {
        TemplateList::from_vec(list.into_iter().map(Into::into).collect()).into()
    }
}

impl<K, V> From<BTreeMap<K, V>> for Value
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from(map: BTreeMap<K, V>) -> Self {
        from_entries(map)
    }
}

impl<K, V> From<HashMap<K, V>> for Value
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from(map: HashMap<K, V>) -> Self {
        from_entries(map)
    }
}

impl<V> From<Option<V>> for Value
where
    V: Into<Value>,
{
    fn from(opt: Option<V>) -> Self {
        match opt {
            None => Self::default(),
            Some(value) => value.into(),
        }
    }
}

impl<V> FromIterator<V> for Value
where
    V: Into<Value>,
{
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = V>,
    {
        TemplateList::from_vec(iter.into_iter().map(Into::into).collect()).into()
    }
}

impl<K, V> FromIterator<(K, V)> for Value
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        from_entries(iter)
    }
}

fn from_entries<I, K, V>(iter: I) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let s = TemplateStruct::alloc();
    for (k, v) in iter {
        s.set(k, v);
    }
    s.into()
}
