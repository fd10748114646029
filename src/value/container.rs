//! The struct and list capabilities through which host data is exposed to
//! templates, along with in-memory implementations of both.
//!
//! Handles are reference counted with [`Rc`]. Data behind a handle is dropped
//! as soon as the last [`Value`], context slot or container holding the handle
//! is dropped. Reference cycles are **never** collected: a struct holding a
//! list that holds the same struct keeps both alive forever. Container graphs
//! handed to the engine must therefore be acyclic.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::iter::FusedIterator;
use std::rc::Rc;

use crate::Value;

/// A shared handle to a struct.
pub type StructRef = Rc<dyn Struct>;

/// A shared handle to a list.
pub type ListRef = Rc<dyn List>;

/// Read-only access to named fields.
pub trait Struct {
    /// Returns the value of the field with the given name.
    ///
    /// Unknown fields return [`Value::default()`] (None), never an error.
    fn get(&self, name: &str) -> Value;

    /// Returns the names of all known fields.
    fn fields(&self) -> Vec<String>;
}

/// Read-only access to an ordered sequence of values.
pub trait List {
    /// Returns the number of elements.
    fn count(&self) -> usize;

    /// Returns the element at the given index.
    ///
    /// # Panics
    ///
    /// Implementations must panic if `index >= self.count()`. The renderer
    /// checks bounds before calling this, so an out of range access is a bug
    /// in the engine or the host.
    fn at(&self, index: usize) -> Value;
}

impl dyn List + '_ {
    /// Returns a bidirectional cursor positioned on the first element.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }

    /// Returns an iterator over the elements.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Cursor
////////////////////////////////////////////////////////////////////////////////

/// A bidirectional cursor over a [`List`].
///
/// The cursor can be moved past either end, in which case
/// [`current()`][Cursor::current] returns `None` until it is moved back with
/// [`to_first()`][Cursor::to_first] or [`to_last()`][Cursor::to_last].
pub struct Cursor<'a> {
    list: &'a dyn List,
    pos: Option<usize>,
}

impl<'a> Cursor<'a> {
    fn new(list: &'a dyn List) -> Self {
        let pos = (list.count() > 0).then_some(0);
        Self { list, pos }
    }

    pub fn to_first(&mut self) {
        self.pos = (self.list.count() > 0).then_some(0);
    }

    pub fn to_last(&mut self) {
        self.pos = self.list.count().checked_sub(1);
    }

    pub fn to_next(&mut self) {
        self.pos = self
            .pos
            .map(|i| i + 1)
            .filter(|&i| i < self.list.count());
    }

    pub fn to_prev(&mut self) {
        self.pos = self.pos.and_then(|i| i.checked_sub(1));
    }

    /// Returns the element under the cursor.
    pub fn current(&self) -> Option<Value> {
        self.pos.map(|i| self.list.at(i))
    }

    /// Returns the index of the element under the cursor.
    pub fn index(&self) -> Option<usize> {
        self.pos
    }
}

////////////////////////////////////////////////////////////////////////////////
// Iter
////////////////////////////////////////////////////////////////////////////////

/// An iterator over the elements of a [`List`].
pub struct Iter<'a> {
    list: &'a dyn List,
    front: usize,
    back: usize,
}

impl<'a> Iter<'a> {
    fn new(list: &'a dyn List) -> Self {
        Self {
            list,
            front: 0,
            back: list.count(),
        }
    }
}

impl Iterator for Iter<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            let v = self.list.at(self.front);
            self.front += 1;
            Some(v)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            self.back -= 1;
            Some(self.list.at(self.back))
        } else {
            None
        }
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

////////////////////////////////////////////////////////////////////////////////
// TemplateStruct
////////////////////////////////////////////////////////////////////////////////

/// An in-memory [`Struct`].
///
/// Fields are stored in name order and can be set through a shared handle.
#[derive(Default)]
pub struct TemplateStruct {
    fields: RefCell<BTreeMap<String, Value>>,
}

impl TemplateStruct {
    /// Allocates a new empty struct behind a shared handle.
    pub fn alloc() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Sets the value of a field, replacing any previous value.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.borrow_mut().insert(name.into(), value.into());
    }

    /// Removes a field, returning its previous value.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.fields.borrow_mut().remove(name)
    }
}

impl Struct for TemplateStruct {
    fn get(&self, name: &str) -> Value {
        self.fields.borrow().get(name).cloned().unwrap_or_default()
    }

    fn fields(&self) -> Vec<String> {
        self.fields.borrow().keys().cloned().collect()
    }
}

impl fmt::Debug for TemplateStruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.borrow().iter()).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// TemplateList
////////////////////////////////////////////////////////////////////////////////

/// An in-memory [`List`].
#[derive(Default)]
pub struct TemplateList {
    elems: RefCell<Vec<Value>>,
}

impl TemplateList {
    /// Allocates a new empty list behind a shared handle.
    pub fn alloc() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub(crate) fn from_vec(elems: Vec<Value>) -> Rc<Self> {
        Rc::new(Self {
            elems: RefCell::new(elems),
        })
    }

    /// Appends a value to the end of the list.
    pub fn append(&self, value: impl Into<Value>) {
        self.elems.borrow_mut().push(value.into());
    }
}

impl List for TemplateList {
    fn count(&self) -> usize {
        self.elems.borrow().len()
    }

    fn at(&self, index: usize) -> Value {
        let elems = self.elems.borrow();
        match elems.get(index) {
            Some(v) => v.clone(),
            None => panic!(
                "list index out of range: the len is {} but the index is {}",
                elems.len(),
                index
            ),
        }
    }
}

impl fmt::Debug for TemplateList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.elems.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_moves_both_ways() {
        let list = TemplateList::from_vec(vec![1.into(), 2.into(), 3.into()]);
        let list: &dyn List = &*list;
        let mut c = list.cursor();
        assert_eq!(c.current().map(|v| v.to_int()), Some(1));
        c.to_last();
        assert_eq!(c.current().map(|v| v.to_int()), Some(3));
        c.to_prev();
        assert_eq!(c.index(), Some(1));
        c.to_next();
        c.to_next();
        assert!(c.current().is_none());
        c.to_first();
        c.to_prev();
        assert!(c.current().is_none());
    }

    #[test]
    fn cursor_on_empty_list() {
        let list = TemplateList::alloc();
        let list: &dyn List = &*list;
        let mut c = list.cursor();
        assert!(c.current().is_none());
        c.to_last();
        assert!(c.current().is_none());
    }

    #[test]
    fn iter_double_ended() {
        let list = TemplateList::from_vec(vec![1.into(), 2.into(), 3.into()]);
        let list: &dyn List = &*list;
        let rev: Vec<_> = list.iter().rev().map(|v| v.to_int()).collect();
        assert_eq!(rev, [3, 2, 1]);
        assert_eq!(list.iter().len(), 3);
    }

    #[test]
    #[should_panic(expected = "list index out of range")]
    fn at_out_of_range_panics() {
        let list = TemplateList::alloc();
        list.at(0);
    }

    #[test]
    fn struct_unknown_field_is_none() {
        let s = TemplateStruct::alloc();
        s.set("a", 1);
        assert!(s.get("b").is_none());
        assert_eq!(s.fields(), ["a"]);
    }
}
