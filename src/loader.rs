//! Template name resolution and the compiled template cache.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::types::program::Template;
use crate::{Error, Result};

/// Compiled templates by normalized name, along with how many
/// [`TemplateRef`][crate::TemplateRef]s currently use each one.
#[derive(Default)]
pub(crate) struct Cache {
    entries: RefCell<BTreeMap<String, Entry>>,
}

struct Entry {
    template: Arc<Template>,
    users: usize,
}

impl Cache {
    /// Returns a cached template, counting the caller as a user.
    pub fn acquire(&self, name: &str) -> Option<Arc<Template>> {
        let mut entries = self.entries.borrow_mut();
        let entry = entries.get_mut(name)?;
        entry.users += 1;
        Some(entry.template.clone())
    }

    /// Counts one more user of a template that is already held.
    pub fn retain(&self, template: &Arc<Template>) {
        self.with_entry(template, |entry| entry.users += 1);
    }

    /// Forgets one user of the template.
    ///
    /// Entries replaced since the template was handed out are left alone.
    pub fn release(&self, template: &Arc<Template>) {
        self.with_entry(template, |entry| {
            debug_assert!(entry.users > 0, "template released more often than acquired");
            entry.users = entry.users.saturating_sub(1);
        });
    }

    /// Stores a template under its name.
    pub fn insert(&self, name: String, template: Arc<Template>, users: usize) {
        self.entries
            .borrow_mut()
            .insert(name, Entry { template, users });
    }

    pub fn remove(&self, name: &str) {
        self.entries.borrow_mut().remove(name);
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Drops every entry that has no users, returning how many were dropped.
    pub fn evict_unused(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|name, entry| {
            let keep = entry.users > 0;
            if !keep {
                debug!("evicted template `{name}`");
            }
            keep
        });
        before - entries.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.borrow().contains_key(name)
    }

    fn with_entry<F>(&self, template: &Arc<Template>, f: F)
    where
        F: FnOnce(&mut Entry),
    {
        let name = match &template.name {
            Some(name) => name,
            None => return,
        };
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get_mut(name.as_str()) {
            if Arc::ptr_eq(&entry.template, template) {
                f(entry);
            }
        }
    }
}

/// Normalizes a template name.
///
/// Backslashes become forward slashes and `.` and `..` segments are resolved
/// lexically, so `a/./b/../c.html` and `a\c.html` name the same template.
/// A `..` that would leave the template directory is dropped.
pub(crate) fn normalize(name: &str) -> String {
    let name = name.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Reads the source of a template from the template directory.
pub(crate) fn read_source(dir: Option<&Path>, name: &str) -> Result<String> {
    let not_found = || Error::resolution(format!("template `{name}` not found"));
    let dir = match dir {
        Some(dir) if !name.is_empty() => dir,
        _ => return Err(not_found()),
    };
    let path = dir.join(name);
    match fs::read_to_string(&path) {
        Ok(source) => Ok(source),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(not_found()),
        Err(err) => Err(Error::io(err, &path)),
    }
}
