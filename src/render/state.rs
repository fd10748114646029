use std::collections::HashMap;
use std::sync::Arc;

use crate::types::program::Template;
use crate::value::TemplateStruct;
use crate::{Frame, Value};

/// Mutable state that lives for a single render.
///
/// Compiled templates are shared and immutable so anything that changes while
/// rendering is kept here instead.
#[derive(Default)]
pub struct RenderState {
    /// The position of each `cycle` tag, keyed by template identity and the
    /// id assigned to the tag by the parser.
    cycles: HashMap<(usize, usize), usize>,

    /// Templates that extend the one being rendered, most derived first.
    pub chain: Vec<Arc<Template>>,

    /// The active `include`, `extend` and `create` tags, outermost first.
    pub frames: Vec<Frame>,

    /// Cleared while rendering the body of a `msg` tag.
    pub escaping: bool,

    /// How many `tabbing` tags are open.
    pub tabbing: usize,
}

impl RenderState {
    pub fn new() -> Self {
        Self {
            escaping: true,
            ..Self::default()
        }
    }

    /// Returns the item index for a `cycle` tag and advances it.
    pub fn next_cycle(&mut self, template: &Arc<Template>, id: usize, len: usize) -> usize {
        let key = (Arc::as_ptr(template) as usize, id);
        let pos = self.cycles.entry(key).or_insert(0);
        let i = *pos % len;
        *pos = (i + 1) % len;
        i
    }

    /// Returns the templates that define the named block, most derived first.
    ///
    /// The template currently being rendered always defines the block, it is
    /// the least derived definition.
    pub fn block_defs(&self, current: &Arc<Template>, name: &str) -> Vec<Arc<Template>> {
        let mut defs: Vec<_> = self
            .chain
            .iter()
            .filter(|t| t.block(name).is_some())
            .cloned()
            .collect();
        if !defs.iter().any(|t| Arc::ptr_eq(t, current)) {
            defs.push(current.clone());
        }
        defs
    }
}

/// Builds the `forloop` struct exposed to the body of `for` and `range`.
pub fn loop_vars(index: usize, len: usize, parent: Option<Value>) -> Value {
    let vars = TemplateStruct::alloc();
    vars.set("counter", index + 1);
    vars.set("counter0", index);
    vars.set("index", index);
    vars.set("revcounter", len - index);
    vars.set("revcounter0", len - index - 1);
    vars.set("first", index == 0);
    vars.set("last", index + 1 == len);
    vars.set("parentloop", parent.unwrap_or_default());
    Value::from(vars)
}
