//! Call tag records
//!
//! A call tag record is the compiler's description of one call site: for each
//! argument, the tag it was passed under and the offset of its slot counting
//! down from the stack pointer. Entries are kept sorted by tag so that both
//! method lookup and backtrace reconstruction can scan them in a canonical
//! order.

use std::cmp::Ordering;

use crate::value::Value;

/// A sorted tag-to-offset record for one call site.
#[derive(Debug, Clone, PartialEq)]
pub struct CallTags {
    entries: Vec<(Value, usize)>,
}

impl CallTags {
    /// Builds a record from `(tag, offset)` pairs, sorting by tag.
    pub fn new(mut entries: Vec<(Value, usize)>) -> CallTags {
        entries.sort_by(|a, b| tag_order(&a.0, &b.0));
        CallTags { entries }
    }

    /// Number of arguments at this call site.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is this a zero-argument call site?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The tag of the index'th entry.
    pub fn tag_at(&self, index: usize) -> &Value {
        &self.entries[index].0
    }

    /// The stack offset of the index'th entry, counting down from the stack
    /// pointer of the frame holding the pending arguments.
    pub fn offset_at(&self, index: usize) -> usize {
        self.entries[index].1
    }
}

// Canonical tag ordering: keys first (subject, selector), then positional
// integer tags, then named symbol tags.
fn tag_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Key(_) => 0,
            Value::Int(_) => 1,
            _ => 2,
        }
    }
    match (a, b) {
        (Value::Key(x), Value::Key(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Symbol(x), Value::Symbol(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
