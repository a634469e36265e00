//! Boxed value words and condition values
//!
//! Every slot in a stack piece holds exactly one [`Value`]: a tagged scalar,
//! a handle to a heap object, or a condition marker. Frame headers reuse the
//! same representation so that an entire stack piece stays a plain array of
//! words the collector can relocate.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::bytecode::{CallTags, CodeBlock};
use crate::stack::FrameKind;

/// A fixed-size boxed word.
///
/// Scalars are carried inline; heap objects are shared behind `Arc` so the
/// word itself stays fixed-width. `Kind` only ever appears inside frame
/// headers, never on the expression stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The absent value; also the initial contents of every stack slot.
    Nothing,
    /// Tagged integer scalar.
    Int(i64),
    /// Boolean scalar.
    Bool(bool),
    /// An argument tag key. Key 0 is the subject, key 1 the selector.
    Key(u32),
    /// An interned symbol (selector names, string tags).
    Symbol(Arc<str>),
    /// A compiled code object.
    Code(Arc<CodeBlock>),
    /// A compiler-produced call tag record.
    Tags(Arc<CallTags>),
    /// A parameter-to-slot argument map, bound into frame headers.
    ArgMap(Arc<ArgMap>),
    /// A frame kind, stored in frame headers when walking down.
    Kind(FrameKind),
    /// A non-local condition marker.
    Condition(Condition),
}

impl Value {
    /// Intern a symbol value.
    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Arc::from(name))
    }

    /// Is this the absent value?
    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Nothing)
    }

    /// Is this a condition marker?
    pub fn is_condition(&self) -> bool {
        matches!(self, Value::Condition(_))
    }

    /// Reads this value as a slot offset. Panics when the word is not an
    /// integer, which indicates header corruption.
    pub(crate) fn as_offset(&self) -> usize {
        match self {
            Value::Int(n) if *n >= 0 => *n as usize,
            other => panic!("expected an offset word, found {other}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => write!(f, "nothing"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Key(0) => write!(f, "%subject"),
            Value::Key(1) => write!(f, "%selector"),
            Value::Key(id) => write!(f, "%{id}"),
            Value::Symbol(name) => write!(f, "{name}"),
            Value::Code(_) => write!(f, "#<code block>"),
            Value::Tags(tags) => write!(f, "#<call tags {}>", tags.len()),
            Value::ArgMap(map) => write!(f, "#<argument map {}>", map.len()),
            Value::Kind(kind) => write!(f, "#<{kind:?} frame>"),
            Value::Condition(cond) => write!(f, "%<condition: {cond}>"),
        }
    }
}

/// Mapping from declared parameter index to argument slot offset.
///
/// Bound once into a frame's header when the frame is pushed; the offsets are
/// distances below the frame header, so they stay valid when arguments are
/// copied across a piece boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgMap {
    offsets: Vec<usize>,
}

impl ArgMap {
    /// An argument map for a call with no arguments.
    pub fn empty() -> Arc<ArgMap> {
        Arc::new(ArgMap { offsets: Vec::new() })
    }

    /// An argument map passing `count` arguments through in declaration
    /// order: the first argument is pushed first, so it sits deepest.
    pub fn direct(count: usize) -> Arc<ArgMap> {
        Arc::new(ArgMap {
            offsets: (0..count).map(|i| count - i - 1).collect(),
        })
    }

    /// Number of arguments transferred by this map.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Is this the empty map?
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The slot offset for the given parameter index.
    pub fn offset(&self, param_index: usize) -> usize {
        self.offsets[param_index]
    }
}

impl From<Vec<usize>> for ArgMap {
    fn from(offsets: Vec<usize>) -> ArgMap {
        ArgMap { offsets }
    }
}

/// A recoverable, non-exceptional failure value.
///
/// Conditions are threaded as explicit results through every call; the only
/// unwinding in the core is the escape protocol, which is a feature rather
/// than an error path. Protocol violations (mutating a closed piece, firing
/// a dead escape) panic instead, since they indicate VM corruption.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Condition {
    /// A push, pop or peek landed outside the current frame's region.
    #[error("{what} out of frame bounds")]
    OutOfBounds { what: &'static str },
    /// No memory for a new stack piece. The stack is left unmodified.
    #[error("stack memory exhausted: requested {requested} slots, {remaining} remaining")]
    ResourceExhausted { requested: usize, remaining: usize },
}

/// Builds a bounds condition. Under the `strict-checks` feature this aborts
/// immediately instead, since a bounds violation in a correct build signals
/// a compiler or runtime bug.
pub(crate) fn out_of_bounds(what: &'static str) -> Condition {
    let condition = Condition::OutOfBounds { what };
    #[cfg(feature = "strict-checks")]
    panic!("internal consistency failure: {condition}");
    #[cfg(not(feature = "strict-checks"))]
    condition
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_scalars() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Nothing.to_string(), "nothing");
        assert_eq!(Value::Key(0).to_string(), "%subject");
        assert_eq!(Value::symbol("print").to_string(), "print");
    }

    #[test]
    fn direct_arg_map_orders_first_argument_deepest() {
        let map = ArgMap::direct(3);
        assert_eq!(map.offset(0), 2);
        assert_eq!(map.offset(1), 1);
        assert_eq!(map.offset(2), 0);
    }

    #[test]
    fn condition_values_compare() {
        let a = Condition::OutOfBounds { what: "push" };
        let b = Condition::OutOfBounds { what: "push" };
        assert_eq!(a, b);
        assert!(Value::Condition(a).is_condition());
    }
}
