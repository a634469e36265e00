//! Backtrace capture
//!
//! A backtrace is an immutable snapshot of call-site information built by
//! walking frames and looking each frame's stored return address up in its
//! code object's call-site table. Frames whose pc does not sit immediately
//! after an invocation-class instruction contribute no entry; that is the
//! expected case for synthetic frames, not an error.

use std::fmt;
use std::sync::Arc;

use crate::bytecode::Opcode;
use crate::value::Value;

use super::frame::Frame;
use super::iter::FrameIterator;
use super::Stack;

/// An ordered, immutable sequence of call-site entries, innermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct Backtrace {
    entries: Vec<BacktraceEntry>,
}

impl Backtrace {
    pub fn entries(&self) -> &[BacktraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One reconstructed call site.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktraceEntry {
    // Tag-to-argument pairs in canonical tag order; absent for entries with
    // no argument structure, such as an ensure call.
    invocation: Option<Vec<(Value, Value)>>,
    opcode: Opcode,
}

impl BacktraceEntry {
    /// The invocation-class opcode that produced this entry.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// The reconstructed tag-to-argument mapping, if the call had one.
    pub fn invocation(&self) -> Option<&[(Value, Value)]> {
        self.invocation.as_deref()
    }

    /// Builds an entry from the given frame, or `None` when the frame's
    /// return address does not name an invocation.
    fn from_frame(stack: &Stack, frame: &Frame) -> Option<BacktraceEntry> {
        let code = match frame.code_block(stack) {
            Value::Code(code) => code,
            _ => return None,
        };
        let site = code.call_site_at(frame.pc())?;
        let opcode = site.opcode();
        if opcode == Opcode::CallEnsurer {
            return Some(BacktraceEntry {
                invocation: None,
                opcode,
            });
        }
        // Popping below only moves this cursor copy, never the stack.
        let mut frame = frame.clone();
        let tags = if opcode == Opcode::BuiltinMaybeEscape {
            // A builtin escape leaves its tag record on the stack by
            // convention.
            match frame.pop(stack) {
                Ok(Value::Tags(tags)) => tags,
                Ok(other) => panic!("builtin escape left {other} instead of its tag record"),
                Err(cond) => panic!("builtin escape left no tag record on the stack: {cond}"),
            }
        } else {
            let index = site
                .tags_index()
                .expect("invocation call site without a tag record");
            match code.constant(index) {
                Value::Tags(tags) => Arc::clone(tags),
                other => panic!("corrupt constant pool: expected call tags, found {other}"),
            }
        };
        let mut invocation = Vec::with_capacity(tags.len());
        for i in 0..tags.len() {
            let argument = match frame.pending_argument(stack, &tags, i) {
                Ok(value) => value,
                Err(cond) => panic!("pending argument unreachable while capturing a backtrace: {cond}"),
            };
            invocation.push((tags.tag_at(i).clone(), argument));
        }
        Some(BacktraceEntry {
            invocation: Some(invocation),
            opcode,
        })
    }
}

/// Captures a backtrace by walking frames from `top` to the stack bottom.
pub fn capture_backtrace(stack: &Stack, top: &Frame) -> Backtrace {
    let mut entries = Vec::new();
    let mut iter = FrameIterator::from_frame(stack, top);
    loop {
        if let Some(entry) = BacktraceEntry::from_frame(stack, iter.current()) {
            entries.push(entry);
        }
        if !iter.advance() {
            break;
        }
    }
    Backtrace { entries }
}

impl fmt::Display for Backtrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "--- backtrace ---")?;
        for entry in &self.entries {
            write!(f, "\n- {entry}")?;
        }
        Ok(())
    }
}

impl fmt::Display for BacktraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Entries without arguments get out of the way first.
        let invocation = match &self.invocation {
            None => return write!(f, "ensure"),
            Some(invocation) => invocation,
        };
        let mut subject = None;
        let mut selector = None;
        for (tag, value) in invocation {
            match tag {
                Value::Key(0) => subject = Some(value),
                Value::Key(1) => selector = Some(value),
                _ => {}
            }
        }
        match self.opcode {
            Opcode::SignalEscape | Opcode::BuiltinMaybeEscape => write!(f, "leave")?,
            Opcode::SignalContinue => write!(f, "signal")?,
            _ => {
                if let Some(subject) = subject {
                    write!(f, "{subject}")?;
                }
            }
        }
        if let Some(selector) = selector {
            write!(f, ".{selector}")?;
        }
        write!(f, "(")?;
        let mut first = true;
        for (tag, value) in invocation {
            match tag {
                Value::Key(_) => continue,
                Value::Int(_) => {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                tag => {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{tag}: {value}")?;
                }
            }
            first = false;
        }
        write!(f, ")")
    }
}
