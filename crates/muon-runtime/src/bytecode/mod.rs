//! Code objects
//!
//! Read-only bytecode plus constant pool, as produced by the compiler.
//! Instructions are encoded as an opcode byte followed by operands (u16,
//! big-endian). The stack core never re-decodes instructions: every
//! invocation-class emit also records a call-site descriptor keyed by the
//! return address, which is what backtrace capture consults.

mod call_tags;
mod opcode;

pub use call_tags::CallTags;
pub use opcode::Opcode;

use std::sync::Arc;

use crate::value::Value;

/// Describes one call site: the pc immediately after the instruction, the
/// invocation-class opcode, and the constant pool index of its tag record
/// when the record is baked into the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    return_pc: usize,
    opcode: Opcode,
    tags: Option<u16>,
}

impl CallSite {
    /// The invocation-class opcode at this site.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Constant pool index of the tag record, if the instruction carries one.
    pub fn tags_index(&self) -> Option<u16> {
        self.tags
    }
}

/// A compiled code object: instruction stream, constant pool, the maximum
/// stack height its execution can reach, and the call-site table.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    instructions: Vec<u8>,
    constants: Vec<Value>,
    high_water_mark: usize,
    call_sites: Vec<CallSite>,
}

impl CodeBlock {
    /// Create an empty code block with the given maximum stack height.
    pub fn new(high_water_mark: usize) -> CodeBlock {
        CodeBlock {
            instructions: Vec::new(),
            constants: Vec::new(),
            high_water_mark,
            call_sites: Vec::new(),
        }
    }

    /// The maximum number of stack slots execution of this block can use.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Raw instruction bytes.
    pub fn instructions(&self) -> &[u8] {
        &self.instructions
    }

    /// Current instruction offset (the pc a call emitted now would return to,
    /// once its operands are emitted).
    pub fn current_offset(&self) -> usize {
        self.instructions.len()
    }

    /// Read a constant pool entry.
    pub fn constant(&self, index: u16) -> &Value {
        &self.constants[index as usize]
    }

    /// Add a constant to the pool and return its index.
    pub fn add_constant(&mut self, value: Value) -> u16 {
        self.constants.push(value);
        (self.constants.len() - 1) as u16
    }

    /// Emit a bare opcode.
    pub fn emit(&mut self, opcode: Opcode) {
        assert!(
            !opcode.is_invocation(),
            "invocation opcodes must be emitted through their dedicated emitters"
        );
        self.instructions.push(opcode as u8);
    }

    /// Emit a u16 operand (big-endian).
    pub fn emit_u16(&mut self, value: u16) {
        self.instructions.push((value >> 8) as u8);
        self.instructions.push((value & 0xFF) as u8);
    }

    /// Emit an ordinary invocation against the given tag record.
    pub fn emit_invoke(&mut self, tags: Arc<CallTags>) {
        self.emit_tagged_invocation(Opcode::Invoke, tags);
    }

    /// Emit a signal instruction (`SignalEscape` or `SignalContinue`).
    pub fn emit_signal(&mut self, opcode: Opcode, tags: Arc<CallTags>) {
        assert!(
            opcode == Opcode::SignalEscape || opcode == Opcode::SignalContinue,
            "not a signal opcode: {opcode:?}"
        );
        self.emit_tagged_invocation(opcode, tags);
    }

    /// Emit a builtin call that may escape. The callee leaves its tag record
    /// on the stack by convention, so no pool operand is recorded.
    pub fn emit_builtin_maybe_escape(&mut self) {
        self.instructions.push(Opcode::BuiltinMaybeEscape as u8);
        self.record_call_site(Opcode::BuiltinMaybeEscape, None);
    }

    /// Emit an ensure-handler call. Ensure calls have no argument structure.
    pub fn emit_ensure_call(&mut self) {
        self.instructions.push(Opcode::CallEnsurer as u8);
        self.record_call_site(Opcode::CallEnsurer, None);
    }

    fn emit_tagged_invocation(&mut self, opcode: Opcode, tags: Arc<CallTags>) {
        let index = self.add_constant(Value::Tags(tags));
        self.instructions.push(opcode as u8);
        self.emit_u16(index);
        self.record_call_site(opcode, Some(index));
    }

    fn record_call_site(&mut self, opcode: Opcode, tags: Option<u16>) {
        self.call_sites.push(CallSite {
            return_pc: self.instructions.len(),
            opcode,
            tags,
        });
    }

    /// Look up the call site whose instruction ends exactly at `return_pc`.
    ///
    /// Returns `None` when the pc does not sit immediately after an
    /// invocation-class instruction; that is the expected answer for
    /// synthetic frames and for frames suspended mid-expression.
    pub fn call_site_at(&self, return_pc: usize) -> Option<CallSite> {
        self.call_sites
            .binary_search_by_key(&return_pc, |site| site.return_pc)
            .ok()
            .map(|i| self.call_sites[i])
    }
}
