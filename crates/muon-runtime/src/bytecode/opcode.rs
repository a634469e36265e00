//! Opcode definitions
//!
//! Only the instruction shape the stack core needs: enough to recognize that
//! a frame's stored return address sits immediately after an invocation-class
//! instruction. The full instruction set belongs to the compiler crate.

/// Bytecode operation codes.
///
/// Stored as a single byte; invocation-class opcodes carry a u16 operand
/// naming a constant pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // ===== Stack shuffling (0x01-0x0F) =====
    /// Push constant from pool [u16 index]
    Constant = 0x01,
    /// Pop and discard the top value
    Pop = 0x02,

    // ===== Invocation (0x10-0x1F) =====
    /// Ordinary method invocation [u16 tags index]
    Invoke = 0x10,
    /// Raise a signal and escape the raising scope [u16 tags index]
    SignalEscape = 0x11,
    /// Raise a signal and continue at the raising scope [u16 tags index]
    SignalContinue = 0x12,
    /// Call a builtin that may escape; leaves its tag record on the stack
    BuiltinMaybeEscape = 0x13,
    /// Invoke an ensure-on-exit handler
    CallEnsurer = 0x14,

    // ===== Control (0x20-0x2F) =====
    /// Return to the calling frame
    Return = 0x20,
    /// Fire the escape on top of the stack
    FireEscape = 0x21,
    /// End execution on this stack
    Halt = 0x22,
}

impl Opcode {
    /// Does this instruction produce an activation a backtrace should report?
    pub fn is_invocation(self) -> bool {
        matches!(
            self,
            Opcode::Invoke
                | Opcode::SignalEscape
                | Opcode::SignalContinue
                | Opcode::BuiltinMaybeEscape
                | Opcode::CallEnsurer
        )
    }

    /// Does this instruction carry a call tag record in the constant pool?
    pub fn has_tags_operand(self) -> bool {
        matches!(
            self,
            Opcode::Invoke | Opcode::SignalEscape | Opcode::SignalContinue
        )
    }
}
