//! Muon execution core
//!
//! The segmented, heap-resident call stack that hosts the Muon VM's
//! activation frames:
//! - Fixed-capacity stack pieces chained into a relocatable segmented stack
//! - Transient frame cursors with an embedded caller-state header
//! - Non-local exits through validity-tracked escapes and barriers
//! - Backtrace capture from suspended frame state
//!
//! The heap object model, compiler and method dispatch live in their own
//! crates; this one only carries the interface types the stack must touch.

/// Muon runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod bytecode;
pub mod roots;
pub mod stack;
pub mod value;

// Re-export commonly used types
pub use bytecode::{CallSite, CallTags, CodeBlock, Opcode};
pub use roots::Roots;
pub use stack::{
    capture_backtrace, Backtrace, BacktraceEntry, BarrierIterator, BarrierState, Escape, Frame,
    FrameIterator, FrameKind, PieceId, RefractionPoint, Stack, StackPiece, MIN_PIECE_CAPACITY,
};
pub use value::{ArgMap, Condition, Value};
