//! Activation frame cursors
//!
//! A [`Frame`] is a transient cursor over a contiguous sub-range of one
//! piece's storage. It is never heap-resident: the stack records everything
//! needed to re-derive a cursor, so frames are passed around by value and
//! discarded freely. Below each frame pointer sits a six-word header that
//! records the caller's state; pushing writes it, walking down reads it back.

use crate::value::{out_of_bounds, Condition, Value};

use super::piece::PieceId;
use super::Stack;

/// The number of words in a stack frame header.
pub(crate) const FRAME_HEADER_SIZE: usize = 6;

// Offsets down from the frame pointer to the header words.
mod header {
    pub(super) const PREVIOUS_FRAME_POINTER: usize = 0;
    pub(super) const PREVIOUS_LIMIT_POINTER: usize = 1;
    pub(super) const PREVIOUS_KIND: usize = 2;
    pub(super) const CODE_BLOCK: usize = 3;
    pub(super) const PREVIOUS_PC: usize = 4;
    pub(super) const ARGUMENT_MAP: usize = 5;
}

/// What kind of activation a frame is.
///
/// Exactly one kind applies to any frame; everything except `Organic` is
/// synthetic bookkeeping inserted by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A genuine activation produced by a method invocation.
    Organic,
    /// The bottom frame of a piece; returns to the previous piece.
    PieceBottom,
    /// The bottom frame of the whole stack; ends execution on it.
    StackBottom,
    /// The initial state of a piece that has no frames yet.
    PieceEmpty,
    /// The closing sentinel recording a suspended piece's state.
    Lid,
}

impl FrameKind {
    /// Was this frame inserted by the runtime rather than by an invocation?
    pub fn is_synthetic(self) -> bool {
        self != FrameKind::Organic
    }
}

/// A cursor over one activation frame.
///
/// All three pointers are slot offsets into the owning piece's storage, so a
/// cursor stays meaningful when the collector relocates the storage itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub(crate) piece: PieceId,
    pub(crate) stack_pointer: usize,
    pub(crate) frame_pointer: usize,
    pub(crate) limit_pointer: usize,
    pub(crate) kind: FrameKind,
    pub(crate) pc: usize,
}

impl Frame {
    /// The zero-size frame a freshly allocated piece starts out with.
    pub(crate) fn sentinel(piece: PieceId) -> Frame {
        Frame {
            piece,
            stack_pointer: 0,
            frame_pointer: 0,
            limit_pointer: 0,
            kind: FrameKind::PieceEmpty,
            pc: 0,
        }
    }

    /// The piece this cursor currently sits over.
    pub fn piece_id(&self) -> PieceId {
        self.piece
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn is_synthetic(&self) -> bool {
        self.kind.is_synthetic()
    }

    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer
    }

    pub fn frame_pointer(&self) -> usize {
        self.frame_pointer
    }

    pub fn limit_pointer(&self) -> usize {
        self.limit_pointer
    }

    /// The bytecode offset this frame is suspended at.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Records the bytecode offset to resume from; the interpreter keeps this
    /// current so pushed frames capture their return address.
    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    /// Tries to push a new frame of the given capacity on top of this one.
    ///
    /// The topmost header-sized region of the piece is held back unless the
    /// push is the lid itself, so that a lid frame can always be pushed when
    /// a condition forces the piece to close. Returns false without mutating
    /// anything when the candidate region does not fit; on success the cursor
    /// describes the new frame and its header records the caller's state.
    pub(crate) fn try_push(
        &mut self,
        stack: &mut Stack,
        capacity: usize,
        kind: FrameKind,
        is_lid: bool,
    ) -> bool {
        let piece = stack.piece(self.piece);
        assert!(!piece.is_closed(), "pushing onto a closed stack piece");
        let mut piece_limit = piece.capacity();
        if !is_lid {
            piece_limit -= FRAME_HEADER_SIZE;
        }
        let new_frame_pointer = self.stack_pointer + FRAME_HEADER_SIZE;
        let new_limit_pointer = new_frame_pointer + capacity;
        if new_limit_pointer > piece_limit {
            return false;
        }
        let previous = self.clone();
        self.stack_pointer = new_frame_pointer;
        self.frame_pointer = new_frame_pointer;
        self.limit_pointer = new_limit_pointer;
        self.kind = kind;
        self.pc = 0;
        self.write_header(
            stack,
            header::PREVIOUS_FRAME_POINTER,
            Value::Int(previous.frame_pointer as i64),
        );
        self.write_header(
            stack,
            header::PREVIOUS_LIMIT_POINTER,
            Value::Int(previous.limit_pointer as i64),
        );
        self.write_header(stack, header::PREVIOUS_KIND, Value::Kind(previous.kind));
        self.write_header(stack, header::CODE_BLOCK, Value::Nothing);
        self.write_header(stack, header::PREVIOUS_PC, Value::Int(previous.pc as i64));
        self.write_header(stack, header::ARGUMENT_MAP, Value::Nothing);
        true
    }

    /// Rewinds the cursor to the frame below by decoding this frame's header.
    ///
    /// Pure on the stack: only the cursor changes, so the same transformation
    /// serves ordinary returns, lid decoding and frame iteration. The new
    /// stack pointer lands immediately below where this frame's header lived.
    pub(crate) fn walk_down(&mut self, stack: &Stack) {
        let old_frame_pointer = self.frame_pointer;
        self.frame_pointer = self.header(stack, header::PREVIOUS_FRAME_POINTER).as_offset();
        self.limit_pointer = self.header(stack, header::PREVIOUS_LIMIT_POINTER).as_offset();
        self.kind = match self.header(stack, header::PREVIOUS_KIND) {
            Value::Kind(kind) => kind,
            other => panic!("corrupt frame header: expected a frame kind, found {other}"),
        };
        self.pc = self.header(stack, header::PREVIOUS_PC).as_offset();
        self.stack_pointer = old_frame_pointer
            .checked_sub(FRAME_HEADER_SIZE)
            .expect("walking below the bottom of a stack piece");
    }

    // --- Header words ---

    fn header_index(&self, offset: usize) -> usize {
        debug_assert!(offset < FRAME_HEADER_SIZE, "frame header word out of range");
        self.frame_pointer
            .checked_sub(offset + 1)
            .expect("frame header out of bounds")
    }

    fn header(&self, stack: &Stack, offset: usize) -> Value {
        stack.piece(self.piece).slot(self.header_index(offset)).clone()
    }

    fn write_header(&self, stack: &mut Stack, offset: usize, value: Value) {
        *stack.piece_mut(self.piece).slot_mut(self.header_index(offset)) = value;
    }

    /// The code object this frame is executing, or `Nothing`.
    pub fn code_block(&self, stack: &Stack) -> Value {
        self.header(stack, header::CODE_BLOCK)
    }

    /// Binds the code object this frame executes.
    pub fn set_code_block(&self, stack: &mut Stack, code: Value) {
        self.write_header(stack, header::CODE_BLOCK, code);
    }

    /// The parameter-to-slot map bound when this frame was pushed.
    pub fn argument_map(&self, stack: &Stack) -> Value {
        self.header(stack, header::ARGUMENT_MAP)
    }

    pub(crate) fn set_argument_map(&self, stack: &mut Stack, map: Value) {
        self.write_header(stack, header::ARGUMENT_MAP, map);
    }

    // --- Values ---

    /// Pushes a value onto this frame's region.
    pub fn push(&mut self, stack: &mut Stack, value: Value) -> Result<(), Condition> {
        if self.stack_pointer >= self.limit_pointer {
            return Err(out_of_bounds("push"));
        }
        assert!(!value.is_condition(), "pushing a condition value");
        *stack.piece_mut(self.piece).slot_mut(self.stack_pointer) = value;
        self.stack_pointer += 1;
        Ok(())
    }

    /// Pops the top value off this frame's region. Only the cursor moves;
    /// the slot contents stay behind until overwritten.
    pub fn pop(&mut self, stack: &Stack) -> Result<Value, Condition> {
        if self.stack_pointer <= self.frame_pointer {
            return Err(out_of_bounds("pop"));
        }
        self.stack_pointer -= 1;
        Ok(stack.piece(self.piece).slot(self.stack_pointer).clone())
    }

    /// Reads the index'th value counting down from the top of this frame.
    pub fn peek(&self, stack: &Stack, index: usize) -> Result<Value, Condition> {
        let depth = self.stack_pointer - self.frame_pointer;
        if index >= depth {
            return Err(out_of_bounds("peek"));
        }
        Ok(stack
            .piece(self.piece)
            .slot(self.stack_pointer - index - 1)
            .clone())
    }

    /// Reads the pending argument named by the index'th entry of a call tag
    /// record. The arguments are still sitting on this frame, about to be
    /// consumed by the call.
    pub fn pending_argument(
        &self,
        stack: &Stack,
        tags: &crate::bytecode::CallTags,
        index: usize,
    ) -> Result<Value, Condition> {
        self.peek(stack, tags.offset_at(index))
    }

    /// The value of the index'th declared parameter.
    pub fn argument(&self, stack: &Stack, param_index: usize) -> Value {
        let slot = self.argument_slot(stack, param_index);
        stack.piece(self.piece).slot(slot).clone()
    }

    /// Overwrites the index'th declared parameter.
    pub fn set_argument(&self, stack: &mut Stack, param_index: usize, value: Value) {
        let slot = self.argument_slot(stack, param_index);
        *stack.piece_mut(self.piece).slot_mut(slot) = value;
    }

    // Arguments live in the caller's region, immediately below this frame's
    // header; the bound argument map translates parameter index to offset.
    fn argument_slot(&self, stack: &Stack, param_index: usize) -> usize {
        let map = match self.argument_map(stack) {
            Value::ArgMap(map) => map,
            other => panic!("frame has no argument map, found {other}"),
        };
        let offset = map.offset(param_index);
        let below_header = self.frame_pointer - FRAME_HEADER_SIZE;
        below_header
            .checked_sub(offset + 1)
            .expect("argument slot out of frame bounds")
    }

    /// The value of the index'th local variable in this frame.
    pub fn local(&self, stack: &Stack, index: usize) -> Result<Value, Condition> {
        let location = self.frame_pointer + index;
        if location >= self.stack_pointer {
            return Err(out_of_bounds("local"));
        }
        Ok(stack.piece(self.piece).slot(location).clone())
    }
}
