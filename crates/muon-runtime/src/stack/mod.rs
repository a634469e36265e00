//! Segmented heap stack
//!
//! A [`Stack`] owns an arena of fixed-capacity [`StackPiece`]s, newest on
//! top, and hands out transient [`Frame`] cursors for the interpreter to
//! execute through. Pieces are closed (suspended under a lid frame) whenever
//! execution leaves them: across growth boundaries, around collections, and
//! while diagnostics walk the stack.

mod backtrace;
mod escape;
mod frame;
mod iter;
mod piece;

pub use backtrace::{capture_backtrace, Backtrace, BacktraceEntry};
pub use escape::{BarrierState, Escape, RefractionPoint};
pub use frame::{Frame, FrameKind};
pub use iter::{BarrierIterator, FrameIterator};
pub use piece::{PieceId, StackPiece};

pub(crate) use frame::FRAME_HEADER_SIZE;

use std::sync::Arc;

use crate::roots::Roots;
use crate::value::{ArgMap, Condition, Value};

/// The smallest usable piece capacity: room for the stack bottom frame and
/// one slot of its headroom.
pub const MIN_PIECE_CAPACITY: usize = FRAME_HEADER_SIZE + 2;

/// A segmented, heap-resident call stack.
pub struct Stack {
    pieces: Vec<StackPiece>,
    top_piece: PieceId,
    default_piece_capacity: usize,
    slots_allocated: usize,
    slot_limit: usize,
    pub(crate) barriers: Vec<BarrierState>,
    roots: Arc<Roots>,
}

impl Stack {
    /// Creates a stack with the given default piece capacity and no memory
    /// limit. The stack starts out closed, bottomed by an artificial frame
    /// running the stack-bottom code block, so every open finds a
    /// well-defined place to return to.
    pub fn new(roots: Arc<Roots>, default_piece_capacity: usize) -> Result<Stack, Condition> {
        Stack::with_slot_limit(roots, default_piece_capacity, usize::MAX)
    }

    /// Creates a stack whose pieces may never total more than `slot_limit`
    /// slots. Exceeding the limit surfaces as a resource-exhaustion
    /// condition, modelling heap allocation failure.
    pub fn with_slot_limit(
        roots: Arc<Roots>,
        default_piece_capacity: usize,
        slot_limit: usize,
    ) -> Result<Stack, Condition> {
        assert!(
            default_piece_capacity >= MIN_PIECE_CAPACITY,
            "default piece capacity {default_piece_capacity} below minimum {MIN_PIECE_CAPACITY}"
        );
        let mut stack = Stack {
            pieces: Vec::new(),
            top_piece: PieceId(0),
            default_piece_capacity,
            slots_allocated: 0,
            slot_limit,
            barriers: Vec::new(),
            roots,
        };
        let piece = stack.allocate_piece(default_piece_capacity, None)?;
        stack.top_piece = piece;
        stack.push_stack_bottom_frame();
        Ok(stack)
    }

    /// The piece currently on top.
    pub fn top_piece(&self) -> PieceId {
        self.top_piece
    }

    pub fn default_piece_capacity(&self) -> usize {
        self.default_piece_capacity
    }

    /// Total slots currently allocated across all pieces.
    pub fn slots_allocated(&self) -> usize {
        self.slots_allocated
    }

    pub fn piece(&self, id: PieceId) -> &StackPiece {
        &self.pieces[id.0]
    }

    pub(crate) fn piece_mut(&mut self, id: PieceId) -> &mut StackPiece {
        &mut self.pieces[id.0]
    }

    /// Allocates a fresh piece, seeded with its empty sentinel frame and
    /// immediately closed so the first open finds well-formed header words.
    /// Fails without touching the arena when the slot limit is exceeded.
    fn allocate_piece(
        &mut self,
        user_capacity: usize,
        previous: Option<PieceId>,
    ) -> Result<PieceId, Condition> {
        let requested = user_capacity + FRAME_HEADER_SIZE;
        let remaining = self.slot_limit - self.slots_allocated;
        if requested > remaining {
            return Err(Condition::ResourceExhausted {
                requested,
                remaining,
            });
        }
        let id = PieceId(self.pieces.len());
        self.pieces.push(StackPiece::with_capacity(user_capacity, previous));
        self.slots_allocated += requested;
        let sentinel = Frame::sentinel(id);
        self.close(sentinel);
        Ok(id)
    }

    // Bottoms out the stack so all instructions, particularly returns, can
    // assume there is at least one frame below them.
    fn push_stack_bottom_frame(&mut self) {
        let code = Arc::clone(self.roots.stack_bottom_code());
        let mut bottom = self.open();
        let pushed = bottom.try_push(self, code.high_water_mark(), FrameKind::StackBottom, false);
        assert!(pushed, "pushing the stack bottom frame failed");
        bottom.set_code_block(self, Value::Code(code));
        self.close(bottom);
    }

    /// Opens the top piece and returns a cursor over its top frame.
    pub fn open(&mut self) -> Frame {
        self.open_piece(self.top_piece)
    }

    /// Closes the piece under the cursor, recording the cursor's full state
    /// in a lid frame. The cursor is consumed; it must be re-derived by
    /// opening the piece again.
    pub fn close(&mut self, mut frame: Frame) {
        self.close_cursor(&mut frame);
    }

    pub(crate) fn close_cursor(&mut self, frame: &mut Frame) {
        let piece_id = frame.piece;
        assert!(
            !self.piece(piece_id).is_closed(),
            "closing an already closed stack piece"
        );
        let pushed = frame.try_push(self, 0, FrameKind::Lid, true);
        assert!(pushed, "failed to push the lid frame");
        self.piece_mut(piece_id).close_at(frame.frame_pointer);
    }

    /// Opens a closed piece, re-deriving the cursor its lid recorded.
    /// Closing then opening is observably a no-op on the cursor.
    pub(crate) fn open_piece(&mut self, id: PieceId) -> Frame {
        let frame = self.read_lid(id);
        self.piece_mut(id).reopen();
        frame
    }

    /// Decodes the cursor recorded under a closed piece's lid without
    /// changing the piece's state. This is the one sanctioned read-only
    /// access to a closed piece; the frame iterator relies on it.
    pub(crate) fn read_lid(&self, id: PieceId) -> Frame {
        let lid_frame_pointer = self.piece(id).lid_frame_pointer();
        let mut frame = Frame {
            piece: id,
            stack_pointer: lid_frame_pointer,
            frame_pointer: lid_frame_pointer,
            limit_pointer: lid_frame_pointer,
            kind: FrameKind::Lid,
            pc: 0,
        };
        frame.walk_down(self);
        frame
    }

    /// Pushes an organic frame of the given capacity, growing the stack onto
    /// a new piece when the current top piece is full.
    ///
    /// The argument map determines how many pending argument values are
    /// physically copied across the boundary on growth. Growth is atomic:
    /// when allocation fails the stack is left exactly as it was.
    pub fn push_frame(
        &mut self,
        frame: &mut Frame,
        capacity: usize,
        arg_map: Arc<ArgMap>,
    ) -> Result<(), Condition> {
        assert!(
            !self.piece(self.top_piece).is_closed(),
            "pushing through a closed top piece"
        );
        if !frame.try_push(self, capacity, FrameKind::Organic, false) {
            // No room on the top piece; allocate a new piece that definitely
            // has room and carry the pending arguments across.
            let transfer_count = arg_map.len();
            let required_capacity = capacity // the new frame's locals
                + FRAME_HEADER_SIZE // the new frame's header
                + 1 // the synthetic bottom frame's one local
                + FRAME_HEADER_SIZE // the synthetic bottom frame's header
                + transfer_count; // the arguments copied onto the piece
            let new_capacity = required_capacity.max(self.default_piece_capacity);
            let old_top = self.top_piece;
            let new_piece = self.allocate_piece(new_capacity, Some(old_top))?;
            self.push_piece_bottom_frame(new_piece, &arg_map);
            self.transfer_top_arguments(new_piece, frame, transfer_count);
            self.top_piece = new_piece;
            // Suspend the old piece, recording the caller's state.
            self.close_cursor(frame);
            // The required_capacity arithmetic guarantees this second push
            // cannot fail.
            *frame = self.open_piece(new_piece);
            let pushed = frame.try_push(self, capacity, FrameKind::Organic, false);
            assert!(pushed, "pushing on the new stack piece failed");
        }
        frame.set_argument_map(self, Value::ArgMap(arg_map));
        Ok(())
    }

    // The transferred arguments will appear as if they were passed from the
    // piece bottom frame, so it is sized to hold them.
    fn push_piece_bottom_frame(&mut self, piece: PieceId, arg_map: &Arc<ArgMap>) {
        let code = Arc::clone(self.roots.piece_bottom_code());
        let mut bottom = self.open_piece(piece);
        let pushed = bottom.try_push(
            self,
            code.high_water_mark() + arg_map.len(),
            FrameKind::PieceBottom,
            false,
        );
        assert!(pushed, "pushing the piece bottom frame failed");
        bottom.set_code_block(self, Value::Code(code));
        bottom.set_argument_map(self, Value::ArgMap(Arc::clone(arg_map)));
        self.close_cursor(&mut bottom);
    }

    // Copies the pending arguments from the top of the old frame to the
    // bottom of the new piece, preserving their relative order.
    fn transfer_top_arguments(&mut self, new_piece: PieceId, frame: &Frame, count: usize) {
        let mut new_frame = self.open_piece(new_piece);
        for i in 0..count {
            let value = match frame.peek(self, count - i - 1) {
                Ok(value) => value,
                Err(cond) => panic!("pending argument missing during stack growth: {cond}"),
            };
            if let Err(cond) = new_frame.push(self, value) {
                panic!("argument transfer overflowed the new stack piece: {cond}");
            }
        }
        self.close_cursor(&mut new_frame);
    }

    /// Pops the frame under the cursor, staying within its piece.
    pub fn pop_frame(&self, frame: &mut Frame) {
        assert!(
            !self.piece(frame.piece).is_closed(),
            "popping a closed stack piece"
        );
        assert!(
            frame.kind() != FrameKind::PieceEmpty,
            "popping an empty stack piece"
        );
        frame.walk_down(self);
    }

    /// Pops frames until the cursor rests on a frame of the given kind,
    /// staying within its piece. Running out of frames before finding one is
    /// a protocol violation.
    pub fn drop_to_frame(&self, frame: &mut Frame, kind: FrameKind) {
        while frame.kind() != kind {
            assert!(
                frame.kind() != FrameKind::PieceEmpty,
                "no {kind:?} frame on this piece"
            );
            frame.walk_down(self);
        }
    }

    /// Drops the newest piece, restoring its predecessor as the top. Used
    /// when an escape abandons every activation on the piece.
    pub(crate) fn discard_top_piece(&mut self) -> PieceId {
        let top = self.top_piece;
        assert_eq!(top.0 + 1, self.pieces.len(), "top piece is not the newest");
        let previous = self
            .piece(top)
            .previous()
            .expect("discarding the oldest stack piece");
        self.slots_allocated -= self.piece(top).capacity();
        self.pieces.pop();
        self.top_piece = previous;
        previous
    }

    /// Checks the arena invariants: the previous chain from the top piece
    /// covers the whole arena in order, every suspended piece is closed, and
    /// the slot accounting matches. Panics on corruption.
    pub fn validate(&self) {
        assert_eq!(
            self.top_piece.0 + 1,
            self.pieces.len(),
            "top piece is not the newest piece"
        );
        let mut expected = self.top_piece.0 as isize;
        let mut current = Some(self.top_piece);
        while let Some(id) = current {
            assert_eq!(id.0 as isize, expected, "previous chain out of order");
            if id != self.top_piece {
                assert!(self.piece(id).is_closed(), "suspended piece left open");
            }
            expected -= 1;
            current = self.piece(id).previous();
        }
        assert_eq!(expected, -1, "previous chain does not reach the oldest piece");
        let total: usize = self.pieces.iter().map(|p| p.capacity()).sum();
        assert_eq!(total, self.slots_allocated, "slot accounting out of sync");
    }
}
