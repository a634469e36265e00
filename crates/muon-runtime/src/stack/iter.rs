//! Frame and barrier iteration
//!
//! [`FrameIterator`] walks activations downward, threading across piece
//! boundaries invisibly; [`BarrierIterator`] walks the registered non-local
//! control transfer handlers, innermost first. Both are lazy, finite and
//! non-restartable.

use super::escape::BarrierState;
use super::frame::{Frame, FrameKind};
use super::Stack;

/// Walks the organic activations of a stack, newest first.
pub struct FrameIterator<'a> {
    stack: &'a Stack,
    current: Frame,
}

impl<'a> FrameIterator<'a> {
    /// Starts iterating at the given frame, which becomes the current frame.
    pub fn from_frame(stack: &'a Stack, frame: &Frame) -> FrameIterator<'a> {
        FrameIterator {
            stack,
            current: frame.clone(),
        }
    }

    /// The current frame. Well-defined until the first `advance` that
    /// returns false.
    pub fn current(&self) -> &Frame {
        &self.current
    }

    /// Advances to the next organic frame below the current one, decoding
    /// lids to cross piece boundaries. Synthetic bookkeeping frames are
    /// skipped transparently. Returns false when the stack bottom is
    /// reached, after which the iterator is exhausted.
    pub fn advance(&mut self) -> bool {
        loop {
            if self.current.kind() == FrameKind::StackBottom {
                return false;
            }
            self.current.walk_down(self.stack);
            if self.current.kind() == FrameKind::PieceBottom {
                // The bottom frame of a piece: resume from the real top
                // frame recorded under the previous piece's lid.
                let previous = self
                    .stack
                    .piece(self.current.piece)
                    .previous()
                    .expect("piece bottom frame without a previous piece");
                self.current = self.stack.read_lid(previous);
            } else if self.current.kind() == FrameKind::StackBottom {
                return false;
            }
            if self.current.kind() == FrameKind::Organic {
                return true;
            }
        }
    }
}

/// Walks the stack's registered barriers, innermost first.
pub struct BarrierIterator<'a> {
    stack: &'a Stack,
    remaining: usize,
}

impl<'a> BarrierIterator<'a> {
    pub fn new(stack: &'a Stack) -> BarrierIterator<'a> {
        BarrierIterator {
            stack,
            remaining: stack.barriers.len(),
        }
    }

    /// The next barrier going outward, or `None` when exhausted.
    pub fn advance(&mut self) -> Option<&'a BarrierState> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(&self.stack.barriers[self.remaining])
    }
}
