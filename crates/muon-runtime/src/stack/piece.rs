//! Stack pieces
//!
//! One fixed-capacity segment of a segmented stack. Pieces live in an arena
//! owned by the [`Stack`](super::Stack) and refer to each other by
//! [`PieceId`], never by pointer, so a relocating collection can move the
//! backing storage without invalidating frames.

use crate::value::Value;

use super::frame::FRAME_HEADER_SIZE;

/// Index of a piece inside its stack's arena. Newer pieces have higher ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceId(pub usize);

/// Open/closed state of a piece.
///
/// A closed piece records where its lid frame sits; nothing but
/// [`Stack::open_piece`](super::Stack) may act on a closed piece, except the
/// frame iterator's read-only lid decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PieceState {
    Open,
    Closed { lid_frame_pointer: usize },
}

/// One contiguous slot array of a segmented stack.
#[derive(Debug)]
pub struct StackPiece {
    storage: Box<[Value]>,
    previous: Option<PieceId>,
    state: PieceState,
}

impl StackPiece {
    /// Builds a piece with room for `user_capacity` slots plus the header
    /// headroom that guarantees a lid frame can always be pushed.
    pub(crate) fn with_capacity(user_capacity: usize, previous: Option<PieceId>) -> StackPiece {
        let full_capacity = user_capacity + FRAME_HEADER_SIZE;
        StackPiece {
            storage: vec![Value::Nothing; full_capacity].into_boxed_slice(),
            previous,
            state: PieceState::Open,
        }
    }

    /// Total slot capacity, including the lid headroom.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// The piece below this one, absent for the oldest piece.
    pub fn previous(&self) -> Option<PieceId> {
        self.previous
    }

    /// Is this piece closed?
    pub fn is_closed(&self) -> bool {
        matches!(self.state, PieceState::Closed { .. })
    }

    /// Frame pointer of the lid frame. Panics when the piece is open.
    pub(crate) fn lid_frame_pointer(&self) -> usize {
        match self.state {
            PieceState::Closed { lid_frame_pointer } => lid_frame_pointer,
            PieceState::Open => panic!("reading the lid of an open stack piece"),
        }
    }

    pub(crate) fn close_at(&mut self, lid_frame_pointer: usize) {
        assert!(!self.is_closed(), "closing an already closed stack piece");
        self.state = PieceState::Closed { lid_frame_pointer };
    }

    pub(crate) fn reopen(&mut self) {
        assert!(self.is_closed(), "opening an already open stack piece");
        self.state = PieceState::Open;
    }

    pub(crate) fn slot(&self, index: usize) -> &Value {
        &self.storage[index]
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Value {
        &mut self.storage[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_includes_lid_headroom() {
        let piece = StackPiece::with_capacity(8, None);
        assert_eq!(piece.capacity(), 8 + FRAME_HEADER_SIZE);
        assert!(!piece.is_closed());
        assert_eq!(piece.previous(), None);
    }

    #[test]
    fn slots_start_out_empty() {
        let piece = StackPiece::with_capacity(4, Some(PieceId(0)));
        for i in 0..piece.capacity() {
            assert!(piece.slot(i).is_nothing());
        }
    }

    #[test]
    #[should_panic(expected = "already closed")]
    fn double_close_is_a_protocol_violation() {
        let mut piece = StackPiece::with_capacity(4, None);
        piece.close_at(6);
        piece.close_at(6);
    }
}
