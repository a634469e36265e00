//! Escapes and barriers
//!
//! An escape is a captured jump target that abandons every activation above
//! it at once. Entering a non-local-exit construct registers a barrier on
//! the stack and hands out an [`Escape`] whose refraction point names the
//! capturing frame; normal exit from the construct is the only thing that
//! ever invalidates it. The barrier chain lives on the stack, not on any one
//! piece, because it must survive piece boundary crossings.

use std::cell::Cell;
use std::rc::Rc;

use crate::value::Value;

use super::frame::{Frame, FrameKind};
use super::piece::PieceId;
use super::Stack;

/// A captured (piece, frame pointer) pair from which a frame cursor can be
/// reconstructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefractionPoint {
    pub piece: PieceId,
    pub frame_pointer: usize,
}

type SectionCell = Rc<Cell<Option<RefractionPoint>>>;

/// A registered non-local control transfer handler.
#[derive(Debug)]
pub struct BarrierState {
    kind: BarrierKind,
}

#[derive(Debug)]
enum BarrierKind {
    Escape { section: SectionCell },
    Ensure { handler: Value },
}

impl BarrierState {
    /// Is this an escape barrier?
    pub fn is_escape(&self) -> bool {
        matches!(self.kind, BarrierKind::Escape { .. })
    }

    /// The ensure handler registered at this barrier, if any.
    pub fn ensure_handler(&self) -> Option<&Value> {
        match &self.kind {
            BarrierKind::Ensure { handler } => Some(handler),
            BarrierKind::Escape { .. } => None,
        }
    }

    fn guards_section(&self, section: &SectionCell) -> bool {
        match &self.kind {
            BarrierKind::Escape { section: own } => Rc::ptr_eq(own, section),
            BarrierKind::Ensure { .. } => false,
        }
    }

    // An abandoned scope's escape can never be a valid jump target again.
    fn invalidate(self) {
        if let BarrierKind::Escape { section } = self.kind {
            section.set(None);
        }
    }
}

/// A validity-tracked jump target out of many nested activations.
#[derive(Debug, Clone)]
pub struct Escape {
    section: SectionCell,
}

impl Escape {
    /// Is it still valid to fire this escape, that is, is execution still
    /// within the construct that produced it?
    pub fn is_live(&self) -> bool {
        self.section.get().is_some()
    }

    /// The refraction point this escape jumps to, while live.
    pub fn section(&self) -> Option<RefractionPoint> {
        self.section.get()
    }

    /// Fires the escape: abandons every activation above the refraction
    /// point and rewinds the cursor to the capturing frame, discarding
    /// newer pieces and the barriers the abandoned scopes registered.
    /// Escapes belonging to those discarded barriers are invalidated.
    ///
    /// Ensure handlers must have been walked and invoked by the interpreter
    /// before firing; this only discards state. Firing a dead escape is a
    /// protocol violation and panics.
    pub fn fire(&self, stack: &mut Stack, frame: &mut Frame) {
        let point = match self.section.get() {
            Some(point) => point,
            None => panic!("firing a dead escape"),
        };
        assert_eq!(
            frame.piece_id(),
            stack.top_piece(),
            "firing an escape through a cursor that is not over the top piece"
        );
        while let Some(top) = stack.barriers.last() {
            if top.guards_section(&self.section) {
                break;
            }
            if let Some(popped) = stack.barriers.pop() {
                popped.invalidate();
            }
        }
        while frame.piece_id() != point.piece {
            let previous = stack.discard_top_piece();
            *frame = stack.open_piece(previous);
        }
        while frame.frame_pointer() != point.frame_pointer {
            assert!(
                frame.kind() != FrameKind::StackBottom,
                "refraction point not found on the stack"
            );
            frame.walk_down(stack);
        }
    }
}

impl Stack {
    /// Registers an escape barrier capturing the given frame as the
    /// refraction point, and returns the escape that jumps to it.
    pub fn enter_escape(&mut self, frame: &Frame) -> Escape {
        let point = RefractionPoint {
            piece: frame.piece_id(),
            frame_pointer: frame.frame_pointer(),
        };
        let section: SectionCell = Rc::new(Cell::new(Some(point)));
        self.barriers.push(BarrierState {
            kind: BarrierKind::Escape {
                section: Rc::clone(&section),
            },
        });
        Escape { section }
    }

    /// Unregisters an escape on normal exit from its construct, invalidating
    /// it forever. Barriers pop in strict LIFO order; leaving an escape that
    /// is not the innermost barrier is a protocol violation.
    pub fn leave_escape(&mut self, escape: &Escape) {
        let top = self
            .barriers
            .pop()
            .expect("leaving an escape with no barriers registered");
        assert!(
            top.guards_section(&escape.section),
            "barrier discipline violated: the innermost barrier is not this escape"
        );
        escape.section.set(None);
    }

    /// Registers an ensure-on-exit handler.
    pub fn enter_ensure(&mut self, handler: Value) {
        self.barriers.push(BarrierState {
            kind: BarrierKind::Ensure { handler },
        });
    }

    /// Unregisters the innermost barrier, which must be an ensure handler,
    /// and returns it for the interpreter to invoke.
    pub fn leave_ensure(&mut self) -> Value {
        let top = self
            .barriers
            .pop()
            .expect("leaving an ensure scope with no barriers registered");
        match top.kind {
            BarrierKind::Ensure { handler } => handler,
            BarrierKind::Escape { .. } => {
                panic!("barrier discipline violated: the innermost barrier is not an ensure")
            }
        }
    }

    /// Number of registered barriers; mostly a diagnostic.
    pub fn barrier_count(&self) -> usize {
        self.barriers.len()
    }
}
