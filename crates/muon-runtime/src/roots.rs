//! Bootstrap roots
//!
//! The two well-known code objects every stack depends on: the block that
//! bottoms out a whole stack and the block a piece-bottom frame returns
//! through when execution crosses back to the previous piece.

use std::sync::Arc;

use crate::bytecode::{CodeBlock, Opcode};

/// The runtime's bootstrap code objects.
#[derive(Debug, Clone)]
pub struct Roots {
    stack_bottom_code: Arc<CodeBlock>,
    piece_bottom_code: Arc<CodeBlock>,
}

impl Roots {
    pub fn new() -> Roots {
        // Both blocks need one slot of headroom for the value flowing back
        // through them.
        let mut stack_bottom = CodeBlock::new(1);
        stack_bottom.emit(Opcode::Halt);
        let mut piece_bottom = CodeBlock::new(1);
        piece_bottom.emit(Opcode::Return);
        Roots {
            stack_bottom_code: Arc::new(stack_bottom),
            piece_bottom_code: Arc::new(piece_bottom),
        }
    }

    /// The code block executed by the bottom frame of every stack.
    pub fn stack_bottom_code(&self) -> &Arc<CodeBlock> {
        &self.stack_bottom_code
    }

    /// The code block executed by the synthetic bottom frame of every
    /// non-initial stack piece.
    pub fn piece_bottom_code(&self) -> &Arc<CodeBlock> {
        &self.piece_bottom_code
    }
}

impl Default for Roots {
    fn default() -> Roots {
        Roots::new()
    }
}
