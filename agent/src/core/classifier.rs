//! Deterministic classification of a parsed model turn.

use crate::core::blocks::{BlockKind, ResponseBlock};

/// What the controller should do with a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    /// No blocks at all (empty response). The turn is discarded.
    Empty,
    /// Only text blocks. The model is asked for code or a terminal block.
    TextOnly,
    /// At least one python/bash block. Terminal blocks in the turn are ignored.
    Code,
    /// Terminal block(s) and possibly text, but no code.
    TerminalOnly,
}

/// Classify a turn.
///
/// - `Code` if any block is python or bash, regardless of terminal blocks.
/// - `TerminalOnly` if there is no code and at least one terminal block.
/// - `TextOnly` if every block is text.
/// - `Empty` if there are no blocks.
pub fn classify_turn(blocks: &[ResponseBlock]) -> TurnKind {
    if blocks.is_empty() {
        return TurnKind::Empty;
    }
    if blocks.iter().any(|block| block.kind.is_code()) {
        return TurnKind::Code;
    }
    if blocks.iter().any(|block| block.kind == BlockKind::Terminal) {
        return TurnKind::TerminalOnly;
    }
    TurnKind::TextOnly
}
