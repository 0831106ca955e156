use thiserror::Error;

/// An internal failure of the parser.
///
/// Faults are distinct from document diagnostics: they mean the parser itself
/// could not make sense of its input, and callers are expected to stop
/// validating rather than report partial results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFault {
    /// The document produced more tokens than the configured cap.
    #[error("exceeded max token count of {limit}")]
    TokenLimitExceeded { limit: usize },

    /// The scanner found a special character at or before the previous one.
    #[error("scan did not advance past offset {offset}")]
    NonProgressingScan { offset: usize },

    /// The special-character scan matched a character the lexer cannot classify.
    #[error("unrecognised special character {ch:?} at offset {offset}")]
    UnrecognizedCharacter { ch: char, offset: usize },
}
