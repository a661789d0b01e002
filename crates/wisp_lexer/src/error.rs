use std::fmt;

use crate::token::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    UnexpectedCharacter { ch: char, span: Span },
    UnterminatedString { span: Span },
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnexpectedCharacter { ch, span } => {
                write!(f, "line {}: unexpected character '{}'", span.line, ch)
            }
            LexError::UnterminatedString { span } => {
                write!(f, "line {}: unterminated string literal", span.line)
            }
        }
    }
}

impl std::error::Error for LexError {}
