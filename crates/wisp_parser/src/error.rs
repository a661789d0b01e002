use std::fmt;

use wisp_lexer::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnexpectedToken { expected: String, found: String, span: Span },
    NoPrefixParseFn { found: String, span: Span },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken { expected, found, span } => {
                write!(f, "line {}: expected {}, got {}", span.line, expected, found)
            }
            ParseError::NoPrefixParseFn { found, span } => {
                write!(f, "line {}: no prefix parse function for {}", span.line, found)
            }
        }
    }
}

impl std::error::Error for ParseError {}
