use std::fmt;

use wisp_lexer::LexError;
use wisp_parser::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    UnknownOperator(String),
    UnresolvedIdentifier(String),
    UnknownNode(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnknownOperator(op) => write!(f, "[CompileError] unknown operator: {}", op),
            CompileError::UnresolvedIdentifier(name) => write!(f, "[CompileError] undefined variable {}", name),
            CompileError::UnknownNode(what) => write!(f, "[CompileError] unknown node type: {}", what),
        }
    }
}

impl std::error::Error for CompileError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    UnknownOpcode(u8),
    UnsupportedTypes { left: &'static str, right: &'static str },
    UnsupportedUnary { op: &'static str, operand: &'static str },
    NotCallable(&'static str),
    WrongArgCount { want: usize, got: usize },
    UnhashableKey(&'static str),
    IndexUnsupported(&'static str),
    DivisionByZero,
    StackOverflow,
    FrameOverflow,
    StackUnderflow,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::UnknownOpcode(op) => write!(f, "[RuntimeError] unknown opcode: {}", op),
            VmError::UnsupportedTypes { left, right } => {
                write!(f, "[RuntimeError] unsupported types for binary operation {} and {}", left, right)
            }
            VmError::UnsupportedUnary { op, operand } => {
                write!(f, "[RuntimeError] unsupported type for {}: {}", op, operand)
            }
            VmError::NotCallable(tag) => write!(f, "[RuntimeError] calling non-function and non-built-in: {}", tag),
            VmError::WrongArgCount { want, got } => {
                write!(f, "[RuntimeError] wrong number of arguments: want={}, got={}", want, got)
            }
            VmError::UnhashableKey(tag) => write!(f, "[RuntimeError] unusable as hash key: {}", tag),
            VmError::IndexUnsupported(tag) => write!(f, "[RuntimeError] index operator not supported: {}", tag),
            VmError::DivisionByZero => write!(f, "[RuntimeError] division by zero"),
            VmError::StackOverflow => write!(f, "[RuntimeError] stack overflow"),
            VmError::FrameOverflow => write!(f, "[RuntimeError] frames overflow"),
            VmError::StackUnderflow => write!(f, "[RuntimeError] stack underflow"),
        }
    }
}

impl std::error::Error for VmError {}

/// Top-level failure for one-shot evaluation. Built-in-function failures are
/// not represented here: they surface in-band as a `Value::Error` on the stack.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    Lex(Vec<LexError>),
    Parse(Vec<ParseError>),
    Compile(CompileError),
    Runtime(VmError),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Lex(errs) => {
                writeln!(f, "lexer errors:")?;
                for e in errs {
                    writeln!(f, "  {}", e)?;
                }
                Ok(())
            }
            EvalError::Parse(errs) => {
                writeln!(f, "parser errors:")?;
                for e in errs {
                    writeln!(f, "  {}", e)?;
                }
                Ok(())
            }
            EvalError::Compile(e) => write!(f, "{}", e),
            EvalError::Runtime(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EvalError {}
