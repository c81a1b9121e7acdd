// Copyright 2021 Adam Greig
// Licensed under the MIT license.

use thiserror::Error;

/// Error raised while reading, parsing, or executing a JAM program.
///
/// Every variant corresponds to one of the numeric status codes used by JAM
/// players, available through [`JamError::code`]. Code 0 means success and has
/// no variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum JamError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("file access error")]
    IoError,
    #[error("syntax error")]
    SyntaxError,
    #[error("unexpected end of file")]
    UnexpectedEnd,
    #[error("undefined symbol")]
    UndefinedSymbol,
    #[error("redefined symbol")]
    RedefinedSymbol,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("divide by zero")]
    DivideByZero,
    #[error("CRC mismatch")]
    CrcError,
    #[error("internal error")]
    InternalError,
    #[error("bounds error")]
    BoundsError,
    #[error("type mismatch")]
    TypeMismatch,
    #[error("assignment to constant object")]
    AssignToConst,
    #[error("NEXT statement unexpected")]
    NextUnexpected,
    #[error("POP statement unexpected")]
    PopUnexpected,
    #[error("RETURN statement unexpected")]
    ReturnUnexpected,
    #[error("illegal symbolic name")]
    IllegalSymbol,
    #[error("instruction or feature is not supported")]
    UnsupportedFeature,
}

impl JamError {
    const ALL: [JamError; 18] = [
        JamError::OutOfMemory, JamError::IoError, JamError::SyntaxError,
        JamError::UnexpectedEnd, JamError::UndefinedSymbol, JamError::RedefinedSymbol,
        JamError::IntegerOverflow, JamError::DivideByZero, JamError::CrcError,
        JamError::InternalError, JamError::BoundsError, JamError::TypeMismatch,
        JamError::AssignToConst, JamError::NextUnexpected, JamError::PopUnexpected,
        JamError::ReturnUnexpected, JamError::IllegalSymbol, JamError::UnsupportedFeature,
    ];

    /// Numeric status code for this error, from 1 to 18.
    pub fn code(&self) -> u8 {
        *self as u8 + 1
    }

    /// Map a numeric status code back to an error.
    ///
    /// Returns None for 0 (success) and for unknown codes.
    pub fn from_code(code: u8) -> Option<JamError> {
        match code {
            0 => None,
            c => Self::ALL.get(c as usize - 1).copied(),
        }
    }
}

/// Location of an execution error in the JAM source.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ErrLoc {
    /// Line number (starting from 1) of the statement which failed.
    pub line: usize,
}

impl std::fmt::Display for ErrLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "L{}", self.line)
    }
}

/// Error which terminated execution of a JAM program.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("{error} at {loc}")]
pub struct ExecError {
    /// Cause of the failure.
    pub error: JamError,
    /// Location of the failing statement.
    pub loc: ErrLoc,
}
