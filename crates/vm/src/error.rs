//! Runtime errors for the Tern VM.
//!
//! Every error is terminal: the execution loop stops at the first one and
//! leaves the stacks as they were for inspection. Each variant carries the
//! [`Location`] of the failure.

use std::fmt;

use tern_common::{DecodeError, Opcode};
use thiserror::Error;

/// Where a runtime error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Frame index counted from the entry frame (0).
    pub frame: usize,
    /// Byte offset of the failing instruction in that frame's function.
    /// `None` before the frame fetched its first instruction.
    pub ip: Option<usize>,
    /// The failing opcode. `None` for failures outside dispatch, such as
    /// setting up the entry frame or decoding a bad byte.
    pub opcode: Option<Opcode>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}", self.frame)?;
        match (self.opcode, self.ip) {
            (Some(opcode), Some(ip)) => write!(f, ", {} at offset {ip}", opcode.mnemonic()),
            (None, Some(ip)) => write!(f, ", offset {ip}"),
            _ => write!(f, ", before first instruction"),
        }
    }
}

/// Which indexed space an out-of-range index referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Local,
    Free,
    Global,
    Builtin,
    Constant,
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Space::Local => "local",
            Space::Free => "free variable",
            Space::Global => "global",
            Space::Builtin => "builtin",
            Space::Constant => "constant",
        };
        f.write_str(name)
    }
}

/// Errors that abort execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// A call would push the frame stack past its configured depth.
    #[error("stack overflow: frame depth limit {limit} reached ({at})")]
    StackOverflow { at: Location, limit: usize },

    /// The call target is neither a closure nor a builtin.
    #[error("calling non-callable value of type {found} ({at})")]
    NotCallable { at: Location, found: &'static str },

    /// Argument count differs from the target's parameter count.
    #[error("wrong number of arguments: expected {expected}, got {got} ({at})")]
    ArityMismatch {
        at: Location,
        expected: usize,
        got: usize,
    },

    /// A local, free-variable, global, builtin or constant index is outside
    /// its declared bound. Indicates a compiler defect.
    #[error("{space} index {index} out of range (bound {bound}) ({at})")]
    IndexOutOfRange {
        at: Location,
        space: Space,
        index: usize,
        bound: usize,
    },

    /// Frame or operand stack bookkeeping is inconsistent.
    #[error("operand stack corruption: {reason} ({at})")]
    OperandStackCorruption { at: Location, reason: &'static str },

    /// The operand stack would grow past its capacity.
    #[error("operand stack overflow: capacity {capacity} exceeded ({at})")]
    OperandStackOverflow { at: Location, capacity: usize },

    /// The bytes at the instruction pointer do not decode.
    #[error("malformed instruction: {source} ({at})")]
    Decode { at: Location, source: DecodeError },

    /// A jump targets an offset past the end of the function.
    #[error("jump target {target} out of range (length {len}) ({at})")]
    JumpOutOfRange {
        at: Location,
        target: usize,
        len: usize,
    },

    /// CLOSURE names a constant that is not a compiled function.
    #[error("constant of type {found} is not a function ({at})")]
    NotAFunction { at: Location, found: &'static str },

    /// CLOSURE's free count differs from the function's recorded count.
    #[error("closure captures {got} values, function declares {expected} ({at})")]
    CaptureCountMismatch {
        at: Location,
        expected: usize,
        got: usize,
    },

    /// Operand types not supported by the operation.
    #[error("unsupported operand types for {operation}: {operands} ({at})")]
    TypeMismatch {
        at: Location,
        operation: &'static str,
        operands: String,
    },

    /// Integer division by zero.
    #[error("division by zero ({at})")]
    DivisionByZero { at: Location },

    /// A host builtin reported an error.
    #[error("builtin {name} failed: {message} ({at})")]
    BuiltinFailed {
        at: Location,
        name: &'static str,
        message: String,
    },

    /// `step` was called with no active frame.
    #[error("no active frame: start an entry closure first")]
    NotStarted,
}

impl RuntimeError {
    /// Location of the failure, if it happened inside a run.
    pub fn location(&self) -> Option<Location> {
        match self {
            RuntimeError::StackOverflow { at, .. }
            | RuntimeError::NotCallable { at, .. }
            | RuntimeError::ArityMismatch { at, .. }
            | RuntimeError::IndexOutOfRange { at, .. }
            | RuntimeError::OperandStackCorruption { at, .. }
            | RuntimeError::OperandStackOverflow { at, .. }
            | RuntimeError::Decode { at, .. }
            | RuntimeError::JumpOutOfRange { at, .. }
            | RuntimeError::NotAFunction { at, .. }
            | RuntimeError::CaptureCountMismatch { at, .. }
            | RuntimeError::TypeMismatch { at, .. }
            | RuntimeError::DivisionByZero { at }
            | RuntimeError::BuiltinFailed { at, .. } => Some(*at),
            RuntimeError::NotStarted => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_call() -> Location {
        Location {
            frame: 2,
            ip: Some(14),
            opcode: Some(Opcode::Call),
        }
    }

    #[test]
    fn error_display_formats() {
        assert_eq!(
            RuntimeError::StackOverflow {
                at: at_call(),
                limit: 1024
            }
            .to_string(),
            "stack overflow: frame depth limit 1024 reached (frame 2, CALL at offset 14)"
        );
        assert_eq!(
            RuntimeError::ArityMismatch {
                at: Location {
                    frame: 0,
                    ip: None,
                    opcode: None
                },
                expected: 2,
                got: 3
            }
            .to_string(),
            "wrong number of arguments: expected 2, got 3 (frame 0, before first instruction)"
        );
        assert_eq!(
            RuntimeError::IndexOutOfRange {
                at: Location {
                    frame: 1,
                    ip: Some(0),
                    opcode: Some(Opcode::GetFree)
                },
                space: Space::Free,
                index: 3,
                bound: 1
            }
            .to_string(),
            "free variable index 3 out of range (bound 1) (frame 1, GET_FREE at offset 0)"
        );
    }

    #[test]
    fn decode_error_is_source() {
        use std::error::Error as _;
        let err = RuntimeError::Decode {
            at: Location {
                frame: 0,
                ip: Some(3),
                opcode: None,
            },
            source: DecodeError::UnknownOpcode(0x07),
        };
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "malformed instruction: unknown opcode: 0x07 (frame 0, offset 3)"
        );
    }

    #[test]
    fn location_accessor() {
        assert_eq!(RuntimeError::NotStarted.location(), None);
        assert_eq!(
            RuntimeError::DivisionByZero { at: at_call() }.location(),
            Some(at_call())
        );
    }
}
