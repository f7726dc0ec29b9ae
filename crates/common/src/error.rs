//! Decode errors for Tern instruction streams.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that occur while decoding an instruction from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Opcode 0x00 is illegal and always rejected.
    #[error("illegal opcode 0x00")]
    IllegalOpcode,

    /// Byte does not name any opcode.
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// An operand runs past the end of the instruction buffer.
    #[error("truncated operand for {} at offset {offset}", opcode.mnemonic())]
    TruncatedOperand { offset: usize, opcode: Opcode },

    /// Decoding started past the end of the buffer.
    #[error("offset {offset} is past the end of the instructions (length {len})")]
    OffsetOutOfRange { offset: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_illegal_opcode() {
        assert_eq!(
            DecodeError::IllegalOpcode.to_string(),
            "illegal opcode 0x00"
        );
    }

    #[test]
    fn display_unknown_opcode() {
        assert_eq!(
            DecodeError::UnknownOpcode(0x0A).to_string(),
            "unknown opcode: 0x0a"
        );
    }

    #[test]
    fn display_truncated_operand() {
        assert_eq!(
            DecodeError::TruncatedOperand {
                offset: 7,
                opcode: Opcode::Constant
            }
            .to_string(),
            "truncated operand for CONSTANT at offset 7"
        );
    }
}
