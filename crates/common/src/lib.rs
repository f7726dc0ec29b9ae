//! Tern common types and bytecode encoding.
//!
//! This crate provides what the VM core consumes from the compiler and the
//! object model:
//!
//! - [`Opcode`]: the instruction set, one byte per opcode
//! - [`Instructions`]: a function body, with [`make`] and [`decode_at`]
//! - [`Value`]: runtime values, including [`CompiledFunction`], [`Closure`]
//!   and [`Builtin`]
//! - [`Program`]: an entry function plus its constant table
//! - [`DecodeError`]: errors from decoding bytecode

pub mod error;
pub mod instructions;
pub mod opcode;
pub mod program;
pub mod value;

// Re-export commonly used types at the crate root.
pub use error::DecodeError;
pub use instructions::{decode_at, make, Decoded, Instructions};
pub use opcode::Opcode;
pub use program::Program;
pub use value::{Builtin, BuiltinFn, Closure, CompiledFunction, Value};

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Strategy that generates a random valid Opcode.
    fn arb_opcode() -> impl Strategy<Value = Opcode> {
        prop::sample::select(&opcode::ALL_OPCODES[..])
    }

    proptest! {
        /// Decoding arbitrary bytes at any offset never panics; it either
        /// yields an instruction that fits in the buffer or a DecodeError.
        #[test]
        fn random_bytes_decode(
            bytes in prop::collection::vec(any::<u8>(), 0..64),
            offset in 0usize..64,
        ) {
            match decode_at(&bytes, offset) {
                Ok(decoded) => {
                    prop_assert!(offset + decoded.width <= bytes.len());
                    prop_assert_eq!(decoded.width, decoded.opcode.width());
                }
                Err(e) => match e {
                    DecodeError::IllegalOpcode
                    | DecodeError::UnknownOpcode(_)
                    | DecodeError::TruncatedOperand { .. }
                    | DecodeError::OffsetOutOfRange { .. } => {}
                },
            }
        }

        /// A stream of made instructions disassembles to exactly one line
        /// per instruction.
        #[test]
        fn disassembly_line_per_instruction(
            ops in prop::collection::vec((arb_opcode(), any::<u16>(), any::<u8>()), 0..40)
        ) {
            let instructions: Instructions = ops
                .iter()
                .map(|&(op, a, b)| make(op, &[a as usize, b as usize]))
                .collect();
            let listing = instructions.to_string();
            prop_assert_eq!(listing.lines().count(), ops.len());
            prop_assert!(!listing.contains("ERROR"));
        }
    }
}
