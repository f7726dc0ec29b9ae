//! Instruction encoding and decoding for the Tern instruction set.
//!
//! An instruction is one opcode byte followed by its operands, big-endian:
//! ```text
//! CONSTANT 65534   ->  01 FF FE
//! GET_LOCAL 3      ->  42 03
//! CLOSURE 7 2      ->  53 00 07 02
//! ```
//! A function's body is a flat [`Instructions`] buffer; jump operands are
//! absolute byte offsets into that buffer.

use std::fmt;
use std::ops::Deref;

use crate::error::DecodeError;
use crate::opcode::Opcode;

/// Largest operand count of any opcode.
pub const MAX_OPERANDS: usize = 2;

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// The operation to perform.
    pub opcode: Opcode,
    /// Operand values. Slots past the opcode's operand count are zero.
    pub operands: [usize; MAX_OPERANDS],
    /// Encoded width in bytes, opcode included.
    pub width: usize,
}

/// The bytecode of one function body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instructions(Vec<u8>);

impl Instructions {
    /// Wrap raw bytecode.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode the instruction starting at `offset`.
    pub fn decode_at(&self, offset: usize) -> Result<Decoded, DecodeError> {
        decode_at(&self.0, offset)
    }
}

impl Deref for Instructions {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Instructions {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Concatenate encoded instructions, typically the output of [`make`].
impl FromIterator<Vec<u8>> for Instructions {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        Self(iter.into_iter().flatten().collect())
    }
}

/// Disassembly listing, one instruction per line: `0003 GET_LOCAL 0`.
impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut offset = 0;
        while offset < self.0.len() {
            match decode_at(&self.0, offset) {
                Ok(decoded) => {
                    write!(f, "{offset:04} {}", decoded.opcode.mnemonic())?;
                    let count = decoded.opcode.operand_widths().len();
                    for operand in &decoded.operands[..count] {
                        write!(f, " {operand}")?;
                    }
                    writeln!(f)?;
                    offset += decoded.width;
                }
                Err(err) => return writeln!(f, "{offset:04} ERROR: {err}"),
            }
        }
        Ok(())
    }
}

/// Encode one instruction.
///
/// Missing operands encode as zero; extra operands are ignored. Each operand
/// is truncated to its declared width.
pub fn make(opcode: Opcode, operands: &[usize]) -> Vec<u8> {
    let widths = opcode.operand_widths();
    let mut bytes = Vec::with_capacity(opcode.width());
    bytes.push(opcode as u8);

    for (i, &width) in widths.iter().enumerate() {
        let operand = operands.get(i).copied().unwrap_or(0);
        match width {
            2 => bytes.extend_from_slice(&(operand as u16).to_be_bytes()),
            1 => bytes.push(operand as u8),
            _ => unreachable!("operand widths are 1 or 2 bytes"),
        }
    }

    bytes
}

/// Decode the instruction at `offset` in `bytes`.
pub fn decode_at(bytes: &[u8], offset: usize) -> Result<Decoded, DecodeError> {
    let byte = *bytes.get(offset).ok_or(DecodeError::OffsetOutOfRange {
        offset,
        len: bytes.len(),
    })?;
    let opcode = Opcode::try_from(byte)?;

    let mut operands = [0usize; MAX_OPERANDS];
    let mut cursor = offset + 1;
    for (slot, &width) in operands.iter_mut().zip(opcode.operand_widths()) {
        *slot = match width {
            2 => read_u16(bytes, cursor).map(usize::from),
            _ => read_u8(bytes, cursor).map(usize::from),
        }
        .ok_or(DecodeError::TruncatedOperand { offset, opcode })?;
        cursor += width;
    }

    Ok(Decoded {
        opcode,
        operands,
        width: cursor - offset,
    })
}

/// Read a big-endian u16 at `at`.
pub fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let hi = *bytes.get(at)?;
    let lo = *bytes.get(at + 1)?;
    Some(u16::from_be_bytes([hi, lo]))
}

/// Read a u8 at `at`.
pub fn read_u8(bytes: &[u8], at: usize) -> Option<u8> {
    bytes.get(at).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_big_endian_u16() {
        assert_eq!(make(Opcode::Constant, &[65534]), vec![0x01, 0xFF, 0xFE]);
    }

    #[test]
    fn make_u8_operand() {
        assert_eq!(make(Opcode::GetLocal, &[255]), vec![0x42, 0xFF]);
    }

    #[test]
    fn make_two_operands() {
        assert_eq!(
            make(Opcode::Closure, &[65534, 255]),
            vec![0x53, 0xFF, 0xFE, 0xFF]
        );
    }

    #[test]
    fn make_no_operands() {
        assert_eq!(make(Opcode::Add, &[]), vec![0x10]);
    }

    #[test]
    fn make_missing_operand_is_zero() {
        assert_eq!(make(Opcode::Call, &[]), vec![0x50, 0x00]);
    }

    #[test]
    fn decode_each_width() {
        let instructions: Instructions = vec![
            make(Opcode::Add, &[]),
            make(Opcode::GetLocal, &[1]),
            make(Opcode::Constant, &[2]),
            make(Opcode::Closure, &[65535, 255]),
        ]
        .into_iter()
        .collect();

        let add = instructions.decode_at(0).unwrap();
        assert_eq!(add.opcode, Opcode::Add);
        assert_eq!(add.width, 1);

        let local = instructions.decode_at(1).unwrap();
        assert_eq!(local.opcode, Opcode::GetLocal);
        assert_eq!(local.operands[0], 1);
        assert_eq!(local.width, 2);

        let constant = instructions.decode_at(3).unwrap();
        assert_eq!(constant.operands[0], 2);
        assert_eq!(constant.width, 3);

        let closure = instructions.decode_at(6).unwrap();
        assert_eq!(closure.operands, [65535, 255]);
        assert_eq!(closure.width, 4);
    }

    #[test]
    fn decode_truncated_operand() {
        let bytes = [Opcode::Constant as u8, 0x00];
        assert_eq!(
            decode_at(&bytes, 0),
            Err(DecodeError::TruncatedOperand {
                offset: 0,
                opcode: Opcode::Constant
            })
        );
    }

    #[test]
    fn decode_past_end() {
        assert_eq!(
            decode_at(&[0x10], 1),
            Err(DecodeError::OffsetOutOfRange { offset: 1, len: 1 })
        );
    }

    #[test]
    fn decode_illegal_byte() {
        assert_eq!(decode_at(&[0x00], 0), Err(DecodeError::IllegalOpcode));
    }

    #[test]
    fn disassembly_listing() {
        let instructions: Instructions = vec![
            make(Opcode::Add, &[]),
            make(Opcode::GetLocal, &[1]),
            make(Opcode::Constant, &[2]),
            make(Opcode::Constant, &[65535]),
            make(Opcode::Closure, &[65535, 255]),
        ]
        .into_iter()
        .collect();

        let expected = "\
0000 ADD
0001 GET_LOCAL 1
0003 CONSTANT 2
0006 CONSTANT 65535
0009 CLOSURE 65535 255
";
        assert_eq!(instructions.to_string(), expected);
    }

    #[test]
    fn disassembly_stops_at_bad_byte() {
        let instructions = Instructions::new(vec![0x10, 0x07]);
        assert_eq!(
            instructions.to_string(),
            "0000 ADD\n0001 ERROR: unknown opcode: 0x07\n"
        );
    }

    #[test]
    fn read_helpers() {
        assert_eq!(read_u16(&[0x12, 0x34], 0), Some(0x1234));
        assert_eq!(read_u16(&[0x12], 0), None);
        assert_eq!(read_u8(&[0x12], 0), Some(0x12));
        assert_eq!(read_u8(&[], 0), None);
    }
}
