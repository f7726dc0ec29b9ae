//! Opcode definitions for the Tern instruction set.
//!
//! Every instruction is one opcode byte followed by zero, one or two
//! big-endian operands. The width of each operand is fixed per opcode and
//! reported by [`Opcode::operand_widths`].

use crate::error::DecodeError;

/// Identifies the operation to perform.
///
/// The `#[repr(u8)]` attribute gives each variant a stable byte value.
/// Byte `0x00` is never a valid opcode.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Constants & stack
    /// Push the constant at index `arg0`.
    Constant = 0x01,
    /// Discard the top of stack.
    Pop = 0x02,
    /// Push `true`.
    True = 0x03,
    /// Push `false`.
    False = 0x04,
    /// Push `null`.
    Null = 0x05,

    // Arithmetic
    /// Pop two values, push their sum (integers) or concatenation (strings).
    Add = 0x10,
    /// Pop two, push (second_popped - first_popped).
    Sub = 0x11,
    /// Pop two, push their product.
    Mul = 0x12,
    /// Pop two, push quotient. Division by zero is a runtime error.
    Div = 0x13,
    /// Pop one integer, push its negation.
    Minus = 0x14,
    /// Pop one value, push the negation of its truthiness.
    Bang = 0x15,

    // Comparison
    /// Pop two values, push BOOL (true if equal).
    Equal = 0x20,
    /// Pop two values, push BOOL (true if not equal).
    NotEqual = 0x21,
    /// Pop two integers, push BOOL (second_popped > first_popped).
    GreaterThan = 0x22,
    /// Pop two integers, push BOOL (second_popped < first_popped).
    LessThan = 0x23,

    // Control flow
    /// Continue at absolute offset `arg0`.
    Jump = 0x30,
    /// Pop a value; continue at `arg0` when it is falsy.
    JumpNotTruthy = 0x31,

    // Bindings
    /// Push global slot `arg0`.
    GetGlobal = 0x40,
    /// Pop into global slot `arg0`.
    SetGlobal = 0x41,
    /// Push local slot `arg0` of the current frame.
    GetLocal = 0x42,
    /// Pop into local slot `arg0` of the current frame.
    SetLocal = 0x43,
    /// Push captured value `arg0` of the current closure.
    GetFree = 0x44,
    /// Push host builtin `arg0`.
    GetBuiltin = 0x45,
    /// Push the closure executing in the current frame.
    CurrentClosure = 0x46,

    // Functions
    /// Call the value `arg0` slots below the top with `arg0` arguments.
    Call = 0x50,
    /// Return the top of stack to the caller.
    ReturnValue = 0x51,
    /// Return to the caller with no value.
    Return = 0x52,
    /// Build a closure from function constant `arg0` and `arg1` captured values.
    Closure = 0x53,

    // Data
    /// Pop `arg0` values, push them as an array.
    Array = 0x60,
    /// Pop index, pop array, push element.
    Index = 0x61,
}

/// All valid opcodes, in definition order. Useful for exhaustive testing.
pub const ALL_OPCODES: [Opcode; 30] = [
    Opcode::Constant,
    Opcode::Pop,
    Opcode::True,
    Opcode::False,
    Opcode::Null,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::Minus,
    Opcode::Bang,
    Opcode::Equal,
    Opcode::NotEqual,
    Opcode::GreaterThan,
    Opcode::LessThan,
    Opcode::Jump,
    Opcode::JumpNotTruthy,
    Opcode::GetGlobal,
    Opcode::SetGlobal,
    Opcode::GetLocal,
    Opcode::SetLocal,
    Opcode::GetFree,
    Opcode::GetBuiltin,
    Opcode::CurrentClosure,
    Opcode::Call,
    Opcode::ReturnValue,
    Opcode::Return,
    Opcode::Closure,
    Opcode::Array,
    Opcode::Index,
];

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Err(DecodeError::IllegalOpcode),

            0x01 => Ok(Opcode::Constant),
            0x02 => Ok(Opcode::Pop),
            0x03 => Ok(Opcode::True),
            0x04 => Ok(Opcode::False),
            0x05 => Ok(Opcode::Null),

            0x10 => Ok(Opcode::Add),
            0x11 => Ok(Opcode::Sub),
            0x12 => Ok(Opcode::Mul),
            0x13 => Ok(Opcode::Div),
            0x14 => Ok(Opcode::Minus),
            0x15 => Ok(Opcode::Bang),

            0x20 => Ok(Opcode::Equal),
            0x21 => Ok(Opcode::NotEqual),
            0x22 => Ok(Opcode::GreaterThan),
            0x23 => Ok(Opcode::LessThan),

            0x30 => Ok(Opcode::Jump),
            0x31 => Ok(Opcode::JumpNotTruthy),

            0x40 => Ok(Opcode::GetGlobal),
            0x41 => Ok(Opcode::SetGlobal),
            0x42 => Ok(Opcode::GetLocal),
            0x43 => Ok(Opcode::SetLocal),
            0x44 => Ok(Opcode::GetFree),
            0x45 => Ok(Opcode::GetBuiltin),
            0x46 => Ok(Opcode::CurrentClosure),

            0x50 => Ok(Opcode::Call),
            0x51 => Ok(Opcode::ReturnValue),
            0x52 => Ok(Opcode::Return),
            0x53 => Ok(Opcode::Closure),

            0x60 => Ok(Opcode::Array),
            0x61 => Ok(Opcode::Index),

            _ => Err(DecodeError::UnknownOpcode(value)),
        }
    }
}

impl Opcode {
    /// Returns the disassembly mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Constant => "CONSTANT",
            Opcode::Pop => "POP",
            Opcode::True => "TRUE",
            Opcode::False => "FALSE",
            Opcode::Null => "NULL",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Minus => "MINUS",
            Opcode::Bang => "BANG",
            Opcode::Equal => "EQUAL",
            Opcode::NotEqual => "NOT_EQUAL",
            Opcode::GreaterThan => "GREATER_THAN",
            Opcode::LessThan => "LESS_THAN",
            Opcode::Jump => "JUMP",
            Opcode::JumpNotTruthy => "JUMP_NOT_TRUTHY",
            Opcode::GetGlobal => "GET_GLOBAL",
            Opcode::SetGlobal => "SET_GLOBAL",
            Opcode::GetLocal => "GET_LOCAL",
            Opcode::SetLocal => "SET_LOCAL",
            Opcode::GetFree => "GET_FREE",
            Opcode::GetBuiltin => "GET_BUILTIN",
            Opcode::CurrentClosure => "CURRENT_CLOSURE",
            Opcode::Call => "CALL",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::Return => "RETURN",
            Opcode::Closure => "CLOSURE",
            Opcode::Array => "ARRAY",
            Opcode::Index => "INDEX",
        }
    }

    /// Byte width of each operand, in encoding order.
    pub fn operand_widths(&self) -> &'static [usize] {
        match self {
            Opcode::Constant
            | Opcode::Jump
            | Opcode::JumpNotTruthy
            | Opcode::GetGlobal
            | Opcode::SetGlobal
            | Opcode::Array => &[2],
            Opcode::GetLocal
            | Opcode::SetLocal
            | Opcode::GetFree
            | Opcode::GetBuiltin
            | Opcode::Call => &[1],
            Opcode::Closure => &[2, 1],
            Opcode::Pop
            | Opcode::True
            | Opcode::False
            | Opcode::Null
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Minus
            | Opcode::Bang
            | Opcode::Equal
            | Opcode::NotEqual
            | Opcode::GreaterThan
            | Opcode::LessThan
            | Opcode::CurrentClosure
            | Opcode::ReturnValue
            | Opcode::Return
            | Opcode::Index => &[],
        }
    }

    /// Total encoded width of this instruction, opcode byte included.
    pub fn width(&self) -> usize {
        1 + self.operand_widths().iter().sum::<usize>()
    }
}
