//! Program representation handed from the compiler to the VM.
//!
//! A program is an entry function plus the constant table every function in
//! it indexes with CONSTANT and CLOSURE.

use std::rc::Rc;

use crate::instructions::Instructions;
use crate::value::{CompiledFunction, Value};

/// A compiled Tern program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// The entry function. Its parameters are the program's arguments.
    pub main: Rc<CompiledFunction>,
    /// Constant table shared by all functions of the program.
    pub constants: Vec<Value>,
}

impl Program {
    /// Create a program from an entry function and its constant table.
    pub fn new(main: CompiledFunction, constants: Vec<Value>) -> Self {
        Self {
            main: Rc::new(main),
            constants,
        }
    }

    /// Create a program whose entry function takes no arguments and uses
    /// `num_locals` local slots.
    pub fn from_instructions(
        instructions: Instructions,
        num_locals: usize,
        constants: Vec<Value>,
    ) -> Self {
        Self::new(
            CompiledFunction::new(instructions, 0, num_locals).named("main"),
            constants,
        )
    }

    /// Look up a constant.
    pub fn constant(&self, index: usize) -> Option<&Value> {
        self.constants.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::make;
    use crate::opcode::Opcode;

    #[test]
    fn from_instructions_names_main() {
        let program = Program::from_instructions(
            vec![make(Opcode::Constant, &[0]), make(Opcode::ReturnValue, &[])]
                .into_iter()
                .collect(),
            0,
            vec![Value::Integer(7)],
        );
        assert_eq!(program.main.display_name(), "main");
        assert_eq!(program.main.num_parameters, 0);
        assert_eq!(program.constant(0), Some(&Value::Integer(7)));
        assert_eq!(program.constant(1), None);
    }
}
