//! Tern virtual machine: the call-frame and execution-stack core.
//!
//! The VM is a stack-based machine with:
//! - A single operand stack shared by all frames, holding both locals and
//!   expression temporaries
//! - A depth-bounded frame stack, one [`Frame`] per active invocation
//! - Closures that capture free variables by value when they are created
//!
//! Language-level calls push and pop frames; they never recurse on the host
//! stack, so recursion depth is bounded only by [`VmConfig`].
//!
//! # Usage
//!
//! ```
//! use tern_common::{make, Opcode, Program, Value};
//! use tern_vm::run;
//!
//! let program = Program::from_instructions(
//!     vec![
//!         make(Opcode::Constant, &[0]),
//!         make(Opcode::Constant, &[1]),
//!         make(Opcode::Add, &[]),
//!         make(Opcode::ReturnValue, &[]),
//!     ]
//!     .into_iter()
//!     .collect(),
//!     0,
//!     vec![Value::Integer(40), Value::Integer(2)],
//! );
//!
//! let result = run(&program, &[]).unwrap();
//! assert_eq!(result, Value::Integer(42));
//! ```

pub mod config;
pub mod error;
pub mod execute;
pub mod frame;
pub mod machine;
pub mod stack;

pub use config::VmConfig;
pub use error::{Location, RuntimeError, Space};
pub use frame::{Frame, FrameStack};
pub use machine::{Step, Vm};
pub use stack::{Locals, OperandStack};

use std::rc::Rc;

use tern_common::{Closure, Program, Value};

/// Run a program's entry function with `args` and return its result.
///
/// This is the primary entry point for hosts that need no builtins and the
/// default limits. It wraps the entry function in a closure with no
/// captures and runs it until it returns.
///
/// # Errors
///
/// Returns [`RuntimeError`] for the first failure (stack overflow, arity
/// mismatch, non-callable target, out-of-range index, and so on).
pub fn run(program: &Program, args: &[Value]) -> Result<Value, RuntimeError> {
    let mut vm = Vm::for_program(program, VmConfig::default());
    vm.run(Rc::new(Closure::bare(Rc::clone(&program.main))), args)
}
