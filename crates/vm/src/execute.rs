//! Opcode dispatch for the Tern VM.

use tern_common::{Opcode, Value};

use crate::error::{RuntimeError, Space};
use crate::machine::{Step, Vm};

impl Vm {
    /// Fetch, decode and execute one instruction of the current frame.
    ///
    /// Reaching the end of a function body returns from it with no value.
    pub fn step(&mut self) -> Result<Step, RuntimeError> {
        self.current = None;
        let frame = self.frames.current_mut().ok_or(RuntimeError::NotStarted)?;
        let decoded = match frame.fetch() {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return self.exec_return(Value::Null),
            Err(source) => {
                return Err(RuntimeError::Decode {
                    at: self.location(),
                    source,
                })
            }
        };
        self.current = Some(decoded.opcode);
        let [arg0, arg1] = decoded.operands;

        match decoded.opcode {
            // Constants & stack
            Opcode::Constant => self.exec_constant(arg0)?,
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::True => self.push(Value::Boolean(true))?,
            Opcode::False => self.push(Value::Boolean(false))?,
            Opcode::Null => self.push(Value::Null)?,

            // Arithmetic
            Opcode::Add => self.exec_binary_arith(|a, b| a.wrapping_add(b))?,
            Opcode::Sub => self.exec_binary_arith(|a, b| a.wrapping_sub(b))?,
            Opcode::Mul => self.exec_binary_arith(|a, b| a.wrapping_mul(b))?,
            Opcode::Div => self.exec_div()?,
            Opcode::Minus => self.exec_minus()?,
            Opcode::Bang => {
                let value = self.pop()?;
                self.push(Value::Boolean(!value.is_truthy()))?;
            }

            // Comparison
            Opcode::Equal => self.exec_equality(true)?,
            Opcode::NotEqual => self.exec_equality(false)?,
            Opcode::GreaterThan => self.exec_comparison(|a, b| a > b)?,
            Opcode::LessThan => self.exec_comparison(|a, b| a < b)?,

            // Control flow
            Opcode::Jump => self.exec_jump(arg0)?,
            Opcode::JumpNotTruthy => {
                let condition = self.pop()?;
                if !condition.is_truthy() {
                    self.exec_jump(arg0)?;
                }
            }

            // Bindings
            Opcode::GetGlobal => self.exec_get_global(arg0)?,
            Opcode::SetGlobal => self.exec_set_global(arg0)?,
            Opcode::GetLocal => self.exec_get_local(arg0)?,
            Opcode::SetLocal => self.exec_set_local(arg0)?,
            Opcode::GetFree => self.exec_get_free(arg0)?,
            Opcode::GetBuiltin => self.exec_get_builtin(arg0)?,
            Opcode::CurrentClosure => {
                let closure = self.current_frame()?.closure().clone();
                self.push(Value::Closure(closure))?;
            }

            // Functions
            Opcode::Call => self.call(arg0)?,
            Opcode::ReturnValue => {
                let value = self.pop()?;
                return self.exec_return(value);
            }
            Opcode::Return => return self.exec_return(Value::Null),
            Opcode::Closure => self.make_closure(arg0, arg1)?,

            // Data
            Opcode::Array => {
                let elements = self.pop_n(arg0)?;
                self.push(Value::array(elements))?;
            }
            Opcode::Index => self.exec_index()?,
        }

        Ok(Step::Continue)
    }

    fn exec_return(&mut self, value: Value) -> Result<Step, RuntimeError> {
        Ok(match self.return_from_frame(value)? {
            Some(result) => Step::Done(result),
            None => Step::Continue,
        })
    }

    fn type_mismatch(&self, left: &Value, right: Option<&Value>) -> RuntimeError {
        let operands = match right {
            Some(right) => format!("{}, {}", left.type_name(), right.type_name()),
            None => left.type_name().to_string(),
        };
        RuntimeError::TypeMismatch {
            at: self.location(),
            operation: self.current.map_or("?", |op| op.mnemonic()),
            operands,
        }
    }

    fn exec_constant(&mut self, index: usize) -> Result<(), RuntimeError> {
        let value = self
            .constants
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::IndexOutOfRange {
                at: self.location(),
                space: Space::Constant,
                index,
                bound: self.constants.len(),
            })?;
        self.push(value)
    }

    // ---- Arithmetic ----

    /// Integer arithmetic; ADD also concatenates strings.
    fn exec_binary_arith(&mut self, int_op: fn(i64, i64) -> i64) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (&left, &right) {
            (Value::Integer(a), Value::Integer(b)) => Value::Integer(int_op(*a, *b)),
            (Value::Str(a), Value::Str(b)) if self.current == Some(Opcode::Add) => {
                Value::string(format!("{a}{b}"))
            }
            _ => return Err(self.type_mismatch(&left, Some(&right))),
        };

        self.push(result)
    }

    fn exec_div(&mut self) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (&left, &right) {
            (Value::Integer(_), Value::Integer(0)) => {
                return Err(RuntimeError::DivisionByZero {
                    at: self.location(),
                })
            }
            (Value::Integer(a), Value::Integer(b)) => Value::Integer(a.wrapping_div(*b)),
            _ => return Err(self.type_mismatch(&left, Some(&right))),
        };

        self.push(result)
    }

    fn exec_minus(&mut self) -> Result<(), RuntimeError> {
        match self.pop()? {
            Value::Integer(n) => self.push(Value::Integer(n.wrapping_neg())),
            other => Err(self.type_mismatch(&other, None)),
        }
    }

    // ---- Comparison ----

    fn exec_equality(&mut self, equal: bool) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        self.push(Value::Boolean((left == right) == equal))
    }

    fn exec_comparison(&mut self, int_op: fn(i64, i64) -> bool) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        match (&left, &right) {
            (Value::Integer(a), Value::Integer(b)) => self.push(Value::Boolean(int_op(*a, *b))),
            _ => Err(self.type_mismatch(&left, Some(&right))),
        }
    }

    // ---- Control flow ----

    fn exec_jump(&mut self, target: usize) -> Result<(), RuntimeError> {
        let len = self.current_frame()?.instructions().len();
        if target > len {
            return Err(RuntimeError::JumpOutOfRange {
                at: self.location(),
                target,
                len,
            });
        }
        match self.frames.current_mut() {
            Some(frame) => {
                frame.jump(target);
                Ok(())
            }
            None => Err(self.corruption("no active frame")),
        }
    }

    // ---- Bindings ----

    fn check_global(&self, index: usize) -> Result<(), RuntimeError> {
        if index >= self.config.globals_size {
            return Err(RuntimeError::IndexOutOfRange {
                at: self.location(),
                space: Space::Global,
                index,
                bound: self.config.globals_size,
            });
        }
        Ok(())
    }

    fn exec_get_global(&mut self, index: usize) -> Result<(), RuntimeError> {
        self.check_global(index)?;
        let value = self.globals.get(index).cloned().unwrap_or(Value::Null);
        self.push(value)
    }

    fn exec_set_global(&mut self, index: usize) -> Result<(), RuntimeError> {
        self.check_global(index)?;
        let value = self.pop()?;
        if index >= self.globals.len() {
            self.globals.resize(index + 1, Value::Null);
        }
        self.globals[index] = value;
        Ok(())
    }

    fn exec_get_local(&mut self, index: usize) -> Result<(), RuntimeError> {
        let frame = self.current_frame()?;
        let (base, count) = (frame.base_pointer(), frame.num_locals());

        let lookup = self
            .stack
            .locals(base, count)
            .map(|locals| locals.get(index).cloned());
        match lookup {
            Some(Some(value)) => self.push(value),
            Some(None) => Err(RuntimeError::IndexOutOfRange {
                at: self.location(),
                space: Space::Local,
                index,
                bound: count,
            }),
            None => Err(self.corruption("frame locals are not on the stack")),
        }
    }

    fn exec_set_local(&mut self, index: usize) -> Result<(), RuntimeError> {
        let frame = self.current_frame()?;
        let (base, count) = (frame.base_pointer(), frame.num_locals());
        if index >= count {
            return Err(RuntimeError::IndexOutOfRange {
                at: self.location(),
                space: Space::Local,
                index,
                bound: count,
            });
        }

        let value = self.pop()?;
        let stored = self
            .stack
            .locals(base, count)
            .map(|mut locals| locals.set(index, value).is_ok());
        match stored {
            Some(true) => Ok(()),
            Some(false) => Err(RuntimeError::IndexOutOfRange {
                at: self.location(),
                space: Space::Local,
                index,
                bound: count,
            }),
            None => Err(self.corruption("frame locals are not on the stack")),
        }
    }

    fn exec_get_free(&mut self, index: usize) -> Result<(), RuntimeError> {
        let free = self.current_frame()?.closure().free();
        let value = free
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::IndexOutOfRange {
                at: self.location(),
                space: Space::Free,
                index,
                bound: free.len(),
            })?;
        self.push(value)
    }

    fn exec_get_builtin(&mut self, index: usize) -> Result<(), RuntimeError> {
        let builtin = *self
            .builtins
            .get(index)
            .ok_or_else(|| RuntimeError::IndexOutOfRange {
                at: self.location(),
                space: Space::Builtin,
                index,
                bound: self.builtins.len(),
            })?;
        self.push(Value::Builtin(builtin))
    }

    // ---- Data ----

    fn exec_index(&mut self) -> Result<(), RuntimeError> {
        let index = self.pop()?;
        let collection = self.pop()?;

        match (&collection, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                let element = usize::try_from(*i)
                    .ok()
                    .and_then(|i| elements.get(i))
                    .cloned()
                    .unwrap_or(Value::Null);
                self.push(element)
            }
            _ => Err(self.type_mismatch(&collection, Some(&index))),
        }
    }
}
