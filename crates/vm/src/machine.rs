//! VM state management: operand stack, frame stack, globals, and the
//! call/return protocols that move between frames.

use std::rc::Rc;

use tern_common::{Builtin, Closure, Opcode, Program, Value};

use crate::config::VmConfig;
use crate::error::{Location, RuntimeError, Space};
use crate::frame::{Frame, FrameStack};
use crate::stack::{OperandStack, StackFault};

/// Outcome of executing one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// More instructions remain.
    Continue,
    /// The entry frame returned this value.
    Done(Value),
}

/// The Tern virtual machine.
///
/// One instance owns one frame stack and one operand stack and runs one
/// instruction stream at a time. Concurrent workloads need one instance
/// each.
#[derive(Debug)]
pub struct Vm {
    pub(crate) config: VmConfig,
    /// Constant table indexed by CONSTANT and CLOSURE.
    pub(crate) constants: Vec<Value>,
    /// Host functions indexed by GET_BUILTIN.
    pub(crate) builtins: Vec<Builtin>,
    /// Global slots; grown on demand up to `config.globals_size`.
    pub(crate) globals: Vec<Value>,
    pub(crate) stack: OperandStack,
    pub(crate) frames: FrameStack,
    /// Opcode being dispatched, for error locations.
    pub(crate) current: Option<Opcode>,
}

impl Vm {
    /// Create a VM over a constant table.
    pub fn new(constants: Vec<Value>, config: VmConfig) -> Self {
        Self {
            config,
            constants,
            builtins: Vec::new(),
            globals: Vec::new(),
            stack: OperandStack::new(config.stack_size),
            frames: FrameStack::new(config.max_frames),
            current: None,
        }
    }

    /// Create a VM over a program's constant table.
    pub fn for_program(program: &Program, config: VmConfig) -> Self {
        Self::new(program.constants.clone(), config)
    }

    /// Register the host builtins reachable through GET_BUILTIN, in index
    /// order.
    pub fn with_builtins(mut self, builtins: Vec<Builtin>) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn frames(&self) -> &FrameStack {
        &self.frames
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.depth()
    }

    pub fn stack(&self) -> &[Value] {
        self.stack.as_slice()
    }

    pub fn stack_height(&self) -> usize {
        self.stack.len()
    }

    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    /// Active frames, innermost first. After a failed run this is the
    /// state at the failure.
    pub fn backtrace(&self) -> String {
        self.frames.to_string()
    }

    /// Prepare to run `entry` with `args`.
    ///
    /// Clears both stacks, places the entry closure and its arguments on the
    /// operand stack and pushes the entry frame through the ordinary call
    /// protocol. Globals survive across runs.
    pub fn start(&mut self, entry: Rc<Closure>, args: &[Value]) -> Result<(), RuntimeError> {
        self.stack.clear();
        self.frames.clear();
        self.current = None;

        log::debug!(
            "starting {} with {} argument(s)",
            entry.function.display_name(),
            args.len()
        );

        self.push(Value::Closure(Rc::clone(&entry)))?;
        for arg in args {
            self.push(arg.clone())?;
        }
        self.call_closure(entry, args.len())
    }

    /// Run `entry` with `args` until the entry frame returns.
    ///
    /// Host-imposed budgets belong in a loop over [`Vm::step`] instead.
    pub fn run(&mut self, entry: Rc<Closure>, args: &[Value]) -> Result<Value, RuntimeError> {
        let result = self.run_inner(entry, args);
        match &result {
            Ok(value) => log::debug!("finished with {value}"),
            Err(err) => log::debug!("aborted: {err}\n{}", self.backtrace()),
        }
        result
    }

    fn run_inner(&mut self, entry: Rc<Closure>, args: &[Value]) -> Result<Value, RuntimeError> {
        self.start(entry, args)?;
        loop {
            if let Step::Done(value) = self.step()? {
                return Ok(value);
            }
        }
    }

    // ---- Addressing ----

    pub(crate) fn location(&self) -> Location {
        Location {
            frame: self.frames.depth().saturating_sub(1),
            ip: self.frames.current().and_then(Frame::ip),
            opcode: self.current,
        }
    }

    pub(crate) fn corruption(&self, reason: &'static str) -> RuntimeError {
        RuntimeError::OperandStackCorruption {
            at: self.location(),
            reason,
        }
    }

    fn stack_fault(&self, fault: StackFault) -> RuntimeError {
        match fault {
            StackFault::Overflow { capacity } => RuntimeError::OperandStackOverflow {
                at: self.location(),
                capacity,
            },
            StackFault::Underflow { .. } => {
                self.corruption("pop below the current frame's locals")
            }
        }
    }

    pub(crate) fn current_frame(&self) -> Result<&Frame, RuntimeError> {
        self.frames
            .current()
            .ok_or_else(|| self.corruption("no active frame"))
    }

    /// Lowest slot the current frame may pop.
    fn floor(&self) -> usize {
        self.frames.current().map_or(0, Frame::floor)
    }

    pub(crate) fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        self.stack.push(value).map_err(|f| self.stack_fault(f))
    }

    pub(crate) fn pop(&mut self) -> Result<Value, RuntimeError> {
        let floor = self.floor();
        self.stack.pop_above(floor).map_err(|f| self.stack_fault(f))
    }

    /// Pop `count` values, returned bottom-to-top.
    pub(crate) fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, RuntimeError> {
        let floor = self.floor();
        self.stack
            .split_above(count, floor)
            .map_err(|f| self.stack_fault(f))
    }

    // ---- Call protocol ----

    /// Call the value `argc` slots below the top with the `argc` values
    /// above it as arguments.
    pub(crate) fn call(&mut self, argc: usize) -> Result<(), RuntimeError> {
        if self.stack.len() < self.floor() + argc + 1 {
            return Err(self.corruption("call operands reach below the current frame"));
        }
        let callee = self
            .stack
            .peek(argc)
            .cloned()
            .ok_or_else(|| self.corruption("missing call target"))?;

        match callee {
            Value::Closure(closure) => self.call_closure(closure, argc),
            Value::Builtin(builtin) => self.call_builtin(builtin, argc),
            other => Err(RuntimeError::NotCallable {
                at: self.location(),
                found: other.type_name(),
            }),
        }
    }

    /// Push a frame for `closure`. Its `argc` arguments are already the top
    /// of the stack and become its first locals.
    ///
    /// All checks run before anything is mutated, so a failed call leaves
    /// both stacks exactly as they were.
    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> Result<(), RuntimeError> {
        let function = &closure.function;
        if argc != function.num_parameters {
            return Err(RuntimeError::ArityMismatch {
                at: self.location(),
                expected: function.num_parameters,
                got: argc,
            });
        }
        if closure.free().len() != function.num_free {
            return Err(RuntimeError::CaptureCountMismatch {
                at: self.location(),
                expected: function.num_free,
                got: closure.free().len(),
            });
        }
        if !self.frames.has_room() {
            return Err(RuntimeError::StackOverflow {
                at: self.location(),
                limit: self.frames.max_depth(),
            });
        }

        let base_pointer = self
            .stack
            .len()
            .checked_sub(argc)
            .filter(|&bp| bp > 0)
            .ok_or_else(|| self.corruption("call without a callee slot"))?;
        let height = base_pointer
            .checked_add(function.num_locals)
            .filter(|&height| self.stack.fits(height))
            .ok_or_else(|| RuntimeError::OperandStackOverflow {
                at: self.location(),
                capacity: self.stack.capacity(),
            })?;

        log::trace!(
            "call {} at depth {}, base pointer {base_pointer}",
            function.display_name(),
            self.frames.depth() + 1
        );

        self.stack.grow_to(height).map_err(|f| self.stack_fault(f))?;
        self.frames
            .push(Frame::new(closure, base_pointer))
            .map_err(|_| self.corruption("frame stack filled during call"))
    }

    /// Invoke a host function in place: arguments and callee are replaced
    /// by the result, at the slot a closure's return value would occupy.
    fn call_builtin(&mut self, builtin: Builtin, argc: usize) -> Result<(), RuntimeError> {
        if let Some(expected) = builtin.arity {
            if expected != argc {
                return Err(RuntimeError::ArityMismatch {
                    at: self.location(),
                    expected,
                    got: argc,
                });
            }
        }

        let args_start = self.stack.len() - argc;
        let result = (builtin.func)(&self.stack.as_slice()[args_start..]).map_err(|message| {
            RuntimeError::BuiltinFailed {
                at: self.location(),
                name: builtin.name,
                message,
            }
        })?;

        log::trace!("builtin {} returned {result}", builtin.name);

        self.stack.truncate(args_start - 1);
        self.push(result)
    }

    // ---- Return protocol ----

    /// Pop the current frame and hand `value` to its caller.
    ///
    /// Returns `Some(value)` when the popped frame was the entry frame,
    /// which ends the run.
    pub(crate) fn return_from_frame(&mut self, value: Value) -> Result<Option<Value>, RuntimeError> {
        let frame = self.current_frame()?;
        let base_pointer = frame.base_pointer();
        if base_pointer == 0 || self.stack.len() < frame.floor() {
            return Err(self.corruption("returning frame lost its locals"));
        }

        log::trace!(
            "return from {} at depth {}",
            frame.closure().function.display_name(),
            self.frames.depth()
        );

        self.frames.pop();
        // Drop the frame's locals and temporaries plus the callee slot.
        self.stack.truncate(base_pointer - 1);

        if self.frames.is_empty() {
            return Ok(Some(value));
        }
        self.push(value)?;
        Ok(None)
    }

    // ---- Closures ----

    /// Wrap function constant `index` with the top `free_count` values as
    /// its captures.
    pub(crate) fn make_closure(&mut self, index: usize, free_count: usize) -> Result<(), RuntimeError> {
        let constant = self
            .constants
            .get(index)
            .ok_or_else(|| RuntimeError::IndexOutOfRange {
                at: self.location(),
                space: Space::Constant,
                index,
                bound: self.constants.len(),
            })?;
        let function = match constant {
            Value::Function(function) => Rc::clone(function),
            other => {
                return Err(RuntimeError::NotAFunction {
                    at: self.location(),
                    found: other.type_name(),
                })
            }
        };
        if free_count != function.num_free {
            return Err(RuntimeError::CaptureCountMismatch {
                at: self.location(),
                expected: function.num_free,
                got: free_count,
            });
        }

        let free = self.pop_n(free_count)?;
        self.push(Value::Closure(Rc::new(Closure::new(function, free))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::STACK_SIZE;
    use tern_common::{make, CompiledFunction, Instructions};

    fn function(params: usize, locals: usize) -> Rc<Closure> {
        let body: Instructions = vec![make(Opcode::Return, &[])].into_iter().collect();
        Rc::new(Closure::bare(Rc::new(CompiledFunction::new(
            body, params, locals,
        ))))
    }

    #[test]
    fn start_places_entry_frame_above_callee_slot() {
        let mut vm = Vm::new(vec![], VmConfig::default());
        vm.start(function(2, 3), &[Value::Integer(1), Value::Integer(2)])
            .unwrap();

        assert_eq!(vm.frame_depth(), 1);
        let frame = vm.frames().current().unwrap();
        assert_eq!(frame.base_pointer(), 1);
        assert!(!frame.has_started());
        // callee + 2 params + 1 extra local
        assert_eq!(vm.stack_height(), 4);
        assert_eq!(vm.stack()[1..], [Value::Integer(1), Value::Integer(2), Value::Null]);
    }

    #[test]
    fn start_rejects_wrong_argument_count() {
        let mut vm = Vm::new(vec![], VmConfig::default());
        let err = vm.start(function(1, 1), &[]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::ArityMismatch {
                at: Location {
                    frame: 0,
                    ip: None,
                    opcode: None
                },
                expected: 1,
                got: 0
            }
        );
        assert_eq!(vm.frame_depth(), 0);
    }

    #[test]
    fn start_with_zero_frames_allowed_overflows() {
        let mut vm = Vm::new(vec![], VmConfig::default().with_max_frames(0));
        let err = vm.start(function(0, 0), &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::StackOverflow { limit: 0, .. }));
    }

    #[test]
    fn locals_that_do_not_fit_fail_before_mutation() {
        let mut vm = Vm::new(vec![], VmConfig::default().with_stack_size(4));
        let err = vm.start(function(0, 8), &[]).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::OperandStackOverflow { capacity: 4, .. }
        ));
        assert_eq!(vm.stack_height(), 1);
        assert_eq!(vm.frame_depth(), 0);
    }

    #[test]
    fn oversized_locals_fail_before_mutation() {
        let mut vm = Vm::new(vec![], VmConfig::default());
        let err = vm.run(function(0, usize::MAX), &[]).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::OperandStackOverflow {
                capacity: STACK_SIZE,
                ..
            }
        ));
        assert_eq!(vm.stack_height(), 1);
        assert_eq!(vm.frame_depth(), 0);
    }

    #[test]
    fn entry_captures_must_match_function() {
        let body: Instructions = vec![make(Opcode::GetFree, &[0])].into_iter().collect();
        let function = CompiledFunction::new(body, 0, 0).with_free(2);
        let entry = Rc::new(Closure::bare(Rc::new(function)));

        let mut vm = Vm::new(vec![], VmConfig::default());
        let err = vm.run(entry, &[]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::CaptureCountMismatch {
                at: Location {
                    frame: 0,
                    ip: None,
                    opcode: None
                },
                expected: 2,
                got: 0
            }
        );
        assert_eq!(vm.frame_depth(), 0);
    }

    #[test]
    fn return_from_entry_ends_run() {
        let mut vm = Vm::new(vec![], VmConfig::default());
        vm.start(function(0, 2), &[]).unwrap();
        let done = vm.return_from_frame(Value::Integer(5)).unwrap();
        assert_eq!(done, Some(Value::Integer(5)));
        assert_eq!(vm.frame_depth(), 0);
        assert_eq!(vm.stack_height(), 0);
    }

    #[test]
    fn step_without_start() {
        let mut vm = Vm::new(vec![], VmConfig::default());
        assert_eq!(vm.step(), Err(RuntimeError::NotStarted));
    }
}
