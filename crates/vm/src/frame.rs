//! Activation records and the frame stack.
//!
//! Language-level calls never recurse on the host stack: every call pushes
//! a [`Frame`] onto the [`FrameStack`] and every return pops one.

use std::fmt;
use std::rc::Rc;

use tern_common::{Closure, DecodeError, Decoded, Instructions};

/// One in-progress invocation of a closure.
#[derive(Debug, Clone)]
pub struct Frame {
    closure: Rc<Closure>,
    /// Offset of the instruction being executed; `None` until the first fetch.
    ip: Option<usize>,
    /// Offset of the next instruction to fetch.
    pc: usize,
    base_pointer: usize,
    floor: usize,
}

impl Frame {
    /// Create a frame whose locals start at `base_pointer`.
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        let floor = base_pointer.saturating_add(closure.function.num_locals);
        Self {
            closure,
            ip: None,
            pc: 0,
            base_pointer,
            floor,
        }
    }

    pub fn closure(&self) -> &Rc<Closure> {
        &self.closure
    }

    pub fn instructions(&self) -> &Instructions {
        self.closure.instructions()
    }

    pub fn ip(&self) -> Option<usize> {
        self.ip
    }

    pub fn has_started(&self) -> bool {
        self.ip.is_some()
    }

    /// First operand stack slot owned by this frame.
    pub fn base_pointer(&self) -> usize {
        self.base_pointer
    }

    pub fn num_locals(&self) -> usize {
        self.closure.function.num_locals
    }

    /// First slot above this frame's locals. Expression values live here
    /// and above.
    pub fn floor(&self) -> usize {
        self.floor
    }

    /// Decode the next instruction and move past it.
    ///
    /// `ip` is advanced before the caller runs the instruction, so jumps and
    /// calls observe the correct resume point. Returns `None` at the end of
    /// the function body.
    pub(crate) fn fetch(&mut self) -> Result<Option<Decoded>, DecodeError> {
        if self.pc >= self.instructions().len() {
            return Ok(None);
        }
        self.ip = Some(self.pc);
        let decoded = self.instructions().decode_at(self.pc)?;
        self.pc += decoded.width;
        Ok(Some(decoded))
    }

    /// Continue at `target`. The caller has checked it is within the body.
    pub(crate) fn jump(&mut self, target: usize) {
        self.pc = target;
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.closure.function.display_name())?;
        match self.ip {
            Some(ip) => write!(f, " at offset {ip}")?,
            None => write!(f, " (not started)")?,
        }
        write!(f, ", base {}", self.base_pointer)
    }
}

/// Depth-bounded stack of frames. The top is the executing invocation.
#[derive(Debug, Clone)]
pub struct FrameStack {
    frames: Vec<Frame>,
    max_depth: usize,
}

impl FrameStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether one more frame fits under the depth limit.
    pub fn has_room(&self) -> bool {
        self.frames.len() < self.max_depth
    }

    pub fn current(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Frames from the entry frame up.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Push `frame`, or hand it back if the depth limit is reached.
    pub(crate) fn push(&mut self, frame: Frame) -> Result<(), Frame> {
        if !self.has_room() {
            return Err(frame);
        }
        self.frames.push(frame);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Backtrace, innermost frame first.
impl fmt::Display for FrameStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, frame) in self.frames.iter().enumerate().rev() {
            writeln!(f, "#{index} {frame}")?;
        }
        Ok(())
    }
}
