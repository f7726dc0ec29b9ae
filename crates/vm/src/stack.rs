//! The operand stack shared by every frame.
//!
//! One buffer holds both local variables and expression temporaries. For
//! the innermost frame, slots `[base, base + locals)` are its locals and
//! everything above is scratch space. Pops take a `floor` so a frame can
//! never consume its own locals or anything that belongs to its callers.

use tern_common::Value;

/// Failure of a stack operation. The VM attaches the location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackFault {
    /// Growing would exceed the capacity.
    Overflow { capacity: usize },
    /// Popping would go below the floor.
    Underflow { floor: usize },
}

/// Bounded, growable operand stack.
#[derive(Debug, Clone)]
pub struct OperandStack {
    values: Vec<Value>,
    capacity: usize,
}

impl OperandStack {
    /// Create an empty stack holding at most `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self {
            values: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All values, bottom first.
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Whether the stack may grow to `height`.
    pub fn fits(&self, height: usize) -> bool {
        height <= self.capacity
    }

    pub fn push(&mut self, value: Value) -> Result<(), StackFault> {
        if self.values.len() >= self.capacity {
            return Err(StackFault::Overflow {
                capacity: self.capacity,
            });
        }
        self.values.push(value);
        Ok(())
    }

    /// Pop the top value if it sits at or above `floor`.
    pub fn pop_above(&mut self, floor: usize) -> Result<Value, StackFault> {
        if self.values.len() <= floor {
            return Err(StackFault::Underflow { floor });
        }
        self.values.pop().ok_or(StackFault::Underflow { floor })
    }

    /// Remove the top `count` values, all at or above `floor`, keeping
    /// their bottom-to-top order.
    pub fn split_above(&mut self, count: usize, floor: usize) -> Result<Vec<Value>, StackFault> {
        let start = self
            .values
            .len()
            .checked_sub(count)
            .filter(|&start| start >= floor)
            .ok_or(StackFault::Underflow { floor })?;
        Ok(self.values.split_off(start))
    }

    /// Value `distance` slots below the top (0 is the top).
    pub fn peek(&self, distance: usize) -> Option<&Value> {
        let index = self.values.len().checked_sub(distance + 1)?;
        self.values.get(index)
    }

    /// Grow to `height`, filling new slots with `Null`. Never shrinks.
    pub fn grow_to(&mut self, height: usize) -> Result<(), StackFault> {
        if !self.fits(height) {
            return Err(StackFault::Overflow {
                capacity: self.capacity,
            });
        }
        if height > self.values.len() {
            self.values.resize(height, Value::Null);
        }
        Ok(())
    }

    /// Shrink to `height`. Never grows.
    pub fn truncate(&mut self, height: usize) {
        self.values.truncate(height);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// View of the `count` local slots starting at `base`.
    ///
    /// Returns `None` when those slots are not all on the stack.
    pub fn locals(&mut self, base: usize, count: usize) -> Option<Locals<'_>> {
        let end = base.checked_add(count)?;
        self.values.get_mut(base..end).map(|slots| Locals { slots })
    }
}

/// Checked view of one frame's local slots. Indices are relative to the
/// frame's base pointer; anything outside the frame is unreachable.
#[derive(Debug)]
pub struct Locals<'a> {
    slots: &'a mut [Value],
}

impl Locals<'_> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.slots.get(index)
    }

    /// Store `value` in slot `index`. Hands the value back when the index
    /// is out of range.
    pub fn set(&mut self, index: usize, value: Value) -> Result<(), Value> {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(value),
        }
    }
}
