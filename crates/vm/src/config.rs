//! VM limits.

/// Default maximum frame stack depth, entry frame included.
pub const MAX_FRAMES: usize = 1024;

/// Default operand stack capacity in slots.
pub const STACK_SIZE: usize = 2048;

/// Default number of addressable global slots.
pub const GLOBALS_SIZE: usize = 65_536;

/// Resource bounds for one VM instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum number of simultaneously active frames.
    pub max_frames: usize,
    /// Maximum operand stack height.
    pub stack_size: usize,
    /// Number of global slots GET_GLOBAL/SET_GLOBAL may address.
    pub globals_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_frames: MAX_FRAMES,
            stack_size: STACK_SIZE,
            globals_size: GLOBALS_SIZE,
        }
    }
}

impl VmConfig {
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn with_globals_size(mut self, globals_size: usize) -> Self {
        self.globals_size = globals_size;
        self
    }
}
