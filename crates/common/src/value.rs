//! Runtime value representation for the Tern VM.
//!
//! Values are what live on the operand stack, in globals, in the constant
//! table and in closure captures. Heap-shaped values are reference counted;
//! a value and everything it reaches stays on one thread.

use std::fmt;
use std::rc::Rc;

use crate::instructions::Instructions;

/// Host function callable from bytecode.
pub type BuiltinFn = fn(&[Value]) -> Result<Value, String>;

/// Runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// The "no value" sentinel. Also the result of a void return.
    Null,
    /// Signed 64-bit integer.
    Integer(i64),
    /// Boolean value.
    Boolean(bool),
    /// Immutable string.
    Str(Rc<str>),
    /// Immutable array.
    Array(Rc<[Value]>),
    /// A compiled function descriptor. Lives in the constant table; not
    /// callable until wrapped by CLOSURE.
    Function(Rc<CompiledFunction>),
    /// A function bundled with its captured values.
    Closure(Rc<Closure>),
    /// A host function.
    Builtin(Builtin),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Value {
    /// Build a string value.
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// Build an array value.
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(elements.into())
    }

    /// Name of this value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::Str(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Function(_) => "FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
        }
    }

    /// `false` and `null` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Boolean(false))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "]")
            }
            Value::Function(func) => write!(f, "<function {}>", func.display_name()),
            Value::Closure(closure) => {
                write!(f, "<closure {}>", closure.function.display_name())
            }
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
        }
    }
}

/// Compiled function descriptor, produced once by the compiler and shared
/// read-only by every closure over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunction {
    /// Function body.
    pub instructions: Instructions,
    /// Declared parameter count.
    pub num_parameters: usize,
    /// Local slot count, parameters included. Never less than `num_parameters`.
    pub num_locals: usize,
    /// Number of free variables a closure over this function captures.
    pub num_free: usize,
    /// Source name, if the compiler knew one.
    pub name: Option<String>,
}

impl CompiledFunction {
    /// Create a descriptor with no free variables.
    ///
    /// `num_locals` counts parameters; a smaller value is raised to
    /// `num_parameters`.
    pub fn new(instructions: Instructions, num_parameters: usize, num_locals: usize) -> Self {
        Self {
            instructions,
            num_parameters,
            num_locals: num_locals.max(num_parameters),
            num_free: 0,
            name: None,
        }
    }

    /// Set the free-variable count.
    pub fn with_free(mut self, num_free: usize) -> Self {
        self.num_free = num_free;
        self
    }

    /// Set the source name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name for diagnostics.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}

/// A compiled function plus the values it captured when it was created.
///
/// The capture list is fixed at construction. Capturing is by value: later
/// changes to the defining frame's locals are not observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    /// The function this closure runs.
    pub function: Rc<CompiledFunction>,
    free: Box<[Value]>,
}

impl Closure {
    /// Bind `free` as the capture list of `function`.
    pub fn new(function: Rc<CompiledFunction>, free: Vec<Value>) -> Self {
        Self {
            function,
            free: free.into_boxed_slice(),
        }
    }

    /// A closure with no captures.
    pub fn bare(function: Rc<CompiledFunction>) -> Self {
        Self::new(function, Vec::new())
    }

    /// Captured values, in capture order.
    pub fn free(&self) -> &[Value] {
        &self.free
    }

    /// Function body.
    pub fn instructions(&self) -> &Instructions {
        &self.function.instructions
    }
}

/// Host function registered with a VM.
#[derive(Clone, Copy)]
pub struct Builtin {
    /// Name used in diagnostics and equality.
    pub name: &'static str,
    /// Required argument count; `None` accepts any count.
    pub arity: Option<usize>,
    /// Implementation.
    pub func: BuiltinFn,
}

impl Builtin {
    /// Create a builtin with a fixed arity.
    pub fn new(name: &'static str, arity: usize, func: BuiltinFn) -> Self {
        Self {
            name,
            arity: Some(arity),
            func,
        }
    }

    /// Create a builtin that accepts any number of arguments.
    pub fn variadic(name: &'static str, func: BuiltinFn) -> Self {
        Self {
            name,
            arity: None,
            func,
        }
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::make;
    use crate::opcode::Opcode;

    fn identity() -> Rc<CompiledFunction> {
        let body: Instructions = vec![
            make(Opcode::GetLocal, &[0]),
            make(Opcode::ReturnValue, &[]),
        ]
        .into_iter()
        .collect();
        Rc::new(CompiledFunction::new(body, 1, 1).named("identity"))
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Null.type_name(), "NULL");
        assert_eq!(Value::Integer(1).type_name(), "INTEGER");
        assert_eq!(Value::Boolean(true).type_name(), "BOOLEAN");
        assert_eq!(Value::string("a").type_name(), "STRING");
        assert_eq!(Value::array(vec![]).type_name(), "ARRAY");
        assert_eq!(Value::Function(identity()).type_name(), "FUNCTION");
        assert_eq!(
            Value::Closure(Rc::new(Closure::bare(identity()))).type_name(),
            "CLOSURE"
        );
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::string("").is_truthy());
    }

    #[test]
    fn equality_scalars_and_strings() {
        assert_eq!(Value::Integer(42), Value::Integer(42));
        assert_ne!(Value::Integer(42), Value::Integer(43));
        assert_ne!(Value::Integer(1), Value::Boolean(true));
        assert_eq!(Value::string("ab"), Value::string("ab"));
        assert_eq!(Value::Null, Value::Null);
    }

    #[test]
    fn equality_arrays_elementwise() {
        let a = Value::array(vec![Value::Integer(1), Value::Null]);
        let b = Value::array(vec![Value::Integer(1), Value::Null]);
        let c = Value::array(vec![Value::Integer(1)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn closures_compare_by_identity() {
        let func = identity();
        let a = Rc::new(Closure::bare(Rc::clone(&func)));
        let b = Rc::new(Closure::bare(func));
        assert_eq!(Value::Closure(Rc::clone(&a)), Value::Closure(Rc::clone(&a)));
        assert_ne!(Value::Closure(a), Value::Closure(b));
    }

    #[test]
    fn locals_never_below_parameters() {
        let func = CompiledFunction::new(Instructions::default(), 3, 1);
        assert_eq!(func.num_locals, 3);
    }

    #[test]
    fn closure_keeps_capture_order() {
        let func = Rc::new(CompiledFunction::new(Instructions::default(), 0, 0).with_free(2));
        let closure = Closure::new(func, vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(closure.free(), &[Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn display() {
        assert_eq!(Value::Integer(-3).to_string(), "-3");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::array(vec![Value::Integer(1), Value::string("x")]).to_string(),
            "[1, x]"
        );
        assert_eq!(
            Value::Closure(Rc::new(Closure::bare(identity()))).to_string(),
            "<closure identity>"
        );
    }

    #[test]
    fn builtin_debug_omits_pointer() {
        fn noop(_: &[Value]) -> Result<Value, String> {
            Ok(Value::Null)
        }
        let builtin = Builtin::new("noop", 0, noop);
        assert_eq!(
            format!("{builtin:?}"),
            "Builtin { name: \"noop\", arity: Some(0) }"
        );
    }
}
