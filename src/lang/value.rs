use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::Instructions;
use crate::lang::builtins::Builtin;

/// Runtime value in the Monkey language.
///
/// Everything that can live on the VM's operand stack, in a global slot or in
/// the constant pool. Heap-backed variants are reference counted so cloning a
/// value is always cheap; closures in particular routinely outlive the call
/// that created them.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// 64-bit signed integer.
    Integer(i64),

    Boolean(bool),

    Null,

    /// Immutable UTF-8 string.
    String(Rc<str>),

    Array(Rc<Vec<Object>>),

    /// Hash literal. Iteration follows insertion order.
    Hash(Rc<IndexMap<HashKey, Object>>),

    /// Function body produced by the compiler. Only ever found in the
    /// constant pool; the VM wraps it in a `Closure` before it is callable.
    CompiledFunction(Rc<CompiledFunction>),

    Closure(Rc<Closure>),

    Builtin(&'static Builtin),

    /// Error value returned by builtins. Not a VM failure.
    Error(Rc<str>),
}

impl Object {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Object::String(s.into())
    }

    pub fn array(elements: Vec<Object>) -> Self {
        Object::Array(Rc::new(elements))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Object::Error(message.into().into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Integer(_) => "INTEGER",
            Object::Boolean(_) => "BOOLEAN",
            Object::Null => "NULL",
            Object::String(_) => "STRING",
            Object::Array(_) => "ARRAY",
            Object::Hash(_) => "HASH",
            Object::CompiledFunction(_) => "COMPILED_FUNCTION",
            Object::Closure(_) => "CLOSURE",
            Object::Builtin(_) => "BUILTIN",
            Object::Error(_) => "ERROR",
        }
    }

    /// `false` and `null` are falsy, everything else (including `0`) is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Object::Boolean(false) | Object::Null)
    }

    /// Equality as observed by `==` / `!=` in Monkey programs for
    /// non-integer operands.
    ///
    /// Booleans, null and strings compare by value. Arrays, hashes and
    /// callables compare by identity: two independently built `[1]` are not
    /// equal, but a value is always equal to itself.
    pub fn same_value(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Integer(a), Object::Integer(b)) => a == b,
            (Object::Boolean(a), Object::Boolean(b)) => a == b,
            (Object::Null, Object::Null) => true,
            (Object::String(a), Object::String(b)) => a == b,
            (Object::Array(a), Object::Array(b)) => Rc::ptr_eq(a, b),
            (Object::Hash(a), Object::Hash(b)) => Rc::ptr_eq(a, b),
            (Object::CompiledFunction(a), Object::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Object::Closure(a), Object::Closure(b)) => Rc::ptr_eq(a, b),
            (Object::Builtin(a), Object::Builtin(b)) => std::ptr::eq(*a, *b),
            (Object::Error(a), Object::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<&str> for Object {
    fn from(value: &str) -> Self {
        Object::String(value.into())
    }
}

impl fmt::Display for Object {
    /// Format a value the way the REPL shows results.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Integer(n) => write!(f, "{}", n),
            Object::Boolean(b) => write!(f, "{}", b),
            Object::Null => write!(f, "null"),
            Object::String(s) => write!(f, "{}", s),
            Object::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Object::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Object::CompiledFunction(func) => write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(func)),
            Object::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Object::Builtin(_) => write!(f, "builtin function"),
            Object::Error(message) => write!(f, "ERROR: {}", message),
        }
    }
}

// =============================================================================
// Hash keys
// =============================================================================

/// The subset of values usable as hash keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    String(Rc<str>),
}

impl HashKey {
    /// Returns `None` for values that are unusable as hash keys.
    pub fn from_object(object: &Object) -> Option<HashKey> {
        match object {
            Object::Integer(n) => Some(HashKey::Integer(*n)),
            Object::Boolean(b) => Some(HashKey::Boolean(*b)),
            Object::String(s) => Some(HashKey::String(s.clone())),
            _ => None,
        }
    }
}

impl From<HashKey> for Object {
    fn from(key: HashKey) -> Self {
        match key {
            HashKey::Integer(n) => Object::Integer(n),
            HashKey::Boolean(b) => Object::Boolean(b),
            HashKey::String(s) => Object::String(s),
        }
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKey::Integer(n) => write!(f, "{}", n),
            HashKey::Boolean(b) => write!(f, "{}", b),
            HashKey::String(s) => write!(f, "{}", s),
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// A compiled function body. Immutable once the compiler has produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A compiled function paired with the free variables it captured.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Object>,
}

impl Closure {
    pub fn new(func: Rc<CompiledFunction>, free: Vec<Object>) -> Self {
        Closure { func, free }
    }
}
