use std::fmt;
use std::rc::Rc;

use crate::lang::value::{HashKey, Object};

/// Native function signature. `None` means "no value"; the VM pushes `null`.
pub type BuiltinFn = fn(&[Object]) -> Option<Object>;

pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// The native-function table.
///
/// The position of each entry is its `GetBuiltin` operand. The compiler
/// registers the names in this order and the VM indexes this same slice, so
/// the two can never disagree.
pub static BUILTINS: &[Builtin] = &[
    Builtin { name: "len", func: len },
    Builtin { name: "first", func: first },
    Builtin { name: "last", func: last },
    Builtin { name: "rest", func: rest },
    Builtin { name: "push", func: push },
    Builtin { name: "keys", func: keys },
    Builtin { name: "puts", func: puts },
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

fn wrong_arg_count(got: usize, want: usize) -> Option<Object> {
    Some(Object::error(format!(
        "wrong number of arguments. got={}, want={}",
        got, want
    )))
}

fn len(args: &[Object]) -> Option<Object> {
    let result = match args {
        [Object::String(s)] => Object::Integer(s.chars().count() as i64),
        [Object::Array(elements)] => Object::Integer(elements.len() as i64),
        [Object::Hash(pairs)] => Object::Integer(pairs.len() as i64),
        [other] => Object::error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
        _ => return wrong_arg_count(args.len(), 1),
    };
    Some(result)
}

fn first(args: &[Object]) -> Option<Object> {
    let result = match args {
        [Object::Array(elements)] => elements.first().cloned().unwrap_or(Object::Null),
        [other] => Object::error(format!(
            "argument to `first` must be ARRAY, got {}",
            other.type_name()
        )),
        _ => return wrong_arg_count(args.len(), 1),
    };
    Some(result)
}

fn last(args: &[Object]) -> Option<Object> {
    let result = match args {
        [Object::Array(elements)] => elements.last().cloned().unwrap_or(Object::Null),
        [other] => Object::error(format!(
            "argument to `last` must be ARRAY, got {}",
            other.type_name()
        )),
        _ => return wrong_arg_count(args.len(), 1),
    };
    Some(result)
}

fn rest(args: &[Object]) -> Option<Object> {
    let result = match args {
        [Object::Array(elements)] if elements.is_empty() => Object::Null,
        [Object::Array(elements)] => Object::array(elements[1..].to_vec()),
        [other] => Object::error(format!(
            "argument to `rest` must be ARRAY, got {}",
            other.type_name()
        )),
        _ => return wrong_arg_count(args.len(), 1),
    };
    Some(result)
}

/// `push(array, x)` or `push(hash, key, value)`. Never mutates its input.
fn push(args: &[Object]) -> Option<Object> {
    let result = match args {
        [] => Object::error("no arguments provided for `push`"),
        [Object::Array(elements), item] => {
            let mut elements = elements.to_vec();
            elements.push(item.clone());
            Object::array(elements)
        }
        [Object::Array(_), ..] => return wrong_arg_count(args.len(), 2),
        [Object::Hash(pairs), key, value] => match HashKey::from_object(key) {
            Some(key) => {
                let mut pairs = (**pairs).clone();
                pairs.insert(key, value.clone());
                Object::Hash(Rc::new(pairs))
            }
            None => Object::error(format!(
                "second argument to `push` must be hashable, got {}",
                key.type_name()
            )),
        },
        [Object::Hash(_), ..] => return wrong_arg_count(args.len(), 3),
        [other, ..] => Object::error(format!(
            "argument to `push` must be ARRAY or HASH, got {}",
            other.type_name()
        )),
    };
    Some(result)
}

fn keys(args: &[Object]) -> Option<Object> {
    let result = match args {
        [Object::Hash(pairs)] => Object::array(pairs.keys().cloned().map(Object::from).collect()),
        [other] => Object::error(format!(
            "argument to `keys` must be HASH, got {}",
            other.type_name()
        )),
        _ => return wrong_arg_count(args.len(), 1),
    };
    Some(result)
}

fn puts(args: &[Object]) -> Option<Object> {
    for arg in args {
        println!("{}", arg);
    }
    None
}
