use assert2::{check, let_assert};

use monkey::runtime::RuntimeError;
use monkey::{MonkeyError, Object, Session, VmConfig};

fn eval(source: &str) -> Result<Object, MonkeyError> {
    Session::new().eval(source)
}

fn eval_display(source: &str) -> String {
    match eval(source) {
        Ok(value) => value.to_string(),
        Err(err) => err.to_string(),
    }
}

#[test]
fn recursive_fibonacci() {
    let source = "
        let fibonacci = fn(x) {
            if (x == 0) { return 0; }
            if (x == 1) { return 1; }
            fibonacci(x - 1) + fibonacci(x - 2);
        };
        fibonacci(15);
    ";
    let_assert!(Ok(value) = eval(source));
    check!(value == Object::Integer(610));
}

#[test]
fn closures_capture_their_environment() {
    let source = "
        let newAdder = fn(a, b) {
            let c = a + b;
            fn(d) { let e = d + c; fn(f) { e + f } }
        };
        let adder = newAdder(1, 2);
        adder(8)(100);
    ";
    let_assert!(Ok(value) = eval(source));
    check!(value == Object::Integer(111));
}

#[test]
fn higher_order_map_with_builtins() {
    let source = "
        let map = fn(arr, f) {
            let iter = fn(arr, acc) {
                if (len(arr) == 0) { acc } else { iter(rest(arr), push(acc, f(first(arr)))) }
            };
            iter(arr, []);
        };
        map([1, 2, 3, 4], fn(x) { x * 2 });
    ";
    check!(eval_display(source) == "[2, 4, 6, 8]");
}

#[test]
fn hashes_keep_insertion_order() {
    check!(eval_display(r#"{"b": 2, "a": 1, 3: true}"#) == "{b: 2, a: 1, 3: true}");
    check!(eval_display(r#"keys({"b": 2, "a": 1})"#) == "[b, a]");
    check!(eval_display(r#"{"one": 1}["one"]"#) == "1");
    check!(eval_display(r#"{"one": 1}["two"]"#) == "null");
}

#[test]
fn string_concatenation_and_len() {
    check!(eval_display(r#"let s = "mon" + "key"; len(s)"#) == "6");
}

#[test]
fn builtin_errors_are_values() {
    check!(eval_display("len(1)") == "ERROR: argument to `len` not supported, got INTEGER");
    check!(eval_display("first(1)") == "ERROR: argument to `first` must be ARRAY, got INTEGER");
}

#[test]
fn runtime_errors_are_reported() {
    check!(eval_display("1 + true") == "runtime error: unsupported types for binary operation: INTEGER BOOLEAN");
    check!(eval_display("fn(a) { a }()") == "runtime error: wrong number of arguments: want=1, got=0");
    check!(eval_display("1()") == "runtime error: calling non-function and non-built-in");
    check!(eval_display("-true") == "runtime error: unsupported type for negation: BOOLEAN");
}

#[test]
fn front_end_errors_carry_positions() {
    check!(eval_display("let = 1;") == "parse error: 1:5: expected identifier after 'let', got '='");
    let_assert!(Err(MonkeyError::Lexer(_)) = eval("let a = 1 @ 2;"));
}

#[test]
fn deep_recursion_overflows_frames() {
    let mut session = Session::with_config(VmConfig {
        max_frames: 64,
        ..VmConfig::default()
    });
    let_assert!(
        Err(MonkeyError::Runtime(RuntimeError::FrameOverflow)) =
            session.eval("let f = fn(n) { f(n + 1) }; f(0);")
    );
}

#[test]
fn repl_style_session() {
    let mut session = Session::new();
    let_assert!(Ok(_) = session.eval("let counter = fn(x) { if (x > 2) { x } else { counter(x + 1) } };"));
    let_assert!(Ok(_) = session.eval("let start = 0;"));
    let_assert!(Ok(value) = session.eval("counter(start)"));
    check!(value == Object::Integer(3));

    let_assert!(Err(MonkeyError::Compile(_)) = session.eval("missing"));
    let_assert!(Ok(value) = session.eval("start + 1"));
    check!(value == Object::Integer(1));
}

#[test]
fn deeply_nested_input_is_rejected_by_the_parser() {
    let source = format!("{}1{}", "[".repeat(50_000), "]".repeat(50_000));
    let_assert!(Err(MonkeyError::Parser(err)) = eval(&source));
    check!(err.message.contains("nested deeper than"));

    let sum = format!("1{}", " + 1".repeat(200));
    let_assert!(Ok(value) = eval(&sum));
    check!(value == Object::Integer(201));
}
