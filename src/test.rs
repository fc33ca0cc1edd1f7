use std::fs;

use mplbin::{DataEntry, IfCond, Instr, Module, TypeTag, Value};

use crate::expr::{compile, EvalError, ExprError, Fetch, Scalar};
use crate::{coerce, parse_input, Engine, ExitCode, ScriptConsole};

struct NoVars;

impl Fetch for NoVars {
    fn fetch(&mut self, id: u32) -> Result<Scalar, EvalError> {
        Err(EvalError::Undefined(id))
    }
}

struct OneVar(Scalar);

impl Fetch for OneVar {
    fn fetch(&mut self, _id: u32) -> Result<Scalar, EvalError> {
        Ok(self.0.clone())
    }
}

fn eval_const(src: &str) -> Scalar {
    compile(src).unwrap().eval(&mut NoVars).unwrap()
}

#[test]
fn expr_precedence() {
    assert_eq!(eval_const("(2+3*4)"), Scalar::Int(14));
    assert_eq!(eval_const("(2*3+4)"), Scalar::Int(10));
    assert_eq!(eval_const("((2+3)*4)"), Scalar::Int(20));
}

#[test]
fn expr_sign_runs_collapse() {
    assert_eq!(eval_const("(-(-2))"), Scalar::Int(2));
    assert_eq!(eval_const("(--2)"), Scalar::Int(2));
    assert_eq!(eval_const("(2+-3)"), Scalar::Int(-1));
    assert_eq!(eval_const("(---2)"), Scalar::Int(-2));
}

#[test]
fn expr_not_runs_collapse() {
    assert_eq!(eval_const("(!TRUE)"), Scalar::Bool(false));
    assert_eq!(eval_const("(!!TRUE)"), Scalar::Bool(true));
    assert_eq!(eval_const("(!!!FALSE)"), Scalar::Bool(true));
}

#[test]
fn expr_comparisons() {
    assert_eq!(eval_const("(3<4)"), Scalar::Bool(true));
    assert_eq!(eval_const("(4>=4)"), Scalar::Bool(true));
    assert_eq!(eval_const("(3>=4)"), Scalar::Bool(false));
    assert_eq!(eval_const("(3!=4)"), Scalar::Bool(true));
}

#[test]
fn expr_logical() {
    assert_eq!(eval_const("(1<2 && 2<3)"), Scalar::Bool(true));
    assert_eq!(eval_const("(1<2 && 3<2)"), Scalar::Bool(false));
    assert_eq!(eval_const("(1>2 || 2<3)"), Scalar::Bool(true));
}

#[test]
fn expr_width_promotion() {
    assert_eq!(eval_const("(1+2.5)"), Scalar::Float(3.5));
    assert_eq!(eval_const("(TRUE+TRUE)"), Scalar::Int(2));
}

#[test]
fn expr_power_is_double() {
    assert_eq!(eval_const("(2^10)"), Scalar::Double(1024.0));
}

#[test]
fn expr_shifts_are_int_only() {
    assert_eq!(eval_const("(1<<4)"), Scalar::Int(16));
    assert_eq!(eval_const("(256>>4)"), Scalar::Int(16));
    assert!(matches!(
        compile("(1.5<<2)"),
        Err(ExprError::Type { .. })
    ));
}

#[test]
fn expr_division_by_zero() {
    let tree = compile("(1/0)").unwrap();
    assert_eq!(tree.eval(&mut NoVars), Err(EvalError::DivisionByZero));
    let tree = compile("(5%0)").unwrap();
    assert_eq!(tree.eval(&mut NoVars), Err(EvalError::DivisionByZero));
}

#[test]
fn expr_intrinsics() {
    assert_eq!(eval_const("(abs(-3))"), Scalar::Double(3.0));
    assert_eq!(eval_const("(max2(3; 7))"), Scalar::Double(7.0));
    assert_eq!(eval_const("(minx(5; 2; 9))"), Scalar::Double(2.0));
    assert_eq!(eval_const("(floor(pi))"), Scalar::Double(3.0));
    assert_eq!(eval_const("(sqrt(16))"), Scalar::Double(4.0));
}

#[test]
fn expr_intrinsic_arity() {
    assert!(matches!(
        compile("(max2(3))"),
        Err(ExprError::BadArity { .. })
    ));
}

#[test]
fn expr_unknown_name() {
    assert!(matches!(compile("(foo)"), Err(ExprError::UnknownName(_))));
}

#[test]
fn expr_idempotent_without_variables() {
    let tree = compile("(sqrt(2)+1)").unwrap();
    let first = tree.eval(&mut NoVars).unwrap();
    let second = tree.eval(&mut NoVars).unwrap();
    assert_eq!(first, second);
}

#[test]
fn expr_variable_casts_to_numeric_side() {
    // The fetched value is coerced to the static side's type: 4.5 truncates
    // to 4 before the comparison against the INT literal.
    let tree = compile("(@1<4)").unwrap();
    let result = tree.eval(&mut OneVar(Scalar::Float(4.5))).unwrap();
    assert_eq!(result, Scalar::Bool(false));
    let result = tree.eval(&mut OneVar(Scalar::Float(3.9))).unwrap();
    assert_eq!(result, Scalar::Bool(true));
}

#[test]
fn coercion_table() {
    assert_eq!(
        coerce(Scalar::Bool(true), TypeTag::INT),
        Ok(Value::Int(1))
    );
    assert_eq!(
        coerce(Scalar::Int(0), TypeTag::BOOL),
        Ok(Value::Bool(false))
    );
    assert_eq!(coerce(Scalar::Int(1), TypeTag::BOOL), Ok(Value::Bool(true)));
    assert_eq!(
        coerce(Scalar::Int(16777215), TypeTag::FLOAT),
        Ok(Value::Float(16777215.0))
    );
    assert_eq!(coerce(Scalar::Float(3.9), TypeTag::INT), Ok(Value::Int(3)));
    assert_eq!(
        coerce(Scalar::Float(-3.9), TypeTag::INT),
        Ok(Value::Int(-3))
    );
    assert_eq!(
        coerce(Scalar::Double(2.25), TypeTag::FLOAT),
        Ok(Value::Float(2.25))
    );
    assert!(coerce(Scalar::Int(5), TypeTag::STRING).is_err());
    assert_eq!(
        coerce(Scalar::Str("hi".to_string()), TypeTag::STRING),
        Ok(Value::Str("hi".to_string()))
    );
}

#[test]
fn input_parsing() {
    assert_eq!(parse_input("5", TypeTag::INT), Some(Value::Int(5)));
    assert_eq!(parse_input(" 5 ", TypeTag::INT), Some(Value::Int(5)));
    assert_eq!(parse_input("3.5", TypeTag::FLOAT), Some(Value::Float(3.5)));
    assert_eq!(parse_input("3,5", TypeTag::FLOAT), Some(Value::Float(3.5)));
    assert_eq!(parse_input("TRUE", TypeTag::BOOL), Some(Value::Bool(true)));
    assert_eq!(parse_input("0", TypeTag::BOOL), Some(Value::Bool(false)));
    assert_eq!(parse_input("abc", TypeTag::INT), None);
    assert_eq!(
        parse_input("abc", TypeTag::STRING),
        Some(Value::Str("abc".to_string()))
    );
}

fn run_in_dir(
    name: &str,
    modules: &[(&str, Module)],
    main: &str,
    input: Vec<&str>,
) -> (ExitCode, Vec<String>) {
    let dir = std::env::temp_dir().join(format!("mpl-engine-{}", name));
    fs::create_dir_all(&dir).unwrap();
    for (file, module) in modules {
        mplbin::write_file(dir.join(file), module).unwrap();
    }

    let console = ScriptConsole::new(input);
    let output = console.output();
    let mut engine = Engine::with_root(dir.clone(), Box::new(console));
    let code = engine.execute_file(dir.join(main)).unwrap();

    fs::remove_dir_all(&dir).ok();
    let lines = output.borrow().clone();
    (code, lines)
}

fn simple_module(instructions: Vec<Instr>) -> Module {
    Module::from(Vec::new(), instructions, Vec::new())
}

#[test]
fn run_write_literal() {
    let module = simple_module(vec![Instr::WriteStr("hello".to_string()), Instr::Eof]);
    let (code, lines) = run_in_dir("write-literal", &[("main.bin", module)], "main.bin", vec![]);
    assert_eq!(code, ExitCode::Halted);
    assert_eq!(lines, vec!["hello"]);
}

#[test]
fn run_set_and_write() {
    let module = simple_module(vec![
        Instr::SetValue {
            var: 1,
            value: Value::Int(5),
        },
        Instr::WriteVar(1),
        Instr::Eof,
    ]);
    let (code, lines) = run_in_dir("set-write", &[("main.bin", module)], "main.bin", vec![]);
    assert_eq!(code, ExitCode::Halted);
    assert_eq!(lines, vec!["5"]);
}

#[test]
fn run_expression_cell() {
    let module = simple_module(vec![
        Instr::SetExpr {
            var: 1,
            ty: TypeTag::INT,
            expr: "(2+3*4)".to_string(),
        },
        Instr::WriteVar(1),
        Instr::Eof,
    ]);
    let (_, lines) = run_in_dir("expr-cell", &[("main.bin", module)], "main.bin", vec![]);
    assert_eq!(lines, vec!["14"]);
}

#[test]
fn run_expression_cell_snapshots_at_set() {
    // x captures a's value when the SET executes; changing a afterwards
    // does not change x.
    let module = simple_module(vec![
        Instr::SetValue {
            var: 1,
            value: Value::Int(2),
        },
        Instr::SetExpr {
            var: 2,
            ty: TypeTag::INT,
            expr: "(@1+1)".to_string(),
        },
        Instr::SetValue {
            var: 1,
            value: Value::Int(10),
        },
        Instr::WriteVar(2),
        Instr::Eof,
    ]);
    let (_, lines) = run_in_dir("expr-snapshot", &[("main.bin", module)], "main.bin", vec![]);
    assert_eq!(lines, vec!["3"]);
}

#[test]
fn run_self_referential_assignment() {
    // Each SET reads the previous value of its own target.
    let module = simple_module(vec![
        Instr::SetValue {
            var: 1,
            value: Value::Int(1),
        },
        Instr::SetExpr {
            var: 1,
            ty: TypeTag::INT,
            expr: "(@1+1)".to_string(),
        },
        Instr::SetExpr {
            var: 1,
            ty: TypeTag::INT,
            expr: "(@1+1)".to_string(),
        },
        Instr::WriteVar(1),
        Instr::Eof,
    ]);
    let (code, lines) = run_in_dir("expr-self", &[("main.bin", module)], "main.bin", vec![]);
    assert_eq!(code, ExitCode::Halted);
    assert_eq!(lines, vec!["3"]);
}

fn branch_module(cond: bool) -> Module {
    simple_module(vec![
        Instr::SetValue {
            var: 1,
            value: Value::Bool(cond),
        },
        Instr::If {
            target: 4,
            cond: IfCond::Var(1),
        },
        Instr::SetValue {
            var: 2,
            value: Value::Int(1),
        },
        Instr::Jump { target: 5 },
        Instr::SetValue {
            var: 2,
            value: Value::Int(0),
        },
        Instr::End,
        Instr::WriteVar(2),
        Instr::Eof,
    ])
}

#[test]
fn run_if_both_arms() {
    let (_, lines) = run_in_dir(
        "if-true",
        &[("main.bin", branch_module(true))],
        "main.bin",
        vec![],
    );
    assert_eq!(lines, vec!["1"]);

    let (_, lines) = run_in_dir(
        "if-false",
        &[("main.bin", branch_module(false))],
        "main.bin",
        vec![],
    );
    assert_eq!(lines, vec!["0"]);
}

#[test]
fn run_input() {
    let module = simple_module(vec![
        Instr::Input {
            var: 1,
            ty: TypeTag::INT,
        },
        Instr::WriteVar(1),
        Instr::Eof,
    ]);
    let (code, lines) = run_in_dir("input", &[("main.bin", module)], "main.bin", vec!["42"]);
    assert_eq!(code, ExitCode::Halted);
    assert_eq!(lines, vec!["42"]);
}

#[test]
fn run_input_invalid() {
    let module = simple_module(vec![
        Instr::Input {
            var: 1,
            ty: TypeTag::INT,
        },
        Instr::Eof,
    ]);
    let (code, _) = run_in_dir(
        "input-invalid",
        &[("main.bin", module)],
        "main.bin",
        vec!["abc"],
    );
    assert_eq!(code, ExitCode::InvalidInput);
}

#[test]
fn run_define_call_ret() {
    let module = simple_module(vec![
        Instr::Define { id: 1, start: 2 },
        Instr::Jump { target: 4 },
        Instr::SetValue {
            var: 1,
            value: Value::Int(99),
        },
        Instr::Ret,
        Instr::Call { id: 1 },
        Instr::WriteVar(1),
        Instr::Eof,
    ]);
    let (code, lines) = run_in_dir("call-ret", &[("main.bin", module)], "main.bin", vec![]);
    assert_eq!(code, ExitCode::Halted);
    assert_eq!(lines, vec!["99"]);
}

#[test]
fn run_ret_underflow() {
    let module = simple_module(vec![Instr::Ret, Instr::Eof]);
    let (code, _) = run_in_dir("ret-underflow", &[("main.bin", module)], "main.bin", vec![]);
    assert_eq!(code, ExitCode::EmptyReturnStack);
}

#[test]
fn run_division_by_zero() {
    let module = simple_module(vec![
        Instr::SetExpr {
            var: 1,
            ty: TypeTag::INT,
            expr: "(1/0)".to_string(),
        },
        Instr::WriteVar(1),
        Instr::Eof,
    ]);
    let (code, _) = run_in_dir("div-zero", &[("main.bin", module)], "main.bin", vec![]);
    assert_eq!(code, ExitCode::DivisionByZero);
}

#[test]
fn run_undefined_object() {
    let module = simple_module(vec![Instr::WriteVar(5), Instr::Eof]);
    let (code, _) = run_in_dir("undefined", &[("main.bin", module)], "main.bin", vec![]);
    assert_eq!(code, ExitCode::UndefinedObject);

    // Id 0 is the unresolved-reference sentinel.
    let module = simple_module(vec![Instr::WriteVar(0), Instr::Eof]);
    let (code, _) = run_in_dir("undefined-0", &[("main.bin", module)], "main.bin", vec![]);
    assert_eq!(code, ExitCode::UndefinedObject);
}

#[test]
fn run_push_removes_variable() {
    let module = simple_module(vec![
        Instr::SetValue {
            var: 1,
            value: Value::Int(5),
        },
        Instr::Push {
            id: 1,
            procedure: false,
        },
        Instr::WriteVar(1),
        Instr::Eof,
    ]);
    let (code, _) = run_in_dir("push", &[("main.bin", module)], "main.bin", vec![]);
    assert_eq!(code, ExitCode::UndefinedObject);
}

#[test]
fn run_unresolved_jump_is_bad() {
    let module = simple_module(vec![Instr::Jump { target: -1 }, Instr::Eof]);
    let (code, _) = run_in_dir("bad-jump", &[("main.bin", module)], "main.bin", vec![]);
    assert_eq!(code, ExitCode::BadJump);
}

fn include_lib() -> Module {
    Module::from(
        Vec::new(),
        vec![
            Instr::SetValue {
                var: 1,
                value: Value::Int(7),
            },
            Instr::Eof,
        ],
        vec![DataEntry::variable(1, "k")],
    )
}

#[test]
fn run_include_imports_variable() {
    // Main never sets k; its data segment imports it from the include, so
    // reads go through a linked cell into the include's context.
    let main = Module::from(
        vec![Instr::Include {
            index: 0,
            path: "lib.bin".to_string(),
        }],
        vec![Instr::WriteVar(1), Instr::Eof],
        vec![DataEntry {
            import: Some(0),
            ..DataEntry::variable(1, "k")
        }],
    );
    let (code, lines) = run_in_dir(
        "include-import",
        &[("lib.bin", include_lib()), ("main.bin", main)],
        "main.bin",
        vec![],
    );
    assert_eq!(code, ExitCode::Halted);
    assert_eq!(lines, vec!["7"]);
}

#[test]
fn run_include_writeback() {
    // Both modules own k. Calling into the include synchronizes the caller's
    // value on the way in and the callee's value on the way back.
    let lib = Module::from(
        Vec::new(),
        vec![
            Instr::SetValue {
                var: 1,
                value: Value::Int(7),
            },
            Instr::Define { id: 1, start: 3 },
            Instr::Jump { target: 5 },
            Instr::SetValue {
                var: 1,
                value: Value::Int(9),
            },
            Instr::Ret,
            Instr::Eof,
        ],
        vec![
            DataEntry::variable(1, "k"),
            DataEntry::procedure(1, "bump"),
        ],
    );
    let main = Module::from(
        vec![Instr::Include {
            index: 0,
            path: "lib.bin".to_string(),
        }],
        vec![
            Instr::SetValue {
                var: 1,
                value: Value::Int(1),
            },
            Instr::Call { id: 1 },
            Instr::WriteVar(1),
            Instr::Eof,
        ],
        vec![
            DataEntry {
                intersections: vec![(0, 1)],
                ..DataEntry::variable(1, "k")
            },
            DataEntry {
                import: Some(0),
                ..DataEntry::procedure(1, "bump")
            },
        ],
    );
    let (code, lines) = run_in_dir(
        "include-writeback",
        &[("lib.bin", lib), ("main.bin", main)],
        "main.bin",
        vec![],
    );
    assert_eq!(code, ExitCode::Halted);
    assert_eq!(lines, vec!["9"]);
}

#[test]
fn run_module_cache_is_idempotent() {
    let dir = std::env::temp_dir().join("mpl-engine-cache");
    fs::create_dir_all(&dir).unwrap();
    let module = simple_module(vec![Instr::WriteStr("boot".to_string()), Instr::Eof]);
    mplbin::write_file(dir.join("main.bin"), &module).unwrap();

    let console = ScriptConsole::new(Vec::<String>::new());
    let mut engine = Engine::with_root(dir.clone(), Box::new(console));
    engine.execute_file(dir.join("main.bin")).unwrap();
    let first = engine.cached("main");
    engine.execute_file(dir.join("main.bin")).unwrap();
    let second = engine.cached("main");

    fs::remove_dir_all(&dir).ok();
    assert!(first.is_some());
    assert_eq!(first, second);
}
