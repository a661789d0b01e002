pub mod builtins;
mod code;
mod compiler;
mod error;
mod symbol_table;
mod value;
mod vm;

pub use code::{disassemble, make, read_operands, Instructions, Op};
pub use compiler::{Bytecode, Compiler};
pub use error::{CompileError, EvalError, VmError};
pub use symbol_table::{Scope, Symbol, SymbolTable};
pub use value::{Closure, CompiledFunction, HashKey, Value, FALSE, NULL, TRUE};
pub use vm::Vm;

/// One-shot evaluation: lex, parse, compile, and run `source` from a fresh
/// symbol table and empty globals/constants. For REPL-style sessions that
/// must persist state across inputs, use `Compiler`/`Vm` directly.
pub fn run(source: &str) -> Result<Value, EvalError> {
    let (tokens, lex_errors) = wisp_lexer::tokenize(source);
    if !lex_errors.is_empty() {
        return Err(EvalError::Lex(lex_errors));
    }
    let (program, parse_errors) = wisp_parser::Parser::new(tokens).parse_program();
    if !parse_errors.is_empty() {
        return Err(EvalError::Parse(parse_errors));
    }
    let mut compiler = Compiler::new();
    compiler.compile(&program).map_err(EvalError::Compile)?;
    let mut vm = Vm::new(compiler.bytecode());
    vm.run().map_err(EvalError::Runtime)?;
    Ok(vm.last_popped_stack_elem())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn t_scenario_arithmetic_with_grouping() {
        assert_eq!(run("let a = 5 * (2 + 3); a;").unwrap(), Value::Integer(25));
    }

    #[test]
    fn t_scenario_recursive_fibonacci() {
        let src = "let fib = fn(n) { if (n < 2) { n } else { fib(n-1) + fib(n-2) } }; fib(10);";
        assert_eq!(run(src).unwrap(), Value::Integer(55));
    }

    #[test]
    fn t_scenario_closure_over_parameter() {
        let src = "let newAdder = fn(x) { fn(y) { x + y } }; let addTwo = newAdder(2); addTwo(3);";
        assert_eq!(run(src).unwrap(), Value::Integer(5));
    }

    #[test]
    fn t_scenario_push_is_non_destructive_on_binding() {
        let src = "let arr = [1, 2, 3]; let grown = push(arr, 4); grown;";
        assert_eq!(run(src).unwrap().inspect(), "[1, 2, 3, 4]");
        assert_eq!(run("let arr = [1, 2, 3]; arr;").unwrap().inspect(), "[1, 2, 3]");
    }

    #[test]
    fn t_scenario_hash_index_type_mismatch_is_runtime_error() {
        let src = r#"let h = {"one": 1, 2: "two", true: "t"}; h["one"] + h[2];"#;
        let err = run(src).unwrap_err();
        match err {
            EvalError::Runtime(VmError::UnsupportedTypes { left, right }) => {
                assert_eq!(left, "INTEGER");
                assert_eq!(right, "STRING");
            }
            other => panic!("expected runtime type error, got {:?}", other),
        }
    }

    #[test]
    fn t_scenario_free_variable_captured_by_value() {
        let src = "let counter = fn() { let c = 0; fn() { c } }; counter()();";
        assert_eq!(run(src).unwrap(), Value::Integer(0));
    }

    #[test]
    fn t_lex_errors_short_circuit_before_parsing() {
        let err = run("let x = 5 @ 3;").unwrap_err();
        assert!(matches!(err, EvalError::Lex(_)));
    }

    #[test]
    fn t_parse_errors_short_circuit_before_compiling() {
        let err = run("let x = ;").unwrap_err();
        assert!(matches!(err, EvalError::Parse(_)));
    }

    #[test]
    fn t_unknown_identifier_is_a_compile_error() {
        let err = run("undefined_name;").unwrap_err();
        assert_eq!(err, EvalError::Compile(CompileError::UnresolvedIdentifier("undefined_name".to_string())));
    }

    #[test]
    fn t_builtin_type_tags() {
        assert_eq!(run(r#"type(1)"#).unwrap(), Value::String(Rc::from("INTEGER")));
        assert_eq!(run(r#"type("x")"#).unwrap(), Value::String(Rc::from("STRING")));
        assert_eq!(run(r#"type([1])"#).unwrap(), Value::String(Rc::from("ARRAY")));
    }
}
