use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process;

use wisp_vm::{EvalError, SymbolTable, Value, Vm};

const PROMPT: &str = ">> ";
const GLOBALS_SIZE: usize = 65536;

fn main() {
    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("run") => run_file(),
        Some("cmd") => run_repl(),
        _ => {
            eprintln!("Usage: wisp <run|cmd>");
            process::exit(1);
        }
    }
}

fn run_file() {
    let contents = match fs::read_to_string("input.txt") {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("wisp: cannot read 'input.txt': {}", e);
            process::exit(1);
        }
    };
    let source: String = contents
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    if let Err(e) = wisp_vm::run(&source) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn run_repl() {
    let mut symbol_table = SymbolTable::new();
    for (i, builtin) in wisp_vm::builtins::catalog().iter().enumerate() {
        symbol_table.define_builtin(i, builtin.name);
    }
    let mut constants: Vec<Value> = Vec::new();
    let mut globals: Vec<Value> = vec![Value::Null; GLOBALS_SIZE];
    let mut pending = String::new();
    let stdin = io::stdin();

    prompt();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("wisp: {}", e);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed == "exit;" || trimmed == "quit;" {
            break;
        }

        pending.push_str(&line);
        pending.push('\n');

        if !trimmed.ends_with(';') {
            continue;
        }

        let source = std::mem::take(&mut pending);
        let (table, consts, globs) = eval_line(&source, symbol_table, constants, globals);
        symbol_table = table;
        constants = consts;
        globals = globs;

        prompt();
    }
}

fn eval_line(
    source: &str,
    symbol_table: SymbolTable,
    constants: Vec<Value>,
    globals: Vec<Value>,
) -> (SymbolTable, Vec<Value>, Vec<Value>) {
    let (tokens, lex_errors) = wisp_lexer::tokenize(source);
    if !lex_errors.is_empty() {
        for e in &lex_errors {
            eprintln!("[LexError] {}", e);
        }
        return (symbol_table, constants, globals);
    }

    let (program, parse_errors) = wisp_parser::Parser::new(tokens).parse_program();
    if !parse_errors.is_empty() {
        for e in &parse_errors {
            eprintln!("[ParseError] {}", e);
        }
        return (symbol_table, constants, globals);
    }

    let mut compiler = wisp_vm::Compiler::new_with_state(symbol_table, constants);
    if let Err(e) = compiler.compile(&program) {
        let (symbol_table, bytecode) = compiler.into_parts();
        eprintln!("{}", EvalError::Compile(e));
        return (symbol_table, bytecode.constants, globals);
    }

    let (symbol_table, bytecode) = compiler.into_parts();
    let constants = bytecode.constants.clone();
    let mut vm = Vm::new_with_globals_store(bytecode, globals);
    match vm.run() {
        Ok(()) => {
            let result = vm.last_popped_stack_elem();
            if result.inspect() != "null" {
                println!("{}", result.inspect());
            }
        }
        Err(e) => eprintln!("{}", EvalError::Runtime(e)),
    }
    (symbol_table, constants, vm.globals())
}

fn prompt() {
    print!("{}", PROMPT);
    io::stdout().flush().unwrap();
}
