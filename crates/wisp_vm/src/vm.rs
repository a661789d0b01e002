use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::builtins::{self, Builtin};
use crate::code::{read_u16, read_u8, Op};
use crate::compiler::Bytecode;
use crate::error::VmError;
use crate::value::{Closure, CompiledFunction, Value, FALSE, NULL, TRUE};

const STACK_SIZE: usize = 2048;
const GLOBALS_SIZE: usize = 65536;
const MAX_FRAMES: usize = 1024;

struct Frame {
    closure: Rc<Closure>,
    ip: isize,
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame { closure, ip: -1, base_pointer }
    }

    fn instructions(&self) -> &[u8] {
        &self.closure.func.instructions
    }
}

pub struct Vm {
    constants: Vec<Value>,
    stack: Vec<Value>,
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
    builtins: Vec<Builtin>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_globals_store(bytecode, vec![NULL; GLOBALS_SIZE])
    }

    /// For REPL session reuse: carries forward a previously populated globals vector.
    pub fn new_with_globals_store(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let main_fn = CompiledFunction { instructions: bytecode.instructions, num_locals: 0, num_parameters: 0 };
        let main_closure = Rc::new(Closure { func: Rc::new(main_fn), free: Vec::new() });
        let main_frame = Frame::new(main_closure, 0);

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(main_frame);

        Vm {
            constants: bytecode.constants,
            stack: vec![NULL; STACK_SIZE],
            sp: 0,
            globals,
            frames,
            builtins: builtins::catalog(),
        }
    }

    pub fn globals(self) -> Vec<Value> {
        self.globals
    }

    pub fn last_popped_stack_elem(&self) -> Value {
        self.stack[self.sp].clone()
    }

    fn current_frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty while running")
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), VmError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(VmError::FrameOverflow);
        }
        self.frames.push(frame);
        Ok(())
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("pop_frame called with no active frame")
    }

    fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.sp >= STACK_SIZE {
            return Err(VmError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        if self.sp == 0 {
            return Err(VmError::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    pub fn run(&mut self) -> Result<(), VmError> {
        loop {
            let (ip, ins_len) = {
                let frame = self.current_frame();
                (frame.ip, frame.instructions().len())
            };
            if ip + 1 >= ins_len as isize {
                if self.frames.len() == 1 {
                    break;
                }
                self.pop_frame();
                continue;
            }

            let ip = ip + 1;
            self.current_frame().ip = ip;
            let byte = self.current_frame().instructions()[ip as usize];
            let Some(op) = Op::from_u8(byte) else {
                return Err(VmError::UnknownOpcode(byte));
            };

            match op {
                Op::Constant => {
                    let idx = self.read_u16_operand();
                    let value = self.constants[idx].clone();
                    self.push(value)?;
                }
                Op::Pop => {
                    self.pop()?;
                }
                Op::Add | Op::Sub | Op::Mul | Op::Div => self.execute_binary_op(op)?,
                Op::True => self.push(TRUE)?,
                Op::False => self.push(FALSE)?,
                Op::Null => self.push(NULL)?,
                Op::Equal | Op::NotEqual | Op::GreaterThan => self.execute_comparison(op)?,
                Op::Bang => self.execute_bang()?,
                Op::Minus => self.execute_minus()?,
                Op::Jump => {
                    let target = self.read_u16_operand();
                    self.current_frame().ip = target as isize - 1;
                }
                Op::JumpNotTruthy => {
                    let target = self.read_u16_operand();
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.current_frame().ip = target as isize - 1;
                    }
                }
                Op::SetGlobal => {
                    let idx = self.read_u16_operand();
                    let value = self.pop()?;
                    self.globals[idx] = value;
                }
                Op::GetGlobal => {
                    let idx = self.read_u16_operand();
                    self.push(self.globals[idx].clone())?;
                }
                Op::SetLocal => {
                    let idx = self.read_u8_operand() as usize;
                    let base = self.current_frame().base_pointer;
                    let value = self.pop()?;
                    self.stack[base + idx] = value;
                }
                Op::GetLocal => {
                    let idx = self.read_u8_operand() as usize;
                    let base = self.current_frame().base_pointer;
                    self.push(self.stack[base + idx].clone())?;
                }
                Op::GetBuiltin => {
                    let idx = self.read_u8_operand() as usize;
                    self.push(Value::Builtin(idx))?;
                }
                Op::Array => {
                    let n = self.read_u16_operand();
                    let elements = self.stack[self.sp - n..self.sp].to_vec();
                    self.sp -= n;
                    self.push(Value::Array(Rc::new(RefCell::new(elements))))?;
                }
                Op::Hash => {
                    let n = self.read_u16_operand();
                    let mut pairs = IndexMap::new();
                    let start = self.sp - n;
                    let mut i = start;
                    while i < self.sp {
                        let key = self.stack[i].clone();
                        let value = self.stack[i + 1].clone();
                        let hash_key = key.hash_key()?;
                        pairs.insert(hash_key, (key, value));
                        i += 2;
                    }
                    self.sp -= n;
                    self.push(Value::Hash(Rc::new(RefCell::new(pairs))))?;
                }
                Op::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.execute_index(left, index)?;
                }
                Op::Call => {
                    let num_args = self.read_u8_operand() as usize;
                    self.execute_call(num_args)?;
                }
                Op::ReturnValue => {
                    let return_value = self.pop()?;
                    let frame = self.pop_frame();
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }
                Op::Return => {
                    let frame = self.pop_frame();
                    self.sp = frame.base_pointer - 1;
                    self.push(NULL)?;
                }
                Op::Closure => {
                    let const_idx = self.read_u16_operand();
                    let num_free = self.read_u8_operand() as usize;
                    let func = match &self.constants[const_idx] {
                        Value::CompiledFunction(f) => Rc::clone(f),
                        _ => unreachable!("OpClosure constant must be a compiled function"),
                    };
                    let free = self.stack[self.sp - num_free..self.sp].to_vec();
                    self.sp -= num_free;
                    self.push(Value::Closure(Rc::new(Closure { func, free })))?;
                }
                Op::GetFree => {
                    let idx = self.read_u8_operand() as usize;
                    let value = self.current_frame().closure.free[idx].clone();
                    self.push(value)?;
                }
                Op::CurrentClosure => {
                    let closure = Rc::clone(&self.current_frame().closure);
                    self.push(Value::Closure(closure))?;
                }
            }
        }
        Ok(())
    }

    fn read_u16_operand(&mut self) -> usize {
        let frame = self.current_frame();
        let ip = frame.ip as usize;
        let value = read_u16(frame.instructions(), ip + 1) as usize;
        frame.ip += 2;
        value
    }

    fn read_u8_operand(&mut self) -> u8 {
        let frame = self.current_frame();
        let ip = frame.ip as usize;
        let value = read_u8(frame.instructions(), ip + 1);
        frame.ip += 1;
        value
    }

    fn execute_binary_op(&mut self, op: Op) -> Result<(), VmError> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                if op == Op::Div && *r == 0 {
                    return Err(VmError::DivisionByZero);
                }
                let result = match op {
                    Op::Add => l.wrapping_add(*r),
                    Op::Sub => l.wrapping_sub(*r),
                    Op::Mul => l.wrapping_mul(*r),
                    Op::Div => l.wrapping_div(*r),
                    _ => unreachable!(),
                };
                self.push(Value::Integer(result))
            }
            (Value::String(l), Value::String(r)) if op == Op::Add => {
                self.push(Value::String(Rc::from(format!("{}{}", l, r).as_str())))
            }
            _ => Err(VmError::UnsupportedTypes { left: left.type_tag(), right: right.type_tag() }),
        }
    }

    fn execute_comparison(&mut self, op: Op) -> Result<(), VmError> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                let result = match op {
                    Op::Equal => l == r,
                    Op::NotEqual => l != r,
                    Op::GreaterThan => l > r,
                    _ => unreachable!(),
                };
                self.push(native_bool(result))
            }
            (Value::String(l), Value::String(r)) if op == Op::Equal || op == Op::NotEqual => {
                let eq = l == r;
                self.push(native_bool(if op == Op::Equal { eq } else { !eq }))
            }
            _ => {
                let result = match op {
                    Op::Equal => left == right,
                    Op::NotEqual => left != right,
                    _ => return Err(VmError::UnsupportedTypes { left: left.type_tag(), right: right.type_tag() }),
                };
                self.push(native_bool(result))
            }
        }
    }

    fn execute_bang(&mut self) -> Result<(), VmError> {
        let operand = self.pop()?;
        self.push(native_bool(!operand.is_truthy()))
    }

    fn execute_minus(&mut self) -> Result<(), VmError> {
        let operand = self.pop()?;
        match operand {
            Value::Integer(n) => self.push(Value::Integer(-n)),
            other => Err(VmError::UnsupportedUnary { op: "-", operand: other.type_tag() }),
        }
    }

    fn execute_index(&mut self, left: Value, index: Value) -> Result<(), VmError> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                let elements = elements.borrow();
                if *i < 0 || *i as usize >= elements.len() {
                    self.push(NULL)
                } else {
                    self.push(elements[*i as usize].clone())
                }
            }
            (Value::Hash(pairs), key) => {
                let hash_key = key.hash_key()?;
                let value = pairs.borrow().get(&hash_key).map(|(_, v)| v.clone()).unwrap_or(NULL);
                self.push(value)
            }
            _ => Err(VmError::IndexUnsupported(left.type_tag())),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Result<(), VmError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => {
                if num_args != closure.func.num_parameters {
                    return Err(VmError::WrongArgCount { want: closure.func.num_parameters, got: num_args });
                }
                let num_locals = closure.func.num_locals;
                let base_pointer = self.sp - num_args;
                self.push_frame(Frame::new(closure, base_pointer))?;
                self.sp = base_pointer + num_locals;
                Ok(())
            }
            Value::Builtin(idx) => {
                let args = self.stack[self.sp - num_args..self.sp].to_vec();
                self.sp -= num_args + 1;
                let result = (self.builtins[idx].func)(&args);
                self.push(result)
            }
            other => Err(VmError::NotCallable(other.type_tag())),
        }
    }
}

fn native_bool(value: bool) -> Value {
    if value {
        TRUE
    } else {
        FALSE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;

    fn run(src: &str) -> Value {
        let (program, lex_errors, parse_errors) = wisp_parser::parse(src);
        assert!(lex_errors.is_empty(), "{:?}", lex_errors);
        assert!(parse_errors.is_empty(), "{:?}", parse_errors);
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile should succeed");
        let mut vm = Vm::new(compiler.bytecode());
        vm.run().expect("vm should run without error");
        vm.last_popped_stack_elem()
    }

    #[test]
    fn t_integer_arithmetic() {
        assert_eq!(run("1 + 2 * 3 - 4 / 2"), Value::Integer(5));
    }

    #[test]
    fn t_string_concatenation() {
        assert_eq!(run(r#""mon" + "key""#), Value::String(Rc::from("monkey")));
    }

    #[test]
    fn t_boolean_expressions() {
        assert_eq!(run("1 < 2"), TRUE);
        assert_eq!(run("1 > 2"), FALSE);
        assert_eq!(run("(1 < 2) == true"), TRUE);
    }

    #[test]
    fn t_if_without_alternative_and_falsey_condition() {
        assert_eq!(run("if (false) { 10 }"), NULL);
        assert_eq!(run("if (1 > 2) { 10 } else { 20 }"), Value::Integer(20));
    }

    #[test]
    fn t_global_let_statements() {
        assert_eq!(run("let one = 1; let two = one + one; one + two"), Value::Integer(3));
    }

    #[test]
    fn t_array_literal() {
        match run("[1, 2, 3]") {
            Value::Array(a) => assert_eq!(*a.borrow(), vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn t_index_out_of_range_is_null() {
        assert_eq!(run("[1, 2, 3][5]"), NULL);
        assert_eq!(run("[1, 2, 3][-1]"), NULL);
    }

    #[test]
    fn t_functions_with_return_value() {
        assert_eq!(run("let five = fn() { 5; }; five();"), Value::Integer(5));
        assert_eq!(run("let id = fn(x) { x; }; id(10);"), Value::Integer(10));
    }

    #[test]
    fn t_functions_without_return_value_yield_null() {
        assert_eq!(run("let noop = fn() { }; noop();"), NULL);
    }

    #[test]
    fn t_division_by_zero_is_a_runtime_error() {
        let (program, _, _) = wisp_parser::parse("5 / 0;");
        let mut compiler = Compiler::new();
        compiler.compile(&program).unwrap();
        let mut vm = Vm::new(compiler.bytecode());
        let err = vm.run().unwrap_err();
        assert_eq!(err, VmError::DivisionByZero);
    }

    #[test]
    fn t_wrong_arg_count_is_a_runtime_error() {
        let (program, _, _) = wisp_parser::parse("let f = fn(a) { a }; f(1, 2);");
        let mut compiler = Compiler::new();
        compiler.compile(&program).unwrap();
        let mut vm = Vm::new(compiler.bytecode());
        let err = vm.run().unwrap_err();
        assert_eq!(err, VmError::WrongArgCount { want: 1, got: 2 });
    }

    #[test]
    fn t_closures_capture_free_variables() {
        let src = "let newAdder = fn(a) { fn(b) { a + b }; }; let addTwo = newAdder(2); addTwo(3);";
        assert_eq!(run(src), Value::Integer(5));
    }

    #[test]
    fn t_recursive_closure_via_current_closure() {
        let src = "let countDown = fn(x) { if (x == 0) { 0 } else { countDown(x - 1) } }; countDown(3);";
        assert_eq!(run(src), Value::Integer(0));
    }

    #[test]
    fn t_builtin_len_and_push() {
        assert_eq!(run(r#"len("four")"#), Value::Integer(4));
        match run("push([1, 2], 3)") {
            Value::Array(a) => assert_eq!(*a.borrow(), vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn t_builtin_error_is_in_band_value() {
        match run(r#"len(1)"#) {
            Value::Error(msg) => assert_eq!(&*msg, "argument to `len` not supported, got INTEGER"),
            other => panic!("expected error value, got {:?}", other),
        }
    }

    #[test]
    fn t_hash_literal_and_index() {
        assert_eq!(run(r#"{"one": 1}["one"]"#), Value::Integer(1));
        assert_eq!(run(r#"{"one": 1}["missing"]"#), NULL);
    }

    #[test]
    fn t_session_reuse_carries_globals_and_constants() {
        let (program1, _, _) = wisp_parser::parse("let x = 1;");
        let mut compiler = Compiler::new();
        compiler.compile(&program1).unwrap();
        let symbol_table = compiler.symbol_table();
        let bytecode1 = {
            let mut c = Compiler::new();
            c.compile(&program1).unwrap();
            c.bytecode()
        };
        let mut vm = Vm::new(bytecode1);
        vm.run().unwrap();
        let globals = vm.globals();

        let (program2, _, _) = wisp_parser::parse("x + 1;");
        let mut compiler2 = Compiler::new_with_state(symbol_table, vec![Value::Integer(1)]);
        compiler2.compile(&program2).unwrap();
        let mut vm2 = Vm::new_with_globals_store(compiler2.bytecode(), globals);
        vm2.run().unwrap();
        assert_eq!(vm2.last_popped_stack_elem(), Value::Integer(2));
    }
}
