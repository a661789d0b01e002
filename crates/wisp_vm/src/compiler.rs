use std::rc::Rc;

use wisp_parser::{BlockStatement, Expr, ExprKind, InfixOp, PrefixOp, Program, Stmt, StmtKind};

use crate::code::{make, Instructions, Op};
use crate::error::CompileError;
use crate::symbol_table::{Scope, SymbolTable};
use crate::value::{CompiledFunction, Value};

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    op: Op,
    position: usize,
}

#[derive(Debug, Default)]
struct CompilerScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilerScope>,
}

pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (i, builtin) in crate::builtins::catalog().iter().enumerate() {
            symbol_table.define_builtin(i, builtin.name);
        }
        Compiler { constants: Vec::new(), symbol_table, scopes: vec![CompilerScope::default()] }
    }

    /// For REPL session reuse: carries forward previously defined globals and interned constants.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Compiler { constants, symbol_table, scopes: vec![CompilerScope::default()] }
    }

    pub fn symbol_table(self) -> SymbolTable {
        self.symbol_table.into_outermost()
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// For REPL session reuse: hands back the symbol table alongside the
    /// sealed bytecode so a driver doesn't have to choose between them. If
    /// compilation failed inside a nested function literal, the scope stack
    /// is unwound to the top-level table before returning it.
    pub fn into_parts(mut self) -> (SymbolTable, Bytecode) {
        let instructions = std::mem::take(&mut self.current_scope_mut().instructions);
        let symbol_table = std::mem::take(&mut self.symbol_table).into_outermost();
        (symbol_table, Bytecode { instructions, constants: self.constants })
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    pub fn bytecode(mut self) -> Bytecode {
        let instructions = std::mem::take(&mut self.current_scope_mut().instructions);
        Bytecode { instructions, constants: self.constants }
    }

    fn current_scope(&self) -> &CompilerScope {
        self.scopes.last().expect("compiler scope stack is never empty")
    }

    fn current_scope_mut(&mut self) -> &mut CompilerScope {
        self.scopes.last_mut().expect("compiler scope stack is never empty")
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let ins = make(op, operands);
        let position = self.current_scope().instructions.len();
        self.current_scope_mut().instructions.extend(ins);
        let previous = self.current_scope().last_instruction;
        self.current_scope_mut().previous_instruction = previous;
        self.current_scope_mut().last_instruction = Some(EmittedInstruction { op, position });
        position
    }

    fn last_is(&self, op: Op) -> bool {
        matches!(self.current_scope().last_instruction, Some(e) if e.op == op)
    }

    fn remove_last_instruction(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let Some(last) = self.current_scope().last_instruction else { return };
        let position = last.position;
        let new_ins = make(Op::ReturnValue, &[]);
        self.replace_instruction(position, new_ins);
        self.current_scope_mut().last_instruction = Some(EmittedInstruction { op: Op::ReturnValue, position });
    }

    fn replace_instruction(&mut self, position: usize, new_ins: Instructions) {
        let ins = &mut self.current_scope_mut().instructions;
        for (i, byte) in new_ins.into_iter().enumerate() {
            ins[position + i] = byte;
        }
    }

    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = Op::from_u8(self.current_scope().instructions[position]).expect("position must point at an opcode");
        let new_ins = make(op, &[operand]);
        self.replace_instruction(position, new_ins);
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilerScope::default());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("leave_scope called without a matching enter_scope");
        let outer = std::mem::take(&mut self.symbol_table).pop().expect("leave_scope called at global scope");
        self.symbol_table = outer;
        scope.instructions
    }

    fn load_symbol(&mut self, symbol: &crate::symbol_table::Symbol) {
        match symbol.scope {
            Scope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            Scope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            Scope::Builtin => self.emit(Op::GetBuiltin, &[symbol.index]),
            Scope::Free => self.emit(Op::GetFree, &[symbol.index]),
            Scope::Function => self.emit(Op::CurrentClosure, &[]),
        };
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                // The parser already stamps a let-bound function literal's own
                // name (see stamp_function_name), so DefineFunctionName picks
                // it up once compile_expr enters the literal's scope below.
                let symbol = self.symbol_table.define(name);
                self.compile_expr(value)?;
                match symbol.scope {
                    Scope::Global => self.emit(Op::SetGlobal, &[symbol.index]),
                    _ => self.emit(Op::SetLocal, &[symbol.index]),
                };
                Ok(())
            }
            StmtKind::Return { value } => {
                self.compile_expr(value)?;
                self.emit(Op::ReturnValue, &[]);
                Ok(())
            }
            StmtKind::Expr { value } => {
                self.compile_expr(value)?;
                self.emit(Op::Pop, &[]);
                Ok(())
            }
        }
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        for stmt in &block.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::IntegerLiteral(n) => {
                let idx = self.add_constant(Value::Integer(*n));
                self.emit(Op::Constant, &[idx]);
            }
            ExprKind::StringLiteral(s) => {
                let idx = self.add_constant(Value::String(Rc::from(s.as_str())));
                self.emit(Op::Constant, &[idx]);
            }
            ExprKind::Boolean(true) => {
                self.emit(Op::True, &[]);
            }
            ExprKind::Boolean(false) => {
                self.emit(Op::False, &[]);
            }
            ExprKind::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UnresolvedIdentifier(name.clone()))?;
                self.load_symbol(&symbol);
            }
            ExprKind::ArrayLiteral(elements) => {
                for el in elements {
                    self.compile_expr(el)?;
                }
                self.emit(Op::Array, &[elements.len()]);
            }
            ExprKind::HashLiteral(pairs) => {
                for (k, v) in pairs {
                    self.compile_expr(k)?;
                    self.compile_expr(v)?;
                }
                self.emit(Op::Hash, &[pairs.len() * 2]);
            }
            ExprKind::Prefix { op, right } => {
                self.compile_expr(right)?;
                match op {
                    PrefixOp::Bang => self.emit(Op::Bang, &[]),
                    PrefixOp::Minus => self.emit(Op::Minus, &[]),
                };
            }
            ExprKind::Infix { op: InfixOp::Lt, left, right } => {
                self.compile_expr(right)?;
                self.compile_expr(left)?;
                self.emit(Op::GreaterThan, &[]);
            }
            ExprKind::Infix { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                match op {
                    InfixOp::Add => self.emit(Op::Add, &[]),
                    InfixOp::Sub => self.emit(Op::Sub, &[]),
                    InfixOp::Mul => self.emit(Op::Mul, &[]),
                    InfixOp::Div => self.emit(Op::Div, &[]),
                    InfixOp::Eq => self.emit(Op::Equal, &[]),
                    InfixOp::NotEq => self.emit(Op::NotEqual, &[]),
                    InfixOp::Gt => self.emit(Op::GreaterThan, &[]),
                    InfixOp::Lt => unreachable!("handled above"),
                };
            }
            ExprKind::If { condition, consequence, alternative } => {
                self.compile_expr(condition)?;
                let jump_not_truthy_pos = self.emit(Op::JumpNotTruthy, &[9999]);

                self.compile_block(consequence)?;
                if self.last_is(Op::Pop) {
                    self.remove_last_instruction();
                }

                let jump_pos = self.emit(Op::Jump, &[9999]);
                let after_consequence = self.current_scope().instructions.len();
                self.change_operand(jump_not_truthy_pos, after_consequence);

                match alternative {
                    Some(alt) => {
                        self.compile_block(alt)?;
                        if self.last_is(Op::Pop) {
                            self.remove_last_instruction();
                        }
                    }
                    None => {
                        self.emit(Op::Null, &[]);
                    }
                }
                let after_alternative = self.current_scope().instructions.len();
                self.change_operand(jump_pos, after_alternative);
            }
            ExprKind::Index { left, index } => {
                self.compile_expr(left)?;
                self.compile_expr(index)?;
                self.emit(Op::Index, &[]);
            }
            ExprKind::FunctionLiteral { name, params, body } => {
                self.enter_scope();
                if let Some(name) = name {
                    self.symbol_table.define_function_name(name);
                }
                for param in params {
                    self.symbol_table.define(param);
                }
                self.compile_block(body)?;

                if self.last_is(Op::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_is(Op::ReturnValue) {
                    self.emit(Op::Return, &[]);
                }

                let free_symbols = self.symbol_table.free_symbols.clone();
                let num_locals = self.symbol_table.num_definitions();
                let instructions = self.leave_scope();

                for symbol in &free_symbols {
                    self.load_symbol(symbol);
                }

                let compiled = CompiledFunction { instructions, num_locals, num_parameters: params.len() };
                let const_idx = self.add_constant(Value::CompiledFunction(Rc::new(compiled)));
                self.emit(Op::Closure, &[const_idx, free_symbols.len()]);
            }
            ExprKind::Call { function, args } => {
                self.compile_expr(function)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(Op::Call, &[args.len()]);
            }
        }
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
