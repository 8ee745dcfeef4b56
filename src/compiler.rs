// File: src/compiler.rs
//
// Bytecode compiler for the Myco programming language.
// Translates AST statements into a Program: a flat instruction stream plus
// constant pools, a function table (user functions and sub-programs for
// for-loop and catch bodies), and the class-body arena.
//
// Variable strategy: top-level bindings live in the global environment and
// function bindings in the scope chain, except where the local-slot
// optimization applies (a body with no closures, classes, imports, or
// sub-programs), in which case locals compile to frame slots.

use crate::ast::{BinOp, Expr, MatchCase, Param, Pattern, Stmt, UnOp};
use crate::bytecode::{set_jump_target, FunctionDef, Op, Program};
use crate::errors::{MycoError, SourceLocation};
use crate::interpreter::{self, Value};
use ahash::AHashMap;
use std::collections::HashSet;
use std::sync::Arc;

type CompileResult<T> = Result<T, MycoError>;

/// Method names lowered to direct opcodes instead of generic dispatch.
/// Each direct opcode has a fixed arity; a call with a different argument
/// count falls back to the generic MethodCall path.
fn direct_method_op(method: &str, argc: usize, write_back: Option<usize>) -> Option<Op> {
    let (op, expected_argc) = match method {
        "toString" => (Op::ToString, 0),
        "type" => (Op::GetType, 0),
        "length" | "size" => (Op::GetLength, 0),
        "isString" => (Op::IsString, 0),
        "isNumber" => (Op::IsNumber, 0),
        "isInt" => (Op::IsInt, 0),
        "isFloat" => (Op::IsFloat, 0),
        "isBool" => (Op::IsBool, 0),
        "isArray" => (Op::IsArray, 0),
        "isNull" => (Op::IsNull, 0),
        "isObject" => (Op::IsObject, 0),
        "isFunction" => (Op::IsFunction, 0),
        "upper" => (Op::StringUpper, 0),
        "lower" => (Op::StringLower, 0),
        "trim" => (Op::StringTrim, 0),
        "split" => (Op::StringSplit, 1),
        "replace" => (Op::StringReplace, 2),
        "abs" => (Op::MathAbs, 0),
        "sqrt" => (Op::MathSqrt, 0),
        "pow" => (Op::MathPow, 1),
        "sin" => (Op::MathSin, 0),
        "cos" => (Op::MathCos, 0),
        "tan" => (Op::MathTan, 0),
        "floor" => (Op::MathFloor, 0),
        "ceil" => (Op::MathCeil, 0),
        "round" => (Op::MathRound, 0),
        "push" => (Op::ArrayPush(write_back), 1),
        "pop" => (Op::ArrayPop(write_back), 0),
        "contains" => (Op::ArrayContains, 1),
        "indexOf" => (Op::ArrayIndexOf, 1),
        "join" => (Op::ArrayJoin, 1),
        "unique" => (Op::ArrayUnique, 0),
        "slice" => (Op::ArraySlice, 2),
        "concat" => (Op::ArrayConcat, 1),
        "has" => (Op::MapHas, 1),
        "keys" => (Op::MapKeys, 0),
        "delete" => (Op::MapDelete(write_back), 1),
        "clear" => (Op::MapClear(write_back), 0),
        "update" => (Op::MapUpdate(write_back), 1),
        "add" => (Op::SetAdd(write_back), 1),
        "remove" => (Op::SetRemove(write_back), 1),
        "toArray" => (Op::SetToArray, 0),
        "union" => (Op::SetUnion, 1),
        "intersection" => (Op::SetIntersection, 1),
        _ => return None,
    };
    if argc != expected_argc {
        return None;
    }
    Some(op)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkKind {
    Main,
    Function,
    /// For-loop body, catch body, or field initializer
    Sub,
}

#[derive(Debug, Clone)]
struct Local {
    name: String,
    depth: usize,
}

/// Per-chunk emission state
struct ChunkCtx {
    code: Vec<Op>,
    kind: ChunkKind,
    /// Locals compile to frame slots instead of environment bindings
    slot_mode: bool,
    locals: Vec<Local>,
    /// Slot index to the name last occupying it
    local_names: Vec<String>,
    scope_depth: usize,
    loop_depth: usize,
    /// Instruction index to source location
    source_map: AHashMap<usize, (u32, u32)>,
}

impl ChunkCtx {
    fn new(kind: ChunkKind, slot_mode: bool, loop_depth: usize) -> Self {
        Self {
            code: Vec::new(),
            kind,
            slot_mode,
            locals: Vec::new(),
            local_names: Vec::new(),
            scope_depth: 0,
            loop_depth,
            source_map: AHashMap::new(),
        }
    }

    fn emit(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    fn emit_at(&mut self, op: Op, line: u32, column: u32) -> usize {
        let index = self.emit(op);
        self.source_map.insert(index, (line, column));
        index
    }

    fn resolve_local(&self, name: &str) -> Option<usize> {
        self.locals.iter().rposition(|l| l.name == name)
    }

    fn declare_local(&mut self, name: &str) -> usize {
        let slot = self.locals.len();
        self.locals.push(Local { name: name.to_string(), depth: self.scope_depth });
        if slot < self.local_names.len() {
            self.local_names[slot] = name.to_string();
        } else {
            self.local_names.push(name.to_string());
        }
        slot
    }

    fn enter_scope(&mut self) {
        self.scope_depth += 1;
        if !self.slot_mode {
            self.emit(Op::PushScope);
        }
    }

    fn leave_scope(&mut self) {
        if !self.slot_mode {
            self.emit(Op::PopScope);
        }
        self.scope_depth -= 1;
        // Slot reuse: locals of the closed scope free their slots
        while matches!(self.locals.last(), Some(l) if l.depth > self.scope_depth) {
            self.locals.pop();
        }
    }
}

/// Does this body disqualify slot allocation? Closures, classes, imports,
/// and sub-program-compiled constructs all need the environment chain.
fn needs_environment(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_needs_environment)
}

fn stmt_needs_environment(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::FuncDef { .. } | Stmt::ClassDef { .. } | Stmt::Use { .. } => true,
        Stmt::For { .. } | Stmt::TryCatch { .. } => true,
        Stmt::Let { value, .. } => value.as_ref().map(expr_needs_environment).unwrap_or(false),
        Stmt::Assign { target, value, .. } => {
            expr_needs_environment(target) || expr_needs_environment(value)
        }
        Stmt::If { condition, then_branch, else_ifs, else_branch } => {
            expr_needs_environment(condition)
                || needs_environment(then_branch)
                || else_ifs
                    .iter()
                    .any(|(c, b)| expr_needs_environment(c) || needs_environment(b))
                || else_branch.as_deref().map(needs_environment).unwrap_or(false)
        }
        Stmt::While { condition, body } => {
            expr_needs_environment(condition) || needs_environment(body)
        }
        Stmt::Match { value, cases, default } => {
            expr_needs_environment(value)
                || cases.iter().any(|c| needs_environment(&c.body))
                || default.as_deref().map(needs_environment).unwrap_or(false)
        }
        Stmt::Throw(e, ..) => expr_needs_environment(e),
        Stmt::Return(Some(e), ..) => expr_needs_environment(e),
        Stmt::Return(None, ..) | Stmt::Break(..) | Stmt::Continue(..) => false,
        Stmt::Block(stmts) => needs_environment(stmts),
        Stmt::Print(exprs, ..) => exprs.iter().any(expr_needs_environment),
        Stmt::ExprStmt(e) => expr_needs_environment(e),
    }
}

fn expr_needs_environment(expr: &Expr) -> bool {
    match expr {
        Expr::Lambda { .. } | Expr::SelfExpr(..) => true,
        Expr::Binary { left, right, .. } => {
            expr_needs_environment(left) || expr_needs_environment(right)
        }
        Expr::Unary { operand, .. } => expr_needs_environment(operand),
        Expr::Call { args, .. } => args.iter().any(expr_needs_environment),
        Expr::CallExpr { callee, args, .. } => {
            expr_needs_environment(callee) || args.iter().any(expr_needs_environment)
        }
        Expr::MemberAccess { object, .. } => expr_needs_environment(object),
        Expr::MethodCall { object, args, .. } => {
            expr_needs_environment(object) || args.iter().any(expr_needs_environment)
        }
        Expr::Index { object, index, .. } => {
            expr_needs_environment(object) || expr_needs_environment(index)
        }
        Expr::ArrayLiteral(items, ..) | Expr::SetLiteral(items, ..) => {
            items.iter().any(expr_needs_environment)
        }
        Expr::MapLiteral { keys, values, .. } => {
            keys.iter().any(expr_needs_environment) || values.iter().any(expr_needs_environment)
        }
        _ => false,
    }
}

/// Is this expression a tree of numeric literals the fast path can take?
/// Division and modulo qualify only when the divisor folds to nonzero.
fn is_num_tree(expr: &Expr) -> bool {
    const_eval_num(expr).is_some()
}

/// Fold a numeric literal tree to its value, refusing zero divisors
fn const_eval_num(expr: &Expr) -> Option<f64> {
    match expr {
        Expr::Number(n, ..) => Some(*n),
        Expr::Unary { op: UnOp::Negate, operand, .. } => const_eval_num(operand).map(|n| -n),
        Expr::Binary { op, left, right, .. } => {
            let l = const_eval_num(left)?;
            let r = const_eval_num(right)?;
            match op {
                BinOp::Add => Some(l + r),
                BinOp::Sub => Some(l - r),
                BinOp::Mul => Some(l * r),
                BinOp::Div if r != 0.0 => Some(l / r),
                BinOp::Mod if r != 0.0 => Some(l % r),
                _ => None,
            }
        }
        _ => None,
    }
}

pub struct Compiler<'a> {
    program: &'a mut Program,
    /// Names bound at top level of the main chunk
    known_globals: HashSet<String>,
    /// Statically known user functions, name to function-table id
    user_functions: AHashMap<String, usize>,
    /// Statically known class names
    classes: HashSet<String>,
    /// Registered host callables and library members
    builtins: HashSet<&'static str>,
}

impl<'a> Compiler<'a> {
    fn with_program(program: &'a mut Program) -> Self {
        let mut builtins: HashSet<&'static str> = HashSet::new();
        builtins.extend(interpreter::Interpreter::builtin_names());
        builtins.extend(BUILTIN_MEMBER_NAMES);
        Self {
            program,
            known_globals: HashSet::new(),
            user_functions: AHashMap::new(),
            classes: HashSet::new(),
            builtins,
        }
    }

    /// Compile a whole program. `script_mode` allows promoting top-level
    /// locals to slots; the REPL passes false to keep state in the
    /// environment across lines.
    pub fn compile(stmts: &[Stmt], script_mode: bool) -> CompileResult<Program> {
        let mut program = Program::new();
        {
            let mut compiler = Compiler::with_program(&mut program);
            let slot_mode = script_mode && !needs_environment(stmts);
            let mut ctx = ChunkCtx::new(ChunkKind::Main, slot_mode, 0);
            compiler.compile_stmts(stmts, &mut ctx)?;
            let null_idx = compiler.program.add_constant(Value::Null);
            ctx.emit(Op::LoadConst(null_idx));
            ctx.emit(Op::Halt);

            compiler.program.code = ctx.code;
            compiler.program.local_names = ctx.local_names;
            compiler.program.source_map = ctx.source_map;
        }
        Ok(program)
    }

    /// Compile for the REPL: state stays in the environment across lines,
    /// and a trailing expression statement leaves its value on the stack so
    /// the shell can echo it.
    pub fn compile_repl(stmts: &[Stmt]) -> CompileResult<Program> {
        let mut program = Program::new();
        {
            let mut compiler = Compiler::with_program(&mut program);
            let mut ctx = ChunkCtx::new(ChunkKind::Main, false, 0);
            let (leading, trailing) = match stmts.split_last() {
                Some((Stmt::ExprStmt(expr), leading)) => (leading, Some(expr)),
                _ => (stmts, None),
            };
            compiler.compile_stmts(leading, &mut ctx)?;
            match trailing {
                Some(expr) => compiler.compile_expr(expr, &mut ctx)?,
                None => {
                    let idx = compiler.program.add_constant(Value::Null);
                    ctx.emit(Op::LoadConst(idx));
                }
            }
            ctx.emit(Op::Halt);

            compiler.program.code = ctx.code;
            compiler.program.local_names = ctx.local_names;
            compiler.program.source_map = ctx.source_map;
        }
        Ok(program)
    }

    /// Compile a single function body into an existing program's function
    /// table. The VM uses this for class methods, whose bodies stay as AST
    /// until instantiation.
    pub fn compile_function_into(
        program: &'a mut Program,
        name: &str,
        params: &[Param],
        return_type: Option<String>,
        body: &[Stmt],
    ) -> CompileResult<usize> {
        let mut compiler = Compiler::with_program(program);
        compiler.compile_function_chunk(name, params, return_type, body, false)
    }

    /// Compile a single expression as a sub-program leaving its value on the
    /// stack. The VM uses this for class field initializers.
    pub fn compile_expr_into(program: &'a mut Program, expr: &Expr) -> CompileResult<usize> {
        let mut compiler = Compiler::with_program(program);
        let mut ctx = ChunkCtx::new(ChunkKind::Sub, false, 0);
        compiler.compile_expr(expr, &mut ctx)?;
        let mut func = FunctionDef::new("<field initializer>");
        func.code = Arc::new(ctx.code);
        Ok(compiler.program.add_function(func))
    }

    fn compile_stmts(&mut self, stmts: &[Stmt], ctx: &mut ChunkCtx) -> CompileResult<()> {
        for stmt in stmts {
            self.compile_stmt(stmt, ctx)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt, ctx: &mut ChunkCtx) -> CompileResult<()> {
        match stmt {
            Stmt::ExprStmt(expr) => {
                self.compile_expr(expr, ctx)?;
                // Expression statements must leave the stack balanced
                ctx.emit(Op::Pop);
                Ok(())
            }

            Stmt::Let { name, value, exported, line, column, .. } => {
                match value {
                    Some(expr) => self.compile_expr(expr, ctx)?,
                    None => {
                        let idx = self.program.add_constant(Value::Null);
                        ctx.emit(Op::LoadConst(idx));
                    }
                }
                if *exported && ctx.kind == ChunkKind::Main && ctx.scope_depth == 0 {
                    self.program.exports.push(name.clone());
                }
                self.compile_binding(name, ctx, *line, *column);
                Ok(())
            }

            Stmt::Assign { target, value, line, column } => {
                self.compile_assignment(target, value, ctx, *line, *column)
            }

            Stmt::If { condition, then_branch, else_ifs, else_branch } => {
                let mut end_jumps = Vec::new();

                self.compile_expr(condition, ctx)?;
                let mut next_jump = ctx.emit(Op::JumpIfFalse(0));
                ctx.enter_scope();
                self.compile_stmts(then_branch, ctx)?;
                ctx.leave_scope();
                end_jumps.push(ctx.emit(Op::Jump(0)));

                for (cond, body) in else_ifs {
                    let __len = ctx.code.len();
                    set_jump_target(&mut ctx.code, next_jump, __len);
                    self.compile_expr(cond, ctx)?;
                    next_jump = ctx.emit(Op::JumpIfFalse(0));
                    ctx.enter_scope();
                    self.compile_stmts(body, ctx)?;
                    ctx.leave_scope();
                    end_jumps.push(ctx.emit(Op::Jump(0)));
                }

                let __len = ctx.code.len();
                set_jump_target(&mut ctx.code, next_jump, __len);
                if let Some(body) = else_branch {
                    ctx.enter_scope();
                    self.compile_stmts(body, ctx)?;
                    ctx.leave_scope();
                }

                let end = ctx.code.len();
                for jump in end_jumps {
                    set_jump_target(&mut ctx.code, jump, end);
                }
                Ok(())
            }

            Stmt::While { condition, body } => {
                let loop_start = ctx.emit(Op::LoopStart(0));
                let cond_start = ctx.code.len();
                self.compile_expr(condition, ctx)?;
                let exit_jump = ctx.emit(Op::JumpIfFalse(0));

                ctx.loop_depth += 1;
                ctx.enter_scope();
                self.compile_stmts(body, ctx)?;
                ctx.leave_scope();
                ctx.loop_depth -= 1;

                ctx.emit(Op::Jump(cond_start));
                let loop_end = ctx.emit(Op::LoopEnd);
                set_jump_target(&mut ctx.code, loop_start, loop_end);
                set_jump_target(&mut ctx.code, exit_jump, loop_end);
                Ok(())
            }

            Stmt::For { var, iterable, body } => {
                self.compile_expr(iterable, ctx)?;
                let var_idx = self.program.add_string_constant(var);
                let body_id = self.compile_sub_chunk("<for body>", body, ctx.loop_depth + 1)?;
                ctx.emit(Op::ForLoop(var_idx, body_id));
                Ok(())
            }

            Stmt::Match { value, cases, default } => {
                self.compile_match(value, cases, default.as_deref(), ctx)
            }

            Stmt::TryCatch { try_block, catch_var, catch_block, finally_block } => {
                let try_start = ctx.emit(Op::TryStart(0));
                ctx.enter_scope();
                self.compile_stmts(try_block, ctx)?;
                ctx.leave_scope();
                ctx.emit(Op::TryEnd);

                let catch_var_idx = self.program.add_string_constant(catch_var);
                let catch_id =
                    self.compile_sub_chunk("<catch block>", catch_block, ctx.loop_depth)?;
                let catch_index = ctx.emit(Op::Catch(catch_var_idx, catch_id));
                set_jump_target(&mut ctx.code, try_start, catch_index);

                if let Some(body) = finally_block {
                    ctx.enter_scope();
                    self.compile_stmts(body, ctx)?;
                    ctx.leave_scope();
                }
                Ok(())
            }

            Stmt::Throw(expr, line, column) => {
                self.compile_expr(expr, ctx)?;
                ctx.emit_at(Op::Throw, *line, *column);
                Ok(())
            }

            Stmt::Return(value, ..) => {
                match value {
                    Some(expr) => self.compile_expr(expr, ctx)?,
                    None => {
                        let idx = self.program.add_constant(Value::Null);
                        ctx.emit(Op::LoadConst(idx));
                    }
                }
                ctx.emit(Op::Return);
                Ok(())
            }

            Stmt::Break(line, column) => {
                if ctx.loop_depth == 0 {
                    return Err(MycoError::syntax_error(
                        "'break' outside of a loop".to_string(),
                        SourceLocation::new(*line as usize, *column as usize),
                    ));
                }
                ctx.emit_at(Op::Break, *line, *column);
                Ok(())
            }

            Stmt::Continue(line, column) => {
                if ctx.loop_depth == 0 {
                    return Err(MycoError::syntax_error(
                        "'continue' outside of a loop".to_string(),
                        SourceLocation::new(*line as usize, *column as usize),
                    ));
                }
                ctx.emit_at(Op::Continue, *line, *column);
                Ok(())
            }

            Stmt::Block(stmts) => {
                ctx.enter_scope();
                self.compile_stmts(stmts, ctx)?;
                ctx.leave_scope();
                Ok(())
            }

            Stmt::FuncDef { name, params, return_type, body, exported, .. } => {
                // Register the name before compiling the body so recursive
                // calls resolve to the function id
                let func_id = self.program.add_function(FunctionDef::new(name.as_str()));
                if ctx.kind == ChunkKind::Main && ctx.scope_depth == 0 {
                    self.user_functions.insert(name.clone(), func_id);
                    self.known_globals.insert(name.clone());
                    if *exported {
                        self.program.exports.push(name.clone());
                    }
                }

                self.fill_function_chunk(func_id, name, params, return_type.clone(), body, *exported)?;

                let name_idx = self.program.add_string_constant(name);
                ctx.emit(Op::DefineFunction(name_idx, func_id, *exported));
                Ok(())
            }

            Stmt::ClassDef { name, parent, body, .. } => {
                let name_idx = self.program.add_string_constant(name);
                let parent_idx = parent.as_ref().map(|p| self.program.add_string_constant(p));
                let body_idx = self.program.add_class_body(Arc::new(body.clone()));
                ctx.emit(Op::CreateClass(name_idx, parent_idx, body_idx));
                if ctx.kind == ChunkKind::Main && ctx.scope_depth == 0 {
                    self.classes.insert(name.clone());
                    self.known_globals.insert(name.clone());
                    ctx.emit(Op::StoreGlobal(name_idx));
                } else {
                    ctx.emit(Op::DefineVar(name_idx));
                }
                Ok(())
            }

            Stmt::Use { library, alias, items, .. } => {
                let name_idx = self.program.add_string_constant(library);
                let alias_idx = alias.as_ref().map(|a| self.program.add_string_constant(a));
                let items_idx = items.as_ref().map(|items| {
                    let names: Vec<Value> =
                        items.iter().map(|i| Value::str(i.name.as_str())).collect();
                    let aliases: Vec<Value> = items
                        .iter()
                        .map(|i| match &i.alias {
                            Some(a) => Value::str(a.as_str()),
                            None => Value::Null,
                        })
                        .collect();
                    // The aliases array sits at items_idx + 1 by convention
                    let idx = self.program.add_constant(Value::array(names));
                    self.program.add_constant(Value::array(aliases));
                    idx
                });
                ctx.emit(Op::ImportLib(name_idx, alias_idx, items_idx));
                Ok(())
            }

            Stmt::Print(values, line, column) => {
                for value in values {
                    self.compile_expr(value, ctx)?;
                }
                if values.len() == 1 {
                    ctx.emit_at(Op::Print, *line, *column);
                } else {
                    ctx.emit_at(Op::PrintMultiple(values.len()), *line, *column);
                }
                Ok(())
            }
        }
    }

    /// Bind a freshly computed value to a declared name
    fn compile_binding(&mut self, name: &str, ctx: &mut ChunkCtx, _line: u32, _column: u32) {
        if ctx.slot_mode {
            let slot = ctx.declare_local(name);
            ctx.emit(Op::StoreLocal(slot));
        } else if ctx.kind == ChunkKind::Main && ctx.scope_depth == 0 {
            self.known_globals.insert(name.to_string());
            let idx = self.program.add_string_constant(name);
            ctx.emit(Op::StoreGlobal(idx));
        } else {
            let idx = self.program.add_string_constant(name);
            ctx.emit(Op::DefineVar(idx));
        }
    }

    fn compile_assignment(
        &mut self,
        target: &Expr,
        value: &Expr,
        ctx: &mut ChunkCtx,
        line: u32,
        column: u32,
    ) -> CompileResult<()> {
        match target {
            Expr::Identifier(name, ..) => {
                self.compile_expr(value, ctx)?;
                if let Some(slot) = ctx.slot_mode.then(|| ctx.resolve_local(name)).flatten() {
                    ctx.emit(Op::StoreLocal(slot));
                } else if self.known_globals.contains(name)
                    && ctx.kind == ChunkKind::Main
                    && ctx.scope_depth == 0
                {
                    let idx = self.program.add_string_constant(name);
                    ctx.emit(Op::StoreGlobal(idx));
                } else {
                    let idx = self.program.add_string_constant(name);
                    ctx.emit_at(Op::AssignVar(idx), line, column);
                }
                Ok(())
            }
            Expr::Index { object, index, .. } => {
                // Stack order: target, index, value
                self.compile_expr(object, ctx)?;
                self.compile_expr(index, ctx)?;
                self.compile_expr(value, ctx)?;
                let write_back = self.write_back_target(object);
                ctx.emit_at(Op::ArraySet(write_back), line, column);
                Ok(())
            }
            Expr::MemberAccess { object, member, .. } => {
                self.compile_expr(object, ctx)?;
                self.compile_expr(value, ctx)?;
                let member_idx = self.program.add_string_constant(member);
                let write_back = self.write_back_target(object);
                ctx.emit_at(Op::PropertySet(member_idx, write_back), line, column);
                Ok(())
            }
            _ => Err(MycoError::syntax_error(
                "Invalid assignment target".to_string(),
                SourceLocation::new(line as usize, column as usize),
            )),
        }
    }

    /// When the receiver of a mutation is a plain variable (or self), encode
    /// its name so the VM writes the mutated value back into the binding
    fn write_back_target(&mut self, object: &Expr) -> Option<usize> {
        match object {
            Expr::Identifier(name, ..) => Some(self.program.add_string_constant(name)),
            Expr::SelfExpr(..) => Some(self.program.add_string_constant("self")),
            _ => None,
        }
    }

    fn compile_match(
        &mut self,
        value: &Expr,
        cases: &[MatchCase],
        default: Option<&[Stmt]>,
        ctx: &mut ChunkCtx,
    ) -> CompileResult<()> {
        let mut end_jumps = Vec::new();

        for case in cases {
            // No DUP instruction: the scrutinee is re-evaluated per case
            self.compile_expr(value, ctx)?;
            match &case.pattern {
                Pattern::Literal(lit) => {
                    self.compile_expr(lit, ctx)?;
                    ctx.emit(Op::PatternLiteral);
                }
                Pattern::Wildcard => {
                    ctx.emit(Op::PatternWildcard);
                }
                Pattern::Null => {
                    ctx.emit(Op::IsNull);
                }
                Pattern::Type(name) => {
                    let idx = self.program.add_string_constant(name);
                    ctx.emit(Op::PatternType(idx));
                }
                reserved => {
                    let (line, column) = value.location();
                    return Err(MycoError::syntax_error(
                        format!("Pattern {:?} is not supported", reserved),
                        SourceLocation::new(line as usize, column as usize),
                    ));
                }
            }
            let next_case = ctx.emit(Op::JumpIfFalse(0));
            ctx.enter_scope();
            self.compile_stmts(&case.body, ctx)?;
            ctx.leave_scope();
            end_jumps.push(ctx.emit(Op::Jump(0)));
            let __len = ctx.code.len();
            set_jump_target(&mut ctx.code, next_case, __len);
        }

        if let Some(body) = default {
            ctx.enter_scope();
            self.compile_stmts(body, ctx)?;
            ctx.leave_scope();
        }

        let end = ctx.emit(Op::MatchEnd);
        for jump in end_jumps {
            set_jump_target(&mut ctx.code, jump, end);
        }
        Ok(())
    }

    /// Compile a statement list into a sub-program in the function table
    fn compile_sub_chunk(
        &mut self,
        name: &str,
        body: &[Stmt],
        loop_depth: usize,
    ) -> CompileResult<usize> {
        let mut sub_ctx = ChunkCtx::new(ChunkKind::Sub, false, loop_depth);
        self.compile_stmts(body, &mut sub_ctx)?;
        let mut func = FunctionDef::new(name);
        func.code = Arc::new(sub_ctx.code);
        Ok(self.program.add_function(func))
    }

    fn compile_function_chunk(
        &mut self,
        name: &str,
        params: &[Param],
        return_type: Option<String>,
        body: &[Stmt],
        exported: bool,
    ) -> CompileResult<usize> {
        let func_id = self.program.add_function(FunctionDef::new(name));
        self.fill_function_chunk(func_id, name, params, return_type, body, exported)?;
        Ok(func_id)
    }

    fn fill_function_chunk(
        &mut self,
        func_id: usize,
        name: &str,
        params: &[Param],
        return_type: Option<String>,
        body: &[Stmt],
        exported: bool,
    ) -> CompileResult<()> {
        let slot_mode = !needs_environment(body);
        let mut ctx = ChunkCtx::new(ChunkKind::Function, slot_mode, 0);
        if slot_mode {
            // Parameters occupy the first slots; the VM binds arguments
            // positionally
            for param in params {
                ctx.declare_local(&param.name);
            }
        }
        self.compile_stmts(body, &mut ctx)?;
        let null_idx = self.program.add_constant(Value::Null);
        ctx.emit(Op::LoadConst(null_idx));
        ctx.emit(Op::Return);

        let func = &mut self.program.functions[func_id];
        func.name = name.to_string();
        func.params = params.to_vec();
        func.return_type = return_type;
        func.code = Arc::new(ctx.code);
        func.local_names = Arc::new(ctx.local_names);
        func.uses_slots = slot_mode;
        func.exported = exported;
        Ok(())
    }

    // === Expressions ===

    fn compile_expr(&mut self, expr: &Expr, ctx: &mut ChunkCtx) -> CompileResult<()> {
        // Numeric fast path: literal arithmetic rides the unboxed stack
        if let Expr::Binary { op, left, right, line, column } = expr {
            if self.try_compile_numeric(*op, left, right, ctx, *line, *column)? {
                return Ok(());
            }
        }

        match expr {
            Expr::Number(n, ..) => {
                let idx = self.program.add_constant(Value::Number(*n));
                ctx.emit(Op::LoadConst(idx));
                Ok(())
            }
            Expr::String(s, ..) => {
                let idx = self.program.add_constant(Value::str(s.as_str()));
                ctx.emit(Op::LoadConst(idx));
                Ok(())
            }
            Expr::Bool(b, ..) => {
                let idx = self.program.add_constant(Value::Bool(*b));
                ctx.emit(Op::LoadConst(idx));
                Ok(())
            }
            Expr::Null(..) => {
                let idx = self.program.add_constant(Value::Null);
                ctx.emit(Op::LoadConst(idx));
                Ok(())
            }
            Expr::SelfExpr(line, column) => {
                let idx = self.program.add_string_constant("self");
                ctx.emit_at(Op::LoadVar(idx), *line, *column);
                Ok(())
            }
            Expr::Identifier(name, line, column) => {
                self.compile_identifier(name, ctx, *line, *column);
                Ok(())
            }
            Expr::Binary { op, left, right, line, column } => {
                self.compile_binary(*op, left, right, ctx, *line, *column)
            }
            Expr::Unary { op, operand, line, column } => {
                self.compile_expr(operand, ctx)?;
                match op {
                    UnOp::Negate => ctx.emit_at(Op::Negate, *line, *column),
                    UnOp::Not => ctx.emit(Op::Not),
                };
                Ok(())
            }
            Expr::Call { name, args, line, column } => {
                self.compile_call(name, args, ctx, *line, *column)
            }
            Expr::CallExpr { callee, args, line, column } => {
                for arg in args {
                    self.compile_expr(arg, ctx)?;
                }
                self.compile_expr(callee, ctx)?;
                ctx.emit_at(Op::CallFunctionValue(args.len()), *line, *column);
                Ok(())
            }
            Expr::MemberAccess { object, member, line, column } => {
                self.compile_expr(object, ctx)?;
                let idx = self.program.add_string_constant(member);
                ctx.emit_at(Op::PropertyAccess(idx), *line, *column);
                Ok(())
            }
            Expr::MethodCall { object, method, args, line, column } => {
                self.compile_expr(object, ctx)?;
                for arg in args {
                    self.compile_expr(arg, ctx)?;
                }
                let write_back = self.write_back_target(object);
                if let Some(op) = direct_method_op(method, args.len(), write_back) {
                    ctx.emit_at(op, *line, *column);
                } else {
                    let idx = self.program.add_string_constant(method);
                    ctx.emit_at(Op::MethodCall(idx, args.len(), write_back), *line, *column);
                }
                Ok(())
            }
            Expr::Index { object, index, line, column } => {
                self.compile_expr(object, ctx)?;
                self.compile_expr(index, ctx)?;
                ctx.emit_at(Op::ArrayGet, *line, *column);
                Ok(())
            }
            Expr::ArrayLiteral(items, ..) => {
                for item in items {
                    self.compile_expr(item, ctx)?;
                }
                ctx.emit(Op::CreateArray(items.len()));
                Ok(())
            }
            Expr::MapLiteral { keys, values, .. } => {
                for (key, value) in keys.iter().zip(values.iter()) {
                    self.compile_expr(key, ctx)?;
                    self.compile_expr(value, ctx)?;
                }
                ctx.emit(Op::CreateMap(keys.len()));
                Ok(())
            }
            Expr::SetLiteral(items, ..) => {
                for item in items {
                    self.compile_expr(item, ctx)?;
                }
                ctx.emit(Op::CreateSet(items.len()));
                Ok(())
            }
            Expr::Lambda { params, return_type, body, .. } => {
                let func_id = self.compile_function_chunk(
                    "<lambda>",
                    params,
                    return_type.clone(),
                    body,
                    false,
                )?;
                ctx.emit(Op::CreateLambda(func_id));
                Ok(())
            }
        }
    }

    fn compile_identifier(&mut self, name: &str, ctx: &mut ChunkCtx, line: u32, column: u32) {
        if ctx.slot_mode {
            if let Some(slot) = ctx.resolve_local(name) {
                ctx.emit(Op::LoadLocal(slot));
                return;
            }
        }
        let idx = self.program.add_string_constant(name);
        // Inside block scopes a global may be shadowed, so only the
        // top-level scope takes the direct-global path
        if self.known_globals.contains(name) && ctx.kind == ChunkKind::Main && ctx.scope_depth == 0
        {
            ctx.emit(Op::LoadGlobal(idx));
        } else {
            ctx.emit_at(Op::LoadVar(idx), line, column);
        }
    }

    /// Emit the numeric fast path when operand shapes allow it.
    /// Returns false when the expression needs the boxed path.
    fn try_compile_numeric(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        ctx: &mut ChunkCtx,
        line: u32,
        column: u32,
    ) -> CompileResult<bool> {
        let arith = matches!(op, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod);
        let comparison =
            matches!(op, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne);

        // A statically zero divisor keeps the boxed path so the result is
        // Null plus a DivisionByZero error, not a fast-path zero
        let zero_divisor = matches!(op, BinOp::Div | BinOp::Mod)
            && const_eval_num(right) == Some(0.0);

        let both_numeric = is_num_tree(left) && is_num_tree(right) && !zero_divisor;
        if (arith || comparison) && both_numeric {
            self.emit_num_tree(left, ctx);
            self.emit_num_tree(right, ctx);
            match op {
                BinOp::Add => ctx.emit(Op::AddNum),
                BinOp::Sub => ctx.emit(Op::SubNum),
                BinOp::Mul => ctx.emit(Op::MulNum),
                BinOp::Div => ctx.emit(Op::DivNum),
                BinOp::Mod => ctx.emit(Op::ModNum),
                BinOp::Lt => ctx.emit(Op::LtNum),
                BinOp::Le => ctx.emit(Op::LeNum),
                BinOp::Gt => ctx.emit(Op::GtNum),
                BinOp::Ge => ctx.emit(Op::GeNum),
                BinOp::Eq => ctx.emit(Op::EqNum),
                BinOp::Ne => ctx.emit(Op::NeNum),
                _ => unreachable!(),
            };
            if arith {
                ctx.emit(Op::NumToValue);
            }
            return Ok(true);
        }

        // Mixed operands: numeric-only operators can bridge the boxed side
        // through ValueToNum. Addition is excluded (string/array overloads),
        // and a runtime divisor must keep the boxed zero-check semantics.
        let numeric_only = matches!(op, BinOp::Sub | BinOp::Mul);
        if numeric_only {
            if is_num_tree(left) && !is_num_tree(right) {
                self.emit_num_tree(left, ctx);
                self.compile_expr(right, ctx)?;
                ctx.emit_at(Op::ValueToNum, line, column);
                ctx.emit(if op == BinOp::Sub { Op::SubNum } else { Op::MulNum });
                ctx.emit(Op::NumToValue);
                return Ok(true);
            }
            if !is_num_tree(left) && is_num_tree(right) {
                self.compile_expr(left, ctx)?;
                ctx.emit_at(Op::ValueToNum, line, column);
                self.emit_num_tree(right, ctx);
                ctx.emit(if op == BinOp::Sub { Op::SubNum } else { Op::MulNum });
                ctx.emit(Op::NumToValue);
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn emit_num_tree(&mut self, expr: &Expr, ctx: &mut ChunkCtx) {
        match expr {
            Expr::Number(n, ..) => {
                let idx = self.program.add_num_constant(*n);
                ctx.emit(Op::LoadNum(idx));
            }
            Expr::Unary { op: UnOp::Negate, .. } => {
                // Fold the negation into a constant load
                let value = const_eval_num(expr).unwrap_or(0.0);
                let idx = self.program.add_num_constant(value);
                ctx.emit(Op::LoadNum(idx));
            }
            Expr::Binary { op, left, right, .. } => {
                self.emit_num_tree(left, ctx);
                self.emit_num_tree(right, ctx);
                match op {
                    BinOp::Add => ctx.emit(Op::AddNum),
                    BinOp::Sub => ctx.emit(Op::SubNum),
                    BinOp::Mul => ctx.emit(Op::MulNum),
                    BinOp::Div => ctx.emit(Op::DivNum),
                    BinOp::Mod => ctx.emit(Op::ModNum),
                    other => panic!("not a numeric fast-path operator: {:?}", other),
                };
            }
            other => panic!("not a numeric literal tree: {:?}", other),
        }
    }

    fn compile_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        ctx: &mut ChunkCtx,
        line: u32,
        column: u32,
    ) -> CompileResult<()> {
        // Short-circuit forms first: the right operand must not be evaluated
        // when the left already decides the result
        match op {
            BinOp::LogicalAnd => {
                self.compile_expr(left, ctx)?;
                let short = ctx.emit(Op::JumpIfFalse(0));
                self.compile_expr(right, ctx)?;
                let true_idx = self.program.add_constant(Value::Bool(true));
                ctx.emit(Op::LoadConst(true_idx));
                // b && true canonicalizes the result to Bool(truthy(b))
                ctx.emit(Op::And);
                let end = ctx.emit(Op::Jump(0));
                let __len = ctx.code.len();
                set_jump_target(&mut ctx.code, short, __len);
                let false_idx = self.program.add_constant(Value::Bool(false));
                ctx.emit(Op::LoadConst(false_idx));
                let __len = ctx.code.len();
                set_jump_target(&mut ctx.code, end, __len);
                return Ok(());
            }
            BinOp::LogicalOr => {
                self.compile_expr(left, ctx)?;
                ctx.emit(Op::Not);
                let taken = ctx.emit(Op::JumpIfFalse(0));
                self.compile_expr(right, ctx)?;
                let false_idx = self.program.add_constant(Value::Bool(false));
                ctx.emit(Op::LoadConst(false_idx));
                ctx.emit(Op::Or);
                let end = ctx.emit(Op::Jump(0));
                let __len = ctx.code.len();
                set_jump_target(&mut ctx.code, taken, __len);
                let true_idx = self.program.add_constant(Value::Bool(true));
                ctx.emit(Op::LoadConst(true_idx));
                let __len = ctx.code.len();
                set_jump_target(&mut ctx.code, end, __len);
                return Ok(());
            }
            BinOp::Range | BinOp::RangeInclusive => {
                self.compile_expr(left, ctx)?;
                self.compile_expr(right, ctx)?;
                ctx.emit(Op::CreateRange(op == BinOp::RangeInclusive));
                return Ok(());
            }
            _ => {}
        }

        self.compile_expr(left, ctx)?;
        self.compile_expr(right, ctx)?;
        let op_instr = match op {
            BinOp::Add => Op::Add,
            BinOp::Sub => Op::Sub,
            BinOp::Mul => Op::Mul,
            BinOp::Div => Op::Div,
            BinOp::Mod => Op::Mod,
            BinOp::Power => Op::Pow,
            BinOp::Eq => Op::Eq,
            BinOp::Ne => Op::Ne,
            BinOp::Lt => Op::Lt,
            BinOp::Le => Op::Le,
            BinOp::Gt => Op::Gt,
            BinOp::Ge => Op::Ge,
            BinOp::LogicalXor => Op::Xor,
            BinOp::BitAnd => Op::BitAnd,
            BinOp::BitOr => Op::BitOr,
            BinOp::BitXor => Op::BitXor,
            BinOp::Shl => Op::Shl,
            BinOp::Shr => Op::Shr,
            BinOp::LogicalAnd | BinOp::LogicalOr | BinOp::Range | BinOp::RangeInclusive => {
                unreachable!("handled above")
            }
        };
        ctx.emit_at(op_instr, line, column);
        Ok(())
    }

    fn compile_call(
        &mut self,
        name: &str,
        args: &[Expr],
        ctx: &mut ChunkCtx,
        line: u32,
        column: u32,
    ) -> CompileResult<()> {
        let shadowed = (ctx.slot_mode && ctx.resolve_local(name).is_some())
            || self.known_globals.contains(name);

        // range() literals lower to range-builder opcodes
        if name == "range" && !shadowed && (1..=3).contains(&args.len()) {
            match args.len() {
                1 => {
                    let zero = self.program.add_constant(Value::Number(0.0));
                    ctx.emit(Op::LoadConst(zero));
                    self.compile_expr(&args[0], ctx)?;
                    ctx.emit(Op::CreateRange(false));
                }
                2 => {
                    self.compile_expr(&args[0], ctx)?;
                    self.compile_expr(&args[1], ctx)?;
                    ctx.emit(Op::CreateRange(false));
                }
                _ => {
                    self.compile_expr(&args[0], ctx)?;
                    self.compile_expr(&args[1], ctx)?;
                    self.compile_expr(&args[2], ctx)?;
                    ctx.emit(Op::CreateRangeStep);
                }
            }
            return Ok(());
        }

        for arg in args {
            self.compile_expr(arg, ctx)?;
        }

        if self.classes.contains(name) {
            let idx = self.program.add_string_constant(name);
            ctx.emit_at(Op::InstantiateClass(idx, args.len()), line, column);
            return Ok(());
        }

        if let Some(&func_id) = self.user_functions.get(name) {
            ctx.emit_at(Op::CallUserFunction(func_id, args.len()), line, column);
            return Ok(());
        }

        if !shadowed && self.builtins.contains(name) {
            let idx = self.program.add_string_constant(name);
            ctx.emit_at(Op::CallBuiltin(idx, args.len()), line, column);
            return Ok(());
        }

        // Dynamic dispatch through the environment
        self.compile_identifier(name, ctx, line, column);
        ctx.emit_at(Op::CallFunctionValue(args.len()), line, column);
        Ok(())
    }
}

/// Library member names the compiler may route through CallBuiltin
const BUILTIN_MEMBER_NAMES: &[&str] = &[
    "abs", "sqrt", "pow", "sin", "cos", "tan", "floor", "ceil", "round", "min", "max", "random",
    "random_int", "upper", "lower", "trim", "split", "replace", "contains", "index_of", "join",
    "unique", "slice", "concat",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn compile_source(source: &str) -> Program {
        let tokens = tokenize(source);
        let stmts = Parser::new(tokens).parse().expect("parse failed");
        Compiler::compile(&stmts, false).expect("compile failed")
    }

    fn compile_script(source: &str) -> Program {
        let tokens = tokenize(source);
        let stmts = Parser::new(tokens).parse().expect("parse failed");
        Compiler::compile(&stmts, true).expect("compile failed")
    }

    #[test]
    fn test_expression_statement_is_balanced_with_pop() {
        let program = compile_source("1 + x");
        assert!(program.code.contains(&Op::Pop));
    }

    #[test]
    fn test_let_and_print_are_not_popped() {
        let program = compile_source("let x = 1; print x");
        assert!(!program.code.contains(&Op::Pop));
    }

    #[test]
    fn test_numeric_literal_arithmetic_uses_fast_path() {
        let program = compile_source("let x = 1 + 2 * 3");
        assert!(program.code.iter().any(|op| matches!(op, Op::LoadNum(_))));
        assert!(program.code.contains(&Op::AddNum));
        assert!(program.code.contains(&Op::MulNum));
        assert!(program.code.contains(&Op::NumToValue));
        // The boxed ops are not used for this statement
        assert!(!program.code.contains(&Op::Add));
    }

    #[test]
    fn test_mixed_subtraction_bridges_with_value_to_num() {
        let program = compile_source("let y = x - 1");
        assert!(program.code.contains(&Op::ValueToNum));
        assert!(program.code.contains(&Op::SubNum));
    }

    #[test]
    fn test_string_addition_stays_boxed() {
        let program = compile_source(r#"let s = a + "x""#);
        assert!(program.code.contains(&Op::Add));
        assert!(!program.code.contains(&Op::AddNum));
    }

    #[test]
    fn test_while_loop_shape() {
        let program = compile_source("let x = 0; while x < 5 { x = x + 1 }");
        let start = program
            .code
            .iter()
            .position(|op| matches!(op, Op::LoopStart(_)))
            .expect("missing LoopStart");
        let end = program
            .code
            .iter()
            .position(|op| matches!(op, Op::LoopEnd))
            .expect("missing LoopEnd");
        match program.code[start] {
            Op::LoopStart(target) => assert_eq!(target, end),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_break_outside_loop_is_rejected() {
        let tokens = tokenize("break");
        let stmts = Parser::new(tokens).parse().unwrap();
        let err = Compiler::compile(&stmts, false).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::SyntaxError);
    }

    #[test]
    fn test_for_loop_compiles_body_as_sub_program() {
        let program = compile_source("for i in 0..3 { print i }");
        assert!(program
            .code
            .iter()
            .any(|op| matches!(op, Op::ForLoop(_, _))));
        assert!(program.functions.iter().any(|f| f.name == "<for body>"));
    }

    #[test]
    fn test_function_definition_and_direct_call() {
        let program = compile_source("fn f(a) { return a } f(1)");
        assert!(program
            .code
            .iter()
            .any(|op| matches!(op, Op::DefineFunction(_, 0, false))));
        assert!(program
            .code
            .iter()
            .any(|op| matches!(op, Op::CallUserFunction(0, 1))));
    }

    #[test]
    fn test_slot_mode_function_uses_slots() {
        let program = compile_source("fn add(a, b) { return a + b }");
        let func = &program.functions[0];
        assert_eq!(*func.local_names, vec!["a".to_string(), "b".to_string()]);
        assert!(func.code.contains(&Op::LoadLocal(0)));
        assert!(func.code.contains(&Op::LoadLocal(1)));
    }

    #[test]
    fn test_function_with_lambda_falls_back_to_environment() {
        let program = compile_source("fn outer(a) { let f = fn (x) => x + a return f }");
        let outer = program.functions.iter().find(|f| f.name == "outer").unwrap();
        assert!(outer.local_names.is_empty());
        assert!(outer.code.iter().any(|op| matches!(op, Op::LoadVar(_))));
        assert!(outer.code.iter().any(|op| matches!(op, Op::CreateLambda(_))));
    }

    #[test]
    fn test_script_mode_promotes_top_level_locals() {
        let program = compile_script("let x = 0; while x < 5 { x = x + 1 }; print x");
        assert_eq!(program.local_names, vec!["x".to_string()]);
        assert!(program.code.contains(&Op::StoreLocal(0)));
        assert!(!program.code.iter().any(|op| matches!(op, Op::StoreGlobal(_))));
    }

    #[test]
    fn test_repl_mode_keeps_top_level_in_globals() {
        let program = compile_source("let x = 0");
        assert!(program.code.iter().any(|op| matches!(op, Op::StoreGlobal(_))));
    }

    #[test]
    fn test_match_reevaluates_scrutinee_per_case() {
        let program = compile_source(
            r#"match 2 case 1 => print "one" case 2 => print "two" else => print "other" end"#,
        );
        // The scrutinee constant is loaded once per case arm, and the second
        // arm's pattern literal shares the same pooled constant
        let loads = program
            .code
            .iter()
            .filter(|op| matches!(op, Op::LoadConst(idx) if program.constants[*idx].equals(&Value::Number(2.0))))
            .count();
        assert_eq!(loads, 3);
        assert!(program.code.contains(&Op::MatchEnd));
        assert_eq!(
            program.code.iter().filter(|op| matches!(op, Op::PatternLiteral)).count(),
            2
        );
    }

    #[test]
    fn test_try_start_points_at_catch() {
        let program = compile_source(r#"try { throw "x" } catch e { print e }"#);
        let try_start = program
            .code
            .iter()
            .position(|op| matches!(op, Op::TryStart(_)))
            .expect("missing TryStart");
        let catch = program
            .code
            .iter()
            .position(|op| matches!(op, Op::Catch(_, _)))
            .expect("missing Catch");
        match program.code[try_start] {
            Op::TryStart(target) => assert_eq!(target, catch),
            _ => unreachable!(),
        }
        assert!(program.functions.iter().any(|f| f.name == "<catch block>"));
    }

    #[test]
    fn test_method_calls_lower_to_direct_opcodes() {
        let program = compile_source("a.push(4); a.upper(); a.frob()");
        assert!(program.code.iter().any(|op| matches!(op, Op::ArrayPush(Some(_)))));
        assert!(program.code.contains(&Op::StringUpper));
        assert!(program
            .code
            .iter()
            .any(|op| matches!(op, Op::MethodCall(_, 0, Some(_)))));
    }

    #[test]
    fn test_short_circuit_and_compiles_jump() {
        let program = compile_source("let x = a && f()");
        let jump_pos = program
            .code
            .iter()
            .position(|op| matches!(op, Op::JumpIfFalse(_)))
            .expect("missing short-circuit jump");
        let call_pos = program
            .code
            .iter()
            .position(|op| matches!(op, Op::CallFunctionValue(_)))
            .expect("missing call");
        assert!(jump_pos < call_pos, "the call must be jumped over");
    }

    #[test]
    fn test_range_call_lowers_to_builder() {
        let program = compile_source("let r = range(1, 10, 2)");
        assert!(program.code.contains(&Op::CreateRangeStep));
        let program = compile_source("let r = range(5)");
        assert!(program.code.iter().any(|op| matches!(op, Op::CreateRange(false))));
    }

    #[test]
    fn test_class_compiles_to_create_class_with_arena_body() {
        let program = compile_source("class A { let x = 1 }");
        assert!(program
            .code
            .iter()
            .any(|op| matches!(op, Op::CreateClass(_, None, 0))));
        assert_eq!(program.class_bodies.len(), 1);
    }

    #[test]
    fn test_import_emits_parallel_alias_array() {
        let program = compile_source("use math show sqrt, pow as power");
        let (_, _, items) = program
            .code
            .iter()
            .find_map(|op| match op {
                Op::ImportLib(n, a, i) => Some((*n, *a, *i)),
                _ => None,
            })
            .expect("missing ImportLib");
        let items_idx = items.expect("missing items");
        match (&program.constants[items_idx], &program.constants[items_idx + 1]) {
            (Value::Array(names), Value::Array(aliases)) => {
                assert_eq!(names.len(), 2);
                assert!(aliases[0].equals(&Value::Null));
                assert!(aliases[1].equals(&Value::str("power")));
            }
            other => panic!("Expected parallel arrays, got {:?}", other),
        }
    }
}
