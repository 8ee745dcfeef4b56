// File: src/vm.rs
//
// Stack-based virtual machine executing Myco bytecode.
//
// The VM owns the Program (class methods compile into its function table on
// first dispatch) and borrows the interpreter context. It maintains a boxed
// value stack and a parallel unboxed f64 stack for the numeric fast path,
// loop bookkeeping consumed by Break/Continue, and a try-frame stack for
// exception unwinding.
//
// Errors funnel out of every opcode handler as Results and are translated to
// the interpreter error slot in one place: inside a try block execution
// transfers to the matching Catch; outside, the error is reported to stderr
// and execution continues with the failing operation yielding Null. Fatal
// kinds abort.

use crate::bytecode::{Op, Program};
use crate::compiler::Compiler;
use crate::errors::{find_closest_match, ErrorKind, MycoError, SourceLocation};
use crate::interpreter::native_functions::{self, async_ops};
use crate::interpreter::value;
use crate::interpreter::{
    env_assign, env_define, env_get, env_visible_names, AsyncRuntime, ClassValue, EnvRef,
    Environment, FunctionValue, Interpreter, ModuleValue, ObjectMap, Value, CLASS_NAME_KEY,
};
use crate::module;
use ahash::AHashMap;
use std::sync::Arc;

/// Control signal produced by running a code block
#[derive(Debug)]
enum Signal {
    Normal,
    Return(Value),
    Break,
    Continue,
    Halt(Value),
    /// A runtime error is pending in the interpreter error slot and must
    /// unwind to an outer frame
    Errored,
}

/// What happens after an error is recorded
enum ErrorResolution {
    /// Reported to stderr; execution continues
    Reported,
    /// Unwound to a catch handler in the current code block
    Unwound(usize),
    /// The handler lives in an outer code block
    Propagate,
}

/// Where the dispatch loop goes after an opcode
enum ControlOutcome {
    Advance,
    JumpTo(usize),
    Finish(Signal),
}

/// Loop bookkeeping pushed by LoopStart, consumed by Break/Continue
struct LoopFrame {
    /// Condition start, the instruction after LoopStart
    start: usize,
    /// Index of the matching LoopEnd
    end: usize,
    /// Environment at loop entry, restored when jumping out of nested scopes
    env: EnvRef,
}

/// Try bookkeeping pushed by TryStart
struct TryFrame {
    catch_ip: usize,
    stack_len: usize,
    num_stack_len: usize,
    loops_len: usize,
    env: EnvRef,
}

/// Slot storage for the code block currently executing
struct Frame {
    slots: Vec<Value>,
    local_names: Arc<Vec<String>>,
}

/// Direct method opcodes map to a canonical method name and fixed arity
fn direct_op_method(op: &Op) -> Option<(&'static str, usize, Option<usize>)> {
    let entry = match op {
        Op::ToString => ("toString", 0, None),
        Op::GetType => ("type", 0, None),
        Op::GetLength => ("length", 0, None),
        Op::IsString => ("isString", 0, None),
        Op::IsNumber => ("isNumber", 0, None),
        Op::IsInt => ("isInt", 0, None),
        Op::IsFloat => ("isFloat", 0, None),
        Op::IsBool => ("isBool", 0, None),
        Op::IsArray => ("isArray", 0, None),
        Op::IsNull => ("isNull", 0, None),
        Op::IsObject => ("isObject", 0, None),
        Op::IsFunction => ("isFunction", 0, None),
        Op::StringUpper => ("upper", 0, None),
        Op::StringLower => ("lower", 0, None),
        Op::StringTrim => ("trim", 0, None),
        Op::StringSplit => ("split", 1, None),
        Op::StringReplace => ("replace", 2, None),
        Op::MathAbs => ("abs", 0, None),
        Op::MathSqrt => ("sqrt", 0, None),
        Op::MathPow => ("pow", 1, None),
        Op::MathSin => ("sin", 0, None),
        Op::MathCos => ("cos", 0, None),
        Op::MathTan => ("tan", 0, None),
        Op::MathFloor => ("floor", 0, None),
        Op::MathCeil => ("ceil", 0, None),
        Op::MathRound => ("round", 0, None),
        Op::ArrayPush(wb) => ("push", 1, *wb),
        Op::ArrayPop(wb) => ("pop", 0, *wb),
        Op::ArrayContains => ("contains", 1, None),
        Op::ArrayIndexOf => ("indexOf", 1, None),
        Op::ArrayJoin => ("join", 1, None),
        Op::ArrayUnique => ("unique", 0, None),
        Op::ArraySlice => ("slice", 2, None),
        Op::ArrayConcat => ("concat", 1, None),
        Op::MapHas => ("has", 1, None),
        Op::MapKeys => ("keys", 0, None),
        Op::MapDelete(wb) => ("delete", 1, *wb),
        Op::MapClear(wb) => ("clear", 0, *wb),
        Op::MapUpdate(wb) => ("update", 1, *wb),
        Op::SetAdd(wb) => ("add", 1, *wb),
        Op::SetRemove(wb) => ("remove", 1, *wb),
        Op::SetToArray => ("toArray", 0, None),
        Op::SetUnion => ("union", 1, None),
        Op::SetIntersection => ("intersection", 1, None),
        _ => return None,
    };
    Some(entry)
}

pub struct Vm<'a> {
    interp: &'a mut Interpreter,
    program: Program,
    stack: Vec<Value>,
    num_stack: Vec<f64>,
    loops: Vec<LoopFrame>,
    tries: Vec<TryFrame>,
    current_env: EnvRef,
    /// Value raised by Throw, awaiting its Catch binding
    pending_thrown: Option<Value>,
    /// Class methods compile on first dispatch: (class, method) -> func id
    method_cache: AHashMap<(String, String), usize>,
    /// Field default initializers: (class, field) -> func id
    field_init_cache: AHashMap<(String, String), usize>,
}

impl<'a> Vm<'a> {
    pub fn new(interp: &'a mut Interpreter, program: Program) -> Self {
        let env = interp.globals.clone();
        Vm {
            interp,
            program,
            stack: Vec::new(),
            num_stack: Vec::new(),
            loops: Vec::new(),
            tries: Vec::new(),
            current_env: env,
            pending_thrown: None,
            method_cache: AHashMap::new(),
            field_init_cache: AHashMap::new(),
        }
    }

    /// Execute the main program until Halt, returning the top-of-stack value
    pub fn run(&mut self) -> Result<Value, MycoError> {
        let code = Arc::new(self.program.code.clone());
        let local_names = Arc::new(self.program.local_names.clone());
        let mut frame =
            Frame { slots: vec![Value::Null; local_names.len()], local_names };
        match self.execute_code(code, &mut frame, true)? {
            Signal::Halt(v) | Signal::Return(v) => Ok(v),
            _ => Ok(Value::Null),
        }
    }

    // === Small helpers ===

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Null)
    }

    fn pop_args(&mut self, count: usize) -> Vec<Value> {
        let start = self.stack.len().saturating_sub(count);
        self.stack.split_off(start)
    }

    fn num_pop(&mut self) -> f64 {
        self.num_stack.pop().unwrap_or(0.0)
    }

    fn const_value(&self, idx: usize) -> Value {
        self.program.constants.get(idx).cloned().unwrap_or(Value::Null)
    }

    fn const_string(&self, idx: usize) -> String {
        match self.program.constants.get(idx) {
            Some(Value::Str(s)) => s.as_ref().clone(),
            _ => String::new(),
        }
    }

    /// Build a function value from a function-table entry, sharing its code
    fn function_value(
        &self,
        func_id: usize,
        name: Option<String>,
        capture: Option<EnvRef>,
    ) -> FunctionValue {
        let def = &self.program.functions[func_id];
        FunctionValue {
            name: name.unwrap_or_else(|| def.name.clone()),
            func_id,
            params: def.params.clone(),
            return_type: def.return_type.clone(),
            code: def.code.clone(),
            local_names: def.local_names.clone(),
            uses_slots: def.uses_slots,
            capture,
        }
    }

    /// Capture snapshot for a function defined here. The global frame is
    /// shared rather than copied: top-level definitions see later globals,
    /// matching the live global environment semantics.
    fn capture_env(&self) -> EnvRef {
        if Arc::ptr_eq(&self.current_env, &self.interp.globals) {
            self.interp.globals.clone()
        } else {
            crate::interpreter::env_copy(&self.current_env)
        }
    }

    fn loc_of(&self, ip: usize, is_main: bool) -> SourceLocation {
        if is_main {
            if let Some((line, column)) = self.program.source_map.get(&ip) {
                return SourceLocation::new(*line as usize, *column as usize);
            }
        }
        SourceLocation::unknown()
    }

    /// Write a mutated receiver back into its owning binding: a frame slot
    /// when the name is slot-allocated, otherwise the scope chain
    fn write_binding(&mut self, frame: &mut Frame, name: &str, val: Value) {
        if let Some(slot) = frame.local_names.iter().rposition(|n| n == name) {
            if slot < frame.slots.len() {
                frame.slots[slot] = val;
                return;
            }
        }
        env_assign(&self.current_env, name, val);
    }

    /// Record an error and decide where execution goes next
    fn fail(
        &mut self,
        mut err: MycoError,
        ip: usize,
        is_main: bool,
        tries_at_entry: usize,
    ) -> Result<ErrorResolution, MycoError> {
        if err.location.line == 0 {
            err.location = self.loc_of(ip, is_main);
        }
        self.interp.set_error(err);
        self.resolve_error(tries_at_entry)
    }

    /// Resolve an error already sitting in the interpreter error slot
    fn resolve_error(&mut self, tries_at_entry: usize) -> Result<ErrorResolution, MycoError> {
        if self.interp.fatal {
            return Err(self.interp.error.clone().unwrap_or_else(|| {
                MycoError::internal("fatal flag set without an error".to_string())
            }));
        }
        if self.tries.is_empty() {
            // Report and continue: the design choice is not to abort
            let err = self.interp.error.take().unwrap_or_else(|| {
                MycoError::internal("error slot empty during resolution".to_string())
            });
            self.pending_thrown = None;
            eprintln!("{}", err);
            return Ok(ErrorResolution::Reported);
        }
        if self.tries.len() > tries_at_entry {
            let frame = self.tries.pop().expect("try frame checked above");
            self.stack.truncate(frame.stack_len);
            self.num_stack.truncate(frame.num_stack_len);
            self.loops.truncate(frame.loops_len);
            self.current_env = frame.env;
            // The error slot stays set; the Catch instruction consumes it
            return Ok(ErrorResolution::Unwound(frame.catch_ip));
        }
        Ok(ErrorResolution::Propagate)
    }

    /// Run a sub-program (for-loop body, catch body, field initializer) in
    /// the given environment
    fn run_sub(&mut self, func_id: usize, env: EnvRef) -> Result<Signal, MycoError> {
        let code = self.program.functions[func_id].code.clone();
        let local_names = self.program.functions[func_id].local_names.clone();
        let mut frame = Frame { slots: Vec::new(), local_names };
        let saved = std::mem::replace(&mut self.current_env, env);
        let signal = self.execute_code(code, &mut frame, false);
        self.current_env = saved;
        signal
    }

    // === The dispatch loop ===

    fn execute_code(
        &mut self,
        code: Arc<Vec<Op>>,
        frame: &mut Frame,
        is_main: bool,
    ) -> Result<Signal, MycoError> {
        let tries_at_entry = self.tries.len();
        let loops_at_entry = self.loops.len();
        let mut ip = 0usize;

        while ip < code.len() {
            let outcome = self.step(&code[ip], frame, ip, is_main, tries_at_entry, loops_at_entry)?;
            match outcome {
                ControlOutcome::Advance => ip += 1,
                ControlOutcome::JumpTo(target) => ip = target,
                ControlOutcome::Finish(signal) => return Ok(signal),
            }
        }
        Ok(Signal::Normal)
    }

    fn step(
        &mut self,
        op: &Op,
        frame: &mut Frame,
        ip: usize,
        is_main: bool,
        tries_at_entry: usize,
        loops_at_entry: usize,
    ) -> Result<ControlOutcome, MycoError> {
        // Simple fallible operations share one error funnel at the bottom
        let simple: Result<(), MycoError> = match op {
            // === Constants and variables ===
            Op::LoadConst(idx) => {
                let v = self.const_value(*idx);
                self.stack.push(v);
                Ok(())
            }
            Op::LoadLocal(slot) => {
                let v = frame.slots.get(*slot).cloned().unwrap_or(Value::Null);
                self.stack.push(v);
                Ok(())
            }
            Op::StoreLocal(slot) => {
                let v = self.pop();
                if *slot < frame.slots.len() {
                    frame.slots[*slot] = v;
                }
                Ok(())
            }
            Op::LoadGlobal(idx) => {
                let name = self.const_string(*idx);
                match env_get(&self.interp.globals, &name) {
                    Some(v) => {
                        self.stack.push(v);
                        Ok(())
                    }
                    None => {
                        self.stack.push(Value::Null);
                        Err(self.undefined_variable(&name))
                    }
                }
            }
            Op::StoreGlobal(idx) => {
                let name = self.const_string(*idx);
                let v = self.pop();
                env_define(&self.interp.globals, &name, v);
                Ok(())
            }
            Op::LoadVar(idx) => {
                let name = self.const_string(*idx);
                match env_get(&self.current_env, &name) {
                    Some(v) => {
                        self.stack.push(v);
                        Ok(())
                    }
                    None => {
                        self.stack.push(Value::Null);
                        Err(self.undefined_variable(&name))
                    }
                }
            }
            Op::DefineVar(idx) => {
                let name = self.const_string(*idx);
                let v = self.pop();
                env_define(&self.current_env, &name, v);
                Ok(())
            }
            Op::AssignVar(idx) => {
                let name = self.const_string(*idx);
                let v = self.pop();
                env_assign(&self.current_env, &name, v);
                Ok(())
            }
            Op::Pop => {
                self.pop();
                Ok(())
            }
            Op::PushScope => {
                self.current_env = Environment::new(Some(self.current_env.clone()));
                Ok(())
            }
            Op::PopScope => {
                let parent = self.current_env.lock().unwrap().parent();
                if let Some(parent) = parent {
                    self.current_env = parent;
                }
                Ok(())
            }

            // === Boxed arithmetic and logic ===
            Op::Add => self.binary_op(value::add),
            Op::Sub => self.binary_op(value::subtract),
            Op::Mul => self.binary_op(value::multiply),
            Op::Div => self.binary_op(value::divide),
            Op::Mod => self.binary_op(value::modulo),
            Op::Pow => self.binary_op(value::power),
            Op::Lt => self.binary_op(value::less_than),
            Op::Le => self.binary_op(value::less_equal),
            Op::Gt => self.binary_op(value::greater_than),
            Op::Ge => self.binary_op(value::greater_equal),
            Op::BitAnd => self.binary_op(value::bitwise_and),
            Op::BitOr => self.binary_op(value::bitwise_or),
            Op::BitXor => self.binary_op(value::bitwise_xor),
            Op::Shl => self.binary_op(value::shift_left),
            Op::Shr => self.binary_op(value::shift_right),
            Op::Eq => {
                let b = self.pop();
                let a = self.pop();
                self.stack.push(Value::Bool(a.equals(&b)));
                Ok(())
            }
            Op::Ne => {
                let b = self.pop();
                let a = self.pop();
                self.stack.push(Value::Bool(!a.equals(&b)));
                Ok(())
            }
            Op::And => {
                let b = self.pop();
                let a = self.pop();
                self.stack.push(value::logical_and(&a, &b));
                Ok(())
            }
            Op::Or => {
                let b = self.pop();
                let a = self.pop();
                self.stack.push(value::logical_or(&a, &b));
                Ok(())
            }
            Op::Xor => {
                let b = self.pop();
                let a = self.pop();
                self.stack.push(value::logical_xor(&a, &b));
                Ok(())
            }
            Op::Not => {
                let a = self.pop();
                self.stack.push(value::logical_not(&a));
                Ok(())
            }
            Op::Negate => {
                let a = self.pop();
                match value::negate(&a) {
                    Ok(v) => {
                        self.stack.push(v);
                        Ok(())
                    }
                    Err(e) => {
                        self.stack.push(Value::Null);
                        Err(e)
                    }
                }
            }

            // === Numeric fast path ===
            Op::LoadNum(idx) => {
                let n = self.program.num_constants.get(*idx).copied().unwrap_or(0.0);
                self.num_stack.push(n);
                Ok(())
            }
            Op::AddNum => {
                let b = self.num_pop();
                let a = self.num_pop();
                self.num_stack.push(a + b);
                Ok(())
            }
            Op::SubNum => {
                let b = self.num_pop();
                let a = self.num_pop();
                self.num_stack.push(a - b);
                Ok(())
            }
            Op::MulNum => {
                let b = self.num_pop();
                let a = self.num_pop();
                self.num_stack.push(a * b);
                Ok(())
            }
            Op::DivNum => {
                let b = self.num_pop();
                let a = self.num_pop();
                if b == 0.0 {
                    self.num_stack.push(0.0);
                    Err(MycoError::division_by_zero(SourceLocation::unknown()))
                } else {
                    self.num_stack.push(a / b);
                    Ok(())
                }
            }
            Op::ModNum => {
                let b = self.num_pop();
                let a = self.num_pop();
                if b == 0.0 {
                    self.num_stack.push(0.0);
                    Err(MycoError::division_by_zero(SourceLocation::unknown()))
                } else {
                    self.num_stack.push(a % b);
                    Ok(())
                }
            }
            Op::LtNum => {
                let b = self.num_pop();
                let a = self.num_pop();
                self.stack.push(Value::Bool(a < b));
                Ok(())
            }
            Op::LeNum => {
                let b = self.num_pop();
                let a = self.num_pop();
                self.stack.push(Value::Bool(a <= b));
                Ok(())
            }
            Op::GtNum => {
                let b = self.num_pop();
                let a = self.num_pop();
                self.stack.push(Value::Bool(a > b));
                Ok(())
            }
            Op::GeNum => {
                let b = self.num_pop();
                let a = self.num_pop();
                self.stack.push(Value::Bool(a >= b));
                Ok(())
            }
            Op::EqNum => {
                let b = self.num_pop();
                let a = self.num_pop();
                self.stack.push(Value::Bool(a == b));
                Ok(())
            }
            Op::NeNum => {
                let b = self.num_pop();
                let a = self.num_pop();
                self.stack.push(Value::Bool(a != b));
                Ok(())
            }
            Op::ValueToNum => {
                let v = self.pop();
                match cast_value_to_num(&v) {
                    Ok(n) => {
                        self.num_stack.push(n);
                        Ok(())
                    }
                    Err(e) => {
                        self.num_stack.push(0.0);
                        Err(e)
                    }
                }
            }
            Op::NumToValue => {
                let n = self.num_pop();
                self.stack.push(Value::Number(n));
                Ok(())
            }

            // === Control flow ===
            Op::Jump(target) => return Ok(ControlOutcome::JumpTo(*target)),
            Op::JumpIfFalse(target) => {
                let v = self.pop();
                if !v.is_truthy() {
                    return Ok(ControlOutcome::JumpTo(*target));
                }
                Ok(())
            }
            Op::LoopStart(end) => {
                self.loops.push(LoopFrame {
                    start: ip + 1,
                    end: *end,
                    env: self.current_env.clone(),
                });
                Ok(())
            }
            Op::LoopEnd => {
                self.loops.pop();
                Ok(())
            }
            Op::Break => {
                if self.loops.len() > loops_at_entry {
                    let loop_frame = self.loops.pop().expect("loop frame checked above");
                    self.current_env = loop_frame.env;
                    return Ok(ControlOutcome::JumpTo(loop_frame.end + 1));
                }
                // No enclosing loop in this block: signal the loop driver
                return Ok(ControlOutcome::Finish(Signal::Break));
            }
            Op::Continue => {
                if self.loops.len() > loops_at_entry {
                    let loop_frame = self.loops.last().expect("loop frame checked above");
                    let start = loop_frame.start;
                    self.current_env = loop_frame.env.clone();
                    return Ok(ControlOutcome::JumpTo(start));
                }
                return Ok(ControlOutcome::Finish(Signal::Continue));
            }
            Op::Return => {
                let v = self.pop();
                return Ok(ControlOutcome::Finish(Signal::Return(v)));
            }
            Op::Halt => {
                let v = self.pop();
                return Ok(ControlOutcome::Finish(Signal::Halt(v)));
            }
            Op::ForLoop(var_idx, body_id) => {
                return self.op_for_loop(*var_idx, *body_id, ip, is_main, tries_at_entry);
            }

            // === Builders ===
            Op::CreateArray(n) => {
                let items = self.pop_args(*n);
                self.stack.push(Value::array(items));
                Ok(())
            }
            Op::CreateMap(n) => {
                let flat = self.pop_args(*n * 2);
                let mut map = ObjectMap::new();
                for pair in flat.chunks(2) {
                    let key = match &pair[0] {
                        Value::Str(s) => s.as_ref().clone(),
                        other => other.to_display_string(),
                    };
                    map.set(&key, pair[1].clone());
                }
                self.stack.push(Value::object(map));
                Ok(())
            }
            Op::CreateSet(n) => {
                let items = self.pop_args(*n);
                self.stack.push(Value::set_of(items));
                Ok(())
            }
            Op::CreateRange(inclusive) => {
                let end = self.pop();
                let start = self.pop();
                match (cast_value_to_num(&start), cast_value_to_num(&end)) {
                    (Ok(s), Ok(e)) => {
                        self.stack.push(Value::Range {
                            start: s,
                            end: e,
                            step: 1.0,
                            inclusive: *inclusive,
                        });
                        Ok(())
                    }
                    _ => {
                        self.stack.push(Value::Null);
                        Err(MycoError::type_mismatch(
                            "Range bounds must be numbers".to_string(),
                            SourceLocation::unknown(),
                        ))
                    }
                }
            }
            Op::CreateRangeStep => {
                let step = self.pop();
                let end = self.pop();
                let start = self.pop();
                match (cast_value_to_num(&start), cast_value_to_num(&end), cast_value_to_num(&step))
                {
                    (Ok(s), Ok(e), Ok(p)) if p != 0.0 => {
                        self.stack.push(Value::Range {
                            start: s,
                            end: e,
                            step: p,
                            inclusive: false,
                        });
                        Ok(())
                    }
                    _ => {
                        self.stack.push(Value::Null);
                        Err(MycoError::type_mismatch(
                            "Range needs numeric bounds and a nonzero step".to_string(),
                            SourceLocation::unknown(),
                        ))
                    }
                }
            }
            Op::CreateLambda(func_id) => {
                let fv = self.function_value(*func_id, None, Some(self.capture_env()));
                self.stack.push(Value::Function(Arc::new(fv)));
                Ok(())
            }
            Op::CreateClass(name_idx, parent_idx, body_idx) => {
                let name = self.const_string(*name_idx);
                let parent = parent_idx.map(|idx| self.const_string(idx));
                let body = self.program.class_bodies[*body_idx].clone();
                let class =
                    ClassValue { name, parent, body, env: self.current_env.clone() };
                self.stack.push(Value::Class(Arc::new(class)));
                Ok(())
            }

            // === Access ===
            Op::ArrayGet => self.op_index_get(),
            Op::ArraySet(write_back) => {
                let wb = write_back.map(|idx| self.const_string(idx));
                self.op_index_set(wb, frame)
            }
            Op::PropertyAccess(idx) => {
                let member = self.const_string(*idx);
                self.op_property_access(&member)
            }
            Op::PropertySet(idx, write_back) => {
                let member = self.const_string(*idx);
                let wb = write_back.map(|i| self.const_string(i));
                self.op_property_set(&member, wb, frame)
            }

            // === Exceptions (simple parts) ===
            Op::TryStart(catch_ip) => {
                self.tries.push(TryFrame {
                    catch_ip: *catch_ip,
                    stack_len: self.stack.len(),
                    num_stack_len: self.num_stack.len(),
                    loops_len: self.loops.len(),
                    env: self.current_env.clone(),
                });
                Ok(())
            }
            Op::TryEnd => {
                self.tries.pop();
                Ok(())
            }

            // === Pattern matching ===
            Op::PatternLiteral => {
                let pattern = self.pop();
                let scrutinee = self.pop();
                self.stack.push(Value::Bool(scrutinee.equals(&pattern)));
                Ok(())
            }
            Op::PatternWildcard => {
                self.pop();
                self.stack.push(Value::Bool(true));
                Ok(())
            }
            Op::PatternType(idx) => {
                let name = self.const_string(*idx);
                let v = self.pop();
                let matches = match name.as_str() {
                    "Number" => matches!(v, Value::Number(_)),
                    other => v.type_name() == other,
                };
                self.stack.push(Value::Bool(matches));
                Ok(())
            }
            Op::MatchEnd => Ok(()),

            // === Printing ===
            Op::Print => {
                let v = self.pop();
                let text = v.to_display_string();
                self.interp.print_line(&text);
                Ok(())
            }
            Op::PrintMultiple(n) => {
                let values = self.pop_args(*n);
                let parts: Vec<String> =
                    values.iter().map(|v| v.to_display_string()).collect();
                let line = parts.join(" ");
                self.interp.print_line(&line);
                Ok(())
            }

            // === Complex operations with their own control flow ===
            Op::Throw => {
                let v = self.pop();
                let message = match &v {
                    Value::Error { message, .. } => message.clone(),
                    other => other.to_display_string(),
                };
                self.pending_thrown = Some(v);
                let err = MycoError::new(
                    ErrorKind::InternalError,
                    format!("Uncaught thrown value: {}", message),
                    self.loc_of(ip, is_main),
                );
                return self.fail_outcome(err, ip, is_main, tries_at_entry);
            }
            Op::Catch(var_idx, func_id) => {
                return self.op_catch(*var_idx, *func_id, tries_at_entry, loops_at_entry);
            }
            Op::ImportLib(name_idx, alias_idx, items_idx) => {
                self.op_import(*name_idx, *alias_idx, *items_idx)
            }
            Op::DefineFunction(name_idx, func_id, _exported) => {
                let name = self.const_string(*name_idx);
                let fv =
                    self.function_value(*func_id, Some(name.clone()), Some(self.capture_env()));
                env_define(&self.current_env, &name, Value::Function(Arc::new(fv)));
                Ok(())
            }
            Op::CallUserFunction(func_id, argc) => {
                let args = self.pop_args(*argc);
                let name = self.program.functions[*func_id].name.clone();
                let fv = match env_get(&self.current_env, &name) {
                    Some(Value::Function(f)) => (*f).clone(),
                    _ => self.function_value(*func_id, None, None),
                };
                let loc = self.loc_of(ip, is_main);
                let result = self.call_function(&fv, args, None, &loc)?;
                return self.after_call(result.map(|(v, _)| v), tries_at_entry);
            }
            Op::CallBuiltin(name_idx, argc) => {
                let name = self.const_string(*name_idx);
                let args = self.pop_args(*argc);
                let loc = self.loc_of(ip, is_main);
                let result = self.call_named_builtin(&name, args, &loc)?;
                return self.after_call(result, tries_at_entry);
            }
            Op::CallFunctionValue(argc) => {
                let callee = self.pop();
                let args = self.pop_args(*argc);
                let loc = self.loc_of(ip, is_main);
                let result = self.call_value(callee, args, &loc)?;
                return self.after_call(result, tries_at_entry);
            }
            Op::InstantiateClass(name_idx, argc) => {
                let name = self.const_string(*name_idx);
                let args = self.pop_args(*argc);
                let result = match env_get(&self.interp.globals, &name) {
                    Some(Value::Class(class)) => self.instantiate(&class, args)?,
                    _ => {
                        self.interp.set_error(MycoError::new(
                            ErrorKind::TypeMismatch,
                            format!("'{}' is not a class", name),
                            self.loc_of(ip, is_main),
                        ));
                        None
                    }
                };
                return self.after_call(result, tries_at_entry);
            }
            Op::MethodCall(name_idx, argc, write_back) => {
                let name = self.const_string(*name_idx);
                let wb = write_back.map(|i| self.const_string(i));
                return self.op_method_call(&name, *argc, wb, frame, ip, is_main, tries_at_entry);
            }

            // Direct built-in method opcodes
            other => {
                if let Some((name, argc, write_back)) = direct_op_method(other) {
                    let wb = write_back.map(|i| self.const_string(i));
                    return self.op_method_call(name, argc, wb, frame, ip, is_main, tries_at_entry);
                }
                Err(MycoError::internal(format!("Unhandled opcode {:?}", other)))
            }
        };

        match simple {
            Ok(()) => Ok(ControlOutcome::Advance),
            Err(err) => self.fail_outcome(err, ip, is_main, tries_at_entry),
        }
    }

    /// Convert an error resolution into a dispatch outcome
    fn fail_outcome(
        &mut self,
        err: MycoError,
        ip: usize,
        is_main: bool,
        tries_at_entry: usize,
    ) -> Result<ControlOutcome, MycoError> {
        match self.fail(err, ip, is_main, tries_at_entry)? {
            ErrorResolution::Reported => Ok(ControlOutcome::Advance),
            ErrorResolution::Unwound(target) => Ok(ControlOutcome::JumpTo(target)),
            ErrorResolution::Propagate => Ok(ControlOutcome::Finish(Signal::Errored)),
        }
    }

    /// Shared tail for call-like opcodes: push the result, or handle the
    /// pending error when the callee failed
    fn after_call(
        &mut self,
        result: Option<Value>,
        tries_at_entry: usize,
    ) -> Result<ControlOutcome, MycoError> {
        match result {
            Some(v) => {
                self.stack.push(v);
                Ok(ControlOutcome::Advance)
            }
            None => {
                self.stack.push(Value::Null);
                match self.resolve_error(tries_at_entry)? {
                    ErrorResolution::Reported => Ok(ControlOutcome::Advance),
                    ErrorResolution::Unwound(target) => Ok(ControlOutcome::JumpTo(target)),
                    ErrorResolution::Propagate => Ok(ControlOutcome::Finish(Signal::Errored)),
                }
            }
        }
    }

    fn binary_op(
        &mut self,
        f: fn(&Value, &Value) -> Result<Value, MycoError>,
    ) -> Result<(), MycoError> {
        let b = self.pop();
        let a = self.pop();
        match f(&a, &b) {
            Ok(v) => {
                self.stack.push(v);
                Ok(())
            }
            Err(e) => {
                self.stack.push(Value::Null);
                Err(e)
            }
        }
    }

    fn undefined_variable(&self, name: &str) -> MycoError {
        let mut err = MycoError::undefined_variable(name, SourceLocation::unknown());
        let candidates = env_visible_names(&self.current_env);
        if let Some(suggestion) = find_closest_match(name, &candidates) {
            err = err.with_suggestion(suggestion.to_string());
        }
        err
    }

    // === Indexing and member access ===

    fn op_index_get(&mut self) -> Result<(), MycoError> {
        let index = self.pop();
        let target = self.pop();
        let result = match (&target, &index) {
            (Value::Array(items), Value::Number(n)) => {
                let i = *n as i64;
                if i < 0 || i as usize >= items.len() {
                    self.stack.push(Value::Null);
                    return Err(MycoError::index_out_of_bounds(
                        i,
                        items.len(),
                        SourceLocation::unknown(),
                    ));
                }
                items[i as usize].clone()
            }
            (Value::Str(s), Value::Number(n)) => {
                let i = *n as i64;
                match s.chars().nth(i.max(0) as usize) {
                    Some(c) if i >= 0 => Value::str(c.to_string()),
                    _ => {
                        self.stack.push(Value::Null);
                        return Err(MycoError::index_out_of_bounds(
                            i,
                            s.chars().count(),
                            SourceLocation::unknown(),
                        ));
                    }
                }
            }
            (Value::Object(map), Value::Str(key)) => {
                map.get(key.as_str()).cloned().unwrap_or(Value::Null)
            }
            (Value::Array(_), _) | (Value::Str(_), _) | (Value::Object(_), _) => {
                self.stack.push(Value::Null);
                return Err(MycoError::new(
                    ErrorKind::InvalidIndexType,
                    format!("Cannot index {} with {}", target.type_name(), index.type_name()),
                    SourceLocation::unknown(),
                ));
            }
            _ => {
                self.stack.push(Value::Null);
                return Err(MycoError::new(
                    ErrorKind::InvalidIndexTarget,
                    format!("{} is not indexable", target.type_name()),
                    SourceLocation::unknown(),
                ));
            }
        };
        self.stack.push(result);
        Ok(())
    }

    fn op_index_set(&mut self, write_back: Option<String>, frame: &mut Frame) -> Result<(), MycoError> {
        let val = self.pop();
        let index = self.pop();
        let mut target = self.pop();
        match (&mut target, &index) {
            (Value::Array(items), Value::Number(n)) => {
                let i = *n as i64;
                if i < 0 || i as usize >= items.len() {
                    return Err(MycoError::index_out_of_bounds(
                        i,
                        items.len(),
                        SourceLocation::unknown(),
                    ));
                }
                Arc::make_mut(items)[i as usize] = val;
            }
            (Value::Object(map), Value::Str(key)) => {
                Arc::make_mut(map).set(key.as_str(), val);
            }
            (Value::Array(_), _) | (Value::Object(_), _) => {
                return Err(MycoError::new(
                    ErrorKind::InvalidIndexType,
                    format!("Cannot index {} with {}", target.type_name(), index.type_name()),
                    SourceLocation::unknown(),
                ));
            }
            _ => {
                return Err(MycoError::new(
                    ErrorKind::InvalidIndexTarget,
                    format!("{} is not indexable", target.type_name()),
                    SourceLocation::unknown(),
                ));
            }
        }
        if let Some(name) = write_back {
            self.write_binding(frame, &name, target);
        }
        Ok(())
    }

    fn op_property_access(&mut self, member: &str) -> Result<(), MycoError> {
        let target = self.pop();
        let result = match &target {
            Value::Object(map) => map.get(member).cloned().unwrap_or(Value::Null),
            Value::Module(m) => match m.exports.get(member) {
                Some(v) => v.clone(),
                None => {
                    self.stack.push(Value::Null);
                    return Err(MycoError::new(
                        ErrorKind::InvalidMemberAccess,
                        format!("Module '{}' has no export '{}'", m.name, member),
                        SourceLocation::unknown(),
                    ));
                }
            },
            Value::Range { start, end, step, .. } => match member {
                "start" => Value::Number(*start),
                "end" => Value::Number(*end),
                "step" => Value::Number(*step),
                _ => {
                    self.stack.push(Value::Null);
                    return Err(MycoError::new(
                        ErrorKind::InvalidMemberAccess,
                        format!("Range has no member '{}'", member),
                        SourceLocation::unknown(),
                    ));
                }
            },
            other => {
                self.stack.push(Value::Null);
                return Err(MycoError::new(
                    ErrorKind::InvalidMemberAccess,
                    format!("Cannot access member '{}' on {}", member, other.type_name()),
                    SourceLocation::unknown(),
                ));
            }
        };
        self.stack.push(result);
        Ok(())
    }

    fn op_property_set(
        &mut self,
        member: &str,
        write_back: Option<String>,
        frame: &mut Frame,
    ) -> Result<(), MycoError> {
        let val = self.pop();
        let mut target = self.pop();
        match &mut target {
            Value::Object(map) => {
                Arc::make_mut(map).set(member, val);
            }
            other => {
                return Err(MycoError::new(
                    ErrorKind::InvalidMemberAccess,
                    format!("Cannot set member '{}' on {}", member, other.type_name()),
                    SourceLocation::unknown(),
                ));
            }
        }
        if let Some(name) = write_back {
            // Keep the method's view of its receiver coherent
            if name == "self" {
                self.interp.self_context = Some(target.clone());
            }
            self.write_binding(frame, &name, target);
        }
        Ok(())
    }

    // === Loops ===

    fn op_for_loop(
        &mut self,
        var_idx: usize,
        body_id: usize,
        ip: usize,
        is_main: bool,
        tries_at_entry: usize,
    ) -> Result<ControlOutcome, MycoError> {
        let var = self.const_string(var_idx);
        let collection = self.pop();

        let items: Vec<Value> = match &collection {
            Value::Range { start, end, step, inclusive } => {
                let mut out = Vec::new();
                let mut i = *start;
                if *step > 0.0 {
                    while if *inclusive { i <= *end } else { i < *end } {
                        out.push(Value::Number(i));
                        i += *step;
                    }
                } else if *step < 0.0 {
                    while if *inclusive { i >= *end } else { i > *end } {
                        out.push(Value::Number(i));
                        i += *step;
                    }
                }
                out
            }
            Value::Array(values) => values.as_ref().clone(),
            Value::Set(values) => values.as_ref().clone(),
            Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
            Value::Object(map) => map.keys().map(Value::str).collect(),
            other => {
                let err = MycoError::type_mismatch(
                    format!("Cannot iterate over {}", other.type_name()),
                    self.loc_of(ip, is_main),
                );
                return self.fail_outcome(err, ip, is_main, tries_at_entry);
            }
        };

        for item in items {
            // Fresh scope per iteration with the loop variable bound
            let child = Environment::new(Some(self.current_env.clone()));
            env_define(&child, &var, item);
            match self.run_sub(body_id, child)? {
                Signal::Normal | Signal::Continue => {}
                Signal::Break => break,
                Signal::Return(v) => return Ok(ControlOutcome::Finish(Signal::Return(v))),
                Signal::Halt(v) => return Ok(ControlOutcome::Finish(Signal::Halt(v))),
                Signal::Errored => match self.resolve_error(tries_at_entry)? {
                    ErrorResolution::Reported => {}
                    ErrorResolution::Unwound(target) => return Ok(ControlOutcome::JumpTo(target)),
                    ErrorResolution::Propagate => {
                        return Ok(ControlOutcome::Finish(Signal::Errored))
                    }
                },
            }
        }
        Ok(ControlOutcome::Advance)
    }

    // === Exceptions ===

    fn op_catch(
        &mut self,
        var_idx: usize,
        func_id: usize,
        tries_at_entry: usize,
        loops_at_entry: usize,
    ) -> Result<ControlOutcome, MycoError> {
        if !self.interp.has_error() && self.pending_thrown.is_none() {
            // Normal flow reached the handler site: nothing to do
            return Ok(ControlOutcome::Advance);
        }

        let bound = match self.pending_thrown.take() {
            Some(v) => {
                self.interp.clear_error();
                v
            }
            None => self.interp.take_error_value(),
        };

        let var = self.const_string(var_idx);
        let env = Environment::new(Some(self.current_env.clone()));
        env_define(&env, &var, bound);

        match self.run_sub(func_id, env)? {
            Signal::Normal => Ok(ControlOutcome::Advance),
            Signal::Return(v) => Ok(ControlOutcome::Finish(Signal::Return(v))),
            Signal::Halt(v) => Ok(ControlOutcome::Finish(Signal::Halt(v))),
            Signal::Break => {
                if self.loops.len() > loops_at_entry {
                    let loop_frame = self.loops.pop().expect("loop frame checked above");
                    self.current_env = loop_frame.env;
                    Ok(ControlOutcome::JumpTo(loop_frame.end + 1))
                } else {
                    Ok(ControlOutcome::Finish(Signal::Break))
                }
            }
            Signal::Continue => {
                if self.loops.len() > loops_at_entry {
                    let loop_frame = self.loops.last().expect("loop frame checked above");
                    let start = loop_frame.start;
                    self.current_env = loop_frame.env.clone();
                    Ok(ControlOutcome::JumpTo(start))
                } else {
                    Ok(ControlOutcome::Finish(Signal::Continue))
                }
            }
            Signal::Errored => match self.resolve_error(tries_at_entry)? {
                ErrorResolution::Reported => Ok(ControlOutcome::Advance),
                ErrorResolution::Unwound(target) => Ok(ControlOutcome::JumpTo(target)),
                ErrorResolution::Propagate => Ok(ControlOutcome::Finish(Signal::Errored)),
            },
        }
    }

    // === Calls ===

    /// Call a user function value. Returns None when a runtime error is
    /// pending; otherwise the result and, for method calls, the final self.
    fn call_function(
        &mut self,
        fv: &FunctionValue,
        args: Vec<Value>,
        self_value: Option<Value>,
        loc: &SourceLocation,
    ) -> Result<Option<(Value, Option<Value>)>, MycoError> {
        if args.len() != fv.params.len() {
            self.interp.set_error(MycoError::wrong_argument_count(
                &fv.name,
                fv.params.len(),
                args.len(),
            ));
            return Ok(None);
        }

        if let Err(e) =
            self.interp.push_call_frame(&fv.name, loc.line as u32, loc.column as u32)
        {
            self.interp.set_error(e.clone());
            return Err(e);
        }

        // The function value carries its own compiled body, so values from
        // earlier REPL lines or other modules stay callable
        let code = fv.code.clone();
        let local_names = fv.local_names.clone();
        let uses_slots = fv.uses_slots;

        let parent = fv.capture.clone().unwrap_or_else(|| self.interp.globals.clone());
        let call_env = Environment::new(Some(parent));
        // Bind the callee's own name for recursive self-reference
        env_define(&call_env, &fv.name, Value::Function(Arc::new(fv.clone())));

        let old_self = match &self_value {
            Some(sv) => {
                env_define(&call_env, "self", sv.clone());
                self.interp.self_context.replace(sv.clone())
            }
            None => self.interp.self_context.take(),
        };

        let mut frame = if uses_slots {
            let mut slots = vec![Value::Null; local_names.len()];
            for (i, arg) in args.into_iter().enumerate() {
                slots[i] = arg;
            }
            Frame { slots, local_names }
        } else {
            for (param, arg) in fv.params.iter().zip(args.into_iter()) {
                env_define(&call_env, &param.name, arg);
            }
            Frame { slots: Vec::new(), local_names }
        };

        let saved_env = std::mem::replace(&mut self.current_env, call_env.clone());
        let signal = self.execute_code(code, &mut frame, false);
        self.current_env = saved_env;
        self.interp.pop_call_frame();

        let final_self = if self_value.is_some() {
            Some(env_get(&call_env, "self").unwrap_or(Value::Null))
        } else {
            None
        };
        self.interp.self_context = old_self;

        match signal? {
            Signal::Return(v) | Signal::Halt(v) => Ok(Some((v, final_self))),
            Signal::Normal | Signal::Break | Signal::Continue => {
                Ok(Some((Value::Null, final_self)))
            }
            Signal::Errored => Ok(None),
        }
    }

    /// Dispatch a free builtin by name; `spawn` is intercepted here because
    /// it must call back into user code
    fn call_named_builtin(
        &mut self,
        name: &str,
        args: Vec<Value>,
        loc: &SourceLocation,
    ) -> Result<Option<Value>, MycoError> {
        if name == "spawn" {
            return self.op_spawn(args, loc);
        }
        match native_functions::call(
            self.interp,
            name,
            &args,
            loc.line as u32,
            loc.column as u32,
        ) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                self.interp.set_error(e);
                Ok(None)
            }
        }
    }

    /// Call whatever value sits in callee position
    fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        loc: &SourceLocation,
    ) -> Result<Option<Value>, MycoError> {
        match callee {
            Value::Function(fv) => {
                Ok(self.call_function(&fv, args, None, loc)?.map(|(v, _)| v))
            }
            Value::NativeFunction(name) => self.call_named_builtin(&name, args, loc),
            Value::Class(class) => self.instantiate(&class, args),
            other => {
                self.interp.set_error(MycoError::new(
                    ErrorKind::InvalidFunctionCall,
                    format!("{} is not callable", other.type_name()),
                    loc.clone(),
                ));
                Ok(None)
            }
        }
    }

    /// Run a task body to completion and wrap its result in a promise
    fn op_spawn(
        &mut self,
        mut args: Vec<Value>,
        loc: &SourceLocation,
    ) -> Result<Option<Value>, MycoError> {
        if args.is_empty() {
            self.interp.set_error(MycoError::wrong_argument_count("spawn", 1, 0));
            return Ok(None);
        }
        let callee = args.remove(0);
        let result = self.call_value(callee, args, loc)?;
        Ok(result.map(|v| {
            let id = AsyncRuntime::resolve_immediate(v);
            async_ops::make_promise_value(id)
        }))
    }

    // === Method dispatch ===

    fn op_method_call(
        &mut self,
        name: &str,
        argc: usize,
        write_back: Option<String>,
        frame: &mut Frame,
        ip: usize,
        is_main: bool,
        tries_at_entry: usize,
    ) -> Result<ControlOutcome, MycoError> {
        let args = self.pop_args(argc);
        let mut receiver = self.pop();
        let loc = self.loc_of(ip, is_main);

        // Class instances dispatch through the inheritance chain. Plain
        // objects look the method up as a member: a user function runs with
        // the object as self, a native member is a namespace call. Modules
        // dispatch through their exports without a receiver.
        enum Target {
            UserMethod(FunctionValue),
            PlainCall(FunctionValue),
            Native(String),
            BuiltinTable,
        }

        let class_name: Option<String> = match &receiver {
            Value::Object(map) => match map.get(CLASS_NAME_KEY) {
                Some(Value::Str(s)) => Some(s.as_ref().clone()),
                _ => None,
            },
            _ => None,
        };

        let target = if let Some(class_name) = &class_name {
            match self.find_method(class_name, name) {
                Ok(Some(fv)) => Target::UserMethod(fv),
                Ok(None) => Target::BuiltinTable,
                Err(e) => {
                    self.stack.push(Value::Null);
                    return self.fail_outcome(e, ip, is_main, tries_at_entry);
                }
            }
        } else {
            match &receiver {
                Value::Object(map) => match map.get(name) {
                    Some(Value::Function(f)) => Target::UserMethod((**f).clone()),
                    Some(Value::NativeFunction(n)) => Target::Native(n.clone()),
                    _ => Target::BuiltinTable,
                },
                Value::Module(m) => match m.exports.get(name) {
                    Some(Value::Function(f)) => Target::PlainCall((**f).clone()),
                    Some(Value::NativeFunction(n)) => Target::Native(n.clone()),
                    _ => Target::BuiltinTable,
                },
                _ => Target::BuiltinTable,
            }
        };

        match target {
            Target::UserMethod(fv) => {
                let outcome = self.call_function(&fv, args, Some(receiver), &loc)?;
                return match outcome {
                    Some((v, final_self)) => {
                        if let (Some(wb), Some(new_self)) = (&write_back, final_self) {
                            self.write_binding(frame, wb, new_self);
                        }
                        self.stack.push(v);
                        Ok(ControlOutcome::Advance)
                    }
                    None => self.after_call(None, tries_at_entry),
                };
            }
            Target::PlainCall(fv) => {
                let result = self.call_function(&fv, args, None, &loc)?.map(|(v, _)| v);
                return self.after_call(result, tries_at_entry);
            }
            Target::Native(native_name) => {
                let result = self.call_named_builtin(&native_name, args, &loc)?;
                return self.after_call(result, tries_at_entry);
            }
            Target::BuiltinTable => {}
        }

        // Built-in receiver types go through the per-type method tables
        match native_functions::lookup_method(&receiver, name) {
            Some(method) => match method(&mut receiver, &args) {
                Ok(result) => {
                    if let Some(wb) = &write_back {
                        self.write_binding(frame, wb, receiver);
                    }
                    self.stack.push(result);
                    Ok(ControlOutcome::Advance)
                }
                Err(e) => {
                    self.stack.push(Value::Null);
                    self.fail_outcome(e, ip, is_main, tries_at_entry)
                }
            },
            None => {
                self.stack.push(Value::Null);
                let err = MycoError::new(
                    ErrorKind::InvalidMemberAccess,
                    format!("{} has no method '{}'", receiver.type_name(), name),
                    loc,
                );
                self.fail_outcome(err, ip, is_main, tries_at_entry)
            }
        }
    }

    /// Walk the inheritance chain for a method definition, compiling it into
    /// the function table on first use
    fn find_method(
        &mut self,
        class_name: &str,
        method: &str,
    ) -> Result<Option<FunctionValue>, MycoError> {
        let mut current = Some(class_name.to_string());
        while let Some(cname) = current {
            let class = match env_get(&self.interp.globals, &cname) {
                Some(Value::Class(c)) => c,
                _ => return Ok(None),
            };
            let found = class.body.iter().find_map(|stmt| match stmt {
                crate::ast::Stmt::FuncDef { name, params, return_type, body, .. }
                    if name == method =>
                {
                    Some((params.clone(), return_type.clone(), body.clone()))
                }
                _ => None,
            });
            if let Some((params, return_type, body)) = found {
                let key = (cname.clone(), method.to_string());
                let func_id = match self.method_cache.get(&key) {
                    Some(id) => *id,
                    None => {
                        let id = Compiler::compile_function_into(
                            &mut self.program,
                            method,
                            &params,
                            return_type,
                            &body,
                        )?;
                        self.method_cache.insert(key, id);
                        id
                    }
                };
                let fv = self.function_value(
                    func_id,
                    Some(method.to_string()),
                    Some(class.env.clone()),
                );
                return Ok(Some(fv));
            }
            current = class.parent.clone();
        }
        Ok(None)
    }

    // === Classes ===

    /// Instantiate a class: gather fields along the inheritance chain
    /// (parent first), bind constructor args positionally in field order,
    /// and evaluate remaining default initializers in the class environment
    fn instantiate(
        &mut self,
        class: &Arc<ClassValue>,
        args: Vec<Value>,
    ) -> Result<Option<Value>, MycoError> {
        // Leaf to root, then reversed so parent fields come first
        let mut chain = vec![class.clone()];
        let mut parent_name = class.parent.clone();
        while let Some(pname) = parent_name {
            match env_get(&self.interp.globals, &pname) {
                Some(Value::Class(p)) => {
                    parent_name = p.parent.clone();
                    chain.push(p);
                }
                _ => {
                    self.interp.set_error(MycoError::new(
                        ErrorKind::UndefinedVariable,
                        format!("Parent class '{}' is not defined", pname),
                        SourceLocation::unknown(),
                    ));
                    return Ok(None);
                }
            }
        }

        let mut fields: Vec<(Arc<ClassValue>, String, Option<crate::ast::Expr>)> = Vec::new();
        for cls in chain.iter().rev() {
            for stmt in cls.body.iter() {
                if let crate::ast::Stmt::Let { name, value, .. } = stmt {
                    fields.push((cls.clone(), name.clone(), value.clone()));
                }
            }
        }

        if args.len() > fields.len() {
            self.interp.set_error(MycoError::wrong_argument_count(
                &class.name,
                fields.len(),
                args.len(),
            ));
            return Ok(None);
        }

        let mut map = ObjectMap::new();
        map.set(CLASS_NAME_KEY, Value::str(class.name.as_str()));

        let mut args = args.into_iter();
        for (owner, field_name, initializer) in &fields {
            let value = match args.next() {
                Some(v) => v,
                None => match initializer {
                    Some(expr) => {
                        let key = (owner.name.clone(), field_name.clone());
                        let func_id = match self.field_init_cache.get(&key) {
                            Some(id) => *id,
                            None => match Compiler::compile_expr_into(&mut self.program, expr) {
                                Ok(id) => {
                                    self.field_init_cache.insert(key, id);
                                    id
                                }
                                Err(e) => {
                                    self.interp.set_error(e);
                                    return Ok(None);
                                }
                            },
                        };
                        let env = Environment::new(Some(owner.env.clone()));
                        env_define(&env, "self", Value::object(map.clone()));
                        match self.run_sub(func_id, env)? {
                            Signal::Normal => self.pop(),
                            Signal::Errored => return Ok(None),
                            _ => Value::Null,
                        }
                    }
                    None => Value::Null,
                },
            };
            map.set(field_name, value);
        }

        Ok(Some(Value::object(map)))
    }

    // === Imports ===

    fn op_import(
        &mut self,
        name_idx: usize,
        alias_idx: Option<usize>,
        items_idx: Option<usize>,
    ) -> Result<(), MycoError> {
        let name = self.const_string(name_idx);

        let lib_value = match native_functions::builtin_library(&name) {
            Some(exports) => Value::object(exports),
            None => module::load_module(self.interp, &name)?,
        };

        if let Some(items_idx) = items_idx {
            let names = self.const_value(items_idx);
            let aliases = self.const_value(items_idx + 1);
            if let (Value::Array(names), Value::Array(aliases)) = (names, aliases) {
                for (i, item) in names.iter().enumerate() {
                    let item_name = match item {
                        Value::Str(s) => s.as_ref().clone(),
                        _ => continue,
                    };
                    let member = match member_of(&lib_value, &item_name) {
                        Some(v) => v,
                        None => {
                            return Err(MycoError::new(
                                ErrorKind::InvalidMemberAccess,
                                format!("'{}' has no member '{}'", name, item_name),
                                SourceLocation::unknown(),
                            ));
                        }
                    };
                    let bind_as = match aliases.get(i) {
                        Some(Value::Str(a)) => a.as_ref().clone(),
                        _ => item_name,
                    };
                    env_define(&self.current_env, &bind_as, member);
                }
            }
        }

        if let Some(alias_idx) = alias_idx {
            let alias = self.const_string(alias_idx);
            env_define(&self.current_env, &alias, lib_value);
        } else if items_idx.is_none() {
            env_define(&self.current_env, &name, lib_value);
        }
        Ok(())
    }
}

/// Member lookup over library objects and file modules
fn member_of(lib: &Value, name: &str) -> Option<Value> {
    match lib {
        Value::Object(map) => map.get(name).cloned(),
        Value::Module(m) => m.exports.get(name).cloned(),
        _ => None,
    }
}

/// Strict numeric read used by the fast-path bridge and range builders
fn cast_value_to_num(v: &Value) -> Result<f64, MycoError> {
    match v {
        Value::Number(n) => Ok(*n),
        other => Err(MycoError::type_mismatch(
            format!("Expected a number, got {}", other.type_name()),
            SourceLocation::unknown(),
        )),
    }
}

/// Build a module value from a finished module program's exports
pub fn collect_exports(
    globals: &EnvRef,
    export_names: &[String],
    module_name: &str,
) -> Value {
    let mut exports = ObjectMap::new();
    for name in export_names {
        if let Some(v) = env_get(globals, name) {
            exports.set(name, v);
        }
    }
    Value::Module(Arc::new(ModuleValue { name: module_name.to_string(), exports }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn run_captured(source: &str) -> (String, Interpreter) {
        let tokens = tokenize(source);
        let stmts = Parser::new(tokens).parse().expect("parse failed");
        let program = Compiler::compile(&stmts, false).expect("compile failed");
        let mut interp = Interpreter::new();
        interp.captured_output = Some(String::new());
        {
            let mut vm = Vm::new(&mut interp, program);
            vm.run().expect("run failed");
        }
        let output = interp.captured_output.clone().unwrap_or_default();
        (output, interp)
    }

    #[test]
    fn test_arithmetic_and_print() {
        let (out, _) = run_captured("print 1 + 2 * 3");
        assert_eq!(out, "7\n");
    }

    #[test]
    fn test_variable_assignment_walks_scope_chain() {
        let (out, _) = run_captured("let x = 1\n{ x = 5 }\nprint x");
        assert_eq!(out, "5\n");
    }

    #[test]
    fn test_block_scope_shadowing() {
        let (out, _) = run_captured("let x = 1\n{ let x = 2\nprint x }\nprint x");
        assert_eq!(out, "2\n1\n");
    }

    #[test]
    fn test_if_else_chain() {
        let (out, _) = run_captured(
            "let x = 5\nif x < 3 { print \"small\" } else if x < 10 { print \"medium\" } else { print \"large\" }",
        );
        assert_eq!(out, "medium\n");
    }

    #[test]
    fn test_while_with_break_and_continue() {
        let (out, _) = run_captured(
            "let i = 0\nlet acc = 0\nwhile true { i = i + 1\nif i > 10 { break }\nif i % 2 == 0 { continue }\nacc = acc + i }\nprint acc",
        );
        // 1 + 3 + 5 + 7 + 9
        assert_eq!(out, "25\n");
    }

    #[test]
    fn test_for_over_array_and_range() {
        let (out, _) = run_captured("let s = 0\nfor x in [1, 2, 3] { s = s + x }\nprint s");
        assert_eq!(out, "6\n");
        let (out, _) = run_captured("let n = 0\nfor i in 0..5 { n = n + 1 }\nprint n");
        assert_eq!(out, "5\n");
    }

    #[test]
    fn test_string_iteration_yields_chars() {
        let (out, _) = run_captured("for c in \"ab\" { print c }");
        assert_eq!(out, "a\nb\n");
    }

    #[test]
    fn test_function_call_and_closure_capture() {
        let (out, _) = run_captured(
            "fn make_adder(n) { return fn (x) => x + n }\nlet add2 = make_adder(2)\nprint add2(40)",
        );
        assert_eq!(out, "42\n");
    }

    #[test]
    fn test_short_circuit_does_not_call() {
        let (out, _) = run_captured(
            "let called = false\nfn f() { called = true\nreturn true }\nlet a = false && f()\nlet b = true || f()\nprint called, a, b",
        );
        assert_eq!(out, "False False True\n");
    }

    #[test]
    fn test_method_call_with_write_back() {
        let (out, _) = run_captured("let a = [1, 2, 3]\na.push(4)\nprint a");
        assert_eq!(out, "[1, 2, 3, 4]\n");
    }

    #[test]
    fn test_try_catch_binds_thrown_value() {
        let (out, interp) = run_captured("try { throw \"X\" } catch e { print e }");
        assert_eq!(out, "X\n");
        assert!(!interp.has_error());
    }

    #[test]
    fn test_division_by_zero_is_caught() {
        let (out, _) = run_captured("try { let z = 1 / 0 } catch e { print \"caught\" }");
        assert_eq!(out, "caught\n");
    }

    #[test]
    fn test_match_literal_and_wildcard() {
        let (out, _) = run_captured(
            "match 2 case 1 => print \"one\" case 2 => print \"two\" else => print \"other\" end",
        );
        assert_eq!(out, "two\n");
        let (out, _) = run_captured("match 9 case 1 => print \"one\" case _ => print \"any\" end");
        assert_eq!(out, "any\n");
    }

    #[test]
    fn test_match_type_patterns() {
        let (out, _) = run_captured(
            "match \"hi\" case Int => print \"int\" case String => print \"string\" end",
        );
        assert_eq!(out, "string\n");
    }

    #[test]
    fn test_class_inheritance_and_method_dispatch() {
        let (out, _) = run_captured(
            "class A { let x = 1\nfn get() { return self.x } }\nclass B(A) { let y = 2 }\nprint B().get()",
        );
        assert_eq!(out, "1\n");
    }

    #[test]
    fn test_class_field_mutation_through_method() {
        let (out, _) = run_captured(
            "class Counter { let n = 0\nfn bump() { self.n = self.n + 1 } }\nlet c = Counter()\nc.bump()\nc.bump()\nprint c.n",
        );
        assert_eq!(out, "2\n");
    }

    #[test]
    fn test_constructor_args_in_field_order() {
        let (out, _) = run_captured(
            "class P { let a = 1\nlet b = 2 }\nlet p = P(10)\nprint p.a, p.b",
        );
        assert_eq!(out, "10 2\n");
    }

    #[test]
    fn test_builtin_library_import_with_show() {
        let (out, _) = run_captured("use math show sqrt\nprint sqrt(16)");
        assert_eq!(out, "4\n");
    }

    #[test]
    fn test_import_with_alias_binds_namespace() {
        let (out, _) = run_captured("use math as m\nprint m.PI > 3");
        assert_eq!(out, "True\n");
    }

    #[test]
    fn test_spawn_and_await() {
        let (out, _) = run_captured(
            "fn task() { return 21 }\nlet p = spawn(task)\nprint await_promise(p) * 2",
        );
        assert_eq!(out, "42\n");
    }

    #[test]
    fn test_map_and_set_operations() {
        let (out, _) = run_captured(
            "let m = {\"a\": 1}\nm[\"b\"] = 2\nprint m.has(\"b\"), m.size()",
        );
        assert_eq!(out, "True 2\n");
        let (out, _) = run_captured("let s = {1, 2}\ns.add(3)\ns.add(2)\nprint s.size()");
        assert_eq!(out, "3\n");
    }

    #[test]
    fn test_uncaught_error_reports_and_continues() {
        let (out, interp) = run_captured("let z = 1 / 0\nprint \"after\"");
        assert_eq!(out, "after\n");
        assert!(!interp.has_error(), "error slot is cleared after reporting");
    }

    #[test]
    fn test_lambda_value_call() {
        let (out, _) = run_captured("let f = fn (a, b) { return a * b }\nprint f(6, 7)");
        assert_eq!(out, "42\n");
    }

    #[test]
    fn test_nested_for_loops_with_break() {
        let (out, _) = run_captured(
            "let hits = 0\nfor i in 0..3 { for j in 0..3 { if j > i { break }\nhits = hits + 1 } }\nprint hits",
        );
        // j runs 0..=i for each i
        assert_eq!(out, "6\n");
    }

    #[test]
    fn test_range_step_builtin() {
        let (out, _) = run_captured("let n = 0\nfor i in range(0, 10, 2) { n = n + 1 }\nprint n");
        assert_eq!(out, "5\n");
    }

    #[test]
    fn test_finally_runs_on_both_paths() {
        let (out, _) = run_captured(
            "try { print \"ok\" } catch e { print \"no\" } finally { print \"fin\" }",
        );
        assert_eq!(out, "ok\nfin\n");
        let (out, _) = run_captured(
            "try { throw \"x\" } catch e { print \"caught\" } finally { print \"fin\" }",
        );
        assert_eq!(out, "caught\nfin\n");
    }
}
