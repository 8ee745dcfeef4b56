// File: src/bytecode.rs
//
// Bytecode instruction definitions and program container for the Myco VM.
// A Program carries the instruction stream, the boxed and unboxed constant
// pools, the function table (user functions and compiler-generated
// sub-programs), and the class-body arena.

use crate::ast::{Param, Stmt};
use crate::interpreter::Value;
use ahash::AHashMap;
use std::sync::Arc;

/// Bytecode operations for the Myco VM.
/// Stack-based, with a parallel unboxed f64 stack for the numeric fast path.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // === Constants and variables ===
    /// Push constants[a]
    LoadConst(usize),
    /// Push local slot a
    LoadLocal(usize),
    /// Pop into local slot a
    StoreLocal(usize),
    /// Push the global named by constants[a]
    LoadGlobal(usize),
    /// Pop into the global named by constants[a]
    StoreGlobal(usize),
    /// Push the variable named by constants[a], searching up the scope chain
    LoadVar(usize),
    /// Pop and define the name in the current frame (shadowing)
    DefineVar(usize),
    /// Pop and assign the nearest binding up the chain
    AssignVar(usize),
    /// Discard top of stack
    Pop,
    /// Enter a block scope
    PushScope,
    /// Leave a block scope
    PopScope,

    // === Boxed arithmetic and logic ===
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Negate,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
    Not,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,

    // === Numeric fast path (parallel f64 stack) ===
    /// Push num_constants[a] onto the numeric stack
    LoadNum(usize),
    AddNum,
    SubNum,
    MulNum,
    DivNum,
    ModNum,
    /// Comparisons pop two f64s and push a Bool onto the value stack
    LtNum,
    LeNum,
    GtNum,
    GeNum,
    EqNum,
    NeNum,
    /// Pop the value stack, push its number onto the numeric stack
    ValueToNum,
    /// Pop the numeric stack, push a boxed Number onto the value stack
    NumToValue,

    // === Control flow ===
    /// Absolute jump
    Jump(usize),
    /// Pop; jump if falsy
    JumpIfFalse(usize),
    /// Enter loop bookkeeping; operand is the matching LoopEnd index
    LoopStart(usize),
    /// Leave loop bookkeeping
    LoopEnd,
    /// Exit the innermost loop
    Break,
    /// Next iteration of the innermost loop
    Continue,
    /// Return from the current function with top of stack
    Return,
    /// Stop execution; top of stack is the program result
    Halt,
    /// Pop the collection, run functions[b] per iteration with the variable
    /// named by constants[a] bound in a fresh scope
    ForLoop(usize, usize),

    // === Builders ===
    /// Pop n elements, push an array
    CreateArray(usize),
    /// Pop n key/value pairs, push an object (the map representation)
    CreateMap(usize),
    /// Pop n elements, push a set
    CreateSet(usize),
    /// Pop end then start, push a range; operand marks inclusivity
    CreateRange(bool),
    /// Pop step, end, start; push a stepped range
    CreateRangeStep,
    /// Push a lambda closing over the current environment; a is the
    /// function-table id
    CreateLambda(usize),
    /// Push a class value: name constants[a], optional parent name, body
    /// from the class-body arena
    CreateClass(usize, Option<usize>, usize),

    // === Access ===
    /// Pop index then target, push element
    ArrayGet,
    /// Pop value, index, target; write element. The optional operand names
    /// the owning variable so the mutated value is written back
    ArraySet(Option<usize>),
    /// Pop object, push member constants[a]
    PropertyAccess(usize),
    /// Pop value then object; set member constants[a], writing back to the
    /// optional owning variable
    PropertySet(usize, Option<usize>),
    /// Pop b args then the receiver; dispatch method constants[a]. The
    /// optional operand names the receiver variable for mutation write-back
    MethodCall(usize, usize, Option<usize>),

    // === Calls ===
    /// Pop b args, call the host callable named by constants[a]
    CallBuiltin(usize, usize),
    /// Pop b args, call functions[a]
    CallUserFunction(usize, usize),
    /// Pop the callee then a args; dispatch on function / native / class
    CallFunctionValue(usize),
    /// Bind functions[b] under the name constants[a] with a capture of the
    /// current environment; c carries the exported flag
    DefineFunction(usize, usize, bool),
    /// Pop b args, instantiate the class named by constants[a]
    InstantiateClass(usize, usize),

    // === Exceptions ===
    /// Enter a try block; operand is the index of the matching Catch
    TryStart(usize),
    /// Leave a try block normally
    TryEnd,
    /// Handler site: bind the error to constants[a] and run functions[b].
    /// A no-op when reached with no pending error
    Catch(usize, usize),
    /// Pop a value and raise it as an error
    Throw,

    // === Pattern matching ===
    /// Pop the pattern literal then the scrutinee, push Bool equality
    PatternLiteral,
    /// Pop the scrutinee, push True
    PatternWildcard,
    /// Pop the scrutinee, push Bool of a type-name match with constants[a]
    PatternType(usize),
    /// Marks the join point of a match chain
    MatchEnd,

    // === Printing and imports ===
    /// Pop and print with trailing newline
    Print,
    /// Pop n values (first pushed printed first), space-separated, newline
    PrintMultiple(usize),
    /// Import library constants[a]; optional alias name; optional selected
    /// item list (an array constant; the aliases array sits at items+1)
    ImportLib(usize, Option<usize>, Option<usize>),

    // === Direct built-in method dispatch ===
    ToString,
    GetType,
    GetLength,
    IsString,
    IsNumber,
    IsInt,
    IsFloat,
    IsBool,
    IsArray,
    IsNull,
    IsObject,
    IsFunction,
    StringUpper,
    StringLower,
    StringTrim,
    StringSplit,
    StringReplace,
    MathAbs,
    MathSqrt,
    MathPow,
    MathSin,
    MathCos,
    MathTan,
    MathFloor,
    MathCeil,
    MathRound,
    /// Array mutators carry the owning variable for write-back
    ArrayPush(Option<usize>),
    ArrayPop(Option<usize>),
    ArrayContains,
    ArrayIndexOf,
    ArrayJoin,
    ArrayUnique,
    ArraySlice,
    ArrayConcat,
    /// Map ops double for sets where the method name is shared (has, clear)
    MapHas,
    MapKeys,
    MapDelete(Option<usize>),
    MapClear(Option<usize>),
    MapUpdate(Option<usize>),
    SetAdd(Option<usize>),
    SetRemove(Option<usize>),
    SetToArray,
    SetUnion,
    SetIntersection,
}

/// A compiled function or compiler-generated sub-program.
/// Code and slot names are shared so call frames clone cheaply.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    pub code: Arc<Vec<Op>>,
    /// Slot-to-name mapping when the local-slot optimization applies
    pub local_names: Arc<Vec<String>>,
    /// Locals compile to frame slots instead of environment bindings
    pub uses_slots: bool,
    pub exported: bool,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: None,
            code: Arc::new(Vec::new()),
            local_names: Arc::new(Vec::new()),
            uses_slots: false,
            exported: false,
        }
    }
}

/// A compiled Myco source unit
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub code: Vec<Op>,
    pub constants: Vec<Value>,
    pub num_constants: Vec<f64>,
    /// Slot-to-name mapping for the main code when slot promotion applies
    pub local_names: Vec<String>,
    pub functions: Vec<FunctionDef>,
    /// Class bodies stay as AST: field initializers and methods are
    /// evaluated at instantiation time
    pub class_bodies: Vec<Arc<Vec<Stmt>>>,
    /// Top-level names flagged `export`; the module loader collects these
    pub exports: Vec<String>,
    /// Instruction index to (line, column) for error reporting
    pub source_map: AHashMap<usize, (u32, u32)>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a boxed constant, reusing an existing equal scalar entry
    pub fn add_constant(&mut self, value: Value) -> usize {
        let dedup = matches!(
            value,
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::Str(_)
        );
        if dedup {
            if let Some(index) = self.constants.iter().position(|c| c.equals(&value)) {
                return index;
            }
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Add a string constant (the common case for names)
    pub fn add_string_constant(&mut self, s: &str) -> usize {
        self.add_constant(Value::str(s))
    }

    /// Add an unboxed numeric constant for the fast path
    pub fn add_num_constant(&mut self, n: f64) -> usize {
        if let Some(index) = self.num_constants.iter().position(|c| c.to_bits() == n.to_bits()) {
            return index;
        }
        self.num_constants.push(n);
        self.num_constants.len() - 1
    }

    pub fn add_function(&mut self, func: FunctionDef) -> usize {
        self.functions.push(func);
        self.functions.len() - 1
    }

    pub fn add_class_body(&mut self, body: Arc<Vec<Stmt>>) -> usize {
        self.class_bodies.push(body);
        self.class_bodies.len() - 1
    }
}

/// Patch the jump target of a previously emitted control instruction
pub fn set_jump_target(code: &mut [Op], index: usize, target: usize) {
    match &mut code[index] {
        Op::Jump(addr) | Op::JumpIfFalse(addr) | Op::LoopStart(addr) | Op::TryStart(addr) => {
            *addr = target;
        }
        other => panic!("Attempted to patch non-jump instruction {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_dedup_for_scalars() {
        let mut program = Program::new();
        let a = program.add_constant(Value::Number(1.0));
        let b = program.add_constant(Value::Number(1.0));
        assert_eq!(a, b);

        let s1 = program.add_string_constant("x");
        let s2 = program.add_string_constant("x");
        assert_eq!(s1, s2);

        let arr1 = program.add_constant(Value::array(vec![]));
        let arr2 = program.add_constant(Value::array(vec![]));
        assert_ne!(arr1, arr2, "composite constants are not deduplicated");
    }

    #[test]
    fn test_num_constant_dedup_by_bits() {
        let mut program = Program::new();
        let a = program.add_num_constant(2.5);
        let b = program.add_num_constant(2.5);
        assert_eq!(a, b);
        let c = program.add_num_constant(-2.5);
        assert_ne!(a, c);
    }

    #[test]
    fn test_jump_patching() {
        let mut code = vec![Op::JumpIfFalse(0), Op::Pop, Op::Jump(0)];
        set_jump_target(&mut code, 0, 2);
        set_jump_target(&mut code, 2, 3);
        assert_eq!(code[0], Op::JumpIfFalse(2));
        assert_eq!(code[2], Op::Jump(3));
    }

    #[test]
    #[should_panic(expected = "non-jump")]
    fn test_patching_non_jump_panics() {
        let mut code = vec![Op::Pop];
        set_jump_target(&mut code, 0, 1);
    }
}
