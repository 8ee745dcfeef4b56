// File: src/ast.rs
//
// AST node types for the Myco programming language.
// The parser produces this tree; the bytecode compiler consumes it.

/// Binary operator tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Power,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Range,
    RangeInclusive,
}

/// Unary operator tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Negate,
    Not,
}

/// Function parameter: name plus optional type annotation
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_annotation: Option<String>,
}

/// Patterns for match/spore case arms.
/// Only Literal, Wildcard, Null, and Type are executable; the rest are
/// reserved node kinds the compiler rejects with a syntax error.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Literal(Expr),
    Wildcard,
    Null,
    Type(String),
    Not(Box<Pattern>),
    Destructure(Vec<String>),
    Guard(Box<Pattern>, Box<Expr>),
    Or(Box<Pattern>, Box<Pattern>),
    And(Box<Pattern>, Box<Pattern>),
    Range(Box<Expr>, Box<Expr>),
    Regex(String),
}

/// One case arm of a match/spore statement
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub body: Vec<Stmt>,
}

/// Imported item with optional alias (`show a, b as c`)
#[derive(Debug, Clone, PartialEq)]
pub struct ImportItem {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64, u32, u32),
    String(String, u32, u32),
    Bool(bool, u32, u32),
    Null(u32, u32),
    Identifier(String, u32, u32),
    SelfExpr(u32, u32),
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr>, line: u32, column: u32 },
    Unary { op: UnOp, operand: Box<Expr>, line: u32, column: u32 },
    /// Direct call by name: callee is an identifier at the call site
    Call { name: String, args: Vec<Expr>, line: u32, column: u32 },
    /// Call through an arbitrary callee expression
    CallExpr { callee: Box<Expr>, args: Vec<Expr>, line: u32, column: u32 },
    MemberAccess { object: Box<Expr>, member: String, line: u32, column: u32 },
    MethodCall { object: Box<Expr>, method: String, args: Vec<Expr>, line: u32, column: u32 },
    Index { object: Box<Expr>, index: Box<Expr>, line: u32, column: u32 },
    ArrayLiteral(Vec<Expr>, u32, u32),
    /// Parallel key and value lists, insertion order preserved
    MapLiteral { keys: Vec<Expr>, values: Vec<Expr>, line: u32, column: u32 },
    SetLiteral(Vec<Expr>, u32, u32),
    Lambda { params: Vec<Param>, return_type: Option<String>, body: Vec<Stmt>, line: u32, column: u32 },
}

impl Expr {
    pub fn location(&self) -> (u32, u32) {
        match self {
            Expr::Number(_, l, c)
            | Expr::String(_, l, c)
            | Expr::Bool(_, l, c)
            | Expr::Null(l, c)
            | Expr::Identifier(_, l, c)
            | Expr::SelfExpr(l, c)
            | Expr::ArrayLiteral(_, l, c)
            | Expr::SetLiteral(_, l, c) => (*l, *c),
            Expr::Binary { line, column, .. }
            | Expr::Unary { line, column, .. }
            | Expr::Call { line, column, .. }
            | Expr::CallExpr { line, column, .. }
            | Expr::MemberAccess { line, column, .. }
            | Expr::MethodCall { line, column, .. }
            | Expr::Index { line, column, .. }
            | Expr::MapLiteral { line, column, .. }
            | Expr::Lambda { line, column, .. } => (*line, *column),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Variable declaration; `export` marks the binding as a module export
    Let {
        name: String,
        type_annotation: Option<String>,
        value: Option<Expr>,
        exported: bool,
        line: u32,
        column: u32,
    },
    /// Assignment to an identifier, index, or member target
    Assign { target: Expr, value: Expr, line: u32, column: u32 },
    FuncDef {
        name: String,
        params: Vec<Param>,
        return_type: Option<String>,
        body: Vec<Stmt>,
        exported: bool,
        line: u32,
        column: u32,
    },
    ClassDef {
        name: String,
        parent: Option<String>,
        body: Vec<Stmt>,
        line: u32,
        column: u32,
    },
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_ifs: Vec<(Expr, Vec<Stmt>)>,
        else_branch: Option<Vec<Stmt>>,
    },
    While { condition: Expr, body: Vec<Stmt> },
    For { var: String, iterable: Expr, body: Vec<Stmt> },
    Match { value: Expr, cases: Vec<MatchCase>, default: Option<Vec<Stmt>> },
    TryCatch {
        try_block: Vec<Stmt>,
        catch_var: String,
        catch_block: Vec<Stmt>,
        finally_block: Option<Vec<Stmt>>,
    },
    Throw(Expr, u32, u32),
    Return(Option<Expr>, u32, u32),
    Break(u32, u32),
    Continue(u32, u32),
    Block(Vec<Stmt>),
    /// `use name [as alias] [show a, b as c]`
    Use {
        library: String,
        alias: Option<String>,
        items: Option<Vec<ImportItem>>,
        line: u32,
        column: u32,
    },
    /// `print e1, e2, ...`: prints all values on one line
    Print(Vec<Expr>, u32, u32),
    ExprStmt(Expr),
}
