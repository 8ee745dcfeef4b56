// File: src/parser.rs
//
// Recursive-descent parser for the Myco programming language.
// Consumes the token stream from the lexer and produces AST statements.

use crate::ast::{BinOp, Expr, ImportItem, MatchCase, Param, Pattern, Stmt, UnOp};
use crate::errors::{MycoError, SourceLocation};
use crate::lexer::{Token, TokenKind};

/// Type names recognized as type patterns in match arms
const TYPE_PATTERN_NAMES: &[&str] =
    &["Int", "Float", "Number", "String", "Bool", "Array", "Object", "Set", "Range", "Function", "Class", "Module"];

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = Result<T, MycoError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        self.tokens.get(self.pos).map(|t| &t.kind).unwrap_or(&TokenKind::Eof)
    }

    fn peek_ahead(&self, n: usize) -> &TokenKind {
        self.tokens.get(self.pos + n).map(|t| &t.kind).unwrap_or(&TokenKind::Eof)
    }

    fn location(&self) -> (u32, u32) {
        self.tokens.get(self.pos).map(|t| (t.line, t.column)).unwrap_or((0, 0))
    }

    fn advance(&mut self) -> TokenKind {
        let tok = self.tokens.get(self.pos).map(|t| t.kind.clone()).unwrap_or(TokenKind::Eof);
        self.pos += 1;
        tok
    }

    fn error(&self, message: impl Into<String>) -> MycoError {
        let (line, column) = self.location();
        MycoError::syntax_error(message.into(), SourceLocation::new(line as usize, column as usize))
    }

    fn expect_punct(&mut self, c: char) -> ParseResult<()> {
        match self.peek() {
            TokenKind::Punctuation(p) if *p == c => {
                self.advance();
                Ok(())
            }
            other => Err(self.error(format!("Expected '{}', found {:?}", c, other))),
        }
    }

    fn expect_operator(&mut self, op: &str) -> ParseResult<()> {
        match self.peek() {
            TokenKind::Operator(o) if o == op => {
                self.advance();
                Ok(())
            }
            other => Err(self.error(format!("Expected '{}', found {:?}", op, other))),
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> ParseResult<()> {
        match self.peek() {
            TokenKind::Keyword(k) if k == kw => {
                self.advance();
                Ok(())
            }
            other => Err(self.error(format!("Expected '{}', found {:?}", kw, other))),
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        match self.advance() {
            TokenKind::Identifier(name) => Ok(name),
            other => Err(self.error(format!("Expected identifier, found {:?}", other))),
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), TokenKind::Keyword(k) if k == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if matches!(self.peek(), TokenKind::Punctuation(p) if *p == c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_semicolons(&mut self) {
        while self.eat_punct(';') {}
    }

    /// Parse a whole program
    pub fn parse(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        self.skip_semicolons();
        while !matches!(self.peek(), TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
            self.skip_semicolons();
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        match self.peek().clone() {
            TokenKind::Keyword(k) => match k.as_str() {
                "export" => self.parse_exported(),
                "let" => self.parse_let(false),
                "fn" if matches!(self.peek_ahead(1), TokenKind::Identifier(_)) => {
                    self.parse_fn(false)
                }
                "class" => self.parse_class(),
                "if" => self.parse_if(),
                "while" => self.parse_while(),
                "for" => self.parse_for(),
                "match" | "spore" => self.parse_match(),
                "try" => self.parse_try(),
                "throw" => {
                    let (line, column) = self.location();
                    self.advance();
                    let value = self.parse_expr()?;
                    Ok(Stmt::Throw(value, line, column))
                }
                "return" => {
                    let (line, column) = self.location();
                    self.advance();
                    let value = if self.starts_expression() {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    Ok(Stmt::Return(value, line, column))
                }
                "break" => {
                    let (line, column) = self.location();
                    self.advance();
                    Ok(Stmt::Break(line, column))
                }
                "continue" => {
                    let (line, column) = self.location();
                    self.advance();
                    Ok(Stmt::Continue(line, column))
                }
                "use" => self.parse_use(),
                "print" => self.parse_print(),
                _ => self.parse_assign_or_expr(),
            },
            TokenKind::Punctuation('{') => {
                // Brace in statement position opens a block scope
                let body = self.parse_block()?;
                Ok(Stmt::Block(body))
            }
            _ => self.parse_assign_or_expr(),
        }
    }

    /// Can the current token begin an expression? Used for bare `return`.
    fn starts_expression(&self) -> bool {
        match self.peek() {
            TokenKind::Number(_) | TokenKind::String(_) | TokenKind::Identifier(_) => true,
            TokenKind::Keyword(k) => {
                matches!(k.as_str(), "true" | "false" | "null" | "self" | "fn" | "not")
            }
            TokenKind::Punctuation(p) => matches!(p, '(' | '[' | '{'),
            TokenKind::Operator(op) => matches!(op.as_str(), "-" | "!"),
            _ => false,
        }
    }

    fn parse_exported(&mut self) -> ParseResult<Stmt> {
        self.advance(); // export
        match self.peek() {
            TokenKind::Keyword(k) if k == "let" => self.parse_let(true),
            TokenKind::Keyword(k) if k == "fn" => self.parse_fn(true),
            _ => Err(self.error("Expected 'let' or 'fn' after 'export'")),
        }
    }

    fn parse_let(&mut self, exported: bool) -> ParseResult<Stmt> {
        let (line, column) = self.location();
        self.advance(); // let
        let name = self.expect_identifier()?;

        let type_annotation = if self.eat_punct(':') {
            Some(self.expect_identifier()?)
        } else {
            None
        };

        let value = if matches!(self.peek(), TokenKind::Operator(op) if op == "=") {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(Stmt::Let { name, type_annotation, value, exported, line, column })
    }

    fn parse_fn(&mut self, exported: bool) -> ParseResult<Stmt> {
        let (line, column) = self.location();
        self.advance(); // fn
        let name = self.expect_identifier()?;
        let params = self.parse_params()?;
        let return_type = if self.eat_punct(':') {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Stmt::FuncDef { name, params, return_type, body, exported, line, column })
    }

    fn parse_params(&mut self) -> ParseResult<Vec<Param>> {
        self.expect_punct('(')?;
        let mut params = Vec::new();
        while !matches!(self.peek(), TokenKind::Punctuation(')')) {
            let name = self.expect_identifier()?;
            let type_annotation = if self.eat_punct(':') {
                Some(self.expect_identifier()?)
            } else {
                None
            };
            params.push(Param { name, type_annotation });
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct(')')?;
        Ok(params)
    }

    fn parse_class(&mut self) -> ParseResult<Stmt> {
        let (line, column) = self.location();
        self.advance(); // class
        let name = self.expect_identifier()?;
        let parent = if self.eat_punct('(') {
            let p = self.expect_identifier()?;
            self.expect_punct(')')?;
            Some(p)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Stmt::ClassDef { name, parent, body, line, column })
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect_punct('{')?;
        let mut stmts = Vec::new();
        self.skip_semicolons();
        while !matches!(self.peek(), TokenKind::Punctuation('}') | TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
            self.skip_semicolons();
        }
        self.expect_punct('}')?;
        Ok(stmts)
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        self.advance(); // if
        let condition = self.parse_expr()?;
        let then_branch = self.parse_block()?;
        let mut else_ifs = Vec::new();
        let mut else_branch = None;

        while self.at_keyword("else") {
            self.advance();
            if self.at_keyword("if") {
                self.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                else_ifs.push((cond, body));
            } else {
                else_branch = Some(self.parse_block()?);
                break;
            }
        }

        Ok(Stmt::If { condition, then_branch, else_ifs, else_branch })
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        self.advance(); // while
        let condition = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::While { condition, body })
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        self.advance(); // for
        let var = self.expect_identifier()?;
        self.expect_keyword("in")?;
        let iterable = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::For { var, iterable, body })
    }

    /// match/spore: `match expr case pat => body ... else => body end`
    fn parse_match(&mut self) -> ParseResult<Stmt> {
        self.advance(); // match or spore
        let value = self.parse_expr()?;
        let mut cases = Vec::new();
        let mut default = None;

        loop {
            if self.eat_keyword("case") {
                let pattern = self.parse_pattern()?;
                self.expect_operator("=>")?;
                let body = self.parse_case_body()?;
                cases.push(MatchCase { pattern, body });
            } else if self.eat_keyword("else") {
                self.expect_operator("=>")?;
                default = Some(self.parse_case_body()?);
            } else if self.eat_keyword("end") {
                break;
            } else {
                return Err(self.error("Expected 'case', 'else', or 'end' in match"));
            }
        }

        Ok(Stmt::Match { value, cases, default })
    }

    /// A case body is either a brace block or statements up to the next
    /// case/else/end keyword.
    fn parse_case_body(&mut self) -> ParseResult<Vec<Stmt>> {
        if matches!(self.peek(), TokenKind::Punctuation('{')) {
            return self.parse_block();
        }
        let mut stmts = Vec::new();
        self.skip_semicolons();
        loop {
            match self.peek() {
                TokenKind::Keyword(k) if k == "case" || k == "else" || k == "end" => break,
                TokenKind::Eof => break,
                _ => {
                    stmts.push(self.parse_stmt()?);
                    self.skip_semicolons();
                }
            }
        }
        Ok(stmts)
    }

    fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        let (line, column) = self.location();
        match self.peek().clone() {
            TokenKind::Identifier(name) if name == "_" => {
                self.advance();
                Ok(Pattern::Wildcard)
            }
            TokenKind::Identifier(name) if TYPE_PATTERN_NAMES.contains(&name.as_str()) => {
                self.advance();
                Ok(Pattern::Type(name))
            }
            TokenKind::Keyword(k) if k == "null" => {
                self.advance();
                Ok(Pattern::Null)
            }
            TokenKind::Keyword(k) if k == "true" => {
                self.advance();
                Ok(Pattern::Literal(Expr::Bool(true, line, column)))
            }
            TokenKind::Keyword(k) if k == "false" => {
                self.advance();
                Ok(Pattern::Literal(Expr::Bool(false, line, column)))
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(Pattern::Literal(Expr::Number(n, line, column)))
            }
            TokenKind::Operator(op) if op == "-" => {
                self.advance();
                match self.advance() {
                    TokenKind::Number(n) => Ok(Pattern::Literal(Expr::Number(-n, line, column))),
                    other => Err(self.error(format!("Expected number after '-', found {:?}", other))),
                }
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Pattern::Literal(Expr::String(s, line, column)))
            }
            other => Err(self.error(format!("Unsupported pattern: {:?}", other))),
        }
    }

    fn parse_try(&mut self) -> ParseResult<Stmt> {
        self.advance(); // try
        let try_block = self.parse_block()?;
        self.expect_keyword("catch")?;
        let catch_var = self.expect_identifier()?;
        let catch_block = self.parse_block()?;
        let finally_block = if self.eat_keyword("finally") {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::TryCatch { try_block, catch_var, catch_block, finally_block })
    }

    fn parse_use(&mut self) -> ParseResult<Stmt> {
        let (line, column) = self.location();
        self.advance(); // use
        let library = match self.advance() {
            TokenKind::Identifier(name) => name,
            TokenKind::String(path) => path,
            other => return Err(self.error(format!("Expected library name, found {:?}", other))),
        };

        let alias = if self.eat_keyword("as") {
            Some(self.expect_identifier()?)
        } else {
            None
        };

        let items = if self.eat_keyword("show") {
            let mut items = Vec::new();
            loop {
                let name = self.expect_identifier()?;
                let item_alias = if self.eat_keyword("as") {
                    Some(self.expect_identifier()?)
                } else {
                    None
                };
                items.push(ImportItem { name, alias: item_alias });
                if !self.eat_punct(',') {
                    break;
                }
            }
            Some(items)
        } else {
            None
        };

        Ok(Stmt::Use { library, alias, items, line, column })
    }

    fn parse_print(&mut self) -> ParseResult<Stmt> {
        let (line, column) = self.location();
        self.advance(); // print
        let mut values = vec![self.parse_expr()?];
        while self.eat_punct(',') {
            values.push(self.parse_expr()?);
        }
        Ok(Stmt::Print(values, line, column))
    }

    fn parse_assign_or_expr(&mut self) -> ParseResult<Stmt> {
        let (line, column) = self.location();
        let expr = self.parse_expr()?;
        if matches!(self.peek(), TokenKind::Operator(op) if op == "=") {
            self.advance();
            let value = self.parse_expr()?;
            match expr {
                Expr::Identifier(..) | Expr::Index { .. } | Expr::MemberAccess { .. } => {
                    Ok(Stmt::Assign { target: expr, value, line, column })
                }
                _ => Err(self.error("Invalid assignment target")),
            }
        } else {
            Ok(Stmt::ExprStmt(expr))
        }
    }

    // === Expressions, lowest to highest precedence ===

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_xor()?;
        loop {
            let matched = match self.peek() {
                TokenKind::Operator(op) if op == "||" => true,
                TokenKind::Keyword(k) if k == "or" => true,
                _ => false,
            };
            if !matched {
                break;
            }
            let (line, column) = self.location();
            self.advance();
            let right = self.parse_xor()?;
            left = Expr::Binary {
                op: BinOp::LogicalOr,
                left: Box::new(left),
                right: Box::new(right),
                line,
                column,
            };
        }
        Ok(left)
    }

    fn parse_xor(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        loop {
            let matched = match self.peek() {
                TokenKind::Operator(op) if op == "^^" => true,
                TokenKind::Keyword(k) if k == "xor" => true,
                _ => false,
            };
            if !matched {
                break;
            }
            let (line, column) = self.location();
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinOp::LogicalXor,
                left: Box::new(left),
                right: Box::new(right),
                line,
                column,
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_equality()?;
        loop {
            let matched = match self.peek() {
                TokenKind::Operator(op) if op == "&&" => true,
                TokenKind::Keyword(k) if k == "and" => true,
                _ => false,
            };
            if !matched {
                break;
            }
            let (line, column) = self.location();
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op: BinOp::LogicalAnd,
                left: Box::new(left),
                right: Box::new(right),
                line,
                column,
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(op) if op == "==" => BinOp::Eq,
                TokenKind::Operator(op) if op == "!=" => BinOp::Ne,
                _ => break,
            };
            let (line, column) = self.location();
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), line, column };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_range()?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(op) if op == "<" => BinOp::Lt,
                TokenKind::Operator(op) if op == "<=" => BinOp::Le,
                TokenKind::Operator(op) if op == ">" => BinOp::Gt,
                TokenKind::Operator(op) if op == ">=" => BinOp::Ge,
                _ => break,
            };
            let (line, column) = self.location();
            self.advance();
            let right = self.parse_range()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), line, column };
        }
        Ok(left)
    }

    fn parse_range(&mut self) -> ParseResult<Expr> {
        let left = self.parse_bit_or()?;
        let op = match self.peek() {
            TokenKind::Operator(op) if op == ".." => BinOp::Range,
            TokenKind::Operator(op) if op == "..=" => BinOp::RangeInclusive,
            _ => return Ok(left),
        };
        let (line, column) = self.location();
        self.advance();
        let right = self.parse_bit_or()?;
        Ok(Expr::Binary { op, left: Box::new(left), right: Box::new(right), line, column })
    }

    fn parse_bit_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_bit_xor()?;
        while matches!(self.peek(), TokenKind::Operator(op) if op == "|") {
            let (line, column) = self.location();
            self.advance();
            let right = self.parse_bit_xor()?;
            left = Expr::Binary {
                op: BinOp::BitOr,
                left: Box::new(left),
                right: Box::new(right),
                line,
                column,
            };
        }
        Ok(left)
    }

    fn parse_bit_xor(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_bit_and()?;
        while matches!(self.peek(), TokenKind::Operator(op) if op == "^") {
            let (line, column) = self.location();
            self.advance();
            let right = self.parse_bit_and()?;
            left = Expr::Binary {
                op: BinOp::BitXor,
                left: Box::new(left),
                right: Box::new(right),
                line,
                column,
            };
        }
        Ok(left)
    }

    fn parse_bit_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_shift()?;
        while matches!(self.peek(), TokenKind::Operator(op) if op == "&") {
            let (line, column) = self.location();
            self.advance();
            let right = self.parse_shift()?;
            left = Expr::Binary {
                op: BinOp::BitAnd,
                left: Box::new(left),
                right: Box::new(right),
                line,
                column,
            };
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(op) if op == "<<" => BinOp::Shl,
                TokenKind::Operator(op) if op == ">>" => BinOp::Shr,
                _ => break,
            };
            let (line, column) = self.location();
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), line, column };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(op) if op == "+" => BinOp::Add,
                TokenKind::Operator(op) if op == "-" => BinOp::Sub,
                _ => break,
            };
            let (line, column) = self.location();
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), line, column };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(op) if op == "*" => BinOp::Mul,
                TokenKind::Operator(op) if op == "/" => BinOp::Div,
                TokenKind::Operator(op) if op == "%" => BinOp::Mod,
                _ => break,
            };
            let (line, column) = self.location();
            self.advance();
            let right = self.parse_power()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), line, column };
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_unary()?;
        if matches!(self.peek(), TokenKind::Operator(op) if op == "**") {
            let (line, column) = self.location();
            self.advance();
            // Right-associative
            let exponent = self.parse_power()?;
            return Ok(Expr::Binary {
                op: BinOp::Power,
                left: Box::new(base),
                right: Box::new(exponent),
                line,
                column,
            });
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let (line, column) = self.location();
        match self.peek() {
            TokenKind::Operator(op) if op == "-" => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary { op: UnOp::Negate, operand: Box::new(operand), line, column })
            }
            TokenKind::Operator(op) if op == "!" => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary { op: UnOp::Not, operand: Box::new(operand), line, column })
            }
            TokenKind::Keyword(k) if k == "not" => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary { op: UnOp::Not, operand: Box::new(operand), line, column })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let (line, column) = self.location();
            match self.peek() {
                TokenKind::Punctuation('(') => {
                    let args = self.parse_args()?;
                    expr = match expr {
                        Expr::Identifier(name, l, c) => {
                            Expr::Call { name, args, line: l, column: c }
                        }
                        Expr::MemberAccess { object, member, line: l, column: c } => {
                            Expr::MethodCall { object, method: member, args, line: l, column: c }
                        }
                        other => Expr::CallExpr { callee: Box::new(other), args, line, column },
                    };
                }
                TokenKind::Punctuation('[') => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect_punct(']')?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        line,
                        column,
                    };
                }
                TokenKind::Punctuation('.') => {
                    self.advance();
                    let member = self.expect_identifier()?;
                    expr = Expr::MemberAccess { object: Box::new(expr), member, line, column };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect_punct('(')?;
        let mut args = Vec::new();
        while !matches!(self.peek(), TokenKind::Punctuation(')')) {
            args.push(self.parse_expr()?);
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct(')')?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let (line, column) = self.location();
        match self.advance() {
            TokenKind::Number(n) => Ok(Expr::Number(n, line, column)),
            TokenKind::String(s) => Ok(Expr::String(s, line, column)),
            TokenKind::Identifier(name) => Ok(Expr::Identifier(name, line, column)),
            TokenKind::Keyword(k) => match k.as_str() {
                "true" => Ok(Expr::Bool(true, line, column)),
                "false" => Ok(Expr::Bool(false, line, column)),
                "null" => Ok(Expr::Null(line, column)),
                "self" => Ok(Expr::SelfExpr(line, column)),
                "fn" => self.parse_lambda(line, column),
                other => Err(self.error(format!("Unexpected keyword '{}'", other))),
            },
            TokenKind::Punctuation('(') => {
                let expr = self.parse_expr()?;
                self.expect_punct(')')?;
                Ok(expr)
            }
            TokenKind::Punctuation('[') => {
                let mut elements = Vec::new();
                while !matches!(self.peek(), TokenKind::Punctuation(']')) {
                    elements.push(self.parse_expr()?);
                    if !self.eat_punct(',') {
                        break;
                    }
                }
                self.expect_punct(']')?;
                Ok(Expr::ArrayLiteral(elements, line, column))
            }
            TokenKind::Punctuation('{') => self.parse_map_or_set(line, column),
            other => Err(self.error(format!("Unexpected token {:?}", other))),
        }
    }

    /// `fn (params) => expr` or `fn (params) { body }`
    fn parse_lambda(&mut self, line: u32, column: u32) -> ParseResult<Expr> {
        let params = self.parse_params()?;
        let return_type = if self.eat_punct(':') {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let body = if matches!(self.peek(), TokenKind::Operator(op) if op == "=>") {
            self.advance();
            let (rl, rc) = self.location();
            let expr = self.parse_expr()?;
            vec![Stmt::Return(Some(expr), rl, rc)]
        } else {
            self.parse_block()?
        };
        Ok(Expr::Lambda { params, return_type, body, line, column })
    }

    /// Braces in expression position: `{}` is an empty map, `{k: v}` a map
    /// literal, `{a, b}` a set literal.
    fn parse_map_or_set(&mut self, line: u32, column: u32) -> ParseResult<Expr> {
        if self.eat_punct('}') {
            return Ok(Expr::MapLiteral { keys: Vec::new(), values: Vec::new(), line, column });
        }

        let first = self.parse_expr()?;
        if self.eat_punct(':') {
            let mut keys = vec![first];
            let mut values = vec![self.parse_expr()?];
            while self.eat_punct(',') {
                keys.push(self.parse_expr()?);
                self.expect_punct(':')?;
                values.push(self.parse_expr()?);
            }
            self.expect_punct('}')?;
            Ok(Expr::MapLiteral { keys, values, line, column })
        } else {
            let mut elements = vec![first];
            while self.eat_punct(',') {
                elements.push(self.parse_expr()?);
            }
            self.expect_punct('}')?;
            Ok(Expr::SetLiteral(elements, line, column))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_source(source: &str) -> Vec<Stmt> {
        let tokens = tokenize(source);
        Parser::new(tokens).parse().expect("parse failed")
    }

    #[test]
    fn test_let_and_assignment() {
        let stmts = parse_source("let x = 1; x = x + 1");
        assert!(matches!(&stmts[0], Stmt::Let { name, .. } if name == "x"));
        assert!(matches!(&stmts[1], Stmt::Assign { .. }));
    }

    #[test]
    fn test_function_definition_with_annotations() {
        let stmts = parse_source("fn add(a: Int, b: Int): Int { return a + b }");
        match &stmts[0] {
            Stmt::FuncDef { name, params, return_type, .. } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert_eq!(params[0].type_annotation.as_deref(), Some("Int"));
                assert_eq!(return_type.as_deref(), Some("Int"));
            }
            other => panic!("Expected FuncDef, got {:?}", other),
        }
    }

    #[test]
    fn test_else_if_chain() {
        let stmts = parse_source("if a { } else if b { } else if c { } else { }");
        match &stmts[0] {
            Stmt::If { else_ifs, else_branch, .. } => {
                assert_eq!(else_ifs.len(), 2);
                assert!(else_branch.is_some());
            }
            other => panic!("Expected If, got {:?}", other),
        }
    }

    #[test]
    fn test_match_with_cases_and_else() {
        let stmts =
            parse_source(r#"match 2 case 1 => print "one" case 2 => print "two" else => print "other" end"#);
        match &stmts[0] {
            Stmt::Match { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert!(default.is_some());
            }
            other => panic!("Expected Match, got {:?}", other),
        }
    }

    #[test]
    fn test_spore_is_match_alias() {
        let stmts = parse_source(r#"spore 1 case 1 => print "x" end"#);
        assert!(matches!(&stmts[0], Stmt::Match { .. }));
    }

    #[test]
    fn test_wildcard_and_type_patterns() {
        let stmts = parse_source("match x case String => 1 case _ => 2 end");
        match &stmts[0] {
            Stmt::Match { cases, .. } => {
                assert!(matches!(&cases[0].pattern, Pattern::Type(t) if t == "String"));
                assert!(matches!(&cases[1].pattern, Pattern::Wildcard));
            }
            other => panic!("Expected Match, got {:?}", other),
        }
    }

    #[test]
    fn test_class_with_parent() {
        let stmts = parse_source("class B(A) { let y = 2 }");
        match &stmts[0] {
            Stmt::ClassDef { name, parent, body, .. } => {
                assert_eq!(name, "B");
                assert_eq!(parent.as_deref(), Some("A"));
                assert_eq!(body.len(), 1);
            }
            other => panic!("Expected ClassDef, got {:?}", other),
        }
    }

    #[test]
    fn test_use_with_show_aliases() {
        let stmts = parse_source("use math as m show sqrt, pow as power");
        match &stmts[0] {
            Stmt::Use { library, alias, items, .. } => {
                assert_eq!(library, "math");
                assert_eq!(alias.as_deref(), Some("m"));
                let items = items.as_ref().unwrap();
                assert_eq!(items[0].name, "sqrt");
                assert_eq!(items[1].alias.as_deref(), Some("power"));
            }
            other => panic!("Expected Use, got {:?}", other),
        }
    }

    #[test]
    fn test_range_expressions() {
        let stmts = parse_source("let r = 0..5; let s = 1..=3");
        match &stmts[0] {
            Stmt::Let { value: Some(Expr::Binary { op, .. }), .. } => {
                assert_eq!(*op, BinOp::Range)
            }
            other => panic!("Expected range let, got {:?}", other),
        }
        match &stmts[1] {
            Stmt::Let { value: Some(Expr::Binary { op, .. }), .. } => {
                assert_eq!(*op, BinOp::RangeInclusive)
            }
            other => panic!("Expected inclusive range let, got {:?}", other),
        }
    }

    #[test]
    fn test_method_call_parses_from_member_access() {
        let stmts = parse_source("a.push(4)");
        match &stmts[0] {
            Stmt::ExprStmt(Expr::MethodCall { method, args, .. }) => {
                assert_eq!(method, "push");
                assert_eq!(args.len(), 1);
            }
            other => panic!("Expected MethodCall, got {:?}", other),
        }
    }

    #[test]
    fn test_map_and_set_literals() {
        let stmts = parse_source(r#"let m = {"a": 1, "b": 2}; let s = {1, 2, 3}; let e = {}"#);
        assert!(matches!(&stmts[0], Stmt::Let { value: Some(Expr::MapLiteral { keys, .. }), .. } if keys.len() == 2));
        assert!(matches!(&stmts[1], Stmt::Let { value: Some(Expr::SetLiteral(els, ..)), .. } if els.len() == 3));
        assert!(matches!(&stmts[2], Stmt::Let { value: Some(Expr::MapLiteral { keys, .. }), .. } if keys.is_empty()));
    }

    #[test]
    fn test_lambda_forms() {
        let stmts = parse_source("let f = fn (x) => x * 2; let g = fn (a, b) { return a + b }");
        assert!(matches!(&stmts[0], Stmt::Let { value: Some(Expr::Lambda { params, .. }), .. } if params.len() == 1));
        assert!(matches!(&stmts[1], Stmt::Let { value: Some(Expr::Lambda { params, .. }), .. } if params.len() == 2));
    }

    #[test]
    fn test_try_catch_finally() {
        let stmts = parse_source("try { throw \"x\" } catch e { print e } finally { print 1 }");
        match &stmts[0] {
            Stmt::TryCatch { catch_var, finally_block, .. } => {
                assert_eq!(catch_var, "e");
                assert!(finally_block.is_some());
            }
            other => panic!("Expected TryCatch, got {:?}", other),
        }
    }

    #[test]
    fn test_operator_precedence() {
        let stmts = parse_source("let x = 1 + 2 * 3");
        match &stmts[0] {
            Stmt::Let { value: Some(Expr::Binary { op: BinOp::Add, right, .. }), .. } => {
                assert!(matches!(**right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("Expected Add at top, got {:?}", other),
        }
    }

    #[test]
    fn test_syntax_error_reported() {
        let tokens = tokenize("let = 5");
        let err = Parser::new(tokens).parse().unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::SyntaxError);
    }
}
