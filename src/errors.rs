// File: src/errors.rs
//
// Error handling and reporting for the Myco programming language.
// Provides structured error types with source location information,
// pretty-printed messages, and call-stack rendering for the VM.

use colored::Colorize;
use std::fmt;

/// Source location information for tracking where code appears in a file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub file: Option<String>,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column, file: None }
    }

    pub fn with_file(line: usize, column: usize, file: String) -> Self {
        Self { line, column, file: Some(file) }
    }

    pub fn unknown() -> Self {
        Self { line: 0, column: 0, file: None }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:{}:{}", file, self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Kinds of errors the Myco core recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DivisionByZero,
    UndefinedVariable,
    UndefinedFunction,
    ArrayIndexOutOfBounds,
    InvalidIndexType,
    InvalidIndexTarget,
    InvalidMemberAccess,
    InvalidFunctionCall,
    WrongArgumentCount,
    WrongArgumentType,
    TypeMismatch,
    InvalidCast,
    OutOfMemory,
    NullPointer,
    StackOverflow,
    ModuleNotFound,
    Timeout,
    SyntaxError,
    InternalError,
}

impl ErrorKind {
    /// Numeric code exposed to user code via thrown error values
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::DivisionByZero => 1,
            ErrorKind::UndefinedVariable => 2,
            ErrorKind::UndefinedFunction => 3,
            ErrorKind::ArrayIndexOutOfBounds => 4,
            ErrorKind::InvalidIndexType => 5,
            ErrorKind::InvalidIndexTarget => 6,
            ErrorKind::InvalidMemberAccess => 7,
            ErrorKind::InvalidFunctionCall => 8,
            ErrorKind::WrongArgumentCount => 9,
            ErrorKind::WrongArgumentType => 10,
            ErrorKind::TypeMismatch => 11,
            ErrorKind::InvalidCast => 12,
            ErrorKind::OutOfMemory => 13,
            ErrorKind::NullPointer => 14,
            ErrorKind::StackOverflow => 15,
            ErrorKind::ModuleNotFound => 16,
            ErrorKind::Timeout => 17,
            ErrorKind::SyntaxError => 18,
            ErrorKind::InternalError => 19,
        }
    }

    /// Unrecoverable conditions abort execution instead of report-and-continue
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::StackOverflow | ErrorKind::OutOfMemory)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ErrorKind::DivisionByZero => "Division By Zero",
            ErrorKind::UndefinedVariable => "Undefined Variable",
            ErrorKind::UndefinedFunction => "Undefined Function",
            ErrorKind::ArrayIndexOutOfBounds => "Array Index Out Of Bounds",
            ErrorKind::InvalidIndexType => "Invalid Index Type",
            ErrorKind::InvalidIndexTarget => "Invalid Index Target",
            ErrorKind::InvalidMemberAccess => "Invalid Member Access",
            ErrorKind::InvalidFunctionCall => "Invalid Function Call",
            ErrorKind::WrongArgumentCount => "Wrong Argument Count",
            ErrorKind::WrongArgumentType => "Wrong Argument Type",
            ErrorKind::TypeMismatch => "Type Mismatch",
            ErrorKind::InvalidCast => "Invalid Cast",
            ErrorKind::OutOfMemory => "Out Of Memory",
            ErrorKind::NullPointer => "Null Pointer",
            ErrorKind::StackOverflow => "Stack Overflow",
            ErrorKind::ModuleNotFound => "Module Not Found",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::SyntaxError => "Syntax Error",
            ErrorKind::InternalError => "Internal Error",
        };
        write!(f, "{}", name)
    }
}

/// A structured error with location information
#[derive(Debug, Clone)]
pub struct MycoError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: SourceLocation,
    pub source_line: Option<String>,
    pub suggestion: Option<String>,
    pub help: Option<String>,
    pub call_stack: Vec<String>,
}

impl MycoError {
    pub fn new(kind: ErrorKind, message: String, location: SourceLocation) -> Self {
        Self {
            kind,
            message,
            location,
            source_line: None,
            suggestion: None,
            help: None,
            call_stack: Vec::new(),
        }
    }

    pub fn with_source(mut self, source_line: String) -> Self {
        self.source_line = Some(source_line);
        self
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn with_call_stack(mut self, call_stack: Vec<String>) -> Self {
        self.call_stack = call_stack;
        self
    }

    pub fn syntax_error(message: String, location: SourceLocation) -> Self {
        Self::new(ErrorKind::SyntaxError, message, location)
    }

    pub fn division_by_zero(location: SourceLocation) -> Self {
        Self::new(ErrorKind::DivisionByZero, "Division by zero".to_string(), location)
            .with_help("Check the divisor before dividing".to_string())
    }

    pub fn undefined_variable(name: &str, location: SourceLocation) -> Self {
        Self::new(
            ErrorKind::UndefinedVariable,
            format!("Variable '{}' is not defined", name),
            location,
        )
    }

    pub fn undefined_function(name: &str, location: SourceLocation) -> Self {
        Self::new(
            ErrorKind::UndefinedFunction,
            format!("Function '{}' is not defined", name),
            location,
        )
    }

    pub fn type_mismatch(message: String, location: SourceLocation) -> Self {
        Self::new(ErrorKind::TypeMismatch, message, location)
    }

    pub fn wrong_argument_count(name: &str, expected: usize, got: usize) -> Self {
        Self::new(
            ErrorKind::WrongArgumentCount,
            format!("{}() expects {} argument(s), got {}", name, expected, got),
            SourceLocation::unknown(),
        )
    }

    pub fn index_out_of_bounds(index: i64, len: usize, location: SourceLocation) -> Self {
        Self::new(
            ErrorKind::ArrayIndexOutOfBounds,
            format!("Index {} out of bounds for length {}", index, len),
            location,
        )
    }

    pub fn module_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::ModuleNotFound,
            format!("Module not found: {}", name),
            SourceLocation::unknown(),
        )
    }

    pub fn internal(message: String) -> Self {
        Self::new(ErrorKind::InternalError, message, SourceLocation::unknown())
    }
}

impl fmt::Display for MycoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind_str = format!("{}", self.kind);
        writeln!(f, "{}: {}", kind_str.red().bold(), self.message.bold())?;

        let location_str = format!("  --> {}", self.location);
        writeln!(f, "{}", location_str.bright_blue())?;

        if let Some(ref source) = self.source_line {
            let line_num = self.location.line;
            let col_num = self.location.column;

            writeln!(f, "   {}", "|".bright_blue())?;
            writeln!(
                f,
                "{} {} {}",
                format!("{:3}", line_num).bright_blue(),
                "|".bright_blue(),
                source
            )?;
            writeln!(
                f,
                "   {} {}{}",
                "|".bright_blue(),
                " ".repeat(col_num.saturating_sub(1)),
                "^".red().bold()
            )?;
        }

        if let Some(ref help) = self.help {
            writeln!(f, "   {} {}", "=".bright_yellow(), format!("help: {}", help).bright_yellow())?;
        }

        if let Some(ref suggestion) = self.suggestion {
            writeln!(
                f,
                "   {} {}",
                "=".bright_green(),
                format!("Did you mean '{}'?", suggestion).bright_green()
            )?;
        }

        if !self.call_stack.is_empty() {
            writeln!(f, "   {}", "call stack (most recent first):".bright_cyan())?;
            for frame in self.call_stack.iter().rev() {
                writeln!(f, "     {} {}", "at".bright_cyan(), frame)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for MycoError {}

/// Computes the Levenshtein distance between two strings.
/// Used for "Did you mean?" suggestions.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];

    for (i, row) in matrix.iter_mut().enumerate().take(len1 + 1) {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };
            matrix[i][j] = std::cmp::min(
                std::cmp::min(matrix[i - 1][j] + 1, matrix[i][j - 1] + 1),
                matrix[i - 1][j - 1] + cost,
            );
        }
    }

    matrix[len1][len2]
}

/// Find the closest match from a list of candidates using Levenshtein distance.
/// Returns None if no good match is found (distance > 3).
pub fn find_closest_match<'a>(target: &str, candidates: &'a [String]) -> Option<&'a str> {
    let mut best_match = None;
    let mut best_distance = usize::MAX;

    for candidate in candidates {
        let distance = levenshtein_distance(target, candidate);
        if distance <= 3 && distance < best_distance {
            best_distance = distance;
            best_match = Some(candidate.as_str());
        }
    }

    best_match
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("lenght", "length"), 2);
    }

    #[test]
    fn test_closest_match_cutoff() {
        let candidates =
            vec!["print".to_string(), "length".to_string(), "completely_different".to_string()];
        assert_eq!(find_closest_match("prnt", &candidates), Some("print"));
        assert_eq!(find_closest_match("zzzzzzzz", &candidates), None);
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(ErrorKind::StackOverflow.is_fatal());
        assert!(ErrorKind::OutOfMemory.is_fatal());
        assert!(!ErrorKind::DivisionByZero.is_fatal());
    }
}
