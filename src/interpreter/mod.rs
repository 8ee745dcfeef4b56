// File: src/interpreter/mod.rs
//
// Interpreter context for the Myco VM.
//
// The context owns the global environment, the error slot, the call-frame
// list used for stack traces, the self-context slot set during method
// dispatch, and the module cache. The VM borrows the context while it runs;
// host callables receive it through the native-function ABI. Keeping all of
// this in one struct (instead of file-scope statics) lets multiple
// interpreters coexist and tests run in parallel.

mod async_runtime;
mod environment;
pub mod native_functions;
pub mod value;

pub use async_runtime::AsyncRuntime;
pub use environment::{
    env_assign, env_copy, env_define, env_exists, env_get, env_visible_names, EnvRef, Environment,
};
pub use value::{
    format_number, ClassValue, FunctionValue, ModuleValue, ObjectMap, Value, CLASS_NAME_KEY,
};

use crate::errors::{ErrorKind, MycoError, SourceLocation};
use crate::module::ModuleCache;

/// Maximum user-function call depth before a StackOverflow error
pub const MAX_CALL_DEPTH: usize = 1000;

/// One entry of the diagnostic call-frame list
#[derive(Debug, Clone)]
pub struct CallFrameInfo {
    pub function_name: String,
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl CallFrameInfo {
    pub fn describe(&self) -> String {
        match &self.file {
            Some(file) => format!("{} ({}:{}:{})", self.function_name, file, self.line, self.column),
            None => format!("{} ({}:{})", self.function_name, self.line, self.column),
        }
    }
}

/// Interpreter context shared by the VM and host callables
pub struct Interpreter {
    /// Global environment; root of every scope chain
    pub globals: EnvRef,
    /// Error slot: set by failing operations, cleared by catch or reporting
    pub error: Option<MycoError>,
    /// Fatal errors abort execution instead of report-and-continue
    pub fatal: bool,
    /// Call frames for diagnostics, leaf last
    pub call_frames: Vec<CallFrameInfo>,
    /// Receiver of the method currently executing, if any
    pub self_context: Option<Value>,
    /// Compiled-module cache keyed by canonical path + source hash
    pub modules: ModuleCache,
    /// Source file name and lines, for error display
    pub source_name: Option<String>,
    pub source_lines: Vec<String>,
    /// When set, print output is captured here instead of stdout
    pub captured_output: Option<String>,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Environment::new(None);
        let interp = Interpreter {
            globals,
            error: None,
            fatal: false,
            call_frames: Vec::new(),
            self_context: None,
            modules: ModuleCache::new(),
            source_name: None,
            source_lines: Vec::new(),
            captured_output: None,
        };
        interp.register_builtins();
        interp
    }

    /// Install every host callable into the global environment
    fn register_builtins(&self) {
        for name in Self::builtin_names() {
            env_define(&self.globals, name, Value::NativeFunction(name.to_string()));
        }
    }

    /// The complete list of registered host callables
    pub fn builtin_names() -> &'static [&'static str] {
        &[
            "print", "input", "len", "type", "assert", "str", "int", "float", "bool", "range",
            "random", "random_int", "spawn", "await_promise", "async_sleep", "clone", "keys",
            "values",
        ]
    }

    /// Remember the source text for error display
    pub fn set_source(&mut self, name: String, source: &str) {
        self.source_name = Some(name);
        self.source_lines = source.lines().map(|l| l.to_string()).collect();
    }

    /// Record an error in the error slot, enriching it with source context
    pub fn set_error(&mut self, mut error: MycoError) {
        if error.location.file.is_none() {
            error.location.file = self.source_name.clone();
        }
        if error.source_line.is_none() && error.location.line > 0 {
            if let Some(line) = self.source_lines.get(error.location.line - 1) {
                error.source_line = Some(line.clone());
            }
        }
        error.call_stack = self.call_frames.iter().map(|f| f.describe()).collect();
        if error.kind.is_fatal() {
            self.fatal = true;
        }
        self.error = Some(error);
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Take the pending error as a throwable error value
    pub fn take_error_value(&mut self) -> Value {
        match self.error.take() {
            Some(err) => Value::error(err.message, err.kind.code()),
            None => Value::Null,
        }
    }

    pub fn push_call_frame(&mut self, name: &str, line: u32, column: u32) -> Result<(), MycoError> {
        if self.call_frames.len() >= MAX_CALL_DEPTH {
            return Err(MycoError::new(
                ErrorKind::StackOverflow,
                format!("Maximum call depth of {} exceeded", MAX_CALL_DEPTH),
                SourceLocation::new(line as usize, column as usize),
            ));
        }
        self.call_frames.push(CallFrameInfo {
            function_name: name.to_string(),
            file: self.source_name.clone(),
            line,
            column,
        });
        Ok(())
    }

    pub fn pop_call_frame(&mut self) {
        self.call_frames.pop();
    }

    /// Write a line of program output
    pub fn print_line(&mut self, text: &str) {
        match &mut self.captured_output {
            Some(buf) => {
                buf.push_str(text);
                buf.push('\n');
            }
            None => println!("{}", text),
        }
    }

    /// Names visible from the globals, for "Did you mean" suggestions
    pub fn visible_names(&self) -> Vec<String> {
        env_visible_names(&self.globals)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered_in_globals() {
        let interp = Interpreter::new();
        for name in Interpreter::builtin_names() {
            match env_get(&interp.globals, name) {
                Some(Value::NativeFunction(n)) => assert_eq!(&n, name),
                other => panic!("Expected native function for {}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_builtin_names_unique() {
        let names = Interpreter::builtin_names();
        let mut seen = std::collections::HashSet::new();
        for name in names {
            assert!(seen.insert(name), "duplicate builtin {}", name);
        }
    }

    #[test]
    fn test_error_slot_and_fatal_flag() {
        let mut interp = Interpreter::new();
        interp.set_error(MycoError::division_by_zero(SourceLocation::new(1, 1)));
        assert!(interp.has_error());
        assert!(!interp.fatal);
        interp.clear_error();
        assert!(!interp.has_error());

        interp.set_error(MycoError::new(
            ErrorKind::StackOverflow,
            "too deep".to_string(),
            SourceLocation::unknown(),
        ));
        assert!(interp.fatal);
    }

    #[test]
    fn test_call_depth_limit() {
        let mut interp = Interpreter::new();
        for _ in 0..MAX_CALL_DEPTH {
            interp.push_call_frame("f", 1, 1).unwrap();
        }
        let err = interp.push_call_frame("f", 1, 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StackOverflow);
    }

    #[test]
    fn test_captured_output() {
        let mut interp = Interpreter::new();
        interp.captured_output = Some(String::new());
        interp.print_line("hello");
        interp.print_line("world");
        assert_eq!(interp.captured_output.as_deref(), Some("hello\nworld\n"));
    }
}
