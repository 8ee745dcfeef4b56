// File: src/interpreter/native_functions/io.rs
//
// Console I/O native functions. These are the only free functions that need
// the interpreter context, for output capture and prompts.

use crate::errors::{ErrorKind, MycoError, SourceLocation};
use crate::interpreter::{Interpreter, Value};
use std::io::{self, BufRead, Write};

/// Free functions: print and input
pub fn handle(
    interp: &mut Interpreter,
    name: &str,
    args: &[Value],
) -> Option<Result<Value, MycoError>> {
    let result = match name {
        "print" => {
            let parts: Vec<String> = args.iter().map(|v| v.to_display_string()).collect();
            interp.print_line(&parts.join(" "));
            Ok(Value::Null)
        }
        "input" => {
            if args.len() > 1 {
                return Some(Err(MycoError::wrong_argument_count("input", 1, args.len())));
            }
            if let Some(prompt) = args.first() {
                print!("{}", prompt.to_display_string());
                let _ = io::stdout().flush();
            }
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\n', '\r']);
                    Ok(Value::str(trimmed))
                }
                Err(e) => Err(MycoError::new(
                    ErrorKind::InternalError,
                    format!("Failed to read input: {}", e),
                    SourceLocation::unknown(),
                )),
            }
        }
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_joins_arguments_with_spaces() {
        let mut interp = Interpreter::new();
        interp.captured_output = Some(String::new());
        handle(&mut interp, "print", &[Value::Number(1.0), Value::str("two"), Value::Bool(true)])
            .unwrap()
            .unwrap();
        assert_eq!(interp.captured_output.as_deref(), Some("1 two True\n"));
    }

    #[test]
    fn test_print_empty_produces_blank_line() {
        let mut interp = Interpreter::new();
        interp.captured_output = Some(String::new());
        handle(&mut interp, "print", &[]).unwrap().unwrap();
        assert_eq!(interp.captured_output.as_deref(), Some("\n"));
    }
}
