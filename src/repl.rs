// File: src/repl.rs
//
// Interactive REPL (Read-Eval-Print Loop) for the Myco programming language.
// Each entered line runs through the parse -> compile -> execute pipeline
// against a persistent global environment. Multi-line input continues while
// braces are unclosed; special commands start with ':'.

use crate::compiler::Compiler;
use crate::interpreter::{env_get, Interpreter, Value};
use crate::lexer::tokenize;
use crate::parser::Parser;
use crate::vm::Vm;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// REPL session holding the interpreter state and the line editor
pub struct Repl {
    interpreter: Interpreter,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        Ok(Repl { interpreter: Interpreter::new(), editor })
    }

    fn show_banner(&self) {
        println!("{}", "Myco interactive shell".bright_cyan().bold());
        println!(
            "  {} {}{}{}",
            "Type".bright_blue(),
            ":".bright_blue(),
            "help".bright_yellow(),
            " for commands, :quit to exit".bright_blue()
        );
        println!();
    }

    /// Start the interactive loop
    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();

        let mut buffer = String::new();

        loop {
            let prompt = if buffer.is_empty() {
                "myco> ".bright_green().to_string()
            } else {
                "....> ".bright_blue().to_string()
            };

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());

                    if buffer.is_empty() && line.trim_start().starts_with(':') {
                        if self.handle_command(line.trim()) {
                            continue;
                        } else {
                            break;
                        }
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');

                    if input_complete(&buffer) {
                        let input = std::mem::take(&mut buffer);
                        self.eval_input(&input);
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C (:quit to exit)".bright_yellow());
                    buffer.clear();
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "Goodbye!".bright_cyan());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "Error:".bright_red(), err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a ':' command; returns false when the REPL should exit
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":help" | ":h" => {
                println!("  :help   show this help");
                println!("  :vars   list global bindings");
                println!("  :reset  clear the environment");
                println!("  :clear  clear the screen");
                println!("  :quit   exit the shell");
                true
            }
            ":quit" | ":q" | ":exit" => {
                println!("{}", "Goodbye!".bright_cyan());
                false
            }
            ":clear" | ":c" => {
                print!("\x1B[2J\x1B[1;1H");
                self.show_banner();
                true
            }
            ":vars" | ":v" => {
                self.show_variables();
                true
            }
            ":reset" | ":r" => {
                self.interpreter = Interpreter::new();
                println!("{}", "Environment reset".bright_green());
                true
            }
            _ => {
                println!(
                    "{} Unknown command: {}. Type {} for available commands.",
                    "Error:".bright_red(),
                    cmd.bright_yellow(),
                    ":help".bright_yellow()
                );
                true
            }
        }
    }

    fn show_variables(&self) {
        let mut names = self.interpreter.globals.lock().unwrap().local_names();
        names.sort();
        for name in names {
            if let Some(value) = env_get(&self.interpreter.globals, &name) {
                // Skip the registered builtins; the user wants their own state
                if matches!(value, Value::NativeFunction(_)) {
                    continue;
                }
                println!("  {} = {}", name.bright_yellow(), value.to_display_string());
            }
        }
    }

    /// Run one complete input through the pipeline
    fn eval_input(&mut self, source: &str) {
        let tokens = tokenize(source);
        let stmts = match Parser::new(tokens).parse() {
            Ok(stmts) => stmts,
            Err(err) => {
                eprintln!("{}", err);
                return;
            }
        };
        if stmts.is_empty() {
            return;
        }

        let program = match Compiler::compile_repl(&stmts) {
            Ok(program) => program,
            Err(err) => {
                eprintln!("{}", err);
                return;
            }
        };

        let result = {
            let mut vm = Vm::new(&mut self.interpreter, program);
            vm.run()
        };
        match result {
            Ok(Value::Null) => {}
            Ok(value) => println!("{}", value.to_display_string()),
            Err(err) => eprintln!("{}", err),
        }
    }
}

/// Input is complete when every brace, bracket, and paren is closed.
/// Quotes are tracked so braces inside strings do not count.
fn input_complete(source: &str) -> bool {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for c in source.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => depth -= 1,
            _ => {}
        }
    }

    depth <= 0 && !in_string
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_complete_tracks_braces() {
        assert!(input_complete("let x = 1"));
        assert!(!input_complete("fn f() {"));
        assert!(input_complete("fn f() { return 1 }"));
        assert!(!input_complete("let a = [1, 2,"));
    }

    #[test]
    fn test_input_complete_ignores_braces_in_strings() {
        assert!(input_complete(r#"let s = "{""#));
        assert!(!input_complete(r#"let s = "unterminated"#));
    }
}
