// File: src/main.rs
//
// Main entry point for the Myco programming language.
// Parses command-line arguments and dispatches to batch execution or the
// interactive REPL.

mod ast;
mod builtins;
mod bytecode;
mod compiler;
mod errors;
mod interpreter;
mod lexer;
mod module;
mod optimizer;
mod parser;
mod repl;
mod vm;

use clap::{Parser as ClapParser, Subcommand};
use std::fs;
use std::path::PathBuf;

#[derive(ClapParser)]
#[command(
    name = "myco",
    about = "Myco: a dynamically typed scripting language",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Run a Myco script file
    Run {
        /// Path to the .myco file
        file: PathBuf,

        /// Skip the bytecode optimization passes
        #[arg(long)]
        no_optimize: bool,

        /// Print the compiled bytecode before executing
        #[arg(long)]
        dump_bytecode: bool,
    },

    /// Launch the interactive Myco REPL
    Repl,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, no_optimize, dump_bytecode } => {
            let source = match fs::read_to_string(&file) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("Failed to read {}: {}", file.display(), e);
                    std::process::exit(1);
                }
            };
            let filename = file.to_string_lossy().to_string();

            let tokens = lexer::tokenize(&source);
            let stmts = match parser::Parser::new(tokens).parse() {
                Ok(stmts) => stmts,
                Err(mut err) => {
                    err.location.file = Some(filename);
                    eprintln!("{}", err);
                    std::process::exit(1);
                }
            };

            let mut program = match compiler::Compiler::compile(&stmts, true) {
                Ok(program) => program,
                Err(mut err) => {
                    err.location.file = Some(filename);
                    eprintln!("{}", err);
                    std::process::exit(1);
                }
            };

            if !no_optimize {
                let mut optimizer =
                    optimizer::Optimizer::new(optimizer::OptimizerConfig::default());
                optimizer.optimize(&mut program);
                if std::env::var("MYCO_DEBUG_OPT").is_ok() {
                    eprintln!("{}", optimizer.summary());
                }
            }

            if dump_bytecode {
                for (i, op) in program.code.iter().enumerate() {
                    eprintln!("{:4}  {:?}", i, op);
                }
                for func in &program.functions {
                    eprintln!("-- {} --", func.name);
                    for (i, op) in func.code.iter().enumerate() {
                        eprintln!("{:4}  {:?}", i, op);
                    }
                }
            }

            let mut interp = interpreter::Interpreter::new();
            interp.set_source(filename, &source);

            let result = {
                let mut vm = vm::Vm::new(&mut interp, program);
                vm.run()
            };
            if let Err(err) = result {
                eprintln!("{}", err);
                std::process::exit(1);
            }
        }

        Commands::Repl => match repl::Repl::new() {
            Ok(mut repl) => {
                if let Err(e) = repl.run() {
                    eprintln!("REPL error: {}", e);
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("Failed to start REPL: {}", e);
                std::process::exit(1);
            }
        },
    }
}
