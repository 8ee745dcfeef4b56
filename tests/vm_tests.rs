// Integration tests for the Myco execution core.
//
// These run complete programs through the real pipeline
// (lexer -> parser -> compiler -> VM) and assert on captured output and
// final environment state. Covered here:
// - the concrete end-to-end scenarios
// - scope hygiene and closure capture
// - for/range iteration counts
// - method dispatch and field initialization order
// - try/catch semantics and error recovery
// - optimization transparency

use myco::compiler::Compiler;
use myco::interpreter::{env_get, Interpreter, Value};
use myco::lexer::tokenize;
use myco::optimizer::{Optimizer, OptimizerConfig};
use myco::parser::Parser;
use myco::vm::Vm;

/// Run a program and return its printed output plus the interpreter state
fn run_code(source: &str) -> (String, Interpreter) {
    let tokens = tokenize(source);
    let stmts = Parser::new(tokens).parse().expect("parse failed");
    let program = Compiler::compile(&stmts, false).expect("compile failed");
    let mut interp = Interpreter::new();
    interp.captured_output = Some(String::new());
    {
        let mut vm = Vm::new(&mut interp, program);
        vm.run().expect("execution failed");
    }
    let output = interp.captured_output.clone().unwrap_or_default();
    (output, interp)
}

/// Same pipeline, but in script mode with the optimizer enabled,
/// the way `myco run` executes a file
fn run_script(source: &str) -> String {
    let tokens = tokenize(source);
    let stmts = Parser::new(tokens).parse().expect("parse failed");
    let mut program = Compiler::compile(&stmts, true).expect("compile failed");
    let mut optimizer = Optimizer::new(OptimizerConfig::default());
    optimizer.optimize(&mut program);
    let mut interp = Interpreter::new();
    interp.captured_output = Some(String::new());
    {
        let mut vm = Vm::new(&mut interp, program);
        vm.run().expect("execution failed");
    }
    interp.captured_output.unwrap_or_default()
}

// === The concrete end-to-end scenarios ===

#[test]
fn test_scenario_while_loop_counts_to_five() {
    let source = "let x = 0; while x < 5 { x = x + 1 }; print x";
    assert_eq!(run_code(source).0, "5\n");
    assert_eq!(run_script(source), "5\n");
}

#[test]
fn test_scenario_recursive_fibonacci() {
    let source =
        "fn fib(n) { if n <= 1 { return n } return fib(n-1) + fib(n-2) }; print fib(10)";
    assert_eq!(run_code(source).0, "55\n");
    assert_eq!(run_script(source), "55\n");
}

#[test]
fn test_scenario_array_push() {
    let source = "let a = [1,2,3]; a.push(4); print a";
    assert_eq!(run_code(source).0, "[1, 2, 3, 4]\n");
    assert_eq!(run_script(source), "[1, 2, 3, 4]\n");
}

#[test]
fn test_scenario_class_inheritance() {
    let source = "class A { let x = 1; fn get() { return self.x } }; class B(A) { let y = 2 }; print B().get()";
    assert_eq!(run_code(source).0, "1\n");
}

#[test]
fn test_scenario_division_by_zero_caught() {
    let source = r#"try { let z = 1/0 } catch e { print "caught" }"#;
    assert_eq!(run_code(source).0, "caught\n");
}

#[test]
fn test_scenario_match_literal() {
    let source =
        r#"match 2 case 1 => print "one" case 2 => print "two" else => print "other" end"#;
    assert_eq!(run_code(source).0, "two\n");
}

// === Scope hygiene ===

#[test]
fn test_block_local_not_visible_after_block() {
    let (_, interp) = run_code("{ let inner = 1 }\nlet outer = 2");
    assert!(env_get(&interp.globals, "inner").is_none());
    assert!(env_get(&interp.globals, "outer").is_some());
}

#[test]
fn test_reassignment_mutates_outer_binding() {
    let (out, interp) = run_code("let x = 1\n{ x = 9 }\nprint x");
    assert_eq!(out, "9\n");
    assert!(env_get(&interp.globals, "x").unwrap().equals(&Value::Number(9.0)));
}

#[test]
fn test_shadowing_leaves_outer_binding_intact() {
    let (out, _) = run_code("let x = 1\n{ let x = 2\nprint x }\nprint x");
    assert_eq!(out, "2\n1\n");
}

// === Closures ===

#[test]
fn test_closure_sees_definition_time_bindings() {
    let (out, _) = run_code(
        "fn outer() { let n = 10\nlet f = fn () => n\nn = 20\nreturn f }\nprint outer()()",
    );
    // The capture is a snapshot taken at definition time; the outer
    // rebinding afterwards is not observed
    assert_eq!(out, "10\n");
}

#[test]
fn test_closure_does_not_observe_outer_rebinding() {
    let (out, _) = run_code(
        "fn outer() { let n = 10\nlet f = fn () => n\nlet g = fn () { n = 99\nreturn 0 }\nreturn f }\nprint outer()()",
    );
    assert_eq!(out, "10\n");
}

#[test]
fn test_counter_closure_accumulates() {
    let (out, _) = run_code(
        "fn make_counter() { let n = 0\nreturn fn () { n = n + 1\nreturn n } }\nlet c = make_counter()\nc()\nc()\nprint c()",
    );
    assert_eq!(out, "3\n");
}

// === For/range iteration counts ===

#[test]
fn test_range_executes_exactly_n_times() {
    for n in [0, 1, 5, 17] {
        let source = format!("let count = 0\nfor i in 0..{} {{ count = count + 1 }}\nprint count", n);
        assert_eq!(run_code(&source).0, format!("{}\n", n));
    }
}

#[test]
fn test_stepped_range_count_is_ceiling() {
    // ceil((10 - 0) / 3) = 4
    let (out, _) =
        run_code("let count = 0\nfor i in range(0, 10, 3) { count = count + 1 }\nprint count");
    assert_eq!(out, "4\n");
}

#[test]
fn test_inclusive_range_adds_one() {
    let (out, _) = run_code("let count = 0\nfor i in 0..=5 { count = count + 1 }\nprint count");
    assert_eq!(out, "6\n");
}

// === Method dispatch and construction order ===

#[test]
fn test_child_method_overrides_parent() {
    let (out, _) = run_code(
        "class P { fn speak() { return \"parent\" } }\nclass C(P) { fn speak() { return \"child\" } }\nprint C().speak()",
    );
    assert_eq!(out, "child\n");
}

#[test]
fn test_parent_fields_initialize_first() {
    let (out, _) = run_code(
        "class P { let a = 1 }\nclass C(P) { let b = 2 }\nlet c = C(10, 20)\nprint c.a, c.b",
    );
    // Positional constructor args bind in field order, parent first
    assert_eq!(out, "10 20\n");
}

#[test]
fn test_method_mutation_visible_to_caller() {
    let (out, _) = run_code(
        "class Box { let v = 0\nfn set(x) { self.v = x } }\nlet b = Box()\nb.set(7)\nprint b.v",
    );
    assert_eq!(out, "7\n");
}

// === Try/catch ===

#[test]
fn test_catch_binds_thrown_string_and_clears_error() {
    let (out, interp) = run_code(r#"try { throw "X" } catch e { print e }"#);
    assert_eq!(out, "X\n");
    assert!(!interp.has_error());
}

#[test]
fn test_throw_from_function_unwinds_to_caller_try() {
    let (out, _) = run_code(
        "fn boom() { throw \"deep\" }\ntry { boom() } catch e { print e }",
    );
    assert_eq!(out, "deep\n");
}

#[test]
fn test_nested_try_inner_catches_first() {
    let (out, _) = run_code(
        r#"try { try { throw "inner" } catch e { print "inner handler" } print "after inner" } catch e { print "outer handler" }"#,
    );
    assert_eq!(out, "inner handler\nafter inner\n");
}

#[test]
fn test_uncaught_error_reports_and_execution_continues() {
    let (out, interp) = run_code("let z = no_such_name\nprint \"still here\"");
    assert_eq!(out, "still here\n");
    assert!(!interp.has_error());
}

// === Value semantics through programs ===

#[test]
fn test_clone_builtin_is_deep() {
    let (out, _) = run_code(
        "let a = [1, 2]\nlet b = clone(a)\nb.push(3)\nprint a\nprint b",
    );
    assert_eq!(out, "[1, 2]\n[1, 2, 3]\n");
}

#[test]
fn test_assignment_copies_value_semantics() {
    let (out, _) = run_code("let a = [1]\nlet b = a\nb.push(2)\nprint a\nprint b");
    assert_eq!(out, "[1]\n[1, 2]\n");
}

#[test]
fn test_number_formatting_in_output() {
    let (out, _) = run_code("print 3\nprint 2.5\nprint true, false, null");
    assert_eq!(out, "3\n2.500000\nTrue False Null\n");
}

#[test]
fn test_string_concat_and_comparison() {
    let (out, _) = run_code(
        r#"let s = "foo" + "bar"
print s
print "apple" < "banana""#,
    );
    assert_eq!(out, "foobar\nTrue\n");
}

// === Pattern matching ===

#[test]
fn test_match_null_and_type_patterns() {
    let (out, _) = run_code(
        "match null case null => print \"nil\" else => print \"other\" end",
    );
    assert_eq!(out, "nil\n");

    let (out, _) = run_code(
        "match 3.5 case Int => print \"int\" case Float => print \"float\" end",
    );
    assert_eq!(out, "float\n");
}

#[test]
fn test_spore_keyword() {
    let (out, _) = run_code(r#"spore "a" case "a" => print "hit" end"#);
    assert_eq!(out, "hit\n");
}

#[test]
fn test_match_falls_through_to_else() {
    let (out, _) = run_code(
        "match 42 case 1 => print \"one\" else => print \"fallback\" end",
    );
    assert_eq!(out, "fallback\n");
}

// === Imports ===

#[test]
fn test_builtin_library_namespace_and_show() {
    let (out, _) = run_code("use math\nprint math.floor(2.9)");
    assert_eq!(out, "2\n");

    let (out, _) = run_code("use string show upper as shout\nprint shout(\"hi\")");
    assert_eq!(out, "HI\n");
}

#[test]
fn test_file_module_import_end_to_end() {
    let dir = std::env::temp_dir().join(format!("myco_e2e_{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("failed to create temp dir");
    std::fs::write(
        dir.join("util.myco"),
        "export fn triple(x) { return x * 3 }\nexport let greeting = \"hello\"\nlet hidden = 1",
    )
    .expect("failed to write module");

    let source = "use util\nprint util.triple(7)\nprint util.greeting";
    let tokens = tokenize(source);
    let stmts = Parser::new(tokens).parse().expect("parse failed");
    let program = Compiler::compile(&stmts, false).expect("compile failed");
    let mut interp = Interpreter::new();
    interp.source_name = Some(dir.join("main.myco").to_string_lossy().to_string());
    interp.captured_output = Some(String::new());
    {
        let mut vm = Vm::new(&mut interp, program);
        vm.run().expect("execution failed");
    }
    assert_eq!(interp.captured_output.as_deref(), Some("21\nhello\n"));

    std::fs::remove_dir_all(&dir).ok();
}

// === Async primitives ===

#[test]
fn test_spawn_await_round_trip() {
    let (out, _) = run_code(
        "fn work(a, b) { return a + b }\nlet p = spawn(work, 20, 22)\nprint await_promise(p)",
    );
    assert_eq!(out, "42\n");
}

#[test]
fn test_async_sleep_resolves_null() {
    let (out, _) = run_code("print await_promise(async_sleep(5))");
    assert_eq!(out, "Null\n");
}

// === Operators from the extended surface ===

#[test]
fn test_power_and_bitwise_operators() {
    let (out, _) = run_code("print 2 ** 10\nprint 6 & 3, 6 | 3, 6 ^ 3\nprint 1 << 4, 32 >> 2");
    assert_eq!(out, "1024\n2 7 5\n16 8\n");
}

#[test]
fn test_logical_keyword_operators() {
    let (out, _) = run_code("print true and false, true or false, true xor true, not false");
    assert_eq!(out, "False True False True\n");
}

// === Optimizer transparency ===

#[test]
fn test_script_mode_and_optimizer_agree_with_plain_run() {
    let programs = [
        "let x = 0; while x < 5 { x = x + 1 }; print x",
        "print 1 + 2 * 3 - 4",
        "for i in 0..3 { print i * 2 }",
        "fn sq(n) { return n * n }; print sq(12)",
    ];
    for source in programs {
        assert_eq!(run_code(source).0, run_script(source), "mismatch for {}", source);
    }
}

// === Deep recursion guard ===

#[test]
fn test_stack_overflow_is_fatal_not_a_crash() {
    let tokens = tokenize("fn f() { return f() }\nf()");
    let stmts = Parser::new(tokens).parse().expect("parse failed");
    let program = Compiler::compile(&stmts, false).expect("compile failed");
    let mut interp = Interpreter::new();
    interp.captured_output = Some(String::new());
    let result = {
        let mut vm = Vm::new(&mut interp, program);
        vm.run()
    };
    let err = result.expect_err("infinite recursion must abort");
    assert_eq!(err.kind, myco::errors::ErrorKind::StackOverflow);
}
