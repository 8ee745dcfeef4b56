// File: src/optimizer.rs
//
// Bytecode optimization passes for the Myco VM.
//
// Two passes run by default, both limited to shapes that are provably safe:
//   * constant folding over the numeric fast-path ops, where operand values
//     are known at compile time (the boxed stack ops carry no compile-time
//     operands and are never folded);
//   * micro loop-unrolling for tiny constant-trip-count for loops.
// Dead-code elimination is deliberately not implemented: jump targets may
// land after an apparently dead region.

use crate::bytecode::{Op, Program};
use std::collections::HashSet;
use std::sync::Arc;

/// Toggles for the individual passes
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub fold_constants: bool,
    pub unroll_loops: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { fold_constants: true, unroll_loops: true }
    }
}

/// Statistics tracking what the passes did
#[derive(Debug, Default, Clone)]
pub struct OptimizationStats {
    pub constants_folded: usize,
    pub loops_unrolled: usize,
    pub instructions_before: usize,
    pub instructions_after: usize,
}

pub struct Optimizer {
    config: OptimizerConfig,
    pub stats: OptimizationStats,
}

/// Maximum trip count and body size the unroller accepts
const UNROLL_MAX_TRIPS: usize = 4;
const UNROLL_MAX_BODY: usize = 8;

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config, stats: OptimizationStats::default() }
    }

    /// Run the enabled passes over the main code and every function body
    pub fn optimize(&mut self, program: &mut Program) {
        self.stats.instructions_before =
            program.code.len() + program.functions.iter().map(|f| f.code.len()).sum::<usize>();

        if self.config.unroll_loops {
            let mut code = std::mem::take(&mut program.code);
            self.unroll_pass(&mut code, program);
            program.code = code;
        }

        if self.config.fold_constants {
            let mut code = std::mem::take(&mut program.code);
            self.fold_pass(&mut code, program);
            program.code = code;

            for i in 0..program.functions.len() {
                let mut code = program.functions[i].code.as_ref().clone();
                self.fold_pass(&mut code, program);
                program.functions[i].code = Arc::new(code);
            }
        }

        self.stats.instructions_after =
            program.code.len() + program.functions.iter().map(|f| f.code.len()).sum::<usize>();
    }

    pub fn summary(&self) -> String {
        format!(
            "Optimization summary: {} constants folded, {} loops unrolled, {} -> {} instructions",
            self.stats.constants_folded,
            self.stats.loops_unrolled,
            self.stats.instructions_before,
            self.stats.instructions_after
        )
    }

    /// Fold [LoadNum a][LoadNum b][op] windows into a single LoadNum.
    /// Repeats until a fixpoint so whole literal trees collapse.
    fn fold_pass(&mut self, code: &mut Vec<Op>, program: &mut Program) {
        loop {
            let targets = jump_targets(code);
            let mut new_code: Vec<Op> = Vec::with_capacity(code.len());
            let mut index_map: Vec<usize> = Vec::with_capacity(code.len());
            let mut changed = false;
            let mut i = 0;

            while i < code.len() {
                let window = (code.get(i), code.get(i + 1), code.get(i + 2));
                if let (Some(Op::LoadNum(a)), Some(Op::LoadNum(b)), Some(op)) = window {
                    // A jump may target the window start, but never its middle
                    let interior_target = targets.contains(&(i + 1)) || targets.contains(&(i + 2));
                    let lhs = program.num_constants.get(*a).copied();
                    let rhs = program.num_constants.get(*b).copied();
                    if let (false, Some(x), Some(y)) = (interior_target, lhs, rhs) {
                        let folded = match op {
                            Op::AddNum => Some(x + y),
                            Op::SubNum => Some(x - y),
                            Op::MulNum => Some(x * y),
                            Op::DivNum if y != 0.0 => Some(x / y),
                            Op::ModNum if y != 0.0 => Some(x % y),
                            _ => None,
                        };
                        if let Some(value) = folded {
                            let idx = program.add_num_constant(value);
                            index_map.push(new_code.len());
                            index_map.push(new_code.len());
                            index_map.push(new_code.len());
                            new_code.push(Op::LoadNum(idx));
                            self.stats.constants_folded += 1;
                            changed = true;
                            i += 3;
                            continue;
                        }
                    }
                }
                index_map.push(new_code.len());
                new_code.push(code[i].clone());
                i += 1;
            }

            if !changed {
                return;
            }
            index_map.push(new_code.len());
            remap_targets(&mut new_code, &index_map);
            *code = new_code;
        }
    }

    /// Inline [LoadConst start][LoadConst end][CreateRange][ForLoop] when
    /// the trip count is tiny and the body is a short straight-line
    /// sub-program
    fn unroll_pass(&mut self, code: &mut Vec<Op>, program: &mut Program) {
        let targets = jump_targets(code);
        let mut new_code: Vec<Op> = Vec::with_capacity(code.len());
        let mut index_map: Vec<usize> = Vec::with_capacity(code.len());
        let mut i = 0;

        while i + 3 < code.len() {
            let window = (&code[i], &code[i + 1], &code[i + 2], &code[i + 3]);
            if let (
                Op::LoadConst(start_idx),
                Op::LoadConst(end_idx),
                Op::CreateRange(false),
                Op::ForLoop(var_idx, body_id),
            ) = window
            {
                let interior_target = (1..=3).any(|k| targets.contains(&(i + k)));
                let bounds = match (
                    program.constants.get(*start_idx),
                    program.constants.get(*end_idx),
                ) {
                    (
                        Some(crate::interpreter::Value::Number(s)),
                        Some(crate::interpreter::Value::Number(e)),
                    ) => Some((*s, *e)),
                    _ => None,
                };
                if let (false, Some((start, end))) = (interior_target, bounds) {
                    let trips = if end > start { (end - start).ceil() as usize } else { 0 };
                    let body = program.functions[*body_id].code.clone();
                    if trips <= UNROLL_MAX_TRIPS
                        && body.len() <= UNROLL_MAX_BODY
                        && body.iter().all(is_straight_line_op)
                    {
                        let var_idx = *var_idx;
                        let expansion_start = new_code.len();
                        for k in 0..trips {
                            let value = crate::interpreter::Value::Number(start + k as f64);
                            let const_idx = program.add_constant(value);
                            new_code.push(Op::PushScope);
                            new_code.push(Op::LoadConst(const_idx));
                            new_code.push(Op::DefineVar(var_idx));
                            new_code.extend(body.iter().cloned());
                            new_code.push(Op::PopScope);
                        }
                        // All four replaced slots map to the expansion start
                        for _ in 0..4 {
                            index_map.push(expansion_start);
                        }
                        self.stats.loops_unrolled += 1;
                        i += 4;
                        continue;
                    }
                }
            }
            index_map.push(new_code.len());
            new_code.push(code[i].clone());
            i += 1;
        }
        while i < code.len() {
            index_map.push(new_code.len());
            new_code.push(code[i].clone());
            i += 1;
        }

        index_map.push(new_code.len());
        remap_targets(&mut new_code, &index_map);
        *code = new_code;
    }
}

/// Every index some control instruction can jump to
fn jump_targets(code: &[Op]) -> HashSet<usize> {
    let mut targets = HashSet::new();
    for op in code {
        match op {
            Op::Jump(t) | Op::JumpIfFalse(t) | Op::TryStart(t) => {
                targets.insert(*t);
            }
            Op::LoopStart(end) => {
                // Break resumes just past the LoopEnd
                targets.insert(*end);
                targets.insert(end + 1);
            }
            _ => {}
        }
    }
    targets
}

/// Rewrite control-instruction targets through an old-to-new index map
fn remap_targets(code: &mut [Op], index_map: &[usize]) {
    for op in code {
        match op {
            Op::Jump(t) | Op::JumpIfFalse(t) | Op::TryStart(t) | Op::LoopStart(t) => {
                if let Some(&new_target) = index_map.get(*t) {
                    *t = new_target;
                }
            }
            _ => {}
        }
    }
}

/// Body ops the unroller may inline: no control flow of their own
fn is_straight_line_op(op: &Op) -> bool {
    matches!(
        op,
        Op::LoadConst(_)
            | Op::LoadVar(_)
            | Op::LoadGlobal(_)
            | Op::DefineVar(_)
            | Op::AssignVar(_)
            | Op::StoreGlobal(_)
            | Op::Pop
            | Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Mod
            | Op::Pow
            | Op::Negate
            | Op::Eq
            | Op::Ne
            | Op::Lt
            | Op::Le
            | Op::Gt
            | Op::Ge
            | Op::And
            | Op::Or
            | Op::Xor
            | Op::Not
            | Op::BitAnd
            | Op::BitOr
            | Op::BitXor
            | Op::Shl
            | Op::Shr
            | Op::LoadNum(_)
            | Op::AddNum
            | Op::SubNum
            | Op::MulNum
            | Op::DivNum
            | Op::ModNum
            | Op::LtNum
            | Op::LeNum
            | Op::GtNum
            | Op::GeNum
            | Op::EqNum
            | Op::NeNum
            | Op::ValueToNum
            | Op::NumToValue
            | Op::Print
            | Op::PrintMultiple(_)
            | Op::CreateArray(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::interpreter::Interpreter;
    use crate::lexer::tokenize;
    use crate::parser::Parser;
    use crate::vm::Vm;

    fn compile(source: &str) -> Program {
        let tokens = tokenize(source);
        let stmts = Parser::new(tokens).parse().expect("parse failed");
        Compiler::compile(&stmts, false).expect("compile failed")
    }

    fn run_program(program: Program) -> String {
        let mut interp = Interpreter::new();
        interp.captured_output = Some(String::new());
        {
            let mut vm = Vm::new(&mut interp, program);
            vm.run().expect("run failed");
        }
        interp.captured_output.unwrap_or_default()
    }

    #[test]
    fn test_fold_collapses_literal_tree() {
        let mut program = compile("let x = 1 + 2 * 3");
        let mut optimizer = Optimizer::new(OptimizerConfig::default());
        optimizer.optimize(&mut program);

        assert!(optimizer.stats.constants_folded >= 2);
        // The whole tree is one LoadNum now
        let num_loads =
            program.code.iter().filter(|op| matches!(op, Op::LoadNum(_))).count();
        assert_eq!(num_loads, 1);
        assert!(!program.code.contains(&Op::AddNum));
        assert!(!program.code.contains(&Op::MulNum));
    }

    #[test]
    fn test_fold_skips_zero_divisor() {
        // 8 / (3 - 3): the compiler keeps the division boxed because the
        // divisor folds to zero; the subtraction itself still folds
        let mut program = compile("let x = 8 / (3 - 3)");
        let mut optimizer = Optimizer::new(OptimizerConfig::default());
        optimizer.optimize(&mut program);
        assert!(program.code.contains(&Op::Div));
        assert!(optimizer.stats.constants_folded >= 1);
        assert!(!program.code.contains(&Op::SubNum));
    }

    #[test]
    fn test_folded_program_still_runs_correctly() {
        let mut program = compile("print 2 + 3 * 4");
        let mut optimizer = Optimizer::new(OptimizerConfig::default());
        optimizer.optimize(&mut program);
        assert_eq!(run_program(program), "14\n");
    }

    #[test]
    fn test_fold_preserves_jump_targets() {
        let mut program =
            compile("let x = 0\nif x < 1 { print 1 + 2 } else { print 3 + 4 }\nprint 5 + 6");
        let mut optimizer = Optimizer::new(OptimizerConfig::default());
        optimizer.optimize(&mut program);
        assert_eq!(run_program(program), "3\n11\n");
    }

    #[test]
    fn test_unroll_tiny_for_loop() {
        let mut program = compile("for i in 0..3 { print i }");
        let mut optimizer = Optimizer::new(OptimizerConfig::default());
        optimizer.optimize(&mut program);
        assert_eq!(optimizer.stats.loops_unrolled, 1);
        assert!(!program.code.iter().any(|op| matches!(op, Op::ForLoop(_, _))));
        assert_eq!(run_program(program), "0\n1\n2\n");
    }

    #[test]
    fn test_unroll_skips_large_trip_counts() {
        let mut program = compile("for i in 0..100 { print i }");
        let mut optimizer = Optimizer::new(OptimizerConfig::default());
        optimizer.optimize(&mut program);
        assert_eq!(optimizer.stats.loops_unrolled, 0);
        assert!(program.code.iter().any(|op| matches!(op, Op::ForLoop(_, _))));
    }

    #[test]
    fn test_unroll_skips_bodies_with_control_flow() {
        let mut program = compile("for i in 0..2 { if i > 0 { print i } }");
        let mut optimizer = Optimizer::new(OptimizerConfig::default());
        optimizer.optimize(&mut program);
        assert_eq!(optimizer.stats.loops_unrolled, 0);
    }

    #[test]
    fn test_passes_can_be_disabled() {
        let mut program = compile("let x = 1 + 2");
        let mut optimizer =
            Optimizer::new(OptimizerConfig { fold_constants: false, unroll_loops: false });
        optimizer.optimize(&mut program);
        assert_eq!(optimizer.stats.constants_folded, 0);
        assert!(program.code.contains(&Op::AddNum));
    }

    #[test]
    fn test_while_loop_survives_optimization() {
        let mut program = compile("let x = 0\nwhile x < 5 { x = x + 1 }\nprint x");
        let mut optimizer = Optimizer::new(OptimizerConfig::default());
        optimizer.optimize(&mut program);
        assert_eq!(run_program(program), "5\n");
    }
}
