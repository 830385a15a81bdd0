//! Peephole optimizer.
//!
//! A table of patterns is matched against every position of a finished
//! `ByteCode`. A pattern step names an opcode and an operand rule; operand
//! rules can capture operands into a small register file and the replacement
//! can splice those registers back in, or run the matched instructions in a
//! scratch context and push whatever they leave on the stack.
//!
//! A pattern is never applied over a run that some branch jumps into, so the
//! rewritten code has the same observable behaviour as the original.

use std::sync::LazyLock;

use super::{ByteCode, Instruction, Opcode};
use crate::{
    errors::RunResult,
    log::LogCategory,
    log_debug,
    value::Value,
    vm::{TYPE_FIELD, run_fragment},
};

const REGISTER_COUNT: usize = 5;

/// What a pattern does with an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placeholder {
    /// No operand in the replacement.
    Nothing,
    /// Capture the operand; a repeated capture must see an equal operand.
    Store,
    /// Match against, or emit, the captured operand.
    Read,
    /// Add the operand (or one, for a null operand) to the register.
    Count,
    /// Execute the matched instructions and use the resulting stack top.
    RunConstantFragment,
}

#[derive(Debug, Clone)]
enum OperandRule {
    Any,
    Exact(Value),
    Token(Placeholder, usize),
}

#[derive(Debug, Clone)]
struct Step {
    operation: Opcode,
    operand: OperandRule,
}

impl Step {
    fn new(operation: Opcode, operand: OperandRule) -> Self {
        Self { operation, operand }
    }
}

#[derive(Debug)]
struct Optimization {
    description: &'static str,
    /// Logs every candidate match when the optimizer log is on.
    debug: bool,
    pattern: Vec<Step>,
    replacement: Vec<Step>,
}

use OperandRule::{Any, Exact, Token};
use Placeholder::{Count, Nothing, Read, RunConstantFragment, Store};

fn fold(operation: Opcode, description: &'static str) -> Optimization {
    Optimization {
        description,
        debug: false,
        pattern: vec![
            Step::new(Opcode::Push, Token(Store, 0)),
            Step::new(Opcode::Push, Token(Store, 1)),
            Step::new(operation, Exact(Value::Null)),
        ],
        replacement: vec![Step::new(Opcode::Push, Token(RunConstantFragment, 0))],
    }
}

static OPTIMIZATIONS: LazyLock<Vec<Optimization>> = LazyLock::new(|| {
    vec![
        Optimization {
            description: "Push followed by Drop",
            debug: false,
            pattern: vec![
                Step::new(Opcode::Push, Any),
                Step::new(Opcode::Drop, Exact(Value::Null)),
            ],
            replacement: Vec::new(),
        },
        Optimization {
            description: "Sequential Drops",
            debug: false,
            pattern: vec![
                Step::new(Opcode::Drop, Token(Count, 0)),
                Step::new(Opcode::Drop, Token(Count, 0)),
            ],
            replacement: vec![Step::new(Opcode::Drop, Token(Read, 0))],
        },
        fold(Opcode::Add, "Constant addition"),
        fold(Opcode::Sub, "Constant subtraction"),
        fold(Opcode::Mul, "Constant multiplication"),
        fold(Opcode::Div, "Constant division"),
        Optimization {
            description: "Constant negation",
            debug: false,
            pattern: vec![
                Step::new(Opcode::Push, Token(Store, 0)),
                Step::new(Opcode::Negate, Exact(Value::Null)),
            ],
            replacement: vec![Step::new(Opcode::Push, Token(RunConstantFragment, 0))],
        },
        Optimization {
            description: "Load followed by same Load",
            debug: false,
            pattern: vec![
                Step::new(Opcode::Load, Token(Store, 0)),
                Step::new(Opcode::Load, Token(Read, 0)),
            ],
            replacement: vec![
                Step::new(Opcode::Load, Token(Read, 0)),
                Step::new(Opcode::Dup, Token(Nothing, 0)),
            ],
        },
        Optimization {
            description: "Push pair followed by Swap",
            debug: false,
            pattern: vec![
                Step::new(Opcode::Push, Token(Store, 0)),
                Step::new(Opcode::Push, Token(Store, 1)),
                Step::new(Opcode::Swap, Exact(Value::Null)),
            ],
            replacement: vec![
                Step::new(Opcode::Push, Token(Read, 1)),
                Step::new(Opcode::Push, Token(Read, 0)),
            ],
        },
        Optimization {
            description: "No-operation",
            debug: false,
            pattern: vec![Step::new(Opcode::NoOperation, Any)],
            replacement: Vec::new(),
        },
    ]
});

/// True for operands that a constant fragment may consume.
fn is_literal(value: &Value) -> bool {
    matches!(
        value.unwrapped(),
        Value::Bool(_)
            | Value::Byte(_)
            | Value::Int32(_)
            | Value::Int(_)
            | Value::Int64(_)
            | Value::Float32(_)
            | Value::Float64(_)
            | Value::String(_)
    )
}

impl Optimization {
    /// Matches the pattern against `code`, filling the registers.
    fn matches(&self, code: &[Instruction], registers: &mut [Option<Value>; REGISTER_COUNT]) -> bool {
        if code.len() < self.pattern.len() {
            return false;
        }
        for (step, instruction) in self.pattern.iter().zip(code) {
            if step.operation != instruction.operation {
                return false;
            }
            let operand = &instruction.operand;
            match &step.operand {
                Any => {}
                Exact(v) => {
                    if !same_operand(v, operand) {
                        return false;
                    }
                }
                Token(Store | Read, r) => match &registers[*r] {
                    Some(held) if !same_operand(held, operand) => return false,
                    Some(_) => {}
                    None => registers[*r] = Some(operand.clone()),
                },
                Token(Count, r) => {
                    let increment = if operand.is_null() {
                        1
                    } else {
                        match operand.as_int() {
                            Ok(n) => n,
                            Err(_) => return false,
                        }
                    };
                    let total = registers[*r].as_ref().and_then(|v| v.as_int().ok()).unwrap_or(0);
                    registers[*r] = Some(Value::Int(total + increment));
                }
                Token(Nothing | RunConstantFragment, _) => {}
            }
        }
        true
    }

    /// Builds the replacement run, or `None` when it cannot be built.
    fn build(&self, matched: &[Instruction], registers: &[Option<Value>; REGISTER_COUNT]) -> Option<Vec<Instruction>> {
        let mut out = Vec::with_capacity(self.replacement.len());
        for step in &self.replacement {
            let operand = match &step.operand {
                Any | Token(Nothing, _) => Value::Null,
                Exact(v) => v.clone(),
                Token(Store | Read | Count, r) => registers[*r].clone().unwrap_or_default(),
                Token(RunConstantFragment, _) => {
                    if !matched
                        .iter()
                        .filter(|i| i.operation == Opcode::Push)
                        .all(|i| is_literal(&i.operand))
                    {
                        return None;
                    }
                    execute_fragment(matched).ok()?
                }
            };
            out.push(Instruction {
                operation: step.operation,
                operand,
            });
        }
        Some(out)
    }
}

/// Operand identity for matching: same variant and equal value.
fn same_operand(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b) && a.equals(b)
}

/// Runs `instructions` followed by `Stop` in a scratch context and returns the stack top.
fn execute_fragment(instructions: &[Instruction]) -> RunResult<Value> {
    let mut fragment = ByteCode::new("code fragment");
    for instruction in instructions {
        fragment.emit_with(instruction.operation, instruction.operand.clone());
    }
    fragment.emit(Opcode::Stop);
    run_fragment(fragment)
}

impl ByteCode {
    /// Runs the peephole optimizer over this code, returning the number of
    /// rewrites applied. Optimizing twice is a no-op.
    pub fn optimize(&mut self) -> RunResult<usize> {
        if self.optimized {
            return Ok(0);
        }
        let starting_size = self.len();
        let max_pattern_size = OPTIMIZATIONS.iter().map(|o| o.pattern.len()).max().unwrap_or(1);
        let mut count = 0;
        let mut idx = 0;
        while idx < self.len() {
            let mut patched = false;
            for optimization in OPTIMIZATIONS.iter() {
                let end = idx + optimization.pattern.len();
                if end > self.len() || self.branches_into(&(idx..end)) {
                    continue;
                }
                let mut registers: [Option<Value>; REGISTER_COUNT] = Default::default();
                let matched = &self.instructions()[idx..end];
                if optimization.debug {
                    log_debug!(LogCategory::Optimizer, "candidate {} at {idx} in {}", optimization.description, self.name());
                }
                if !optimization.matches(matched, &mut registers) {
                    continue;
                }
                let Some(replacement) = optimization.build(matched, &registers) else {
                    continue;
                };
                if count == 0 {
                    log_debug!(LogCategory::Optimizer, "@@@ optimizing bytecode {} @@@", self.name());
                }
                log_debug!(LogCategory::Optimizer, "optimization found in {}: {}", self.name(), optimization.description);
                self.patch(idx, optimization.pattern.len(), replacement)?;
                count += 1;
                patched = true;
                break;
            }
            if patched {
                idx = idx.saturating_sub(max_pattern_size);
            } else {
                idx += 1;
            }
        }
        count += self.fold_constant_structs()?;
        self.optimized = true;
        if count > 0 {
            log_debug!(
                LogCategory::Optimizer,
                "found {count} optimization(s) in {}, size {starting_size} => {}",
                self.name(),
                self.len()
            );
        }
        Ok(count)
    }

    /// Replaces `Push k1, Push v1, ..., Struct n` runs of literal pushes with a
    /// single push of the built struct. Runs that name a `__type` are left alone.
    fn fold_constant_structs(&mut self) -> RunResult<usize> {
        let mut count = 0;
        let mut idx = 0;
        while idx < self.len() {
            let instruction = &self.instructions()[idx];
            if instruction.operation != Opcode::Struct {
                idx += 1;
                continue;
            }
            let Ok(fields) = instruction.operand.as_index() else {
                idx += 1;
                continue;
            };
            let Some(start) = idx.checked_sub(fields * 2) else {
                idx += 1;
                continue;
            };
            let run = &self.instructions()[start..idx];
            let constant = run.iter().all(|i| {
                i.operation == Opcode::Push && (is_literal(&i.operand) || matches!(i.operand, Value::Type(_)))
            });
            // Typed structs pick up strong typing from the running context.
            let typed = run.iter().step_by(2).any(|i| i.operand.as_str() == Some(TYPE_FIELD));
            if !constant || typed || self.branches_into(&(start + 1..idx + 1)) {
                idx += 1;
                continue;
            }
            let Ok(value) = execute_fragment(&self.instructions()[start..=idx]) else {
                idx += 1;
                continue;
            };
            self.patch(start, fields * 2 + 1, vec![Instruction::new(Opcode::Push, value)])?;
            log_debug!(LogCategory::Optimizer, "optimization found in {}: static struct", self.name());
            count += 1;
            idx = start + 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        errors::ErrorKind,
        symbols::{ROOT_TABLE, SymbolArena},
        value::Type,
        vm::Context,
    };

    fn ops(code: &ByteCode) -> Vec<Opcode> {
        code.instructions().iter().map(|i| i.operation).collect()
    }

    #[test]
    fn test_folds_constant_arithmetic() {
        let mut b = ByteCode::new("fold");
        b.emit_with(Opcode::Push, 2);
        b.emit_with(Opcode::Push, 3);
        b.emit(Opcode::Add);
        b.emit_with(Opcode::Push, 4);
        b.emit(Opcode::Mul);
        b.emit(Opcode::Stop);
        assert_eq!(b.optimize().unwrap(), 2);
        assert_eq!(ops(&b), vec![Opcode::Push, Opcode::Stop]);
        assert_eq!(b.instructions()[0].operand, Value::Int(20));
    }

    #[test]
    fn test_division_by_zero_is_left_alone() {
        let mut b = ByteCode::new("div");
        b.emit_with(Opcode::Push, 4);
        b.emit_with(Opcode::Push, 0);
        b.emit(Opcode::Div);
        b.emit(Opcode::Stop);
        assert_eq!(b.optimize().unwrap(), 0);
        assert_eq!(b.len(), 4);
    }

    #[test]
    fn test_drops_are_merged() {
        let mut b = ByteCode::new("drops");
        b.emit(Opcode::Drop);
        b.emit(Opcode::Drop);
        b.emit_with(Opcode::Drop, 3);
        b.optimize().unwrap();
        assert_eq!(ops(&b), vec![Opcode::Drop]);
        assert_eq!(b.instructions()[0].operand, Value::Int(5));
    }

    #[test]
    fn test_repeated_load_becomes_dup() {
        let mut b = ByteCode::new("loads");
        b.emit_with(Opcode::Load, "x");
        b.emit_with(Opcode::Load, "x");
        b.emit_with(Opcode::Load, "y");
        b.optimize().unwrap();
        assert_eq!(ops(&b), vec![Opcode::Load, Opcode::Dup, Opcode::Load]);
    }

    #[test]
    fn test_branch_target_blocks_pattern() {
        let mut b = ByteCode::new("guarded");
        b.emit_with(Opcode::Push, 1);
        b.emit_with(Opcode::Push, 2);
        b.emit(Opcode::Add);
        b.emit_with(Opcode::Branch, 1);
        b.optimize().unwrap();
        assert_eq!(b.len(), 4);
    }

    #[test]
    fn test_branches_are_relocated() {
        let mut b = ByteCode::new("relocate");
        b.emit_with(Opcode::Branch, 5);
        b.emit_with(Opcode::Push, 1);
        b.emit_with(Opcode::Push, 2);
        b.emit(Opcode::Add);
        b.emit(Opcode::Drop);
        b.emit(Opcode::Stop);
        b.optimize().unwrap();
        let stop = b.len() - 1;
        assert_eq!(b.instructions()[0].operand, Value::from(stop));
    }

    #[test]
    fn test_constant_struct_is_folded() {
        let mut b = ByteCode::new("struct");
        b.emit_with(Opcode::Push, "a");
        b.emit_with(Opcode::Push, 1);
        b.emit_with(Opcode::Push, "b");
        b.emit_with(Opcode::Push, "two");
        b.emit_with(Opcode::Struct, 2);
        b.emit(Opcode::Stop);
        assert_eq!(b.optimize().unwrap(), 1);
        assert_eq!(ops(&b), vec![Opcode::Push, Opcode::Stop]);
        let Value::Struct(s) = &b.instructions()[0].operand else {
            panic!("expected a struct operand");
        };
        assert_eq!(s.get("b"), Some(Value::from("two")));
    }

    fn typed_store(optimize: bool) -> (ByteCode, RunResult<()>) {
        let point = Type::structure(vec![("x".to_owned(), Type::int())]).unwrap();
        let mut b = ByteCode::new("typed");
        b.emit_with(Opcode::Push, true);
        b.emit(Opcode::StaticTyping);
        b.emit_with(Opcode::Push, "text");
        b.emit_with(Opcode::Push, TYPE_FIELD);
        b.emit_with(Opcode::Push, point);
        b.emit_with(Opcode::Push, "x");
        b.emit_with(Opcode::Push, Value::Int(1));
        b.emit_with(Opcode::Struct, 2);
        b.emit_with(Opcode::Push, "x");
        b.emit(Opcode::StoreIndex);
        b.emit(Opcode::Stop);
        if optimize {
            b.optimize().unwrap();
        }
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, b.clone());
        let result = ctx.run();
        (b, result)
    }

    #[test]
    fn test_typed_struct_keeps_strong_typing() {
        let (_, plain) = typed_store(false);
        let (optimized, folded) = typed_store(true);
        assert_eq!(plain.unwrap_err().kind(), ErrorKind::InvalidType);
        assert_eq!(folded.unwrap_err().kind(), ErrorKind::InvalidType);
        assert!(ops(&optimized).contains(&Opcode::Struct));
    }
}
