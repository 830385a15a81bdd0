//! The peephole optimizer must not change what a program computes.

use ego::{ByteCode, Context, ErrorKind, Opcode, ROOT_TABLE, SymbolArena, TYPE_FIELD, Type, Value};
use pretty_assertions::assert_eq;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Globals the random programs may load.
const GLOBALS: [&str; 2] = ["a", "b"];

fn arena() -> std::sync::Arc<SymbolArena> {
    let arena = SymbolArena::new();
    arena.set_always(ROOT_TABLE, "a", Value::Int(3)).unwrap();
    arena.set_always(ROOT_TABLE, "b", Value::from(-2_i32)).unwrap();
    arena
}

/// Final stack of `code`, or the kind of error it stopped with.
fn outcome(code: ByteCode) -> Result<Vec<Value>, ErrorKind> {
    let mut ctx = Context::new(arena(), ROOT_TABLE, code);
    match ctx.run() {
        Ok(()) => Ok(ctx.stack().to_vec()),
        Err(err) => Err(err.kind()),
    }
}

fn literal(rng: &mut StdRng) -> Value {
    match rng.gen_range(0..3) {
        0 => Value::from(rng.gen_range(-9_i32..10)),
        1 => Value::Int(rng.gen_range(-9..10)),
        _ => Value::from(["x", "yy", ""][rng.gen_range(0..3)]),
    }
}

/// `Push k1; Push v1; ... Struct n` with literal fields.
fn emit_literal_struct(rng: &mut StdRng, code: &mut ByteCode) {
    let count = rng.gen_range(0..4_usize);
    for field in ["f", "g", "h"].iter().take(count) {
        code.emit_with(Opcode::Push, *field);
        code.emit_with(Opcode::Push, literal(rng));
    }
    code.emit_with(Opcode::Struct, count);
}

/// Builds a `struct{x int}` instance and stores a random value into `x`,
/// leaving the struct on the stack.
fn emit_typed_store(rng: &mut StdRng, code: &mut ByteCode) {
    let point = Type::structure(vec![("x".to_owned(), Type::int())]).unwrap();
    code.emit_with(Opcode::Push, literal(rng));
    code.emit_with(Opcode::Push, TYPE_FIELD);
    code.emit_with(Opcode::Push, point);
    code.emit_with(Opcode::Push, "x");
    code.emit_with(Opcode::Push, Value::Int(rng.gen_range(-9..10)));
    code.emit_with(Opcode::Struct, 2);
    code.emit_with(Opcode::Push, "x");
    code.emit(Opcode::StoreIndex);
}

/// A random straight-line program that never underflows the stack.
fn random_program(rng: &mut StdRng, index: usize) -> ByteCode {
    let mut code = ByteCode::new(&format!("random {index}"));
    if rng.gen_bool(0.3) {
        code.emit_with(Opcode::Push, true);
        code.emit(Opcode::StaticTyping);
    }
    let mut depth = 0_usize;
    for _ in 0..rng.gen_range(1..24) {
        let choice = rng.gen_range(0..13);
        match choice {
            7 => {
                let name = GLOBALS[rng.gen_range(0..GLOBALS.len())];
                code.emit_with(Opcode::Load, name);
                depth += 1;
                if rng.gen_bool(0.5) {
                    code.emit_with(Opcode::Load, name);
                    depth += 1;
                }
            }
            8 => {
                code.emit_with(Opcode::Push, literal(rng));
                code.emit_with(Opcode::Push, literal(rng));
                code.emit(Opcode::Swap);
                depth += 2;
            }
            9 => {
                emit_literal_struct(rng, &mut code);
                depth += 1;
            }
            10 => {
                emit_typed_store(rng, &mut code);
                depth += 1;
            }
            _ => match (choice, depth) {
                (0..=2, _) | (_, 0) => {
                    if rng.gen_bool(0.5) {
                        code.emit_with(Opcode::Push, rng.gen_range(-9_i32..10));
                    } else {
                        code.emit_with(Opcode::Push, Value::Int(rng.gen_range(-9..10)));
                    }
                    depth += 1;
                }
                (3, _) => code.emit(Opcode::Negate),
                (4, _) => {
                    code.emit(Opcode::Dup);
                    depth += 1;
                }
                (5, _) => {
                    code.emit(Opcode::Drop);
                    depth -= 1;
                }
                (_, 1) => {
                    code.emit(Opcode::Dup);
                    depth += 1;
                }
                (6, _) => code.emit(Opcode::Swap),
                _ => {
                    let op = [Opcode::Add, Opcode::Sub, Opcode::Mul, Opcode::Div][rng.gen_range(0..4)];
                    code.emit(op);
                    depth -= 1;
                }
            },
        }
    }
    code
}

#[test]
fn optimized_programs_compute_the_same_result() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut rewritten = 0;
    for index in 0..500 {
        let original = random_program(&mut rng, index);
        let mut optimized = original.clone();
        rewritten += optimized.optimize().unwrap();
        assert!(optimized.len() <= original.len());
        assert_eq!(
            outcome(optimized),
            outcome(original.clone()),
            "program {index}:\n{:?}",
            original.instructions()
        );
    }
    assert!(rewritten > 0);
}

#[test]
fn constant_expression_folds_to_one_push() {
    let mut code = ByteCode::new("fold");
    code.emit_with(Opcode::Push, 6);
    code.emit_with(Opcode::Push, 7);
    code.emit(Opcode::Mul);
    code.emit(Opcode::Negate);
    code.optimize().unwrap();
    assert_eq!(code.len(), 1);
    assert_eq!(code.instructions()[0].operation, Opcode::Push);
    assert_eq!(code.instructions()[0].operand, Value::Int(-42));
}

#[test]
fn branch_targets_block_rewrites() {
    // 0: Push 1; 1: Push 2; 2: Add; 3: Branch 1 -- the fold would swallow address 1.
    let mut code = ByteCode::new("guarded");
    code.emit_with(Opcode::Push, 1);
    code.emit_with(Opcode::Push, 2);
    code.emit(Opcode::Add);
    code.emit_with(Opcode::Branch, 1);
    code.optimize().unwrap();
    assert_eq!(code.len(), 4);
}

#[test]
fn append_relocates_branches() {
    let mut head = ByteCode::new("head");
    head.emit_with(Opcode::Push, 1);
    head.emit_with(Opcode::Push, 2);

    let mut tail = ByteCode::new("tail");
    tail.emit(Opcode::NoOperation);
    tail.emit_with(Opcode::Branch, 0);
    tail.emit_with(Opcode::BranchFalse, 1);
    tail.emit_with(Opcode::Push, 7);

    head.append(&tail);
    let operands: Vec<(Opcode, Value)> = head
        .instructions()
        .iter()
        .map(|i| (i.operation, i.operand.clone()))
        .collect();
    assert_eq!(
        operands,
        vec![
            (Opcode::Push, Value::Int(1)),
            (Opcode::Push, Value::Int(2)),
            (Opcode::NoOperation, Value::Null),
            (Opcode::Branch, Value::Int(2)),
            (Opcode::BranchFalse, Value::Int(3)),
            (Opcode::Push, Value::Int(7)),
        ]
    );
}
