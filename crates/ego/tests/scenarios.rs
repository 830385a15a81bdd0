//! End to end programs exercising the VM through the public API.

use std::sync::Arc;

use ego::{ByteCode, Channel, Context, ErrorKind, Opcode, ROOT_TABLE, SymbolArena, Type, Value};
use pretty_assertions::assert_eq;

fn run(code: ByteCode) -> (Context, ego::RunResult<()>) {
    let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
    let result = ctx.run();
    (ctx, result)
}

#[test]
fn integer_addition() {
    let mut code = ByteCode::new("add");
    code.emit_with(Opcode::Push, 2);
    code.emit_with(Opcode::Push, 3);
    code.emit(Opcode::Add);
    code.emit(Opcode::Stop);
    let (ctx, result) = run(code);
    result.unwrap();
    assert_eq!(ctx.stack(), &[Value::Int(5)]);
}

#[test]
fn division_by_zero() {
    let mut code = ByteCode::new("div");
    code.emit_with(Opcode::Push, 4);
    code.emit_with(Opcode::Push, 0);
    code.emit(Opcode::Div);
    code.emit(Opcode::Stop);
    let (ctx, result) = run(code);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::DivisionByZero);
    assert!(!ctx.is_running());
}

#[test]
fn string_concatenation() {
    let mut code = ByteCode::new("concat");
    code.emit_with(Opcode::Push, "ab");
    code.emit_with(Opcode::Push, "cd");
    code.emit(Opcode::Add);
    code.emit(Opcode::Stop);
    let (ctx, result) = run(code);
    result.unwrap();
    assert_eq!(ctx.stack(), &[Value::from("abcd")]);
}

#[test]
fn child_scope_is_gone_after_pop_scope() {
    let mut code = ByteCode::new("scope");
    code.emit(Opcode::PushScope);
    code.emit_with(Opcode::Push, 1);
    code.emit_with(Opcode::StoreAlways, "x");
    code.emit_with(Opcode::Load, "x");
    code.emit(Opcode::PopScope);
    code.emit_with(Opcode::Load, "x");
    let (ctx, result) = run(code);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::UnknownSymbol);
    assert_eq!(ctx.stack(), &[Value::Int(1)]);
}

#[test]
fn caught_division_by_zero_binds_error() {
    // Try T; WillCatch DivisionByZero; Push 1; Push 0; Div; Branch E; T: Load _error; E: TryPop; Stop
    let mut code = ByteCode::new("try");
    let try_at = code.mark();
    code.emit_with(Opcode::Try, 0);
    code.emit_with(Opcode::WillCatch, ErrorKind::DivisionByZero);
    code.emit_with(Opcode::Push, 1);
    code.emit_with(Opcode::Push, 0);
    code.emit(Opcode::Div);
    let branch_at = code.mark();
    code.emit_with(Opcode::Branch, 0);
    code.set_address_here(try_at).unwrap();
    code.emit_with(Opcode::Load, ego::ERROR_VAR);
    code.set_address_here(branch_at).unwrap();
    code.emit(Opcode::TryPop);
    code.emit(Opcode::Stop);

    let (ctx, result) = run(code);
    result.unwrap();
    let [Value::Error(err)] = ctx.stack() else {
        panic!("expected the caught error, got {:?}", ctx.stack());
    };
    assert_eq!(err.kind(), ErrorKind::DivisionByZero);
}

/// `func(ch, from, to) { for v := from; v < to; v++ { ch <- v } }`
fn sender() -> ByteCode {
    let mut code = ByteCode::new("sender");
    for (i, name) in ["ch", "v", "end"].into_iter().enumerate() {
        code.emit_with(Opcode::Load, ego::ARGS_VAR);
        code.emit_with(Opcode::Push, i);
        code.emit(Opcode::LoadIndex);
        code.emit_with(Opcode::StoreAlways, name);
    }
    let top = code.mark();
    code.emit_with(Opcode::Load, "v");
    code.emit_with(Opcode::Load, "end");
    code.emit(Opcode::LessThan);
    let exit = code.mark();
    code.emit_with(Opcode::BranchFalse, 0);
    code.emit_with(Opcode::Load, "v");
    code.emit_with(Opcode::StoreChan, "ch");
    code.emit_with(Opcode::Load, "v");
    code.emit_with(Opcode::Push, 1);
    code.emit(Opcode::Add);
    code.emit_with(Opcode::StoreAlways, "v");
    code.emit_with(Opcode::Branch, top);
    code.set_address_here(exit).unwrap();
    code.emit(Opcode::Return);
    code
}

/// `func(ch, out, total) { for i := 0; i < total; i++ { out[i] = <-ch }; ch.Close() }`
fn receiver() -> ByteCode {
    let mut code = ByteCode::new("receiver");
    for (i, name) in ["ch", "out", "total"].into_iter().enumerate() {
        code.emit_with(Opcode::Load, ego::ARGS_VAR);
        code.emit_with(Opcode::Push, i);
        code.emit(Opcode::LoadIndex);
        code.emit_with(Opcode::StoreAlways, name);
    }
    code.emit_with(Opcode::Push, 0);
    code.emit_with(Opcode::StoreAlways, "i");
    let top = code.mark();
    code.emit_with(Opcode::Load, "i");
    code.emit_with(Opcode::Load, "total");
    code.emit(Opcode::LessThan);
    let exit = code.mark();
    code.emit_with(Opcode::BranchFalse, 0);
    code.emit_with(Opcode::Load, "ch");
    code.emit_with(Opcode::StoreChan, "x");
    code.emit_with(Opcode::Load, "x");
    code.emit_with(Opcode::Load, "out");
    code.emit_with(Opcode::Load, "i");
    code.emit(Opcode::StoreIndex);
    code.emit(Opcode::Drop);
    code.emit_with(Opcode::Load, "i");
    code.emit_with(Opcode::Push, 1);
    code.emit(Opcode::Add);
    code.emit_with(Opcode::StoreAlways, "i");
    code.emit_with(Opcode::Branch, top);
    code.set_address_here(exit).unwrap();
    code.emit_with(Opcode::Load, "ch");
    code.emit_with(Opcode::Member, "Close");
    code.emit_with(Opcode::Call, 0);
    code.emit(Opcode::Drop);
    code.emit(Opcode::Return);
    code
}

#[test]
fn two_senders_one_receiver() {
    const N: i64 = 25;
    let arena = SymbolArena::new();
    let channel = Channel::new(4);
    let out = ego::Array::filled(Type::interface(), 2 * N as usize, &Value::Null);
    arena.set_always(ROOT_TABLE, "ch", Value::Channel(channel.clone())).unwrap();
    arena.set_always(ROOT_TABLE, "out", Value::Array(out.clone())).unwrap();

    let mut code = ByteCode::new("main");
    for (from, to) in [(0, N), (1000, 1000 + N)] {
        code.emit_with(Opcode::Push, sender());
        code.emit_with(Opcode::Load, "ch");
        code.emit_with(Opcode::Push, from);
        code.emit_with(Opcode::Push, to);
        code.emit_with(Opcode::Go, 3);
    }
    code.emit_with(Opcode::Push, receiver());
    code.emit_with(Opcode::Load, "ch");
    code.emit_with(Opcode::Load, "out");
    code.emit_with(Opcode::Push, 2 * N);
    code.emit_with(Opcode::Go, 3);
    code.emit(Opcode::Wait);

    let mut ctx = Context::new(Arc::clone(&arena), ROOT_TABLE, code);
    ctx.run().unwrap();

    let mut received: Vec<i64> = out.values().iter().map(|v| v.as_int().unwrap()).collect();
    received.sort_unstable();
    let mut expected: Vec<i64> = (0..N).chain(1000..1000 + N).collect();
    expected.sort_unstable();
    assert_eq!(received, expected);
    assert!(!channel.is_open());
    assert!(channel.is_empty());
}
