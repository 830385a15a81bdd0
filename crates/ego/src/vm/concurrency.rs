//! `Go`, `Wait` and channel transfer.

use std::{sync::Arc, thread};

use super::{Context, DISCARD_VAR, callable_name};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    log::{self, LogCategory},
    log_debug,
    symbols::ROOT_TABLE,
    value::Value,
};

impl Context {
    /// Starts the callable on its own thread. The task gets a fresh context
    /// whose scope is a new boundary table under the root, so it shares the
    /// globals and nothing else with the spawning function.
    pub(super) fn op_go(&mut self, operand: &Value) -> RunResult<()> {
        let count = Self::operand_count(operand, 0)?;
        let args = self.pop_args(count)?;
        let callable = self.pop_value()?.into_unwrapped();
        let name = callable_name(&callable);
        let arena = Arc::clone(&self.arena);
        let settings = Arc::clone(&self.settings);
        log_debug!(LogCategory::Trace, "({}) go {name}", self.thread_id);

        let task_name = format!("go {name}");
        let handle = thread::Builder::new()
            .name(task_name.clone())
            .spawn(move || {
                let table = arena.new_child(&task_name, ROOT_TABLE, true);
                let mut ctx = Self::trampoline(Arc::clone(&arena), table, settings, callable, args);
                let result = ctx.run();
                arena.remove(table);
                if let Err(err) = &result {
                    log::emit(LogCategory::App, &format!("{task_name}: {err}"));
                }
                result
            })
            .map_err(|e| EgoError::new(ErrorKind::Panic).context(e))?;
        self.tasks.push(handle);
        Ok(())
    }

    /// `Wait wg` (a WaitGroup, or the name of one) blocks on the group.
    /// Without one, joins every task this context started.
    pub(super) fn op_wait(&mut self, operand: &Value) -> RunResult<()> {
        let target = match operand.unwrapped() {
            Value::Null => None,
            Value::String(name) => self.arena.get(self.symbols, name),
            v => Some(v.clone()),
        };
        match target.map(Value::into_unwrapped) {
            Some(Value::WaitGroup(wg)) => {
                wg.wait();
                Ok(())
            }
            _ => self.join_tasks(),
        }
    }

    /// Joins the tasks started by `Go` and reports the first failure.
    pub fn join_tasks(&mut self) -> RunResult<()> {
        let mut first = None;
        for handle in self.tasks.drain(..) {
            let result = handle
                .join()
                .unwrap_or_else(|_| Err(EgoError::new(ErrorKind::Panic).context("task panicked")));
            if let Err(err) = result {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Sends to the channel held in `name`, or receives into `name` from the
    /// channel on top of the stack.
    pub(super) fn op_store_chan(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        if let Some(Value::Channel(channel)) = self.arena.get(self.symbols, name).map(Value::into_unwrapped) {
            let v = self.pop_value()?;
            return channel.send(v);
        }
        match self.pop_value()?.into_unwrapped() {
            Value::Channel(channel) => {
                let v = channel.receive()?;
                if name == DISCARD_VAR {
                    return Ok(());
                }
                self.arena.set(self.symbols, name, v)
            }
            other => Err(EgoError::new(ErrorKind::InvalidChannel).context(other.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::{
        bytecode::{ByteCode, Opcode},
        channel::Channel,
        errors::ErrorKind,
        symbols::{ROOT_TABLE, SymbolArena},
        value::Value,
        vm::Context,
    };

    /// `func(ch, v) { ch <- v }`
    fn sender() -> ByteCode {
        let mut code = ByteCode::new("sender");
        code.emit_with(Opcode::Load, "__args");
        code.emit_with(Opcode::Push, 0);
        code.emit(Opcode::LoadIndex);
        code.emit_with(Opcode::CreateAndStore, "ch");
        code.emit_with(Opcode::Load, "__args");
        code.emit_with(Opcode::Push, 1);
        code.emit(Opcode::LoadIndex);
        code.emit_with(Opcode::StoreChan, "ch");
        code.emit(Opcode::Return);
        code
    }

    #[test]
    fn test_go_sends_on_channel() {
        let channel = Value::Channel(Channel::new(1));
        let mut code = ByteCode::new("main");
        code.emit_with(Opcode::Push, sender());
        code.emit_with(Opcode::Push, channel.clone());
        code.emit_with(Opcode::Push, 42);
        code.emit_with(Opcode::Go, 2);
        code.emit_with(Opcode::Push, channel);
        code.emit_with(Opcode::StoreChan, "x");
        code.emit(Opcode::Wait);
        code.emit_with(Opcode::Load, "x");
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        ctx.run().unwrap();
        assert_eq!(ctx.stack(), &[Value::Int(42)]);
    }

    #[test]
    fn test_task_errors_surface_on_wait() {
        let mut failing = ByteCode::new("failing");
        failing.emit_with(Opcode::Load, "missing");
        failing.emit(Opcode::Return);
        let mut code = ByteCode::new("main");
        code.emit_with(Opcode::Push, failing);
        code.emit_with(Opcode::Go, 0);
        code.emit(Opcode::Wait);
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        assert_eq!(ctx.run().unwrap_err().kind(), ErrorKind::UnknownSymbol);
    }

    #[test]
    fn test_store_chan_needs_a_channel() {
        let mut code = ByteCode::new("main");
        code.emit_with(Opcode::Push, 1);
        code.emit_with(Opcode::StoreChan, "x");
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        assert_eq!(ctx.run().unwrap_err().kind(), ErrorKind::InvalidChannel);
    }

    #[test]
    fn test_go_task_tables_are_released() {
        let arena = SymbolArena::new();
        let before = arena.table_count();
        let mut code = ByteCode::new("main");
        code.emit_with(Opcode::Push, sender());
        code.emit_with(Opcode::Push, Value::Channel(Channel::new(1)));
        code.emit_with(Opcode::Push, "v");
        code.emit_with(Opcode::Go, 2);
        code.emit(Opcode::Wait);
        let mut ctx = Context::new(Arc::clone(&arena), ROOT_TABLE, code);
        ctx.run().unwrap();
        assert_eq!(arena.table_count(), before);
    }
}
