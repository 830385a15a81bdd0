//! Branches, line tracking and the checks compiled into function prologues.

use super::{ARGS_VAR, Context, EXEC_MODE_VAR};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    value::Value,
};

impl Context {
    /// Validates a branch operand against the current bytecode.
    pub(super) fn branch_target(&self, operand: &Value) -> RunResult<usize> {
        let invalid = || EgoError::new(ErrorKind::InvalidBytecodeAddress).context(operand);
        let addr = operand.as_index().map_err(|_| invalid())?;
        if addr >= self.bytecode.len() {
            return Err(invalid());
        }
        Ok(addr)
    }

    pub(super) fn op_branch(&mut self, operand: &Value) -> RunResult<()> {
        self.pc = self.branch_target(operand)?;
        Ok(())
    }

    pub(super) fn op_branch_true(&mut self, operand: &Value) -> RunResult<()> {
        let addr = self.branch_target(operand)?;
        if self.pop_value()?.truthy() {
            self.pc = addr;
        }
        Ok(())
    }

    pub(super) fn op_branch_false(&mut self, operand: &Value) -> RunResult<()> {
        let addr = self.branch_target(operand)?;
        if !self.pop_value()?.truthy() {
            self.pc = addr;
        }
        Ok(())
    }

    pub(super) fn op_stop(&mut self, _operand: &Value) -> RunResult<()> {
        Err(ErrorKind::Stop.into())
    }

    /// Records the source line; in single-step debugging, hands control to
    /// the debugger.
    pub(super) fn op_at_line(&mut self, operand: &Value) -> RunResult<()> {
        self.line = operand.as_index()?;
        if self.debugging && self.single_step {
            return Err(ErrorKind::SignalDebugger.into());
        }
        Ok(())
    }

    pub(super) fn op_panic(&mut self, _operand: &Value) -> RunResult<()> {
        let v = self.pop()?;
        Err(EgoError::new(ErrorKind::Panic).context(v))
    }

    pub(super) fn op_mode_check(&mut self, operand: &Value) -> RunResult<()> {
        let wanted = Self::operand_name(operand)?;
        match self.arena.get(self.symbols, EXEC_MODE_VAR) {
            Some(mode) if mode.as_str() == Some(wanted) => Ok(()),
            Some(mode) => Err(EgoError::new(ErrorKind::WrongMode).context(mode)),
            None => Err(EgoError::new(ErrorKind::WrongMode).context(wanted)),
        }
    }

    fn argument_count(&self) -> usize {
        match self.arena.get(self.symbols, ARGS_VAR).map(Value::into_unwrapped) {
            Some(Value::Array(args)) => args.len(),
            _ => 0,
        }
    }

    /// `ArgCheck n` requires exactly `n` arguments; `ArgCheck [min, max, name]`
    /// a range, with a negative `max` meaning no upper limit.
    pub(super) fn op_arg_check(&mut self, operand: &Value) -> RunResult<()> {
        let (min, max, name) = match operand.unwrapped() {
            Value::Array(spec) => {
                let values = spec.values();
                let min = values.first().map_or(Ok(0), Value::as_index)?;
                let max = match values.get(1) {
                    Some(v) if v.as_int()? >= 0 => Some(v.as_index()?),
                    _ => None,
                };
                let name = values.get(2).map(ToString::to_string).unwrap_or_default();
                (min, max, name)
            }
            v => {
                let n = v.as_index()?;
                (n, Some(n), String::new())
            }
        };
        let count = self.argument_count();
        if count < min || max.is_some_and(|m| count > m) {
            return Err(EgoError::new(ErrorKind::ArgumentCount).context(name));
        }
        Ok(())
    }

    /// Pushes the arguments from position `n` on as an array.
    pub(super) fn op_get_var_args(&mut self, operand: &Value) -> RunResult<()> {
        let first = operand.as_index()?;
        let rest = match self.arena.get(self.symbols, ARGS_VAR).map(Value::into_unwrapped) {
            Some(Value::Array(args)) => {
                let values = args.values();
                values[first.min(values.len())..].to_vec()
            }
            _ => Vec::new(),
        };
        self.push(Value::list(rest));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{
        bytecode::{ByteCode, Opcode},
        errors::ErrorKind,
        symbols::{ROOT_TABLE, SymbolArena},
        value::Value,
        vm::{ARGS_VAR, Context, EXEC_MODE_VAR},
    };

    #[test]
    fn test_conditional_branches() {
        let mut code = ByteCode::new("branch");
        code.emit_with(Opcode::Push, true);
        code.emit_with(Opcode::BranchTrue, 4);
        code.emit_with(Opcode::Push, "skipped");
        code.emit(Opcode::Stop);
        code.emit_with(Opcode::Push, 0);
        code.emit_with(Opcode::BranchFalse, 7);
        code.emit_with(Opcode::Push, "skipped");
        code.emit_with(Opcode::Push, "taken");
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        ctx.run().unwrap();
        assert_eq!(ctx.stack(), &[Value::from("taken")]);
    }

    #[test]
    fn test_branch_outside_code_is_invalid() {
        let mut code = ByteCode::new("branch");
        code.emit_with(Opcode::Branch, 10);
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        assert_eq!(ctx.run().unwrap_err().kind(), ErrorKind::InvalidBytecodeAddress);
    }

    #[test]
    fn test_single_step_signals_debugger_and_resumes() {
        let mut code = ByteCode::new("debug");
        code.emit_with(Opcode::AtLine, 3);
        code.emit_with(Opcode::Push, 1);
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        ctx.set_debug(true);
        ctx.set_single_step(true);
        assert_eq!(ctx.run().unwrap_err().kind(), ErrorKind::SignalDebugger);
        assert_eq!(ctx.line(), 3);
        ctx.resume().unwrap();
        assert_eq!(ctx.stack(), &[Value::Int(1)]);
    }

    #[test]
    fn test_arg_check_and_var_args() {
        let arena = SymbolArena::new();
        arena
            .set_always(ROOT_TABLE, ARGS_VAR, Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
            .unwrap();
        let mut code = ByteCode::new("args");
        code.emit_with(Opcode::ArgCheck, Value::list(vec![Value::Int(1), Value::Int(-1), Value::from("f")]));
        code.emit_with(Opcode::GetVarArgs, 1);
        code.emit_with(Opcode::ArgCheck, 2);
        let mut ctx = Context::new(arena, ROOT_TABLE, code);
        let err = ctx.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentCount);
        assert_eq!(ctx.stack()[0].to_string(), "[2, 3]");
    }

    #[test]
    fn test_mode_check() {
        let arena = SymbolArena::new();
        arena.set_always(ROOT_TABLE, EXEC_MODE_VAR, Value::from("server")).unwrap();
        let mut code = ByteCode::new("mode");
        code.emit_with(Opcode::ModeCheck, "server");
        code.emit_with(Opcode::ModeCheck, "test");
        let mut ctx = Context::new(arena, ROOT_TABLE, code);
        assert_eq!(ctx.run().unwrap_err().kind(), ErrorKind::WrongMode);
    }
}
