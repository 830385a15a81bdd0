//! Operand stack primitives and the stack manipulation opcodes.

use super::{Context, GROW_STACK_BY};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    value::Value,
};

impl Context {
    /// Pushes a value, growing the stack in `GROW_STACK_BY` steps.
    pub fn push(&mut self, value: Value) {
        if self.stack.len() == self.stack.capacity() {
            self.stack.reserve(GROW_STACK_BY);
        }
        self.stack.push(value);
    }

    /// Pops the top of the stack. The values of the current frame are all
    /// that can be popped; the frame itself is only removed by a return.
    pub fn pop(&mut self) -> RunResult<Value> {
        if self.stack.len() <= self.fp {
            return Err(ErrorKind::StackUnderflow.into());
        }
        self.stack.pop().ok_or_else(|| ErrorKind::StackUnderflow.into())
    }

    /// Pops a value that must not be a stack marker.
    pub(super) fn pop_value(&mut self) -> RunResult<Value> {
        let v = self.pop()?;
        if v.is_marker() {
            return Err(ErrorKind::FunctionReturnedVoid.into());
        }
        Ok(v)
    }

    fn peek(&self) -> RunResult<&Value> {
        if self.stack.len() <= self.fp {
            return Err(ErrorKind::StackUnderflow.into());
        }
        self.stack.last().ok_or_else(|| ErrorKind::StackUnderflow.into())
    }

    /// The values on the stack, bottom first.
    #[must_use]
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Renders up to `max` values from the top of the stack, top first.
    #[must_use]
    pub fn format_stack(&self, max: usize) -> String {
        if self.stack.is_empty() {
            return "<empty>".to_owned();
        }
        let mut parts: Vec<String> = self
            .stack
            .iter()
            .rev()
            .take(max)
            .map(|v| match v {
                Value::String(s) => format!("{s:?}"),
                v => v.to_string(),
            })
            .collect();
        if self.stack.len() > max {
            parts.push("...".to_owned());
        }
        parts.join(", ")
    }

    // --- opcodes ---

    /// Values in instructions are deep copied so a program can never modify
    /// its own instruction stream.
    pub(super) fn op_push(&mut self, operand: &Value) -> RunResult<()> {
        self.push(operand.unwrapped().deep_copy());
        Ok(())
    }

    pub(super) fn op_drop(&mut self, operand: &Value) -> RunResult<()> {
        let count = Self::operand_count(operand, 1)?;
        for _ in 0..count {
            self.pop()?;
        }
        Ok(())
    }

    pub(super) fn op_dup(&mut self, _operand: &Value) -> RunResult<()> {
        let top = self.peek()?.clone();
        self.push(top);
        Ok(())
    }

    /// Replaces the top of the stack with a deep copy of itself.
    pub(super) fn op_copy(&mut self, _operand: &Value) -> RunResult<()> {
        let top = self.pop()?;
        self.push(top.deep_copy());
        Ok(())
    }

    pub(super) fn op_swap(&mut self, _operand: &Value) -> RunResult<()> {
        let a = self.pop()?;
        let b = self.pop()?;
        self.push(a);
        self.push(b);
        Ok(())
    }

    /// With no operand, pops the top into the result slot. With `n`, pushes a
    /// copy of the value `n` slots below the top.
    pub(super) fn op_read_stack(&mut self, operand: &Value) -> RunResult<()> {
        if operand.is_null() {
            let v = self.pop_value()?;
            self.result = Some(v);
            return Ok(());
        }
        let depth = operand.as_index()?;
        let available = self.stack.len() - self.fp;
        if depth >= available {
            return Err(EgoError::new(ErrorKind::StackUnderflow).context(depth));
        }
        let v = self.stack[self.stack.len() - 1 - depth].clone();
        self.push(v);
        Ok(())
    }

    /// Checks that the current frame holds at least `n` real values.
    pub(super) fn op_stack_check(&mut self, operand: &Value) -> RunResult<()> {
        let wanted = operand.as_index()?;
        let frame = &self.stack[self.fp..];
        if frame.len() < wanted || frame.iter().rev().take(wanted).any(Value::is_marker) {
            return Err(EgoError::new(ErrorKind::IncorrectReturnValueCount).context(wanted));
        }
        Ok(())
    }

    /// Pops values up to and including the nearest stack marker.
    pub(super) fn op_drop_to_marker(&mut self, _operand: &Value) -> RunResult<()> {
        while self.stack.len() > self.fp {
            if self.pop()?.is_marker() {
                break;
            }
        }
        Ok(())
    }

    pub(super) fn op_no_operation(&mut self, _operand: &Value) -> RunResult<()> {
        Ok(())
    }
}
