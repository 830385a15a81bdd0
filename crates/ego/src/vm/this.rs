//! The receiver stack used by method calls.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Context, This};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    log::LogCategory,
    log_debug,
    value::Value,
};

static NEXT_RECEIVER: AtomicUsize = AtomicUsize::new(1);

impl Context {
    /// Pushes a receiver onto the this-stack.
    ///
    /// With a name operand the receiver is the value of that symbol. Without
    /// one the receiver is the top of stack, which stays in place for the
    /// `Member` that follows and is also bound to a fresh `$thisN` symbol.
    pub(super) fn op_set_this(&mut self, operand: &Value) -> RunResult<()> {
        let (name, value) = if operand.is_null() {
            let value = self.pop_value()?;
            self.push(value.clone());
            let name = format!("$this{}", NEXT_RECEIVER.fetch_add(1, Ordering::Relaxed));
            self.arena.set_always(self.symbols, &name, value.clone())?;
            (name, value)
        } else {
            let name = Self::operand_name(operand)?;
            let value = self
                .arena
                .get(self.symbols, name)
                .ok_or_else(|| EgoError::new(ErrorKind::UnknownSymbol).context(name))?;
            (name.to_owned(), value)
        };
        log_debug!(LogCategory::Symbol, "({}) push this {name}", self.thread_id);
        self.this_stack.push(This { name, value });
        Ok(())
    }

    /// Method prologue: pops the receiver and binds it to the operand name.
    /// An empty this-stack leaves the name unbound.
    pub(super) fn op_get_this(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        if let Some(this) = self.this_stack.pop() {
            log_debug!(LogCategory::Symbol, "({}) pop this {} as {name}", self.thread_id, this.name);
            self.arena.set_always(self.symbols, name, this.value)?;
        }
        Ok(())
    }

    /// Pushes the current receiver without popping it.
    pub(super) fn op_load_this(&mut self, _operand: &Value) -> RunResult<()> {
        let value = self
            .this_stack
            .last()
            .map(|this| this.value.clone())
            .ok_or_else(|| EgoError::new(ErrorKind::InvalidThis))?;
        self.push(value);
        Ok(())
    }
}
