//! Try/catch: try records, catch sets and error resolution.

use std::sync::atomic::Ordering;

use smallvec::SmallVec;

use super::{Context, ERROR_VAR};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    log::{self, LogCategory},
    symbols::TableId,
    value::Value,
};

/// `WillCatch 0` clears the catch list so every error is caught.
pub const ALL_ERRORS_CATCH_SET: usize = 0;

/// `WillCatch 1` adds the errors an optional expression (`?expr`) may ignore.
pub const OPTIONAL_CATCH_SET: usize = 1;

const OPTIONAL_CATCHES: [ErrorKind; 5] = [
    ErrorKind::UnknownMember,
    ErrorKind::InvalidType,
    ErrorKind::NilPointerReference,
    ErrorKind::DivisionByZero,
    ErrorKind::ArrayIndex,
];

/// An active `Try` block.
#[derive(Debug, Clone)]
pub(super) struct TryInfo {
    /// Handler address; `None` once the record has caught an error.
    pub(super) addr: Option<usize>,
    /// Errors this record catches; empty means all.
    pub(super) catches: SmallVec<[EgoError; 4]>,
    pub(super) fp: usize,
    pub(super) stack_len: usize,
    pub(super) symbols: TableId,
    pub(super) range_depth: usize,
}

impl TryInfo {
    fn catches(&self, err: &EgoError) -> bool {
        self.addr.is_some() && (self.catches.is_empty() || self.catches.iter().any(|c| c.matches(err)))
    }
}

impl Context {
    pub(super) fn op_try(&mut self, operand: &Value) -> RunResult<()> {
        let addr = self.branch_target(operand)?;
        self.try_stack.push(TryInfo {
            addr: Some(addr),
            catches: SmallVec::new(),
            fp: self.fp,
            stack_len: self.stack.len(),
            symbols: self.symbols,
            range_depth: self.range_stack.len(),
        });
        Ok(())
    }

    /// Narrows the innermost try record to a catch set or a specific error.
    pub(super) fn op_will_catch(&mut self, operand: &Value) -> RunResult<()> {
        let Some(record) = self.try_stack.last_mut() else {
            return Err(ErrorKind::TryCatchMismatch.into());
        };
        match operand.unwrapped() {
            Value::Error(e) => record.catches.push((**e).clone()),
            Value::String(message) => record.catches.push(EgoError::user(message.clone())),
            Value::Byte(_) | Value::Int32(_) | Value::Int(_) | Value::Int64(_) => match operand.as_index()? {
                ALL_ERRORS_CATCH_SET => record.catches.clear(),
                OPTIONAL_CATCH_SET => record
                    .catches
                    .extend(OPTIONAL_CATCHES.iter().map(|&kind| EgoError::new(kind))),
                other => return Err(EgoError::new(ErrorKind::InvalidCatchSet).context(other)),
            },
            v => return Err(EgoError::new(ErrorKind::InvalidType).context(v.kind())),
        }
        Ok(())
    }

    pub(super) fn op_try_pop(&mut self, _operand: &Value) -> RunResult<()> {
        if self.try_stack.pop().is_none() {
            return Err(ErrorKind::TryCatchMismatch.into());
        }
        self.arena.delete(self.symbols, ERROR_VAR, true)
    }

    /// Routes an error raised by an instruction.
    ///
    /// Signals pass through untouched. Otherwise the innermost try record
    /// that accepts the error gets control: frames, scopes and stack values
    /// above the record are discarded and `_error` is bound at the handler.
    /// An error nobody catches unwinds every frame and ends the run.
    pub(super) fn handle_error(&mut self, err: EgoError) -> RunResult<()> {
        if err.is_signal() {
            return Err(err);
        }
        let err = err.at(self.bytecode.name(), self.line);
        let catchable = !(err.is(ErrorKind::Panic) && self.runtime_panics);
        if catchable && let Some(index) = self.try_stack.iter().rposition(|t| t.catches(&err)) {
            return self.catch_at(index, err);
        }
        if self.full_stack_trace {
            log::emit(LogCategory::App, &format!("{err}\n{}", self.format_frames(None)));
        }
        while self.fp > 0 {
            if self.unwind_frame().is_err() {
                break;
            }
        }
        self.running.store(false, Ordering::Relaxed);
        Err(err)
    }

    fn catch_at(&mut self, index: usize, err: EgoError) -> RunResult<()> {
        let record = self.try_stack[index].clone();
        while self.fp > record.fp {
            self.unwind_frame()?;
        }
        self.try_stack.truncate(index + 1);
        self.drop_scopes_to(record.symbols);
        self.stack.truncate(record.stack_len);
        self.release_ranges(record.range_depth);
        if let Some(addr) = record.addr {
            self.pc = addr;
        }
        self.try_stack[index].addr = None;
        self.tracer.on_catch(err.kind(), self.frame_depth);
        self.arena.set_always(self.symbols, ERROR_VAR, Value::error(err))
    }
}
