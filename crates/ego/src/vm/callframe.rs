//! Call frames: saving and restoring the context across bytecode calls.

use std::{fmt, mem, sync::Arc};

use super::{Context, DeferredCall, EXTENSIONS_VAR, This, has_capitalized_name};
use crate::{
    bytecode::ByteCode,
    errors::{ErrorKind, RunResult},
    log::LogCategory,
    log_debug,
    symbols::{ROOT_TABLE, TableId},
    value::Value,
};

/// A snapshot of the caller, pushed on the operand stack by a call.
///
/// Everything a return needs to resume the caller lives here, so unwinding
/// after an error is just a matter of popping frames off the stack.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Name of the callee's symbol table.
    pub name: String,
    /// The caller's bytecode name and line at the time of the call.
    pub module: String,
    pub line: usize,
    pub package: String,
    pub(crate) symbols: TableId,
    pub(crate) bytecode: Arc<ByteCode>,
    pub(crate) this_stack: Vec<This>,
    pub(crate) defer_stack: Vec<DeferredCall>,
    pub(crate) range_depth: usize,
    pub(crate) pc: usize,
    pub(crate) fp: usize,
    pub(crate) block_depth: usize,
    pub(crate) single_step: bool,
    pub(crate) break_on_return: bool,
    pub(crate) extensions: bool,
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.line)
    }
}

impl Context {
    /// Pushes a frame and switches to `code` at `pc` in a new child table of
    /// the current scope.
    pub(super) fn callframe_push(&mut self, table_name: &str, code: Arc<ByteCode>, pc: usize, boundary: bool) {
        let table = self.arena.new_child(table_name, self.symbols, boundary);
        self.callframe_push_with_table(table_name, table, code, pc);
    }

    /// Pushes a frame and switches to `code` at `pc` with `table` as scope.
    pub(super) fn callframe_push_with_table(&mut self, name: &str, table: TableId, code: Arc<ByteCode>, pc: usize) {
        let frame = CallFrame {
            name: name.to_owned(),
            module: self.bytecode.name().to_owned(),
            line: self.line,
            package: self.pkg.clone(),
            symbols: self.symbols,
            bytecode: Arc::clone(&self.bytecode),
            this_stack: self.this_stack.clone(),
            defer_stack: mem::take(&mut self.defer_stack),
            range_depth: self.range_stack.len(),
            pc: self.pc,
            fp: self.fp,
            block_depth: self.block_depth,
            single_step: self.single_step,
            break_on_return: self.break_on_return,
            extensions: self.extensions,
        };
        log_debug!(
            LogCategory::Symbol,
            "({}) push call frame {name} from {}, table {table}",
            self.thread_id,
            frame
        );
        self.push(Value::CallFrame(Box::new(frame)));
        self.fp = self.stack.len();
        self.result = None;
        self.symbols = table;
        self.bytecode = code;
        self.pc = pc;
        self.block_depth = 0;
        self.break_on_return = false;
        self.frame_depth += 1;
        if self.step_over {
            self.single_step = false;
        }
        self.tracer.on_call(name, self.frame_depth);
    }

    /// Returns from the current frame. Values the callee left above the frame
    /// pointer are its multi-value result; when there are none the result
    /// slot is pushed instead.
    pub(super) fn callframe_pop(&mut self) -> RunResult<()> {
        if self.fp == 0 || self.fp > self.stack.len() {
            return Err(ErrorKind::InvalidCallFrame.into());
        }
        let returned = self.stack.split_off(self.fp);
        let result = self.result.take();
        self.restore_frame()?;
        if returned.is_empty() {
            if let Some(v) = result {
                self.push(v);
            }
        } else {
            self.stack.extend(returned);
        }
        Ok(())
    }

    /// Discards the current frame without producing a result, as when an
    /// error propagates out of it.
    pub(super) fn unwind_frame(&mut self) -> RunResult<()> {
        self.result = None;
        self.restore_frame()
    }

    fn restore_frame(&mut self) -> RunResult<()> {
        if self.fp == 0 {
            return Err(ErrorKind::InvalidCallFrame.into());
        }
        self.stack.truncate(self.fp);
        let Some(Value::CallFrame(frame)) = self.stack.pop() else {
            return Err(ErrorKind::InvalidCallFrame.into());
        };
        let frame = *frame;

        self.rewrite_packages(frame.symbols)?;
        self.drop_scopes_to(frame.symbols);
        self.release_ranges(frame.range_depth);

        // Receivers the callee consumed stay consumed.
        let keep = frame.this_stack.len().min(self.this_stack.len());
        self.this_stack = frame.this_stack;
        self.this_stack.truncate(keep);

        let break_here = self.break_on_return;
        self.symbols = frame.symbols;
        self.bytecode = frame.bytecode;
        self.pc = frame.pc;
        self.fp = frame.fp;
        self.line = frame.line;
        self.pkg = frame.package;
        self.block_depth = frame.block_depth;
        self.defer_stack = frame.defer_stack;
        self.single_step = frame.single_step || break_here;
        self.break_on_return = frame.break_on_return;
        self.extensions = frame.extensions;

        let fp = self.fp;
        self.try_stack.retain(|t| t.fp <= fp);
        self.arena
            .set_always(ROOT_TABLE, EXTENSIONS_VAR, Value::Bool(self.extensions))?;

        self.frame_depth = self.frame_depth.saturating_sub(1);
        self.tracer.on_return(self.frame_depth);
        log_debug!(
            LogCategory::Symbol,
            "({}) pop call frame {}, resume {} at {}",
            self.thread_id,
            frame.name,
            self.bytecode.name(),
            self.pc
        );
        Ok(())
    }

    /// Writes the exported symbols of package scopes between the current
    /// table and `stop` back into their packages.
    fn rewrite_packages(&self, stop: TableId) -> RunResult<()> {
        let next_scope = self.arena.find_next_scope(self.symbols);
        let mut current = Some(self.symbols);
        while let Some(table) = current {
            if table == stop || table == ROOT_TABLE {
                break;
            }
            let package_name = self.arena.for_package(table);
            if !package_name.is_empty() {
                let found = self
                    .arena
                    .get(next_scope, &package_name)
                    .or_else(|| self.arena.get(stop, &package_name));
                if let Some(Value::Package(package)) = found.map(Value::into_unwrapped) {
                    for (name, value) in self.arena.local_symbols(table) {
                        if !has_capitalized_name(&name) || matches!(value, Value::ByteCode(_) | Value::Constant(_)) {
                            continue;
                        }
                        log_debug!(LogCategory::Symbol, "rewrite {package_name}.{name}");
                        if let Some(inner) = package.symbols() {
                            self.arena.set_always(inner, &name, value.clone())?;
                        }
                        package.set(&name, value);
                    }
                }
            }
            current = self.arena.parent(table);
        }
        Ok(())
    }

    /// Removes the tables from the current one up to (not including) `target`.
    pub(super) fn drop_scopes_to(&mut self, target: TableId) {
        let mut current = self.symbols;
        while current != target && current != ROOT_TABLE {
            let parent = self.arena.parent(current);
            self.arena.remove(current);
            match parent {
                Some(p) => current = p,
                None => break,
            }
        }
        self.symbols = target;
    }

    /// Renders the active call frames, innermost first, at most `max` of them.
    #[must_use]
    pub fn format_frames(&self, max: Option<usize>) -> String {
        let mut out = format!("Call frames:\n  at: {:<15} {:>3}\n", self.bytecode.name(), self.line);
        let mut fp = self.fp;
        let mut count = 0;
        while fp > 0 && max.is_none_or(|m| count < m) {
            let Some(Value::CallFrame(frame)) = self.stack.get(fp - 1) else {
                break;
            };
            out.push_str(&format!("from: {:<15} {:>3}\n", frame.module, frame.line));
            fp = frame.fp;
            count += 1;
        }
        out
    }

    /// The call frames on the stack, innermost first.
    #[must_use]
    pub fn frames(&self) -> Vec<&CallFrame> {
        let mut frames = Vec::new();
        let mut fp = self.fp;
        while fp > 0 {
            let Some(Value::CallFrame(frame)) = self.stack.get(fp - 1) else {
                break;
            };
            frames.push(frame.as_ref());
            fp = frame.fp;
        }
        frames
    }
}
