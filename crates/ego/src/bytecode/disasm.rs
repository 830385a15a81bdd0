//! Human readable listings of bytecode.

use std::{fmt::Write as _, ops::Range, sync::OnceLock};

use strum::IntoEnumIterator;

use super::{ByteCode, Instruction, Opcode};
use crate::{
    log::{self, LogCategory},
    log_debug,
    value::Value,
};

/// Width of the longest opcode name, used to align operands.
fn name_width() -> usize {
    static WIDTH: OnceLock<usize> = OnceLock::new();
    *WIDTH.get_or_init(|| Opcode::iter().map(|op| op.to_string().len()).max().unwrap_or(0))
}

/// Formats one instruction as `(name, operand)`.
///
/// The name is padded to a common width; branch operands get an `@` prefix
/// and control characters in the operand are escaped.
#[must_use]
pub fn format_instruction(instruction: &Instruction) -> (String, String) {
    let name = format!("{:<width$}", instruction.operation.to_string(), width = name_width());
    let mut operand = match &instruction.operand {
        Value::Null => String::new(),
        Value::String(s) => format!("{s:?}"),
        other => other.to_string().replace('\n', "\\n").replace('\t', "\\t"),
    };
    if instruction.operation.is_branch() {
        operand.insert(0, '@');
    }
    (name, operand)
}

impl ByteCode {
    /// Logs a listing of the instructions in `range` under the `ByteCode` category.
    pub fn disasm(&self, range: Range<usize>) {
        if !log::is_active(LogCategory::ByteCode) && !log::is_active(LogCategory::Optimizer) {
            return;
        }
        for line in self.listing(range).lines() {
            log_debug!(LogCategory::ByteCode, "{line}");
        }
    }

    /// Renders `range` as text, one `NNNN: | Op operand` line per instruction.
    ///
    /// Instructions between `PushScope` and `PopScope` are indented one `| `
    /// per open scope.
    #[must_use]
    pub fn listing(&self, range: Range<usize>) -> String {
        let end = range.end.min(self.len());
        let mut out = String::new();
        let mut depth = 0usize;
        for (address, instruction) in self.instructions().iter().enumerate().take(end) {
            if instruction.operation == Opcode::PopScope {
                depth = depth.saturating_sub(1);
            }
            if address >= range.start {
                let (name, operand) = format_instruction(instruction);
                let _ = writeln!(out, "{address:4}: {}{}", "| ".repeat(depth), format!("{name} {operand}").trim_end());
            }
            if instruction.operation == Opcode::PushScope {
                depth += 1;
            }
        }
        out
    }

    /// A compact one-line form, e.g. `[Push 1,Push 2,Add]`.
    #[must_use]
    pub fn format(&self) -> String {
        let mut out = String::from("[");
        for (n, instruction) in self.instructions().iter().enumerate() {
            if n > 0 {
                out.push(',');
            }
            let (name, operand) = format_instruction(instruction);
            out.push_str(name.trim_end());
            if !operand.is_empty() {
                out.push(' ');
                out.push_str(&operand);
            }
        }
        out.push(']');
        out
    }
}
