//! The `ByteCode` instruction buffer and its emit/patch machinery.

use std::ops::Range;

use super::Opcode;
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    log::LogCategory,
    log_debug,
    value::{Declaration, Value},
};

/// Initial capacity of a new instruction buffer.
pub const INITIAL_OPCODE_SIZE: usize = 20;

/// One instruction: an opcode and its operand (`Null` for nullary ops).
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub operation: Opcode,
    pub operand: Value,
}

impl Instruction {
    #[must_use]
    pub fn new(operation: Opcode, operand: impl Into<Value>) -> Self {
        Self {
            operation,
            operand: operand.into(),
        }
    }

    /// An instruction with a `Null` operand.
    #[must_use]
    pub fn bare(operation: Opcode) -> Self {
        Self {
            operation,
            operand: Value::Null,
        }
    }

    /// The destination of a branch instruction, if the operand is an address.
    pub(crate) fn destination(&self) -> Option<usize> {
        if !self.operation.is_branch() {
            return None;
        }
        match self.operand.unwrapped() {
            Value::Int(i) | Value::Int64(i) => usize::try_from(*i).ok(),
            Value::Int32(i) => usize::try_from(*i).ok(),
            _ => None,
        }
    }
}

/// A function body or program: an append-only list of instructions.
///
/// Branch operands are absolute addresses within this buffer. Code is built
/// with [`emit`](Self::emit) and friends, forward branches are fixed up with
/// [`mark`](Self::mark) and [`set_address_here`](Self::set_address_here), and
/// the finished buffer is [`seal`](Self::seal)ed before it runs. Once wrapped
/// in an `Arc` and handed to a context the code is never mutated again, so
/// many contexts may run the same `ByteCode` at once.
#[derive(Debug, Clone)]
pub struct ByteCode {
    name: String,
    instructions: Vec<Instruction>,
    declaration: Option<Declaration>,
    sealed: bool,
    pub(crate) optimized: bool,
}

impl ByteCode {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            instructions: Vec::with_capacity(INITIAL_OPCODE_SIZE),
            declaration: None,
            sealed: false,
            optimized: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        name.clone_into(&mut self.name);
    }

    #[must_use]
    pub fn declaration(&self) -> Option<&Declaration> {
        self.declaration.as_ref()
    }

    pub fn set_declaration(&mut self, declaration: Declaration) {
        self.declaration = Some(declaration);
    }

    /// Appends an instruction with a `Null` operand.
    pub fn emit(&mut self, operation: Opcode) {
        self.emit_with(operation, Value::Null);
    }

    /// Appends an instruction with an operand.
    pub fn emit_with(&mut self, operation: Opcode, operand: impl Into<Value>) {
        if self.instructions.len() == self.instructions.capacity() {
            self.instructions.reserve(self.instructions.len().max(INITIAL_OPCODE_SIZE));
        }
        self.instructions.push(Instruction::new(operation, operand));
        self.sealed = false;
    }

    /// Appends an instruction whose operand is a list of values.
    pub fn emit_list(&mut self, operation: Opcode, operands: Vec<Value>) {
        self.emit_with(operation, Value::list(operands));
    }

    /// The address the next emitted instruction will occupy.
    #[inline]
    #[must_use]
    pub fn mark(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    #[inline]
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    #[must_use]
    pub fn instruction(&self, address: usize) -> Option<&Instruction> {
        self.instructions.get(address)
    }

    /// Discards spare capacity beyond the last emitted instruction.
    pub fn seal(&mut self) -> &mut Self {
        self.instructions.shrink_to_fit();
        self.sealed = true;
        self
    }

    /// Points the branch at `mark` to the current emit position.
    pub fn set_address_here(&mut self, mark: usize) -> RunResult<()> {
        let here = self.mark();
        self.set_address(mark, here)
    }

    /// Rewrites the operand of the instruction at `mark` to `address`.
    pub fn set_address(&mut self, mark: usize, address: usize) -> RunResult<()> {
        let len = self.instructions.len();
        let instruction = self
            .instructions
            .get_mut(mark)
            .ok_or_else(|| EgoError::new(ErrorKind::InvalidBytecodeAddress).context(format!("{mark} of {len}")))?;
        instruction.operand = Value::from(address);
        Ok(())
    }

    /// Appends the instructions of `other`, rebasing its branch destinations
    /// by the address where the copy starts.
    pub fn append(&mut self, other: &Self) {
        let base = self.mark();
        self.instructions.reserve(other.len());
        for instruction in &other.instructions {
            let mut copy = instruction.clone();
            if let Some(destination) = instruction.destination() {
                copy.operand = Value::from(destination + base);
            }
            self.instructions.push(copy);
        }
        self.sealed = false;
        log_debug!(LogCategory::ByteCode, "appended {} instructions from {} at {base}", other.len(), other.name);
    }

    /// Replaces `delete_count` instructions at `start` with `replacement`.
    ///
    /// Branches whose destination lies past the replaced run are moved by the
    /// change in length. Branches into the run itself are left alone; callers
    /// must not patch over an incoming branch target. Branches inside
    /// `replacement` already address the patched layout and are kept as given.
    pub fn patch(&mut self, start: usize, delete_count: usize, replacement: Vec<Instruction>) -> RunResult<()> {
        let end = start + delete_count;
        if end > self.instructions.len() {
            return Err(EgoError::new(ErrorKind::InvalidBytecodeAddress).context(format!("{start}..{end}")));
        }
        if crate::log::is_active(LogCategory::Optimizer) {
            log_debug!(LogCategory::Optimizer, "patching {} at {start}, existing code:", self.name);
            self.disasm(start..end);
        }
        let inserted = replacement.len();
        self.instructions.splice(start..end, replacement);
        let placed = start..start + inserted;
        for (address, instruction) in self.instructions.iter_mut().enumerate() {
            if placed.contains(&address) {
                continue;
            }
            if let Some(destination) = instruction.destination()
                && destination >= end
            {
                instruction.operand = Value::from(destination - delete_count + inserted);
            }
        }
        if crate::log::is_active(LogCategory::Optimizer) {
            log_debug!(LogCategory::Optimizer, "new code:");
            self.disasm(start..start + inserted);
        }
        Ok(())
    }

    /// True when some branch in this code targets an address in `range`.
    pub(crate) fn branches_into(&self, range: &Range<usize>) -> bool {
        self.instructions
            .iter()
            .filter_map(Instruction::destination)
            .any(|d| range.contains(&d))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ops(code: &ByteCode) -> Vec<Opcode> {
        code.instructions().iter().map(|i| i.operation).collect()
    }

    #[test]
    fn test_emit_and_mark() {
        let mut b = ByteCode::new("testing");
        b.emit_with(Opcode::Push, 33);
        b.emit_with(Opcode::Push, "stuff");
        b.emit(Opcode::Add);
        b.emit(Opcode::Stop);
        b.seal();
        assert_eq!(b.mark(), 4);
        assert_eq!(ops(&b), vec![Opcode::Push, Opcode::Push, Opcode::Add, Opcode::Stop]);
        assert_eq!(b.instruction(1).unwrap().operand, Value::from("stuff"));
        assert!(b.instruction(500).is_none());
    }

    #[test]
    fn test_set_address_here() {
        let mut b = ByteCode::new("setAddress");
        let mark = b.mark();
        b.emit(Opcode::Branch);
        b.emit(Opcode::Stop);
        b.set_address_here(mark).unwrap();
        assert_eq!(b.instructions()[0].operand, Value::Int(2));
        assert_eq!(
            b.set_address_here(10).unwrap_err().kind(),
            ErrorKind::InvalidBytecodeAddress
        );
    }

    #[test]
    fn test_append_rebases_branches_only() {
        let mut a = ByteCode::new("a");
        a.emit_with(Opcode::Push, 1);
        a.emit_with(Opcode::Push, 2);
        let mut b = ByteCode::new("b");
        b.emit_with(Opcode::Push, 1);
        b.emit_with(Opcode::Branch, 0);
        a.append(&b);
        assert_eq!(a.instructions()[2].operand, Value::Int(1));
        assert_eq!(a.instructions()[3].operand, Value::Int(2));
    }

    #[test]
    fn test_patch_moves_later_destinations() {
        let mut b = ByteCode::new("patch");
        b.emit_with(Opcode::Branch, 4);
        b.emit_with(Opcode::Push, 1);
        b.emit_with(Opcode::Push, 2);
        b.emit(Opcode::Add);
        b.emit(Opcode::Stop);
        b.patch(1, 3, vec![Instruction::new(Opcode::Push, 3)]).unwrap();
        assert_eq!(ops(&b), vec![Opcode::Branch, Opcode::Push, Opcode::Stop]);
        assert_eq!(b.instructions()[0].operand, Value::Int(2));
    }

    #[test]
    fn test_patch_keeps_replacement_destinations() {
        let mut b = ByteCode::new("patch");
        b.emit_with(Opcode::Push, 1);
        b.emit_with(Opcode::Push, 2);
        b.emit(Opcode::Add);
        b.emit(Opcode::Drop);
        b.emit(Opcode::Stop);
        b.patch(0, 3, vec![Instruction::new(Opcode::Branch, 4)]).unwrap();
        assert_eq!(ops(&b), vec![Opcode::Branch, Opcode::Drop, Opcode::Stop]);
        assert_eq!(b.instructions()[0].operand, Value::Int(4));
    }

    #[test]
    fn test_patch_rejects_out_of_range() {
        let mut b = ByteCode::new("patch");
        b.emit(Opcode::Stop);
        assert_eq!(
            b.patch(0, 3, Vec::new()).unwrap_err().kind(),
            ErrorKind::InvalidBytecodeAddress
        );
    }
}
