//! Bytecode for the Ego VM.
//!
//! # Module Structure
//!
//! - `opcode` - Opcode enum definitions
//! - `code` - `ByteCode` buffer with emit, patch and append
//! - `disasm` - listings for the bytecode log
//! - `optimizer` - peephole optimizer and constant struct folding

pub use code::{ByteCode, INITIAL_OPCODE_SIZE, Instruction};
pub use disasm::format_instruction;
pub use opcode::Opcode;

mod code;
mod disasm;
mod opcode;
mod optimizer;
