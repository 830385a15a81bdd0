//! Opcode definitions.

use strum::{Display, EnumCount, EnumIter, EnumString, FromRepr, IntoStaticStr};

/// Instruction opcodes.
///
/// Opcodes below [`Opcode::BranchInstructions`] never carry a bytecode
/// address. Every opcode above it takes a destination address as its operand,
/// which is what lets [`ByteCode::append`](super::ByteCode::append) and
/// [`ByteCode::patch`](super::ByteCode::patch) relocate them. New branch
/// opcodes must be added after the marker.
#[repr(u16)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, IntoStaticStr, EnumCount, EnumIter, FromRepr,
)]
pub enum Opcode {
    Stop,
    AtLine,
    Add,
    AddressOf,
    And,
    ArgCheck,
    Array,
    Auth,
    BitAnd,
    BitOr,
    BitShift,
    Call,
    Coerce,
    Constant,
    Copy,
    CreateAndStore,
    Defer,
    DeRef,
    Div,
    Drop,
    DropToMarker,
    Dup,
    EntryPoint,
    Equal,
    Exp,
    Explode,
    Flatten,
    FromFile,
    GetThis,
    GetVarArgs,
    Go,
    #[strum(serialize = "GT")]
    GreaterThan,
    #[strum(serialize = "GTEQ")]
    GreaterThanOrEqual,
    Import,
    InFile,
    InPackage,
    #[strum(serialize = "LT")]
    LessThan,
    #[strum(serialize = "LTEQ")]
    LessThanOrEqual,
    Load,
    LoadIndex,
    LoadSlice,
    LoadThis,
    Log,
    MakeArray,
    MakeMap,
    Member,
    ModeCheck,
    Modulo,
    Mul,
    Negate,
    Newline,
    NoOperation,
    NotEqual,
    Or,
    Panic,
    PopPackage,
    PopScope,
    Print,
    Push,
    PushPackage,
    PushScope,
    RangeInit,
    ReadStack,
    RequiredType,
    Response,
    Return,
    Say,
    SetThis,
    StackCheck,
    StaticTyping,
    Store,
    StoreAlways,
    StoreBytecode,
    StoreChan,
    StoreGlobal,
    StoreIndex,
    StoreInto,
    StoreViaPointer,
    Struct,
    Sub,
    Swap,
    SymbolCreate,
    SymbolDelete,
    SymbolOptCreate,
    Template,
    Timer,
    TryPop,
    Wait,
    WillCatch,

    /// Boundary marker; never emitted.
    BranchInstructions,

    Branch,
    BranchTrue,
    BranchFalse,
    LocalCall,
    RangeNext,
    Try,
}

impl Opcode {
    /// True when the operand of this opcode is a bytecode address.
    #[inline]
    #[must_use]
    pub fn is_branch(self) -> bool {
        self > Self::BranchInstructions
    }

    /// The numeric value of the opcode.
    #[inline]
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Looks an opcode up by its display name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}
