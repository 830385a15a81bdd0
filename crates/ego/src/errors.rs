//! Structured runtime errors.
//!
//! Every instruction handler and every fallible runtime API returns a
//! [`RunResult`]. Errors are plain values: a [`ErrorKind`] plus an optional
//! context string and source location. Control-flow signals (`Stop`,
//! `StepOver`, `SignalDebugger`, `Continue`) travel through the same channel
//! but are never intercepted by try records.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, EgoError>;

/// Kinds of errors surfaced by the virtual machine and the value model.
///
/// Uses strum derives for `Display`, `FromStr` and `Into<&'static str>`; the
/// string form matches the variant name. The human readable text lives in
/// [`ErrorKind::message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    // --- control signals ---
    /// Normal termination of a run.
    Stop,
    /// The debugger asked to step over a call.
    StepOver,
    /// Return control to the debugger frontend.
    SignalDebugger,
    /// Loop continuation signal.
    Continue,

    // --- stack and flow ---
    StackUnderflow,
    InvalidBytecodeAddress,
    InvalidCallFrame,
    TryCatchMismatch,
    InvalidCatchSet,
    UnimplementedInstruction,
    IncorrectReturnValueCount,
    WrongMode,
    Panic,

    // --- typing ---
    InvalidType,
    InvalidVarType,
    InvalidField,
    TypeMismatch,
    InvalidValue,
    NotAPointer,
    NilPointerReference,

    // --- arithmetic and indexing ---
    DivisionByZero,
    ArrayBounds,
    ArrayIndex,
    InvalidSliceIndex,
    ImmutableArray,
    ImmutableMap,

    // --- symbols and members ---
    UnknownSymbol,
    SymbolExists,
    ReadOnly,
    UnknownMember,
    UnknownPackageMember,
    SymbolNotExported,
    InvalidPackageName,
    InvalidThis,

    // --- calls ---
    ArgumentCount,
    ArgumentType,
    FunctionReturnedVoid,
    InvalidFunctionCall,

    // --- concurrency ---
    ChannelNotOpen,
    InvalidChannel,

    // --- runtime services ---
    InvalidTimer,
    InvalidLoggerName,
    InvalidFileIdentifier,
    InvalidTemplateName,
    NotAuthorized,

    /// An error created by a program or native function; the message is the context.
    User,
}

impl ErrorKind {
    /// Returns the lowercase message text for this kind.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::StepOver => "step-over",
            Self::SignalDebugger => "signal",
            Self::Continue => "continue",
            Self::StackUnderflow => "stack underflow",
            Self::InvalidBytecodeAddress => "invalid bytecode address",
            Self::InvalidCallFrame => "invalid call frame on stack",
            Self::TryCatchMismatch => "try/catch stack error",
            Self::InvalidCatchSet => "invalid catch set",
            Self::UnimplementedInstruction => "unimplemented instruction",
            Self::IncorrectReturnValueCount => "incorrect number of return values",
            Self::WrongMode => "wrong execution mode",
            Self::Panic => "panic",
            Self::InvalidType => "invalid or unsupported data type for this operation",
            Self::InvalidVarType => "invalid type for this variable",
            Self::InvalidField => "invalid field name for type",
            Self::TypeMismatch => "type mismatch",
            Self::InvalidValue => "invalid value",
            Self::NotAPointer => "not a pointer",
            Self::NilPointerReference => "nil pointer reference",
            Self::DivisionByZero => "division by zero",
            Self::ArrayBounds => "array index out of bounds",
            Self::ArrayIndex => "invalid array index",
            Self::InvalidSliceIndex => "invalid slice index",
            Self::ImmutableArray => "cannot change an immutable array",
            Self::ImmutableMap => "cannot change an immutable map",
            Self::UnknownSymbol => "unknown symbol",
            Self::SymbolExists => "symbol already exists",
            Self::ReadOnly => "invalid write to read-only item",
            Self::UnknownMember => "unknown structure member",
            Self::UnknownPackageMember => "unknown package member",
            Self::SymbolNotExported => "symbol not exported from package",
            Self::InvalidPackageName => "invalid package name",
            Self::InvalidThis => "invalid _this_ identifier",
            Self::ArgumentCount => "incorrect function argument count",
            Self::ArgumentType => "incorrect function argument type",
            Self::FunctionReturnedVoid => "function did not return a value",
            Self::InvalidFunctionCall => "invalid function call",
            Self::ChannelNotOpen => "channel not open",
            Self::InvalidChannel => "neither source or destination is a channel",
            Self::InvalidTimer => "invalid timer operation",
            Self::InvalidLoggerName => "invalid logger name",
            Self::InvalidFileIdentifier => "invalid file identifier",
            Self::InvalidTemplateName => "invalid template name",
            Self::NotAuthorized => "not authorized",
            Self::User => "user error",
        }
    }

    /// True for the control-flow signals that no try record may intercept.
    #[must_use]
    pub fn is_signal(self) -> bool {
        matches!(self, Self::Stop | Self::StepOver | Self::SignalDebugger | Self::Continue)
    }
}

/// Where an error was raised: bytecode module name and source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub module: String,
    pub line: usize,
}

/// A runtime error value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgoError {
    kind: ErrorKind,
    context: Option<String>,
    location: Option<Location>,
}

impl EgoError {
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            location: None,
        }
    }

    /// Creates a user error carrying `message` as its context.
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).context(message.into())
    }

    /// Attaches a short context string, replacing any previous one.
    #[must_use]
    pub fn context(mut self, context: impl Display) -> Self {
        self.context = Some(context.to_string());
        self
    }

    /// Attaches a location unless one is already present.
    ///
    /// The innermost location wins so an error raised deep in a call keeps
    /// pointing at the line that raised it.
    #[must_use]
    pub fn at(mut self, module: &str, line: usize) -> Self {
        if self.location.is_none() {
            self.location = Some(Location {
                module: module.to_owned(),
                line,
            });
        }
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn context_text(&self) -> Option<&str> {
        self.context.as_deref()
    }

    #[must_use]
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    #[must_use]
    pub fn is_signal(&self) -> bool {
        self.kind.is_signal()
    }

    /// Equality used when matching a raised error against a catch list.
    ///
    /// Kinds must match; user errors must also carry the same message.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        if self.kind != other.kind {
            return false;
        }
        self.kind != ErrorKind::User || self.context == other.context
    }
}

impl From<ErrorKind> for EgoError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl Display for EgoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "at {}({}), ", location.module, location.line)?;
        }
        match (&self.kind, &self.context) {
            (ErrorKind::User, Some(context)) => f.write_str(context),
            (kind, Some(context)) => write!(f, "{}: {context}", kind.message()),
            (kind, None) => f.write_str(kind.message()),
        }
    }
}

impl std::error::Error for EgoError {}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_display_with_location_and_context() {
        let err = EgoError::new(ErrorKind::UnknownSymbol).context("x").at("main", 12);
        assert_eq!(err.to_string(), "at main(12), unknown symbol: x");
    }

    #[test]
    fn test_innermost_location_is_kept() {
        let err = EgoError::new(ErrorKind::DivisionByZero).at("inner", 3).at("outer", 9);
        assert_eq!(err.location().map(|l| l.module.as_str()), Some("inner"));
    }

    #[test]
    fn test_user_errors_match_by_message() {
        let a = EgoError::user("boom");
        assert!(a.matches(&EgoError::user("boom")));
        assert!(!a.matches(&EgoError::user("bang")));
        assert!(a.matches(&EgoError::user(String::from("boom"))));
        assert_eq!(a.to_string(), "boom");
    }

    #[test]
    fn test_kind_names_round_trip_through_strum() {
        let kind: ErrorKind = "DivisionByZero".parse().unwrap();
        assert_eq!(kind, ErrorKind::DivisionByZero);
        assert!(ErrorKind::Stop.is_signal());
        assert!(!ErrorKind::Panic.is_signal());
    }
}
