//! The runtime value domain.
//!
//! [`Value`] is a single tagged enum. Scalars are stored inline; containers
//! (arrays, maps, structs, packages) are reference counted handles around
//! interior-mutable storage so cloning a `Value` shares the container, the
//! way assignment shares a slice or map in the language. Use
//! [`Value::deep_copy`] where value semantics are needed.

mod array;
mod coerce;
mod function;
mod json;
mod map;
mod package;
mod structs;
mod types;

use std::{
    fmt::{self, Display, Write as _},
    sync::Arc,
};

pub use array::Array;
pub use coerce::{is_numeric, normalize};
pub use function::{Declaration, Function, NativeFn, NativeFunction, Parameter};
pub use json::to_json;
pub use map::Map;
pub use package::Package;
pub use structs::Struct;
pub use types::{Kind, Type, instance_of};

use crate::{
    bytecode::ByteCode,
    channel::Channel,
    errors::{EgoError, ErrorKind, RunResult},
    symbols::TableId,
    sync::{Mutex, WaitGroup},
    vm::CallFrame,
};

/// Address of a symbol-table slot, produced by `AddressOf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub table: TableId,
    pub slot: usize,
}

/// Sentinel placed on the operand stack to bracket a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMarker {
    pub desc: String,
}

impl StackMarker {
    #[must_use]
    pub fn new(desc: &str) -> Self {
        Self { desc: desc.to_owned() }
    }
}

/// A runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Byte(u8),
    Int32(i32),
    Int(i64),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Error(Box<EgoError>),
    Array(Array),
    Map(Map),
    Struct(Struct),
    Package(Package),
    Channel(Channel),
    Mutex(Mutex),
    WaitGroup(WaitGroup),
    Pointer(Pointer),
    Function(Function),
    ByteCode(Arc<ByteCode>),
    Type(Type),
    StackMarker(StackMarker),
    CallFrame(Box<CallFrame>),
    /// Read-only wrapper produced by constant declarations.
    Constant(Box<Value>),
}

impl Value {
    /// Strips any `Constant` wrappers.
    #[must_use]
    pub fn unwrapped(&self) -> &Self {
        let mut v = self;
        while let Self::Constant(inner) = v {
            v = inner;
        }
        v
    }

    /// Owned form of [`Value::unwrapped`].
    #[must_use]
    pub fn into_unwrapped(self) -> Self {
        match self {
            Self::Constant(inner) => inner.into_unwrapped(),
            other => other,
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        match self.unwrapped() {
            Self::Null => Kind::Null,
            Self::Bool(_) => Kind::Bool,
            Self::Byte(_) => Kind::Byte,
            Self::Int32(_) => Kind::Int32,
            Self::Int(_) => Kind::Int,
            Self::Int64(_) => Kind::Int64,
            Self::Float32(_) => Kind::Float32,
            Self::Float64(_) => Kind::Float64,
            Self::String(_) => Kind::String,
            Self::Error(_) => Kind::Error,
            Self::Array(_) => Kind::Array,
            Self::Map(_) => Kind::Map,
            Self::Struct(_) => Kind::Struct,
            Self::Package(_) => Kind::Package,
            Self::Channel(_) => Kind::Channel,
            Self::Mutex(_) => Kind::Mutex,
            Self::WaitGroup(_) => Kind::WaitGroup,
            Self::Pointer(_) => Kind::Pointer,
            Self::Function(_) | Self::ByteCode(_) => Kind::Function,
            Self::Type(_) => Kind::Type,
            Self::StackMarker(_) => Kind::StackMarker,
            Self::CallFrame(_) => Kind::CallFrame,
            Self::Constant(_) => unreachable!("constant wrappers are stripped"),
        }
    }

    /// The full type of this value.
    #[must_use]
    pub fn type_of(&self) -> Type {
        match self.unwrapped() {
            Self::Array(a) => Type::array_of(a.element_type()),
            Self::Map(m) => Type::map_of(m.key_type(), m.value_type()),
            Self::Struct(s) => s.type_def(),
            Self::Pointer(_) => Type::pointer_to(Type::interface()),
            v => Type::of_kind(v.kind()),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.unwrapped(), Self::Null)
    }

    #[must_use]
    pub fn is_marker(&self) -> bool {
        matches!(self, Self::StackMarker(_))
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self.unwrapped() {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness as used by conditional branches.
    ///
    /// Strings are true only when they spell `true`; numbers when non-zero.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self.unwrapped() {
            Self::Bool(b) => *b,
            Self::Byte(i) => *i != 0,
            Self::Int32(i) => *i != 0,
            Self::Int(i) | Self::Int64(i) => *i != 0,
            Self::Float32(f) => *f != 0.0,
            Self::Float64(f) => *f != 0.0,
            Self::String(s) => s.trim().eq_ignore_ascii_case("true"),
            Self::Null => false,
            Self::Array(a) => !a.is_empty(),
            Self::Map(m) => m.len() > 0,
            _ => true,
        }
    }

    /// Integer view of a numeric, bool or numeric string value.
    pub fn as_int(&self) -> RunResult<i64> {
        match self.unwrapped() {
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Byte(i) => Ok(i64::from(*i)),
            Self::Int32(i) => Ok(i64::from(*i)),
            Self::Int(i) | Self::Int64(i) => Ok(*i),
            Self::Float32(f) => Ok(f.trunc() as i64),
            Self::Float64(f) => Ok(f.trunc() as i64),
            Self::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| EgoError::new(ErrorKind::InvalidValue).context(s)),
            v => Err(EgoError::new(ErrorKind::InvalidType).context(v.kind())),
        }
    }

    /// Float view of a numeric, bool or numeric string value.
    pub fn as_float(&self) -> RunResult<f64> {
        match self.unwrapped() {
            Self::Float32(f) => Ok(f64::from(*f)),
            Self::Float64(f) => Ok(*f),
            Self::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| EgoError::new(ErrorKind::InvalidValue).context(s)),
            v => v.as_int().map(|i| i as f64),
        }
    }

    /// Index view used by array and slice operations.
    pub fn as_index(&self) -> RunResult<usize> {
        if !is_numeric(self.kind()) {
            return Err(EgoError::new(ErrorKind::ArrayIndex).context(self.kind()));
        }
        let i = self.as_int()?;
        usize::try_from(i).map_err(|_| EgoError::new(ErrorKind::ArrayIndex).context(i))
    }

    /// Builds an array of interface values from a list.
    #[must_use]
    pub fn list(values: Vec<Self>) -> Self {
        Self::Array(Array::new(Type::interface(), values))
    }

    /// Builds an error value.
    #[must_use]
    pub fn error(err: EgoError) -> Self {
        Self::Error(Box::new(err))
    }

    /// Deep copy: containers get fresh storage, recursively.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        match self {
            Self::Array(a) => Self::Array(a.deep_copy()),
            Self::Map(m) => Self::Map(m.deep_copy()),
            Self::Struct(s) => Self::Struct(s.deep_copy()),
            Self::Constant(inner) => Self::Constant(Box::new(inner.deep_copy())),
            other => other.clone(),
        }
    }

    /// Structural equality after numeric normalization.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        let (a, b) = (self.unwrapped(), other.unwrapped());
        match (a, b) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::String(x), Self::String(y)) => x == y,
            (Self::Bool(x), Self::Bool(y)) => x == y,
            (Self::Error(x), Self::Error(y)) => x.matches(y),
            (Self::Array(x), Self::Array(y)) => x.equals(y),
            (Self::Map(x), Self::Map(y)) => x.equals(y),
            (Self::Struct(x), Self::Struct(y)) => x.equals(y),
            (Self::Package(x), Self::Package(y)) => x.ptr_eq(y),
            (Self::Channel(x), Self::Channel(y)) => x.id() == y.id(),
            (Self::Mutex(x), Self::Mutex(y)) => x.ptr_eq(y),
            (Self::WaitGroup(x), Self::WaitGroup(y)) => x.ptr_eq(y),
            (Self::Pointer(x), Self::Pointer(y)) => x == y,
            (Self::ByteCode(x), Self::ByteCode(y)) => Arc::ptr_eq(x, y) || x.name() == y.name(),
            (Self::Function(x), Self::Function(y)) => x.name() == y.name(),
            (Self::Type(x), Self::Type(y)) => x.is_type(y) && y.is_type(x),
            (Self::StackMarker(x), Self::StackMarker(y)) => x == y,
            (x, y) if is_numeric(x.kind()) && is_numeric(y.kind()) => match normalize(x.clone(), y.clone()) {
                Ok((l, r)) => numeric_eq(&l, &r),
                Err(_) => false,
            },
            _ => false,
        }
    }

    /// Display form used inside containers: strings are quoted.
    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unwrapped() {
            Self::String(s) => write!(f, "{s:?}"),
            v => write!(f, "{v}"),
        }
    }
}

#[expect(clippy::float_cmp, reason = "language equality is exact")]
fn numeric_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Byte(x), Value::Byte(y)) => x == y,
        (Value::Int32(x), Value::Int32(y)) => x == y,
        (Value::Int(x), Value::Int(y)) | (Value::Int64(x), Value::Int64(y)) => x == y,
        (Value::Float32(x), Value::Float32(y)) => x == y,
        (Value::Float64(x), Value::Float64(y)) => x == y,
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Byte(i) => write!(f, "{i}"),
            Self::Int32(i) => write!(f, "{i}"),
            Self::Int(i) | Self::Int64(i) => write!(f, "{i}"),
            Self::Float32(x) => write!(f, "{x}"),
            Self::Float64(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Error(e) => write!(f, "{e}"),
            Self::Array(a) => {
                f.write_char('[')?;
                for (i, v) in a.values().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    v.fmt_nested(f)?;
                }
                f.write_char(']')
            }
            Self::Map(m) => {
                write!(f, "map[{}]{}{{", m.key_type(), m.value_type())?;
                for (i, key) in m.keys().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    key.fmt_nested(f)?;
                    f.write_str(": ")?;
                    m.get(key).ok().flatten().unwrap_or_default().fmt_nested(f)?;
                }
                f.write_char('}')
            }
            Self::Struct(s) => {
                f.write_str("{ ")?;
                for (i, name) in s.field_names().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: ")?;
                    s.get(name).unwrap_or_default().fmt_nested(f)?;
                }
                f.write_str(" }")
            }
            Self::Package(p) => write!(f, "package {}", p.name()),
            Self::Channel(c) => write!(f, "{c}"),
            Self::Mutex(_) => f.write_str("sync.Mutex"),
            Self::WaitGroup(_) => f.write_str("sync.WaitGroup"),
            Self::Pointer(p) => write!(f, "&{}[{}]", p.table, p.slot),
            Self::Function(func) => write!(f, "func {}", func.name()),
            Self::ByteCode(bc) => write!(f, "func {}", bc.name()),
            Self::Type(t) => write!(f, "{t}"),
            Self::StackMarker(m) => write!(f, "<{}>", m.desc),
            Self::CallFrame(frame) => write!(f, "<frame {}>", frame.name),
            Self::Constant(inner) => write!(f, "{inner}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::Byte(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<EgoError> for Value {
    fn from(v: EgoError) -> Self {
        Self::error(v)
    }
}

impl From<ErrorKind> for Value {
    fn from(v: ErrorKind) -> Self {
        Self::error(EgoError::new(v))
    }
}

impl From<Type> for Value {
    fn from(v: Type) -> Self {
        Self::Type(v)
    }
}

impl From<Arc<ByteCode>> for Value {
    fn from(v: Arc<ByteCode>) -> Self {
        Self::ByteCode(v)
    }
}

impl From<ByteCode> for Value {
    fn from(v: ByteCode) -> Self {
        Self::ByteCode(Arc::new(v))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_numeric_equality_widens() {
        assert!(Value::Int32(3).equals(&Value::Float64(3.0)));
        assert!(Value::Byte(7).equals(&Value::Int(7)));
        assert!(!Value::Int(7).equals(&Value::from("7x")));
    }

    #[test]
    fn test_constant_is_transparent() {
        let c = Value::Constant(Box::new(Value::Int(4)));
        assert_eq!(c.kind(), Kind::Int);
        assert!(c.equals(&Value::Int(4)));
        assert_eq!(c.into_unwrapped(), Value::Int(4));
    }

    #[test]
    fn test_display_nested_strings_are_quoted() {
        let v = Value::list(vec![Value::from("a"), Value::Int(1), Value::Null]);
        assert_eq!(v.to_string(), r#"["a", 1, nil]"#);
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::from("TRUE").truthy());
        assert!(!Value::from("yes").truthy());
        assert!(!Value::Float64(0.0).truthy());
        assert!(Value::Int(-1).truthy());
        assert!(!Value::Null.truthy());
    }

    #[test]
    fn test_deep_copy_detaches_storage() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = a.deep_copy();
        if let Value::Array(arr) = &b {
            arr.append(Value::Int(2)).unwrap();
        }
        assert_eq!(a.to_string(), "[1]");
        assert_eq!(b.to_string(), "[1, 2]");
    }
}
