use std::{
    fmt::{self, Display},
    sync::Arc,
};

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use super::{Array, Map, Struct, Value};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    sync::{Mutex, WaitGroup},
};

/// The tag of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Kind {
    Undefined,
    #[strum(serialize = "nil")]
    Null,
    Bool,
    Byte,
    Int32,
    Int,
    Int64,
    Float32,
    Float64,
    String,
    Error,
    Array,
    Map,
    Struct,
    Package,
    #[strum(serialize = "chan")]
    Channel,
    #[strum(serialize = "sync.Mutex")]
    Mutex,
    #[strum(serialize = "sync.WaitGroup")]
    WaitGroup,
    #[strum(serialize = "ptr")]
    Pointer,
    #[strum(serialize = "func")]
    Function,
    Type,
    #[strum(serialize = "marker")]
    StackMarker,
    #[strum(serialize = "frame")]
    CallFrame,
    #[strum(serialize = "interface")]
    Interface,
    #[strum(serialize = "...")]
    VarArgs,
    #[strum(serialize = "usertype")]
    UserDefined,
}

#[derive(Debug)]
struct TypeDef {
    kind: Kind,
    name: Option<String>,
    package: Option<String>,
    key_type: Option<Type>,
    /// Element type of arrays and pointers, value type of maps, base type of user types.
    value_type: Option<Type>,
    fields: Vec<(String, Type)>,
    functions: RwLock<AHashMap<String, Value>>,
}

/// A type descriptor.
///
/// Cheap to clone; clones share the receiver function table so methods added
/// after a type is declared are visible through every copy.
#[derive(Debug, Clone)]
pub struct Type(Arc<TypeDef>);

impl Type {
    fn build(kind: Kind, key_type: Option<Self>, value_type: Option<Self>, fields: Vec<(String, Self)>) -> Self {
        Self(Arc::new(TypeDef {
            kind,
            name: None,
            package: None,
            key_type,
            value_type,
            fields,
            functions: RwLock::new(AHashMap::new()),
        }))
    }

    /// A plain type of the given kind.
    #[must_use]
    pub fn of_kind(kind: Kind) -> Self {
        Self::build(kind, None, None, Vec::new())
    }

    #[must_use]
    pub fn interface() -> Self {
        Self::of_kind(Kind::Interface)
    }

    #[must_use]
    pub fn int() -> Self {
        Self::of_kind(Kind::Int)
    }

    #[must_use]
    pub fn string() -> Self {
        Self::of_kind(Kind::String)
    }

    #[must_use]
    pub fn bool() -> Self {
        Self::of_kind(Kind::Bool)
    }

    #[must_use]
    pub fn float64() -> Self {
        Self::of_kind(Kind::Float64)
    }

    #[must_use]
    pub fn array_of(element: Self) -> Self {
        Self::build(Kind::Array, None, Some(element), Vec::new())
    }

    #[must_use]
    pub fn map_of(key: Self, value: Self) -> Self {
        Self::build(Kind::Map, Some(key), Some(value), Vec::new())
    }

    #[must_use]
    pub fn pointer_to(target: Self) -> Self {
        Self::build(Kind::Pointer, None, Some(target), Vec::new())
    }

    /// A struct type; fails `InvalidField` on a duplicate field name.
    pub fn structure(fields: Vec<(String, Self)>) -> RunResult<Self> {
        for (i, (name, _)) in fields.iter().enumerate() {
            if fields[..i].iter().any(|(n, _)| n == name) {
                return Err(EgoError::new(ErrorKind::InvalidField).context(name));
            }
        }
        Ok(Self::build(Kind::Struct, None, None, fields))
    }

    /// A named user type over `base`, optionally declared in `package`.
    #[must_use]
    pub fn user_defined(name: &str, package: Option<&str>, base: Self) -> Self {
        let mut def = TypeDef {
            kind: Kind::UserDefined,
            name: Some(name.to_owned()),
            package: package.map(str::to_owned),
            key_type: None,
            value_type: None,
            fields: Vec::new(),
            functions: RwLock::new(AHashMap::new()),
        };
        def.fields = base.0.fields.clone();
        def.value_type = Some(base);
        Self(Arc::new(def))
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.0.kind
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    #[must_use]
    pub fn package(&self) -> Option<&str> {
        self.0.package.as_deref()
    }

    #[must_use]
    pub fn key_type(&self) -> Option<&Self> {
        self.0.key_type.as_ref()
    }

    #[must_use]
    pub fn value_type(&self) -> Option<&Self> {
        self.0.value_type.as_ref()
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, Self)] {
        &self.0.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Self> {
        self.0.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.0.kind == Kind::Interface
    }

    /// Follows user-defined types down to the underlying type.
    #[must_use]
    pub fn base_type(&self) -> &Self {
        let mut t = self;
        while t.0.kind == Kind::UserDefined {
            match &t.0.value_type {
                Some(base) => t = base,
                None => break,
            }
        }
        t
    }

    /// True when both handles describe the very same declaration.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Type compatibility as used by static checks. `Interface` on either side matches.
    #[must_use]
    pub fn is_type(&self, other: &Self) -> bool {
        if self.is_interface() || other.is_interface() || self.ptr_eq(other) {
            return true;
        }
        if self.0.kind != other.0.kind {
            return false;
        }
        match self.0.kind {
            Kind::UserDefined => self.0.name == other.0.name && self.0.package == other.0.package,
            Kind::Array | Kind::Pointer => match (&self.0.value_type, &other.0.value_type) {
                (Some(a), Some(b)) => a.is_type(b),
                _ => true,
            },
            Kind::Map => {
                let keys = match (&self.0.key_type, &other.0.key_type) {
                    (Some(a), Some(b)) => a.is_type(b),
                    _ => true,
                };
                let values = match (&self.0.value_type, &other.0.value_type) {
                    (Some(a), Some(b)) => a.is_type(b),
                    _ => true,
                };
                keys && values
            }
            Kind::Struct => {
                let (a, b) = (&self.0.fields, &other.0.fields);
                a.is_empty()
                    || b.is_empty()
                    || (a.len() == b.len()
                        && a.iter().zip(b).all(|((na, ta), (nb, tb))| na == nb && ta.is_type(tb)))
            }
            _ => true,
        }
    }

    /// Registers a receiver function.
    pub fn add_function(&self, name: &str, function: Value) {
        self.0.functions.write().insert(name.to_owned(), function);
    }

    /// Looks up a receiver function, falling back through the base of a user type.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<Value> {
        if let Some(f) = self.0.functions.read().get(name) {
            return Some(f.clone());
        }
        match (self.0.kind, &self.0.value_type) {
            (Kind::UserDefined, Some(base)) => base.function(name),
            _ => None,
        }
    }

    /// Sorted receiver function names.
    #[must_use]
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.functions.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Applies this type's coercion rule to `value`.
    pub fn coerce(&self, value: Value) -> RunResult<Value> {
        let value = value.into_unwrapped();
        match self.0.kind {
            Kind::Interface | Kind::Undefined | Kind::Channel => Ok(value),
            Kind::Byte | Kind::Int32 | Kind::Int | Kind::Int64 | Kind::Float32 | Kind::Float64 | Kind::String | Kind::Bool => {
                super::coerce::coerce_scalar(value, self.0.kind)
            }
            Kind::Error => match value {
                Value::Error(_) | Value::Null => Ok(value),
                other => Ok(Value::error(EgoError::user(other.to_string()))),
            },
            Kind::Array => match value {
                Value::Array(_) => Ok(value),
                Value::Null => Ok(Value::Array(Array::new(self.element_type(), Vec::new()))),
                scalar => {
                    let element = self.element_type();
                    let scalar = element.coerce(scalar)?;
                    Ok(Value::Array(Array::new(element, vec![scalar])))
                }
            },
            Kind::Map => match value {
                Value::Map(_) => Ok(value),
                other => Err(EgoError::new(ErrorKind::InvalidType).context(other.kind())),
            },
            Kind::Struct => match value {
                Value::Struct(_) | Value::Map(_) => Ok(value),
                other => Err(EgoError::new(ErrorKind::InvalidType).context(other.kind())),
            },
            Kind::UserDefined => match &value {
                Value::Struct(s) if s.type_def().is_type(self) => Ok(value),
                _ => match &self.0.value_type {
                    Some(base) => base.coerce(value),
                    None => Ok(value),
                },
            },
            Kind::Pointer => match value {
                Value::Pointer(_) | Value::Null => Ok(value),
                other => Err(EgoError::new(ErrorKind::NotAPointer).context(other.kind())),
            },
            Kind::Mutex | Kind::WaitGroup | Kind::Function | Kind::Type | Kind::Package | Kind::Null => {
                if value.kind() == self.0.kind || value.is_null() {
                    Ok(value)
                } else {
                    Err(EgoError::new(ErrorKind::InvalidType).context(value.kind()))
                }
            }
            Kind::StackMarker | Kind::CallFrame | Kind::VarArgs => {
                Err(EgoError::new(ErrorKind::InvalidType).context(self.0.kind))
            }
        }
    }

    fn element_type(&self) -> Self {
        self.0.value_type.clone().unwrap_or_else(Self::interface)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.kind {
            Kind::UserDefined => {
                if let Some(pkg) = &self.0.package {
                    write!(f, "{pkg}.")?;
                }
                f.write_str(self.0.name.as_deref().unwrap_or("type"))
            }
            Kind::Array => write!(f, "[]{}", self.element_type()),
            Kind::Pointer => write!(f, "*{}", self.element_type()),
            Kind::Map => write!(
                f,
                "map[{}]{}",
                self.0.key_type.clone().unwrap_or_else(Self::interface),
                self.element_type()
            ),
            Kind::Struct => {
                f.write_str("struct{")?;
                for (i, (name, t)) in self.0.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name} {t}")?;
                }
                f.write_str("}")
            }
            Kind::Interface => f.write_str("interface{}"),
            kind => write!(f, "{kind}"),
        }
    }
}

/// Zero value of a type.
#[must_use]
pub fn instance_of(t: &Type) -> Value {
    match t.kind() {
        Kind::Bool => Value::Bool(false),
        Kind::Byte => Value::Byte(0),
        Kind::Int32 => Value::Int32(0),
        Kind::Int => Value::Int(0),
        Kind::Int64 => Value::Int64(0),
        Kind::Float32 => Value::Float32(0.0),
        Kind::Float64 => Value::Float64(0.0),
        Kind::String => Value::String(String::new()),
        Kind::Array => Value::Array(Array::new(t.element_type(), Vec::new())),
        Kind::Map => Value::Map(Map::new(
            t.key_type().cloned().unwrap_or_else(Type::interface),
            t.element_type(),
        )),
        Kind::Struct => Value::Struct(Struct::new(t)),
        Kind::UserDefined => match t.base_type().kind() {
            Kind::Struct => Value::Struct(Struct::new(t)),
            _ => instance_of(t.base_type()),
        },
        Kind::Mutex => Value::Mutex(Mutex::new()),
        Kind::WaitGroup => Value::WaitGroup(WaitGroup::new()),
        Kind::Type => Value::Type(Type::interface()),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_type_strings() {
        let t = Type::map_of(Type::string(), Type::array_of(Type::int()));
        assert_eq!(t.to_string(), "map[string][]int");
        let s = Type::structure(vec![("a".into(), Type::int()), ("b".into(), Type::string())]).unwrap();
        assert_eq!(s.to_string(), "struct{a int, b string}");
        let u = Type::user_defined("Point", Some("geo"), s);
        assert_eq!(u.to_string(), "geo.Point");
    }

    #[test]
    fn test_kind_names_parse_back() {
        assert_eq!("type".parse::<Kind>().unwrap(), Kind::Type);
        assert_eq!("usertype".parse::<Kind>().unwrap(), Kind::UserDefined);
        assert_eq!("interface".parse::<Kind>().unwrap(), Kind::Interface);
        assert_eq!(Type::interface().to_string(), "interface{}");
        assert_eq!(Type::map_of(Type::string(), Type::interface()).to_string(), "map[string]interface{}");
    }

    #[test]
    fn test_duplicate_struct_field_is_invalid() {
        let err = Type::structure(vec![("a".into(), Type::int()), ("a".into(), Type::int())]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);
    }

    #[test]
    fn test_receiver_lookup_falls_back_to_base() {
        let base = Type::user_defined("Base", None, Type::int());
        base.add_function("Double", Value::from("base double"));
        let derived = Type::user_defined("Derived", None, base.clone());
        assert_eq!(derived.function("Double"), Some(Value::from("base double")));
        assert_eq!(derived.function("Missing"), None);
    }

    #[test]
    fn test_interface_accepts_anything() {
        assert!(Type::interface().is_type(&Type::string()));
        assert!(Type::array_of(Type::interface()).is_type(&Type::array_of(Type::int())));
        assert!(!Type::int().is_type(&Type::string()));
    }

    #[test]
    fn test_coercion_rules() {
        assert_eq!(Type::int().coerce(Value::from("42")).unwrap(), Value::Int(42));
        assert_eq!(Type::string().coerce(Value::Float64(1.5)).unwrap(), Value::from("1.5"));
        assert_eq!(Type::bool().coerce(Value::Int(3)).unwrap(), Value::Bool(true));
        let wrapped = Type::array_of(Type::int()).coerce(Value::Int(9)).unwrap();
        assert_eq!(wrapped.to_string(), "[9]");
        let err = Type::map_of(Type::string(), Type::int()).coerce(Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidType);
        assert_eq!(Type::of_kind(Kind::Channel).coerce(Value::Int(1)).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(instance_of(&Type::float64()), Value::Float64(0.0));
        let point = Type::structure(vec![("x".into(), Type::int())]).unwrap();
        let v = instance_of(&point);
        assert_eq!(v.to_string(), "{ x: 0 }");
    }
}
