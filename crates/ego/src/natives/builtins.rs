//! Builtin functions bound in the root table.

use super::{NativeCall, expect_args};
use crate::{
    channel::Channel,
    errors::{EgoError, ErrorKind, RunResult},
    value::{Array, Kind, NativeFunction, Type, Value, instance_of},
};

/// Every builtin, ready to be stored in the root table.
pub(crate) fn builtin_functions() -> Vec<NativeFunction> {
    vec![
        NativeFunction::new("len", len, 1, Some(1)),
        NativeFunction::new("append", append, 1, None),
        NativeFunction::new("make", make, 1, Some(2)),
        NativeFunction::new("close", close, 1, Some(1)),
        NativeFunction::new("delete", delete, 2, Some(2)),
        NativeFunction::new("new", new, 1, Some(1)),
        NativeFunction::new("error", error, 1, Some(1)),
    ]
}

/// Length of a string (in bytes), array, map or channel; zero for nil.
fn len(_call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    let n = match args[0].unwrapped() {
        Value::Null => 0,
        Value::String(s) => s.len(),
        Value::Array(a) => a.len(),
        Value::Map(m) => m.len(),
        Value::Channel(c) => c.len(),
        Value::Struct(s) => s.field_names().len(),
        v => return Err(EgoError::new(ErrorKind::InvalidType).context(v.kind())),
    };
    Ok(Value::from(n))
}

/// A new array holding the elements of the first argument followed by the rest.
///
/// An array argument after the first is spliced in element by element.
fn append(_call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    let (element_type, mut values) = match args[0].unwrapped() {
        Value::Array(a) => (a.element_type(), a.values()),
        Value::Null => (Type::interface(), Vec::new()),
        v => (Type::interface(), vec![v.clone()]),
    };
    for arg in &args[1..] {
        match arg.unwrapped() {
            Value::Array(a) => values.extend(a.values()),
            v => values.push(v.clone()),
        }
    }
    let result = Array::new(element_type.clone(), Vec::with_capacity(values.len()));
    for v in values {
        let v = if element_type.is_interface() { v } else { element_type.coerce(v)? };
        result.append(v)?;
    }
    Ok(Value::Array(result))
}

/// `make(type, size)`: an array of zero values, a channel, or an empty map.
fn make(_call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    let size = match args.get(1) {
        Some(v) => v.as_index()?,
        None => 0,
    };
    let t = match args[0].unwrapped() {
        Value::Type(t) => t.clone(),
        v => return Err(EgoError::new(ErrorKind::InvalidType).context(v.kind())),
    };
    match t.base_type().kind() {
        Kind::Array => {
            let element = t.base_type().value_type().cloned().unwrap_or_else(Type::interface);
            let zero = instance_of(&element);
            Ok(Value::Array(Array::filled(element, size, &zero)))
        }
        Kind::Channel => Ok(Value::Channel(Channel::new(size))),
        Kind::Map => Ok(instance_of(&t)),
        other => Err(EgoError::new(ErrorKind::InvalidType).context(other)),
    }
}

fn close(_call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    match args[0].unwrapped() {
        Value::Channel(c) => Ok(Value::Bool(c.close())),
        v => Err(EgoError::new(ErrorKind::InvalidChannel).context(v.kind())),
    }
}

/// `delete(map, key)`; reports whether the key was present.
fn delete(_call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    expect_args("delete", args, 2)?;
    match args[0].unwrapped() {
        Value::Map(m) => Ok(Value::Bool(m.delete(&args[1])?)),
        Value::Array(a) => {
            a.delete(args[1].as_index()?)?;
            Ok(Value::Bool(true))
        }
        v => Err(EgoError::new(ErrorKind::InvalidType).context(v.kind())),
    }
}

/// `new(T)` is the zero value of `T`; `new(v)` is a fresh copy of a struct
/// or container value.
fn new(_call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    Ok(match args[0].unwrapped() {
        Value::Type(t) => instance_of(t),
        Value::Struct(s) => Value::Struct(s.copy()),
        v => v.deep_copy(),
    })
}

fn error(_call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    Ok(match args[0].unwrapped() {
        Value::Error(e) => Value::Error(e.clone()),
        v => Value::error(EgoError::user(v.to_string())),
    })
}
