//! Receiver methods of the native value kinds.

use super::NativeCall;
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    value::{Kind, NativeFn, Value},
};

/// `(kind, name, function, min args, max args)`.
pub(super) type MethodSpec = (Kind, &'static str, NativeFn, usize, Option<usize>);

pub(super) static RECEIVER_METHODS: &[MethodSpec] = &[
    (Kind::WaitGroup, "Add", waitgroup_add, 1, Some(1)),
    (Kind::WaitGroup, "Done", waitgroup_done, 0, Some(0)),
    (Kind::WaitGroup, "Wait", waitgroup_wait, 0, Some(0)),
    (Kind::Mutex, "Lock", mutex_lock, 0, Some(0)),
    (Kind::Mutex, "Unlock", mutex_unlock, 0, Some(0)),
    (Kind::Channel, "Close", channel_close, 0, Some(0)),
    (Kind::Channel, "Len", channel_len, 0, Some(0)),
    (Kind::Channel, "IsOpen", channel_is_open, 0, Some(0)),
    (Kind::Array, "Len", array_len, 0, Some(0)),
    (Kind::Array, "Append", array_append, 0, None),
    (Kind::Map, "Keys", map_keys, 0, Some(0)),
    (Kind::Map, "Len", map_len, 0, Some(0)),
    (Kind::Type, "String", type_string, 0, Some(0)),
];

fn wrong_receiver(call: &NativeCall<'_>) -> EgoError {
    match call.this() {
        Ok(v) => EgoError::new(ErrorKind::InvalidThis).context(v.kind()),
        Err(e) => e,
    }
}

fn waitgroup_add(call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    let Value::WaitGroup(wg) = call.this()? else {
        return Err(wrong_receiver(call));
    };
    wg.add(args[0].as_int()?)?;
    Ok(Value::Null)
}

fn waitgroup_done(call: &NativeCall<'_>, _args: &[Value]) -> RunResult<Value> {
    let Value::WaitGroup(wg) = call.this()? else {
        return Err(wrong_receiver(call));
    };
    wg.done()?;
    Ok(Value::Null)
}

fn waitgroup_wait(call: &NativeCall<'_>, _args: &[Value]) -> RunResult<Value> {
    let Value::WaitGroup(wg) = call.this()? else {
        return Err(wrong_receiver(call));
    };
    wg.wait();
    Ok(Value::Null)
}

fn mutex_lock(call: &NativeCall<'_>, _args: &[Value]) -> RunResult<Value> {
    let Value::Mutex(m) = call.this()? else {
        return Err(wrong_receiver(call));
    };
    m.lock();
    Ok(Value::Null)
}

fn mutex_unlock(call: &NativeCall<'_>, _args: &[Value]) -> RunResult<Value> {
    let Value::Mutex(m) = call.this()? else {
        return Err(wrong_receiver(call));
    };
    m.unlock()?;
    Ok(Value::Null)
}

fn channel_close(call: &NativeCall<'_>, _args: &[Value]) -> RunResult<Value> {
    let Value::Channel(ch) = call.this()? else {
        return Err(wrong_receiver(call));
    };
    Ok(Value::Bool(ch.close()))
}

fn channel_len(call: &NativeCall<'_>, _args: &[Value]) -> RunResult<Value> {
    let Value::Channel(ch) = call.this()? else {
        return Err(wrong_receiver(call));
    };
    Ok(Value::from(ch.len()))
}

fn channel_is_open(call: &NativeCall<'_>, _args: &[Value]) -> RunResult<Value> {
    let Value::Channel(ch) = call.this()? else {
        return Err(wrong_receiver(call));
    };
    Ok(Value::Bool(ch.is_open()))
}

fn array_len(call: &NativeCall<'_>, _args: &[Value]) -> RunResult<Value> {
    let Value::Array(a) = call.this()? else {
        return Err(wrong_receiver(call));
    };
    Ok(Value::from(a.len()))
}

/// Appends in place and returns the receiver.
fn array_append(call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    let Value::Array(a) = call.this()? else {
        return Err(wrong_receiver(call));
    };
    for v in args {
        a.append(v.clone())?;
    }
    Ok(Value::Array(a.clone()))
}

fn map_keys(call: &NativeCall<'_>, _args: &[Value]) -> RunResult<Value> {
    let Value::Map(m) = call.this()? else {
        return Err(wrong_receiver(call));
    };
    Ok(Value::Array(crate::value::Array::new(m.key_type(), m.keys())))
}

fn map_len(call: &NativeCall<'_>, _args: &[Value]) -> RunResult<Value> {
    let Value::Map(m) = call.this()? else {
        return Err(wrong_receiver(call));
    };
    Ok(Value::from(m.len()))
}

fn type_string(call: &NativeCall<'_>, _args: &[Value]) -> RunResult<Value> {
    match call.this()? {
        Value::Type(t) => Ok(Value::String(t.to_string())),
        _ => Err(wrong_receiver(call)),
    }
}
