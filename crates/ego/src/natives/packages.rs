//! Functions of the preloaded `sort` and `strings` packages.

use super::NativeCall;
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    value::{Array, NativeFunction, Value},
};

pub(crate) fn sort_functions() -> Vec<NativeFunction> {
    vec![
        NativeFunction::new("Slice", sort_slice, 2, Some(2)),
        NativeFunction::new("Ints", sort_ints, 1, Some(1)),
        NativeFunction::new("Strings", sort_strings, 1, Some(1)),
    ]
}

pub(crate) fn strings_functions() -> Vec<NativeFunction> {
    vec![
        NativeFunction::new("ToUpper", to_upper, 1, Some(1)),
        NativeFunction::new("ToLower", to_lower, 1, Some(1)),
        NativeFunction::new("Join", join, 2, Some(2)),
    ]
}

fn array_arg(value: &Value) -> RunResult<&Array> {
    match value.unwrapped() {
        Value::Array(a) => Ok(a),
        v => Err(EgoError::new(ErrorKind::ArgumentType).context(v.kind())),
    }
}

fn string_arg(value: &Value) -> RunResult<&str> {
    value
        .as_str()
        .ok_or_else(|| EgoError::new(ErrorKind::ArgumentType).context(value.kind()))
}

/// `sort.Slice(array, less)` sorts the array in place.
///
/// `less(i, j)` receives element indexes into the array as it is being
/// sorted, so the comparator reads the live elements. An insertion sort keeps
/// the array consistent between comparator calls.
fn sort_slice(call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    let array = array_arg(&args[0])?;
    let less = &args[1];
    for i in 1..array.len() {
        let mut j = i;
        while j > 0 {
            let ordered = call.invoke(less, vec![Value::from(j), Value::from(j - 1)])?;
            if !ordered.truthy() {
                break;
            }
            let (a, b) = (array.get(j)?, array.get(j - 1)?);
            array.set(j, b)?;
            array.set(j - 1, a)?;
            j -= 1;
        }
    }
    Ok(Value::Null)
}

fn sort_ints(_call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    let array = array_arg(&args[0])?;
    let mut keyed = array
        .values()
        .into_iter()
        .map(|v| Ok((v.as_int()?, v)))
        .collect::<RunResult<Vec<(i64, Value)>>>()?;
    keyed.sort_by_key(|(k, _)| *k);
    array.replace_values(keyed.into_iter().map(|(_, v)| v).collect())?;
    Ok(Value::Null)
}

fn sort_strings(_call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    let array = array_arg(&args[0])?;
    array.sort_by(|a, b| match (a.as_str(), b.as_str()) {
        (Some(x), Some(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    })?;
    Ok(Value::Null)
}

fn to_upper(_call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    Ok(Value::String(string_arg(&args[0])?.to_uppercase()))
}

fn to_lower(_call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    Ok(Value::String(string_arg(&args[0])?.to_lowercase()))
}

fn join(_call: &NativeCall<'_>, args: &[Value]) -> RunResult<Value> {
    let parts: Vec<String> = array_arg(&args[0])?.values().iter().map(ToString::to_string).collect();
    Ok(Value::String(parts.join(string_arg(&args[1])?)))
}
