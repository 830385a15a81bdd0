//! Numeric widening and scalar conversions.

use super::{Kind, Value};
use crate::errors::{EgoError, ErrorKind, RunResult};

/// Widening rank of the numeric kinds: `Byte ⊂ Int32 ⊂ Int ⊂ Int64 ⊂ Float32 ⊂ Float64`.
fn rank(kind: Kind) -> Option<u8> {
    match kind {
        Kind::Byte => Some(0),
        Kind::Int32 => Some(1),
        Kind::Int => Some(2),
        Kind::Int64 => Some(3),
        Kind::Float32 => Some(4),
        Kind::Float64 => Some(5),
        _ => None,
    }
}

#[must_use]
pub fn is_numeric(kind: Kind) -> bool {
    rank(kind).is_some()
}

/// Brings two operands to a common kind.
///
/// A string on either side turns both into strings. Booleans pair with
/// booleans; a boolean paired with a number is widened to that number's kind.
/// Fails `InvalidType` for anything else that is not numeric.
pub fn normalize(a: Value, b: Value) -> RunResult<(Value, Value)> {
    let (a, b) = (a.into_unwrapped(), b.into_unwrapped());
    let (ka, kb) = (a.kind(), b.kind());
    if ka == kb {
        return Ok((a, b));
    }
    if ka == Kind::String || kb == Kind::String {
        if !is_scalar(ka) || !is_scalar(kb) {
            return Err(EgoError::new(ErrorKind::InvalidType).context(format!("{ka}, {kb}")));
        }
        return Ok((Value::String(a.to_string()), Value::String(b.to_string())));
    }
    let ra = if ka == Kind::Bool { Some(0) } else { rank(ka) };
    let rb = if kb == Kind::Bool { Some(0) } else { rank(kb) };
    match (ra, rb) {
        (Some(ra), Some(rb)) => {
            let target = if ra >= rb { ka } else { kb };
            let target = if target == Kind::Bool { Kind::Byte } else { target };
            Ok((convert_numeric(&a, target)?, convert_numeric(&b, target)?))
        }
        _ => Err(EgoError::new(ErrorKind::InvalidType).context(format!("{ka}, {kb}"))),
    }
}

fn is_scalar(kind: Kind) -> bool {
    is_numeric(kind) || matches!(kind, Kind::Bool | Kind::String)
}

/// Converts a numeric or boolean value to the numeric `kind`, truncating as needed.
fn convert_numeric(v: &Value, kind: Kind) -> RunResult<Value> {
    Ok(match kind {
        Kind::Byte => Value::Byte(v.as_int()? as u8),
        Kind::Int32 => Value::Int32(v.as_int()? as i32),
        Kind::Int => Value::Int(v.as_int()?),
        Kind::Int64 => Value::Int64(v.as_int()?),
        Kind::Float32 => Value::Float32(v.as_float()? as f32),
        Kind::Float64 => Value::Float64(v.as_float()?),
        other => return Err(EgoError::new(ErrorKind::InvalidType).context(other)),
    })
}

/// Dynamic coercion to a scalar kind.
pub(crate) fn coerce_scalar(value: Value, kind: Kind) -> RunResult<Value> {
    if value.kind() == kind {
        return Ok(value);
    }
    match kind {
        Kind::String => Ok(Value::String(value.to_string())),
        Kind::Bool => match &value {
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" | "" => Ok(Value::Bool(false)),
                _ => Err(EgoError::new(ErrorKind::InvalidValue).context(s)),
            },
            v if is_numeric(v.kind()) || v.is_null() => Ok(Value::Bool(v.truthy())),
            v => Err(EgoError::new(ErrorKind::InvalidType).context(v.kind())),
        },
        _ => match &value {
            Value::Null => convert_numeric(&Value::Int(0), kind),
            Value::String(s) if matches!(kind, Kind::Float32 | Kind::Float64) => {
                let f = s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| EgoError::new(ErrorKind::InvalidValue).context(s))?;
                convert_numeric(&Value::Float64(f), kind)
            }
            v if is_scalar(v.kind()) => convert_numeric(v, kind),
            v => Err(EgoError::new(ErrorKind::InvalidType).context(v.kind())),
        },
    }
}
