//! Equality and ordering comparisons.

use std::cmp::Ordering;

use super::Context;
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    value::{Value, normalize},
};

/// Orders two scalars after normalization. Numbers compare numerically,
/// strings lexically and `false` sorts before `true`.
pub(crate) fn compare_values(a: &Value, b: &Value) -> RunResult<Ordering> {
    if a.is_null() || b.is_null() {
        return Err(EgoError::new(ErrorKind::InvalidType).context("nil"));
    }
    let ordering = match normalize(a.clone(), b.clone())? {
        (Value::String(x), Value::String(y)) => x.cmp(&y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(&y),
        (Value::Float32(x), Value::Float32(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Value::Float64(x), Value::Float64(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Value::Byte(x), Value::Byte(y)) => x.cmp(&y),
        (Value::Int32(x), Value::Int32(y)) => x.cmp(&y),
        (Value::Int(x), Value::Int(y)) | (Value::Int64(x), Value::Int64(y)) => x.cmp(&y),
        (x, y) => {
            return Err(EgoError::new(ErrorKind::InvalidType).context(format!("{}, {}", x.kind(), y.kind())));
        }
    };
    Ok(ordering)
}

impl Context {
    fn compare(&mut self, accept: fn(Ordering) -> bool) -> RunResult<()> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        let ordering = compare_values(&a, &b)?;
        self.push(Value::Bool(accept(ordering)));
        Ok(())
    }

    pub(super) fn op_equal(&mut self, _operand: &Value) -> RunResult<()> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        self.push(Value::Bool(a.equals(&b)));
        Ok(())
    }

    pub(super) fn op_not_equal(&mut self, _operand: &Value) -> RunResult<()> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        self.push(Value::Bool(!a.equals(&b)));
        Ok(())
    }

    pub(super) fn op_greater_than(&mut self, _operand: &Value) -> RunResult<()> {
        self.compare(Ordering::is_gt)
    }

    pub(super) fn op_greater_than_or_equal(&mut self, _operand: &Value) -> RunResult<()> {
        self.compare(Ordering::is_ge)
    }

    pub(super) fn op_less_than(&mut self, _operand: &Value) -> RunResult<()> {
        self.compare(Ordering::is_lt)
    }

    pub(super) fn op_less_than_or_equal(&mut self, _operand: &Value) -> RunResult<()> {
        self.compare(Ordering::is_le)
    }
}
