//! Arithmetic, logical and bitwise operators.
//!
//! Binary operators pop the right operand first. Scalars are brought to a
//! common kind with [`normalize`] before the operation; integer arithmetic
//! wraps within the operand kind.

use super::Context;
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    value::{Array, Kind, Value, normalize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

fn invalid_operands(a: &Value, b: &Value) -> EgoError {
    EgoError::new(ErrorKind::InvalidType).context(format!("{}, {}", a.kind(), b.kind()))
}

fn is_integer(kind: Kind) -> bool {
    matches!(kind, Kind::Byte | Kind::Int32 | Kind::Int | Kind::Int64)
}

/// Narrows an `i64` result back to the operand kind, wrapping.
fn integer_of_kind(kind: Kind, v: i64) -> Value {
    match kind {
        Kind::Byte => Value::Byte(v as u8),
        Kind::Int32 => Value::Int32(v as i32),
        Kind::Int64 => Value::Int64(v),
        _ => Value::Int(v),
    }
}

fn integer(op: Arith, x: i64, y: i64) -> RunResult<i64> {
    if matches!(op, Arith::Div | Arith::Mod) && y == 0 {
        return Err(ErrorKind::DivisionByZero.into());
    }
    Ok(match op {
        Arith::Add => x.wrapping_add(y),
        Arith::Sub => x.wrapping_sub(y),
        Arith::Mul => x.wrapping_mul(y),
        Arith::Div => x.wrapping_div(y),
        Arith::Mod => x.wrapping_rem(y),
    })
}

fn float(op: Arith, x: f64, y: f64) -> RunResult<f64> {
    if matches!(op, Arith::Div | Arith::Mod) && y == 0.0 {
        return Err(ErrorKind::DivisionByZero.into());
    }
    Ok(match op {
        Arith::Add => x + y,
        Arith::Sub => x - y,
        Arith::Mul => x * y,
        Arith::Div => x / y,
        Arith::Mod => x % y,
    })
}

/// Applies `op` to two operands already normalized to one numeric kind.
fn arithmetic(op: Arith, a: &Value, b: &Value) -> RunResult<Value> {
    match (a, b) {
        (Value::Float64(x), Value::Float64(y)) => Ok(Value::Float64(float(op, *x, *y)?)),
        (Value::Float32(x), Value::Float32(y)) => Ok(Value::Float32(float(op, f64::from(*x), f64::from(*y))? as f32)),
        (a, b) if is_integer(a.kind()) && a.kind() == b.kind() => {
            Ok(integer_of_kind(a.kind(), integer(op, a.as_int()?, b.as_int()?)?))
        }
        (a, b) => Err(invalid_operands(a, b)),
    }
}

impl Context {
    /// Pops the right then the left operand; nil on either side is an error.
    fn pop_operands(&mut self) -> RunResult<(Value, Value)> {
        let b = self.pop_value()?.into_unwrapped();
        let a = self.pop_value()?.into_unwrapped();
        if a.is_null() || b.is_null() {
            return Err(invalid_operands(&a, &b));
        }
        Ok((a, b))
    }

    /// In static mode, values added to a typed array must have its element type.
    pub(super) fn check_elements(&self, array: &Array, values: &[Value]) -> RunResult<()> {
        let element = array.element_type();
        if !self.static_types || element.is_interface() {
            return Ok(());
        }
        match values.iter().find(|v| !element.is_type(&v.type_of())) {
            Some(v) => Err(EgoError::new(ErrorKind::InvalidType).context(v.kind())),
            None => Ok(()),
        }
    }

    /// Numeric addition, string concatenation, array concatenation or
    /// append, map merge, and logical or for booleans.
    pub(super) fn op_add(&mut self, _operand: &Value) -> RunResult<()> {
        let (a, b) = self.pop_operands()?;
        let v = match (a, b) {
            (Value::Error(e), b) => Value::String(format!("{e}{b}")),
            (Value::Array(x), Value::Array(y)) => {
                let tail = y.values();
                self.check_elements(&x, &tail)?;
                let mut values = x.values();
                values.extend(tail);
                Value::Array(Array::new(x.element_type(), values))
            }
            (Value::Array(x), b) => {
                self.check_elements(&x, std::slice::from_ref(&b))?;
                let mut values = x.values();
                values.push(b);
                Value::Array(Array::new(x.element_type(), values))
            }
            (Value::Map(x), Value::Map(y)) => {
                let merged = x.deep_copy();
                merged.merge(&y)?;
                Value::Map(merged)
            }
            (a @ Value::Map(_), b) => return Err(invalid_operands(&a, &b)),
            (a, b) => match normalize(a, b)? {
                (Value::String(x), Value::String(y)) => Value::String(x + &y),
                (Value::Bool(x), Value::Bool(y)) => Value::Bool(x || y),
                (a, b) => arithmetic(Arith::Add, &a, &b)?,
            },
        };
        self.push(v);
        Ok(())
    }

    /// Numeric subtraction; removes matching elements from an array or every
    /// occurrence of a substring from a string.
    pub(super) fn op_sub(&mut self, _operand: &Value) -> RunResult<()> {
        let (a, b) = self.pop_operands()?;
        let v = match (a, b) {
            (Value::Array(x), b) => {
                let kept = x.values().into_iter().filter(|v| !v.equals(&b)).collect();
                Value::Array(Array::new(x.element_type(), kept))
            }
            (a, b) => match normalize(a, b)? {
                (Value::String(x), Value::String(y)) => Value::String(x.replace(&y, "")),
                (a, b) => arithmetic(Arith::Sub, &a, &b)?,
            },
        };
        self.push(v);
        Ok(())
    }

    /// Numeric multiplication; logical and for booleans.
    pub(super) fn op_mul(&mut self, _operand: &Value) -> RunResult<()> {
        let (a, b) = self.pop_operands()?;
        let v = match normalize(a, b)? {
            (Value::Bool(x), Value::Bool(y)) => Value::Bool(x && y),
            (a, b) => arithmetic(Arith::Mul, &a, &b)?,
        };
        self.push(v);
        Ok(())
    }

    pub(super) fn op_div(&mut self, _operand: &Value) -> RunResult<()> {
        let (a, b) = self.pop_operands()?;
        let (a, b) = normalize(a, b)?;
        let v = arithmetic(Arith::Div, &a, &b)?;
        self.push(v);
        Ok(())
    }

    pub(super) fn op_modulo(&mut self, _operand: &Value) -> RunResult<()> {
        let (a, b) = self.pop_operands()?;
        let (a, b) = normalize(a, b)?;
        let v = arithmetic(Arith::Mod, &a, &b)?;
        self.push(v);
        Ok(())
    }

    /// Integer powers stay integers; a negative exponent gives a float.
    pub(super) fn op_exp(&mut self, _operand: &Value) -> RunResult<()> {
        let (a, b) = self.pop_operands()?;
        let v = match normalize(a, b)? {
            (Value::Float64(x), Value::Float64(y)) => Value::Float64(x.powf(y)),
            (Value::Float32(x), Value::Float32(y)) => Value::Float32(x.powf(y)),
            (a, b) if is_integer(a.kind()) => {
                let (x, y) = (a.as_int()?, b.as_int()?);
                match u32::try_from(y) {
                    Ok(y) => integer_of_kind(a.kind(), x.wrapping_pow(y)),
                    Err(_) if y < 0 => Value::Float64((x as f64).powf(y as f64)),
                    Err(_) => return Err(EgoError::new(ErrorKind::InvalidValue).context(y)),
                }
            }
            (a, b) => return Err(invalid_operands(&a, &b)),
        };
        self.push(v);
        Ok(())
    }

    pub(super) fn op_and(&mut self, _operand: &Value) -> RunResult<()> {
        let (a, b) = self.pop_operands()?;
        self.push(Value::Bool(a.truthy() && b.truthy()));
        Ok(())
    }

    pub(super) fn op_or(&mut self, _operand: &Value) -> RunResult<()> {
        let (a, b) = self.pop_operands()?;
        self.push(Value::Bool(a.truthy() || b.truthy()));
        Ok(())
    }

    /// Logical not for booleans, arithmetic negation for numbers, and
    /// reversal for arrays.
    pub(super) fn op_negate(&mut self, _operand: &Value) -> RunResult<()> {
        let v = match self.pop_value()?.into_unwrapped() {
            Value::Bool(b) => Value::Bool(!b),
            Value::Byte(i) => Value::Byte(i.wrapping_neg()),
            Value::Int32(i) => Value::Int32(i.wrapping_neg()),
            Value::Int(i) => Value::Int(i.wrapping_neg()),
            Value::Int64(i) => Value::Int64(i.wrapping_neg()),
            Value::Float32(f) => Value::Float32(-f),
            Value::Float64(f) => Value::Float64(-f),
            Value::Array(a) => Value::Array(a.reversed()),
            other => return Err(EgoError::new(ErrorKind::InvalidType).context(other.kind())),
        };
        self.push(v);
        Ok(())
    }

    fn bitwise(&mut self, f: fn(i64, i64) -> i64) -> RunResult<()> {
        let (a, b) = self.pop_operands()?;
        let (a, b) = normalize(a, b)?;
        if !is_integer(a.kind()) {
            return Err(invalid_operands(&a, &b));
        }
        let v = integer_of_kind(a.kind(), f(a.as_int()?, b.as_int()?));
        self.push(v);
        Ok(())
    }

    pub(super) fn op_bit_and(&mut self, _operand: &Value) -> RunResult<()> {
        self.bitwise(|x, y| x & y)
    }

    pub(super) fn op_bit_or(&mut self, _operand: &Value) -> RunResult<()> {
        self.bitwise(|x, y| x | y)
    }

    /// `[value, shift]`: a positive shift moves right, a negative one left.
    pub(super) fn op_bit_shift(&mut self, _operand: &Value) -> RunResult<()> {
        let (value, shift) = self.pop_operands()?;
        if !is_integer(value.kind()) {
            return Err(invalid_operands(&value, &shift));
        }
        let shift = shift.as_int()?;
        if !(-63..=63).contains(&shift) {
            return Err(EgoError::new(ErrorKind::InvalidValue).context(format!("bit shift {shift}")));
        }
        let x = value.as_int()?;
        let shifted = if shift < 0 { x << -shift } else { x >> shift };
        self.push(integer_of_kind(value.kind(), shifted));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{
        bytecode::{ByteCode, Opcode},
        errors::{ErrorKind, RunResult},
        symbols::{ROOT_TABLE, SymbolArena},
        value::{Array, Map, Type, Value},
        vm::Context,
    };

    fn binary(op: Opcode, a: impl Into<Value>, b: impl Into<Value>) -> RunResult<Value> {
        let mut code = ByteCode::new("binary");
        code.emit_with(Opcode::Push, a);
        code.emit_with(Opcode::Push, b);
        code.emit(op);
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        ctx.run()?;
        ctx.pop()
    }

    #[test]
    fn test_numeric_arithmetic_widens() {
        assert_eq!(binary(Opcode::Add, 2, 3.5).unwrap(), Value::Float64(5.5));
        assert_eq!(binary(Opcode::Sub, 10_i64, 4_i32).unwrap(), Value::Int(6));
        assert_eq!(binary(Opcode::Mul, 6_i32, 7_i32).unwrap(), Value::Int32(42));
        assert_eq!(binary(Opcode::Div, 7_i64, 2_i64).unwrap(), Value::Int(3));
        assert_eq!(binary(Opcode::Modulo, 7_i64, 3_i64).unwrap(), Value::Int(1));
        assert_eq!(binary(Opcode::Exp, 2_i64, 10_i64).unwrap(), Value::Int(1024));
        assert_eq!(binary(Opcode::Exp, 2_i64, -1_i64).unwrap(), Value::Float64(0.5));
    }

    #[test]
    fn test_byte_arithmetic_wraps() {
        assert_eq!(binary(Opcode::Add, 250_u8, 10_u8).unwrap(), Value::Byte(4));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(binary(Opcode::Div, 1, 0).unwrap_err().kind(), ErrorKind::DivisionByZero);
        assert_eq!(binary(Opcode::Modulo, 1.0, 0.0).unwrap_err().kind(), ErrorKind::DivisionByZero);
    }

    #[test]
    fn test_nil_operand_is_invalid() {
        assert_eq!(binary(Opcode::Add, Value::Null, 1).unwrap_err().kind(), ErrorKind::InvalidType);
    }

    #[test]
    fn test_string_operators() {
        assert_eq!(binary(Opcode::Add, "ab", "cd").unwrap(), Value::from("abcd"));
        assert_eq!(binary(Opcode::Add, "n=", 3).unwrap(), Value::from("n=3"));
        assert_eq!(binary(Opcode::Sub, "banana", "an").unwrap(), Value::from("ba"));
    }

    #[test]
    fn test_boolean_add_is_or_and_mul_is_and() {
        assert_eq!(binary(Opcode::Add, true, false).unwrap(), Value::Bool(true));
        assert_eq!(binary(Opcode::Mul, true, false).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_array_operators() {
        let a = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(1)]);
        let b = Value::list(vec![Value::Int(3)]);
        assert_eq!(binary(Opcode::Add, a.clone(), b).unwrap().to_string(), "[1, 2, 1, 3]");
        assert_eq!(binary(Opcode::Add, a.clone(), 4).unwrap().to_string(), "[1, 2, 1, 4]");
        assert_eq!(binary(Opcode::Sub, a, 1).unwrap().to_string(), "[2]");
    }

    #[test]
    fn test_static_array_append_checks_element_type() {
        let ints = Value::Array(Array::new(Type::int(), vec![Value::Int(1)]));
        let mut code = ByteCode::new("binary");
        code.emit_with(Opcode::Push, ints);
        code.emit_with(Opcode::Push, "x");
        code.emit(Opcode::Add);
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        ctx.set_static(true);
        assert_eq!(ctx.run().unwrap_err().kind(), ErrorKind::InvalidType);
    }

    #[test]
    fn test_map_add_merges_right_wins() {
        let left = Map::new(Type::string(), Type::int());
        left.set(Value::from("a"), Value::Int(1)).unwrap();
        left.set(Value::from("b"), Value::Int(2)).unwrap();
        let right = Map::new(Type::string(), Type::int());
        right.set(Value::from("b"), Value::Int(20)).unwrap();
        let merged = binary(Opcode::Add, Value::Map(left), Value::Map(right)).unwrap();
        let Value::Map(merged) = merged else {
            panic!("expected a map");
        };
        assert_eq!(merged.get(&Value::from("a")).unwrap(), Some(Value::Int(1)));
        assert_eq!(merged.get(&Value::from("b")).unwrap(), Some(Value::Int(20)));
    }

    #[test]
    fn test_negate() {
        let mut code = ByteCode::new("negate");
        code.emit_with(Opcode::Push, 5);
        code.emit(Opcode::Negate);
        code.emit_with(Opcode::Push, true);
        code.emit(Opcode::Negate);
        code.emit_with(Opcode::Push, Value::list(vec![Value::Int(1), Value::Int(2)]));
        code.emit(Opcode::Negate);
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        ctx.run().unwrap();
        assert_eq!(ctx.format_stack(3), "[2, 1], false, -5");
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(binary(Opcode::BitAnd, 12_i64, 10_i64).unwrap(), Value::Int(8));
        assert_eq!(binary(Opcode::BitOr, 12_i64, 3_i64).unwrap(), Value::Int(15));
        assert_eq!(binary(Opcode::BitShift, 16_i64, 2_i64).unwrap(), Value::Int(4));
        assert_eq!(binary(Opcode::BitShift, 1_i64, -4_i64).unwrap(), Value::Int(16));
        assert_eq!(binary(Opcode::BitShift, 1_i64, 64_i64).unwrap_err().kind(), ErrorKind::InvalidValue);
    }
}
