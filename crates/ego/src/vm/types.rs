//! Type assertions and conversions.

use super::{Context, STATIC_TYPES_VAR};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    value::{Type, Value},
};

impl Context {
    fn operand_type(&self, operand: &Value) -> RunResult<Type> {
        match operand.unwrapped() {
            Value::Null => Err(EgoError::new(ErrorKind::InvalidType).context("nil")),
            v => self.resolve_type(v.clone()),
        }
    }

    /// Pops a value and pushes it back checked against the operand type. In
    /// static mode a mismatch fails `InvalidVarType`; otherwise the value is
    /// coerced to the type.
    pub(super) fn op_required_type(&mut self, operand: &Value) -> RunResult<()> {
        let t = self.operand_type(operand)?;
        let v = self.pop_value()?.into_unwrapped();
        let v = if self.static_types {
            if !v.is_null() && !t.is_type(&v.type_of()) {
                return Err(EgoError::new(ErrorKind::InvalidVarType).context(format!("{} is not {t}", v.type_of())));
            }
            v
        } else {
            t.coerce(v)?
        };
        self.push(v);
        Ok(())
    }

    /// Pops a value and pushes it coerced to the operand type.
    pub(super) fn op_coerce(&mut self, operand: &Value) -> RunResult<()> {
        let t = self.operand_type(operand)?;
        let v = self.pop_value()?;
        self.push(t.coerce(v)?);
        Ok(())
    }

    /// Pops a flag that switches static typing on or off for the rest of the
    /// program, and records it in the symbol table.
    pub(super) fn op_static_typing(&mut self, _operand: &Value) -> RunResult<()> {
        let enabled = self.pop_value()?.truthy();
        self.static_types = enabled;
        self.arena.set_always(self.symbols, STATIC_TYPES_VAR, Value::Bool(enabled))
    }
}
