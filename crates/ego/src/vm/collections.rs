//! Indexing, slicing and the constructors of arrays, maps and structs.

use indexmap::IndexMap;

use super::{Context, READONLY_FIELD, STATIC_FIELD, TYPE_FIELD};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    value::{Array, Map, Struct, Type, Value, instance_of, is_numeric},
};

/// A slice bound; negative values are rejected.
fn slice_bound(v: &Value) -> RunResult<usize> {
    let i = v.as_int()?;
    usize::try_from(i).map_err(|_| EgoError::new(ErrorKind::InvalidSliceIndex).context(i))
}

/// The operand or stack value naming a type.
fn type_operand(v: &Value) -> RunResult<Type> {
    match v.unwrapped() {
        Value::Type(t) => Ok(t.clone()),
        Value::Null => Ok(Type::interface()),
        other => Err(EgoError::new(ErrorKind::InvalidType).context(other.kind())),
    }
}

impl Context {
    /// Outside static mode a number stored into a numeric slot takes the
    /// slot's kind. Anything else is left for the container to check.
    fn conform(&self, t: &Type, v: Value) -> RunResult<Value> {
        if self.static_types || !is_numeric(t.kind()) || !is_numeric(v.kind()) {
            return Ok(v);
        }
        t.coerce(v)
    }

    /// `[container, index]` → element.
    pub(super) fn op_load_index(&mut self, _operand: &Value) -> RunResult<()> {
        let index = self.pop_value()?.into_unwrapped();
        let container = self.pop_value()?.into_unwrapped();
        let v = match container {
            Value::Array(array) => array.get(index.as_index()?)?,
            // A missing key reads as the zero value of the map's value type.
            Value::Map(map) => match map.get(&index)? {
                Some(v) => v,
                None => instance_of(&map.value_type()),
            },
            Value::Struct(s) => {
                let name = index.to_string();
                s.get(&name)
                    .ok_or_else(|| EgoError::new(ErrorKind::UnknownMember).context(name))?
            }
            Value::Package(package) => {
                let name = index.to_string();
                package
                    .get(&name)
                    .ok_or_else(|| EgoError::new(ErrorKind::UnknownPackageMember).context(name))?
            }
            Value::String(s) => {
                let i = index.as_index()?;
                let byte = s
                    .as_bytes()
                    .get(i)
                    .ok_or_else(|| EgoError::new(ErrorKind::ArrayIndex).context(i))?;
                Value::Byte(*byte)
            }
            other => return Err(EgoError::new(ErrorKind::InvalidType).context(other.kind())),
        };
        self.push(v.into_unwrapped());
        Ok(())
    }

    /// `[value, container, index]` → container.
    pub(super) fn op_store_index(&mut self, _operand: &Value) -> RunResult<()> {
        let index = self.pop_value()?.into_unwrapped();
        let container = self.pop_value()?.into_unwrapped();
        let value = self.pop_value()?.into_unwrapped();
        self.store_element(&container, index, value)?;
        self.push(container);
        Ok(())
    }

    /// `[container, value, key]` → container.
    pub(super) fn op_store_into(&mut self, _operand: &Value) -> RunResult<()> {
        let key = self.pop_value()?.into_unwrapped();
        let value = self.pop_value()?.into_unwrapped();
        let container = self.pop_value()?.into_unwrapped();
        self.store_element(&container, key, value)?;
        self.push(container);
        Ok(())
    }

    fn store_element(&self, container: &Value, index: Value, value: Value) -> RunResult<()> {
        match container {
            Value::Array(array) => {
                let value = self.conform(&array.element_type(), value)?;
                self.check_elements(array, std::slice::from_ref(&value))?;
                array.set(index.as_index()?, value)
            }
            Value::Map(map) => {
                let key = self.conform(&map.key_type(), index)?;
                map.set(key, self.conform(&map.value_type(), value)?)
            }
            Value::Struct(s) => s.set(&index.to_string(), value),
            other => Err(EgoError::new(ErrorKind::InvalidType).context(other.kind())),
        }
    }

    /// `[container, start, end]` → slice. A null end means the length.
    pub(super) fn op_load_slice(&mut self, _operand: &Value) -> RunResult<()> {
        let end = self.pop_value()?.into_unwrapped();
        let start = slice_bound(&self.pop_value()?)?;
        let container = self.pop_value()?.into_unwrapped();
        let v = match container {
            Value::Array(array) => {
                let end = if end.is_null() { array.len() } else { slice_bound(&end)? };
                Value::Array(array.slice(start, end)?)
            }
            Value::String(s) => {
                let end = if end.is_null() { s.len() } else { slice_bound(&end)? };
                if start > end || end > s.len() {
                    return Err(EgoError::new(ErrorKind::ArrayBounds).context(format!("{start}:{end}")));
                }
                s.get(start..end)
                    .map(Value::from)
                    .ok_or_else(|| EgoError::new(ErrorKind::InvalidSliceIndex).context(format!("{start}:{end}")))?
            }
            other => return Err(EgoError::new(ErrorKind::InvalidType).context(other.kind())),
        };
        self.push(v);
        Ok(())
    }

    /// `Array n` or `Array [n, type]`: pops n values into a new array.
    pub(super) fn op_array(&mut self, operand: &Value) -> RunResult<()> {
        let (count, element) = match operand.unwrapped() {
            Value::Array(parts) => {
                let parts = parts.values();
                let count = parts.first().map_or(Ok(0), Value::as_index)?;
                let element = parts.get(1).map_or(Ok(Type::interface()), type_operand)?;
                (count, element)
            }
            v => (Self::operand_count(v, 0)?, Type::interface()),
        };
        let mut values = self.pop_args(count)?;
        let array = Array::new(element.clone(), Vec::new());
        if self.static_types {
            self.check_elements(&array, &values)?;
        } else if !element.is_interface() {
            values = values.into_iter().map(|v| element.coerce(v)).collect::<RunResult<_>>()?;
        }
        array.replace_values(values)?;
        self.push(Value::Array(array));
        Ok(())
    }

    /// `[size, init]` → an array of `size` copies of `init`.
    pub(super) fn op_make_array(&mut self, _operand: &Value) -> RunResult<()> {
        let initial = self.pop_value()?.into_unwrapped();
        let size = self.pop_value()?.as_index()?;
        let element = if initial.is_null() { Type::interface() } else { initial.type_of() };
        self.push(Value::Array(Array::filled(element, size, &initial)));
        Ok(())
    }

    /// `MakeMap n`: `[keyType, valueType, k1, v1, ...]` → map.
    pub(super) fn op_make_map(&mut self, operand: &Value) -> RunResult<()> {
        let count = Self::operand_count(operand, 0)?;
        let pairs = self.pop_args(count * 2)?;
        let value_type = type_operand(&self.pop_value()?)?;
        let key_type = type_operand(&self.pop_value()?)?;
        let map = Map::new(key_type, value_type);
        for pair in pairs.chunks_exact(2) {
            let key = self.conform(&map.key_type(), pair[0].clone().into_unwrapped())?;
            let value = self.conform(&map.value_type(), pair[1].clone().into_unwrapped())?;
            map.set(key, value)?;
        }
        self.push(Value::Map(map));
        Ok(())
    }

    /// `Struct n`: `[k1, v1, ..., kn, vn]` → struct.
    ///
    /// A `__type` entry makes an instance of that type, which rejects fields
    /// the type does not declare. `__static` and `__readonly` set the flags of
    /// the same names.
    pub(super) fn op_struct(&mut self, operand: &Value) -> RunResult<()> {
        let count = Self::operand_count(operand, 0)?;
        let pairs = self.pop_args(count * 2)?;
        let mut fields: IndexMap<String, Value> = IndexMap::with_capacity(count);
        for pair in pairs.chunks_exact(2) {
            fields.insert(pair[0].to_string(), pair[1].clone().into_unwrapped());
        }
        let type_value = fields.shift_remove(TYPE_FIELD);
        let static_flag = fields.shift_remove(STATIC_FIELD);
        let readonly_flag = fields.shift_remove(READONLY_FIELD);

        let s = match type_value {
            Some(v) => {
                let t = self.resolve_type(v)?;
                if !matches!(t.base_type().kind(), crate::value::Kind::Struct) {
                    return Err(EgoError::new(ErrorKind::InvalidType).context(t));
                }
                let s = Struct::new(&t);
                s.set_strong_typing(self.static_types);
                for (name, value) in fields {
                    s.set(&name, value)?;
                }
                s
            }
            None => Struct::from_fields(fields),
        };
        if let Some(flag) = static_flag {
            s.set_static(flag.truthy());
        }
        if let Some(flag) = readonly_flag {
            s.set_readonly(flag.truthy());
        }
        self.push(Value::Struct(s));
        Ok(())
    }

    /// A type value, or the name of a symbol holding one.
    pub(super) fn resolve_type(&self, v: Value) -> RunResult<Type> {
        match v.into_unwrapped() {
            Value::Type(t) => Ok(t),
            Value::String(name) => match self.arena.get(self.symbols, &name).map(Value::into_unwrapped) {
                Some(Value::Type(t)) => Ok(t),
                _ => Err(EgoError::new(ErrorKind::InvalidType).context(name)),
            },
            other => Err(EgoError::new(ErrorKind::InvalidType).context(other.kind())),
        }
    }

    /// `[map]`: binds every key of the map as a symbol in the current table.
    pub(super) fn op_explode(&mut self, _operand: &Value) -> RunResult<()> {
        let Value::Map(map) = self.pop_value()?.into_unwrapped() else {
            return Err(EgoError::new(ErrorKind::InvalidType).context("explode"));
        };
        for key in map.keys() {
            let value = map.get(&key)?.unwrap_or_default();
            self.arena.set_always(self.symbols, &key.to_string(), value)?;
        }
        Ok(())
    }

    /// `[array]`: pushes the elements so the next `Call` takes them as
    /// separate arguments. Other values are pushed back unchanged.
    pub(super) fn op_flatten(&mut self, _operand: &Value) -> RunResult<()> {
        match self.pop_value()?.into_unwrapped() {
            Value::Array(array) => {
                let values = array.values();
                let widen = isize::try_from(values.len()).unwrap_or(isize::MAX) - 1;
                self.arg_count_delta = self.arg_count_delta.saturating_add(widen);
                for v in values {
                    self.push(v);
                }
            }
            other => self.push(other),
        }
        Ok(())
    }
}
