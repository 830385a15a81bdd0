use std::sync::Arc;

use parking_lot::RwLock;

use super::{Type, Value};
use crate::errors::{EgoError, ErrorKind, RunResult};

#[derive(Debug)]
struct ArrayData {
    element_type: Type,
    values: Vec<Value>,
    /// Nesting count of active `range` loops; non-zero freezes the array.
    immutable: u32,
}

/// A shared, typed, dense array.
#[derive(Debug, Clone)]
pub struct Array(Arc<RwLock<ArrayData>>);

impl Array {
    #[must_use]
    pub fn new(element_type: Type, values: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(ArrayData {
            element_type,
            values,
            immutable: 0,
        })))
    }

    /// An array of `size` copies of `initial`.
    #[must_use]
    pub fn filled(element_type: Type, size: usize, initial: &Value) -> Self {
        let values = (0..size).map(|_| initial.deep_copy()).collect();
        Self::new(element_type, values)
    }

    #[must_use]
    pub fn element_type(&self) -> Type {
        self.0.read().element_type.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.read().values.is_empty()
    }

    /// Snapshot of the elements.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.0.read().values.clone()
    }

    pub fn get(&self, index: usize) -> RunResult<Value> {
        let data = self.0.read();
        data.values
            .get(index)
            .cloned()
            .ok_or_else(|| EgoError::new(ErrorKind::ArrayIndex).context(index))
    }

    pub fn set(&self, index: usize, value: Value) -> RunResult<()> {
        let mut data = self.0.write();
        if data.immutable > 0 {
            return Err(ErrorKind::ImmutableArray.into());
        }
        check_element(&data.element_type, &value)?;
        let len = data.values.len();
        let slot = data
            .values
            .get_mut(index)
            .ok_or_else(|| EgoError::new(ErrorKind::ArrayIndex).context(format!("{index} of {len}")))?;
        *slot = value;
        Ok(())
    }

    pub fn append(&self, value: Value) -> RunResult<()> {
        let mut data = self.0.write();
        if data.immutable > 0 {
            return Err(ErrorKind::ImmutableArray.into());
        }
        check_element(&data.element_type, &value)?;
        data.values.push(value);
        Ok(())
    }

    pub fn delete(&self, index: usize) -> RunResult<Value> {
        let mut data = self.0.write();
        if data.immutable > 0 {
            return Err(ErrorKind::ImmutableArray.into());
        }
        if index >= data.values.len() {
            return Err(EgoError::new(ErrorKind::ArrayIndex).context(index));
        }
        Ok(data.values.remove(index))
    }

    /// A new array holding elements `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> RunResult<Self> {
        let data = self.0.read();
        if start > end || end > data.values.len() {
            return Err(EgoError::new(ErrorKind::ArrayBounds).context(format!("{start}:{end}")));
        }
        Ok(Self::new(data.element_type.clone(), data.values[start..end].to_vec()))
    }

    /// A new array with the elements in reverse order.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let data = self.0.read();
        Self::new(data.element_type.clone(), data.values.iter().rev().cloned().collect())
    }

    /// Sorts in place with a caller supplied comparison.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> std::cmp::Ordering) -> RunResult<()> {
        let mut data = self.0.write();
        if data.immutable > 0 {
            return Err(ErrorKind::ImmutableArray.into());
        }
        data.values.sort_by(compare);
        Ok(())
    }

    /// Replaces the content wholesale, used by in-place sorts that run bytecode.
    pub fn replace_values(&self, values: Vec<Value>) -> RunResult<()> {
        let mut data = self.0.write();
        if data.immutable > 0 {
            return Err(ErrorKind::ImmutableArray.into());
        }
        data.values = values;
        Ok(())
    }

    /// Increments or decrements the freeze count.
    pub fn set_immutable(&self, immutable: bool) {
        let mut data = self.0.write();
        if immutable {
            data.immutable += 1;
        } else {
            data.immutable = data.immutable.saturating_sub(1);
        }
    }

    #[must_use]
    pub fn is_immutable(&self) -> bool {
        self.0.read().immutable > 0
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let data = self.0.read();
        Self::new(
            data.element_type.clone(),
            data.values.iter().map(Value::deep_copy).collect(),
        )
    }

    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (a, b) = (self.values(), other.values());
        a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.equals(y))
    }
}

fn check_element(element_type: &Type, value: &Value) -> RunResult<()> {
    if element_type.is_interface() || value.is_null() || element_type.is_type(&value.type_of()) {
        Ok(())
    } else {
        Err(EgoError::new(ErrorKind::TypeMismatch).context(format!("{} into []{element_type}", value.type_of())))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_immutable_blocks_mutation() {
        let a = Array::new(Type::int(), vec![Value::Int(1)]);
        a.set_immutable(true);
        assert_eq!(a.append(Value::Int(2)).unwrap_err().kind(), ErrorKind::ImmutableArray);
        assert_eq!(a.set(0, Value::Int(2)).unwrap_err().kind(), ErrorKind::ImmutableArray);
        a.set_immutable(false);
        a.append(Value::Int(2)).unwrap();
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_typed_array_rejects_other_types() {
        let a = Array::new(Type::int(), vec![]);
        assert_eq!(a.append(Value::from("x")).unwrap_err().kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_slice_bounds() {
        let a = Array::new(Type::int(), (0..5).map(Value::Int).collect());
        assert_eq!(a.slice(1, 3).unwrap().values(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(a.slice(3, 9).unwrap_err().kind(), ErrorKind::ArrayBounds);
        assert_eq!(a.get(7).unwrap_err().kind(), ErrorKind::ArrayIndex);
    }
}
