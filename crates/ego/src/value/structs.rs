use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::{Kind, Type, Value, instance_of};
use crate::errors::{EgoError, ErrorKind, RunResult};

#[derive(Debug)]
struct StructData {
    type_def: Type,
    fields: IndexMap<String, Value>,
    readonly: bool,
    /// Reject writes to fields that do not already exist.
    is_static: bool,
    /// Reject writes whose value type differs from the declared field type.
    strong_typing: bool,
    /// Number of times this struct has been copied.
    replica: u32,
}

/// A shared struct instance.
#[derive(Debug, Clone)]
pub struct Struct(Arc<RwLock<StructData>>);

impl Struct {
    /// A zero-valued instance of `t`. Typed structs are static.
    #[must_use]
    pub fn new(t: &Type) -> Self {
        let fields: IndexMap<String, Value> = t
            .fields()
            .iter()
            .map(|(name, ft)| (name.clone(), instance_of(ft)))
            .collect();
        let is_static = !fields.is_empty();
        Self(Arc::new(RwLock::new(StructData {
            type_def: t.clone(),
            fields,
            readonly: false,
            is_static,
            strong_typing: false,
            replica: 0,
        })))
    }

    /// An anonymous struct built from name/value pairs.
    #[must_use]
    pub fn from_fields(fields: IndexMap<String, Value>) -> Self {
        let field_types = fields.iter().map(|(n, v)| (n.clone(), v.type_of())).collect();
        let type_def = Type::structure(field_types).unwrap_or_else(|_| Type::of_kind(Kind::Struct));
        Self(Arc::new(RwLock::new(StructData {
            type_def,
            fields,
            readonly: false,
            is_static: false,
            strong_typing: false,
            replica: 0,
        })))
    }

    #[must_use]
    pub fn type_def(&self) -> Type {
        self.0.read().type_def.clone()
    }

    /// The package that declared this struct's type, if any.
    #[must_use]
    pub fn package(&self) -> Option<String> {
        self.0.read().type_def.package().map(str::to_owned)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.read().fields.get(name).cloned()
    }

    /// Writes a field, enforcing the readonly, static, `_` prefix and typing rules.
    pub fn set(&self, name: &str, value: Value) -> RunResult<()> {
        let mut data = self.0.write();
        if data.readonly {
            return Err(EgoError::new(ErrorKind::ReadOnly).context(name));
        }
        let exists = data.fields.contains_key(name);
        if name.starts_with('_') && exists {
            return Err(EgoError::new(ErrorKind::ReadOnly).context(name));
        }
        if data.is_static && !exists {
            return Err(EgoError::new(ErrorKind::InvalidField).context(name));
        }
        if data.strong_typing
            && let Some(declared) = data.type_def.field(name)
            && !value.is_null()
            && !declared.is_type(&value.type_of())
        {
            return Err(EgoError::new(ErrorKind::InvalidType).context(name));
        }
        data.fields.insert(name.to_owned(), value);
        Ok(())
    }

    /// Writes a field with no checks. Used while constructing instances.
    pub fn set_always(&self, name: &str, value: Value) {
        self.0.write().fields.insert(name.to_owned(), value);
    }

    /// Field names in declaration order, without `__` hidden fields.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.0
            .read()
            .fields
            .keys()
            .filter(|k| !k.starts_with("__"))
            .cloned()
            .collect()
    }

    pub fn set_readonly(&self, readonly: bool) {
        self.0.write().readonly = readonly;
    }

    pub fn set_static(&self, is_static: bool) {
        self.0.write().is_static = is_static;
    }

    pub fn set_strong_typing(&self, strong: bool) {
        self.0.write().strong_typing = strong;
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.0.read().is_static
    }

    #[must_use]
    pub fn replica(&self) -> u32 {
        self.0.read().replica
    }

    /// A deep copy that records one more replica than the source.
    #[must_use]
    pub fn copy(&self) -> Self {
        let copy = self.deep_copy();
        copy.0.write().replica = self.0.read().replica + 1;
        copy
    }

    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let data = self.0.read();
        Self(Arc::new(RwLock::new(StructData {
            type_def: data.type_def.clone(),
            fields: data.fields.iter().map(|(k, v)| (k.clone(), v.deep_copy())).collect(),
            readonly: data.readonly,
            is_static: data.is_static,
            strong_typing: data.strong_typing,
            replica: data.replica,
        })))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let names = self.field_names();
        names.len() == other.field_names().len()
            && names.iter().all(|n| match (self.get(n), other.get(n)) {
                (Some(a), Some(b)) => a.equals(&b),
                _ => false,
            })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn point() -> Type {
        Type::structure(vec![("x".into(), Type::int()), ("y".into(), Type::int())]).unwrap()
    }

    #[test]
    fn test_static_struct_rejects_unknown_fields() {
        let s = Struct::new(&point());
        s.set("x", Value::Int(3)).unwrap();
        assert_eq!(s.set("z", Value::Int(1)).unwrap_err().kind(), ErrorKind::InvalidField);
    }

    #[test]
    fn test_underscore_fields_are_write_once() {
        let s = Struct::from_fields(IndexMap::new());
        s.set("_id", Value::Int(1)).unwrap();
        assert_eq!(s.set("_id", Value::Int(2)).unwrap_err().kind(), ErrorKind::ReadOnly);
    }

    #[test]
    fn test_strong_typing_checks_declared_type() {
        let s = Struct::new(&point());
        s.set_strong_typing(true);
        assert_eq!(s.set("x", Value::from("no")).unwrap_err().kind(), ErrorKind::InvalidType);
    }

    #[test]
    fn test_hidden_fields_and_replicas() {
        let s = Struct::from_fields(IndexMap::from([
            ("__type".to_owned(), Value::from("Point")),
            ("x".to_owned(), Value::Int(1)),
        ]));
        assert_eq!(s.field_names(), vec!["x".to_owned()]);
        let c = s.copy();
        assert_eq!(c.replica(), 1);
        c.set("x", Value::Int(5)).unwrap();
        assert_eq!(s.get("x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_readonly_struct() {
        let s = Struct::new(&point());
        s.set_readonly(true);
        assert_eq!(s.set("x", Value::Int(1)).unwrap_err().kind(), ErrorKind::ReadOnly);
    }
}
