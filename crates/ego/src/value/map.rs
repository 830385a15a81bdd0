use std::{cmp::Ordering, sync::Arc};

use ahash::RandomState;
use indexmap::IndexMap;
use parking_lot::RwLock;

use super::{Kind, Type, Value, is_numeric};
use crate::errors::{EgoError, ErrorKind, RunResult};

/// Hashable projection of the scalar values allowed as map keys.
#[derive(Debug, Clone)]
enum MapKey {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl MapKey {
    fn from_value(v: &Value) -> RunResult<Self> {
        match v.unwrapped() {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Float32(_) | Value::Float64(_) => Ok(Self::Float(v.as_float()?)),
            other if is_numeric(other.kind()) => Ok(Self::Int(other.as_int()?)),
            other => Err(EgoError::new(ErrorKind::InvalidType).context(format!("map key {}", other.kind()))),
        }
    }

    fn to_value(&self, key_type: &Type) -> Value {
        let raw = match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Float(f) => Value::Float64(*f),
            Self::String(s) => Value::String(s.clone()),
        };
        match key_type.kind() {
            Kind::Interface => raw,
            _ => key_type.coerce(raw.clone()).unwrap_or(raw),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Int(_) | Self::Float(_) => 1,
            Self::String(_) => 2,
        }
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MapKey {}

impl std::hash::Hash for MapKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => float_bits(*i as f64).hash(state),
            Self::Float(f) => float_bits(*f).hash(state),
            Self::String(s) => s.hash(state),
        }
    }
}

/// Bit pattern with both zeroes folded together, so numerically equal integer
/// and float keys hash alike.
fn float_bits(f: f64) -> u64 {
    if f.to_bits() << 1 == 0 { 0 } else { f.to_bits() }
}

impl PartialOrd for MapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).total_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.total_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

#[derive(Debug)]
struct MapData {
    key_type: Type,
    value_type: Type,
    entries: IndexMap<MapKey, Value, RandomState>,
    /// Nesting count of active `range` loops; non-zero forbids new keys.
    immutable_keys: u32,
}

/// A shared associative map.
#[derive(Debug, Clone)]
pub struct Map(Arc<RwLock<MapData>>);

impl Map {
    #[must_use]
    pub fn new(key_type: Type, value_type: Type) -> Self {
        Self(Arc::new(RwLock::new(MapData {
            key_type,
            value_type,
            entries: IndexMap::with_hasher(RandomState::new()),
            immutable_keys: 0,
        })))
    }

    #[must_use]
    pub fn key_type(&self) -> Type {
        self.0.read().key_type.clone()
    }

    #[must_use]
    pub fn value_type(&self) -> Type {
        self.0.read().value_type.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().entries.len()
    }

    /// Looks up `key`, returning `None` when absent.
    pub fn get(&self, key: &Value) -> RunResult<Option<Value>> {
        let key = MapKey::from_value(key)?;
        Ok(self.0.read().entries.get(&key).cloned())
    }

    /// Stores `value` under `key`.
    ///
    /// While the key set is frozen by a `range`, existing keys may still be
    /// updated but new keys fail `ImmutableMap`.
    pub fn set(&self, key: Value, value: Value) -> RunResult<()> {
        let mut data = self.0.write();
        if !data.key_type.is_interface() && !data.key_type.is_type(&key.type_of()) {
            return Err(EgoError::new(ErrorKind::TypeMismatch).context(format!("key {}", key.type_of())));
        }
        if !data.value_type.is_interface() && !value.is_null() && !data.value_type.is_type(&value.type_of()) {
            return Err(EgoError::new(ErrorKind::TypeMismatch).context(format!("value {}", value.type_of())));
        }
        let key = MapKey::from_value(&key)?;
        if data.immutable_keys > 0 && !data.entries.contains_key(&key) {
            return Err(ErrorKind::ImmutableMap.into());
        }
        data.entries.insert(key, value);
        Ok(())
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete(&self, key: &Value) -> RunResult<bool> {
        let key = MapKey::from_value(key)?;
        Ok(self.0.write().entries.shift_remove(&key).is_some())
    }

    /// The keys in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<Value> {
        let data = self.0.read();
        let mut keys: Vec<&MapKey> = data.entries.keys().collect();
        keys.sort();
        keys.into_iter().map(|k| k.to_value(&data.key_type)).collect()
    }

    /// Copies every entry of `other` into this map, right side winning.
    pub fn merge(&self, other: &Self) -> RunResult<()> {
        if self.ptr_eq(other) {
            return Ok(());
        }
        for key in other.keys() {
            let value = other.get(&key)?.unwrap_or_default();
            self.set(key, value)?;
        }
        Ok(())
    }

    pub fn set_immutable_keys(&self, immutable: bool) {
        let mut data = self.0.write();
        if immutable {
            data.immutable_keys += 1;
        } else {
            data.immutable_keys = data.immutable_keys.saturating_sub(1);
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let data = self.0.read();
        let copy = Self::new(data.key_type.clone(), data.value_type.clone());
        {
            let mut target = copy.0.write();
            for (k, v) in &data.entries {
                target.entries.insert(k.clone(), v.deep_copy());
            }
        }
        copy
    }

    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let keys = self.keys();
        keys.len() == other.len()
            && keys.iter().all(|k| match (self.get(k), other.get(k)) {
                (Ok(Some(a)), Ok(Some(b))) => a.equals(&b),
                _ => false,
            })
    }
}
