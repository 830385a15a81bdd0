use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::Value;
use crate::symbols::TableId;

#[derive(Debug)]
struct PackageData {
    name: String,
    items: IndexMap<String, Value>,
    /// The package's own symbol table (`__symbols`), holding package globals.
    symbols: Option<TableId>,
}

/// A named collection of exported values.
#[derive(Debug, Clone)]
pub struct Package(Arc<RwLock<PackageData>>);

impl Package {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Arc::new(RwLock::new(PackageData {
            name: name.to_owned(),
            items: IndexMap::new(),
            symbols: None,
        })))
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.0.read().name.clone()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.read().items.get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.0.write().items.insert(name.to_owned(), value);
    }

    /// Exported item names in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.0.read().items.keys().cloned().collect()
    }

    #[must_use]
    pub fn symbols(&self) -> Option<TableId> {
        self.0.read().symbols
    }

    pub fn set_symbols(&self, table: TableId) {
        self.0.write().symbols = Some(table);
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
