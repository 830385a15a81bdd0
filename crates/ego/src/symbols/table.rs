use ahash::AHashMap;
use uuid::Uuid;

use super::TableId;
use crate::value::Value;

/// Number of value slots in one storage bin.
pub const SYMBOL_ALLOCATION_SIZE: usize = 32;

/// Per-symbol bookkeeping: where the value lives and how it may be written.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SymbolAttribute {
    pub slot: usize,
    pub readonly: bool,
    pub constant: bool,
}

/// One scope of named values.
///
/// Values are stored in fixed-size bins. Growing the table appends a bin and
/// never moves an existing one, so a slot number stays valid for the life of
/// the table.
#[derive(Debug)]
pub struct SymbolTable {
    pub(crate) name: String,
    pub(crate) id: Uuid,
    pub(crate) parent: Option<TableId>,
    pub(crate) boundary: bool,
    pub(crate) shared: bool,
    pub(crate) is_root: bool,
    pub(crate) for_package: String,
    pub(crate) symbols: AHashMap<String, SymbolAttribute>,
    values: Vec<Box<[Value]>>,
    size: usize,
}

impl SymbolTable {
    pub(crate) fn new(name: &str, parent: Option<TableId>) -> Self {
        Self {
            name: name.to_owned(),
            id: Uuid::new_v4(),
            parent,
            boundary: false,
            shared: false,
            is_root: false,
            for_package: String::new(),
            symbols: AHashMap::new(),
            values: Vec::new(),
            size: 0,
        }
    }

    /// Hands out the next slot, appending a bin when the current ones are full.
    fn allocate(&mut self) -> usize {
        let slot = self.size;
        if slot / SYMBOL_ALLOCATION_SIZE == self.values.len() {
            self.values
                .push(vec![Value::Null; SYMBOL_ALLOCATION_SIZE].into_boxed_slice());
        }
        self.size += 1;
        slot
    }

    pub(crate) fn value(&self, slot: usize) -> Option<&Value> {
        self.values
            .get(slot / SYMBOL_ALLOCATION_SIZE)
            .and_then(|bin| bin.get(slot % SYMBOL_ALLOCATION_SIZE))
            .filter(|_| slot < self.size)
    }

    pub(crate) fn value_mut(&mut self, slot: usize) -> Option<&mut Value> {
        if slot >= self.size {
            return None;
        }
        self.values
            .get_mut(slot / SYMBOL_ALLOCATION_SIZE)
            .and_then(|bin| bin.get_mut(slot % SYMBOL_ALLOCATION_SIZE))
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Value> {
        self.symbols.get(name).and_then(|attr| self.value(attr.slot))
    }

    /// Creates or overwrites `name` in this table, returning its slot.
    pub(crate) fn store(&mut self, name: &str, value: Value) -> usize {
        let slot = match self.symbols.get(name) {
            Some(attr) => attr.slot,
            None => {
                let slot = self.allocate();
                self.symbols.insert(
                    name.to_owned(),
                    SymbolAttribute {
                        slot,
                        readonly: false,
                        constant: false,
                    },
                );
                slot
            }
        };
        if let Some(target) = self.value_mut(slot) {
            *target = value;
        }
        slot
    }

    /// Forgets `name`; the slot is not reused.
    pub(crate) fn remove(&mut self, name: &str) -> bool {
        match self.symbols.remove(name) {
            Some(attr) => {
                if let Some(v) = self.value_mut(attr.slot) {
                    *v = Value::Null;
                }
                true
            }
            None => false,
        }
    }

    /// Number of slots ever allocated.
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn bins(&self) -> usize {
        self.values.len()
    }
}
