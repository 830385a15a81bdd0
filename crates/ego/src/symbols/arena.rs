use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use uuid::Uuid;

use super::table::{SymbolAttribute, SymbolTable};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    log::LogCategory,
    log_debug,
    value::{Pointer, Value},
};

/// Generational handle to a table in a [`SymbolArena`].
///
/// A handle outlives the table it names; once the table is removed every
/// lookup through the handle reports it as gone, even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId {
    index: u32,
    generation: u32,
}

impl TableId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// The root table always occupies the first arena slot.
pub const ROOT_TABLE: TableId = TableId {
    index: 0,
    generation: 0,
};

#[derive(Debug)]
struct Entry {
    generation: u32,
    table: Option<SymbolTable>,
}

#[derive(Debug)]
struct Slots {
    entries: Vec<Entry>,
    /// Indices of removed tables waiting to be reused.
    reuse_ids: Vec<u32>,
}

impl Slots {
    fn get(&self, id: TableId) -> Option<&SymbolTable> {
        self.entries
            .get(id.index())
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.table.as_ref())
    }

    fn get_mut(&mut self, id: TableId) -> Option<&mut SymbolTable> {
        self.entries
            .get_mut(id.index())
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.table.as_mut())
    }

    fn table(&self, id: TableId) -> RunResult<&SymbolTable> {
        self.get(id)
            .ok_or_else(|| EgoError::new(ErrorKind::InvalidValue).context(format!("symbol table {id}")))
    }

    fn table_mut(&mut self, id: TableId) -> RunResult<&mut SymbolTable> {
        self.get_mut(id)
            .ok_or_else(|| EgoError::new(ErrorKind::InvalidValue).context(format!("symbol table {id}")))
    }

    fn insert(&mut self, table: SymbolTable) -> TableId {
        if let Some(index) = self.reuse_ids.pop() {
            let entry = &mut self.entries[index as usize];
            entry.table = Some(table);
            TableId {
                index,
                generation: entry.generation,
            }
        } else {
            let index = u32::try_from(self.entries.len()).unwrap_or(u32::MAX);
            self.entries.push(Entry {
                generation: 0,
                table: Some(table),
            });
            TableId { index, generation: 0 }
        }
    }

    /// Finds the table and attribute holding `name`, walking parents.
    ///
    /// The walk stops at a non-shared boundary table (inclusive) and then
    /// tries the root. A parent that has been removed also ends the walk.
    fn resolve(&self, start: TableId, name: &str) -> Option<(TableId, SymbolAttribute)> {
        let mut current = Some(start);
        while let Some(id) = current {
            let Some(table) = self.get(id) else { break };
            if let Some(attr) = table.symbols.get(name) {
                return Some((id, *attr));
            }
            if table.is_root || (table.boundary && !table.shared) {
                break;
            }
            current = table.parent;
        }
        let root = self.get(ROOT_TABLE)?;
        root.symbols.get(name).map(|attr| (ROOT_TABLE, *attr))
    }
}

/// Owner of every symbol table of a program.
///
/// Tables refer to their parent by [`TableId`], never by reference, so
/// package and scope cycles cannot leak and removal is deterministic. All
/// access is serialized by one lock shared by every task of the program.
#[derive(Debug)]
pub struct SymbolArena {
    slots: RwLock<Slots>,
}

impl SymbolArena {
    /// Creates an arena holding only the root table.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let mut root = SymbolTable::new("Root", None);
        root.is_root = true;
        root.shared = true;
        Arc::new(Self {
            slots: RwLock::new(Slots {
                entries: vec![Entry {
                    generation: 0,
                    table: Some(root),
                }],
                reuse_ids: Vec::new(),
            }),
        })
    }

    #[must_use]
    pub fn root(&self) -> TableId {
        ROOT_TABLE
    }

    /// Creates a child table of `parent`.
    pub fn new_child(&self, name: &str, parent: TableId, boundary: bool) -> TableId {
        let mut table = SymbolTable::new(name, Some(parent));
        table.boundary = boundary;
        let id = self.slots.write().insert(table);
        log_debug!(LogCategory::Symbol, "+++ new table {name} {id} parent {parent} boundary {boundary}");
        id
    }

    /// Creates a table with no parent; lookups still fall back to the root.
    pub fn new_table(&self, name: &str) -> TableId {
        self.slots.write().insert(SymbolTable::new(name, None))
    }

    /// Drops a table and its value bins. The root is never removed.
    pub fn remove(&self, id: TableId) {
        if id == ROOT_TABLE {
            return;
        }
        let mut slots = self.slots.write();
        if let Some(entry) = slots.entries.get_mut(id.index())
            && entry.generation == id.generation
            && entry.table.is_some()
        {
            entry.table = None;
            entry.generation = entry.generation.wrapping_add(1);
            slots.reuse_ids.push(id.index);
            log_debug!(LogCategory::Symbol, "--- removed table {id}");
        }
    }

    #[must_use]
    pub fn contains(&self, id: TableId) -> bool {
        self.slots.read().get(id).is_some()
    }

    #[must_use]
    pub fn name(&self, id: TableId) -> Option<String> {
        self.slots.read().get(id).map(|t| t.name.clone())
    }

    #[must_use]
    pub fn uuid(&self, id: TableId) -> Option<Uuid> {
        self.slots.read().get(id).map(|t| t.id)
    }

    #[must_use]
    pub fn parent(&self, id: TableId) -> Option<TableId> {
        self.slots.read().get(id).and_then(|t| t.parent)
    }

    #[must_use]
    pub fn is_boundary(&self, id: TableId) -> bool {
        self.slots.read().get(id).is_some_and(|t| t.boundary)
    }

    pub fn set_boundary(&self, id: TableId, boundary: bool) -> RunResult<()> {
        self.slots.write().table_mut(id)?.boundary = boundary;
        Ok(())
    }

    pub fn set_shared(&self, id: TableId, shared: bool) -> RunResult<()> {
        self.slots.write().table_mut(id)?.shared = shared;
        Ok(())
    }

    #[must_use]
    pub fn for_package(&self, id: TableId) -> String {
        self.slots
            .read()
            .get(id)
            .map(|t| t.for_package.clone())
            .unwrap_or_default()
    }

    pub fn set_for_package(&self, id: TableId, package: &str) -> RunResult<()> {
        self.slots.write().table_mut(id)?.for_package = package.to_owned();
        Ok(())
    }

    /// Reads `name`, walking parents under the boundary rules.
    #[must_use]
    pub fn get(&self, table: TableId, name: &str) -> Option<Value> {
        let slots = self.slots.read();
        let (id, attr) = slots.resolve(table, name)?;
        slots.get(id).and_then(|t| t.value(attr.slot)).cloned()
    }

    /// Reads `name` from `table` only.
    #[must_use]
    pub fn get_local(&self, table: TableId, name: &str) -> Option<Value> {
        self.slots.read().get(table).and_then(|t| t.lookup(name)).cloned()
    }

    /// True when `name` is defined directly in `table`.
    #[must_use]
    pub fn is_local(&self, table: TableId, name: &str) -> bool {
        self.slots
            .read()
            .get(table)
            .is_some_and(|t| t.symbols.contains_key(name))
    }

    /// Writes into the nearest visible definition of `name`, or creates it in `table`.
    pub fn set(&self, table: TableId, name: &str, value: Value) -> RunResult<()> {
        let mut slots = self.slots.write();
        let target = match slots.resolve(table, name) {
            Some((id, attr)) => {
                if attr.readonly || attr.constant {
                    return Err(EgoError::new(ErrorKind::ReadOnly).context(name));
                }
                id
            }
            None => table,
        };
        slots.table_mut(target)?.store(name, value);
        log_debug!(LogCategory::Symbol, "set {name} in {target}");
        Ok(())
    }

    /// Creates or overwrites `name` in `table` itself, ignoring readonly flags.
    pub fn set_always(&self, table: TableId, name: &str, value: Value) -> RunResult<()> {
        self.slots.write().table_mut(table)?.store(name, value);
        Ok(())
    }

    /// Creates or overwrites `name` in `table` and marks it constant.
    pub fn set_constant(&self, table: TableId, name: &str, value: Value) -> RunResult<()> {
        let mut slots = self.slots.write();
        let t = slots.table_mut(table)?;
        t.store(name, value);
        if let Some(attr) = t.symbols.get_mut(name) {
            attr.constant = true;
        }
        Ok(())
    }

    pub fn set_readonly(&self, table: TableId, name: &str, readonly: bool) -> RunResult<()> {
        let mut slots = self.slots.write();
        let attr = slots
            .table_mut(table)?
            .symbols
            .get_mut(name)
            .ok_or_else(|| EgoError::new(ErrorKind::UnknownSymbol).context(name))?;
        attr.readonly = readonly;
        Ok(())
    }

    /// Creates `name` with a null value; fails `SymbolExists` if `table` already has it.
    pub fn create(&self, table: TableId, name: &str) -> RunResult<()> {
        let mut slots = self.slots.write();
        let t = slots.table_mut(table)?;
        if t.symbols.contains_key(name) {
            return Err(EgoError::new(ErrorKind::SymbolExists).context(name));
        }
        t.store(name, Value::Null);
        Ok(())
    }

    /// Removes `name` from `table`. Unless `always`, a missing or readonly name is an error.
    pub fn delete(&self, table: TableId, name: &str, always: bool) -> RunResult<()> {
        let mut slots = self.slots.write();
        let t = slots.table_mut(table)?;
        match t.symbols.get(name) {
            None if always => Ok(()),
            None => Err(EgoError::new(ErrorKind::UnknownSymbol).context(name)),
            Some(attr) if !always && (attr.readonly || attr.constant) => {
                Err(EgoError::new(ErrorKind::ReadOnly).context(name))
            }
            Some(_) => {
                t.remove(name);
                Ok(())
            }
        }
    }

    /// The address of the visible definition of `name`.
    pub fn address_of(&self, table: TableId, name: &str) -> RunResult<Pointer> {
        let slots = self.slots.read();
        slots
            .resolve(table, name)
            .map(|(table, attr)| Pointer { table, slot: attr.slot })
            .ok_or_else(|| EgoError::new(ErrorKind::UnknownSymbol).context(name))
    }

    /// Reads through a pointer; a removed table is a nil pointer reference.
    pub fn deref(&self, pointer: Pointer) -> RunResult<Value> {
        let slots = self.slots.read();
        slots
            .get(pointer.table)
            .and_then(|t| t.value(pointer.slot))
            .cloned()
            .ok_or_else(|| ErrorKind::NilPointerReference.into())
    }

    /// Writes through a pointer.
    pub fn store_via(&self, pointer: Pointer, value: Value) -> RunResult<()> {
        let mut slots = self.slots.write();
        let target = slots
            .get_mut(pointer.table)
            .and_then(|t| t.value_mut(pointer.slot))
            .ok_or_else(|| EgoError::new(ErrorKind::NilPointerReference))?;
        *target = value;
        Ok(())
    }

    /// Sorted names defined directly in `table`.
    #[must_use]
    pub fn names(&self, table: TableId) -> Vec<String> {
        let slots = self.slots.read();
        let mut names: Vec<String> = slots
            .get(table)
            .map(|t| t.symbols.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Name/value pairs defined directly in `table`, sorted by name.
    #[must_use]
    pub fn local_symbols(&self, table: TableId) -> Vec<(String, Value)> {
        let slots = self.slots.read();
        let Some(t) = slots.get(table) else {
            return Vec::new();
        };
        let mut pairs: Vec<(String, Value)> = t
            .symbols
            .iter()
            .filter_map(|(name, attr)| t.value(attr.slot).map(|v| (name.clone(), v.clone())))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }

    /// The scope just outside the function containing `table`: the parent of
    /// the nearest boundary table, or the root.
    #[must_use]
    pub fn find_next_scope(&self, table: TableId) -> TableId {
        let slots = self.slots.read();
        let mut current = Some(table);
        while let Some(id) = current {
            let Some(t) = slots.get(id) else { break };
            if t.boundary {
                return t.parent.filter(|p| slots.get(*p).is_some()).unwrap_or(ROOT_TABLE);
            }
            current = t.parent;
        }
        ROOT_TABLE
    }

    /// Copies the symbols of `table` into a new sibling table named `name`.
    pub fn clone_table(&self, table: TableId, name: &str) -> RunResult<TableId> {
        let mut slots = self.slots.write();
        let source = slots.table(table)?;
        let mut copy = SymbolTable::new(name, source.parent);
        copy.boundary = source.boundary;
        copy.shared = source.shared;
        copy.for_package.clone_from(&source.for_package);
        let mut pairs: Vec<(&String, &SymbolAttribute)> = source.symbols.iter().collect();
        pairs.sort_by_key(|(_, attr)| attr.slot);
        for (sym, attr) in pairs {
            let value = source.value(attr.slot).cloned().unwrap_or_default();
            copy.store(sym, value);
            if let Some(new_attr) = copy.symbols.get_mut(sym.as_str()) {
                new_attr.readonly = attr.readonly;
                new_attr.constant = attr.constant;
            }
        }
        Ok(slots.insert(copy))
    }

    /// Number of live tables, root included.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.slots.read().entries.iter().filter(|e| e.table.is_some()).count()
    }

    /// A multi-line dump of `table` for diagnostics.
    #[must_use]
    pub fn format(&self, table: TableId) -> String {
        use std::fmt::Write as _;
        let slots = self.slots.read();
        let Some(t) = slots.get(table) else {
            return format!("<removed table {table}>");
        };
        let mut out = format!(
            "Symbol table {} {} (size {}, bins {}{}{})\n",
            t.name,
            table,
            t.size(),
            t.bins(),
            if t.boundary { ", boundary" } else { "" },
            if t.shared { ", shared" } else { "" },
        );
        let mut names: Vec<(&String, &SymbolAttribute)> = t.symbols.iter().collect();
        names.sort_by(|a, b| a.0.cmp(b.0));
        for (name, attr) in names {
            let value = t.value(attr.slot).map(ToString::to_string).unwrap_or_default();
            let flag = if attr.constant {
                " (constant)"
            } else if attr.readonly {
                " (readonly)"
            } else {
                ""
            };
            let _ = writeln!(out, "   {name:<20} = {value}{flag}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_generation_invalidates_stale_handles() {
        let arena = SymbolArena::new();
        let a = arena.new_child("a", arena.root(), false);
        arena.remove(a);
        let b = arena.new_child("b", arena.root(), false);
        assert_eq!(a.index(), b.index());
        assert!(!arena.contains(a));
        assert!(arena.contains(b));
        assert_eq!(arena.get_local(a, "x"), None);
    }

    #[test]
    fn test_set_writes_to_defining_scope() {
        let arena = SymbolArena::new();
        let outer = arena.new_child("outer", arena.root(), false);
        let inner = arena.new_child("inner", outer, false);
        arena.set_always(outer, "x", Value::Int(1)).unwrap();
        arena.set(inner, "x", Value::Int(2)).unwrap();
        assert_eq!(arena.get_local(outer, "x"), Some(Value::Int(2)));
        assert!(!arena.is_local(inner, "x"));
        arena.set(inner, "y", Value::Int(3)).unwrap();
        assert!(arena.is_local(inner, "y"));
    }

    #[test]
    fn test_constants_reject_set() {
        let arena = SymbolArena::new();
        let t = arena.new_child("t", arena.root(), false);
        arena.set_constant(t, "pi", Value::Float64(2.5)).unwrap();
        assert_eq!(arena.set(t, "pi", Value::Int(3)).unwrap_err().kind(), ErrorKind::ReadOnly);
        arena.set_always(t, "pi", Value::Int(3)).unwrap();
        assert_eq!(arena.delete(t, "pi", false).unwrap_err().kind(), ErrorKind::ReadOnly);
    }

    #[test]
    fn test_create_and_delete() {
        let arena = SymbolArena::new();
        let t = arena.new_child("t", arena.root(), false);
        arena.create(t, "a").unwrap();
        assert_eq!(arena.create(t, "a").unwrap_err().kind(), ErrorKind::SymbolExists);
        arena.delete(t, "a", false).unwrap();
        assert_eq!(arena.delete(t, "a", false).unwrap_err().kind(), ErrorKind::UnknownSymbol);
        arena.delete(t, "a", true).unwrap();
    }

    #[test]
    fn test_find_next_scope() {
        let arena = SymbolArena::new();
        let caller = arena.new_child("caller", arena.root(), false);
        let func = arena.new_child("func", caller, true);
        let block = arena.new_child("block", func, false);
        assert_eq!(arena.find_next_scope(block), caller);
        assert_eq!(arena.find_next_scope(caller), arena.root());
    }

    #[test]
    fn test_clone_table_copies_values_and_flags() {
        let arena = SymbolArena::new();
        let t = arena.new_child("t", arena.root(), true);
        arena.set_always(t, "a", Value::Int(1)).unwrap();
        arena.set_constant(t, "k", Value::from("c")).unwrap();
        let c = arena.clone_table(t, "copy").unwrap();
        assert_eq!(arena.names(c), vec!["a".to_owned(), "k".to_owned()]);
        assert!(arena.is_boundary(c));
        assert_eq!(arena.set(c, "k", Value::Null).unwrap_err().kind(), ErrorKind::ReadOnly);
        arena.set(c, "a", Value::Int(5)).unwrap();
        assert_eq!(arena.get_local(t, "a"), Some(Value::Int(1)));
    }

    #[test]
    fn test_format_lists_symbols() {
        let arena = SymbolArena::new();
        arena.set_always(arena.root(), "answer", Value::Int(42)).unwrap();
        let text = arena.format(arena.root());
        assert!(text.starts_with("Symbol table Root #0.0"), "{text}");
        assert!(text.contains("answer"), "{text}");
    }
}
