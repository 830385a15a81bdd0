//! Symbol loads and stores, pointers and block scopes.

use std::sync::Arc;

use super::{Context, DISCARD_VAR, PACKAGE_FUNCTION_SCOPE};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    log::LogCategory,
    log_debug,
    symbols::ROOT_TABLE,
    value::Value,
};

impl Context {
    pub(super) fn op_load(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        let v = self
            .arena
            .get(self.symbols, name)
            .ok_or_else(|| EgoError::new(ErrorKind::UnknownSymbol).context(name))?;
        self.push(v.into_unwrapped());
        Ok(())
    }

    /// In static mode a store may not change the type of a non-nil variable.
    fn check_store_type(&self, name: &str, value: &Value) -> RunResult<()> {
        if !self.static_types || value.is_null() {
            return Ok(());
        }
        match self.arena.get(self.symbols, name) {
            Some(old) if !old.is_null() && !old.type_of().is_type(&value.type_of()) => {
                Err(EgoError::new(ErrorKind::InvalidVarType).context(name))
            }
            _ => Ok(()),
        }
    }

    pub(super) fn op_store(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        let v = self.pop_value()?;
        if name == DISCARD_VAR {
            return Ok(());
        }
        self.check_store_type(name, &v)?;
        if name.starts_with('_') && self.arena.get(self.symbols, name).is_some() {
            return Err(EgoError::new(ErrorKind::ReadOnly).context(name));
        }
        self.arena.set(self.symbols, name, v)
    }

    /// Stores into the current table regardless of read-only flags.
    pub(super) fn op_store_always(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        let v = self.pop_value()?;
        self.arena.set_always(self.symbols, name, v)
    }

    pub(super) fn op_store_global(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        let v = self.pop_value()?;
        self.arena.set_always(ROOT_TABLE, name, v)
    }

    /// `name := value`: the name must be new to the current table.
    pub(super) fn op_create_and_store(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        let v = self.pop_value()?;
        if name == DISCARD_VAR {
            return Ok(());
        }
        self.arena.create(self.symbols, name)?;
        self.arena.set(self.symbols, name, v)
    }

    pub(super) fn op_symbol_create(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        self.arena.create(self.symbols, name)
    }

    pub(super) fn op_symbol_opt_create(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        if self.arena.is_local(self.symbols, name) {
            return Ok(());
        }
        self.arena.create(self.symbols, name)
    }

    pub(super) fn op_symbol_delete(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        self.arena.delete(self.symbols, name, false)
    }

    pub(super) fn op_constant(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        let v = self.pop_value()?;
        self.arena
            .set_constant(self.symbols, name, Value::Constant(Box::new(v.into_unwrapped())))
    }

    /// Binds a function body. A `Type.method` name attaches it to the type
    /// as a receiver function instead.
    pub(super) fn op_store_bytecode(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        let Value::ByteCode(code) = self.pop_value()?.into_unwrapped() else {
            return Err(EgoError::new(ErrorKind::InvalidType).context(name));
        };
        let mut code = Arc::unwrap_or_clone(code);
        match name.split_once('.') {
            Some((type_name, method)) => {
                code.set_name(method);
                match self.arena.get(self.symbols, type_name).map(Value::into_unwrapped) {
                    Some(Value::Type(t)) => {
                        log_debug!(LogCategory::Symbol, "add function {method} to type {t}");
                        t.add_function(method, Value::from(code));
                        Ok(())
                    }
                    Some(other) => Err(EgoError::new(ErrorKind::InvalidType).context(other.kind())),
                    None => Err(EgoError::new(ErrorKind::UnknownSymbol).context(type_name)),
                }
            }
            None => {
                code.set_name(name);
                self.arena.set_always(self.symbols, name, Value::from(code))
            }
        }
    }

    pub(super) fn op_address_of(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        let pointer = self.arena.address_of(self.symbols, name)?;
        self.push(Value::Pointer(pointer));
        Ok(())
    }

    pub(super) fn op_deref(&mut self, _operand: &Value) -> RunResult<()> {
        match self.pop_value()?.into_unwrapped() {
            Value::Null => Err(ErrorKind::NilPointerReference.into()),
            Value::Pointer(pointer) => {
                let v = self.arena.deref(pointer)?;
                self.push(v.into_unwrapped());
                Ok(())
            }
            other => Err(EgoError::new(ErrorKind::NotAPointer).context(other.kind())),
        }
    }

    /// Writes the top of stack through the pointer held in `name`.
    pub(super) fn op_store_via_pointer(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?;
        let target = self
            .arena
            .get(self.symbols, name)
            .ok_or_else(|| EgoError::new(ErrorKind::UnknownSymbol).context(name))?;
        match target.into_unwrapped() {
            Value::Null => Err(EgoError::new(ErrorKind::NilPointerReference).context(name)),
            Value::Pointer(pointer) => {
                let v = self.pop_value()?;
                self.arena.store_via(pointer, v)
            }
            other => Err(EgoError::new(ErrorKind::NotAPointer).context(other.kind())),
        }
    }

    pub(super) fn op_push_scope(&mut self, _operand: &Value) -> RunResult<()> {
        self.symbols = self.arena.new_child("block", self.symbols, false);
        self.block_depth += 1;
        Ok(())
    }

    /// Drops the current block table. Scopes wrapped around package function
    /// calls are stepped over so the block's parent is the function's caller.
    pub(super) fn op_pop_scope(&mut self, _operand: &Value) -> RunResult<()> {
        let current = self.symbols;
        let Some(mut parent) = self.arena.parent(current) else {
            return Err(EgoError::new(ErrorKind::InvalidValue).context("no scope to pop"));
        };
        self.arena.remove(current);
        while self
            .arena
            .name(parent)
            .is_some_and(|n| n.starts_with(PACKAGE_FUNCTION_SCOPE))
        {
            match self.arena.parent(parent) {
                Some(p) => parent = p,
                None => break,
            }
        }
        log_debug!(
            LogCategory::Symbol,
            "({}) pop symbol table {current} => {parent}",
            self.thread_id
        );
        self.symbols = parent;
        self.block_depth = self.block_depth.saturating_sub(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::{
        bytecode::{ByteCode, Opcode},
        errors::{ErrorKind, RunResult},
        symbols::{ROOT_TABLE, SymbolArena},
        value::{Type, Value},
        vm::Context,
    };

    fn run(arena: Arc<SymbolArena>, build: impl FnOnce(&mut ByteCode)) -> (Context, RunResult<()>) {
        let mut code = ByteCode::new("vars");
        build(&mut code);
        let mut ctx = Context::new(arena, ROOT_TABLE, code);
        let result = ctx.run();
        (ctx, result)
    }

    #[test]
    fn test_store_then_load() {
        let (ctx, result) = run(SymbolArena::new(), |b| {
            b.emit_with(Opcode::Push, 5);
            b.emit_with(Opcode::Store, "x");
            b.emit_with(Opcode::Load, "x");
        });
        result.unwrap();
        assert_eq!(ctx.stack(), &[Value::Int(5)]);
    }

    #[test]
    fn test_load_unknown_symbol() {
        let (_, result) = run(SymbolArena::new(), |b| b.emit_with(Opcode::Load, "nope"));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnknownSymbol);
    }

    #[test]
    fn test_underscore_names_are_read_only_once_set() {
        let (_, result) = run(SymbolArena::new(), |b| {
            b.emit_with(Opcode::Push, 1);
            b.emit_with(Opcode::StoreAlways, "_hidden");
            b.emit_with(Opcode::Push, 2);
            b.emit_with(Opcode::Store, "_hidden");
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ReadOnly);
    }

    #[test]
    fn test_static_store_keeps_type() {
        let mut code = ByteCode::new("vars");
        code.emit_with(Opcode::Push, 1);
        code.emit_with(Opcode::Store, "n");
        code.emit_with(Opcode::Push, "text");
        code.emit_with(Opcode::Store, "n");
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        ctx.set_static(true);
        let err = ctx.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidVarType);
    }

    #[test]
    fn test_constants_cannot_be_stored() {
        let (_, result) = run(SymbolArena::new(), |b| {
            b.emit_with(Opcode::Push, 3.5);
            b.emit_with(Opcode::Constant, "pi");
            b.emit_with(Opcode::Push, 1);
            b.emit_with(Opcode::Store, "pi");
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ReadOnly);
    }

    #[test]
    fn test_create_and_store_rejects_redeclaration() {
        let (_, result) = run(SymbolArena::new(), |b| {
            b.emit_with(Opcode::Push, 1);
            b.emit_with(Opcode::CreateAndStore, "x");
            b.emit_with(Opcode::Push, 2);
            b.emit_with(Opcode::CreateAndStore, "x");
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::SymbolExists);
    }

    #[test]
    fn test_pointers() {
        let (ctx, result) = run(SymbolArena::new(), |b| {
            b.emit_with(Opcode::Push, 1);
            b.emit_with(Opcode::Store, "x");
            b.emit_with(Opcode::AddressOf, "x");
            b.emit_with(Opcode::Store, "p");
            b.emit_with(Opcode::Push, 9);
            b.emit_with(Opcode::StoreViaPointer, "p");
            b.emit_with(Opcode::Load, "p");
            b.emit(Opcode::DeRef);
            b.emit_with(Opcode::Load, "x");
        });
        result.unwrap();
        assert_eq!(ctx.stack(), &[Value::Int(9), Value::Int(9)]);
    }

    #[test]
    fn test_deref_of_non_pointer() {
        let (_, result) = run(SymbolArena::new(), |b| {
            b.emit_with(Opcode::Push, 1);
            b.emit(Opcode::DeRef);
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotAPointer);
    }

    #[test]
    fn test_block_scope_hides_inner_symbols() {
        let arena = SymbolArena::new();
        let before = arena.table_count();
        let (ctx, result) = run(Arc::clone(&arena), |b| {
            b.emit(Opcode::PushScope);
            b.emit_with(Opcode::Push, 1);
            b.emit_with(Opcode::CreateAndStore, "inner");
            b.emit(Opcode::PopScope);
            b.emit_with(Opcode::Load, "inner");
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnknownSymbol);
        assert_eq!(ctx.symbols(), ROOT_TABLE);
        assert_eq!(arena.table_count(), before);
    }

    #[test]
    fn test_store_bytecode_attaches_receiver_functions() {
        let arena = SymbolArena::new();
        let point = Type::user_defined("Point", None, Type::structure(vec![("x".into(), Type::int())]).unwrap());
        arena.set_always(ROOT_TABLE, "Point", Value::Type(point.clone())).unwrap();
        let (_, result) = run(arena, |b| {
            b.emit_with(Opcode::Push, ByteCode::new("anonymous"));
            b.emit_with(Opcode::StoreBytecode, "Point.Norm");
        });
        result.unwrap();
        let Some(Value::ByteCode(code)) = point.function("Norm") else {
            panic!("Norm was not attached");
        };
        assert_eq!(code.name(), "Norm");
    }
}
