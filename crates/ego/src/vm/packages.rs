//! Package scopes, imports and source file bookkeeping.

use super::{Context, PackageScope, has_capitalized_name};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    log::LogCategory,
    log_debug,
    symbols::ROOT_TABLE,
    value::{Package, Value},
};

impl Context {
    /// Binds the package `name` from the root table into the current table,
    /// under the last element of its path.
    pub(super) fn op_import(&mut self, operand: &Value) -> RunResult<()> {
        let path = Self::operand_name(operand)?;
        let name = path.rsplit('/').next().unwrap_or(path);
        let Some(Value::Package(package)) = self.arena.get(ROOT_TABLE, name).map(Value::into_unwrapped) else {
            return Err(EgoError::new(ErrorKind::InvalidPackageName).context(path));
        };
        log_debug!(LogCategory::Symbol, "({}) import {path}", self.thread_id);
        self.arena.set_always(self.symbols, name, Value::Package(package))
    }

    /// Starts the definitions of package `name`. They go into a fresh
    /// package scope until the matching `PopPackage`.
    pub(super) fn op_push_package(&mut self, operand: &Value) -> RunResult<()> {
        let name = Self::operand_name(operand)?.to_owned();
        let package = match self.arena.get_local(ROOT_TABLE, &name).map(Value::into_unwrapped) {
            Some(Value::Package(p)) => p,
            _ => Package::new(&name),
        };
        let table = match package.symbols().filter(|&t| self.arena.contains(t)) {
            Some(t) => t,
            None => {
                let t = self.arena.new_child(&format!("package {name}"), ROOT_TABLE, true);
                self.arena.set_for_package(t, &name)?;
                package.set_symbols(t);
                t
            }
        };
        self.package_stack.push(PackageScope {
            name: name.clone(),
            package,
            table,
            saved_symbols: self.symbols,
            saved_pkg: std::mem::replace(&mut self.pkg, name),
        });
        self.symbols = table;
        Ok(())
    }

    /// Ends a package definition: its exported symbols are copied into the
    /// package, which is then stored in the root table.
    pub(super) fn op_pop_package(&mut self, _operand: &Value) -> RunResult<()> {
        let scope = self
            .package_stack
            .pop()
            .ok_or_else(|| EgoError::new(ErrorKind::InvalidPackageName).context("no active package"))?;
        for (name, value) in self.arena.local_symbols(scope.table) {
            if has_capitalized_name(&name) {
                scope.package.set(&name, value.into_unwrapped());
            }
        }
        log_debug!(
            LogCategory::Symbol,
            "({}) package {} defines {:?}",
            self.thread_id,
            scope.name,
            scope.package.keys()
        );
        self.arena
            .set_always(ROOT_TABLE, &scope.name, Value::Package(scope.package))?;
        self.symbols = scope.saved_symbols;
        self.pkg = scope.saved_pkg;
        Ok(())
    }

    pub(super) fn op_in_package(&mut self, operand: &Value) -> RunResult<()> {
        self.pkg = Self::operand_name(operand)?.to_owned();
        Ok(())
    }

    pub(super) fn op_in_file(&mut self, operand: &Value) -> RunResult<()> {
        self.source_file = Self::operand_name(operand)?.to_owned();
        self.line = 0;
        Ok(())
    }

    /// Pushes the contents of the file named by the operand, or by the top
    /// of stack when there is no operand.
    pub(super) fn op_from_file(&mut self, operand: &Value) -> RunResult<()> {
        let path = if operand.is_null() {
            self.pop_value()?.to_string()
        } else {
            Self::operand_name(operand)?.to_owned()
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|err| EgoError::new(ErrorKind::InvalidFileIdentifier).context(format!("{path}: {err}")))?;
        self.push(Value::String(text));
        Ok(())
    }
}
