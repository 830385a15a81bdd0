//! The process-level entry point: a symbol arena with the builtins and the
//! preloaded packages installed, and the settings contexts are created with.

use std::sync::Arc;

use crate::{
    bytecode::ByteCode,
    errors::RunResult,
    log::LogCategory,
    log_debug,
    natives::{builtin_functions, sort_functions, strings_functions},
    settings::{MapSettings, Settings},
    symbols::{ROOT_TABLE, SymbolArena},
    value::{Function, Kind, NativeFunction, Package, Type, Value},
    vm::Context,
};

/// Shared state for every program run in this process.
#[derive(Debug, Clone)]
pub struct Runtime {
    arena: Arc<SymbolArena>,
    settings: Arc<dyn Settings>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A runtime with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(Arc::new(MapSettings::new()))
    }

    #[must_use]
    pub fn with_settings(settings: Arc<dyn Settings>) -> Self {
        let runtime = Self {
            arena: SymbolArena::new(),
            settings,
        };
        runtime.preload();
        runtime
    }

    fn preload(&self) {
        for native in builtin_functions() {
            self.bind_root(&native.name.clone(), native_value(native));
        }
        let sync = Package::new("sync");
        sync.set("WaitGroup", Value::Type(Type::of_kind(Kind::WaitGroup)));
        sync.set("Mutex", Value::Type(Type::of_kind(Kind::Mutex)));
        self.bind_package(sync);
        self.bind_package(native_package("sort", sort_functions()));
        self.bind_package(native_package("strings", strings_functions()));
    }

    fn bind_root(&self, name: &str, value: Value) {
        if let Err(err) = self.arena.set_always(ROOT_TABLE, name, value) {
            log_debug!(LogCategory::App, "unable to preload {name}: {err}");
        }
    }

    fn bind_package(&self, package: Package) {
        log_debug!(LogCategory::App, "preload package {}", package.name());
        self.bind_root(&package.name(), Value::Package(package));
    }

    #[must_use]
    pub fn arena(&self) -> &Arc<SymbolArena> {
        &self.arena
    }

    #[must_use]
    pub fn settings(&self) -> &Arc<dyn Settings> {
        &self.settings
    }

    /// A context for `bytecode` running in a new table under the root.
    #[must_use]
    pub fn context(&self, bytecode: impl Into<Arc<ByteCode>>) -> Context {
        let bytecode = bytecode.into();
        let table = self.arena.new_child(bytecode.name(), ROOT_TABLE, false);
        Context::new(Arc::clone(&self.arena), table, bytecode).with_settings(Arc::clone(&self.settings))
    }

    /// Runs `bytecode` to completion and hands back the finished context.
    pub fn run(&self, bytecode: impl Into<Arc<ByteCode>>) -> RunResult<Context> {
        let mut ctx = self.context(bytecode);
        ctx.run()?;
        Ok(ctx)
    }
}

fn native_value(native: NativeFunction) -> Value {
    Value::Function(Function::Native(native))
}

fn native_package(name: &str, functions: Vec<NativeFunction>) -> Package {
    let package = Package::new(name);
    for native in functions {
        package.set(&native.name.clone(), native_value(native));
    }
    package
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Runtime;
    use crate::{
        bytecode::{ByteCode, Opcode},
        symbols::ROOT_TABLE,
        value::Value,
    };

    #[test]
    fn test_builtins_and_packages_are_preloaded() {
        let runtime = Runtime::new();
        for name in ["len", "append", "make", "close", "delete", "new", "error", "sync", "sort", "strings"] {
            assert!(runtime.arena().get(ROOT_TABLE, name).is_some(), "{name} missing");
        }
    }

    #[test]
    fn test_program_calls_package_function() {
        let runtime = Runtime::new();
        let mut code = ByteCode::new("main");
        code.emit_with(Opcode::Import, "strings");
        code.emit_with(Opcode::Load, "strings");
        code.emit_with(Opcode::Member, "ToUpper");
        code.emit_with(Opcode::Push, "ego");
        code.emit_with(Opcode::Call, 1);
        let ctx = runtime.run(code).unwrap();
        assert_eq!(ctx.stack(), &[Value::from("EGO")]);
    }
}
