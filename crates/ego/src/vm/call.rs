//! Calls and returns: `Call`, `LocalCall`, `Return`, `Defer` and `EntryPoint`.

use std::{mem, sync::Arc};

use super::{ARGS_VAR, Context, DeferredCall, PACKAGE_FUNCTION_SCOPE};
use crate::{
    bytecode::ByteCode,
    errors::{EgoError, ErrorKind, RunResult},
    io::NoPrint,
    log::LogCategory,
    log_debug,
    natives::NativeCall,
    value::{Function, NativeFunction, Package, Type, Value, instance_of},
};

impl Context {
    /// Pops `count` arguments, deepest first.
    pub(super) fn pop_args(&mut self, count: usize) -> RunResult<Vec<Value>> {
        if count > self.stack.len() - self.fp {
            return Err(EgoError::new(ErrorKind::StackUnderflow).context(count));
        }
        let args = self.stack.split_off(self.stack.len() - count);
        if args.iter().any(Value::is_marker) {
            return Err(ErrorKind::FunctionReturnedVoid.into());
        }
        Ok(args)
    }

    /// Pops the arguments and then the callable of a `Call`-shaped instruction.
    fn pop_call(&mut self, count: usize) -> RunResult<(Value, Vec<Value>)> {
        let args = self.pop_args(count)?;
        let callable = self.pop_value()?;
        Ok((callable.into_unwrapped(), args))
    }

    pub(super) fn op_call(&mut self, operand: &Value) -> RunResult<()> {
        let count = Self::operand_count(operand, 0)?;
        let delta = mem::take(&mut self.arg_count_delta);
        let count = count.saturating_add_signed(delta);
        let (callable, args) = self.pop_call(count)?;
        self.call_value(callable, args)
    }

    /// Invokes `callable`. Bytecode callees get a new frame and run on the
    /// next loop iterations; natives and constructors push their result now.
    pub(super) fn call_value(&mut self, callable: Value, args: Vec<Value>) -> RunResult<()> {
        match callable {
            Value::ByteCode(code) => {
                self.check_arguments(&code, &args)?;
                let name = code.name().to_owned();
                self.callframe_push(&name, code, 0, !self.full_symbol_scope);
                self.arena.set_always(self.symbols, ARGS_VAR, Value::list(args))
            }
            Value::Function(Function::Package { package, code }) => self.call_package_function(&package, code, args),
            Value::Function(Function::Native(native)) => self.call_native(&native, &args),
            Value::Type(t) => self.construct(&t, args),
            other => Err(EgoError::new(ErrorKind::InvalidFunctionCall).context(other.kind())),
        }
    }

    /// Runs a package function with the package's symbols in scope, so its
    /// body sees the package's other members unqualified.
    fn call_package_function(&mut self, package: &Package, code: Arc<ByteCode>, args: Vec<Value>) -> RunResult<()> {
        self.check_arguments(&code, &args)?;
        let name = code.name().to_owned();
        let package_name = package.name();
        let scope = self.arena.new_child(&format!("{PACKAGE_FUNCTION_SCOPE}{name}"), self.symbols, true);
        self.arena.set_for_package(scope, &package_name)?;
        for key in package.keys() {
            if let Some(v) = package.get(&key) {
                self.arena.set_always(scope, &key, v)?;
            }
        }
        if let Some(inner) = package.symbols() {
            for (key, v) in self.arena.local_symbols(inner) {
                self.arena.set_always(scope, &key, v)?;
            }
        }
        let table = self.arena.new_child(&name, scope, false);
        self.callframe_push_with_table(&name, table, code, 0);
        self.pkg = package_name;
        self.arena.set_always(table, ARGS_VAR, Value::list(args))
    }

    fn call_native(&mut self, native: &NativeFunction, args: &[Value]) -> RunResult<()> {
        if args.len() < native.min_args || native.max_args.is_some_and(|max| args.len() > max) {
            return Err(EgoError::new(ErrorKind::ArgumentCount).context(&native.name));
        }
        let call = NativeCall {
            receiver: native.receiver.as_deref(),
            ..self.native_call()
        };
        match (native.func)(&call, args) {
            Ok(v) => {
                self.push(v);
                Ok(())
            }
            Err(err) if err.is_signal() || err.is(ErrorKind::Panic) || self.throw_unchecked_errors => Err(err),
            Err(err) => {
                log_debug!(LogCategory::Trace, "({}) {} returned {err}", self.thread_id, native.name);
                self.push(Value::error(err));
                Ok(())
            }
        }
    }

    /// Calling a type builds its zero value and initializes it from the
    /// optional argument.
    fn construct(&mut self, t: &Type, args: Vec<Value>) -> RunResult<()> {
        let instance = instance_of(t);
        let mut args = args.into_iter();
        let Some(init) = args.next() else {
            self.push(instance);
            return Ok(());
        };
        if args.next().is_some() {
            return Err(EgoError::new(ErrorKind::ArgumentCount).context(t));
        }
        let value = match (instance, init.into_unwrapped()) {
            (Value::Struct(s), Value::Map(source)) => {
                for key in source.keys() {
                    let v = source.get(&key)?.unwrap_or_default();
                    s.set(&key.to_string(), v)?;
                }
                Value::Struct(s)
            }
            (Value::Struct(s), Value::Struct(source)) => {
                for name in source.field_names() {
                    s.set(&name, source.get(&name).unwrap_or_default())?;
                }
                Value::Struct(s)
            }
            (Value::Map(m), Value::Map(source)) => {
                m.merge(&source)?;
                Value::Map(m)
            }
            (_, init) => t.coerce(init)?,
        };
        self.push(value);
        Ok(())
    }

    /// Checks the arguments against the callee's declaration, if it has one.
    fn check_arguments(&self, code: &ByteCode, args: &[Value]) -> RunResult<()> {
        let Some(decl) = code.declaration() else {
            return Ok(());
        };
        let wanted = decl.parameters.len();
        let count_ok = if decl.variadic {
            args.len() + 1 >= wanted
        } else {
            args.len() == wanted
        };
        if !count_ok {
            return Err(EgoError::new(ErrorKind::ArgumentCount).context(&decl.name));
        }
        if self.static_types {
            let fixed = if decl.variadic { wanted.saturating_sub(1) } else { wanted };
            for (param, arg) in decl.parameters.iter().take(fixed).zip(args) {
                if !param.kind.is_type(&arg.type_of()) {
                    return Err(EgoError::new(ErrorKind::ArgumentType).context(&param.name));
                }
            }
        }
        Ok(())
    }

    /// Calls a subroutine in the current bytecode.
    pub(super) fn op_local_call(&mut self, operand: &Value) -> RunResult<()> {
        let addr = self.branch_target(operand)?;
        let code = Arc::clone(&self.bytecode);
        self.callframe_push("local call", code, addr, false);
        Ok(())
    }

    /// `Return true` first moves the top of stack into the result slot. Runs
    /// the frame's deferred calls, then resumes the caller; a return from the
    /// outermost code ends the run.
    pub(super) fn op_return(&mut self, operand: &Value) -> RunResult<()> {
        if matches!(operand.unwrapped(), Value::Bool(true)) {
            let v = self.pop_value()?;
            self.result = Some(v);
        }
        self.run_defers()?;
        if self.fp > 0 {
            self.callframe_pop()
        } else {
            self.running.store(false, std::sync::atomic::Ordering::Relaxed);
            Ok(())
        }
    }

    pub(super) fn op_defer(&mut self, operand: &Value) -> RunResult<()> {
        let count = Self::operand_count(operand, 0)?;
        let (callable, args) = self.pop_call(count)?;
        self.defer_stack.push(DeferredCall { callable, args });
        Ok(())
    }

    /// Runs the deferred calls of the current frame, last registered first.
    /// Each runs in a scratch context on the current table that borrows this
    /// context's output sink.
    fn run_defers(&mut self) -> RunResult<()> {
        while let Some(deferred) = self.defer_stack.pop() {
            log_debug!(LogCategory::Trace, "({}) run deferred call", self.thread_id);
            let mut ctx = Self::trampoline(
                Arc::clone(&self.arena),
                self.symbols,
                Arc::clone(&self.settings),
                deferred.callable,
                deferred.args,
            );
            ctx.output = mem::replace(&mut self.output, Box::new(NoPrint));
            let result = ctx.run();
            self.output = mem::replace(&mut ctx.output, Box::new(NoPrint));
            result?;
        }
        Ok(())
    }

    /// Calls the program's entry function, `main` unless named.
    pub(super) fn op_entry_point(&mut self, operand: &Value) -> RunResult<()> {
        let name = operand.as_str().unwrap_or("main");
        let callable = self
            .arena
            .get(self.symbols, name)
            .ok_or_else(|| EgoError::new(ErrorKind::UnknownSymbol).context(name))?;
        self.call_value(callable.into_unwrapped(), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::{
        bytecode::{ByteCode, Opcode},
        errors::{ErrorKind, RunResult},
        natives::NativeCall,
        settings::{MapSettings, THROW_UNCHECKED_ERRORS_SETTING},
        symbols::{ROOT_TABLE, SymbolArena},
        value::{Declaration, Function, Kind, NativeFunction, Type, Value},
        vm::Context,
    };

    /// `func add(a, b) { return a + b }` reading its arguments from `__args`.
    fn add_function() -> ByteCode {
        let mut code = ByteCode::new("add");
        code.set_declaration(
            Declaration::new("add")
                .parameter("a", Type::int())
                .parameter("b", Type::int())
                .returns(Type::int()),
        );
        code.emit_with(Opcode::Load, "__args");
        code.emit_with(Opcode::Push, 0);
        code.emit(Opcode::LoadIndex);
        code.emit_with(Opcode::Load, "__args");
        code.emit_with(Opcode::Push, 1);
        code.emit(Opcode::LoadIndex);
        code.emit(Opcode::Add);
        code.emit_with(Opcode::Return, true);
        code
    }

    fn calling(callee: impl Into<Value>, args: &[Value]) -> ByteCode {
        let mut code = ByteCode::new("main");
        code.emit_with(Opcode::Push, callee);
        for a in args {
            code.emit_with(Opcode::Push, a.clone());
        }
        code.emit_with(Opcode::Call, args.len());
        code
    }

    #[test]
    fn test_call_bytecode_function() {
        let arena = SymbolArena::new();
        let before = arena.table_count();
        let mut ctx = Context::new(
            Arc::clone(&arena),
            ROOT_TABLE,
            calling(add_function(), &[Value::Int(2), Value::Int(3)]),
        );
        ctx.run().unwrap();
        assert_eq!(ctx.stack(), &[Value::Int(5)]);
        assert_eq!(arena.table_count(), before);
    }

    #[test]
    fn test_call_checks_argument_count() {
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, calling(add_function(), &[Value::Int(2)]));
        assert_eq!(ctx.run().unwrap_err().kind(), ErrorKind::ArgumentCount);
    }

    #[test]
    fn test_static_mode_checks_argument_types() {
        let mut ctx = Context::new(
            SymbolArena::new(),
            ROOT_TABLE,
            calling(add_function(), &[Value::Int(2), Value::from("x")]),
        );
        ctx.set_static(true);
        assert_eq!(ctx.run().unwrap_err().kind(), ErrorKind::ArgumentType);
    }

    fn fail(_: &NativeCall<'_>, _: &[Value]) -> RunResult<Value> {
        Err(crate::errors::EgoError::user("nope"))
    }

    #[test]
    fn test_native_error_is_pushed_when_unchecked_errors_are_off() {
        let native = Value::Function(Function::Native(NativeFunction::new("fail", fail, 0, Some(0))));
        let settings = MapSettings::new().with(THROW_UNCHECKED_ERRORS_SETTING, false);
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, calling(native.clone(), &[]))
            .with_settings(Arc::new(settings));
        ctx.run().unwrap();
        assert_eq!(ctx.stack()[0].kind(), Kind::Error);

        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, calling(native, &[]));
        assert_eq!(ctx.run().unwrap_err().context_text(), Some("nope"));
    }

    #[test]
    fn test_type_constructor() {
        let point = Type::structure(vec![("x".into(), Type::int()), ("y".into(), Type::int())]).unwrap();
        let init = Value::Map(crate::value::Map::new(Type::string(), Type::interface()));
        if let Value::Map(m) = &init {
            m.set(Value::from("x"), Value::Int(4)).unwrap();
        }
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, calling(point, &[init]));
        ctx.run().unwrap();
        assert_eq!(ctx.stack()[0].to_string(), "{ x: 4, y: 0 }");

        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, calling(Type::int(), &[Value::from("12")]));
        ctx.run().unwrap();
        assert_eq!(ctx.stack(), &[Value::Int(12)]);
    }

    #[test]
    fn test_calling_a_number_is_invalid() {
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, calling(Value::Int(1), &[]));
        assert_eq!(ctx.run().unwrap_err().kind(), ErrorKind::InvalidFunctionCall);
    }

    #[test]
    fn test_deferred_calls_run_last_in_first_out() {
        let mut say = ByteCode::new("say");
        say.emit_with(Opcode::Load, "__args");
        say.emit_with(Opcode::Push, 0);
        say.emit(Opcode::LoadIndex);
        say.emit(Opcode::Say);
        say.emit(Opcode::Return);
        let say = Value::from(say);

        let mut code = ByteCode::new("main");
        code.emit_with(Opcode::LocalCall, 2);
        code.emit(Opcode::Stop);
        for word in ["first", "second"] {
            code.emit_with(Opcode::Push, say.clone());
            code.emit_with(Opcode::Push, word);
            code.emit_with(Opcode::Defer, 1);
        }
        code.emit_with(Opcode::Push, "body");
        code.emit(Opcode::Say);
        code.emit(Opcode::Return);
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        ctx.enable_console_output(false);
        ctx.run().unwrap();
        assert_eq!(ctx.output(), "body\nsecond\nfirst\n");
    }

    #[test]
    fn test_entry_point_calls_main() {
        let arena = SymbolArena::new();
        let mut main = ByteCode::new("main");
        main.emit_with(Opcode::Push, "hello");
        main.emit_with(Opcode::Return, true);
        arena.set_always(ROOT_TABLE, "main", Value::from(main)).unwrap();
        let mut code = ByteCode::new("program");
        code.emit(Opcode::EntryPoint);
        let mut ctx = Context::new(arena, ROOT_TABLE, code);
        ctx.run().unwrap();
        assert_eq!(ctx.stack(), &[Value::from("hello")]);
    }
}
