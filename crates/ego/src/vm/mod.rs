//! Bytecode virtual machine.
//!
//! A [`Context`] executes one [`ByteCode`] against a table of a shared
//! [`SymbolArena`]. The VM is stack based: instructions pop their inputs from
//! the operand stack and push their results back. Calls to bytecode functions
//! push a [`CallFrame`] value onto that same stack and switch the context to
//! the callee; `Return` pops the frame and restores the caller.
//!
//! Handlers for the opcodes are spread over the submodules, each adding an
//! `impl Context` block for one family of instructions. The dispatch table
//! in `dispatch` maps every opcode to its handler.

mod attr;
mod binary;
mod call;
mod callframe;
mod collections;
mod compare;
mod concurrency;
mod dispatch;
mod exceptions;
mod flow;
mod output;
mod packages;
mod range;
mod stack;
mod this;
mod types;
mod variables;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    thread::JoinHandle,
    time::Instant,
};

pub use callframe::CallFrame;
use exceptions::TryInfo;
use range::RangeRecord;

use crate::{
    bytecode::{ByteCode, Opcode, format_instruction},
    errors::{EgoError, ErrorKind, RunResult},
    io::{CollectStringPrint, PrintWriter, StdPrint},
    log::{self, LogCategory},
    log_debug,
    natives::NativeCall,
    settings::{
        EXTENSIONS_ENABLED_SETTING, FULL_STACK_TRACE_SETTING, FULL_SYMBOL_SCOPE_SETTING, MapSettings,
        RUNTIME_PANICS_SETTING, STATIC_TYPES_SETTING, Settings, THROW_UNCHECKED_ERRORS_SETTING,
    },
    symbols::{ROOT_TABLE, SymbolArena, TableId},
    tracer::{NoopTracer, VmTracer},
    value::Value,
};

/// Initial capacity of the operand stack.
pub const INITIAL_STACK_SIZE: usize = 16;

/// Number of slots the operand stack grows by when it fills up.
pub const GROW_STACK_BY: usize = 50;

/// Overrides the static typing setting for the program.
pub const STATIC_TYPES_VAR: &str = "__static_data_types";
/// Execution mode (`run`, `server`, `test`) checked by `ModeCheck`.
pub const EXEC_MODE_VAR: &str = "__exec_mode";
/// Arguments of the current bytecode function.
pub const ARGS_VAR: &str = "__args";
/// Command line arguments of the program.
pub const CLI_ARGS_VAR: &str = "__cli_args";
/// The error caught by the innermost active catch block.
pub const ERROR_VAR: &str = "_error";
/// Whether language extensions are enabled.
pub const EXTENSIONS_VAR: &str = "__extensions";
/// Struct literal key naming the struct's type.
pub const TYPE_FIELD: &str = "__type";
/// Struct literal key that makes the struct static.
pub const STATIC_FIELD: &str = "__static";
/// Struct literal key that makes the struct read-only.
pub const READONLY_FIELD: &str = "__readonly";
/// The discard name.
pub const DISCARD_VAR: &str = "_";
/// Written by `Response` for the REST layer.
pub const REST_RESPONSE_VAR: &str = "_rest_response";
/// HTTP status written by a failing `Auth`.
pub const REST_STATUS_VAR: &str = "_rest_status";
pub const AUTHENTICATED_VAR: &str = "_authenticated";
pub const SUPERUSER_VAR: &str = "_superuser";
pub const TOKEN_VALID_VAR: &str = "_token_valid";

/// Prefix of the scope tables wrapped around package function calls.
const PACKAGE_FUNCTION_SCOPE: &str = "pkg func ";

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

/// A receiver binding on the this-stack.
#[derive(Debug, Clone)]
pub(crate) struct This {
    pub(crate) name: String,
    pub(crate) value: Value,
}

/// A call captured by `Defer`, run when the enclosing function returns.
#[derive(Debug, Clone)]
pub(crate) struct DeferredCall {
    pub(crate) callable: Value,
    pub(crate) args: Vec<Value>,
}

/// State saved by `PushPackage` and restored by `PopPackage`.
#[derive(Debug, Clone)]
struct PackageScope {
    name: String,
    package: crate::value::Package,
    table: TableId,
    saved_symbols: TableId,
    saved_pkg: String,
}

/// The execution state of one thread of a program.
///
/// A context owns its operand stack and auxiliary stacks; symbol tables live
/// in the shared arena so any number of contexts (the main program, tasks
/// started by `Go`, scratch contexts for callbacks) can run against them.
#[derive(Debug)]
pub struct Context {
    name: String,
    thread_id: u32,
    arena: Arc<SymbolArena>,
    symbols: TableId,
    bytecode: Arc<ByteCode>,

    stack: Vec<Value>,
    /// Stack length at the last call; the frame value sits just below it.
    fp: usize,
    pc: usize,
    line: usize,
    block_depth: usize,
    frame_depth: usize,
    pkg: String,
    source_file: String,

    try_stack: Vec<TryInfo>,
    range_stack: Vec<RangeRecord>,
    timer_stack: Vec<Instant>,
    this_stack: Vec<This>,
    package_stack: Vec<PackageScope>,
    defer_stack: Vec<DeferredCall>,

    result: Option<Value>,
    /// Extra arguments contributed by `Flatten` to the next `Call`.
    arg_count_delta: isize,
    running: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<RunResult<()>>>,

    static_types: bool,
    debugging: bool,
    single_step: bool,
    step_over: bool,
    break_on_return: bool,
    full_symbol_scope: bool,
    throw_unchecked_errors: bool,
    full_stack_trace: bool,
    extensions: bool,
    runtime_panics: bool,

    tracer: Box<dyn VmTracer>,
    output: Box<dyn PrintWriter>,
    settings: Arc<dyn Settings>,
}

impl Context {
    /// Creates a context that will run `bytecode` with `symbols` as its scope.
    #[must_use]
    pub fn new(arena: Arc<SymbolArena>, symbols: TableId, bytecode: impl Into<Arc<ByteCode>>) -> Self {
        let bytecode = bytecode.into();
        let mut ctx = Self {
            name: bytecode.name().to_owned(),
            thread_id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
            arena,
            symbols,
            bytecode,
            stack: Vec::with_capacity(INITIAL_STACK_SIZE),
            fp: 0,
            pc: 0,
            line: 0,
            block_depth: 0,
            frame_depth: 0,
            pkg: String::new(),
            source_file: String::new(),
            try_stack: Vec::new(),
            range_stack: Vec::new(),
            timer_stack: Vec::new(),
            this_stack: Vec::new(),
            package_stack: Vec::new(),
            defer_stack: Vec::new(),
            result: None,
            arg_count_delta: 0,
            running: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
            static_types: false,
            debugging: false,
            single_step: false,
            step_over: false,
            break_on_return: false,
            full_symbol_scope: false,
            throw_unchecked_errors: true,
            full_stack_trace: false,
            extensions: false,
            runtime_panics: true,
            tracer: Box::new(NoopTracer),
            output: Box::new(StdPrint),
            settings: Arc::new(MapSettings::new()),
        };
        ctx.apply_settings();
        log_debug!(
            LogCategory::Trace,
            "*** ({}) new context for {} on table {}",
            ctx.thread_id,
            ctx.name,
            ctx.symbols
        );
        ctx
    }

    /// Replaces the settings consulted by this context and re-reads its flags.
    #[must_use]
    pub fn with_settings(mut self, settings: Arc<dyn Settings>) -> Self {
        self.settings = settings;
        self.apply_settings();
        self
    }

    fn apply_settings(&mut self) {
        let settings = Arc::clone(&self.settings);
        self.throw_unchecked_errors = settings.get_bool(THROW_UNCHECKED_ERRORS_SETTING, true);
        self.full_stack_trace = settings.get_bool(FULL_STACK_TRACE_SETTING, false);
        self.runtime_panics = settings.get_bool(RUNTIME_PANICS_SETTING, true);
        self.extensions = settings.get_bool(EXTENSIONS_ENABLED_SETTING, false);
        self.full_symbol_scope = settings.get_bool(FULL_SYMBOL_SCOPE_SETTING, false);
        self.static_types = match self.arena.get(self.symbols, STATIC_TYPES_VAR) {
            Some(v) => v.truthy(),
            None => settings.get_bool(STATIC_TYPES_SETTING, false),
        };
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn VmTracer>) {
        self.tracer = tracer;
    }

    pub fn set_output(&mut self, output: Box<dyn PrintWriter>) {
        self.output = output;
    }

    /// With `false`, program output is captured instead of written to stdout
    /// and can be read back with [`output`](Self::output).
    pub fn enable_console_output(&mut self, enabled: bool) {
        if enabled {
            self.output = Box::new(StdPrint);
        } else {
            self.output = Box::new(CollectStringPrint::new());
        }
    }

    /// Text captured since console output was disabled.
    #[must_use]
    pub fn output(&self) -> String {
        self.output.captured().unwrap_or_default().to_owned()
    }

    /// A handle other threads can clear to stop this context at its next instruction.
    #[must_use]
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    #[must_use]
    pub fn symbols(&self) -> TableId {
        self.symbols
    }

    #[must_use]
    pub fn arena(&self) -> &Arc<SymbolArena> {
        &self.arena
    }

    /// The single-value result set by `Return true` or `ReadStack`.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn pc(&self) -> usize {
        self.pc
    }

    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    #[must_use]
    pub fn package(&self) -> &str {
        &self.pkg
    }

    #[must_use]
    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.static_types
    }

    pub fn set_debug(&mut self, debugging: bool) {
        self.debugging = debugging;
    }

    pub fn set_single_step(&mut self, single_step: bool) {
        self.single_step = single_step;
    }

    pub fn set_step_over(&mut self, step_over: bool) {
        self.step_over = step_over;
    }

    pub fn set_break_on_return(&mut self, break_on_return: bool) {
        self.break_on_return = break_on_return;
    }

    pub fn set_full_symbol_scope(&mut self, full: bool) {
        self.full_symbol_scope = full;
    }

    pub fn set_static(&mut self, static_types: bool) {
        self.static_types = static_types;
    }

    /// Binds `name` in the root table.
    pub fn set_global(&self, name: &str, value: Value) -> RunResult<()> {
        self.arena.set_always(ROOT_TABLE, name, value)
    }

    /// Runs the bytecode from its first instruction.
    pub fn run(&mut self) -> RunResult<()> {
        self.run_from_address(0)
    }

    /// Runs the bytecode starting at `pc`.
    pub fn run_from_address(&mut self, pc: usize) -> RunResult<()> {
        self.pc = pc;
        self.resume()
    }

    /// Continues from the current program counter, for instance after the
    /// run returned a `SignalDebugger` error.
    ///
    /// Returns when `Stop` executes, when the program counter leaves the
    /// bytecode, or when the running flag is cleared. An error no try record
    /// catches unwinds every frame and is returned.
    pub fn resume(&mut self) -> RunResult<()> {
        self.running.store(true, Ordering::Relaxed);
        log_debug!(
            LogCategory::Trace,
            "*** ({}) running {} from {}",
            self.thread_id,
            self.bytecode.name(),
            self.pc
        );
        while self.running.load(Ordering::Relaxed) {
            let code = Arc::clone(&self.bytecode);
            let Some(instruction) = code.instruction(self.pc) else {
                self.running.store(false, Ordering::Relaxed);
                break;
            };
            let pc = self.pc;
            self.pc += 1;
            self.tracer
                .on_instruction(pc, instruction.operation, self.stack.len(), self.frame_depth);
            if log::is_active(LogCategory::Trace) {
                self.trace_instruction(pc, instruction.operation, &instruction.operand);
            }
            let handler = dispatch::handler(instruction.operation);
            if let Err(err) = handler(self, &instruction.operand) {
                if err.is(ErrorKind::Stop) {
                    self.running.store(false, Ordering::Relaxed);
                    break;
                }
                self.handle_error(err)?;
            }
        }
        log_debug!(LogCategory::Trace, "*** ({}) {} ended", self.thread_id, self.name);
        Ok(())
    }

    fn trace_instruction(&self, pc: usize, operation: Opcode, operand: &Value) {
        let instruction = crate::bytecode::Instruction::new(operation, operand.clone());
        let (op, text) = format_instruction(&instruction);
        log::emit(
            LogCategory::Trace,
            &format!(
                "({}) {:>18}:{:<4} {pc:>4}: {op:<12} {text:<20} stack[{}]: {}",
                self.thread_id,
                self.bytecode.name(),
                self.line,
                self.stack.len(),
                self.format_stack(4)
            ),
        );
    }

    /// The operand as a symbol name.
    fn operand_name(operand: &Value) -> RunResult<&str> {
        operand
            .as_str()
            .ok_or_else(|| EgoError::new(ErrorKind::InvalidValue).context(operand.kind()))
    }

    /// The operand as a count; a null operand means `default`.
    fn operand_count(operand: &Value, default: usize) -> RunResult<usize> {
        if operand.is_null() { Ok(default) } else { operand.as_index() }
    }

    fn native_call(&self) -> NativeCall<'_> {
        NativeCall {
            arena: &self.arena,
            table: self.symbols,
            receiver: None,
            settings: &self.settings,
        }
    }

    /// A context whose bytecode is `Call n; Stop`, with `callable` and `args`
    /// already on its stack.
    fn trampoline(
        arena: Arc<SymbolArena>,
        table: TableId,
        settings: Arc<dyn Settings>,
        callable: Value,
        args: Vec<Value>,
    ) -> Self {
        let mut code = ByteCode::new(&format!("call {}", callable_name(&callable)));
        code.emit_with(Opcode::Call, args.len());
        code.emit(Opcode::Stop);
        code.seal();
        let mut ctx = Self::new(arena, table, code).with_settings(settings);
        ctx.stack.push(callable);
        ctx.stack.extend(args);
        ctx
    }
}

/// True when `name` starts with an uppercase letter, the rule for exported names.
pub(crate) fn has_capitalized_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn callable_name(callable: &Value) -> String {
    match callable.unwrapped() {
        Value::ByteCode(code) => code.name().to_owned(),
        Value::Function(f) => f.name(),
        Value::Type(t) => t.to_string(),
        other => other.kind().to_string(),
    }
}

/// Runs a self contained fragment in a fresh arena and returns the value it
/// leaves on top of the stack. Used by the optimizer to fold constants.
pub(crate) fn run_fragment(code: ByteCode) -> RunResult<Value> {
    let arena = SymbolArena::new();
    let mut ctx = Context::new(arena, ROOT_TABLE, code);
    ctx.run()?;
    ctx.pop()
}

/// Calls `callable` with `args` from native code and returns its result.
///
/// The call runs in a scratch context on the caller's table. A bytecode
/// callee's multi-value return yields its last value.
pub(crate) fn call_function(call: &NativeCall<'_>, callable: Value, args: Vec<Value>) -> RunResult<Value> {
    let mut ctx = Context::trampoline(
        Arc::clone(call.arena),
        call.table,
        Arc::clone(call.settings),
        callable,
        args,
    );
    ctx.run()?;
    match ctx.stack.pop() {
        Some(v) => Ok(v),
        None => Ok(ctx.result.take().unwrap_or_default()),
    }
}
