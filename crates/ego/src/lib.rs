#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "integer kinds narrow with wrapping, as the language defines")]
#![expect(clippy::cast_sign_loss, reason = "byte conversions keep the low bits")]
#![expect(clippy::cast_possible_wrap, reason = "counts become language integers")]

pub mod bytecode;
mod channel;
mod errors;
mod io;
pub mod log;
pub mod natives;
mod runtime;
pub mod settings;
pub mod symbols;
mod sync;
pub mod tracer;
pub mod value;
mod vm;

pub use crate::{
    bytecode::{ByteCode, Instruction, Opcode},
    channel::Channel,
    errors::{EgoError, ErrorKind, Location, RunResult},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    log::LogCategory,
    runtime::Runtime,
    settings::{MapSettings, Settings},
    symbols::{ROOT_TABLE, SymbolArena, TableId},
    sync::{Mutex, WaitGroup},
    tracer::{LogTracer, NoopTracer, ProfilingReport, ProfilingTracer, RecordingTracer, TraceEvent, VmTracer},
    value::{Array, Function, Kind, Map, NativeFunction, Package, Struct, Type, Value},
    vm::{
        ARGS_VAR, AUTHENTICATED_VAR, CLI_ARGS_VAR, CallFrame, Context, DISCARD_VAR, ERROR_VAR, EXEC_MODE_VAR,
        EXTENSIONS_VAR, GROW_STACK_BY, INITIAL_STACK_SIZE, READONLY_FIELD, REST_RESPONSE_VAR, REST_STATUS_VAR,
        STATIC_FIELD, STATIC_TYPES_VAR, SUPERUSER_VAR, TOKEN_VALID_VAR, TYPE_FIELD,
    },
};
