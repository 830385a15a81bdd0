//! Native (Rust implemented) functions.
//!
//! Two groups live here:
//!
//! - receiver methods of the native value kinds (`wg.Wait()`, `ch.Close()`,
//!   `t.String()`), found by [`find_native_function`] when `Member` is applied
//!   to a value that is not a map, struct or package;
//! - builtins and the functions of the preloaded packages, installed into
//!   the root table by [`Runtime`](crate::Runtime).
//!
//! Every native has the [`NativeFn`](crate::value::NativeFn) signature and
//! receives a [`NativeCall`] describing the calling context.

mod builtins;
mod methods;
mod packages;

use std::sync::{Arc, OnceLock};

use ahash::AHashMap;

pub(crate) use builtins::builtin_functions;
pub(crate) use packages::{sort_functions, strings_functions};

use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    settings::Settings,
    symbols::{SymbolArena, TableId},
    value::{Kind, NativeFunction, Value},
};

/// The calling context handed to a native function.
#[derive(Debug, Clone, Copy)]
pub struct NativeCall<'a> {
    pub arena: &'a Arc<SymbolArena>,
    /// The caller's current symbol table.
    pub table: TableId,
    /// The value a method was fetched from, for bound receiver methods.
    pub receiver: Option<&'a Value>,
    pub settings: &'a Arc<dyn Settings>,
}

impl NativeCall<'_> {
    /// The bound receiver; `InvalidThis` for a function called without one.
    pub fn this(&self) -> RunResult<&Value> {
        self.receiver
            .map(Value::unwrapped)
            .ok_or_else(|| EgoError::new(ErrorKind::InvalidThis))
    }

    /// Calls `callable` (bytecode or native) with `args` and returns its result.
    ///
    /// Bytecode runs in a scratch context that shares this call's symbol
    /// arena, so a comparator sees the same globals as its caller.
    pub fn invoke(&self, callable: &Value, args: Vec<Value>) -> RunResult<Value> {
        crate::vm::call_function(self, callable.clone(), args)
    }
}

type MethodTable = AHashMap<Kind, AHashMap<&'static str, NativeFunction>>;

fn registry() -> &'static MethodTable {
    static REGISTRY: OnceLock<MethodTable> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut table = MethodTable::default();
        for &(kind, name, func, min_args, max_args) in methods::RECEIVER_METHODS {
            table
                .entry(kind)
                .or_default()
                .insert(name, NativeFunction::new(name, func, min_args, max_args));
        }
        table
    })
}

/// Finds the native receiver method `name` of values of `kind`.
#[must_use]
pub fn find_native_function(kind: Kind, name: &str) -> Option<NativeFunction> {
    registry().get(&kind).and_then(|methods| methods.get(name)).cloned()
}

/// Names of the receiver methods registered for `kind`, sorted.
#[must_use]
pub fn native_method_names(kind: Kind) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = registry()
        .get(&kind)
        .map(|methods| methods.keys().copied().collect())
        .unwrap_or_default();
    names.sort_unstable();
    names
}

/// Checks `args` has exactly `count` entries.
pub(crate) fn expect_args(name: &str, args: &[Value], count: usize) -> RunResult<()> {
    if args.len() == count {
        Ok(())
    } else {
        Err(EgoError::new(ErrorKind::ArgumentCount).context(name))
    }
}
