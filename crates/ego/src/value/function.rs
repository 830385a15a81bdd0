use std::{fmt, sync::Arc};

use super::{Package, Type, Value};
use crate::{bytecode::ByteCode, errors::RunResult, natives::NativeCall};

/// Signature of every native (Rust implemented) function.
pub type NativeFn = fn(&NativeCall<'_>, &[Value]) -> RunResult<Value>;

/// A native function, optionally bound to a receiver by `Member`.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub func: NativeFn,
    pub min_args: usize,
    /// `None` means variadic.
    pub max_args: Option<usize>,
    pub receiver: Option<Box<Value>>,
}

impl NativeFunction {
    #[must_use]
    pub fn new(name: &str, func: NativeFn, min_args: usize, max_args: Option<usize>) -> Self {
        Self {
            name: name.to_owned(),
            func,
            min_args,
            max_args,
            receiver: None,
        }
    }

    /// A copy bound to `receiver`.
    #[must_use]
    pub fn bind(&self, receiver: Value) -> Self {
        Self {
            receiver: Some(Box::new(receiver)),
            ..self.clone()
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("bound", &self.receiver.is_some())
            .finish()
    }
}

/// Callable values other than a bare `ByteCode`.
#[derive(Debug, Clone)]
pub enum Function {
    Native(NativeFunction),
    /// A bytecode function fetched from a package, so calls run in the package's scope.
    Package { package: Package, code: Arc<ByteCode> },
}

impl Function {
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Native(n) => n.name.clone(),
            Self::Package { package, code } => format!("{}.{}", package.name(), code.name()),
        }
    }
}

/// A formal parameter of a bytecode function.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub kind: Type,
}

/// The declared signature of a bytecode function.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub returns: Vec<Type>,
    /// The last parameter collects any remaining arguments.
    pub variadic: bool,
}

impl Declaration {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            parameters: Vec::new(),
            returns: Vec::new(),
            variadic: false,
        }
    }

    #[must_use]
    pub fn parameter(mut self, name: &str, kind: Type) -> Self {
        self.parameters.push(Parameter {
            name: name.to_owned(),
            kind,
        });
        self
    }

    #[must_use]
    pub fn returns(mut self, kind: Type) -> Self {
        self.returns.push(kind);
        self
    }

    #[must_use]
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}
