//! Read-only configuration consulted when a [`Context`](crate::Context) is built.

use std::fmt;

use ahash::AHashMap;
use toml_edit::{DocumentMut, Item, Table};

use crate::errors::{EgoError, ErrorKind, RunResult};

/// Raise native function errors; when false they are pushed as error values.
pub const THROW_UNCHECKED_ERRORS_SETTING: &str = "ego.runtime.unchecked.errors";
/// Include the frame list in error traces.
pub const FULL_STACK_TRACE_SETTING: &str = "ego.runtime.stack.trace";
/// Default for strict static typing.
pub const STATIC_TYPES_SETTING: &str = "ego.compiler.static.types";
/// When true a `Panic` cannot be caught by a try record.
pub const RUNTIME_PANICS_SETTING: &str = "ego.runtime.panics";
/// Language extensions.
pub const EXTENSIONS_ENABLED_SETTING: &str = "ego.compiler.extensions";
/// Let function scopes see the caller's symbols.
pub const FULL_SYMBOL_SCOPE_SETTING: &str = "ego.runtime.symbol.scope";

/// A string keyed, string valued settings store.
pub trait Settings: fmt::Debug + Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Interprets the setting as a boolean, falling back to `default` when
    /// absent or unparseable.
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).as_deref().map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" || v.eq_ignore_ascii_case("yes") => true,
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" || v.eq_ignore_ascii_case("no") => false,
            _ => default,
        }
    }
}

/// In-memory settings.
#[derive(Debug, Default, Clone)]
pub struct MapSettings {
    values: AHashMap<String, String>,
}

impl MapSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key, builder style.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.values.insert(key.to_owned(), value.to_string());
        self
    }

    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.values.insert(key.to_owned(), value.to_string());
    }

    /// Reads settings from a TOML document.
    ///
    /// Nested tables are flattened into dotted keys, so `[ego.runtime] panics = false`
    /// and `"ego.runtime.panics" = false` are equivalent.
    pub fn from_toml(text: &str) -> RunResult<Self> {
        let doc: DocumentMut = text
            .parse()
            .map_err(|e: toml_edit::TomlError| EgoError::new(ErrorKind::InvalidValue).context(e.message()))?;
        let mut settings = Self::new();
        flatten_table(doc.as_table(), "", &mut settings.values);
        Ok(settings)
    }
}

fn flatten_table(table: &Table, prefix: &str, out: &mut AHashMap<String, String>) {
    for (key, item) in table {
        let full = if prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{prefix}.{key}")
        };
        match item {
            Item::Table(inner) => flatten_table(inner, &full, out),
            Item::Value(value) => {
                if let Some(inline) = value.as_inline_table() {
                    flatten_table(&inline.clone().into_table(), &full, out);
                } else if let Some(s) = value.as_str() {
                    out.insert(full, s.to_owned());
                } else {
                    out.insert(full, value.to_string().trim().to_owned());
                }
            }
            _ => {}
        }
    }
}

impl Settings for MapSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
