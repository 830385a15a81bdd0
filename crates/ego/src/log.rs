//! Category keyed logging.
//!
//! Each [`LogCategory`] has a process-wide activation flag. The
//! [`log_debug!`](crate::log_debug) macro checks the flag before formatting
//! anything, then hands the event to `tracing` under the target
//! `ego::<category>` so any installed subscriber can route it.

use std::sync::atomic::{AtomicBool, Ordering};

use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// Named logger categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumCount, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum LogCategory {
    App,
    ByteCode,
    Symbol,
    Trace,
    Optimizer,
    Rest,
    Db,
    Server,
    User,
}

static ACTIVE: [AtomicBool; LogCategory::COUNT] = [const { AtomicBool::new(false) }; LogCategory::COUNT];

/// Enables or disables a category, returning the previous state.
pub fn set_logger(category: LogCategory, active: bool) -> bool {
    ACTIVE[category as usize].swap(active, Ordering::Relaxed)
}

#[must_use]
pub fn is_active(category: LogCategory) -> bool {
    ACTIVE[category as usize].load(Ordering::Relaxed)
}

/// Emits an already formatted message for `category`.
///
/// `tracing` targets must be literals, hence the match.
pub fn emit(category: LogCategory, message: &str) {
    match category {
        LogCategory::App => tracing::debug!(target: "ego::app", "{message}"),
        LogCategory::ByteCode => tracing::debug!(target: "ego::bytecode", "{message}"),
        LogCategory::Symbol => tracing::debug!(target: "ego::symbol", "{message}"),
        LogCategory::Trace => tracing::trace!(target: "ego::trace", "{message}"),
        LogCategory::Optimizer => tracing::debug!(target: "ego::optimizer", "{message}"),
        LogCategory::Rest => tracing::info!(target: "ego::rest", "{message}"),
        LogCategory::Db => tracing::info!(target: "ego::db", "{message}"),
        LogCategory::Server => tracing::info!(target: "ego::server", "{message}"),
        LogCategory::User => tracing::info!(target: "ego::user", "{message}"),
    }
}

/// Logs a formatted message when the category is active.
///
/// ```ignore
/// log_debug!(LogCategory::Symbol, "create {} in {}", name, table);
/// ```
#[macro_export]
macro_rules! log_debug {
    ($category:expr, $($arg:tt)+) => {
        if $crate::log::is_active($category) {
            $crate::log::emit($category, &format!($($arg)+));
        }
    };
}
