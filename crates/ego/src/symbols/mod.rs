//! Symbol tables.
//!
//! Every table of a program lives in one [`SymbolArena`] and is addressed by
//! a [`TableId`]. Parent links are ids, so the chain can be walked, cloned or
//! torn down without reference cycles, and a removed table is detected rather
//! than dereferenced.
//!
//! # Name resolution
//!
//! A read walks from a table up through its parents. The walk stops at the
//! first table that is a boundary and not shared, then makes one final lookup
//! of the root table, where globals and preloaded packages live. A write
//! updates the nearest visible definition, or creates the name locally.

mod arena;
mod table;

pub use arena::{ROOT_TABLE, SymbolArena, TableId};
pub use table::{SYMBOL_ALLOCATION_SIZE, SymbolTable};
