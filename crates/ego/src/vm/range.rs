//! `for ... range` loops.

use super::{Context, DISCARD_VAR};
use crate::{
    channel::Channel,
    errors::{EgoError, ErrorKind, RunResult},
    value::{Array, Map, Value},
};

/// What a range loop walks over, with whatever was precomputed at `RangeInit`.
#[derive(Debug, Clone)]
enum Iteratee {
    /// Byte offsets and characters of a string.
    Runes { offsets: Vec<usize>, runes: Vec<char> },
    /// A map and the snapshot of its keys.
    Map { map: Map, keys: Vec<Value> },
    Array(Array),
    Channel(Channel),
}

/// One active range loop on the range stack.
#[derive(Debug, Clone)]
pub(super) struct RangeRecord {
    index_name: String,
    value_name: String,
    iteratee: Iteratee,
    position: usize,
}

impl RangeRecord {
    /// Clears the immutability flags set when the loop started.
    fn release(&self) {
        match &self.iteratee {
            Iteratee::Map { map, .. } => map.set_immutable_keys(false),
            Iteratee::Array(array) => array.set_immutable(false),
            Iteratee::Runes { .. } | Iteratee::Channel(_) => {}
        }
    }
}

/// The bound names of a loop; empty and `_` names are skipped.
fn is_bound(name: &str) -> bool {
    !name.is_empty() && name != DISCARD_VAR
}

/// The next step of a range loop.
enum Step {
    Done,
    Next { index: Value, value: Value },
}

impl Context {
    /// Pops the iteratee and pushes a range record. The operand names the
    /// index and value variables.
    pub(super) fn op_range_init(&mut self, operand: &Value) -> RunResult<()> {
        let (index_name, value_name) = match operand.unwrapped() {
            Value::Array(names) => {
                let names = names.values();
                let name_at = |i: usize| names.get(i).and_then(Value::as_str).unwrap_or_default().to_owned();
                (name_at(0), name_at(1))
            }
            _ => (String::new(), String::new()),
        };
        for name in [&index_name, &value_name] {
            if is_bound(name) && !self.arena.is_local(self.symbols, name) {
                self.arena.create(self.symbols, name)?;
            }
        }

        let iteratee = match self.pop_value()?.into_unwrapped() {
            Value::String(s) => {
                let (offsets, runes) = s.char_indices().unzip();
                Iteratee::Runes { offsets, runes }
            }
            Value::Map(map) => {
                let keys = map.keys();
                map.set_immutable_keys(true);
                Iteratee::Map { map, keys }
            }
            Value::Array(array) => {
                array.set_immutable(true);
                Iteratee::Array(array)
            }
            Value::Channel(channel) => Iteratee::Channel(channel),
            other => return Err(EgoError::new(ErrorKind::InvalidType).context(other.kind())),
        };
        self.range_stack.push(RangeRecord {
            index_name,
            value_name,
            iteratee,
            position: 0,
        });
        Ok(())
    }

    /// Binds the next index and value, or branches to the operand address
    /// once the loop is exhausted.
    pub(super) fn op_range_next(&mut self, operand: &Value) -> RunResult<()> {
        let exit = self.branch_target(operand)?;
        let Some(record) = self.range_stack.last_mut() else {
            self.pc = exit;
            return Ok(());
        };
        let position = record.position;
        let step = match &record.iteratee {
            Iteratee::Runes { offsets, runes } => match (offsets.get(position), runes.get(position)) {
                (Some(&offset), Some(&rune)) => Step::Next {
                    index: Value::from(offset),
                    value: Value::String(rune.to_string()),
                },
                _ => Step::Done,
            },
            Iteratee::Map { map, keys } => match keys.get(position) {
                Some(key) => Step::Next {
                    index: key.clone(),
                    // A key deleted inside the loop yields nil.
                    value: map.get(key)?.unwrap_or_default(),
                },
                None => Step::Done,
            },
            Iteratee::Array(array) => {
                if position < array.len() {
                    Step::Next {
                        index: Value::from(position),
                        value: array.get(position)?,
                    }
                } else {
                    Step::Done
                }
            }
            Iteratee::Channel(channel) => {
                if channel.is_empty() {
                    Step::Done
                } else {
                    match channel.receive() {
                        Ok(value) => Step::Next {
                            index: Value::from(position),
                            value,
                        },
                        Err(_) => Step::Done,
                    }
                }
            }
        };

        match step {
            Step::Done => {
                self.pc = exit;
                if let Some(record) = self.range_stack.pop() {
                    record.release();
                }
            }
            Step::Next { index, value } => {
                record.position += 1;
                let (index_name, value_name) = (record.index_name.clone(), record.value_name.clone());
                if is_bound(&index_name) {
                    self.arena.set(self.symbols, &index_name, index)?;
                }
                if is_bound(&value_name) {
                    self.arena.set(self.symbols, &value_name, value)?;
                }
            }
        }
        Ok(())
    }

    /// Pops range records down to `depth`, releasing their iteratees.
    pub(super) fn release_ranges(&mut self, depth: usize) {
        while self.range_stack.len() > depth {
            if let Some(record) = self.range_stack.pop() {
                record.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{
        bytecode::{ByteCode, Opcode},
        channel::Channel,
        errors::ErrorKind,
        symbols::{ROOT_TABLE, SymbolArena},
        value::{Array, Map, Type, Value},
        vm::Context,
    };

    /// Pushes `index` and `value` for every step of a range over `iteratee`,
    /// which is bound to `it` so the loop sees the caller's container.
    fn collect(iteratee: Value) -> (Context, crate::errors::RunResult<()>) {
        let arena = SymbolArena::new();
        arena.set_always(ROOT_TABLE, "it", iteratee).unwrap();
        let mut code = ByteCode::new("range");
        code.emit_with(Opcode::Load, "it");
        code.emit_list(Opcode::RangeInit, vec![Value::from("i"), Value::from("v")]);
        code.emit_with(Opcode::RangeNext, 6);
        code.emit_with(Opcode::Load, "i");
        code.emit_with(Opcode::Load, "v");
        code.emit_with(Opcode::Branch, 2);
        code.emit(Opcode::NoOperation);
        let mut ctx = Context::new(arena, ROOT_TABLE, code);
        let result = ctx.run();
        (ctx, result)
    }

    #[test]
    fn test_range_over_string_yields_byte_offsets() {
        let (ctx, result) = collect(Value::from("aé!"));
        result.unwrap();
        assert_eq!(
            ctx.stack(),
            &[
                Value::Int(0),
                Value::from("a"),
                Value::Int(1),
                Value::from("é"),
                Value::Int(3),
                Value::from("!"),
            ]
        );
    }

    #[test]
    fn test_range_over_array_releases_immutability() {
        let array = Array::new(Type::int(), vec![Value::Int(10), Value::Int(20)]);
        let (ctx, result) = collect(Value::Array(array.clone()));
        result.unwrap();
        assert_eq!(ctx.stack(), &[Value::Int(0), Value::Int(10), Value::Int(1), Value::Int(20)]);
        assert!(ctx.range_stack.is_empty());
        assert!(!array.is_immutable());
    }

    #[test]
    fn test_range_over_map_follows_key_order() {
        let map = Map::new(Type::string(), Type::int());
        map.set(Value::from("b"), Value::Int(2)).unwrap();
        map.set(Value::from("a"), Value::Int(1)).unwrap();
        let (ctx, result) = collect(Value::Map(map.clone()));
        result.unwrap();
        let keys = map.keys();
        assert_eq!(ctx.stack()[0], keys[0]);
        assert_eq!(ctx.stack().len(), 4);
        // Keys are mutable again after the loop.
        map.set(Value::from("c"), Value::Int(3)).unwrap();
    }

    #[test]
    fn test_range_over_closed_channel_drains_it() {
        let channel = Channel::new(3);
        channel.send(Value::from("x")).unwrap();
        channel.send(Value::from("y")).unwrap();
        channel.close();
        let (ctx, result) = collect(Value::Channel(channel));
        result.unwrap();
        assert_eq!(
            ctx.stack(),
            &[Value::Int(0), Value::from("x"), Value::Int(1), Value::from("y")]
        );
    }

    #[test]
    fn test_range_over_number_is_invalid() {
        let (_, result) = collect(Value::Int(3));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidType);
    }

    #[test]
    fn test_range_next_without_range_just_branches() {
        let mut code = ByteCode::new("range");
        code.emit_with(Opcode::RangeNext, 2);
        code.emit_with(Opcode::Push, "skipped");
        code.emit_with(Opcode::Push, "done");
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        ctx.run().unwrap();
        assert_eq!(ctx.stack(), &[Value::from("done")]);
    }
}
