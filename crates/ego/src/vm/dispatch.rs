//! Opcode to handler mapping.

use std::sync::OnceLock;

use strum::EnumCount;

use super::Context;
use crate::{
    bytecode::Opcode,
    errors::{EgoError, ErrorKind, RunResult},
    value::Value,
};

/// The signature shared by every instruction handler.
pub(super) type Handler = fn(&mut Context, &Value) -> RunResult<()>;

fn handler_for(op: Opcode) -> Handler {
    match op {
        Opcode::Stop => Context::op_stop,
        Opcode::AtLine => Context::op_at_line,
        Opcode::Add => Context::op_add,
        Opcode::AddressOf => Context::op_address_of,
        Opcode::And => Context::op_and,
        Opcode::ArgCheck => Context::op_arg_check,
        Opcode::Array => Context::op_array,
        Opcode::Auth => Context::op_auth,
        Opcode::BitAnd => Context::op_bit_and,
        Opcode::BitOr => Context::op_bit_or,
        Opcode::BitShift => Context::op_bit_shift,
        Opcode::Call => Context::op_call,
        Opcode::Coerce => Context::op_coerce,
        Opcode::Constant => Context::op_constant,
        Opcode::Copy => Context::op_copy,
        Opcode::CreateAndStore => Context::op_create_and_store,
        Opcode::Defer => Context::op_defer,
        Opcode::DeRef => Context::op_deref,
        Opcode::Div => Context::op_div,
        Opcode::Drop => Context::op_drop,
        Opcode::DropToMarker => Context::op_drop_to_marker,
        Opcode::Dup => Context::op_dup,
        Opcode::EntryPoint => Context::op_entry_point,
        Opcode::Equal => Context::op_equal,
        Opcode::Exp => Context::op_exp,
        Opcode::Explode => Context::op_explode,
        Opcode::Flatten => Context::op_flatten,
        Opcode::FromFile => Context::op_from_file,
        Opcode::GetThis => Context::op_get_this,
        Opcode::GetVarArgs => Context::op_get_var_args,
        Opcode::Go => Context::op_go,
        Opcode::GreaterThan => Context::op_greater_than,
        Opcode::GreaterThanOrEqual => Context::op_greater_than_or_equal,
        Opcode::Import => Context::op_import,
        Opcode::InFile => Context::op_in_file,
        Opcode::InPackage => Context::op_in_package,
        Opcode::LessThan => Context::op_less_than,
        Opcode::LessThanOrEqual => Context::op_less_than_or_equal,
        Opcode::Load => Context::op_load,
        Opcode::LoadIndex => Context::op_load_index,
        Opcode::LoadSlice => Context::op_load_slice,
        Opcode::LoadThis => Context::op_load_this,
        Opcode::Log => Context::op_log,
        Opcode::MakeArray => Context::op_make_array,
        Opcode::MakeMap => Context::op_make_map,
        Opcode::Member => Context::op_member,
        Opcode::ModeCheck => Context::op_mode_check,
        Opcode::Modulo => Context::op_modulo,
        Opcode::Mul => Context::op_mul,
        Opcode::Negate => Context::op_negate,
        Opcode::Newline => Context::op_newline,
        Opcode::NoOperation => Context::op_no_operation,
        Opcode::NotEqual => Context::op_not_equal,
        Opcode::Or => Context::op_or,
        Opcode::Panic => Context::op_panic,
        Opcode::PopPackage => Context::op_pop_package,
        Opcode::PopScope => Context::op_pop_scope,
        Opcode::Print => Context::op_print,
        Opcode::Push => Context::op_push,
        Opcode::PushPackage => Context::op_push_package,
        Opcode::PushScope => Context::op_push_scope,
        Opcode::RangeInit => Context::op_range_init,
        Opcode::ReadStack => Context::op_read_stack,
        Opcode::RequiredType => Context::op_required_type,
        Opcode::Response => Context::op_response,
        Opcode::Return => Context::op_return,
        Opcode::Say => Context::op_say,
        Opcode::SetThis => Context::op_set_this,
        Opcode::StackCheck => Context::op_stack_check,
        Opcode::StaticTyping => Context::op_static_typing,
        Opcode::Store => Context::op_store,
        Opcode::StoreAlways => Context::op_store_always,
        Opcode::StoreBytecode => Context::op_store_bytecode,
        Opcode::StoreChan => Context::op_store_chan,
        Opcode::StoreGlobal => Context::op_store_global,
        Opcode::StoreIndex => Context::op_store_index,
        Opcode::StoreInto => Context::op_store_into,
        Opcode::StoreViaPointer => Context::op_store_via_pointer,
        Opcode::Struct => Context::op_struct,
        Opcode::Sub => Context::op_sub,
        Opcode::Swap => Context::op_swap,
        Opcode::SymbolCreate => Context::op_symbol_create,
        Opcode::SymbolDelete => Context::op_symbol_delete,
        Opcode::SymbolOptCreate => Context::op_symbol_opt_create,
        Opcode::Template => Context::op_template,
        Opcode::Timer => Context::op_timer,
        Opcode::TryPop => Context::op_try_pop,
        Opcode::Wait => Context::op_wait,
        Opcode::WillCatch => Context::op_will_catch,
        Opcode::BranchInstructions => op_unimplemented,
        Opcode::Branch => Context::op_branch,
        Opcode::BranchTrue => Context::op_branch_true,
        Opcode::BranchFalse => Context::op_branch_false,
        Opcode::LocalCall => Context::op_local_call,
        Opcode::RangeNext => Context::op_range_next,
        Opcode::Try => Context::op_try,
    }
}

fn op_unimplemented(_ctx: &mut Context, _operand: &Value) -> RunResult<()> {
    Err(EgoError::new(ErrorKind::UnimplementedInstruction).context(Opcode::BranchInstructions))
}

/// The handler of `op`, from a table built on first use.
pub(super) fn handler(op: Opcode) -> Handler {
    static TABLE: OnceLock<[Handler; Opcode::COUNT]> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        std::array::from_fn(|code| match u16::try_from(code).ok().and_then(Opcode::from_repr) {
            Some(op) => handler_for(op),
            None => op_unimplemented as Handler,
        })
    });
    table[usize::from(op.code())]
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{
        bytecode::{ByteCode, Opcode},
        errors::ErrorKind,
        symbols::{ROOT_TABLE, SymbolArena},
        vm::Context,
    };

    #[test]
    fn test_marker_opcode_is_unimplemented() {
        let mut code = ByteCode::new("marker");
        code.emit(Opcode::BranchInstructions);
        let mut ctx = Context::new(SymbolArena::new(), ROOT_TABLE, code);
        assert_eq!(ctx.run().unwrap_err().kind(), ErrorKind::UnimplementedInstruction);
    }
}
