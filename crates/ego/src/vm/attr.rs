//! `Member`: field, key, package member and method lookup.

use super::{Context, has_capitalized_name};
use crate::{
    errors::{EgoError, ErrorKind, RunResult},
    natives::find_native_function,
    value::{Function, Package, Struct, Type, Value},
};

impl Context {
    /// Pops a container and pushes its member `name`. With a null operand
    /// the name is popped first.
    pub(super) fn op_member(&mut self, operand: &Value) -> RunResult<()> {
        let name = if operand.is_null() {
            self.pop_value()?.to_string()
        } else {
            operand.unwrapped().to_string()
        };
        let container = self.pop_value()?.into_unwrapped();
        let member = match container {
            Value::Map(map) => match map.get(&Value::from(name.as_str()))? {
                Some(v) => v,
                None => native_member(Value::Map(map), &name)?,
            },
            Value::Struct(s) => self.struct_member(&s, &name)?,
            Value::Package(package) => self.package_member(&package, &name)?,
            Value::Type(t) => type_member(&t, &name)?,
            other => native_member(other, &name)?,
        };
        self.push(member.into_unwrapped());
        Ok(())
    }

    /// A field, else a receiver function of the struct's type. Lower-case
    /// members of a struct from another package are not visible.
    fn struct_member(&self, s: &Struct, name: &str) -> RunResult<Value> {
        let member = s
            .get(name)
            .or_else(|| s.type_def().function(name))
            .ok_or_else(|| EgoError::new(ErrorKind::UnknownMember).context(name))?;
        if let Some(package) = s.package()
            && !package.is_empty()
            && package != self.pkg
            && !has_capitalized_name(name)
        {
            return Err(EgoError::new(ErrorKind::SymbolNotExported).context(name));
        }
        Ok(member)
    }

    /// Exported symbols of the package's own table come first, then its
    /// items. Bytecode found in a package is bound to it so the call runs in
    /// the package's scope.
    fn package_member(&self, package: &Package, name: &str) -> RunResult<Value> {
        let exported = if has_capitalized_name(name) {
            package.symbols().and_then(|table| self.arena.get_local(table, name))
        } else {
            None
        };
        let member = exported
            .or_else(|| package.get(name))
            .ok_or_else(|| EgoError::new(ErrorKind::UnknownPackageMember).context(name))?;
        Ok(match member.into_unwrapped() {
            Value::ByteCode(code) => Value::Function(Function::Package {
                package: package.clone(),
                code,
            }),
            v => v,
        })
    }
}

/// A receiver function declared on the type, else a native method of types.
fn type_member(t: &Type, name: &str) -> RunResult<Value> {
    if let Some(f) = t.function(name) {
        return Ok(f);
    }
    native_member(Value::Type(t.clone()), name)
}

/// A native method bound to `receiver`, else a function of its type.
fn native_member(receiver: Value, name: &str) -> RunResult<Value> {
    if let Some(native) = find_native_function(receiver.kind(), name) {
        return Ok(Value::Function(Function::Native(native.bind(receiver))));
    }
    receiver
        .type_of()
        .function(name)
        .ok_or_else(|| EgoError::new(ErrorKind::UnknownMember).context(name))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{
        bytecode::{ByteCode, Opcode},
        errors::{ErrorKind, RunResult},
        symbols::{ROOT_TABLE, SymbolArena},
        value::{Function, Map, Package, Struct, Type, Value},
        vm::Context,
    };

    fn member(container: Value, name: &str) -> (Context, RunResult<()>) {
        let arena = SymbolArena::new();
        arena.set_always(ROOT_TABLE, "c", container).unwrap();
        let mut code = ByteCode::new("member");
        code.emit_with(Opcode::Load, "c");
        code.emit_with(Opcode::Member, name);
        let mut ctx = Context::new(arena, ROOT_TABLE, code);
        let result = ctx.run();
        (ctx, result)
    }

    fn point() -> Type {
        let fields = vec![("x".to_owned(), Type::int()), ("Y".to_owned(), Type::int())];
        Type::user_defined("Point", Some("geo"), Type::structure(fields).unwrap())
    }

    #[test]
    fn test_map_member_reads_key() {
        let map = Map::new(Type::string(), Type::int());
        map.set(Value::from("a"), Value::Int(1)).unwrap();
        let (mut ctx, result) = member(Value::Map(map.clone()), "a");
        result.unwrap();
        assert_eq!(ctx.pop().unwrap(), Value::Int(1));

        let (_, result) = member(Value::Map(map), "missing");
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnknownMember);
    }

    #[test]
    fn test_map_member_falls_back_to_native_method() {
        let (mut ctx, result) = member(Value::Map(Map::new(Type::string(), Type::int())), "Len");
        result.unwrap();
        match ctx.pop().unwrap() {
            Value::Function(Function::Native(native)) => assert!(native.receiver.is_some()),
            other => panic!("expected a bound native, got {other}"),
        }
    }

    #[test]
    fn test_struct_member_visibility_across_packages() {
        let s = Struct::new(&point());
        s.set("x", Value::Int(3)).unwrap();
        s.set("Y", Value::Int(4)).unwrap();

        let (mut ctx, result) = member(Value::Struct(s.clone()), "Y");
        result.unwrap();
        assert_eq!(ctx.pop().unwrap(), Value::Int(4));

        let (_, result) = member(Value::Struct(s), "x");
        assert_eq!(result.unwrap_err().kind(), ErrorKind::SymbolNotExported);
    }

    #[test]
    fn test_struct_member_finds_receiver_function() {
        let t = point();
        t.add_function("Norm", Value::from(ByteCode::new("Norm")));
        let (mut ctx, result) = member(Value::Struct(Struct::new(&t)), "Norm");
        result.unwrap();
        assert!(matches!(ctx.pop().unwrap(), Value::ByteCode(_)));
    }

    #[test]
    fn test_package_member_binds_bytecode() {
        let package = Package::new("math");
        package.set("Pi", Value::Float64(2.5));
        package.set("Double", Value::from(ByteCode::new("Double")));

        let (mut ctx, result) = member(Value::Package(package.clone()), "Pi");
        result.unwrap();
        assert_eq!(ctx.pop().unwrap(), Value::Float64(2.5));

        let (mut ctx, result) = member(Value::Package(package.clone()), "Double");
        result.unwrap();
        match ctx.pop().unwrap() {
            Value::Function(Function::Package { package: p, .. }) => assert!(p.ptr_eq(&package)),
            other => panic!("expected a package function, got {other}"),
        }

        let (_, result) = member(Value::Package(package), "Missing");
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnknownPackageMember);
    }

    #[test]
    fn test_unknown_member_of_scalar() {
        let (_, result) = member(Value::Int(3), "Foo");
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnknownMember);
    }
}
