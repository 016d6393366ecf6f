//! Primitive type names and native operators of the root scope.
//!
//! Operators are ordinary variables whose declared expression is a native
//! leaf. Overloaded operators are unions of function types; call
//! resolution tries the members in canonical order, which puts `float`
//! first.

use tint_ast::AstBuilder;
use tint_types::{DeclarationError, Primitive, ScopeId, Type, UnionType};

use crate::env::Environment;

const ARITHMETIC: &[&str] = &["+", "-", "*", "/"];
const COMPARISON: &[&str] = &["<", "<=", ">", ">="];
const EQUALITY: &[&str] = &["==", "!="];
const LOGICAL: &[&str] = &["&&", "||"];
const FLOAT_UNARY: &[&str] = &[
    "sin", "cos", "tan", "sqrt", "exp", "log", "floor", "ceil", "fract",
];

const NUMERIC: [Primitive; 3] = [Primitive::Float, Primitive::Int, Primitive::Uint];

/// Declare the primitive type names and every native operator in the root
/// scope.
pub fn install(env: &mut Environment, builder: &mut AstBuilder) -> Result<(), DeclarationError> {
    for primitive in Primitive::ALL {
        env.add_declared_type(ScopeId::NATIVE, primitive.name(), Type::Primitive(primitive))?;
    }
    for (name, ty) in native_operators() {
        let node = builder.native(ScopeId::NATIVE, ty);
        env.add_variable(ScopeId::NATIVE, name, node)?;
    }
    Ok(())
}

/// Every native operator and function with its (possibly overloaded) type.
pub fn native_operators() -> Vec<(&'static str, Type)> {
    let mut ops = Vec::new();
    for &name in ARITHMETIC {
        ops.push((name, overloads(NUMERIC.iter().map(|p| binary(*p, *p)))));
    }
    ops.push((
        "%",
        overloads([Primitive::Int, Primitive::Uint].map(|p| binary(p, p))),
    ));
    for &name in COMPARISON {
        ops.push((
            name,
            overloads(NUMERIC.iter().map(|p| binary(*p, Primitive::Bool))),
        ));
    }
    let comparable = [
        Primitive::Float,
        Primitive::Int,
        Primitive::Uint,
        Primitive::Bool,
    ];
    for &name in EQUALITY {
        ops.push((
            name,
            overloads(comparable.map(|p| binary(p, Primitive::Bool))),
        ));
    }
    for &name in LOGICAL {
        ops.push((name, binary(Primitive::Bool, Primitive::Bool)));
    }
    ops.push(("!", unary(Primitive::Bool, Primitive::Bool)));
    ops.push((
        "neg",
        overloads([Primitive::Float, Primitive::Int].map(|p| unary(p, p))),
    ));
    ops.push((
        "abs",
        overloads([Primitive::Float, Primitive::Int].map(|p| unary(p, p))),
    ));
    for &name in FLOAT_UNARY {
        ops.push((name, unary(Primitive::Float, Primitive::Float)));
    }
    ops.push(("pow", binary(Primitive::Float, Primitive::Float)));
    for name in ["min", "max"] {
        ops.push((name, overloads(NUMERIC.iter().map(|p| binary(*p, *p)))));
    }
    ops.push((
        "mix",
        Type::curried(
            vec![Type::float(), Type::float(), Type::float()],
            Type::float(),
        ),
    ));
    // Conversions.
    ops.push((
        "toFloat",
        overloads(
            [Primitive::Int, Primitive::Uint, Primitive::Bool].map(|p| unary(p, Primitive::Float)),
        ),
    ));
    ops.push((
        "toInt",
        overloads([Primitive::Float, Primitive::Uint].map(|p| unary(p, Primitive::Int))),
    ));
    ops.push((
        "toUint",
        overloads([Primitive::Float, Primitive::Int].map(|p| unary(p, Primitive::Uint))),
    ));
    ops
}

fn unary(param: Primitive, ret: Primitive) -> Type {
    Type::function(Type::Primitive(param), Type::Primitive(ret))
}

/// `a -> a -> ret`.
fn binary(operand: Primitive, ret: Primitive) -> Type {
    let operand = Type::Primitive(operand);
    Type::curried(vec![operand.clone(), operand], Type::Primitive(ret))
}

/// Union of the given function types. Every caller passes at least two.
fn overloads(members: impl IntoIterator<Item = Type>) -> Type {
    UnionType::from_members(members).unwrap_or_else(Type::float)
}
