//! End-to-end runs of `check_program` with rendered diagnostics.
//!
//! Expression ids in the snapshots start at 32: installing the native
//! scope builds one node per native operator first.

use std::fmt::Write;

use insta::assert_snapshot;
use tint_ast::{AstBuilder, ExprKind, FileId, Param, Span};
use tint_infer::{Environment, TypedProgram, check_program};
use tint_types::{ScopeId, Type, sanitize_type_display};

fn setup() -> (Environment, AstBuilder, ScopeId) {
    let mut b = AstBuilder::new();
    let mut env = Environment::with_natives(&mut b).unwrap();
    let program = env.new_scope(ScopeId::NATIVE);
    (env, b, program)
}

fn render_program(program: &TypedProgram) -> String {
    let mut out = String::new();
    for decl in program.iter() {
        writeln!(&mut out, "{}: {}", decl.name, sanitize_type_display(&decl.ty)).unwrap();
    }
    out
}

fn span(start: u32, end: u32) -> Span {
    Span::new(FileId(0), start, end)
}

#[test]
fn cyclic_aliases_halt_the_pipeline() {
    let (mut env, mut b, s) = setup();
    env.add_declared_type(s, "X", Type::alias(s, "X")).unwrap();
    env.add_declared_type(s, "Y", Type::alias(s, "Z")).unwrap();
    env.add_declared_type(s, "Z", Type::alias(s, "Y")).unwrap();
    let missing = b.var(s, "undeclaredName");
    let missing_id = missing.id;
    env.add_variable(s, "y", missing).unwrap();

    let err = check_program(&mut env).unwrap_err();
    assert_snapshot!(err.render(), @r"
    error[T0004]: type alias `X` refers to itself
      in: type `X`
      help: break the cycle with a struct, array or primitive type
    error[T0004]: type aliases form a cycle: `Y` -> `Z` -> `Y`
      in: type `Y`
      help: break the cycle with a struct, array or primitive type
    ");
    assert!(env.type_of(missing_id).is_none());
}

#[test]
fn undefined_variable_is_reported_before_inference() {
    let (mut env, mut b, s) = setup();
    let missing = b.var(s, "undeclaredName");
    let one = b.int(s, 1);
    let sum = b.apply(s, "+", vec![missing, one]);
    let sum_id = sum.id;
    env.add_variable(s, "y", sum).unwrap();

    let err = check_program(&mut env).unwrap_err();
    assert_snapshot!(err.render(), @r"
    error[T0005]: undefined variable `undeclaredName`
      in: expression #32
    ");
    assert!(env.type_of(sum_id).is_none());
}

#[test]
fn uniform_used_with_two_types() {
    let (mut env, mut b, s) = setup();
    let as_float = b.build_at(
        s,
        span(10, 20),
        ExprKind::Uniform {
            name: "lightColor".into(),
            annotation: Some(Type::float()),
        },
    );
    let as_int = b.build_at(
        s,
        span(40, 50),
        ExprKind::Uniform {
            name: "lightColor".into(),
            annotation: Some(Type::int()),
        },
    );
    env.add_variable(s, "a", as_float).unwrap();
    env.add_variable(s, "b", as_int).unwrap();

    let err = check_program(&mut env).unwrap_err();
    assert_eq!(err.diagnostics().len(), 1);
    assert_snapshot!(err.render(), @r"
    error[T0009]: uniform `lightColor` is used as `float` and `int`
      in: expression #33
      note: used as `float` here (10..20)
      note: used as `int` here (40..50)
      help: annotate `lightColor` with one type at every use
    ");
}

#[test]
fn consistent_uniforms_check_cleanly() {
    let (mut env, mut b, s) = setup();
    let first = b.uniform(s, "lightColor", Some(Type::float()));
    let second = b.uniform(s, "lightColor", Some(Type::float()));
    env.add_variable(s, "a", first).unwrap();
    env.add_variable(s, "b", second).unwrap();

    let program = check_program(&mut env).unwrap();
    assert_snapshot!(render_program(&program), @r"
    a: float
    b: float
    ");
}

#[test]
fn jar_end_to_end() {
    let (mut env, mut b, s) = setup();
    let jar = env
        .build_function(
            &mut b,
            s,
            vec![Param::new("foo"), Param::new("bar")],
            |b, body| {
                let foo = b.var(body, "foo");
                let bar = b.var(body, "bar");
                b.apply(body, "+", vec![foo, bar])
            },
        )
        .unwrap();
    env.add_variable(s, "jar", jar).unwrap();
    let three = b.int(s, 3);
    let five = b.int(s, 5);
    let x = b.apply(s, "jar", vec![three, five]);
    env.add_variable(s, "x", x).unwrap();

    let program = check_program(&mut env).unwrap();
    assert_snapshot!(render_program(&program), @r"
    jar: float -> float -> float
    x: float
    bar: float
    foo: float
    ");
}

#[test]
fn inference_failures_surface_after_the_checkers() {
    let (mut env, mut b, s) = setup();
    let cond = b.int(s, 1);
    let then = b.int(s, 2);
    let other = b.int(s, 3);
    let z = b.conditional(s, cond, then, other);
    env.add_variable(s, "z", z).unwrap();

    let err = check_program(&mut env).unwrap_err();
    assert_snapshot!(err.render(), @r"
    error[T0001]: cannot unify `bool` with `int`
      in: expression #32
    ");
}
