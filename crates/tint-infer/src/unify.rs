//! Unification of types and array lengths, and curried call application.
//!
//! Unification is eager: bindings are written into the environment's top
//! frame as soon as a rule decides them, so callers that need to back out
//! wrap the call in a transaction.

use std::collections::BTreeSet;

use tint_types::{
    Label, Length, PlaceholderId, Primitive, ScopeId, StructType, Type,
    sanitize_type_display, sanitize_type_pair_display,
};

use crate::env::Environment;
use crate::trace::UnifyAction;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why two types (or lengths) failed to unify.
///
/// Messages render types sanitized, so they never leak inference ids.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnifyError {
    #[error("cannot unify `{}` with `{}`", shown(.left, .right).0, shown(.left, .right).1)]
    Mismatch { left: Type, right: Type },

    #[error("array lengths `{left}` and `{right}` differ")]
    LengthMismatch { left: Length, right: Length },

    #[error("infinite type: `{}` occurs inside `{}`", shown(.var, .ty).0, shown(.var, .ty).1)]
    Occurs { var: Type, ty: Type },

    #[error("type `{name}` is not declared")]
    UndeclaredAlias { name: String },

    #[error("`{}` and `{}` share no field", shown(.left, .right).0, shown(.left, .right).1)]
    NoSharedFields { left: Type, right: Type },

    #[error("`{}` is not a function", sanitize_type_display(.ty))]
    NotAFunction { ty: Type },

    #[error("no overload of `{}` accepts ({})", sanitize_type_display(.callee), render_args(.args))]
    NoMatchingOverload { callee: Type, args: Vec<Type> },
}

fn shown(left: &Type, right: &Type) -> (String, String) {
    sanitize_type_pair_display(left, right)
}

fn render_args(args: &[Type]) -> String {
    args.iter()
        .map(sanitize_type_display)
        .collect::<Vec<_>>()
        .join(", ")
}

fn widens(a: Primitive, b: Primitive) -> bool {
    matches!(
        (a, b),
        (Primitive::Int, Primitive::Float) | (Primitive::Float, Primitive::Int)
    )
}

// ---------------------------------------------------------------------------
// Unification
// ---------------------------------------------------------------------------

impl Environment {
    /// Unify two types, returning the unified type.
    ///
    /// Symmetric except that a placeholder on the right is moved to the
    /// left, and two unbound placeholders bind left to right.
    pub fn unify(&mut self, left: &Type, right: &Type) -> Result<Type, UnifyError> {
        if left == right {
            self.push_unify_step(UnifyAction::Identity, left, right, || {
                "types already equal".into()
            });
            return Ok(left.clone());
        }

        match (left, right) {
            (Type::Unresolved { id, .. }, _) => self.unify_placeholder(*id, left, right),
            (_, Type::Unresolved { .. }) => self.unify(right, left),

            (Type::Alias { .. }, _) => {
                let def = self.alias_head(left, right)?;
                self.push_unify_step(UnifyAction::ExpandAlias, left, right, || {
                    format!("{left} := {}", sanitize_type_display(&def))
                });
                self.unify(&def, right)
            }
            (_, Type::Alias { .. }) => {
                let def = self.alias_head(right, left)?;
                self.push_unify_step(UnifyAction::ExpandAlias, left, right, || {
                    format!("{right} := {}", sanitize_type_display(&def))
                });
                self.unify(left, &def)
            }

            (
                Type::Array {
                    component: c1,
                    length: l1,
                },
                Type::Array {
                    component: c2,
                    length: l2,
                },
            ) => {
                self.push_unify_step(UnifyAction::Decompose, left, right, || {
                    "a[n] ~ b[m] -> unify components and lengths".into()
                });
                let component = self.unify(c1, c2)?;
                let length = self.unify_length(l1, l2)?;
                Ok(Type::array(component, length))
            }

            (Type::Struct(a), Type::Struct(b)) => self.meet(left, right, a, b),

            (Type::Function(f), Type::Function(g)) => {
                self.push_unify_step(UnifyAction::Decompose, left, right, || {
                    "a -> b ~ c -> d -> unify params and returns".into()
                });
                let param = self.unify(&f.param, &g.param)?;
                let ret = self.unify(&f.ret, &g.ret)?;
                Ok(Type::function(param, ret))
            }

            (Type::Primitive(a), Type::Primitive(b)) if widens(*a, *b) => {
                self.push_unify_step(UnifyAction::Widen, left, right, || {
                    "int and float widen to float".into()
                });
                Ok(Type::float())
            }

            _ => Err(self.mismatch(left, right)),
        }
    }

    fn mismatch(&mut self, left: &Type, right: &Type) -> UnifyError {
        self.push_unify_step(UnifyAction::Error, left, right, || "type mismatch".into());
        UnifyError::Mismatch {
            left: self.resolve(left),
            right: self.resolve(right),
        }
    }

    fn unify_placeholder(
        &mut self,
        id: PlaceholderId,
        var: &Type,
        other: &Type,
    ) -> Result<Type, UnifyError> {
        if let Some(bound) = self.placeholder_binding(id).cloned() {
            return self.unify(&bound, other);
        }
        let other = self.shallow_resolve(other);
        if other == *var {
            return Ok(other);
        }
        if self.occurs_in(id, &other) {
            self.push_unify_step(UnifyAction::OccursCheck, var, &other, || {
                "placeholder occurs in the type it would be bound to".into()
            });
            return Err(UnifyError::Occurs {
                var: var.clone(),
                ty: self.resolve(&other),
            });
        }
        self.push_unify_step(UnifyAction::Bind, var, &other, || {
            format!("?{} := {}", id.0, sanitize_type_display(&other))
        });
        self.bind_placeholder(id, other.clone());
        Ok(other)
    }

    /// Expand `alias` to the first non-alias in its chain. `other` is only
    /// used to report a cyclic chain as a mismatch.
    fn alias_head(&mut self, alias: &Type, other: &Type) -> Result<Type, UnifyError> {
        let head = self.head(alias);
        match &head {
            Type::Alias { scope, name } if self.find_declared_type(*scope, name).is_none() => {
                Err(UnifyError::UndeclaredAlias { name: name.clone() })
            }
            Type::Alias { .. } => Err(self.mismatch(alias, other)),
            _ => Ok(head.clone()),
        }
    }

    /// Struct meet: keep only the fields both sides have, unified.
    fn meet(
        &mut self,
        left: &Type,
        right: &Type,
        a: &StructType,
        b: &StructType,
    ) -> Result<Type, UnifyError> {
        let shared: Vec<Label> = a.labels().filter(|label| b.has(label)).cloned().collect();
        if shared.is_empty() {
            self.push_unify_step(UnifyAction::Error, left, right, || "no shared field".into());
            return Err(UnifyError::NoSharedFields {
                left: self.resolve(left),
                right: self.resolve(right),
            });
        }
        self.push_unify_step(UnifyAction::Meet, left, right, || {
            let names: Vec<&str> = shared.iter().map(Label::as_str).collect();
            format!("keep {{ {} }}", names.join(", "))
        });
        let mut fields = Vec::with_capacity(shared.len());
        for label in shared {
            if let (Some(x), Some(y)) = (a.get(&label), b.get(&label)) {
                let ty = self.unify(x, y)?;
                fields.push((label, ty));
            }
        }
        Ok(Type::structure(fields))
    }

    /// Unify two array lengths. An unbound variable binds to the other
    /// side, concrete or not.
    pub fn unify_length(&mut self, left: &Length, right: &Length) -> Result<Length, UnifyError> {
        let l = self.resolve_length(left);
        let r = self.resolve_length(right);
        match (l, r) {
            _ if l == r => Ok(l),
            (Length::Var(var), other) | (other, Length::Var(var)) => {
                self.push_length_step(l, r, || format!("n{} := {other}", var.0));
                self.bind_length(var, other);
                Ok(other)
            }
            (Length::Known(_), Length::Known(_)) => {
                Err(UnifyError::LengthMismatch { left: l, right: r })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Occurs check
    // -----------------------------------------------------------------------

    /// Whether placeholder `target` appears in `container`, following
    /// bindings and alias definitions.
    pub fn occurs_in(&self, target: PlaceholderId, container: &Type) -> bool {
        self.occurs(target, container, &mut BTreeSet::new())
    }

    fn occurs(
        &self,
        target: PlaceholderId,
        ty: &Type,
        aliases: &mut BTreeSet<(ScopeId, String)>,
    ) -> bool {
        match ty {
            Type::Unresolved { id, .. } => {
                *id == target
                    || self
                        .placeholder_binding(*id)
                        .is_some_and(|bound| self.occurs(target, bound, aliases))
            }
            Type::Alias { scope, name } => match self.find_declared_type(*scope, name) {
                Some((declared_in, def)) if aliases.insert((declared_in, name.clone())) => {
                    self.occurs(target, def, aliases)
                }
                _ => false,
            },
            Type::Array { component, .. } => self.occurs(target, component, aliases),
            Type::Struct(st) => st.fields.values().any(|f| self.occurs(target, f, aliases)),
            Type::Function(ft) => {
                self.occurs(target, &ft.param, aliases) || self.occurs(target, &ft.ret, aliases)
            }
            Type::Union(ut) => ut.members().iter().any(|m| self.occurs(target, m, aliases)),
            Type::Primitive(_) | Type::Parametric { .. } => false,
        }
    }

    // -----------------------------------------------------------------------
    // Call application
    // -----------------------------------------------------------------------

    /// Thread `args` through the curried parameter chain of `callee`.
    ///
    /// An unbound placeholder callee becomes `arg -> ?r`. A union callee is
    /// an overload set: members are tried in canonical order, each in its
    /// own transaction against all remaining arguments, and the first one
    /// that accepts them wins.
    pub fn apply_call(&mut self, callee: &Type, args: &[Type]) -> Result<Type, UnifyError> {
        let Some((arg, rest)) = args.split_first() else {
            return Ok(callee.clone());
        };
        let head = self.head(callee);
        match &head {
            Type::Function(ft) => {
                self.unify(&ft.param, arg)?;
                self.apply_call(&ft.ret, rest)
            }
            Type::Unresolved { scope, .. } => {
                let ret = self.fresh_placeholder(*scope);
                self.unify(&head, &Type::function(arg.clone(), ret.clone()))?;
                self.apply_call(&ret, rest)
            }
            Type::Union(ut) => {
                for member in ut.members() {
                    self.push_unify_step(UnifyAction::Overload, member, arg, || {
                        format!("try overload with {} argument(s)", args.len())
                    });
                    if let Ok(ty) = self.transaction(|env| env.apply_call(member, args)) {
                        return Ok(ty);
                    }
                }
                Err(UnifyError::NoMatchingOverload {
                    callee: self.resolve(&head),
                    args: args.iter().map(|a| self.resolve(a)).collect(),
                })
            }
            _ => Err(UnifyError::NotAFunction {
                ty: self.resolve(&head),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tint_types::{ParamLabel, UnionType};

    fn env() -> Environment {
        Environment::new()
    }

    fn field(name: &str, ty: Type) -> (Label, Type) {
        (Label::new(name), ty)
    }

    fn binop(ty: Type) -> Type {
        Type::curried(vec![ty.clone(), ty.clone()], ty)
    }

    #[test]
    fn equal_types_unify_to_themselves() {
        let mut env = env();
        let ty = Type::array(Type::bool(), Length::Known(2));
        assert_eq!(env.unify(&ty, &ty), Ok(ty));
    }

    #[test]
    fn int_and_float_widen_in_either_order() {
        let mut env = env();
        assert_eq!(env.unify(&Type::int(), &Type::float()), Ok(Type::float()));
        assert_eq!(env.unify(&Type::float(), &Type::int()), Ok(Type::float()));
        assert!(matches!(
            env.unify(&Type::uint(), &Type::float()),
            Err(UnifyError::Mismatch { .. })
        ));
    }

    #[test]
    fn placeholder_binds_to_the_other_side() {
        let mut env = env();
        let p = env.fresh_placeholder(ScopeId::NATIVE);
        assert_eq!(env.unify(&Type::int(), &p), Ok(Type::int()));
        assert_eq!(env.resolve(&p), Type::int());
        // Bound placeholders unify through their binding.
        assert_eq!(env.unify(&p, &Type::float()), Ok(Type::float()));
        assert!(env.unify(&p, &Type::bool()).is_err());
    }

    #[test]
    fn two_placeholders_bind_left_to_right() {
        let mut env = env();
        let a = env.fresh_placeholder(ScopeId::NATIVE);
        let b = env.fresh_placeholder(ScopeId::NATIVE);
        assert_eq!(env.unify(&a, &b), Ok(b.clone()));
        assert_eq!(env.resolve(&a), b);
        assert_eq!(env.resolve(&b), b);
    }

    #[test]
    fn occurs_check_rejects_infinite_types() {
        let mut env = env();
        let p = env.fresh_placeholder(ScopeId::NATIVE);
        let container = Type::array(p.clone(), Length::Known(4));
        let err = env.unify(&p, &container).unwrap_err();
        assert!(matches!(err, UnifyError::Occurs { .. }));
        assert_eq!(err.to_string(), "infinite type: `?a` occurs inside `?a[4]`");
        assert_eq!(env.resolve(&p), p);
    }

    #[test]
    fn occurs_check_follows_bindings_and_aliases() {
        let mut env = env();
        let s = ScopeId::NATIVE;
        let p = env.fresh_placeholder(s);
        let q = env.fresh_placeholder(s);
        let Type::Unresolved { id: pid, .. } = p else {
            unreachable!()
        };
        env.unify(&q, &Type::function(Type::int(), p.clone())).unwrap();
        assert!(env.occurs_in(pid, &q));

        env.add_declared_type(s, "Wrap", Type::array(q.clone(), Length::Known(1)))
            .unwrap();
        assert!(env.occurs_in(pid, &Type::alias(s, "Wrap")));
        assert!(!env.occurs_in(pid, &Type::int()));
    }

    #[test]
    fn struct_meet_keeps_shared_fields() {
        let mut env = env();
        let a = Type::structure([field("a", Type::int()), field("b", Type::float())]);
        let b = Type::structure([field("b", Type::float()), field("c", Type::bool())]);
        assert_eq!(
            env.unify(&a, &b),
            Ok(Type::structure([field("b", Type::float())]))
        );
    }

    #[test]
    fn struct_meet_without_shared_fields_fails() {
        let mut env = env();
        let a = Type::structure([field("a", Type::int())]);
        let b = Type::structure([field("b", Type::bool())]);
        let err = env.unify(&a, &b).unwrap_err();
        assert_eq!(
            err.to_string(),
            "`{ a: int }` and `{ b: bool }` share no field"
        );
    }

    #[test]
    fn struct_meet_fails_on_conflicting_shared_field() {
        let mut env = env();
        let a = Type::structure([field("x", Type::bool())]);
        let b = Type::structure([field("x", Type::int()), field("y", Type::int())]);
        assert!(matches!(
            env.unify(&a, &b),
            Err(UnifyError::Mismatch { .. })
        ));
    }

    #[test]
    fn arrays_unify_components_and_lengths() {
        let mut env = env();
        let n = env.fresh_length();
        let a = Type::array(Type::int(), n);
        let b = Type::array(Type::float(), Length::Known(3));
        assert_eq!(
            env.unify(&a, &b),
            Ok(Type::array(Type::float(), Length::Known(3)))
        );
        assert_eq!(env.resolve_length(&n), Length::Known(3));

        let c = Type::array(Type::float(), Length::Known(4));
        let err = env.unify(&a, &c).unwrap_err();
        assert_eq!(err.to_string(), "array lengths `3` and `4` differ");
    }

    #[test]
    fn length_variables_bind_to_each_other() {
        let mut env = env();
        let n = env.fresh_length();
        let m = env.fresh_length();
        assert_eq!(env.unify_length(&n, &m), Ok(m));
        assert_eq!(env.unify_length(&m, &Length::Known(2)), Ok(Length::Known(2)));
        assert_eq!(env.resolve_length(&n), Length::Known(2));
    }

    #[test]
    fn aliases_unify_through_their_declarations() {
        let mut env = env();
        let s = env.new_scope(ScopeId::NATIVE);
        env.add_declared_type(s, "Vec3", Type::array(Type::float(), Length::Known(3)))
            .unwrap();
        let alias = Type::alias(s, "Vec3");
        assert_eq!(
            env.unify(&alias, &Type::array(Type::float(), Length::Known(3))),
            Ok(Type::array(Type::float(), Length::Known(3)))
        );
        assert_eq!(
            env.unify(&Type::alias(s, "Nope"), &Type::int()),
            Err(UnifyError::UndeclaredAlias {
                name: "Nope".to_string()
            })
        );
    }

    #[test]
    fn cyclic_alias_is_a_mismatch_not_a_hang() {
        let mut env = env();
        let s = ScopeId::NATIVE;
        env.add_declared_type(s, "X", Type::alias(s, "X")).unwrap();
        assert!(matches!(
            env.unify(&Type::alias(s, "X"), &Type::int()),
            Err(UnifyError::Mismatch { .. })
        ));
    }

    #[test]
    fn function_unification_is_symmetric() {
        let mut env = env();
        let p = env.fresh_placeholder(ScopeId::NATIVE);
        let f = Type::function(p.clone(), Type::bool());
        let g = Type::function(Type::int(), Type::bool());
        assert_eq!(env.unify(&g, &f), Ok(g.clone()));
        assert_eq!(env.resolve(&p), Type::int());
    }

    #[test]
    fn parametric_and_union_only_unify_with_themselves() {
        let mut env = env();
        let t = Type::Parametric {
            scope: ScopeId::NATIVE,
            label: ParamLabel(0),
        };
        let u = Type::Parametric {
            scope: ScopeId::NATIVE,
            label: ParamLabel(1),
        };
        assert_eq!(env.unify(&t, &t), Ok(t.clone()));
        assert!(env.unify(&t, &u).is_err());
        assert!(env.unify(&t, &Type::int()).is_err());

        let union = UnionType::from_members([Type::int(), Type::bool()]).unwrap();
        assert_eq!(env.unify(&union, &union), Ok(union.clone()));
        assert!(env.unify(&union, &Type::int()).is_err());
    }

    #[test]
    fn overload_resolution_takes_the_first_accepting_member() {
        let mut env = env();
        let plus = UnionType::from_members([binop(Type::int()), binop(Type::float())]).unwrap();
        let a = env.fresh_placeholder(ScopeId::NATIVE);
        let b = env.fresh_placeholder(ScopeId::NATIVE);
        let result = env.apply_call(&plus, &[a.clone(), b.clone()]).unwrap();
        assert_eq!(result, Type::float());
        assert_eq!(env.resolve(&a), Type::float());
        assert_eq!(env.resolve(&b), Type::float());
        assert_eq!(env.transaction_depth(), 0);
    }

    #[test]
    fn overload_resolution_skips_rejecting_members() {
        let mut env = env();
        let plus = UnionType::from_members([binop(Type::float()), binop(Type::uint())]).unwrap();
        let result = env.apply_call(&plus, &[Type::uint(), Type::uint()]).unwrap();
        assert_eq!(result, Type::uint());

        let err = env
            .apply_call(&plus, &[Type::bool(), Type::uint()])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "no overload of `(float -> float -> float | uint -> uint -> uint)` accepts (bool, uint)"
        );
    }

    #[test]
    fn unbound_callee_becomes_a_function() {
        let mut env = env();
        let f = env.fresh_placeholder(ScopeId::NATIVE);
        let result = env.apply_call(&f, &[Type::int(), Type::bool()]).unwrap();
        let expected = Type::curried(vec![Type::int(), Type::bool()], result.clone());
        assert_eq!(env.resolve(&f), env.resolve(&expected));
    }

    #[test]
    fn calling_a_non_function_fails() {
        let mut env = env();
        assert_eq!(
            env.apply_call(&Type::int(), &[Type::int()]),
            Err(UnifyError::NotAFunction { ty: Type::int() })
        );
        // Too many arguments run off the end of the chain.
        let f = Type::function(Type::int(), Type::int());
        assert!(matches!(
            env.apply_call(&f, &[Type::int(), Type::int()]),
            Err(UnifyError::NotAFunction { .. })
        ));
    }

    #[test]
    fn tracing_records_bind_steps() {
        let mut env = env();
        env.enable_tracing();
        let p = env.fresh_placeholder(ScopeId::NATIVE);
        env.unify(&p, &Type::int()).unwrap();
        let steps = env.unify_trace();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].action, UnifyAction::Bind);
        assert_eq!(steps[0].left, "?a");
        assert_eq!(steps[0].right, "int");
    }
}
