//! Property tests for the unifier using proptest.
//!
//! These stress invariants that must hold for any input types, not just
//! hand-picked examples:
//!
//! 1. Unification is reflexive: unify(t, t) succeeds with t
//! 2. Unification of ground types is symmetric in outcome and result
//! 3. Occurs check: a placeholder never binds into a type containing it
//! 4. Struct meet keeps exactly the shared labels
//! 5. Struct equality and hashing ignore field order
//! 6. Aborted transactions leave no bindings behind

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use proptest::prelude::*;
use tint_types::{Label, Length, ScopeId, StructType, Type};

use crate::{Environment, UnifyError};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

const LABELS: [&str; 4] = ["a", "b", "c", "d"];

fn arb_primitive() -> impl Strategy<Value = Type> {
    prop_oneof![
        Just(Type::float()),
        Just(Type::int()),
        Just(Type::uint()),
        Just(Type::bool()),
    ]
}

/// Types with no placeholders, parameters or aliases.
fn arb_ground() -> impl Strategy<Value = Type> {
    arb_primitive().prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), 1u32..4).prop_map(|(c, n)| Type::array(c, Length::Known(n))),
            (inner.clone(), inner.clone()).prop_map(|(p, r)| Type::function(p, r)),
            prop::collection::btree_map(0usize..LABELS.len(), inner, 1..3).prop_map(|fields| {
                Type::structure(
                    fields
                        .into_iter()
                        .map(|(i, ty)| (Label::new(LABELS[i]), ty)),
                )
            }),
        ]
    })
}

fn arb_labels() -> impl Strategy<Value = BTreeSet<&'static str>> {
    prop::collection::btree_set(prop::sample::select(LABELS.to_vec()), 1..4)
}

fn int_struct(labels: &BTreeSet<&'static str>) -> Type {
    Type::structure(labels.iter().map(|l| (Label::new(*l), Type::int())))
}

fn hash_of(ty: &Type) -> u64 {
    let mut hasher = DefaultHasher::new();
    ty.hash(&mut hasher);
    hasher.finish()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn unify_is_reflexive(t in arb_ground()) {
        let mut env = Environment::new();
        prop_assert_eq!(env.unify(&t, &t), Ok(t.clone()));
    }

    #[test]
    fn unify_is_symmetric_on_ground_types(a in arb_ground(), b in arb_ground()) {
        let forward = Environment::new().unify(&a, &b);
        let backward = Environment::new().unify(&b, &a);
        prop_assert_eq!(forward.is_ok(), backward.is_ok());
        if let (Ok(x), Ok(y)) = (forward, backward) {
            prop_assert_eq!(x, y);
        }
    }

    #[test]
    fn occurs_check_rejects_self_containing_bindings(t in arb_ground(), shape in 0u8..3) {
        let mut env = Environment::new();
        let p = env.fresh_placeholder(ScopeId::NATIVE);
        let container = match shape {
            0 => Type::array(p.clone(), Length::Known(2)),
            1 => Type::function(t, p.clone()),
            _ => Type::structure([(Label::new("a"), p.clone()), (Label::new("b"), t)]),
        };
        let result = env.unify(&p, &container);
        prop_assert!(
            matches!(result, Err(UnifyError::Occurs { .. })),
            "expected an occurs failure, got {:?}",
            result
        );
        prop_assert!(env.resolve(&p).is_unresolved());
    }

    #[test]
    fn struct_meet_keeps_shared_labels(left in arb_labels(), right in arb_labels()) {
        let mut env = Environment::new();
        let shared: BTreeSet<_> = left.intersection(&right).copied().collect();
        let result = env.unify(&int_struct(&left), &int_struct(&right));
        if shared.is_empty() {
            prop_assert!(
                matches!(result, Err(UnifyError::NoSharedFields { .. })),
                "expected no shared fields, got {:?}",
                result
            );
        } else {
            prop_assert_eq!(result, Ok(int_struct(&shared)));
        }
    }

    #[test]
    fn struct_field_order_is_irrelevant(
        fields in prop::collection::btree_map(0usize..LABELS.len(), arb_ground(), 1..4)
    ) {
        let forward: Vec<(Label, Type)> = fields
            .iter()
            .map(|(i, ty)| (Label::new(LABELS[*i]), ty.clone()))
            .collect();
        let mut backward = forward.clone();
        backward.reverse();
        let a = Type::Struct(StructType::new(forward));
        let b = Type::Struct(StructType::new(backward));
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn aborted_bindings_are_invisible(t in arb_ground()) {
        let mut env = Environment::new();
        let p = env.fresh_placeholder(ScopeId::NATIVE);
        env.push();
        env.unify(&p, &t).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(env.resolve(&p), t);
        env.abort();
        prop_assert_eq!(env.resolve(&p), p);
    }

    #[test]
    fn different_lengths_never_unify(
        c in arb_primitive(),
        n in 1u32..8,
        m in 1u32..8,
    ) {
        prop_assume!(n != m);
        let mut env = Environment::new();
        let a = Type::array(c.clone(), Length::Known(n));
        let b = Type::array(c, Length::Known(m));
        prop_assert_ne!(&a, &b);
        let mismatched = matches!(env.unify(&a, &b), Err(UnifyError::LengthMismatch { .. }));
        prop_assert!(mismatched);
    }
}
