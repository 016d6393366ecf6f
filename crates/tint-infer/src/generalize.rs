//! Generalization, closing and instantiation.
//!
//! Generalizing a type quantifies every unbound placeholder that is not
//! free in the enclosing environment. The placeholder is bound to its new
//! `Parametric`, so the quantification is visible wherever the placeholder
//! was already used and repeated occurrences share one parameter.
//!
//! Unbound length variables that are not free in the environment are
//! quantified too. They stay `Length::Var` but are marked generic, and
//! every instantiation replaces them with fresh variables.

use std::collections::{BTreeMap, BTreeSet};

use tint_types::{
    FunctionType, Length, LengthVarId, ParamLabel, PlaceholderId, ScopeId, StructType, Type,
    UnionType, free_length_vars, free_placeholders, parametric_vars,
};

use crate::env::Environment;

/// Variables free in the enclosing environment, which generalization must
/// leave alone.
#[derive(Debug, Default)]
pub(crate) struct Monomorphic {
    pub(crate) placeholders: BTreeSet<PlaceholderId>,
    pub(crate) lengths: BTreeSet<LengthVarId>,
}

/// Fresh variables of one instantiation.
#[derive(Default)]
struct Instance {
    types: BTreeMap<(ScopeId, ParamLabel), Type>,
    lengths: BTreeMap<LengthVarId, Length>,
}

impl Environment {
    /// Quantify the placeholders and length variables of `ty` that are not
    /// monomorphic.
    ///
    /// Aliases are replaced by their definitions and bound length
    /// variables by their lengths.
    pub fn generalize(&mut self, ty: &Type) -> Type {
        let monomorphic = self.monomorphic_vars();
        self.quantify(ty, &monomorphic, &mut Vec::new())
    }

    /// Quantify every remaining placeholder in `ty`, monomorphic or not.
    /// Used once inference is over, so no placeholder survives.
    pub fn close(&mut self, ty: &Type) -> Type {
        self.quantify(ty, &Monomorphic::default(), &mut Vec::new())
    }

    /// Placeholders and length variables free in the enclosing environment:
    /// parameters of function values being inferred, provisional
    /// placeholders of declarations being inferred, unannotated externals,
    /// and everything reachable from those through bindings.
    pub(crate) fn monomorphic_vars(&self) -> Monomorphic {
        let mut pending: Vec<Type> = self
            .active_params
            .iter()
            .flatten()
            .chain(self.in_progress.values())
            .chain(self.externals.iter())
            .cloned()
            .collect();
        let mut seen = Monomorphic::default();
        while let Some(ty) = pending.pop() {
            for var in free_length_vars(&ty) {
                seen.lengths.insert(var);
                if let Length::Var(end) = self.resolve_length(&Length::Var(var)) {
                    seen.lengths.insert(end);
                }
            }
            for id in free_placeholders(&ty) {
                if seen.placeholders.insert(id)
                    && let Some(bound) = self.placeholder_binding(id)
                {
                    pending.push(bound.clone());
                }
            }
        }
        seen
    }

    fn quantify(
        &mut self,
        ty: &Type,
        monomorphic: &Monomorphic,
        expanding: &mut Vec<(ScopeId, String)>,
    ) -> Type {
        match ty {
            Type::Primitive(_) | Type::Parametric { .. } => ty.clone(),
            Type::Unresolved { scope, id } => {
                if let Some(bound) = self.placeholder_binding(*id).cloned() {
                    return self.quantify(&bound, monomorphic, expanding);
                }
                if monomorphic.placeholders.contains(id) {
                    return ty.clone();
                }
                let param = Type::Parametric {
                    scope: *scope,
                    label: self.fresh_label(),
                };
                self.bind_placeholder(*id, param.clone());
                param
            }
            Type::Alias { scope, name } => {
                let Some((declared_in, def)) = self.find_declared_type(*scope, name) else {
                    return ty.clone();
                };
                let key = (declared_in, name.clone());
                if expanding.contains(&key) {
                    return ty.clone();
                }
                let def = def.clone();
                expanding.push(key);
                let out = self.quantify(&def, monomorphic, expanding);
                expanding.pop();
                out
            }
            Type::Array { component, length } => {
                let component = self.quantify(component, monomorphic, expanding);
                let length = self.resolve_length(length);
                if let Length::Var(var) = length
                    && !monomorphic.lengths.contains(&var)
                {
                    self.mark_generic_length(var);
                }
                Type::array(component, length)
            }
            Type::Struct(st) => {
                let mut fields = Vec::with_capacity(st.len());
                for (label, field) in &st.fields {
                    fields.push((label.clone(), self.quantify(field, monomorphic, expanding)));
                }
                Type::Struct(StructType::new(fields))
            }
            Type::Function(ft) => {
                let param = self.quantify(&ft.param, monomorphic, expanding);
                let ret = self.quantify(&ft.ret, monomorphic, expanding);
                Type::Function(FunctionType::new(param, ret))
            }
            Type::Union(ut) => {
                let mut members = Vec::with_capacity(ut.members().len());
                for member in ut.members() {
                    members.push(self.quantify(member, monomorphic, expanding));
                }
                UnionType::from_members(members).unwrap_or_else(|| ty.clone())
            }
        }
    }

    /// Replace every `Parametric` in `ty` by a fresh placeholder, one per
    /// `(scope, label)`, and every generic length variable by a fresh one.
    pub fn instantiate(&mut self, ty: &Type) -> Type {
        let ty = self.resolve(ty);
        let has_generic_length = free_length_vars(&ty)
            .into_iter()
            .any(|var| self.is_generic_length(var));
        if parametric_vars(&ty).is_empty() && !has_generic_length {
            return ty;
        }
        self.instantiate_with(&ty, &mut Instance::default())
    }

    fn instantiate_with(&mut self, ty: &Type, fresh: &mut Instance) -> Type {
        match ty {
            Type::Parametric { scope, label } => fresh
                .types
                .entry((*scope, *label))
                .or_insert_with(|| self.fresh_placeholder(*scope))
                .clone(),
            Type::Primitive(_) | Type::Alias { .. } | Type::Unresolved { .. } => ty.clone(),
            Type::Array { component, length } => {
                let component = self.instantiate_with(component, fresh);
                let length = match *length {
                    Length::Var(var) if self.is_generic_length(var) => *fresh
                        .lengths
                        .entry(var)
                        .or_insert_with(|| self.fresh_length()),
                    other => other,
                };
                Type::array(component, length)
            }
            Type::Struct(st) => {
                let mut fields = Vec::with_capacity(st.len());
                for (label, field) in &st.fields {
                    fields.push((label.clone(), self.instantiate_with(field, fresh)));
                }
                Type::Struct(StructType::new(fields))
            }
            Type::Function(ft) => {
                let param = self.instantiate_with(&ft.param, fresh);
                let ret = self.instantiate_with(&ft.ret, fresh);
                Type::Function(FunctionType::new(param, ret))
            }
            Type::Union(ut) => {
                let mut members = Vec::with_capacity(ut.members().len());
                for member in ut.members() {
                    members.push(self.instantiate_with(member, fresh));
                }
                UnionType::from_members(members).unwrap_or_else(|| ty.clone())
            }
        }
    }
}
