//! The per-compilation environment.
//!
//! Holds the scope tree, the declared-type and declared-variable tables, and
//! a stack of binding frames. Frame 0 is the committed state; every
//! `push()` layers a child frame over it. Reads walk the stack from the top,
//! writes only touch the top frame, so aborting a transaction forgets
//! exactly what it wrote. Fresh-id counters live outside the frames and are
//! never rolled back.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tint_ast::{AstBuilder, Expr, ExprId, ExprKind, Param, Span};
use tint_types::{
    Declaration, DeclarationError, DeclarationTable, FunctionType, Length, LengthVarId,
    ParamLabel, PlaceholderId, ScopeId, ScopeTree, StructType, Type, UnionType,
    sanitize_type_display,
};

use crate::trace::{InferRule, InferStep, UnifyAction, UnifyStep};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Knobs for one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferOptions {
    /// Deepest expression nesting inference will follow before giving up
    /// with `InferErrorKind::DepthLimit`.
    pub max_depth: usize,
    /// Record unification and inference steps from the start.
    pub trace: bool,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            max_depth: 512,
            trace: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Frame {
    placeholders: BTreeMap<PlaceholderId, Type>,
    lengths: BTreeMap<LengthVarId, Length>,
    /// Length variables quantified by generalization.
    generic_lengths: BTreeSet<LengthVarId>,
    inferred: BTreeMap<ExprId, Type>,
    parameters: BTreeMap<(ExprId, usize), Type>,
}

impl Frame {
    fn absorb(&mut self, child: Frame) {
        self.placeholders.extend(child.placeholders);
        self.lengths.extend(child.lengths);
        self.generic_lengths.extend(child.generic_lengths);
        self.inferred.extend(child.inferred);
        self.parameters.extend(child.parameters);
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Environment {
    scopes: ScopeTree,
    types: DeclarationTable<Type>,
    variables: DeclarationTable<Rc<Expr>>,
    /// Every function value inside a declared variable, by id, so a
    /// parameter node can reach its owner.
    functions: BTreeMap<ExprId, Rc<Expr>>,
    frames: Vec<Frame>,
    next_placeholder: u32,
    next_length: u32,
    next_label: u32,
    /// Parameter types of the function values whose bodies are being
    /// inferred, innermost last.
    pub(crate) active_params: Vec<Vec<Type>>,
    /// Provisional placeholders of declarations being inferred.
    pub(crate) in_progress: BTreeMap<(ScopeId, String), Type>,
    /// Placeholders minted for unannotated attributes and uniforms.
    pub(crate) externals: Vec<Type>,
    pub(crate) depth: usize,
    pub(crate) options: InferOptions,
    unify_trace: Vec<UnifyStep>,
    infer_trace: Vec<InferStep>,
}

impl Environment {
    pub fn new() -> Self {
        Self::with_options(InferOptions::default())
    }

    pub fn with_options(options: InferOptions) -> Self {
        Self {
            scopes: ScopeTree::new(),
            types: DeclarationTable::new(),
            variables: DeclarationTable::new(),
            functions: BTreeMap::new(),
            frames: vec![Frame::default()],
            next_placeholder: 0,
            next_length: 0,
            next_label: 0,
            active_params: Vec::new(),
            in_progress: BTreeMap::new(),
            externals: Vec::new(),
            depth: 0,
            options,
            unify_trace: Vec::new(),
            infer_trace: Vec::new(),
        }
    }

    /// A fresh environment with primitive type names and native operators
    /// installed in the root scope.
    pub fn with_natives(builder: &mut AstBuilder) -> Result<Self, DeclarationError> {
        let mut env = Self::new();
        crate::natives::install(&mut env, builder)?;
        Ok(env)
    }

    pub fn options(&self) -> &InferOptions {
        &self.options
    }

    // -----------------------------------------------------------------------
    // Scopes and declarations
    // -----------------------------------------------------------------------

    pub fn scopes(&self) -> &ScopeTree {
        &self.scopes
    }

    /// Allocate a scope nested in `parent`.
    pub fn new_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.child(parent)
    }

    pub fn add_declared_type(
        &mut self,
        scope: ScopeId,
        name: impl Into<String>,
        ty: Type,
    ) -> Result<(), DeclarationError> {
        if !self.scopes.contains(scope) {
            return Err(DeclarationError::UnknownScope(scope));
        }
        self.types.insert(scope, name, ty)
    }

    pub fn add_variable(
        &mut self,
        scope: ScopeId,
        name: impl Into<String>,
        expr: Expr,
    ) -> Result<(), DeclarationError> {
        if !self.scopes.contains(scope) {
            return Err(DeclarationError::UnknownScope(scope));
        }
        let expr = Rc::new(expr);
        self.variables.insert(scope, name, Rc::clone(&expr))?;
        let mut found = Vec::new();
        expr.walk(&mut |node| {
            if matches!(node.kind, ExprKind::Function { .. }) {
                found.push(node);
            }
        });
        for node in found {
            let shared = if node.id == expr.id {
                Rc::clone(&expr)
            } else {
                Rc::new(node.clone())
            };
            self.functions.insert(node.id, shared);
        }
        Ok(())
    }

    pub fn get_declared_type(&self, scope: ScopeId, name: &str) -> Option<&Type> {
        self.find_declared_type(scope, name).map(|(_, ty)| ty)
    }

    /// Like `get_declared_type`, also returning the declaring scope.
    pub fn find_declared_type(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, &Type)> {
        self.types.lookup(&self.scopes, scope, name)
    }

    pub fn get_declared_variable(&self, scope: ScopeId, name: &str) -> Option<&Expr> {
        self.variables
            .lookup(&self.scopes, scope, name)
            .map(|(_, expr)| Rc::as_ref(expr))
    }

    pub(crate) fn find_declared_variable(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Option<(ScopeId, Rc<Expr>)> {
        self.variables
            .lookup(&self.scopes, scope, name)
            .map(|(declared_in, expr)| (declared_in, Rc::clone(expr)))
    }

    pub fn declared_types(&self) -> impl Iterator<Item = Declaration<&Type>> + '_ {
        self.types.iter()
    }

    pub fn declared_variables(&self) -> impl Iterator<Item = Declaration<&Expr>> + '_ {
        self.variables.iter().map(|decl| Declaration {
            scope: decl.scope,
            name: decl.name,
            value: Rc::as_ref(decl.value),
        })
    }

    /// The function value with this id, if it sits inside a declared
    /// variable.
    pub fn function(&self, id: ExprId) -> Option<&Expr> {
        self.functions.get(&id).map(Rc::as_ref)
    }

    pub(crate) fn function_rc(&self, id: ExprId) -> Option<Rc<Expr>> {
        self.functions.get(&id).cloned()
    }

    /// Build a function value the way the parse stage does: allocate the
    /// body scope, declare one parameter node per parameter in it, then
    /// build the body there.
    pub fn build_function(
        &mut self,
        builder: &mut AstBuilder,
        scope: ScopeId,
        params: Vec<Param>,
        body: impl FnOnce(&mut AstBuilder, ScopeId) -> Expr,
    ) -> Result<Expr, DeclarationError> {
        let body_scope = self.new_scope(scope);
        let id = builder.reserve_id();
        for (index, param) in params.iter().enumerate() {
            let node = builder.parameter(body_scope, id, index);
            self.add_variable(body_scope, param.name.clone(), node)?;
        }
        let body = body(builder, body_scope);
        Ok(AstBuilder::build_with_id(
            id,
            scope,
            Span::synthetic(),
            ExprKind::Function {
                params,
                body: Box::new(body),
            },
        ))
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Open a child frame.
    pub fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Merge the top frame into its parent. `false` if none is open.
    pub fn commit(&mut self) -> bool {
        if self.frames.len() <= 1 {
            return false;
        }
        let Some(child) = self.frames.pop() else {
            return false;
        };
        if let Some(parent) = self.frames.last_mut() {
            parent.absorb(child);
        }
        true
    }

    /// Discard the top frame. `false` if none is open.
    pub fn abort(&mut self) -> bool {
        if self.frames.len() <= 1 {
            return false;
        }
        self.frames.pop().is_some()
    }

    /// Run `f` in a transaction: committed on `Ok`, aborted on `Err`.
    pub fn transaction<T, E>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        self.push();
        let result = f(self);
        if result.is_ok() {
            self.commit();
        } else {
            self.abort();
        }
        result
    }

    /// Number of open transactions.
    pub fn transaction_depth(&self) -> usize {
        self.frames.len() - 1
    }

    fn top(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    // -----------------------------------------------------------------------
    // Binding tables
    // -----------------------------------------------------------------------

    pub(crate) fn placeholder_binding(&self, id: PlaceholderId) -> Option<&Type> {
        self.frames.iter().rev().find_map(|f| f.placeholders.get(&id))
    }

    pub(crate) fn bind_placeholder(&mut self, id: PlaceholderId, ty: Type) {
        self.top().placeholders.insert(id, ty);
    }

    pub(crate) fn length_binding(&self, var: LengthVarId) -> Option<&Length> {
        self.frames.iter().rev().find_map(|f| f.lengths.get(&var))
    }

    pub(crate) fn bind_length(&mut self, var: LengthVarId, length: Length) {
        self.top().lengths.insert(var, length);
    }

    pub(crate) fn is_generic_length(&self, var: LengthVarId) -> bool {
        self.frames.iter().any(|f| f.generic_lengths.contains(&var))
    }

    pub(crate) fn mark_generic_length(&mut self, var: LengthVarId) {
        self.top().generic_lengths.insert(var);
    }

    pub(crate) fn cached_type(&self, id: ExprId) -> Option<&Type> {
        self.frames.iter().rev().find_map(|f| f.inferred.get(&id))
    }

    pub(crate) fn cache_type(&mut self, id: ExprId, ty: Type) {
        self.top().inferred.insert(id, ty);
    }

    pub(crate) fn parameter_type(&self, function: ExprId, index: usize) -> Option<&Type> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.parameters.get(&(function, index)))
    }

    pub(crate) fn record_parameter(&mut self, function: ExprId, index: usize, ty: Type) {
        self.top().parameters.insert((function, index), ty);
    }

    // -----------------------------------------------------------------------
    // Fresh variables
    // -----------------------------------------------------------------------

    pub fn fresh_placeholder(&mut self, scope: ScopeId) -> Type {
        let id = PlaceholderId(self.next_placeholder);
        self.next_placeholder += 1;
        Type::Unresolved { scope, id }
    }

    pub fn fresh_length(&mut self) -> Length {
        let var = LengthVarId(self.next_length);
        self.next_length += 1;
        Length::Var(var)
    }

    pub(crate) fn fresh_label(&mut self) -> ParamLabel {
        let label = ParamLabel(self.next_label);
        self.next_label += 1;
        label
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Follow placeholder bindings at the head of `ty` only.
    pub(crate) fn shallow_resolve(&self, ty: &Type) -> Type {
        let mut current = ty;
        while let Type::Unresolved { id, .. } = current {
            match self.placeholder_binding(*id) {
                Some(bound) => current = bound,
                None => break,
            }
        }
        current.clone()
    }

    /// Follow placeholder bindings and aliases at the head of `ty`.
    /// A cyclic alias chain is returned unexpanded.
    pub(crate) fn head(&self, ty: &Type) -> Type {
        let mut seen = BTreeSet::new();
        let mut current = self.shallow_resolve(ty);
        while let Type::Alias { scope, name } = &current {
            let Some((declared_in, def)) = self.find_declared_type(*scope, name) else {
                break;
            };
            if !seen.insert((declared_in, name.clone())) {
                break;
            }
            current = self.shallow_resolve(def);
        }
        current
    }

    pub(crate) fn is_unbound(&self, ty: &Type) -> bool {
        self.shallow_resolve(ty).is_unresolved()
    }

    pub fn resolve_length(&self, length: &Length) -> Length {
        let mut current = *length;
        while let Length::Var(var) = current {
            match self.length_binding(var) {
                Some(bound) => current = *bound,
                None => break,
            }
        }
        current
    }

    /// Apply every placeholder and length binding inside `ty`.
    pub fn resolve(&self, ty: &Type) -> Type {
        self.rewrite(ty, false, &mut Vec::new())
    }

    /// `resolve`, also replacing aliases by their definitions.
    pub fn expand(&self, ty: &Type) -> Type {
        self.rewrite(ty, true, &mut Vec::new())
    }

    fn rewrite(&self, ty: &Type, aliases: bool, expanding: &mut Vec<(ScopeId, String)>) -> Type {
        match ty {
            Type::Primitive(_) | Type::Parametric { .. } => ty.clone(),
            Type::Unresolved { id, .. } => match self.placeholder_binding(*id) {
                Some(bound) => self.rewrite(bound, aliases, expanding),
                None => ty.clone(),
            },
            Type::Alias { scope, name } if aliases => {
                let Some((declared_in, def)) = self.find_declared_type(*scope, name) else {
                    return ty.clone();
                };
                let key = (declared_in, name.clone());
                if expanding.contains(&key) {
                    return ty.clone();
                }
                expanding.push(key);
                let out = self.rewrite(def, aliases, expanding);
                expanding.pop();
                out
            }
            Type::Alias { .. } => ty.clone(),
            Type::Array { component, length } => Type::Array {
                component: Box::new(self.rewrite(component, aliases, expanding)),
                length: self.resolve_length(length),
            },
            Type::Struct(st) => Type::Struct(StructType::new(
                st.fields
                    .iter()
                    .map(|(label, field)| (label.clone(), self.rewrite(field, aliases, expanding))),
            )),
            Type::Function(ft) => Type::Function(FunctionType::new(
                self.rewrite(&ft.param, aliases, expanding),
                self.rewrite(&ft.ret, aliases, expanding),
            )),
            Type::Union(ut) => {
                let members: Vec<Type> = ut
                    .members()
                    .iter()
                    .map(|m| self.rewrite(m, aliases, expanding))
                    .collect();
                UnionType::from_members(members).unwrap_or_else(|| ty.clone())
            }
        }
    }

    /// The inferred type of an expression, fully resolved through bindings.
    pub fn type_of(&self, id: ExprId) -> Option<Type> {
        self.cached_type(id).map(|ty| self.resolve(ty))
    }

    // -----------------------------------------------------------------------
    // Tracing (zero overhead when disabled)
    // -----------------------------------------------------------------------

    pub fn enable_tracing(&mut self) {
        self.options.trace = true;
    }

    pub fn is_tracing(&self) -> bool {
        self.options.trace
    }

    /// Unification steps recorded so far. Aborted work stays in the trace.
    pub fn unify_trace(&self) -> &[UnifyStep] {
        &self.unify_trace
    }

    pub fn infer_trace(&self) -> &[InferStep] {
        &self.infer_trace
    }

    pub(crate) fn push_unify_step(
        &mut self,
        action: UnifyAction,
        left: &Type,
        right: &Type,
        detail: impl FnOnce() -> String,
    ) {
        if self.options.trace {
            let step = self.unify_trace.len() + 1;
            self.unify_trace.push(UnifyStep {
                step,
                action,
                left: sanitize_type_display(left),
                right: sanitize_type_display(right),
                detail: detail(),
            });
        }
    }

    pub(crate) fn push_length_step(
        &mut self,
        left: Length,
        right: Length,
        detail: impl FnOnce() -> String,
    ) {
        if self.options.trace {
            let step = self.unify_trace.len() + 1;
            self.unify_trace.push(UnifyStep {
                step,
                action: UnifyAction::BindLength,
                left: left.to_string(),
                right: right.to_string(),
                detail: detail(),
            });
        }
    }

    pub(crate) fn push_infer_step(&mut self, expr: &Expr, rule: InferRule, ty: &Type) {
        if self.options.trace {
            let span = (!expr.span.is_synthetic()).then_some((expr.span.start, expr.span.end));
            self.infer_trace.push(InferStep {
                expr: format!("#{} {}", expr.id.0, expr.describe()),
                ty: sanitize_type_display(&self.resolve(ty)),
                rule,
                detail: format!("scope {}", expr.scope),
                span,
            });
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tint_ast::Lit;

    fn placeholder_id(ty: &Type) -> PlaceholderId {
        match ty {
            Type::Unresolved { id, .. } => *id,
            other => panic!("expected placeholder, got {other}"),
        }
    }

    #[test]
    fn aborted_bindings_are_invisible() {
        let mut env = Environment::new();
        let p = env.fresh_placeholder(ScopeId::NATIVE);
        let id = placeholder_id(&p);

        env.push();
        env.bind_placeholder(id, Type::int());
        assert_eq!(env.resolve(&p), Type::int());
        assert!(env.abort());

        assert_eq!(env.resolve(&p), p);
        assert_eq!(env.transaction_depth(), 0);
    }

    #[test]
    fn committed_bindings_reach_the_parent() {
        let mut env = Environment::new();
        let p = env.fresh_placeholder(ScopeId::NATIVE);
        let id = placeholder_id(&p);

        env.push();
        env.push();
        env.bind_placeholder(id, Type::bool());
        assert!(env.commit());
        assert_eq!(env.transaction_depth(), 1);
        assert_eq!(env.resolve(&p), Type::bool());
        assert!(env.abort());
        assert_eq!(env.resolve(&p), p, "outer abort discards the inner commit");
    }

    #[test]
    fn base_frame_is_never_popped() {
        let mut env = Environment::new();
        assert!(!env.commit());
        assert!(!env.abort());
        assert_eq!(env.transaction_depth(), 0);
    }

    #[test]
    fn transaction_helper_commits_on_ok_and_aborts_on_err() {
        let mut env = Environment::new();
        let a = env.fresh_placeholder(ScopeId::NATIVE);
        let b = env.fresh_placeholder(ScopeId::NATIVE);
        let (ia, ib) = (placeholder_id(&a), placeholder_id(&b));

        let ok: Result<(), ()> = env.transaction(|env| {
            env.bind_placeholder(ia, Type::float());
            Ok(())
        });
        assert!(ok.is_ok());
        let err: Result<(), &str> = env.transaction(|env| {
            env.bind_placeholder(ib, Type::float());
            Err("nope")
        });
        assert!(err.is_err());

        assert_eq!(env.resolve(&a), Type::float());
        assert_eq!(env.resolve(&b), b);
    }

    #[test]
    fn fresh_ids_survive_aborts() {
        let mut env = Environment::new();
        env.push();
        let inner = env.fresh_placeholder(ScopeId::NATIVE);
        env.abort();
        let outer = env.fresh_placeholder(ScopeId::NATIVE);
        assert_ne!(inner, outer);
    }

    #[test]
    fn child_frame_overrides_cached_type() {
        let mut env = Environment::new();
        env.cache_type(ExprId(1), Type::int());
        env.push();
        env.cache_type(ExprId(1), Type::float());
        assert_eq!(env.type_of(ExprId(1)), Some(Type::float()));
        env.abort();
        assert_eq!(env.type_of(ExprId(1)), Some(Type::int()));
    }

    #[test]
    fn declared_names_resolve_through_parents() {
        let mut env = Environment::new();
        let mut b = AstBuilder::new();
        let outer = env.new_scope(ScopeId::NATIVE);
        let inner = env.new_scope(outer);
        env.add_declared_type(outer, "Color", Type::float()).unwrap();
        let one = b.int(outer, 1);
        env.add_variable(outer, "x", one).unwrap();

        assert_eq!(env.get_declared_type(inner, "Color"), Some(&Type::float()));
        assert_eq!(env.find_declared_type(inner, "Color").map(|(s, _)| s), Some(outer));
        assert!(env.get_declared_type(ScopeId::NATIVE, "Color").is_none());
        let x = env.get_declared_variable(inner, "x").unwrap();
        assert_eq!(x.kind, ExprKind::Lit(Lit::Int(1)));
        assert!(env.get_declared_variable(inner, "y").is_none());
    }

    #[test]
    fn duplicate_variable_is_rejected() {
        let mut env = Environment::new();
        let mut b = AstBuilder::new();
        let one = b.int(ScopeId::NATIVE, 1);
        let two = b.int(ScopeId::NATIVE, 2);
        env.add_variable(ScopeId::NATIVE, "x", one).unwrap();
        let err = env.add_variable(ScopeId::NATIVE, "x", two).unwrap_err();
        assert!(matches!(err, DeclarationError::Duplicate { .. }));
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let mut env = Environment::new();
        let err = env
            .add_declared_type(ScopeId(42), "T", Type::int())
            .unwrap_err();
        assert_eq!(err, DeclarationError::UnknownScope(ScopeId(42)));
    }

    #[test]
    fn build_function_declares_parameters_and_indexes_the_function() {
        let mut env = Environment::new();
        let mut b = AstBuilder::new();
        let scope = env.new_scope(ScopeId::NATIVE);
        let f = env
            .build_function(
                &mut b,
                scope,
                vec![Param::new("a"), Param::new("b")],
                |b, body| b.var(body, "b"),
            )
            .unwrap();
        let ExprKind::Function { body, .. } = &f.kind else {
            panic!("expected a function value");
        };
        let body_scope = body.scope;
        assert_eq!(env.scopes().parent(body_scope), Some(scope));

        let b_param = env.get_declared_variable(body_scope, "b").unwrap();
        assert_eq!(
            b_param.kind,
            ExprKind::Parameter {
                function: f.id,
                index: 1
            }
        );

        let id = f.id;
        assert!(env.function(id).is_none());
        env.add_variable(scope, "pick", f).unwrap();
        assert_eq!(env.function(id).map(|e| e.id), Some(id));
    }

    #[test]
    fn declarations_enumerate_in_scope_then_name_order() {
        let mut env = Environment::new();
        let s1 = env.new_scope(ScopeId::NATIVE);
        env.add_declared_type(s1, "B", Type::int()).unwrap();
        env.add_declared_type(s1, "A", Type::int()).unwrap();
        env.add_declared_type(ScopeId::NATIVE, "Z", Type::int()).unwrap();
        let names: Vec<_> = env.declared_types().map(|d| d.name).collect();
        assert_eq!(names, vec!["Z", "A", "B"]);
    }

    #[test]
    fn expand_stops_at_cyclic_aliases() {
        let mut env = Environment::new();
        let s = ScopeId::NATIVE;
        env.add_declared_type(s, "X", Type::alias(s, "Y")).unwrap();
        env.add_declared_type(s, "Y", Type::alias(s, "X")).unwrap();
        env.add_declared_type(s, "V", Type::array(Type::alias(s, "F"), Length::Known(3)))
            .unwrap();
        env.add_declared_type(s, "F", Type::float()).unwrap();

        assert_eq!(env.expand(&Type::alias(s, "V")), Type::array(Type::float(), Length::Known(3)));
        assert_eq!(env.expand(&Type::alias(s, "X")), Type::alias(s, "X"));
    }
}
