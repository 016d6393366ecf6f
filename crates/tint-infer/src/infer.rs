//! Memoized, rule-per-kind type inference over expressions.
//!
//! Every call to [`Environment::infer`] runs inside its own transaction: the
//! rule's bindings and the cached result are committed together, or the
//! whole attempt is discarded and the error names the innermost expression
//! that failed.

use std::collections::BTreeSet;
use std::rc::Rc;

use tint_ast::{Expr, ExprId, ExprKind, Lit, Param, Span};
use tint_diag::{Category, Diagnostic, SourceLocation, Subject};
use tint_types::{Label, Length, ScopeId, Type, UnionType};

use crate::env::Environment;
use crate::trace::InferRule;
use crate::unify::UnifyError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An inference failure tied to the expression it happened at.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct InferError {
    pub expr: ExprId,
    pub span: Span,
    pub kind: InferErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferErrorKind {
    #[error(transparent)]
    Unify(#[from] UnifyError),

    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),

    #[error("cannot infer the type of an empty array")]
    EmptyArray,

    #[error("struct literal has no fields")]
    EmptyStruct,

    #[error("field `{0}` is given more than once")]
    DuplicateField(Label),

    #[error("array length `{0}` is not positive")]
    NonPositiveLength(i64),

    #[error("union has no options")]
    EmptyUnion,

    #[error("parameter {index} does not belong to a known function")]
    DetachedParameter { index: usize },

    #[error("expression nesting exceeds the inference depth limit of {0}")]
    DepthLimit(usize),
}

impl InferError {
    pub fn new(expr: &Expr, kind: impl Into<InferErrorKind>) -> Self {
        Self {
            expr: expr.id,
            span: expr.span,
            kind: kind.into(),
        }
    }

    pub fn category(&self) -> Category {
        match &self.kind {
            InferErrorKind::Unify(err) => match err {
                UnifyError::Mismatch { .. } | UnifyError::LengthMismatch { .. } => {
                    Category::TypeMismatch
                }
                UnifyError::Occurs { .. } => Category::InfiniteType,
                UnifyError::UndeclaredAlias { .. } => Category::UndeclaredType,
                UnifyError::NoSharedFields { .. } => Category::MissingField,
                UnifyError::NotAFunction { .. } => Category::NotAFunction,
                UnifyError::NoMatchingOverload { .. } => Category::NoMatchingOverload,
            },
            InferErrorKind::UndefinedVariable(_) => Category::UndefinedName,
            InferErrorKind::NonPositiveLength(_) => Category::TypeMismatch,
            InferErrorKind::DuplicateField(_) => Category::DuplicateDeclaration,
            InferErrorKind::EmptyArray
            | InferErrorKind::EmptyStruct
            | InferErrorKind::EmptyUnion
            | InferErrorKind::DetachedParameter { .. }
            | InferErrorKind::DepthLimit(_) => Category::InferenceIncomplete,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.category(), self.kind.to_string())
            .about(Subject::Expression(self.expr.0));
        if !self.span.is_synthetic() {
            diag = diag.at(span_to_location(self.span));
        }
        match &self.kind {
            InferErrorKind::EmptyArray => {
                diag.with_help("give the array at least one element, or build it with an iteration constructor")
            }
            InferErrorKind::NonPositiveLength(_) => {
                diag.with_help("an iteration constructor needs at least one element")
            }
            InferErrorKind::DepthLimit(_) => {
                diag.with_help("raise `InferOptions::max_depth` or split the expression")
            }
            _ => diag,
        }
    }
}

pub(crate) fn span_to_location(span: Span) -> SourceLocation {
    SourceLocation {
        file_id: span.file.0,
        start: span.start,
        end: span.end,
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

impl Environment {
    /// Infer the type of `expr`, memoized per expression id.
    pub fn infer(&mut self, expr: &Expr) -> Result<Type, InferError> {
        let cached = self.cached_type(expr.id).cloned();
        if let Some(ty) = &cached
            && !self.is_unbound(ty)
        {
            return Ok(ty.clone());
        }
        if self.depth >= self.options.max_depth {
            return Err(InferError::new(
                expr,
                InferErrorKind::DepthLimit(self.options.max_depth),
            ));
        }

        self.depth += 1;
        self.push();
        let result = self.infer_uncached(expr, cached);
        self.depth -= 1;

        match result {
            Ok((rule, ty)) => {
                self.cache_type(expr.id, ty.clone());
                self.commit();
                self.push_infer_step(expr, rule, &ty);
                Ok(ty)
            }
            Err(err) => {
                self.abort();
                Err(err)
            }
        }
    }

    fn infer_uncached(
        &mut self,
        expr: &Expr,
        cached: Option<Type>,
    ) -> Result<(InferRule, Type), InferError> {
        let (rule, ty) = self.infer_rule(expr)?;
        match cached {
            // A previous attempt left a placeholder; keep it linked.
            Some(previous) => {
                let ty = self.unify_at(expr, &previous, &ty)?;
                Ok((rule, ty))
            }
            None => Ok((rule, ty)),
        }
    }

    /// Infer a sub-expression and instantiate its generalized type for use.
    fn infer_instance(&mut self, expr: &Expr) -> Result<Type, InferError> {
        let ty = self.infer(expr)?;
        Ok(self.instantiate(&ty))
    }

    fn unify_at(&mut self, expr: &Expr, left: &Type, right: &Type) -> Result<Type, InferError> {
        self.unify(left, right).map_err(|err| InferError::new(expr, err))
    }

    fn infer_rule(&mut self, expr: &Expr) -> Result<(InferRule, Type), InferError> {
        match &expr.kind {
            ExprKind::Lit(lit) => {
                let ty = match lit {
                    Lit::Int(_) => Type::int(),
                    Lit::Uint(_) => Type::uint(),
                    Lit::Float(_) => Type::float(),
                    Lit::Bool(_) => Type::bool(),
                };
                Ok((InferRule::Literal, ty))
            }
            ExprKind::Array(elems) => self.infer_array(expr, elems),
            ExprKind::Index { base, index } => self.infer_index(expr, base, index),
            ExprKind::Struct(fields) => self.infer_struct(expr, fields),
            ExprKind::Field { base, field } => {
                let base_ty = self.infer_instance(base)?;
                let slot = self.fresh_placeholder(expr.scope);
                let shape = Type::structure([(field.clone(), slot.clone())]);
                self.unify_at(expr, &base_ty, &shape)?;
                Ok((InferRule::FieldAccess, self.generalize(&slot)))
            }
            ExprKind::Function { params, body } => self.infer_function(expr, params, body),
            ExprKind::Call { func, args } => {
                let callee = self.infer_instance(func)?;
                let mut arg_tys = Vec::with_capacity(args.len());
                for arg in args {
                    arg_tys.push(self.infer_instance(arg)?);
                }
                let ty = self
                    .apply_call(&callee, &arg_tys)
                    .map_err(|err| InferError::new(expr, err))?;
                Ok((InferRule::Call, ty))
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond_ty = self.infer_instance(condition)?;
                self.unify_at(condition, &Type::bool(), &cond_ty)?;
                let then_ty = self.infer_instance(then_branch)?;
                let else_ty = self.infer_instance(else_branch)?;
                let ty = self.unify_at(else_branch, &then_ty, &else_ty)?;
                Ok((InferRule::If, self.generalize(&ty)))
            }
            ExprKind::Var(name) => {
                let ty = self.variable_type(expr, name)?;
                Ok((InferRule::VarLookup, self.instantiate(&ty)))
            }
            ExprKind::Attribute { annotation, .. } | ExprKind::Uniform { annotation, .. } => {
                let ty = match annotation {
                    Some(annotation) => self.generalize(annotation),
                    None => {
                        let ty = self.fresh_placeholder(expr.scope);
                        self.externals.push(ty.clone());
                        ty
                    }
                };
                Ok((InferRule::External, ty))
            }
            ExprKind::Parameter { function, index } => {
                let ty = self.infer_parameter(expr, *function, *index)?;
                Ok((InferRule::Parameter, ty))
            }
            ExprKind::DynamicArray { length, generator } => {
                self.infer_dynamic_array(expr, length, generator)
            }
            ExprKind::Union(options) => {
                let mut members = Vec::with_capacity(options.len());
                for option in options {
                    members.push(self.infer_instance(option)?);
                }
                let ty = UnionType::from_members(members)
                    .ok_or_else(|| InferError::new(expr, InferErrorKind::EmptyUnion))?;
                Ok((InferRule::Union, ty))
            }
            ExprKind::Native(ty) => Ok((InferRule::Native, ty.clone())),
        }
    }

    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    fn infer_array(&mut self, expr: &Expr, elems: &[Expr]) -> Result<(InferRule, Type), InferError> {
        let Some((first, rest)) = elems.split_first() else {
            return Err(InferError::new(expr, InferErrorKind::EmptyArray));
        };
        let mut component = self.infer_instance(first)?;
        for elem in rest {
            let ty = self.infer_instance(elem)?;
            component = self.unify_at(elem, &component, &ty)?;
        }
        let component = self.generalize(&component);
        let length = Length::Known(elems.len() as u32);
        Ok((InferRule::Array, Type::array(component, length)))
    }

    fn infer_index(
        &mut self,
        expr: &Expr,
        base: &Expr,
        index: &Expr,
    ) -> Result<(InferRule, Type), InferError> {
        let index_ty = self.infer_instance(index)?;
        self.unify_at(index, &Type::int(), &index_ty)?;
        let base_ty = self.infer_instance(base)?;
        let component = self.fresh_placeholder(expr.scope);
        let length = self.fresh_length();
        self.unify_at(base, &base_ty, &Type::array(component.clone(), length))?;
        Ok((InferRule::Index, self.generalize(&component)))
    }

    fn infer_struct(
        &mut self,
        expr: &Expr,
        fields: &[(Label, Expr)],
    ) -> Result<(InferRule, Type), InferError> {
        if fields.is_empty() {
            return Err(InferError::new(expr, InferErrorKind::EmptyStruct));
        }
        let mut seen = BTreeSet::new();
        for (label, _) in fields {
            if !seen.insert(label) {
                return Err(InferError::new(
                    expr,
                    InferErrorKind::DuplicateField(label.clone()),
                ));
            }
        }
        let mut typed = Vec::with_capacity(fields.len());
        for (label, value) in fields {
            let ty = self.infer_instance(value)?;
            typed.push((label.clone(), self.generalize(&ty)));
        }
        Ok((InferRule::Struct, Type::structure(typed)))
    }

    fn infer_function(
        &mut self,
        expr: &Expr,
        params: &[Param],
        body: &Expr,
    ) -> Result<(InferRule, Type), InferError> {
        let mut param_tys = Vec::with_capacity(params.len());
        for (index, param) in params.iter().enumerate() {
            let ty = match &param.annotation {
                Some(annotation) => annotation.clone(),
                None => self.fresh_placeholder(body.scope),
            };
            self.record_parameter(expr.id, index, ty.clone());
            param_tys.push(ty);
        }

        self.active_params.push(param_tys.clone());
        let body_ty = self.infer_instance(body);
        self.active_params.pop();
        let body_ty = body_ty?;

        let resolved = param_tys.iter().map(|ty| self.resolve(ty)).collect();
        Ok((InferRule::Lambda, Type::curried(resolved, body_ty)))
    }

    fn infer_parameter(
        &mut self,
        expr: &Expr,
        function: ExprId,
        index: usize,
    ) -> Result<Type, InferError> {
        if let Some(ty) = self.parameter_type(function, index) {
            return Ok(ty.clone());
        }
        let detached = || InferError::new(expr, InferErrorKind::DetachedParameter { index });
        let Some(owner) = self.function_rc(function) else {
            return Err(detached());
        };
        let owner_ty = self.infer(&owner)?;
        if let Some(ty) = self.parameter_type(function, index) {
            return Ok(ty.clone());
        }

        // Project the position out of the curried chain.
        let mut current = self.head(&owner_ty);
        for _ in 0..index {
            current = match current {
                Type::Function(ft) => self.head(&ft.ret),
                _ => return Err(detached()),
            };
        }
        match current {
            Type::Function(ft) => Ok(*ft.param),
            _ => Err(detached()),
        }
    }

    fn infer_dynamic_array(
        &mut self,
        expr: &Expr,
        length: &Expr,
        generator: &Expr,
    ) -> Result<(InferRule, Type), InferError> {
        let length_ty = self.infer_instance(length)?;
        if let Err(int_err) = self.transaction(|env| env.unify(&Type::int(), &length_ty)) {
            self.transaction(|env| env.unify(&Type::uint(), &length_ty))
                .map_err(|_| InferError::new(length, int_err))?;
        }
        let count = match &length.kind {
            ExprKind::Lit(Lit::Int(n)) if *n <= 0 => {
                return Err(InferError::new(length, InferErrorKind::NonPositiveLength(*n)));
            }
            ExprKind::Lit(Lit::Uint(0)) => {
                return Err(InferError::new(length, InferErrorKind::NonPositiveLength(0)));
            }
            ExprKind::Lit(Lit::Int(n)) => u32::try_from(*n).ok(),
            ExprKind::Lit(Lit::Uint(n)) => u32::try_from(*n).ok(),
            _ => None,
        };

        let generator_ty = self.infer_instance(generator)?;
        let element = self.fresh_placeholder(expr.scope);
        let by_int = Type::function(Type::int(), element.clone());
        if let Err(int_err) = self.transaction(|env| env.unify(&by_int, &generator_ty)) {
            let by_uint = Type::function(Type::uint(), element.clone());
            self.transaction(|env| env.unify(&by_uint, &generator_ty))
                .map_err(|_| InferError::new(generator, int_err))?;
        }

        let length = match count {
            Some(n) => Length::Known(n),
            None => self.fresh_length(),
        };
        Ok((InferRule::DynamicArray, Type::array(element, length)))
    }

    // -----------------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------------

    /// Generalized type of the declaration `name` resolves to from `site`.
    fn variable_type(&mut self, site: &Expr, name: &str) -> Result<Type, InferError> {
        let Some((declared_in, decl)) = self.find_declared_variable(site.scope, name) else {
            return Err(InferError::new(
                site,
                InferErrorKind::UndefinedVariable(name.to_string()),
            ));
        };
        self.infer_declared(declared_in, name, &decl)
    }

    /// Infer a declaration and generalize it.
    ///
    /// While the declaration is being inferred its name maps to a
    /// provisional placeholder, so recursive references terminate.
    pub(crate) fn infer_declared(
        &mut self,
        declared_in: ScopeId,
        name: &str,
        decl: &Rc<Expr>,
    ) -> Result<Type, InferError> {
        let key = (declared_in, name.to_string());
        if let Some(provisional) = self.in_progress.get(&key) {
            return Ok(provisional.clone());
        }
        let provisional = self.fresh_placeholder(declared_in);
        self.in_progress.insert(key.clone(), provisional.clone());
        let result = match self.infer(decl) {
            Ok(ty) => self.unify_at(decl, &provisional, &ty),
            Err(err) => Err(err),
        };
        self.in_progress.remove(&key);
        let ty = result?;
        Ok(self.generalize(&ty))
    }

    /// Infer the declaration `name` made in exactly `scope`.
    pub fn infer_declaration(
        &mut self,
        scope: ScopeId,
        name: &str,
    ) -> Option<Result<Type, InferError>> {
        let (declared_in, decl) = self.find_declared_variable(scope, name)?;
        if declared_in != scope {
            return None;
        }
        Some(self.infer_declared(declared_in, name, &decl))
    }
}
