//! Unification-based type inference and semantic checking for Tint.
//!
//! This crate implements:
//! - An environment of scoped declarations with layered binding frames and
//!   transactions (`push`/`commit`/`abort`)
//! - Unification with struct meet, `int`/`float` widening, array length
//!   variables and union overload resolution
//! - Hindley-Milner generalization and instantiation, with memoized
//!   per-expression inference
//! - A pipeline of semantic checkers that runs before inference
//!
//! The usual entry point is [`check_program`]: checkers, then inference of
//! every declared variable, then closing the resulting types.

pub mod checks;
pub mod env;
mod generalize;
pub mod infer;
pub mod natives;
pub mod trace;
pub mod unify;

use tint_ast::{Expr, ExprId};
use tint_types::{DeclarationError, ScopeId, Type};

pub use checks::{
    CheckerPipeline, CyclicAliasChecker, ExternalBindingChecker, SemanticChecker,
    UnresolvedVariableChecker,
};
pub use env::{Environment, InferOptions};
pub use infer::{InferError, InferErrorKind};
pub use trace::{InferRule, InferStep, UnifyAction, UnifyStep};
pub use unify::UnifyError;

// Re-export for convenience.
pub use tint_diag::{Category, Diagnostic, DiagnosticError, SourceLocation, Subject};

// ---------------------------------------------------------------------------
// Typed program
// ---------------------------------------------------------------------------

/// A declared variable with its inferred type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedDeclaration {
    pub scope: ScopeId,
    pub name: String,
    /// Id of the declared expression; `Environment::type_of` works on it and
    /// on every sub-expression.
    pub expr: ExprId,
    pub ty: Type,
}

/// Every non-native declared variable, ordered by scope then name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedProgram {
    pub declarations: Vec<TypedDeclaration>,
}

impl TypedProgram {
    /// The declaration of `name` made in exactly `scope`.
    pub fn get(&self, scope: ScopeId, name: &str) -> Option<&TypedDeclaration> {
        self.declarations
            .iter()
            .find(|decl| decl.scope == scope && decl.name == name)
    }

    pub fn type_of(&self, scope: ScopeId, name: &str) -> Option<&Type> {
        self.get(scope, name).map(|decl| &decl.ty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypedDeclaration> {
        self.declarations.iter()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run the standard checker pipeline.
pub fn run_semantic_checkers(env: &mut Environment) -> Result<(), DiagnosticError> {
    CheckerPipeline::standard().run(env)
}

/// Infer a single expression.
pub fn infer(expr: &Expr, env: &mut Environment) -> Result<Type, InferError> {
    env.infer(expr)
}

/// Infer every declared variable outside the native scope.
///
/// Failures do not stop the pass: every failing declaration is reported,
/// each distinct error once, in declaration order.
pub fn infer_program(env: &mut Environment) -> Result<TypedProgram, DiagnosticError> {
    let declared: Vec<(ScopeId, String, ExprId)> = env
        .declared_variables()
        .filter(|decl| !decl.scope.is_native())
        .map(|decl| (decl.scope, decl.name, decl.value.id))
        .collect();

    let mut declarations = Vec::with_capacity(declared.len());
    let mut errors: Vec<InferError> = Vec::new();
    for (scope, name, expr) in declared {
        match env.infer_declaration(scope, &name) {
            Some(Ok(ty)) => declarations.push(TypedDeclaration {
                scope,
                name,
                expr,
                ty,
            }),
            Some(Err(err)) => {
                if !errors.contains(&err) {
                    errors.push(err);
                }
            }
            None => {}
        }
    }
    if !errors.is_empty() {
        return Err(DiagnosticError::multiple(
            errors.iter().map(InferError::to_diagnostic).collect(),
        ));
    }

    for decl in &mut declarations {
        decl.ty = env.resolve(&decl.ty);
    }
    Ok(TypedProgram { declarations })
}

/// Checkers, then inference, then closing every declaration type so no
/// placeholder survives.
pub fn check_program(env: &mut Environment) -> Result<TypedProgram, DiagnosticError> {
    run_semantic_checkers(env)?;
    let mut program = infer_program(env)?;
    for decl in &mut program.declarations {
        decl.ty = env.close(&decl.ty);
    }
    Ok(program)
}

/// Report a declaration-table error from the parse stage.
pub fn declaration_diagnostic(err: &DeclarationError) -> Diagnostic {
    match err {
        DeclarationError::Duplicate { name, .. } => {
            Diagnostic::error(Category::DuplicateDeclaration, err.to_string())
                .with_help(format!("rename one of the `{name}` declarations"))
        }
        DeclarationError::UnknownScope(_) => {
            Diagnostic::error(Category::InferenceIncomplete, err.to_string())
        }
    }
}


#[cfg(test)]
mod prop_tests;
