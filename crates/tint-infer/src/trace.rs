//! Tracing types for compiler observability.
//!
//! These capture step-by-step traces of unification and type inference so
//! tooling can show why a type came out the way it did. All tracing is
//! opt-in via `Environment::enable_tracing()` or `InferOptions::trace`, and
//! costs nothing when disabled. Types are rendered sanitized.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Unification trace
// ---------------------------------------------------------------------------

/// A single step in a unification trace.
#[derive(Debug, Clone, Serialize)]
pub struct UnifyStep {
    pub step: usize,
    pub action: UnifyAction,
    pub left: String,
    pub right: String,
    pub detail: String,
}

/// What action was taken during a unification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifyAction {
    /// Types are already identical.
    Identity,
    /// Structural recursion into arrays, structs or functions.
    Decompose,
    /// Placeholder bound to a type.
    Bind,
    /// Length variable bound to a length.
    BindLength,
    /// Alias replaced by its declaration.
    ExpandAlias,
    /// `int` met `float` and widened.
    Widen,
    /// Struct meet kept only the shared fields.
    Meet,
    /// Overload set member tried against call arguments.
    Overload,
    /// Occurs check fired.
    OccursCheck,
    /// Unification failed.
    Error,
}

// ---------------------------------------------------------------------------
// Inference trace
// ---------------------------------------------------------------------------

/// A single inference rule firing, recorded when the rule succeeds.
#[derive(Debug, Clone, Serialize)]
pub struct InferStep {
    pub expr: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub rule: InferRule,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<(u32, u32)>,
}

/// Which inference rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InferRule {
    Literal,
    Array,
    Index,
    Struct,
    FieldAccess,
    Lambda,
    Call,
    If,
    VarLookup,
    External,
    Parameter,
    DynamicArray,
    Union,
    Native,
}
