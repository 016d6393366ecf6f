//! AST node definitions and source spans for Tint.
//!
//! The parse stage builds these trees once; they are immutable afterwards.
//! Every node carries an [`ExprId`] (the key its inferred type is stored
//! under), the [`ScopeId`] it was written in, and a [`Span`].

use tint_types::{Label, ScopeId, Type};

/// Identifies a source file in the compilation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// A byte offset range within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Self { file, start, end }
    }

    /// Create a span that covers both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        debug_assert_eq!(
            self.file, other.file,
            "cannot merge spans from different files"
        );
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// A synthetic span for compiler-generated nodes.
    pub fn synthetic() -> Self {
        Self {
            file: FileId(u32::MAX),
            start: 0,
            end: 0,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.file == FileId(u32::MAX)
    }
}

/// Identity of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

// ---------------------------------------------------------------------------
// Literal values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Which kind of externally bound name an expression refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExternalKind {
    /// Per-vertex input supplied by the pipeline.
    Attribute,
    /// Per-draw constant supplied by the host.
    Uniform,
}

impl ExternalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExternalKind::Attribute => "attribute",
            ExternalKind::Uniform => "uniform",
        }
    }
}

/// A function parameter as written, with an optional type annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Type>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: None,
        }
    }

    pub fn annotated(name: impl Into<String>, annotation: Type) -> Self {
        Self {
            name: name.into(),
            annotation: Some(annotation),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: ExprId,
    pub scope: ScopeId,
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Literal value.
    Lit(Lit),

    /// Array construction: `[a, b, c]`.
    Array(Vec<Expr>),

    /// Array access: `base[index]`.
    Index { base: Box<Expr>, index: Box<Expr> },

    /// Struct construction: `{ a: x, b: y }`.
    Struct(Vec<(Label, Expr)>),

    /// Field access: `base.field`.
    Field { base: Box<Expr>, field: Label },

    /// Function value: `a, b -> body`. The body lives in its own scope,
    /// where each parameter is declared as a `Parameter` node.
    Function { params: Vec<Param>, body: Box<Expr> },

    /// Application: `func(args...)`, curried left to right.
    Call { func: Box<Expr>, args: Vec<Expr> },

    /// Conditional: `if condition then a else b`.
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },

    /// Variable reference, resolved through the scope chain.
    Var(String),

    /// External attribute reference.
    Attribute {
        name: String,
        annotation: Option<Type>,
    },

    /// External uniform reference.
    Uniform {
        name: String,
        annotation: Option<Type>,
    },

    /// The `index`-th parameter of the function value `function`.
    Parameter { function: ExprId, index: usize },

    /// Iteration constructor: an array of `length` elements produced by
    /// calling `generator` with each index.
    DynamicArray {
        length: Box<Expr>,
        generator: Box<Expr>,
    },

    /// Overload set value.
    Union(Vec<Expr>),

    /// Opaque built-in with a fixed type.
    Native(Type),
}

/// Borrowed view of an external attribute or uniform reference.
#[derive(Debug, Clone, Copy)]
pub struct External<'a> {
    pub kind: ExternalKind,
    pub name: &'a str,
    pub annotation: Option<&'a Type>,
}

impl Expr {
    /// Direct sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Array(elems) | ExprKind::Union(elems) => elems.iter().collect(),
            ExprKind::Index { base, index } => vec![base, index],
            ExprKind::Struct(fields) => fields.iter().map(|(_, e)| e).collect(),
            ExprKind::Field { base, .. } => vec![base],
            ExprKind::Function { body, .. } => vec![body],
            ExprKind::Call { func, args } => {
                let mut out = vec![func.as_ref()];
                out.extend(args);
                out
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => vec![condition, then_branch, else_branch],
            ExprKind::DynamicArray { length, generator } => vec![length, generator],
            ExprKind::Lit(_)
            | ExprKind::Var(_)
            | ExprKind::Attribute { .. }
            | ExprKind::Uniform { .. }
            | ExprKind::Parameter { .. }
            | ExprKind::Native(_) => Vec::new(),
        }
    }

    /// Visit this node and every descendant, parents before children.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    pub fn external(&self) -> Option<External<'_>> {
        match &self.kind {
            ExprKind::Attribute { name, annotation } => Some(External {
                kind: ExternalKind::Attribute,
                name,
                annotation: annotation.as_ref(),
            }),
            ExprKind::Uniform { name, annotation } => Some(External {
                kind: ExternalKind::Uniform,
                name,
                annotation: annotation.as_ref(),
            }),
            _ => None,
        }
    }

    /// Type annotations written on this node (not its children).
    pub fn annotations(&self) -> Vec<&Type> {
        match &self.kind {
            ExprKind::Function { params, .. } => {
                params.iter().filter_map(|p| p.annotation.as_ref()).collect()
            }
            ExprKind::Attribute { annotation, .. } | ExprKind::Uniform { annotation, .. } => {
                annotation.iter().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Short name of the node kind, for traces and messages.
    pub fn describe(&self) -> &'static str {
        match &self.kind {
            ExprKind::Lit(_) => "literal",
            ExprKind::Array(_) => "array",
            ExprKind::Index { .. } => "array access",
            ExprKind::Struct(_) => "struct",
            ExprKind::Field { .. } => "field access",
            ExprKind::Function { .. } => "function",
            ExprKind::Call { .. } => "call",
            ExprKind::If { .. } => "conditional",
            ExprKind::Var(_) => "variable",
            ExprKind::Attribute { .. } => "attribute",
            ExprKind::Uniform { .. } => "uniform",
            ExprKind::Parameter { .. } => "parameter",
            ExprKind::DynamicArray { .. } => "dynamic array",
            ExprKind::Union(_) => "union",
            ExprKind::Native(_) => "native",
        }
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Allocates expression ids and builds nodes.
///
/// Used by the parse stage and by tests that construct trees by hand. Ids
/// are unique per builder; one builder should serve a whole compilation.
#[derive(Debug, Clone, Default)]
pub struct AstBuilder {
    next_id: u32,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id ahead of building its node (function values need
    /// their id before their parameters are built).
    pub fn reserve_id(&mut self) -> ExprId {
        let id = ExprId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn build(&mut self, scope: ScopeId, kind: ExprKind) -> Expr {
        self.build_at(scope, Span::synthetic(), kind)
    }

    pub fn build_at(&mut self, scope: ScopeId, span: Span, kind: ExprKind) -> Expr {
        let id = self.reserve_id();
        Self::build_with_id(id, scope, span, kind)
    }

    pub fn build_with_id(id: ExprId, scope: ScopeId, span: Span, kind: ExprKind) -> Expr {
        Expr {
            id,
            scope,
            span,
            kind,
        }
    }

    pub fn int(&mut self, scope: ScopeId, value: i64) -> Expr {
        self.build(scope, ExprKind::Lit(Lit::Int(value)))
    }

    pub fn uint(&mut self, scope: ScopeId, value: u64) -> Expr {
        self.build(scope, ExprKind::Lit(Lit::Uint(value)))
    }

    pub fn float(&mut self, scope: ScopeId, value: f64) -> Expr {
        self.build(scope, ExprKind::Lit(Lit::Float(value)))
    }

    pub fn boolean(&mut self, scope: ScopeId, value: bool) -> Expr {
        self.build(scope, ExprKind::Lit(Lit::Bool(value)))
    }

    pub fn var(&mut self, scope: ScopeId, name: &str) -> Expr {
        self.build(scope, ExprKind::Var(name.to_string()))
    }

    pub fn array(&mut self, scope: ScopeId, elems: Vec<Expr>) -> Expr {
        self.build(scope, ExprKind::Array(elems))
    }

    pub fn index(&mut self, scope: ScopeId, base: Expr, index: Expr) -> Expr {
        self.build(
            scope,
            ExprKind::Index {
                base: Box::new(base),
                index: Box::new(index),
            },
        )
    }

    pub fn structure(&mut self, scope: ScopeId, fields: Vec<(&str, Expr)>) -> Expr {
        let fields = fields
            .into_iter()
            .map(|(label, value)| (Label::new(label), value))
            .collect();
        self.build(scope, ExprKind::Struct(fields))
    }

    pub fn field(&mut self, scope: ScopeId, base: Expr, field: &str) -> Expr {
        self.build(
            scope,
            ExprKind::Field {
                base: Box::new(base),
                field: Label::new(field),
            },
        )
    }

    pub fn call(&mut self, scope: ScopeId, func: Expr, args: Vec<Expr>) -> Expr {
        self.build(
            scope,
            ExprKind::Call {
                func: Box::new(func),
                args,
            },
        )
    }

    /// Call a named function or operator: `name(args...)`.
    pub fn apply(&mut self, scope: ScopeId, name: &str, args: Vec<Expr>) -> Expr {
        let func = self.var(scope, name);
        self.call(scope, func, args)
    }

    pub fn conditional(
        &mut self,
        scope: ScopeId,
        condition: Expr,
        then_branch: Expr,
        else_branch: Expr,
    ) -> Expr {
        self.build(
            scope,
            ExprKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
        )
    }

    pub fn attribute(&mut self, scope: ScopeId, name: &str, annotation: Option<Type>) -> Expr {
        self.build(
            scope,
            ExprKind::Attribute {
                name: name.to_string(),
                annotation,
            },
        )
    }

    pub fn uniform(&mut self, scope: ScopeId, name: &str, annotation: Option<Type>) -> Expr {
        self.build(
            scope,
            ExprKind::Uniform {
                name: name.to_string(),
                annotation,
            },
        )
    }

    pub fn parameter(&mut self, scope: ScopeId, function: ExprId, index: usize) -> Expr {
        self.build(scope, ExprKind::Parameter { function, index })
    }

    pub fn dynamic_array(&mut self, scope: ScopeId, length: Expr, generator: Expr) -> Expr {
        self.build(
            scope,
            ExprKind::DynamicArray {
                length: Box::new(length),
                generator: Box::new(generator),
            },
        )
    }

    pub fn union(&mut self, scope: ScopeId, options: Vec<Expr>) -> Expr {
        self.build(scope, ExprKind::Union(options))
    }

    pub fn native(&mut self, scope: ScopeId, ty: Type) -> Expr {
        self.build(scope, ExprKind::Native(ty))
    }
}
