//! Error reporting and diagnostics for Tint.
//!
//! Diagnostics are produced by `tint-infer` (inference failures and the
//! semantic checker pipeline) and consumed by whatever surface drives the
//! compilation. A diagnostic is tied either to an offending expression or to
//! an offending type, and never exposes raw inference ids in its message.

use std::fmt;

// ---------------------------------------------------------------------------
// Diagnostic categories
// ---------------------------------------------------------------------------

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Two types could not be unified.
    TypeMismatch,
    /// A placeholder would have to contain itself.
    InfiniteType,
    /// An alias names a type that is not declared in scope.
    UndeclaredType,
    /// An alias chain refers back to itself.
    CyclicAlias,
    /// A variable reference does not resolve in its scope chain.
    UndefinedName,
    /// Struct shapes share no field.
    MissingField,
    /// A non-function value was called.
    NotAFunction,
    /// No member of an overload set accepts the arguments.
    NoMatchingOverload,
    /// One external attribute or uniform is used with different types.
    ExternalConflict,
    /// No rule could determine a type.
    InferenceIncomplete,
    /// A name was declared twice in the same scope.
    DuplicateDeclaration,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::TypeMismatch,
        Category::InfiniteType,
        Category::UndeclaredType,
        Category::CyclicAlias,
        Category::UndefinedName,
        Category::MissingField,
        Category::NotAFunction,
        Category::NoMatchingOverload,
        Category::ExternalConflict,
        Category::InferenceIncomplete,
        Category::DuplicateDeclaration,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::TypeMismatch => "type_mismatch",
            Category::InfiniteType => "infinite_type",
            Category::UndeclaredType => "undeclared_type",
            Category::CyclicAlias => "cyclic_alias",
            Category::UndefinedName => "undefined_name",
            Category::MissingField => "missing_field",
            Category::NotAFunction => "not_a_function",
            Category::NoMatchingOverload => "no_matching_overload",
            Category::ExternalConflict => "external_conflict",
            Category::InferenceIncomplete => "inference_incomplete",
            Category::DuplicateDeclaration => "duplicate_declaration",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::TypeMismatch => "T0001",
            Category::InfiniteType => "T0002",
            Category::UndeclaredType => "T0003",
            Category::CyclicAlias => "T0004",
            Category::UndefinedName => "T0005",
            Category::MissingField => "T0006",
            Category::NotAFunction => "T0007",
            Category::NoMatchingOverload => "T0008",
            Category::ExternalConflict => "T0009",
            Category::InferenceIncomplete => "T0010",
            Category::DuplicateDeclaration => "T0011",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::TypeMismatch => "Expression type does not match the type required here.",
            Category::InfiniteType => "A type would have to contain itself.",
            Category::UndeclaredType => "A referenced type name is not declared in scope.",
            Category::CyclicAlias => "A type alias refers back to itself.",
            Category::UndefinedName => "A referenced variable is not declared in scope.",
            Category::MissingField => "A struct does not have the accessed field.",
            Category::NotAFunction => "A value that is not a function was called.",
            Category::NoMatchingOverload => "No overload accepts the given arguments.",
            Category::ExternalConflict => {
                "An attribute or uniform is used with different types at different sites."
            }
            Category::InferenceIncomplete => "The type of an expression could not be determined.",
            Category::DuplicateDeclaration => "A name is declared twice in the same scope.",
        }
    }
}

// ---------------------------------------------------------------------------
// Source locations and subjects
// ---------------------------------------------------------------------------

/// A source location for diagnostics.
///
/// Uses byte offsets. Callers convert from `tint-ast` spans to this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file_id: u32,
    pub start: u32,
    pub end: u32,
}

/// What a diagnostic is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// The expression with this id failed.
    Expression(u32),
    /// This type (already rendered for display) failed.
    Type(String),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Expression(id) => write!(f, "expression #{id}"),
            Subject::Type(ty) => write!(f, "type `{ty}`"),
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured error message. Every problem the front end reports stops
/// the compilation, so there is no severity.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. T0001).
    pub code: Option<String>,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Where it went wrong.
    pub location: Option<SourceLocation>,
    /// The expression or type the problem is tied to.
    pub subject: Option<Subject>,
    /// Additional labeled spans (e.g., "also used as `int` here").
    pub labels: Vec<DiagLabel>,
    /// Suggested fix, if any.
    pub help: Option<String>,
}

/// A labeled source span within a diagnostic.
#[derive(Debug, Clone)]
pub struct DiagLabel {
    pub location: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            category,
            message: message.into(),
            location: None,
            subject: None,
            labels: Vec::new(),
            help: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn about(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_label(mut self, location: SourceLocation, message: impl Into<String>) -> Self {
        self.labels.push(DiagLabel {
            location,
            message: message.into(),
        });
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "error[{code}]: {}", self.message)?;
        } else {
            write!(f, "error: {}", self.message)?;
        }
        if let Some(subject) = &self.subject {
            write!(f, "\n  in: {subject}")?;
        }
        for label in &self.labels {
            write!(
                f,
                "\n  note: {} ({}..{})",
                label.message, label.location.start, label.location.end
            )?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping one or more diagnostics, in reporting order.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn single(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }

    pub fn multiple(diags: Vec<Diagnostic>) -> Self {
        Self(diags)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.0
    }

    /// Render every diagnostic, one block per problem.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_builder() {
        let loc = SourceLocation {
            file_id: 0,
            start: 10,
            end: 20,
        };
        let diag = Diagnostic::error(Category::TypeMismatch, "cannot unify `int` with `bool`")
            .at(loc)
            .about(Subject::Expression(7))
            .with_help("compare against a boolean instead");

        assert_eq!(diag.code.as_deref(), Some("T0001"));
        assert_eq!(diag.category, Category::TypeMismatch);
        assert_eq!(diag.subject, Some(Subject::Expression(7)));
        assert!(diag.message.contains("`int`"));
        assert!(diag.help.unwrap().contains("boolean"));
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::error(Category::CyclicAlias, "type alias `X` refers to itself")
            .about(Subject::Type("X".to_string()));
        let s = format!("{diag}");
        assert!(s.starts_with("error[T0004]: type alias `X` refers to itself"));
        assert!(s.contains("in: type `X`"));
    }

    #[test]
    fn codeless_diagnostic_display() {
        let diag = Diagnostic::error(Category::ExternalConflict, "uniform `u` is used as `float` and `int`");
        let diag = Diagnostic {
            code: None,
            ..diag
        };
        assert_eq!(
            diag.to_string(),
            "error: uniform `u` is used as `float` and `int`"
        );
    }

    #[test]
    fn error_display_uses_first_diagnostic() {
        let err = DiagnosticError::multiple(vec![
            Diagnostic::error(Category::UndefinedName, "undefined variable `a`"),
            Diagnostic::error(Category::UndefinedName, "undefined variable `b`"),
        ]);
        assert_eq!(err.to_string(), "error[T0005]: undefined variable `a`");
        assert_eq!(err.render().lines().count(), 2);
    }

    #[test]
    fn category_metadata_is_stable_and_unique() {
        let mut codes = std::collections::BTreeSet::new();
        for cat in Category::all() {
            assert!(!cat.as_str().is_empty());
            assert!(!cat.description().is_empty());
            assert!(
                codes.insert(cat.code()),
                "duplicate diagnostic code detected: {}",
                cat.code()
            );
        }
    }
}
