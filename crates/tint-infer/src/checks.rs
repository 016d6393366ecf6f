//! Semantic checkers that run over a populated environment before inference.
//!
//! A checker either stops the pipeline when it fails (structural problems
//! that would make inference meaningless) or lets later checkers run and
//! has its problems accumulated.

use std::collections::{BTreeMap, BTreeSet};

use tint_ast::{ExprId, ExprKind, ExternalKind, Span};
use tint_diag::{Category, Diagnostic, DiagnosticError, Subject};
use tint_types::{
    ScopeId, Type, alias_refs, free_placeholders, parametric_vars, sanitize_type_display,
};

use crate::env::Environment;
use crate::infer::span_to_location;

/// One program-level check.
pub trait SemanticChecker {
    fn name(&self) -> &'static str;

    /// Whether later checkers still run when this one fails.
    fn continue_on_failure(&self) -> bool;

    fn validate(&self, env: &mut Environment) -> Result<(), Vec<Diagnostic>>;
}

/// Ordered checkers.
pub struct CheckerPipeline {
    checkers: Vec<Box<dyn SemanticChecker>>,
}

impl CheckerPipeline {
    pub fn new() -> Self {
        Self {
            checkers: Vec::new(),
        }
    }

    pub fn with(mut self, checker: impl SemanticChecker + 'static) -> Self {
        self.checkers.push(Box::new(checker));
        self
    }

    /// Cyclic aliases, unresolved variables, then attribute and uniform
    /// consistency.
    pub fn standard() -> Self {
        Self::new()
            .with(CyclicAliasChecker)
            .with(UnresolvedVariableChecker)
            .with(ExternalBindingChecker::new(ExternalKind::Attribute))
            .with(ExternalBindingChecker::new(ExternalKind::Uniform))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.checkers.iter().map(|c| c.name()).collect()
    }

    /// Run every checker in order. A failing checker that does not continue
    /// ends the run with only its own problems.
    pub fn run(&self, env: &mut Environment) -> Result<(), DiagnosticError> {
        let mut problems = Vec::new();
        for checker in &self.checkers {
            let Err(diags) = checker.validate(env) else {
                continue;
            };
            if !checker.continue_on_failure() {
                return Err(DiagnosticError::multiple(diags));
            }
            problems.extend(diags);
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(DiagnosticError::multiple(problems))
        }
    }
}

impl Default for CheckerPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

fn finish(problems: Vec<Diagnostic>) -> Result<(), Vec<Diagnostic>> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

fn at_span(diag: Diagnostic, span: Span) -> Diagnostic {
    if span.is_synthetic() {
        diag
    } else {
        diag.at(span_to_location(span))
    }
}

// ---------------------------------------------------------------------------
// Cyclic aliases
// ---------------------------------------------------------------------------

/// Rejects alias chains that lead back to themselves and aliases naming
/// undeclared types.
pub struct CyclicAliasChecker;

impl SemanticChecker for CyclicAliasChecker {
    fn name(&self) -> &'static str {
        "cyclic-aliases"
    }

    fn continue_on_failure(&self) -> bool {
        false
    }

    fn validate(&self, env: &mut Environment) -> Result<(), Vec<Diagnostic>> {
        let env: &Environment = env;
        let mut walk = AliasWalk::new(env);
        for decl in env.declared_types() {
            walk.visit((decl.scope, decl.name), decl.value);
        }
        for decl in env.declared_variables() {
            decl.value.walk(&mut |node| {
                for annotation in node.annotations() {
                    walk.follow(annotation);
                }
            });
        }
        finish(walk.problems)
    }
}

type AliasKey = (ScopeId, String);

struct AliasWalk<'a> {
    env: &'a Environment,
    /// Aliases on the current path, outermost first.
    stack: Vec<AliasKey>,
    done: BTreeSet<AliasKey>,
    cycles: BTreeSet<BTreeSet<AliasKey>>,
    undeclared: BTreeSet<AliasKey>,
    problems: Vec<Diagnostic>,
}

impl<'a> AliasWalk<'a> {
    fn new(env: &'a Environment) -> Self {
        Self {
            env,
            stack: Vec::new(),
            done: BTreeSet::new(),
            cycles: BTreeSet::new(),
            undeclared: BTreeSet::new(),
            problems: Vec::new(),
        }
    }

    fn visit(&mut self, key: AliasKey, def: &'a Type) {
        if self.done.contains(&key) {
            return;
        }
        self.stack.push(key);
        self.follow(def);
        if let Some(key) = self.stack.pop() {
            self.done.insert(key);
        }
    }

    fn follow(&mut self, ty: &'a Type) {
        let env = self.env;
        for (scope, name) in alias_refs(ty) {
            let Some((declared_in, def)) = env.find_declared_type(scope, name) else {
                if self.undeclared.insert((scope, name.to_string())) {
                    self.problems.push(
                        Diagnostic::error(
                            Category::UndeclaredType,
                            format!("type `{name}` is not declared"),
                        )
                        .about(Subject::Type(name.to_string())),
                    );
                }
                continue;
            };
            let key = (declared_in, name.to_string());
            match self.stack.iter().position(|k| *k == key) {
                Some(start) => self.report_cycle(start),
                None => self.visit(key, def),
            }
        }
    }

    fn report_cycle(&mut self, start: usize) {
        let path = &self.stack[start..];
        let members: BTreeSet<AliasKey> = path.iter().cloned().collect();
        if !self.cycles.insert(members) {
            return;
        }
        let first = path[0].1.clone();
        let message = if path.len() == 1 {
            format!("type alias `{first}` refers to itself")
        } else {
            let chain: Vec<String> = path
                .iter()
                .map(|(_, name)| format!("`{name}`"))
                .chain(std::iter::once(format!("`{first}`")))
                .collect();
            format!("type aliases form a cycle: {}", chain.join(" -> "))
        };
        self.problems.push(
            Diagnostic::error(Category::CyclicAlias, message)
                .about(Subject::Type(first))
                .with_help("break the cycle with a struct, array or primitive type"),
        );
    }
}

// ---------------------------------------------------------------------------
// Unresolved variables
// ---------------------------------------------------------------------------

/// Every variable reference must resolve in its scope chain.
pub struct UnresolvedVariableChecker;

impl SemanticChecker for UnresolvedVariableChecker {
    fn name(&self) -> &'static str {
        "unresolved-variables"
    }

    fn continue_on_failure(&self) -> bool {
        false
    }

    fn validate(&self, env: &mut Environment) -> Result<(), Vec<Diagnostic>> {
        let env: &Environment = env;
        let mut problems = Vec::new();
        for decl in env.declared_variables() {
            decl.value.walk(&mut |node| {
                if let ExprKind::Var(name) = &node.kind
                    && env.get_declared_variable(node.scope, name).is_none()
                {
                    let diag = Diagnostic::error(
                        Category::UndefinedName,
                        format!("undefined variable `{name}`"),
                    )
                    .about(Subject::Expression(node.id.0));
                    problems.push(at_span(diag, node.span));
                }
            });
        }
        finish(problems)
    }
}

// ---------------------------------------------------------------------------
// External bindings
// ---------------------------------------------------------------------------

/// Each attribute (or uniform) name must be used with one type everywhere.
///
/// Runs inference over the program first. Declarations that fail to infer
/// are skipped whole and their errors are left for `infer_program`; sites
/// whose type still holds placeholders carry no evidence and are skipped.
pub struct ExternalBindingChecker {
    kind: ExternalKind,
}

impl ExternalBindingChecker {
    pub fn new(kind: ExternalKind) -> Self {
        Self { kind }
    }
}

struct Site {
    id: ExprId,
    span: Span,
    ty: Type,
}

impl SemanticChecker for ExternalBindingChecker {
    fn name(&self) -> &'static str {
        match self.kind {
            ExternalKind::Attribute => "attribute-consistency",
            ExternalKind::Uniform => "uniform-consistency",
        }
    }

    fn continue_on_failure(&self) -> bool {
        true
    }

    fn validate(&self, env: &mut Environment) -> Result<(), Vec<Diagnostic>> {
        let declared: Vec<(ScopeId, String)> = env
            .declared_variables()
            .filter(|decl| !decl.scope.is_native())
            .map(|decl| (decl.scope, decl.name))
            .collect();
        let mut failed = BTreeSet::new();
        for (scope, name) in declared {
            if let Some(Err(_)) = env.infer_declaration(scope, &name) {
                failed.insert((scope, name));
            }
        }

        let env: &Environment = env;
        let mut seen = BTreeSet::new();
        let mut sites: BTreeMap<String, Vec<Site>> = BTreeMap::new();
        for decl in env.declared_variables() {
            if failed.contains(&(decl.scope, decl.name.clone())) {
                continue;
            }
            decl.value.walk(&mut |node| {
                let Some(external) = node.external() else {
                    return;
                };
                if external.kind != self.kind || !seen.insert(node.id) {
                    return;
                }
                let Some(ty) = node_type(env, node.id) else {
                    return;
                };
                sites.entry(external.name.to_string()).or_default().push(Site {
                    id: node.id,
                    span: node.span,
                    ty,
                });
            });
        }

        let mut problems = Vec::new();
        for (name, sites) in &sites {
            if let Some(diag) = self.conflict(name, sites) {
                problems.push(diag);
            }
        }
        finish(problems)
    }
}

impl ExternalBindingChecker {
    fn conflict(&self, name: &str, sites: &[Site]) -> Option<Diagnostic> {
        let mut distinct: Vec<&Site> = Vec::new();
        for site in sites {
            if !distinct.iter().any(|d| d.ty == site.ty) {
                distinct.push(site);
            }
        }
        if distinct.len() < 2 {
            return None;
        }
        let rendered: Vec<String> = distinct
            .iter()
            .map(|site| format!("`{}`", sanitize_type_display(&site.ty)))
            .collect();
        let message = format!(
            "{} `{name}` is used as {}",
            self.kind.as_str(),
            join_and(&rendered)
        );
        let mut diag = Diagnostic::error(Category::ExternalConflict, message)
            .about(Subject::Expression(distinct[1].id.0));
        diag = at_span(diag, distinct[1].span);
        for (site, ty) in distinct.iter().zip(&rendered) {
            if !site.span.is_synthetic() {
                diag = diag.with_label(span_to_location(site.span), format!("used as {ty} here"));
            }
        }
        Some(diag.with_help(format!(
            "annotate `{name}` with one type at every use"
        )))
    }
}

/// Fully expanded type of an inferred node, if it is ground.
fn node_type(env: &Environment, id: ExprId) -> Option<Type> {
    let ty = env.expand(&env.type_of(id)?);
    (free_placeholders(&ty).is_empty() && parametric_vars(&ty).is_empty()).then_some(ty)
}

fn join_and(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}
