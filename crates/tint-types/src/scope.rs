//! Lexical scopes and per-scope declaration tables.
//!
//! Scopes form a tree rooted at the native scope. They are identified by
//! arena index only: two scopes are never equal because they look alike.

use std::collections::BTreeMap;
use std::fmt;

/// Identity of a lexical scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    /// The root scope holding primitive type names and native operators.
    pub const NATIVE: ScopeId = ScopeId(0);

    pub fn is_native(self) -> bool {
        self == Self::NATIVE
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Arena of scopes. Index 0 is always the native root.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    parents: Vec<Option<ScopeId>>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            parents: vec![None],
        }
    }

    /// Allocate a new scope nested in `parent`.
    pub fn child(&mut self, parent: ScopeId) -> ScopeId {
        debug_assert!(self.contains(parent), "parent scope {parent} does not exist");
        let id = ScopeId(self.parents.len() as u32);
        self.parents.push(Some(parent));
        id
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.parents.get(scope.0 as usize).copied().flatten()
    }

    pub fn contains(&self, scope: ScopeId) -> bool {
        (scope.0 as usize) < self.parents.len()
    }

    /// `scope` followed by each enclosing scope up to the root.
    pub fn ancestors(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(scope), move |s| self.parent(*s))
    }

    /// Whether `ancestor` is `scope` or encloses it.
    pub fn encloses(&self, ancestor: ScopeId, scope: ScopeId) -> bool {
        self.ancestors(scope).any(|s| s == ancestor)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// A named binding recorded against a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration<T> {
    pub scope: ScopeId,
    pub name: String,
    pub value: T,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    #[error("`{name}` is already declared in scope {scope}")]
    Duplicate { scope: ScopeId, name: String },
    #[error("scope {0} does not exist")]
    UnknownScope(ScopeId),
}

/// Append-only declarations of one kind, keyed by scope then name.
#[derive(Debug, Clone)]
pub struct DeclarationTable<T> {
    by_scope: BTreeMap<ScopeId, BTreeMap<String, T>>,
}

impl<T> DeclarationTable<T> {
    pub fn new() -> Self {
        Self {
            by_scope: BTreeMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        scope: ScopeId,
        name: impl Into<String>,
        value: T,
    ) -> Result<(), DeclarationError> {
        let name = name.into();
        let names = self.by_scope.entry(scope).or_default();
        if names.contains_key(&name) {
            return Err(DeclarationError::Duplicate { scope, name });
        }
        names.insert(name, value);
        Ok(())
    }

    /// Look up `name` declared directly in `scope`, without walking parents.
    pub fn get_local(&self, scope: ScopeId, name: &str) -> Option<&T> {
        self.by_scope.get(&scope).and_then(|names| names.get(name))
    }

    /// Walk from `scope` up through its parents until `name` is found.
    /// Returns the declaring scope together with the value.
    pub fn lookup(&self, scopes: &ScopeTree, scope: ScopeId, name: &str) -> Option<(ScopeId, &T)> {
        scopes
            .ancestors(scope)
            .find_map(|s| self.get_local(s, name).map(|value| (s, value)))
    }

    /// Every declaration, ordered by scope id then name.
    pub fn iter(&self) -> impl Iterator<Item = Declaration<&T>> + '_ {
        self.by_scope.iter().flat_map(|(scope, names)| {
            names.iter().map(move |(name, value)| Declaration {
                scope: *scope,
                name: name.clone(),
                value,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.by_scope.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for DeclarationTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
