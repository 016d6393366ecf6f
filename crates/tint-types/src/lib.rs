//! Type representations for Tint.
//!
//! This crate defines the semantic types used by the inference engine and the
//! semantic checkers, together with the scope tree and declaration tables
//! they are indexed by. Inference-only kinds (`Unresolved` placeholders,
//! `Parametric` variables and length variables) are identified by integer
//! ids; their bindings live in the inference environment, not here.

pub mod scope;

pub use scope::{Declaration, DeclarationError, DeclarationTable, ScopeId, ScopeTree};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for an unresolved placeholder type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaceholderId(pub u32);

/// Unique identifier for an array length variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LengthVarId(pub u32);

/// Label of a parametric type produced by generalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamLabel(pub u32);

/// Length of an array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Length {
    /// Concrete, positive element count.
    Known(u32),
    /// Wildcard or inferred length, resolved by the environment.
    Var(LengthVarId),
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Length::Known(n) => write!(f, "{n}"),
            Length::Var(var) => write!(f, "n{}", var.0),
        }
    }
}

/// Built-in scalar and sampler kinds.
///
/// Declaration order is significant: it fixes the canonical order of union
/// members, so `float` overloads are tried before `int` ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    Float,
    Int,
    Uint,
    Bool,
    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCube,
}

impl Primitive {
    pub const ALL: [Primitive; 8] = [
        Primitive::Float,
        Primitive::Int,
        Primitive::Uint,
        Primitive::Bool,
        Primitive::Sampler1D,
        Primitive::Sampler2D,
        Primitive::Sampler3D,
        Primitive::SamplerCube,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Float => "float",
            Primitive::Int => "int",
            Primitive::Uint => "uint",
            Primitive::Bool => "bool",
            Primitive::Sampler1D => "sampler1D",
            Primitive::Sampler2D => "sampler2D",
            Primitive::Sampler3D => "sampler3D",
            Primitive::SamplerCube => "samplerCube",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Primitive::Float | Primitive::Int | Primitive::Uint)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A struct field label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub String);

impl Label {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A semantic type in Tint.
///
/// Equality, ordering and hashing are structural and derived together, so
/// equal types always hash alike. Placeholders compare by id, which makes
/// two separately minted placeholders unequal even in the same scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Primitive(Primitive),
    Array {
        component: Box<Type>,
        length: Length,
    },
    Struct(StructType),
    Function(FunctionType),
    Union(UnionType),
    /// Named reference, resolved through the declared-type table.
    Alias {
        scope: ScopeId,
        name: String,
    },
    /// Not yet inferred. Never appears in a finished program.
    Unresolved {
        scope: ScopeId,
        id: PlaceholderId,
    },
    /// Universally quantified variable introduced by generalization.
    Parametric {
        scope: ScopeId,
        label: ParamLabel,
    },
}

/// Struct type. Fields are keyed by label, so field order never matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructType {
    pub fields: BTreeMap<Label, Type>,
}

impl StructType {
    pub fn new(fields: impl IntoIterator<Item = (Label, Type)>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn get(&self, label: &Label) -> Option<&Type> {
        self.fields.get(label)
    }

    pub fn has(&self, label: &Label) -> bool {
        self.fields.contains_key(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Single-argument function type. Multi-argument functions are curried.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionType {
    pub param: Box<Type>,
    pub ret: Box<Type>,
}

impl FunctionType {
    pub fn new(param: Type, ret: Type) -> Self {
        Self {
            param: Box::new(param),
            ret: Box::new(ret),
        }
    }
}

/// Overload set: at least two distinct members, flattened and kept in
/// canonical (sorted) order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnionType {
    members: Vec<Type>,
}

impl UnionType {
    /// Build a union, absorbing nested unions and duplicate members.
    ///
    /// Returns `None` for no members; a single distinct member is returned
    /// as itself rather than wrapped.
    pub fn from_members(members: impl IntoIterator<Item = Type>) -> Option<Type> {
        let mut flat = Vec::new();
        for member in members {
            match member {
                Type::Union(inner) => flat.extend(inner.members),
                other => flat.push(other),
            }
        }
        flat.sort();
        flat.dedup();
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Type::Union(UnionType { members: flat })),
        }
    }

    pub fn members(&self) -> &[Type] {
        &self.members
    }
}

impl Type {
    pub fn float() -> Self {
        Type::Primitive(Primitive::Float)
    }

    pub fn int() -> Self {
        Type::Primitive(Primitive::Int)
    }

    pub fn uint() -> Self {
        Type::Primitive(Primitive::Uint)
    }

    pub fn bool() -> Self {
        Type::Primitive(Primitive::Bool)
    }

    pub fn array(component: Type, length: Length) -> Self {
        Type::Array {
            component: Box::new(component),
            length,
        }
    }

    pub fn function(param: Type, ret: Type) -> Self {
        Type::Function(FunctionType::new(param, ret))
    }

    /// Right-nested function type: `[a, b] -> r` becomes `a -> (b -> r)`.
    pub fn curried(params: Vec<Type>, ret: Type) -> Self {
        params
            .into_iter()
            .rev()
            .fold(ret, |acc, param| Type::function(param, acc))
    }

    pub fn structure(fields: impl IntoIterator<Item = (Label, Type)>) -> Self {
        Type::Struct(StructType::new(fields))
    }

    pub fn alias(scope: ScopeId, name: impl Into<String>) -> Self {
        Type::Alias {
            scope,
            name: name.into(),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Type::Unresolved { .. })
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum VarKey {
    Placeholder(PlaceholderId),
    Parametric(ScopeId, ParamLabel),
    Length(LengthVarId),
}

/// Names inference variables while rendering.
///
/// Raw mode shows ids (`?3`, `T1`, `n0`) for debugging and traces.
/// Sanitized mode assigns names by first appearance (`?a`, `a`, `n`), so
/// user-facing output never leaks ids.
struct Namer {
    sanitize: bool,
    names: BTreeMap<VarKey, String>,
    next_type: usize,
    next_length: usize,
}

impl Namer {
    fn raw() -> Self {
        Self {
            sanitize: false,
            names: BTreeMap::new(),
            next_type: 0,
            next_length: 0,
        }
    }

    fn sanitized() -> Self {
        Self {
            sanitize: true,
            ..Self::raw()
        }
    }

    fn name(&mut self, key: VarKey) -> String {
        if !self.sanitize {
            return match key {
                VarKey::Placeholder(id) => format!("?{}", id.0),
                VarKey::Parametric(_, label) => format!("T{}", label.0),
                VarKey::Length(id) => format!("n{}", id.0),
            };
        }
        if let Some(existing) = self.names.get(&key) {
            return existing.clone();
        }
        let name = match key {
            VarKey::Placeholder(_) => {
                let name = format!("?{}", alphabetic_var_name(self.next_type));
                self.next_type += 1;
                name
            }
            VarKey::Parametric(..) => {
                let name = alphabetic_var_name(self.next_type);
                self.next_type += 1;
                name
            }
            VarKey::Length(_) => {
                let name = if self.next_length == 0 {
                    "n".to_string()
                } else {
                    format!("n{}", self.next_length)
                };
                self.next_length += 1;
                name
            }
        };
        self.names.insert(key, name.clone());
        name
    }

    fn render(&mut self, ty: &Type, out: &mut String) {
        match ty {
            Type::Primitive(p) => out.push_str(p.name()),
            Type::Array { component, length } => {
                self.render_operand(component, out);
                out.push('[');
                self.render_length(length, out);
                out.push(']');
            }
            Type::Struct(st) => {
                out.push_str("{ ");
                for (i, (label, field)) in st.fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(label.as_str());
                    out.push_str(": ");
                    self.render(field, out);
                }
                out.push_str(" }");
            }
            Type::Function(ft) => {
                self.render_operand(&ft.param, out);
                out.push_str(" -> ");
                self.render(&ft.ret, out);
            }
            Type::Union(ut) => {
                out.push('(');
                for (i, member) in ut.members.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" | ");
                    }
                    self.render(member, out);
                }
                out.push(')');
            }
            Type::Alias { name, .. } => out.push_str(name),
            Type::Unresolved { id, .. } => {
                let name = self.name(VarKey::Placeholder(*id));
                out.push_str(&name);
            }
            Type::Parametric { scope, label } => {
                let name = self.name(VarKey::Parametric(*scope, *label));
                out.push_str(&name);
            }
        }
    }

    /// Function types need parentheses in parameter and component position.
    fn render_operand(&mut self, ty: &Type, out: &mut String) {
        if matches!(ty, Type::Function(_)) {
            out.push('(');
            self.render(ty, out);
            out.push(')');
        } else {
            self.render(ty, out);
        }
    }

    fn render_length(&mut self, length: &Length, out: &mut String) {
        match length {
            Length::Known(n) => out.push_str(&n.to_string()),
            Length::Var(var) => {
                let name = self.name(VarKey::Length(*var));
                out.push_str(&name);
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        Namer::raw().render(self, &mut out);
        f.write_str(&out)
    }
}

fn alphabetic_var_name(index: usize) -> String {
    let letter = (b'a' + (index % 26) as u8) as char;
    if index < 26 {
        letter.to_string()
    } else {
        format!("{letter}{}", index / 26)
    }
}

/// Render a type for user-facing output, naming inference variables by
/// order of appearance instead of by internal id.
pub fn sanitize_type_display(ty: &Type) -> String {
    let mut out = String::new();
    Namer::sanitized().render(ty, &mut out);
    out
}

/// Render two types with one shared naming, so a variable that appears in
/// both keeps the same name in both.
pub fn sanitize_type_pair_display(left: &Type, right: &Type) -> (String, String) {
    let mut namer = Namer::sanitized();
    let mut l = String::new();
    let mut r = String::new();
    namer.render(left, &mut l);
    namer.render(right, &mut r);
    (l, r)
}

// ---------------------------------------------------------------------------
// Free variable collection
// ---------------------------------------------------------------------------

/// Placeholders syntactically present in a type (bindings are not followed).
pub fn free_placeholders(ty: &Type) -> BTreeSet<PlaceholderId> {
    let mut vars = BTreeSet::new();
    visit_leaves(ty, &mut |leaf| {
        if let Leaf::Type(Type::Unresolved { id, .. }) = leaf {
            vars.insert(*id);
        }
    });
    vars
}

/// Parametric variables present in a type, as `(scope, label)` pairs.
pub fn parametric_vars(ty: &Type) -> BTreeSet<(ScopeId, ParamLabel)> {
    let mut vars = BTreeSet::new();
    visit_leaves(ty, &mut |leaf| {
        if let Leaf::Type(Type::Parametric { scope, label }) = leaf {
            vars.insert((*scope, *label));
        }
    });
    vars
}

/// Length variables present in a type.
pub fn free_length_vars(ty: &Type) -> BTreeSet<LengthVarId> {
    let mut vars = BTreeSet::new();
    visit_leaves(ty, &mut |leaf| {
        if let Leaf::Length(Length::Var(var)) = leaf {
            vars.insert(*var);
        }
    });
    vars
}

/// Aliases referenced by a type, as `(scope, name)` pairs.
pub fn alias_refs(ty: &Type) -> Vec<(ScopeId, &str)> {
    let mut refs = Vec::new();
    collect_alias_refs(ty, &mut refs);
    refs
}

fn collect_alias_refs<'a>(ty: &'a Type, refs: &mut Vec<(ScopeId, &'a str)>) {
    match ty {
        Type::Alias { scope, name } => refs.push((*scope, name.as_str())),
        Type::Array { component, .. } => collect_alias_refs(component, refs),
        Type::Struct(st) => st.fields.values().for_each(|t| collect_alias_refs(t, refs)),
        Type::Function(ft) => {
            collect_alias_refs(&ft.param, refs);
            collect_alias_refs(&ft.ret, refs);
        }
        Type::Union(ut) => ut.members.iter().for_each(|t| collect_alias_refs(t, refs)),
        Type::Primitive(_) | Type::Unresolved { .. } | Type::Parametric { .. } => {}
    }
}

enum Leaf<'a> {
    Type(&'a Type),
    Length(&'a Length),
}

fn visit_leaves<'a>(ty: &'a Type, f: &mut impl FnMut(Leaf<'a>)) {
    match ty {
        Type::Array { component, length } => {
            visit_leaves(component, f);
            f(Leaf::Length(length));
        }
        Type::Struct(st) => st.fields.values().for_each(|t| visit_leaves(t, f)),
        Type::Function(ft) => {
            visit_leaves(&ft.param, f);
            visit_leaves(&ft.ret, f);
        }
        Type::Union(ut) => ut.members.iter().for_each(|t| visit_leaves(t, f)),
        Type::Primitive(_)
        | Type::Alias { .. }
        | Type::Unresolved { .. }
        | Type::Parametric { .. } => f(Leaf::Type(ty)),
    }
}
