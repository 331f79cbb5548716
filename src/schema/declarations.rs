//! Filter declarations per kind.
//!
//! For every kind, the set of identifiers a filter may reference, with
//! their types, plus the function overloads that make null comparisons and
//! `has()` type-check. Relationship fields recurse into their target kind
//! under a dotted prefix, bounded to `MAX_DEPTH` segments.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::kind::ResourceKind;
use crate::schema::descriptor::{descriptor, FieldType};
use crate::{Error, Result};

/// Maximum number of segments in a declared identifier
pub const MAX_DEPTH: usize = 5;

/// Type of a declared identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclType {
    Scalar(FieldType),
    /// Relationship to another kind
    Message(ResourceKind),
}

impl DeclType {
    pub fn type_name(&self) -> &'static str {
        match self {
            DeclType::Scalar(ty) => ty.name(),
            DeclType::Message(kind) => kind.message_name(),
        }
    }
}

impl std::fmt::Display for DeclType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Generated function overloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverloadFn {
    /// `x = null`
    EqualsNull,
    /// `x != null`
    NotEqualsNull,
    /// `has(x)`
    Has,
}

/// Declarations for one root kind
#[derive(Debug)]
pub struct Declarations {
    kind: ResourceKind,
    idents: HashMap<String, DeclType>,
    overloads: HashMap<&'static str, HashSet<OverloadFn>>,
}

struct Prefix {
    declared: String,
    json: String,
}

impl Prefix {
    fn root() -> Self {
        Self {
            declared: String::new(),
            json: String::new(),
        }
    }

    fn join(base: &str, name: &str) -> String {
        if base.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", base, name)
        }
    }

    fn child(&self, declared: &str, json: &str) -> Self {
        Self {
            declared: Self::join(&self.declared, declared),
            json: Self::join(&self.json, json),
        }
    }
}

impl Declarations {
    /// Reflect over a kind's descriptors
    pub fn build(kind: ResourceKind) -> Self {
        let mut decls = Self {
            kind,
            idents: HashMap::new(),
            overloads: HashMap::new(),
        };
        decls.walk(kind, &Prefix::root(), 1);
        decls
    }

    fn walk(&mut self, kind: ResourceKind, prefix: &Prefix, depth: usize) {
        let desc = descriptor(kind);

        for field in desc.columns() {
            let ty = DeclType::Scalar(field.ty);
            self.declare(&prefix.child(field.name, field.json_name), ty);
            self.overload(ty, &[OverloadFn::EqualsNull, OverloadFn::NotEqualsNull]);
        }

        for edge in desc.edges {
            let ty = DeclType::Message(edge.target);
            let child = prefix.child(edge.name, edge.json_name);
            self.declare(&child, ty);
            self.overload(
                ty,
                &[OverloadFn::Has, OverloadFn::EqualsNull, OverloadFn::NotEqualsNull],
            );

            if depth < MAX_DEPTH {
                self.walk(edge.target, &child, depth + 1);
            }
        }
    }

    fn declare(&mut self, path: &Prefix, ty: DeclType) {
        self.idents.insert(path.declared.clone(), ty);
        self.idents.insert(path.json.clone(), ty);
    }

    fn overload(&mut self, ty: DeclType, functions: &[OverloadFn]) {
        self.overloads
            .entry(ty.type_name())
            .or_default()
            .extend(functions.iter().copied());
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Type of a dotted identifier, if declared
    pub fn lookup(&self, ident: &str) -> Option<DeclType> {
        self.idents.get(ident).copied()
    }

    pub fn has_overload(&self, function: OverloadFn, type_name: &str) -> bool {
        self.overloads
            .get(type_name)
            .is_some_and(|functions| functions.contains(&function))
    }

    pub fn len(&self) -> usize {
        self.idents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idents.is_empty()
    }

    /// Declared identifiers in sorted order, for schema discovery
    pub fn identifiers(&self) -> BTreeMap<&str, DeclType> {
        self.idents.iter().map(|(k, v)| (k.as_str(), *v)).collect()
    }
}

/// Declarations for every kind, built once
#[derive(Debug)]
pub struct SchemaRegistry {
    by_kind: HashMap<ResourceKind, Declarations>,
}

impl SchemaRegistry {
    /// Build declarations for all kinds eagerly
    pub fn build() -> Self {
        let by_kind = ResourceKind::all()
            .iter()
            .map(|kind| (*kind, Declarations::build(*kind)))
            .collect::<HashMap<_, _>>();

        tracing::debug!(
            kinds = by_kind.len(),
            identifiers = by_kind.values().map(Declarations::len).sum::<usize>(),
            "built filter declarations"
        );

        Self { by_kind }
    }

    pub fn declarations_for(&self, kind: ResourceKind) -> Result<&Declarations> {
        self.by_kind
            .get(&kind)
            .ok_or_else(|| Error::NotFound(format!("no declarations for kind {}", kind)))
    }
}
