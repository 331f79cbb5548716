//! Per-kind transpiler entries.
//!
//! Each entry knows the kind's table, which canonical names are plain
//! columns, how to derive a predicate across each relationship and the
//! "relationship is set" predicate used by `has()`.

use std::collections::HashMap;

use crate::kind::ResourceKind;
use crate::schema::descriptor::{descriptor, EdgeLink, FieldType};
use crate::transpile::predicate::Predicate;
use crate::{Error, Result};

/// Derives predicates across one relationship
#[derive(Debug, Clone)]
pub struct EdgeHandler {
    pub name: &'static str,
    pub target: ResourceKind,
    pub link: EdgeLink,
}

impl EdgeHandler {
    /// Wrap a predicate on the target kind into one on the owning kind
    pub fn derive(&self, inner: Predicate) -> Predicate {
        Predicate::Related {
            target: self.target,
            link: self.link,
            inner: Box::new(inner),
        }
    }

    /// The relationship is set
    pub fn exists(&self) -> Predicate {
        match self.link {
            EdgeLink::Forward { column } => Predicate::IsNotNull { column },
            EdgeLink::Reverse { .. } => self.derive(Predicate::True),
        }
    }
}

#[derive(Debug)]
pub struct TranspilerEntry {
    kind: ResourceKind,
    columns: HashMap<&'static str, FieldType>,
    edges: HashMap<&'static str, EdgeHandler>,
}

impl TranspilerEntry {
    pub fn for_kind(kind: ResourceKind) -> Self {
        let desc = descriptor(kind);
        let columns = desc.columns().map(|f| (f.name, f.ty)).collect();
        let edges = desc
            .edges
            .iter()
            .map(|e| {
                (
                    e.name,
                    EdgeHandler {
                        name: e.name,
                        target: e.target,
                        link: e.link,
                    },
                )
            })
            .collect();

        Self {
            kind,
            columns,
            edges,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn table(&self) -> &'static str {
        self.kind.table()
    }

    /// Validate a canonical column name, returning its static form
    pub fn column(&self, name: &str) -> Option<(&'static str, FieldType)> {
        self.columns.get_key_value(name).map(|(k, ty)| (*k, *ty))
    }

    pub fn edge(&self, name: &str) -> Option<&EdgeHandler> {
        self.edges.get(name)
    }

    /// Registered "relationship is set" predicate
    pub fn exists(&self, name: &str) -> Option<Predicate> {
        self.edge(name).map(EdgeHandler::exists)
    }
}

/// Transpiler entries for every kind, built once
#[derive(Debug)]
pub struct TranspilerRegistry {
    entries: HashMap<ResourceKind, TranspilerEntry>,
}

impl TranspilerRegistry {
    pub fn build() -> Self {
        let entries = ResourceKind::all()
            .iter()
            .map(|kind| (*kind, TranspilerEntry::for_kind(*kind)))
            .collect();
        Self { entries }
    }

    pub fn entry(&self, kind: ResourceKind) -> Result<&TranspilerEntry> {
        self.entries
            .get(&kind)
            .ok_or_else(|| Error::Internal(format!("no transpiler registered for kind {}", kind)))
    }
}
