//! Static catalog of kinds, filter declarations and transpilers
//!
//! The [`Catalog`] is built once per process and read-only afterwards.
//! Every query, mutation and CLI command borrows it.

pub mod declarations;
pub mod descriptor;

use std::sync::OnceLock;

pub use declarations::{DeclType, Declarations, SchemaRegistry, MAX_DEPTH};
pub use descriptor::{descriptor, EdgeDescriptor, EdgeLink, FieldDescriptor, FieldType, KindDescriptor};

use crate::filter;
use crate::kind::ResourceKind;
use crate::transpile::{Compiler, Predicate, TranspilerRegistry};
use crate::Result;

/// Declaration and transpiler registries for every kind
#[derive(Debug)]
pub struct Catalog {
    schema: SchemaRegistry,
    transpiler: TranspilerRegistry,
}

static CATALOG: OnceLock<Catalog> = OnceLock::new();

impl Catalog {
    /// Build a fresh catalog
    pub fn build() -> Self {
        Self {
            schema: SchemaRegistry::build(),
            transpiler: TranspilerRegistry::build(),
        }
    }

    /// Process-wide catalog, built on first use
    pub fn global() -> &'static Catalog {
        CATALOG.get_or_init(Catalog::build)
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn transpiler(&self) -> &TranspilerRegistry {
        &self.transpiler
    }

    pub fn declarations_for(&self, kind: ResourceKind) -> Result<&Declarations> {
        self.schema.declarations_for(kind)
    }

    /// Parse, check, normalise and compile a filter for `kind`
    pub fn compile_filter(&self, kind: ResourceKind, filter: &str) -> Result<Predicate> {
        let decls = self.declarations_for(kind)?;
        let expr = filter::parse(filter, decls)?;
        let predicate = Compiler::new(&self.transpiler).compile(&expr, kind)?;

        tracing::trace!(%kind, sql = %predicate.to_sql().sql, "compiled filter");
        Ok(predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_global_is_shared() {
        assert!(std::ptr::eq(Catalog::global(), Catalog::global()));
    }

    #[test]
    fn test_compile_filter_dual_casing() {
        let catalog = Catalog::build();
        let camel = catalog
            .compile_filter(ResourceKind::Host, "site.region.parentRegion.name = \"x\"")
            .unwrap();
        let snake = catalog
            .compile_filter(ResourceKind::Host, "site.region.parent_region.name = \"x\"")
            .unwrap();
        assert_eq!(camel, snake);
    }

    #[test]
    fn test_compile_filter_rejects_bad_filter() {
        let catalog = Catalog::build();
        let err = catalog
            .compile_filter(ResourceKind::Site, "region.bogus = 1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
