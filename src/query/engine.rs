//! Query engine implementation
//!
//! Provides the read operations of the inventory:
//! - `find`: IDs of resources matching a filter
//! - `list`: full resources with effective metadata
//! - `get`: a single resource by ID
//!
//! Filtering by effective metadata cannot be pushed into SQL. When a
//! request carries metadata pairs the full candidate set is fetched,
//! resolved, filtered and only then paginated.

use rusqlite::Transaction;
use serde::Serialize;

use super::order;
use crate::kind::{ResourceId, ResourceKind};
use crate::metadata::{self, Hierarchy, MetadataPair};
use crate::resource::{Context, ResourceView};
use crate::schema::Catalog;
use crate::storage::rows::{self, Window};
use crate::transpile::Predicate;
use crate::{Error, Result};

/// Parameters of a `find` or `list` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub kind: ResourceKind,
    pub filter: String,
    pub order_by: String,
    pub offset: usize,
    /// 0 means no limit
    pub limit: usize,
    /// Required effective metadata pairs (hierarchical kinds only)
    pub metadata: Vec<MetadataPair>,
}

impl ListRequest {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            filter: String::new(),
            order_by: String::new(),
            offset: 0,
            limit: 0,
            metadata: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn metadata(mut self, pairs: Vec<MetadataPair>) -> Self {
        self.metadata = pairs;
        self
    }

    fn window(&self) -> Window {
        Window {
            offset: self.offset,
            limit: self.limit,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_next: bool,
}

impl<T> Page<T> {
    fn new(items: Vec<T>, offset: usize, total: usize) -> Self {
        let has_next = offset.saturating_add(items.len()) < total;
        Self {
            items,
            total,
            has_next,
        }
    }

    fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            has_next: self.has_next,
        }
    }
}

/// Compiled form of a request
struct Plan {
    predicate: Predicate,
    order_by: String,
}

/// Query engine for inventory reads
pub struct QueryEngine<'a> {
    catalog: &'a Catalog,
}

impl<'a> QueryEngine<'a> {
    /// Create a new query engine
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    fn plan(&self, req: &ListRequest) -> Result<Plan> {
        if !req.metadata.is_empty() {
            if !req.kind.is_hierarchical() {
                return Err(Error::invalid(format!(
                    "{} does not carry metadata",
                    req.kind
                )));
            }
            metadata::validate(&req.metadata)?;
        }

        let predicate = self.catalog.compile_filter(req.kind, &req.filter)?;
        let order_by = order::to_sql(&order::parse_order_by(req.kind, &req.order_by)?);
        Ok(Plan {
            predicate,
            order_by,
        })
    }

    /// Every candidate resolved and filtered by metadata, then paginated in memory
    fn list_by_metadata(
        &self,
        tx: &Transaction,
        ctx: &Context,
        req: &ListRequest,
        plan: &Plan,
    ) -> Result<Page<ResourceView>> {
        let candidates = rows::select(
            tx,
            req.kind,
            ctx.tenant_id(),
            &plan.predicate,
            &plan.order_by,
            Window::ALL,
        )?;
        let fetched = candidates.len();

        let hierarchy = Hierarchy::load(tx, ctx.tenant_id())?;
        let matching: Vec<ResourceView> = hierarchy
            .resolve_all(candidates)?
            .into_iter()
            .filter(|view| {
                view.effective
                    .as_ref()
                    .is_some_and(|m| m.matches_all(&req.metadata))
            })
            .collect();

        let total = matching.len();
        let take = if req.limit == 0 { usize::MAX } else { req.limit };
        let items: Vec<_> = matching.into_iter().skip(req.offset).take(take).collect();

        tracing::debug!(kind = %req.kind, fetched, total, "filtered by effective metadata");
        Ok(Page::new(items, req.offset, total))
    }

    /// List full resources matching a request
    pub fn list(&self, tx: &Transaction, ctx: &Context, req: &ListRequest) -> Result<Page<ResourceView>> {
        let plan = self.plan(req)?;
        if !req.metadata.is_empty() {
            return self.list_by_metadata(tx, ctx, req, &plan);
        }

        let total = rows::count(tx, req.kind, ctx.tenant_id(), &plan.predicate)?;
        let resources = rows::select(
            tx,
            req.kind,
            ctx.tenant_id(),
            &plan.predicate,
            &plan.order_by,
            req.window(),
        )?;

        let items = if req.kind.is_hierarchical() && !resources.is_empty() {
            Hierarchy::load(tx, ctx.tenant_id())?.resolve_all(resources)?
        } else {
            resources
                .into_iter()
                .map(|resource| ResourceView {
                    resource,
                    effective: None,
                })
                .collect()
        };

        Ok(Page::new(items, req.offset, total))
    }

    /// IDs of resources matching a request
    pub fn find(&self, tx: &Transaction, ctx: &Context, req: &ListRequest) -> Result<Page<ResourceId>> {
        let plan = self.plan(req)?;
        if !req.metadata.is_empty() {
            let page = self.list_by_metadata(tx, ctx, req, &plan)?;
            return Ok(page.map(|view| view.resource.id));
        }

        let total = rows::count(tx, req.kind, ctx.tenant_id(), &plan.predicate)?;
        let ids = rows::select_ids(
            tx,
            req.kind,
            ctx.tenant_id(),
            &plan.predicate,
            &plan.order_by,
            req.window(),
        )?;
        Ok(Page::new(ids, req.offset, total))
    }

    /// Get a single resource by ID
    pub fn get(&self, tx: &Transaction, ctx: &Context, kind: ResourceKind, id: &str) -> Result<ResourceView> {
        let id = ResourceId::parse_for(kind, id)?;
        let resource = rows::require(tx, kind, ctx.tenant_id(), id.as_str())?;
        let effective = if kind.is_hierarchical() {
            Hierarchy::load(tx, ctx.tenant_id())?.resolve(&resource)?
        } else {
            None
        };
        Ok(ResourceView {
            resource,
            effective,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Fields, Resource};
    use crate::storage::SqliteStore;
    use crate::ErrorKind;
    use serde_json::json;

    fn seed(store: &SqliteStore, ctx: &Context, kind: ResourceKind, fields: serde_json::Value) -> ResourceId {
        let fields: Fields = serde_json::from_value(fields).unwrap();
        let resource = Resource {
            id: ResourceId::generate(kind),
            tenant_id: ctx.tenant_id().to_string(),
            fields,
            metadata: Vec::new(),
            created_at: 1,
            updated_at: 1,
        };
        let id = resource.id.clone();
        store.write(ctx, |tx| rows::insert(tx, &resource)).unwrap();
        id
    }

    #[test]
    fn test_list_with_filter_and_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let catalog = Catalog::build();
        let ctx = Context::new("t1");
        for name in ["beta", "alpha", "gamma"] {
            seed(&store, &ctx, ResourceKind::Provider, json!({"name": name}));
        }

        let engine = QueryEngine::new(&catalog);
        let req = ListRequest::new(ResourceKind::Provider)
            .filter(r#"name = "A""#)
            .order_by("name desc");
        let page = store.read(&ctx, |tx| engine.list(tx, &ctx, &req)).unwrap();

        let names: Vec<_> = page
            .items
            .iter()
            .map(|v| v.resource.str_field("name").unwrap())
            .collect();
        assert_eq!(names, vec!["gamma", "beta", "alpha"]);
        assert_eq!(page.total, 3);
        assert!(!page.has_next);
    }

    #[test]
    fn test_find_paginates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let catalog = Catalog::build();
        let ctx = Context::new("t1");
        for i in 0..5 {
            seed(&store, &ctx, ResourceKind::Os, json!({"name": format!("os-{}", i)}));
        }

        let engine = QueryEngine::new(&catalog);
        let req = ListRequest::new(ResourceKind::Os).page(3, 2);
        let page = store.read(&ctx, |tx| engine.find(tx, &ctx, &req)).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 5);
        assert!(!page.has_next);

        let req = ListRequest::new(ResourceKind::Os).page(0, 2);
        let page = store.read(&ctx, |tx| engine.find(tx, &ctx, &req)).unwrap();
        assert!(page.has_next);
    }

    #[test]
    fn test_tenants_are_isolated() {
        let store = SqliteStore::open_in_memory().unwrap();
        let catalog = Catalog::build();
        let t1 = Context::new("t1");
        let t2 = Context::new("t2");
        let id = seed(&store, &t1, ResourceKind::Os, json!({"name": "ubuntu"}));

        let engine = QueryEngine::new(&catalog);
        let err = store
            .read(&t2, |tx| engine.get(tx, &t2, ResourceKind::Os, id.as_str()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_metadata_filter_rejected_for_flat_kinds() {
        let store = SqliteStore::open_in_memory().unwrap();
        let catalog = Catalog::build();
        let ctx = Context::new("t1");
        let engine = QueryEngine::new(&catalog);
        let req = ListRequest::new(ResourceKind::Os).metadata(vec![MetadataPair::new("a", "b")]);
        let err = store.read(&ctx, |tx| engine.list(tx, &ctx, &req)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_get_rejects_wrong_kind_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let catalog = Catalog::build();
        let ctx = Context::new("t1");
        let engine = QueryEngine::new(&catalog);
        let err = store
            .read(&ctx, |tx| engine.get(tx, &ctx, ResourceKind::Host, "site-0000abcd"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
