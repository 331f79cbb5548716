//! Create, update and delete.
//!
//! Every operation runs inside the caller's write transaction: edge
//! lookups, lifecycle checks, the row write and the re-fetch for the
//! response either all take effect or none do.

use std::collections::BTreeMap;

use rusqlite::Transaction;
use serde::Serialize;
use serde_json::Value;

use crate::filter::canonical_segment;
use crate::kind::{ResourceId, ResourceKind};
use crate::lifecycle::{self, CURRENT_STATE, DESIRED_STATE};
use crate::metadata::{self, Hierarchy, MetadataPair};
use crate::query::QueryEngine;
use crate::resource::{Context, Draft, Fields, Resource, ResourceView};
use crate::schema::descriptor::{descriptor, EdgeDescriptor, EdgeLink, FieldDescriptor, METADATA_COLUMN};
use crate::schema::Catalog;
use crate::storage::rows;
use crate::{Error, Result};

/// Result of an update
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Updated(ResourceView),
    /// Both lifecycle states reached DELETED and the row was removed
    HardDeleted { resource_id: ResourceId },
}

/// Result of a delete
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// Desired state set to DELETED, row kept for reconciliation
    SoftDeleted(ResourceView),
    HardDeleted { resource_id: ResourceId },
}

/// A writable key of a kind
#[derive(Debug, Clone, Copy)]
enum Target {
    Field(&'static FieldDescriptor),
    Edge(&'static EdgeDescriptor),
    Metadata,
}

impl Target {
    fn key(&self) -> &'static str {
        match self {
            Target::Field(f) => f.name,
            Target::Edge(e) => e.name,
            Target::Metadata => METADATA_COLUMN,
        }
    }
}

/// Resolve a payload or field-mask key in either casing
fn resolve_key(kind: ResourceKind, raw: &str) -> Result<Target> {
    let key = canonical_segment(raw);
    let desc = descriptor(kind);

    if key == METADATA_COLUMN {
        return if desc.has_metadata() {
            Ok(Target::Metadata)
        } else {
            Err(Error::invalid(format!("{} does not carry metadata", kind)))
        };
    }

    if let Some(field) = desc.column(&key) {
        if field.system {
            return Err(Error::invalid(format!(
                "'{}' is managed by the system and cannot be written",
                field.name
            )));
        }
        return Ok(Target::Field(field));
    }

    match desc.edge(&key) {
        Some(edge) if matches!(edge.link, EdgeLink::Forward { .. }) => Ok(Target::Edge(edge)),
        Some(edge) => Err(Error::invalid(format!(
            "relationship '{}' of {} is a back-reference and cannot be written",
            edge.name, kind
        ))),
        None => Err(Error::invalid(format!("unknown field '{}' for {}", raw, kind))),
    }
}

/// Payload fields keyed by canonical name
fn canonical_fields(kind: ResourceKind, fields: Fields) -> Result<BTreeMap<&'static str, (Target, Value)>> {
    let mut out = BTreeMap::new();
    for (raw, value) in fields {
        let target = resolve_key(kind, &raw)?;
        if out.insert(target.key(), (target, value)).is_some() {
            return Err(Error::invalid(format!(
                "field '{}' given more than once",
                target.key()
            )));
        }
    }
    Ok(out)
}

/// Performs mutations against a catalog
pub struct Mutator<'a> {
    catalog: &'a Catalog,
}

impl<'a> Mutator<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    fn view(&self, tx: &Transaction, ctx: &Context, id: &ResourceId) -> Result<ResourceView> {
        QueryEngine::new(self.catalog).get(tx, ctx, id.kind(), id.as_str())
    }

    /// Write one field or edge value into a resource
    fn apply(
        &self,
        tx: &Transaction,
        ctx: &Context,
        resource: &mut Resource,
        target: Target,
        value: Option<Value>,
    ) -> Result<()> {
        let value = value.filter(|v| !v.is_null());
        match target {
            Target::Field(field) => {
                if field.privileged && !ctx.role().is_privileged() {
                    return Err(Error::PermissionDenied(format!(
                        "only a privileged caller may set '{}' on {}",
                        field.name,
                        resource.kind()
                    )));
                }
                match value {
                    Some(v) => {
                        rows::to_sql_value(field.name, Some(field.ty), &v)?;
                        resource.fields.insert(field.name.to_string(), v);
                    }
                    None => {
                        resource.fields.remove(field.name);
                    }
                }
            }
            Target::Edge(edge) => match value {
                Some(Value::String(raw)) => {
                    let id = ResourceId::parse(&raw)?;
                    if id.kind() != edge.target {
                        return Err(Error::invalid(format!(
                            "relationship '{}' expects a {} id, got {}",
                            edge.name, edge.target, id
                        )));
                    }
                    if !rows::exists(tx, edge.target, ctx.tenant_id(), id.as_str())? {
                        return Err(Error::NotFound(format!(
                            "{} {} referenced by '{}' not found",
                            edge.target, id, edge.name
                        )));
                    }
                    resource.fields.insert(edge.name.to_string(), Value::String(raw));
                }
                Some(other) => {
                    return Err(Error::invalid(format!(
                        "relationship '{}' expects a resource id, got {}",
                        edge.name, other
                    )));
                }
                None => {
                    resource.fields.remove(edge.name);
                }
            },
            Target::Metadata => {
                let pairs: Vec<MetadataPair> = match value {
                    Some(v) => serde_json::from_value(v)
                        .map_err(|e| Error::invalid(format!("malformed metadata: {}", e)))?,
                    None => Vec::new(),
                };
                metadata::validate(&pairs)?;
                resource.metadata = pairs;
            }
        }
        Ok(())
    }

    /// Create a resource. The ID is assigned here.
    pub fn create(&self, tx: &Transaction, ctx: &Context, kind: ResourceKind, draft: Draft) -> Result<ResourceView> {
        let now = rows::now();
        let mut resource = Resource {
            id: ResourceId::generate(kind),
            tenant_id: ctx.tenant_id().to_string(),
            fields: Fields::new(),
            metadata: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        if let Some(pairs) = draft.metadata {
            let pairs = serde_json::to_value(pairs)?;
            self.apply(tx, ctx, &mut resource, resolve_key(kind, METADATA_COLUMN)?, Some(pairs))?;
        }
        for (target, value) in canonical_fields(kind, draft.fields)?.into_values() {
            self.apply(tx, ctx, &mut resource, target, Some(value))?;
        }

        if kind.is_stateful() {
            let unspecified = lifecycle::unspecified_value(kind)?;
            if let Some(desired) = resource.str_field(DESIRED_STATE) {
                lifecycle::check_transition(kind, None, desired)?;
            }
            for state in [DESIRED_STATE, CURRENT_STATE] {
                resource
                    .fields
                    .entry(state.to_string())
                    .or_insert_with(|| Value::String(unspecified.to_string()));
            }
        }

        rows::insert(tx, &resource)?;
        tracing::info!(%kind, id = %resource.id, tenant = ctx.tenant_id(), "created resource");
        self.view(tx, ctx, &resource.id)
    }

    /// Update the masked fields of a resource.
    ///
    /// Masked keys absent from the payload are cleared. When the update
    /// moves the current state to DELETED while the desired state is
    /// DELETED the row is hard-deleted instead.
    pub fn update(
        &self,
        tx: &Transaction,
        ctx: &Context,
        kind: ResourceKind,
        id: &str,
        field_mask: &[String],
        draft: Draft,
    ) -> Result<UpdateOutcome> {
        if field_mask.is_empty() {
            return Err(Error::invalid("update requires a non-empty field mask"));
        }
        let id = ResourceId::parse_for(kind, id)?;
        let mut mask = Vec::new();
        for entry in field_mask {
            let target = resolve_key(kind, entry)?;
            if !mask.iter().any(|t: &Target| t.key() == target.key()) {
                mask.push(target);
            }
        }

        let existing = rows::require(tx, kind, ctx.tenant_id(), id.as_str())?;
        let mut payload = canonical_fields(kind, draft.fields)?;
        let mut metadata = draft.metadata;
        let mut resource = existing.clone();

        for target in &mask {
            let value = match target {
                Target::Metadata => metadata.take().map(serde_json::to_value).transpose()?,
                _ => payload.remove(target.key()).map(|(_, v)| v),
            };
            self.apply(tx, ctx, &mut resource, *target, value)?;
        }

        let masked = |key: &str| mask.iter().any(|t| t.key() == key);

        if kind.is_stateful() {
            let unspecified = lifecycle::unspecified_value(kind)?;
            for state in [DESIRED_STATE, CURRENT_STATE] {
                resource
                    .fields
                    .entry(state.to_string())
                    .or_insert_with(|| Value::String(unspecified.to_string()));
            }
            if masked(DESIRED_STATE) {
                if let Some(desired) = resource.str_field(DESIRED_STATE) {
                    lifecycle::check_transition(kind, existing.str_field(CURRENT_STATE), desired)?;
                }
            }
            if masked(CURRENT_STATE)
                && lifecycle::is_hard_delete(
                    kind,
                    resource.str_field(DESIRED_STATE),
                    resource.str_field(CURRENT_STATE),
                )?
            {
                self.hard_delete(tx, ctx, &id)?;
                return Ok(UpdateOutcome::HardDeleted { resource_id: id });
            }
        }

        self.check_hierarchy(tx, ctx, &resource, &mask)?;

        resource.updated_at = rows::now().max(existing.updated_at);
        rows::update(tx, &resource)?;
        tracing::info!(%kind, %id, tenant = ctx.tenant_id(), fields = mask.len(), "updated resource");
        Ok(UpdateOutcome::Updated(self.view(tx, ctx, &id)?))
    }

    /// Delete a resource. Stateful kinds are soft-deleted unless their
    /// current state is already DELETED.
    pub fn delete(&self, tx: &Transaction, ctx: &Context, kind: ResourceKind, id: &str) -> Result<DeleteOutcome> {
        let id = ResourceId::parse_for(kind, id)?;
        let mut resource = rows::require(tx, kind, ctx.tenant_id(), id.as_str())?;

        if kind.is_stateful() {
            let deleted = lifecycle::deleted_value(kind)?;
            if resource.str_field(CURRENT_STATE) != Some(deleted) {
                resource
                    .fields
                    .insert(DESIRED_STATE.to_string(), Value::String(deleted.to_string()));
                resource.updated_at = rows::now().max(resource.updated_at);
                rows::update(tx, &resource)?;
                tracing::info!(%kind, %id, tenant = ctx.tenant_id(), "soft-deleted resource");
                return Ok(DeleteOutcome::SoftDeleted(self.view(tx, ctx, &id)?));
            }
        }

        self.hard_delete(tx, ctx, &id)?;
        Ok(DeleteOutcome::HardDeleted { resource_id: id })
    }

    /// Remove the row unless something still references it
    fn hard_delete(&self, tx: &Transaction, ctx: &Context, id: &ResourceId) -> Result<()> {
        let kind = id.kind();
        for (owner, column) in descriptor(kind).dependents() {
            let refs = rows::count_referencing(tx, owner, column, ctx.tenant_id(), id.as_str())?;
            if refs > 0 {
                return Err(Error::FailedPrecondition(format!(
                    "{} {} is still referenced by {} {} row(s) via {}",
                    kind, id, refs, owner, column
                )));
            }
        }

        if !rows::delete(tx, kind, ctx.tenant_id(), id.as_str())? {
            return Err(Error::NotFound(format!("{} {} not found", kind, id)));
        }
        tracing::info!(%kind, %id, tenant = ctx.tenant_id(), "hard-deleted resource");
        Ok(())
    }

    /// Reject parent edges that would make a region or OU its own ancestor
    fn check_hierarchy(&self, tx: &Transaction, ctx: &Context, resource: &Resource, mask: &[Target]) -> Result<()> {
        let edge = match resource.kind() {
            ResourceKind::Region => "parent_region",
            ResourceKind::Ou => "parent_ou",
            _ => return Ok(()),
        };
        if !mask.iter().any(|t| t.key() == edge) {
            return Ok(());
        }
        let Some(parent) = resource.edge_target(edge) else {
            return Ok(());
        };

        let hierarchy = Hierarchy::load(tx, ctx.tenant_id())?;
        if hierarchy.creates_cycle(resource.kind(), resource.id.as_str(), parent)? {
            return Err(Error::invalid(format!(
                "setting {} of {} to {} would create a cycle",
                edge, resource.id, parent
            )));
        }
        Ok(())
    }
}
