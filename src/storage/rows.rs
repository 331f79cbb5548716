//! Row-level operations on resource tables.
//!
//! Every function takes the caller's transaction and a tenant; none of
//! them begins or ends a transaction.

use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Row, Transaction};
use serde_json::Value;

use crate::kind::{ResourceId, ResourceKind};
use crate::metadata::MetadataPair;
use crate::resource::{Fields, Resource};
use crate::schema::descriptor::{descriptor, FieldType, METADATA_COLUMN};
use crate::transpile::predicate::{Predicate, ROOT_ALIAS};
use crate::{Error, Result};

/// A writable column and the key it is exposed under in `Resource::fields`
#[derive(Debug, Clone, Copy)]
struct DataColumn {
    key: &'static str,
    column: &'static str,
    /// `None` for forward edges, which hold a resource ID
    ty: Option<FieldType>,
}

fn data_columns(kind: ResourceKind) -> Vec<DataColumn> {
    let desc = descriptor(kind);
    let fields = desc.fields.iter().map(|f| DataColumn {
        key: f.name,
        column: f.name,
        ty: Some(f.ty),
    });
    let edges = desc.edges.iter().filter_map(|e| {
        e.forward_column().map(|column| DataColumn {
            key: e.name,
            column,
            ty: None,
        })
    });
    fields.chain(edges).collect()
}

fn select_columns(kind: ResourceKind) -> String {
    let mut cols = vec!["resource_id", "tenant_id", "created_at", "updated_at"];
    if kind.is_hierarchical() {
        cols.push(METADATA_COLUMN);
    }
    cols.extend(data_columns(kind).iter().map(|c| c.column));
    cols.iter()
        .map(|c| format!("{}.{}", ROOT_ALIAS, c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Current unix time in seconds
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Convert a payload value to its column representation
pub fn to_sql_value(name: &str, ty: Option<FieldType>, value: &Value) -> Result<SqlValue> {
    let mismatch = || {
        Error::invalid(format!(
            "field '{}' expects {}, got {}",
            name,
            ty.map_or("a resource id", |t| t.name()),
            value
        ))
    };

    let converted = match (ty, value) {
        (_, Value::Null) => SqlValue::Null,
        (None, Value::String(id)) => SqlValue::Text(id.clone()),
        (Some(FieldType::String), Value::String(s)) => SqlValue::Text(s.clone()),
        (Some(FieldType::Enum(e)), Value::String(s)) => {
            if !e.contains(s) {
                return Err(Error::invalid(format!(
                    "'{}' is not a value of enum {}",
                    s,
                    e.name()
                )));
            }
            SqlValue::Text(s.clone())
        }
        (Some(FieldType::Int), Value::Number(n)) => {
            SqlValue::Integer(n.as_i64().ok_or_else(mismatch)?)
        }
        (Some(FieldType::Bool), Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        _ => return Err(mismatch()),
    };
    Ok(converted)
}

fn from_sql_value(ty: Option<FieldType>, value: SqlValue) -> Option<Value> {
    match (ty, value) {
        (_, SqlValue::Null) => None,
        (Some(FieldType::Bool), SqlValue::Integer(i)) => Some(Value::Bool(i != 0)),
        (_, SqlValue::Integer(i)) => Some(Value::from(i)),
        (_, SqlValue::Text(s)) => Some(Value::String(s)),
        (_, SqlValue::Real(f)) => Some(Value::from(f)),
        (_, SqlValue::Blob(_)) => None,
    }
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

/// Helper to convert a row to a Resource
fn row_to_resource(kind: ResourceKind, row: &Row) -> rusqlite::Result<Resource> {
    let id_str: String = row.get(0)?;
    let id = ResourceId::parse_for(kind, &id_str).map_err(|e| conversion_error(0, e))?;

    let mut idx = 4;
    let metadata = if kind.is_hierarchical() {
        let raw: Option<String> = row.get(idx)?;
        idx += 1;
        match raw {
            Some(json) => serde_json::from_str::<Vec<MetadataPair>>(&json)
                .map_err(|e| conversion_error(idx - 1, e))?,
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    let mut fields = Fields::new();
    for col in data_columns(kind) {
        let raw: SqlValue = row.get(idx)?;
        if let Some(value) = from_sql_value(col.ty, raw) {
            fields.insert(col.key.to_string(), value);
        }
        idx += 1;
    }

    Ok(Resource {
        id,
        tenant_id: row.get(1)?,
        fields,
        metadata,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Bind values for the data columns of a resource, in column order
fn bind_values(resource: &Resource) -> Result<Vec<SqlValue>> {
    let mut values = Vec::new();
    if resource.kind().is_hierarchical() {
        values.push(SqlValue::Text(serde_json::to_string(&resource.metadata)?));
    }
    for col in data_columns(resource.kind()) {
        let value = resource.fields.get(col.key).unwrap_or(&Value::Null);
        values.push(to_sql_value(col.key, col.ty, value)?);
    }
    Ok(values)
}

fn writable_columns(kind: ResourceKind) -> Vec<&'static str> {
    let mut cols = Vec::new();
    if kind.is_hierarchical() {
        cols.push(METADATA_COLUMN);
    }
    cols.extend(data_columns(kind).iter().map(|c| c.column));
    cols
}

/// Insert a new resource row
pub fn insert(tx: &Transaction, resource: &Resource) -> Result<()> {
    let kind = resource.kind();
    let cols = writable_columns(kind);
    let placeholders = vec!["?"; cols.len() + 4].join(", ");
    let sql = format!(
        "INSERT INTO {} (resource_id, tenant_id, created_at, updated_at{}{}) VALUES ({})",
        kind.table(),
        if cols.is_empty() { "" } else { ", " },
        cols.join(", "),
        placeholders
    );

    let mut values = vec![
        SqlValue::Text(resource.id.to_string()),
        SqlValue::Text(resource.tenant_id.clone()),
        SqlValue::Integer(resource.created_at),
        SqlValue::Integer(resource.updated_at),
    ];
    values.extend(bind_values(resource)?);

    tx.execute(&sql, params_from_iter(values))?;
    Ok(())
}

/// Overwrite every writable column of an existing row
pub fn update(tx: &Transaction, resource: &Resource) -> Result<()> {
    let kind = resource.kind();
    let mut assignments: Vec<String> = writable_columns(kind)
        .iter()
        .map(|c| format!("{} = ?", c))
        .collect();
    assignments.push("updated_at = ?".to_string());

    let sql = format!(
        "UPDATE {} SET {} WHERE resource_id = ? AND tenant_id = ?",
        kind.table(),
        assignments.join(", ")
    );

    let mut values = bind_values(resource)?;
    values.push(SqlValue::Integer(resource.updated_at));
    values.push(SqlValue::Text(resource.id.to_string()));
    values.push(SqlValue::Text(resource.tenant_id.clone()));

    let changed = tx.execute(&sql, params_from_iter(values))?;
    if changed == 0 {
        return Err(Error::NotFound(format!("{} not found", resource.id)));
    }
    Ok(())
}

/// Remove a row. Returns false if it did not exist.
pub fn delete(tx: &Transaction, kind: ResourceKind, tenant_id: &str, id: &str) -> Result<bool> {
    let sql = format!(
        "DELETE FROM {} WHERE resource_id = ?1 AND tenant_id = ?2",
        kind.table()
    );
    Ok(tx.execute(&sql, params![id, tenant_id])? > 0)
}

/// Get a resource by ID
pub fn fetch(tx: &Transaction, kind: ResourceKind, tenant_id: &str, id: &str) -> Result<Option<Resource>> {
    let sql = format!(
        "SELECT {} FROM {} {} WHERE {alias}.resource_id = ?1 AND {alias}.tenant_id = ?2",
        select_columns(kind),
        kind.table(),
        ROOT_ALIAS,
        alias = ROOT_ALIAS
    );
    tx.query_row(&sql, params![id, tenant_id], |row| row_to_resource(kind, row))
        .optional()
        .map_err(Into::into)
}

/// Get a resource by ID, failing with NotFound if absent
pub fn require(tx: &Transaction, kind: ResourceKind, tenant_id: &str, id: &str) -> Result<Resource> {
    fetch(tx, kind, tenant_id, id)?
        .ok_or_else(|| Error::NotFound(format!("{} {} not found", kind, id)))
}

/// Every resource of a kind in a tenant, ordered by ID
pub fn fetch_all(tx: &Transaction, kind: ResourceKind, tenant_id: &str) -> Result<Vec<Resource>> {
    select(tx, kind, tenant_id, &Predicate::True, "", Window::ALL)
}

pub fn exists(tx: &Transaction, kind: ResourceKind, tenant_id: &str, id: &str) -> Result<bool> {
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE resource_id = ?1 AND tenant_id = ?2)",
        kind.table()
    );
    Ok(tx.query_row(&sql, params![id, tenant_id], |row| row.get(0))?)
}

/// Offset/limit applied in SQL. A limit of 0 means no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

impl Window {
    pub const ALL: Window = Window { offset: 0, limit: 0 };

    fn sql(&self) -> String {
        let limit = match self.limit {
            0 => -1,
            n => i64::try_from(n).unwrap_or(i64::MAX),
        };
        let offset = i64::try_from(self.offset).unwrap_or(i64::MAX);
        format!("LIMIT {} OFFSET {}", limit, offset)
    }
}

fn where_clause(tenant_id: &str, predicate: &Predicate) -> (String, Vec<SqlValue>) {
    let fragment = predicate.to_sql();
    let mut params = vec![SqlValue::Text(tenant_id.to_string())];
    params.extend(fragment.params);
    (
        format!("WHERE {}.tenant_id = ? AND {}", ROOT_ALIAS, fragment.sql),
        params,
    )
}

fn order_clause(order_by: &str) -> String {
    let tiebreak = format!("{}.resource_id ASC", ROOT_ALIAS);
    if order_by.is_empty() {
        format!("ORDER BY {}", tiebreak)
    } else {
        format!("ORDER BY {}, {}", order_by, tiebreak)
    }
}

/// Resources matching a predicate.
///
/// `order_by` is a pre-validated list of `<alias>.<column> ASC|DESC` terms;
/// `resource_id ASC` is always appended as a tiebreaker.
pub fn select(
    tx: &Transaction,
    kind: ResourceKind,
    tenant_id: &str,
    predicate: &Predicate,
    order_by: &str,
    window: Window,
) -> Result<Vec<Resource>> {
    let (filter, params) = where_clause(tenant_id, predicate);
    let sql = format!(
        "SELECT {} FROM {} {} {} {} {}",
        select_columns(kind),
        kind.table(),
        ROOT_ALIAS,
        filter,
        order_clause(order_by),
        window.sql()
    );
    tracing::debug!(%kind, sql = %sql, "select resources");

    let mut stmt = tx.prepare(&sql)?;
    let resources = stmt
        .query_map(params_from_iter(params), |row| row_to_resource(kind, row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(resources)
}

/// IDs of resources matching a predicate
pub fn select_ids(
    tx: &Transaction,
    kind: ResourceKind,
    tenant_id: &str,
    predicate: &Predicate,
    order_by: &str,
    window: Window,
) -> Result<Vec<ResourceId>> {
    let (filter, params) = where_clause(tenant_id, predicate);
    let sql = format!(
        "SELECT {alias}.resource_id FROM {} {alias} {} {} {}",
        kind.table(),
        filter,
        order_clause(order_by),
        window.sql(),
        alias = ROOT_ALIAS
    );
    tracing::debug!(%kind, sql = %sql, "select resource ids");

    let mut stmt = tx.prepare(&sql)?;
    let ids = stmt
        .query_map(params_from_iter(params), |row| {
            let id: String = row.get(0)?;
            ResourceId::parse_for(kind, &id).map_err(|e| conversion_error(0, e))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Count resources matching a predicate
pub fn count(tx: &Transaction, kind: ResourceKind, tenant_id: &str, predicate: &Predicate) -> Result<usize> {
    let (filter, params) = where_clause(tenant_id, predicate);
    let sql = format!(
        "SELECT COUNT(*) FROM {} {} {}",
        kind.table(),
        ROOT_ALIAS,
        filter
    );
    let count: i64 = tx.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
    Ok(count as usize)
}

/// Rows of `owner` whose `column` references `id`
pub fn count_referencing(
    tx: &Transaction,
    owner: ResourceKind,
    column: &str,
    tenant_id: &str,
    id: &str,
) -> Result<usize> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND tenant_id = ?2",
        owner.table(),
        column
    );
    let count: i64 = tx.query_row(&sql, params![id, tenant_id], |row| row.get(0))?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema;
    use rusqlite::Connection;
    use serde_json::json;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::storage::sqlite::register_functions(&conn).unwrap();
        conn.execute_batch(schema::PRAGMAS).unwrap();
        for stmt in schema::all_schema_statements() {
            conn.execute(&stmt, []).unwrap();
        }
        conn
    }

    fn host(name: &str) -> Resource {
        Resource {
            id: ResourceId::generate(ResourceKind::Host),
            tenant_id: "t1".into(),
            fields: Fields::from([
                ("name".to_string(), json!(name)),
                ("bmc_enabled".to_string(), json!(true)),
                ("memory_bytes".to_string(), json!(4096)),
            ]),
            metadata: vec![MetadataPair::new("env", "prod")],
            created_at: 10,
            updated_at: 10,
        }
    }

    #[test]
    fn test_insert_and_fetch() {
        let mut conn = conn();
        let tx = conn.transaction().unwrap();
        let h = host("edge-1");
        insert(&tx, &h).unwrap();

        let fetched = fetch(&tx, ResourceKind::Host, "t1", h.id.as_str()).unwrap().unwrap();
        assert_eq!(fetched, h);
        assert!(fetch(&tx, ResourceKind::Host, "t2", h.id.as_str()).unwrap().is_none());
    }

    #[test]
    fn test_update_and_delete() {
        let mut conn = conn();
        let tx = conn.transaction().unwrap();
        let mut h = host("edge-1");
        insert(&tx, &h).unwrap();

        h.fields.remove("memory_bytes");
        h.updated_at = 20;
        update(&tx, &h).unwrap();
        let fetched = require(&tx, ResourceKind::Host, "t1", h.id.as_str()).unwrap();
        assert!(fetched.field("memory_bytes").is_none());
        assert_eq!(fetched.updated_at, 20);

        assert!(delete(&tx, ResourceKind::Host, "t1", h.id.as_str()).unwrap());
        assert!(!exists(&tx, ResourceKind::Host, "t1", h.id.as_str()).unwrap());
    }

    #[test]
    fn test_select_with_window() {
        let mut conn = conn();
        let tx = conn.transaction().unwrap();
        for i in 0..5 {
            insert(&tx, &host(&format!("h{}", i))).unwrap();
        }

        let page = select(
            &tx,
            ResourceKind::Host,
            "t1",
            &Predicate::True,
            "t0.name DESC",
            Window { offset: 1, limit: 2 },
        )
        .unwrap();
        let names: Vec<_> = page.iter().map(|r| r.str_field("name").unwrap()).collect();
        assert_eq!(names, vec!["h3", "h2"]);
        assert_eq!(count(&tx, ResourceKind::Host, "t1", &Predicate::True).unwrap(), 5);
        assert_eq!(
            select_ids(&tx, ResourceKind::Host, "t1", &Predicate::True, "", Window::ALL)
                .unwrap()
                .len(),
            5
        );
    }

    #[test]
    fn test_window_past_the_end_is_empty() {
        let mut conn = conn();
        let tx = conn.transaction().unwrap();
        insert(&tx, &host("h0")).unwrap();

        let far = Window {
            offset: usize::MAX,
            limit: usize::MAX,
        };
        assert_eq!(far.sql(), format!("LIMIT {} OFFSET {}", i64::MAX, i64::MAX));
        let page = select(&tx, ResourceKind::Host, "t1", &Predicate::True, "", far).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn test_value_conversion_rejects_mismatch() {
        assert!(to_sql_value("name", Some(FieldType::String), &json!(1)).is_err());
        assert!(to_sql_value("memory_bytes", Some(FieldType::Int), &json!(1.5)).is_err());
        assert_eq!(
            to_sql_value("bmc_enabled", Some(FieldType::Bool), &json!(false)).unwrap(),
            SqlValue::Integer(0)
        );
    }

    #[test]
    fn test_foreign_key_violation_is_failed_precondition() {
        let mut conn = conn();
        let tx = conn.transaction().unwrap();
        let mut h = host("edge-1");
        h.fields.insert("site".into(), json!("site-00000000"));
        let err = insert(&tx, &h).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::FailedPrecondition);
    }
}
