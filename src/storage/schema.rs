//! Database schema definitions, generated from the kind descriptors

use crate::kind::ResourceKind;
use crate::schema::descriptor::{descriptor, METADATA_COLUMN};

/// Connection-level settings applied before any statement
pub const PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

/// SQL to create the table for one kind
pub fn create_table(kind: ResourceKind) -> String {
    let desc = descriptor(kind);
    let mut columns = vec![
        "resource_id TEXT PRIMARY KEY".to_string(),
        "tenant_id TEXT NOT NULL".to_string(),
        "created_at INTEGER NOT NULL".to_string(),
        "updated_at INTEGER NOT NULL".to_string(),
    ];

    if desc.has_metadata() {
        columns.push(format!("{} TEXT", METADATA_COLUMN));
    }

    for field in desc.fields {
        columns.push(format!("{} {}", field.name, field.ty.sql_type()));
    }

    for edge in desc.edges {
        if let Some(column) = edge.forward_column() {
            columns.push(format!(
                "{} TEXT REFERENCES {}(resource_id)",
                column,
                edge.target.table()
            ));
        }
    }

    for unique in desc.unique {
        columns.push(format!("UNIQUE({})", unique.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        kind.table(),
        columns.join(",\n    ")
    )
}

/// SQL to create indexes for one kind
pub fn create_indexes(kind: ResourceKind) -> Vec<String> {
    let table = kind.table();
    let mut stmts = vec![format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_tenant ON {table}(tenant_id)"
    )];

    for edge in descriptor(kind).edges {
        if let Some(column) = edge.forward_column() {
            stmts.push(format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})"
            ));
        }
    }
    stmts
}

/// All schema creation statements
pub fn all_schema_statements() -> Vec<String> {
    let mut stmts: Vec<String> = ResourceKind::all().iter().map(|k| create_table(*k)).collect();
    stmts.extend(ResourceKind::all().iter().flat_map(|k| create_indexes(*k)));
    stmts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_table() {
        let sql = create_table(ResourceKind::Host);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS hosts"));
        assert!(sql.contains("metadata TEXT"));
        assert!(sql.contains("site_id TEXT REFERENCES sites(resource_id)"));
        assert!(sql.contains("UNIQUE(tenant_id, uuid)"));
        // reverse edges have no column
        assert!(!sql.contains("instance_id"));
    }

    #[test]
    fn test_non_hierarchical_has_no_metadata() {
        assert!(!create_table(ResourceKind::Os).contains("metadata"));
    }

    #[test]
    fn test_statements_apply_cleanly() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(PRAGMAS).unwrap();
        for stmt in all_schema_statements() {
            conn.execute(&stmt, []).unwrap();
        }
    }
}
