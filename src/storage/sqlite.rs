//! SQLite storage implementation and transaction executor

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::{rows, schema};
use crate::kind::ResourceKind;
use crate::resource::Context;
use crate::transpile::predicate::FOLD_FUNCTION;
use crate::transpile::Predicate;
use crate::Result;

/// SQLite-backed storage for the resource graph.
///
/// Owns the connection and hands transactions to core operations; the
/// operations themselves never begin or end one.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        register_functions(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(schema::PRAGMAS)?;
        for stmt in schema::all_schema_statements() {
            conn.execute(&stmt, [])?;
        }
        Ok(())
    }

    /// Run `f` in a read-only snapshot. The transaction is always rolled back.
    pub fn read<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        ctx.check()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let out = f(&tx);
        tx.rollback()?;
        let out = out?;
        ctx.check()?;
        Ok(out)
    }

    /// Run `f` in a write transaction, committed only if `f` succeeds and
    /// the context has not expired.
    pub fn write<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        ctx.check()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        ctx.check()?;
        tx.commit()?;
        Ok(out)
    }

    /// Row counts per kind for the context's tenant
    pub fn stats(&self, ctx: &Context) -> Result<DbStats> {
        self.read(ctx, |tx| {
            let counts = ResourceKind::all()
                .iter()
                .map(|kind| Ok((*kind, rows::count(tx, *kind, ctx.tenant_id(), &Predicate::True)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(DbStats {
                tenant_id: ctx.tenant_id().to_string(),
                counts,
            })
        })
    }
}

/// Install the scalar functions rendered predicates rely on.
///
/// SQLite's built-in `lower()` only folds ASCII, so containment matching
/// goes through a Unicode-aware fold instead.
pub(crate) fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        FOLD_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|s| s.to_lowercase()))
        },
    )?;
    Ok(())
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub tenant_id: String,
    pub counts: Vec<(ResourceKind, usize)>,
}

impl DbStats {
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics ({}):", self.tenant_id)?;
        for (kind, count) in &self.counts {
            writeln!(f, "  {}: {}", kind, count)?;
        }
        write!(f, "  Total: {}", self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ResourceId;
    use crate::resource::{Fields, Resource};
    use crate::{Error, ErrorKind};
    use std::time::Instant;

    fn provider(tenant: &str, name: &str) -> Resource {
        Resource {
            id: ResourceId::generate(ResourceKind::Provider),
            tenant_id: tenant.into(),
            fields: Fields::from([("name".to_string(), serde_json::json!(name))]),
            metadata: Vec::new(),
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn test_write_commits() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ctx = Context::new("t1");
        let p = provider("t1", "metal");

        store.write(&ctx, |tx| rows::insert(tx, &p)).unwrap();
        let found = store
            .read(&ctx, |tx| rows::fetch(tx, ResourceKind::Provider, "t1", p.id.as_str()))
            .unwrap();
        assert_eq!(found, Some(p));
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ctx = Context::new("t1");
        let p = provider("t1", "metal");

        let result: Result<()> = store.write(&ctx, |tx| {
            rows::insert(tx, &p)?;
            Err(Error::invalid("abort"))
        });
        assert!(result.is_err());
        assert_eq!(store.stats(&ctx).unwrap().total(), 0);
    }

    #[test]
    fn test_expired_context_is_cancelled() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ctx = Context::new("t1").with_deadline(Instant::now() - Duration::from_millis(1));
        let err = store.write(&ctx, |_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_stats_are_tenant_scoped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let t1 = Context::new("t1");
        let t2 = Context::new("t2");
        store.write(&t1, |tx| rows::insert(tx, &provider("t1", "a"))).unwrap();
        store.write(&t2, |tx| rows::insert(tx, &provider("t2", "a"))).unwrap();
        store.write(&t2, |tx| rows::insert(tx, &provider("t2", "b"))).unwrap();

        assert_eq!(store.stats(&t1).unwrap().total(), 1);
        assert_eq!(store.stats(&t2).unwrap().total(), 2);
    }

    #[test]
    fn test_fold_is_unicode_aware() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.conn.lock();
        let folded: String = conn
            .query_row(&format!("SELECT {}('ÉCOLE Straße')", FOLD_FUNCTION), [], |row| row.get(0))
            .unwrap();
        assert_eq!(folded, "école straße");
        let null: Option<String> = conn
            .query_row(&format!("SELECT {}(NULL)", FOLD_FUNCTION), [], |row| row.get(0))
            .unwrap();
        assert_eq!(null, None);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.db");
        let ctx = Context::new("t1");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.write(&ctx, |tx| rows::insert(tx, &provider("t1", "a"))).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.stats(&ctx).unwrap().total(), 1);
    }
}
