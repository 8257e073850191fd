//! SQLite reflection via catalog pragmas

use super::{
    connect_error, introspection_error, CheckConstraint, Column, ConnectionDescriptor, Dialect,
    ForeignKey, Index, Reflector, UniqueConstraint,
};
use crate::config::SourceConfig;
use crate::error::Result;
use async_trait::async_trait;
use regex::Regex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

pub struct SqliteReflector {
    pool: SqlitePool,
    database_name: String,
}

impl SqliteReflector {
    /// Open the database file read-only
    pub async fn connect(descriptor: &ConnectionDescriptor, source: &SourceConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&descriptor.database)
            .read_only(true)
            .create_if_missing(false);

        debug!("Opening SQLite database at {}", descriptor.database);

        let pool = SqlitePoolOptions::new()
            .max_connections(source.max_connections)
            .acquire_timeout(Duration::from_secs(source.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(connect_error)?;

        Ok(Self::from_pool(pool, descriptor.database_name()))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: SqlitePool, database_name: impl Into<String>) -> Self {
        Self {
            pool,
            database_name: database_name.into(),
        }
    }

    async fn object_names(&self, kind: &str) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = ? AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;
        Ok(names)
    }

    async fn object_sql(&self, name: &str) -> Result<Option<String>> {
        let sql: Option<Option<String>> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(introspection_error)?;
        Ok(sql.flatten())
    }

    async fn index_columns(&self, index: &str) -> Result<Vec<String>> {
        let columns: Vec<Option<String>> =
            sqlx::query_scalar("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
                .bind(index)
                .fetch_all(&self.pool)
                .await
                .map_err(introspection_error)?;
        // Expression index members have no column name
        Ok(columns.into_iter().flatten().collect())
    }

    /// (name, unique, origin) for every index on a table
    async fn index_list(&self, table: &str) -> Result<Vec<(String, bool, String)>> {
        let rows: Vec<(String, i64, String)> = sqlx::query_as(
            r#"SELECT name, "unique", origin FROM pragma_index_list(?) ORDER BY name"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;
        Ok(rows
            .into_iter()
            .map(|(name, unique, origin)| (name, unique != 0, origin))
            .collect())
    }
}

#[async_trait]
impl Reflector for SqliteReflector {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn database_name(&self) -> &str {
        &self.database_name
    }

    async fn schema_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_database_list ORDER BY seq")
                .fetch_all(&self.pool)
                .await
                .map_err(introspection_error)?;
        Ok(names)
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        self.object_names("table").await
    }

    async fn view_names(&self) -> Result<Vec<String>> {
        self.object_names("view").await
    }

    async fn columns(&self, relation: &str) -> Result<Vec<Column>> {
        let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"SELECT name, "type", "notnull", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid"#,
        )
        .bind(relation)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;

        let pk_count = rows.iter().filter(|(.., pk)| *pk > 0).count();
        let ddl = self.object_sql(relation).await?.unwrap_or_default();
        let declares_autoincrement = ddl.to_uppercase().contains("AUTOINCREMENT");

        Ok(rows
            .into_iter()
            .map(|(name, data_type, notnull, default, pk)| {
                // A lone INTEGER PRIMARY KEY aliases the rowid and is assigned automatically
                let rowid_alias = pk > 0 && pk_count == 1 && data_type.eq_ignore_ascii_case("INTEGER");
                Column {
                    name,
                    data_type: data_type.to_uppercase(),
                    nullable: notnull == 0 && pk == 0,
                    default,
                    autoincrement: rowid_alias || (pk > 0 && declares_autoincrement),
                    comment: None,
                }
            })
            .collect())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk")
                .bind(table)
                .fetch_all(&self.pool)
                .await
                .map_err(introspection_error)?;
        Ok(names)
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(i64, String, String, Option<String>)> = sqlx::query_as(
            r#"SELECT id, "table", "from", "to" FROM pragma_foreign_key_list(?) ORDER BY id, seq"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;

        let mut grouped: BTreeMap<i64, (String, Vec<String>, Vec<Option<String>>)> =
            BTreeMap::new();
        for (id, referred, from, to) in rows {
            let entry = grouped
                .entry(id)
                .or_insert_with(|| (referred, Vec::new(), Vec::new()));
            entry.1.push(from);
            entry.2.push(to);
        }

        let mut keys = Vec::with_capacity(grouped.len());
        for (_, (referred_table, columns, targets)) in grouped {
            // A NULL target means the referenced table's primary key
            let referred_columns = if targets.iter().all(Option::is_some) {
                targets.into_iter().flatten().collect()
            } else {
                self.primary_key(&referred_table).await?
            };
            keys.push(ForeignKey {
                name: None,
                columns,
                referred_table,
                referred_columns,
            });
        }

        Ok(keys)
    }

    async fn indexes(&self, table: &str) -> Result<Vec<Index>> {
        let mut indexes = Vec::new();
        for (name, unique, origin) in self.index_list(table).await? {
            if origin != "c" {
                continue;
            }
            let columns = self.index_columns(&name).await?;
            indexes.push(Index {
                name,
                columns,
                unique,
            });
        }
        Ok(indexes)
    }

    async fn unique_constraints(&self, table: &str) -> Result<Vec<UniqueConstraint>> {
        let mut constraints = Vec::new();
        for (name, _, origin) in self.index_list(table).await? {
            if origin != "u" {
                continue;
            }
            let columns = self.index_columns(&name).await?;
            // Auto-generated names (sqlite_autoindex_*) are not real constraint names
            let name = (!name.starts_with("sqlite_autoindex_")).then_some(name);
            constraints.push(UniqueConstraint { name, columns });
        }
        Ok(constraints)
    }

    async fn check_constraints(&self, table: &str) -> Result<Vec<CheckConstraint>> {
        let ddl = self.object_sql(table).await?.unwrap_or_default();
        Ok(parse_check_constraints(&ddl))
    }

    async fn view_definition(&self, view: &str) -> Result<Option<String>> {
        self.object_sql(view).await
    }
}

fn check_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)(?:CONSTRAINT\s+("[^"]+"|`[^`]+`|\[[^\]]+\]|\w+)\s+)?CHECK\s*\("#)
            .unwrap_or_else(|e| panic!("invalid check constraint pattern: {e}"))
    })
}

/// Extract CHECK constraints from a CREATE TABLE statement
fn parse_check_constraints(ddl: &str) -> Vec<CheckConstraint> {
    let mut constraints = Vec::new();

    for caps in check_pattern().captures_iter(ddl) {
        let Some(whole) = caps.get(0) else { continue };
        let body_start = whole.end();

        let mut depth = 1usize;
        let mut body_end = None;
        for (offset, ch) in ddl[body_start..].char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        body_end = Some(body_start + offset);
                        break;
                    }
                }
                _ => {}
            }
        }

        if let Some(end) = body_end {
            let name = caps.get(1).map(|m| {
                m.as_str()
                    .trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
                    .to_string()
            });
            constraints.push(CheckConstraint {
                name,
                sqltext: ddl[body_start..end].trim().to_string(),
            });
        }
    }

    constraints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::reflect_schema;
    use tempfile::TempDir;

    async fn fixture_pool(statements: &[&str]) -> (SqlitePool, TempDir) {
        let tmp = TempDir::new().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(tmp.path().join("shop.db"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        for statement in statements {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
        (pool, tmp)
    }

    #[test]
    fn test_parse_check_constraints() {
        let ddl = r#"CREATE TABLE products (
            id INTEGER PRIMARY KEY,
            price REAL CHECK (price >= 0),
            qty INTEGER,
            CONSTRAINT qty_range CHECK (qty BETWEEN 0 AND (100 * 10))
        )"#;

        let checks = parse_check_constraints(ddl);
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].name, None);
        assert_eq!(checks[0].sqltext, "price >= 0");
        assert_eq!(checks[1].name.as_deref(), Some("qty_range"));
        assert_eq!(checks[1].sqltext, "qty BETWEEN 0 AND (100 * 10)");
    }

    #[tokio::test]
    async fn test_reflect_full_schema() {
        let (pool, _tmp) = fixture_pool(&[
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, email TEXT NOT NULL UNIQUE, tier TEXT DEFAULT 'basic')",
            "CREATE TABLE orders (id INTEGER PRIMARY KEY AUTOINCREMENT, customer_id INTEGER NOT NULL REFERENCES customers(id), total REAL CHECK (total >= 0))",
            "CREATE INDEX idx_orders_customer ON orders(customer_id)",
            "CREATE VIEW big_orders AS SELECT id, total FROM orders WHERE total > 100",
        ])
        .await;

        let reflector = SqliteReflector::from_pool(pool, "shop");
        let snapshot = reflect_schema(&reflector).await.unwrap();

        assert_eq!(snapshot.database_name, "shop");
        assert_eq!(snapshot.dialect, "sqlite");
        assert!(snapshot.schemas.contains(&"main".to_string()));

        let names: Vec<_> = snapshot.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["customers", "orders"]);

        let customers = snapshot.table("customers").unwrap();
        assert_eq!(customers.primary_key, vec!["id"]);
        assert_eq!(customers.unique_constraints.len(), 1);
        assert_eq!(customers.unique_constraints[0].columns, vec!["email"]);
        let tier = &customers.columns[2];
        assert_eq!(tier.default.as_deref(), Some("'basic'"));
        assert!(tier.nullable);
        assert!(!customers.columns[1].nullable);

        let orders = snapshot.table("orders").unwrap();
        assert!(orders.columns[0].autoincrement);
        assert_eq!(orders.indexes.len(), 1);
        assert_eq!(orders.indexes[0].name, "idx_orders_customer");
        assert_eq!(orders.indexes[0].columns, vec!["customer_id"]);
        assert_eq!(orders.check_constraints.len(), 1);
        assert_eq!(orders.check_constraints[0].sqltext, "total >= 0");

        assert_eq!(snapshot.relationships.len(), 1);
        let rel = &snapshot.relationships[0];
        assert_eq!(rel.from_table, "orders");
        assert_eq!(rel.from_columns, vec!["customer_id"]);
        assert_eq!(rel.to_table, "customers");
        assert_eq!(rel.to_columns, vec!["id"]);
        assert_eq!(rel.constraint_name, None);

        assert_eq!(snapshot.views.len(), 1);
        let view = &snapshot.views[0];
        assert_eq!(view.name, "big_orders");
        assert_eq!(view.columns.len(), 2);
        assert!(view
            .definition
            .as_deref()
            .unwrap()
            .contains("WHERE total > 100"));
    }

    #[tokio::test]
    async fn test_foreign_key_without_target_columns_uses_primary_key() {
        let (pool, _tmp) = fixture_pool(&[
            "CREATE TABLE authors (author_id INTEGER PRIMARY KEY, name TEXT)",
            "CREATE TABLE books (id INTEGER PRIMARY KEY, author INTEGER REFERENCES authors)",
        ])
        .await;

        let reflector = SqliteReflector::from_pool(pool, "library");
        let fks = reflector.foreign_keys("books").await.unwrap();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].referred_columns, vec!["author_id"]);
    }

    #[tokio::test]
    async fn test_foreign_key_to_missing_table_still_relates() {
        let (pool, _tmp) = fixture_pool(&[
            "CREATE TABLE books (id INTEGER PRIMARY KEY, publisher INTEGER REFERENCES publishers)",
        ])
        .await;

        let reflector = SqliteReflector::from_pool(pool, "library");
        let snapshot = reflect_schema(&reflector).await.unwrap();
        assert_eq!(snapshot.relationships.len(), 1);
        let rel = &snapshot.relationships[0];
        assert_eq!(rel.from_columns, vec!["publisher"]);
        assert_eq!(rel.to_table, "publishers");
        assert!(rel.to_columns.is_empty());
    }

    #[tokio::test]
    async fn test_connect_missing_file_is_connection_error() {
        let tmp = TempDir::new().unwrap();
        let descriptor =
            ConnectionDescriptor::sqlite(tmp.path().join("absent.db").display().to_string());
        let result = SqliteReflector::connect(&descriptor, &SourceConfig::default()).await;
        assert!(matches!(result, Err(crate::error::Error::Connection(_))));
    }
}
