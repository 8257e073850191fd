//! Schema reflection
//!
//! This module connects to a relational source and extracts a normalized
//! schema snapshot:
//! - Tables with columns, keys, indexes, constraints and comments
//! - Views with columns and (when available) their defining query
//! - A flat list of foreign-key relationships
//!
//! Only read-only introspection queries are issued.

mod connection;
mod mysql;
mod postgres;
mod sqlite;

pub use connection::*;
pub use mysql::MySqlReflector;
pub use postgres::PostgresReflector;
pub use sqlite::SqliteReflector;

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A complete, immutable snapshot of a database schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub database_name: String,
    pub dialect: String,
    pub tables: Vec<Table>,
    pub views: Vec<View>,
    pub relationships: Vec<Relationship>,
    pub schemas: Vec<String>,
}

impl SchemaSnapshot {
    /// Total number of table columns across the snapshot
    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    /// Look up a table by name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<Index>,
    pub unique_constraints: Vec<UniqueConstraint>,
    pub check_constraints: Vec<CheckConstraint>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Declared type rendered as text (e.g. `VARCHAR(255)`)
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub autoincrement: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    pub columns: Vec<ViewColumn>,
    pub definition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

impl From<Column> for ViewColumn {
    fn from(column: Column) -> Self {
        Self {
            name: column.name,
            data_type: column.data_type,
            nullable: column.nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub name: Option<String>,
    pub sqltext: String,
}

/// A foreign-key edge between two tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_name: Option<String>,
}

impl Relationship {
    /// Build a relationship from a table's foreign key. Returns `None` when the
    /// originating and target column lists differ in length.
    ///
    /// An empty target list is kept: the target table could not be resolved,
    /// so the key refers to its primary key by convention.
    pub fn from_foreign_key(table: &str, fk: &ForeignKey) -> Option<Self> {
        if fk.columns.is_empty()
            || (!fk.referred_columns.is_empty() && fk.columns.len() != fk.referred_columns.len())
        {
            return None;
        }
        Some(Self {
            from_table: table.to_string(),
            from_columns: fk.columns.clone(),
            to_table: fk.referred_table.clone(),
            to_columns: fk.referred_columns.clone(),
            constraint_name: fk.name.clone().filter(|n| !n.is_empty()),
        })
    }
}

/// Read-only introspection of one relational source
///
/// Structural calls (tables, columns, keys) must succeed for a snapshot to be
/// produced. Optional metadata calls return `Ok(None)` when the dialect has no
/// such concept.
#[async_trait]
pub trait Reflector: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn database_name(&self) -> &str;

    async fn schema_names(&self) -> Result<Vec<String>>;

    async fn table_names(&self) -> Result<Vec<String>>;

    async fn view_names(&self) -> Result<Vec<String>>;

    /// Columns of a table or view, in declaration order
    async fn columns(&self, relation: &str) -> Result<Vec<Column>>;

    async fn primary_key(&self, table: &str) -> Result<Vec<String>>;

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;

    async fn indexes(&self, table: &str) -> Result<Vec<Index>>;

    async fn unique_constraints(&self, table: &str) -> Result<Vec<UniqueConstraint>>;

    async fn check_constraints(&self, _table: &str) -> Result<Vec<CheckConstraint>> {
        Ok(Vec::new())
    }

    async fn table_comment(&self, _table: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn view_definition(&self, _view: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Open a read-only reflector for the descriptor's dialect
pub async fn connect(
    descriptor: &ConnectionDescriptor,
    source: &SourceConfig,
) -> Result<Box<dyn Reflector>> {
    info!(
        "Connecting to {} source at {}",
        descriptor.dialect,
        descriptor.location()
    );

    let reflector: Box<dyn Reflector> = match descriptor.dialect {
        Dialect::Sqlite => Box::new(SqliteReflector::connect(descriptor, source).await?),
        Dialect::Mysql => Box::new(MySqlReflector::connect(descriptor, source).await?),
        Dialect::Postgres => Box::new(PostgresReflector::connect(descriptor, source).await?),
    };

    Ok(reflector)
}

/// Produce a full schema snapshot
pub async fn reflect_schema(reflector: &dyn Reflector) -> Result<SchemaSnapshot> {
    let database_name = reflector.database_name().to_string();
    info!("Reflecting schema of database '{}'", database_name);

    let schemas = reflector.schema_names().await?;

    let mut tables = Vec::new();
    for name in reflector.table_names().await? {
        debug!("Reflecting table {}", name);
        tables.push(reflect_table(reflector, &name).await?);
    }

    let mut views = Vec::new();
    for name in reflector.view_names().await? {
        debug!("Reflecting view {}", name);
        let columns = reflector
            .columns(&name)
            .await?
            .into_iter()
            .map(ViewColumn::from)
            .collect();
        let definition = tolerate(reflector.view_definition(&name).await, "view definition", &name)?
            .filter(|d| !d.trim().is_empty());
        views.push(View {
            name,
            columns,
            definition,
        });
    }

    let relationships = collect_relationships(&tables);

    info!(
        "Reflected {} tables, {} views, {} relationships",
        tables.len(),
        views.len(),
        relationships.len()
    );

    Ok(SchemaSnapshot {
        database_name,
        dialect: reflector.dialect().to_string(),
        tables,
        views,
        relationships,
        schemas,
    })
}

async fn reflect_table(reflector: &dyn Reflector, name: &str) -> Result<Table> {
    let columns = reflector.columns(name).await?;
    let primary_key = reflector.primary_key(name).await?;
    let foreign_keys = reflector.foreign_keys(name).await?;
    let indexes = reflector.indexes(name).await?;
    let unique_constraints = reflector.unique_constraints(name).await?;
    let check_constraints = tolerate(
        reflector.check_constraints(name).await.map(Some),
        "check constraints",
        name,
    )?
    .unwrap_or_default();
    let comment = tolerate(reflector.table_comment(name).await, "table comment", name)?
        .filter(|c| !c.is_empty());

    Ok(Table {
        name: name.to_string(),
        columns,
        primary_key,
        foreign_keys,
        indexes,
        unique_constraints,
        check_constraints,
        comment,
    })
}

/// Flatten every table's foreign keys into relationships, in table order
pub fn collect_relationships(tables: &[Table]) -> Vec<Relationship> {
    let mut relationships = Vec::new();
    for table in tables {
        for fk in &table.foreign_keys {
            match Relationship::from_foreign_key(&table.name, fk) {
                Some(rel) => relationships.push(rel),
                None => warn!(
                    "Skipping foreign key on {} -> {}: column lists do not line up",
                    table.name, fk.referred_table
                ),
            }
        }
    }
    relationships
}

/// Optional metadata the source refuses to hand out is substituted with
/// `None`. Any other failure still aborts the reflection.
fn tolerate<T>(result: Result<Option<T>>, what: &str, object: &str) -> Result<Option<T>> {
    match result {
        Err(Error::SchemaAccess(e)) => {
            warn!("Could not read {} for {}: {}", what, object, e);
            Ok(None)
        }
        other => other,
    }
}

/// Map a failure to open the source into a connection error
pub(crate) fn connect_error(err: sqlx::Error) -> Error {
    Error::Connection(err.to_string())
}

/// Map a failed introspection query onto the error taxonomy
pub(crate) fn introspection_error(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => Error::Connection(err.to_string()),
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            // SQLSTATE class 08 is connection exception, 28 is invalid authorization
            if code.starts_with("08") || code.starts_with("28") {
                Error::Connection(err.to_string())
            } else {
                Error::SchemaAccess(err.to_string())
            }
        }
        _ => Error::SchemaAccess(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(columns: &[&str], table: &str, referred: &[&str], name: Option<&str>) -> ForeignKey {
        ForeignKey {
            name: name.map(String::from),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referred_table: table.to_string(),
            referred_columns: referred.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn table_with_fks(name: &str, foreign_keys: Vec<ForeignKey>) -> Table {
        Table {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys,
            indexes: Vec::new(),
            unique_constraints: Vec::new(),
            check_constraints: Vec::new(),
            comment: None,
        }
    }

    #[test]
    fn test_relationship_preserves_constraint_name() {
        let rel = Relationship::from_foreign_key(
            "orders",
            &fk(&["customer_id"], "customers", &["id"], Some("fk_orders_customer")),
        )
        .unwrap();
        assert_eq!(rel.constraint_name.as_deref(), Some("fk_orders_customer"));

        let rel =
            Relationship::from_foreign_key("orders", &fk(&["customer_id"], "customers", &["id"], Some("")))
                .unwrap();
        assert_eq!(rel.constraint_name, None);
    }

    #[test]
    fn test_relationship_rejects_mismatched_columns() {
        assert!(Relationship::from_foreign_key(
            "line_items",
            &fk(&["order_id", "sku"], "orders", &["id"], None)
        )
        .is_none());
    }

    #[test]
    fn test_relationship_to_unresolved_table_is_kept() {
        let rel = Relationship::from_foreign_key("books", &fk(&["author"], "authors", &[], None))
            .unwrap();
        assert_eq!(rel.to_table, "authors");
        assert!(rel.to_columns.is_empty());
    }

    #[test]
    fn test_collect_relationships_in_table_order() {
        let tables = vec![
            table_with_fks("line_items", vec![fk(&["order_id"], "orders", &["id"], None)]),
            table_with_fks(
                "orders",
                vec![
                    fk(&["customer_id"], "customers", &["id"], None),
                    fk(&["a", "b"], "nowhere", &["x"], None),
                ],
            ),
        ];

        let rels = collect_relationships(&tables);
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].from_table, "line_items");
        assert_eq!(rels[1].to_table, "customers");
    }

    #[test]
    fn test_tolerate_substitutes_none() {
        let failed: Result<Option<String>> = Err(Error::SchemaAccess("denied".to_string()));
        assert_eq!(tolerate(failed, "table comment", "orders").unwrap(), None);
        assert_eq!(
            tolerate(Ok(Some("note".to_string())), "table comment", "orders").unwrap(),
            Some("note".to_string())
        );
    }

    #[test]
    fn test_tolerate_propagates_connection_loss() {
        let failed: Result<Option<String>> = Err(Error::Connection("reset by peer".to_string()));
        assert!(matches!(
            tolerate(failed, "view definition", "v_orders"),
            Err(Error::Connection(_))
        ));
    }

    #[test]
    fn test_introspection_error_classification() {
        assert!(matches!(
            introspection_error(sqlx::Error::PoolTimedOut),
            Error::Connection(_)
        ));
        assert!(matches!(
            introspection_error(sqlx::Error::RowNotFound),
            Error::SchemaAccess(_)
        ));
    }
}
