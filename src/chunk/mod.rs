//! Schema chunking
//!
//! This module turns a schema snapshot into retrievable text chunks:
//! - One database overview first
//! - Per table, an overview followed by one chunk per column
//! - One chunk per foreign-key relationship
//! - One chunk per view
//!
//! Output order and text are a pure function of the snapshot, so re-chunking
//! an unchanged schema yields identical chunks.

mod examples;

pub use examples::*;

use crate::reflect::{Column, Relationship, SchemaSnapshot, Table, View};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    DatabaseOverview,
    TableOverview,
    ColumnDetail,
    Relationship,
    View,
    Example,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::DatabaseOverview => "database_overview",
            ChunkType::TableOverview => "table_overview",
            ChunkType::ColumnDetail => "column_detail",
            ChunkType::Relationship => "relationship",
            ChunkType::View => "view",
            ChunkType::Example => "example",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "database_overview" => Some(ChunkType::DatabaseOverview),
            "table_overview" => Some(ChunkType::TableOverview),
            "column_detail" => Some(ChunkType::ColumnDetail),
            "relationship" => Some(ChunkType::Relationship),
            "view" => Some(ChunkType::View),
            "example" => Some(ChunkType::Example),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A self-contained unit of retrievable text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,

    #[serde(rename = "type")]
    pub chunk_type: ChunkType,

    /// Filter attributes (table, column, database, ...)
    pub attributes: BTreeMap<String, String>,
}

impl Chunk {
    fn new(text: String, chunk_type: ChunkType, attributes: &[(&str, &str)]) -> Self {
        Self {
            text,
            chunk_type,
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Chunk a schema snapshot in the canonical order
pub fn chunk_schema(snapshot: &SchemaSnapshot) -> Vec<Chunk> {
    let db = snapshot.database_name.as_str();
    let mut chunks = Vec::with_capacity(
        1 + snapshot.tables.len()
            + snapshot.column_count()
            + snapshot.relationships.len()
            + snapshot.views.len(),
    );

    chunks.push(database_overview(snapshot));

    for table in &snapshot.tables {
        chunks.push(table_overview(table, db));
        for column in &table.columns {
            chunks.push(column_detail(column, table, db));
        }
    }

    for rel in &snapshot.relationships {
        chunks.push(relationship(rel, db));
    }

    for view in &snapshot.views {
        chunks.push(view_chunk(view, db));
    }

    chunks
}

fn database_overview(snapshot: &SchemaSnapshot) -> Chunk {
    let text = format!(
        "Database: {} (Type: {}). Contains {} tables, {} views, and {} foreign key relationships.",
        snapshot.database_name,
        snapshot.dialect,
        snapshot.tables.len(),
        snapshot.views.len(),
        snapshot.relationships.len()
    );
    Chunk::new(
        text,
        ChunkType::DatabaseOverview,
        &[("database", snapshot.database_name.as_str())],
    )
}

fn table_overview(table: &Table, db: &str) -> Chunk {
    let column_names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    let primary_key = if table.primary_key.is_empty() {
        "None".to_string()
    } else {
        table.primary_key.join(", ")
    };

    let mut text = format!(
        "Table '{}' has {} columns: {}. Primary key: {}. ",
        table.name,
        table.columns.len(),
        column_names.join(", "),
        primary_key
    );
    if let Some(comment) = table.comment.as_deref().filter(|c| !c.is_empty()) {
        text.push_str(&format!("Description: {}. ", comment));
    }

    Chunk::new(
        text,
        ChunkType::TableOverview,
        &[("table", table.name.as_str()), ("database", db)],
    )
}

fn column_detail(column: &Column, table: &Table, db: &str) -> Chunk {
    let mut text = format!(
        "Column '{}' in table '{}': Type: {}, Nullable: {}, Default: {}, Auto-increment: {}.",
        column.name,
        table.name,
        column.data_type,
        column.nullable,
        column.default.as_deref().unwrap_or("None"),
        column.autoincrement
    );
    if let Some(comment) = column.comment.as_deref().filter(|c| !c.is_empty()) {
        text.push_str(&format!(" Description: {}", comment));
    }

    Chunk::new(
        text,
        ChunkType::ColumnDetail,
        &[
            ("table", table.name.as_str()),
            ("column", column.name.as_str()),
            ("database", db),
        ],
    )
}

fn relationship(rel: &Relationship, db: &str) -> Chunk {
    let target = if rel.to_columns.is_empty() {
        format!("{} (primary key)", rel.to_table)
    } else {
        format!("{}.{}", rel.to_table, rel.to_columns.join(", "))
    };
    let text = format!(
        "Foreign key relationship: {}.{} references {}.",
        rel.from_table,
        rel.from_columns.join(", "),
        target
    );

    let mut chunk = Chunk::new(
        text,
        ChunkType::Relationship,
        &[
            ("from_table", rel.from_table.as_str()),
            ("to_table", rel.to_table.as_str()),
            ("database", db),
        ],
    );
    if let Some(name) = &rel.constraint_name {
        chunk
            .attributes
            .insert("constraint_name".to_string(), name.clone());
    }
    chunk
}

fn view_chunk(view: &View, db: &str) -> Chunk {
    let column_names: Vec<&str> = view.columns.iter().map(|c| c.name.as_str()).collect();
    let mut text = format!(
        "View '{}' with columns: {}.",
        view.name,
        column_names.join(", ")
    );
    if let Some(definition) = view.definition.as_deref().filter(|d| !d.is_empty()) {
        text.push_str(&format!(" Definition: {}", definition));
    }

    Chunk::new(text, ChunkType::View, &[("view", view.name.as_str()), ("database", db)])
}

/// Chunk counts keyed by type name
pub fn count_by_type(chunks: &[Chunk]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for chunk in chunks {
        *counts.entry(chunk.chunk_type.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Stable fingerprint of a chunk set, used to detect schema changes between registrations
pub fn fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = blake3::Hasher::new();
    for chunk in chunks {
        hasher.update(chunk.chunk_type.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(chunk.text.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{ForeignKey, ViewColumn};

    fn column(name: &str, data_type: &str, nullable: bool) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
            default: None,
            autoincrement: false,
            comment: None,
        }
    }

    fn table(name: &str, columns: Vec<Column>, primary_key: &[&str]) -> Table {
        Table {
            name: name.to_string(),
            columns,
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            unique_constraints: Vec::new(),
            check_constraints: Vec::new(),
            comment: None,
        }
    }

    /// orders(id PK, customer_id FK -> customers.id)
    fn orders_snapshot() -> SchemaSnapshot {
        let mut id = column("id", "INTEGER", false);
        id.autoincrement = true;
        let mut orders = table(
            "orders",
            vec![id, column("customer_id", "INTEGER", false)],
            &["id"],
        );
        orders.foreign_keys.push(ForeignKey {
            name: None,
            columns: vec!["customer_id".to_string()],
            referred_table: "customers".to_string(),
            referred_columns: vec!["id".to_string()],
        });
        let tables = vec![orders];
        let relationships = crate::reflect::collect_relationships(&tables);

        SchemaSnapshot {
            database_name: "acme".to_string(),
            dialect: "sqlite".to_string(),
            tables,
            views: Vec::new(),
            relationships,
            schemas: vec!["main".to_string()],
        }
    }

    fn rich_snapshot() -> SchemaSnapshot {
        let mut snapshot = orders_snapshot();
        let mut customers = table(
            "customers",
            vec![
                column("id", "INTEGER", false),
                column("email", "VARCHAR(255)", false),
                column("tier", "TEXT", true),
            ],
            &["id"],
        );
        customers.comment = Some("Registered buyers".to_string());
        customers.columns[2].default = Some("'basic'".to_string());
        customers.columns[1].comment = Some("Login address".to_string());
        snapshot.tables.insert(0, customers);
        snapshot.views.push(View {
            name: "big_orders".to_string(),
            columns: vec![ViewColumn {
                name: "id".to_string(),
                data_type: "INTEGER".to_string(),
                nullable: false,
            }],
            definition: Some("SELECT id FROM orders WHERE total > 100".to_string()),
        });
        snapshot
    }

    #[test]
    fn test_orders_scenario() {
        let chunks = chunk_schema(&orders_snapshot());
        let types: Vec<ChunkType> = chunks.iter().map(|c| c.chunk_type).collect();
        assert_eq!(
            types,
            vec![
                ChunkType::DatabaseOverview,
                ChunkType::TableOverview,
                ChunkType::ColumnDetail,
                ChunkType::ColumnDetail,
                ChunkType::Relationship,
            ]
        );

        assert_eq!(
            chunks[0].text,
            "Database: acme (Type: sqlite). Contains 1 tables, 0 views, and 1 foreign key relationships."
        );
        assert_eq!(
            chunks[1].text,
            "Table 'orders' has 2 columns: id, customer_id. Primary key: id. "
        );
        assert!(chunks[2].text.starts_with("Column 'id' in table 'orders'"));
        assert!(chunks[3].text.starts_with("Column 'customer_id' in table 'orders'"));
        assert!(chunks[4]
            .text
            .contains("orders.customer_id references customers.id"));

        assert_eq!(chunks[4].attributes["from_table"], "orders");
        assert_eq!(chunks[4].attributes["to_table"], "customers");
        assert!(!chunks[4].attributes.contains_key("constraint_name"));
    }

    #[test]
    fn test_completeness_counts() {
        let snapshot = rich_snapshot();
        let chunks = chunk_schema(&snapshot);

        let t = snapshot.tables.len();
        let c = snapshot.column_count();
        let r = snapshot.relationships.len();
        let v = snapshot.views.len();
        assert_eq!(chunks.len(), 1 + t + c + r + v);

        let counts = count_by_type(&chunks);
        assert_eq!(counts["database_overview"], 1);
        assert_eq!(counts["table_overview"], t);
        assert_eq!(counts["column_detail"], c);
        assert_eq!(counts["relationship"], r);
        assert_eq!(counts["view"], v);
    }

    #[test]
    fn test_deterministic_output() {
        let snapshot = rich_snapshot();
        let first = chunk_schema(&snapshot);
        let second = chunk_schema(&snapshot.clone());
        assert_eq!(first, second);
        assert_eq!(fingerprint(&first), fingerprint(&second));
    }

    #[test]
    fn test_fingerprint_tracks_schema_changes() {
        let snapshot = rich_snapshot();
        let mut changed = snapshot.clone();
        changed.tables[0].columns.push(column("phone", "TEXT", true));

        assert_ne!(
            fingerprint(&chunk_schema(&snapshot)),
            fingerprint(&chunk_schema(&changed))
        );
    }

    #[test]
    fn test_column_detail_text() {
        let chunks = chunk_schema(&rich_snapshot());
        let tier = chunks
            .iter()
            .find(|c| c.attributes.get("column").map(String::as_str) == Some("tier"))
            .unwrap();
        assert_eq!(
            tier.text,
            "Column 'tier' in table 'customers': Type: TEXT, Nullable: true, Default: 'basic', Auto-increment: false."
        );
        assert_eq!(tier.attributes["table"], "customers");
        assert_eq!(tier.attributes["database"], "acme");

        let email = chunks
            .iter()
            .find(|c| c.attributes.get("column").map(String::as_str) == Some("email"))
            .unwrap();
        assert!(email.text.ends_with(" Description: Login address"));
    }

    #[test]
    fn test_table_comment_and_view_definition() {
        let chunks = chunk_schema(&rich_snapshot());
        let customers = &chunks[1];
        assert_eq!(customers.chunk_type, ChunkType::TableOverview);
        assert!(customers.text.ends_with("Description: Registered buyers. "));

        let view = chunks.last().unwrap();
        assert_eq!(view.chunk_type, ChunkType::View);
        assert_eq!(
            view.text,
            "View 'big_orders' with columns: id. Definition: SELECT id FROM orders WHERE total > 100"
        );
        assert_eq!(view.attributes["view"], "big_orders");
    }

    #[test]
    fn test_table_without_primary_key() {
        let mut snapshot = orders_snapshot();
        snapshot.tables[0].primary_key.clear();
        let chunks = chunk_schema(&snapshot);
        assert!(chunks[1].text.contains("Primary key: None."));
    }

    #[test]
    fn test_relationship_to_unresolved_target() {
        let mut snapshot = orders_snapshot();
        snapshot.relationships[0].to_columns.clear();
        let chunks = chunk_schema(&snapshot);
        let rel = chunks
            .iter()
            .find(|c| c.chunk_type == ChunkType::Relationship)
            .unwrap();
        assert_eq!(
            rel.text,
            "Foreign key relationship: orders.customer_id references customers (primary key)."
        );
    }

    #[test]
    fn test_chunk_type_round_trip_names() {
        for ty in [
            ChunkType::DatabaseOverview,
            ChunkType::TableOverview,
            ChunkType::ColumnDetail,
            ChunkType::Relationship,
            ChunkType::View,
            ChunkType::Example,
        ] {
            assert_eq!(ChunkType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(ChunkType::parse("paragraph"), None);
    }
}
