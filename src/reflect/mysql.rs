//! MySQL / MariaDB reflection via information_schema

use super::{
    connect_error, introspection_error, CheckConstraint, Column, ConnectionDescriptor, Dialect,
    ForeignKey, Index, Reflector, UniqueConstraint,
};
use crate::config::SourceConfig;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::collections::BTreeMap;
use std::time::Duration;

pub struct MySqlReflector {
    pool: MySqlPool,
    database_name: String,
}

impl MySqlReflector {
    pub async fn connect(descriptor: &ConnectionDescriptor, source: &SourceConfig) -> Result<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(&descriptor.host)
            .username(&descriptor.username)
            .database(&descriptor.database);
        if let Some(port) = descriptor.effective_port() {
            options = options.port(port);
        }
        if !descriptor.password.is_empty() {
            options = options.password(&descriptor.password);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(source.max_connections)
            .acquire_timeout(Duration::from_secs(source.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(connect_error)?;

        Ok(Self {
            pool,
            database_name: descriptor.database_name(),
        })
    }

    async fn relation_names(&self, table_type: &str) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = ? ORDER BY TABLE_NAME",
        )
        .bind(table_type)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;
        Ok(names)
    }

    /// (constraint name, ordered columns) for every constraint of one type
    async fn constraint_columns(
        &self,
        table: &str,
        constraint_type: &str,
    ) -> Result<Vec<(String, Vec<String>)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT CAST(k.CONSTRAINT_NAME AS CHAR), CAST(k.COLUMN_NAME AS CHAR) \
             FROM information_schema.TABLE_CONSTRAINTS c \
             JOIN information_schema.KEY_COLUMN_USAGE k \
               ON k.CONSTRAINT_SCHEMA = c.CONSTRAINT_SCHEMA \
              AND k.CONSTRAINT_NAME = c.CONSTRAINT_NAME \
              AND k.TABLE_NAME = c.TABLE_NAME \
             WHERE c.TABLE_SCHEMA = DATABASE() AND c.TABLE_NAME = ? AND c.CONSTRAINT_TYPE = ? \
             ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION",
        )
        .bind(table)
        .bind(constraint_type)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;

        Ok(group_ordered(rows))
    }
}

#[async_trait]
impl Reflector for MySqlReflector {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn database_name(&self) -> &str {
        &self.database_name
    }

    async fn schema_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT CAST(SCHEMA_NAME AS CHAR) FROM information_schema.SCHEMATA ORDER BY SCHEMA_NAME",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;
        Ok(names)
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        self.relation_names("BASE TABLE").await
    }

    async fn view_names(&self) -> Result<Vec<String>> {
        self.relation_names("VIEW").await
    }

    async fn columns(&self, relation: &str) -> Result<Vec<Column>> {
        let rows: Vec<(String, String, String, Option<String>, String, String)> = sqlx::query_as(
            "SELECT CAST(COLUMN_NAME AS CHAR), CAST(COLUMN_TYPE AS CHAR), \
                    CAST(IS_NULLABLE AS CHAR), CAST(COLUMN_DEFAULT AS CHAR), \
                    CAST(EXTRA AS CHAR), CAST(COLUMN_COMMENT AS CHAR) \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION",
        )
        .bind(relation)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, nullable, default, extra, comment)| Column {
                name,
                data_type: data_type.to_uppercase(),
                nullable: nullable.eq_ignore_ascii_case("YES"),
                default,
                autoincrement: extra.to_lowercase().contains("auto_increment"),
                comment: Some(comment).filter(|c| !c.is_empty()),
            })
            .collect())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .constraint_columns(table, "PRIMARY KEY")
            .await?
            .into_iter()
            .next()
            .map(|(_, columns)| columns)
            .unwrap_or_default())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT CAST(CONSTRAINT_NAME AS CHAR), CAST(COLUMN_NAME AS CHAR), \
                    CAST(REFERENCED_TABLE_NAME AS CHAR), CAST(REFERENCED_COLUMN_NAME AS CHAR) \
             FROM information_schema.KEY_COLUMN_USAGE \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
               AND REFERENCED_TABLE_NAME IS NOT NULL \
             ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;

        let mut grouped: BTreeMap<String, ForeignKey> = BTreeMap::new();
        for (name, column, referred_table, referred_column) in rows {
            let fk = grouped.entry(name.clone()).or_insert_with(|| ForeignKey {
                name: Some(name),
                columns: Vec::new(),
                referred_table,
                referred_columns: Vec::new(),
            });
            fk.columns.push(column);
            fk.referred_columns.push(referred_column);
        }

        Ok(grouped.into_values().collect())
    }

    async fn indexes(&self, table: &str) -> Result<Vec<Index>> {
        let rows: Vec<(String, i64, Option<String>)> = sqlx::query_as(
            "SELECT CAST(INDEX_NAME AS CHAR), CAST(NON_UNIQUE AS SIGNED), CAST(COLUMN_NAME AS CHAR) \
             FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND INDEX_NAME <> 'PRIMARY' \
             ORDER BY INDEX_NAME, SEQ_IN_INDEX",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;

        let mut grouped: BTreeMap<String, Index> = BTreeMap::new();
        for (name, non_unique, column) in rows {
            let index = grouped.entry(name.clone()).or_insert_with(|| Index {
                name,
                columns: Vec::new(),
                unique: non_unique == 0,
            });
            // Functional key parts have no column name
            if let Some(column) = column {
                index.columns.push(column);
            }
        }

        Ok(grouped.into_values().collect())
    }

    async fn unique_constraints(&self, table: &str) -> Result<Vec<UniqueConstraint>> {
        Ok(self
            .constraint_columns(table, "UNIQUE")
            .await?
            .into_iter()
            .map(|(name, columns)| UniqueConstraint {
                name: Some(name),
                columns,
            })
            .collect())
    }

    async fn check_constraints(&self, table: &str) -> Result<Vec<CheckConstraint>> {
        // CHECK_CONSTRAINTS exists from MySQL 8.0.16 / MariaDB 10.2
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT CAST(cc.CONSTRAINT_NAME AS CHAR), CAST(cc.CHECK_CLAUSE AS CHAR) \
             FROM information_schema.CHECK_CONSTRAINTS cc \
             JOIN information_schema.TABLE_CONSTRAINTS tc \
               ON tc.CONSTRAINT_SCHEMA = cc.CONSTRAINT_SCHEMA \
              AND tc.CONSTRAINT_NAME = cc.CONSTRAINT_NAME \
             WHERE tc.TABLE_SCHEMA = DATABASE() AND tc.TABLE_NAME = ? \
               AND tc.CONSTRAINT_TYPE = 'CHECK' \
             ORDER BY cc.CONSTRAINT_NAME",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;

        Ok(rows
            .into_iter()
            .map(|(name, sqltext)| CheckConstraint {
                name: Some(name),
                sqltext,
            })
            .collect())
    }

    async fn table_comment(&self, table: &str) -> Result<Option<String>> {
        let comment: Option<Option<String>> = sqlx::query_scalar(
            "SELECT CAST(TABLE_COMMENT AS CHAR) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(introspection_error)?;
        Ok(comment.flatten().filter(|c| !c.is_empty()))
    }

    async fn view_definition(&self, view: &str) -> Result<Option<String>> {
        let definition: Option<Option<String>> = sqlx::query_scalar(
            "SELECT CAST(VIEW_DEFINITION AS CHAR) FROM information_schema.VIEWS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
        )
        .bind(view)
        .fetch_optional(&self.pool)
        .await
        .map_err(introspection_error)?;
        Ok(definition.flatten())
    }
}

/// Group `(name, member)` rows that arrive ordered by name then position
fn group_ordered(rows: Vec<(String, String)>) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for (name, member) in rows {
        match groups.last_mut() {
            Some((current, members)) if *current == name => members.push(member),
            _ => groups.push((name, vec![member])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_ordered() {
        let rows = vec![
            ("uq_email".to_string(), "email".to_string()),
            ("uq_name".to_string(), "first".to_string()),
            ("uq_name".to_string(), "last".to_string()),
        ];
        let grouped = group_ordered(rows);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].1, vec!["email"]);
        assert_eq!(grouped[1].0, "uq_name");
        assert_eq!(grouped[1].1, vec!["first", "last"]);
    }

    #[test]
    fn test_group_ordered_empty() {
        assert!(group_ordered(Vec::new()).is_empty());
    }
}
