//! PostgreSQL reflection via pg_catalog

use super::{
    connect_error, introspection_error, CheckConstraint, Column, ConnectionDescriptor, Dialect,
    ForeignKey, Index, Reflector, UniqueConstraint,
};
use crate::config::SourceConfig;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;

const DEFAULT_SCHEMA: &str = "public";

/// Columns of one constraint, in key order
const CONSTRAINT_COLUMNS: &str = r#"
    SELECT con.conname::text,
           ARRAY(SELECT a.attname::text
                   FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                   JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                  ORDER BY k.ord) AS columns
      FROM pg_constraint con
     WHERE con.conrelid = to_regclass(quote_ident($1) || '.' || quote_ident($2))
       AND con.contype = $3
     ORDER BY con.conname
"#;

pub struct PostgresReflector {
    pool: PgPool,
    database_name: String,
    schema: String,
}

impl PostgresReflector {
    pub async fn connect(descriptor: &ConnectionDescriptor, source: &SourceConfig) -> Result<Self> {
        let mut options = PgConnectOptions::new()
            .host(&descriptor.host)
            .username(&descriptor.username)
            .database(&descriptor.database)
            .application_name("sqlingo");
        if let Some(port) = descriptor.effective_port() {
            options = options.port(port);
        }
        if !descriptor.password.is_empty() {
            options = options.password(&descriptor.password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(source.max_connections)
            .acquire_timeout(Duration::from_secs(source.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(connect_error)?;

        Ok(Self {
            pool,
            database_name: descriptor.database_name(),
            schema: descriptor
                .schema
                .clone()
                .unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
        })
    }

    async fn relation_names(&self, kinds: &[&str]) -> Result<Vec<String>> {
        let kinds: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT c.relname::text FROM pg_class c \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 AND c.relkind::text = ANY($2) \
             ORDER BY c.relname",
        )
        .bind(&self.schema)
        .bind(&kinds)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;
        Ok(names)
    }

    async fn constraint_columns(
        &self,
        table: &str,
        contype: &str,
    ) -> Result<Vec<(String, Vec<String>)>> {
        let rows: Vec<(String, Vec<String>)> = sqlx::query_as(CONSTRAINT_COLUMNS)
            .bind(&self.schema)
            .bind(table)
            .bind(contype)
            .fetch_all(&self.pool)
            .await
            .map_err(introspection_error)?;
        Ok(rows)
    }
}

#[async_trait]
impl Reflector for PostgresReflector {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn database_name(&self) -> &str {
        &self.database_name
    }

    async fn schema_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT schema_name::text FROM information_schema.schemata \
             WHERE schema_name NOT LIKE 'pg\\_%' AND schema_name <> 'information_schema' \
             ORDER BY schema_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;
        Ok(names)
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        self.relation_names(&["r", "p"]).await
    }

    async fn view_names(&self) -> Result<Vec<String>> {
        self.relation_names(&["v", "m"]).await
    }

    async fn columns(&self, relation: &str) -> Result<Vec<Column>> {
        let rows: Vec<(String, String, bool, Option<String>, bool, Option<String>)> =
            sqlx::query_as(
                r#"
                SELECT a.attname::text,
                       format_type(a.atttypid, a.atttypmod),
                       NOT a.attnotnull,
                       pg_get_expr(d.adbin, d.adrelid),
                       (a.attidentity <> '' OR COALESCE(pg_get_expr(d.adbin, d.adrelid), '') LIKE 'nextval(%'),
                       col_description(a.attrelid, a.attnum)
                  FROM pg_attribute a
                  LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
                 WHERE a.attrelid = to_regclass(quote_ident($1) || '.' || quote_ident($2))
                   AND a.attnum > 0
                   AND NOT a.attisdropped
                 ORDER BY a.attnum
                "#,
            )
            .bind(&self.schema)
            .bind(relation)
            .fetch_all(&self.pool)
            .await
            .map_err(introspection_error)?;

        Ok(rows
            .into_iter()
            .map(
                |(name, data_type, nullable, default, autoincrement, comment)| Column {
                    name,
                    data_type: data_type.to_uppercase(),
                    nullable,
                    default,
                    autoincrement,
                    comment: comment.filter(|c| !c.is_empty()),
                },
            )
            .collect())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .constraint_columns(table, "p")
            .await?
            .into_iter()
            .next()
            .map(|(_, columns)| columns)
            .unwrap_or_default())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, Vec<String>, String, Vec<String>)> = sqlx::query_as(
            r#"
            SELECT con.conname::text,
                   ARRAY(SELECT a.attname::text
                           FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                           JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                          ORDER BY k.ord),
                   ref.relname::text,
                   ARRAY(SELECT a.attname::text
                           FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
                           JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
                          ORDER BY k.ord)
              FROM pg_constraint con
              JOIN pg_class ref ON ref.oid = con.confrelid
             WHERE con.conrelid = to_regclass(quote_ident($1) || '.' || quote_ident($2))
               AND con.contype = 'f'
             ORDER BY con.conname
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;

        Ok(rows
            .into_iter()
            .map(|(name, columns, referred_table, referred_columns)| ForeignKey {
                name: Some(name),
                columns,
                referred_table,
                referred_columns,
            })
            .collect())
    }

    async fn indexes(&self, table: &str) -> Result<Vec<Index>> {
        let rows: Vec<(String, bool, Vec<String>)> = sqlx::query_as(
            r#"
            SELECT ic.relname::text,
                   i.indisunique,
                   ARRAY(SELECT a.attname::text
                           FROM unnest(i.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
                           JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum
                          ORDER BY k.ord)
              FROM pg_index i
              JOIN pg_class ic ON ic.oid = i.indexrelid
             WHERE i.indrelid = to_regclass(quote_ident($1) || '.' || quote_ident($2))
               AND NOT i.indisprimary
               AND NOT EXISTS (SELECT 1 FROM pg_constraint con WHERE con.conindid = i.indexrelid)
             ORDER BY ic.relname
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;

        Ok(rows
            .into_iter()
            .map(|(name, unique, columns)| Index {
                name,
                columns,
                unique,
            })
            .collect())
    }

    async fn unique_constraints(&self, table: &str) -> Result<Vec<UniqueConstraint>> {
        Ok(self
            .constraint_columns(table, "u")
            .await?
            .into_iter()
            .map(|(name, columns)| UniqueConstraint {
                name: Some(name),
                columns,
            })
            .collect())
    }

    async fn check_constraints(&self, table: &str) -> Result<Vec<CheckConstraint>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT con.conname::text, pg_get_constraintdef(con.oid) \
             FROM pg_constraint con \
             WHERE con.conrelid = to_regclass(quote_ident($1) || '.' || quote_ident($2)) \
               AND con.contype = 'c' \
             ORDER BY con.conname",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_error)?;

        Ok(rows
            .into_iter()
            .map(|(name, definition)| CheckConstraint {
                name: Some(name),
                sqltext: strip_check_keyword(&definition),
            })
            .collect())
    }

    async fn table_comment(&self, table: &str) -> Result<Option<String>> {
        let comment: Option<String> = sqlx::query_scalar(
            "SELECT obj_description(to_regclass(quote_ident($1) || '.' || quote_ident($2)), 'pg_class')",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_one(&self.pool)
        .await
        .map_err(introspection_error)?;
        Ok(comment.filter(|c| !c.is_empty()))
    }

    async fn view_definition(&self, view: &str) -> Result<Option<String>> {
        let definition: Option<String> = sqlx::query_scalar(
            "SELECT pg_get_viewdef(to_regclass(quote_ident($1) || '.' || quote_ident($2)), true)",
        )
        .bind(&self.schema)
        .bind(view)
        .fetch_one(&self.pool)
        .await
        .map_err(introspection_error)?;
        Ok(definition)
    }
}

/// `pg_get_constraintdef` renders `CHECK ((expr))`; keep only the expression
fn strip_check_keyword(definition: &str) -> String {
    let trimmed = definition.trim();
    let body = trimmed
        .strip_prefix("CHECK")
        .map(str::trim_start)
        .unwrap_or(trimmed);
    let body = body
        .strip_suffix("NOT VALID")
        .map(str::trim_end)
        .unwrap_or(body);
    match body.strip_prefix('(').and_then(|b| b.strip_suffix(')')) {
        Some(inner) => inner.trim().to_string(),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_check_keyword() {
        assert_eq!(strip_check_keyword("CHECK ((price >= 0))"), "(price >= 0)");
        assert_eq!(
            strip_check_keyword("CHECK ((qty > 0)) NOT VALID"),
            "(qty > 0)"
        );
        assert_eq!(strip_check_keyword("qty > 0"), "qty > 0");
    }
}
