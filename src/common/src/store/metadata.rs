use async_trait::async_trait;
use sqlx::{
    PgPool, Row, SqlitePool, postgres::PgPoolOptions, query, sqlite::SqlitePoolOptions,
};
use tracing::{debug, info};

use super::{Fields, MetadataStore, StoreError};
use crate::config::MetadataConfig;

/// Metadata store over PostgreSQL or SQLite.
///
/// Each table holds one row per `(row_key, column_name)` cell, mirroring a
/// wide-column layout where a record is the set of cells sharing a row key.
#[derive(Clone, Debug)]
pub enum SqlMetadataStore {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

fn sqlite_dsn(dsn: &str) -> String {
    if dsn.contains("mode=") || dsn.contains(":memory:") {
        dsn.to_string()
    } else if dsn.contains('?') {
        format!("{dsn}&mode=rwc")
    } else {
        format!("{dsn}?mode=rwc")
    }
}

fn validate_table(table: &str) -> Result<(), StoreError> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(table.to_string()))
    }
}

fn group_cells(cells: Vec<(String, String, String)>) -> Vec<(String, Fields)> {
    let mut rows: Vec<(String, Fields)> = Vec::new();
    for (key, column, value) in cells {
        match rows.last_mut() {
            Some((last_key, fields)) if *last_key == key => {
                fields.insert(column, value);
            }
            _ => {
                let mut fields = Fields::new();
                fields.insert(column, value);
                rows.push((key, fields));
            }
        }
    }
    rows
}

impl SqlMetadataStore {
    /// Open a bounded connection pool for the configured DSN.
    pub async fn connect(config: &MetadataConfig) -> Result<Self, StoreError> {
        info!(dsn = %config.dsn, pool_size = config.pool_size, "Connecting to metadata store");

        let store = if config.dsn.starts_with("sqlite:") {
            let in_memory = config.dsn.contains(":memory:");
            // every in-memory connection is its own database
            let max_connections = if in_memory { 1 } else { config.pool_size };
            let mut options = SqlitePoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(config.acquire_timeout);
            if in_memory {
                options = options.idle_timeout(None).max_lifetime(None);
            }
            let pool = options.connect(&sqlite_dsn(&config.dsn)).await?;
            SqlMetadataStore::Sqlite(pool)
        } else {
            let pool = PgPoolOptions::new()
                .max_connections(config.pool_size)
                .acquire_timeout(config.acquire_timeout)
                .connect(&config.dsn)
                .await?;
            SqlMetadataStore::Postgres(pool)
        };

        info!("Metadata store connection established");
        Ok(store)
    }

    pub async fn close(&self) {
        match self {
            SqlMetadataStore::Postgres(pool) => pool.close().await,
            SqlMetadataStore::Sqlite(pool) => pool.close().await,
        }
    }
}

#[async_trait]
impl MetadataStore for SqlMetadataStore {
    async fn ensure_table(&self, table: &str) -> Result<(), StoreError> {
        validate_table(table)?;
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                row_key TEXT NOT NULL,
                column_name TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (row_key, column_name)
            )"#
        );
        match self {
            SqlMetadataStore::Postgres(pool) => {
                let mut conn = pool.acquire().await?;
                query(&ddl).execute(&mut *conn).await?;
            }
            SqlMetadataStore::Sqlite(pool) => {
                let mut conn = pool.acquire().await?;
                query(&ddl).execute(&mut *conn).await?;
            }
        }
        debug!(table, "Metadata table ready");
        Ok(())
    }

    async fn scan_all(&self, table: &str) -> Result<Vec<(String, Fields)>, StoreError> {
        validate_table(table)?;
        let select =
            format!("SELECT row_key, column_name, value FROM {table} ORDER BY row_key, column_name");

        let cells = match self {
            SqlMetadataStore::Postgres(pool) => {
                let mut conn = pool.acquire().await?;
                let rows = query(&select).fetch_all(&mut *conn).await?;
                rows.iter()
                    .map(|row| {
                        Ok((
                            row.try_get::<String, _>("row_key")?,
                            row.try_get::<String, _>("column_name")?,
                            row.try_get::<String, _>("value")?,
                        ))
                    })
                    .collect::<Result<Vec<_>, sqlx::Error>>()?
            }
            SqlMetadataStore::Sqlite(pool) => {
                let mut conn = pool.acquire().await?;
                let rows = query(&select).fetch_all(&mut *conn).await?;
                rows.iter()
                    .map(|row| {
                        Ok((
                            row.try_get::<String, _>("row_key")?,
                            row.try_get::<String, _>("column_name")?,
                            row.try_get::<String, _>("value")?,
                        ))
                    })
                    .collect::<Result<Vec<_>, sqlx::Error>>()?
            }
        };

        Ok(group_cells(cells))
    }

    async fn put(&self, table: &str, key: &str, fields: &Fields) -> Result<(), StoreError> {
        validate_table(table)?;
        match self {
            SqlMetadataStore::Postgres(pool) => {
                let delete = format!("DELETE FROM {table} WHERE row_key = $1");
                let insert = format!(
                    "INSERT INTO {table} (row_key, column_name, value) VALUES ($1, $2, $3)"
                );
                let mut tx = pool.begin().await?;
                query(&delete).bind(key).execute(&mut *tx).await?;
                for (column, value) in fields {
                    query(&insert)
                        .bind(key)
                        .bind(column)
                        .bind(value)
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await?;
            }
            SqlMetadataStore::Sqlite(pool) => {
                let delete = format!("DELETE FROM {table} WHERE row_key = ?");
                let insert =
                    format!("INSERT INTO {table} (row_key, column_name, value) VALUES (?, ?, ?)");
                let mut tx = pool.begin().await?;
                query(&delete).bind(key).execute(&mut *tx).await?;
                for (column, value) in fields {
                    query(&insert)
                        .bind(key)
                        .bind(column)
                        .bind(value)
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await?;
            }
        }
        debug!(table, key, columns = fields.len(), "Stored metadata row");
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), StoreError> {
        validate_table(table)?;
        match self {
            SqlMetadataStore::Postgres(pool) => {
                let mut conn = pool.acquire().await?;
                query(&format!("DELETE FROM {table} WHERE row_key = $1"))
                    .bind(key)
                    .execute(&mut *conn)
                    .await?;
            }
            SqlMetadataStore::Sqlite(pool) => {
                let mut conn = pool.acquire().await?;
                query(&format!("DELETE FROM {table} WHERE row_key = ?"))
                    .bind(key)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        debug!(table, key, "Deleted metadata row");
        Ok(())
    }
}
