//! MySQL source reader implementation.
//!
//! Metadata comes from `INFORMATION_SCHEMA` and `SHOW CREATE`; rows are
//! streamed with SQLx.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Row as _, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::core::identifier::quote_mysql;
use crate::core::schema::{Column, ImportedKey, IndexEntry, ReferentialAction};
use crate::core::traits::{Connection, MetadataReader, ObjectKind, RowQuery, RowReader};
use crate::core::value::{Row, SqlValue};
use crate::error::{MigrateError, Result};

/// Connection acquire timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Rows buffered between the reading task and the consumer.
const ROW_CHANNEL_CAPACITY: usize = 1024;

/// MySQL source connection.
///
/// Holds two pooled sessions so a row stream can be open while metadata is
/// queried.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
}

impl MysqlReader {
    /// Connect to the configured source database.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(MySqlSslMode::Preferred);

        let context = format!(
            "connecting to MySQL source {}:{}/{}",
            config.host, config.port, config.database
        );
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::connectivity(e, context))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }

    async fn table_names(&self, table_type: &str) -> Result<Vec<String>> {
        // CAST to CHAR: some servers report catalog strings as VARBINARY.
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = ?
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table_type)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("TABLE_NAME").map_err(Into::into))
            .collect()
    }

    async fn stream_rows(
        pool: MySqlPool,
        query: RowQuery,
        tx: &mpsc::Sender<Result<Row>>,
    ) -> Result<()> {
        let mut rows = sqlx::query(&query.sql).fetch(&pool);
        let mut count = 0u64;

        while let Some(row) = rows.try_next().await? {
            let values = row_to_values(&row, &query.columns)
                .map_err(|e| MigrateError::transfer(&query.table, e))?;
            if tx.send(Ok(values)).await.is_err() {
                debug!("{}: row consumer went away after {} rows", query.table, count);
                return Ok(());
            }
            count += 1;
        }

        debug!("{}: read {} rows", query.table, count);
        Ok(())
    }
}

#[async_trait]
impl Connection for MysqlReader {
    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::connectivity(e, "testing MySQL source connection"))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MetadataReader for MysqlReader {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.table_names("BASE TABLE").await
    }

    async fn list_views(&self) -> Result<Vec<String>> {
        self.table_names("VIEW").await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let query = r#"
            SELECT COUNT(*) AS cnt
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND TABLE_TYPE = 'BASE TABLE'
        "#;

        let row: MySqlRow = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<i64, _>("cnt")? > 0)
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(UPPER(DATA_TYPE) AS CHAR(64)) AS DATA_TYPE,
                CAST(COALESCE(CHARACTER_MAXIMUM_LENGTH, NUMERIC_PRECISION, DATETIME_PRECISION, 0)
                    AS UNSIGNED) AS COLUMN_SIZE,
                CAST(IF(IS_NULLABLE = 'YES', 1, 0) AS SIGNED) AS is_nullable,
                CAST(IF(EXTRA LIKE '%auto_increment%', 1, 0) AS SIGNED) AS is_auto_increment,
                CAST(COLUMN_DEFAULT AS CHAR(4000)) AS COLUMN_DEFAULT,
                CAST(COLUMN_COMMENT AS CHAR(2048)) AS COLUMN_COMMENT,
                CAST(ORDINAL_POSITION AS UNSIGNED) AS ORDINAL_POSITION
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let comment: Option<String> = row.try_get("COLUMN_COMMENT")?;
            columns.push(Column {
                name: row.try_get("COLUMN_NAME")?,
                data_type: row.try_get("DATA_TYPE")?,
                size: row.try_get("COLUMN_SIZE")?,
                is_nullable: row.try_get::<i64, _>("is_nullable")? == 1,
                is_auto_increment: row.try_get::<i64, _>("is_auto_increment")? == 1,
                default_value: row.try_get("COLUMN_DEFAULT")?,
                comment: comment.filter(|c| !c.is_empty()),
                ordinal_pos: row.try_get::<u64, _>("ORDINAL_POSITION")? as u32,
            });
        }

        Ok(columns)
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("COLUMN_NAME").map_err(Into::into))
            .collect()
    }

    async fn index_entries(&self, table: &str) -> Result<Vec<IndexEntry>> {
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(NON_UNIQUE AS SIGNED) AS NON_UNIQUE,
                CAST(SEQ_IN_INDEX AS UNSIGNED) AS SEQ_IN_INDEX
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            // Functional index parts have no column name.
            let Some(column_name) = row.try_get::<Option<String>, _>("COLUMN_NAME")? else {
                continue;
            };
            entries.push(IndexEntry {
                index_name: row.try_get("INDEX_NAME")?,
                column_name,
                is_unique: row.try_get::<i64, _>("NON_UNIQUE")? == 0,
                seq_in_index: row.try_get::<u64, _>("SEQ_IN_INDEX")? as u32,
            });
        }

        Ok(entries)
    }

    async fn imported_keys(&self, table: &str) -> Result<Vec<ImportedKey>> {
        let query = r#"
            SELECT
                CAST(kcu.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME,
                CAST(kcu.ORDINAL_POSITION AS UNSIGNED) AS KEY_SEQ,
                CAST(rc.UPDATE_RULE AS CHAR(64)) AS UPDATE_RULE,
                CAST(rc.DELETE_RULE AS CHAR(64)) AS DELETE_RULE
            FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND rc.TABLE_NAME = kcu.TABLE_NAME
            WHERE rc.CONSTRAINT_SCHEMA = ? AND rc.TABLE_NAME = ?
            ORDER BY kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            keys.push(ImportedKey {
                constraint_name: row.try_get("CONSTRAINT_NAME")?,
                column_name: row.try_get("COLUMN_NAME")?,
                ref_table: row.try_get("REFERENCED_TABLE_NAME")?,
                ref_column: row.try_get("REFERENCED_COLUMN_NAME")?,
                key_seq: row.try_get::<u64, _>("KEY_SEQ")? as u32,
                update_rule: ReferentialAction::parse(&row.try_get::<String, _>("UPDATE_RULE")?),
                delete_rule: ReferentialAction::parse(&row.try_get::<String, _>("DELETE_RULE")?),
            });
        }

        Ok(keys)
    }

    async fn table_comment(&self, table: &str) -> Result<Option<String>> {
        let query = r#"
            SELECT CAST(TABLE_COMMENT AS CHAR(2048)) AS TABLE_COMMENT
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#;

        let row: Option<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let comment: Option<String> = row.try_get("TABLE_COMMENT")?;
                Ok(comment.filter(|c| !c.trim().is_empty()))
            }
            None => Ok(None),
        }
    }

    async fn show_create(&self, kind: ObjectKind, name: &str) -> Result<Option<String>> {
        let keyword = match kind {
            ObjectKind::Table => "TABLE",
            ObjectKind::View => "VIEW",
        };
        let query = format!("SHOW CREATE {} {}", keyword, quote_mysql(name));

        let row: Option<MySqlRow> = sqlx::query(&query).fetch_optional(&self.pool).await?;
        let Some(row) = row else {
            return Ok(None);
        };

        // Second column holds the statement text.
        let definition = row
            .try_get::<String, _>(1)
            .or_else(|_| {
                row.try_get::<Vec<u8>, _>(1)
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
            })?;
        Ok(Some(definition))
    }
}

#[async_trait]
impl RowReader for MysqlReader {
    async fn count_rows(&self, table: &str) -> Result<u64> {
        let query = format!("SELECT COUNT(*) AS cnt FROM {}", quote_mysql(table));
        let row: MySqlRow = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>("cnt")?.max(0) as u64)
    }

    fn read_rows(&self, query: RowQuery) -> mpsc::Receiver<Result<Row>> {
        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::stream_rows(pool, query, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }
}

/// Decode every selected column of a row by its source type.
fn row_to_values(row: &MySqlRow, columns: &[Column]) -> std::result::Result<Row, String> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            decode_value(row, idx, &col.normalized_type())
                .map_err(|e| format!("cannot read column {}: {}", col.name, e))
        })
        .collect()
}

fn decode_value(row: &MySqlRow, idx: usize, data_type: &str) -> std::result::Result<SqlValue, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(SqlValue::Null);
    }

    match data_type {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" => row
            .try_get::<i64, _>(idx)
            .map(SqlValue::I64)
            .or_else(|_| row.try_get::<u64, _>(idx).map(SqlValue::U64))
            .or_else(|_| row.try_get::<bool, _>(idx).map(|b| SqlValue::I64(b as i64))),
        // SQLx has no type declared compatible with YEAR; it arrives as a 2-byte integer.
        "YEAR" => row
            .try_get_unchecked::<i64, _>(idx)
            .map(SqlValue::I64),
        "BIT" | "BOOL" | "BOOLEAN" => row
            .try_get::<bool, _>(idx)
            .map(SqlValue::Bool)
            .or_else(|_| row.try_get::<u64, _>(idx).map(SqlValue::U64))
            .or_else(|_| row.try_get::<Vec<u8>, _>(idx).map(SqlValue::Bytes)),
        "FLOAT" => row.try_get::<f32, _>(idx).map(SqlValue::F32),
        "DOUBLE" | "REAL" => row.try_get::<f64, _>(idx).map(SqlValue::F64),
        "DECIMAL" | "NUMERIC" => row
            .try_get::<rust_decimal::Decimal, _>(idx)
            .map(SqlValue::Decimal),
        "DATE" => row.try_get::<chrono::NaiveDate, _>(idx).map(SqlValue::Date),
        // TIME ranges beyond a day fall back to text.
        "TIME" => row
            .try_get::<chrono::NaiveTime, _>(idx)
            .map(SqlValue::Time)
            .or_else(|_| text_value(row, idx)),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .map(SqlValue::DateTime),
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "GEOMETRY" => {
            row.try_get::<Vec<u8>, _>(idx).map(SqlValue::Bytes)
        }
        _ => text_value(row, idx),
    }
}

/// Text, or lossy UTF-8 of the raw bytes for columns SQLx won't decode as text.
fn text_value(row: &MySqlRow, idx: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    row.try_get::<String, _>(idx).map(SqlValue::Text).or_else(|_| {
        row.try_get_unchecked::<Vec<u8>, _>(idx)
            .map(|b| SqlValue::Text(String::from_utf8_lossy(&b).into_owned()))
    })
}
