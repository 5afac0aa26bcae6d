//! GaussDB target writer implementation.
//!
//! GaussDB speaks the PostgreSQL protocol, so the target side runs on
//! `tokio-postgres`. One writer is one session: transactions are plain
//! `BEGIN`/`COMMIT`/`ROLLBACK`, and batched inserts pipeline every row of a
//! batch through one prepared statement. Metadata lookups fold table names
//! the way unquoted DDL stores them.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::try_join_all;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row as PgRow, Statement};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::identifier::{fold_gauss, quote_gauss};
use crate::core::schema::{Column, ImportedKey, IndexEntry, ReferentialAction};
use crate::core::traits::{Connection, MetadataReader, ObjectKind, StatementWriter};
use crate::core::value::Row;
use crate::drivers::common::{make_connector, SslMode};
use crate::error::{MigrateError, Result};

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Savepoint guarding each statement inside a transaction.
const STATEMENT_SAVEPOINT: &str = "migrate_stmt";

/// GaussDB target connection.
pub struct GaussWriter {
    client: Client,
    connection: JoinHandle<()>,
    schema: String,
    in_transaction: AtomicBool,
    statements: DashMap<String, Statement>,
}

impl GaussWriter {
    /// Connect to the configured target database.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(CONNECT_TIMEOUT);

        let context = format!(
            "connecting to GaussDB target {}:{}/{}",
            config.host, config.port, config.database
        );
        let ssl_mode = SslMode::parse(&config.ssl_mode)?;

        let (client, connection) = match make_connector(ssl_mode)? {
            None => {
                warn!("GaussDB TLS is disabled. Credentials will be transmitted in plaintext.");
                let (client, conn) = pg_config
                    .connect(NoTls)
                    .await
                    .map_err(|e| MigrateError::connectivity(describe(&e), &context))?;
                (client, spawn_connection(conn))
            }
            Some(tls) => {
                let (client, conn) = pg_config
                    .connect(tls)
                    .await
                    .map_err(|e| MigrateError::connectivity(describe(&e), &context))?;
                (client, spawn_connection(conn))
            }
        };

        info!(
            "Connected to GaussDB target: {}:{}/{} (ssl_mode={})",
            config.host, config.port, config.database, ssl_mode
        );

        Ok(Self {
            client,
            connection,
            schema: config.schema.clone(),
            in_transaction: AtomicBool::new(false),
            statements: DashMap::new(),
        })
    }

    async fn prepared(&self, sql: &str) -> Result<Statement> {
        if let Some(statement) = self.statements.get(sql) {
            return Ok(statement.clone());
        }
        let statement = self.client.prepare(sql).await?;
        self.statements.insert(sql.to_string(), statement.clone());
        Ok(statement)
    }

    async fn names(&self, table_type: &str) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = $2 ORDER BY table_name",
                &[&self.schema, &table_type],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    /// Synthesized `CREATE TABLE` text carrying the table's check constraints,
    /// one `CONSTRAINT name CHECK (...)` per line.
    async fn table_definition(&self, table: &str) -> Result<Option<String>> {
        let table = fold_gauss(table);
        if !self.table_exists(&table).await? {
            return Ok(None);
        }

        let rows = self
            .client
            .query(
                "SELECT con.conname::text, pg_catalog.pg_get_constraintdef(con.oid)::text \
                 FROM pg_catalog.pg_constraint con \
                 JOIN pg_catalog.pg_class c ON c.oid = con.conrelid \
                 JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = $1 AND c.relname = $2 AND con.contype = 'c' \
                 ORDER BY con.conname",
                &[&self.schema, &table],
            )
            .await?;

        let lines: Vec<String> = rows
            .iter()
            .map(|r| format!("    CONSTRAINT {} {}", r.get::<_, String>(0), r.get::<_, String>(1)))
            .collect();
        Ok(Some(format!("CREATE TABLE {} (\n{}\n)", table, lines.join(",\n"))))
    }

    async fn view_definition(&self, view: &str) -> Result<Option<String>> {
        let view = fold_gauss(view);
        let row = self
            .client
            .query_opt(
                "SELECT pg_catalog.pg_get_viewdef(c.oid)::text \
                 FROM pg_catalog.pg_class c \
                 JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind = 'v'",
                &[&self.schema, &view],
            )
            .await?;
        Ok(row.map(|r| format!("CREATE VIEW {} AS {}", view, r.get::<_, String>(0).trim())))
    }

    async fn release_or_rollback(&self, ok: bool) -> Result<()> {
        let command = if ok {
            format!("RELEASE SAVEPOINT {}", STATEMENT_SAVEPOINT)
        } else {
            format!("ROLLBACK TO SAVEPOINT {}", STATEMENT_SAVEPOINT)
        };
        self.client.batch_execute(&command).await?;
        Ok(())
    }
}

fn spawn_connection<F>(connection: F) -> JoinHandle<()>
where
    F: Future<Output = std::result::Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("GaussDB connection closed: {}", e);
        }
    })
}

/// Server message when available, driver text otherwise.
fn describe(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!("{}: {}", db.code().code(), db.message()),
        None => e.to_string(),
    }
}

fn column_from_row(row: &PgRow) -> Column {
    Column {
        name: row.get("column_name"),
        data_type: row.get("data_type"),
        size: row.get::<_, i64>("column_size").max(0) as u64,
        is_nullable: row.get("is_nullable"),
        is_auto_increment: row.get("is_auto_increment"),
        default_value: row.get("column_default"),
        comment: row.get("column_comment"),
        ordinal_pos: row.get::<_, i32>("ordinal_position").max(0) as u32,
    }
}

#[async_trait]
impl Connection for GaussWriter {
    fn db_type(&self) -> &str {
        "gauss"
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connectivity(describe(&e), "testing GaussDB target connection"))?;
        Ok(())
    }

    async fn close(&self) {
        self.statements.clear();
        self.connection.abort();
    }
}

#[async_trait]
impl MetadataReader for GaussWriter {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.names("BASE TABLE").await
    }

    async fn list_views(&self) -> Result<Vec<String>> {
        self.names("VIEW").await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let table = fold_gauss(table);
        let row = self
            .client
            .query_one(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2 AND table_type = 'BASE TABLE'",
                &[&self.schema, &table],
            )
            .await?;
        Ok(row.get::<_, i64>(0) > 0)
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let table = fold_gauss(table);
        let rows = self
            .client
            .query(
                r#"
                SELECT
                    col.column_name::text AS column_name,
                    upper(col.data_type)::text AS data_type,
                    COALESCE(col.character_maximum_length, col.numeric_precision,
                             col.datetime_precision, 0)::bigint AS column_size,
                    col.is_nullable = 'YES' AS is_nullable,
                    COALESCE(col.column_default LIKE 'nextval(%', false) AS is_auto_increment,
                    col.column_default::text AS column_default,
                    pg_catalog.col_description(a.attrelid, a.attnum)::text AS column_comment,
                    col.ordinal_position::int AS ordinal_position
                FROM information_schema.columns col
                JOIN pg_catalog.pg_namespace n ON n.nspname = col.table_schema
                JOIN pg_catalog.pg_class c ON c.relnamespace = n.oid AND c.relname = col.table_name
                JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid AND a.attname = col.column_name
                WHERE col.table_schema = $1 AND col.table_name = $2
                ORDER BY col.ordinal_position
                "#,
                &[&self.schema, &table],
            )
            .await?;
        Ok(rows.iter().map(column_from_row).collect())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let table = fold_gauss(table);
        let rows = self
            .client
            .query(
                r#"
                SELECT kcu.column_name::text
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON kcu.constraint_schema = tc.constraint_schema
                    AND kcu.constraint_name = tc.constraint_name
                    AND kcu.table_name = tc.table_name
                WHERE tc.constraint_type = 'PRIMARY KEY'
                    AND tc.table_schema = $1 AND tc.table_name = $2
                ORDER BY kcu.ordinal_position
                "#,
                &[&self.schema, &table],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn index_entries(&self, table: &str) -> Result<Vec<IndexEntry>> {
        let table = fold_gauss(table);
        // generate_series in the select list: no LATERAL on older GaussDB releases.
        let rows = self
            .client
            .query(
                r#"
                SELECT x.index_name::text, a.attname::text, x.is_unique, (x.n + 1)::int
                FROM (
                    SELECT ic.relname AS index_name, i.indrelid, i.indkey,
                           i.indisunique AS is_unique,
                           generate_series(0, i.indnatts - 1) AS n
                    FROM pg_catalog.pg_index i
                    JOIN pg_catalog.pg_class t ON t.oid = i.indrelid
                    JOIN pg_catalog.pg_namespace ns ON ns.oid = t.relnamespace
                    JOIN pg_catalog.pg_class ic ON ic.oid = i.indexrelid
                    WHERE ns.nspname = $1 AND t.relname = $2 AND NOT i.indisprimary
                ) x
                JOIN pg_catalog.pg_attribute a
                    ON a.attrelid = x.indrelid AND a.attnum = x.indkey[x.n]
                ORDER BY x.index_name, x.n
                "#,
                &[&self.schema, &table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| IndexEntry {
                index_name: r.get(0),
                column_name: r.get(1),
                is_unique: r.get(2),
                seq_in_index: r.get::<_, i32>(3).max(0) as u32,
            })
            .collect())
    }

    async fn imported_keys(&self, table: &str) -> Result<Vec<ImportedKey>> {
        let table = fold_gauss(table);
        let rows = self
            .client
            .query(
                r#"
                SELECT
                    kcu.constraint_name::text,
                    kcu.column_name::text,
                    rku.table_name::text,
                    rku.column_name::text,
                    kcu.ordinal_position::int,
                    rc.update_rule::text,
                    rc.delete_rule::text
                FROM information_schema.referential_constraints rc
                JOIN information_schema.key_column_usage kcu
                    ON kcu.constraint_schema = rc.constraint_schema
                    AND kcu.constraint_name = rc.constraint_name
                JOIN information_schema.key_column_usage rku
                    ON rku.constraint_schema = rc.unique_constraint_schema
                    AND rku.constraint_name = rc.unique_constraint_name
                    AND rku.ordinal_position = kcu.position_in_unique_constraint
                WHERE kcu.table_schema = $1 AND kcu.table_name = $2
                ORDER BY kcu.constraint_name, kcu.ordinal_position
                "#,
                &[&self.schema, &table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| ImportedKey {
                constraint_name: r.get(0),
                column_name: r.get(1),
                ref_table: r.get(2),
                ref_column: r.get(3),
                key_seq: r.get::<_, i32>(4).max(0) as u32,
                update_rule: ReferentialAction::parse(r.get(5)),
                delete_rule: ReferentialAction::parse(r.get(6)),
            })
            .collect())
    }

    async fn table_comment(&self, table: &str) -> Result<Option<String>> {
        let table = fold_gauss(table);
        let row = self
            .client
            .query_opt(
                "SELECT pg_catalog.obj_description(c.oid, 'pg_class')::text \
                 FROM pg_catalog.pg_class c \
                 JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = $1 AND c.relname = $2",
                &[&self.schema, &table],
            )
            .await?;
        Ok(row
            .and_then(|r| r.get::<_, Option<String>>(0))
            .filter(|c| !c.trim().is_empty()))
    }

    async fn show_create(&self, kind: ObjectKind, name: &str) -> Result<Option<String>> {
        match kind {
            ObjectKind::Table => self.table_definition(name).await,
            ObjectKind::View => self.view_definition(name).await,
        }
    }
}

#[async_trait]
impl StatementWriter for GaussWriter {
    async fn begin(&self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.in_transaction.store(false, Ordering::SeqCst);
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.in_transaction.store(false, Ordering::SeqCst);
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn set_search_path(&self, schema: &str) -> Result<()> {
        let sql = format!("SET search_path TO {}", quote_gauss(schema));
        self.client
            .batch_execute(&sql)
            .await
            .map_err(|e| MigrateError::statement(sql.as_str(), describe(&e)))?;
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        if !self.in_transaction.load(Ordering::SeqCst) {
            return self
                .client
                .execute(sql, &[])
                .await
                .map_err(|e| MigrateError::statement(sql, describe(&e)));
        }

        self.client
            .batch_execute(&format!("SAVEPOINT {}", STATEMENT_SAVEPOINT))
            .await?;
        let result = self.client.execute(sql, &[]).await;
        self.release_or_rollback(result.is_ok()).await?;
        result.map_err(|e| MigrateError::statement(sql, describe(&e)))
    }

    async fn execute_batch(&self, sql: &str, rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let statement = self.prepared(sql).await?;
        let expected = statement.params().len();
        if let Some(row) = rows.iter().find(|r| r.len() != expected) {
            return Err(MigrateError::statement(
                sql,
                format!("row has {} values, statement takes {}", row.len(), expected),
            ));
        }

        let inserts = rows
            .iter()
            .map(|row| self.client.execute_raw(&statement, row.iter()));
        let affected: u64 = try_join_all(inserts)
            .await
            .map_err(|e| MigrateError::statement(sql, describe(&e)))?
            .into_iter()
            .sum();

        debug!("Batch of {} rows applied", rows.len());
        Ok(affected)
    }
}
