//! Row-level data transfer from source to target.
//!
//! Tables are copied one after the other. Each table runs in its own target
//! transaction: rows are streamed from the source, converted column by column,
//! and inserted in batches. Any failure rolls back that table only and the run
//! moves on to the next table.

mod converter;
mod progress;

pub use converter::TypeConverter;
pub use progress::{BatchProgress, SyncProgress, TableCounts};

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::identifier::{fold_gauss, gauss_ident, quote_mysql};
use crate::core::schema::Column;
use crate::core::traits::{Connector, RowQuery, SourceConnection, TargetConnection};
use crate::core::value::Row;
use crate::error::{MigrateError, Result};
use crate::state::BandedProgress;
use crate::typemap::TypeMappings;

/// Transfer engine configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Rows per insert batch.
    pub batch_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

/// Per-table line of a [`TransferSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub processed: u64,
    pub total: u64,
    pub batches: u64,
    pub failed: bool,
}

impl TableSummary {
    /// Processed share in percent; an empty table counts as complete.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 * 100.0 / self.total as f64
        }
    }
}

/// Outcome of a transfer run.
#[derive(Debug, Clone, Serialize)]
pub struct TransferSummary {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub total_records: u64,
    pub processed_records: u64,
    pub total_tables: usize,
    pub processed_tables: usize,
    pub failed_tables: Vec<String>,
    pub tables: Vec<TableSummary>,
}

impl TransferSummary {
    fn from_progress(sync: &SyncProgress, started_at: DateTime<Utc>, duration_seconds: f64) -> Self {
        Self {
            started_at,
            completed_at: Utc::now(),
            duration_seconds,
            total_records: sync.total_records(),
            processed_records: sync.processed_records(),
            total_tables: sync.total_tables(),
            processed_tables: sync.processed_tables(),
            failed_tables: sync.failed_tables().iter().cloned().collect(),
            tables: sync
                .tables()
                .iter()
                .map(|(name, counts)| TableSummary {
                    name: name.clone(),
                    processed: counts.processed,
                    total: counts.total,
                    batches: counts.batches,
                    failed: sync.is_failed(name),
                })
                .collect(),
        }
    }

    /// Write the end-of-run report to the log.
    pub fn log(&self) {
        info!("Data transfer finished");
        info!(
            "  Started: {}  Completed: {}  Duration: {:.2}s",
            self.started_at.to_rfc3339(),
            self.completed_at.to_rfc3339(),
            self.duration_seconds
        );
        info!(
            "  Records: {}/{}  Tables: {}/{}",
            self.processed_records, self.total_records, self.processed_tables, self.total_tables
        );
        for table in &self.tables {
            info!(
                "  {}: {}/{} ({:.2}%){}",
                table.name,
                table.processed,
                table.total,
                table.percent(),
                if table.failed { " FAILED" } else { "" }
            );
        }
        if !self.failed_tables.is_empty() {
            warn!("  Failed tables: {}", self.failed_tables.join(", "));
        }
    }
}

/// Copies rows of every source table into the target.
pub struct DataTransferEngine<'a> {
    connector: &'a dyn Connector,
    mappings: &'a TypeMappings,
    config: TransferConfig,
    sync: SyncProgress,
    started: Instant,
}

impl<'a> DataTransferEngine<'a> {
    /// Create a new transfer engine.
    pub fn new(connector: &'a dyn Connector, mappings: &'a TypeMappings, config: TransferConfig) -> Self {
        Self {
            connector,
            mappings,
            config,
            sync: SyncProgress::new(),
            started: Instant::now(),
        }
    }

    /// Counters of the run in progress; empty between runs.
    pub fn sync_progress(&self) -> &SyncProgress {
        &self.sync
    }

    /// Transfer every source table.
    ///
    /// Only connectivity or table enumeration failures are returned as
    /// errors; table failures end up in the summary.
    pub async fn run(&mut self, progress: Option<BandedProgress<'_>>) -> Result<TransferSummary> {
        let started_at = Utc::now();
        self.started = Instant::now();
        self.sync.reset();

        let source = self.connector.connect_source().await?;
        let target = match self.connector.connect_target().await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        let result = self
            .transfer_all(source.as_ref(), target.as_ref(), progress)
            .await;
        source.close().await;
        target.close().await;
        result?;

        let duration = self.started.elapsed().as_secs_f64();
        let summary = TransferSummary::from_progress(&self.sync, started_at, duration);
        summary.log();
        self.sync.reset();
        Ok(summary)
    }

    async fn transfer_all(
        &mut self,
        source: &dyn SourceConnection,
        target: &dyn TargetConnection,
        progress: Option<BandedProgress<'_>>,
    ) -> Result<()> {
        let tables = source
            .list_tables()
            .await
            .map_err(|e| MigrateError::introspection("list source tables", e))?;
        info!("Transferring data of {} tables", tables.len());

        for table in &tables {
            match source.count_rows(table).await {
                Ok(rows) => self.sync.add_table(table, rows),
                Err(e) => {
                    warn!("Cannot count rows of {}: {}", table, e);
                    self.sync.add_table(table, 0);
                    self.sync.mark_failed(table);
                }
            }
        }
        info!("{} records to transfer", self.sync.total_records());

        self.preflight(source, target, &tables).await;

        for table in &tables {
            if self.sync.is_failed(table) {
                continue;
            }
            match self.sync_table(source, target, table, progress).await {
                Ok(rows) => {
                    self.sync.finish_table();
                    info!("Transferred {} rows of {}", rows, table);
                }
                Err(e) => {
                    error!("Transfer of {} failed: {}", table, e);
                    self.sync.mark_failed(table);
                }
            }
            if let Some(p) = progress {
                p.report(self.sync.fraction());
            }
        }

        Ok(())
    }

    /// Exclude tables missing on either side. Never fails the run.
    ///
    /// Target names are compared in the folded form unquoted DDL stores.
    async fn preflight(
        &mut self,
        source: &dyn SourceConnection,
        target: &dyn TargetConnection,
        tables: &[String],
    ) {
        let target_tables: Option<HashSet<String>> = match target.list_tables().await {
            Ok(names) => Some(names.into_iter().collect()),
            Err(e) => {
                warn!("Cannot list target tables: {}", e);
                None
            }
        };

        for table in tables {
            if self.sync.is_failed(table) {
                continue;
            }
            let in_source = source.table_exists(table).await.unwrap_or_else(|e| {
                warn!("Cannot check source table {}: {}", table, e);
                false
            });
            let in_target = target_tables
                .as_ref()
                .is_some_and(|names| names.contains(&fold_gauss(table)));

            if !in_source || !in_target {
                warn!(
                    "Skipping {}: missing in {}",
                    table,
                    if in_source { "target" } else { "source" }
                );
                self.sync.mark_failed(table);
            }
        }
    }

    /// Copy one table inside its own transaction.
    async fn sync_table(
        &mut self,
        source: &dyn SourceConnection,
        target: &dyn TargetConnection,
        table: &str,
        progress: Option<BandedProgress<'_>>,
    ) -> Result<u64> {
        let mut columns = source.columns(table).await?;
        if columns.is_empty() {
            return Err(MigrateError::transfer(table, "table has no columns"));
        }
        columns.sort_by_key(|c| c.ordinal_pos);

        let converters: Vec<TypeConverter> = columns
            .iter()
            .map(|c| TypeConverter::for_source_type(&c.data_type))
            .collect();
        let select_sql = select_statement(table, &columns);
        let insert_sql = insert_statement(table, &columns);
        debug!("{}: {}", table, select_sql);
        debug!("{}: {}", table, insert_sql);

        target.begin().await?;
        let copied = self
            .copy_rows(source, target, table, columns, &converters, &select_sql, &insert_sql, progress)
            .await;

        match copied {
            Ok(rows) => match target.commit().await {
                Ok(()) => Ok(rows),
                Err(e) => {
                    rollback(target, table).await;
                    Err(MigrateError::transfer(table, format!("commit failed: {}", e)))
                }
            },
            Err(e) => {
                rollback(target, table).await;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn copy_rows(
        &mut self,
        source: &dyn SourceConnection,
        target: &dyn TargetConnection,
        table: &str,
        columns: Vec<Column>,
        converters: &[TypeConverter],
        select_sql: &str,
        insert_sql: &str,
        progress: Option<BandedProgress<'_>>,
    ) -> Result<u64> {
        let batch_size = self.config.batch_size.max(1);
        let mut rx = source.read_rows(RowQuery {
            table: table.to_string(),
            sql: select_sql.to_string(),
            columns: columns.clone(),
        });

        let mut batch: Vec<Row> = Vec::with_capacity(batch_size);
        let mut copied = 0u64;

        while let Some(row) = rx.recv().await {
            let row = self.convert_row(table, &columns, converters, row?)?;
            batch.push(row);
            if batch.len() >= batch_size {
                copied += self
                    .flush(target, table, insert_sql, &mut batch, progress)
                    .await?;
            }
        }
        if !batch.is_empty() {
            copied += self
                .flush(target, table, insert_sql, &mut batch, progress)
                .await?;
        }

        Ok(copied)
    }

    fn convert_row(
        &self,
        table: &str,
        columns: &[Column],
        converters: &[TypeConverter],
        row: Row,
    ) -> Result<Row> {
        if row.len() != columns.len() {
            return Err(MigrateError::transfer(
                table,
                format!("row has {} values, expected {}", row.len(), columns.len()),
            ));
        }

        row.into_iter()
            .zip(columns.iter().zip(converters))
            .map(|(value, (column, converter))| {
                let shown = if converter.is_fallible() {
                    value.to_string()
                } else {
                    String::new()
                };
                converter.convert(value).map_err(|message| {
                    let err = MigrateError::conversion(
                        table,
                        column.name.as_str(),
                        column.data_type.as_str(),
                        self.mappings.map_type(&column.data_type, column.size),
                        shown,
                        message,
                    );
                    error!("{}", err);
                    err
                })
            })
            .collect()
    }

    async fn flush(
        &mut self,
        target: &dyn TargetConnection,
        table: &str,
        insert_sql: &str,
        batch: &mut Vec<Row>,
        progress: Option<BandedProgress<'_>>,
    ) -> Result<u64> {
        target
            .execute_batch(insert_sql, batch)
            .await
            .map_err(|e| MigrateError::transfer(table, format!("batch insert failed: {}", e)))?;

        let rows = batch.len() as u64;
        batch.clear();
        self.sync.record_flush(table, rows);
        info!("{}", self.sync.batch_progress(table, self.started.elapsed()));
        if let Some(p) = progress {
            p.report(self.sync.fraction());
        }
        Ok(rows)
    }
}

async fn rollback(target: &dyn TargetConnection, table: &str) {
    if let Err(e) = target.rollback().await {
        warn!("Rollback of {} failed: {}", table, e);
    }
}

/// ``SELECT `a`, `b` FROM `t` `` in column ordinal order.
pub fn select_statement(table: &str, columns: &[Column]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_mysql(&c.name)).collect();
    format!("SELECT {} FROM {}", names.join(", "), quote_mysql(table))
}

/// `INSERT INTO t (a, b) VALUES ($1, $2)` in column ordinal order, names
/// rendered as the generated DDL renders them.
pub fn insert_statement(table: &str, columns: &[Column]) -> String {
    let names: Vec<String> = columns.iter().map(|c| gauss_ident(&c.name)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        gauss_ident(table),
        names.join(", "),
        placeholders.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ordinal: u32) -> Column {
        Column {
            name: name.to_string(),
            data_type: "INT".to_string(),
            size: 10,
            is_nullable: true,
            is_auto_increment: false,
            default_value: None,
            comment: None,
            ordinal_pos: ordinal,
        }
    }

    #[test]
    fn test_statements_follow_column_order() {
        let columns = vec![col("id", 1), col("name", 2), col("created", 3)];
        assert_eq!(
            select_statement("orders", &columns),
            "SELECT `id`, `name`, `created` FROM `orders`"
        );
        assert_eq!(
            insert_statement("orders", &columns),
            "INSERT INTO orders (id, name, created) VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn test_statements_quote_reserved_names() {
        let columns = vec![col("Id", 1), col("group", 2)];
        assert_eq!(
            select_statement("order", &columns),
            "SELECT `Id`, `group` FROM `order`"
        );
        assert_eq!(
            insert_statement("order", &columns),
            "INSERT INTO \"order\" (Id, \"group\") VALUES ($1, $2)"
        );
    }

    #[test]
    fn test_table_summary_percent() {
        let line = TableSummary {
            name: "t".to_string(),
            processed: 250,
            total: 1000,
            batches: 1,
            failed: false,
        };
        assert_eq!(line.percent(), 25.0);
        let empty = TableSummary { total: 0, processed: 0, ..line };
        assert_eq!(empty.percent(), 100.0);
    }

    #[test]
    fn test_default_batch_size() {
        assert_eq!(TransferConfig::default().batch_size, 1000);
    }
}
