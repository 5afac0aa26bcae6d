//! In-memory source and target databases for engine tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::mpsc;

use mysql_gauss_migrate::config::{Config, MigrationConfig, SourceConfig, TargetConfig};
use mysql_gauss_migrate::core::identifier::fold_gauss;
use mysql_gauss_migrate::core::{
    Column, Connection, Connector, ImportedKey, IndexEntry, MetadataReader, ObjectKind, Row,
    RowQuery, RowReader, SourceConnection, SqlValue, StatementWriter, TargetConnection,
};
use mysql_gauss_migrate::{MigrateError, Result};

/// One table: metadata plus its rows.
#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    pub index_entries: Vec<IndexEntry>,
    pub imported_keys: Vec<ImportedKey>,
    pub comment: Option<String>,
    /// `SHOW CREATE TABLE` text.
    pub definition: Option<String>,
    pub rows: Vec<Row>,
}

impl FakeTable {
    /// Same columns and key, no rows.
    pub fn empty_copy(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            primary_key: self.primary_key.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct SourceDb {
    pub tables: BTreeMap<String, FakeTable>,
    /// View name to `SHOW CREATE VIEW` text.
    pub views: BTreeMap<String, String>,
    /// Listed but reported as absent by `table_exists`.
    pub vanished: BTreeSet<String>,
    /// `count_rows` fails for these.
    pub failing_counts: BTreeSet<String>,
    /// Every SELECT handed to `read_rows`.
    pub queries: Vec<String>,
}

#[derive(Debug, Default)]
pub struct TargetDb {
    /// Committed tables and rows.
    pub tables: BTreeMap<String, FakeTable>,
    /// Every statement attempted, in order.
    pub executed: Vec<String>,
    /// Statements that took effect.
    pub applied: Vec<String>,
    /// (table, rows) of every batch attempted.
    pub flushes: Vec<(String, usize)>,
    /// Statements containing any of these fail.
    pub fail_statements: Vec<String>,
    /// Batches into these tables fail.
    pub fail_batches: BTreeSet<String>,
    pub search_path: Option<String>,
    pub commits: usize,
    pub rollbacks: usize,
    pub connections: usize,
    pub closed: usize,
}

impl TargetDb {
    pub fn rows(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub fn flush_sizes(&self, table: &str) -> Vec<usize> {
        self.flushes
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, n)| *n)
            .collect()
    }
}

pub struct FakeSource {
    db: Arc<Mutex<SourceDb>>,
}

impl FakeSource {
    fn db(&self) -> MutexGuard<'_, SourceDb> {
        self.db.lock().unwrap()
    }

    fn table<T>(&self, name: &str, f: impl FnOnce(&FakeTable) -> T) -> Result<T> {
        self.db()
            .tables
            .get(name)
            .map(f)
            .ok_or_else(|| MigrateError::Introspection(format!("no table {}", name)))
    }
}

#[async_trait]
impl Connection for FakeSource {
    fn db_type(&self) -> &str {
        "fake-mysql"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

#[async_trait]
impl MetadataReader for FakeSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.db().tables.keys().cloned().collect())
    }

    async fn list_views(&self) -> Result<Vec<String>> {
        Ok(self.db().views.keys().cloned().collect())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let db = self.db();
        Ok(db.tables.contains_key(table) && !db.vanished.contains(table))
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        self.table(table, |t| t.columns.clone())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        self.table(table, |t| t.primary_key.clone())
    }

    async fn index_entries(&self, table: &str) -> Result<Vec<IndexEntry>> {
        self.table(table, |t| t.index_entries.clone())
    }

    async fn imported_keys(&self, table: &str) -> Result<Vec<ImportedKey>> {
        self.table(table, |t| t.imported_keys.clone())
    }

    async fn table_comment(&self, table: &str) -> Result<Option<String>> {
        self.table(table, |t| t.comment.clone())
    }

    async fn show_create(&self, kind: ObjectKind, name: &str) -> Result<Option<String>> {
        let db = self.db();
        Ok(match kind {
            ObjectKind::Table => db.tables.get(name).and_then(|t| t.definition.clone()),
            ObjectKind::View => db.views.get(name).cloned(),
        })
    }
}

#[async_trait]
impl RowReader for FakeSource {
    async fn count_rows(&self, table: &str) -> Result<u64> {
        if self.db().failing_counts.contains(table) {
            return Err(MigrateError::transfer(table, "count failed"));
        }
        self.table(table, |t| t.rows.len() as u64)
    }

    fn read_rows(&self, query: RowQuery) -> mpsc::Receiver<Result<Row>> {
        let rows = {
            let mut db = self.db();
            db.queries.push(query.sql.clone());
            db.tables
                .get(&query.table)
                .map(|t| t.rows.clone())
                .unwrap_or_default()
        };
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for row in rows {
                if tx.send(Ok(row)).await.is_err() {
                    break;
                }
            }
        });
        rx
    }
}

#[derive(Default)]
struct Session {
    in_transaction: bool,
    statements: Vec<String>,
    rows: Vec<(String, Row)>,
}

pub struct FakeTarget {
    db: Arc<Mutex<TargetDb>>,
    session: Mutex<Session>,
}

impl FakeTarget {
    fn db(&self) -> MutexGuard<'_, TargetDb> {
        self.db.lock().unwrap()
    }
}

fn apply_statement(db: &mut TargetDb, sql: &str) {
    if let Some((name, table)) = parse_create_table(sql) {
        db.tables.insert(name, table);
    }
    db.applied.push(sql.to_string());
}

#[async_trait]
impl Connection for FakeTarget {
    fn db_type(&self) -> &str {
        "fake-gauss"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {
        self.db().closed += 1;
    }
}

#[async_trait]
impl MetadataReader for FakeTarget {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.db().tables.keys().cloned().collect())
    }

    async fn list_views(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        Ok(self
            .db()
            .tables
            .get(&fold_gauss(table))
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .db()
            .tables
            .get(&fold_gauss(table))
            .map(|t| t.primary_key.clone())
            .unwrap_or_default())
    }

    async fn index_entries(&self, _table: &str) -> Result<Vec<IndexEntry>> {
        Ok(Vec::new())
    }

    async fn imported_keys(&self, _table: &str) -> Result<Vec<ImportedKey>> {
        Ok(Vec::new())
    }

    async fn table_comment(&self, _table: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn show_create(&self, _kind: ObjectKind, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[async_trait]
impl StatementWriter for FakeTarget {
    async fn begin(&self) -> Result<()> {
        let mut session = self.session.lock().unwrap();
        *session = Session {
            in_transaction: true,
            ..Session::default()
        };
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut session = self.session.lock().unwrap();
        let mut db = self.db();
        for sql in session.statements.drain(..) {
            apply_statement(&mut db, &sql);
        }
        for (table, row) in session.rows.drain(..) {
            db.tables.entry(table).or_default().rows.push(row);
        }
        session.in_transaction = false;
        db.commits += 1;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut session = self.session.lock().unwrap();
        *session = Session::default();
        self.db().rollbacks += 1;
        Ok(())
    }

    async fn set_search_path(&self, schema: &str) -> Result<()> {
        self.db().search_path = Some(schema.to_string());
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut session = self.session.lock().unwrap();
        let mut db = self.db();
        db.executed.push(sql.to_string());

        if db.fail_statements.iter().any(|f| sql.contains(f.as_str())) {
            return Err(MigrateError::statement(sql, "injected failure"));
        }
        if let Some((name, _)) = parse_create_table(sql) {
            if db.tables.contains_key(&name) {
                return Err(MigrateError::statement(sql, "relation already exists"));
            }
        }

        if session.in_transaction {
            session.statements.push(sql.to_string());
        } else {
            apply_statement(&mut db, sql);
        }
        Ok(0)
    }

    async fn execute_batch(&self, sql: &str, rows: &[Row]) -> Result<u64> {
        let mut session = self.session.lock().unwrap();
        let mut db = self.db();
        let table = stored_name(sql.split_whitespace().nth(2).unwrap_or_default());
        db.flushes.push((table.clone(), rows.len()));

        if db.fail_batches.contains(&table) {
            return Err(MigrateError::statement(sql, "injected batch failure"));
        }
        if !db.tables.contains_key(&table) {
            return Err(MigrateError::statement(sql, "relation does not exist"));
        }

        for row in rows {
            if session.in_transaction {
                session.rows.push((table.clone(), row.clone()));
            } else {
                db.tables.entry(table.clone()).or_default().rows.push(row.clone());
            }
        }
        Ok(rows.len() as u64)
    }
}

/// Connector handing out fresh sessions over shared in-memory databases.
#[derive(Clone, Default)]
pub struct FakeConnector {
    pub source: Arc<Mutex<SourceDb>>,
    pub target: Arc<Mutex<TargetDb>>,
    pub source_down: Arc<AtomicBool>,
    pub target_down: Arc<AtomicBool>,
}

impl FakeConnector {
    pub fn new(source: SourceDb) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            ..Self::default()
        }
    }

    pub fn source(&self) -> MutexGuard<'_, SourceDb> {
        self.source.lock().unwrap()
    }

    pub fn target(&self) -> MutexGuard<'_, TargetDb> {
        self.target.lock().unwrap()
    }

    /// Create every source table, empty, on the target under its folded name.
    pub fn mirror_tables(&self) {
        let copies: Vec<(String, FakeTable)> = self
            .source()
            .tables
            .iter()
            .map(|(name, t)| (fold_gauss(name), t.empty_copy()))
            .collect();
        self.target().tables.extend(copies);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect_source(&self) -> Result<Box<dyn SourceConnection>> {
        if self.source_down.load(Ordering::SeqCst) {
            return Err(MigrateError::connectivity("connection refused", "connecting to source"));
        }
        Ok(Box::new(FakeSource {
            db: Arc::clone(&self.source),
        }))
    }

    async fn connect_target(&self) -> Result<Box<dyn TargetConnection>> {
        if self.target_down.load(Ordering::SeqCst) {
            return Err(MigrateError::connectivity("connection refused", "connecting to target"));
        }
        self.target().connections += 1;
        Ok(Box::new(FakeTarget {
            db: Arc::clone(&self.target),
            session: Mutex::new(Session::default()),
        }))
    }
}

/// Name as the target stores it: quoted names verbatim, bare names folded.
pub fn stored_name(token: &str) -> String {
    match token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(quoted) => quoted.replace("\"\"", "\""),
        None => fold_gauss(token),
    }
}

/// Parse a single-line `CREATE TABLE name ( col TYPE ..., PRIMARY KEY (...) )`.
pub fn parse_create_table(sql: &str) -> Option<(String, FakeTable)> {
    let rest = sql.trim().strip_prefix("CREATE TABLE ")?;
    let open = rest.find('(')?;
    let close = rest.rfind(')')?;
    let name = stored_name(rest[..open].trim());

    let mut items = Vec::new();
    let mut depth = 0;
    let mut current = String::new();
    for c in rest[open + 1..close].chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                items.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    items.push(current);

    let mut table = FakeTable::default();
    for item in items.iter().map(|i| i.trim()).filter(|i| !i.is_empty()) {
        if let Some(keys) = item.strip_prefix("PRIMARY KEY") {
            let keys = keys.trim().trim_start_matches('(').trim_end_matches(')');
            table.primary_key = keys.split(',').map(|k| stored_name(k.trim())).collect();
            continue;
        }
        let mut tokens = item.split_whitespace();
        let col_name = tokens.next()?;
        let col_type = tokens.next()?;
        let (data_type, size) = match col_type.split_once('(') {
            Some((base, args)) => (
                base.to_string(),
                args.trim_end_matches(')').parse().unwrap_or(0),
            ),
            None => (col_type.to_string(), 0),
        };
        let ordinal = table.columns.len() as u32 + 1;
        let mut col = column(&stored_name(col_name), &data_type, size, ordinal);
        col.is_nullable = !item.contains("NOT NULL");
        table.columns.push(col);
    }

    Some((name, table))
}

pub fn column(name: &str, data_type: &str, size: u64, ordinal: u32) -> Column {
    Column {
        name: name.to_string(),
        data_type: data_type.to_string(),
        size,
        is_nullable: true,
        is_auto_increment: false,
        default_value: None,
        comment: None,
        ordinal_pos: ordinal,
    }
}

fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// `orders(id INT PK, name VARCHAR(50), created DATETIME DEFAULT CURRENT_TIMESTAMP)`.
pub fn orders_table(rows: usize) -> FakeTable {
    let mut id = column("id", "INT", 10, 1);
    id.is_nullable = false;
    let mut created = column("created", "DATETIME", 19, 3);
    created.default_value = Some("CURRENT_TIMESTAMP".to_string());

    FakeTable {
        // Catalog order differs from ordinal order on purpose.
        columns: vec![created, id, column("name", "VARCHAR", 50, 2)],
        primary_key: vec!["id".to_string()],
        rows: (0..rows)
            .map(|i| {
                vec![
                    SqlValue::I32(i as i32),
                    SqlValue::Text(format!("order-{}", i)),
                    SqlValue::DateTime(base_time() + chrono::Duration::seconds(i as i64)),
                ]
            })
            .collect(),
        ..FakeTable::default()
    }
}

/// `name(id INT, label VARCHAR(20))` with `rows` rows.
pub fn simple_table(rows: usize) -> FakeTable {
    FakeTable {
        columns: vec![column("id", "INT", 10, 1), column("label", "VARCHAR", 20, 2)],
        rows: (0..rows)
            .map(|i| vec![SqlValue::I64(i as i64), SqlValue::Text(format!("row {}", i))])
            .collect(),
        ..FakeTable::default()
    }
}

pub fn source_with(tables: Vec<(&str, FakeTable)>) -> SourceDb {
    SourceDb {
        tables: tables
            .into_iter()
            .map(|(name, t)| (name.to_string(), t))
            .collect(),
        ..SourceDb::default()
    }
}

/// Configuration writing scripts to `output_dir`.
pub fn test_config(output_dir: &std::path::Path, batch_size: usize) -> Config {
    Config {
        source: SourceConfig {
            host: "mysql.test".to_string(),
            port: 3306,
            database: "shop".to_string(),
            user: "reader".to_string(),
            password: "secret".to_string(),
        },
        target: TargetConfig {
            host: "gauss.test".to_string(),
            port: 5432,
            database: "warehouse".to_string(),
            user: "writer".to_string(),
            password: "secret".to_string(),
            schema: "public".to_string(),
            ssl_mode: "disable".to_string(),
        },
        migration: MigrationConfig {
            batch_size,
            output_dir: output_dir.to_path_buf(),
            ..MigrationConfig::default()
        },
    }
}
