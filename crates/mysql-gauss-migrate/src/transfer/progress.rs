//! Row and table counters of one transfer run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// Counters of one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub total: u64,
    pub processed: u64,
    pub batches: u64,
}

/// Progress after one batch of a table, as logged.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub table: String,
    pub table_processed: u64,
    pub table_total: u64,
    pub table_percent: f64,
    pub processed_records: u64,
    pub total_records: u64,
    pub overall_percent: f64,
    pub processed_tables: usize,
    pub total_tables: usize,
    /// Time left at the rate so far; `None` before the first row.
    pub eta: Option<Duration>,
}

impl fmt::Display for BatchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Progress {}: {:.2}% ({}/{}), overall {:.2}% ({}/{}), tables {}/{}, ETA ",
            self.table,
            self.table_percent,
            self.table_processed,
            self.table_total,
            self.overall_percent,
            self.processed_records,
            self.total_records,
            self.processed_tables,
            self.total_tables
        )?;
        match self.eta {
            Some(eta) => write!(f, "{}s", eta.as_secs()),
            None => write!(f, "unknown"),
        }
    }
}

/// Record and table counters of a transfer run.
///
/// Processed counts only move on batch flushes. When a table fails, its
/// processed rows are taken back out because its transaction is rolled back.
#[derive(Debug, Clone, Default)]
pub struct SyncProgress {
    total_records: u64,
    processed_records: u64,
    processed_tables: usize,
    tables: BTreeMap<String, TableCounts>,
    failed_tables: BTreeSet<String>,
}

impl SyncProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table and its row count.
    pub fn add_table(&mut self, table: &str, total: u64) {
        self.total_records += total;
        self.tables.insert(
            table.to_string(),
            TableCounts {
                total,
                ..TableCounts::default()
            },
        );
    }

    /// Exclude a table from the transfer set, undoing its processed rows.
    pub fn mark_failed(&mut self, table: &str) {
        if let Some(counts) = self.tables.get_mut(table) {
            self.processed_records -= counts.processed;
            counts.processed = 0;
        }
        self.failed_tables.insert(table.to_string());
    }

    /// Count a flushed batch.
    pub fn record_flush(&mut self, table: &str, rows: u64) {
        self.processed_records += rows;
        let counts = self.tables.entry(table.to_string()).or_default();
        counts.processed += rows;
        counts.batches += 1;
    }

    /// Count a committed table.
    pub fn finish_table(&mut self) {
        self.processed_tables += 1;
    }

    pub fn is_failed(&self, table: &str) -> bool {
        self.failed_tables.contains(table)
    }

    /// Completed share of the run, 0..=1.
    ///
    /// Measured in records; falls back to tables when there are no records.
    pub fn fraction(&self) -> f64 {
        if self.total_records > 0 {
            self.processed_records as f64 / self.total_records as f64
        } else if !self.tables.is_empty() {
            self.processed_tables as f64 / self.tables.len() as f64
        } else {
            1.0
        }
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn processed_records(&self) -> u64 {
        self.processed_records
    }

    pub fn total_tables(&self) -> usize {
        self.tables.len()
    }

    pub fn processed_tables(&self) -> usize {
        self.processed_tables
    }

    pub fn failed_tables(&self) -> &BTreeSet<String> {
        &self.failed_tables
    }

    pub fn tables(&self) -> &BTreeMap<String, TableCounts> {
        &self.tables
    }

    pub fn table(&self, table: &str) -> Option<&TableCounts> {
        self.tables.get(table)
    }

    /// Snapshot for the log line after a batch of `table`.
    ///
    /// Percentages of an empty table or run are 100. The ETA scales
    /// `elapsed` by the share of records still to go.
    pub fn batch_progress(&self, table: &str, elapsed: Duration) -> BatchProgress {
        let counts = self.tables.get(table).copied().unwrap_or_default();
        let overall = percent(self.processed_records, self.total_records);
        let eta = if self.processed_records == 0 && self.total_records > 0 {
            None
        } else {
            let remaining = (100.0 - overall).max(0.0) / overall;
            Some(elapsed.mul_f64(remaining))
        };

        BatchProgress {
            table: table.to_string(),
            table_processed: counts.processed,
            table_total: counts.total,
            table_percent: percent(counts.processed, counts.total),
            processed_records: self.processed_records,
            total_records: self.total_records,
            overall_percent: overall,
            processed_tables: self.processed_tables,
            total_tables: self.tables.len(),
            eta,
        }
    }

    /// Clear all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flushes_accumulate() {
        let mut p = SyncProgress::new();
        p.add_table("a", 30);
        p.add_table("b", 10);
        p.record_flush("a", 20);
        p.record_flush("a", 10);
        p.finish_table();
        assert_eq!(p.processed_records(), 30);
        assert_eq!(p.table("a").unwrap().batches, 2);
        assert_eq!(p.fraction(), 0.75);
    }

    #[test]
    fn test_failed_table_rows_are_reverted() {
        let mut p = SyncProgress::new();
        p.add_table("a", 10);
        p.add_table("b", 10);
        p.record_flush("a", 10);
        p.record_flush("b", 5);
        p.mark_failed("b");
        assert_eq!(p.processed_records(), 10);
        assert_eq!(p.table("b").unwrap().processed, 0);
        assert!(p.is_failed("b"));
        assert!(!p.is_failed("a"));
    }

    #[test]
    fn test_fraction_without_records_uses_tables() {
        let mut p = SyncProgress::new();
        assert_eq!(p.fraction(), 1.0);
        p.add_table("a", 0);
        p.add_table("b", 0);
        assert_eq!(p.fraction(), 0.0);
        p.finish_table();
        assert_eq!(p.fraction(), 0.5);
    }

    #[test]
    fn test_batch_progress_values() {
        let mut p = SyncProgress::new();
        p.add_table("a", 200);
        p.add_table("b", 600);
        p.record_flush("a", 200);
        p.finish_table();
        p.record_flush("b", 200);

        let line = p.batch_progress("b", Duration::from_secs(30));
        assert_eq!(line.table_processed, 200);
        assert_eq!(line.table_total, 600);
        assert!((line.table_percent - 33.333).abs() < 0.01);
        assert_eq!(line.overall_percent, 50.0);
        assert_eq!(line.processed_tables, 1);
        assert_eq!(line.total_tables, 2);
        // Half done in 30s: another 30s to go.
        assert_eq!(line.eta, Some(Duration::from_secs(30)));
        assert_eq!(
            line.to_string(),
            "Progress b: 33.33% (200/600), overall 50.00% (400/800), tables 1/2, ETA 30s"
        );
    }

    #[test]
    fn test_batch_progress_before_first_row() {
        let mut p = SyncProgress::new();
        p.add_table("a", 10);
        let line = p.batch_progress("a", Duration::from_secs(5));
        assert_eq!(line.overall_percent, 0.0);
        assert_eq!(line.eta, None);
        assert!(line.to_string().ends_with("ETA unknown"));
    }

    #[test]
    fn test_batch_progress_empty_run_is_complete() {
        let mut p = SyncProgress::new();
        p.add_table("a", 0);
        let line = p.batch_progress("a", Duration::from_secs(5));
        assert_eq!(line.table_percent, 100.0);
        assert_eq!(line.overall_percent, 100.0);
        assert_eq!(line.eta, Some(Duration::ZERO));
    }

    #[test]
    fn test_reset() {
        let mut p = SyncProgress::new();
        p.add_table("a", 3);
        p.mark_failed("a");
        p.reset();
        assert_eq!(p.total_tables(), 0);
        assert!(p.failed_tables().is_empty());
        assert_eq!(p.total_records(), 0);
    }
}
