//! Schema introspection: catalog metadata into table and view descriptors.
//!
//! Generic metadata covers tables, columns, keys and indexes. Check
//! constraints and view bodies are only available from the database's own
//! textual definition (`SHOW CREATE ...`), which is scanned here.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::core::schema::{ForeignKey, ImportedKey, Index, IndexEntry, Schema, Table, View};
use crate::core::traits::{MetadataReader, ObjectKind};
use crate::error::{MigrateError, Result};

/// Name of the implicit primary key index, excluded from index descriptors.
const PRIMARY_INDEX: &str = "PRIMARY";

/// Builds descriptors from a [`MetadataReader`].
pub struct SchemaIntrospector<'a, M: MetadataReader + ?Sized> {
    reader: &'a M,
}

impl<'a, M: MetadataReader + ?Sized> SchemaIntrospector<'a, M> {
    pub fn new(reader: &'a M) -> Self {
        Self { reader }
    }

    /// Introspect every base table and view of the connected schema.
    pub async fn introspect(&self, schema_name: &str) -> Result<Schema> {
        let table_names = self
            .reader
            .list_tables()
            .await
            .map_err(wrap("list tables"))?;

        let mut tables = Vec::with_capacity(table_names.len());
        for name in &table_names {
            tables.push(self.describe_table(name).await?);
        }

        let view_names = self
            .reader
            .list_views()
            .await
            .map_err(wrap("list views"))?;

        let mut views = Vec::with_capacity(view_names.len());
        for name in &view_names {
            if let Some(view) = self.describe_view(name).await? {
                views.push(view);
            }
        }

        info!(
            "Introspected schema {}: {} tables, {} views",
            schema_name,
            tables.len(),
            views.len()
        );

        Ok(Schema {
            name: schema_name.to_string(),
            tables,
            views,
        })
    }

    /// Build the full descriptor of one table.
    pub async fn describe_table(&self, name: &str) -> Result<Table> {
        let mut table = Table::new(name);

        table.columns = self.reader.columns(name).await.map_err(wrap("columns"))?;
        table.columns.sort_by_key(|c| c.ordinal_pos);

        table.primary_key = self
            .reader
            .primary_key(name)
            .await
            .map_err(wrap("primary key"))?;

        let entries = self
            .reader
            .index_entries(name)
            .await
            .map_err(wrap("indexes"))?;
        table.indexes = group_indexes(entries);

        let keys = self
            .reader
            .imported_keys(name)
            .await
            .map_err(wrap("foreign keys"))?;
        table.foreign_keys = group_foreign_keys(keys);

        let definition = self
            .reader
            .show_create(ObjectKind::Table, name)
            .await
            .map_err(wrap("table definition"))?;
        if let Some(definition) = definition {
            table.check_constraints = extract_check_constraints(&definition);
        }

        table.comment = self
            .reader
            .table_comment(name)
            .await
            .map_err(wrap("table comment"))?;

        debug!(
            "Table {}: {} columns, {} indexes, {} foreign keys, {} checks",
            name,
            table.columns.len(),
            table.indexes.len(),
            table.foreign_keys.len(),
            table.check_constraints.len()
        );

        Ok(table)
    }

    /// Recover a view's query. Returns `None` when the view has no definition.
    ///
    /// When no body can be located the whole definition is kept, so the view
    /// still reaches the views script and fails there visibly.
    pub async fn describe_view(&self, name: &str) -> Result<Option<View>> {
        let definition = self
            .reader
            .show_create(ObjectKind::View, name)
            .await
            .map_err(wrap("view definition"))?;

        let Some(definition) = definition else {
            warn!("Skipping view {}: no definition", name);
            return Ok(None);
        };
        let body = extract_view_body(&definition).unwrap_or_else(|| {
            warn!("View {}: no AS clause found, keeping the full definition", name);
            strip_identifier_quotes(definition.trim())
        });
        Ok(Some(View {
            name: name.to_string(),
            definition: body,
        }))
    }
}

fn wrap(what: &'static str) -> impl Fn(MigrateError) -> MigrateError {
    move |e| match e {
        e @ (MigrateError::Introspection(_) | MigrateError::Connectivity { .. }) => e,
        other => MigrateError::introspection(what, other),
    }
}

/// Group raw index entries by index name, dropping the primary key index.
///
/// Index order follows first appearance; columns follow `seq_in_index`. An
/// index is unique only if every one of its entries is unique.
pub fn group_indexes(entries: Vec<IndexEntry>) -> Vec<Index> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<IndexEntry>> = HashMap::new();

    for entry in entries {
        if entry.index_name.eq_ignore_ascii_case(PRIMARY_INDEX) {
            continue;
        }
        if !grouped.contains_key(&entry.index_name) {
            order.push(entry.index_name.clone());
        }
        grouped
            .entry(entry.index_name.clone())
            .or_default()
            .push(entry);
    }

    order
        .into_iter()
        .filter_map(|name| {
            let mut entries = grouped.remove(&name)?;
            entries.sort_by_key(|e| e.seq_in_index);
            Some(Index {
                is_unique: entries.iter().all(|e| e.is_unique),
                columns: entries.into_iter().map(|e| e.column_name).collect(),
                name,
            })
        })
        .collect()
}

/// Group imported-key rows by constraint name into foreign keys.
///
/// The referenced table and both rules come from the first row of each
/// constraint.
pub fn group_foreign_keys(keys: Vec<ImportedKey>) -> Vec<ForeignKey> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<ImportedKey>> = HashMap::new();

    for key in keys {
        if !grouped.contains_key(&key.constraint_name) {
            order.push(key.constraint_name.clone());
        }
        grouped
            .entry(key.constraint_name.clone())
            .or_default()
            .push(key);
    }

    order
        .into_iter()
        .filter_map(|name| {
            let keys = grouped.remove(&name)?;
            let first = keys.first()?.clone();
            let mut pairs: Vec<_> = keys
                .into_iter()
                .map(|k| (k.key_seq, k.column_name, k.ref_column))
                .collect();
            pairs.sort_by_key(|(seq, _, _)| *seq);
            let (columns, ref_columns): (Vec<String>, Vec<String>) =
                pairs.into_iter().map(|(_, c, r)| (c, r)).unzip();
            Some(ForeignKey {
                name,
                columns,
                ref_table: first.ref_table,
                ref_columns,
                on_update: first.update_rule,
                on_delete: first.delete_rule,
            })
        })
        .collect()
}

/// Capture `CONSTRAINT ... CHECK ...` clauses from a table definition.
///
/// One clause per line; the trailing comma and identifier quoting are removed.
pub fn extract_check_constraints(definition: &str) -> Vec<String> {
    definition
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("CONSTRAINT") && contains_keyword(line, "CHECK"))
        .map(|line| strip_identifier_quotes(line.trim_end_matches(',').trim_end()))
        .collect()
}

/// Recover the query of a view definition.
///
/// Everything after the `AS` of the first case-insensitive `AS SELECT` is
/// taken. Otherwise, for `AS WITH ...` or `AS (SELECT ...)` bodies, the
/// text after the first standalone `AS` following `VIEW`. The body is
/// trimmed and stripped of identifier quoting.
pub fn extract_view_body(definition: &str) -> Option<String> {
    // ASCII upper-casing keeps byte offsets aligned with `definition`.
    let upper = definition.to_ascii_uppercase();
    let start = match upper.find("AS SELECT") {
        Some(idx) => idx + 2,
        None => {
            let view = find_word(&upper, "VIEW", 0)?;
            find_word(&upper, "AS", view + 4)? + 2
        }
    };
    let body = definition[start..].trim();
    if body.is_empty() {
        return None;
    }
    Some(strip_identifier_quotes(body))
}

/// Byte offset of `word` at or after `from`, delimited by whitespace.
fn find_word(text: &str, word: &str, from: usize) -> Option<usize> {
    text[from..]
        .match_indices(word)
        .map(|(i, _)| from + i)
        .find(|&i| {
            let before = text[..i].chars().next_back();
            let after = text[i + word.len()..].chars().next();
            before.map_or(true, char::is_whitespace) && after.map_or(false, char::is_whitespace)
        })
}

/// Remove MySQL backtick identifier quoting.
pub fn strip_identifier_quotes(text: &str) -> String {
    text.replace('`', "")
}

fn contains_keyword(line: &str, keyword: &str) -> bool {
    line.match_indices(keyword).any(|(i, _)| {
        let before = line[..i].chars().next_back();
        let after = line[i + keyword.len()..].chars().next();
        before.map_or(true, |c| c.is_whitespace() || c == ')')
            && after.map_or(true, |c| c.is_whitespace() || c == '(')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ReferentialAction;

    fn entry(index: &str, column: &str, unique: bool, seq: u32) -> IndexEntry {
        IndexEntry {
            index_name: index.to_string(),
            column_name: column.to_string(),
            is_unique: unique,
            seq_in_index: seq,
        }
    }

    fn key(name: &str, col: &str, ref_table: &str, ref_col: &str, seq: u32) -> ImportedKey {
        ImportedKey {
            constraint_name: name.to_string(),
            column_name: col.to_string(),
            ref_table: ref_table.to_string(),
            ref_column: ref_col.to_string(),
            key_seq: seq,
            update_rule: ReferentialAction::Cascade,
            delete_rule: ReferentialAction::SetNull,
        }
    }

    #[test]
    fn test_group_indexes_excludes_primary() {
        let indexes = group_indexes(vec![
            entry("PRIMARY", "id", true, 1),
            entry("idx_name", "name", false, 1),
        ]);
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, "idx_name");
    }

    #[test]
    fn test_group_indexes_orders_columns_and_ands_uniqueness() {
        let indexes = group_indexes(vec![
            entry("uq_pair", "b", true, 2),
            entry("uq_pair", "a", true, 1),
            entry("idx_mixed", "x", true, 1),
            entry("idx_mixed", "y", false, 2),
        ]);
        assert_eq!(indexes[0].columns, vec!["a", "b"]);
        assert!(indexes[0].is_unique);
        assert_eq!(indexes[1].columns, vec!["x", "y"]);
        assert!(!indexes[1].is_unique);
    }

    #[test]
    fn test_group_foreign_keys_pairs_columns() {
        let fks = group_foreign_keys(vec![
            key("fk_line_order", "order_no", "orders", "no", 2),
            key("fk_line_order", "order_site", "orders", "site", 1),
            key("fk_line_item", "item_id", "items", "id", 1),
        ]);
        assert_eq!(fks.len(), 2);
        assert_eq!(fks[0].name, "fk_line_order");
        assert_eq!(fks[0].columns, vec!["order_site", "order_no"]);
        assert_eq!(fks[0].ref_columns, vec!["site", "no"]);
        assert_eq!(fks[0].ref_table, "orders");
        assert_eq!(fks[0].on_update, ReferentialAction::Cascade);
        assert_eq!(fks[0].on_delete, ReferentialAction::SetNull);
        assert_eq!(fks[1].ref_table, "items");
    }

    #[test]
    fn test_extract_check_constraints() {
        let ddl = "CREATE TABLE `orders` (\n  `id` int NOT NULL,\n  `qty` int DEFAULT NULL,\n  \
                   PRIMARY KEY (`id`),\n  CONSTRAINT `fk_x` FOREIGN KEY (`id`) REFERENCES `t` (`id`),\n  \
                   CONSTRAINT `chk_qty` CHECK ((`qty` > 0)),\n  \
                   CONSTRAINT `chk_id` CHECK ((`id` > 0))\n) ENGINE=InnoDB";
        let checks = extract_check_constraints(ddl);
        assert_eq!(
            checks,
            vec![
                "CONSTRAINT chk_qty CHECK ((qty > 0))",
                "CONSTRAINT chk_id CHECK ((id > 0))"
            ]
        );
    }

    #[test]
    fn test_check_keyword_inside_name_is_ignored() {
        let ddl = "  CONSTRAINT `fk_CHECKOUT` FOREIGN KEY (`a`) REFERENCES `b` (`a`),";
        assert!(extract_check_constraints(ddl).is_empty());
    }

    #[test]
    fn test_extract_view_body() {
        let ddl = "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`%` SQL SECURITY DEFINER \
                   VIEW `v_orders` AS select `o`.`id` AS `id` from `orders` `o`";
        assert_eq!(
            extract_view_body(ddl).as_deref(),
            Some("select o.id AS id from orders o")
        );
    }

    #[test]
    fn test_extract_view_body_after_view_as() {
        assert_eq!(
            extract_view_body("CREATE VIEW v AS\nSELECT 1").as_deref(),
            Some("SELECT 1")
        );
        let cte = "CREATE DEFINER=`root`@`%` VIEW `totals` AS with t as (select 1 AS n) \
                   select n from t";
        assert_eq!(
            extract_view_body(cte).as_deref(),
            Some("with t as (select 1 AS n) select n from t")
        );
        assert_eq!(
            extract_view_body("CREATE VIEW `wrapped` AS (select 1)").as_deref(),
            Some("(select 1)")
        );
    }

    #[test]
    fn test_extract_view_body_missing() {
        assert_eq!(extract_view_body("CREATE VIEW broken"), None);
        assert_eq!(extract_view_body("CREATE VIEW v AS "), None);
    }
}
