//! Schema and metadata types for tables, columns, indexes, and constraints.
//!
//! Descriptors are built once by the introspector and then only read: the DDL
//! generator renders them and the transfer engine derives its column lists from
//! the same column order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Column definitions in source ordinal order.
    ///
    /// SELECT and INSERT column lists are derived from this order, so it must
    /// never be re-sorted.
    pub columns: Vec<Column>,

    /// Primary key column names.
    pub primary_key: Vec<String>,

    /// Non-primary key indexes.
    pub indexes: Vec<Index>,

    /// Foreign key constraints.
    pub foreign_keys: Vec<ForeignKey>,

    /// Check constraint clauses as recovered from the table definition,
    /// e.g. `CONSTRAINT chk_qty CHECK ((qty > 0))`.
    pub check_constraints: Vec<String>,

    /// Table comment, if any.
    pub comment: Option<String>,
}

impl Table {
    /// Create a table with no columns or constraints.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            check_constraints: Vec::new(),
            comment: None,
        }
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Source type name as reported by the catalog (e.g. "VARCHAR").
    pub data_type: String,

    /// Declared size or precision (character length for strings).
    pub size: u64,

    /// Whether the column is nullable.
    pub is_nullable: bool,

    /// Whether the column is auto-incremented.
    pub is_auto_increment: bool,

    /// Raw default value text. Either a literal or a function expression.
    pub default_value: Option<String>,

    /// Column comment.
    pub comment: Option<String>,

    /// Ordinal position in the table (1-based).
    pub ordinal_pos: u32,
}

impl Column {
    /// Upper-cased source type name, the key used by type lookups.
    pub fn normalized_type(&self) -> String {
        self.data_type.to_uppercase()
    }
}

/// Index metadata. The primary key index is never represented here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Indexed columns, in index order.
    pub columns: Vec<String>,

    /// True only if every underlying index entry is unique.
    pub is_unique: bool,
}

/// One raw index entry as returned by catalog metadata: one row per indexed
/// column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub index_name: String,
    pub column_name: String,
    pub is_unique: bool,
    /// 1-based position of the column within the index.
    pub seq_in_index: u32,
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
    NoAction,
    /// No rule reported; rendered as nothing.
    #[default]
    None,
}

impl ReferentialAction {
    /// Parse a catalog rule name such as `SET NULL`. Unknown text maps to `None`.
    pub fn parse(rule: &str) -> Self {
        match rule.trim().to_uppercase().as_str() {
            "CASCADE" => ReferentialAction::Cascade,
            "SET NULL" => ReferentialAction::SetNull,
            "SET DEFAULT" => ReferentialAction::SetDefault,
            "RESTRICT" => ReferentialAction::Restrict,
            "NO ACTION" => ReferentialAction::NoAction,
            _ => ReferentialAction::None,
        }
    }

    /// SQL keyword text, empty for `None`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::None => "",
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Foreign key constraint. A constraint references exactly one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,

    /// Local columns.
    pub columns: Vec<String>,

    /// Referenced table.
    pub ref_table: String,

    /// Referenced columns, pairwise with `columns`.
    pub ref_columns: Vec<String>,

    /// ON UPDATE rule.
    pub on_update: ReferentialAction,

    /// ON DELETE rule.
    pub on_delete: ReferentialAction,
}

/// One raw imported-key row: one row per column pair of a constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedKey {
    pub constraint_name: String,
    pub column_name: String,
    pub ref_table: String,
    pub ref_column: String,
    /// 1-based position of the pair within the constraint.
    pub key_seq: u32,
    pub update_rule: ReferentialAction,
    pub delete_rule: ReferentialAction,
}

/// View metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// View name.
    pub name: String,

    /// Defining SELECT, with dialect identifier quoting removed.
    pub definition: String,
}

/// Everything introspected from one source schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema (database) name.
    pub name: String,
    pub tables: Vec<Table>,
    pub views: Vec<View>,
}
