//! DDL script generation.
//!
//! Descriptors are rendered into five plain-text scripts, applied in this
//! order: table structure before the data transfer, then indexes, foreign
//! keys, check constraints and views after it. The script files are the only
//! handoff to the executor.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::identifier::gauss_ident;
use crate::core::schema::{ForeignKey, Index, Schema, Table, View};
use crate::error::Result;
use crate::typemap::{quote_literal, TypeMappings};

/// Generated script artifact kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    Structure,
    Indexes,
    ForeignKeys,
    CheckConstraints,
    Views,
}

impl ScriptKind {
    /// All kinds, in application order.
    pub const ALL: [ScriptKind; 5] = [
        ScriptKind::Structure,
        ScriptKind::Indexes,
        ScriptKind::ForeignKeys,
        ScriptKind::CheckConstraints,
        ScriptKind::Views,
    ];

    /// Kinds applied after the data transfer.
    pub const POST_TRANSFER: [ScriptKind; 4] = [
        ScriptKind::Indexes,
        ScriptKind::ForeignKeys,
        ScriptKind::CheckConstraints,
        ScriptKind::Views,
    ];

    /// File name suffix appended to the schema name.
    pub fn suffix(&self) -> &'static str {
        match self {
            ScriptKind::Structure => "_table_structure.sql",
            ScriptKind::Indexes => "_indexes.sql",
            ScriptKind::ForeignKeys => "_foreign_keys.sql",
            ScriptKind::CheckConstraints => "_check_constraints.sql",
            ScriptKind::Views => "_views.sql",
        }
    }

    /// Script file name for a schema, e.g. `shop_indexes.sql`.
    pub fn file_name(&self, schema: &str) -> String {
        format!("{}{}", schema, self.suffix())
    }
}

/// The five rendered scripts of one schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedScripts {
    pub structure: String,
    pub indexes: String,
    pub foreign_keys: String,
    pub check_constraints: String,
    pub views: String,
}

impl GeneratedScripts {
    /// Script text of one kind.
    pub fn get(&self, kind: ScriptKind) -> &str {
        match kind {
            ScriptKind::Structure => &self.structure,
            ScriptKind::Indexes => &self.indexes,
            ScriptKind::ForeignKeys => &self.foreign_keys,
            ScriptKind::CheckConstraints => &self.check_constraints,
            ScriptKind::Views => &self.views,
        }
    }

    /// Write one script to `dir` and return its path.
    pub fn write(&self, kind: ScriptKind, dir: &Path, schema: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(kind.file_name(schema));
        std::fs::write(&path, self.get(kind))?;
        info!("Wrote {}", path.display());
        Ok(path)
    }
}

/// Renders descriptors into target-dialect DDL.
pub struct DdlGenerator<'a> {
    mappings: &'a TypeMappings,
}

impl<'a> DdlGenerator<'a> {
    pub fn new(mappings: &'a TypeMappings) -> Self {
        Self { mappings }
    }

    /// Render all five scripts.
    pub fn generate(&self, schema: &Schema) -> GeneratedScripts {
        GeneratedScripts {
            structure: self.structure_script(&schema.tables),
            indexes: self.index_script(&schema.tables),
            foreign_keys: self.foreign_key_script(&schema.tables),
            check_constraints: self.check_constraint_script(&schema.tables),
            views: self.view_script(&schema.views),
        }
    }

    /// `CREATE TABLE` for every table.
    pub fn structure_script(&self, tables: &[Table]) -> String {
        let mut out = String::new();
        for table in tables {
            out.push_str(&self.create_table(table));
            out.push('\n');
        }
        out
    }

    /// Render one `CREATE TABLE` statement.
    pub fn create_table(&self, table: &Table) -> String {
        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|col| {
                let mut line = format!(
                    "    {} {}",
                    gauss_ident(&col.name),
                    self.mappings.map_type(&col.data_type, col.size)
                );
                if !col.is_nullable {
                    line.push_str(" NOT NULL");
                }
                if col.is_auto_increment {
                    line.push_str(" AUTO_INCREMENT");
                }
                if let Some(default) = &col.default_value {
                    line.push_str(" DEFAULT ");
                    line.push_str(&self.mappings.map_default(default));
                }
                if let Some(comment) = col.comment.as_deref().filter(|c| !c.is_empty()) {
                    line.push_str(" COMMENT ");
                    line.push_str(&quote_literal(comment));
                }
                line
            })
            .collect();

        if table.has_pk() {
            lines.push(format!("    PRIMARY KEY ({})", ident_list(&table.primary_key)));
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n{}\n)\n",
            gauss_ident(&table.name),
            lines.join(",\n")
        );
        if let Some(comment) = table.comment.as_deref().filter(|c| !c.is_empty()) {
            let _ = writeln!(sql, "COMMENT = {}", quote_literal(comment));
        }
        sql.push_str(";\n");
        sql
    }

    /// `CREATE [UNIQUE] INDEX` statements, grouped per table.
    pub fn index_script(&self, tables: &[Table]) -> String {
        grouped(tables, |table| {
            table
                .indexes
                .iter()
                .map(|index| create_index(&table.name, index))
                .collect()
        })
    }

    /// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY` statements.
    pub fn foreign_key_script(&self, tables: &[Table]) -> String {
        grouped(tables, |table| {
            table
                .foreign_keys
                .iter()
                .map(|fk| add_foreign_key(&table.name, fk))
                .collect()
        })
    }

    /// `ALTER TABLE ... ADD CONSTRAINT ... CHECK` statements.
    pub fn check_constraint_script(&self, tables: &[Table]) -> String {
        grouped(tables, |table| {
            table
                .check_constraints
                .iter()
                .map(|clause| {
                    format!("ALTER TABLE {} ADD {};\n", gauss_ident(&table.name), clause)
                })
                .collect()
        })
    }

    /// `CREATE VIEW` statements.
    pub fn view_script(&self, views: &[View]) -> String {
        views
            .iter()
            .map(|view| {
                format!(
                    "CREATE VIEW {} AS {};\n\n",
                    gauss_ident(&view.name),
                    view.definition
                )
            })
            .collect()
    }
}

/// Concatenate each table's statements, one blank line after every non-empty
/// table group.
fn grouped(tables: &[Table], render: impl Fn(&Table) -> Vec<String>) -> String {
    let mut out = String::new();
    for table in tables {
        let statements = render(table);
        if statements.is_empty() {
            continue;
        }
        for statement in statements {
            out.push_str(&statement);
        }
        out.push('\n');
    }
    out
}

fn ident_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| gauss_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_index(table: &str, index: &Index) -> String {
    format!(
        "CREATE {}INDEX {} ON {} ({});\n",
        if index.is_unique { "UNIQUE " } else { "" },
        gauss_ident(&index.name),
        gauss_ident(table),
        ident_list(&index.columns)
    )
}

fn add_foreign_key(table: &str, fk: &ForeignKey) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})\n",
        gauss_ident(table),
        gauss_ident(&fk.name),
        ident_list(&fk.columns),
        gauss_ident(&fk.ref_table),
        ident_list(&fk.ref_columns)
    );

    let mut rules = Vec::new();
    if !fk.on_update.as_sql().is_empty() {
        rules.push(format!("ON UPDATE {}", fk.on_update));
    }
    if !fk.on_delete.as_sql().is_empty() {
        rules.push(format!("ON DELETE {}", fk.on_delete));
    }
    if !rules.is_empty() {
        let _ = writeln!(sql, "    {}", rules.join(" "));
    }
    sql.push_str(";\n");
    sql
}
