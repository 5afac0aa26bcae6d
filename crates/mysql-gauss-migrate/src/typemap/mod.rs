//! Type and default-value mapping between MySQL and GaussDB.
//!
//! [`TypeMappings`] is plain data: build it once (usually with
//! [`TypeMappings::mysql_to_gauss`]) and share it by reference. Tests can build
//! their own tables with [`TypeMappings::empty`] and the `with_*` methods.

use std::collections::HashMap;

/// Placeholder replaced by the column size in sized templates.
pub const SIZE_PLACEHOLDER: &str = "{size}";

/// Target type template for one source type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTemplate {
    template: String,
    size_multiplier: u64,
}

impl TypeTemplate {
    /// A target type that ignores the source size.
    pub fn fixed(target: impl Into<String>) -> Self {
        Self {
            template: target.into(),
            size_multiplier: 1,
        }
    }

    /// A target type containing [`SIZE_PLACEHOLDER`], substituted with
    /// `size * multiplier`.
    pub fn sized(template: impl Into<String>, multiplier: u64) -> Self {
        Self {
            template: template.into(),
            size_multiplier: multiplier,
        }
    }

    fn render(&self, size: u64) -> String {
        if self.template.contains(SIZE_PLACEHOLDER) {
            let size = size.saturating_mul(self.size_multiplier);
            self.template.replace(SIZE_PLACEHOLDER, &size.to_string())
        } else {
            self.template.clone()
        }
    }
}

/// Source → target type and default-expression lookup tables.
#[derive(Debug, Clone, Default)]
pub struct TypeMappings {
    types: HashMap<String, TypeTemplate>,
    defaults: HashMap<String, String>,
}

impl TypeMappings {
    /// Mappings with no entries: every type and default passes through.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The MySQL → GaussDB tables.
    pub fn mysql_to_gauss() -> Self {
        let fixed = [
            ("BLOB", "BYTEA"),
            ("LONGBLOB", "BYTEA"),
            ("MEDIUMBLOB", "BYTEA"),
            ("TINYBLOB", "BYTEA"),
            ("BINARY", "BYTEA"),
            ("VARBINARY", "BYTEA"),
            ("DATETIME", "TIMESTAMP"),
            ("TIMESTAMP", "TIMESTAMP"),
            ("LONGTEXT", "TEXT"),
            ("MEDIUMTEXT", "TEXT"),
            ("TINYTEXT", "VARCHAR(255)"),
            ("DOUBLE", "FLOAT8"),
            ("BIT", "BOOLEAN"),
            ("BOOLEAN", "BOOLEAN"),
            ("TINYINT", "SMALLINT"),
            ("SMALLINT", "SMALLINT"),
            ("MEDIUMINT", "INTEGER"),
            ("INT", "INTEGER"),
            ("BIGINT", "BIGINT"),
            ("FLOAT", "REAL"),
            ("DECIMAL", "NUMERIC"),
            ("YEAR", "INTEGER"),
            ("SET", "ARRAY"),
            ("JSON", "JSONB"),
            ("ENUM", "ENUM"),
            ("SERIAL", "SERIAL"),
            ("DATE", "DATE"),
            ("TIME", "TIME"),
            ("GEOMETRY", "GEOMETRY"),
            ("POINT", "POINT"),
            ("LINESTRING", "LINESTRING"),
            ("POLYGON", "POLYGON"),
        ];

        // Function-style defaults; the values are GaussDB expressions.
        let defaults = [
            ("CURRENT_TIMESTAMP", "CURRENT_TIMESTAMP"),
            ("CURRENT_TIMESTAMP(6)", "CURRENT_TIMESTAMP(6)"),
            ("CURRENT_DATE", "CURRENT_DATE"),
            ("CURRENT_TIME", "CURRENT_TIME"),
            ("NOW()", "NOW()"),
            ("LOCALTIME", "LOCALTIME"),
            ("LOCALTIMESTAMP", "LOCALTIMESTAMP"),
            ("UUID()", "gen_random_uuid()"),
            ("RAND()", "random()"),
            ("CURDATE()", "CURRENT_DATE"),
            ("CURTIME()", "CURRENT_TIME"),
            ("UNIX_TIMESTAMP()", "EXTRACT(EPOCH FROM CURRENT_TIMESTAMP)"),
            ("USER()", "CURRENT_USER"),
            ("DATABASE()", "CURRENT_DATABASE()"),
        ];

        let mut mappings = fixed
            .iter()
            .fold(Self::empty(), |m, (src, dst)| {
                m.with_type(src, TypeTemplate::fixed(*dst))
            })
            // VARCHAR lengths count characters; reserve room for multi-byte encodings.
            .with_type("VARCHAR", TypeTemplate::sized("VARCHAR({size})", 3))
            .with_type("CHAR", TypeTemplate::sized("CHAR({size})", 1));

        for (src, dst) in defaults {
            mappings = mappings.with_default(src, dst);
        }
        mappings
    }

    /// Add or replace a type mapping. The source name is case-insensitive.
    #[must_use]
    pub fn with_type(mut self, source: &str, template: TypeTemplate) -> Self {
        self.types.insert(source.to_uppercase(), template);
        self
    }

    /// Add or replace a function-default mapping. The source is case-insensitive.
    #[must_use]
    pub fn with_default(mut self, source: &str, target: &str) -> Self {
        self.defaults
            .insert(source.to_uppercase(), target.to_string());
        self
    }

    /// Map a source column type to the target type text.
    ///
    /// Unknown types are returned unchanged.
    pub fn map_type(&self, source_type: &str, size: u64) -> String {
        match self.types.get(&source_type.to_uppercase()) {
            Some(template) => template.render(size),
            None => source_type.to_string(),
        }
    }

    /// Map a source default expression to a target default expression.
    ///
    /// Known function defaults are translated; anything else is rendered as a
    /// quoted string literal.
    pub fn map_default(&self, expression: &str) -> String {
        match self.defaults.get(&expression.trim().to_uppercase()) {
            Some(target) => target.clone(),
            None => quote_literal(expression),
        }
    }
}

/// Quote text as a SQL string literal, doubling embedded single quotes.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
