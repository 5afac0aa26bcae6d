//! Identifier quoting and case folding for both sides of a migration.
//!
//! MySQL keeps table and column names as written (on case-sensitive file
//! systems). GaussDB folds unquoted identifiers to lower case, so a name
//! created as `OrderItems` is stored as `orderitems`. Everything that renders
//! target SQL goes through [`gauss_ident`], and everything that looks a source
//! name up on the target goes through [`fold_gauss`], so both agree on the
//! stored form.

/// GaussDB keywords that cannot appear as bare table or column names.
const RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "binary", "both", "case", "cast", "check", "collate", "column",
    "constraint", "create", "current_catalog", "current_date", "current_role",
    "current_time", "current_timestamp", "current_user", "default", "deferrable", "desc",
    "distinct", "do", "else", "end", "except", "false", "fetch", "for", "foreign", "freeze",
    "from", "full", "grant", "group", "having", "ilike", "in", "initially", "inner",
    "intersect", "into", "is", "isnull", "join", "leading", "left", "like", "limit",
    "localtime", "localtimestamp", "natural", "not", "notnull", "null", "offset", "on",
    "only", "or", "order", "outer", "overlaps", "placing", "primary", "references",
    "returning", "right", "select", "session_user", "similar", "some", "symmetric",
    "table", "then", "to", "trailing", "true", "union", "unique", "user", "using",
    "variadic", "verbose", "when", "where", "window", "with",
];

/// Quote a MySQL identifier using backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("table`name"), "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a GaussDB identifier using double quotes.
pub fn quote_gauss(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The name GaussDB stores for an unquoted identifier.
///
/// Only ASCII letters are folded, as the server does for multibyte
/// encodings.
pub fn fold_gauss(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Render a source name for target DDL and DML.
///
/// Plain names are written bare and fold on the server. Reserved words and
/// names with other characters are quoted in their folded form, so the
/// stored name is [`fold_gauss`] of the source name either way.
pub fn gauss_ident(name: &str) -> String {
    if is_plain(name) && !is_reserved(name) {
        name.to_string()
    } else {
        quote_gauss(&fold_gauss(name))
    }
}

fn is_plain(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn is_reserved(name: &str) -> bool {
    let folded = fold_gauss(name);
    RESERVED.contains(&folded.as_str())
}
