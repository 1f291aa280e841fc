use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Reject anything that isn't a plain SQL identifier. Table names end up in
/// both a file name and query text, so we keep them boring.
pub fn validate_table_name(name: &str) -> Result<()> {
    if !TABLE_NAME.is_match(name) {
        bail!(
            "invalid table name `{}`: use letters, digits and `_`, not starting with a digit",
            name
        );
    }
    Ok(())
}

/// Double-quote an identifier, doubling any embedded quotes.
/// Column names come straight from CSV headers and may contain spaces.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote a string literal (used for file paths handed to table functions).
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
