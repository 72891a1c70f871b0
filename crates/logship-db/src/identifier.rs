//! Identifier validation and quoting for generated SQL.
//!
//! Table and column names are derived from type and field names, never
//! from record values, but they are still validated before being spliced
//! into DDL or DML.

use logship_core::{Error, Result};

/// PostgreSQL identifier length limit in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Validate a table or column name.
///
/// Names must:
/// - Not be empty
/// - Not exceed 63 bytes
/// - Start with a letter or underscore
/// - Contain only ASCII alphanumerics and underscores
///
/// # Examples
///
/// ```
/// use logship_db::validate_identifier;
///
/// assert!(validate_identifier("log_order_log").is_ok());
/// assert!(validate_identifier("1st").is_err());
/// assert!(validate_identifier("a; DROP TABLE x").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("Identifier cannot be empty".to_string()));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidInput(format!(
            "Identifier exceeds {} byte limit: {}",
            MAX_IDENTIFIER_LEN, name
        )));
    }

    if let Some(first) = name.chars().next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::InvalidInput(format!(
                "Identifier must start with a letter or underscore: {}",
                name
            )));
        }
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_')
    {
        return Err(Error::InvalidInput(format!(
            "Identifier contains invalid character '{}': {}",
            bad, name
        )));
    }

    Ok(())
}

/// Double-quote an identifier so reserved words like `user` stay usable.
///
/// Callers validate first; validated names never contain quotes.
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Index name for `column` on `table`, cut to the identifier limit.
pub fn index_name(table: &str, column: &str) -> String {
    let mut name = format!("idx_{}_{}", table, column);
    name.truncate(MAX_IDENTIFIER_LEN);
    name
}
