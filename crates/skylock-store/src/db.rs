use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Reject anything that isn't a plain identifier, since the table name is
/// spliced into SQL text.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && table.len() <= 64;
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

/// Initialise the lease table in `conn`.
///
/// Idempotent. Timestamps are epoch milliseconds from the database clock;
/// rows are never deleted, only updated in place.
pub fn init_db(conn: &Connection, table: &str) -> Result<()> {
    validate_table_name(table)?;
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS {table} (
            name        TEXT    NOT NULL PRIMARY KEY,
            lock_until  INTEGER NOT NULL,   -- epoch ms, exclusive
            locked_at   INTEGER NOT NULL,   -- epoch ms
            locked_by   TEXT    NOT NULL
        ) STRICT;
        "
    ))?;
    Ok(())
}
