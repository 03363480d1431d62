//! Table initialization and additive schema evolution
//!
//! Creates the table when missing, adds schema columns a previous version
//! of the table lacks, and creates the unique and lookup indexes. Every
//! statement is idempotent, so running this against an up-to-date table
//! changes nothing.

use std::collections::HashSet;

use rusqlite::Connection;

use super::table::{quote_ident, TableSpec};
use crate::errors::{sql_err, Result};

/// Column names currently present on `table`
pub fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
        .map_err(sql_err("table_info", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(sql_err("table_info", table))?
        .collect::<std::result::Result<HashSet<_>, _>>()
        .map_err(sql_err("table_info", table))?;
    Ok(columns)
}

/// Index names declared on `table`, excluding SQLite's automatic ones
pub fn index_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA index_list({})", quote_ident(table)))
        .map_err(sql_err("index_list", table))?;
    let mut names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(sql_err("index_list", table))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(sql_err("index_list", table))?;
    names.retain(|name| !name.starts_with("sqlite_autoindex_"));
    names.sort();
    Ok(names)
}

/// Add schema columns missing from an existing table; returns what was added
///
/// Added columns are always nullable, since existing rows have no value.
pub fn add_missing_columns(
    conn: &Connection,
    spec: &TableSpec,
    existing: &HashSet<String>,
) -> Result<Vec<String>> {
    let mut added = Vec::new();
    for column in spec.columns() {
        if existing.contains(&column) {
            continue;
        }
        conn.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote_ident(&spec.table),
                spec.column_def(&column)
            ),
            [],
        )
        .map_err(sql_err("add_column", &spec.table))?;
        added.push(column);
    }
    Ok(added)
}

fn create_indexes(conn: &Connection, spec: &TableSpec) -> Result<()> {
    for (index, attribute) in &spec.unique {
        conn.execute(
            &format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {}({})",
                quote_ident(&spec.unique_index_name(index)),
                quote_ident(&spec.table),
                quote_ident(attribute)
            ),
            [],
        )
        .map_err(sql_err("create_index", &spec.table))?;
    }

    for local in &spec.lookup_fields {
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                quote_ident(&spec.lookup_index_name(local)),
                quote_ident(&spec.table),
                quote_ident(local)
            ),
            [],
        )
        .map_err(sql_err("create_index", &spec.table))?;
    }
    Ok(())
}

/// Bring `spec.table` up to date and return its columns
pub fn initialize_table(conn: &Connection, spec: &TableSpec) -> Result<HashSet<String>> {
    conn.execute(&spec.create_table_sql(), [])
        .map_err(sql_err("create_table", &spec.table))?;

    let mut columns = table_columns(conn, &spec.table)?;
    let added = add_missing_columns(conn, spec, &columns)?;
    if !added.is_empty() {
        tracing::info!(table = %spec.table, columns = ?added, "added missing columns");
        columns.extend(added);
    }

    create_indexes(conn, spec)?;
    Ok(columns)
}
