use log::{error, warn, Level};
use logging_timer::timer;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;

use crate::error::UpgradeError;
use crate::schema::{quote_ident, ColumnDefinition};

/// Column metadata as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
    pub not_null: bool,
    /// Default clause exactly as stored in the schema, including any quotes.
    pub default: Option<String>,
    pub pk: i64,
}

impl ColumnInfo {
    fn definition(&self, inline_pk: bool, autoincrement: bool) -> String {
        let mut def = quote_ident(&self.name);
        if !self.decl_type.is_empty() {
            def.push(' ');
            def.push_str(&self.decl_type);
        }
        if self.not_null {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        if inline_pk && self.pk > 0 {
            def.push_str(" PRIMARY KEY");
            if autoincrement {
                def.push_str(" AUTOINCREMENT");
            }
        }
        def
    }
}

// One column of a table being rebuilt: its new definition, its new name and
// the column of the old table its values are copied from (None leaves the default).
struct RebuildColumn {
    definition: String,
    target: String,
    source: Option<String>,
}

/// An open Timelapse database file.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open an existing file for reading and writing. Never creates a file.
    pub fn open(path: &Path) -> Result<Self, UpgradeError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        // Table rebuilds drop and recreate tables that other tables reference
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;

        Ok(Database { conn })
    }

    pub fn open_read_only(path: &Path) -> Result<Self, UpgradeError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(Database { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Close the connection, releasing the file so it can be replaced.
    pub fn close(self) -> Result<(), UpgradeError> {
        self.conn.close().map_err(|(_, e)| UpgradeError::DatabaseError(e))
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction, committing on success
    /// and rolling back on any error.
    pub fn immediate_transaction<T, F>(conn: &Connection, f: F) -> Result<T, UpgradeError>
    where
        F: FnOnce(&Connection) -> Result<T, UpgradeError>,
    {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                    error!("Rollback failed after error '{}': {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }

    /// True when `PRAGMA quick_check` returns exactly one row reading `ok`.
    pub fn quick_check(conn: &Connection) -> Result<bool, UpgradeError> {
        let mut stmt = conn.prepare("PRAGMA quick_check")?;
        let rows: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows.len() == 1 && rows[0] == "ok")
    }

    pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, UpgradeError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn table_exists_and_not_empty(
        conn: &Connection,
        table: &str,
    ) -> Result<bool, UpgradeError> {
        if !Self::table_exists(conn, table)? {
            return Ok(false);
        }
        let row: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM {} LIMIT 1", quote_ident(table)),
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    pub fn columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>, UpgradeError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    decl_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    default: row.get(4)?,
                    pk: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    pub fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>, UpgradeError> {
        Ok(Self::columns(conn, table)?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    pub fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, UpgradeError> {
        Ok(Self::columns(conn, table)?
            .iter()
            .any(|c| c.name == column))
    }

    pub fn add_column_at_end(
        conn: &Connection,
        table: &str,
        column: &ColumnDefinition,
    ) -> Result<(), UpgradeError> {
        if Self::has_column(conn, table, &column.name)? {
            return Err(UpgradeError::Error(format!(
                "Column '{}' already exists in {}",
                column.name, table
            )));
        }
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            column.to_sql()
        ))?;
        Ok(())
    }

    /// Insert a column at the zero-based `position`, rebuilding the table.
    /// A position past the last column appends.
    pub fn add_column_at(
        conn: &Connection,
        table: &str,
        column: &ColumnDefinition,
        position: usize,
    ) -> Result<(), UpgradeError> {
        if Self::has_column(conn, table, &column.name)? {
            return Err(UpgradeError::Error(format!(
                "Column '{}' already exists in {}",
                column.name, table
            )));
        }
        let count = Self::columns(conn, table)?.len();
        if position >= count {
            return Self::add_column_at_end(conn, table, column);
        }

        Self::rebuild_table(conn, table, |cols| {
            cols.insert(
                position,
                RebuildColumn {
                    definition: column.to_sql(),
                    target: column.name.clone(),
                    source: None,
                },
            );
            Ok(())
        })
    }

    /// Returns false, changing nothing, when the column does not exist.
    pub fn delete_column(conn: &Connection, table: &str, column: &str) -> Result<bool, UpgradeError> {
        if !Self::has_column(conn, table, column)? {
            return Ok(false);
        }
        Self::rebuild_table(conn, table, |cols| {
            cols.retain(|c| c.target != column);
            Ok(())
        })?;
        Ok(true)
    }

    /// Rename a column, keeping its type and default. Returns false when the
    /// source column does not exist.
    pub fn rename_column(
        conn: &Connection,
        table: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<bool, UpgradeError> {
        if Self::has_column(conn, table, new_name)? {
            return Err(UpgradeError::Error(format!(
                "Cannot rename {}.{} to '{}': the column already exists",
                table, old_name, new_name
            )));
        }
        let Some(info) = Self::columns(conn, table)?
            .into_iter()
            .find(|c| c.name == old_name)
        else {
            return Ok(false);
        };

        let renamed = ColumnInfo {
            name: new_name.to_owned(),
            ..info
        };
        let single_pk = Self::single_pk(conn, table)?;
        let autoincrement = Self::uses_autoincrement(conn, table)?;
        Self::rebuild_table(conn, table, |cols| {
            if let Some(col) = cols.iter_mut().find(|c| c.target == old_name) {
                col.definition = renamed.definition(single_pk, autoincrement);
                col.target = new_name.to_owned();
            }
            Ok(())
        })?;
        Ok(true)
    }

    /// Replace a column's definition (name, type and default) while keeping its values.
    /// Returns false when the column does not exist.
    pub fn alter_column(
        conn: &Connection,
        table: &str,
        column: &str,
        replacement: &ColumnDefinition,
    ) -> Result<bool, UpgradeError> {
        if !Self::has_column(conn, table, column)? {
            return Ok(false);
        }
        if replacement.name != column && Self::has_column(conn, table, &replacement.name)? {
            return Err(UpgradeError::Error(format!(
                "Cannot alter {}.{} to '{}': the column already exists",
                table, column, replacement.name
            )));
        }
        Self::rebuild_table(conn, table, |cols| {
            if let Some(col) = cols.iter_mut().find(|c| c.target == column) {
                col.definition = replacement.to_sql();
                col.target = replacement.name.clone();
            }
            Ok(())
        })?;
        Ok(true)
    }

    pub fn drop_table(conn: &Connection, table: &str) -> Result<(), UpgradeError> {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))?;
        Ok(())
    }

    pub fn rename_table(conn: &Connection, from: &str, to: &str) -> Result<(), UpgradeError> {
        conn.execute_batch(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(from),
            quote_ident(to)
        ))?;
        Ok(())
    }

    /// Set `column` to `value` in every row.
    pub fn set_column_value(
        conn: &Connection,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<usize, UpgradeError> {
        let changed = conn.execute(
            &format!("UPDATE {} SET {} = ?", quote_ident(table), quote_ident(column)),
            [value],
        )?;
        Ok(changed)
    }

    pub fn replace_values(
        conn: &Connection,
        table: &str,
        column: &str,
        from: &str,
        to: &str,
    ) -> Result<usize, UpgradeError> {
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET {col} = ?1 WHERE {col} = ?2",
                quote_ident(table),
                col = quote_ident(column)
            ),
            params![to, from],
        )?;
        Ok(changed)
    }

    /// Distinct values of a column, with NULL read as an empty string.
    pub fn distinct_values(
        conn: &Connection,
        table: &str,
        column: &str,
    ) -> Result<Vec<String>, UpgradeError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT CAST({} AS TEXT) FROM {}",
            quote_ident(column),
            quote_ident(table)
        ))?;
        let values = stmt
            .query_map([], |row| row.get::<_, Option<String>>(0))?
            .map(|v| v.map(Option::unwrap_or_default))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }

    /// Trim leading and trailing spaces from text values of the named columns.
    /// Columns that do not exist are skipped.
    pub fn trim_columns(conn: &Connection, table: &str, columns: &[String]) -> Result<(), UpgradeError> {
        let existing = Self::column_names(conn, table)?;
        for column in columns.iter().filter(|c| existing.contains(c)) {
            conn.execute(
                &format!(
                    "UPDATE {} SET {col} = TRIM({col}) WHERE typeof({col}) = 'text'",
                    quote_ident(table),
                    col = quote_ident(column)
                ),
                [],
            )?;
        }
        Ok(())
    }

    /// Replace NULL values of the named columns with the empty string.
    pub fn null_to_empty(conn: &Connection, table: &str, columns: &[String]) -> Result<(), UpgradeError> {
        let existing = Self::column_names(conn, table)?;
        for column in columns.iter().filter(|c| existing.contains(c)) {
            conn.execute(
                &format!(
                    "UPDATE {} SET {col} = '' WHERE {col} IS NULL",
                    quote_ident(table),
                    col = quote_ident(column)
                ),
                [],
            )?;
        }
        Ok(())
    }

    pub fn drop_index_if_exists(conn: &Connection, index: &str) -> Result<(), UpgradeError> {
        conn.execute_batch(&format!("DROP INDEX IF EXISTS {}", quote_ident(index)))?;
        Ok(())
    }

    pub fn create_index_if_not_exists(
        conn: &Connection,
        index: &str,
        table: &str,
        columns: &[&str],
    ) -> Result<(), UpgradeError> {
        let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(index),
            quote_ident(table),
            cols.join(", ")
        ))?;
        Ok(())
    }

    fn single_pk(conn: &Connection, table: &str) -> Result<bool, UpgradeError> {
        Ok(Self::columns(conn, table)?.iter().filter(|c| c.pk > 0).count() == 1)
    }

    fn uses_autoincrement(conn: &Connection, table: &str) -> Result<bool, UpgradeError> {
        let sql: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
                [table],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(sql
            .map(|s| s.to_ascii_uppercase().contains("AUTOINCREMENT"))
            .unwrap_or(false))
    }

    // Recreate `table` with an edited column list: create `{table}NEW`, copy
    // the rows across, drop the original and rename the copy. Indexes on the
    // original are recreated where their columns survive.
    fn rebuild_table<F>(conn: &Connection, table: &str, edit: F) -> Result<(), UpgradeError>
    where
        F: FnOnce(&mut Vec<RebuildColumn>) -> Result<(), UpgradeError>,
    {
        let _tmr = timer!(Level::Trace; "Database::rebuild_table", "{}", table);

        let infos = Self::columns(conn, table)?;
        let pk_columns: Vec<&ColumnInfo> = infos.iter().filter(|c| c.pk > 0).collect();
        let inline_pk = pk_columns.len() == 1;
        let autoincrement = inline_pk && Self::uses_autoincrement(conn, table)?;

        let mut cols: Vec<RebuildColumn> = infos
            .iter()
            .map(|c| RebuildColumn {
                definition: c.definition(inline_pk, autoincrement),
                target: c.name.clone(),
                source: Some(c.name.clone()),
            })
            .collect();
        edit(&mut cols)?;

        let mut definitions: Vec<String> = cols.iter().map(|c| c.definition.clone()).collect();
        if pk_columns.len() > 1 {
            let surviving: Vec<String> = pk_columns
                .iter()
                .filter_map(|pk| {
                    cols.iter()
                        .find(|c| c.source.as_deref() == Some(pk.name.as_str()))
                        .map(|c| quote_ident(&c.target))
                })
                .collect();
            if !surviving.is_empty() {
                definitions.push(format!("PRIMARY KEY ({})", surviving.join(", ")));
            }
        }

        let indexes = Self::index_sql(conn, table)?;
        let new_table = format!("{}NEW", table);
        Self::drop_table(conn, &new_table)?;
        conn.execute_batch(&format!(
            "CREATE TABLE {} ({})",
            quote_ident(&new_table),
            definitions.join(", ")
        ))?;

        let (targets, sources): (Vec<String>, Vec<String>) = cols
            .iter()
            .filter_map(|c| {
                c.source
                    .as_ref()
                    .map(|s| (quote_ident(&c.target), quote_ident(s)))
            })
            .unzip();
        if !targets.is_empty() {
            conn.execute_batch(&format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                quote_ident(&new_table),
                targets.join(", "),
                sources.join(", "),
                quote_ident(table)
            ))?;
        }

        Self::drop_table(conn, table)?;
        Self::rename_table(conn, &new_table, table)?;

        for (name, sql) in indexes {
            if let Err(err) = conn.execute_batch(&sql) {
                warn!("Index {} on {} not recreated after rebuild: {}", name, table, err);
            }
        }

        Ok(())
    }

    fn index_sql(conn: &Connection, table: &str) -> Result<Vec<(String, String)>, UpgradeError> {
        let mut stmt = conn.prepare(
            "SELECT name, sql FROM sqlite_master
             WHERE type = 'index' AND tbl_name = ? AND sql IS NOT NULL",
        )?;
        let indexes = stmt
            .query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.ddb");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE DataTable (
                    Id INTEGER PRIMARY KEY AUTOINCREMENT,
                    File TEXT DEFAULT '',
                    Folder TEXT DEFAULT '',
                    Date TEXT DEFAULT '',
                    Note0 TEXT DEFAULT 'x'
                );
                CREATE INDEX IndexFile ON DataTable (File);
                INSERT INTO DataTable (File, Folder, Date, Note0) VALUES ('a.jpg', 'f', '01-Jan-2020', ' padded ');
                INSERT INTO DataTable (File, Folder, Date, Note0) VALUES ('b.jpg', 'f', NULL, NULL);",
            )
            .unwrap();
        }
        let db = Database::open(&path).unwrap();
        (dir, db)
    }

    #[test]
    fn test_table_exists_and_quick_check() {
        let (_dir, db) = setup();
        assert!(Database::quick_check(db.conn()).unwrap());
        assert!(Database::table_exists(db.conn(), "DataTable").unwrap());
        assert!(!Database::table_exists(db.conn(), "Missing").unwrap());
        assert!(Database::table_exists_and_not_empty(db.conn(), "DataTable").unwrap());
    }

    #[test]
    fn test_open_does_not_create_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.ddb");
        assert!(Database::open(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_add_column_at_position_keeps_rows() {
        let (_dir, db) = setup();
        let conn = db.conn();
        Database::add_column_at(conn, "DataTable", &ColumnDefinition::text("RelativePath", ""), 2)
            .unwrap();

        assert_eq!(
            Database::column_names(conn, "DataTable").unwrap(),
            vec!["Id", "File", "RelativePath", "Folder", "Date", "Note0"]
        );
        let file: String = conn
            .query_row("SELECT File FROM DataTable WHERE Id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(file, "a.jpg");
        let rel: String = conn
            .query_row("SELECT RelativePath FROM DataTable WHERE Id = 2", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rel, "");
        assert!(Database::uses_autoincrement(conn, "DataTable").unwrap());
    }

    #[test]
    fn test_add_existing_column_is_error() {
        let (_dir, db) = setup();
        let def = ColumnDefinition::text("File", "");
        assert!(Database::add_column_at_end(db.conn(), "DataTable", &def).is_err());
        assert!(Database::add_column_at(db.conn(), "DataTable", &def, 1).is_err());
    }

    #[test]
    fn test_delete_column() {
        let (_dir, db) = setup();
        let conn = db.conn();
        assert!(Database::delete_column(conn, "DataTable", "Folder").unwrap());
        assert!(!Database::has_column(conn, "DataTable", "Folder").unwrap());
        assert!(!Database::delete_column(conn, "DataTable", "Folder").unwrap());
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM DataTable", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 2);
        // The File index survives the rebuild
        let idx: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name='IndexFile'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_rename_column() {
        let (_dir, db) = setup();
        let conn = db.conn();
        assert!(Database::rename_column(conn, "DataTable", "Folder", "Place").unwrap());
        assert!(Database::has_column(conn, "DataTable", "Place").unwrap());
        assert!(!Database::rename_column(conn, "DataTable", "Folder", "Other").unwrap());
        assert!(Database::rename_column(conn, "DataTable", "Place", "File").is_err());
    }

    #[test]
    fn test_alter_column_default() {
        let (_dir, db) = setup();
        let conn = db.conn();
        let def = ColumnDefinition::text("Note0", "changed");
        assert!(Database::alter_column(conn, "DataTable", "Note0", &def).unwrap());
        let info = Database::columns(conn, "DataTable")
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Note0")
            .unwrap();
        assert_eq!(info.default.as_deref(), Some("'changed'"));
        assert!(!Database::alter_column(conn, "DataTable", "Nope", &def).unwrap());
    }

    #[test]
    fn test_trim_and_null_to_empty() {
        let (_dir, db) = setup();
        let conn = db.conn();
        let cols = vec!["Note0".to_string(), "Date".to_string(), "Missing".to_string()];
        Database::trim_columns(conn, "DataTable", &cols).unwrap();
        Database::null_to_empty(conn, "DataTable", &cols).unwrap();
        let values = Database::distinct_values(conn, "DataTable", "Note0").unwrap();
        assert!(values.contains(&"padded".to_string()));
        assert!(values.contains(&String::new()));
    }

    #[test]
    fn test_immediate_transaction_rolls_back() {
        let (_dir, db) = setup();
        let conn = db.conn();
        let result: Result<(), UpgradeError> = Database::immediate_transaction(conn, |c| {
            Database::delete_column(c, "DataTable", "Folder")?;
            Err(UpgradeError::Error("boom".into()))
        });
        assert!(result.is_err());
        assert!(Database::has_column(conn, "DataTable", "Folder").unwrap());
    }
}
