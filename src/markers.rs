use log::{info, warn};
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::database::Database;
use crate::error::UpgradeError;
use crate::schema::{column, defaults, quote_ident, quote_literal, table};

const TEMP_SUFFIX: &str = "Temp";

fn parse_point(coords: &str) -> Option<(f64, f64)> {
    let (x, y) = coords.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Whether a cell already holds the JSON array form.
fn is_json_cell(cell: &str) -> bool {
    cell.trim_start().starts_with('[') && serde_json::from_str::<Vec<String>>(cell).is_ok()
}

/// Convert a legacy `x,y|x,y` marker cell into a JSON array of `"x,y"` strings.
/// Points that cannot be read are skipped. Cells already in JSON form are
/// returned unchanged.
pub fn cell_to_json(cell: &str) -> Result<String, UpgradeError> {
    if is_json_cell(cell) {
        return Ok(cell.to_owned());
    }
    let points: Vec<String> = cell
        .split('|')
        .filter(|p| !p.trim().is_empty())
        .filter_map(|p| match parse_point(p) {
            Some((x, y)) => Some(format!("{},{}", x, y)),
            None => {
                warn!("Skipping unreadable marker point '{}'", p);
                None
            }
        })
        .collect();
    Ok(serde_json::to_string(&points)?)
}

/// Rebuild `MarkersTable` with one JSON column per counter and a foreign key
/// into `DataTable`. Rows with no marker data in any counter are dropped.
pub fn convert_markers_table(conn: &Connection, counters: &[String]) -> Result<(), UpgradeError> {
    let temp_table = format!("{}{}", table::MARKERS, TEMP_SUFFIX);
    Database::drop_table(conn, &temp_table)?;

    let mut definitions = vec![format!("{} INTEGER PRIMARY KEY", quote_ident(column::ID))];
    definitions.extend(counters.iter().map(|c| {
        format!(
            "{} TEXT DEFAULT {}",
            quote_ident(c),
            quote_literal(defaults::MARKER_CELL)
        )
    }));
    definitions.push(format!(
        "FOREIGN KEY({id}) REFERENCES {data}({id}) ON DELETE CASCADE",
        id = quote_ident(column::ID),
        data = quote_ident(table::DATA)
    ));
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({})",
        quote_ident(&temp_table),
        definitions.join(", ")
    ))?;

    let mut copied = 0;
    if Database::table_exists(conn, table::MARKERS)? {
        let existing = Database::column_names(conn, table::MARKERS)?;
        let select_columns: Vec<String> = counters
            .iter()
            .map(|c| {
                if existing.contains(c) {
                    quote_ident(c)
                } else {
                    "NULL".to_owned()
                }
            })
            .collect();
        let mut select = vec![quote_ident(column::ID)];
        select.extend(select_columns);

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {}",
            select.join(", "),
            quote_ident(table::MARKERS)
        ))?;
        let rows: Vec<(i64, Vec<String>)> = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let cells = (1..=counters.len())
                    .map(|i| {
                        Ok(match row.get_ref(i)? {
                            ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
                            _ => String::new(),
                        })
                    })
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok((id, cells))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut insert_columns: Vec<String> = counters.iter().map(|c| quote_ident(c)).collect();
        insert_columns.push(quote_ident(column::ID));
        let placeholders: Vec<String> = (1..=insert_columns.len()).map(|i| format!("?{}", i)).collect();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&temp_table),
            insert_columns.join(", "),
            placeholders.join(", ")
        );

        for (id, cells) in rows {
            if cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            let mut values: Vec<rusqlite::types::Value> = cells
                .iter()
                .map(|c| cell_to_json(c).map(rusqlite::types::Value::Text))
                .collect::<Result<Vec<_>, _>>()?;
            values.push(rusqlite::types::Value::Integer(id));
            conn.execute(&insert_sql, rusqlite::params_from_iter(values))?;
            copied += 1;
        }
    }

    Database::drop_table(conn, table::MARKERS)?;
    Database::rename_table(conn, &temp_table, table::MARKERS)?;
    info!("Markers table converted to JSON points, {} rows kept", copied);
    Ok(())
}
