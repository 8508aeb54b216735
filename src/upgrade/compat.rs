//! Brings data files written by any earlier Timelapse up to the late pre-2.3
//! layout, so the data steps always start from the same shape.

use log::{info, warn};
use rusqlite::{params, Connection};

use crate::controls::{ControlRow, TemplateTable};
use crate::database::Database;
use crate::error::UpgradeError;
use crate::legacy_date;
use crate::schema::{column, defaults, position, quote_ident, table, ColumnDefinition};
use crate::sequencer::{Step, UpgradeSession};
use crate::version::{self, Version};

const FIRST_VERSION_WITH_NULL_CHECK: &str = "2.2.2.4";
const FIRST_VERSION_WITH_UTC_OFFSET_CHECK: &str = "2.2.3.8";
const LAST_VERSION_WITHOUT_SELECTED_FOLDER: &str = "2.2.2.6";
const NEUTRAL_TIME_ZONE: &str = "UTC";

pub const STEPS: &[Step] = &[
    Step::new("read version marker", read_version),
    Step::new("add relative path column", add_relative_path),
    Step::new("add date time column", add_date_time),
    Step::new("add utc offset column", add_utc_offset),
    Step::new("migrate delete flag column", migrate_delete_flag),
    Step::new("trim white space", trim_white_space),
    Step::new("replace nulls", replace_nulls),
    Step::new("fix utc offset separator", fix_utc_offset_separator),
    Step::new("fold utc offset into date time", fold_utc_offset),
    Step::new("set version marker", set_version_marker),
    Step::new("add sort terms column", add_sort_terms),
    Step::new("add selected folder column", add_selected_folder),
    Step::new("add quick paste column", add_quick_paste),
    Step::new("add time zone column", add_time_zone),
    Step::new("rebuild legacy date times", rebuild_legacy_date_times),
];

// Column definition a data column takes from its control.
fn column_for_control(control: Option<&ControlRow>, name: &str) -> ColumnDefinition {
    match (name, control) {
        (column::DATE_TIME, _) => ColumnDefinition::date_time(name),
        (column::UTC_OFFSET, Some(_)) => ColumnDefinition::real(name, defaults::UTC_OFFSET),
        (column::UTC_OFFSET, None) => ColumnDefinition::text(name, defaults::UTC_OFFSET),
        (_, Some(c)) => ColumnDefinition::text(name, c.default_value.trim()),
        (_, None) => ColumnDefinition::text(name, ""),
    }
}

fn add_data_column(
    conn: &Connection,
    session: &UpgradeSession,
    name: &str,
    at: usize,
) -> Result<(), UpgradeError> {
    if Database::has_column(conn, table::DATA, name)? {
        return Ok(());
    }
    let definition = column_for_control(TemplateTable::find(&session.controls, name), name);
    info!("Adding {} column to {}", name, session.path.display());
    Database::add_column_at(conn, table::DATA, &definition, at)
}

fn add_image_set_column(
    conn: &Connection,
    name: &str,
    default: &str,
) -> Result<bool, UpgradeError> {
    if Database::has_column(conn, table::IMAGE_SET, name)? {
        return Ok(false);
    }
    Database::add_column_at_end(conn, table::IMAGE_SET, &ColumnDefinition::text(name, default))?;
    Ok(true)
}

/// Data labels of the template in spreadsheet order, without `Id`.
fn data_labels(controls: &[ControlRow]) -> Vec<String> {
    let mut sorted: Vec<&ControlRow> = controls.iter().collect();
    sorted.sort_by_key(|c| c.spreadsheet_order);
    sorted
        .into_iter()
        .map(|c| c.data_label.clone())
        .filter(|l| !l.is_empty() && l != column::ID)
        .collect()
}

fn read_version(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    session.version = version::read_data_version(conn)?;
    session.date_time_was_missing = !Database::has_column(conn, table::DATA, column::DATE_TIME)?;
    session.time_zone_was_missing = !Database::has_column(conn, table::IMAGE_SET, column::TIME_ZONE)?;
    session.reload_controls(conn)?;
    info!(
        "{} is at version {}",
        session.path.display(),
        session.version
    );
    Ok(())
}

fn add_relative_path(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    add_data_column(conn, session, column::RELATIVE_PATH, position::RELATIVE_PATH)
}

fn add_date_time(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    add_data_column(conn, session, column::DATE_TIME, position::DATE_TIME)
}

fn add_utc_offset(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    add_data_column(conn, session, column::UTC_OFFSET, position::UTC_OFFSET)
}

fn migrate_delete_flag(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    let has_mark = Database::has_column(conn, table::DATA, column::MARK_FOR_DELETION)?;
    let has_delete = Database::has_column(conn, table::DATA, column::DELETE_FLAG)?;
    match (has_mark, has_delete) {
        (true, false) => {
            Database::rename_column(
                conn,
                table::DATA,
                column::MARK_FOR_DELETION,
                column::DELETE_FLAG,
            )?;
        }
        (true, true) => {
            Database::delete_column(conn, table::DATA, column::MARK_FOR_DELETION)?;
        }
        (false, false) => {
            let control = TemplateTable::find(&session.controls, column::DELETE_FLAG);
            let definition = match control {
                Some(c) if !c.default_value.trim().is_empty() => {
                    ColumnDefinition::text(column::DELETE_FLAG, c.default_value.trim())
                }
                _ => ColumnDefinition::text(column::DELETE_FLAG, defaults::FLAG),
            };
            Database::add_column_at_end(conn, table::DATA, &definition)?;
        }
        (false, true) => {}
    }
    Ok(())
}

fn trim_white_space(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if !add_image_set_column(conn, column::WHITE_SPACE_TRIMMED, defaults::FLAG)? {
        return Ok(());
    }
    let columns: Vec<String> = data_labels(&session.controls)
        .into_iter()
        .filter(|l| l != column::DARK)
        .collect();
    Database::trim_columns(conn, table::DATA, &columns)?;
    Database::set_column_value(conn, table::IMAGE_SET, column::WHITE_SPACE_TRIMMED, "true")?;
    Ok(())
}

fn replace_nulls(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if session.version >= Version::parse(FIRST_VERSION_WITH_NULL_CHECK)? {
        return Ok(());
    }
    Database::null_to_empty(conn, table::DATA, &data_labels(&session.controls))
}

fn fix_utc_offset_separator(
    conn: &Connection,
    session: &mut UpgradeSession,
) -> Result<(), UpgradeError> {
    if session.version >= Version::parse(FIRST_VERSION_WITH_UTC_OFFSET_CHECK)?
        || !Database::has_column(conn, table::DATA, column::UTC_OFFSET)?
    {
        return Ok(());
    }
    conn.execute(
        &format!(
            "UPDATE {t} SET {c} = REPLACE({c}, ',', '.') WHERE INSTR({c}, ',') > 0",
            t = table::DATA,
            c = column::UTC_OFFSET
        ),
        [],
    )?;
    Ok(())
}

fn fold_utc_offset(conn: &Connection, _session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if !Database::has_column(conn, table::DATA, column::UTC_OFFSET)?
        || !Database::has_column(conn, table::DATA, column::DATE_TIME)?
    {
        return Ok(());
    }
    // Rows whose DateTime cannot be shifted keep their value
    let changed = conn.execute(
        &format!(
            "UPDATE {t} SET
                {dt} = strftime('%Y-%m-%d %H:%M:%S', datetime({dt}, {utc} || ' hours')),
                {utc} = '0.0'
             WHERE {utc} <> '0.0' AND datetime({dt}, {utc} || ' hours') IS NOT NULL",
            t = table::DATA,
            dt = column::DATE_TIME,
            utc = column::UTC_OFFSET
        ),
        [],
    )?;
    if changed > 0 {
        info!("Folded a non-zero UTC offset into {} rows", changed);
    }
    Ok(())
}

fn set_version_marker(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    add_image_set_column(conn, column::VERSION_COMPATIBILITY, Version::MINIMUM_CURRENT)?;
    Database::set_column_value(
        conn,
        table::IMAGE_SET,
        column::VERSION_COMPATIBILITY,
        &session.ctx.timelapse_version().to_string(),
    )?;
    Ok(())
}

fn add_sort_terms(conn: &Connection, _session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    add_image_set_column(conn, column::SORT_TERMS, defaults::SORT_TERMS)?;
    Ok(())
}

fn add_selected_folder(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if session.version > Version::parse(LAST_VERSION_WITHOUT_SELECTED_FOLDER)? {
        return Ok(());
    }
    add_image_set_column(conn, column::SELECTED_FOLDER, "")?;
    Ok(())
}

fn add_quick_paste(conn: &Connection, _session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    // Already converted to JSON
    if Database::has_column(conn, table::IMAGE_SET, column::QUICK_PASTE_TERMS)? {
        return Ok(());
    }
    add_image_set_column(conn, column::QUICK_PASTE_XML, defaults::QUICK_PASTE_XML)?;
    Ok(())
}

fn add_time_zone(conn: &Connection, _session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if add_image_set_column(conn, column::TIME_ZONE, "")? {
        Database::set_column_value(conn, table::IMAGE_SET, column::TIME_ZONE, NEUTRAL_TIME_ZONE)?;
    }
    Ok(())
}

fn rebuild_legacy_date_times(
    conn: &Connection,
    session: &mut UpgradeSession,
) -> Result<(), UpgradeError> {
    if !session.time_zone_was_missing && !session.date_time_was_missing {
        return Ok(());
    }
    if !Database::has_column(conn, table::DATA, column::DATE)?
        || !Database::has_column(conn, table::DATA, column::TIME)?
    {
        warn!(
            "{} has no Date and Time columns to rebuild DateTime from",
            session.path.display()
        );
        return Ok(());
    }

    let rows: Vec<(i64, String, String)> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, CAST({} AS TEXT), CAST({} AS TEXT) FROM {}",
            quote_ident(column::ID),
            quote_ident(column::DATE),
            quote_ident(column::TIME),
            table::DATA
        ))?;
        let mapped = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            ))
        })?;
        mapped.collect::<Result<Vec<_>, _>>()?
    };

    let mut update = conn.prepare(&format!(
        "UPDATE {} SET {} = ?1 WHERE {} = ?2",
        table::DATA,
        quote_ident(column::DATE_TIME),
        quote_ident(column::ID)
    ))?;
    let mut unparsed = 0usize;
    for (id, date, time) in rows {
        match legacy_date::to_date_time_column(&date, &time) {
            Some(value) => {
                update.execute(params![value, id])?;
            }
            None => unparsed += 1,
        }
    }
    if unparsed > 0 {
        warn!(
            "{} rows of {} kept their DateTime: Date and Time could not be read",
            unparsed,
            session.path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::FileKind;
    use crate::config::Config;
    use crate::context::UpgradeContext;
    use crate::sequencer::{run_steps, SequenceOutcome};
    use crate::test_support;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn text(conn: &Connection, sql: &str) -> String {
        conn.query_row(sql, [], |r| r.get::<_, Option<String>>(0))
            .unwrap()
            .unwrap_or_default()
    }

    #[test]
    fn test_compat_on_v22_data_file() {
        let dir = TempDir::new().unwrap();
        let path = test_support::legacy_data(dir.path());
        let db = Database::open(&path).unwrap();
        let conn = db.conn();
        let ctx = UpgradeContext::new(Config::default().upgrade);
        let mut session = UpgradeSession::new(&ctx, &path, FileKind::Data);

        let outcome = run_steps(conn, &mut session, STEPS);
        assert!(matches!(outcome, SequenceOutcome::Completed));
        assert_eq!(session.version, Version::parse("2.2.0.0").unwrap());
        assert!(!session.date_time_was_missing);
        assert!(!session.time_zone_was_missing);

        // The -7 hour row is shifted to local time
        assert_eq!(
            text(conn, "SELECT DateTime FROM DataTable WHERE File = 'IMG_0002.JPG'"),
            "2020-06-01 05:30:00"
        );
        assert_eq!(
            text(conn, "SELECT CAST(UtcOffset AS TEXT) FROM DataTable WHERE File = 'IMG_0002.JPG'"),
            "0.0"
        );
        // Padded values were trimmed once
        assert_eq!(
            text(conn, "SELECT Comment FROM DataTable WHERE File = 'IMG_0001.JPG'"),
            "big buck"
        );
        assert_eq!(text(conn, "SELECT VersionCompatabily FROM ImageSetTable"), "2.3.0.0");
        assert!(Database::has_column(conn, table::IMAGE_SET, column::SORT_TERMS).unwrap());
    }

    #[test]
    fn test_compat_on_v20_data_file() {
        let dir = TempDir::new().unwrap();
        let path = test_support::legacy_v20_data(dir.path());
        let db = Database::open(&path).unwrap();
        let conn = db.conn();
        let ctx = UpgradeContext::new(Config::default().upgrade);
        let mut session = UpgradeSession::new(&ctx, &path, FileKind::Data);

        let outcome = run_steps(conn, &mut session, STEPS);
        assert!(matches!(outcome, SequenceOutcome::Completed));
        assert_eq!(session.version, Version::lowest());
        assert!(session.date_time_was_missing);

        let columns = Database::column_names(conn, table::DATA).unwrap();
        assert_eq!(columns[2], column::RELATIVE_PATH);
        assert_eq!(columns[4], column::DATE_TIME);
        assert_eq!(columns[5], column::UTC_OFFSET);
        assert!(columns.iter().any(|c| c == column::DELETE_FLAG));
        assert!(!columns.iter().any(|c| c == column::MARK_FOR_DELETION));

        assert_eq!(
            text(conn, "SELECT DateTime FROM DataTable WHERE Id = 1"),
            "2011-04-05 10:15:00"
        );
        // A row that cannot be parsed keeps the default
        assert_eq!(
            text(conn, "SELECT DateTime FROM DataTable WHERE Id = 2"),
            defaults::DATE_TIME
        );
        assert_eq!(text(conn, "SELECT Comment FROM DataTable WHERE Id = 2"), "");
        assert!(Database::has_column(conn, table::IMAGE_SET, column::SELECTED_FOLDER).unwrap());
        assert_eq!(text(conn, "SELECT TimeZone FROM ImageSetTable"), NEUTRAL_TIME_ZONE);
    }
}
