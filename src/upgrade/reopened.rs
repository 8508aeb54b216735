use log::info;
use rusqlite::Connection;

use crate::database::Database;
use crate::error::UpgradeError;
use crate::schema::{column, table};
use crate::sequencer::{Step, UpgradeSession};

const INDEX_RELATIVE_PATH: &str = "IndexRelativePath";
const INDEX_FILE: &str = "IndexFile";
const INDEX_RELATIVE_PATH_FILE: &str = "IndexRelativePathFile";

/// Steps for an upgraded data file that an older Timelapse has since opened.
pub const STEPS: &[Step] = &[
    Step::new("delete utc offset column", delete_utc_offset),
    Step::new("recreate indexes", recreate_indexes),
    Step::new("delete re-added image set columns", delete_image_set_columns),
];

/// An older Timelapse adds `UtcOffset` back to a data file that already has
/// the 2.3 `RootFolder` column.
pub fn is_reopened_data_file(conn: &Connection) -> Result<bool, UpgradeError> {
    Ok(Database::has_column(conn, table::DATA, column::UTC_OFFSET)?
        && Database::has_column(conn, table::IMAGE_SET, column::ROOT_FOLDER)?)
}

fn delete_utc_offset(conn: &Connection, _session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if !Database::delete_column(conn, table::DATA, column::UTC_OFFSET)? {
        return Err(UpgradeError::StepFailed {
            step: "delete utc offset column",
            reason: format!("{} has no {} column", table::DATA, column::UTC_OFFSET),
        });
    }
    Ok(())
}

fn recreate_indexes(conn: &Connection, _session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    let indexes: [(&str, &[&str]); 3] = [
        (INDEX_RELATIVE_PATH, &[column::RELATIVE_PATH]),
        (INDEX_FILE, &[column::FILE]),
        (INDEX_RELATIVE_PATH_FILE, &[column::RELATIVE_PATH, column::FILE]),
    ];
    for (index, columns) in indexes {
        Database::drop_index_if_exists(conn, index)?;
        Database::create_index_if_not_exists(conn, index, table::DATA, columns)?;
    }
    Ok(())
}

fn delete_image_set_columns(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    for name in [column::TIME_ZONE, column::WHITE_SPACE_TRIMMED, column::QUICK_PASTE_XML] {
        if !Database::delete_column(conn, table::IMAGE_SET, name)? {
            info!(
                "{} has no {} column to delete in {}",
                table::IMAGE_SET,
                name,
                session.path.display()
            );
        }
    }
    Ok(())
}
