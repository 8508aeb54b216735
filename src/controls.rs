use log::warn;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, Row};
use strum::{AsRefStr, Display, EnumString};

use crate::error::UpgradeError;
use crate::schema::{column, control, defaults, table};

/// Kind of a template control, parsed from the `Type` column of `TemplateTable`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, AsRefStr, Display, EnumString)]
pub enum ControlType {
    // User-defined
    Note,
    Counter,
    #[strum(to_string = "FixedChoice", serialize = "Choice")]
    FixedChoice,
    Flag,

    // Standard
    File,
    RelativePath,
    DateTime,
    DeleteFlag,

    // Legacy, removed by the upgrade
    Date,
    Time,
    UtcOffset,
    Folder,
    ImageQuality,

    Unknown,
}

impl ControlType {
    /// Parse a stored type name. Unrecognised names give [`ControlType::Unknown`].
    pub fn parse(type_name: &str) -> Self {
        type_name
            .trim()
            .parse()
            .unwrap_or(ControlType::Unknown)
    }
}

/// One row of `TemplateTable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRow {
    pub id: i64,
    pub control_order: i64,
    pub spreadsheet_order: i64,
    /// Stored type name, kept verbatim so unknown types are written back unchanged.
    pub type_name: String,
    pub default_value: String,
    pub label: String,
    pub data_label: String,
    pub tooltip: String,
    pub width: String,
    pub copyable: bool,
    pub visible: bool,
    pub list: String,
}

const RELATIVE_PATH_TOOLTIP: &str =
    "Path from the folder containing the template and image data files to the file";
const DATE_TIME_TOOLTIP: &str =
    "Date and time taken (Year-Month-Day Hours:Minutes:Seconds:Milliseconds)";
const UTC_OFFSET_TOOLTIP: &str = "Universal Time offset of the time zone for date and time taken";
pub const DELETE_FLAG_LABEL: &str = "Delete?";
pub const DELETE_FLAG_TOOLTIP: &str =
    "Mark a file as one to be deleted. You can then confirm deletion through the Edit Menu";
pub const DELETE_FLAG_WIDTH: &str = "20";
pub const DARK_LABEL: &str = "Dark?";
pub const DARK_WIDTH: &str = "20";
pub const DARK_TOOLTIP: &str =
    "True if the image is dark, usually populated by a Timelapse option in the Edit menu";

impl ControlRow {
    pub fn kind(&self) -> ControlType {
        ControlType::parse(&self.type_name)
    }

    /// A new row for one of the standard controls the upgrade may need to insert.
    /// Ids and orders are assigned on insert.
    pub fn standard(kind: ControlType) -> Self {
        let (label, default_value, tooltip, width, visible) = match kind {
            ControlType::RelativePath => (
                column::RELATIVE_PATH,
                "",
                RELATIVE_PATH_TOOLTIP,
                "100",
                true,
            ),
            ControlType::DateTime => (
                column::DATE_TIME,
                defaults::DATE_TIME,
                DATE_TIME_TOOLTIP,
                "160",
                true,
            ),
            ControlType::UtcOffset => (
                column::UTC_OFFSET,
                defaults::UTC_OFFSET,
                UTC_OFFSET_TOOLTIP,
                "60",
                false,
            ),
            _ => (
                DELETE_FLAG_LABEL,
                defaults::FLAG,
                DELETE_FLAG_TOOLTIP,
                DELETE_FLAG_WIDTH,
                true,
            ),
        };
        let data_label = match kind {
            ControlType::RelativePath | ControlType::DateTime | ControlType::UtcOffset => label,
            _ => column::DELETE_FLAG,
        };
        let type_name = match kind {
            ControlType::RelativePath | ControlType::DateTime | ControlType::UtcOffset => {
                kind.to_string()
            }
            _ => ControlType::DeleteFlag.to_string(),
        };

        ControlRow {
            id: 0,
            control_order: 0,
            spreadsheet_order: 0,
            type_name,
            default_value: default_value.to_owned(),
            label: label.to_owned(),
            data_label: data_label.to_owned(),
            tooltip: tooltip.to_owned(),
            width: width.to_owned(),
            copyable: false,
            visible,
            list: String::new(),
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ControlRow {
            id: read_i64(row, 0)?,
            control_order: read_i64(row, 1)?,
            spreadsheet_order: read_i64(row, 2)?,
            type_name: read_text(row, 3)?,
            default_value: read_text(row, 4)?,
            label: read_text(row, 5)?,
            data_label: read_text(row, 6)?,
            tooltip: read_text(row, 7)?,
            width: read_text(row, 8)?,
            copyable: read_bool(row, 9)?,
            visible: read_bool(row, 10)?,
            list: read_text(row, 11)?,
        })
    }
}

fn read_text(row: &Row, idx: usize) -> rusqlite::Result<String> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    })
}

fn read_i64(row: &Row, idx: usize) -> rusqlite::Result<i64> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => i,
        ValueRef::Real(f) => f as i64,
        ValueRef::Text(t) => String::from_utf8_lossy(t).trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn read_bool(row: &Row, idx: usize) -> rusqlite::Result<bool> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => i != 0,
        ValueRef::Text(t) => {
            let s = String::from_utf8_lossy(t);
            s.trim().eq_ignore_ascii_case("true") || s.trim() == "1"
        }
        _ => false,
    })
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Operations on the `TemplateTable` control rows of a `.tdb` or `.ddb`.
pub struct TemplateTable;

impl TemplateTable {
    pub fn load(conn: &Connection) -> Result<Vec<ControlRow>, UpgradeError> {
        let sql = format!(
            "SELECT {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}
             FROM {} ORDER BY {}, {}",
            column::ID,
            control::CONTROL_ORDER,
            control::SPREADSHEET_ORDER,
            control::TYPE,
            control::DEFAULT_VALUE,
            control::LABEL,
            control::DATA_LABEL,
            control::TOOLTIP,
            control::TEXT_BOX_WIDTH,
            control::COPYABLE,
            control::VISIBLE,
            control::LIST,
            table::TEMPLATE,
            control::CONTROL_ORDER,
            column::ID,
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], ControlRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn find<'a>(controls: &'a [ControlRow], data_label: &str) -> Option<&'a ControlRow> {
        controls.iter().find(|c| c.data_label == data_label)
    }

    pub fn find_kind(controls: &[ControlRow], kind: ControlType) -> Option<&ControlRow> {
        controls.iter().find(|c| c.kind() == kind)
    }

    pub fn has_kind(controls: &[ControlRow], kind: ControlType) -> bool {
        Self::find_kind(controls, kind).is_some()
    }

    /// Write every field of `row` back to the row with the same id.
    pub fn sync(conn: &Connection, row: &ControlRow) -> Result<(), UpgradeError> {
        let sql = format!(
            "UPDATE {} SET {} = ?1, {} = ?2, {} = ?3, {} = ?4, {} = ?5, {} = ?6, {} = ?7,
             {} = ?8, {} = ?9, {} = ?10, {} = ?11 WHERE {} = ?12",
            table::TEMPLATE,
            control::CONTROL_ORDER,
            control::SPREADSHEET_ORDER,
            control::TYPE,
            control::DEFAULT_VALUE,
            control::LABEL,
            control::DATA_LABEL,
            control::TOOLTIP,
            control::TEXT_BOX_WIDTH,
            control::COPYABLE,
            control::VISIBLE,
            control::LIST,
            column::ID,
        );
        let changed = conn.execute(
            &sql,
            params![
                row.control_order,
                row.spreadsheet_order,
                row.type_name,
                row.default_value,
                row.label,
                row.data_label,
                row.tooltip,
                row.width,
                bool_text(row.copyable),
                bool_text(row.visible),
                row.list,
                row.id,
            ],
        )?;
        if changed == 0 {
            warn!("No template row with id {} to update ({})", row.id, row.data_label);
        }
        Ok(())
    }

    /// Append a control after the existing ones. Returns the row with its
    /// assigned id and orders.
    pub fn insert(conn: &Connection, row: &ControlRow) -> Result<ControlRow, UpgradeError> {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table::TEMPLATE),
            [],
            |r| r.get(0),
        )?;
        let mut inserted = row.clone();
        inserted.control_order = count + 1;
        inserted.spreadsheet_order = count + 1;

        let sql = format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            table::TEMPLATE,
            control::CONTROL_ORDER,
            control::SPREADSHEET_ORDER,
            control::TYPE,
            control::DEFAULT_VALUE,
            control::LABEL,
            control::DATA_LABEL,
            control::TOOLTIP,
            control::TEXT_BOX_WIDTH,
            control::COPYABLE,
            control::VISIBLE,
            control::LIST,
        );
        conn.execute(
            &sql,
            params![
                inserted.control_order,
                inserted.spreadsheet_order,
                inserted.type_name,
                inserted.default_value,
                inserted.label,
                inserted.data_label,
                inserted.tooltip,
                inserted.width,
                bool_text(inserted.copyable),
                bool_text(inserted.visible),
                inserted.list,
            ],
        )?;
        inserted.id = conn.last_insert_rowid();
        Ok(inserted)
    }

    /// Insert a control so it ends up with both its id and its orders at `position`.
    pub fn insert_at(
        conn: &Connection,
        row: &ControlRow,
        position: i64,
    ) -> Result<(), UpgradeError> {
        let inserted = Self::insert(conn, row)?;
        let id = Self::set_control_id(conn, inserted.id, position)?;
        Self::set_control_orders(conn, id, position)
    }

    /// Delete a control and close the gap it leaves in both orderings.
    pub fn remove(conn: &Connection, row: &ControlRow) -> Result<(), UpgradeError> {
        conn.execute(
            &format!("DELETE FROM {} WHERE {} = ?", table::TEMPLATE, column::ID),
            [row.id],
        )?;
        for (order_column, removed) in [
            (control::CONTROL_ORDER, row.control_order),
            (control::SPREADSHEET_ORDER, row.spreadsheet_order),
        ] {
            conn.execute(
                &format!(
                    "UPDATE {t} SET {c} = {c} - 1 WHERE {c} > ?",
                    t = table::TEMPLATE,
                    c = order_column
                ),
                [removed],
            )?;
        }
        Ok(())
    }

    /// Give the control currently at `current_id` the id `new_id`. When `new_id`
    /// is taken, every id at or above it moves up by one first. Returns `new_id`.
    pub fn set_control_id(
        conn: &Connection,
        current_id: i64,
        new_id: i64,
    ) -> Result<i64, UpgradeError> {
        if current_id == new_id {
            return Ok(new_id);
        }

        let taken: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {} = ?", table::TEMPLATE, column::ID),
            [new_id],
            |r| r.get(0),
        )?;

        let mut target = current_id;
        if taken > 0 {
            let max: i64 = conn.query_row(
                &format!("SELECT MAX({}) FROM {}", column::ID, table::TEMPLATE),
                [],
                |r| r.get(0),
            )?;
            // Two passes so no intermediate id collides with an existing one
            conn.execute(
                &format!(
                    "UPDATE {t} SET {id} = {id} + ?1 + 1 WHERE {id} >= ?2",
                    t = table::TEMPLATE,
                    id = column::ID
                ),
                params![max, new_id],
            )?;
            conn.execute(
                &format!(
                    "UPDATE {t} SET {id} = {id} - ?1 WHERE {id} > ?1",
                    t = table::TEMPLATE,
                    id = column::ID
                ),
                [max],
            )?;
            if target >= new_id {
                target += 1;
            }
        }

        conn.execute(
            &format!(
                "UPDATE {t} SET {id} = ?1 WHERE {id} = ?2",
                t = table::TEMPLATE,
                id = column::ID
            ),
            params![new_id, target],
        )?;
        Ok(new_id)
    }

    /// Place the control with `id` at `order` in both orderings, moving every
    /// control at or after that order down by one.
    pub fn set_control_orders(conn: &Connection, id: i64, order: i64) -> Result<(), UpgradeError> {
        for order_column in [control::CONTROL_ORDER, control::SPREADSHEET_ORDER] {
            conn.execute(
                &format!(
                    "UPDATE {t} SET {c} = {c} + 1 WHERE {c} >= ?1 AND {id} <> ?2",
                    t = table::TEMPLATE,
                    c = order_column,
                    id = column::ID
                ),
                params![order, id],
            )?;
        }
        conn.execute(
            &format!(
                "UPDATE {} SET {} = ?1, {} = ?1 WHERE {} = ?2",
                table::TEMPLATE,
                control::CONTROL_ORDER,
                control::SPREADSHEET_ORDER,
                column::ID
            ),
            params![order, id],
        )?;
        Ok(())
    }

    /// First `{prefix}{n}` (n counting from 0) not used as a label or data label.
    pub fn next_unique_data_label(controls: &[ControlRow], prefix: &str) -> String {
        (0..)
            .map(|n| format!("{}{}", prefix, n))
            .find(|candidate| {
                !controls
                    .iter()
                    .any(|c| &c.label == candidate || &c.data_label == candidate)
            })
            .unwrap_or_else(|| prefix.to_owned())
    }
}
