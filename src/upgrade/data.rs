//! Steps that move a data file from the late pre-2.3 layout to 2.3.

use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::controls::ControlType;
use crate::database::Database;
use crate::error::UpgradeError;
use crate::markers;
use crate::quickpaste;
use crate::schema::{
    column, defaults, detection, info as info_column, quote_ident, table, ColumnDefinition,
    IMAGE_SET_ROW_ID,
};
use crate::sequencer::{Step, UpgradeSession};
use crate::sort_terms;

pub const STEPS: &[Step] = &[
    Step::new("delete legacy data columns", delete_legacy_columns),
    Step::new("reset date time default", reset_date_time_default),
    Step::new("convert image quality", convert_image_quality),
    Step::new("fix detection separators", fix_detection_separators),
    Step::new("convert markers", convert_markers),
    Step::new("delete legacy image set columns", delete_legacy_image_set_columns),
    Step::new("add root folder", add_root_folder),
    Step::new("delete selection columns", delete_selection_columns),
    Step::new("add search terms", add_search_terms),
    Step::new("convert sort terms", convert_sort_terms),
    Step::new("convert quick paste", convert_quick_paste),
    Step::new("add info columns", add_info_columns),
];

fn delete_legacy_columns(conn: &Connection, _session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    for name in [column::DATE, column::TIME, column::UTC_OFFSET, column::FOLDER] {
        if Database::delete_column(conn, table::DATA, name)? {
            debug!("Deleted {}.{}", table::DATA, name);
        }
    }
    Ok(())
}

fn reset_date_time_default(
    conn: &Connection,
    _session: &mut UpgradeSession,
) -> Result<(), UpgradeError> {
    let current = Database::columns(conn, table::DATA)?
        .into_iter()
        .find(|c| c.name == column::DATE_TIME);
    let wanted = format!("'{}'", defaults::DATE_TIME);
    match current {
        Some(c) if c.default.as_deref() != Some(wanted.as_str()) => {
            Database::alter_column(
                conn,
                table::DATA,
                column::DATE_TIME,
                &ColumnDefinition::date_time(column::DATE_TIME),
            )?;
        }
        _ => {}
    }
    Ok(())
}

fn convert_image_quality(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if !Database::has_column(conn, table::DATA, column::IMAGE_QUALITY)? {
        return Ok(());
    }
    if session.remove_image_quality() {
        Database::delete_column(conn, table::DATA, column::IMAGE_QUALITY)?;
        return Ok(());
    }

    Database::replace_values(conn, table::DATA, column::IMAGE_QUALITY, "Ok", "false")?;
    Database::replace_values(conn, table::DATA, column::IMAGE_QUALITY, "Dark", "true")?;
    Database::alter_column(
        conn,
        table::DATA,
        column::IMAGE_QUALITY,
        &ColumnDefinition::text(column::DARK, defaults::FLAG),
    )?;
    Ok(())
}

/// Repair a bounding box written with commas as decimal separators, e.g.
/// `0,1, 0,2, 0,3, 0,4` becomes `0.1, 0.2, 0.3, 0.4`. Returns `None` when the
/// box needs no change or cannot be read.
pub fn fix_bbox(bbox: &str) -> Option<String> {
    let commas = bbox.matches(',').count();
    if commas == 0 || commas == 3 {
        return None;
    }
    let parts: Vec<&str> = bbox.split(' ').filter(|p| !p.is_empty()).collect();
    if parts.len() != 4 {
        return None;
    }
    let fixed: Vec<String> = parts
        .iter()
        .map(|p| p.trim_end_matches(',').replace(',', "."))
        .collect();
    Some(fixed.join(", "))
}

fn fix_conf(conn: &Connection, table_name: &str) -> Result<usize, UpgradeError> {
    let changed = conn.execute(
        &format!(
            "UPDATE {t} SET {c} = CAST(REPLACE({c}, ',', '.') AS REAL) WHERE {c} LIKE '%,%'",
            t = quote_ident(table_name),
            c = detection::CONF
        ),
        [],
    )?;
    Ok(changed)
}

fn fix_detection_separators(
    conn: &Connection,
    _session: &mut UpgradeSession,
) -> Result<(), UpgradeError> {
    if !Database::table_exists_and_not_empty(conn, table::DETECTIONS)? {
        return Ok(());
    }

    let conf_changed = fix_conf(conn, table::DETECTIONS)?;

    let boxes: Vec<(i64, String)> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {} FROM {} WHERE {} LIKE '%,%'",
            detection::DETECTION_ID,
            detection::BBOX,
            table::DETECTIONS,
            detection::BBOX
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    let mut update = conn.prepare(&format!(
        "UPDATE {} SET {} = ?1 WHERE {} = ?2",
        table::DETECTIONS,
        detection::BBOX,
        detection::DETECTION_ID
    ))?;
    let mut bbox_changed = 0;
    for (id, bbox) in boxes {
        if let Some(fixed) = fix_bbox(&bbox) {
            update.execute(params![fixed, id])?;
            bbox_changed += 1;
        }
    }

    if Database::table_exists(conn, table::CLASSIFICATIONS)? {
        fix_conf(conn, table::CLASSIFICATIONS)?;
    }
    if conf_changed + bbox_changed > 0 {
        info!(
            "Fixed decimal separators in {} confidences and {} bounding boxes",
            conf_changed, bbox_changed
        );
    }
    Ok(())
}

fn convert_markers(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    let counters: Vec<String> = session
        .controls
        .iter()
        .filter(|c| c.kind() == ControlType::Counter)
        .map(|c| c.data_label.clone())
        .collect();
    markers::convert_markers_table(conn, &counters)
}

fn delete_image_set_columns(conn: &Connection, names: &[&str]) -> Result<(), UpgradeError> {
    for name in names {
        Database::delete_column(conn, table::IMAGE_SET, name)?;
    }
    Ok(())
}

fn delete_legacy_image_set_columns(
    conn: &Connection,
    _session: &mut UpgradeSession,
) -> Result<(), UpgradeError> {
    delete_image_set_columns(
        conn,
        &[column::TIME_ZONE, column::WHITE_SPACE_TRIMMED, column::MAGNIFIER],
    )
}

fn add_root_folder(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if !Database::has_column(conn, table::IMAGE_SET, column::ROOT_FOLDER)? {
        Database::add_column_at_end(
            conn,
            table::IMAGE_SET,
            &ColumnDefinition::text(column::ROOT_FOLDER, ""),
        )?;
    }
    let root_folder = session
        .path
        .parent()
        .and_then(|dir| dir.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Database::set_column_value(conn, table::IMAGE_SET, column::ROOT_FOLDER, &root_folder)?;
    Ok(())
}

fn delete_selection_columns(
    conn: &Connection,
    _session: &mut UpgradeSession,
) -> Result<(), UpgradeError> {
    delete_image_set_columns(conn, &[column::SELECTED_FOLDER, column::SELECTION])
}

fn add_search_terms(conn: &Connection, _session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if !Database::has_column(conn, table::IMAGE_SET, column::SEARCH_TERMS)? {
        Database::add_column_at_end(
            conn,
            table::IMAGE_SET,
            &ColumnDefinition::text(column::SEARCH_TERMS, defaults::SEARCH_TERMS),
        )?;
    }
    if !Database::has_column(conn, table::IMAGE_SET, column::BB_DISPLAY_THRESHOLD)? {
        Database::add_column_at_end(
            conn,
            table::IMAGE_SET,
            &ColumnDefinition::real(column::BB_DISPLAY_THRESHOLD, defaults::BB_DISPLAY_THRESHOLD),
        )?;
    }
    Ok(())
}

fn image_set_text(conn: &Connection, name: &str) -> Result<Option<String>, UpgradeError> {
    let value: Option<Option<String>> = conn
        .query_row(
            &format!(
                "SELECT {} FROM {} WHERE {} = ?1",
                quote_ident(name),
                table::IMAGE_SET,
                column::ID
            ),
            [IMAGE_SET_ROW_ID],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.flatten())
}

fn convert_sort_terms(conn: &Connection, _session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    let Some(current) = image_set_text(conn, column::SORT_TERMS)? else {
        return Ok(());
    };
    if current.trim_start().starts_with('[') {
        return Ok(());
    }
    let json = sort_terms::legacy_to_json(&current)?;
    Database::set_column_value(conn, table::IMAGE_SET, column::SORT_TERMS, &json)?;
    Ok(())
}

fn convert_quick_paste(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if !Database::has_column(conn, table::IMAGE_SET, column::QUICK_PASTE_XML)? {
        if !Database::has_column(conn, table::IMAGE_SET, column::QUICK_PASTE_TERMS)? {
            Database::add_column_at_end(
                conn,
                table::IMAGE_SET,
                &ColumnDefinition::text(column::QUICK_PASTE_TERMS, defaults::QUICK_PASTE_JSON),
            )?;
        }
        return Ok(());
    }

    if Database::has_column(conn, table::IMAGE_SET, column::QUICK_PASTE_TERMS)? {
        warn!(
            "{} has both {} and {}; keeping {}",
            session.path.display(),
            column::QUICK_PASTE_XML,
            column::QUICK_PASTE_TERMS,
            column::QUICK_PASTE_TERMS
        );
        Database::delete_column(conn, table::IMAGE_SET, column::QUICK_PASTE_XML)?;
        return Ok(());
    }

    let xml = image_set_text(conn, column::QUICK_PASTE_XML)?;
    let json = quickpaste::xml_to_json(xml.as_deref(), &session.controls);
    Database::alter_column(
        conn,
        table::IMAGE_SET,
        column::QUICK_PASTE_XML,
        &ColumnDefinition::text(column::QUICK_PASTE_TERMS, defaults::QUICK_PASTE_JSON),
    )?;
    Database::set_column_value(conn, table::IMAGE_SET, column::QUICK_PASTE_TERMS, &json)?;
    Ok(())
}

fn add_info_columns(conn: &Connection, _session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if !Database::table_exists(conn, table::INFO)? {
        return Ok(());
    }
    let wanted = [
        ColumnDefinition::text(info_column::DETECTOR_VERSION, defaults::DETECTOR_VERSION_UNKNOWN),
        ColumnDefinition::real(
            info_column::TYPICAL_DETECTION_THRESHOLD,
            defaults::TYPICAL_DETECTION_THRESHOLD,
        ),
        ColumnDefinition::real(
            info_column::CONSERVATIVE_DETECTION_THRESHOLD,
            defaults::CONSERVATIVE_DETECTION_THRESHOLD,
        ),
        ColumnDefinition::real(
            info_column::TYPICAL_CLASSIFICATION_THRESHOLD,
            defaults::TYPICAL_CLASSIFICATION_THRESHOLD,
        ),
    ];
    for definition in wanted {
        if !Database::has_column(conn, table::INFO, &definition.name)? {
            Database::add_column_at_end(conn, table::INFO, &definition)?;
        }
    }
    Ok(())
}
