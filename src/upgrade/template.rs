//! Steps that rewrite the `TemplateTable` controls of both file types.

use log::{debug, info};
use rusqlite::{params, Connection};

use crate::choices::Choices;
use crate::classifier::FileKind;
use crate::controls::{
    ControlRow, ControlType, TemplateTable, DARK_LABEL, DARK_TOOLTIP, DARK_WIDTH,
    DELETE_FLAG_LABEL, DELETE_FLAG_TOOLTIP,
};
use crate::error::UpgradeError;
use crate::schema::{column, defaults, position, quote_literal, table};
use crate::sequencer::{Step, UpgradeSession};
use crate::version::Version;

/// Repairs applied whenever a template is opened.
pub const OPEN_REPAIRS: &[Step] = &[
    Step::new("fill empty labels", fill_empty_labels),
    Step::new("hide utc offset control", hide_utc_offset),
    Step::new("reset date time default", reset_date_time_default),
    Step::new("ensure relative path control", ensure_relative_path),
    Step::new("ensure date time control", ensure_date_time),
    Step::new("ensure utc offset control", ensure_utc_offset),
    Step::new("reset image quality list", reset_image_quality_list),
    Step::new("ensure delete flag control", ensure_delete_flag),
];

/// Steps for a template still using the pre-2.3 controls.
pub const UPGRADE_STEPS: &[Step] = &[
    Step::new("convert image quality control", convert_image_quality),
    Step::new("convert choice lists", convert_choice_lists),
    Step::new("delete legacy controls", delete_legacy_controls),
    Step::new("write template info", write_template_info),
];

/// Steps for an upgraded template that an older Timelapse has since opened.
pub const REOPENED_STEPS: &[Step] = &[Step::new("delete utc offset control", delete_utc_offset_control)];

/// A template upgraded to 2.3 and then opened by an older Timelapse has lost
/// its Folder and ImageQuality controls but had a UtcOffset control added back.
pub fn reopened_by_older_version(controls: &[ControlRow]) -> bool {
    !TemplateTable::has_kind(controls, ControlType::Folder)
        && !TemplateTable::has_kind(controls, ControlType::ImageQuality)
        && TemplateTable::has_kind(controls, ControlType::UtcOffset)
}

fn fill_empty_labels(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    session.reload_controls(conn)?;
    let mut controls = session.controls.clone();

    for index in 0..controls.len() {
        let label_empty = controls[index].label.trim().is_empty();
        let data_label_empty = controls[index].data_label.trim().is_empty();
        if !label_empty && !data_label_empty {
            continue;
        }

        let mut row = controls[index].clone();
        if label_empty && data_label_empty {
            let name = TemplateTable::next_unique_data_label(&controls, &row.type_name);
            row.label = name.clone();
            row.data_label = name;
        } else if label_empty {
            let taken = controls
                .iter()
                .any(|c| c.id != row.id && c.label == row.data_label);
            row.label = if taken {
                TemplateTable::next_unique_data_label(&controls, &row.type_name)
            } else {
                row.data_label.clone()
            };
        } else {
            row.data_label = row.label.clone();
        }

        info!(
            "Control {} had an empty label, now '{}' / '{}'",
            row.id, row.label, row.data_label
        );
        TemplateTable::sync(conn, &row)?;
        controls[index] = row;
    }

    session.controls = controls;
    Ok(())
}

fn hide_utc_offset(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    session.reload_controls(conn)?;
    if let Some(utc) = TemplateTable::find_kind(&session.controls, ControlType::UtcOffset) {
        if utc.visible {
            let mut row = utc.clone();
            row.visible = false;
            TemplateTable::sync(conn, &row)?;
        }
    }
    Ok(())
}

fn reset_date_time_default(
    conn: &Connection,
    session: &mut UpgradeSession,
) -> Result<(), UpgradeError> {
    session.reload_controls(conn)?;
    if let Some(date_time) = TemplateTable::find_kind(&session.controls, ControlType::DateTime) {
        if date_time.default_value != defaults::DATE_TIME {
            let mut row = date_time.clone();
            row.default_value = defaults::DATE_TIME.to_owned();
            TemplateTable::sync(conn, &row)?;
        }
    }
    Ok(())
}

fn ensure_relative_path(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    session.reload_controls(conn)?;
    if TemplateTable::has_kind(&session.controls, ControlType::RelativePath) {
        return Ok(());
    }
    info!("Adding RelativePath control to {}", session.path.display());
    TemplateTable::insert_at(
        conn,
        &ControlRow::standard(ControlType::RelativePath),
        position::RELATIVE_PATH as i64,
    )
}

fn ensure_date_time(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    session.reload_controls(conn)?;
    if TemplateTable::has_kind(&session.controls, ControlType::DateTime) {
        return Ok(());
    }

    let legacy: Vec<ControlRow> = session
        .controls
        .iter()
        .filter(|c| matches!(c.kind(), ControlType::Date | ControlType::Time))
        .cloned()
        .collect();

    let mut date_time = ControlRow::standard(ControlType::DateTime);
    date_time.visible = legacy.is_empty() || legacy.iter().any(|c| c.visible);
    for mut row in legacy {
        row.visible = false;
        TemplateTable::sync(conn, &row)?;
    }

    info!("Adding DateTime control to {}", session.path.display());
    TemplateTable::insert_at(conn, &date_time, position::DATE_TIME as i64)
}

fn ensure_utc_offset(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    session.reload_controls(conn)?;
    if TemplateTable::has_kind(&session.controls, ControlType::UtcOffset) {
        return Ok(());
    }
    TemplateTable::insert_at(
        conn,
        &ControlRow::standard(ControlType::UtcOffset),
        position::UTC_OFFSET as i64,
    )
}

fn reset_image_quality_list(
    conn: &Connection,
    session: &mut UpgradeSession,
) -> Result<(), UpgradeError> {
    session.reload_controls(conn)?;
    if let Some(quality) = TemplateTable::find_kind(&session.controls, ControlType::ImageQuality) {
        if quality.list != defaults::IMAGE_QUALITY_LIST {
            let mut row = quality.clone();
            row.list = defaults::IMAGE_QUALITY_LIST.to_owned();
            TemplateTable::sync(conn, &row)?;
        }
    }
    Ok(())
}

fn ensure_delete_flag(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    session.reload_controls(conn)?;
    if TemplateTable::find(&session.controls, column::DELETE_FLAG).is_some() {
        return Ok(());
    }

    match TemplateTable::find(&session.controls, column::MARK_FOR_DELETION) {
        Some(mark) => {
            let mut row = mark.clone();
            row.type_name = ControlType::DeleteFlag.to_string();
            row.data_label = column::DELETE_FLAG.to_owned();
            row.label = DELETE_FLAG_LABEL.to_owned();
            row.tooltip = DELETE_FLAG_TOOLTIP.to_owned();
            info!("Rewriting MarkForDeletion control {} as DeleteFlag", row.id);
            TemplateTable::sync(conn, &row)
        }
        None => {
            TemplateTable::insert(conn, &ControlRow::standard(ControlType::DeleteFlag))?;
            Ok(())
        }
    }
}

fn convert_image_quality(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if session.remove_image_quality() {
        return Ok(());
    }
    session.reload_controls(conn)?;
    let Some(quality) = TemplateTable::find_kind(&session.controls, ControlType::ImageQuality) else {
        return Ok(());
    };

    let mut row = quality.clone();
    row.type_name = ControlType::Flag.to_string();
    row.data_label = column::DARK.to_owned();
    row.label = DARK_LABEL.to_owned();
    row.tooltip = DARK_TOOLTIP.to_owned();
    row.default_value = defaults::FLAG.to_owned();
    row.width = DARK_WIDTH.to_owned();
    row.visible = true;
    row.list = String::new();
    info!("Converting ImageQuality control {} to a Dark flag", row.id);
    TemplateTable::sync(conn, &row)
}

fn convert_choice_lists(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    session.reload_controls(conn)?;
    for choice in session
        .controls
        .iter()
        .filter(|c| c.kind() == ControlType::FixedChoice)
    {
        if choice.list.trim_start().starts_with('{') {
            continue;
        }
        let mut choices = Choices::from_legacy(&choice.list);
        let mut row = choice.clone();
        row.default_value = choices.reconcile_default(&choice.default_value);
        row.list = choices.to_json()?;
        debug!("Choice list of '{}' is now {}", row.data_label, row.list);
        TemplateTable::sync(conn, &row)?;
    }
    Ok(())
}

fn delete_legacy_controls(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    let mut data_labels = vec![column::DATE, column::TIME, column::UTC_OFFSET, column::FOLDER];
    if session.remove_image_quality() {
        data_labels.push(column::IMAGE_QUALITY);
    }

    for data_label in data_labels {
        // Orders shift after every removal
        session.reload_controls(conn)?;
        if let Some(row) = TemplateTable::find(&session.controls, data_label).cloned() {
            info!("Removing {} control from {}", data_label, session.path.display());
            TemplateTable::remove(conn, &row)?;
        }
    }
    session.reload_controls(conn)
}

fn write_template_info(conn: &Connection, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
    if session.kind != FileKind::Template {
        return Ok(());
    }
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({} TEXT DEFAULT {});
         DELETE FROM {};",
        table::TEMPLATE_INFO,
        column::VERSION_COMPATIBILITY,
        quote_literal(Version::MINIMUM_CURRENT),
        table::TEMPLATE_INFO,
    ))?;
    conn.execute(
        &format!(
            "INSERT INTO {} ({}) VALUES (?1)",
            table::TEMPLATE_INFO,
            column::VERSION_COMPATIBILITY
        ),
        params![session.ctx.timelapse_version().to_string()],
    )?;
    Ok(())
}

fn delete_utc_offset_control(
    conn: &Connection,
    session: &mut UpgradeSession,
) -> Result<(), UpgradeError> {
    session.reload_controls(conn)?;
    if let Some(row) = TemplateTable::find(&session.controls, column::UTC_OFFSET).cloned() {
        info!(
            "Removing UtcOffset control re-added by an older Timelapse from {}",
            session.path.display()
        );
        TemplateTable::remove(conn, &row)?;
    }
    session.reload_controls(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::UpgradeContext;
    use crate::database::Database;
    use crate::sequencer::{run_steps, SequenceOutcome};
    use crate::test_support;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn data_labels(conn: &Connection) -> Vec<String> {
        TemplateTable::load(conn)
            .unwrap()
            .into_iter()
            .map(|c| c.data_label)
            .collect()
    }

    #[test]
    fn test_reopened_fingerprint() {
        let mut controls = vec![
            ControlRow::standard(ControlType::RelativePath),
            ControlRow::standard(ControlType::DateTime),
        ];
        assert!(!reopened_by_older_version(&controls));
        controls.push(ControlRow::standard(ControlType::UtcOffset));
        assert!(reopened_by_older_version(&controls));

        let mut folder = ControlRow::standard(ControlType::RelativePath);
        folder.type_name = ControlType::Folder.to_string();
        controls.push(folder);
        assert!(!reopened_by_older_version(&controls));
    }

    #[test]
    fn test_open_repairs_on_old_template() {
        let dir = TempDir::new().unwrap();
        let path = test_support::legacy_v20_template(dir.path());
        let db = Database::open(&path).unwrap();
        let conn = db.conn();
        let ctx = UpgradeContext::new(Config::default().upgrade);
        let mut session = UpgradeSession::new(&ctx, &path, FileKind::Template);

        let outcome = run_steps(conn, &mut session, OPEN_REPAIRS);
        assert!(matches!(outcome, SequenceOutcome::Completed));

        let controls = TemplateTable::load(conn).unwrap();
        let find = |label: &str| TemplateTable::find(&controls, label).unwrap().clone();
        assert_eq!(find(column::RELATIVE_PATH).id, 2);
        assert_eq!(find(column::DATE_TIME).id, 4);
        assert_eq!(find(column::UTC_OFFSET).id, 5);
        assert!(find(column::DATE_TIME).visible);
        assert!(!find(column::DATE).visible);
        assert!(!find(column::UTC_OFFSET).visible);
        assert_eq!(find(column::DELETE_FLAG).label, DELETE_FLAG_LABEL);
        assert!(TemplateTable::find(&controls, column::MARK_FOR_DELETION).is_none());
        assert_eq!(find(column::IMAGE_QUALITY).list, defaults::IMAGE_QUALITY_LIST);
        // The control with no names gets one from its type
        assert_eq!(find("Note0").label, "Note0");

        // Orders stay a dense sequence
        let mut orders: Vec<i64> = controls.iter().map(|c| c.control_order).collect();
        orders.sort_unstable();
        assert_eq!(orders, (1..=controls.len() as i64).collect::<Vec<_>>());
    }

    #[test]
    fn test_upgrade_steps_remove_legacy_controls() {
        let dir = TempDir::new().unwrap();
        let path = test_support::legacy_template(dir.path());
        let db = Database::open(&path).unwrap();
        let conn = db.conn();
        let ctx = UpgradeContext::new(Config::default().upgrade);
        let mut session = UpgradeSession::new(&ctx, &path, FileKind::Template);

        assert!(matches!(
            run_steps(conn, &mut session, OPEN_REPAIRS),
            SequenceOutcome::Completed
        ));
        assert!(!reopened_by_older_version(&session.controls));
        assert!(matches!(
            run_steps(conn, &mut session, UPGRADE_STEPS),
            SequenceOutcome::Completed
        ));

        let labels = data_labels(conn);
        for legacy in [
            column::DATE,
            column::TIME,
            column::UTC_OFFSET,
            column::FOLDER,
            column::IMAGE_QUALITY,
        ] {
            assert!(!labels.iter().any(|l| l == legacy), "{} still present", legacy);
        }

        let controls = TemplateTable::load(conn).unwrap();
        let species = TemplateTable::find(&controls, "Species").unwrap();
        assert_eq!(
            species.list,
            r#"{"IncludeEmptyChoice":true,"ChoiceListNonEmpty":["Deer","Elk"]}"#
        );

        let version: String = conn
            .query_row("SELECT VersionCompatabily FROM TemplateInfo", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, "2.3.0.0");

        // Running again changes nothing
        assert!(matches!(
            run_steps(conn, &mut session, UPGRADE_STEPS),
            SequenceOutcome::Completed
        ));
        assert_eq!(data_labels(conn), labels);
    }

    #[test]
    fn test_keep_image_quality_as_dark_flag() {
        let dir = TempDir::new().unwrap();
        let path = test_support::legacy_template(dir.path());
        let db = Database::open(&path).unwrap();
        let conn = db.conn();
        let mut config = Config::default().upgrade;
        config.remove_image_quality = false;
        let ctx = UpgradeContext::new(config);
        let mut session = UpgradeSession::new(&ctx, &path, FileKind::Template);

        run_steps(conn, &mut session, OPEN_REPAIRS);
        run_steps(conn, &mut session, UPGRADE_STEPS);

        let controls = TemplateTable::load(conn).unwrap();
        let dark = TemplateTable::find(&controls, column::DARK).unwrap();
        assert_eq!(dark.kind(), ControlType::Flag);
        assert_eq!(dark.label, DARK_LABEL);
        assert_eq!(dark.width, DARK_WIDTH);
        assert_eq!(dark.default_value, "false");
        assert!(dark.list.is_empty());
    }

    #[test]
    fn test_reopened_steps_only_drop_utc_offset() {
        let dir = TempDir::new().unwrap();
        let path = test_support::legacy_template(dir.path());
        let db = Database::open(&path).unwrap();
        let conn = db.conn();
        let ctx = UpgradeContext::new(Config::default().upgrade);
        let mut session = UpgradeSession::new(&ctx, &path, FileKind::Template);

        let before = data_labels(conn);
        run_steps(conn, &mut session, REOPENED_STEPS);
        let after = data_labels(conn);
        assert_eq!(after.len(), before.len() - 1);
        assert!(!after.iter().any(|l| l == column::UTC_OFFSET));
        assert!(after.iter().any(|l| l == column::FOLDER));
    }
}
