//! Per-file upgrade: template repairs, then the data steps for a `.ddb`.

pub mod compat;
pub mod data;
pub mod reopened;
pub mod template;

use std::path::Path;

use log::{info, warn, Level};
use logging_timer::timer;
use rusqlite::Connection;

use crate::classifier::{Classifier, FileKind};
use crate::context::UpgradeContext;
use crate::database::Database;
use crate::error::UpgradeError;
use crate::schema::table;
use crate::sequencer::{run_steps, UpgradeSession};
use crate::upgrade_result::UpgradeResult;

/// Upgrade one `.tdb` or `.ddb` in place. The caller is responsible for the
/// backup and for restoring it when the result is not a success.
pub fn upgrade_file(ctx: &UpgradeContext, path: &Path) -> UpgradeResult {
    let _tmr = timer!(Level::Debug; "upgrade_file", "{}", path.display());
    match run_upgrade(ctx, path) {
        Ok(()) => {
            info!("Upgraded {}", path.display());
            UpgradeResult::Upgraded
        }
        Err(result) => {
            info!("Upgrade of {} ended as {}", path.display(), result);
            result
        }
    }
}

fn run_upgrade(ctx: &UpgradeContext, path: &Path) -> Result<(), UpgradeResult> {
    let classifier = Classifier::new(&ctx.config);
    let kind = match classifier.check_file_path(path) {
        FileKind::DoesNotExist => return Err(UpgradeResult::FileNotFound),
        FileKind::InvalidExtension => return Err(UpgradeResult::InvalidFile),
        kind => kind,
    };

    let db = Database::open(path).map_err(|err| {
        warn!("Could not open {}: {}", path.display(), err);
        UpgradeResult::InvalidFile
    })?;

    let result = upgrade_open_database(db.conn(), ctx, path, kind);
    let closed = db.close();
    match (result, closed) {
        (Ok(()), Err(err)) => {
            warn!("Could not close {}: {}", path.display(), err);
            Err(UpgradeResult::Failed)
        }
        (result, _) => result,
    }
}

fn is_timelapse_database(conn: &Connection) -> Result<bool, UpgradeError> {
    Ok(Database::quick_check(conn)? && Database::table_exists(conn, table::TEMPLATE)?)
}

fn upgrade_open_database(
    conn: &Connection,
    ctx: &UpgradeContext,
    path: &Path,
    kind: FileKind,
) -> Result<(), UpgradeResult> {
    match is_timelapse_database(conn) {
        Ok(true) => {}
        Ok(false) => return Err(UpgradeResult::InvalidFile),
        Err(err) => {
            warn!("{} is not a readable Timelapse database: {}", path.display(), err);
            return Err(UpgradeResult::InvalidFile);
        }
    }

    let mut session = UpgradeSession::new(ctx, path, kind);
    run_steps(conn, &mut session, template::OPEN_REPAIRS).into_result()?;

    session.reload_controls(conn).map_err(|err| {
        warn!("Could not read the template of {}: {}", path.display(), err);
        UpgradeResult::Failed
    })?;
    if template::reopened_by_older_version(&session.controls) {
        info!(
            "{} was reopened by an older Timelapse; removing its UtcOffset control",
            path.display()
        );
        run_steps(conn, &mut session, template::REOPENED_STEPS).into_result()?;
    } else {
        run_steps(conn, &mut session, template::UPGRADE_STEPS).into_result()?;
    }

    if kind == FileKind::Template {
        return Ok(());
    }

    let reopened = reopened::is_reopened_data_file(conn).map_err(|err| {
        warn!("Could not inspect {}: {}", path.display(), err);
        UpgradeResult::Failed
    })?;
    if reopened {
        info!("{} was reopened by an older Timelapse", path.display());
        return run_steps(conn, &mut session, reopened::STEPS).into_result();
    }

    run_steps(conn, &mut session, compat::STEPS).into_result()?;
    run_steps(conn, &mut session, data::STEPS).into_result()
}
