use std::path::Path;
use std::thread;

use log::{debug, info, warn};
use rusqlite::Connection;

use crate::classifier::FileKind;
use crate::context::UpgradeContext;
use crate::controls::{ControlRow, TemplateTable};
use crate::database::Database;
use crate::error::UpgradeError;
use crate::upgrade_result::UpgradeResult;
use crate::version::Version;

/// Function type for one schema alteration.
pub type StepFn = fn(&Connection, &mut UpgradeSession) -> Result<(), UpgradeError>;

/// A named, idempotent alteration. Each step checks whether its target
/// already has the expected shape before changing it.
pub struct Step {
    pub name: &'static str,
    pub run: StepFn,
}

impl Step {
    pub const fn new(name: &'static str, run: StepFn) -> Self {
        Self { name, run }
    }
}

/// State carried between the steps of one file's upgrade.
pub struct UpgradeSession<'a> {
    pub ctx: &'a UpgradeContext,
    pub path: &'a Path,
    pub kind: FileKind,
    /// Version marker read before the first step changed anything.
    pub version: Version,
    pub controls: Vec<ControlRow>,
    pub date_time_was_missing: bool,
    pub time_zone_was_missing: bool,
}

impl<'a> UpgradeSession<'a> {
    pub fn new(ctx: &'a UpgradeContext, path: &'a Path, kind: FileKind) -> Self {
        UpgradeSession {
            ctx,
            path,
            kind,
            version: Version::lowest(),
            controls: Vec::new(),
            date_time_was_missing: false,
            time_zone_was_missing: false,
        }
    }

    pub fn reload_controls(&mut self, conn: &Connection) -> Result<(), UpgradeError> {
        self.controls = TemplateTable::load(conn)?;
        Ok(())
    }

    pub fn remove_image_quality(&self) -> bool {
        self.ctx.config.remove_image_quality
    }
}

#[derive(Debug)]
pub enum SequenceOutcome {
    Completed,
    Cancelled,
    Failed {
        step: &'static str,
        error: UpgradeError,
    },
}

impl SequenceOutcome {
    /// `Ok` when every step ran, otherwise the result that ends the file's upgrade.
    pub fn into_result(self) -> Result<(), UpgradeResult> {
        match self {
            SequenceOutcome::Completed => Ok(()),
            SequenceOutcome::Cancelled => Err(UpgradeResult::Cancelled),
            SequenceOutcome::Failed { step, error } => {
                warn!("Upgrade stopped at step '{}': {}", step, error);
                Err(UpgradeResult::Failed)
            }
        }
    }
}

/// Run `steps` in order, each in its own immediate transaction.
///
/// The cancellation token is checked before every step. Steps that already
/// committed stay committed; the first failing step stops the sequence.
pub fn run_steps(conn: &Connection, session: &mut UpgradeSession, steps: &[Step]) -> SequenceOutcome {
    for (index, step) in steps.iter().enumerate() {
        if session.ctx.check_cancelled().is_err() {
            info!(
                "Cancelled before step '{}' of {}",
                step.name,
                session.path.display()
            );
            return SequenceOutcome::Cancelled;
        }
        if index > 0 && session.ctx.config.step_delay_ms > 0 {
            thread::sleep(session.ctx.step_delay());
        }

        debug!("Step '{}' on {}", step.name, session.path.display());
        let result = Database::immediate_transaction(conn, |c| (step.run)(c, session));
        match result {
            Ok(()) => {}
            Err(UpgradeError::Cancelled) => return SequenceOutcome::Cancelled,
            Err(error) => {
                debug!("Step '{}' failed on {}", step.name, session.path.display());
                return SequenceOutcome::Failed {
                    step: step.name,
                    error,
                };
            }
        }
    }
    SequenceOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn conn_with_table() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT);").unwrap();
        conn
    }

    fn insert_a(conn: &Connection, _s: &mut UpgradeSession) -> Result<(), UpgradeError> {
        conn.execute("INSERT INTO t VALUES ('a')", [])?;
        Ok(())
    }

    fn insert_then_fail(conn: &Connection, _s: &mut UpgradeSession) -> Result<(), UpgradeError> {
        conn.execute("INSERT INTO t VALUES ('b')", [])?;
        Err(UpgradeError::StepFailed {
            step: "insert_then_fail",
            reason: "forced".into(),
        })
    }

    fn cancel_now(_conn: &Connection, s: &mut UpgradeSession) -> Result<(), UpgradeError> {
        s.ctx.cancel.cancel();
        Ok(())
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn test_completed() {
        let conn = conn_with_table();
        let ctx = UpgradeContext::new(Config::default().upgrade);
        let mut session = UpgradeSession::new(&ctx, Path::new("x.ddb"), FileKind::Data);
        let steps = [Step::new("a", insert_a), Step::new("a again", insert_a)];

        let outcome = run_steps(&conn, &mut session, &steps);
        assert!(matches!(outcome, SequenceOutcome::Completed));
        assert_eq!(count(&conn), 2);
    }

    #[test]
    fn test_failed_step_rolls_back_and_stops() {
        let conn = conn_with_table();
        let ctx = UpgradeContext::new(Config::default().upgrade);
        let mut session = UpgradeSession::new(&ctx, Path::new("x.ddb"), FileKind::Data);
        let steps = [
            Step::new("a", insert_a),
            Step::new("fail", insert_then_fail),
            Step::new("never", insert_a),
        ];

        let outcome = run_steps(&conn, &mut session, &steps);
        assert!(matches!(outcome, SequenceOutcome::Failed { step: "fail", .. }));
        assert_eq!(outcome.into_result(), Err(UpgradeResult::Failed));
        // Only the first step's row survives
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_cancel_checked_before_each_step() {
        let conn = conn_with_table();
        let ctx = UpgradeContext::new(Config::default().upgrade);
        let mut session = UpgradeSession::new(&ctx, Path::new("x.ddb"), FileKind::Data);
        let steps = [
            Step::new("a", insert_a),
            Step::new("cancel", cancel_now),
            Step::new("never", insert_a),
        ];

        let outcome = run_steps(&conn, &mut session, &steps);
        assert!(matches!(outcome, SequenceOutcome::Cancelled));
        assert_eq!(outcome.into_result(), Err(UpgradeResult::Cancelled));
        assert_eq!(count(&conn), 1);
    }
}
