use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Local;
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};

use crate::backup::FileBackup;
use crate::classifier::Classifier;
use crate::context::UpgradeContext;
use crate::upgrade;
use crate::upgrade_result::{FileStatus, SummaryBucket, UpgradeResult};
use crate::utils::Utils;

const PATH_TOO_LONG_NOTE: &str =
    "Some upgrades failed as their file path length are near Windows' allowed maximum.";
const PATH_TOO_LONG_HINT: &str =
    "\u{2022} shorten the path by moving your image folder higher up the folder hierarchy";
const NOT_RESTORED_SUFFIX: &str = " (not restored from backup)";

/// Progress of a batch, in the order it happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    /// Short names of every candidate, each starting as `Waiting`.
    Started(Vec<String>),
    Status {
        index: usize,
        name: String,
        status: String,
    },
    Finished(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// `NoFilesFound`, `Cancelled`, `Upgraded` when at least one file was
    /// upgraded, otherwise `Failed`.
    pub overall: UpgradeResult,
    pub results: BTreeMap<PathBuf, UpgradeResult>,
    /// Files that could not be put back from their backup and may be partly upgraded.
    pub unrestored: Vec<PathBuf>,
    pub summary: String,
}

#[derive(Debug, Default)]
struct Tally {
    upgraded: usize,
    failed: usize,
    cancelled: usize,
    path_too_long: bool,
    unrestored: Vec<(PathBuf, PathBuf)>,
}

impl Tally {
    fn record(&mut self, result: UpgradeResult) {
        match result.bucket() {
            SummaryBucket::Upgraded => self.upgraded += 1,
            SummaryBucket::Failed => self.failed += 1,
            SummaryBucket::Cancelled => self.cancelled += 1,
        }
        if result == UpgradeResult::PathTooLong {
            self.path_too_long = true;
        }
    }

    fn summary(&self, total: usize) -> String {
        let mut summary = format!(
            "Finished. {}/{} files upgraded successfully, {} failed, {} cancelled.",
            self.upgraded, total, self.failed, self.cancelled
        );
        if self.path_too_long {
            summary.push('\n');
            summary.push_str(PATH_TOO_LONG_NOTE);
            summary.push('\n');
            summary.push_str(PATH_TOO_LONG_HINT);
        }
        for (file, backup) in &self.unrestored {
            summary.push('\n');
            summary.push_str(&format!(
                "Could not restore {} from {}; the file may be partly upgraded.",
                file.display(),
                backup.display()
            ));
        }
        summary
    }

    fn overall(&self) -> UpgradeResult {
        if self.cancelled > 0 {
            UpgradeResult::Cancelled
        } else if self.upgraded > 0 {
            UpgradeResult::Upgraded
        } else {
            UpgradeResult::Failed
        }
    }
}

fn publish(events: &Sender<BatchEvent>, event: BatchEvent) {
    if events.send(event).is_err() {
        debug!("Batch event dropped: no receiver");
    }
}

/// `FilesFound` when a batch would have anything to report, otherwise `NoFilesFound`.
pub fn survey(candidates: &BTreeMap<PathBuf, UpgradeResult>) -> UpgradeResult {
    if candidates.is_empty() {
        UpgradeResult::NoFilesFound
    } else {
        UpgradeResult::FilesFound
    }
}

/// Upgrade `candidates` one at a time in path order, reporting progress on
/// `events`. Each file is backed up first and restored from that backup
/// unless it ends upgraded.
pub fn run_batch(
    ctx: &UpgradeContext,
    candidates: &BTreeMap<PathBuf, UpgradeResult>,
    events: &Sender<BatchEvent>,
) -> BatchReport {
    if survey(candidates) == UpgradeResult::NoFilesFound {
        let summary = "No .ddb or .tdb files were found that require upgrading.".to_string();
        publish(events, BatchEvent::Finished(summary.clone()));
        return BatchReport {
            overall: UpgradeResult::NoFilesFound,
            results: BTreeMap::new(),
            unrestored: Vec::new(),
            summary,
        };
    }

    let paths: Vec<PathBuf> = candidates.keys().cloned().collect();
    let names = Utils::short_names(&paths);
    publish(events, BatchEvent::Started(names.clone()));

    let classifier = Classifier::new(&ctx.config);
    let mut tally = Tally::default();
    let mut results = BTreeMap::new();

    for (index, (path, name)) in paths.iter().zip(names.iter()).enumerate() {
        let found = candidates
            .get(path)
            .copied()
            .unwrap_or(UpgradeResult::Pre23);

        let mut unrestored = None;
        let result = if ctx.check_cancelled().is_err() {
            UpgradeResult::Cancelled
        } else if matches!(found, UpgradeResult::PathTooLong | UpgradeResult::InvalidFile) {
            found
        } else {
            publish(
                events,
                BatchEvent::Status {
                    index,
                    name: name.clone(),
                    status: FileStatus::PROCESSING.to_string(),
                },
            );
            let (result, backup) = upgrade_one(ctx, &classifier, path);
            unrestored = backup;
            result
        };

        info!("{}: {}", path.display(), result);
        tally.record(result);
        results.insert(path.clone(), result);
        let mut status = result.status_label().to_string();
        if let Some(backup) = unrestored {
            status.push_str(NOT_RESTORED_SUFFIX);
            tally.unrestored.push((path.clone(), backup));
        }
        publish(
            events,
            BatchEvent::Status {
                index,
                name: name.clone(),
                status,
            },
        );
    }

    let summary = tally.summary(paths.len());
    publish(events, BatchEvent::Finished(summary.clone()));
    BatchReport {
        overall: tally.overall(),
        results,
        unrestored: tally.unrestored.into_iter().map(|(file, _)| file).collect(),
        summary,
    }
}

/// Back up, upgrade and, unless upgraded, restore one file. The second value
/// is the backup path when the restore itself failed.
fn upgrade_one(
    ctx: &UpgradeContext,
    classifier: &Classifier,
    path: &Path,
) -> (UpgradeResult, Option<PathBuf>) {
    let backup = match FileBackup::try_create(path, &Local::now(), classifier) {
        Ok(artifact) => artifact,
        Err(err) => {
            warn!("Could not back up {}: {}", path.display(), err);
            return (UpgradeResult::NoBackupMade, None);
        }
    };

    let result = match upgrade::upgrade_file(ctx, path) {
        UpgradeResult::Upgraded if backup.alternate => UpgradeResult::AlternateBackupMade,
        result => result,
    };

    if result.needs_restore() {
        if let Err(err) = FileBackup::restore(path, &backup.path) {
            error!(
                "Could not restore {} from {}: {}",
                path.display(),
                backup.path.display(),
                err
            );
            return (result, Some(backup.path));
        }
    }
    (result, None)
}
