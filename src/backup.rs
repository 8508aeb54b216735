use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::classifier::{Classifier, PathKind, DATA_EXTENSION};
use crate::error::UpgradeError;

pub const BACKUP_FOLDER: &str = "Backups";
pub const PRE23_INDICATOR: &str = ".Pre2.3";
pub const CHECKPOINT_INDICATOR: &str = ".Checkpoint-";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d.%H-%M-%S";
const ALTERNATE_DATA_EXTENSION: &str = "dbk";
const ALTERNATE_TEMPLATE_EXTENSION: &str = "tbk";

/// A copy of a file taken before it is modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub path: PathBuf,
    /// True when written beside the file as `.dbk`/`.tbk` instead of into `Backups`.
    pub alternate: bool,
}

pub struct FileBackup;

impl FileBackup {
    pub fn backup_folder(path: &Path) -> Option<PathBuf> {
        path.parent().map(|dir| dir.join(BACKUP_FOLDER))
    }

    fn alternate_path(path: &Path) -> PathBuf {
        let extension = match path.extension().and_then(|e| e.to_str()) {
            Some(DATA_EXTENSION) => ALTERNATE_DATA_EXTENSION,
            _ => ALTERNATE_TEMPLATE_EXTENSION,
        };
        path.with_extension(extension)
    }

    fn timestamped_name(path: &Path, now: &DateTime<Local>) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        format!(
            "{}{}.{}{}",
            stem,
            PRE23_INDICATOR,
            now.format(TIMESTAMP_FORMAT),
            extension
        )
    }

    /// Copy `path` into its `Backups` folder with a `.Pre2.3.{timestamp}` name.
    ///
    /// Falls back to an alternate copy beside the file when the folder cannot
    /// be created or the backup path would be too long. An existing file at the
    /// destination is replaced. Any copy failure is returned as an error.
    pub fn try_create(
        path: &Path,
        now: &DateTime<Local>,
        classifier: &Classifier,
    ) -> Result<BackupArtifact, UpgradeError> {
        if !path.is_file() {
            return Err(UpgradeError::Error(format!(
                "Nothing to back up: {} does not exist",
                path.display()
            )));
        }

        let folder = Self::backup_folder(path).and_then(|folder| match fs::create_dir_all(&folder) {
            Ok(()) => Some(folder),
            Err(err) => {
                warn!("Could not create backup folder {}: {}", folder.display(), err);
                None
            }
        });

        let mut artifact = match folder {
            Some(folder) => BackupArtifact {
                path: folder.join(Self::timestamped_name(path, now)),
                alternate: false,
            },
            None => BackupArtifact {
                path: Self::alternate_path(path),
                alternate: true,
            },
        };

        if classifier.is_path_too_long(&artifact.path, PathKind::Backup) {
            artifact = BackupArtifact {
                path: Self::alternate_path(path),
                alternate: true,
            };
        }

        if artifact.path.exists() {
            fs::remove_file(&artifact.path)?;
        }
        fs::copy(path, &artifact.path)?;

        info!("Backed up {} to {}", path.display(), artifact.path.display());
        Ok(artifact)
    }

    /// Put `backup` in place of `original`. The backup file is consumed.
    pub fn restore(original: &Path, backup: &Path) -> Result<(), UpgradeError> {
        if !backup.is_file() {
            return Err(UpgradeError::Error(format!(
                "Backup {} does not exist",
                backup.display()
            )));
        }
        if original.exists() {
            fs::remove_file(original)?;
        }
        fs::rename(backup, original)?;
        info!("Restored {} from {}", original.display(), backup.display());
        Ok(())
    }

    /// Backups of `path` in its `Backups` folder, newest first.
    pub fn list_backups(path: &Path, exclude_checkpoints: bool) -> Result<Vec<PathBuf>, UpgradeError> {
        let Some(folder) = Self::backup_folder(path).filter(|f| f.is_dir()) else {
            return Ok(Vec::new());
        };
        // `Site.` so that `SiteB.Pre2.3...` is not taken for a backup of `Site`
        let prefix = path
            .file_stem()
            .map(|s| format!("{}.", s.to_string_lossy()))
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut backups: Vec<(SystemTime, PathBuf)> = fs::read_dir(&folder)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.starts_with(&prefix)
                    && name.ends_with(&extension)
                    && !(exclude_checkpoints && name.contains(CHECKPOINT_INDICATOR))
            })
            .map(|e| {
                let modified = e
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, e.path())
            })
            .collect();

        backups.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(backups.into_iter().map(|(_, p)| p).collect())
    }

    pub fn most_recent_backup(path: &Path) -> Option<DateTime<Local>> {
        let newest = Self::list_backups(path, false).ok()?.into_iter().next()?;
        let modified = fs::metadata(newest).and_then(|m| m.modified()).ok()?;
        Some(DateTime::<Local>::from(modified))
    }
}
