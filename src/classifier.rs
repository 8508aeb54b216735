use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use walkdir::WalkDir;

use crate::backup::BACKUP_FOLDER;
use crate::config::UpgradeConfig;
use crate::controls::ControlType;
use crate::database::Database;
use crate::error::UpgradeError;
use crate::schema::{column, control, table};
use crate::upgrade_result::UpgradeResult;
use crate::version::{self, Version};

pub const TEMPLATE_EXTENSION: &str = "tdb";
pub const DATA_EXTENSION: &str = "ddb";
const JOURNAL_SUFFIX: &str = "-journal";

// Windows 8.3 alias such as PROGRA~1
static SHORT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{6}~\d$").expect("Invalid short name regex"));

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileKind {
    DoesNotExist,
    InvalidExtension,
    Template,
    Data,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PathKind {
    /// A database, measured with the journal SQLite writes beside it.
    Database,
    Backup,
}

/// What `classify` found in a file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Classification {
    Current,
    NeedsUpgrade,
    Invalid,
}

pub struct Classifier {
    max_path_length: usize,
}

impl Classifier {
    pub fn new(config: &UpgradeConfig) -> Self {
        Self::with_max_path_length(config.max_path_length)
    }

    pub fn with_max_path_length(max_path_length: usize) -> Self {
        Classifier { max_path_length }
    }

    pub fn is_path_too_long(&self, path: &Path, kind: PathKind) -> bool {
        let mut length = path.to_string_lossy().chars().count();
        if kind == PathKind::Database {
            length += JOURNAL_SUFFIX.len();
        }
        if length > self.max_path_length {
            return true;
        }

        path.file_stem()
            .map(|stem| SHORT_NAME_RE.is_match(&stem.to_string_lossy()))
            .unwrap_or(false)
    }

    pub fn check_file_path(&self, path: &Path) -> FileKind {
        if self.is_path_too_long(path, PathKind::Database) || !path.is_file() {
            return FileKind::DoesNotExist;
        }
        kind_from_extension(path)
    }

    /// Decide whether an existing `.tdb` or `.ddb` needs upgrading.
    pub fn classify(&self, path: &Path) -> Classification {
        match Self::classify_inner(path) {
            Ok(c) => c,
            Err(err) => {
                warn!("Could not classify {}: {}", path.display(), err);
                Classification::Invalid
            }
        }
    }

    fn classify_inner(path: &Path) -> Result<Classification, UpgradeError> {
        let db = Database::open_read_only(path)?;
        let conn = db.conn();
        if !Database::quick_check(conn)? {
            return Ok(Classification::Invalid);
        }

        match kind_from_extension(path) {
            FileKind::Template => {
                if version::read_template_version(conn)?.is_current() {
                    let utc_controls: i64 = conn.query_row(
                        &format!(
                            "SELECT COUNT(*) FROM {} WHERE {} = ?",
                            table::TEMPLATE,
                            control::TYPE
                        ),
                        [ControlType::UtcOffset.as_ref()],
                        |row| row.get(0),
                    )?;
                    if utc_controls == 0 {
                        return Ok(Classification::Current);
                    }
                }
                Ok(Classification::NeedsUpgrade)
            }
            FileKind::Data => {
                if !Database::has_column(conn, table::IMAGE_SET, column::VERSION_COMPATIBILITY)? {
                    return Ok(Classification::NeedsUpgrade);
                }
                let versions = Database::distinct_values(
                    conn,
                    table::IMAGE_SET,
                    column::VERSION_COMPATIBILITY,
                )?;
                let current = versions.len() == 1
                    && Version::parse(&versions[0])
                        .map(|v| v.is_current())
                        .unwrap_or(false);
                if current && !Database::has_column(conn, table::DATA, column::UTC_OFFSET)? {
                    return Ok(Classification::Current);
                }
                Ok(Classification::NeedsUpgrade)
            }
            _ => Ok(Classification::Invalid),
        }
    }

    /// Expand files and folders into the candidate files of a batch.
    ///
    /// Folders are searched recursively, skipping `Backups` folders. Current
    /// files are left out; every other file maps to `PathTooLong`,
    /// `InvalidFile` or `Pre23`.
    pub fn collect_files(&self, inputs: &[PathBuf]) -> BTreeMap<PathBuf, UpgradeResult> {
        let mut found: Vec<PathBuf> = Vec::new();
        let mut results = BTreeMap::new();

        for input in inputs {
            match fs::metadata(input) {
                Ok(meta) if meta.is_dir() => {
                    found.extend(
                        WalkDir::new(input)
                            .into_iter()
                            .filter_entry(|e| {
                                !(e.file_type().is_dir() && e.file_name() == BACKUP_FOLDER)
                            })
                            .filter_map(|e| e.ok())
                            .filter(|e| e.file_type().is_file())
                            .map(|e| e.into_path())
                            .filter(|p| has_database_extension(p)),
                    );
                }
                Ok(_) => {
                    if has_database_extension(input) {
                        found.push(input.clone());
                    } else {
                        debug!("Ignoring {}: not a .tdb or .ddb file", input.display());
                    }
                }
                Err(err) => {
                    warn!("Cannot inspect {}: {}", input.display(), err);
                    results.insert(input.clone(), UpgradeResult::PathTooLong);
                }
            }
        }

        for file in found {
            if results.contains_key(&file) {
                continue;
            }
            if self.is_path_too_long(&file, PathKind::Database) {
                results.insert(file, UpgradeResult::PathTooLong);
                continue;
            }
            match self.classify(&file) {
                Classification::Current => info!("Already current: {}", file.display()),
                Classification::Invalid => {
                    results.insert(file, UpgradeResult::InvalidFile);
                }
                Classification::NeedsUpgrade => {
                    results.insert(file, UpgradeResult::Pre23);
                }
            }
        }

        results
    }
}

fn kind_from_extension(path: &Path) -> FileKind {
    match path.extension().and_then(|e| e.to_str()) {
        Some(TEMPLATE_EXTENSION) => FileKind::Template,
        Some(DATA_EXTENSION) => FileKind::Data,
        _ => FileKind::InvalidExtension,
    }
}

fn has_database_extension(path: &Path) -> bool {
    matches!(kind_from_extension(path), FileKind::Template | FileKind::Data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use tempfile::TempDir;

    fn classifier() -> Classifier {
        Classifier::with_max_path_length(UpgradeConfig::MAX_PATH_LENGTH)
    }

    #[test]
    fn test_is_path_too_long() {
        let c = Classifier::with_max_path_length(20);
        // 12 characters, 20 with the journal suffix
        assert!(!c.is_path_too_long(Path::new("/tmp/abc.ddb"), PathKind::Database));
        assert!(c.is_path_too_long(Path::new("/tmp/abcd.ddb"), PathKind::Database));
        assert!(!c.is_path_too_long(Path::new("/tmp/abcd.ddb"), PathKind::Backup));
        assert!(c.is_path_too_long(Path::new("/a/PROGRA~1.ddb"), PathKind::Backup));
        assert!(!c.is_path_too_long(Path::new("/a/progra~1.ddb"), PathKind::Backup));
    }

    #[test]
    fn test_check_file_path() {
        let dir = TempDir::new().unwrap();
        let ddb = dir.path().join("a.ddb");
        let txt = dir.path().join("a.txt");
        fs::write(&ddb, b"").unwrap();
        fs::write(&txt, b"").unwrap();
        let c = classifier();
        assert_eq!(c.check_file_path(&ddb), FileKind::Data);
        assert_eq!(c.check_file_path(&txt), FileKind::InvalidExtension);
        assert_eq!(c.check_file_path(&dir.path().join("none.tdb")), FileKind::DoesNotExist);
        assert_eq!(
            Classifier::with_max_path_length(5).check_file_path(&ddb),
            FileKind::DoesNotExist
        );
    }

    #[test]
    fn test_classify_legacy_and_invalid() {
        let dir = TempDir::new().unwrap();
        let tdb = test_support::legacy_template(dir.path());
        let ddb = test_support::legacy_data(dir.path());
        let bad = dir.path().join("bad.ddb");
        fs::write(&bad, b"not a database at all, just text").unwrap();

        let c = classifier();
        assert_eq!(c.classify(&tdb), Classification::NeedsUpgrade);
        assert_eq!(c.classify(&ddb), Classification::NeedsUpgrade);
        assert_eq!(c.classify(&bad), Classification::Invalid);
    }

    #[test]
    fn test_classify_current_data_file() {
        let dir = TempDir::new().unwrap();
        let ddb = test_support::legacy_data(dir.path());
        {
            let conn = rusqlite::Connection::open(&ddb).unwrap();
            conn.execute_batch("UPDATE ImageSetTable SET VersionCompatabily = '2.3.0.0';")
                .unwrap();
            Database::delete_column(&conn, "DataTable", "UtcOffset").unwrap();
        }
        assert_eq!(classifier().classify(&ddb), Classification::Current);
    }

    #[test]
    fn test_collect_files_skips_current_and_backups() {
        let dir = TempDir::new().unwrap();
        let ddb = test_support::legacy_data(dir.path());
        let backups = dir.path().join(BACKUP_FOLDER);
        fs::create_dir(&backups).unwrap();
        fs::copy(&ddb, backups.join("old.Pre2.3.2024-01-01.00-00-00.ddb")).unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let c = classifier();
        let found = c.collect_files(&[dir.path().to_path_buf()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found.get(&ddb), Some(&UpgradeResult::Pre23));

        let missing = dir.path().join("gone");
        let found = c.collect_files(&[missing.clone()]);
        assert_eq!(found.get(&missing), Some(&UpgradeResult::PathTooLong));
    }
}
