use serde::{Deserialize, Serialize};

/// Outcome of classifying or upgrading a single file, or of a whole batch.
#[repr(i64)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeResult {
    FileNotFound = 0,
    InvalidFile = 1,
    PathTooLong = 2,
    Pre23 = 3,
    NoFilesFound = 4,
    FilesFound = 5,
    Upgraded = 6,
    AlternateBackupMade = 7,
    NoBackupMade = 8,
    Failed = 9,
    Cancelled = 10,
}

/// Which summary count a per-file result contributes to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SummaryBucket {
    Upgraded,
    Failed,
    Cancelled,
}

impl UpgradeResult {
    pub fn short_name(&self) -> &'static str {
        match self {
            UpgradeResult::FileNotFound => "NF",
            UpgradeResult::InvalidFile => "I",
            UpgradeResult::PathTooLong => "L",
            UpgradeResult::Pre23 => "P",
            UpgradeResult::NoFilesFound => "NO",
            UpgradeResult::FilesFound => "FF",
            UpgradeResult::Upgraded => "U",
            UpgradeResult::AlternateBackupMade => "A",
            UpgradeResult::NoBackupMade => "NB",
            UpgradeResult::Failed => "F",
            UpgradeResult::Cancelled => "C",
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            UpgradeResult::FileNotFound => "FileNotFound",
            UpgradeResult::InvalidFile => "InvalidFile",
            UpgradeResult::PathTooLong => "PathTooLong",
            UpgradeResult::Pre23 => "Pre23",
            UpgradeResult::NoFilesFound => "NoFilesFound",
            UpgradeResult::FilesFound => "FilesFound",
            UpgradeResult::Upgraded => "Upgraded",
            UpgradeResult::AlternateBackupMade => "AlternateBackupMade",
            UpgradeResult::NoBackupMade => "NoBackupMade",
            UpgradeResult::Failed => "Failed",
            UpgradeResult::Cancelled => "Cancelled",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            // Full names
            "FILENOTFOUND" => Some(UpgradeResult::FileNotFound),
            "INVALIDFILE" => Some(UpgradeResult::InvalidFile),
            "PATHTOOLONG" => Some(UpgradeResult::PathTooLong),
            "PRE23" => Some(UpgradeResult::Pre23),
            "NOFILESFOUND" => Some(UpgradeResult::NoFilesFound),
            "FILESFOUND" => Some(UpgradeResult::FilesFound),
            "UPGRADED" => Some(UpgradeResult::Upgraded),
            "ALTERNATEBACKUPMADE" => Some(UpgradeResult::AlternateBackupMade),
            "NOBACKUPMADE" => Some(UpgradeResult::NoBackupMade),
            "FAILED" => Some(UpgradeResult::Failed),
            "CANCELLED" => Some(UpgradeResult::Cancelled),
            // Short names
            "NF" => Some(UpgradeResult::FileNotFound),
            "I" => Some(UpgradeResult::InvalidFile),
            "L" => Some(UpgradeResult::PathTooLong),
            "P" => Some(UpgradeResult::Pre23),
            "NO" => Some(UpgradeResult::NoFilesFound),
            "FF" => Some(UpgradeResult::FilesFound),
            "U" => Some(UpgradeResult::Upgraded),
            "A" => Some(UpgradeResult::AlternateBackupMade),
            "NB" => Some(UpgradeResult::NoBackupMade),
            "F" => Some(UpgradeResult::Failed),
            "C" => Some(UpgradeResult::Cancelled),
            _ => None,
        }
    }

    /// Label shown next to a file in the batch status list.
    pub fn status_label(&self) -> &'static str {
        match self {
            UpgradeResult::Upgraded | UpgradeResult::AlternateBackupMade => FileStatus::UPGRADED,
            UpgradeResult::PathTooLong => "Failed (path too long)",
            UpgradeResult::NoBackupMade => "Failed (could not make backup)",
            UpgradeResult::FileNotFound => "Failed (file not found)",
            UpgradeResult::InvalidFile => "Failed (invalid file)",
            UpgradeResult::Cancelled => "Cancelled",
            _ => "Failed",
        }
    }

    pub fn bucket(&self) -> SummaryBucket {
        match self {
            UpgradeResult::Upgraded | UpgradeResult::AlternateBackupMade => SummaryBucket::Upgraded,
            UpgradeResult::Cancelled => SummaryBucket::Cancelled,
            _ => SummaryBucket::Failed,
        }
    }

    /// Whether a file left in this state should be put back from its backup.
    pub fn needs_restore(&self) -> bool {
        !matches!(
            self,
            UpgradeResult::Upgraded | UpgradeResult::AlternateBackupMade | UpgradeResult::PathTooLong
        )
    }
}

impl std::fmt::Display for UpgradeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Status labels that are not tied to a final result.
pub struct FileStatus;

impl FileStatus {
    pub const WAITING: &'static str = "Waiting";
    pub const PROCESSING: &'static str = "Processing";
    pub const UPGRADED: &'static str = "Upgraded";
}
