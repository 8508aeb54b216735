use flexi_logger::FlexiLoggerError;
use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error), // Converts io::Error into UpgradeError automatically

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError), // Converts rusqlite::Error automatically

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    XmlError(#[from] roxmltree::Error),

    #[error("Logger error: {0}")]
    LoggerError(#[from] FlexiLoggerError),

    #[error("Invalid version: {0}")]
    Version(String),

    #[error("Step '{step}' failed: {reason}")]
    StepFailed { step: &'static str, reason: String },

    #[error("Upgrade was cancelled")]
    Cancelled,

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}
