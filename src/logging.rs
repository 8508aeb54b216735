use std::path::Path;

use flexi_logger::{
    detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming,
};

use crate::config::LoggingConfig;
use crate::error::UpgradeError;

const LOG_BASENAME: &str = "tlupgrade";
const LOG_ROTATE_BYTES: u64 = 10 * 1024 * 1024;
const LOG_FILES_KEPT: usize = 5;

/// Build the flexi_logger spec, e.g. `warn, tlupgrade=debug`.
pub fn log_spec(logging: &LoggingConfig) -> String {
    format!("warn, tlupgrade={}", logging.tlupgrade)
}

/// Start file logging under `log_dir`. `RUST_LOG` overrides the configured level.
/// The returned handle must be kept alive for the life of the program.
pub fn setup_logging(logging: &LoggingConfig, log_dir: &Path) -> Result<LoggerHandle, UpgradeError> {
    let handle = Logger::try_with_env_or_str(log_spec(logging))?
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename(LOG_BASENAME),
        )
        .format_for_files(detailed_format)
        .rotate(
            Criterion::Size(LOG_ROTATE_BYTES),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(LOG_FILES_KEPT),
        )
        .duplicate_to_stderr(Duplicate::Warn)
        .start()?;

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_spec() {
        let logging = LoggingConfig {
            tlupgrade: "debug".into(),
        };
        assert_eq!(log_spec(&logging), "warn, tlupgrade=debug");
    }
}
