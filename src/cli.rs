use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::backup::FileBackup;
use crate::batch::{self, BatchEvent, BatchReport};
use crate::classifier::Classifier;
use crate::config::{Config, UpgradeConfig};
use crate::context::UpgradeContext;
use crate::error::UpgradeError;
use crate::logging;
use crate::upgrade_result::{FileStatus, UpgradeResult};
use crate::utils::Utils;

#[derive(Parser)]
#[command(
    name = "tlupgrade",
    version,
    about = "tlupgrade: Upgrade Timelapse template (.tdb) and data (.ddb) files to the 2.3 format"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Use this configuration file instead of the one in the data directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Back up and upgrade every pre-2.3 file in the given files and folders
    Upgrade {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Convert ImageQuality into a Dark flag instead of deleting it
        #[arg(long, default_value_t = false)]
        keep_image_quality: bool,

        /// Version to write into upgraded files (at least 2.3.0.0)
        #[arg(long)]
        timelapse_version: Option<String>,

        /// Pause between migration steps, in milliseconds
        #[arg(long)]
        step_delay_ms: Option<u64>,
    },

    /// Report which files would be upgraded, without changing anything
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Only list files with this result, by full or short name (e.g. Pre23, L)
        #[arg(long, value_parser = parse_result)]
        only: Option<UpgradeResult>,
    },

    /// List the backups of a file, newest first
    Backups {
        file: PathBuf,

        /// Leave out checkpoint backups
        #[arg(long, default_value_t = false)]
        exclude_checkpoints: bool,
    },
}

impl Command {
    /// Apply command line overrides on top of the loaded configuration.
    fn apply_overrides(&self, upgrade: &mut UpgradeConfig) {
        if let Command::Upgrade {
            keep_image_quality,
            timelapse_version,
            step_delay_ms,
            ..
        } = self
        {
            if *keep_image_quality {
                upgrade.remove_image_quality = false;
            }
            if let Some(version) = timelapse_version {
                upgrade.timelapse_version = version.clone();
            }
            if let Some(delay) = step_delay_ms {
                upgrade.step_delay_ms = *delay;
            }
        }
    }
}

impl Cli {
    pub fn handle_command_line() -> Result<(), UpgradeError> {
        let args = Cli::parse();

        let project_dirs = Config::project_dirs().ok_or_else(|| {
            UpgradeError::Error("Could not determine the tlupgrade data directory".into())
        })?;
        let config_path = args
            .config
            .clone()
            .unwrap_or_else(|| Config::default_path(&project_dirs));
        let mut config = Config::load_config(&config_path);

        let log_dir = project_dirs.data_local_dir().join("logs");
        let _logger = logging::setup_logging(&config.logging, &log_dir)?;
        info!("Using configuration from {}", config_path.display());

        let Some(command) = args.command else {
            println!("Nothing to do. Run 'tlupgrade --help' for the available commands.");
            return Ok(());
        };
        command.apply_overrides(&mut config.upgrade);
        config.upgrade.ensure_valid();

        match command {
            Command::Upgrade { paths, .. } => Self::upgrade(config.upgrade, &paths),
            Command::Check { paths, only } => Self::check(&config.upgrade, &paths, only),
            Command::Backups {
                file,
                exclude_checkpoints,
            } => Self::backups(&file, exclude_checkpoints),
        }
    }

    fn upgrade(upgrade: UpgradeConfig, paths: &[PathBuf]) -> Result<(), UpgradeError> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| UpgradeError::Error(format!("Failed to create runtime: {}", e)))?;

        let report = rt.block_on(async move {
            let cancel = CancellationToken::new();
            let ctx = UpgradeContext::with_token(upgrade, cancel.clone());
            let inputs = resolve_inputs(paths);
            let (sender, receiver) = unbounded::<BatchEvent>();

            let printer = std::thread::spawn(move || {
                let mut names: Vec<String> = Vec::new();
                for event in receiver {
                    print_event(&mut names, event);
                }
            });

            let mut batch = tokio::task::spawn_blocking(move || {
                let classifier = Classifier::new(&ctx.config);
                let candidates = classifier.collect_files(&inputs);
                batch::run_batch(&ctx, &candidates, &sender)
            });

            let report = tokio::select! {
                joined = &mut batch => joined,
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            warn!("Interrupted: cancelling after the current step");
                            cancel.cancel();
                        }
                        Err(err) => warn!("Cannot listen for Ctrl-C: {}", err),
                    }
                    batch.await
                }
            };

            if printer.join().is_err() {
                warn!("Progress printer stopped unexpectedly");
            }
            report.map_err(|e| UpgradeError::Error(format!("Upgrade task failed: {}", e)))
        })?;

        Self::finish(&report)
    }

    fn finish(report: &BatchReport) -> Result<(), UpgradeError> {
        if !report.unrestored.is_empty() {
            return Err(UpgradeError::Error(format!(
                "{} file(s) could not be restored from their backups. See the summary above.\n",
                report.unrestored.len()
            )));
        }
        match report.overall {
            UpgradeResult::Upgraded | UpgradeResult::NoFilesFound => Ok(()),
            UpgradeResult::Cancelled => Err(UpgradeError::Cancelled),
            _ => Err(UpgradeError::Error(
                "No files were upgraded. See the log for details.\n".into(),
            )),
        }
    }

    fn check(
        upgrade: &UpgradeConfig,
        paths: &[PathBuf],
        only: Option<UpgradeResult>,
    ) -> Result<(), UpgradeError> {
        let mut candidates = Classifier::new(upgrade).collect_files(&resolve_inputs(paths));
        if let Some(only) = only {
            candidates.retain(|_, result| *result == only);
        }
        if batch::survey(&candidates) == UpgradeResult::NoFilesFound {
            println!("No .ddb or .tdb files were found that require upgrading.");
            return Ok(());
        }

        let files: Vec<PathBuf> = candidates.keys().cloned().collect();
        for (path, name) in files.iter().zip(Utils::short_names(&files)) {
            let result = candidates[path];
            let status = match result {
                UpgradeResult::Pre23 => "Needs upgrading",
                result => result.status_label(),
            };
            println!("{:>2} {}: {}", result.short_name(), name, status);
        }
        Ok(())
    }

    fn backups(file: &Path, exclude_checkpoints: bool) -> Result<(), UpgradeError> {
        let backups = FileBackup::list_backups(file, exclude_checkpoints)?;
        if backups.is_empty() {
            println!("No backups of {}", file.display());
            return Ok(());
        }
        for backup in backups {
            println!("{}", backup.display());
        }
        if let Some(newest) = FileBackup::most_recent_backup(file) {
            println!("Most recent backup: {}", newest.format("%Y-%m-%d %H:%M:%S"));
        }
        Ok(())
    }
}

fn parse_result(value: &str) -> Result<UpgradeResult, String> {
    UpgradeResult::from_string(value).ok_or_else(|| format!("unknown result '{}'", value))
}

/// Canonical forms of the given paths. Paths that cannot be resolved are kept
/// as given so the classifier reports them.
fn resolve_inputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .map(|p| dunce::canonicalize(p).unwrap_or_else(|_| p.clone()))
        .collect()
}

fn print_event(names: &mut Vec<String>, event: BatchEvent) {
    match event {
        BatchEvent::Started(started) => {
            println!("Upgrading {} files", started.len());
            for name in &started {
                println!("  {}: {}", name, FileStatus::WAITING);
            }
            *names = started;
        }
        BatchEvent::Status { index, name, status } => {
            println!("[{}/{}] {}: {}", index + 1, names.len(), name, status);
        }
        BatchEvent::Finished(summary) => println!("{}", summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parsing_no_command() {
        let cli = Cli::try_parse_from(["tlupgrade"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_parsing_upgrade() {
        let cli = Cli::try_parse_from([
            "tlupgrade",
            "upgrade",
            "a.ddb",
            "cams",
            "--keep-image-quality",
            "--timelapse-version",
            "2.3.1.0",
            "--step-delay-ms",
            "25",
            "--config",
            "my.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));

        let command = cli.command.unwrap();
        let mut upgrade = Config::default().upgrade;
        command.apply_overrides(&mut upgrade);
        assert!(!upgrade.remove_image_quality);
        assert_eq!(upgrade.timelapse_version, "2.3.1.0");
        assert_eq!(upgrade.step_delay_ms, 25);

        match command {
            Command::Upgrade { paths, .. } => {
                assert_eq!(paths, vec![PathBuf::from("a.ddb"), PathBuf::from("cams")])
            }
            _ => panic!("expected upgrade"),
        }
    }

    #[test]
    fn test_cli_parsing_check_and_backups() {
        let cli = Cli::try_parse_from(["tlupgrade", "check", "cams", "--only", "L"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Check {
                only: Some(UpgradeResult::PathTooLong),
                ..
            })
        ));
        assert!(Cli::try_parse_from(["tlupgrade", "check", "cams", "--only", "bogus"]).is_err());

        let cli = Cli::try_parse_from(["tlupgrade", "check", "cams"]).unwrap();
        let command = cli.command.unwrap();
        let mut upgrade = Config::default().upgrade;
        command.apply_overrides(&mut upgrade);
        assert_eq!(upgrade, Config::default().upgrade);
        assert!(matches!(command, Command::Check { .. }));

        let cli =
            Cli::try_parse_from(["tlupgrade", "backups", "Site.ddb", "--exclude-checkpoints"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Backups {
                exclude_checkpoints: true,
                ..
            })
        ));
    }

    #[test]
    fn test_cli_parsing_invalid_arguments() {
        assert!(Cli::try_parse_from(["tlupgrade", "upgrade"]).is_err());
        assert!(Cli::try_parse_from(["tlupgrade", "nonexistent-command"]).is_err());
        assert!(Cli::try_parse_from(["tlupgrade", "check", "a.ddb", "--keep-image-quality"]).is_err());
    }
}
