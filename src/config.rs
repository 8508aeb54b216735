use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::version::Version;

pub const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_PREFIX: &str = "TLUPGRADE_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub tlupgrade: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const TLUPGRADE_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            tlupgrade: Self::TLUPGRADE_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.tlupgrade.clone();
        self.tlupgrade = self.tlupgrade.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.tlupgrade.as_str()) {
            eprintln!(
                "Config error: tlupgrade log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::TLUPGRADE_LEVEL
            );
            self.tlupgrade = Self::TLUPGRADE_LEVEL.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UpgradeConfig {
    /// Delete the legacy ImageQuality column instead of converting it to a Dark flag.
    pub remove_image_quality: bool,
    /// Version written into upgraded files.
    pub timelapse_version: String,
    /// Pause between migration steps, in milliseconds.
    pub step_delay_ms: u64,
    /// Longest path allowed for a database, its journal or its backup.
    pub max_path_length: usize,
}

impl UpgradeConfig {
    pub const MAX_PATH_LENGTH: usize = 259;

    fn default() -> Self {
        UpgradeConfig {
            remove_image_quality: true,
            timelapse_version: Version::MINIMUM_CURRENT.to_owned(),
            step_delay_ms: 0,
            max_path_length: Self::MAX_PATH_LENGTH,
        }
    }

    pub fn version(&self) -> Version {
        Version::parse(&self.timelapse_version).unwrap_or_else(|_| Version::minimum_current())
    }

    pub fn ensure_valid(&mut self) {
        let str_original = self.timelapse_version.clone();
        self.timelapse_version = self.timelapse_version.trim().to_owned();
        match Version::parse(&self.timelapse_version) {
            Ok(v) if v.is_current() => {}
            _ => {
                eprintln!(
                    "Config error: timelapse_version of '{}' is invalid or older than {} - using default of '{}'",
                    str_original,
                    Version::MINIMUM_CURRENT,
                    Version::MINIMUM_CURRENT
                );
                self.timelapse_version = Version::MINIMUM_CURRENT.to_owned();
            }
        }

        if self.max_path_length == 0 {
            eprintln!(
                "Config error: max_path_length of 0 is invalid - using default of {}",
                Self::MAX_PATH_LENGTH
            );
            self.max_path_length = Self::MAX_PATH_LENGTH;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub logging: LoggingConfig,
    pub upgrade: UpgradeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            logging: LoggingConfig::default(),
            upgrade: UpgradeConfig::default(),
        }
    }
}

impl Config {
    pub fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "tlupgrade")
    }

    pub fn default_path(project_dirs: &ProjectDirs) -> PathBuf {
        project_dirs.data_local_dir().join(CONFIG_FILE_NAME)
    }

    /// Loads the configuration from `config_path`, writing the defaults there
    /// first if no file exists. `TLUPGRADE_` environment variables override the
    /// file (`TLUPGRADE_UPGRADE__STEP_DELAY_MS=100`). Unreadable files fall back
    /// to the defaults.
    pub fn load_config(config_path: &Path) -> Self {
        let default_config = Config::default();

        if !config_path.exists() {
            Self::write_default(config_path, &default_config);
        }

        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    fn write_default(config_path: &Path, default_config: &Config) {
        if let Some(parent) = config_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!(
                    "Failed to create configuration directory {}: {}",
                    parent.display(),
                    e
                );
            }
        }
        match toml::to_string_pretty(default_config) {
            Ok(toml_string) => {
                if let Err(e) = fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            }
            Err(_) => eprintln!("Failed to serialize default config."),
        }
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.upgrade.ensure_valid();
    }
}
