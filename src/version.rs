use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension};

use crate::database::Database;
use crate::error::UpgradeError;
use crate::schema::{column, table};

/// Dotted Timelapse version number, e.g. `2.2.3.8`.
///
/// Components compare numerically and a missing trailing component counts as
/// zero, so `2.3` and `2.3.0.0` are equal.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    parts: Vec<u64>,
}

impl Version {
    /// Version assumed for data files written before the marker column existed.
    pub const LOWEST: &'static str = "1.0.0.0";

    /// First version that uses the upgraded schema.
    pub const MINIMUM_CURRENT: &'static str = "2.3.0.0";

    pub fn parse(s: &str) -> Result<Self, UpgradeError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(UpgradeError::Version(s.to_owned()));
        }

        let parts = trimmed
            .split('.')
            .map(|p| p.trim().parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| UpgradeError::Version(s.to_owned()))?;

        Ok(Version { parts })
    }

    pub fn lowest() -> Self {
        Self::from_const(Self::LOWEST)
    }

    pub fn minimum_current() -> Self {
        Self::from_const(Self::MINIMUM_CURRENT)
    }

    fn from_const(s: &'static str) -> Self {
        Version {
            parts: s.split('.').filter_map(|p| p.parse().ok()).collect(),
        }
    }

    fn component(&self, index: usize) -> u64 {
        self.parts.get(index).copied().unwrap_or(0)
    }

    pub fn is_current(&self) -> bool {
        *self >= Self::minimum_current()
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl FromStr for Version {
    type Err = UpgradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", joined.join("."))
    }
}

/// Read the schema version marker of a data file.
///
/// Returns [`Version::LOWEST`] when `ImageSetTable` has no `VersionCompatabily`
/// column, and also when the stored value cannot be parsed.
pub fn read_data_version(conn: &Connection) -> Result<Version, UpgradeError> {
    read_marker(conn, table::IMAGE_SET)
}

/// Read the schema version marker of a template file, stored in `TemplateInfo`.
pub fn read_template_version(conn: &Connection) -> Result<Version, UpgradeError> {
    if !Database::table_exists(conn, table::TEMPLATE_INFO)? {
        return Ok(Version::lowest());
    }
    read_marker(conn, table::TEMPLATE_INFO)
}

fn read_marker(conn: &Connection, table_name: &str) -> Result<Version, UpgradeError> {
    if !Database::table_exists(conn, table_name)?
        || !Database::has_column(conn, table_name, column::VERSION_COMPATIBILITY)?
    {
        return Ok(Version::lowest());
    }

    let sql = format!(
        "SELECT {} FROM {} LIMIT 1",
        column::VERSION_COMPATIBILITY,
        table_name
    );
    let stored: Option<Option<String>> = conn
        .query_row(&sql, [], |row| row.get(0))
        .optional()?;

    match stored.flatten() {
        Some(s) => Ok(Version::parse(&s).unwrap_or_else(|_| {
            log::warn!(
                "Unreadable version marker '{}' in {}, treating as {}",
                s,
                table_name,
                Version::LOWEST
            );
            Version::lowest()
        })),
        None => Ok(Version::lowest()),
    }
}
