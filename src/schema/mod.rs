//! Table, column and default-value names used by Timelapse `.tdb` and `.ddb` files.

pub mod table {
    pub const TEMPLATE: &str = "TemplateTable";
    pub const DATA: &str = "DataTable";
    pub const IMAGE_SET: &str = "ImageSetTable";
    pub const TEMPLATE_INFO: &str = "TemplateInfo";
    pub const MARKERS: &str = "MarkersTable";
    pub const INFO: &str = "Info";
    pub const DETECTIONS: &str = "Detections";
    pub const CLASSIFICATIONS: &str = "Classifications";
}

pub mod column {
    pub const ID: &str = "Id";
    pub const FILE: &str = "File";
    pub const RELATIVE_PATH: &str = "RelativePath";
    pub const FOLDER: &str = "Folder";
    pub const DATE_TIME: &str = "DateTime";
    pub const UTC_OFFSET: &str = "UtcOffset";
    pub const DATE: &str = "Date";
    pub const TIME: &str = "Time";
    pub const IMAGE_QUALITY: &str = "ImageQuality";
    pub const DARK: &str = "Dark";
    pub const DELETE_FLAG: &str = "DeleteFlag";
    pub const MARK_FOR_DELETION: &str = "MarkForDeletion";

    // ImageSetTable
    pub const ROOT_FOLDER: &str = "RootFolder";
    pub const MAGNIFIER: &str = "Magnifier";
    pub const SELECTION: &str = "Filter";
    pub const TIME_ZONE: &str = "TimeZone";
    pub const WHITE_SPACE_TRIMMED: &str = "WhiteSpaceTrimmed";
    pub const VERSION_COMPATIBILITY: &str = "VersionCompatabily";
    pub const SORT_TERMS: &str = "SortTerms";
    pub const QUICK_PASTE_XML: &str = "QuickPasteXML";
    pub const QUICK_PASTE_TERMS: &str = "QuickPasteTerms";
    pub const SELECTED_FOLDER: &str = "SelectedFolder";
    pub const SEARCH_TERMS: &str = "SearchTerms";
    pub const BB_DISPLAY_THRESHOLD: &str = "BBDisplayThreshold";
}

/// Columns of `TemplateTable`.
pub mod control {
    pub const CONTROL_ORDER: &str = "ControlOrder";
    pub const SPREADSHEET_ORDER: &str = "SpreadsheetOrder";
    pub const TYPE: &str = "Type";
    pub const DEFAULT_VALUE: &str = "DefaultValue";
    pub const LABEL: &str = "Label";
    pub const DATA_LABEL: &str = "DataLabel";
    pub const TOOLTIP: &str = "Tooltip";
    pub const TEXT_BOX_WIDTH: &str = "TXTBOXWIDTH";
    pub const COPYABLE: &str = "Copyable";
    pub const VISIBLE: &str = "Visible";
    pub const LIST: &str = "List";
}

pub mod info {
    pub const DETECTOR_VERSION: &str = "megadetector_version";
    pub const TYPICAL_DETECTION_THRESHOLD: &str = "typical_detection_threshold";
    pub const CONSERVATIVE_DETECTION_THRESHOLD: &str = "conservative_detection_threshold";
    pub const TYPICAL_CLASSIFICATION_THRESHOLD: &str = "typical_classification_threshold";
}

pub mod detection {
    pub const DETECTION_ID: &str = "detectionID";
    pub const CONF: &str = "conf";
    pub const BBOX: &str = "bbox";
}

pub mod defaults {
    pub const DATE_TIME: &str = "1900-01-01 12:00:00";
    pub const UTC_OFFSET: &str = "0.00";
    pub const FLAG: &str = "false";
    pub const SORT_TERMS: &str =
        "RelativePath,Relative Path (folder),RelativePath,true,DateTime,DateTime,DateTime,true";
    pub const QUICK_PASTE_XML: &str = "<Entries></Entries>";
    pub const QUICK_PASTE_JSON: &str = "[]";
    pub const SEARCH_TERMS: &str = "{}";
    pub const IMAGE_QUALITY_LIST: &str = "Ok|Dark|Corrupted|Missing";
    pub const DETECTOR_VERSION_UNKNOWN: &str = "vUnknown";
    pub const TYPICAL_DETECTION_THRESHOLD: &str = "0.8";
    pub const CONSERVATIVE_DETECTION_THRESHOLD: &str = "0.3";
    pub const TYPICAL_CLASSIFICATION_THRESHOLD: &str = "0.75";
    pub const BB_DISPLAY_THRESHOLD: &str = "-1";
    pub const MARKER_CELL: &str = "[]";
}

/// Zero-based column positions of standard `DataTable` columns.
pub mod position {
    pub const RELATIVE_PATH: usize = 2;
    pub const DATE_TIME: usize = 4;
    pub const UTC_OFFSET: usize = 5;
}

pub const IMAGE_SET_ROW_ID: i64 = 1;

/// Definition of a column to be created, rendered as `"Name" TYPE DEFAULT 'value'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: &'static str,
    pub default: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: &str, sql_type: &'static str, default: Option<&str>) -> Self {
        ColumnDefinition {
            name: name.to_owned(),
            sql_type,
            default: default.map(str::to_owned),
        }
    }

    pub fn text(name: &str, default: &str) -> Self {
        Self::new(name, "TEXT", Some(default))
    }

    pub fn real(name: &str, default: &str) -> Self {
        Self::new(name, "REAL", Some(default))
    }

    pub fn date_time(name: &str) -> Self {
        Self::new(name, "DATETIME", Some(defaults::DATE_TIME))
    }

    pub fn to_sql(&self) -> String {
        match &self.default {
            Some(d) => format!(
                "{} {} DEFAULT {}",
                quote_ident(&self.name),
                self.sql_type,
                quote_literal(d)
            ),
            None => format!("{} {}", quote_ident(&self.name), self.sql_type),
        }
    }
}

/// Quote an identifier for use in generated SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for use in generated SQL.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_definition_sql() {
        assert_eq!(
            ColumnDefinition::text(column::ROOT_FOLDER, "").to_sql(),
            "\"RootFolder\" TEXT DEFAULT ''"
        );
        assert_eq!(
            ColumnDefinition::real(column::BB_DISPLAY_THRESHOLD, defaults::BB_DISPLAY_THRESHOLD)
                .to_sql(),
            "\"BBDisplayThreshold\" REAL DEFAULT '-1'"
        );
        assert_eq!(
            ColumnDefinition::new(column::TIME_ZONE, "TEXT", None).to_sql(),
            "\"TimeZone\" TEXT"
        );
    }

    #[test]
    fn test_quoting_escapes() {
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
