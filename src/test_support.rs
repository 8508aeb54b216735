//! Legacy Timelapse files for tests.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

const TEMPLATE_TABLE_SQL: &str = "
    CREATE TABLE TemplateTable (
        Id INTEGER PRIMARY KEY AUTOINCREMENT,
        ControlOrder INTEGER,
        SpreadsheetOrder INTEGER,
        Type TEXT,
        DefaultValue TEXT,
        Label TEXT,
        DataLabel TEXT,
        Tooltip TEXT,
        TXTBOXWIDTH INTEGER,
        Copyable TEXT,
        Visible TEXT,
        List TEXT
    );";

// (type, default, label, data label, visible, list)
type ControlSpec = (&'static str, &'static str, &'static str, &'static str, bool, &'static str);

const V22_CONTROLS: &[ControlSpec] = &[
    ("File", "", "File", "File", true, ""),
    ("RelativePath", "", "RelativePath", "RelativePath", true, ""),
    ("Folder", "", "Folder", "Folder", true, ""),
    ("DateTime", "2000-01-01 00:00:00", "DateTime", "DateTime", true, ""),
    ("UtcOffset", "0.00", "UtcOffset", "UtcOffset", true, ""),
    ("Date", "", "Date", "Date", false, ""),
    ("Time", "", "Time", "Time", false, ""),
    ("ImageQuality", "Ok", "ImageQuality", "ImageQuality", true, "Ok|Dark|Corrupted|Missing"),
    ("DeleteFlag", "false", "Delete?", "DeleteFlag", true, ""),
    ("Counter", "0", "Count", "Count", true, ""),
    ("FixedChoice", "", "Species", "Species", true, "Deer|Elk|<EMPTY>"),
    ("Note", "", "Comment", "Comment", true, ""),
    ("Flag", "false", "Marked", "Marked", true, ""),
];

const V20_CONTROLS: &[ControlSpec] = &[
    ("File", "", "File", "File", true, ""),
    ("Folder", "", "Folder", "Folder", true, ""),
    ("Date", "", "Date", "Date", true, ""),
    ("Time", "", "Time", "Time", true, ""),
    ("ImageQuality", "Ok", "ImageQuality", "ImageQuality", true, "Ok|Dark"),
    ("MarkForDeletion", "false", "Delete?", "MarkForDeletion", true, ""),
    ("Note", "", "Comment", "Comment", true, ""),
];

const QUICK_PASTE_XML: &str = "<Entries>\
    <Entry><Title>Buck</Title>\
      <Item><Label>Count</Label><DataLabel>Count</DataLabel><Value>1</Value><Use>true</Use></Item>\
      <Item><Label>Gone</Label><DataLabel>Gone</DataLabel><Value>x</Value><Use>false</Use></Item>\
    </Entry>\
    <Entry><Title>Orphan</Title>\
      <Item><Label>Nope</Label><DataLabel>Nope</DataLabel><Value>y</Value><Use>true</Use></Item>\
    </Entry>\
  </Entries>";

fn create_template(conn: &Connection, controls: &[ControlSpec]) {
    conn.execute_batch(TEMPLATE_TABLE_SQL).unwrap();
    for (index, (type_name, default, label, data_label, visible, list)) in controls.iter().enumerate() {
        let order = index as i64 + 1;
        conn.execute(
            "INSERT INTO TemplateTable
                (Id, ControlOrder, SpreadsheetOrder, Type, DefaultValue, Label, DataLabel,
                 Tooltip, TXTBOXWIDTH, Copyable, Visible, List)
             VALUES (?1, ?1, ?1, ?2, ?3, ?4, ?5, '', 100, 'true', ?6, ?7)",
            params![
                order,
                type_name,
                default,
                label,
                data_label,
                if *visible { "true" } else { "false" },
                list
            ],
        )
        .unwrap();
    }
}

/// A 2.2.0.0 template at `dir/Site.tdb`.
pub fn legacy_template(dir: &Path) -> PathBuf {
    let path = dir.join("Site.tdb");
    let conn = Connection::open(&path).unwrap();
    create_template(&conn, V22_CONTROLS);
    path
}

/// A 2.2.0.0 data file at `dir/Site.ddb`, with markers, recognitions and
/// QuickPaste entries. Padded text and a -7 hour UTC offset are left for the
/// compatibility steps to repair.
pub fn legacy_data(dir: &Path) -> PathBuf {
    let path = dir.join("Site.ddb");
    let conn = Connection::open(&path).unwrap();
    create_template(&conn, V22_CONTROLS);
    conn.execute_batch(
        "CREATE TABLE DataTable (
            Id INTEGER PRIMARY KEY AUTOINCREMENT,
            File TEXT DEFAULT '',
            RelativePath TEXT DEFAULT '',
            Folder TEXT DEFAULT '',
            DateTime DATETIME DEFAULT '',
            UtcOffset REAL DEFAULT '0.00',
            Date TEXT DEFAULT '',
            Time TEXT DEFAULT '',
            ImageQuality TEXT DEFAULT 'Ok',
            DeleteFlag TEXT DEFAULT 'false',
            Count TEXT DEFAULT '0',
            Species TEXT DEFAULT '',
            Comment TEXT DEFAULT '',
            Marked TEXT DEFAULT 'false'
         );
         INSERT INTO DataTable VALUES (1, 'IMG_0001.JPG', 'Cam1', 'Site', '2020-06-01 12:00:00', 0.0,
            '01-Jun-2020', '12:00:00', 'Ok', 'false', '1', 'Deer', ' big buck ', 'false');
         INSERT INTO DataTable VALUES (2, 'IMG_0002.JPG', 'Cam1', 'Site', '2020-06-01 12:30:00', -7.0,
            '01-Jun-2020', '05:30:00', 'Dark', 'false', '0', '', 'night', 'false');

         CREATE TABLE ImageSetTable (
            Id INTEGER PRIMARY KEY,
            Log TEXT DEFAULT '',
            Magnifier TEXT DEFAULT 'true',
            \"Row\" INTEGER DEFAULT 0,
            \"Filter\" INTEGER DEFAULT 1,
            TimeZone TEXT DEFAULT '',
            VersionCompatabily TEXT DEFAULT '1.0.0.0',
            SortTerms TEXT DEFAULT '',
            QuickPasteXML TEXT DEFAULT '<Entries></Entries>',
            SelectedFolder TEXT DEFAULT ''
         );

         CREATE TABLE MarkersTable (Id INTEGER PRIMARY KEY, Count TEXT DEFAULT '');
         INSERT INTO MarkersTable VALUES (1, '0.5,0.25');
         INSERT INTO MarkersTable VALUES (2, '');

         CREATE TABLE Detections (
            detectionID INTEGER PRIMARY KEY,
            Id INTEGER,
            category TEXT,
            conf REAL,
            bbox TEXT
         );
         INSERT INTO Detections VALUES (1, 1, '1', '0,87', '0,1, 0,2, 0,3, 0,4');

         CREATE TABLE Classifications (
            classificationID INTEGER PRIMARY KEY,
            detectionID INTEGER,
            category TEXT,
            conf REAL
         );
         INSERT INTO Classifications VALUES (1, 1, '1', '0,5');

         CREATE TABLE Info (infoID INTEGER PRIMARY KEY, detector TEXT, megadetector_version TEXT);
         INSERT INTO Info VALUES (1, 'md_v4.1.0.pb', 'v4.1');",
    )
    .unwrap();
    conn.execute(
        "INSERT INTO ImageSetTable
            (Id, Log, Magnifier, \"Row\", \"Filter\", TimeZone, VersionCompatabily, SortTerms,
             QuickPasteXML, SelectedFolder)
         VALUES (1, '', 'true', 0, 1, 'Pacific Standard Time', '2.2.0.0', ?1, ?2, '')",
        params![crate::schema::defaults::SORT_TERMS, QUICK_PASTE_XML],
    )
    .unwrap();
    path
}

/// A template from before RelativePath, DateTime and UtcOffset existed, with
/// a MarkForDeletion control and a Note control that has no names.
pub fn legacy_v20_template(dir: &Path) -> PathBuf {
    let path = dir.join("Old.tdb");
    let conn = Connection::open(&path).unwrap();
    let mut controls = V20_CONTROLS.to_vec();
    controls.push(("Note", "", "", "", true, ""));
    create_template(&conn, &controls);
    path
}

/// A data file with only the legacy Date and Time columns and no version marker.
pub fn legacy_v20_data(dir: &Path) -> PathBuf {
    let path = dir.join("Old.ddb");
    let conn = Connection::open(&path).unwrap();
    create_template(&conn, V20_CONTROLS);
    conn.execute_batch(
        "CREATE TABLE DataTable (
            Id INTEGER PRIMARY KEY AUTOINCREMENT,
            File TEXT DEFAULT '',
            Folder TEXT DEFAULT '',
            Date TEXT DEFAULT '',
            Time TEXT DEFAULT '',
            ImageQuality TEXT DEFAULT 'Ok',
            MarkForDeletion TEXT DEFAULT 'false',
            Comment TEXT
         );
         INSERT INTO DataTable VALUES (1, 'a.jpg', 'Old', '05-Apr-2011', '10:15:00', 'Ok', 'false', 'fox');
         INSERT INTO DataTable VALUES (2, 'b.jpg', 'Old', 'garbage', '', 'Dark', 'true', NULL);

         CREATE TABLE ImageSetTable (
            Id INTEGER PRIMARY KEY,
            Log TEXT DEFAULT '',
            Magnifier TEXT DEFAULT 'true',
            \"Filter\" INTEGER DEFAULT 1
         );
         INSERT INTO ImageSetTable VALUES (1, '', 'true', 1);",
    )
    .unwrap();
    path
}
