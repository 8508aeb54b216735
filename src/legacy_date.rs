use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Format of the `DateTime` column.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format written by early Timelapse into the separate Date and Time columns.
const DISPLAY_FORMAT: &str = "%d-%b-%Y %H:%M:%S";

// Forms found in image metadata, tried after the display format.
const METADATA_FORMATS: [&str; 11] = [
    "%Y:%m:%d %H:%M:%S%.f",
    "%Y:%m:%d %H:%M:%S",
    "%Y:%m:%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d-%b-%Y %H:%M",
];

const DATE_ONLY_FORMATS: [&str; 3] = ["%Y:%m:%d", "%Y-%m-%d", "%d-%b-%Y"];

// File modified date, e.g. `Tue Apr 05 10:15:00 +02:00 2011`
const FILE_MODIFIED_FORMATS: [&str; 2] = ["%a %b %d %H:%M:%S %:z %Y", "%a %b %d %H:%M:%S %z %Y"];

/// Parse a legacy date and time pair, e.g. `05-Apr-2011` and `10:15:00`.
pub fn parse(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = date.trim();
    let time = time.trim();
    let combined = if time.is_empty() {
        date.to_owned()
    } else {
        format!("{} {}", date, time)
    };
    parse_date_time(&combined)
}

pub fn parse_date_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    std::iter::once(DISPLAY_FORMAT)
        .chain(METADATA_FORMATS)
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_ONLY_FORMATS.iter().find_map(|format| {
                NaiveDate::parse_from_str(value, format)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
        })
        .or_else(|| {
            FILE_MODIFIED_FORMATS.iter().find_map(|format| {
                DateTime::parse_from_str(value, format)
                    .ok()
                    .map(|dt| dt.naive_local())
            })
        })
}

/// Parse a legacy pair and render it in the `DateTime` column format.
pub fn to_date_time_column(date: &str, time: &str) -> Option<String> {
    parse(date, time).map(|dt| dt.format(DATE_TIME_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        assert_eq!(
            to_date_time_column("05-Apr-2011", "10:15:00").as_deref(),
            Some("2011-04-05 10:15:00")
        );
        assert_eq!(
            to_date_time_column(" 5-Apr-2011 ", " 09:01:02").as_deref(),
            Some("2011-04-05 09:01:02")
        );
    }

    #[test]
    fn test_metadata_formats() {
        assert_eq!(
            to_date_time_column("2011:04:05", "10:15:00.250").as_deref(),
            Some("2011-04-05 10:15:00")
        );
        assert_eq!(
            to_date_time_column("2011-04-05", "10:15").as_deref(),
            Some("2011-04-05 10:15:00")
        );
        assert_eq!(
            to_date_time_column("2011-04-05", "").as_deref(),
            Some("2011-04-05 00:00:00")
        );
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(parse("", ""), None);
        assert_eq!(parse("someday", "noon"), None);
        assert_eq!(parse("31-Feb-2011", "10:00:00"), None);
    }
}
