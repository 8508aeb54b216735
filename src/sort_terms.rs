use serde::{Deserialize, Serialize};

use crate::error::UpgradeError;

const SLOTS_PER_TERM: usize = 4;
const TERM_COUNT: usize = 2;

/// One sort key of an image set, stored as JSON in `ImageSetTable.SortTerms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SortTerm {
    pub data_label: String,
    pub display_label: String,
    pub control_type: String,
    pub is_ascending: String,
}

/// Convert the legacy 8-slot CSV (two groups of label, display label, type
/// and direction) into the two terms it describes.
pub fn parse_legacy(csv: &str) -> Vec<SortTerm> {
    let slots: Vec<&str> = csv.split(',').map(str::trim).collect();
    let slot = |i: usize| slots.get(i).copied().unwrap_or("").to_owned();

    (0..TERM_COUNT)
        .map(|term| {
            let base = term * SLOTS_PER_TERM;
            SortTerm {
                data_label: slot(base),
                display_label: slot(base + 1),
                control_type: slot(base + 2),
                is_ascending: slot(base + 3),
            }
        })
        .collect()
}

pub fn legacy_to_json(csv: &str) -> Result<String, UpgradeError> {
    Ok(serde_json::to_string(&parse_legacy(csv))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::defaults;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_sort_terms() {
        let json = legacy_to_json(defaults::SORT_TERMS).unwrap();
        assert_eq!(
            json,
            r#"[{"DataLabel":"RelativePath","DisplayLabel":"Relative Path (folder)","ControlType":"RelativePath","IsAscending":"true"},{"DataLabel":"DateTime","DisplayLabel":"DateTime","ControlType":"DateTime","IsAscending":"true"}]"#
        );
    }

    #[test]
    fn test_short_csv_pads_with_empty() {
        let terms = parse_legacy(" File , File ,File");
        assert_eq!(terms[0].data_label, "File");
        assert_eq!(terms[0].display_label, "File");
        assert_eq!(terms[0].is_ascending, "");
        assert_eq!(terms[1].data_label, "");
    }
}
