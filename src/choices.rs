use serde::{Deserialize, Serialize};

use crate::error::UpgradeError;

/// Token a legacy `|`-separated list uses to offer an empty choice.
pub const EMPTY_CHOICE_TOKEN: &str = "<EMPTY>";

/// Choice list of a FixedChoice control, stored as JSON in `TemplateTable.List`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Choices {
    pub include_empty_choice: bool,
    pub choice_list_non_empty: Vec<String>,
}

impl Choices {
    /// Parse a legacy `Deer|Elk|<EMPTY>` list. Items are trimmed; empty and
    /// repeated items are dropped.
    pub fn from_legacy(list: &str) -> Self {
        let mut choices = Choices::default();
        for item in list.split('|').map(str::trim) {
            if item == EMPTY_CHOICE_TOKEN {
                choices.include_empty_choice = true;
            } else if !item.is_empty() && !choices.choice_list_non_empty.iter().any(|c| c == item) {
                choices.choice_list_non_empty.push(item.to_owned());
            }
        }
        choices
    }

    pub fn is_empty(&self) -> bool {
        !self.include_empty_choice && self.choice_list_non_empty.is_empty()
    }

    /// JSON form; an empty list is stored as the empty string.
    pub fn to_json(&self) -> Result<String, UpgradeError> {
        if self.is_empty() {
            return Ok(String::new());
        }
        Ok(serde_json::to_string(self)?)
    }

    pub fn contains(&self, value: &str) -> bool {
        if value.is_empty() {
            return self.include_empty_choice;
        }
        self.choice_list_non_empty.iter().any(|c| c == value)
    }

    /// Make `default_value` consistent with the list, returning the value to store.
    pub fn reconcile_default(&mut self, default_value: &str) -> String {
        let default_value = default_value.trim();
        if !self.include_empty_choice && default_value.is_empty() {
            self.include_empty_choice = true;
            return String::new();
        }
        if self.contains(default_value) {
            default_value.to_owned()
        } else {
            String::new()
        }
    }
}
