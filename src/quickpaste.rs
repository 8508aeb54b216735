use log::warn;
use serde::{Deserialize, Serialize};

use crate::controls::{ControlRow, TemplateTable};
use crate::schema::defaults;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuickPasteItem {
    pub data_label: String,
    pub label: String,
    pub value: String,
    #[serde(rename = "Use")]
    pub use_item: bool,
    pub control_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuickPasteEntry {
    pub title: String,
    pub items: Vec<QuickPasteItem>,
}

fn child_text(node: roxmltree::Node, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .map(|n| n.text().unwrap_or_default().trim().to_owned())
}

/// Read entries from the legacy `QuickPasteXML` document.
///
/// Items whose data label names no control are dropped, as are entries left
/// without items. A missing `ControlType` element is filled from the control.
pub fn entries_from_xml(
    xml: &str,
    controls: &[ControlRow],
) -> Result<Vec<QuickPasteEntry>, roxmltree::Error> {
    let doc = roxmltree::Document::parse(xml)?;

    let entries = doc
        .descendants()
        .filter(|n| n.has_tag_name("Entry"))
        .filter_map(|entry| {
            let items: Vec<QuickPasteItem> = entry
                .children()
                .filter(|n| n.has_tag_name("Item"))
                .filter_map(|item| {
                    let data_label = child_text(item, "DataLabel").unwrap_or_default();
                    let control = TemplateTable::find(controls, &data_label)?;
                    let control_type = child_text(item, "ControlType")
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| control.type_name.clone());
                    Some(QuickPasteItem {
                        label: child_text(item, "Label").unwrap_or_else(|| control.label.clone()),
                        data_label,
                        value: child_text(item, "Value").unwrap_or_default(),
                        use_item: child_text(item, "Use")
                            .map(|u| u.eq_ignore_ascii_case("true"))
                            .unwrap_or(false),
                        control_type,
                    })
                })
                .collect();

            if items.is_empty() {
                None
            } else {
                Some(QuickPasteEntry {
                    title: child_text(entry, "Title").unwrap_or_default(),
                    items,
                })
            }
        })
        .collect();

    Ok(entries)
}

/// Indented JSON for the `QuickPasteTerms` column. Unreadable or empty input gives `[]`.
pub fn xml_to_json(xml: Option<&str>, controls: &[ControlRow]) -> String {
    let Some(xml) = xml.filter(|x| !x.trim().is_empty()) else {
        return defaults::QUICK_PASTE_JSON.to_owned();
    };

    match entries_from_xml(xml, controls) {
        Ok(entries) if !entries.is_empty() => match serde_json::to_string_pretty(&entries) {
            Ok(json) => json,
            Err(err) => {
                warn!("QuickPaste entries could not be serialized: {}", err);
                defaults::QUICK_PASTE_JSON.to_owned()
            }
        },
        Ok(_) => defaults::QUICK_PASTE_JSON.to_owned(),
        Err(err) => {
            warn!("QuickPasteXML could not be parsed, writing empty terms: {}", err);
            defaults::QUICK_PASTE_JSON.to_owned()
        }
    }
}
