use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed reading catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog contains no awards")]
    Empty,
}

/// Identity of one nominee within one award. Vote payloads and preference
/// filters both address nominees by this pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NomineeKey {
    pub award_id: String,
    pub nominee_id: String,
}

impl NomineeKey {
    pub fn new(award_id: impl Into<String>, nominee_id: impl Into<String>) -> Self {
        Self {
            award_id: award_id.into(),
            nominee_id: nominee_id.into(),
        }
    }
}

impl fmt::Display for NomineeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.award_id, self.nominee_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nominee {
    pub nominee_id: String,
    pub display_name: String,
    pub image_ref: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Award {
    pub award_name: String,
    pub nominees: Vec<Nominee>,
}

/// Normalized award -> nominee metadata, loaded once at startup from the
/// crawler's JSON dump and treated as read-only afterwards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    pub awards: BTreeMap<String, Award>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let data = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw: Value = serde_json::from_str(&data)?;
        Self::from_value(&raw)
    }

    /// Accepts both shapes the crawler emits: category groups carrying a
    /// `subcategories` object, and flat groups mapping award ids directly.
    /// The distinction is discarded here; downstream code only ever sees
    /// `award_id -> Award`.
    pub fn from_value(raw: &Value) -> Result<Self, CatalogError> {
        let mut awards = BTreeMap::new();
        let Some(groups) = raw.as_object() else {
            return Err(CatalogError::Empty);
        };

        for group in groups.values() {
            let Some(group_obj) = group.as_object() else {
                continue;
            };
            let awards_source = match group_obj.get("subcategories").and_then(Value::as_object) {
                Some(sub) => sub,
                None => group_obj,
            };
            for (award_id, award_value) in awards_source {
                if let Some(award) = parse_award(award_value) {
                    awards.insert(award_id.clone(), award);
                }
            }
        }

        if awards.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { awards })
    }

    pub fn award(&self, award_id: &str) -> Option<&Award> {
        self.awards.get(award_id)
    }

    pub fn award_name(&self, award_id: &str) -> Option<&str> {
        self.awards.get(award_id).map(|a| a.award_name.as_str())
    }

    pub fn nominee(&self, key: &NomineeKey) -> Option<&Nominee> {
        self.awards
            .get(&key.award_id)?
            .nominees
            .iter()
            .find(|n| n.nominee_id == key.nominee_id)
    }

    pub fn contains(&self, key: &NomineeKey) -> bool {
        self.nominee(key).is_some()
    }

    pub fn tracked_keys(&self) -> Vec<NomineeKey> {
        let mut keys = Vec::new();
        for (award_id, award) in &self.awards {
            for nominee in &award.nominees {
                keys.push(NomineeKey::new(award_id.clone(), nominee.nominee_id.clone()));
            }
        }
        keys
    }

    /// Concatenated token list the vote API expects, one `w{award}-{member}`
    /// token per tracked nominee.
    pub fn fetch_ids(&self) -> String {
        let mut out = String::new();
        for key in self.tracked_keys() {
            out.push('w');
            out.push_str(&key.award_id);
            out.push('-');
            out.push_str(&key.nominee_id);
        }
        out
    }
}

fn parse_award(value: &Value) -> Option<Award> {
    let obj = value.as_object()?;
    let nominees_raw = obj.get("nominees")?.as_array()?;
    let award_name = obj
        .get("award_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut nominees = Vec::new();
    for entry in nominees_raw {
        let Some(nominee) = entry.as_object() else {
            continue;
        };
        let Some(nominee_id) = nominee
            .get("data_member")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        else {
            continue;
        };
        nominees.push(Nominee {
            nominee_id: nominee_id.to_string(),
            display_name: nominee
                .get("nominee_name")
                .and_then(Value::as_str)
                .unwrap_or(nominee_id)
                .to_string(),
            image_ref: nominee
                .get("ava_link")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            description: nominee
                .get("nominee_des")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    Some(Award {
        award_name,
        nominees,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Catalog, NomineeKey};

    #[test]
    fn normalizes_grouped_and_flat_shapes() {
        let raw = json!({
            "idol14": {
                "subcategories": {
                    "12": {
                        "award_name": "Idol of the Year",
                        "nominees": [
                            {"data_member": "88", "nominee_name": "Alpha", "ava_link": "a.png", "nominee_des": "singer"}
                        ]
                    }
                }
            },
            "rookie": {
                "7": {
                    "award_name": "Rookie Award",
                    "nominees": [
                        {"data_member": "21", "nominee_name": "Beta", "ava_link": "b.png"}
                    ]
                }
            }
        });

        let catalog = Catalog::from_value(&raw).expect("catalog should parse");
        assert_eq!(catalog.awards.len(), 2);
        assert_eq!(catalog.award_name("12"), Some("Idol of the Year"));
        assert_eq!(
            catalog
                .nominee(&NomineeKey::new("7", "21"))
                .map(|n| n.display_name.as_str()),
            Some("Beta")
        );
    }

    #[test]
    fn fetch_ids_concatenates_tracked_tokens() {
        let raw = json!({
            "group": {
                "3": {
                    "award_name": "A",
                    "nominees": [
                        {"data_member": "10", "nominee_name": "X"},
                        {"data_member": "11", "nominee_name": "Y"}
                    ]
                }
            }
        });
        let catalog = Catalog::from_value(&raw).expect("catalog should parse");
        assert_eq!(catalog.fetch_ids(), "w3-10w3-11");
    }

    #[test]
    fn skips_nominees_without_member_id() {
        let raw = json!({
            "group": {
                "3": {
                    "award_name": "A",
                    "nominees": [
                        {"nominee_name": "no id"},
                        {"data_member": "10", "nominee_name": "X"}
                    ]
                }
            }
        });
        let catalog = Catalog::from_value(&raw).expect("catalog should parse");
        assert_eq!(catalog.award("3").map(|a| a.nominees.len()), Some(1));
    }

    #[test]
    fn empty_catalog_is_an_error() {
        assert!(Catalog::from_value(&json!({})).is_err());
    }
}
