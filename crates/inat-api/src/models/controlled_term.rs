use serde::{Deserialize, Serialize};

use super::{de, Model};

/// An annotation attribute, such as "Life Stage" or "Sex"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlledTerm {
    #[serde(default, deserialize_with = "de::int")]
    pub id: u64,
    pub label: Option<String>,
    pub uri: Option<String>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub multivalued: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub is_value: Option<bool>,
    #[serde(default, deserialize_with = "de::int_list")]
    pub taxon_ids: Vec<u64>,
    #[serde(default, deserialize_with = "de::int_list")]
    pub excepted_taxon_ids: Vec<u64>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub values: Vec<ControlledTermValue>,
}

/// One allowed value of a [`ControlledTerm`], such as "Adult"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlledTermValue {
    #[serde(default, deserialize_with = "de::int")]
    pub id: u64,
    pub label: Option<String>,
    pub uri: Option<String>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub blocking: Option<bool>,
    #[serde(default, deserialize_with = "de::int_list")]
    pub taxon_ids: Vec<u64>,
}

impl Model for ControlledTerm {
    const NAME: &'static str = "controlled term";
}

impl ControlledTerm {
    /// Look up a value by label, ignoring case
    pub fn value_by_label(&self, label: &str) -> Option<&ControlledTermValue> {
        self.values.iter().find(|v| {
            v.label
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(label))
        })
    }

    pub fn value_labels(&self) -> Vec<&str> {
        self.values.iter().filter_map(|v| v.label.as_deref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_controlled_term() {
        let term = ControlledTerm::from_json(&json!({
            "id": 1,
            "label": "Life Stage",
            "multivalued": false,
            "taxon_ids": [1, "47120"],
            "values": [
                {"id": 2, "label": "Adult"},
                {"id": 3, "label": "Larva", "taxon_ids": [47158]},
            ],
        }))
        .unwrap();

        assert_eq!(term.taxon_ids, vec![1, 47120]);
        assert_eq!(term.value_by_label("adult").unwrap().id, 2);
        assert!(term.value_by_label("Pupa").is_none());
        assert_eq!(term.value_labels(), vec!["Adult", "Larva"]);
    }
}
