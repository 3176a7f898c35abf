use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};
use tracing::debug;

use super::{de, deserialize_record, Model, Taxon, User};
use crate::error::Result;

/// A value of an observation field on one observation
///
/// `value` is converted according to `datatype`: numeric values become numbers and taxon
/// values become IDs. Values that don't match their datatype are dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationFieldValue {
    #[serde(default, deserialize_with = "de::int")]
    pub id: u64,
    pub uuid: Option<String>,
    #[serde(default, alias = "observation_field_id", deserialize_with = "de::opt_int")]
    pub field_id: Option<u64>,
    pub name: Option<String>,
    /// `text`, `numeric`, `date`, `datetime`, `time`, `taxon` or `dna`
    pub datatype: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub taxon_id: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub user_id: Option<u64>,
    pub taxon: Option<Taxon>,
    pub user: Option<User>,
}

impl Model for ObservationFieldValue {
    const NAME: &'static str = "observation field value";

    /// Accepts the v1 shape (`field_id`, `name`, `datatype`) and the v0 shape
    /// (`observation_field_id` with a nested `observation_field` definition)
    fn from_json(value: &Value) -> Result<Self> {
        let mut ofv: Self = deserialize_record(Self::NAME, value)?;

        if let Some(definition) = value.get("observation_field").filter(|d| d.is_object()) {
            if ofv.name.is_none() {
                ofv.name = definition.get("name").and_then(Value::as_str).map(String::from);
            }
            if ofv.datatype.is_none() {
                ofv.datatype = definition
                    .get("datatype")
                    .and_then(Value::as_str)
                    .map(String::from);
            }
            if ofv.field_id.is_none() {
                ofv.field_id = definition.get("id").and_then(Value::as_u64);
            }
        }

        ofv.value = convert_value(ofv.datatype.as_deref(), std::mem::take(&mut ofv.value))
            .unwrap_or_else(|| {
                debug!(name = ?ofv.name, datatype = ?ofv.datatype, "Dropping observation field value that doesn't match its datatype");
                Value::Null
            });
        Ok(ofv)
    }
}

impl ObservationFieldValue {
    /// Value to set on an observation
    pub fn new(field_id: u64, value: impl Into<Value>) -> Self {
        Self {
            field_id: Some(field_id),
            value: value.into(),
            ..Default::default()
        }
    }

    /// Write shape used in observation create and update requests
    pub fn to_write_dict(&self) -> Value {
        json!({
            "observation_field_id": self.field_id,
            "value": self.value,
        })
    }
}

fn convert_value(datatype: Option<&str>, value: Value) -> Option<Value> {
    match (datatype, value) {
        (_, Value::Null) => Some(Value::Null),
        (Some("numeric"), Value::String(s)) => s.trim().parse::<Number>().ok().map(Value::Number),
        (Some("numeric"), v @ Value::Number(_)) => Some(v),
        (Some("numeric"), _) => None,
        (Some("taxon"), Value::String(s)) => s.trim().parse::<u64>().ok().map(Value::from),
        (Some("taxon"), Value::Number(n)) => n.as_u64().map(Value::from),
        (Some("taxon"), _) => None,
        (_, v) => Some(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v1_shape() {
        let ofv = ObservationFieldValue::from_json(&json!({
            "id": 1,
            "field_id": 9,
            "name": "Count",
            "datatype": "numeric",
            "value": "12.5",
        }))
        .unwrap();

        assert_eq!(ofv.field_id, Some(9));
        assert_eq!(ofv.value, json!(12.5));
        assert_eq!(ofv.to_write_dict(), json!({"observation_field_id": 9, "value": 12.5}));
    }

    #[test]
    fn test_v0_shape() {
        let ofv = ObservationFieldValue::from_json(&json!({
            "id": 2,
            "observation_field_id": 5,
            "value": "47219",
            "observation_field": {"id": 5, "name": "Host", "datatype": "taxon"},
        }))
        .unwrap();

        assert_eq!(ofv.field_id, Some(5));
        assert_eq!(ofv.name.as_deref(), Some("Host"));
        assert_eq!(ofv.value, json!(47219));
    }

    #[test]
    fn test_mismatched_value_is_dropped() {
        let ofv = ObservationFieldValue::from_json(&json!({
            "id": 3,
            "datatype": "numeric",
            "value": "lots",
        }))
        .unwrap();
        assert_eq!(ofv.value, Value::Null);
    }
}
