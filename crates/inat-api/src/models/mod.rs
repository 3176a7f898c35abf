//! Typed response models
//!
//! Every model is built through [`Model::from_json`], which accepts the raw JSON of one
//! record, and serialized back with [`Model::to_dict`]. Records are normalized on the way
//! in: numeric strings become numbers, `null` lists become empty, and entities that the API
//! shapes differently per endpoint are unwrapped explicitly by the model that owns them.

pub(crate) mod de;
mod controlled_term;
mod identification;
mod location;
mod observation;
mod observation_field;
mod photo;
mod place;
mod project;
mod search;
mod taxon;
mod taxon_count;
mod user;

pub use controlled_term::{ControlledTerm, ControlledTermValue};
pub use identification::{Comment, Identification};
pub use location::Coordinates;
pub use observation::Observation;
pub use observation_field::ObservationFieldValue;
pub use photo::{Dimensions, Photo};
pub use place::{NearbyPlaces, Place};
pub use project::{Project, ProjectAdmin};
pub use search::{SearchRecord, SearchResult};
pub use taxon::Taxon;
pub use taxon_count::TaxonCount;
pub use user::User;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{InatError, Result};

pub trait Model: Sized + Serialize + DeserializeOwned {
    /// Record type name used in error messages
    const NAME: &'static str;

    /// Build one instance from one JSON record
    fn from_json(value: &Value) -> Result<Self> {
        deserialize_record(Self::NAME, value)
    }

    /// Build instances from a JSON array, a `{"results": [...]}` envelope, or a single
    /// record. Order is preserved.
    fn from_json_list(value: &Value) -> Result<Vec<Self>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items.iter().map(Self::from_json).collect(),
            Value::Object(map) => match map.get("results") {
                Some(Value::Array(items)) => items.iter().map(Self::from_json).collect(),
                Some(Value::Null) => Ok(Vec::new()),
                Some(other) => Ok(vec![Self::from_json(other)?]),
                None => Ok(vec![Self::from_json(value)?]),
            },
            other => Err(InatError::Validation(format!(
                "Invalid {} response: expected a record or a list, found {other}",
                Self::NAME
            ))),
        }
    }

    /// JSON mapping of this instance, without `null` members
    fn to_dict(&self) -> Value {
        de::compact(serde_json::to_value(self).unwrap_or_default())
    }
}

pub(crate) fn deserialize_record<T: DeserializeOwned>(name: &str, value: &Value) -> Result<T> {
    if !value.is_object() {
        return Err(InatError::Validation(format!(
            "Invalid {name} record: expected an object, found {value}"
        )));
    }
    T::deserialize(value).map_err(|e| InatError::Validation(format!("Invalid {name} record: {e}")))
}
