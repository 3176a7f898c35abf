use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{de, Coordinates, Model};
use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Place {
    #[serde(default, deserialize_with = "de::int")]
    pub id: u64,
    pub uuid: Option<String>,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub place_type: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub admin_level: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_float")]
    pub bbox_area: Option<f64>,
    pub location: Option<Coordinates>,
    #[serde(default, deserialize_with = "de::int_list")]
    pub ancestor_place_ids: Vec<u64>,
    /// `standard` or `community`, for places returned by a nearby search
    pub category: Option<String>,
}

impl Model for Place {
    const NAME: &'static str = "place";
}

impl Place {
    pub fn url(&self) -> String {
        format!("https://www.inaturalist.org/places/{}", self.id)
    }
}

/// Places near a bounding box, split by how they were curated
#[derive(Debug, Clone, Default)]
pub struct NearbyPlaces {
    pub standard: Vec<Place>,
    pub community: Vec<Place>,
}

impl NearbyPlaces {
    /// Parse `{"results": {"standard": [...], "community": [...]}}`
    pub fn from_json(value: &Value) -> Result<Self> {
        let results = value.get("results").unwrap_or(value);
        let category = |name: &str| -> Result<Vec<Place>> {
            let mut places = Place::from_json_list(results.get(name).unwrap_or(&Value::Null))?;
            for place in &mut places {
                place.category = Some(name.to_string());
            }
            Ok(places)
        };
        Ok(Self {
            standard: category("standard")?,
            community: category("community")?,
        })
    }

    /// Standard places followed by community places
    pub fn all(&self) -> impl Iterator<Item = &Place> {
        self.standard.iter().chain(self.community.iter())
    }
}
