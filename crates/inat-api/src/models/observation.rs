use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{de, deserialize_record, Comment, Coordinates, Identification, Model, ObservationFieldValue, Photo, Taxon, User};
use crate::error::Result;

/// An observation, from v1 or v2 search results or the v0 REST API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default, deserialize_with = "de::int")]
    pub id: u64,
    pub uuid: Option<String>,
    pub species_guess: Option<String>,
    pub description: Option<String>,
    pub place_guess: Option<String>,
    /// `casual`, `needs_id` or `research`
    pub quality_grade: Option<String>,
    #[serde(default, deserialize_with = "de::opt_date")]
    pub observed_on: Option<NaiveDate>,
    pub observed_on_string: Option<String>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub time_observed_at: Option<DateTime<FixedOffset>>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub created_at: Option<DateTime<FixedOffset>>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub updated_at: Option<DateTime<FixedOffset>>,
    /// Read from `location`, `geojson` or `latitude`/`longitude`, whichever the record has
    #[serde(skip_deserializing)]
    pub location: Option<Coordinates>,
    #[serde(default, deserialize_with = "de::opt_float")]
    pub positional_accuracy: Option<f64>,
    pub geoprivacy: Option<String>,
    pub taxon_geoprivacy: Option<String>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub obscured: Option<bool>,
    #[serde(default, alias = "captive_flag", deserialize_with = "de::opt_bool")]
    pub captive: Option<bool>,
    #[serde(default, alias = "license")]
    pub license_code: Option<String>,
    pub uri: Option<String>,
    #[serde(default, deserialize_with = "de::opt_int")]
    taxon_id: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub community_taxon_id: Option<u64>,
    pub taxon: Option<Taxon>,
    pub user: Option<User>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub tags: Vec<String>,
    #[serde(skip_deserializing)]
    pub photos: Vec<Photo>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub identifications: Vec<Identification>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub comments: Vec<Comment>,
    #[serde(skip_deserializing)]
    pub ofvs: Vec<ObservationFieldValue>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub identifications_count: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub comments_count: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub faves_count: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub num_identification_agreements: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub num_identification_disagreements: Option<u64>,

    #[serde(skip)]
    default_photo: OnceLock<Option<Photo>>,
}

impl Model for Observation {
    const NAME: &'static str = "observation";

    /// Normalizes the shapes that differ between API generations: the location, photos given
    /// flat (`photos`) or wrapped (`observation_photos`), observation field values as `ofvs`,
    /// `observation_field_values` or the write shape's
    /// `observation_field_values_attributes`, and v0's `tag_list` string.
    fn from_json(value: &Value) -> Result<Self> {
        let mut observation: Self = deserialize_record(Self::NAME, value)?;
        observation.location = Coordinates::from_record(value)?;

        observation.photos = match (value.get("photos"), value.get("observation_photos")) {
            (Some(photos @ Value::Array(items)), _) if !items.is_empty() => Photo::from_json_list(photos)?,
            (_, Some(photos @ Value::Array(_))) => Photo::from_json_list(photos)?,
            _ => Vec::new(),
        };

        let ofvs = ["ofvs", "observation_field_values", "observation_field_values_attributes"]
            .iter()
            .find_map(|key| value.get(*key).filter(|v| v.is_array()));
        if let Some(ofvs) = ofvs {
            observation.ofvs = ObservationFieldValue::from_json_list(ofvs)?;
        }

        if observation.tags.is_empty() {
            if let Some(tag_list) = value.get("tag_list").and_then(Value::as_str) {
                observation.tags = split_tags(tag_list);
            }
        }
        Ok(observation)
    }

    /// Write shape for observation create and update requests: `{"observation": {...}}`
    fn to_dict(&self) -> Value {
        let mut fields = Map::new();
        let mut put = |key: &str, value: Value| {
            if !value.is_null() {
                fields.insert(key.to_string(), value);
            }
        };

        put("uuid", self.uuid.clone().into());
        put("species_guess", self.species_guess.clone().into());
        put("taxon_id", self.taxon_id().into());
        put("observed_on_string", self.observed_on_string().into());
        put("description", self.description.clone().into());
        put("place_guess", self.place_guess.clone().into());
        put("latitude", self.location.map(|l| l.latitude).into());
        put("longitude", self.location.map(|l| l.longitude).into());
        put("positional_accuracy", self.positional_accuracy.into());
        put("geoprivacy", self.geoprivacy.clone().into());
        put("captive_flag", self.captive.into());
        put("license", self.license_code.clone().into());
        if !self.tags.is_empty() {
            put("tag_list", self.tags.join(",").into());
        }
        if !self.ofvs.is_empty() {
            put(
                "observation_field_values_attributes",
                self.ofvs.iter().map(ObservationFieldValue::to_write_dict).collect(),
            );
        }

        let mut body = Map::new();
        body.insert("observation".to_string(), Value::Object(fields));
        Value::Object(body)
    }
}

impl Observation {
    /// Taxon ID from the nested taxon, or the flat `taxon_id` of v0 records
    pub fn taxon_id(&self) -> Option<u64> {
        self.taxon.as_ref().map(|t| t.id).or(self.taxon_id)
    }

    pub fn set_taxon_id(&mut self, taxon_id: u64) {
        self.taxon_id = Some(taxon_id);
        self.taxon = None;
    }

    /// The observer's original date string, or one formatted from the parsed dates
    pub fn observed_on_string(&self) -> Option<String> {
        if let Some(s) = self.observed_on_string.as_ref().filter(|s| !s.is_empty()) {
            return Some(s.clone());
        }
        self.time_observed_at
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S %z").to_string())
            .or_else(|| self.observed_on.map(|d| d.format("%Y-%m-%d").to_string()))
    }

    /// The first photo, or the taxon's default photo for observations without photos
    pub fn default_photo(&self) -> Option<&Photo> {
        self.default_photo
            .get_or_init(|| {
                self.photos
                    .first()
                    .cloned()
                    .or_else(|| self.taxon.as_ref().and_then(|t| t.default_photo.clone()))
            })
            .as_ref()
    }

    pub fn photo_url(&self) -> Option<String> {
        self.default_photo().and_then(Photo::medium_url)
    }

    pub fn thumbnail_url(&self) -> Option<String> {
        self.default_photo().and_then(Photo::thumbnail_url)
    }

    pub fn url(&self) -> String {
        format!("https://www.inaturalist.org/observations/{}", self.id)
    }
}

fn split_tags(tag_list: &str) -> Vec<String> {
    tag_list
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
