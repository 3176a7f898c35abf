use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{de, deserialize_record, Model, Taxon, User};
use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identification {
    #[serde(default, deserialize_with = "de::int")]
    pub id: u64,
    pub uuid: Option<String>,
    pub body: Option<String>,
    /// `improving`, `supporting`, `leading` or `maverick`
    pub category: Option<String>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub current: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub own_observation: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub vision: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub disagreement: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub observation_id: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub created_at: Option<DateTime<FixedOffset>>,
    pub taxon: Option<Taxon>,
    pub user: Option<User>,
}

impl Model for Identification {
    const NAME: &'static str = "identification";

    /// Identification search results nest the observation instead of giving its ID
    fn from_json(value: &Value) -> Result<Self> {
        let mut identification: Self = deserialize_record(Self::NAME, value)?;
        if identification.observation_id.is_none() {
            identification.observation_id = value
                .get("observation")
                .and_then(|o| o.get("id"))
                .and_then(Value::as_u64);
        }
        Ok(identification)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default, deserialize_with = "de::int")]
    pub id: u64,
    pub uuid: Option<String>,
    pub body: Option<String>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub hidden: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub created_at: Option<DateTime<FixedOffset>>,
    pub user: Option<User>,
}

impl Model for Comment {
    const NAME: &'static str = "comment";
}
