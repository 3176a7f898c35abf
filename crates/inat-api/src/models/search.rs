use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

use super::{Model, Place, Project, Taxon, User};
use crate::error::{InatError, Result};

/// The record behind a site-wide search result, tagged by its `type`
#[derive(Debug, Clone)]
pub enum SearchRecord {
    Taxon(Taxon),
    Place(Place),
    Project(Project),
    User(User),
}

impl SearchRecord {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Taxon(_) => "Taxon",
            Self::Place(_) => "Place",
            Self::Project(_) => "Project",
            Self::User(_) => "User",
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Self::Taxon(t) => t.id,
            Self::Place(p) => p.id,
            Self::Project(p) => p.id,
            Self::User(u) => u.id,
        }
    }

    fn to_dict(&self) -> Value {
        match self {
            Self::Taxon(t) => t.to_dict(),
            Self::Place(p) => p.to_dict(),
            Self::Project(p) => p.to_dict(),
            Self::User(u) => u.to_dict(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub score: f64,
    pub matches: Vec<String>,
    pub record: SearchRecord,
}

impl SearchResult {
    /// Name to show for the result, whatever its type
    pub fn display_name(&self) -> String {
        match &self.record {
            SearchRecord::Taxon(t) => t.full_name(),
            SearchRecord::Place(p) => p.display_name.clone().or(p.name.clone()).unwrap_or_default(),
            SearchRecord::Project(p) => p.title.clone().unwrap_or_default(),
            SearchRecord::User(u) => u.display_name(),
        }
    }
}

impl Model for SearchResult {
    const NAME: &'static str = "search result";

    fn from_json(value: &Value) -> Result<Self> {
        let invalid = |message: String| InatError::Validation(format!("Invalid search result: {message}"));

        let record_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing type".to_string()))?;
        let record = value
            .get("record")
            .filter(|r| r.is_object())
            .ok_or_else(|| invalid("missing record".to_string()))?;

        let record = match record_type {
            "Taxon" => SearchRecord::Taxon(Taxon::from_json(record)?),
            "Place" => SearchRecord::Place(Place::from_json(record)?),
            "Project" => SearchRecord::Project(Project::from_json(record)?),
            "User" => SearchRecord::User(User::from_json(record)?),
            other => return Err(invalid(format!("unknown type \"{other}\""))),
        };

        Ok(Self {
            score: value.get("score").and_then(Value::as_f64).unwrap_or_default(),
            matches: value
                .get("matches")
                .and_then(Value::as_array)
                .map(|m| m.iter().filter_map(|s| s.as_str().map(String::from)).collect())
                .unwrap_or_default(),
            record,
        })
    }

    fn to_dict(&self) -> Value {
        json!({
            "type": self.record.type_name(),
            "score": self.score,
            "matches": self.matches,
            "record": self.record.to_dict(),
        })
    }
}

impl Serialize for SearchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_dict().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SearchResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(de::Error::custom)
    }
}
