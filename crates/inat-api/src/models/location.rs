use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{InatError, Result};

/// A latitude/longitude pair, sent and received as `"lat,lng"`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(InatError::Validation(format!(
                "Invalid coordinates: {latitude}, {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Read a location from any of the shapes the API uses for it:
    ///
    /// * `"location": "lat,lng"`
    /// * `"location": [lat, lng]`
    /// * `"geojson": {"type": "Point", "coordinates": [lng, lat]}`
    /// * separate `"latitude"` and `"longitude"` members, numbers or strings
    ///
    /// Returns `None` when none of them is present.
    pub fn from_record(record: &Value) -> Result<Option<Self>> {
        match record.get("location") {
            Some(Value::String(s)) if !s.trim().is_empty() => return s.parse().map(Some),
            Some(Value::Array(pair)) if pair.len() == 2 => {
                return Self::new(coordinate(&pair[0])?, coordinate(&pair[1])?).map(Some)
            }
            _ => {}
        }

        if let Some(point) = record.get("geojson").filter(|g| g.is_object()) {
            if let Some(Value::Array(pair)) = point.get("coordinates") {
                if pair.len() == 2 {
                    return Self::new(coordinate(&pair[1])?, coordinate(&pair[0])?).map(Some);
                }
            }
        }

        let latitude = record.get("latitude").filter(|v| !is_blank(v));
        let longitude = record.get("longitude").filter(|v| !is_blank(v));
        match (latitude, longitude) {
            (Some(lat), Some(lng)) => Self::new(coordinate(lat)?, coordinate(lng)?).map(Some),
            _ => Ok(None),
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn coordinate(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| InatError::Validation(format!("Invalid coordinate: {value}")))
}

impl FromStr for Coordinates {
    type Err = InatError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || InatError::Validation(format!("Invalid location: \"{s}\""));
        let (lat, lng) = s.split_once(',').ok_or_else(invalid)?;
        let latitude = lat.trim().parse().map_err(|_| invalid())?;
        let longitude = lng.trim().parse().map_err(|_| invalid())?;
        Self::new(latitude, longitude)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

impl Serialize for Coordinates {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Coordinates {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
