use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::{de, Model};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default, deserialize_with = "de::int")]
    pub id: u64,
    pub login: Option<String>,
    pub name: Option<String>,
    pub icon_url: Option<String>,
    pub orcid: Option<String>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub roles: Vec<String>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub site_id: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub created_at: Option<DateTime<FixedOffset>>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub observations_count: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub identifications_count: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub species_count: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub suspended: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub spam: Option<bool>,
}

impl Model for User {
    const NAME: &'static str = "user";
}

impl User {
    /// `login (name)`, or just the login when the user has no display name
    pub fn display_name(&self) -> String {
        let login = self.login.as_deref().unwrap_or_default();
        match self.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => format!("{login} ({name})"),
            None => login.to_string(),
        }
    }

    pub fn url(&self) -> String {
        format!("https://www.inaturalist.org/people/{}", self.id)
    }
}
