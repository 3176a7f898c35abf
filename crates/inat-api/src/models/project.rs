use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::{de, Coordinates, Model, User};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectAdmin {
    #[serde(default, deserialize_with = "de::int")]
    pub id: u64,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub project_id: Option<u64>,
    pub role: Option<String>,
    pub user: Option<User>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, deserialize_with = "de::int")]
    pub id: u64,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub project_type: Option<String>,
    pub icon: Option<String>,
    pub header_image_url: Option<String>,
    pub banner_color: Option<String>,
    pub location: Option<Coordinates>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub place_id: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub is_umbrella: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub prefers_user_trust: Option<bool>,
    #[serde(default, deserialize_with = "de::int_list")]
    pub user_ids: Vec<u64>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub admins: Vec<ProjectAdmin>,
    pub user: Option<User>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub created_at: Option<DateTime<FixedOffset>>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub updated_at: Option<DateTime<FixedOffset>>,
}

impl Model for Project {
    const NAME: &'static str = "project";
}

impl Project {
    pub fn url(&self) -> String {
        format!("https://www.inaturalist.org/projects/{}", self.id)
    }

    /// IDs of users with the given admin role (`manager` or `curator`)
    pub fn admin_ids(&self, role: &str) -> Vec<u64> {
        self.admins
            .iter()
            .filter(|admin| admin.role.as_deref() == Some(role))
            .filter_map(|admin| admin.user.as_ref().map(|u| u.id))
            .collect()
    }
}
