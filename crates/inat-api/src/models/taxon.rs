use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::{de, Model, Photo};
use crate::constants::{iconic_taxon_name, ICONIC_TAXA_BASE_URL, RANKS};

/// A taxon, from a full record or a partial one (ancestors, children, autocomplete results)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Taxon {
    #[serde(default, deserialize_with = "de::int")]
    pub id: u64,
    pub name: Option<String>,
    pub rank: Option<String>,
    #[serde(default, deserialize_with = "de::opt_float")]
    pub rank_level: Option<f64>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub preferred_common_name: String,
    pub matched_term: Option<String>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub iconic_taxon_id: Option<u64>,
    #[serde(rename = "iconic_taxon_name")]
    raw_iconic_taxon_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub parent_id: Option<u64>,
    /// Slash- or comma-delimited ancestor IDs
    pub ancestry: Option<String>,
    #[serde(
        rename = "ancestor_ids",
        default,
        deserialize_with = "de::int_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    raw_ancestor_ids: Vec<u64>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_bool")]
    pub extinct: Option<bool>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub observations_count: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub complete_species_count: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_datetime")]
    pub created_at: Option<DateTime<FixedOffset>>,
    pub wikipedia_url: Option<String>,
    pub wikipedia_summary: Option<String>,
    pub default_photo: Option<Photo>,
    #[serde(default, deserialize_with = "de::null_default", skip_serializing_if = "Vec::is_empty")]
    pub taxon_photos: Vec<TaxonPhoto>,
    #[serde(default, deserialize_with = "de::null_default", skip_serializing_if = "Vec::is_empty")]
    pub ancestors: Vec<Taxon>,
    #[serde(default, deserialize_with = "de::null_default", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Taxon>,

    #[serde(skip)]
    ancestor_ids: OnceLock<Vec<u64>>,
}

/// Entry of a taxon's photo list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonPhoto {
    #[serde(default, deserialize_with = "de::opt_int")]
    pub taxon_id: Option<u64>,
    pub photo: Photo,
}

impl Model for Taxon {
    const NAME: &'static str = "taxon";
}

impl Taxon {
    /// Ancestor IDs from highest rank to lowest
    ///
    /// Taken from `ancestor_ids` when the record has them, otherwise parsed from `ancestry`
    /// or collected from `ancestors`.
    pub fn ancestor_ids(&self) -> &[u64] {
        self.ancestor_ids.get_or_init(|| {
            if !self.raw_ancestor_ids.is_empty() {
                return self.raw_ancestor_ids.clone();
            }
            if let Some(ancestry) = self.ancestry.as_deref().filter(|a| !a.is_empty()) {
                let delimiter = if ancestry.contains(',') { ',' } else { '/' };
                return ancestry
                    .split(delimiter)
                    .filter_map(|id| id.trim().parse().ok())
                    .collect();
            }
            self.ancestors.iter().map(|t| t.id).collect()
        })
    }

    pub fn child_ids(&self) -> Vec<u64> {
        self.children.iter().map(|t| t.id).collect()
    }

    pub fn iconic_taxon_name(&self) -> &str {
        match self.raw_iconic_taxon_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => iconic_taxon_name(self.iconic_taxon_id.unwrap_or_default()),
        }
    }

    /// Icon for the taxon's iconic group
    pub fn icon_url(&self) -> String {
        format!(
            "{ICONIC_TAXA_BASE_URL}/{}-75px.png",
            self.iconic_taxon_name().to_lowercase()
        )
    }

    /// Rank, scientific name and common name, e.g. `Genus: Quercus (Oaks)`
    pub fn full_name(&self) -> String {
        let name = self.name.as_deref().filter(|n| !n.is_empty());
        let rank = self.rank.as_deref().filter(|r| !r.is_empty());
        match (name, rank) {
            (None, None) => "unknown taxon".to_string(),
            (None, Some(rank)) => format!("{}: {}", title_case(rank), self.id),
            (Some(name), None) => name.to_string(),
            (Some(name), Some(rank)) => {
                let common = if self.preferred_common_name.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", title_case(&self.preferred_common_name))
                };
                format!("{}: {name}{common}", title_case(rank))
            }
        }
    }

    /// Position of this taxon's rank in the rank hierarchy, lowest first
    pub fn rank_index(&self) -> Option<usize> {
        let rank = self.rank.as_deref()?;
        RANKS.iter().position(|r| *r == rank)
    }

    pub fn url(&self) -> String {
        format!("https://www.inaturalist.org/taxa/{}", self.id)
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
