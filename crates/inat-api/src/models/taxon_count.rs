use serde::{Deserialize, Serialize};

use super::{de, Model, Taxon};

/// A taxon with an observation count, from species count queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonCount {
    #[serde(default, deserialize_with = "de::int")]
    pub count: u64,
    pub taxon: Taxon,
}

impl Model for TaxonCount {
    const NAME: &'static str = "taxon count";
}
