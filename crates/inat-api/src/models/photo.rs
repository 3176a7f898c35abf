use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{de, deserialize_record, Model};
use crate::constants::{CC_LICENSES, PHOTO_BASE_URL, PHOTO_CC_BASE_URL, PHOTO_INFO_BASE_URL, PHOTO_SIZES};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    #[serde(default, deserialize_with = "de::int")]
    pub width: u64,
    #[serde(default, deserialize_with = "de::int")]
    pub height: u64,
}

/// An observation or taxon photo
///
/// Size-specific URLs (`square`, `small`, `medium`, `large`, `original`) are derived from
/// `url`, whichever size it points at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Photo {
    #[serde(default, deserialize_with = "de::int")]
    pub id: u64,
    pub uuid: Option<String>,
    pub attribution: Option<String>,
    pub license_code: Option<String>,
    pub original_dimensions: Option<Dimensions>,
    pub url: Option<String>,
    #[serde(default, deserialize_with = "de::opt_int")]
    pub user_id: Option<u64>,

    #[serde(skip)]
    url_format: OnceLock<Option<String>>,
}

impl Model for Photo {
    const NAME: &'static str = "photo";

    /// Accepts a flat photo record or one wrapped as `{"photo": {...}}`, as observation
    /// photo lists and upload responses return it
    fn from_json(value: &Value) -> Result<Self> {
        match value.get("photo") {
            Some(inner) if inner.is_object() => deserialize_record(Self::NAME, inner),
            _ => deserialize_record(Self::NAME, value),
        }
    }
}

impl Photo {
    pub fn has_cc_license(&self) -> bool {
        self.license_code
            .as_deref()
            .is_some_and(|code| CC_LICENSES.contains(&code.to_uppercase().as_str()))
    }

    /// The record's URL, or a guess from its ID and license when the record has none
    pub fn resolved_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None if self.has_cc_license() => {
                format!("{PHOTO_CC_BASE_URL}/{}/original.jpg", self.id)
            }
            None => format!("{PHOTO_BASE_URL}/{}?size=original", self.id),
        }
    }

    /// URL for a specific size, or `None` for unknown sizes and URLs without a size
    pub fn url_size(&self, size: &str) -> Option<String> {
        if !PHOTO_SIZES.contains(&size) {
            return None;
        }
        self.url_format
            .get_or_init(|| {
                let url = self.resolved_url();
                PHOTO_SIZES
                    .iter()
                    .find(|s| url.contains(&format!("{s}.")))
                    .map(|s| url.replace(s, "{size}"))
            })
            .as_ref()
            .map(|format| format.replace("{size}", size))
    }

    pub fn original_url(&self) -> Option<String> {
        self.url_size("original")
    }

    pub fn large_url(&self) -> Option<String> {
        self.url_size("large")
    }

    pub fn medium_url(&self) -> Option<String> {
        self.url_size("medium")
    }

    pub fn small_url(&self) -> Option<String> {
        self.url_size("small")
    }

    pub fn square_url(&self) -> Option<String> {
        self.url_size("square")
    }

    pub fn thumbnail_url(&self) -> Option<String> {
        self.square_url()
    }

    /// Photo page on iNaturalist
    pub fn info_url(&self) -> String {
        format!("{PHOTO_INFO_BASE_URL}/{}", self.id)
    }

    /// Lowercase file extension from the URL
    pub fn ext(&self) -> String {
        let url = self.resolved_url().to_lowercase();
        let path = url.split('?').next().unwrap_or_default();
        path.rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .filter(|ext| !ext.contains('/'))
            .unwrap_or_default()
    }

    pub fn mimetype(&self) -> String {
        match self.ext().as_str() {
            "jpg" | "jpeg" | "" => "image/jpeg".to_string(),
            ext => format!("image/{ext}"),
        }
    }

    /// `{width}x{height}`
    pub fn dimensions_str(&self) -> Option<String> {
        self.original_dimensions
            .map(|d| format!("{}x{}", d.width, d.height))
    }
}
