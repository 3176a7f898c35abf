use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::{fetch_by_ids, fetch_one, field_selection_request};
use crate::constants::{MAX_FILESIZE, V0_OBS_ORDER_BY_PROPERTIES, V1_OBS_ORDER_BY_PROPERTIES, V2_OBS_ORDER_BY_PROPERTIES};
use crate::error::{InatError, Result};
use crate::models::{Model, Observation, Photo, TaxonCount};
use crate::paginator::Paginator;
use crate::params::{join_ids, validate_order_by, Params};
use crate::request::{ApiRequest, FormPart};
use crate::session::Session;

/// Observation counts over time, keyed by interval value (`"1"` to `"12"` for
/// `month_of_year`, dates for `day`, and so on)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    pub interval: String,
    pub counts: BTreeMap<String, u64>,
}

impl Histogram {
    fn from_json(value: &Value) -> Result<Self> {
        let invalid = || InatError::Validation(format!("Invalid histogram response: {value}"));
        let results = value.get("results").and_then(Value::as_object).ok_or_else(invalid)?;
        let Some((interval, counts)) = results.iter().next() else {
            return Ok(Self::default());
        };
        let counts = counts
            .as_object()
            .ok_or_else(invalid)?
            .iter()
            .map(|(key, count)| Ok((key.clone(), count.as_u64().ok_or_else(invalid)?)))
            .collect::<Result<_>>()?;
        Ok(Self {
            interval: interval.clone(),
            counts,
        })
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Observation search, lookups, writes and media uploads
#[derive(Debug, Clone)]
pub struct Observations {
    session: Arc<Session>,
}

impl Observations {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn v1(&self, path: &str) -> String {
        format!("{}/{path}", self.session.config().api_v1_url)
    }

    pub async fn get(&self, id: u64) -> Result<Observation> {
        let request = ApiRequest::get(self.v1("observations")).param("id", id);
        fetch_one(&self.session, request).await
    }

    pub async fn by_ids(&self, ids: &[u64]) -> Result<Vec<Observation>> {
        fetch_by_ids(&self.session, ids, |batch| {
            Ok(ApiRequest::get(self.v1("observations"))
                .param("id", join_ids(batch)?)
                .param("per_page", batch.len()))
        })
        .await
    }

    /// Search observations; see the API reference for the hundred-odd filters
    pub fn search(&self, params: Params) -> Result<Paginator<Observation>> {
        validate_order_by(&params, V1_OBS_ORDER_BY_PROPERTIES)?;
        let request = ApiRequest::get(self.v1("observations")).params(params);
        Ok(Paginator::new(Arc::clone(&self.session), request))
    }

    /// Search the v2 API, optionally selecting which response fields to return
    ///
    /// Paginates by ascending ID, since v2 refuses deep page numbers.
    pub fn search_v2(&self, params: Params, fields: Option<Value>) -> Result<Paginator<Observation>> {
        validate_order_by(&params, V2_OBS_ORDER_BY_PROPERTIES)?;
        let url = format!("{}/observations", self.session.config().api_v2_url);
        let request = match fields {
            Some(fields) => field_selection_request(url, fields),
            None => ApiRequest::get(url),
        }
        .params(params);
        Ok(Paginator::new(Arc::clone(&self.session), request).id_range())
    }

    /// Search the v0 REST API, which returns a plain array with the total in a header
    pub fn search_v0(&self, params: Params) -> Result<Paginator<Observation>> {
        validate_order_by(&params, V0_OBS_ORDER_BY_PROPERTIES)?;
        let url = format!("{}/observations.json", self.session.config().api_v0_url);
        let request = ApiRequest::get(url).params(params);
        Ok(Paginator::new(Arc::clone(&self.session), request))
    }

    /// Taxa observed, with observation counts
    pub fn species_counts(&self, params: Params) -> Paginator<TaxonCount> {
        let request = ApiRequest::get(self.v1("observations/species_counts")).params(params);
        Paginator::new(Arc::clone(&self.session), request)
    }

    /// Observation counts per `interval` (`year`, `month`, `week`, `day`, `hour`,
    /// `month_of_year` or `week_of_year`)
    pub async fn histogram(&self, params: Params) -> Result<Histogram> {
        let request = ApiRequest::get(self.v1("observations/histogram")).params(params);
        let response = self.session.execute(request).await?;
        if response.is_dry_run() {
            return Ok(Histogram::default());
        }
        Histogram::from_json(&response.body)
    }

    /// Create an observation from its write fields; returns the created record
    pub async fn create(&self, observation: &Observation) -> Result<Observation> {
        let request = ApiRequest::post(self.v1("observations"))
            .json(observation.to_dict())
            .authenticated();
        let response = self.session.execute(request).await?;
        if response.is_dry_run() {
            return Ok(observation.clone());
        }
        let created = first_record(&response.body, "observations")?;
        debug!(id = created.id, "Created observation");
        Ok(created)
    }

    /// Replace an observation's write fields, keeping its photos
    pub async fn update(&self, id: u64, observation: &Observation) -> Result<Observation> {
        let request = ApiRequest::put(self.v1(&format!("observations/{id}")))
            .param("ignore_photos", 1)
            .json(observation.to_dict())
            .authenticated();
        let response = self.session.execute(request).await?;
        if response.is_dry_run() {
            let mut updated = observation.clone();
            updated.id = id;
            return Ok(updated);
        }
        first_record(&response.body, "observations")
    }

    pub async fn delete(&self, id: u64) -> Result<()> {
        let request = ApiRequest::delete(self.v1(&format!("observations/{id}"))).authenticated();
        self.session.execute(request).await?;
        Ok(())
    }

    /// Attach a photo to an observation
    pub async fn upload_photo(&self, observation_id: u64, file_name: &str, data: Vec<u8>) -> Result<Photo> {
        let request = self.upload_request(
            "observation_photos",
            "observation_photo[observation_id]",
            observation_id,
            file_name,
            data,
        )?;
        let response = self.session.execute(request).await?;
        if response.is_dry_run() {
            return Ok(Photo::default());
        }
        Photo::from_json(&response.body)
    }

    /// Read a photo from disk and attach it to an observation
    pub async fn upload_photo_file(&self, observation_id: u64, path: impl AsRef<Path>) -> Result<Photo> {
        let (file_name, data) = read_file(path.as_ref()).await?;
        self.upload_photo(observation_id, &file_name, data).await
    }

    /// Attach a sound recording to an observation; returns the raw sound record
    pub async fn upload_sound(&self, observation_id: u64, file_name: &str, data: Vec<u8>) -> Result<Value> {
        let request = self.upload_request(
            "observation_sounds",
            "observation_sound[observation_id]",
            observation_id,
            file_name,
            data,
        )?;
        Ok(self.session.execute(request).await?.body)
    }

    fn upload_request(
        &self,
        path: &str,
        id_field: &str,
        observation_id: u64,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<ApiRequest> {
        if data.len() > MAX_FILESIZE {
            return Err(InatError::Validation(format!(
                "{file_name} is {} bytes, larger than the {MAX_FILESIZE} byte upload limit",
                data.len()
            )));
        }
        let parts = vec![
            FormPart::Text {
                name: id_field.to_string(),
                value: observation_id.to_string(),
            },
            FormPart::File {
                name: "file".to_string(),
                file_name: file_name.to_string(),
                content_type: content_type(file_name).map(String::from),
                data,
            },
        ];
        Ok(ApiRequest::post(self.v1(path)).multipart(parts).authenticated())
    }
}

fn first_record(body: &Value, resource: &str) -> Result<Observation> {
    Observation::from_json_list(body)?
        .into_iter()
        .next()
        .ok_or_else(|| InatError::RequestFailed {
            message: format!("Empty response from {resource} endpoint"),
            status: None,
            body: Some(body.to_string()),
        })
}

async fn read_file(path: &Path) -> Result<(String, Vec<u8>)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| InatError::Validation(format!("Not a file path: {}", path.display())))?
        .to_string();
    let data = tokio::fs::read(path).await?;
    Ok((file_name, data))
}

fn content_type(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_lowercase();
    Some(match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        _ => return None,
    })
}
