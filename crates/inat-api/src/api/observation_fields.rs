use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::Result;
use crate::models::{Model, ObservationFieldValue};
use crate::request::ApiRequest;
use crate::session::Session;

/// Observation field values on individual observations
#[derive(Debug, Clone)]
pub struct ObservationFields {
    session: Arc<Session>,
}

impl ObservationFields {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn v1(&self, path: &str) -> String {
        format!("{}/{path}", self.session.config().api_v1_url)
    }

    /// Create or update the value of one field on an observation
    pub async fn set(
        &self,
        observation_id: u64,
        field_id: u64,
        value: impl Into<Value>,
    ) -> Result<ObservationFieldValue> {
        let value = value.into();
        let request = ApiRequest::post(self.v1("observation_field_values"))
            .json(json!({
                "observation_id": observation_id,
                "observation_field_id": field_id,
                "value": value,
            }))
            .authenticated();
        let response = self.session.execute(request).await?;
        if response.is_dry_run() {
            return Ok(ObservationFieldValue::new(field_id, value));
        }
        ObservationFieldValue::from_json(&response.body)
    }

    pub async fn delete(&self, ofv_id: u64) -> Result<()> {
        let request = ApiRequest::delete(self.v1(&format!("observation_field_values/{ofv_id}"))).authenticated();
        self.session.execute(request).await?;
        Ok(())
    }
}
