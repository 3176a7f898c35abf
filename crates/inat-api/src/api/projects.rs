use std::sync::Arc;

use serde_json::{json, Value};

use super::{fetch_all, fetch_one};
use crate::constants::{IDS_PER_REQUEST, PROJECT_ORDER_BY_PROPERTIES};
use crate::error::Result;
use crate::models::Project;
use crate::paginator::Paginator;
use crate::params::{join_ids, validate_order_by, Params};
use crate::request::ApiRequest;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct Projects {
    session: Arc<Session>,
}

impl Projects {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn v1(&self, path: &str) -> String {
        format!("{}/{path}", self.session.config().api_v1_url)
    }

    pub fn search(&self, params: Params) -> Result<Paginator<Project>> {
        validate_order_by(&params, PROJECT_ORDER_BY_PROPERTIES)?;
        let request = ApiRequest::get(self.v1("projects")).params(params);
        Ok(Paginator::new(Arc::clone(&self.session), request))
    }

    pub async fn get(&self, id: u64) -> Result<Project> {
        let request = ApiRequest::get(self.v1("projects")).param("ids", id);
        fetch_one(&self.session, request).await
    }

    /// Projects by ID; `fresh` bypasses both the local cache and the CDN's
    pub async fn by_ids(&self, ids: &[u64], fresh: bool) -> Result<Vec<Project>> {
        join_ids(ids)?;
        let mut projects = Vec::with_capacity(ids.len());
        for batch in ids.chunks(IDS_PER_REQUEST) {
            let batch = join_ids(batch)?;
            let mut request = ApiRequest::get(self.v1("projects")).param("ids", batch.as_str());
            if fresh {
                request = self.session.fresh(request, &format!("/projects/{batch}")).await?;
            }
            projects.extend(fetch_all::<Project>(&self.session, request).await?);
        }
        Ok(projects)
    }

    /// Add an observation to a collection or traditional project
    pub async fn add_observation(&self, project_id: u64, observation_id: u64) -> Result<Value> {
        let request = ApiRequest::post(self.v1("project_observations"))
            .json(json!({"observation_id": observation_id, "project_id": project_id}))
            .authenticated();
        Ok(self.session.execute(request).await?.body)
    }

    pub async fn remove_observation(&self, project_id: u64, observation_id: u64) -> Result<()> {
        let request = ApiRequest::delete(self.v1(&format!("projects/{project_id}/remove")))
            .json(json!({"observation_id": observation_id}))
            .authenticated();
        self.session.execute(request).await?;
        Ok(())
    }
}
