//! Project administration.
//!
//! Administrative calls live in their own namespace on the service host,
//! separate from any project's data routes.

use std::collections::BTreeMap;

use serde_json::Value;

use labeler_core_types::{CreateProjectBody, StackStatusQuery};

use crate::auth::Credential;
use crate::errors::{CoreError, CoreResult};
use crate::http::{HttpClient, NoBody};
use crate::routes::{self, ADMIN_PROJECT, DEFAULT_HOST};

/// Client for listing and creating projects.
#[derive(Debug, Clone)]
pub struct ProjectAdmin {
    host: String,
    http: HttpClient,
}

impl ProjectAdmin {
    /// Open the administrative namespace and verify it answers.
    pub async fn new(host: Option<&str>, credential: Credential) -> CoreResult<Self> {
        if credential.secret().is_empty() {
            return Err(CoreError::config("at least one authentication method is required"));
        }
        let host = match host {
            Some(h) if !h.trim().is_empty() => routes::normalize_host(h)?,
            _ => DEFAULT_HOST.to_string(),
        };
        let http = HttpClient::new(&routes::project_base(&host, ADMIN_PROJECT), Some(credential));
        http.url_check().await?;
        Ok(Self { host, http })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Project names mapped to their REST health-check URL.
    pub async fn get_projects(&self) -> CoreResult<BTreeMap<String, String>> {
        let names: Vec<String> = self.http.get(routes::PROJECTS, &[], &NoBody {}).await?;
        Ok(names
            .into_iter()
            .map(|name| {
                let url = format!("{}?url_check=1", routes::project_base(&self.host, &name));
                (name, url)
            })
            .collect())
    }

    pub async fn create_project(&self, project_name: &str) -> CoreResult<Value> {
        if project_name.trim().is_empty() {
            return Err(CoreError::validation("project_name cannot be empty"));
        }
        Ok(self
            .http
            .post(routes::PROJECTS, &[], &CreateProjectBody { project_name })
            .await?)
    }

    /// Provisioning status of a project's backing stack.
    pub async fn get_project_stack_status(&self, stack_id: &str) -> CoreResult<Value> {
        Ok(self
            .http
            .get(routes::PROJECT_STACK_STATUS, &[], &StackStatusQuery { stack_id })
            .await?)
    }
}
