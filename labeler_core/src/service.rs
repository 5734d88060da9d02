//! Project session.
//!
//! A [`Service`] binds one credential to one project namespace. It is the
//! entry point for searches, content fetches and the annotation pipelines
//! (see `submission` and `reconciliation`), and hands out the schema and
//! statistics accessors.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::debug;

use labeler_core_types::{
    Annotator, AssignmentQuery, ExportRow, JobDataQuery, MetadataBatchBody, MetadataValue,
    RecordContent, SearchQuery, UidListBody, UuidListBody, VerifiedStatus,
};

use crate::auth::{parse_id_token, Credential};
use crate::config::{ClientConfig, DEFAULT_LIST_LIMIT, METADATA_BATCH_SIZE, SUBMIT_CONCURRENCY};
use crate::errors::{CoreError, CoreResult};
use crate::http::{HttpClient, NoBody};
use crate::routes::{self, DEFAULT_HOST};
use crate::schema::Schema;
use crate::statistic::Statistic;
use crate::subset::Subset;

/// Options for opening a [`Service`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Service host; the hosted default is used when `None`.
    pub host: Option<String>,
    pub project: String,
    pub credential: Option<Credential>,
    pub request_timeout: Option<Duration>,
    pub url_check_timeout: Option<Duration>,
    pub submit_concurrency: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            host: None,
            project: String::new(),
            credential: None,
            request_timeout: None,
            url_check_timeout: None,
            submit_concurrency: SUBMIT_CONCURRENCY,
        }
    }
}

/// Connection to a labeler project.
pub struct Service {
    host: String,
    project: String,
    pub(crate) http: HttpClient,
    credential: Credential,
    annotator: OnceCell<Annotator>,
    pub(crate) submit_concurrency: usize,
}

impl Service {
    /// Open a session and verify the project answers.
    ///
    /// Fails with a configuration error when the project is empty or no
    /// credential is given, and with the server's message when the
    /// `?url_check=1` probe does not succeed.
    pub async fn new(options: ServiceOptions) -> CoreResult<Self> {
        if options.project.trim().is_empty() {
            return Err(CoreError::config("project cannot be empty"));
        }
        let credential = options
            .credential
            .filter(|c| !c.secret().is_empty())
            .ok_or_else(|| CoreError::config("at least one authentication method is required"))?;
        let host = match options.host.as_deref() {
            Some(h) if !h.trim().is_empty() => routes::normalize_host(h)?,
            _ => DEFAULT_HOST.to_string(),
        };

        let mut http = HttpClient::new(
            &routes::project_base(&host, &options.project),
            Some(credential.clone()),
        );
        if let Some(timeout) = options.request_timeout {
            http = http.with_request_timeout(timeout);
        }
        if let Some(timeout) = options.url_check_timeout {
            http = http.with_url_check_timeout(timeout);
        }
        http.url_check().await?;

        Ok(Self {
            host,
            project: options.project,
            http,
            credential,
            annotator: OnceCell::new(),
            submit_concurrency: options.submit_concurrency.max(1),
        })
    }

    /// Open a session with a static access token.
    pub async fn connect(
        host: Option<&str>,
        project: &str,
        access_token: &str,
    ) -> CoreResult<Self> {
        Self::new(ServiceOptions {
            host: host.map(str::to_string),
            project: project.to_string(),
            credential: Some(Credential::AccessToken(access_token.to_string())),
            ..ServiceOptions::default()
        })
        .await
    }

    /// Open a session from a [`ClientConfig`].
    pub async fn from_config(config: &ClientConfig) -> CoreResult<Self> {
        config.validate()?;
        Self::new(ServiceOptions {
            host: Some(config.host.clone()),
            project: config.project.clone(),
            credential: config.access_token.clone().map(Credential::AccessToken),
            request_timeout: Some(Duration::from_secs(config.request_timeout_secs)),
            url_check_timeout: Some(Duration::from_secs(config.url_check_timeout_secs)),
            submit_concurrency: config.submit_concurrency,
        })
        .await
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn request_timeout(&self) -> Duration {
        self.http.request_timeout()
    }

    pub fn submit_concurrency(&self) -> usize {
        self.submit_concurrency
    }

    /// Options for another session on this project with the same transport
    /// settings but a different credential.
    pub fn options_with_credential(&self, credential: Credential) -> ServiceOptions {
        ServiceOptions {
            host: Some(self.host.clone()),
            project: self.project.clone(),
            credential: Some(credential),
            request_timeout: Some(self.http.request_timeout()),
            url_check_timeout: Some(self.http.url_check_timeout()),
            submit_concurrency: self.submit_concurrency,
        }
    }

    /// Base URL of the project namespace.
    pub fn get_service_endpoint(&self) -> &str {
        self.http.base_url()
    }

    /// Credential fragment that starts every request body.
    pub fn base_payload(&self) -> Value {
        json!({ self.credential.key(): self.credential.secret() })
    }

    /// Name and user id of the identity behind this session.
    ///
    /// Resolved once: access tokens ask the service, identity tokens are
    /// decoded locally.
    pub async fn get_annotator(&self) -> CoreResult<&Annotator> {
        self.annotator.get_or_try_init(|| self.resolve_annotator()).await
    }

    async fn resolve_annotator(&self) -> CoreResult<Annotator> {
        match &self.credential {
            Credential::AccessToken(_) => {
                Ok(self.http.get(routes::USERS, &[], &NoBody {}).await?)
            }
            Credential::IdToken(token) => {
                let claims = parse_id_token(token)?;
                Ok(Annotator {
                    name: claims.name,
                    user_id: claims.user_id,
                })
            }
        }
    }

    /// Schema accessor for this project.
    pub fn get_schemas(&self) -> Schema<'_> {
        Schema::new(self)
    }

    /// Statistics accessor for this project.
    pub fn get_statistics(&self) -> Statistic<'_> {
        Statistic::new(self)
    }

    /// Basic project information (name, description).
    pub async fn get_project_info(&self) -> CoreResult<Value> {
        Ok(self
            .http
            .get(routes::PROJECT_BY_NAME, &[("project_name", &self.project)], &NoBody {})
            .await?)
    }

    /// User names keyed by user id.
    pub async fn get_users_by_uid(&self, uid_list: &[String]) -> CoreResult<Value> {
        if uid_list.is_empty() {
            return Ok(json!({}));
        }
        Ok(self
            .http
            .get(routes::USERS_BY_UID, &[], &UidListBody { uid_list })
            .await?)
    }

    /// Search records and return them as a subset scoped to this annotator.
    pub async fn search(&self, query: &SearchQuery) -> CoreResult<Subset<'_>> {
        let uuids: Vec<String> = self.http.get(routes::DATA, &[], query).await?;
        let annotator = self.get_annotator().await?.user_id.clone();
        Ok(Subset::new(self, uuids)
            .with_meta_names(query.meta_names.clone())
            .with_annotator(annotator))
    }

    /// Records annotated by a labeling job.
    pub async fn search_by_job(
        &self,
        job_id: &str,
        verified: Option<bool>,
        limit: Option<usize>,
        start: usize,
    ) -> CoreResult<Subset<'_>> {
        let query = JobDataQuery {
            verified_status: VerifiedStatus::from(verified),
            limit: limit.unwrap_or(DEFAULT_LIST_LIMIT),
            start,
            job_id,
        };
        let uuids: Vec<String> = self
            .http
            .get(routes::JOB_DATA, &[("job_uuid", job_id)], &query)
            .await?;
        Ok(Subset::new(self, uuids).with_job(job_id))
    }

    /// Raw content for the given records.
    pub async fn get_data_content(&self, uuid_list: &[String]) -> CoreResult<Vec<RecordContent>> {
        Ok(self
            .http
            .get(routes::DATA_CONTENT, &[], &UuidListBody { uuid_list })
            .await?)
    }

    /// Records assigned to an annotator (the caller when `None`).
    ///
    /// All assignments are merged into one subset, in first-seen order.
    pub async fn get_assignment(
        &self,
        annotator: Option<&str>,
        latest_only: bool,
    ) -> CoreResult<Subset<'_>> {
        #[derive(Deserialize)]
        struct Assignment {
            #[serde(default)]
            uuid_list: Vec<String>,
        }

        let assignments: Vec<Assignment> = self
            .http
            .get(
                routes::ASSIGNMENTS,
                &[],
                &AssignmentQuery {
                    annotator,
                    latest_only,
                },
            )
            .await?;
        let mut seen = HashSet::new();
        let uuids = assignments
            .into_iter()
            .flat_map(|a| a.uuid_list)
            .filter(|u| seen.insert(u.clone()))
            .collect();
        Ok(Subset::new(self, uuids))
    }

    /// Compute and store a metadata value for every record in the project.
    ///
    /// Records are paged in windows of `batch_size` (500 when `None`);
    /// `func` receives each record's raw content. Returns how many records
    /// the service updated.
    pub async fn set_metadata<F>(
        &self,
        meta_name: &str,
        func: F,
        batch_size: Option<usize>,
    ) -> CoreResult<usize>
    where
        F: Fn(&str) -> Value,
    {
        if meta_name.trim().is_empty() {
            return Err(CoreError::validation("meta_name cannot be empty"));
        }
        let batch_size = batch_size.unwrap_or(METADATA_BATCH_SIZE).max(1);
        let progress = self.get_statistics().get_label_progress().await?;
        let total = progress.get("total").and_then(Value::as_u64).unwrap_or(0) as usize;
        let batches = total.div_ceil(batch_size);

        let mut updated = 0usize;
        for i in 0..batches {
            let query = SearchQuery {
                limit: batch_size,
                start: i * batch_size,
                ..SearchQuery::default()
            };
            let uuids: Vec<String> = self.http.get(routes::DATA, &[], &query).await?;
            let metadata_list: Vec<MetadataValue> = self
                .get_data_content(&uuids)
                .await?
                .into_iter()
                .map(|record| MetadataValue {
                    value: func(&record.data),
                    uuid: record.uuid,
                })
                .collect();

            let text = self
                .http
                .send_text(
                    reqwest::Method::POST,
                    routes::DATA_METADATA,
                    &[],
                    &MetadataBatchBody {
                        meta_name,
                        metadata_list: &metadata_list,
                    },
                )
                .await?;
            let count: usize = text.trim().trim_matches('"').parse().map_err(|_| {
                CoreError::Protocol(format!("unexpected metadata update response: {}", text))
            })?;
            debug!(batch = i + 1, of = batches, count, "metadata batch stored");
            updated += count;
        }
        Ok(updated)
    }

    /// Every (record, annotator, label) triple in the project.
    pub async fn export(&self) -> CoreResult<Vec<ExportRow>> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawRow {
            Tuple(String, Option<String>, Option<String>, Option<String>, Value),
            Object(ExportRow),
        }

        let rows: Vec<RawRow> = self.http.get(routes::DATA_EXPORT, &[], &NoBody {}).await?;
        Ok(rows
            .into_iter()
            .map(|row| match row {
                RawRow::Tuple(data_id, content, annotator, label_name, label_value) => ExportRow {
                    data_id,
                    content,
                    annotator,
                    label_name,
                    label_value,
                },
                RawRow::Object(row) => row,
            })
            .collect())
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("host", &self.host)
            .field("project", &self.project)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}
