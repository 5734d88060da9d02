//! LLM labeling engines.
//!
//! An engine turns record contents into label objects. Records the model
//! cannot label (request failure, unparseable or off-schema answer) are
//! reported as exclusions; they never abort a run.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use labeler_core_types::{LabelObject, RecordContent};

use crate::errors::{CoreError, CoreResult};
use crate::model_config::DEFAULT_MODEL_FAMILY;
use crate::prompt::PromptTemplate;
use crate::shared_client::SHARED_CLIENT;

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_ORGANIZATION: &str = "OPENAI_ORGANIZATION";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Timeout for one model call.
pub const LLM_REQUEST_TIMEOUT_SECS: u64 = 60;

/// A label object produced for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRecord {
    pub uuid: String,
    pub labels: Map<String, Value>,
}

/// A record the engine could not label.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcludedRecord {
    pub uuid: String,
    pub reason: String,
}

/// Result of labeling a batch of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelingOutcome {
    pub labels: Vec<LabeledRecord>,
    pub excluded: Vec<ExcludedRecord>,
}

impl LabelingOutcome {
    /// Uuids that received a valid label, in labeling order.
    pub fn uuids_with_valid_labels(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.uuid.clone()).collect()
    }

    fn exclude(&mut self, uuid: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%uuid, %reason, "record excluded from labeling");
        self.excluded.push(ExcludedRecord {
            uuid: uuid.to_string(),
            reason,
        });
    }
}

/// Produces labels for records with an external model.
#[async_trait]
pub trait LabelingEngine: Send + Sync {
    /// Model family used to validate agent configurations.
    fn model_family(&self) -> &str;

    /// Fail with a credential error before any labeling if the engine
    /// cannot authenticate.
    async fn check_credentials(&self) -> CoreResult<()>;

    async fn label(
        &self,
        records: &[RecordContent],
        model_config: &Value,
        prompt: &PromptTemplate,
        label_name: &str,
    ) -> CoreResult<LabelingOutcome>;
}

#[derive(Debug, Clone)]
struct OpenAiCredentials {
    api_key: String,
    organization: Option<String>,
}

fn credentials_from(
    api_key: Option<String>,
    organization: Option<String>,
) -> CoreResult<OpenAiCredentials> {
    let api_key = api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| CoreError::credential(format!("{} is not set", ENV_OPENAI_API_KEY)))?;
    Ok(OpenAiCredentials {
        api_key,
        organization: organization.filter(|o| !o.trim().is_empty()),
    })
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Labeling engine backed by the OpenAI completions or chat API.
///
/// The API key is read from `OPENAI_API_KEY` when the engine is used,
/// unless one was supplied with [`OpenAiLabeler::with_api_key`].
#[derive(Debug, Clone)]
pub struct OpenAiLabeler {
    client: reqwest::Client,
    family: String,
    api_key: Option<String>,
    base_url: Option<String>,
    request_timeout: Duration,
}

impl Default for OpenAiLabeler {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_FAMILY)
    }
}

impl OpenAiLabeler {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            client: SHARED_CLIENT.clone(),
            family: family.into(),
            api_key: None,
            base_url: None,
            request_timeout: Duration::from_secs(LLM_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn credentials(&self) -> CoreResult<OpenAiCredentials> {
        credentials_from(
            self.api_key.clone().or_else(|| std::env::var(ENV_OPENAI_API_KEY).ok()),
            std::env::var(ENV_OPENAI_ORGANIZATION).ok(),
        )
    }

    fn base_url(&self) -> String {
        self.base_url
            .clone()
            .or_else(|| std::env::var(ENV_OPENAI_BASE_URL).ok())
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    fn is_chat(&self) -> bool {
        self.family != "completions"
    }

    fn request(
        &self,
        creds: &OpenAiCredentials,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url(), path))
            .bearer_auth(&creds.api_key)
            .timeout(self.request_timeout);
        if let Some(org) = &creds.organization {
            req = req.header("OpenAI-Organization", org);
        }
        req
    }

    async fn complete(
        &self,
        creds: &OpenAiCredentials,
        config: &Map<String, Value>,
        prompt: &str,
    ) -> Result<String, String> {
        let mut body = config.clone();
        let path = if self.is_chat() {
            body.insert("messages".to_string(), json!([{"role": "user", "content": prompt}]));
            "/v1/chat/completions"
        } else {
            body.insert("prompt".to_string(), Value::String(prompt.to_string()));
            "/v1/completions"
        };

        let resp = self
            .request(creds, reqwest::Method::POST, path)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("model request failed: {}", e))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("model returned HTTP {}: {}", status.as_u16(), text));
        }
        let parsed: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| format!("malformed model response: {}", e))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.text.or_else(|| c.message.and_then(|m| m.content)))
            .ok_or_else(|| "model returned no choices".to_string())
    }
}

#[async_trait]
impl LabelingEngine for OpenAiLabeler {
    fn model_family(&self) -> &str {
        &self.family
    }

    async fn check_credentials(&self) -> CoreResult<()> {
        let creds = self.credentials()?;
        let resp = self
            .request(&creds, reqwest::Method::GET, "/v1/models")
            .send()
            .await?;
        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        Err(CoreError::credential(format!(
            "OpenAI rejected the API key (HTTP {}): {}",
            status, text
        )))
    }

    async fn label(
        &self,
        records: &[RecordContent],
        model_config: &Value,
        prompt: &PromptTemplate,
        label_name: &str,
    ) -> CoreResult<LabelingOutcome> {
        let creds = self.credentials()?;
        let config = model_config
            .as_object()
            .ok_or_else(|| CoreError::validation("model config must be an object"))?;

        let mut outcome = LabelingOutcome::default();
        for record in records {
            let text = match prompt.build_prompt(&record.data) {
                Ok(text) => text,
                Err(e) => {
                    outcome.exclude(&record.uuid, e.to_string());
                    continue;
                }
            };
            let answer = match self.complete(&creds, config, &text).await {
                Ok(answer) => answer,
                Err(reason) => {
                    outcome.exclude(&record.uuid, reason);
                    continue;
                }
            };
            match prompt.parse_response(&answer) {
                Ok(value) => {
                    debug!(uuid = %record.uuid, %value, "record labeled");
                    outcome.labels.push(LabeledRecord {
                        uuid: record.uuid.clone(),
                        labels: LabelObject::record_label(label_name, &value).fields,
                    });
                }
                Err(reason) => outcome.exclude(&record.uuid, reason),
            }
        }

        info!(
            labeled = outcome.labels.len(),
            excluded = outcome.excluded.len(),
            family = %self.family,
            "labeling finished"
        );
        Ok(outcome)
    }
}
