//! Shared DTOs for the labeler client core.
//!
//! Every record exchanged with the annotation service lives here as a plain
//! serde type. Request bodies carry only their route-specific fields; the
//! credential key is prepended by the transport layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Records
// =============================================================================

/// One annotator's label object for a record.
///
/// The service treats everything except `annotator` as opaque, so the
/// remaining fields (`labels_record`, `labels_span`, ...) are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelObject {
    #[serde(default)]
    pub annotator: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LabelObject {
    /// Build a label object from raw fields; an `annotator` key is lifted out.
    pub fn from_fields(mut fields: Map<String, Value>) -> Self {
        let annotator = match fields.remove("annotator") {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        Self { annotator, fields }
    }

    /// Record-level label with a single value.
    pub fn record_label(label_name: &str, value: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(
            "labels_record".to_string(),
            serde_json::json!([{ "label_name": label_name, "label_value": [value] }]),
        );
        fields.insert("labels_span".to_string(), Value::Array(Vec::new()));
        Self {
            annotator: String::new(),
            fields,
        }
    }
}

/// Per-record annotation bundle as returned by `GET /annotations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationBundle {
    pub uuid: String,
    #[serde(default, alias = "record_content", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub annotation_list: Vec<LabelObject>,
}

/// Raw content of a data record (`GET /data/content`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordContent {
    pub uuid: String,
    pub data: String,
}

/// Identity of the annotator behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotator {
    #[serde(default)]
    pub name: Option<String>,
    pub user_id: String,
}

/// A registered labeling agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_uuid: String,
    pub model_config: Value,
    pub prompt_template: String,
    pub created_by: String,
}

/// Response of `POST /agents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub agent_uuid: String,
}

/// Response of `POST /tokens`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenGrant {
    pub uid: String,
    pub token: String,
}

/// One selectable option of a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelOption {
    pub value: String,
    #[serde(default)]
    pub text: String,
}

/// One label declared by a project's label schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSchemaEntry {
    pub name: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub options: Vec<LabelOption>,
}

/// Row of `GET /data/export`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub data_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub annotator: Option<String>,
    #[serde(default)]
    pub label_name: Option<String>,
    #[serde(default)]
    pub label_value: Value,
}

/// Label filter for searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelFilter {
    pub label_name: String,
    pub label_value: Vec<Value>,
}

/// A verifier's judgement over another annotator's labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationEntry {
    pub uuid: String,
    pub annotator_id: String,
    pub labels: Vec<Value>,
}

/// Reconciled labels for a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationEntry {
    pub uuid: String,
    pub labels: Value,
}

/// Per-record metadata value for batch updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataValue {
    pub uuid: String,
    pub value: Value,
}

/// Which field `GET /agents/jobs` filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFilter {
    AgentUuid,
    IssuedBy,
    Uuid,
}

/// Verification state filter for job searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifiedStatus {
    All,
    Verified,
    Unverified,
}

impl From<Option<bool>> for VerifiedStatus {
    fn from(verified: Option<bool>) -> Self {
        match verified {
            None => VerifiedStatus::All,
            Some(true) => VerifiedStatus::Verified,
            Some(false) => VerifiedStatus::Unverified,
        }
    }
}

// =============================================================================
// Request bodies
// =============================================================================

/// Predicates for `GET /data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub limit: usize,
    pub start: usize,
    pub uuid_list: Option<Vec<String>>,
    pub keyword: String,
    pub label: Option<LabelFilter>,
    pub regex: String,
    #[serde(skip)]
    pub meta_names: Vec<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            limit: 10,
            start: 0,
            uuid_list: None,
            keyword: String::new(),
            label: None,
            regex: String::new(),
            meta_names: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobDataQuery<'a> {
    pub verified_status: VerifiedStatus,
    pub limit: usize,
    pub start: usize,
    pub job_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct UuidListBody<'a> {
    pub uuid_list: &'a [String],
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotationQuery<'a> {
    pub uuid_list: &'a [String],
    pub meta_names: &'a [String],
}

/// Body of `POST /annotations/{uuid}`. `labels` is `{}` to clear.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitAnnotationBody {
    pub labels: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationBody<'a> {
    pub uuid: &'a str,
    pub labels: &'a [Value],
    pub label_level: Value,
    pub label_name: Value,
    pub annotator_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationBody<'a> {
    pub uuid: &'a str,
    pub labels: &'a Value,
    pub annotator: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarityQuery<'a> {
    pub uuid_list: &'a [String],
    pub meta_name: &'a str,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataBatchBody<'a> {
    pub meta_name: &'a str,
    pub metadata_list: &'a [MetadataValue],
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentQuery<'a> {
    pub annotator: Option<&'a str>,
    pub latest_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UidListBody<'a> {
    pub uid_list: &'a [String],
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaQuery {
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaUpdate<'a> {
    pub schemas: &'a Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelNameQuery<'a> {
    pub label_name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterAgentBody<'a> {
    pub model_config: &'a Value,
    pub prompt_template: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentListQuery<'a> {
    pub created_by: Option<&'a [String]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobListQuery<'a> {
    pub details: bool,
    pub filter_by: Option<JobFilter>,
    pub filter_values: &'a [String],
}

#[derive(Debug, Clone, Serialize)]
pub struct JobDetailsQuery {
    pub details: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersistJobBody<'a> {
    pub label_name: &'a str,
    pub annotation_uuid_list: &'a [String],
}

/// Body of `POST /tokens`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTokenRequest {
    pub note: String,
    #[serde(rename = "expiration_duration")]
    pub expiration_duration_days: u32,
    pub demo: bool,
    pub job: bool,
}

impl Default for CreateTokenRequest {
    fn default() -> Self {
        Self {
            note: String::new(),
            expiration_duration_days: 14,
            demo: false,
            job: false,
        }
    }
}

impl CreateTokenRequest {
    /// Request for a single-run job token.
    pub fn job() -> Self {
        Self {
            job: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenListQuery {
    pub job: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenDeleteBody<'a> {
    pub id_list: &'a [String],
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateProjectBody<'a> {
    pub project_name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StackStatusQuery<'a> {
    pub stack_id: &'a str,
}
