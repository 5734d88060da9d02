//! Agent and job registry, and the labeling job runner.
//!
//! An agent is a registered (model config, prompt template) pair. Running a
//! job labels a subset with an agent's model, writes the labels under a
//! freshly minted job token, and records the job with the annotations it
//! produced.

use serde_json::Value;
use tracing::{info, warn};

use labeler_core_types::{
    Agent, AgentListQuery, AgentRegistration, CreateTokenRequest, JobDetailsQuery, JobFilter,
    JobListQuery, PersistJobBody, RegisterAgentBody,
};

use crate::auth::{Authentication, Credential};
use crate::errors::{CoreError, CoreResult};
use crate::labeling::{LabelingEngine, OpenAiLabeler};
use crate::model_config::validate_model_config_for;
use crate::prompt::PromptTemplate;
use crate::routes;
use crate::service::Service;
use crate::submission::SubmissionResult;
use crate::subset::Subset;

/// Decode one `GET /agents` row: `[uuid, model_config_json, template, created_by]`.
fn decode_agent_row(row: Value) -> CoreResult<Agent> {
    let bad = || CoreError::Protocol(format!("malformed agent row: {}", row));
    let fields = row.as_array().ok_or_else(bad)?;
    let text = |i: usize| fields.get(i).and_then(Value::as_str).map(str::to_string);

    let model_config = match fields.get(1) {
        Some(Value::String(raw)) => serde_json::from_str(raw)
            .map_err(|e| CoreError::Protocol(format!("malformed agent model config: {}", e)))?,
        Some(other) => other.clone(),
        None => return Err(bad()),
    };
    Ok(Agent {
        agent_uuid: text(0).ok_or_else(bad)?,
        model_config,
        prompt_template: text(2).unwrap_or_default(),
        created_by: text(3).unwrap_or_default(),
    })
}

/// Manages agents and runs labeling jobs for one project.
pub struct Controller<'a> {
    service: &'a Service,
    auth: &'a Authentication,
    engine: Box<dyn LabelingEngine>,
}

impl<'a> Controller<'a> {
    /// Controller using the OpenAI completions engine.
    pub fn new(service: &'a Service, auth: &'a Authentication) -> Self {
        Self::with_engine(service, auth, Box::new(OpenAiLabeler::default()))
    }

    pub fn with_engine(
        service: &'a Service,
        auth: &'a Authentication,
        engine: Box<dyn LabelingEngine>,
    ) -> Self {
        Self { service, auth, engine }
    }

    pub fn engine(&self) -> &dyn LabelingEngine {
        self.engine.as_ref()
    }

    /// Registered agents, optionally only those created by the given users.
    pub async fn list_agents(&self, created_by: Option<&[String]>) -> CoreResult<Vec<Agent>> {
        let rows: Vec<Value> = self
            .service
            .http
            .get(routes::AGENTS, &[], &AgentListQuery { created_by })
            .await?;
        rows.into_iter().map(decode_agent_row).collect()
    }

    /// Jobs matching a filter; `None` lists every job.
    pub async fn list_jobs(
        &self,
        filter_by: Option<JobFilter>,
        filter_values: &[String],
        show_details: bool,
    ) -> CoreResult<Vec<Value>> {
        Ok(self
            .service
            .http
            .get(
                routes::JOBS,
                &[],
                &JobListQuery {
                    details: show_details,
                    filter_by,
                    filter_values,
                },
            )
            .await?)
    }

    pub async fn list_jobs_of_agent(
        &self,
        agent_uuid: &str,
        show_details: bool,
    ) -> CoreResult<Vec<Value>> {
        Ok(self
            .service
            .http
            .get(
                routes::AGENT_JOBS,
                &[("agent_uuid", agent_uuid)],
                &JobDetailsQuery { details: show_details },
            )
            .await?)
    }

    pub async fn register_agent(
        &self,
        model_config: &Value,
        prompt_template: &str,
    ) -> CoreResult<AgentRegistration> {
        Ok(self
            .service
            .http
            .post(
                routes::AGENTS,
                &[],
                &RegisterAgentBody {
                    model_config,
                    prompt_template,
                },
            )
            .await?)
    }

    /// Record a job and the annotations it produced.
    pub async fn persist_job(
        &self,
        agent_uuid: &str,
        job_uuid: &str,
        label_name: &str,
        annotation_uuid_list: &[String],
    ) -> CoreResult<Value> {
        info!(%agent_uuid, %job_uuid, annotations = annotation_uuid_list.len(), "persisting job");
        Ok(self
            .service
            .http
            .post(
                routes::AGENT_JOB,
                &[("agent_uuid", agent_uuid), ("job_uuid", job_uuid)],
                &PersistJobBody {
                    label_name,
                    annotation_uuid_list,
                },
            )
            .await?)
    }

    /// Validate a model config for the engine's family and register an agent.
    pub async fn create_agent(
        &self,
        model_config: &Value,
        prompt_template: &PromptTemplate,
    ) -> CoreResult<String> {
        validate_model_config_for(self.engine.model_family(), model_config)?;
        let registration = self
            .register_agent(model_config, prompt_template.get_template())
            .await?;
        info!(agent_uuid = %registration.agent_uuid, "agent registered");
        Ok(registration.agent_uuid)
    }

    /// One of the caller's agents by uuid.
    pub async fn get_agent_by_uuid(&self, agent_uuid: &str) -> CoreResult<Option<Agent>> {
        Ok(self
            .list_my_agents()
            .await?
            .into_iter()
            .find(|agent| agent.agent_uuid == agent_uuid))
    }

    pub async fn list_my_agents(&self) -> CoreResult<Vec<Agent>> {
        let me = vec![self.service.get_annotator().await?.user_id.clone()];
        self.list_agents(Some(&me)).await
    }

    pub async fn list_my_jobs(&self, show_details: bool) -> CoreResult<Vec<Value>> {
        let me = vec![self.service.get_annotator().await?.user_id.clone()];
        self.list_jobs(Some(JobFilter::IssuedBy), &me, show_details).await
    }

    /// Label `subset` with an agent and persist the result as a job.
    ///
    /// Records the model cannot label are left out of the job. Submitted
    /// annotations are not rolled back if persisting the job fails. The job
    /// session inherits this controller's timeouts and submit concurrency.
    /// Returns the job uuid.
    pub async fn run_job(
        &self,
        agent_uuid: &str,
        subset: &Subset<'_>,
        label_name: &str,
    ) -> CoreResult<String> {
        let label_schema = self.service.get_schemas().active_label_schema().await?;
        let records = subset.get_data_content().await?;

        let agent = self
            .get_agent_by_uuid(agent_uuid)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("agent {} is invalid", agent_uuid)))?;
        let prompt = PromptTemplate::new(
            label_schema,
            vec![label_name.to_string()],
            Some(agent.prompt_template.clone()),
        )?;
        validate_model_config_for(self.engine.model_family(), &agent.model_config)?;
        info!(%agent_uuid, records = records.len(), %label_name, "job issued");

        self.engine.check_credentials().await?;
        let outcome = self
            .engine
            .label(&records, &agent.model_config, &prompt, label_name)
            .await?;

        let grant = self.auth.create_access_token(&CreateTokenRequest::job()).await?;
        let job_uuid = grant.uid;
        let job_service = Service::new(
            self.service.options_with_credential(Credential::AccessToken(grant.token)),
        )
        .await?;

        let mut job_subset = Subset::new(&job_service, subset.get_uuid_list().to_vec());
        for labeled in &outcome.labels {
            job_subset
                .set_annotations(&labeled.uuid, labeled.labels.clone())
                .await?;
        }

        let valid = outcome.uuids_with_valid_labels();
        let results = job_service.submit_annotations(&job_subset, &valid).await?;
        let annotation_uuid_list: Vec<String> = valid
            .iter()
            .filter_map(|uuid| results.iter().find(|r| r.uuid() == uuid))
            .filter_map(SubmissionResult::annotation_uuid)
            .collect();
        if annotation_uuid_list.len() < valid.len() {
            warn!(
                %job_uuid,
                submitted = annotation_uuid_list.len(),
                labeled = valid.len(),
                "some job annotations were not submitted"
            );
        }

        self.persist_job(agent_uuid, &job_uuid, label_name, &annotation_uuid_list)
            .await?;
        Ok(job_uuid)
    }
}
