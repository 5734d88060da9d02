//! REST route table and URL helpers.
//!
//! Routes are templates relative to a project base URL (`{host}/{project}`).
//! Placeholders use `{name}` and are filled by [`render`].

use reqwest::Method;
use url::Url;

use crate::CoreError;

/// Hosted service used when no host is given.
pub const DEFAULT_HOST: &str = "http://a74bd49f7393e513d.awsglobalaccelerator.com:5000";

/// Namespace for project administration calls.
pub const ADMIN_PROJECT: &str = "development";

/// Namespace used by authentication when no explicit host is given.
pub const AUTH_DEFAULT_PROJECT: &str = "base";

pub const ANNOTATIONS: &str = "/annotations";
pub const ANNOTATION_BY_UUID: &str = "/annotations/{uuid}";
pub const ANNOTATION_LABELS: &str = "/annotations/{uuid}/labels";
pub const SUGGEST_SIMILAR: &str = "/annotations/suggest_similar";
pub const VERIFICATION_LABELS: &str = "/verifications/{uuid}/labels";
pub const RECONCILIATIONS: &str = "/reconciliations";

pub const DATA: &str = "/data";
pub const DATA_CONTENT: &str = "/data/content";
pub const DATA_METADATA: &str = "/data/metadata";
pub const DATA_EXPORT: &str = "/data/export";

pub const SCHEMAS: &str = "/schemas";

pub const USERS: &str = "/users";
pub const USERS_BY_UID: &str = "/users/uid";
pub const ASSIGNMENTS: &str = "/assignments";

pub const LABEL_PROGRESS: &str = "/statistics/label/progress";
pub const LABEL_DISTRIBUTIONS: &str = "/statistics/label/distributions";
pub const ANNOTATOR_CONTRIBUTIONS: &str = "/statistics/annotator/contributions";
pub const ANNOTATOR_AGREEMENTS: &str = "/statistics/annotator/agreements";
pub const EMBEDDINGS: &str = "/statistics/embeddings/{embed_type}";

pub const PROJECTS: &str = "/projects";
pub const PROJECT_BY_NAME: &str = "/projects/{project_name}";
pub const PROJECT_STACK_STATUS: &str = "/projects/stack_status";

pub const AGENTS: &str = "/agents";
pub const JOBS: &str = "/agents/jobs";
pub const JOB_DATA: &str = "/agents/jobs/{job_uuid}/data";
pub const AGENT_JOBS: &str = "/agents/{agent_uuid}/jobs";
pub const AGENT_JOB: &str = "/agents/{agent_uuid}/jobs/{job_uuid}";

pub const TOKENS: &str = "/tokens";

/// Routes expected to run long; they are sent without a request timeout.
const TIMEOUT_EXEMPT: &[(&str, &str)] = &[("POST", DATA), ("GET", SUGGEST_SIMILAR)];

/// Whether a route template is exempt from the request timeout.
pub fn is_timeout_exempt(method: &Method, template: &str) -> bool {
    TIMEOUT_EXEMPT
        .iter()
        .any(|(m, t)| method.as_str() == *m && *t == template)
}

/// Fill `{name}` placeholders in a route template.
pub fn render(template: &str, params: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in params {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}

/// Validate a host and strip trailing slashes.
pub fn normalize_host(host: &str) -> Result<String, CoreError> {
    let trimmed = host.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed)?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(CoreError::config(format!("unsupported scheme: {other}"))),
    }
}

/// Base URL of a project namespace.
pub fn project_base(host: &str, project: &str) -> String {
    format!("{}/{}", host.trim_end_matches('/'), project)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_placeholders() {
        assert_eq!(
            render(AGENT_JOB, &[("agent_uuid", "a1"), ("job_uuid", "j1")]),
            "/agents/a1/jobs/j1"
        );
        assert_eq!(render(DATA, &[]), "/data");
    }

    #[test]
    fn test_timeout_exempt_routes() {
        assert!(is_timeout_exempt(&Method::POST, DATA));
        assert!(!is_timeout_exempt(&Method::GET, DATA));
        assert!(is_timeout_exempt(&Method::GET, SUGGEST_SIMILAR));
        assert!(!is_timeout_exempt(&Method::POST, ANNOTATION_BY_UUID));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("http://localhost:5000/").unwrap(),
            "http://localhost:5000"
        );
        assert!(normalize_host("ftp://example.com").is_err());
        assert!(normalize_host("not a url").is_err());
    }

    #[test]
    fn test_project_base() {
        assert_eq!(project_base("http://h:5000/", "demo"), "http://h:5000/demo");
    }
}
