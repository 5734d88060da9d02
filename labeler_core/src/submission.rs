//! Annotation submission pipeline.
//!
//! Writes the current identity's label object for each requested record,
//! with a bounded number of requests in flight. One record failing never
//! fails the batch: every attempted record yields a [`SubmissionResult`].

use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use labeler_core_types::{AnnotationBundle, SubmitAnnotationBody};

use crate::errors::{CoreError, CoreResult};
use crate::http::HttpError;
use crate::routes;
use crate::service::Service;
use crate::subset::Subset;

/// Why one record's submission failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionError {
    /// The request exceeded its route timeout.
    Timeout,
    /// The service answered with a non-success status.
    Remote { status: u16, body: String },
    /// Connection or decoding failure.
    Transport(String),
}

impl std::fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionError::Timeout => write!(f, "request timed out"),
            SubmissionError::Remote { status, body } => write!(f, "HTTP {}: {}", status, body),
            SubmissionError::Transport(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<HttpError> for SubmissionError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout(_) => SubmissionError::Timeout,
            HttpError::Response(detail) => SubmissionError::Remote {
                status: detail.status,
                body: detail.body,
            },
            HttpError::Request(e) if e.is_timeout() => SubmissionError::Timeout,
            other => SubmissionError::Transport(other.to_string()),
        }
    }
}

/// Outcome of submitting one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionResult {
    Submitted { uuid: String, response: Value },
    Failed { uuid: String, error: SubmissionError },
}

impl SubmissionResult {
    pub fn uuid(&self) -> &str {
        match self {
            SubmissionResult::Submitted { uuid, .. }
            | SubmissionResult::Failed { uuid, .. } => uuid,
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmissionResult::Submitted { .. })
    }

    /// Annotation id assigned by the service, falling back to the record uuid.
    pub fn annotation_uuid(&self) -> Option<String> {
        match self {
            SubmissionResult::Submitted { uuid, response } => Some(
                response
                    .get("annotation_uuid")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| uuid.clone()),
            ),
            SubmissionResult::Failed { .. } => None,
        }
    }
}

/// Label object `annotator` authored on a bundle, or `{}` to clear.
fn labels_for(bundle: &AnnotationBundle, annotator: &str) -> Value {
    bundle
        .annotation_list
        .iter()
        .find(|label| label.annotator == annotator)
        .and_then(|label| serde_json::to_value(label).ok())
        .unwrap_or_else(|| json!({}))
}

impl Service {
    /// Submit the caller's annotations for `uuid_list` from a loaded subset.
    ///
    /// Records without a label object by the current identity are cleared
    /// with `labels: {}`. Uuids missing from the subset cache are skipped.
    /// Results arrive in completion order.
    pub async fn submit_annotations(
        &self,
        subset: &Subset<'_>,
        uuid_list: &[String],
    ) -> CoreResult<Vec<SubmissionResult>> {
        let cache = subset
            .cached()
            .ok_or_else(|| CoreError::validation("subset annotations are not loaded"))?;
        let annotator = self.get_annotator().await?.user_id.clone();

        let pending: Vec<(String, Value)> = uuid_list
            .iter()
            .filter_map(|uuid| match cache.iter().find(|b| &b.uuid == uuid) {
                Some(bundle) => Some((uuid.clone(), labels_for(bundle, &annotator))),
                None => {
                    debug!(%uuid, "not in subset cache, skipping");
                    None
                }
            })
            .collect();

        info!(
            records = pending.len(),
            concurrency = self.submit_concurrency,
            "submitting annotations"
        );

        let results: Vec<SubmissionResult> = stream::iter(pending)
            .map(|(uuid, labels)| async move {
                let outcome = self
                    .http
                    .post::<Value, _>(
                        routes::ANNOTATION_BY_UUID,
                        &[("uuid", uuid.as_str())],
                        &SubmitAnnotationBody { labels },
                    )
                    .await;
                match outcome {
                    Ok(response) => SubmissionResult::Submitted { uuid, response },
                    Err(err) => {
                        let error = SubmissionError::from(err);
                        warn!(%uuid, %error, "annotation submission failed");
                        SubmissionResult::Failed { uuid, error }
                    }
                }
            })
            .buffer_unordered(self.submit_concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|r| !r.is_submitted()).count();
        if failed > 0 {
            warn!(failed, total = results.len(), "some annotations were not submitted");
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{connect, mock_url_check, mock_user};
    use crate::service::ServiceOptions;
    use crate::Credential;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn mock_bundles(server: &MockServer) {
        server.mock(|when, then| {
            when.method(GET).path("/proj/annotations");
            then.status(200).json_body(json!([
                {"uuid": "a", "annotation_list": [
                    {"annotator": "u1", "labels_record": [{"label_name": "s", "label_value": ["pos"]}]},
                    {"annotator": "other", "labels_record": []},
                ]},
                {"uuid": "b", "annotation_list": []},
                {"uuid": "c", "annotation_list": [{"annotator": "other"}]},
            ]));
        });
    }

    fn uuids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_submits_own_labels_and_clears_the_rest() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        mock_user(&server, "proj", "tok", "u1");
        mock_bundles(&server);

        let labeled = server.mock(|when, then| {
            when.method(POST).path("/proj/annotations/a").json_body(json!({
                "access_token": "tok",
                "labels": {"annotator": "u1", "labels_record": [{"label_name": "s", "label_value": ["pos"]}]},
            }));
            then.status(200).json_body(json!({"annotation_uuid": "ann-a"}));
        });
        let clear_b = server.mock(|when, then| {
            when.method(POST)
                .path("/proj/annotations/b")
                .json_body(json!({"access_token": "tok", "labels": {}}));
            then.status(200).json_body(json!({}));
        });
        let clear_c = server.mock(|when, then| {
            when.method(POST)
                .path("/proj/annotations/c")
                .json_body(json!({"access_token": "tok", "labels": {}}));
            then.status(200).json_body(json!({}));
        });

        let service = connect(&server, "proj", "tok").await;
        let mut subset = Subset::new(&service, uuids(&["a", "b", "c"]));
        subset.fetch().await.unwrap();

        let results = service
            .submit_annotations(&subset, &uuids(&["a", "b", "c", "missing"]))
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(SubmissionResult::is_submitted));
        labeled.assert_hits(1);
        clear_b.assert_hits(1);
        clear_c.assert_hits(1);

        let a = results.iter().find(|r| r.uuid() == "a").unwrap();
        assert_eq!(a.annotation_uuid().as_deref(), Some("ann-a"));
        let b = results.iter().find(|r| r.uuid() == "b").unwrap();
        assert_eq!(b.annotation_uuid().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_per_record_failures_become_entries() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        mock_user(&server, "proj", "tok", "u1");
        mock_bundles(&server);
        server.mock(|when, then| {
            when.method(POST).path("/proj/annotations/a");
            then.status(500).body("Annotation not saved.");
        });
        server.mock(|when, then| {
            when.method(POST).path("/proj/annotations/b");
            then.status(200).delay(Duration::from_millis(500)).json_body(json!({}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/proj/annotations/c");
            then.status(200).json_body(json!({}));
        });

        let service = Service::new(ServiceOptions {
            host: Some(server.base_url()),
            project: "proj".to_string(),
            credential: Some(Credential::AccessToken("tok".to_string())),
            request_timeout: Some(Duration::from_millis(100)),
            ..ServiceOptions::default()
        })
        .await
        .unwrap();
        let mut subset = Subset::new(&service, uuids(&["a", "b", "c"]));
        subset.fetch().await.unwrap();

        let results = service
            .submit_annotations(&subset, &uuids(&["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(results.len(), 3);

        let find = |id: &str| results.iter().find(|r| r.uuid() == id).unwrap().clone();
        assert_eq!(
            find("a"),
            SubmissionResult::Failed {
                uuid: "a".to_string(),
                error: SubmissionError::Remote {
                    status: 500,
                    body: "Annotation not saved.".to_string(),
                },
            }
        );
        assert_eq!(
            find("b"),
            SubmissionResult::Failed {
                uuid: "b".to_string(),
                error: SubmissionError::Timeout,
            }
        );
        assert!(find("c").is_submitted());
    }

    #[tokio::test]
    async fn test_unloaded_subset_is_rejected() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        let service = connect(&server, "proj", "tok").await;
        let subset = Subset::new(&service, uuids(&["a"]));
        let err = service
            .submit_annotations(&subset, &uuids(&["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
