//! Reconciliation and verification endpoints.
//!
//! Reconciliation reads are batched: the service takes the uuid list with a
//! GET, so long lists are split to keep request URLs bounded. Writes go one
//! record at a time and report non-success answers inline.

use serde_json::{json, Value};
use tracing::{debug, warn};

use labeler_core_types::{
    ReconciliationBody, ReconciliationEntry, UuidListBody, VerificationBody, VerificationEntry,
};

use crate::config::RECONCILIATION_BATCH_SIZE;
use crate::errors::{CoreError, CoreResult};
use crate::http::HttpError;
use crate::routes;
use crate::service::Service;

/// Annotator name the service records reconciled labels under.
pub const RECONCILIATION_ANNOTATOR: &str = "reconciliation";

/// Turn a non-success answer into an inline `{uuid, error}` entry.
fn inline_error(uuid: &str, result: Result<Value, HttpError>) -> CoreResult<Value> {
    match result {
        Ok(value) => Ok(value),
        Err(HttpError::Response(detail)) => {
            warn!(%uuid, status = detail.status, "write rejected");
            Ok(json!({ "uuid": uuid, "error": detail.body }))
        }
        Err(other) => Err(other.into()),
    }
}

impl Service {
    /// Reconciliation data for `uuid_list`, in input order.
    ///
    /// Sends one request per batch of 45 uuids, sequentially. The first
    /// failing batch aborts the call; no partial results are returned.
    pub async fn get_reconciliation_data(&self, uuid_list: &[String]) -> CoreResult<Vec<Value>> {
        let mut out = Vec::with_capacity(uuid_list.len());
        for (i, chunk) in uuid_list.chunks(RECONCILIATION_BATCH_SIZE).enumerate() {
            let part: Vec<Value> = self
                .http
                .get(routes::RECONCILIATIONS, &[], &UuidListBody { uuid_list: chunk })
                .await?;
            debug!(
                batch = i,
                requested = chunk.len(),
                received = part.len(),
                "reconciliation batch"
            );
            out.extend(part);
        }
        Ok(out)
    }

    /// Post verification labels, one record at a time.
    pub async fn set_verification_data(
        &self,
        entries: &[VerificationEntry],
    ) -> CoreResult<Vec<Value>> {
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let first = entry.labels.first().ok_or_else(|| {
                CoreError::validation(format!("verification entry {} has no labels", entry.uuid))
            })?;
            let body = VerificationBody {
                uuid: &entry.uuid,
                labels: &entry.labels,
                label_level: first.get("label_level").cloned().unwrap_or(Value::Null),
                label_name: first.get("label_name").cloned().unwrap_or(Value::Null),
                annotator_id: &entry.annotator_id,
            };
            let result = self
                .http
                .post(routes::VERIFICATION_LABELS, &[("uuid", entry.uuid.as_str())], &body)
                .await;
            out.push(inline_error(&entry.uuid, result)?);
        }
        Ok(out)
    }

    /// Post reconciled labels, one record at a time.
    pub async fn set_reconciliation_data(
        &self,
        entries: &[ReconciliationEntry],
    ) -> CoreResult<Vec<Value>> {
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let body = ReconciliationBody {
                uuid: &entry.uuid,
                labels: &entry.labels,
                annotator: RECONCILIATION_ANNOTATOR,
            };
            let result = self
                .http
                .post(routes::ANNOTATION_LABELS, &[("uuid", entry.uuid.as_str())], &body)
                .await;
            out.push(inline_error(&entry.uuid, result)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{connect, mock_url_check};
    use httpmock::prelude::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("r{i}")).collect()
    }

    #[tokio::test]
    async fn test_reconciliation_batches_of_45_in_order() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        let all = ids(100);

        let mut mocks = Vec::new();
        for chunk in all.chunks(45) {
            let reply: Vec<Value> = chunk.iter().map(|u| json!({"uuid": u})).collect();
            let chunk = chunk.to_vec();
            mocks.push(server.mock(move |when, then| {
                when.method(GET)
                    .path("/proj/reconciliations")
                    .json_body(json!({"access_token": "tok", "uuid_list": chunk}));
                then.status(200).json_body(json!(reply));
            }));
        }

        let service = connect(&server, "proj", "tok").await;
        let out = service.get_reconciliation_data(&all).await.unwrap();
        assert_eq!(mocks.len(), 3);
        for m in &mocks {
            m.assert_hits(1);
        }
        let seen: Vec<&str> = out.iter().map(|v| v["uuid"].as_str().unwrap()).collect();
        assert_eq!(seen, all.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_reconciliation_empty_makes_no_call() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        let m = server.mock(|when, then| {
            when.method(GET).path("/proj/reconciliations");
            then.status(200).json_body(json!([]));
        });
        let service = connect(&server, "proj", "tok").await;
        assert!(service.get_reconciliation_data(&[]).await.unwrap().is_empty());
        m.assert_hits(0);
    }

    #[tokio::test]
    async fn test_reconciliation_failure_aborts() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        server.mock(|when, then| {
            when.method(GET).path("/proj/reconciliations");
            then.status(400).body("uuid_list too long");
        });
        let service = connect(&server, "proj", "tok").await;
        let err = service.get_reconciliation_data(&ids(50)).await.unwrap_err();
        assert_eq!(err.to_string(), "uuid_list too long");
    }

    #[tokio::test]
    async fn test_set_reconciliation_reports_errors_inline() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        server.mock(|when, then| {
            when.method(POST).path("/proj/annotations/a/labels").json_body(json!({
                "access_token": "tok",
                "uuid": "a",
                "labels": {"labels_record": []},
                "annotator": "reconciliation",
            }));
            then.status(200).json_body(json!({"uuid": "a", "ok": true}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/proj/annotations/b/labels");
            then.status(404).body("Data not found.");
        });

        let service = connect(&server, "proj", "tok").await;
        let out = service
            .set_reconciliation_data(&[
                ReconciliationEntry {
                    uuid: "a".to_string(),
                    labels: json!({"labels_record": []}),
                },
                ReconciliationEntry {
                    uuid: "b".to_string(),
                    labels: json!({}),
                },
            ])
            .await
            .unwrap();
        assert_eq!(out[0], json!({"uuid": "a", "ok": true}));
        assert_eq!(out[1], json!({"uuid": "b", "error": "Data not found."}));
    }

    #[tokio::test]
    async fn test_set_verification_lifts_label_fields() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        let m = server.mock(|when, then| {
            when.method(POST).path("/proj/verifications/a/labels").json_body(json!({
                "access_token": "tok",
                "uuid": "a",
                "labels": [{"label_level": "record", "label_name": "s", "label_value": ["pos"]}],
                "label_level": "record",
                "label_name": "s",
                "annotator_id": "u2",
            }));
            then.status(200).json_body(json!({"verified": true}));
        });

        let service = connect(&server, "proj", "tok").await;
        let out = service
            .set_verification_data(&[VerificationEntry {
                uuid: "a".to_string(),
                annotator_id: "u2".to_string(),
                labels: vec![json!({
                    "label_level": "record",
                    "label_name": "s",
                    "label_value": ["pos"],
                })],
            }])
            .await
            .unwrap();
        assert_eq!(out, vec![json!({"verified": true})]);
        m.assert_hits(1);

        let err = service
            .set_verification_data(&[VerificationEntry {
                uuid: "b".to_string(),
                annotator_id: "u2".to_string(),
                labels: vec![],
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
