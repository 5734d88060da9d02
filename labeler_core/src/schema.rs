//! Label schema accessor.

use serde_json::Value;

use labeler_core_types::{LabelSchemaEntry, SchemaQuery, SchemaUpdate};

use crate::errors::{CoreError, CoreResult};
use crate::routes;
use crate::service::Service;

/// Label schemas of one project.
#[derive(Debug, Clone, Copy)]
pub struct Schema<'a> {
    service: &'a Service,
}

impl<'a> Schema<'a> {
    pub(crate) fn new(service: &'a Service) -> Self {
        Self { service }
    }

    /// Schema documents; `active` filters current vs. historical ones.
    pub async fn value(&self, active: Option<bool>) -> CoreResult<Vec<Value>> {
        Ok(self
            .service
            .http
            .get(routes::SCHEMAS, &[], &SchemaQuery { active })
            .await?)
    }

    pub async fn get_active_schemas(&self) -> CoreResult<Vec<Value>> {
        self.value(Some(true)).await
    }

    pub async fn get_history(&self) -> CoreResult<Vec<Value>> {
        self.value(Some(false)).await
    }

    /// Replace the active schema.
    pub async fn set_schemas(&self, schemas: &Value) -> CoreResult<Value> {
        Ok(self
            .service
            .http
            .post(routes::SCHEMAS, &[], &SchemaUpdate { schemas })
            .await?)
    }

    /// `schemas.label_schema` of the first active schema.
    pub async fn active_label_schema(&self) -> CoreResult<Vec<LabelSchemaEntry>> {
        let active = self.get_active_schemas().await?;
        let label_schema = active
            .first()
            .and_then(|s| s.get("schemas"))
            .and_then(|s| s.get("label_schema"))
            .cloned()
            .ok_or_else(|| CoreError::config("no active label schema found"))?;
        serde_json::from_value(label_schema)
            .map_err(|e| CoreError::Protocol(format!("malformed label schema: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{connect, mock_url_check};
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_active_label_schema() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        server.mock(|when, then| {
            when.method(GET)
                .path("/proj/schemas")
                .json_body(json!({"access_token": "tok", "active": true}));
            then.status(200).json_body(json!([{
                "schemas": {"label_schema": [{
                    "name": "sentiment",
                    "level": "record",
                    "options": [
                        {"value": "pos", "text": "positive"},
                        {"value": "neg", "text": "negative"},
                    ],
                }]},
            }]));
        });

        let service = connect(&server, "proj", "tok").await;
        let schema = service.get_schemas().active_label_schema().await.unwrap();
        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0].name, "sentiment");
        assert_eq!(schema[0].options[1].value, "neg");
    }

    #[tokio::test]
    async fn test_missing_active_schema_is_configuration_error() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        server.mock(|when, then| {
            when.method(GET).path("/proj/schemas");
            then.status(200).json_body(json!([]));
        });
        let service = connect(&server, "proj", "tok").await;
        let err = service.get_schemas().active_label_schema().await.unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }
}
