//! Project statistics accessor.

use serde_json::Value;

use labeler_core_types::LabelNameQuery;

use crate::errors::{CoreError, CoreResult};
use crate::http::NoBody;
use crate::routes;
use crate::service::Service;

fn require(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::validation(format!("'{}' cannot be empty", field)));
    }
    Ok(())
}

/// Progress, distribution and agreement statistics of one project.
#[derive(Debug, Clone, Copy)]
pub struct Statistic<'a> {
    service: &'a Service,
}

impl<'a> Statistic<'a> {
    pub(crate) fn new(service: &'a Service) -> Self {
        Self { service }
    }

    /// Totals of annotated and unannotated records.
    pub async fn get_label_progress(&self) -> CoreResult<Value> {
        Ok(self
            .service
            .http
            .get(routes::LABEL_PROGRESS, &[], &NoBody {})
            .await?)
    }

    pub async fn get_label_distributions(&self, label_name: &str) -> CoreResult<Value> {
        require("label_name", label_name)?;
        Ok(self
            .service
            .http
            .get(routes::LABEL_DISTRIBUTIONS, &[], &LabelNameQuery { label_name })
            .await?)
    }

    pub async fn get_annotator_contributions(&self) -> CoreResult<Value> {
        Ok(self
            .service
            .http
            .get(routes::ANNOTATOR_CONTRIBUTIONS, &[], &NoBody {})
            .await?)
    }

    pub async fn get_annotator_agreements(&self, label_name: &str) -> CoreResult<Value> {
        require("label_name", label_name)?;
        Ok(self
            .service
            .http
            .get(routes::ANNOTATOR_AGREEMENTS, &[], &LabelNameQuery { label_name })
            .await?)
    }

    /// Two-dimensional embeddings of labeled records.
    pub async fn get_embeddings(&self, label_name: &str, embed_type: &str) -> CoreResult<Value> {
        require("label_name", label_name)?;
        require("embed_type", embed_type)?;
        Ok(self
            .service
            .http
            .get(
                routes::EMBEDDINGS,
                &[("embed_type", embed_type)],
                &LabelNameQuery { label_name },
            )
            .await?)
    }
}
