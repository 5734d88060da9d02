//! Ordered record selections with a local annotation cache.

use std::collections::HashSet;

use serde_json::{Map, Value};

use labeler_core_types::{
    AnnotationBundle, AnnotationQuery, LabelObject, RecordContent, SimilarityQuery,
};

use crate::errors::{CoreError, CoreResult};
use crate::routes;
use crate::service::Service;

/// Default number of neighbours for [`Subset::suggest_similar`].
pub const DEFAULT_SIMILAR_LIMIT: usize = 3;

fn dedup(uuids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    uuids.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

/// A selection of records from one project.
///
/// Uuids are kept in insertion order without duplicates. Annotations are
/// fetched on demand and edited locally until submitted.
#[derive(Debug, Clone)]
pub struct Subset<'a> {
    service: &'a Service,
    uuids: Vec<String>,
    meta_names: Vec<String>,
    job_id: Option<String>,
    annotator_id: Option<String>,
    cache: Option<Vec<AnnotationBundle>>,
}

impl<'a> Subset<'a> {
    pub fn new(service: &'a Service, uuids: Vec<String>) -> Self {
        Self {
            service,
            uuids: dedup(uuids),
            meta_names: Vec::new(),
            job_id: None,
            annotator_id: None,
            cache: None,
        }
    }

    /// Metadata columns to include when fetching annotations.
    pub fn with_meta_names(mut self, meta_names: Vec<String>) -> Self {
        self.meta_names = meta_names;
        self
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_annotator(mut self, annotator_id: impl Into<String>) -> Self {
        self.annotator_id = Some(annotator_id.into());
        self
    }

    pub fn service(&self) -> &'a Service {
        self.service
    }

    pub fn get_uuid_list(&self) -> &[String] {
        &self.uuids
    }

    pub fn meta_names(&self) -> &[String] {
        &self.meta_names
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn annotator_id(&self) -> Option<&str> {
        self.annotator_id.as_deref()
    }

    /// Annotation cache, if it has been loaded.
    pub fn cached(&self) -> Option<&[AnnotationBundle]> {
        self.cache.as_deref()
    }

    /// Load annotations for every uuid, replacing the cache.
    pub async fn fetch(&mut self) -> CoreResult<&[AnnotationBundle]> {
        let bundles: Vec<AnnotationBundle> = self
            .service
            .http
            .get(
                routes::ANNOTATIONS,
                &[],
                &AnnotationQuery {
                    uuid_list: &self.uuids,
                    meta_names: &self.meta_names,
                },
            )
            .await?;
        Ok(self.cache.insert(bundles).as_slice())
    }

    /// Cached annotations, fetching them first if needed.
    pub async fn value(&mut self) -> CoreResult<&[AnnotationBundle]> {
        if self.cache.is_none() {
            self.fetch().await?;
        }
        Ok(self.cache.as_deref().unwrap_or_default())
    }

    pub fn get_annotation_by_uuid(&self, uuid: &str) -> Option<&AnnotationBundle> {
        self.cache.as_ref()?.iter().find(|b| b.uuid == uuid)
    }

    /// Stage the caller's label object for one record.
    ///
    /// The object is stamped with the current annotator and replaces that
    /// annotator's existing entry, or is appended. Records outside the cache
    /// are left untouched. Use an empty map to clear.
    pub async fn set_annotations(
        &mut self,
        uuid: &str,
        labels: Map<String, Value>,
    ) -> CoreResult<LabelObject> {
        if uuid.is_empty() {
            return Err(CoreError::validation("uuid cannot be empty"));
        }
        let annotator = self.service.get_annotator().await?.user_id.clone();
        if self.cache.is_none() {
            self.fetch().await?;
        }

        let mut label = LabelObject::from_fields(labels);
        label.annotator = annotator;

        if let Some(bundle) = self
            .cache
            .as_mut()
            .and_then(|cache| cache.iter_mut().find(|b| b.uuid == uuid))
        {
            match bundle
                .annotation_list
                .iter_mut()
                .find(|existing| existing.annotator == label.annotator)
            {
                Some(existing) => *existing = label.clone(),
                None => bundle.annotation_list.push(label.clone()),
            }
        }
        Ok(label)
    }

    fn same_service(&self, other: &Subset<'_>) -> CoreResult<()> {
        if std::ptr::eq(self.service, other.service) {
            Ok(())
        } else {
            Err(CoreError::validation("subsets belong to different services"))
        }
    }

    fn derive(&self, uuids: Vec<String>) -> Subset<'a> {
        Subset {
            service: self.service,
            uuids,
            meta_names: self.meta_names.clone(),
            job_id: None,
            annotator_id: self.annotator_id.clone(),
            cache: None,
        }
    }

    /// Records in either subset.
    pub fn union(&self, other: &Subset<'_>) -> CoreResult<Subset<'a>> {
        self.same_service(other)?;
        let uuids = dedup(self.uuids.iter().chain(other.uuids.iter()).cloned());
        Ok(self.derive(uuids))
    }

    /// Records in both subsets.
    pub fn intersect(&self, other: &Subset<'_>) -> CoreResult<Subset<'a>> {
        self.same_service(other)?;
        let right: HashSet<&String> = other.uuids.iter().collect();
        let uuids = self.uuids.iter().filter(|u| right.contains(u)).cloned().collect();
        Ok(self.derive(uuids))
    }

    /// Records in this subset but not the other.
    pub fn difference(&self, other: &Subset<'_>) -> CoreResult<Subset<'a>> {
        self.same_service(other)?;
        let right: HashSet<&String> = other.uuids.iter().collect();
        let uuids = self.uuids.iter().filter(|u| !right.contains(u)).cloned().collect();
        Ok(self.derive(uuids))
    }

    /// Reconciliation data for `uuid_list`, or for every cached record.
    pub async fn get_reconciliation_data(
        &mut self,
        uuid_list: Option<&[String]>,
    ) -> CoreResult<Vec<Value>> {
        match uuid_list {
            Some(list) => self.service.get_reconciliation_data(list).await,
            None => {
                let uuids: Vec<String> =
                    self.value().await?.iter().map(|b| b.uuid.clone()).collect();
                self.service.get_reconciliation_data(&uuids).await
            }
        }
    }

    /// Records whose `meta_name` embedding is closest to this subset's.
    pub async fn suggest_similar(
        &self,
        meta_name: &str,
        limit: Option<usize>,
    ) -> CoreResult<Subset<'a>> {
        if meta_name.trim().is_empty() {
            return Err(CoreError::validation("meta_name cannot be empty"));
        }
        let suggested: Vec<String> = self
            .service
            .http
            .get(
                routes::SUGGEST_SIMILAR,
                &[],
                &SimilarityQuery {
                    uuid_list: &self.uuids,
                    meta_name,
                    limit: limit.unwrap_or(DEFAULT_SIMILAR_LIMIT),
                },
            )
            .await?;
        Ok(Subset::new(self.service, suggested))
    }

    /// Raw content of this subset's records.
    pub async fn get_data_content(&self) -> CoreResult<Vec<RecordContent>> {
        self.service.get_data_content(&self.uuids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{connect, mock_url_check, mock_user};
    use httpmock::prelude::*;
    use serde_json::json;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_new_dedups_in_order() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        let service = connect(&server, "proj", "tok").await;
        let subset = Subset::new(&service, ids(&["b", "a", "b", "c", "a"]));
        assert_eq!(subset.get_uuid_list(), ["b", "a", "c"]);
        assert!(subset.cached().is_none());
    }

    #[tokio::test]
    async fn test_set_algebra() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        let service = connect(&server, "proj", "tok").await;
        let left = Subset::new(&service, ids(&["a", "b", "c"]));
        let right = Subset::new(&service, ids(&["c", "d", "a"]));

        assert_eq!(left.union(&right).unwrap().get_uuid_list(), ["a", "b", "c", "d"]);
        assert_eq!(left.intersect(&right).unwrap().get_uuid_list(), ["a", "c"]);
        assert_eq!(left.difference(&right).unwrap().get_uuid_list(), ["b"]);
        assert!(left.union(&right).unwrap().cached().is_none());
        assert_eq!(left.get_uuid_list(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_set_algebra_rejects_other_service() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        let one = connect(&server, "proj", "tok").await;
        let two = connect(&server, "proj", "tok").await;
        let left = Subset::new(&one, ids(&["a"]));
        let right = Subset::new(&two, ids(&["a"]));
        assert!(matches!(left.union(&right), Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_set_annotations_is_idempotent_per_annotator() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        mock_user(&server, "proj", "tok", "u1");
        let fetch = server.mock(|when, then| {
            when.method(GET).path("/proj/annotations").json_body(json!({
                "access_token": "tok",
                "uuid_list": ["a", "b"],
                "meta_names": [],
            }));
            then.status(200).json_body(json!([
                {"uuid": "a", "annotation_list": [{"annotator": "other", "labels_record": []}]},
                {"uuid": "b", "annotation_list": []},
            ]));
        });

        let service = connect(&server, "proj", "tok").await;
        let mut subset = Subset::new(&service, ids(&["a", "b"]));
        let labels = LabelObject::record_label("s", "pos").fields;

        let stamped = subset.set_annotations("a", labels.clone()).await.unwrap();
        assert_eq!(stamped.annotator, "u1");
        subset.set_annotations("a", labels.clone()).await.unwrap();
        subset.set_annotations("missing", labels).await.unwrap();

        let a = subset.get_annotation_by_uuid("a").unwrap();
        assert_eq!(a.annotation_list.len(), 2);
        assert_eq!(a.annotation_list[1].annotator, "u1");
        assert!(subset.get_annotation_by_uuid("b").unwrap().annotation_list.is_empty());
        assert!(subset.get_annotation_by_uuid("missing").is_none());
        fetch.assert_hits(1);
    }

    #[tokio::test]
    async fn test_suggest_similar_dedups() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        server.mock(|when, then| {
            when.method(GET).path("/proj/annotations/suggest_similar").json_body(json!({
                "access_token": "tok",
                "uuid_list": ["a"],
                "meta_name": "emb",
                "limit": 3,
            }));
            then.status(200).json_body(json!(["x", "y", "x"]));
        });

        let service = connect(&server, "proj", "tok").await;
        let subset = Subset::new(&service, ids(&["a"]));
        let similar = subset.suggest_similar("emb", None).await.unwrap();
        assert_eq!(similar.get_uuid_list(), ["x", "y"]);
    }

    #[tokio::test]
    async fn test_reconciliation_defaults_to_cached_uuids() {
        let server = MockServer::start();
        mock_url_check(&server, "proj");
        server.mock(|when, then| {
            when.method(GET).path("/proj/annotations");
            then.status(200).json_body(json!([{"uuid": "a"}, {"uuid": "b"}]));
        });
        let recon = server.mock(|when, then| {
            when.method(GET)
                .path("/proj/reconciliations")
                .json_body(json!({"access_token": "tok", "uuid_list": ["a", "b"]}));
            then.status(200).json_body(json!([{"uuid": "a"}, {"uuid": "b"}]));
        });

        let service = connect(&server, "proj", "tok").await;
        let mut subset = Subset::new(&service, ids(&["a", "b"]));
        let out = subset.get_reconciliation_data(None).await.unwrap();
        assert_eq!(out.len(), 2);
        recon.assert_hits(1);
    }
}
