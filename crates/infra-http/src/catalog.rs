// Catalog HTTP Client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tagsmith_core::domain::{
    RepositoryMetadata, RepositorySummary, RepositoryTag, TagPayload, TagRef,
};
use tagsmith_core::error::{AppError, Result};
use tagsmith_core::port::CatalogClient;
use tagsmith_core::TAG_SOURCE;
use tracing::debug;

pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: crate::build_client(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn get_repository(&self, repository_id: &str) -> Result<RepositoryMetadata> {
        let url = self.url(&format!("/apps/{repository_id}"));
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| AppError::Http(format!("catalog GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Http(format!(
                "catalog GET {url} returned {status}"
            )));
        }

        let wire: RepositoryMetadataWire = response
            .json()
            .await
            .map_err(|e| AppError::Http(format!("catalog GET {url} body: {e}")))?;
        Ok(wire.into_metadata())
    }

    async fn apply_tags(
        &self,
        repository_id: &str,
        tags: &[TagPayload],
        remove: &[TagRef],
    ) -> Result<()> {
        let url = self.url(&format!("/apps/{repository_id}/tags"));
        let body = json!({
            "tags": tags
                .iter()
                .map(|t| {
                    let mut tag = json!({
                        "key": t.key,
                        "value": t.value,
                        "source": TAG_SOURCE,
                    });
                    if let Some(confidence) = t.confidence {
                        tag["confidence"] = json!(confidence);
                    }
                    tag
                })
                .collect::<Vec<_>>(),
            "remove": remove,
        });

        debug!(
            repository_id = %repository_id,
            apply = tags.len(),
            remove = remove.len(),
            "Posting repository tag batch"
        );

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Http(format!("catalog POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Http(format!(
                "catalog POST {url} returned {status}"
            )));
        }
        Ok(())
    }

    async fn list_repositories(&self, page: i64, per_page: i64) -> Result<Vec<RepositorySummary>> {
        let url = self.url(&format!("/apps?page={page}&perPage={per_page}"));
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| AppError::Http(format!("catalog GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Http(format!(
                "catalog GET {url} returned {status}"
            )));
        }

        let wire: Vec<RepositorySummaryWire> = response
            .json()
            .await
            .map_err(|e| AppError::Http(format!("catalog GET {url} body: {e}")))?;
        Ok(wire.into_iter().map(RepositorySummaryWire::into_summary).collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryMetadataWire {
    id: String,
    name: Option<String>,
    repo_url: Option<String>,
    /// Older catalog versions served the clone URL under this name.
    repository_url: Option<String>,
    default_branch: Option<String>,
    readme: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tags: Vec<RepositoryTagWire>,
}

#[derive(Debug, Deserialize)]
struct RepositoryTagWire {
    key: String,
    value: String,
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositorySummaryWire {
    id: Option<String>,
    ingest_status: Option<String>,
}

impl RepositoryMetadataWire {
    fn into_metadata(self) -> RepositoryMetadata {
        RepositoryMetadata {
            id: self.id,
            name: self.name,
            repo_url: self.repo_url.or(self.repository_url),
            default_branch: self.default_branch,
            readme: self.readme,
            description: self.description,
            tags: self
                .tags
                .into_iter()
                .map(|t| RepositoryTag {
                    key: t.key,
                    value: t.value,
                    source: t.source,
                })
                .collect(),
        }
    }
}

impl RepositorySummaryWire {
    fn into_summary(self) -> RepositorySummary {
        RepositorySummary {
            id: self.id,
            ingest_status: self.ingest_status,
        }
    }
}
