// File Explorer HTTP Client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tagsmith_core::domain::{FileSearchHit, TagPayload};
use tagsmith_core::error::{AppError, Result};
use tagsmith_core::port::FileExplorerClient;

pub struct HttpFileExplorerClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpFileExplorerClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: crate::build_client(),
            base_url: base_url.into(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_tags(
        &self,
        method: reqwest::Method,
        repository_id: &str,
        path: &str,
        tags: &[TagPayload],
    ) -> Result<()> {
        let url = self.url("/api/tags");
        let body = json!({
            "repositoryId": repository_id,
            "path": path,
            "tags": tags,
        });

        let response = self
            .authorize(self.client.request(method.clone(), &url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Http(format!("file explorer {method} {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Http(format!(
                "file explorer {method} {url} returned {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FileExplorerClient for HttpFileExplorerClient {
    async fn search_files(&self, repository_id: &str, limit: usize) -> Result<Vec<FileSearchHit>> {
        let url = self.url(&format!(
            "/api/search?repositoryId={repository_id}&limit={limit}"
        ));
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| AppError::Http(format!("file explorer GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Http(format!(
                "file explorer GET {url} returned {status}"
            )));
        }

        let hits: Vec<FileSearchHitWire> = response
            .json()
            .await
            .map_err(|e| AppError::Http(format!("file explorer GET {url} body: {e}")))?;
        Ok(hits.into_iter().map(FileSearchHitWire::into_hit).collect())
    }

    async fn apply_file_tags(
        &self,
        repository_id: &str,
        path: &str,
        tags: &[TagPayload],
    ) -> Result<()> {
        self.send_tags(reqwest::Method::POST, repository_id, path, tags)
            .await
    }

    async fn remove_file_tags(
        &self,
        repository_id: &str,
        path: &str,
        tags: &[TagPayload],
    ) -> Result<()> {
        self.send_tags(reqwest::Method::DELETE, repository_id, path, tags)
            .await
    }
}

#[derive(Debug, Deserialize)]
struct FileSearchHitWire {
    path: String,
    score: Option<f64>,
    preview: Option<String>,
}

impl FileSearchHitWire {
    fn into_hit(self) -> FileSearchHit {
        FileSearchHit {
            path: self.path,
            score: self.score,
            preview: self.preview,
        }
    }
}
