// File Explorer Port (Interface)

use crate::domain::{FileSearchHit, TagPayload};
use crate::error::Result;
use async_trait::async_trait;

/// File-explorer service: ranked file search per repository and per-file
/// tag writes.
#[async_trait]
pub trait FileExplorerClient: Send + Sync {
    async fn search_files(&self, repository_id: &str, limit: usize) -> Result<Vec<FileSearchHit>>;

    async fn apply_file_tags(
        &self,
        repository_id: &str,
        path: &str,
        tags: &[TagPayload],
    ) -> Result<()>;

    async fn remove_file_tags(
        &self,
        repository_id: &str,
        path: &str,
        tags: &[TagPayload],
    ) -> Result<()>;
}
