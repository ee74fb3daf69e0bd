// Catalog Port (Interface)

use crate::domain::{RepositoryMetadata, RepositorySummary, TagPayload, TagRef};
use crate::error::Result;
use async_trait::async_trait;

/// The repository catalog: metadata reads, paged listing, and the tag
/// write endpoint (additions and removals in one batch).
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn get_repository(&self, repository_id: &str) -> Result<RepositoryMetadata>;

    /// Apply the tag batch. Additions carry this service's source label
    /// and confidences; removals are bare `(key, value)` references.
    async fn apply_tags(
        &self,
        repository_id: &str,
        tags: &[TagPayload],
        remove: &[TagRef],
    ) -> Result<()>;

    async fn list_repositories(&self, page: i64, per_page: i64) -> Result<Vec<RepositorySummary>>;
}
