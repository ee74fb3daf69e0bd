// Repository Checkout Port (Interface)

use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Maintains local checkouts under the workspace root, keyed by
/// repository id. Fresh repositories are shallow-cloned; existing ones
/// are fetched and reset to the remote branch.
#[async_trait]
pub trait CheckoutManager: Send + Sync {
    async fn ensure_checkout(
        &self,
        repository_id: &str,
        repo_url: &str,
        default_branch: Option<&str>,
    ) -> Result<PathBuf>;
}
