// Catalog & File-Explorer Views of a Repository

use serde::{Deserialize, Serialize};

/// Repository metadata as served by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub id: String,
    pub name: Option<String>,
    pub repo_url: Option<String>,
    pub default_branch: Option<String>,
    pub readme: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<RepositoryTag>,
}

impl RepositoryMetadata {
    /// Display name for prompts; falls back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// An existing catalog tag, with the source that wrote it (absent for
/// tags predating source tracking).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryTag {
    pub key: String,
    pub value: String,
    pub source: Option<String>,
}

/// One entry of the catalog's paged repository listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub id: Option<String>,
    pub ingest_status: Option<String>,
}

/// One file-explorer search hit for a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSearchHit {
    pub path: String,
    pub score: Option<f64>,
    pub preview: Option<String>,
}
