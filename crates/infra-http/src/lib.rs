// HTTP Infrastructure - collaborator clients

mod catalog;
mod file_explorer;
mod model;
mod webhook;

pub use catalog::HttpCatalogClient;
pub use file_explorer::HttpFileExplorerClient;
pub use model::HttpModelClient;
pub use webhook::HttpWebhookSink;

use std::time::Duration;

/// Total budget for any single collaborator call.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}
