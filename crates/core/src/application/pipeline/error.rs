// Pipeline Error Taxonomy

use thiserror::Error;

/// Every pipeline stage failure is classified at the collaboration
/// boundary where it happens. The worker maps this sum back out at the
/// queue: transient re-enters with backoff, permanent is discarded.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),
}

impl PipelineError {
    pub fn transient(context: &str, cause: impl std::fmt::Display) -> Self {
        PipelineError::Transient(format!("{context}: {cause}"))
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        PipelineError::Permanent(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Transient(_))
    }
}
