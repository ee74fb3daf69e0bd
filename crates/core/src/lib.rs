// Tagsmith Core - Domain Logic & Ports
// No infrastructure dependencies; adapters live in the infra crates.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Source label attached to every tag this service writes to the catalog.
/// The repository diff only reconciles existing tags carrying this source
/// (or no source at all).
pub const TAG_SOURCE: &str = "tagging-service";
