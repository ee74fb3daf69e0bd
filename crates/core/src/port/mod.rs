// Port Layer - Interfaces for external dependencies

pub mod audit_store;
pub mod catalog;
pub mod checkout;
pub mod event_bus;
pub mod file_explorer;
pub mod job_queue;
pub mod model;
pub mod time_provider;

pub use audit_store::AuditStore;
pub use catalog::CatalogClient;
pub use checkout::CheckoutManager;
pub use event_bus::{EventPublisher, OutboundEvent, WebhookSink};
pub use file_explorer::FileExplorerClient;
pub use job_queue::{EnqueueOutcome, JobQueue, QueueCounts, RetryOutcome};
pub use model::{ChatCompletion, ChatUsage, ModelClient};
pub use time_provider::TimeProvider;
