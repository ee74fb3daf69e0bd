// Redis Infrastructure - job queue & event bus adapters

mod bus;
mod queue;

pub use bus::{RedisEventBus, RedisEventSubscriber};
pub use queue::RedisJobQueue;
