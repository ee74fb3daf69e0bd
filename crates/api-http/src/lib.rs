// HTTP Read API - thin views over the audit store and queue

mod routes;

pub use routes::{router, ApiState};
