//! Ambient plumbing shared by the queue worker and the admin tool.

pub mod health;
pub mod serde;
pub mod tracing;
