pub mod admin;
pub mod digest;
pub mod lease;
pub mod orchestrator;
