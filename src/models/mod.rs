//! Request and Response models
//!
//! Defines the intercepted request/response shapes the engine operates on,
//! and the DTOs serialized by the admin endpoints.

pub mod admin;
pub mod request;
pub mod response;

// Re-export commonly used types
pub use admin::{DeletePartitionResponse, HealthResponse, PartitionsResponse, StatsResponse};
pub use request::Request;
pub use response::{HeaderList, Response, ResponseSource};
