//! API Module
//!
//! HTTP host adapter: turns incoming HTTP requests into intercepted
//! requests for the worker, and exposes admin endpoints.
//!
//! # Endpoints
//! - `GET /__sw/health` - Health check endpoint
//! - `GET /__sw/stats` - Get cache statistics
//! - `GET /__sw/partitions` - List cache partitions
//! - `DELETE /__sw/partitions/:name` - Delete a partition
//! - fallback - Intercept and serve through the routing table

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
