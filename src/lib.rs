//! Offline Cache - a request-interception caching engine
//!
//! Intercepts outbound requests, routes them to a caching strategy
//! (cache-first, network-first, stale-while-revalidate, network-only,
//! cache-only) and keeps cached responses fresh and bounded.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod network;
pub mod replay;
pub mod router;
pub mod strategy;
pub mod tasks;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::{EngineError, Result};
pub use lifecycle::{LifecycleState, ServiceWorker};
pub use tasks::{spawn_eviction_task, spawn_replay_task};
