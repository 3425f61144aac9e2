//! service-core: Shared infrastructure for farm-ops backend services.
pub mod config;
pub mod error;
pub mod observability;

pub use async_trait;
pub use axum;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use validator;
