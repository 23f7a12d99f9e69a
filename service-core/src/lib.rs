//! service-core: Shared infrastructure for the identity store workspace.
pub mod config;
pub mod error;
pub mod observability;

pub use serde;
pub use tokio;
pub use tracing;
