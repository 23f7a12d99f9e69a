//! Identity Store - transactional data access for users, identities and
//! namespace memberships.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use error::StoreError;
pub use services::database::{Database, PgDatabase, PgTransaction, Transaction};
pub use services::queries::{Queries, RowAccess};
pub use services::store::Store;

use crate::config::StoreConfig;
use service_core::error::AppError;

/// Install tracing (with OTLP export when configured) and register metrics.
/// Call once per process, before building a [`Store`].
pub fn init(config: &StoreConfig) -> Result<(), AppError> {
    service_core::observability::init_tracing(
        &config.service_name,
        &config.common.log_level,
        config.otlp_endpoint.as_deref(),
    )?;
    services::metrics::init_metrics();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        otlp = config.otlp_endpoint.is_some(),
        "Identity store initialized"
    );

    Ok(())
}
