pub mod database;
pub mod metrics;
pub mod queries;
pub mod store;
