//! Durable persistence for completed summaries.

pub mod connection;
pub mod summary_repo;

pub use connection::DatabaseConnection;
pub use summary_repo::SqliteSummaryStore;
