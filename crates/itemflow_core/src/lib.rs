//! Core of itemflow: message-driven item ingestion and cursor-paginated
//! item queries.
//! Business invariants (item identity, idempotent ingestion, page windows)
//! live here; binaries only wire configuration and transports.

pub mod config;
pub mod consumer;
pub mod db;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod pagination;
pub mod repo;
pub mod service;

pub use config::{AppConfig, ConfigError, ConsumeConfig, DatabaseConfig, LoggingConfig};
pub use consumer::{
    Consumer, ConsumerError, Delivery, InMemoryQueue, MessageSource, QueueCounts, ShutdownHandle,
};
pub use db::{open_pool, open_pool_in_memory, ConnectionPool, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use messaging::envelope::{Envelope, EnvelopeError, Message, MessageType, Metadata};
pub use messaging::publisher::{ItemPublisher, MessageSink, PublishError};
pub use model::item::{derive_item_id, Item, ItemCore, ItemId, ItemValidationError};
pub use pagination::{paginate, Connection, Edge, PageArgs, PageError, PageInfo};
pub use repo::item_repo::{ItemRepository, RepoError, RepoResult, SqliteItemRepository};
pub use service::processor::{ItemProcessor, MessageProcessor, ProcessingError};
pub use service::query::{ItemQueryService, ItemsPage, ItemsQuery, QueryError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
