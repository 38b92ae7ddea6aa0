//! Ingestion processor for queued item messages.
//!
//! # Responsibility
//! - Decode envelopes and dispatch on their type.
//! - Derive the deterministic item identity and persist each item once.
//! - Classify failures as retryable or permanent for the consumer.
//!
//! # Invariants
//! - Holds no mutable shared state; one instance serves every worker.
//! - Processing the same `ItemCore` twice stores one row; the second call
//!   reports `ProcessingError::Duplicate`.
//! - Only transient repository failures are retryable.

use crate::messaging::envelope::{self, Envelope, EnvelopeError, Message, Metadata};
use crate::model::item::{Item, ItemCore, ItemId, ItemValidationError};
use crate::repo::item_repo::{ItemRepository, RepoError};
use log::{debug, info};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("invalid item: {0}")]
    Validation(#[from] ItemValidationError),
    #[error("item {0} was already ingested")]
    Duplicate(ItemId),
    #[error("repository failure: {0}")]
    Repository(#[source] RepoError),
}

impl ProcessingError {
    /// Whether redelivering the same bytes may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repository(err) => err.is_transient(),
            Self::Envelope(_) | Self::Validation(_) | Self::Duplicate(_) => false,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    /// Short stable label for log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Envelope(EnvelopeError::EnvelopeDecode(_)) => "envelope_decode",
            Self::Envelope(EnvelopeError::UnknownMessageType(_)) => "unknown_message_type",
            Self::Envelope(EnvelopeError::BodyDecode { .. }) => "body_decode",
            Self::Envelope(EnvelopeError::Encode { .. }) => "encode",
            Self::Validation(_) => "validation",
            Self::Duplicate(_) => "duplicate",
            Self::Repository(_) => "repository",
        }
    }
}

impl From<RepoError> for ProcessingError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Duplicate(id) => Self::Duplicate(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repository(other),
        }
    }
}

/// Seam between the consumer and whatever handles raw message bytes.
pub trait MessageProcessor: Send + Sync {
    fn handle(&self, body: &[u8]) -> Result<(), ProcessingError>;
}

/// Turns raw queue payloads into persisted items.
pub struct ItemProcessor<R: ItemRepository> {
    repo: R,
}

impl<R: ItemRepository> ItemProcessor<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Decodes `raw` and ingests the message it carries.
    ///
    /// # Errors
    /// - `Envelope` / `Validation`: permanent, the bytes will never succeed.
    /// - `Duplicate`: the item is already stored.
    /// - `Repository`: storage failure, retryable when transient.
    pub fn process(&self, raw: &[u8]) -> Result<ItemId, ProcessingError> {
        let envelope = envelope::decode(raw)?;
        self.process_envelope(envelope)
    }

    pub fn process_envelope(&self, envelope: Envelope) -> Result<ItemId, ProcessingError> {
        let message_type = envelope.message_type();
        log_metadata(message_type.as_str(), &envelope.metadata);
        match envelope.message {
            Message::NewItem(core) => self.ingest(core),
        }
    }

    /// Validates, deduplicates and stores one item.
    pub fn ingest(&self, core: ItemCore) -> Result<ItemId, ProcessingError> {
        let item = Item::try_new(core)?;

        if self.repo.exists(item.uuid)? {
            return Err(ProcessingError::Duplicate(item.uuid));
        }
        // A concurrent delivery may win between the check and the insert;
        // the primary key reports that as `Duplicate` too.
        self.repo.create(&item)?;

        info!(
            "event=item_ingested module=processor status=ok item_id={} publication_id={}",
            item.uuid,
            item.publication_uuid()
        );
        Ok(item.uuid)
    }
}

impl<R: ItemRepository> MessageProcessor for ItemProcessor<R> {
    fn handle(&self, body: &[u8]) -> Result<(), ProcessingError> {
        self.process(body).map(|_| ())
    }
}

fn log_metadata(message_type: &str, metadata: &Metadata) {
    if metadata.is_empty() {
        return;
    }
    let pairs = metadata
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",");
    debug!(
        "event=message_metadata module=processor message_type={} metadata={}",
        message_type,
        crate::logging::sanitize_message(&pairs, 256)
    );
}

#[cfg(test)]
mod tests {
    use super::ProcessingError;
    use crate::db::DbError;
    use crate::messaging::envelope::EnvelopeError;
    use crate::repo::item_repo::RepoError;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn only_transient_repository_errors_are_retryable() {
        let transient: ProcessingError =
            RepoError::Db(DbError::PoolTimeout(Duration::from_secs(1))).into();
        assert!(transient.is_retryable());
        assert_eq!(transient.kind(), "repository");

        let corrupt: ProcessingError = RepoError::InvalidData("bad row".to_string()).into();
        assert!(!corrupt.is_retryable());

        let unknown = ProcessingError::Envelope(EnvelopeError::UnknownMessageType(9));
        assert!(!unknown.is_retryable());
        assert_eq!(unknown.kind(), "unknown_message_type");
    }

    #[test]
    fn repository_duplicate_becomes_processing_duplicate() {
        let id = Uuid::new_v4();
        let err: ProcessingError = RepoError::Duplicate(id).into();
        assert!(matches!(err, ProcessingError::Duplicate(found) if found == id));
        assert!(err.is_duplicate());
        assert!(!err.is_retryable());
    }
}
