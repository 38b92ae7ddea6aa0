//! Producer-side publishing of item messages.
//!
//! # Responsibility
//! - Build new-item envelopes with caller trace metadata.
//! - Hand encoded bytes to a transport-specific `MessageSink`.
//!
//! # Invariants
//! - Items are validated before publishing; invalid cores never reach a sink.

use super::envelope::{encode, EnvelopeError, Message, Metadata};
use crate::model::item::{ItemCore, ItemId, ItemValidationError};
use log::debug;
use thiserror::Error;

/// Transport seam for outgoing messages.
pub trait MessageSink: Send + Sync {
    fn publish(&self, payload: Vec<u8>) -> Result<(), PublishError>;
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("refusing to publish invalid item: {0}")]
    Validation(#[from] ItemValidationError),
    #[error(transparent)]
    Encode(#[from] EnvelopeError),
    #[error("message sink rejected payload: {0}")]
    Sink(String),
}

/// Publishes item messages to a sink.
pub struct ItemPublisher<S: MessageSink> {
    sink: S,
}

impl<S: MessageSink> ItemPublisher<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Validates and publishes a new item, returning the identity it will
    /// be stored under.
    pub fn publish_new_item(
        &self,
        core: ItemCore,
        trace: &Metadata,
    ) -> Result<ItemId, PublishError> {
        core.validate()?;
        let item_id = core.item_id();
        let payload = encode(&Message::NewItem(core), trace)?;
        self.sink.publish(payload)?;
        debug!(
            "event=item_published module=publisher status=ok item_id={}",
            item_id
        );
        Ok(item_id)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
