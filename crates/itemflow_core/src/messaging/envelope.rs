//! Message envelope wire codec.
//!
//! # Responsibility
//! - Decode queue payloads in two phases: the outer envelope first, with the
//!   body kept as raw JSON, then the body according to the decoded type.
//! - Encode typed messages together with trace-propagation metadata.
//!
//! # Invariants
//! - The type tag is validated before the body is interpreted.
//! - Every decode failure is permanent; re-reading the same bytes fails the
//!   same way.
//! - Metadata pairs are carried verbatim in both directions.
//!
//! Wire shape: `{"type": <int>, "metadata": {<str>: <str>}, "msg": {...}}`.

use crate::model::item::ItemCore;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Trace-propagation key/value pairs carried next to the payload.
pub type Metadata = BTreeMap<String, String>;

/// Known envelope type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    NewItem,
}

impl MessageType {
    /// Integer tag used on the wire.
    pub fn code(self) -> i64 {
        match self {
            Self::NewItem => 0,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::NewItem),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewItem => "new_item",
        }
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded message body, one variant per `MessageType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    NewItem(ItemCore),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::NewItem(_) => MessageType::NewItem,
        }
    }
}

/// Fully decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub metadata: Metadata,
    pub message: Message,
}

impl Envelope {
    pub fn new(message: Message) -> Self {
        Self {
            metadata: Metadata::new(),
            message,
        }
    }

    pub fn with_metadata(message: Message, metadata: Metadata) -> Self {
        Self { metadata, message }
    }

    pub fn message_type(&self) -> MessageType {
        self.message.message_type()
    }

    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        encode(&self.message, &self.metadata)
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed message envelope: {0}")]
    EnvelopeDecode(#[source] serde_json::Error),
    #[error("unknown message type {0}")]
    UnknownMessageType(i64),
    #[error("malformed {message_type} message body: {source}")]
    BodyDecode {
        message_type: MessageType,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {message_type} message: {source}")]
    Encode {
        message_type: MessageType,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawEnvelope<'a> {
    #[serde(rename = "type")]
    kind: i64,
    #[serde(default)]
    metadata: Metadata,
    #[serde(borrow)]
    msg: &'a RawValue,
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: i64,
    metadata: &'a Metadata,
    msg: &'a T,
}

/// First phase: decodes the outer envelope and resolves its type tag.
pub fn decode_type(data: &[u8]) -> Result<MessageType, EnvelopeError> {
    let raw = decode_raw(data)?;
    resolve_type(raw.kind)
}

/// Second phase: decodes the body of `data` as `message_type`.
///
/// The outer envelope is re-read; callers holding a decoded type from
/// `decode_type` for the same bytes will not see `UnknownMessageType` here.
pub fn decode_body(data: &[u8], message_type: MessageType) -> Result<Message, EnvelopeError> {
    let raw = decode_raw(data)?;
    decode_message(raw.msg, message_type)
}

/// Decodes both phases plus metadata in one pass over the bytes.
pub fn decode(data: &[u8]) -> Result<Envelope, EnvelopeError> {
    let raw = decode_raw(data)?;
    let message_type = resolve_type(raw.kind)?;
    let message = decode_message(raw.msg, message_type)?;
    Ok(Envelope {
        metadata: raw.metadata,
        message,
    })
}

/// Encodes `message` with `metadata` embedded verbatim.
pub fn encode(message: &Message, metadata: &Metadata) -> Result<Vec<u8>, EnvelopeError> {
    let message_type = message.message_type();
    let encoded = match message {
        Message::NewItem(core) => serde_json::to_vec(&OutgoingEnvelope {
            kind: message_type.code(),
            metadata,
            msg: core,
        }),
    };
    encoded.map_err(|source| EnvelopeError::Encode {
        message_type,
        source,
    })
}

fn decode_raw(data: &[u8]) -> Result<RawEnvelope<'_>, EnvelopeError> {
    serde_json::from_slice(data).map_err(EnvelopeError::EnvelopeDecode)
}

fn resolve_type(code: i64) -> Result<MessageType, EnvelopeError> {
    MessageType::from_code(code).ok_or(EnvelopeError::UnknownMessageType(code))
}

fn decode_message(body: &RawValue, message_type: MessageType) -> Result<Message, EnvelopeError> {
    let to_body_error = |source: serde_json::Error| EnvelopeError::BodyDecode {
        message_type,
        source,
    };
    match message_type {
        MessageType::NewItem => serde_json::from_str::<ItemCore>(body.get())
            .map(Message::NewItem)
            .map_err(to_body_error),
    }
}
