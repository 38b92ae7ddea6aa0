//! Opaque pagination cursors.
//!
//! A cursor is the standard base64 encoding of the 16 raw bytes of an item
//! identity. Any other encoding or length is rejected.

use crate::model::item::ItemId;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("cursor `{cursor}` is not valid base64")]
    Encoding { cursor: String },
    #[error("cursor `{cursor}` decodes to {len} bytes, expected 16")]
    Length { cursor: String, len: usize },
}

pub fn encode_cursor(id: ItemId) -> String {
    STANDARD.encode(id.as_bytes())
}

pub fn decode_cursor(cursor: &str) -> Result<ItemId, CursorError> {
    let bytes = STANDARD.decode(cursor).map_err(|_| CursorError::Encoding {
        cursor: cursor.to_string(),
    })?;
    Uuid::from_slice(&bytes).map_err(|_| CursorError::Length {
        cursor: cursor.to_string(),
        len: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::{decode_cursor, encode_cursor, CursorError};
    use uuid::Uuid;

    #[test]
    fn nil_identity_encodes_to_zero_bytes() {
        assert_eq!(encode_cursor(Uuid::nil()), "AAAAAAAAAAAAAAAAAAAAAA==");
    }

    #[test]
    fn url_safe_alphabet_is_rejected() {
        let id = Uuid::from_bytes([0xfb; 16]);
        let standard = encode_cursor(id);
        assert!(standard.contains('+') || standard.contains('/'));
        let url_safe = standard.replace('+', "-").replace('/', "_");
        assert!(matches!(
            decode_cursor(&url_safe),
            Err(CursorError::Encoding { .. })
        ));
    }

    #[test]
    fn short_payload_is_rejected() {
        assert!(matches!(
            decode_cursor("AAAA"),
            Err(CursorError::Length { len: 3, .. })
        ));
    }
}
