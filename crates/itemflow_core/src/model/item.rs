//! Item domain model.
//!
//! # Responsibility
//! - Define the producer-facing `ItemCore` and the stored `Item`.
//! - Own the deterministic identity rule used for deduplication.
//! - Validate creation-time fields before anything is persisted.
//!
//! # Invariants
//! - `Item.uuid` is always `UUIDv5(publication_uuid, "{title}_{published_date}")`,
//!   with the date in the `identity_date_text` layout.
//! - `title`, `publication_uuid` and `published_date` are always present.
//! - `language_code`, when set, is a lowercase ISO 639-1 code.
//!
//! # See also
//! - `crate::messaging::envelope` for the wire shape of `ItemCore`.

use chrono::{DateTime, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Stable identifier of a stored item.
pub type ItemId = Uuid;

pub const TITLE_MIN_CHARS: usize = 5;
pub const TITLE_MAX_CHARS: usize = 400;
pub const TEXT_MIN_CHARS: usize = 5;
pub const URL_MIN_CHARS: usize = 5;
pub const URL_MAX_CHARS: usize = 100;

static LANGUAGE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2}$").expect("valid language code regex"));

/// ISO 639-1 alpha-2 codes.
const ISO_639_1: &[&str] = &[
    "aa", "ab", "ae", "af", "ak", "am", "an", "ar", "as", "av", "ay", "az", "ba", "be", "bg",
    "bh", "bi", "bm", "bn", "bo", "br", "bs", "ca", "ce", "ch", "co", "cr", "cs", "cu", "cv",
    "cy", "da", "de", "dv", "dz", "ee", "el", "en", "eo", "es", "et", "eu", "fa", "ff", "fi",
    "fj", "fo", "fr", "fy", "ga", "gd", "gl", "gn", "gu", "gv", "ha", "he", "hi", "ho", "hr",
    "ht", "hu", "hy", "hz", "ia", "id", "ie", "ig", "ii", "ik", "io", "is", "it", "iu", "ja",
    "jv", "ka", "kg", "ki", "kj", "kk", "kl", "km", "kn", "ko", "kr", "ks", "ku", "kv", "kw",
    "ky", "la", "lb", "lg", "li", "ln", "lo", "lt", "lu", "lv", "mg", "mh", "mi", "mk", "ml",
    "mn", "mr", "ms", "mt", "my", "na", "nb", "nd", "ne", "ng", "nl", "nn", "no", "nr", "nv",
    "ny", "oc", "oj", "om", "or", "os", "pa", "pi", "pl", "ps", "pt", "qu", "rm", "rn", "ro",
    "ru", "rw", "sa", "sc", "sd", "se", "sg", "si", "sk", "sl", "sm", "sn", "so", "sq", "sr",
    "ss", "st", "su", "sv", "sw", "ta", "te", "tg", "th", "ti", "tk", "tl", "tn", "to", "tr",
    "ts", "tt", "tw", "ty", "ug", "uk", "ur", "uz", "ve", "vi", "vo", "wa", "wo", "xh", "yi",
    "yo", "za", "zh", "zu",
];

/// Field-level validation failures for `ItemCore`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemValidationError {
    #[error("publication_uuid must not be nil")]
    NilPublicationUuid,
    #[error("title is required")]
    MissingTitle,
    #[error("{field} must be between {min} and {max} characters, got {actual}")]
    LengthOutOfRange {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },
    #[error("{field} must be at least {min} characters, got {actual}")]
    TooShort {
        field: &'static str,
        min: usize,
        actual: usize,
    },
    #[error("`{0}` is not a valid two-letter ISO 639-1 language code")]
    InvalidLanguageCode(String),
    #[error("`{0}` is not a well-formed http(s) url")]
    InvalidUrl(String),
}

/// Creation-time fields every item producer must supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCore {
    pub publication_uuid: Uuid,
    pub published_date: DateTime<Utc>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

impl ItemCore {
    /// Creates a core with only the required fields set.
    pub fn new(
        publication_uuid: Uuid,
        published_date: DateTime<Utc>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            publication_uuid,
            published_date,
            title: title.into(),
            description: None,
            content: None,
            url: None,
            language_code: None,
        }
    }

    /// Validates required fields, length bounds, language code and url.
    ///
    /// Returns the first violation found, in field declaration order.
    pub fn validate(&self) -> Result<(), ItemValidationError> {
        if self.publication_uuid.is_nil() {
            return Err(ItemValidationError::NilPublicationUuid);
        }

        if self.title.trim().is_empty() {
            return Err(ItemValidationError::MissingTitle);
        }
        check_range("title", &self.title, TITLE_MIN_CHARS, TITLE_MAX_CHARS)?;

        if let Some(description) = self.description.as_deref() {
            check_min("description", description, TEXT_MIN_CHARS)?;
        }
        if let Some(content) = self.content.as_deref() {
            check_min("content", content, TEXT_MIN_CHARS)?;
        }

        if let Some(url) = self.url.as_deref() {
            check_range("url", url, URL_MIN_CHARS, URL_MAX_CHARS)?;
            if !is_http_url(url) {
                return Err(ItemValidationError::InvalidUrl(url.to_string()));
            }
        }

        if let Some(code) = self.language_code.as_deref() {
            if !is_language_code(code) {
                return Err(ItemValidationError::InvalidLanguageCode(code.to_string()));
            }
        }

        Ok(())
    }

    /// Identity this core resolves to once stored.
    pub fn item_id(&self) -> ItemId {
        derive_item_id(self.publication_uuid, &self.title, self.published_date)
    }
}

/// Stored news item: a validated `ItemCore` plus its derived identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub uuid: ItemId,
    #[serde(flatten)]
    pub core: ItemCore,
}

impl Item {
    /// Builds an item from a core, deriving its identity.
    ///
    /// Does not validate; ingestion paths call `ItemCore::validate` first.
    pub fn new(core: ItemCore) -> Self {
        Self {
            uuid: core.item_id(),
            core,
        }
    }

    /// Validates the core and then derives the item.
    pub fn try_new(core: ItemCore) -> Result<Self, ItemValidationError> {
        core.validate()?;
        Ok(Self::new(core))
    }

    pub fn publication_uuid(&self) -> Uuid {
        self.core.publication_uuid
    }

    pub fn published_date(&self) -> DateTime<Utc> {
        self.core.published_date
    }

    pub fn title(&self) -> &str {
        &self.core.title
    }
}

impl Display for Item {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "item {} (publication {})",
            self.uuid, self.core.publication_uuid
        )
    }
}

/// Derives the deterministic item identity.
///
/// The publication uuid is the v5 namespace; the name is the title and the
/// publish date joined by `_`, with the date rendered by `identity_date_text`.
pub fn derive_item_id(
    publication_uuid: Uuid,
    title: &str,
    published_date: DateTime<Utc>,
) -> ItemId {
    let name = format!("{title}_{}", identity_date_text(published_date));
    Uuid::new_v5(&publication_uuid, name.as_bytes())
}

/// Renders a UTC date the way identities embed it:
/// `2024-05-01 10:00:00.25 +0000 UTC`.
///
/// Fractional seconds appear only when non-zero, without trailing zeros.
/// Other producers derive identities from this exact layout.
pub fn identity_date_text(date: DateTime<Utc>) -> String {
    let mut text = date.format("%Y-%m-%d %H:%M:%S").to_string();
    // chrono encodes a leap second as nanos >= 1e9.
    let nanos = date.nanosecond() % 1_000_000_000;
    if nanos != 0 {
        let fraction = format!("{nanos:09}");
        text.push('.');
        text.push_str(fraction.trim_end_matches('0'));
    }
    text.push_str(" +0000 UTC");
    text
}

/// Returns whether `code` is a known lowercase ISO 639-1 code.
pub fn is_language_code(code: &str) -> bool {
    LANGUAGE_CODE_RE.is_match(code) && ISO_639_1.binary_search(&code).is_ok()
}

fn is_http_url(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
        Err(_) => false,
    }
}

fn check_range(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ItemValidationError> {
    let actual = value.chars().count();
    if actual < min || actual > max {
        return Err(ItemValidationError::LengthOutOfRange {
            field,
            min,
            max,
            actual,
        });
    }
    Ok(())
}

fn check_min(field: &'static str, value: &str, min: usize) -> Result<(), ItemValidationError> {
    let actual = value.chars().count();
    if actual < min {
        return Err(ItemValidationError::TooShort { field, min, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{is_language_code, ISO_639_1};

    #[test]
    fn language_table_is_sorted_for_binary_search() {
        let mut sorted = ISO_639_1.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, ISO_639_1);
    }

    #[test]
    fn language_code_rejects_wrong_shape() {
        assert!(is_language_code("en"));
        assert!(!is_language_code("EN"));
        assert!(!is_language_code("eng"));
        assert!(!is_language_code("xx"));
    }
}
