use std::fmt;

use chrono::{DateTime, Utc};

use crate::{errors::Error, Result};

/// Telegram user id (numeric). Doubles as the caller identity everywhere in
/// the core: upload sessions are keyed by it, categories record it as creator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Opaque reference to an uploaded blob. Only the delivery platform can
/// dereference it; the core just stores and forwards it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileHandle(pub String);

impl FileHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Short opaque category token.
///
/// The alphabet is lowercase ASCII alphanumerics, which keeps the token safe
/// to embed in `:`-delimited action tokens and `cat_` deep links. Generated
/// ids are the first 8 hex chars of a v4 uuid; parsing accepts up to
/// [`CategoryId::MAX_LEN`] so hand-issued ids keep working.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CategoryId(String);

impl CategoryId {
    pub const MAX_LEN: usize = 32;

    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(hex[..8].to_string())
    }

    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() > Self::MAX_LEN {
            return Err(Error::Validation(format!(
                "category id must be 1..={} chars, got {}",
                Self::MAX_LEN,
                s.len()
            )));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(Error::Validation(format!(
                "category id contains characters outside [a-z0-9]: {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, admin-owned, shareable collection of files.
#[derive(Clone, Debug)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub creator: UserId,
    pub created_at: DateTime<Utc>,
    /// Owned files in ascending `seq` order.
    pub files: Vec<FileRecord>,
}

/// One stored file. `seq` is the authoritative per-category ordering key,
/// assigned at commit time and persisted explicitly; positional indexes the
/// UI shows are derived from ascending `seq` at read time.
#[derive(Clone, Debug)]
pub struct FileRecord {
    pub seq: i64,
    pub handle: FileHandle,
    pub display_name: String,
    pub size_bytes: i64,
    pub caption: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Inbound descriptor for a file the platform already accepted; this is what
/// upload sessions accumulate before commit.
#[derive(Clone, Debug)]
pub struct NewFile {
    pub handle: FileHandle,
    pub display_name: String,
    pub size_bytes: i64,
    pub caption: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_short_and_parseable() {
        let id = CategoryId::generate();
        assert_eq!(id.as_str().len(), 8);
        assert_eq!(CategoryId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn parse_rejects_bad_alphabet_and_length() {
        assert!(CategoryId::parse("").is_err());
        assert!(CategoryId::parse("ABC123").is_err());
        assert!(CategoryId::parse("has:colon").is_err());
        assert!(CategoryId::parse(&"a".repeat(33)).is_err());
        assert!(CategoryId::parse(&"a".repeat(32)).is_ok());
    }
}
