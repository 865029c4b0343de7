//! Compact action/identifier codec.
//!
//! Every interactive control the bot renders carries one of these tokens as
//! its callback payload; the deep-link form (`cat_<id>`) is the degenerate
//! single-field variant used for first-contact links. Tokens are
//! `prefix:categoryid[:index]` with `:` guaranteed absent from the id
//! alphabet, and always fit Telegram's 64-byte callback-data limit.

use crate::{
    domain::CategoryId,
    errors::Error,
    Result,
};

/// Platform-imposed upper bound on callback payload length.
pub const MAX_TOKEN_LEN: usize = 64;

const DEEP_LINK_PREFIX: &str = "cat_";

/// Closed set of UI actions. Decoding is exhaustive: unknown prefixes are a
/// [`Error::Decode`], never a fallthrough.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    ViewFiles(CategoryId),
    AddFiles(CategoryId),
    PromptDeleteFile(CategoryId),
    DeleteFileAt(CategoryId, u32),
    PromptDeleteCategory(CategoryId),
    ConfirmDeleteCategory(CategoryId),
    Cancel,
}

impl Action {
    pub fn encode(&self) -> String {
        let token = match self {
            Action::ViewFiles(id) => format!("view:{id}"),
            Action::AddFiles(id) => format!("add:{id}"),
            Action::PromptDeleteFile(id) => format!("rmfile:{id}"),
            Action::DeleteFileAt(id, index) => format!("rmat:{id}:{index}"),
            Action::PromptDeleteCategory(id) => format!("rmcat:{id}"),
            Action::ConfirmDeleteCategory(id) => format!("rmyes:{id}"),
            Action::Cancel => "cancel".to_string(),
        };
        debug_assert!(token.len() <= MAX_TOKEN_LEN);
        token
    }

    pub fn decode(token: &str) -> Result<Action> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(Error::Decode(format!(
                "token exceeds {MAX_TOKEN_LEN} bytes"
            )));
        }

        let mut parts = token.split(':');
        let prefix = parts.next().unwrap_or("");
        let action = match prefix {
            "cancel" => Action::Cancel,
            "view" => Action::ViewFiles(decode_id(parts.next())?),
            "add" => Action::AddFiles(decode_id(parts.next())?),
            "rmfile" => Action::PromptDeleteFile(decode_id(parts.next())?),
            "rmcat" => Action::PromptDeleteCategory(decode_id(parts.next())?),
            "rmyes" => Action::ConfirmDeleteCategory(decode_id(parts.next())?),
            "rmat" => {
                let id = decode_id(parts.next())?;
                let index = decode_index(parts.next())?;
                Action::DeleteFileAt(id, index)
            }
            other => {
                return Err(Error::Decode(format!("unknown action prefix: {other:?}")))
            }
        };

        if parts.next().is_some() {
            return Err(Error::Decode(format!(
                "trailing fields after {prefix:?} payload"
            )));
        }
        Ok(action)
    }
}

fn decode_id(field: Option<&str>) -> Result<CategoryId> {
    let Some(raw) = field else {
        return Err(Error::Decode("missing category id field".to_string()));
    };
    CategoryId::parse(raw).map_err(|e| Error::Decode(e.to_string()))
}

fn decode_index(field: Option<&str>) -> Result<u32> {
    let Some(raw) = field else {
        return Err(Error::Decode("missing file index field".to_string()));
    };
    raw.parse::<u32>()
        .map_err(|_| Error::Decode(format!("file index is not a number: {raw:?}")))
}

/// `start` payload for first-contact links: `cat_<categoryId>`.
pub fn deep_link_payload(id: &CategoryId) -> String {
    format!("{DEEP_LINK_PREFIX}{id}")
}

pub fn parse_deep_link(payload: &str) -> Result<CategoryId> {
    let Some(raw) = payload.strip_prefix(DEEP_LINK_PREFIX) else {
        return Err(Error::Decode(format!(
            "deep link payload does not start with {DEEP_LINK_PREFIX:?}"
        )));
    };
    CategoryId::parse(raw).map_err(|e| Error::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CategoryId {
        CategoryId::parse(s).unwrap()
    }

    #[test]
    fn every_variant_roundtrips() {
        let cases = [
            Action::ViewFiles(id("a1b2c3d4")),
            Action::AddFiles(id("a1b2c3d4")),
            Action::PromptDeleteFile(id("a1b2c3d4")),
            Action::DeleteFileAt(id("a1b2c3d4"), 0),
            Action::DeleteFileAt(id("a1b2c3d4"), 4_000_000_000),
            Action::PromptDeleteCategory(id("a1b2c3d4")),
            Action::ConfirmDeleteCategory(id("a1b2c3d4")),
            Action::Cancel,
        ];
        for action in cases {
            let token = action.encode();
            assert!(token.len() <= MAX_TOKEN_LEN, "token too long: {token}");
            assert_eq!(Action::decode(&token).unwrap(), action);
        }
    }

    #[test]
    fn longest_possible_token_fits_the_limit() {
        let widest = Action::DeleteFileAt(id(&"z".repeat(CategoryId::MAX_LEN)), u32::MAX);
        assert!(widest.encode().len() <= MAX_TOKEN_LEN);
    }

    #[test]
    fn decode_rejects_malformed_tokens() {
        for bad in [
            "",
            "nope:a1b2c3d4",
            "view",
            "view:",
            "view:HASCAPS",
            "view:a1b2c3d4:extra",
            "rmat:a1b2c3d4",
            "rmat:a1b2c3d4:notanumber",
            "rmat:a1b2c3d4:-1",
            "cancel:extra",
        ] {
            assert!(
                matches!(Action::decode(bad), Err(Error::Decode(_))),
                "expected decode error for {bad:?}"
            );
        }
    }

    #[test]
    fn deep_link_roundtrip_and_rejects() {
        let cat = id("a1b2c3d4");
        assert_eq!(deep_link_payload(&cat), "cat_a1b2c3d4");
        assert_eq!(parse_deep_link("cat_a1b2c3d4").unwrap(), cat);

        assert!(parse_deep_link("a1b2c3d4").is_err());
        assert!(parse_deep_link("cat_").is_err());
        assert!(parse_deep_link("dog_a1b2c3d4").is_err());
    }
}
