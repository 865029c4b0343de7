//! Hexagonal ports: the two seams adapter crates implement.

use async_trait::async_trait;

use crate::{
    domain::{Category, CategoryId, ChatId, FileHandle, FileRecord, MessageRef, NewFile, UserId},
    Result,
};

/// Durable storage of categories and their ordered files.
///
/// Implementations must serialize conflicting writes per category (one write
/// transaction per mutating call) and surface storage failures as
/// `Error::Persistence`, leaving prior state unchanged. Reads always observe
/// the latest committed state; there is no caching layer.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Generates a fresh short id and creates the category. A generated-id
    /// collision surfaces as `Error::Conflict`; callers may retry, which
    /// regenerates.
    async fn create_category(&self, name: &str, creator: UserId) -> Result<CategoryId>;

    /// `Error::NotFound` when absent. Files come back in ascending `seq`.
    async fn category(&self, id: &CategoryId) -> Result<Category>;

    /// All categories in insertion order (admin overview).
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Appends a non-empty batch in one transaction, assigning strictly
    /// increasing `seq` values that continue from the category's current
    /// maximum. All-or-nothing: on any failure zero files are attached.
    /// Returns the number appended.
    async fn append_files(&self, id: &CategoryId, files: &[NewFile]) -> Result<u32>;

    /// Deletes the file at 0-based `index` in the ascending-`seq` ordering at
    /// call time; `Error::NotFound` (and no mutation) for an unknown category
    /// or out-of-bounds index. Returns the removed record.
    async fn delete_file_at(&self, id: &CategoryId, index: u32) -> Result<FileRecord>;

    /// Removes the category and, atomically, every owned file. Returns the
    /// removed category as it stood.
    async fn delete_category(&self, id: &CategoryId) -> Result<Category>;
}

/// Outbound messaging seam (Telegram in production, fakes in tests).
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<()>;

    /// Re-sends an already-uploaded blob by its opaque handle.
    async fn send_document(
        &self,
        chat_id: ChatId,
        handle: &FileHandle,
        caption: Option<&str>,
    ) -> Result<MessageRef>;

    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}

/// Inline keyboard rendered one button per row.
#[derive(Clone, Debug)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

/// One button: a display label plus the encoded action token it fires.
#[derive(Clone, Debug)]
pub struct InlineButton {
    pub label: String,
    pub token: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }

    /// Builds a label, truncating with an ellipsis past `max_label_len`.
    pub fn button(label: &str, token: String, max_label_len: usize) -> InlineButton {
        let label = if label.chars().count() > max_label_len {
            format!("{}...", label.chars().take(max_label_len).collect::<String>())
        } else {
            label.to_string()
        };
        InlineButton { label, token }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_button_labels_are_truncated() {
        let b = InlineKeyboard::button(&"x".repeat(40), "cancel".to_string(), 30);
        assert_eq!(b.label.chars().count(), 33);
        assert!(b.label.ends_with("..."));

        let short = InlineKeyboard::button("ok", "cancel".to_string(), 30);
        assert_eq!(short.label, "ok");
    }
}
