use std::sync::Arc;

use teloxide::prelude::*;

use csb_core::domain::{ChatId, FileHandle, NewFile, UserId};

use crate::flows;
use crate::router::AppState;

pub async fn handle_document(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(doc) = msg.document() else {
        return Ok(());
    };

    let caller = UserId(user.id.0 as i64);
    let chat = ChatId(msg.chat.id.0);

    let file = NewFile {
        handle: FileHandle(doc.file.id.clone()),
        display_name: doc
            .file_name
            .clone()
            .unwrap_or_else(|| "document".to_string()),
        size_bytes: i64::from(doc.file.size),
        caption: msg.caption().map(|s| s.to_string()),
    };

    let result = flows::document_received(&state, caller, chat, file).await;
    super::report(&state, caller, chat, "document", result).await;
    Ok(())
}
