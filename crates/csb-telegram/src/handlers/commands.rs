use std::sync::Arc;

use teloxide::prelude::*;

use csb_core::domain::{ChatId, UserId};

use crate::flows;
use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let caller = UserId(user.id.0 as i64);
    let chat = ChatId(msg.chat.id.0);

    let (cmd, rest) = parse_command(msg.text().unwrap_or(""));

    let result = match cmd.as_str() {
        "start" => flows::handle_start(&state, caller, chat, Some(&rest)).await,
        "newcategory" | "new_category" => flows::new_category(&state, caller, chat, &rest).await,
        "upload" => flows::start_upload(&state, caller, chat, &rest).await,
        "done" | "finish_upload" => flows::finish_upload(&state, caller, chat).await,
        "cancel" => flows::cancel_upload(&state, caller, chat).await,
        "categories" => flows::list_categories(&state, caller, chat).await,
        other => {
            tracing::debug!("ignoring unknown command /{other} from user {}", caller.0);
            return Ok(());
        }
    };

    super::report(&state, caller, chat, &format!("/{cmd}"), result).await;
    Ok(())
}
