use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};

use csb_core::domain::{ChatId, UserId};

use crate::flows;
use crate::router::AppState;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let caller = UserId(q.from.id.0 as i64);

    // A callback without an originating message (or payload) cannot be acted
    // on; ack it so the client stops its spinner.
    let chat = q.message.as_ref().map(|m| ChatId(m.chat.id.0));
    let data = q.data.clone().unwrap_or_default();
    let (Some(chat), false) = (chat, data.is_empty()) else {
        let _ = state.messenger.answer_callback(&q.id, None).await;
        return Ok(());
    };

    let _guard = state.caller_locks.lock_caller(caller.0).await;

    let result = flows::callback_action(&state, caller, chat, &q.id, &data).await;
    super::report(&state, caller, chat, "callback", result).await;
    Ok(())
}
