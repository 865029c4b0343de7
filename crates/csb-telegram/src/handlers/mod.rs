//! Telegram update handlers.
//!
//! Each handler extracts caller/chat/payload from the update, serializes the
//! caller through `CallerLocks`, and delegates to `flows`. Unexpected flow
//! errors are logged, audited and answered with a generic apology so the
//! dispatcher never sees them.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use csb_core::{
    audit::AuditEvent,
    domain::{ChatId, UserId},
};

use crate::router::AppState;

mod callback;
mod commands;
mod document;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(()); // channel posts and the like
    };
    let caller = UserId(user.id.0 as i64);

    let _guard = state.caller_locks.lock_caller(caller.0).await;

    let is_command = msg
        .text()
        .map(|t| t.trim_start().starts_with('/'))
        .unwrap_or(false);
    if is_command {
        return commands::handle_command(msg, state).await;
    }

    if msg.document().is_some() {
        return document::handle_document(msg, state).await;
    }

    // Plain text and other media carry no meaning for this bot.
    Ok(())
}

/// Funnel for unexpected flow failures: log, audit, apologize.
async fn report(
    state: &AppState,
    caller: UserId,
    chat: ChatId,
    context: &str,
    result: csb_core::Result<()>,
) {
    let Err(e) = result else {
        return;
    };

    tracing::warn!("{context} failed for user {}: {e}", caller.0);
    if let Err(e) = state
        .audit
        .write(AuditEvent::error(caller, context, &e.to_string()))
    {
        tracing::warn!("audit write failed: {e}");
    }

    let _ = state
        .messenger
        .send_text(chat, "⚠️ Something went wrong. Please try again.")
        .await;
}
