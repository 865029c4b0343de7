//! Platform-independent orchestration.
//!
//! Handlers extract caller/chat/payload from teloxide updates and delegate
//! here; everything below talks to the ports only, so the whole surface is
//! testable with fakes. Expected domain errors (missing category, empty
//! session, denial) are turned into user-facing replies; only unexpected
//! failures propagate to the handler layer.

use tokio::time::sleep;

use csb_core::{
    actions::{self, Action},
    audit::AuditEvent,
    domain::{Category, CategoryId, ChatId, NewFile, UserId},
    errors::Error,
    ports::{InlineButton, InlineKeyboard},
    Result,
};

use crate::router::AppState;

/// Bounded regeneration attempts when a fresh category id collides.
const MAX_ID_ATTEMPTS: usize = 3;

pub async fn handle_start(
    state: &AppState,
    caller: UserId,
    chat: ChatId,
    payload: Option<&str>,
) -> Result<()> {
    if let Some(payload) = payload.map(str::trim).filter(|p| !p.is_empty()) {
        match actions::parse_deep_link(payload) {
            Ok(id) => return category_access(state, caller, chat, &id).await,
            Err(e) => {
                tracing::debug!("bad deep link from user {}: {e}", caller.0);
                state
                    .messenger
                    .send_text(chat, "That link is not valid.")
                    .await?;
                return Ok(());
            }
        }
    }

    let greeting = if state.access.is_admin(caller) {
        "👋 Welcome, admin.\n\n\
         /newcategory <name> — create a category\n\
         /upload <id> — start adding files to a category\n\
         /done — publish the files you sent\n\
         /cancel — discard the current upload\n\
         /categories — list all categories"
    } else {
        "👋 Welcome! Open a shared category link to receive its files."
    };
    state.messenger.send_text(chat, greeting).await?;
    Ok(())
}

/// Entry point for both deep links and admin navigation: admins get the
/// management keyboard, everyone else gets the files.
pub async fn category_access(
    state: &AppState,
    caller: UserId,
    chat: ChatId,
    id: &CategoryId,
) -> Result<()> {
    let category = match state.repo.category(id).await {
        Ok(c) => c,
        Err(Error::NotFound(_)) => {
            state
                .messenger
                .send_text(chat, "❌ Category not found. The link may be stale.")
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if state.access.is_admin(caller) {
        send_management_keyboard(state, chat, &category).await
    } else {
        deliver_files(state, chat, &category).await
    }
}

async fn send_management_keyboard(
    state: &AppState,
    chat: ChatId,
    category: &Category,
) -> Result<()> {
    let max = state.cfg.button_label_max_length;
    let keyboard = InlineKeyboard::new(vec![
        InlineKeyboard::button(
            &format!("📄 View files ({})", category.files.len()),
            Action::ViewFiles(category.id.clone()).encode(),
            max,
        ),
        InlineKeyboard::button("➕ Add files", Action::AddFiles(category.id.clone()).encode(), max),
        InlineKeyboard::button(
            "🗑 Delete a file",
            Action::PromptDeleteFile(category.id.clone()).encode(),
            max,
        ),
        InlineKeyboard::button(
            "❌ Delete category",
            Action::PromptDeleteCategory(category.id.clone()).encode(),
            max,
        ),
    ]);

    let text = format!(
        "📁 {}\n{} file(s)\n\nShare link: {}",
        category.name,
        category.files.len(),
        state.cfg.category_link(&category.id)
    );
    state.messenger.send_keyboard(chat, &text, keyboard).await?;
    Ok(())
}

async fn deliver_files(state: &AppState, chat: ChatId, category: &Category) -> Result<()> {
    if category.files.is_empty() {
        state
            .messenger
            .send_text(chat, "This category is empty.")
            .await?;
        return Ok(());
    }

    for (i, file) in category.files.iter().enumerate() {
        state
            .messenger
            .send_document(chat, &file.handle, file.caption.as_deref())
            .await?;
        if i + 1 < category.files.len() {
            sleep(state.cfg.send_delay).await;
        }
    }
    Ok(())
}

pub async fn new_category(
    state: &AppState,
    caller: UserId,
    chat: ChatId,
    name: &str,
) -> Result<()> {
    if state.access.ensure_admin(caller).is_err() {
        return deny_command(state, caller, chat).await;
    }

    let name = name.trim();
    if name.is_empty() {
        state
            .messenger
            .send_text(chat, "Usage: /newcategory <name>")
            .await?;
        return Ok(());
    }

    let mut created = None;
    for _ in 0..MAX_ID_ATTEMPTS {
        match state.repo.create_category(name, caller).await {
            Ok(id) => {
                created = Some(id);
                break;
            }
            Err(Error::Conflict(_)) => continue, // regenerate and retry
            Err(e) => return Err(e),
        }
    }
    let Some(id) = created else {
        return Err(Error::Conflict(
            "could not allocate a category id".to_string(),
        ));
    };

    audit(state, AuditEvent::admin_action(caller, "create_category", Some(id.as_str())));

    let text = format!(
        "✅ Category \"{name}\" created.\n\nShare link: {}\n\nAdd files with /upload {id}",
        state.cfg.category_link(&id)
    );
    state.messenger.send_text(chat, &text).await?;
    Ok(())
}

pub async fn start_upload(state: &AppState, caller: UserId, chat: ChatId, arg: &str) -> Result<()> {
    if state.access.ensure_admin(caller).is_err() {
        return deny_command(state, caller, chat).await;
    }

    let id = match CategoryId::parse(arg.trim()) {
        Ok(id) => id,
        Err(_) => {
            state
                .messenger
                .send_text(chat, "Usage: /upload <category id>")
                .await?;
            return Ok(());
        }
    };

    begin_session(state, caller, chat, id).await
}

async fn begin_session(
    state: &AppState,
    caller: UserId,
    chat: ChatId,
    id: CategoryId,
) -> Result<()> {
    let (category, discarded) = match state.sessions.start(state.repo.as_ref(), caller, id).await {
        Ok(v) => v,
        Err(Error::NotFound(_)) => {
            state
                .messenger
                .send_text(chat, "❌ No category with that id.")
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    audit(state, AuditEvent::admin_action(caller, "start_upload", Some(category.id.as_str())));

    let mut text = format!(
        "📤 Uploading to \"{}\". Send documents now, then /done to publish or /cancel to abort.",
        category.name
    );
    if let Some(n) = discarded {
        text.push_str(&format!(
            "\n\n({n} unsaved file(s) from your previous upload were discarded.)"
        ));
    }
    state.messenger.send_text(chat, &text).await?;
    Ok(())
}

pub async fn finish_upload(state: &AppState, caller: UserId, chat: ChatId) -> Result<()> {
    if state.access.ensure_admin(caller).is_err() {
        return deny_command(state, caller, chat).await;
    }

    match state.sessions.commit(state.repo.as_ref(), caller).await {
        Ok((id, count)) => {
            audit(state, AuditEvent::admin_action(caller, "commit_upload", Some(id.as_str())));
            let text = format!(
                "✅ Added {count} file(s).\n\nShare link: {}",
                state.cfg.category_link(&id)
            );
            state.messenger.send_text(chat, &text).await?;
        }
        Err(Error::EmptySession) => {
            state
                .messenger
                .send_text(chat, "No files received yet. Send documents, or /cancel to abort.")
                .await?;
        }
        Err(Error::NotFound(_)) => {
            state
                .messenger
                .send_text(chat, "No upload in progress. Start one with /upload <id>.")
                .await?;
        }
        Err(Error::Persistence(e)) => {
            audit(state, AuditEvent::error(caller, "commit_upload", &e));
            state
                .messenger
                .send_text(
                    chat,
                    "⚠️ Could not save the files. Your upload is intact, try /done again.",
                )
                .await?;
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

pub async fn cancel_upload(state: &AppState, caller: UserId, chat: ChatId) -> Result<()> {
    if state.access.ensure_admin(caller).is_err() {
        return deny_command(state, caller, chat).await;
    }

    let text = if state.sessions.cancel(caller).await {
        "Upload cancelled."
    } else {
        "No upload in progress."
    };
    state.messenger.send_text(chat, text).await?;
    Ok(())
}

pub async fn list_categories(state: &AppState, caller: UserId, chat: ChatId) -> Result<()> {
    if state.access.ensure_admin(caller).is_err() {
        return deny_command(state, caller, chat).await;
    }

    let categories = state.repo.list_categories().await?;
    if categories.is_empty() {
        state
            .messenger
            .send_text(chat, "No categories yet. Create one with /newcategory <name>.")
            .await?;
        return Ok(());
    }

    let lines: Vec<String> = categories
        .iter()
        .map(|c| {
            format!(
                "📁 {} — {} file(s)\n{}",
                c.name,
                c.files.len(),
                state.cfg.category_link(&c.id)
            )
        })
        .collect();
    state.messenger.send_text(chat, &lines.join("\n\n")).await?;
    Ok(())
}

/// A document arrived. Inside a session it joins the accumulator; outside
/// one it is dropped without a reply, the UI never asked for it.
pub async fn document_received(
    state: &AppState,
    caller: UserId,
    chat: ChatId,
    file: NewFile,
) -> Result<()> {
    let name = file.display_name.clone();
    match state.sessions.add_file(caller, file).await {
        Some(count) => {
            let text =
                format!("📥 Received \"{name}\" ({count} pending). /done when you are finished.");
            state.messenger.send_text(chat, &text).await?;
        }
        None => {
            tracing::debug!("ignoring document from user {} with no session", caller.0);
        }
    }
    Ok(())
}

pub async fn callback_action(
    state: &AppState,
    caller: UserId,
    chat: ChatId,
    callback_id: &str,
    token: &str,
) -> Result<()> {
    let action = match Action::decode(token) {
        Ok(a) => a,
        Err(e) => {
            tracing::debug!("undecodable callback from user {}: {e}", caller.0);
            state
                .messenger
                .answer_callback(callback_id, Some("Unknown action"))
                .await?;
            return Ok(());
        }
    };

    if matches!(action, Action::Cancel) {
        state
            .messenger
            .answer_callback(callback_id, Some("Cancelled"))
            .await?;
        return Ok(());
    }

    // Everything except Cancel mutates or exposes admin surfaces.
    if state.access.ensure_admin(caller).is_err() {
        audit(state, AuditEvent::auth(caller, false));
        state
            .messenger
            .answer_callback(callback_id, Some("Not authorized"))
            .await?;
        return Ok(());
    }

    match action {
        Action::ViewFiles(id) => view_files(state, chat, callback_id, &id).await,
        Action::AddFiles(id) => {
            state.messenger.answer_callback(callback_id, None).await?;
            begin_session(state, caller, chat, id).await
        }
        Action::PromptDeleteFile(id) => prompt_delete_file(state, chat, callback_id, &id).await,
        Action::DeleteFileAt(id, index) => {
            delete_file_at(state, caller, chat, callback_id, &id, index).await
        }
        Action::PromptDeleteCategory(id) => {
            prompt_delete_category(state, chat, callback_id, &id).await
        }
        Action::ConfirmDeleteCategory(id) => {
            confirm_delete_category(state, caller, chat, callback_id, &id).await
        }
        Action::Cancel => unreachable!("handled above"),
    }
}

async fn view_files(
    state: &AppState,
    chat: ChatId,
    callback_id: &str,
    id: &CategoryId,
) -> Result<()> {
    let category = match state.repo.category(id).await {
        Ok(c) => c,
        Err(Error::NotFound(_)) => {
            return state
                .messenger
                .answer_callback(callback_id, Some("Category no longer exists"))
                .await;
        }
        Err(e) => return Err(e),
    };

    if category.files.is_empty() {
        state
            .messenger
            .answer_callback(callback_id, Some("This category is empty"))
            .await?;
        return Ok(());
    }

    let lines: Vec<String> = category
        .files
        .iter()
        .enumerate()
        .map(|(i, f)| {
            format!(
                "{}. {} ({}) — {}",
                i + 1,
                f.display_name,
                format_size(f.size_bytes),
                f.uploaded_at.format("%Y-%m-%d")
            )
        })
        .collect();
    let text = format!("📄 Files in \"{}\":\n\n{}", category.name, lines.join("\n"));

    state.messenger.answer_callback(callback_id, None).await?;
    state.messenger.send_text(chat, &text).await?;
    Ok(())
}

async fn prompt_delete_file(
    state: &AppState,
    chat: ChatId,
    callback_id: &str,
    id: &CategoryId,
) -> Result<()> {
    let category = match state.repo.category(id).await {
        Ok(c) => c,
        Err(Error::NotFound(_)) => {
            return state
                .messenger
                .answer_callback(callback_id, Some("Category no longer exists"))
                .await;
        }
        Err(e) => return Err(e),
    };

    if category.files.is_empty() {
        state
            .messenger
            .answer_callback(callback_id, Some("No files to delete"))
            .await?;
        return Ok(());
    }

    let max = state.cfg.button_label_max_length;
    let mut buttons: Vec<InlineButton> = category
        .files
        .iter()
        .enumerate()
        .map(|(i, f)| {
            InlineKeyboard::button(
                &format!("{}. {}", i + 1, f.display_name),
                Action::DeleteFileAt(id.clone(), i as u32).encode(),
                max,
            )
        })
        .collect();
    buttons.push(InlineKeyboard::button("Cancel", Action::Cancel.encode(), max));

    state.messenger.answer_callback(callback_id, None).await?;
    state
        .messenger
        .send_keyboard(chat, "Select a file to delete:", InlineKeyboard::new(buttons))
        .await?;
    Ok(())
}

async fn delete_file_at(
    state: &AppState,
    caller: UserId,
    chat: ChatId,
    callback_id: &str,
    id: &CategoryId,
    index: u32,
) -> Result<()> {
    match state.repo.delete_file_at(id, index).await {
        Ok(removed) => {
            audit(state, AuditEvent::admin_action(caller, "delete_file", Some(id.as_str())));
            state.messenger.answer_callback(callback_id, None).await?;
            state
                .messenger
                .send_text(chat, &format!("🗑 Removed \"{}\".", removed.display_name))
                .await?;
            Ok(())
        }
        // The list shifted (or the category vanished) since the prompt was
        // rendered; make the admin re-open it against current state.
        Err(Error::NotFound(_)) => {
            state
                .messenger
                .answer_callback(callback_id, Some("File list changed, reopen the delete menu"))
                .await
        }
        Err(e) => Err(e),
    }
}

async fn prompt_delete_category(
    state: &AppState,
    chat: ChatId,
    callback_id: &str,
    id: &CategoryId,
) -> Result<()> {
    let category = match state.repo.category(id).await {
        Ok(c) => c,
        Err(Error::NotFound(_)) => {
            return state
                .messenger
                .answer_callback(callback_id, Some("Category no longer exists"))
                .await;
        }
        Err(e) => return Err(e),
    };

    let max = state.cfg.button_label_max_length;
    let keyboard = InlineKeyboard::new(vec![
        InlineKeyboard::button(
            "⚠️ Yes, delete it",
            Action::ConfirmDeleteCategory(id.clone()).encode(),
            max,
        ),
        InlineKeyboard::button("Cancel", Action::Cancel.encode(), max),
    ]);
    let text = format!(
        "Delete \"{}\" and its {} file(s)? This cannot be undone.",
        category.name,
        category.files.len()
    );

    state.messenger.answer_callback(callback_id, None).await?;
    state.messenger.send_keyboard(chat, &text, keyboard).await?;
    Ok(())
}

async fn confirm_delete_category(
    state: &AppState,
    caller: UserId,
    chat: ChatId,
    callback_id: &str,
    id: &CategoryId,
) -> Result<()> {
    match state.repo.delete_category(id).await {
        Ok(removed) => {
            audit(state, AuditEvent::admin_action(caller, "delete_category", Some(id.as_str())));
            state.messenger.answer_callback(callback_id, None).await?;
            state
                .messenger
                .send_text(
                    chat,
                    &format!(
                        "🗑 Deleted \"{}\" and {} file(s).",
                        removed.name,
                        removed.files.len()
                    ),
                )
                .await?;
            Ok(())
        }
        Err(Error::NotFound(_)) => {
            state
                .messenger
                .answer_callback(callback_id, Some("Already deleted"))
                .await
        }
        Err(e) => Err(e),
    }
}

async fn deny_command(state: &AppState, caller: UserId, chat: ChatId) -> Result<()> {
    audit(state, AuditEvent::auth(caller, false));
    state
        .messenger
        .send_text(chat, "⛔ This command is for admins only.")
        .await?;
    Ok(())
}

fn audit(state: &AppState, event: AuditEvent) {
    if let Err(e) = state.audit.write(event) {
        tracing::warn!("audit write failed: {e}");
    }
}

fn format_size(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = 1024 * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{} KB", bytes / KB)
    } else {
        format!("{bytes} B")
    }
}
