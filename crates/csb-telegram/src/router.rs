use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use csb_core::{
    access::AccessController,
    audit::AuditLogger,
    config::Config,
    ports::{CategoryRepository, MessagingPort},
    session::UploadSessions,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub repo: Arc<dyn CategoryRepository>,
    pub messenger: Arc<dyn MessagingPort>,
    pub sessions: Arc<UploadSessions>,
    pub access: AccessController,
    pub audit: Arc<AuditLogger>,
    pub caller_locks: Arc<CallerLocks>,
}

/// One lock per caller so a single user's updates are handled in arrival
/// order (a document racing a /done must not slip past the commit).
#[derive(Default)]
pub struct CallerLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl CallerLocks {
    pub async fn lock_caller(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    repo: Arc<dyn CategoryRepository>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!("csb started as @{}", me.username());
    }
    tracing::info!("admins configured: {}", cfg.admin_ids.len());

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        repo,
        messenger,
        sessions: Arc::new(UploadSessions::new()),
        access: AccessController::new(cfg.admin_ids.clone()),
        audit: Arc::new(AuditLogger::new(
            cfg.audit_log_path.clone(),
            cfg.audit_log_json,
        )),
        caller_locks: Arc::new(CallerLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
