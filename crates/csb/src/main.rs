use std::sync::Arc;

use csb_core::config::Config;
use csb_storage::Storage;

#[tokio::main]
async fn main() -> Result<(), csb_core::Error> {
    csb_core::logging::init("csb");

    let cfg = Arc::new(Config::load()?);

    let storage = Storage::connect(&cfg.database_url, cfg.query_timeout).await?;

    csb_telegram::router::run_polling(cfg, Arc::new(storage))
        .await
        .map_err(|e| csb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
