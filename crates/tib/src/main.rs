use std::sync::Arc;

use tib_core::{config::Config, store::SqliteMembershipStore};
use tib_openai::{OpenAiClient, OpenAiConfig};

#[tokio::main]
async fn main() -> Result<(), tib_core::Error> {
    tib_core::logging::init("tib")?;

    let cfg = match Config::load() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            tracing::error!(error = %e, "startup configuration invalid");
            return Err(e);
        }
    };
    tracing::info!(config = %cfg.summary(), "configuration loaded");

    let store = Arc::new(SqliteMembershipStore::open(&cfg.db_path).await?);
    let completion = Arc::new(OpenAiClient::new(OpenAiConfig::from(cfg.as_ref()))?);

    tib_telegram::router::run_polling(cfg, store, completion)
        .await
        .map_err(|e| tib_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
