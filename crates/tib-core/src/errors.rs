/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the dispatch
/// layer can turn any failure into a reply instead of dropping the event.
/// Upstream completion failures are not errors; see `model::types::CompletionReply`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
