use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::UserId, errors::Error, Result};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_DB_PATH: &str = "bot_users.db";
pub const DEFAULT_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(240);

/// Telegram hard limit for one text message.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Typed configuration, read once at startup.
#[derive(Clone)]
pub struct Config {
    pub telegram_token: String,
    pub openai_api_key: String,
    pub admin_id: UserId,
    pub model: String,
    pub db_path: PathBuf,
    pub chat_url: String,
    pub completion_timeout: Duration,
    pub message_limit: usize,
}

// Secrets never reach logs in full, not even through `{:?}`.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("telegram_token", &mask(Some(self.telegram_token.as_str())))
            .field("openai_api_key", &mask(Some(self.openai_api_key.as_str())))
            .field("admin_id", &self.admin_id)
            .field("model", &self.model)
            .field("db_path", &self.db_path)
            .field("chat_url", &self.chat_url)
            .field("completion_timeout", &self.completion_timeout)
            .field("message_limit", &self.message_limit)
            .finish()
    }
}

impl Config {
    /// Load from the process environment (after merging `.env`, if present).
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_token = get("TELEGRAM_TOKEN");
        let openai_api_key = get("OPENAI_API_KEY");
        let admin_raw = get("ADMIN_TELEGRAM_ID");

        let missing: Vec<&str> = [
            ("TELEGRAM_TOKEN", telegram_token.is_none()),
            ("OPENAI_API_KEY", openai_api_key.is_none()),
            ("ADMIN_TELEGRAM_ID", admin_raw.is_none()),
        ]
        .into_iter()
        .filter_map(|(k, absent)| absent.then_some(k))
        .collect();

        let (Some(telegram_token), Some(openai_api_key), Some(admin_raw)) =
            (telegram_token, openai_api_key, admin_raw)
        else {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        };

        let admin_id = admin_raw
            .trim()
            .parse::<i64>()
            .map(UserId)
            .map_err(|e| {
                Error::Config(format!("ADMIN_TELEGRAM_ID must be an integer ({admin_raw:?}): {e}"))
            })?;

        let model = get("MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let db_path = PathBuf::from(get("BOT_DB").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()));
        let chat_url = get("OPENAI_CHAT_URL").unwrap_or_else(|| DEFAULT_CHAT_URL.to_string());

        let completion_timeout = match get("OPENAI_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|e| {
                    Error::Config(format!("OPENAI_TIMEOUT_SECS must be a number ({raw:?}): {e}"))
                })?;
                Duration::from_secs(secs.max(1))
            }
            None => DEFAULT_COMPLETION_TIMEOUT,
        };

        Ok(Self {
            telegram_token,
            openai_api_key,
            admin_id,
            model,
            db_path,
            chat_url,
            completion_timeout,
            message_limit: TELEGRAM_MESSAGE_LIMIT,
        })
    }

    /// One-line summary safe for logs.
    pub fn summary(&self) -> String {
        format!(
            "telegram_token={} openai_api_key={} admin_id={} model={} db={} timeout={}s",
            mask(Some(self.telegram_token.as_str())),
            mask(Some(self.openai_api_key.as_str())),
            self.admin_id,
            self.model,
            self.db_path.display(),
            self.completion_timeout.as_secs()
        )
    }
}

/// Mask a secret for logging: keep 3 chars at each end.
pub fn mask(secret: Option<&str>) -> String {
    let Some(s) = secret.filter(|s| !s.is_empty()) else {
        return "<MISSING>".to_string();
    };
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}...{tail}")
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
