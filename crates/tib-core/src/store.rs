//! Membership store: who may use the bot, plus an append-only audit trail.

use std::{path::Path, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::{
    domain::{ActionRecord, Member, MemberAction, UserId},
    errors::Error,
    Result,
};

/// Durable allow-list.
///
/// Mutations append to the audit trail in the same transaction as the row
/// change. Mutation failures propagate; membership checks fail closed.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Insert if absent. A duplicate add is a no-op (still audited).
    async fn add(&self, user_id: UserId, display_name: Option<&str>) -> Result<()>;

    /// Delete if present. Removing a non-member succeeds (still audited).
    async fn remove(&self, user_id: UserId) -> Result<()>;

    /// Raw membership lookup; callers that gate access should use [`Self::is_member`].
    async fn lookup(&self, user_id: UserId) -> Result<bool>;

    /// All members, most recently added first.
    async fn list(&self) -> Result<Vec<Member>>;

    /// Audit trail, newest first.
    async fn recent_actions(&self, limit: u32) -> Result<Vec<ActionRecord>>;

    /// Membership check that treats storage failures as "not a member".
    async fn is_member(&self, user_id: UserId) -> bool {
        match self.lookup(user_id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(user_id = user_id.0, error = %e, "membership lookup failed; denying");
                false
            }
        }
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    telegram_id: i64,
    username: Option<String>,
    added_at: i64,
}

impl From<MemberRow> for Member {
    fn from(r: MemberRow) -> Self {
        Self {
            user_id: UserId(r.telegram_id),
            display_name: r.username,
            added_at: from_millis(r.added_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: i64,
    telegram_id: i64,
    action: String,
    created_at: i64,
}

impl TryFrom<ActionRow> for ActionRecord {
    type Error = Error;

    fn try_from(r: ActionRow) -> Result<Self> {
        let action = MemberAction::parse(&r.action).ok_or_else(|| {
            Error::External(format!("unknown audit action {:?} in row {}", r.action, r.id))
        })?;
        Ok(Self {
            id: r.id,
            user_id: UserId(r.telegram_id),
            action,
            created_at: from_millis(r.created_at),
        })
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

/// SQLite-backed membership store.
#[derive(Clone)]
pub struct SqliteMembershipStore {
    pool: SqlitePool,
}

impl SqliteMembershipStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;
        Self::init(&pool).await?;
        tracing::info!(path = %path.display(), "membership database ready");
        Ok(Self::new(pool))
    }

    /// Private in-memory database. The one connection is never recycled, since
    /// dropping it would drop the database.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        Self::init(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Create both tables if absent.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS users (
                telegram_id INTEGER PRIMARY KEY,
                username    TEXT,
                added_at    INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS logs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_id INTEGER NOT NULL,
                action      TEXT    NOT NULL,
                created_at  INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for SqliteMembershipStore {
    async fn add(&self, user_id: UserId, display_name: Option<&str>) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO users (telegram_id, username, added_at) VALUES (?, ?, ?)",
        )
        .bind(user_id.0)
        .bind(display_name)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        sqlx::query("INSERT INTO logs (telegram_id, action, created_at) VALUES (?, ?, ?)")
            .bind(user_id.0)
            .bind(MemberAction::Add.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = user_id.0, new = inserted > 0, "member added");
        Ok(())
    }

    async fn remove(&self, user_id: UserId) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM users WHERE telegram_id = ?")
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("INSERT INTO logs (telegram_id, action, created_at) VALUES (?, ?, ?)")
            .bind(user_id.0)
            .bind(MemberAction::Remove.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = user_id.0, existed = deleted > 0, "member removed");
        Ok(())
    }

    async fn lookup(&self, user_id: UserId) -> Result<bool> {
        let row = sqlx::query_scalar::<_, i64>("SELECT 1 FROM users WHERE telegram_id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn list(&self) -> Result<Vec<Member>> {
        let rows = sqlx::query_as::<_, MemberRow>(
            "SELECT telegram_id, username, added_at FROM users ORDER BY added_at DESC, telegram_id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Member::from).collect())
    }

    async fn recent_actions(&self, limit: u32) -> Result<Vec<ActionRecord>> {
        let rows = sqlx::query_as::<_, ActionRow>(
            "SELECT id, telegram_id, action, created_at FROM logs ORDER BY id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
