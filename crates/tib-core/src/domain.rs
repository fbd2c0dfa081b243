use std::fmt;

use chrono::{DateTime, Utc};

/// Telegram user id (numeric). This is the caller identity used for access control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// A caller granted access by the administrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Kind of membership mutation recorded in the audit trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberAction {
    Add,
    Remove,
}

impl MemberAction {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberAction::Add => "add",
            MemberAction::Remove => "remove",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(MemberAction::Add),
            "remove" => Some(MemberAction::Remove),
            _ => None,
        }
    }
}

/// One append-only audit entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionRecord {
    pub id: i64,
    pub user_id: UserId,
    pub action: MemberAction,
    pub created_at: DateTime<Utc>,
}

/// Result of the authorization gate for one caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Admin,
    Allowed,
    Denied,
}

impl Access {
    /// Admin and allowed callers may use completions.
    pub fn can_relay(self) -> bool {
        matches!(self, Access::Admin | Access::Allowed)
    }

    /// Only the administrator may mutate or list membership.
    pub fn is_admin(self) -> bool {
        self == Access::Admin
    }
}
