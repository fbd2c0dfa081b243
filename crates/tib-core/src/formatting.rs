//! Plain-text helpers for chat replies and log lines.

use crate::domain::Member;

/// Keep at most `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let mut it = text.char_indices();
    match it.nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Split text into chunks of at most `limit` characters.
///
/// Prefers breaking after a newline in the second half of a window; otherwise
/// cuts at the limit. Never splits inside a UTF-8 character.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut out = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        // Byte offset just past `limit` characters.
        let window_end = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..window_end];

        let cut = match window.rfind('\n') {
            Some(nl) if window[..nl].chars().count() >= limit / 2 => nl + 1,
            _ => window_end,
        };

        out.push(rest[..cut].trim_end_matches('\n').to_string());
        rest = &rest[cut..];
    }

    if !rest.is_empty() || out.is_empty() {
        out.push(rest.to_string());
    }
    out
}

/// Numbered member report for `/list`.
pub fn format_member_list(members: &[Member]) -> String {
    if members.is_empty() {
        return "The allow-list is empty.".to_string();
    }

    let mut out = format!("Allowed users ({}):\n", members.len());
    for (i, m) in members.iter().enumerate() {
        let name = m
            .display_name
            .as_deref()
            .map(|n| format!(" ({n})"))
            .unwrap_or_default();
        out.push_str(&format!(
            "{}. {}{} added {}\n",
            i + 1,
            m.user_id,
            name,
            m.added_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    out.trim_end().to_string()
}
