use chrono::{DateTime, Utc};
use url::Url;

use crate::model::Bookmark;

/// Host part of `url`, or the raw string when it does not parse. Stored
/// bookmarks are never re-validated for display.
pub fn hostname(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Short age label such as `5m ago`. Months are counted as 30 days.
pub fn relative_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - created_at).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{days}d ago");
    }

    format!("{}mo ago", days / 30)
}

/// One line of the terminal list: position, title, host and age.
pub fn format_row(position: usize, bookmark: &Bookmark, now: DateTime<Utc>) -> String {
    format!(
        "{:>3}. {}  ({})  {}",
        position,
        bookmark.title,
        hostname(&bookmark.url),
        relative_age(bookmark.created_at, now)
    )
}
