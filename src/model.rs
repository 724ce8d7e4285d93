use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Validated input for the create call. Both fields are stored trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
}

impl NewBookmark {
    pub fn validate(title: &str, url: &str, owner_id: &str) -> Result<Self, ValidationError> {
        let title = title.trim();
        let url = url.trim();

        if title.is_empty() || url.is_empty() {
            return Err(ValidationError::Empty);
        }

        if !has_web_scheme(url) {
            return Err(ValidationError::BadUrl);
        }

        Ok(NewBookmark {
            title: title.to_string(),
            url: url.to_string(),
            owner_id: owner_id.to_string(),
        })
    }
}

fn has_web_scheme(url: &str) -> bool {
    let lowered = url.to_ascii_lowercase();
    let rest = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"));

    matches!(rest, Some(rest) if !rest.is_empty())
}

/// The signed-in user a session acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default)]
    pub email: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_fields() {
        assert_eq!(
            NewBookmark::validate("", "https://x.com", "u1"),
            Err(ValidationError::Empty)
        );
        assert_eq!(
            NewBookmark::validate("Title", "   ", "u1"),
            Err(ValidationError::Empty)
        );
    }

    #[test]
    fn rejects_non_web_scheme() {
        assert_eq!(
            NewBookmark::validate("Title", "ftp://x.com", "u1"),
            Err(ValidationError::BadUrl)
        );
        assert_eq!(
            NewBookmark::validate("Title", "https://", "u1"),
            Err(ValidationError::BadUrl)
        );
        assert_eq!(
            NewBookmark::validate("Title", "example.com", "u1"),
            Err(ValidationError::BadUrl)
        );
    }

    #[test]
    fn accepts_and_trims() {
        let input = NewBookmark::validate("  Rust  ", " HTTPS://Rust-Lang.org ", "u1").unwrap();
        assert_eq!(input.title, "Rust");
        assert_eq!(input.url, "HTTPS://Rust-Lang.org");
        assert_eq!(input.owner_id, "u1");
    }

    #[test]
    fn bookmark_uses_backend_column_names() {
        let json = r#"{
            "id": "a1",
            "user_id": "u1",
            "title": "Docs",
            "url": "https://docs.rs",
            "created_at": "2024-05-01T10:00:00.000Z"
        }"#;
        let bookmark: Bookmark = serde_json::from_str(json).unwrap();
        assert_eq!(bookmark.owner_id, "u1");
        assert_eq!(bookmark.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }
}
