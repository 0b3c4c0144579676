/// Shared domain enums used by the store, the platform clients and the HTTP layer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Social platforms the relay can connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
    #[serde(rename = "youtube")]
    YouTube,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Facebook, Platform::Instagram, Platform::YouTube];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::YouTube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            "youtube" => Ok(Platform::YouTube),
            _ => Err(ParseEnumError { kind: "platform", value: s.to_string() }),
        }
    }
}

/// Shape of a post, which decides the platform endpoint it is relayed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Text,
    Link,
    Photo,
    Video,
    Reel,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Text => "text",
            PostKind::Link => "link",
            PostKind::Photo => "photo",
            PostKind::Video => "video",
            PostKind::Reel => "reel",
        }
    }

    pub fn needs_media(&self) -> bool {
        matches!(self, PostKind::Photo | PostKind::Video | PostKind::Reel)
    }

    pub fn is_video(&self) -> bool {
        matches!(self, PostKind::Video | PostKind::Reel)
    }
}

impl fmt::Display for PostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(PostKind::Text),
            "link" => Ok(PostKind::Link),
            "photo" => Ok(PostKind::Photo),
            "video" => Ok(PostKind::Video),
            "reel" => Ok(PostKind::Reel),
            _ => Err(ParseEnumError { kind: "post kind", value: s.to_string() }),
        }
    }
}

/// Publication state of a post
///
/// ```text
/// Draft      -> Scheduled | Publishing | Cancelled
/// Scheduled  -> Draft | Publishing | Cancelled
/// Publishing -> Published | Failed | Scheduled (retry)
/// Failed     -> Scheduled | Publishing | Cancelled
/// ```
/// Published and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
            PostStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: PostStatus) -> bool {
        use PostStatus::*;

        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Draft, Publishing)
                | (Draft, Cancelled)
                | (Scheduled, Draft)
                | (Scheduled, Publishing)
                | (Scheduled, Cancelled)
                | (Publishing, Published)
                | (Publishing, Failed)
                | (Publishing, Scheduled)
                | (Failed, Scheduled)
                | (Failed, Publishing)
                | (Failed, Cancelled)
        )
    }

    /// Content may still be edited in these states
    pub fn is_editable(&self) -> bool {
        matches!(self, PostStatus::Draft | PostStatus::Scheduled | PostStatus::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Published | PostStatus::Cancelled)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            "cancelled" => Ok(PostStatus::Cancelled),
            _ => Err(ParseEnumError { kind: "post status", value: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!("YouTube".parse::<Platform>().unwrap(), Platform::YouTube);
        assert_eq!(" facebook ".parse::<Platform>().unwrap(), Platform::Facebook);
        assert!("tiktok".parse::<Platform>().is_err());
    }

    #[test]
    fn platform_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Platform::YouTube).unwrap(), "\"youtube\"");
        let parsed: Platform = serde_json::from_str("\"instagram\"").unwrap();
        assert_eq!(parsed, Platform::Instagram);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for next in [
            PostStatus::Draft,
            PostStatus::Scheduled,
            PostStatus::Publishing,
            PostStatus::Published,
            PostStatus::Failed,
            PostStatus::Cancelled,
        ] {
            assert!(!PostStatus::Published.can_transition_to(next));
            assert!(!PostStatus::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn publishing_can_only_finish_or_retry() {
        assert!(PostStatus::Publishing.can_transition_to(PostStatus::Published));
        assert!(PostStatus::Publishing.can_transition_to(PostStatus::Failed));
        assert!(PostStatus::Publishing.can_transition_to(PostStatus::Scheduled));
        assert!(!PostStatus::Publishing.can_transition_to(PostStatus::Draft));
        assert!(!PostStatus::Publishing.can_transition_to(PostStatus::Cancelled));
    }

    #[test]
    fn draft_cannot_skip_to_published() {
        assert!(!PostStatus::Draft.can_transition_to(PostStatus::Published));
        assert!(PostStatus::Draft.can_transition_to(PostStatus::Scheduled));
    }
}
