//! Core types for StreamBank

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stream category. Radio and TV are built in; manifests may declare others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Radio,
    Tv,
    Other(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Radio => "radio",
            Category::Tv => "tv",
            Category::Other(name) => name,
        }
    }

    /// Default card color used when a manifest does not provide one
    pub fn default_color(&self) -> &'static str {
        match self {
            Category::Radio => "#2ecc71",
            Category::Tv => "#e74c3c",
            Category::Other(_) => "#3498db",
        }
    }

    /// Default icon used when a manifest does not provide one
    pub fn default_icon(&self) -> &'static str {
        match self {
            Category::Radio => "fas fa-radio",
            Category::Tv => "fas fa-tv",
            Category::Other(_) => "fas fa-broadcast-tower",
        }
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "radio" => Category::Radio,
            "tv" => Category::Tv,
            other => Category::Other(other.to_string()),
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Category::from(s.as_str())
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Category::from(s))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive fields carried for display only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One playable radio or TV stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEntry {
    /// Stable identifier, unique within a catalog
    pub id: String,
    /// Category the entry belongs to
    pub category: Category,
    /// Display label
    pub name: String,
    /// Primary playable URI
    pub url: String,
    /// Alternate URIs, tried strictly in order
    #[serde(default)]
    pub backup_urls: Vec<String>,
    /// Display metadata
    #[serde(flatten)]
    pub metadata: StreamMetadata,
    /// Length in seconds; `None` means live
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl StreamEntry {
    /// Live streams have no known duration
    pub fn is_live(&self) -> bool {
        self.duration.is_none()
    }

    pub fn has_backups(&self) -> bool {
        !self.backup_urls.is_empty()
    }

    /// Primary URL followed by the backups, in cascade order
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.url.as_str()).chain(self.backup_urls.iter().map(String::as_str))
    }
}

/// Classification of an error reported by the media pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    Network,
    Media,
    Other,
}

impl std::fmt::Display for PipelineErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineErrorKind::Network => write!(f, "network error"),
            PipelineErrorKind::Media => write!(f, "media error"),
            PipelineErrorKind::Other => write!(f, "other error"),
        }
    }
}

/// Ticket identifying one load attempt issued to the pipeline.
///
/// Tokens increase monotonically for the lifetime of a session. Events and
/// timers tagged with anything but the current token are stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LoadToken(pub u64);

impl LoadToken {
    pub fn next(self) -> Self {
        LoadToken(self.0 + 1)
    }
}

impl std::fmt::Display for LoadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Playback session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// No source loaded
    Idle,
    /// A source was handed to the pipeline and is not ready yet
    Loading,
    /// The pipeline reported the source ready
    Playing,
    /// Every source of the current entry failed, or the environment cannot play it
    Failed,
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, target),
            // Any state may start a new load (selection, retry, cascade)
            (_, Loading) |
            (Loading, Playing) |
            (Loading, Failed) | (Playing, Failed) | (Idle, Failed) |
            // stop()
            (Loading, Idle) | (Playing, Idle) | (Failed, Idle) | (Idle, Idle)
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackState::Loading | PlaybackState::Playing)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Failed => write!(f, "failed"),
        }
    }
}

/// State change notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub current_entry: Option<StreamEntry>,
    pub active_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            current_entry: None,
            active_url: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parsing() {
        assert_eq!(Category::from("Radio"), Category::Radio);
        assert_eq!(Category::from("tv"), Category::Tv);
        assert_eq!(Category::from("podcast"), Category::Other("podcast".into()));
        assert_eq!(Category::Other("podcast".into()).to_string(), "podcast");
    }

    #[test]
    fn test_category_serde_as_string() {
        let json = serde_json::to_string(&Category::Tv).unwrap();
        assert_eq!(json, "\"tv\"");
        let back: Category = serde_json::from_str("\"radio\"").unwrap();
        assert_eq!(back, Category::Radio);
    }

    #[test]
    fn test_state_transitions() {
        assert!(PlaybackState::Idle.can_transition_to(PlaybackState::Loading));
        assert!(PlaybackState::Loading.can_transition_to(PlaybackState::Playing));
        assert!(PlaybackState::Failed.can_transition_to(PlaybackState::Loading));
        assert!(PlaybackState::Failed.can_transition_to(PlaybackState::Idle));

        assert!(!PlaybackState::Idle.can_transition_to(PlaybackState::Playing));
        assert!(!PlaybackState::Failed.can_transition_to(PlaybackState::Playing));
    }

    #[test]
    fn test_entry_sources_order() {
        let entry = StreamEntry {
            id: "radio-1".into(),
            category: Category::Radio,
            name: "Test FM".into(),
            url: "https://a/x.m3u8".into(),
            backup_urls: vec!["https://b/x.m3u8".into(), "https://c/x.m3u8".into()],
            metadata: StreamMetadata::default(),
            duration: None,
        };
        let sources: Vec<_> = entry.sources().collect();
        assert_eq!(sources, vec!["https://a/x.m3u8", "https://b/x.m3u8", "https://c/x.m3u8"]);
        assert!(entry.is_live());
    }
}
