//! The broadcast state snapshot.
//!
//! [`StreamwallState`] is rebuilt in full on every relevant change and sent
//! to every surface; clients never receive diffs.

use crate::roles::Role;
use serde::{Deserialize, Serialize};
use streamwall_streams::{CanonicalStreamList, ContentKind, StreamData, StreamRecord};

/// Everything a control surface needs to render the wall.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamwallState {
    pub identity: Identity,
    /// Token listings, only present for roles that may manage tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthState>,
    pub config: StreamWindowConfig,
    pub streams: CanonicalStreamList,
    pub custom_streams: Vec<StreamData>,
    pub views: Vec<ViewState>,
    pub streamdelay: Option<StreamDelayStatus>,
}

/// Who the receiving surface is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub role: Role,
}

impl Default for Identity {
    fn default() -> Self {
        Self { role: Role::Local }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub invites: Vec<AuthTokenInfo>,
    pub sessions: Vec<AuthTokenInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Invite,
    Session,
}

/// Public description of an auth token. Never includes the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokenInfo {
    pub token_id: String,
    pub kind: TokenKind,
    pub role: Role,
    pub name: String,
}

/// Geometry and colors of the wall window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamWindowConfig {
    /// Slots per row and per column
    pub grid_count: usize,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    pub frameless: bool,
    pub active_color: String,
    pub background_color: String,
}

impl Default for StreamWindowConfig {
    fn default() -> Self {
        Self {
            grid_count: 3,
            width: 1920,
            height: 1080,
            x: None,
            y: None,
            frameless: false,
            active_color: "#fff".into(),
            background_color: "#000".into(),
        }
    }
}

impl StreamWindowConfig {
    /// Largest grid a wall is configured with.
    pub const MAX_GRID_COUNT: usize = 16;

    pub fn slot_count(&self) -> usize {
        self.grid_count.saturating_mul(self.grid_count)
    }

    /// Pixel rectangle of slot `index`, row-major.
    pub fn slot_pos(&self, index: usize) -> Option<ViewPos> {
        if self.grid_count == 0 || index >= self.slot_count() {
            return None;
        }
        let grid = self.grid_count as u32;
        let width = self.width / grid;
        let height = self.height / grid;
        let (row, col) = (index / self.grid_count, index % self.grid_count);
        Some(ViewPos {
            x: col as u32 * width,
            y: row as u32 * height,
            width,
            height,
            spaces: vec![index],
        })
    }
}

/// State reported by the stream delay service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDelayStatus {
    pub is_connected: bool,
    pub delay_seconds: f64,
    pub restart_seconds: f64,
    pub is_censored: bool,
    pub is_stream_running: bool,
    pub start_time: f64,
    pub state: String,
}

/// One slot of the wall as displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub state: ViewStateValue,
    pub context: ViewContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewContext {
    pub id: usize,
    pub content: Option<ViewContent>,
    pub info: Option<ContentViewInfo>,
    pub pos: Option<ViewPos>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewContent {
    pub url: String,
    pub kind: ContentKind,
}

impl From<&StreamRecord> for ViewContent {
    fn from(record: &StreamRecord) -> Self {
        Self {
            url: record.link.clone(),
            kind: record.kind,
        }
    }
}

/// Metadata scraped from a loaded view by the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentViewInfo {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewPos {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Grid slots this view covers
    pub spaces: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoState {
    Normal,
    Blurred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioState {
    Muted,
    Background,
    Listening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub video: VideoState,
    pub audio: AudioState,
}

/// State of a view.
///
/// Serialized as `"empty"` or `{"displaying": {"running": {...}}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ViewStateRepr", into = "ViewStateRepr")]
pub enum ViewStateValue {
    Empty,
    Running(PlaybackState),
}

impl ViewStateValue {
    pub fn playback(&self) -> Option<PlaybackState> {
        match self {
            Self::Empty => None,
            Self::Running(playback) => Some(*playback),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ViewStateRepr {
    Empty(EmptyTag),
    Displaying { displaying: RunningRepr },
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EmptyTag {
    Empty,
}

#[derive(Clone, Serialize, Deserialize)]
struct RunningRepr {
    running: PlaybackState,
}

impl From<ViewStateRepr> for ViewStateValue {
    fn from(repr: ViewStateRepr) -> Self {
        match repr {
            ViewStateRepr::Empty(_) => Self::Empty,
            ViewStateRepr::Displaying { displaying } => Self::Running(displaying.running),
        }
    }
}

impl From<ViewStateValue> for ViewStateRepr {
    fn from(value: ViewStateValue) -> Self {
        match value {
            ViewStateValue::Empty => Self::Empty(EmptyTag::Empty),
            ViewStateValue::Running(running) => Self::Displaying {
                displaying: RunningRepr { running },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_view_state_is_a_string() {
        assert_eq!(serde_json::to_value(ViewStateValue::Empty).unwrap(), json!("empty"));
    }

    #[test]
    fn running_view_state_shape() {
        let value = ViewStateValue::Running(PlaybackState {
            video: VideoState::Blurred,
            audio: AudioState::Listening,
        });
        let encoded = serde_json::to_value(value).unwrap();

        assert_eq!(
            encoded,
            json!({"displaying": {"running": {"video": "blurred", "audio": "listening"}}})
        );
        assert_eq!(serde_json::from_value::<ViewStateValue>(encoded).unwrap(), value);
    }

    #[test]
    fn slot_positions_follow_grid() {
        let config = StreamWindowConfig {
            grid_count: 3,
            width: 900,
            height: 600,
            ..Default::default()
        };

        let pos = config.slot_pos(5).unwrap();
        assert_eq!((pos.x, pos.y, pos.width, pos.height), (600, 200, 300, 200));
        assert_eq!(pos.spaces, vec![5]);
        assert!(config.slot_pos(9).is_none());
    }

    #[test]
    fn oversized_grid_does_not_overflow() {
        let config = StreamWindowConfig {
            grid_count: usize::MAX,
            ..Default::default()
        };
        assert_eq!(config.slot_count(), usize::MAX);
    }

    #[test]
    fn auth_omitted_when_absent() {
        let value = serde_json::to_value(StreamwallState::default()).unwrap();
        assert!(value.get("auth").is_none());
        assert_eq!(value["identity"]["role"], "local");
        assert!(value["streamdelay"].is_null());
        assert!(value["customStreams"].is_array());
    }
}
