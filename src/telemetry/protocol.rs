//! Engine stream messages. Newline-delimited JSON tagged with `"event"`.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::frames::FrameError;

// ============================================================================
// Client → engine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientMessage {
    StartTracking,
    StopTracking,
    ToggleSystem { active: bool },
}

// ============================================================================
// Engine → client
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerMessage {
    TrackingUpdate(TelemetryEvent),
}

/// One tracking update pushed by the engine.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TelemetryEvent {
    #[serde(default)]
    pub hand_detected: bool,
    #[serde(default)]
    pub activation_progress: Option<f64>,
    #[serde(default)]
    pub system_active: Option<bool>,
    #[serde(default)]
    pub current_gesture: Option<GestureTag>,
    #[serde(default)]
    pub play_pause_display: Option<PlayPauseDisplay>,
    #[serde(default)]
    pub tracking_frame: Option<FramePayload>,
}

impl TelemetryEvent {
    /// Activation progress clamped to `[0, 1]`; missing or non-finite values read as 0.
    pub fn activation_progress(&self) -> f64 {
        match self.activation_progress {
            Some(value) if value.is_finite() => value.clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    /// Gesture that should reach the display: present, non-empty and not a system toggle.
    pub fn displayable_gesture(&self) -> Option<&GestureTag> {
        self.current_gesture
            .as_ref()
            .filter(|tag| !tag.is_empty() && **tag != GestureTag::SystemToggle)
    }
}

/// Gesture tags the engine emits. Unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum GestureTag {
    PlayPause,
    SwipeLeft,
    SwipeRight,
    SwipeUp,
    SwipeDown,
    /// Toggles the system-active flag; never displayed.
    SystemToggle,
    Unmapped(String),
}

impl From<String> for GestureTag {
    fn from(value: String) -> Self {
        match value.as_str() {
            "play_pause" => GestureTag::PlayPause,
            "swipe_left" => GestureTag::SwipeLeft,
            "swipe_right" => GestureTag::SwipeRight,
            "swipe_up" => GestureTag::SwipeUp,
            "swipe_down" => GestureTag::SwipeDown,
            "system_toggle" => GestureTag::SystemToggle,
            _ => GestureTag::Unmapped(value),
        }
    }
}

impl GestureTag {
    pub fn as_str(&self) -> &str {
        match self {
            GestureTag::PlayPause => "play_pause",
            GestureTag::SwipeLeft => "swipe_left",
            GestureTag::SwipeRight => "swipe_right",
            GestureTag::SwipeUp => "swipe_up",
            GestureTag::SwipeDown => "swipe_down",
            GestureTag::SystemToggle => "system_toggle",
            GestureTag::Unmapped(tag) => tag,
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, GestureTag::Unmapped(tag) if tag.is_empty())
    }
}

/// What the media player will do on the next play/pause gesture.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PlayPauseDisplay {
    Pause,
    Play,
    Other(String),
}

impl From<String> for PlayPauseDisplay {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PAUSE" => PlayPauseDisplay::Pause,
            "PLAY" => PlayPauseDisplay::Play,
            _ => PlayPauseDisplay::Other(value),
        }
    }
}

/// Encoded still image, normally a `data:image/...;base64,` URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct FramePayload(pub String);

impl FramePayload {
    /// Raw image bytes. Bare base64 without a data-URL prefix is accepted too.
    pub fn image_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let encoded = match self.0.strip_prefix("data:") {
            Some(rest) => {
                let (meta, data) = rest.split_once(',').ok_or(FrameError::NotDataUrl)?;
                if !meta.ends_with(";base64") || !meta.starts_with("image/") {
                    return Err(FrameError::NotDataUrl);
                }
                data
            }
            None => self.0.as_str(),
        };
        Ok(base64::engine::general_purpose::STANDARD.decode(encoded.trim())?)
    }
}

/// Parse one line from the engine. `Ok(None)` for events this client does not consume.
pub fn parse_server_line(line: &str) -> Result<Option<TelemetryEvent>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    match value.get("event").and_then(serde_json::Value::as_str) {
        Some("tracking_update") => {
            let ServerMessage::TrackingUpdate(event) = serde_json::from_value(value)?;
            Ok(Some(event))
        }
        _ => Ok(None),
    }
}
