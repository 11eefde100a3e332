//! Turns transient gesture events into a label that stays on screen for a fixed dwell.
//!
//! `Idle -> Showing(label, expires_at) -> Idle`. Every qualifying gesture restarts the
//! full dwell window; the owning loop calls [`GestureDisplay::tick`] to expire it.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use crate::telemetry::{GestureTag, PlayPauseDisplay};

pub const GESTURE_DWELL: Duration = Duration::from_millis(2_000);

/// Human label for a gesture tag.
pub fn gesture_label<'a>(
    tag: &'a GestureTag,
    play_pause: Option<&PlayPauseDisplay>,
) -> Cow<'a, str> {
    match tag {
        GestureTag::PlayPause => {
            if play_pause == Some(&PlayPauseDisplay::Pause) {
                Cow::Borrowed("PAUSE")
            } else {
                Cow::Borrowed("PLAY")
            }
        }
        GestureTag::SwipeLeft => Cow::Borrowed("PREVIOUS"),
        GestureTag::SwipeRight => Cow::Borrowed("NEXT"),
        GestureTag::SwipeUp => Cow::Borrowed("VOLUME UP"),
        GestureTag::SwipeDown => Cow::Borrowed("VOLUME DOWN"),
        GestureTag::SystemToggle | GestureTag::Unmapped(_) => Cow::Borrowed(tag.as_str()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayState {
    Idle,
    Showing { label: String, expires_at: Instant },
}

#[derive(Debug, Clone)]
pub struct GestureDisplay {
    dwell: Duration,
    state: DisplayState,
}

impl Default for GestureDisplay {
    fn default() -> Self {
        Self::new(GESTURE_DWELL)
    }
}

impl GestureDisplay {
    pub fn new(dwell: Duration) -> Self {
        Self {
            dwell,
            state: DisplayState::Idle,
        }
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn label(&self) -> Option<&str> {
        match &self.state {
            DisplayState::Idle => None,
            DisplayState::Showing { label, .. } => Some(label),
        }
    }

    /// When the current label expires, if one is showing.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            DisplayState::Idle => None,
            DisplayState::Showing { expires_at, .. } => Some(*expires_at),
        }
    }

    /// Show a gesture, replacing any current label and restarting the dwell.
    /// System toggles never produce a label; returns false for them.
    pub fn observe(
        &mut self,
        tag: &GestureTag,
        play_pause: Option<&PlayPauseDisplay>,
        now: Instant,
    ) -> bool {
        if *tag == GestureTag::SystemToggle {
            return false;
        }
        self.state = DisplayState::Showing {
            label: gesture_label(tag, play_pause).into_owned(),
            expires_at: now + self.dwell,
        };
        true
    }

    /// Clear an expired label. Returns true when the label was cleared.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(expires_at) if now >= expires_at => {
                self.state = DisplayState::Idle;
                true
            }
            _ => false,
        }
    }
}
