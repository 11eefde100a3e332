//! The single "gesture control enabled" flag.
//!
//! The core owns the authoritative [`SystemActiveState`]; each surface keeps a
//! [`SystemStateReplica`] that changes only through its own toggles or core broadcasts.

use crate::surfaces::SurfaceKind;

/// An accepted change, ready to broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub active: bool,
    pub writer: SurfaceKind,
    pub revision: u64,
}

/// Authoritative value held by the core. Last write wins.
#[derive(Debug, Clone)]
pub struct SystemActiveState {
    active: bool,
    last_writer: Option<SurfaceKind>,
    revision: u64,
}

impl Default for SystemActiveState {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemActiveState {
    pub fn new() -> Self {
        Self {
            active: true,
            last_writer: None,
            revision: 0,
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Surface that last changed the value, if any did.
    pub fn last_writer(&self) -> Option<SurfaceKind> {
        self.last_writer
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Record a reported value. Returns `None` when it matches the current value.
    pub fn apply(&mut self, active: bool, writer: SurfaceKind) -> Option<StateChange> {
        if self.active == active {
            return None;
        }
        self.active = active;
        self.last_writer = Some(writer);
        self.revision += 1;
        tracing::info!(
            active,
            writer = writer.label(),
            revision = self.revision,
            "system state changed"
        );
        Some(StateChange {
            active,
            writer,
            revision: self.revision,
        })
    }
}

/// A surface's local copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemStateReplica {
    active: bool,
}

impl Default for SystemStateReplica {
    fn default() -> Self {
        Self { active: true }
    }
}

impl SystemStateReplica {
    pub fn active(&self) -> bool {
        self.active
    }

    /// Returns true when the value changed.
    pub fn set(&mut self, active: bool) -> bool {
        let changed = self.active != active;
        self.active = active;
        changed
    }

    /// Flip the value for a user toggle and return the new value.
    pub fn toggle(&mut self) -> bool {
        self.active = !self.active;
        self.active
    }
}
