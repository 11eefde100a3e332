//! The three visible surfaces (main window, floating widget, tray) and their
//! show/hide/focus lifecycle. Rendering belongs to a [`SurfaceHost`]; the registry only
//! decides what should be visible.

mod host;
mod registry;
mod tray;

use serde::{Deserialize, Serialize};

pub use host::SurfaceHost;
#[cfg(test)]
pub(crate) use host::testing;
pub use registry::{CloseOutcome, SurfaceRegistry};
pub use tray::{TrayAction, TrayMenu, TrayMenuItem};

/// Display name used in tray labels and tooltips.
pub const APP_NAME: &str = "OKTrix";

pub const MAIN_WIDTH: u32 = 1400;
pub const MAIN_HEIGHT: u32 = 900;
pub const WIDGET_SIZE: u32 = 80;
/// Widget distance from the right edge of the work area.
pub const WIDGET_RIGHT_INSET: u32 = 100;
pub const WIDGET_TOP_INSET: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    Main,
    Widget,
    Tray,
}

impl SurfaceKind {
    pub const ALL: [SurfaceKind; 3] = [SurfaceKind::Main, SurfaceKind::Widget, SurfaceKind::Tray];

    pub fn label(self) -> &'static str {
        match self {
            SurfaceKind::Main => "main",
            SurfaceKind::Widget => "widget",
            SurfaceKind::Tray => "tray",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Shown,
    Hidden,
}

/// Usable area of the primary display, sampled once when surfaces are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkArea {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Window flags a host needs when it materialises a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SurfaceTraits {
    pub frameless: bool,
    pub always_on_top: bool,
    pub resizable: bool,
    pub skip_taskbar: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub kind: SurfaceKind,
    pub visibility: Visibility,
    pub focused: bool,
    pub bounds: Option<Bounds>,
    pub traits: SurfaceTraits,
}

impl Surface {
    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Shown
    }
}

/// Main window geometry, centred in the work area.
pub fn main_bounds(area: WorkArea) -> Bounds {
    let width = MAIN_WIDTH.min(area.width);
    let height = MAIN_HEIGHT.min(area.height);
    Bounds {
        x: (area.width - width) / 2,
        y: (area.height - height) / 2,
        width,
        height,
    }
}

/// Widget geometry pinned near the top-right corner of the work area.
pub fn widget_bounds(area: WorkArea) -> Bounds {
    Bounds {
        x: area.width.saturating_sub(WIDGET_RIGHT_INSET),
        y: WIDGET_TOP_INSET,
        width: WIDGET_SIZE,
        height: WIDGET_SIZE,
    }
}
