use super::{Surface, SurfaceKind, TrayMenu};

/// Windowing backend that materialises surfaces. The registry calls it after every
/// state change; implementations must not call back into the registry.
pub trait SurfaceHost: Send {
    fn create(&mut self, surface: &Surface);
    fn set_visible(&mut self, kind: SurfaceKind, visible: bool);
    fn focus(&mut self, kind: SurfaceKind);
    fn destroy(&mut self, kind: SurfaceKind);
    fn set_tray_menu(&mut self, menu: &TrayMenu);
}
