use super::{
    main_bounds, widget_bounds, Surface, SurfaceHost, SurfaceKind, SurfaceTraits, TrayAction,
    TrayMenu, Visibility, WorkArea,
};
use crate::log_debug;
use crate::supervisor::ReadyEngine;

/// What happened when a surface asked to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Close was intercepted and turned into a hide.
    Hidden,
    /// The surface was destroyed (only while quitting).
    Closed,
    /// The surface has no close affordance.
    Ignored,
}

/// Owns every surface for the lifetime of the core process.
///
/// Contract:
/// - Surfaces exist only after the engine is ready: construction needs a [`ReadyEngine`].
/// - Closing Main hides it unless `begin_quit` was called first.
/// - The widget and tray are never destroyed before `shutdown`.
/// - The tray menu is regenerated on every system-state or widget-visibility change.
pub struct SurfaceRegistry<H: SurfaceHost> {
    host: H,
    main: Surface,
    widget: Surface,
    tray: Surface,
    quitting: bool,
    system_active: bool,
    menu: TrayMenu,
    shut_down: bool,
}

impl<H: SurfaceHost> SurfaceRegistry<H> {
    pub fn create(engine: &ReadyEngine, mut host: H, area: WorkArea) -> Self {
        log_debug(&format!(
            "creating surfaces for engine pid {} on port {}",
            engine.pid(),
            engine.port()
        ));
        let main = Surface {
            kind: SurfaceKind::Main,
            visibility: Visibility::Shown,
            focused: true,
            bounds: Some(main_bounds(area)),
            traits: SurfaceTraits {
                frameless: false,
                always_on_top: false,
                resizable: true,
                skip_taskbar: false,
            },
        };
        let widget = Surface {
            kind: SurfaceKind::Widget,
            visibility: Visibility::Shown,
            focused: false,
            bounds: Some(widget_bounds(area)),
            traits: SurfaceTraits {
                frameless: true,
                always_on_top: true,
                resizable: false,
                skip_taskbar: true,
            },
        };
        let tray = Surface {
            kind: SurfaceKind::Tray,
            visibility: Visibility::Shown,
            focused: false,
            bounds: None,
            traits: SurfaceTraits {
                frameless: true,
                always_on_top: false,
                resizable: false,
                skip_taskbar: true,
            },
        };
        host.create(&main);
        host.create(&widget);
        host.create(&tray);

        let system_active = true;
        let menu = TrayMenu::build(widget.is_visible(), system_active, 0);
        host.set_tray_menu(&menu);

        Self {
            host,
            main,
            widget,
            tray,
            quitting: false,
            system_active,
            menu,
            shut_down: false,
        }
    }

    pub fn surface(&self, kind: SurfaceKind) -> &Surface {
        match kind {
            SurfaceKind::Main => &self.main,
            SurfaceKind::Widget => &self.widget,
            SurfaceKind::Tray => &self.tray,
        }
    }

    fn surface_mut(&mut self, kind: SurfaceKind) -> &mut Surface {
        match kind {
            SurfaceKind::Main => &mut self.main,
            SurfaceKind::Widget => &mut self.widget,
            SurfaceKind::Tray => &mut self.tray,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn system_active(&self) -> bool {
        self.system_active
    }

    pub fn tray_menu(&self) -> &TrayMenu {
        &self.menu
    }

    /// Show a surface. Returns false when nothing changed.
    pub fn show(&mut self, kind: SurfaceKind) -> bool {
        self.set_visibility(kind, Visibility::Shown)
    }

    /// Hide a surface. Returns false when nothing changed.
    pub fn hide(&mut self, kind: SurfaceKind) -> bool {
        self.set_visibility(kind, Visibility::Hidden)
    }

    fn set_visibility(&mut self, kind: SurfaceKind, visibility: Visibility) -> bool {
        if self.shut_down || kind == SurfaceKind::Tray {
            return false;
        }
        let surface = self.surface_mut(kind);
        if surface.visibility == visibility {
            return false;
        }
        surface.visibility = visibility;
        if visibility == Visibility::Hidden {
            surface.focused = false;
        }
        self.host.set_visible(kind, visibility == Visibility::Shown);
        if kind == SurfaceKind::Widget {
            self.rebuild_tray_menu();
        }
        true
    }

    pub fn focus(&mut self, kind: SurfaceKind) {
        if self.shut_down || kind == SurfaceKind::Tray || !self.surface(kind).is_visible() {
            return;
        }
        for other in [SurfaceKind::Main, SurfaceKind::Widget] {
            self.surface_mut(other).focused = other == kind;
        }
        self.host.focus(kind);
    }

    /// Show and focus Main (widget "Show" button, `openMainWindow`).
    pub fn open_main(&mut self) {
        self.show(SurfaceKind::Main);
        self.focus(SurfaceKind::Main);
    }

    /// Tray icon click.
    pub fn toggle_main(&mut self) {
        if self.main.is_visible() {
            self.hide(SurfaceKind::Main);
        } else {
            self.show(SurfaceKind::Main);
        }
    }

    pub fn toggle_widget(&mut self) {
        if self.widget.is_visible() {
            self.hide(SurfaceKind::Widget);
        } else {
            self.show(SurfaceKind::Widget);
        }
    }

    /// Handle a close request coming from a surface's window chrome.
    pub fn request_close(&mut self, kind: SurfaceKind) -> CloseOutcome {
        match kind {
            SurfaceKind::Main if self.quitting => {
                if !self.shut_down {
                    self.main.visibility = Visibility::Hidden;
                    self.main.focused = false;
                    self.host.destroy(SurfaceKind::Main);
                }
                CloseOutcome::Closed
            }
            SurfaceKind::Main => {
                self.hide(SurfaceKind::Main);
                CloseOutcome::Hidden
            }
            SurfaceKind::Widget | SurfaceKind::Tray => CloseOutcome::Ignored,
        }
    }

    /// Run a tray menu entry. Returns true when the entry asks the application to quit.
    pub fn activate_tray(&mut self, action: TrayAction) -> bool {
        match action {
            TrayAction::ShowApp => {
                self.show(SurfaceKind::Main);
                false
            }
            TrayAction::ToggleWidget => {
                self.toggle_widget();
                false
            }
            TrayAction::Quit => {
                self.begin_quit();
                true
            }
        }
    }

    /// Set the quitting flag so Main's close handler lets it close for real.
    pub fn begin_quit(&mut self) {
        if !self.quitting {
            log_debug("registry entering quit");
        }
        self.quitting = true;
    }

    /// Mirror a system-state broadcast into the tray. Repeated values are no-ops.
    pub fn apply_system_state(&mut self, active: bool) -> bool {
        if self.system_active == active {
            return false;
        }
        self.system_active = active;
        self.rebuild_tray_menu();
        true
    }

    fn rebuild_tray_menu(&mut self) {
        if self.shut_down {
            return;
        }
        let generation = self.menu.generation + 1;
        self.menu = TrayMenu::build(self.widget.is_visible(), self.system_active, generation);
        self.host.set_tray_menu(&self.menu);
    }

    /// Destroy every surface. Sets the quitting flag first so Main may close.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.begin_quit();
        if self.request_close(SurfaceKind::Main) != CloseOutcome::Closed {
            log_debug("main refused to close during shutdown");
        }
        for kind in [SurfaceKind::Widget, SurfaceKind::Tray] {
            let surface = self.surface_mut(kind);
            surface.visibility = Visibility::Hidden;
            surface.focused = false;
            self.host.destroy(kind);
        }
        self.shut_down = true;
    }
}
