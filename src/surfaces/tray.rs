use serde::{Deserialize, Serialize};

use super::APP_NAME;

/// Clickable tray menu entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrayAction {
    ShowApp,
    ToggleWidget,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrayMenuItem {
    Action { action: TrayAction, label: String },
    Separator,
    Submenu { label: String, items: Vec<TrayMenuItem> },
}

/// Full tray menu. Rebuilt from scratch on every change rather than patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrayMenu {
    pub tooltip: String,
    pub items: Vec<TrayMenuItem>,
    /// Bumped on every rebuild so hosts can tell a regenerated menu from a stale one.
    pub generation: u64,
}

impl TrayMenu {
    pub fn build(widget_visible: bool, system_active: bool, generation: u64) -> Self {
        let widget_label = if widget_visible {
            "Hide Widget"
        } else {
            "Show Widget"
        };
        let tooltip = if system_active {
            format!("{APP_NAME} - active")
        } else {
            format!("{APP_NAME} - paused")
        };
        Self {
            tooltip,
            items: vec![
                TrayMenuItem::Action {
                    action: TrayAction::ShowApp,
                    label: format!("Show {APP_NAME}"),
                },
                TrayMenuItem::Separator,
                TrayMenuItem::Submenu {
                    label: "Widget".to_string(),
                    items: vec![TrayMenuItem::Action {
                        action: TrayAction::ToggleWidget,
                        label: widget_label.to_string(),
                    }],
                },
                TrayMenuItem::Separator,
                TrayMenuItem::Action {
                    action: TrayAction::Quit,
                    label: "Quit".to_string(),
                },
            ],
            generation,
        }
    }

    /// Label currently shown for an action, searching submenus.
    pub fn label_for(&self, action: TrayAction) -> Option<&str> {
        fn find(items: &[TrayMenuItem], action: TrayAction) -> Option<&str> {
            items.iter().find_map(|item| match item {
                TrayMenuItem::Action { action: a, label } if *a == action => Some(label.as_str()),
                TrayMenuItem::Submenu { items, .. } => find(items, action),
                _ => None,
            })
        }
        find(&self.items, action)
    }
}
