//! Serialized snapshot types consumed by the switcher UI and the CLI.

use serde::{Deserialize, Serialize};

use crate::model::registry::Window;
use crate::sys::app::pid_t;
use crate::sys::geometry::CGRect;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowData {
    pub pid: pid_t,
    pub window_server_id: Option<u32>,
    pub title: Option<String>,
    pub is_fullscreen: bool,
    pub is_minimized: bool,
    pub is_app_placeholder: bool,
    pub is_focused: bool,
    pub frame: Option<CGRect>,
}

impl WindowData {
    pub fn from_window(window: &Window, is_focused: bool) -> WindowData {
        WindowData {
            pid: window.pid,
            window_server_id: window.server_id.map(|id| id.as_u32()),
            title: window.title.clone(),
            is_fullscreen: window.is_fullscreen,
            is_minimized: window.is_minimized,
            is_app_placeholder: window.is_app_placeholder,
            is_focused,
            frame: window.frame,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationData {
    pub pid: pid_t,
    pub bundle_id: Option<String>,
    pub name: String,
    pub is_really_launched: bool,
    pub is_hidden: bool,
    pub window_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub windows: Vec<WindowData>,
    pub applications: Vec<ApplicationData>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sys::accessibility::WindowServerId;

    #[test]
    fn window_data_snapshot_shape() {
        let window = Window {
            pid: 123,
            server_id: Some(WindowServerId::new(99)),
            title: Some("Test".to_string()),
            is_fullscreen: false,
            is_minimized: true,
            frame: Some(CGRect::new(1.0, 2.0, 3.0, 4.0)),
            is_app_placeholder: false,
        };
        let value = serde_json::to_value(WindowData::from_window(&window, true)).unwrap();
        let expected = json!({
            "pid": 123,
            "window_server_id": 99,
            "title": "Test",
            "is_fullscreen": false,
            "is_minimized": true,
            "is_app_placeholder": false,
            "is_focused": true,
            "frame": { "origin": { "x": 1.0, "y": 2.0 }, "size": { "width": 3.0, "height": 4.0 } },
        });
        assert_eq!(value, expected);
    }
}
