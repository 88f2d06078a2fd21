use serde::{Deserialize, Serialize};

#[allow(non_camel_case_types)]
pub type pid_t = i32;

/// Descriptive attributes of a running application, as reported by the
/// process lifecycle source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub bundle_id: Option<String>,
    pub localized_name: Option<String>,
    /// Path of the icon shown next to the app's windows, if any.
    #[serde(default)]
    pub icon_path: Option<String>,
}

impl AppInfo {
    pub fn display_name(&self) -> &str {
        self.localized_name
            .as_deref()
            .or(self.bundle_id.as_deref())
            .unwrap_or("(unknown)")
    }
}

/// How far the OS lets an application integrate with the UI. Only `Regular`
/// applications own switchable windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPolicy {
    Regular,
    Accessory,
    Prohibited,
}
