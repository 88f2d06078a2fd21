//! The seam between the engine and the OS accessibility layer.
//!
//! Everything the engine knows about another process's windows comes through
//! the [`AccessibilityApi`] trait: one discovery query plus a bounded set of
//! change notifications. The live implementation wraps the platform
//! accessibility bindings; tests substitute a scripted fake.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sys::app::{AppInfo, pid_t};
use crate::sys::geometry::CGRect;

/// Identifier the window server assigns to a real window. Unique per window
/// for the lifetime of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WindowServerId(pub u32);

impl WindowServerId {
    pub fn new(id: u32) -> WindowServerId { WindowServerId(id) }

    pub fn as_u32(&self) -> u32 { self.0 }
}

impl std::fmt::Display for WindowServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from the accessibility layer.
///
/// The transient/permanent split drives the retry policy: accessibility
/// trees are allowed to be briefly unavailable right after a process
/// launches, while an invalid element or a dead process will never recover.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AxError {
    #[error("accessibility tree not ready")]
    NotReady,
    #[error("accessibility request could not complete")]
    CannotComplete,
    #[error("accessibility element is invalid")]
    InvalidElement,
    #[error("process is gone")]
    ProcessGone,
    #[error("notification not supported by this element")]
    NotificationUnsupported,
}

impl AxError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AxError::NotReady | AxError::CannotComplete)
    }
}

/// Opaque handle to a process's accessibility root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxRoot {
    pub pid: pid_t,
    /// Token distinguishing successive roots for the same pid (a root is
    /// re-created whenever eligibility flips).
    pub token: u64,
}

/// The change notifications the engine subscribes to, per application.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
pub enum NotificationKind {
    Activated,
    MainWindowChanged,
    FocusedWindowChanged,
    WindowCreated,
    ApplicationHidden,
    ApplicationShown,
    FocusedUiElementChanged,
}

/// Subscribing to `FocusedUiElementChanged` destabilizes Books; its
/// accessibility host stops responding shortly after. Narrow, explicit
/// exclusion rather than a generic suppression.
const FOCUSED_UI_ELEMENT_DENYLIST: &[&str] = &["com.apple.iBooksX"];

/// The notification kinds to subscribe to for an application.
pub fn notification_kinds(info: &AppInfo) -> Vec<NotificationKind> {
    use NotificationKind::*;
    let mut kinds = vec![
        Activated,
        MainWindowChanged,
        FocusedWindowChanged,
        WindowCreated,
        ApplicationHidden,
        ApplicationShown,
        FocusedUiElementChanged,
    ];
    if let Some(bundle_id) = info.bundle_id.as_deref() {
        if FOCUSED_UI_ELEMENT_DENYLIST.contains(&bundle_id) {
            kinds.retain(|k| *k != FocusedUiElementChanged);
        }
    }
    kinds
}

/// A raw notification callback, re-dispatched from the OS event context onto
/// the owning coordinator's channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxNotification {
    pub pid: pid_t,
    pub kind: NotificationKind,
}

pub type NotificationSender = tokio::sync::mpsc::UnboundedSender<AxNotification>;

/// One window as reported by a discovery query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowDescriptor {
    pub id: WindowServerId,
    pub title: Option<String>,
    pub role: String,
    pub subrole: Option<String>,
    /// Window server layer; anything above 0 is an overlay surface.
    #[serde(default)]
    pub layer: i32,
    #[serde(default)]
    pub is_fullscreen: bool,
    #[serde(default)]
    pub is_minimized: bool,
    pub frame: Option<CGRect>,
}

pub const ROLE_WINDOW: &str = "AXWindow";
pub const SUBROLE_STANDARD: &str = "AXStandardWindow";
pub const SUBROLE_DIALOG: &str = "AXDialog";

/// Whether a descriptor names an actual switchable window, as opposed to a
/// sheet, panel, or other non-standard surface. Pure and stateless.
pub fn is_standard_window(descriptor: &WindowDescriptor) -> bool {
    if descriptor.role != ROLE_WINDOW || descriptor.layer != 0 {
        return false;
    }
    match descriptor.subrole.as_deref() {
        None => true,
        Some(SUBROLE_STANDARD) | Some(SUBROLE_DIALOG) => true,
        Some(_) => false,
    }
}

/// Collapses duplicate reports of the same window id, keeping the first.
///
/// The accessibility layer occasionally lists a window twice for a single
/// process (seen with mail clients at login).
pub fn dedup_descriptors(descriptors: Vec<WindowDescriptor>) -> Vec<WindowDescriptor> {
    let mut seen = crate::common::collections::HashSet::default();
    descriptors.into_iter().filter(|d| seen.insert(d.id)).collect()
}

/// The engine's view of the accessibility layer for one process at a time.
///
/// `subscribe` registers a single notification kind; callbacks arrive on the
/// OS's background event context and are marshaled through `observer` onto
/// the subscribing coordinator's channel. Implementations must be cheap to
/// share across coordinator threads.
pub trait AccessibilityApi: Send + Sync + 'static {
    fn create_root(&self, pid: pid_t) -> Result<AxRoot, AxError>;

    fn list_windows(&self, root: &AxRoot) -> Result<Vec<WindowDescriptor>, AxError>;

    fn subscribe(
        &self,
        root: &AxRoot,
        kind: NotificationKind,
        observer: NotificationSender,
    ) -> Result<(), AxError>;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn descriptor(id: u32) -> WindowDescriptor {
        WindowDescriptor {
            id: WindowServerId::new(id),
            title: Some(format!("window {id}")),
            role: ROLE_WINDOW.to_string(),
            subrole: Some(SUBROLE_STANDARD.to_string()),
            layer: 0,
            is_fullscreen: false,
            is_minimized: false,
            frame: None,
        }
    }

    #[test]
    fn standard_window_classification() {
        let mut d = descriptor(1);
        assert!(is_standard_window(&d));

        d.subrole = Some(SUBROLE_DIALOG.to_string());
        assert!(is_standard_window(&d));

        d.subrole = None;
        assert!(is_standard_window(&d));

        d.subrole = Some("AXSheet".to_string());
        assert!(!is_standard_window(&d));

        d.subrole = Some(SUBROLE_STANDARD.to_string());
        d.layer = 25;
        assert!(!is_standard_window(&d));

        d.layer = 0;
        d.role = "AXPopover".to_string();
        assert!(!is_standard_window(&d));
    }

    #[test]
    fn dedup_keeps_first_report() {
        let mut first = descriptor(7);
        first.title = Some("first".to_string());
        let mut second = descriptor(7);
        second.title = Some("second".to_string());

        let deduped = dedup_descriptors(vec![first.clone(), second, descriptor(8)]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0], first);
        assert_eq!(deduped[1].id, WindowServerId::new(8));
    }

    #[test]
    fn focused_ui_element_excluded_for_known_buggy_host() {
        let books = AppInfo {
            bundle_id: Some("com.apple.iBooksX".to_string()),
            localized_name: Some("Books".to_string()),
            icon_path: None,
        };
        let kinds = notification_kinds(&books);
        assert!(!kinds.contains(&NotificationKind::FocusedUiElementChanged));

        let other = AppInfo {
            bundle_id: Some("com.example.editor".to_string()),
            localized_name: None,
            icon_path: None,
        };
        let kinds = notification_kinds(&other);
        assert!(kinds.contains(&NotificationKind::FocusedUiElementChanged));
    }
}
