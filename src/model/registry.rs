//! The ordered, process-wide registry of known windows.
//!
//! Owned by the reactor and mutated only on its thread; insertion order is
//! the switcher's traversal order, with the most recently discovered windows
//! at the front. Storage lives in a [`SlotMap`] so slots freed by closed
//! windows are reused when windows churn rapidly (relaunches), bounding
//! allocation growth without affecting ordering or dedup.

use slotmap::{SlotMap, new_key_type};

use crate::common::collections::HashMap;
use crate::sys::accessibility::{WindowDescriptor, WindowServerId};
use crate::sys::app::pid_t;
use crate::sys::geometry::CGRect;

new_key_type! {
    pub struct WindowKey;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Owning application. A back-reference, not ownership; the application
    /// registry decides when windows die with their process.
    pub pid: pid_t,
    /// `None` only for windowless-application placeholders.
    pub server_id: Option<WindowServerId>,
    pub title: Option<String>,
    pub is_fullscreen: bool,
    pub is_minimized: bool,
    /// Last known frame, if the accessibility layer reported one.
    pub frame: Option<CGRect>,
    /// Synthetic entry standing in for an eligible app with no open windows.
    pub is_app_placeholder: bool,
}

impl Window {
    pub fn from_descriptor(pid: pid_t, descriptor: &WindowDescriptor) -> Window {
        Window {
            pid,
            server_id: Some(descriptor.id),
            title: descriptor.title.clone(),
            is_fullscreen: descriptor.is_fullscreen,
            is_minimized: descriptor.is_minimized,
            frame: descriptor.frame,
            is_app_placeholder: false,
        }
    }

    pub fn placeholder(pid: pid_t) -> Window {
        Window {
            pid,
            server_id: None,
            title: None,
            is_fullscreen: false,
            is_minimized: false,
            frame: None,
            is_app_placeholder: true,
        }
    }

    /// Refreshes the mutable attributes from a newer descriptor.
    pub fn apply_descriptor(&mut self, descriptor: &WindowDescriptor) {
        debug_assert_eq!(self.server_id, Some(descriptor.id));
        self.title = descriptor.title.clone();
        self.is_fullscreen = descriptor.is_fullscreen;
        self.is_minimized = descriptor.is_minimized;
        if descriptor.frame.is_some() {
            self.frame = descriptor.frame;
        }
    }
}

#[derive(Default)]
pub struct WindowRegistry {
    slots: SlotMap<WindowKey, Window>,
    /// Traversal order; front is the highest switching priority.
    order: Vec<WindowKey>,
    by_server_id: HashMap<WindowServerId, WindowKey>,
    /// Shared focus cursor the switcher UI highlights.
    focused: usize,
}

impl WindowRegistry {
    pub fn new() -> WindowRegistry { WindowRegistry::default() }

    pub fn len(&self) -> usize { self.order.len() }

    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    pub fn focused_index(&self) -> usize { self.focused }

    pub fn get(&self, key: WindowKey) -> Option<&Window> { self.slots.get(key) }

    pub fn contains_server_id(&self, id: WindowServerId) -> bool {
        self.by_server_id.contains_key(&id)
    }

    pub fn iter_ordered(&self) -> impl Iterator<Item = (WindowKey, &Window)> {
        self.order.iter().map(|&key| (key, &self.slots[key]))
    }

    pub fn first_matching(
        &self,
        mut predicate: impl FnMut(&Window) -> bool,
    ) -> Option<(WindowKey, &Window)> {
        self.iter_ordered().find(|(_, w)| predicate(w))
    }

    /// Inserts windows at the front of the traversal order, preserving their
    /// relative order. Windows whose real id is already registered are
    /// rejected. Returns the number actually inserted.
    pub fn insert_at_front(&mut self, windows: Vec<Window>) -> usize {
        let mut inserted = Vec::new();
        for window in windows {
            if let Some(id) = window.server_id {
                if self.by_server_id.contains_key(&id) {
                    continue;
                }
                let key = self.slots.insert(window);
                self.by_server_id.insert(id, key);
                inserted.push(key);
            } else {
                let key = self.slots.insert(window);
                inserted.push(key);
            }
        }
        let count = inserted.len();
        self.order.splice(0..0, inserted);
        count
    }

    pub fn remove(&mut self, key: WindowKey) -> Option<Window> {
        let window = self.slots.remove(key)?;
        if let Some(id) = window.server_id {
            self.by_server_id.remove(&id);
        }
        if let Some(idx) = self.order.iter().position(|&k| k == key) {
            self.order.remove(idx);
            if idx < self.focused && self.focused > 0 {
                self.focused -= 1;
            }
        }
        if self.order.is_empty() {
            self.focused = 0;
        } else if self.focused >= self.order.len() {
            self.focused = self.order.len() - 1;
        }
        Some(window)
    }

    pub fn remove_by_server_id(&mut self, id: WindowServerId) -> Option<Window> {
        let key = self.by_server_id.get(&id).copied()?;
        self.remove(key)
    }

    pub fn get_by_server_id_mut(&mut self, id: WindowServerId) -> Option<&mut Window> {
        let key = self.by_server_id.get(&id).copied()?;
        self.slots.get_mut(key)
    }

    /// Moves the focus cursor by `delta`, wrapping within bounds.
    ///
    /// Also used after prepending `n` windows with a delta of `n`, which
    /// keeps the previously focused entry's logical identity even though its
    /// index shifted.
    pub fn cycle_focused(&mut self, delta: isize) {
        if self.order.is_empty() {
            self.focused = 0;
            return;
        }
        let len = self.order.len() as isize;
        self.focused = (self.focused as isize + delta).rem_euclid(len) as usize;
    }

    pub fn focused_window(&self) -> Option<(WindowKey, &Window)> {
        let key = *self.order.get(self.focused)?;
        Some((key, &self.slots[key]))
    }

    pub fn placeholder_of(&self, pid: pid_t) -> Option<WindowKey> {
        self.iter_ordered()
            .find(|(_, w)| w.pid == pid && w.is_app_placeholder)
            .map(|(key, _)| key)
    }

    pub fn real_window_count(&self, pid: pid_t) -> usize {
        self.iter_ordered()
            .filter(|(_, w)| w.pid == pid && !w.is_app_placeholder)
            .count()
    }

    pub fn real_windows_of(&self, pid: pid_t) -> Vec<(WindowKey, WindowServerId)> {
        self.iter_ordered()
            .filter(|(_, w)| w.pid == pid)
            .filter_map(|(key, w)| w.server_id.map(|id| (key, id)))
            .collect()
    }

    /// Removes every window (real or placeholder) owned by `pid`.
    pub fn remove_all_for(&mut self, pid: pid_t) -> usize {
        let keys: Vec<WindowKey> = self
            .iter_ordered()
            .filter(|(_, w)| w.pid == pid)
            .map(|(key, _)| key)
            .collect();
        let count = keys.len();
        for key in keys {
            self.remove(key);
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn slot_capacity(&self) -> usize { self.slots.capacity() }
}
