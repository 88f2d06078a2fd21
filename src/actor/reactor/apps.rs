//! The application registry: pid → coordinator handle.
//!
//! The handle is non-owning in the callback direction: coordinators only
//! ever reach back with `(pid, event)` over the channel, so once a pid is
//! removed here, anything still in flight for it is dropped by the reactor
//! instead of touching a dead coordinator.

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::actor::app::{self, Request};
use crate::common::collections::HashMap;
use crate::sys::app::{ActivationPolicy, AppInfo, pid_t};

pub struct AppHandle {
    pub info: AppInfo,
    pub policy: ActivationPolicy,
    pub launch_finished: bool,
    /// Set only by the first successful notification subscription.
    pub really_launched: bool,
    pub is_hidden: bool,
    /// `None` in replay mode, where no coordinator exists.
    pub requests_tx: Option<app::Sender>,
    pub cancel: Option<CancellationToken>,
}

impl AppHandle {
    pub fn is_eligible(&self) -> bool {
        self.launch_finished && self.policy == ActivationPolicy::Regular
    }

    pub fn send(&self, request: Request) {
        if let Some(tx) = &self.requests_tx {
            tx.send(request);
        }
    }
}

#[derive(Default)]
pub struct AppManager {
    apps: HashMap<pid_t, AppHandle>,
}

impl AppManager {
    pub fn new() -> AppManager { AppManager::default() }

    pub fn contains(&self, pid: pid_t) -> bool { self.apps.contains_key(&pid) }

    pub fn get(&self, pid: pid_t) -> Option<&AppHandle> { self.apps.get(&pid) }

    pub fn get_mut(&mut self, pid: pid_t) -> Option<&mut AppHandle> { self.apps.get_mut(&pid) }

    pub fn insert(&mut self, pid: pid_t, handle: AppHandle) { self.apps.insert(pid, handle); }

    /// Removes the app and cancels its coordinator. Cancellation happens
    /// before the handle is dropped so in-flight retries stop instead of
    /// queueing results for a pid nobody tracks.
    pub fn remove(&mut self, pid: pid_t) -> Option<AppHandle> {
        let handle = self.apps.remove(&pid)?;
        if let Some(cancel) = &handle.cancel {
            trace!(pid, "cancelling coordinator");
            cancel.cancel();
        }
        Some(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (pid_t, &AppHandle)> {
        self.apps.iter().map(|(&pid, handle)| (pid, handle))
    }

    pub fn pids(&self) -> Vec<pid_t> { self.apps.keys().copied().collect() }
}
