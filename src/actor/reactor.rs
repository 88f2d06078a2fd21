//! The reactor's job is to keep the window registry coherent with the
//! system.
//!
//! It is the single writer for all shared state: the ordered window registry
//! and the application registry. Coordinators, the process lifecycle source,
//! and the switcher UI all talk to it by sending events over the actor
//! channel; the reactor applies them one at a time on its own thread, so the
//! registries need no locks.

pub mod apps;
pub mod query;
pub mod replay;

#[cfg(test)]
pub(crate) mod testing;


use std::sync::Arc;
use std::thread;

pub use replay::{Record, replay};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::actor;
use crate::actor::app::{AppCoordinator, Request};
use crate::actor::retry::RetryPolicy;
use crate::common::collections::HashSet;
use crate::common::config::Config;
use crate::model::registry::{Window, WindowRegistry};
use crate::model::server::{ApplicationData, Snapshot, WindowData};
use crate::sys::accessibility::{AccessibilityApi, WindowDescriptor, WindowServerId};
use crate::sys::app::{ActivationPolicy, AppInfo, pid_t};
use crate::sys::executor::Executor;

pub type Sender = actor::Sender<Event>;
type Receiver = actor::Receiver<Event>;
pub use query::ReactorQueryHandle;

#[derive(Debug, Serialize, Deserialize)]
pub enum Event {
    /// A process became known to the OS. Also sent for every process already
    /// running at startup.
    ApplicationLaunched {
        pid: pid_t,
        info: AppInfo,
        policy: ActivationPolicy,
        is_launch_finished: bool,
    },
    ApplicationTerminated(pid_t),
    /// The process reported that it finished launching. Some processes
    /// report this prematurely; `ApplicationReady` is the trustworthy one.
    ApplicationLaunchFinished(pid_t),
    ApplicationActivationPolicyChanged(pid_t, ActivationPolicy),
    /// First notification subscription succeeded for this process; it is
    /// really up now.
    ApplicationReady(pid_t),
    ApplicationHidden(pid_t),
    ApplicationShown(pid_t),

    /// Result of one discovery pass: the process's current standard windows,
    /// already classified and deduplicated.
    WindowsDiscovered {
        pid: pid_t,
        windows: Vec<WindowDescriptor>,
    },

    Command(Command),

    #[serde(skip)]
    Query(query::QueryRequest),

    ConfigUpdated(Config),
}

/// Requests from the switcher UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    ShowSwitcher,
    HideSwitcher,
    CycleFocus(isize),
}

/// Called after every registry mutation batch, at most once per batch and
/// only from the reactor thread. The switcher UI implements this; a redraw
/// is the only thing it is told.
pub trait RefreshSink: Send {
    fn refresh(&mut self);
}

impl<F: FnMut() + Send> RefreshSink for F {
    fn refresh(&mut self) { self() }
}

/// What coordinators are spawned with. Absent in replay mode, where recorded
/// events stand in for live discovery.
struct CoordinatorContext {
    api: Arc<dyn AccessibilityApi>,
    events_tx: Sender,
    retry: RetryPolicy,
}

#[derive(Clone)]
pub struct ReactorHandle {
    sender: Sender,
    queries: ReactorQueryHandle,
}

impl ReactorHandle {
    pub fn new(sender: Sender, queries: ReactorQueryHandle) -> Self { Self { sender, queries } }

    pub fn sender(&self) -> Sender { self.sender.clone() }

    pub fn send(&self, event: Event) { self.sender.send(event) }
}

impl std::ops::Deref for ReactorHandle {
    type Target = ReactorQueryHandle;

    fn deref(&self) -> &Self::Target { &self.queries }
}

pub struct Reactor {
    config: Config,
    apps: apps::AppManager,
    registry: WindowRegistry,
    /// True while the switcher UI is up; gates focus-cursor adjustment.
    switcher_active: bool,
    refresh_sink: Box<dyn RefreshSink>,
    coordinators: Option<CoordinatorContext>,
    record: Record,
}

impl Reactor {
    pub fn spawn(
        config: Config,
        api: Arc<dyn AccessibilityApi>,
        refresh_sink: Box<dyn RefreshSink>,
        record: Record,
    ) -> ReactorHandle {
        let (events_tx, events_rx) = actor::channel();
        let retry = RetryPolicy {
            total_timeout: config.retry_total_timeout(),
            poll_interval: config.retry_poll_interval(),
        };
        let mut reactor = Reactor::new(config, refresh_sink, record);
        reactor.coordinators = Some(CoordinatorContext {
            api,
            events_tx: events_tx.clone(),
            retry,
        });
        let query_handle = ReactorQueryHandle::new(events_tx.clone());
        thread::Builder::new()
            .name("reactor".to_string())
            .spawn(move || {
                Executor::run(reactor.run(events_rx));
            })
            .unwrap();
        ReactorHandle::new(events_tx, query_handle)
    }

    pub fn new(config: Config, refresh_sink: Box<dyn RefreshSink>, record: Record) -> Reactor {
        Reactor {
            config,
            apps: apps::AppManager::new(),
            registry: WindowRegistry::new(),
            switcher_active: false,
            refresh_sink,
            coordinators: None,
            record,
        }
    }

    /// A reactor with no coordinators and no refresh sink; used by replay.
    pub fn new_inert(config: Config) -> Reactor {
        Reactor::new(config, Box::new(|| {}), Record::none())
    }

    async fn run(mut self, mut events: Receiver) {
        while let Some((span, event)) = events.recv().await {
            let _guard = span.enter();
            self.handle_event(event);
        }
        debug!("reactor stopped");
    }

    pub fn handle_event(&mut self, event: Event) {
        self.record.write(&event);
        trace!(?event);
        match event {
            Event::ApplicationLaunched { pid, info, policy, is_launch_finished } => {
                self.on_application_launched(pid, info, policy, is_launch_finished);
            }
            Event::ApplicationTerminated(pid) => self.on_application_terminated(pid),
            Event::ApplicationLaunchFinished(pid) => {
                self.on_eligibility_changed(pid, |app| app.launch_finished = true);
            }
            Event::ApplicationActivationPolicyChanged(pid, policy) => {
                self.on_eligibility_changed(pid, |app| app.policy = policy);
            }
            Event::ApplicationReady(pid) => {
                if let Some(app) = self.apps.get_mut(pid) {
                    app.really_launched = true;
                } else {
                    trace!(pid, "ready event for unknown app; dropping");
                }
            }
            Event::ApplicationHidden(pid) => self.on_hidden_changed(pid, true),
            Event::ApplicationShown(pid) => self.on_hidden_changed(pid, false),
            Event::WindowsDiscovered { pid, windows } => {
                self.on_windows_discovered(pid, windows);
            }
            Event::Command(command) => self.on_command(command),
            Event::Query(request) => self.handle_query_request(request),
            Event::ConfigUpdated(config) => self.on_config_updated(config),
        }
    }

    fn on_application_launched(
        &mut self,
        pid: pid_t,
        info: AppInfo,
        policy: ActivationPolicy,
        is_launch_finished: bool,
    ) {
        if self.apps.contains(pid) {
            warn!(pid, "launch event for already-known app; ignoring");
            return;
        }
        if self.config.is_blocklisted(info.bundle_id.as_deref()) {
            debug!(pid, bundle_id = ?info.bundle_id, "blocklisted app; not tracking");
            return;
        }
        let (requests_tx, cancel) = match &self.coordinators {
            Some(ctx) => {
                let (tx, cancel) = AppCoordinator::spawn(
                    pid,
                    info.clone(),
                    policy,
                    is_launch_finished,
                    ctx.api.clone(),
                    ctx.retry,
                    ctx.events_tx.clone(),
                );
                (Some(tx), Some(cancel))
            }
            None => (None, None),
        };
        self.apps.insert(pid, apps::AppHandle {
            info,
            policy,
            launch_finished: is_launch_finished,
            really_launched: false,
            is_hidden: false,
            requests_tx,
            cancel,
        });
        let mutated = self.apply_placeholder_rule(pid) != PlaceholderChange::None;
        if mutated {
            self.refresh_sink.refresh();
        }
    }

    fn on_application_terminated(&mut self, pid: pid_t) {
        // Removal cancels the coordinator; its in-flight retries observe the
        // token and stop, and any late discovery result finds no handle here
        // and is dropped.
        let known = self.apps.remove(pid).is_some();
        let removed = self.registry.remove_all_for(pid);
        if !known {
            trace!(pid, "termination for unknown app");
        }
        if removed > 0 {
            self.refresh_sink.refresh();
        }
    }

    fn on_eligibility_changed(&mut self, pid: pid_t, update: impl FnOnce(&mut apps::AppHandle)) {
        let Some(app) = self.apps.get_mut(pid) else {
            trace!(pid, "eligibility change for unknown app; dropping");
            return;
        };
        update(app);
        let request = Request::EligibilityChanged {
            launch_finished: app.launch_finished,
            policy: app.policy,
        };
        app.send(request);
        let mutated = self.apply_placeholder_rule(pid) != PlaceholderChange::None;
        if mutated {
            self.refresh_sink.refresh();
        }
    }

    fn on_hidden_changed(&mut self, pid: pid_t, hidden: bool) {
        let Some(app) = self.apps.get_mut(pid) else {
            trace!(pid, "hide/show for unknown app; dropping");
            return;
        };
        if app.is_hidden != hidden {
            app.is_hidden = hidden;
            self.refresh_sink.refresh();
        }
    }

    /// Reconciles one discovery pass against the registry.
    fn on_windows_discovered(&mut self, pid: pid_t, windows: Vec<WindowDescriptor>) {
        let Some(app) = self.apps.get(pid) else {
            trace!(pid, "discovery result for unknown app; dropping");
            return;
        };
        if !app.is_eligible() {
            trace!(pid, "discovery result for ineligible app; dropping");
            return;
        }

        let mut mutated = false;

        // Drop real windows the pass no longer reports.
        let discovered: HashSet<WindowServerId> = windows.iter().map(|d| d.id).collect();
        for (key, server_id) in self.registry.real_windows_of(pid) {
            if !discovered.contains(&server_id) {
                self.registry.remove(key);
                mutated = true;
            }
        }

        // Refresh attributes of windows we already track.
        for descriptor in &windows {
            if let Some(window) = self.registry.get_by_server_id_mut(descriptor.id) {
                if window.pid != pid {
                    // Same id claimed by two processes; keep the first owner.
                    warn!(pid, other = window.pid, id = %descriptor.id, "window id collision");
                    continue;
                }
                let before = window.clone();
                window.apply_descriptor(descriptor);
                mutated |= *window != before;
            }
        }

        // New windows take priority in traversal order.
        let new: Vec<Window> = windows
            .iter()
            .filter(|d| !self.registry.contains_server_id(d.id))
            .map(|d| Window::from_descriptor(pid, d))
            .collect();
        if !new.is_empty() {
            // A real window supersedes the app's placeholder.
            if let Some(key) = self.registry.placeholder_of(pid) {
                self.registry.remove(key);
                mutated = true;
            }
        }
        let mut inserted = self.registry.insert_at_front(new);
        mutated |= inserted > 0;

        match self.apply_placeholder_rule(pid) {
            PlaceholderChange::Added => {
                inserted += 1;
                mutated = true;
            }
            PlaceholderChange::Removed => mutated = true,
            PlaceholderChange::None => {}
        }

        // Keep the highlighted entry stable relative to prepended windows.
        if inserted > 0 && self.switcher_active {
            self.registry.cycle_focused(inserted as isize);
        }
        if mutated {
            self.refresh_sink.refresh();
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::ShowSwitcher => {
                self.switcher_active = true;
                self.refresh_sink.refresh();
            }
            Command::HideSwitcher => {
                self.switcher_active = false;
            }
            Command::CycleFocus(delta) => {
                self.registry.cycle_focused(delta);
                self.refresh_sink.refresh();
            }
        }
    }

    fn on_config_updated(&mut self, config: Config) {
        self.config = config;
        // The placeholder gate may have flipped for any app.
        let mut mutated = false;
        for pid in self.apps.pids() {
            mutated |= self.apply_placeholder_rule(pid) != PlaceholderChange::None;
        }
        if mutated {
            self.refresh_sink.refresh();
        }
    }

    /// Enforces: a placeholder exists iff the app has zero real windows, is
    /// eligible, and is not hidden from the switcher by configuration.
    fn apply_placeholder_rule(&mut self, pid: pid_t) -> PlaceholderChange {
        let wanted = match self.apps.get(pid) {
            Some(app) => {
                app.is_eligible()
                    && !self.config.settings.hide_windowless_apps
                    && !self.config.is_blocklisted(app.info.bundle_id.as_deref())
                    && self.registry.real_window_count(pid) == 0
            }
            None => false,
        };
        match (self.registry.placeholder_of(pid), wanted) {
            (None, true) => {
                self.registry.insert_at_front(vec![Window::placeholder(pid)]);
                PlaceholderChange::Added
            }
            (Some(key), false) => {
                self.registry.remove(key);
                PlaceholderChange::Removed
            }
            _ => PlaceholderChange::None,
        }
    }

    fn snapshot_windows(&self) -> Vec<WindowData> {
        self.registry
            .iter_ordered()
            .enumerate()
            .map(|(idx, (_, window))| {
                WindowData::from_window(window, idx == self.registry.focused_index())
            })
            .collect()
    }

    fn snapshot_applications(&self) -> Vec<ApplicationData> {
        let mut applications: Vec<ApplicationData> = self
            .apps
            .iter()
            .map(|(pid, app)| ApplicationData {
                pid,
                bundle_id: app.info.bundle_id.clone(),
                name: app.info.display_name().to_string(),
                is_really_launched: app.really_launched,
                is_hidden: app.is_hidden,
                window_count: self.registry.real_window_count(pid),
            })
            .collect();
        applications.sort_by_key(|a| a.pid);
        applications
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            windows: self.snapshot_windows(),
            applications: self.snapshot_applications(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaceholderChange {
    Added,
    Removed,
    None,
}
