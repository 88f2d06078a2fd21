//! Scripted accessibility source and helpers for reactor tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::actor::reactor::{Event, Reactor, ReactorHandle, Record};
use crate::common::collections::HashMap;
use crate::common::config::{Config, RetrySettings};
use crate::sys::accessibility::{
    AccessibilityApi, AxError, AxNotification, AxRoot, NotificationKind, NotificationSender,
    ROLE_WINDOW, SUBROLE_STANDARD, WindowDescriptor, WindowServerId,
};
use crate::sys::app::{ActivationPolicy, AppInfo, pid_t};

#[derive(Default)]
struct FakeApp {
    windows: Vec<WindowDescriptor>,
    /// Transient failures left before `create_root` succeeds.
    root_failures: u32,
    /// Transient failures consumed by successive `subscribe` calls.
    subscribe_failures: u32,
    subscribe_always_transient: bool,
    /// Once this many subscriptions exist, further ones fail transiently
    /// forever.
    subscribe_success_limit: Option<usize>,
    subscriptions: Vec<(NotificationKind, NotificationSender)>,
    list_calls: usize,
}

/// In-memory accessibility layer whose behavior tests script per pid.
#[derive(Default)]
pub struct FakeAccessibility {
    apps: Mutex<HashMap<pid_t, FakeApp>>,
    root_tokens: AtomicU64,
}

impl FakeAccessibility {
    pub fn new() -> Arc<FakeAccessibility> { Arc::new(FakeAccessibility::default()) }

    pub fn add_app(&self, pid: pid_t) {
        self.apps.lock().entry(pid).or_default();
    }

    pub fn set_windows(&self, pid: pid_t, windows: Vec<WindowDescriptor>) {
        self.apps.lock().entry(pid).or_default().windows = windows;
    }

    pub fn set_root_failures(&self, pid: pid_t, failures: u32) {
        self.apps.lock().entry(pid).or_default().root_failures = failures;
    }

    pub fn set_subscribe_failures(&self, pid: pid_t, failures: u32) {
        self.apps.lock().entry(pid).or_default().subscribe_failures = failures;
    }

    pub fn set_subscribe_always_transient(&self, pid: pid_t, value: bool) {
        self.apps.lock().entry(pid).or_default().subscribe_always_transient = value;
    }

    pub fn set_subscribe_success_limit(&self, pid: pid_t, limit: usize) {
        self.apps.lock().entry(pid).or_default().subscribe_success_limit = Some(limit);
    }

    /// Delivers a notification to every subscriber of `kind`, the way the OS
    /// background event context would.
    pub fn notify(&self, pid: pid_t, kind: NotificationKind) {
        let apps = self.apps.lock();
        let Some(app) = apps.get(&pid) else { return };
        for (subscribed, tx) in &app.subscriptions {
            if *subscribed == kind {
                _ = tx.send(AxNotification { pid, kind });
            }
        }
    }

    pub fn list_calls(&self, pid: pid_t) -> usize {
        self.apps.lock().get(&pid).map(|a| a.list_calls).unwrap_or(0)
    }

    pub fn subscription_count(&self, pid: pid_t) -> usize {
        self.apps.lock().get(&pid).map(|a| a.subscriptions.len()).unwrap_or(0)
    }
}

impl AccessibilityApi for FakeAccessibility {
    fn create_root(&self, pid: pid_t) -> Result<AxRoot, AxError> {
        let mut apps = self.apps.lock();
        let Some(app) = apps.get_mut(&pid) else {
            return Err(AxError::ProcessGone);
        };
        if app.root_failures > 0 {
            app.root_failures -= 1;
            return Err(AxError::NotReady);
        }
        Ok(AxRoot {
            pid,
            token: self.root_tokens.fetch_add(1, Ordering::Relaxed),
        })
    }

    fn list_windows(&self, root: &AxRoot) -> Result<Vec<WindowDescriptor>, AxError> {
        let mut apps = self.apps.lock();
        let Some(app) = apps.get_mut(&root.pid) else {
            return Err(AxError::ProcessGone);
        };
        app.list_calls += 1;
        Ok(app.windows.clone())
    }

    fn subscribe(
        &self,
        root: &AxRoot,
        kind: NotificationKind,
        observer: NotificationSender,
    ) -> Result<(), AxError> {
        let mut apps = self.apps.lock();
        let Some(app) = apps.get_mut(&root.pid) else {
            return Err(AxError::ProcessGone);
        };
        if app.subscribe_always_transient {
            return Err(AxError::NotReady);
        }
        if app.subscribe_failures > 0 {
            app.subscribe_failures -= 1;
            return Err(AxError::NotReady);
        }
        if let Some(limit) = app.subscribe_success_limit {
            if app.subscriptions.len() >= limit {
                return Err(AxError::NotReady);
            }
        }
        app.subscriptions.push((kind, observer));
        Ok(())
    }
}

pub fn fast_config() -> Config {
    Config {
        retry: RetrySettings {
            total_timeout_ms: 500,
            poll_interval_ms: 10,
        },
        ..Config::default()
    }
}

pub fn app_info(pid: pid_t) -> AppInfo {
    AppInfo {
        bundle_id: Some(format!("com.example.app{pid}")),
        localized_name: Some(format!("App {pid}")),
        icon_path: None,
    }
}

pub fn launch_event(pid: pid_t, is_launch_finished: bool) -> Event {
    Event::ApplicationLaunched {
        pid,
        info: app_info(pid),
        policy: ActivationPolicy::Regular,
        is_launch_finished,
    }
}

pub fn window(id: u32) -> WindowDescriptor {
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

pub struct Harness {
    pub fake: Arc<FakeAccessibility>,
    pub handle: ReactorHandle,
    pub refreshes: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new() -> Harness { Harness::with_config(fast_config()) }

    pub fn with_config(config: Config) -> Harness {
        let fake = FakeAccessibility::new();
        let refreshes = Arc::new(AtomicUsize::new(0));
        let sink_refreshes = refreshes.clone();
        let handle = Reactor::spawn(
            config,
            fake.clone(),
            Box::new(move || {
                sink_refreshes.fetch_add(1, Ordering::SeqCst);
            }),
            Record::none(),
        );
        Harness { fake, handle, refreshes }
    }

    pub fn refresh_count(&self) -> usize { self.refreshes.load(Ordering::SeqCst) }

    /// Polls `condition` until it holds or two seconds pass.
    pub fn wait_for(&self, condition: impl Fn(&Harness) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if condition(self) {
                return true;
            }
            if Instant::now() > deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
