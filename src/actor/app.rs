//! One coordinator actor per running application.
//!
//! The coordinator owns the process's accessibility root, keeps its change
//! notifications subscribed, and runs discovery passes. It never touches the
//! registries itself: every result is sent to the reactor as an event, and
//! the reactor is the only writer. Each coordinator runs on its own named
//! thread so blocking accessibility round-trips cannot stall the reactor or
//! other applications.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, trace, warn};

use crate::actor::retry::{RetryError, RetryPolicy, retry_until_timeout};
use crate::actor::{self, reactor};
use crate::sys::accessibility::{
    AccessibilityApi, AxError, AxNotification, AxRoot, NotificationKind, NotificationSender,
    dedup_descriptors, is_standard_window, notification_kinds,
};
use crate::sys::app::{ActivationPolicy, AppInfo, pid_t};
use crate::sys::executor::Executor;

pub type Sender = actor::Sender<Request>;
type Receiver = actor::Receiver<Request>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Launch-finished status or activation policy changed.
    EligibilityChanged {
        launch_finished: bool,
        policy: ActivationPolicy,
    },
    /// Run a discovery pass now.
    Rediscover,
}

/// `Discovering` is re-entered whenever eligibility flips back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Discovering,
    Ready,
}

struct State {
    phase: Phase,
    policy: ActivationPolicy,
    launch_finished: bool,
    root: Option<AxRoot>,
    /// Cancels the in-flight subscription/discovery attempt without tearing
    /// down the whole coordinator. Child of the coordinator token.
    attempt_cancel: CancellationToken,
}

#[derive(Clone)]
pub struct AppCoordinator {
    pid: pid_t,
    info: AppInfo,
    api: Arc<dyn AccessibilityApi>,
    events_tx: reactor::Sender,
    retry: RetryPolicy,
    cancel: CancellationToken,
    notifications_tx: NotificationSender,
    // Shared with attempt tasks; all on the coordinator's thread.
    state: Rc<RefCell<State>>,
}

impl AppCoordinator {
    /// Spawns the coordinator thread. Cancelling the returned token shuts
    /// the coordinator down; in-flight retries observe it and stop silently.
    pub fn spawn(
        pid: pid_t,
        info: AppInfo,
        policy: ActivationPolicy,
        launch_finished: bool,
        api: Arc<dyn AccessibilityApi>,
        retry: RetryPolicy,
        events_tx: reactor::Sender,
    ) -> (Sender, CancellationToken) {
        let (requests_tx, requests_rx) = actor::channel();
        let cancel = CancellationToken::new();
        let coordinator_cancel = cancel.clone();
        thread::Builder::new()
            .name(format!("app({pid})"))
            .spawn(move || {
                let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
                let attempt_cancel = coordinator_cancel.child_token();
                let coordinator = AppCoordinator {
                    pid,
                    info,
                    api,
                    events_tx,
                    retry,
                    cancel: coordinator_cancel,
                    notifications_tx,
                    state: Rc::new(RefCell::new(State {
                        phase: Phase::Uninitialized,
                        policy,
                        launch_finished,
                        root: None,
                        attempt_cancel,
                    })),
                };
                Executor::run(coordinator.run(requests_rx, notifications_rx));
            })
            .unwrap();
        (requests_tx, cancel)
    }

    async fn run(
        self,
        mut requests: Receiver,
        mut notifications: mpsc::UnboundedReceiver<AxNotification>,
    ) {
        self.sync_eligibility();
        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some((span, request)) => {
                        self.handle_request(request).instrument(span).await;
                    }
                    None => break,
                },
                notification = notifications.recv() => {
                    // We hold a sender, so the channel cannot close.
                    if let Some(notification) = notification {
                        self.handle_notification(notification).await;
                    }
                }
            }
        }
        // Dropping the root releases the accessibility subscriptions; any
        // callback still in flight lands on a closed channel and no-ops.
        self.state.borrow_mut().root = None;
        debug!(pid = self.pid, "coordinator stopped");
    }

    fn is_eligible(&self) -> bool {
        let state = self.state.borrow();
        state.launch_finished && state.policy == ActivationPolicy::Regular
    }

    async fn handle_request(&self, request: Request) {
        trace!(pid = self.pid, ?request);
        match request {
            Request::EligibilityChanged { launch_finished, policy } => {
                {
                    let mut state = self.state.borrow_mut();
                    state.launch_finished = launch_finished;
                    state.policy = policy;
                }
                self.sync_eligibility();
            }
            Request::Rediscover => {
                let cancel = self.state.borrow().attempt_cancel.clone();
                self.discover_windows(&cancel).await;
            }
        }
    }

    async fn handle_notification(&self, notification: AxNotification) {
        trace!(pid = self.pid, kind = %notification.kind, "notification");
        match notification.kind {
            NotificationKind::ApplicationHidden => {
                self.events_tx.send(reactor::Event::ApplicationHidden(self.pid));
            }
            NotificationKind::ApplicationShown => {
                self.events_tx.send(reactor::Event::ApplicationShown(self.pid));
            }
            _ => {}
        }
        // Delivery order is not guaranteed, so a notification is never a
        // precise delta. Whatever the kind, re-discover; passes are
        // idempotent and order-independent.
        let cancel = self.state.borrow().attempt_cancel.clone();
        self.discover_windows(&cancel).await;
    }

    /// Starts or stops discovery so it matches current eligibility.
    fn sync_eligibility(&self) {
        if self.is_eligible() {
            let start = {
                let state = self.state.borrow();
                state.root.is_none() && state.phase == Phase::Uninitialized
            };
            if start {
                let attempt_cancel = self.cancel.child_token();
                {
                    let mut state = self.state.borrow_mut();
                    state.phase = Phase::Discovering;
                    state.attempt_cancel = attempt_cancel.clone();
                }
                let this = self.clone();
                tokio::task::spawn_local(async move {
                    this.run_discovery_attempt(attempt_cancel).await;
                });
            }
        } else {
            let mut state = self.state.borrow_mut();
            state.attempt_cancel.cancel();
            state.attempt_cancel = self.cancel.child_token();
            if state.root.take().is_some() {
                trace!(pid = self.pid, "ineligible; released accessibility root");
            }
            state.phase = Phase::Uninitialized;
        }
    }

    /// Acquires the root, registers notifications, and runs the first
    /// authoritative discovery pass.
    async fn run_discovery_attempt(&self, cancel: CancellationToken) {
        let root = match retry_until_timeout(|| self.api.create_root(self.pid), self.retry, &cancel)
            .await
        {
            Ok(root) => root,
            Err(RetryError::Cancelled) => return,
            Err(err) => {
                debug!(pid = self.pid, %err, "could not acquire accessibility root");
                // No root exists, so the next eligibility notification must
                // be able to start a fresh attempt.
                self.state.borrow_mut().phase = Phase::Uninitialized;
                return;
            }
        };
        self.state.borrow_mut().root = Some(root.clone());

        let mut subscribed = 0u32;
        for kind in notification_kinds(&self.info) {
            let result = retry_until_timeout(
                || self.api.subscribe(&root, kind, self.notifications_tx.clone()),
                self.retry,
                &cancel,
            )
            .await;
            match result {
                Ok(()) => {
                    subscribed += 1;
                    if subscribed == 1 {
                        // The first successful subscription is the proof the
                        // app is actually up; launch-finished alone can lie.
                        // Discover right away rather than after the loop, so
                        // a later kind stuck retrying cannot delay the
                        // authoritative pass.
                        self.events_tx.send(reactor::Event::ApplicationReady(self.pid));
                        self.state.borrow_mut().phase = Phase::Ready;
                        self.discover_windows(&cancel).await;
                    }
                }
                Err(RetryError::Cancelled) => return,
                Err(RetryError::TimedOut(timeout)) => {
                    warn!(pid = self.pid, %kind, ?timeout, "subscription abandoned");
                }
                Err(RetryError::Permanent(AxError::ProcessGone)) => return,
                Err(RetryError::Permanent(err)) => {
                    debug!(pid = self.pid, %kind, %err, "subscription failed");
                }
            }
        }

        if subscribed == 0 {
            // Left in Discovering; the next eligibility flip retries.
            warn!(pid = self.pid, "no subscription succeeded; app stays undiscovered");
        }
    }

    /// One discovery pass: query, classify, dedup, hand off to the reactor.
    async fn discover_windows(&self, cancel: &CancellationToken) {
        let Some(root) = self.state.borrow().root.clone() else {
            return;
        };
        match retry_until_timeout(|| self.api.list_windows(&root), self.retry, cancel).await {
            Ok(descriptors) => {
                let windows: Vec<_> = dedup_descriptors(descriptors)
                    .into_iter()
                    .filter(is_standard_window)
                    .collect();
                self.events_tx.send(reactor::Event::WindowsDiscovered { pid: self.pid, windows });
            }
            Err(RetryError::Cancelled) => {}
            Err(err) => {
                // Scoped to this pass; a later notification self-corrects.
                debug!(pid = self.pid, %err, "discovery pass abandoned");
            }
        }
    }
}
