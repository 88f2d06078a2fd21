//! Synchronous queries into the reactor's state, answered on the reactor
//! thread. This is the read surface the switcher UI renders from.

use std::sync::mpsc::{RecvError, SyncSender, sync_channel};

use crate::actor::reactor::{Event, Reactor, Sender};
use crate::model::server::{ApplicationData, Snapshot, WindowData};

#[derive(Clone)]
pub struct ReactorQueryHandle {
    tx: Sender,
}

impl ReactorQueryHandle {
    pub(super) fn new(tx: Sender) -> Self { Self { tx } }

    fn send_query<T>(
        &self,
        build: impl FnOnce(SyncSender<T>) -> QueryRequest,
    ) -> Result<T, RecvError> {
        let (tx, rx) = sync_channel(1);
        if self.tx.try_send(Event::Query(build(tx))).is_err() {
            return Err(RecvError);
        }
        rx.recv().map_err(|_| RecvError)
    }

    pub fn query_windows(&self) -> Vec<WindowData> {
        self.send_query(QueryRequest::Windows).unwrap_or_default()
    }

    pub fn query_applications(&self) -> Vec<ApplicationData> {
        self.send_query(QueryRequest::Applications).unwrap_or_default()
    }

    pub fn query_snapshot(&self) -> Option<Snapshot> {
        self.send_query(QueryRequest::Snapshot).ok()
    }
}

#[derive(Debug)]
pub enum QueryRequest {
    Windows(SyncSender<Vec<WindowData>>),
    Applications(SyncSender<Vec<ApplicationData>>),
    Snapshot(SyncSender<Snapshot>),
}

impl Reactor {
    pub(super) fn handle_query_request(&mut self, request: QueryRequest) {
        match request {
            QueryRequest::Windows(resp) => {
                let _ = resp.send(self.snapshot_windows());
            }
            QueryRequest::Applications(resp) => {
                let _ = resp.send(self.snapshot_applications());
            }
            QueryRequest::Snapshot(resp) => {
                let _ = resp.send(self.snapshot());
            }
        }
    }
}
