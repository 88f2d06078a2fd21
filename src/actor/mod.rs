//! Actors and the channel they communicate over.
//!
//! Every channel message carries the [`tracing::Span`] it was sent from, so
//! an event is processed inside the context that produced it.

pub mod app;
pub mod reactor;
pub mod retry;

use tokio::sync::mpsc;
use tracing::Span;

pub struct Sender<E> {
    tx: mpsc::UnboundedSender<(Span, E)>,
}

// Derived Clone would require E: Clone.
impl<E> Clone for Sender<E> {
    fn clone(&self) -> Self { Sender { tx: self.tx.clone() } }
}

impl<E> Sender<E> {
    /// Sends an event, ignoring send failures. A closed receiver means the
    /// target actor has shut down; events for it are dropped by design of
    /// the teardown protocol.
    pub fn send(&self, event: E) { _ = self.try_send(event); }

    pub fn try_send(&self, event: E) -> Result<(), mpsc::error::SendError<(Span, E)>> {
        self.tx.send((Span::current(), event))
    }
}

pub struct Receiver<E> {
    rx: mpsc::UnboundedReceiver<(Span, E)>,
}

impl<E> Receiver<E> {
    pub async fn recv(&mut self) -> Option<(Span, E)> { self.rx.recv().await }
}

pub fn channel<E>() -> (Sender<E>, Receiver<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Sender { tx }, Receiver { rx })
}
