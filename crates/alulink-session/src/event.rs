use std::sync::mpsc::Sender;
use std::sync::Arc;

use alulink_frame::ResponseFrame;
use bytes::Bytes;

/// Something the receive loop observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Raw bytes exactly as read in one poll.
    Chunk(Bytes),
    /// A decoded response.
    Response(ResponseFrame),
    /// The receive loop stopped; no further events follow.
    LinkLost(String),
}

pub(crate) type Callback = Arc<dyn Fn(&LinkEvent) + Send + Sync + 'static>;

/// Subscriber list owned by a session.
#[derive(Default)]
pub(crate) struct Subscribers {
    channels: Vec<Sender<LinkEvent>>,
    callbacks: Vec<Callback>,
}

impl Subscribers {
    pub(crate) fn add_channel(&mut self, tx: Sender<LinkEvent>) {
        self.channels.push(tx);
    }

    pub(crate) fn add_callback(&mut self, callback: Callback) {
        self.callbacks.push(callback);
    }

    /// Deliver `event` to every channel, dropping those whose receiver is gone.
    pub(crate) fn send_to_channels(&mut self, event: &LinkEvent) {
        self.channels.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Snapshot of the callbacks, so they can run without the list locked.
    pub(crate) fn callbacks(&self) -> Vec<Callback> {
        self.callbacks.clone()
    }

    /// Unregister a callback that panicked.
    pub(crate) fn remove_callback(&mut self, callback: &Callback) {
        self.callbacks.retain(|cb| !Arc::ptr_eq(cb, callback));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.channels.len() + self.callbacks.len()
    }
}
