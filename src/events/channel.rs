//! Event channel backed by crossbeam-channel.
//!
//! Workers on the rayon pool hold clones of one [`EventSender`]; the CLI
//! drains the matching [`EventReceiver`] on its own thread.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::Event;

/// Sending half handed to the pipeline. A sender built by [`null_sender`]
/// drops every event.
#[derive(Clone)]
pub struct EventSender {
    inner: Option<Sender<Event>>,
}

impl EventSender {
    /// Send an event; discarded when nobody is listening
    pub fn send(&self, event: Event) {
        if let Some(sender) = &self.inner {
            let _ = sender.send(event);
        }
    }
}

/// Receiving half drained by the progress display
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Events until every sender is dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

pub struct EventChannel;

impl EventChannel {
    /// Create a connected, unbounded sender/receiver pair
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender {
                inner: Some(sender),
            },
            EventReceiver { inner: receiver },
        )
    }
}

/// A sender for runs without a progress display
pub fn null_sender() -> EventSender {
    EventSender { inner: None }
}
