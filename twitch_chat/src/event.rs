//! Compound event names and the bus that routes them
//!
//! Every typed message maps to a name of the form
//! `<COMMAND>[/<SUB-EVENT>][/<#channel>]`. Publishing a name notifies the
//! catch-all topic `*`, every ordered prefix of the name and every single
//! segment of it. A subscriber listening on several of those topics still
//! receives the event once.
use std::{
    collections::HashSet,
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll},
};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::{tmi::Message, Error, Result};

/// Catch-all topic
pub const ALL: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventName {
    parts: Vec<String>,
}

impl EventName {
    pub fn new(command: impl Into<String>) -> EventName {
        EventName {
            parts: vec![command.into()],
        }
    }

    pub fn with_event(mut self, event: Option<String>) -> EventName {
        if let Some(event) = event.filter(|e| !e.is_empty()) {
            self.parts.push(event);
        }
        self
    }

    /// Empty channels are skipped
    pub fn with_channel(mut self, channel: &str) -> EventName {
        if !channel.is_empty() {
            self.parts.push(channel.to_owned());
        }
        self
    }

    pub fn command(&self) -> &str {
        &self.parts[0]
    }

    /// Every topic this name is published under, deduplicated, in order:
    /// `*`, each prefix, then each segment.
    pub fn topics(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let prefixes = (1..=self.parts.len()).map(|len| self.parts[..len].join("/"));
        std::iter::once(ALL.to_owned())
            .chain(prefixes)
            .chain(self.parts.iter().cloned())
            .filter(|topic| seen.insert(topic.clone()))
            .collect()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join("/"))
    }
}

impl From<ChatEvent> for EventName {
    fn from(event: ChatEvent) -> Self {
        EventName::new(event.as_str())
    }
}

/// Events that come from the connection rather than from a chat line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatEvent {
    Connected,
    Disconnected,
    Reconnect,
    AuthenticationFailed,
    ErrorEncountered,
}

impl ChatEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatEvent::Connected => "CONNECTED",
            ChatEvent::Disconnected => "DISCONNECTED",
            ChatEvent::Reconnect => "RECONNECT",
            ChatEvent::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ChatEvent::ErrorEncountered => "ERROR_ENCOUNTERED",
        }
    }
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub enum Payload {
    Message(Arc<Message>),
    Error(Error),
    None,
}

#[derive(Clone, Debug)]
pub struct Event {
    pub name: EventName,
    pub payload: Payload,
}

impl Event {
    pub fn message(message: Message) -> Event {
        Event {
            name: message.event(),
            payload: Payload::Message(Arc::new(message)),
        }
    }

    pub fn chat(event: ChatEvent, payload: Payload) -> Event {
        Event {
            name: event.into(),
            payload,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match &self.payload {
            Payload::Message(message) => Some(message.as_ref()),
            _ => None,
        }
    }
}

struct Subscriber {
    id: u64,
    topics: HashSet<String>,
    sender: mpsc::UnboundedSender<Event>,
}

struct PendingWaiter {
    id: u64,
    topics: HashSet<String>,
    sender: oneshot::Sender<Event>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<Subscriber>,
    waiters: Vec<PendingWaiter>,
}

impl Registry {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Topic-based publish/subscribe registry.
///
/// Never held across an await point; delivery goes through channels.
#[derive(Default)]
pub struct Bus {
    registry: Mutex<Registry>,
}

impl Bus {
    pub fn new() -> Arc<Bus> {
        Arc::new(Bus::default())
    }

    /// Receives every event published under any of `topics` until dropped.
    pub fn subscribe<I, T>(self: &Arc<Self>, topics: I) -> Subscription
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut registry = self.registry.lock();
        let id = registry.id();
        registry.subscribers.push(Subscriber {
            id,
            topics: topics.into_iter().map(Into::into).collect(),
            sender,
        });
        Subscription {
            id,
            receiver,
            bus: Arc::downgrade(self),
        }
    }

    /// One-shot registration: resolves with the first event published under
    /// any of `topics`. Register before sending whatever triggers the event.
    pub fn waiter<I, T>(self: &Arc<Self>, topics: I) -> Waiter
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let (sender, receiver) = oneshot::channel();
        let mut registry = self.registry.lock();
        let id = registry.id();
        registry.waiters.push(PendingWaiter {
            id,
            topics: topics.into_iter().map(Into::into).collect(),
            sender,
        });
        Waiter {
            id,
            receiver,
            bus: Arc::downgrade(self),
        }
    }

    pub fn publish(&self, event: Event) {
        let topics = event.name.topics();
        let matches = |wanted: &HashSet<String>| topics.iter().any(|t| wanted.contains(t));

        let mut registry = self.registry.lock();
        registry.subscribers.retain(|sub| {
            if matches(&sub.topics) {
                sub.sender.send(event.clone()).is_ok()
            } else {
                !sub.sender.is_closed()
            }
        });

        let (fired, pending) = std::mem::take(&mut registry.waiters)
            .into_iter()
            .partition::<Vec<_>, _>(|w| matches(&w.topics));
        registry.waiters = pending;
        drop(registry);

        for waiter in fired {
            let _ = waiter.sender.send(event.clone());
        }
    }

    /// Drops every pending waiter, which makes them resolve with `Disconnected`
    pub fn cancel_waiters(&self) {
        self.registry.lock().waiters.clear();
    }

    fn unsubscribe(&self, id: u64) {
        self.registry.lock().subscribers.retain(|s| s.id != id);
    }

    fn remove_waiter(&self, id: u64) {
        self.registry.lock().waiters.retain(|w| w.id != id);
    }

    #[cfg(test)]
    fn counts(&self) -> (usize, usize) {
        let registry = self.registry.lock();
        (registry.subscribers.len(), registry.waiters.len())
    }
}

/// A live subscription. Also usable as a [`Stream`] of events.
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Event>,
    bus: Weak<Bus>,
}

impl Subscription {
    /// `None` once the bus is gone
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// A pending one-shot wait. Dropping it (e.g. on timeout) deregisters it.
pub struct Waiter {
    id: u64,
    receiver: oneshot::Receiver<Event>,
    bus: Weak<Bus>,
}

impl Future for Waiter {
    type Output = Result<Event>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|res| res.map_err(|_| Error::Disconnected))
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove_waiter(self.id);
        }
    }
}
