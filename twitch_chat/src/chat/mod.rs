//! Chat orchestrator
//!
//! Owns the connection lifecycle, the per-channel state store and the public
//! command surface. Inbound lines flow transport -> router -> state -> bus;
//! state is always updated before the triggering event is published.
use std::{
    future::Future,
    sync::{Arc, Weak},
};

use futures::{
    future::{self, BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;
use tokio::{
    sync::mpsc,
    task::{AbortHandle, JoinHandle},
    time::{sleep, timeout},
};

use crate::{
    config::{Config, Login},
    conn::{Client, SendOptions, Signal},
    event::{Bus, ChatEvent, Event, Payload, Subscription, ALL},
    queue::{Priority, PRIORITY_DEFAULT},
    tmi::{tags::UserStateTags, write},
    Error, Result,
};

mod commands;
mod state;

pub use state::{ChannelState, Status};
use state::State;

type Pending = Shared<BoxFuture<'static, Result<()>>>;

struct Connection {
    status: Status,
    /// Bumped whenever a connect attempt starts or the connection is torn down.
    /// Work belonging to an older generation must not touch the connection.
    generation: u64,
    client: Option<Arc<Client>>,
    router: Option<JoinHandle<()>>,
    pending: Option<(Pending, AbortHandle)>,
}

impl Connection {
    fn teardown(&mut self) -> Option<Arc<Client>> {
        if let Some(router) = self.router.take() {
            router.abort();
        }
        self.client.take()
    }

    fn cancel_pending(&mut self) {
        if let Some((_, handle)) = self.pending.take() {
            handle.abort();
        }
    }
}

struct Inner {
    config: Mutex<Config>,
    bus: Arc<Bus>,
    state: Mutex<State>,
    conn: Mutex<Connection>,
}

enum Opened {
    Connected,
    AuthenticationFailed,
}

impl Inner {
    fn start_connect(self: &Arc<Self>, fresh: bool) -> Pending {
        let mut conn = self.conn.lock();
        if !fresh {
            if conn.status == Status::Connected {
                return future::ready(Ok(())).boxed().shared();
            }
            if let Some((pending, _)) = &conn.pending {
                return pending.clone();
            }
        }

        conn.cancel_pending();
        conn.generation += 1;
        conn.status = if fresh {
            Status::Reconnecting
        } else {
            Status::Connecting
        };
        log::info!("Status: {:?}", conn.status);

        let task = tokio::spawn(run_connect(self.clone(), conn.generation));
        let handle = task.abort_handle();
        let pending = task
            .map(|result| result.unwrap_or_else(|_| Err(Error::Disconnected)))
            .boxed()
            .shared();
        conn.pending = Some((pending.clone(), handle));
        pending
    }

    /// Replaces the transport and waits for the gateway's verdict
    async fn open(self: &Arc<Self>, config: &Config, generation: u64) -> Result<Opened> {
        let old = self.conn.lock().teardown();
        if let Some(old) = old {
            old.disconnect().await;
        }

        let verdict = self.bus.waiter(vec![
            ChatEvent::Connected.as_str(),
            ChatEvent::AuthenticationFailed.as_str(),
            ChatEvent::Disconnected.as_str(),
        ]);
        let (signals, receiver) = mpsc::unbounded_channel();
        let client = Arc::new(Client::connect(config, signals).await?);
        {
            let mut conn = self.conn.lock();
            if conn.generation != generation {
                return Err(Error::Disconnected);
            }
            let username = client.username().to_owned();
            let router = route(Arc::downgrade(self), receiver, generation, username);
            conn.router = Some(tokio::spawn(router));
            conn.client = Some(client);
        }

        let event = verdict.await?;
        match event.name.command() {
            "CONNECTED" => Ok(Opened::Connected),
            "AUTHENTICATION_FAILED" => Ok(Opened::AuthenticationFailed),
            _ => Err(Error::Disconnected),
        }
    }

    /// Bounded retry loop. Backs off by the connection timeout between
    /// attempts; an authentication failure asks for a fresh token once.
    async fn connect_loop(self: &Arc<Self>, generation: u64) -> Result<()> {
        let attempts = self.config.lock().reconnect_attempts.max(1);
        let mut refreshed = false;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let config = self.config.lock().clone();
            let opened = timeout(config.connection_timeout, self.open(&config, generation)).await;
            let error = match opened {
                Ok(Ok(Opened::Connected)) => return Ok(()),
                Ok(Ok(Opened::AuthenticationFailed)) => {
                    let refresh = match &config.on_authentication_failure {
                        Some(refresh) if !refreshed => refresh.clone(),
                        _ => {
                            return Err(Error::Authentication("Login authentication failed".into()))
                        }
                    };
                    log::info!("Refreshing token");
                    let token = refresh
                        .refresh()
                        .await
                        .map_err(|err| Error::Authentication(err.to_string()))?;
                    self.set_token(token);
                    refreshed = true;
                    continue;
                }
                Ok(Err(err)) => err,
                Err(_) => Error::ConnectionTimeout,
            };

            if attempt >= attempts {
                return Err(error);
            }
            log::warn!(
                "Connection attempt {}/{} failed: {}; retrying in {:?}",
                attempt,
                attempts,
                error,
                config.connection_timeout
            );
            sleep(config.connection_timeout).await;
        }
    }

    fn set_token(&self, new: String) {
        if let Login::Regular { token, .. } = &mut self.config.lock().credentials {
            *token = new;
        }
    }

    /// Marks the connection as up, if `generation` is still current
    fn mark_connected(&self, generation: u64) {
        let mut conn = self.conn.lock();
        if conn.generation == generation {
            conn.status = Status::Connected;
        }
    }

    /// Handles a connection lost without being asked to. Only the first loss
    /// reported for a live connection starts a reconnect.
    fn lost(self: &Arc<Self>, event: ChatEvent, generation: u64) -> Event {
        let claimed = {
            let mut conn = self.conn.lock();
            if conn.generation == generation && conn.status == Status::Connected {
                conn.status = Status::Reconnecting;
                true
            } else {
                false
            }
        };
        if claimed {
            log::info!("{}, reconnecting", event);
            let inner = self.clone();
            tokio::spawn(async move {
                if let Err(err) = inner.start_connect(true).await {
                    log::error!("Reconnect failed: {}", err);
                }
            });
        }
        Event::chat(event, Payload::None)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let conn = self.conn.get_mut();
        conn.cancel_pending();
        conn.teardown();
    }
}

async fn run_connect(inner: Arc<Inner>, generation: u64) -> Result<()> {
    {
        let mut conn = inner.conn.lock();
        if conn.generation == generation {
            conn.status = Status::Connecting;
        }
    }

    let result = inner.connect_loop(generation).await;

    let stale = {
        let mut conn = inner.conn.lock();
        if conn.generation != generation {
            return result;
        }
        conn.pending = None;
        match &result {
            Ok(()) => {
                conn.status = Status::Connected;
                None
            }
            Err(_) => {
                conn.status = Status::Disconnected;
                conn.teardown()
            }
        }
    };
    if let Some(stale) = stale {
        stale.disconnect().await;
    }

    match &result {
        Ok(()) => {
            log::info!("Connected");
            let chat = Chat { inner };
            tokio::spawn(async move { chat.rejoin().await });
        }
        Err(err) => log::error!("Failed to connect: {}", err),
    }
    result
}

/// Applies every signal of one transport to the state store, then publishes it
async fn route(
    inner: Weak<Inner>,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    generation: u64,
    username: String,
) {
    while let Some(signal) = signals.recv().await {
        let inner = match inner.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        let event = match signal {
            Signal::Message(message) => {
                inner.state.lock().apply(&message, &username);
                Event::message(message)
            }
            Signal::Connected => {
                inner.mark_connected(generation);
                Event::chat(ChatEvent::Connected, Payload::None)
            }
            Signal::AuthenticationFailed => {
                Event::chat(ChatEvent::AuthenticationFailed, Payload::None)
            }
            Signal::Reconnect => inner.lost(ChatEvent::Reconnect, generation),
            Signal::Disconnected => inner.lost(ChatEvent::Disconnected, generation),
            Signal::Error(err) => {
                log::error!("{}", err);
                Event::chat(ChatEvent::ErrorEncountered, Payload::Error(err))
            }
        };
        inner.bus.publish(event);
    }
}

#[derive(Clone)]
pub struct Chat {
    inner: Arc<Inner>,
}

/// Handle that does not keep the chat alive
#[derive(Clone)]
pub struct WeakChat(Weak<Inner>);

impl WeakChat {
    pub fn upgrade(&self) -> Option<Chat> {
        self.0.upgrade().map(|inner| Chat { inner })
    }
}

impl Chat {
    pub fn new(config: Config) -> Chat {
        Chat {
            inner: Arc::new(Inner {
                config: Mutex::new(config),
                bus: Bus::new(),
                state: Mutex::new(State::default()),
                conn: Mutex::new(Connection {
                    status: Status::Waiting,
                    generation: 0,
                    client: None,
                    router: None,
                    pending: None,
                }),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakChat {
        WeakChat(Arc::downgrade(&self.inner))
    }

    /// Connects and authenticates. While a connection attempt is in flight,
    /// every caller shares its result.
    pub fn connect(&self) -> impl Future<Output = Result<()>> {
        self.inner.start_connect(false)
    }

    /// Drops the current connection (optionally replacing the config first)
    /// and connects again. Joined channels are rejoined.
    pub async fn reconnect(&self, config: Option<Config>) -> Result<()> {
        if let Some(config) = config {
            *self.inner.config.lock() = config;
        }
        self.inner.start_connect(true).await
    }

    /// Cancels any connection attempt, closes the socket and forgets every
    /// channel.
    pub async fn disconnect(&self) {
        let (client, generation) = {
            let mut conn = self.inner.conn.lock();
            conn.cancel_pending();
            conn.generation += 1;
            conn.status = Status::Disconnecting;
            (conn.teardown(), conn.generation)
        };
        log::info!("Disconnecting");
        if let Some(client) = client {
            client.disconnect().await;
        }

        self.inner.state.lock().clear();
        self.inner.bus.cancel_waiters();
        {
            let mut conn = self.inner.conn.lock();
            if conn.generation == generation {
                conn.status = Status::Disconnected;
            }
        }
        self.inner
            .bus
            .publish(Event::chat(ChatEvent::Disconnected, Payload::None));
    }

    /// Applies `f` to the stored config. Takes effect on the next connect.
    pub fn update_config(&self, f: impl FnOnce(&mut Config)) {
        f(&mut self.inner.config.lock())
    }

    pub fn config(&self) -> Config {
        self.inner.config.lock().clone()
    }

    pub fn status(&self) -> Status {
        self.inner.conn.lock().status
    }

    pub fn is_anonymous(&self) -> bool {
        self.inner.config.lock().is_anonymous()
    }

    /// Our nick on the current connection
    pub fn username(&self) -> Option<String> {
        self.inner
            .conn
            .lock()
            .client
            .as_ref()
            .map(|client| client.username().to_owned())
    }

    pub fn channel_state(&self, channel: &str) -> Option<ChannelState> {
        self.inner.state.lock().channels.get(&write::channel(channel)).cloned()
    }

    pub fn channels(&self) -> Vec<String> {
        self.inner.state.lock().channels.keys().cloned().collect()
    }

    pub fn global_user_state(&self) -> Option<UserStateTags> {
        self.inner.state.lock().global_user_state.clone()
    }

    /// Receives every event published under any of `topics`, see [`crate::event`]
    pub fn subscribe<I, T>(&self, topics: I) -> Subscription
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.inner.bus.subscribe(topics)
    }

    /// Receives every event
    pub fn events(&self) -> Subscription {
        self.inner.bus.subscribe(vec![ALL])
    }

    fn client(&self) -> Result<Arc<Client>> {
        let conn = self.inner.conn.lock();
        match (&conn.client, conn.status) {
            (Some(client), Status::Connected) => Ok(client.clone()),
            _ => Err(Error::Chat("Not connected".into())),
        }
    }

    fn require_authentication(&self) -> Result<()> {
        if self.is_anonymous() {
            Err(Error::Chat("Anonymous connections cannot send messages".into()))
        } else {
            Ok(())
        }
    }

    fn is_moderator(&self, channel: &str) -> bool {
        self.inner
            .state
            .lock()
            .channels
            .get(channel)
            .map_or(false, |c| c.is_moderator())
    }

    /// Joins `channel` and resolves with its state once the gateway has sent
    /// ROOMSTATE (and, when authenticated, USERSTATE) for it.
    pub async fn join(&self, channel: &str) -> Result<ChannelState> {
        let channel = write::channel(channel);
        let client = self.client()?;
        let join_timeout = self.inner.config.lock().join_timeout;

        let room_state = self.inner.bus.waiter(vec![format!("ROOMSTATE/{}", channel)]);
        let user_state = if self.is_anonymous() {
            None
        } else {
            Some(self.inner.bus.waiter(vec![format!("USERSTATE/{}", channel)]))
        };
        let was_joined = {
            let mut state = self.inner.state.lock();
            state.joining.insert(channel.clone());
            state.channels.contains_key(&channel)
        };

        let joined = timeout(join_timeout, async {
            client.send(write::join(&channel), SendOptions::default()).await?;
            match user_state {
                Some(user_state) => futures::try_join!(room_state, user_state).map(|_| ()),
                None => room_state.await.map(|_| ()),
            }
        })
        .await;

        let mut state = self.inner.state.lock();
        state.joining.remove(&channel);
        let err = match joined {
            Ok(Ok(())) => match state.channels.get(&channel) {
                Some(joined) => {
                    log::info!("Joined {}", channel);
                    return Ok(joined.clone());
                }
                None => Error::Chat(format!("Left {} while joining", channel)),
            },
            Ok(Err(err)) => err,
            Err(_) => Error::JoinTimeout(channel.clone()),
        };
        // state collected by a failed join is not a joined channel
        if !was_joined {
            state.channels.remove(&channel);
        }
        Err(err)
    }

    /// Leaves `channel`. Its state is dropped immediately; the returned future
    /// resolves once PART has been sent.
    pub fn part(&self, channel: &str) -> impl Future<Output = Result<()>> {
        let channel = write::channel(channel);
        {
            let mut state = self.inner.state.lock();
            state.channels.remove(&channel);
            state.joining.remove(&channel);
        }
        let sent = self
            .client()
            .map(|client| client.send(write::part(&channel), SendOptions::default()));
        async move { sent?.await }
    }

    async fn rejoin(&self) {
        let channels = self.channels();
        if channels.is_empty() {
            return;
        }
        log::info!("Rejoining {}", channels.join(", "));
        let results = future::join_all(channels.iter().map(|channel| self.join(channel))).await;
        for (channel, result) in channels.iter().zip(results) {
            if let Err(err) = result {
                log::error!("Failed to rejoin {}: {}", channel, err);
                self.inner.state.lock().channels.remove(channel);
            }
        }
    }

    /// Sends a message to `channel`. Plain messages resolve once the gateway
    /// acknowledges them with USERSTATE; `/commands` resolve once sent.
    pub async fn say(&self, channel: &str, message: &str) -> Result<()> {
        self.say_with_priority(channel, message, PRIORITY_DEFAULT).await
    }

    pub async fn say_with_priority(
        &self,
        channel: &str,
        message: &str,
        priority: Priority,
    ) -> Result<()> {
        self.require_authentication()?;
        let channel = write::channel(channel);
        let client = self.client()?;
        let options = SendOptions {
            priority,
            is_moderator: self.is_moderator(&channel),
        };

        if message.starts_with('/') {
            return client.send(write::privmsg(&channel, message), options).await;
        }

        let mut topics = vec![format!("USERSTATE/{}", channel)];
        topics.extend(commands::notice_topics(commands::SAY_FAILURES, &channel));
        let acknowledged = self.inner.bus.waiter(topics);
        let command_timeout = self.inner.config.lock().command_timeout;

        let event = timeout(command_timeout, async {
            client.send(write::privmsg(&channel, message), options).await?;
            acknowledged.await
        })
        .await
        .map_err(|_| Error::CommandTimeout(message.to_owned()))??;

        match event.name.command() {
            "NOTICE" => Err(Error::Rejected {
                command: message.to_owned(),
                event: event.name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Says `message` in every joined channel
    pub async fn broadcast(&self, message: &str) -> Result<()> {
        let channels = self.channels();
        let says = channels.iter().map(|channel| self.say(channel, message));
        let results = future::join_all(says).await;
        results.into_iter().collect()
    }

    /// Sends a raw line, bypassing every check
    pub async fn send(&self, line: &str, options: SendOptions) -> Result<()> {
        self.client()?.send(line, options).await
    }

    pub async fn whisper(&self, user: &str, message: &str) -> Result<()> {
        self.require_authentication()?;
        self.client()?
            .send(write::whisper(user, message), SendOptions::default())
            .await
    }
}
