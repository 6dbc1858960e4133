//! TMI transport
//!
//! Owns one WebSocket. Performs the capability/auth handshake, answers PINGs,
//! watches for silence and feeds every parsed line to the owner through an
//! unbounded channel of [`Signal`]s. Transport failures are reported as
//! signals, never returned to a caller that is not waiting for them.
use std::{future::Future, sync::Arc, time::Duration};

use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use rand::Rng;
use tokio::{
    net::TcpStream,
    sync::{mpsc, Mutex as AsyncMutex},
    task::JoinHandle,
    time::{sleep, Instant},
};
use tokio_tungstenite::{tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};

use crate::{
    config::{Config, Login},
    irc,
    queue::{Priority, Queue, RateTier, PRIORITY_DEFAULT, PRIORITY_MAX},
    tmi::{self, write},
    Error, Result,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

#[derive(Debug)]
pub enum Signal {
    /// Every parsed line, in delivery order
    Message(tmi::Message),
    /// Authenticated (or, for anonymous logins, welcomed)
    Connected,
    /// The gateway rejected the credentials. The socket is closed afterwards.
    AuthenticationFailed,
    /// The gateway asked us to reconnect, or the connection went silent
    Reconnect,
    /// The socket closed without being asked to
    Disconnected,
    Error(Error),
}

#[derive(Clone, Copy, Debug)]
pub struct SendOptions {
    pub priority: Priority,
    /// Route through the moderator queue, if there is one
    pub is_moderator: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        SendOptions {
            priority: PRIORITY_DEFAULT,
            is_moderator: false,
        }
    }
}

struct Outbound {
    sink: Arc<AsyncMutex<WsSink>>,
    default: Queue,
    moderator: Option<Queue>,
}

impl Outbound {
    /// Enqueues `line`. The write itself happens when the queue dispatches it.
    fn write(&self, line: String, options: SendOptions) -> impl Future<Output = Result<()>> {
        let queue = match (&self.moderator, options.is_moderator) {
            (Some(moderator), true) => moderator,
            _ => &self.default,
        };
        let sink = self.sink.clone();
        let task = queue.push(options.priority, async move {
            log::debug!("< {}", redact(line.trim_end()));
            sink.lock().await.send(WsMessage::Text(line)).await
        });
        async move { task.await?.map_err(Error::from) }
    }

    fn close_queues(&self) {
        self.default.close();
        if let Some(moderator) = &self.moderator {
            moderator.close();
        }
    }
}

fn redact(line: &str) -> &str {
    if line.starts_with("PASS ") {
        "PASS oauth:<redacted>"
    } else {
        line
    }
}

pub struct Client {
    outbound: Arc<Outbound>,
    reader: JoinHandle<()>,
    username: String,
}

impl Client {
    /// Opens the socket and sends the handshake. Does not wait for the
    /// gateway's answer; that arrives as [`Signal::Connected`] or
    /// [`Signal::AuthenticationFailed`].
    pub async fn connect(
        config: &Config,
        signals: mpsc::UnboundedSender<Signal>,
    ) -> Result<Client> {
        log::debug!("Connecting to {}", config.url);
        let (stream, _) = tokio_tungstenite::connect_async(config.url.as_str()).await?;
        let (sink, stream) = stream.split();

        let (default_tier, moderator_tier) = RateTier::select(config.is_known, config.is_verified);
        let outbound = Arc::new(Outbound {
            sink: Arc::new(AsyncMutex::new(sink)),
            default: Queue::with_tier(default_tier),
            moderator: moderator_tier.map(Queue::with_tier),
        });

        let is_anonymous = config.is_anonymous();
        let (username, token) = match &config.credentials {
            Login::Regular { login, token } if !is_anonymous => {
                (login.to_lowercase(), Some(token.clone()))
            }
            Login::Regular { login, .. } => (login.to_lowercase(), None),
            Login::Anonymous => {
                let nick = format!("justinfan{}", rand::thread_rng().gen_range(10000..99999));
                (nick, None)
            }
        };

        let reader = tokio::spawn(read_loop(
            stream,
            outbound.clone(),
            signals,
            KeepAlive {
                ping: config.keep_alive_ping,
                reconnect: config.keep_alive_reconnect,
            },
            is_anonymous,
        ));
        let client = Client {
            outbound,
            reader,
            username,
        };

        // < CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership
        // < PASS oauth:<token>
        // < NICK <login>
        let top = SendOptions {
            priority: PRIORITY_MAX,
            is_moderator: false,
        };
        let cap = client.outbound.write(write::cap(), top);
        let pass = token.map(|token| client.outbound.write(write::pass(&token), top));
        let nick = client.outbound.write(write::nick(&client.username), top);
        cap.await?;
        if let Some(pass) = pass {
            pass.await?;
        }
        nick.await?;

        Ok(client)
    }

    /// The nick sent during the handshake
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Enqueues a raw line; a missing CRLF is added
    pub fn send(
        &self,
        line: impl Into<String>,
        options: SendOptions,
    ) -> impl Future<Output = Result<()>> {
        let mut line = line.into();
        if !line.ends_with("\r\n") {
            line.push_str("\r\n");
        }
        self.outbound.write(line, options)
    }

    /// Stops the keep-alive timers, rejects queued sends and closes the socket
    pub async fn disconnect(&self) {
        self.reader.abort();
        self.outbound.close_queues();
        if let Err(err) = self.outbound.sink.lock().await.close().await {
            log::debug!("Error while closing socket: {}", err);
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
        self.outbound.close_queues();
    }
}

#[derive(Clone, Copy)]
struct KeepAlive {
    ping: Duration,
    reconnect: Duration,
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    outbound: Arc<Outbound>,
    signals: mpsc::UnboundedSender<Signal>,
    keep_alive: KeepAlive,
    is_anonymous: bool,
) {
    let ping = sleep(keep_alive.ping);
    let idle = sleep(keep_alive.reconnect);
    tokio::pin!(ping);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            frame = stream.next() => {
                let now = Instant::now();
                ping.as_mut().reset(now + keep_alive.ping);
                idle.as_mut().reset(now + keep_alive.reconnect);

                match frame {
                    Some(Ok(WsMessage::Text(payload))) => {
                        match handle_payload(&payload, &outbound, &signals, is_anonymous) {
                            Flow::Continue => (),
                            Flow::Close => {
                                let _ = outbound.sink.lock().await.close().await;
                                break;
                            }
                            Flow::Stop => break,
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        log::info!("Connection closed by server");
                        let _ = signals.send(Signal::Disconnected);
                        break;
                    }
                    Some(Ok(_)) => (),
                    Some(Err(err)) => {
                        log::error!("Socket error: {}", err);
                        let _ = signals.send(Signal::Error(err.into()));
                        let _ = signals.send(Signal::Disconnected);
                        break;
                    }
                }
            }
            _ = &mut ping => {
                ping.as_mut().reset(Instant::now() + keep_alive.ping);
                let _ = outbound.write(write::ping(), SendOptions::default());
            }
            _ = &mut idle => {
                log::warn!("No traffic for {:?}, reconnecting", keep_alive.reconnect);
                let _ = signals.send(Signal::Reconnect);
                break;
            }
        }
    }
}

enum Flow {
    Continue,
    /// Close the socket and stop reading
    Close,
    /// Owner is gone
    Stop,
}

fn handle_payload(
    payload: &str,
    outbound: &Outbound,
    signals: &mpsc::UnboundedSender<Signal>,
    is_anonymous: bool,
) -> Flow {
    for line in irc::lines(payload) {
        log::debug!("> {}", line);
    }

    let mut errors = Vec::new();
    for result in tmi::parse::parse_payload(payload) {
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                log::warn!("{}", err);
                errors.push(err);
                continue;
            }
        };

        if let tmi::Message::Notice(notice) = &message {
            if notice.is_login_failure() {
                log::error!("Login authentication failed");
                let _ = signals.send(Signal::Message(message));
                flush_errors(signals, errors);
                let _ = signals.send(Signal::AuthenticationFailed);
                return Flow::Close;
            }
        }

        let connected = match &message {
            tmi::Message::Welcome(_) => is_anonymous,
            tmi::Message::GlobalUserState(_) => !is_anonymous,
            _ => false,
        };
        let reconnect = matches!(message, tmi::Message::Reconnect(_));
        if let tmi::Message::Ping(_) = message {
            let _ = outbound.write(
                write::pong(),
                SendOptions {
                    priority: PRIORITY_MAX,
                    is_moderator: false,
                },
            );
        }

        if signals.send(Signal::Message(message)).is_err() {
            return Flow::Stop;
        }
        if connected {
            let _ = signals.send(Signal::Connected);
        }
        if reconnect {
            log::info!("Server requested a reconnect");
            let _ = signals.send(Signal::Reconnect);
        }
    }

    flush_errors(signals, errors);
    Flow::Continue
}

/// Parse errors are reported once the rest of the batch has been handled
fn flush_errors(signals: &mpsc::UnboundedSender<Signal>, errors: Vec<tmi::parse::Error>) {
    for err in errors {
        let _ = signals.send(Signal::Error(Error::Parse(err)));
    }
}
