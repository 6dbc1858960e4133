use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{FutureExt, SinkExt, StreamExt};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::{net::TcpListener, sync::mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use twitch_chat::{event::Payload, Chat, Config, Error, Login, RefreshToken, Status};

/// Makes the mock close the socket instead of sending a line
const CLOSE: &str = "<close>";

type Script = dyn Fn(&str, usize) -> Vec<String> + Send + Sync;

struct Mock {
    url: String,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    push: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl Mock {
    /// Accepts any number of connections and answers every received line with
    /// `script(line, connection index)`.
    async fn start(script: impl Fn(&str, usize) -> Vec<String> + Send + Sync + 'static) -> Mock {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mock = Mock {
            url: format!("ws://{}", listener.local_addr().unwrap()),
            received: Arc::default(),
            connections: Arc::default(),
            push: Arc::default(),
        };
        let script: Arc<Script> = Arc::new(script);
        let received = mock.received.clone();
        let connections = mock.connections.clone();
        let push = mock.push.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let ws = match accept_async(socket).await {
                    Ok(ws) => ws,
                    Err(_) => continue,
                };
                let index = connections.fetch_add(1, Ordering::SeqCst);
                let (tx, rx) = mpsc::unbounded_channel();
                *push.lock() = Some(tx);
                tokio::spawn(session(ws, index, script.clone(), received.clone(), rx));
            }
        });
        mock
    }

    /// Sends `line` unprompted on the latest connection
    fn push(&self, line: &str) {
        if let Some(push) = &*self.push.lock() {
            let _ = push.send(line.to_owned());
        }
    }

    fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    fn count(&self, line: &str) -> usize {
        self.received().iter().filter(|l| *l == line).count()
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn config(&self, credentials: Login) -> Config {
        Config {
            credentials,
            url: self.url.clone(),
            connection_timeout: Duration::from_secs(2),
            join_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(2),
            reconnect_attempts: 2,
            ..Config::default()
        }
    }
}

async fn session(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    index: usize,
    script: Arc<Script>,
    received: Arc<Mutex<Vec<String>>>,
    mut pushed: mpsc::UnboundedReceiver<String>,
) {
    let (mut sink, mut stream) = ws.split();
    loop {
        let replies = tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let mut replies = Vec::new();
                    for line in text.split("\r\n").filter(|l| !l.is_empty()) {
                        received.lock().push(line.to_owned());
                        replies.extend(script(line, index));
                    }
                    replies
                }
                Some(Ok(_)) => continue,
                _ => return,
            },
            line = pushed.recv() => match line {
                Some(line) => vec![line],
                None => return,
            },
        };
        for reply in replies {
            if reply == CLOSE {
                let _ = sink.close().await;
                return;
            }
            if sink.send(WsMessage::Text(format!("{}\r\n", reply))).await.is_err() {
                return;
            }
        }
    }
}

/// A well-behaved gateway
fn tmi(line: &str) -> Vec<String> {
    if line.starts_with("NICK ") {
        return vec![
            ":tmi.twitch.tv 001 ronni :Welcome, GLHF!".into(),
            "@badge-info=;badges=;color=#0000FF;display-name=Ronni;emote-sets=0;user-id=1337;\
             user-type= :tmi.twitch.tv GLOBALUSERSTATE"
                .into(),
        ];
    }
    if let Some(channel) = line.strip_prefix("JOIN ") {
        return vec![
            format!(":ronni!ronni@ronni.tmi.twitch.tv JOIN {}", channel),
            format!(
                "@badge-info=;badges=;color=#0000FF;display-name=Ronni;emote-sets=0;mod=0;\
                 subscriber=0;user-type= :tmi.twitch.tv USERSTATE {}",
                channel
            ),
            format!(
                "@emote-only=0;followers-only=-1;r9k=0;rituals=0;room-id=1;slow=0;subs-only=0 \
                 :tmi.twitch.tv ROOMSTATE {}",
                channel
            ),
        ];
    }
    if let Some(rest) = line.strip_prefix("PRIVMSG ") {
        let (channel, text) = rest.split_once(" :").unwrap_or((rest, ""));
        let notice = |id: &str, text: &str| {
            format!("@msg-id={} :tmi.twitch.tv NOTICE {} :{}", id, channel, text)
        };
        return match text {
            "/ban fred" => vec![notice("ban_success", "fred is now banned from this channel.")],
            "/ban ronni" => vec![notice("bad_ban_self", "You cannot ban yourself.")],
            "/mods" => vec![notice("room_mods", "The moderators of this channel are: fred, wilma")],
            "/clear" => vec![format!(
                "@room-id=1;tmi-sent-ts=1 :tmi.twitch.tv CLEARCHAT {}",
                channel
            )],
            "/commercial 30" => vec![],
            "hello again" => vec![notice(
                "msg_duplicate",
                "Your message is identical to the previous one.",
            )],
            _ if !text.starts_with('/') => {
                vec![format!("@mod=0 :tmi.twitch.tv USERSTATE {}", channel)]
            }
            _ => vec![],
        };
    }
    vec![]
}

const LOGIN_FAILED: &str = ":tmi.twitch.tv NOTICE * :Login authentication failed";

fn ronni() -> Login {
    Login::regular("ronni", "secret")
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn authenticated_handshake_and_join() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();
    assert_eq!(Status::Connected, chat.status());
    assert_eq!(Some("1337".to_string()), chat.global_user_state().unwrap().user_id);

    let state = chat.join("Dallas").await.unwrap();
    assert!(!state.is_moderator());
    assert_eq!(Some(0), state.room_state.slow);
    assert_eq!(Some(state), chat.channel_state("#dallas"));
    assert_eq!(vec!["#dallas".to_string()], chat.channels());

    let received = mock.received();
    assert_eq!(
        vec![
            "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership",
            "PASS oauth:secret",
            "NICK ronni",
            "JOIN #dallas",
        ],
        received
    );
}

#[tokio::test]
async fn concurrent_connects_share_one_attempt() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    let (a, b) = futures::join!(chat.connect(), chat.connect());
    a.unwrap();
    b.unwrap();
    chat.connect().await.unwrap();
    assert_eq!(1, mock.connections());
}

#[tokio::test]
async fn anonymous_say_rejects_without_sending() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(Login::Anonymous));
    chat.connect().await.unwrap();
    assert!(chat.is_anonymous());
    assert!(chat.username().unwrap().starts_with("justinfan"));

    assert!(matches!(chat.say("dallas", "hello").await, Err(Error::Chat(_))));
    assert!(matches!(chat.ban("dallas", "fred", None).await, Err(Error::Chat(_))));

    let received = mock.received();
    assert!(received.iter().all(|l| !l.starts_with("PRIVMSG") && !l.starts_with("PASS")));
    assert!(received[1].starts_with("NICK justinfan"));
}

#[tokio::test]
async fn anonymous_join_does_not_wait_for_userstate() {
    let mock = Mock::start(|line, _| match line.strip_prefix("JOIN ") {
        Some(channel) => vec![format!("@slow=10 :tmi.twitch.tv ROOMSTATE {}", channel)],
        None => tmi(line),
    })
    .await;
    let chat = Chat::new(mock.config(Login::Anonymous));
    chat.connect().await.unwrap();

    let state = chat.join("#dallas").await.unwrap();
    assert_eq!(Some(10), state.room_state.slow);
    assert!(state.user_state.is_none());
}

#[tokio::test]
async fn join_times_out() {
    let mock = Mock::start(|line, _| {
        if line.starts_with("JOIN") {
            vec![]
        } else {
            tmi(line)
        }
    })
    .await;
    let mut config = mock.config(ronni());
    config.join_timeout = Duration::from_millis(200);
    let chat = Chat::new(config);
    chat.connect().await.unwrap();

    assert!(matches!(chat.join("dallas").await, Err(Error::JoinTimeout(c)) if c == "#dallas"));
    assert!(chat.channel_state("#dallas").is_none());
}

#[tokio::test]
async fn failed_join_leaves_no_state() {
    let mock = Mock::start(|line, _| match line.strip_prefix("JOIN ") {
        Some(channel) => vec![format!("@mod=0 :tmi.twitch.tv USERSTATE {}", channel)],
        None => tmi(line),
    })
    .await;
    let mut config = mock.config(ronni());
    config.join_timeout = Duration::from_millis(300);
    let chat = Chat::new(config);
    chat.connect().await.unwrap();

    assert!(matches!(chat.join("dallas").await, Err(Error::JoinTimeout(_))));
    assert!(chat.channel_state("#dallas").is_none());
    assert!(chat.channels().is_empty());
}

#[tokio::test]
async fn failed_rejoin_forgets_the_channel() {
    let mock = Mock::start(|line, index| match line.strip_prefix("JOIN ") {
        Some(channel) if index > 0 => {
            vec![format!("@mod=0 :tmi.twitch.tv USERSTATE {}", channel)]
        }
        _ => tmi(line),
    })
    .await;
    let mut config = mock.config(ronni());
    config.join_timeout = Duration::from_millis(300);
    let chat = Chat::new(config);
    chat.connect().await.unwrap();
    chat.join("dallas").await.unwrap();

    mock.push(":tmi.twitch.tv RECONNECT");
    eventually("rejoin", || mock.count("JOIN #dallas") == 2).await;
    eventually("failed rejoin", || chat.channels().is_empty()).await;
    assert!(chat.channel_state("#dallas").is_none());
}

#[tokio::test]
async fn say_waits_for_acknowledgement() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();
    chat.join("dallas").await.unwrap();

    chat.say("dallas", "hello").await.unwrap();
    assert!(matches!(
        chat.say("dallas", "hello again").await,
        Err(Error::Rejected { event, .. }) if event == "NOTICE/MSG_DUPLICATE/#dallas"
    ));
    assert_eq!(1, mock.count("PRIVMSG #dallas :hello"));
}

#[tokio::test]
async fn moderation_commands() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();

    chat.ban("dallas", "fred", None).await.unwrap();
    match chat.ban("dallas", "ronni", None).await {
        Err(Error::Rejected { command, event }) => {
            assert_eq!("/ban ronni", command);
            assert_eq!("NOTICE/BAD_BAN_SELF/#dallas", event);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(vec!["fred", "wilma"], chat.mods("dallas").await.unwrap());
    chat.clear("dallas").await.unwrap();
    chat.commercial("dallas", Some(30)).await.unwrap();
    eventually("commercial", || mock.count("PRIVMSG #dallas :/commercial 30") == 1).await;
}

#[tokio::test]
async fn unconfirmed_command_times_out() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let mut config = mock.config(ronni());
    config.command_timeout = Duration::from_millis(200);
    let chat = Chat::new(config);
    chat.connect().await.unwrap();

    assert!(matches!(chat.unban("dallas", "fred").await, Err(Error::CommandTimeout(_))));
}

#[tokio::test]
async fn subscribers_get_each_event_once() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();

    let mut events = chat.subscribe(vec!["NOTICE", "NOTICE/BAN_SUCCESS", "BAN_SUCCESS", "#dallas"]);
    let mut bans = chat.subscribe(vec!["BAN_SUCCESS"]);
    chat.ban("dallas", "fred", None).await.unwrap();

    let event = events.next().await.unwrap();
    assert_eq!("NOTICE/BAN_SUCCESS/#dallas", event.name.to_string());
    assert_eq!("NOTICE/BAN_SUCCESS/#dallas", bans.next().await.unwrap().name.to_string());
    assert!(tokio::time::timeout(Duration::from_millis(100), events.next())
        .await
        .is_err());
}

#[tokio::test]
async fn part_drops_state_synchronously() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();
    chat.join("dallas").await.unwrap();

    let parted = chat.part("dallas");
    assert!(chat.channel_state("#dallas").is_none());
    parted.await.unwrap();
    eventually("PART", || mock.count("PART #dallas") == 1).await;
}

#[tokio::test]
async fn refreshes_token_after_login_failure() {
    let mock = Mock::start(|line, index| match (line, index) {
        (l, 0) if l.starts_with("NICK") => vec![LOGIN_FAILED.into()],
        _ => tmi(line),
    })
    .await;
    let refreshes = Arc::new(AtomicUsize::new(0));
    let counter = refreshes.clone();
    let mut config = mock.config(Login::regular("ronni", "stale"));
    config.on_authentication_failure = Some(RefreshToken::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok("fresh".to_string()) }.boxed()
    }));
    let chat = Chat::new(config);

    chat.connect().await.unwrap();
    assert_eq!(1, refreshes.load(Ordering::SeqCst));
    assert_eq!(2, mock.connections());
    assert_eq!(1, mock.count("PASS oauth:stale"));
    assert_eq!(1, mock.count("PASS oauth:fresh"));
    assert_eq!(Some("fresh"), chat.config().credentials.token());
}

#[tokio::test]
async fn login_failure_without_refresh_is_fatal() {
    let mock = Mock::start(|line, _| {
        if line.starts_with("NICK") {
            vec![LOGIN_FAILED.into()]
        } else {
            vec![]
        }
    })
    .await;
    let chat = Chat::new(mock.config(ronni()));

    assert!(matches!(chat.connect().await, Err(Error::Authentication(_))));
    assert_eq!(Status::Disconnected, chat.status());
    assert_eq!(1, mock.connections());
}

#[tokio::test]
async fn server_reconnect_rejoins_channels() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();
    chat.join("dallas").await.unwrap();

    let mut reconnects = chat.subscribe(vec!["RECONNECT"]);
    mock.push(":tmi.twitch.tv RECONNECT");
    reconnects.next().await.unwrap();

    eventually("rejoin", || mock.count("JOIN #dallas") == 2).await;
    assert_eq!(2, mock.connections());
    eventually("channel state", || chat.channel_state("#dallas").is_some()).await;
    assert_eq!(Status::Connected, chat.status());
}

#[tokio::test]
async fn unsolicited_close_reconnects() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();

    mock.push(CLOSE);
    eventually("second connection", || mock.connections() == 2).await;
    eventually("connected", || chat.status() == Status::Connected).await;
}

#[tokio::test]
async fn disconnect_clears_everything() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();
    chat.join("dallas").await.unwrap();

    let mut disconnects = chat.subscribe(vec!["DISCONNECTED"]);
    chat.disconnect().await;
    disconnects.next().await.unwrap();

    assert_eq!(Status::Disconnected, chat.status());
    assert!(chat.channels().is_empty());
    assert!(matches!(chat.say("dallas", "hello").await, Err(Error::Chat(_))));
    assert!(matches!(chat.join("dallas").await, Err(Error::Chat(_))));
    assert_eq!(1, mock.connections());
}

#[tokio::test]
async fn idle_connection_pings_then_reconnects() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let mut config = mock.config(ronni());
    config.keep_alive_ping = Duration::from_millis(200);
    config.keep_alive_reconnect = Duration::from_millis(500);
    let chat = Chat::new(config);
    chat.connect().await.unwrap();

    eventually("keep-alive ping", || mock.count("PING :tmi.twitch.tv") >= 1).await;
    eventually("reconnect", || mock.connections() >= 2).await;
    eventually("connected", || chat.status() == Status::Connected).await;
}

#[tokio::test]
async fn reconnect_with_new_config() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();
    chat.join("dallas").await.unwrap();

    chat.reconnect(Some(mock.config(Login::regular("ronni", "rotated"))))
        .await
        .unwrap();
    assert_eq!(Some("rotated"), chat.config().credentials.token());
    assert_eq!(2, mock.connections());
    assert_eq!(1, mock.count("PASS oauth:rotated"));
    eventually("rejoin", || mock.count("JOIN #dallas") == 2).await;
}

#[tokio::test]
async fn disconnect_cancels_pending_connect() {
    // never confirms the login
    let mock = Mock::start(|_, _| vec![]).await;
    let chat = Chat::new(mock.config(ronni()));

    let pending = chat.connect();
    eventually("connection", || mock.connections() == 1).await;
    assert_eq!(Status::Connecting, chat.status());

    chat.disconnect().await;
    assert!(matches!(pending.await, Err(Error::Disconnected)));
    assert_eq!(Status::Disconnected, chat.status());
}

/// Moderators get acknowledged as moderators, so every send stays in their queue
fn modded(line: &str) -> Vec<String> {
    const MOD: &str = "@badges=moderator/1;mod=1 :tmi.twitch.tv USERSTATE #modded";
    if line == "JOIN #modded" {
        vec![
            MOD.into(),
            "@emote-only=0;followers-only=-1;r9k=0;slow=0;subs-only=0 :tmi.twitch.tv ROOMSTATE #modded".into(),
        ]
    } else if line.starts_with("PRIVMSG #modded :") {
        vec![MOD.into()]
    } else {
        tmi(line)
    }
}

async fn say_many(chat: &Chat, channel: &str, count: usize) -> Vec<twitch_chat::Result<()>> {
    let messages = (0..count).map(|i| format!("message {}", i)).collect::<Vec<_>>();
    futures::future::join_all(messages.iter().map(|m| chat.say(channel, m))).await
}

#[tokio::test]
async fn moderators_send_through_their_own_queue() {
    let mock = Mock::start(|line, _| modded(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();
    assert!(chat.join("modded").await.unwrap().is_moderator());

    for result in say_many(&chat, "modded", 30).await {
        result.unwrap();
    }
}

#[tokio::test]
async fn regular_users_are_rate_limited() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let mut config = mock.config(ronni());
    config.command_timeout = Duration::from_secs(1);
    let chat = Chat::new(config);
    chat.connect().await.unwrap();
    chat.join("dallas").await.unwrap();

    let results = say_many(&chat, "dallas", 30).await;
    let timed_out = results
        .iter()
        .filter(|r| matches!(r, Err(Error::CommandTimeout(_))))
        .count();
    assert!(timed_out >= 10, "{} timed out", timed_out);
}

#[tokio::test]
async fn verified_identities_are_not_throttled() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let mut config = mock.config(ronni());
    config.is_verified = true;
    let chat = Chat::new(config);
    chat.connect().await.unwrap();
    chat.join("dallas").await.unwrap();

    for result in say_many(&chat, "dallas", 30).await {
        result.unwrap();
    }
}

#[tokio::test]
async fn broadcast_says_in_every_channel() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();
    chat.join("dallas").await.unwrap();
    chat.join("fred").await.unwrap();

    chat.broadcast("hi all").await.unwrap();
    assert_eq!(1, mock.count("PRIVMSG #dallas :hi all"));
    assert_eq!(1, mock.count("PRIVMSG #fred :hi all"));
}

#[tokio::test]
async fn whisper() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();

    chat.whisper("Fred", "psst").await.unwrap();
    eventually("whisper", || mock.count("PRIVMSG #jtv :/w fred psst") == 1).await;
}

#[tokio::test]
async fn parse_errors_reach_subscribers() {
    let mock = Mock::start(|line, _| tmi(line)).await;
    let chat = Chat::new(mock.config(ronni()));
    chat.connect().await.unwrap();

    let mut errors = chat.subscribe(vec!["ERROR_ENCOUNTERED"]);
    mock.push(":x JOIN");
    let event = tokio::time::timeout(Duration::from_secs(2), errors.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event.payload, Payload::Error(Error::Parse(_))));
    assert_eq!(Status::Connected, chat.status());
}
