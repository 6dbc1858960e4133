//! Twitch-specific messages
//!
//! * [`parse`](./parse) - turning raw lines into typed [`Message`]s
//! * [`tags`](./tags) - typed tag schemas (badges, emotes, room/user state)
//! * [`events`](./events) - sub-classifications used in compound event names
//! * [`write`](./write) - formatting outbound lines
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::event::EventName;
pub use crate::irc::Command;

pub mod events;
pub mod parse;
pub mod tags;
pub mod write;

use events::*;
use tags::*;

/// Fields every decoded line carries
#[derive(Clone, Debug, PartialEq)]
pub struct Base {
    /// The line exactly as received
    pub raw: String,
    /// `tmi-sent-ts`, or the time of parsing when absent
    pub timestamp: DateTime<Utc>,
    pub command: Command,
    /// `#channel`, or empty when the line is not bound to a channel
    pub channel: String,
    /// Nick from the prefix, or empty
    pub username: String,
    /// Trailing parameter
    pub message: Option<String>,
    /// Every tag, unescaped
    pub tags: HashMap<String, String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mode {
    pub base: Base,
    pub event: ModeEvent,
    pub username: String,
    pub is_moderator: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Names {
    pub base: Base,
    pub usernames: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserState {
    pub base: Base,
    pub user: UserStateTags,
}

/// Legacy "X is now hosting you" notice delivered through jtv
#[derive(Clone, Debug, PartialEq)]
pub struct Hosted {
    pub display_name: String,
    pub viewers: Option<u64>,
    pub is_auto: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Privmsg {
    pub base: Base,
    pub event: Option<PrivmsgEvent>,
    pub user: UserStateTags,
    pub id: Option<String>,
    pub room_id: Option<String>,
    pub bits: Option<u64>,
    /// Sent with `/me`
    pub is_action: bool,
    pub hosted: Option<Hosted>,
}

impl Privmsg {
    pub fn text(&self) -> &str {
        self.base.message.as_deref().unwrap_or("")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClearChat {
    pub base: Base,
    pub event: Option<ClearChatEvent>,
    /// The banned or timed-out user; `None` when the whole chat was cleared
    pub target: Option<String>,
    pub tags: ClearChatTags,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClearMsg {
    pub base: Base,
    pub login: Option<String>,
    pub target_msg_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HostTarget {
    pub base: Base,
    pub event: HostTargetEvent,
    /// `None` when hosting stopped
    pub target: Option<String>,
    pub viewers: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoomStateMessage {
    pub base: Base,
    pub state: RoomState,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub base: Base,
    /// `None` for notices without a `msg-id`
    pub event: Option<NoticeEvent>,
    /// Names listed by `room_mods`/`vips_success`
    pub usernames: Vec<String>,
}

impl Notice {
    pub fn is_login_failure(&self) -> bool {
        self.event == Some(NoticeEvent::LoginAuthenticationFailed)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserNotice {
    pub base: Base,
    pub event: UserNoticeEvent,
    pub user: UserStateTags,
    pub login: Option<String>,
    pub id: Option<String>,
    pub room_id: Option<String>,
    pub system_message: String,
    pub parameters: UserNoticeParameters,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Welcome(Base),
    Ping(Base),
    Pong(Base),
    Reconnect(Base),
    Join(Base),
    Part(Base),
    Mode(Mode),
    Names(Names),
    NamesEnd(Base),
    GlobalUserState(UserState),
    UserState(UserState),
    Privmsg(Privmsg),
    ClearChat(ClearChat),
    ClearMsg(ClearMsg),
    HostTarget(HostTarget),
    RoomState(RoomStateMessage),
    Notice(Notice),
    UserNotice(UserNotice),
    /// Whispers, capability acks, MOTD numerics, ...
    Other(Base),
}

impl Message {
    /// Parses a single line. See [`parse::parse`].
    pub fn parse(line: &str) -> Result<Message, parse::Error> {
        parse::parse(line)
    }

    pub fn base(&self) -> &Base {
        match self {
            Message::Welcome(base)
            | Message::Ping(base)
            | Message::Pong(base)
            | Message::Reconnect(base)
            | Message::Join(base)
            | Message::Part(base)
            | Message::NamesEnd(base)
            | Message::Other(base) => base,
            Message::Mode(m) => &m.base,
            Message::Names(m) => &m.base,
            Message::GlobalUserState(m) | Message::UserState(m) => &m.base,
            Message::Privmsg(m) => &m.base,
            Message::ClearChat(m) => &m.base,
            Message::ClearMsg(m) => &m.base,
            Message::HostTarget(m) => &m.base,
            Message::RoomState(m) => &m.base,
            Message::Notice(m) => &m.base,
            Message::UserNotice(m) => &m.base,
        }
    }

    #[inline]
    pub fn channel(&self) -> &str {
        &self.base().channel
    }

    /// Compound event name, `<COMMAND>[/<SUB-EVENT>][/<#channel>]`
    pub fn event(&self) -> EventName {
        let sub = match self {
            Message::Mode(m) => Some(m.event.to_string()),
            Message::Privmsg(m) => m.event.map(|e| e.to_string()),
            Message::ClearChat(m) => m.event.map(|e| e.to_string()),
            Message::HostTarget(m) => Some(m.event.to_string()),
            Message::Notice(m) => m.event.as_ref().map(|e| e.to_string()),
            Message::UserNotice(m) => Some(m.event.to_string()),
            _ => None,
        };
        let base = self.base();
        EventName::new(base.command.as_str())
            .with_event(sub)
            .with_channel(&base.channel)
    }
}
