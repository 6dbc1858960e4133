//! Mapping of raw IRC lines onto typed [`Message`]s
//!
//! Parsing is pure: no I/O, no state. A payload may carry several lines; each
//! is parsed independently so one malformed line never hides its siblings.
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use super::events::*;
use super::tags::*;
use super::*;
use crate::irc;

#[derive(Error, Clone, Debug, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Irc(#[from] irc::Error),
    #[error("Expected a channel in '{0}'")]
    MissingChannel(String),
    #[error("Expected more parameters in '{0}'")]
    MissingParam(String),
}

pub type Result<T> = std::result::Result<T, Error>;

lazy_static! {
    static ref HOSTED: Regex = Regex::new(
        r":jtv!jtv@jtv\.tmi\.twitch\.tv PRIVMSG #\w+ :(\w+) is now (auto )?hosting you(?: for(?: up to)? (\d+) viewers?)?"
    )
    .unwrap();
    static ref HOST_TARGET: Regex = Regex::new(r"HOSTTARGET #(\w+) :(\w+|-)(?: (\d+))?").unwrap();
}

/// Parses every non-empty line of `payload`, in order.
pub fn parse_payload(payload: &str) -> Vec<Result<Message>> {
    irc::lines(payload).map(parse).collect()
}

/// Parses a single line into a typed message.
pub fn parse(line: &str) -> Result<Message> {
    let msg = irc::Message::parse(line)?;
    let base = base(&msg);

    Ok(match msg.cmd {
        Command::Welcome => Message::Welcome(base),
        Command::Ping => Message::Ping(base),
        Command::Pong => Message::Pong(base),
        Command::Reconnect => Message::Reconnect(base),
        Command::Join => Message::Join(with_channel(base)?),
        Command::Part => Message::Part(with_channel(base)?),
        Command::Mode => mode(&msg, with_channel(base)?)?,
        Command::Names => Message::Names(Names {
            usernames: msg
                .trailing()
                .unwrap_or("")
                .split_whitespace()
                .map(String::from)
                .collect(),
            base: with_channel(base)?,
        }),
        Command::NamesEnd => Message::NamesEnd(base),
        Command::GlobalUserState => Message::GlobalUserState(UserState {
            user: UserStateTags::parse(&msg.tags),
            base,
        }),
        Command::UserState => Message::UserState(UserState {
            user: UserStateTags::parse(&msg.tags),
            base: with_channel(base)?,
        }),
        Command::Privmsg => privmsg(&msg, with_channel(base)?),
        Command::ClearChat => {
            let target = msg.trailing().filter(|t| !t.is_empty()).map(String::from);
            Message::ClearChat(ClearChat {
                event: target.as_ref().map(|_| ClearChatEvent::UserBanned),
                target,
                tags: ClearChatTags::parse(&msg.tags),
                base: with_channel(base)?,
            })
        }
        Command::ClearMsg => Message::ClearMsg(ClearMsg {
            login: msg.tags.get("login").map(String::from),
            target_msg_id: msg.tags.get("target-msg-id").map(String::from),
            base: with_channel(base)?,
        }),
        Command::HostTarget => host_target(with_channel(base)?)?,
        Command::RoomState => Message::RoomState(RoomStateMessage {
            state: RoomState::parse(&msg.tags),
            base: with_channel(base)?,
        }),
        Command::Notice => notice(&msg, base),
        Command::UserNotice => user_notice(&msg, with_channel(base)?)?,
        _ => Message::Other(base),
    })
}

fn base(msg: &irc::Message) -> Base {
    Base {
        raw: msg.source.to_owned(),
        timestamp: msg.tags.get_date("tmi-sent-ts").unwrap_or_else(Utc::now),
        command: msg.cmd.clone(),
        channel: msg.channel().unwrap_or("").to_owned(),
        username: msg.prefix.and_then(|p| p.nick).unwrap_or("").to_owned(),
        message: msg.trailing().map(String::from),
        tags: msg.tags.to_owned_map(),
    }
}

fn with_channel(base: Base) -> Result<Base> {
    if base.channel.is_empty() {
        Err(Error::MissingChannel(base.raw))
    } else {
        Ok(base)
    }
}

/// `:jtv MODE #channel +o user`
fn mode(msg: &irc::Message, base: Base) -> Result<Message> {
    let (flag, username) = match (msg.params.middle.get(1), msg.params.middle.get(2)) {
        (Some(flag), Some(username)) => (*flag, *username),
        _ => return Err(Error::MissingParam(base.raw)),
    };
    let event = match flag {
        "+o" => ModeEvent::ModGained,
        "-o" => ModeEvent::ModLost,
        _ => return Ok(Message::Other(base)),
    };

    Ok(Message::Mode(Mode {
        event,
        username: username.to_owned(),
        is_moderator: event == ModeEvent::ModGained,
        base,
    }))
}

fn privmsg(msg: &irc::Message, mut base: Base) -> Message {
    let user = UserStateTags::parse_with(&msg.tags, &["bits", "id", "room-id", "tmi-sent-ts"]);
    let bits = msg.tags.get_number::<u64>("bits").filter(|bits| *bits > 0);

    let text = base.message.clone().unwrap_or_default();
    let action = text
        .strip_prefix("\u{1}ACTION ")
        .map(|t| t.strip_suffix('\u{1}').unwrap_or(t).to_owned());
    let is_action = action.is_some();
    if action.is_some() {
        base.message = action;
    }

    let hosted = HOSTED.captures(&base.raw).map(|caps| Hosted {
        display_name: caps[1].to_owned(),
        viewers: caps.get(3).and_then(|v| v.as_str().parse().ok()),
        is_auto: caps.get(2).is_some(),
    });

    let event = match (&hosted, bits) {
        (Some(hosted), _) if hosted.is_auto => Some(PrivmsgEvent::HostedAuto),
        (Some(hosted), _) if hosted.viewers.is_some() => Some(PrivmsgEvent::HostedWithViewers),
        (Some(_), _) => Some(PrivmsgEvent::HostedWithoutViewers),
        (None, Some(_)) => Some(PrivmsgEvent::Cheer),
        (None, None) => None,
    };

    Message::Privmsg(Privmsg {
        event,
        user,
        id: msg.tags.get("id").map(String::from),
        room_id: msg.tags.get("room-id").map(String::from),
        bits,
        is_action,
        hosted,
        base,
    })
}

/// `:tmi.twitch.tv HOSTTARGET #hosting :<target|-> [viewers]`
fn host_target(base: Base) -> Result<Message> {
    let (target, viewers) = match HOST_TARGET.captures(&base.raw) {
        Some(caps) => (
            Some(caps[2].to_owned()).filter(|t| t != "-"),
            caps.get(3).and_then(|v| v.as_str().parse().ok()),
        ),
        None => return Err(Error::MissingParam(base.raw)),
    };

    Ok(Message::HostTarget(HostTarget {
        event: if target.is_some() {
            HostTargetEvent::HostOn
        } else {
            HostTargetEvent::HostOff
        },
        target,
        viewers,
        base,
    }))
}

fn notice(msg: &irc::Message, base: Base) -> Message {
    let body = msg.trailing().unwrap_or("");
    let event = match msg.tags.get("msg-id") {
        Some(id) => Some(NoticeEvent::from_id(id)),
        // sent untagged, before capabilities are acknowledged
        None if body.starts_with("Login authentication failed")
            || body.starts_with("Improperly formatted auth") =>
        {
            Some(NoticeEvent::LoginAuthenticationFailed)
        }
        None => None,
    };
    let usernames = match event {
        // "The moderators of this channel are: a, b, c"
        // "The VIPs of this channel are: a, b, c."
        Some(NoticeEvent::RoomMods) | Some(NoticeEvent::VipsSuccess) => body
            .split_once(": ")
            .map(|(_, names)| {
                names
                    .trim_end_matches('.')
                    .split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    Message::Notice(Notice {
        base,
        event,
        usernames,
    })
}

fn user_notice(msg: &irc::Message, base: Base) -> Result<Message> {
    let event = UserNoticeEvent::from_id(msg.tags.require("msg-id")?);
    let mut user = UserStateTags::parse_with(
        &msg.tags,
        &["id", "login", "msg-id", "room-id", "system-msg", "tmi-sent-ts"],
    );
    user.extra.retain(|tag, _| !UserNoticeParameters::owns(tag));

    Ok(Message::UserNotice(UserNotice {
        event,
        user,
        login: msg.tags.get("login").map(String::from),
        id: msg.tags.get("id").map(String::from),
        room_id: msg.tags.get("room-id").map(String::from),
        system_message: msg.tags.get_ns("system-msg").unwrap_or_default(),
        parameters: UserNoticeParameters::parse(&msg.tags),
        base,
    }))
}
