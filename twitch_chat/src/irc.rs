use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq)]
pub enum Error {
    #[error("Expected tag '{0}'")]
    MissingTag(String),
    #[error("Invalid tag '{0}'")]
    InvalidTag(String),
    #[error("Missing command")]
    MissingCommand,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Splits a raw payload into its non-empty lines.
///
/// The gateway batches several lines into one WebSocket frame, separated by
/// CRLF (sometimes only LF).
pub fn lines(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message<'a> {
    pub tags: Tags<'a>,
    pub prefix: Option<Prefix<'a>>,
    pub cmd: Command,
    pub params: Params<'a>,
    pub source: &'a str,
}

impl<'a> Message<'a> {
    /// Parse a raw IRC Message
    ///
    /// Parses some Twitch-specific things, such as
    /// nick-only prefixes being host-only
    pub fn parse(source: &'a str) -> Result<Message<'a>> {
        let (tags, remainder) = Tags::parse(source)?;
        let (prefix, remainder) = Prefix::parse(remainder);
        let (cmd, remainder) = Command::parse(remainder)?;
        let params = Params::parse(remainder);

        Ok(Message {
            tags,
            prefix,
            cmd,
            params,
            source,
        })
    }

    /// The channel this message targets, if any.
    ///
    /// `*` is sent before authentication completes and is reported as `""`.
    pub fn channel(&self) -> Option<&'a str> {
        self.params.middle.iter().find_map(|param| match *param {
            "*" => Some(""),
            p if p.starts_with('#') => Some(p),
            _ => None,
        })
    }

    /// The trailing (`:`-prefixed) parameter
    pub fn trailing(&self) -> Option<&'a str> {
        self.params.trailing
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Sent after a successful PASS/NICK
    Welcome,
    Ping,
    Pong,
    /// Server is about to restart, clients should reconnect
    Reconnect,
    /// Join channel
    Join,
    /// Leave channel
    Part,
    /// Moderator status changes
    Mode,
    /// List of chatters in a channel
    Names,
    /// End of the chatter list
    NamesEnd,
    /// Twitch Private Message
    Privmsg,
    // Twitch extensions
    /// Send message to a single user
    Whisper,
    /// Purge a user's messages
    ClearChat,
    /// Single message removal
    ClearMsg,
    /// Sent upon successful authentication (PASS/NICK command)
    GlobalUserState,
    /// Channel starts or stops host mode
    HostTarget,
    /// General notices from the server
    Notice,
    /// Identifies the channel's chat settings
    RoomState,
    /// Announces Twitch-specific events to the channel
    UserNotice,
    /// Identifies a user's chat settings or properties
    UserState,
    /// Requesting an IRC capability
    Capability,
    /// Anything else (MOTD numerics, etc.)
    Other(String),
}

impl Command {
    /// Parses a Twitch IRC command
    ///
    /// Returns (command, remainder)
    pub fn parse(data: &str) -> Result<(Command, &str)> {
        use Command::*;
        let data = data.trim_start();
        let end = match data.find(' ') {
            Some(v) => v,
            None => data.len(),
        };
        let cmd = match &data[..end] {
            "" => return Err(Error::MissingCommand),
            "001" => Welcome,
            "PING" => Ping,
            "PONG" => Pong,
            "RECONNECT" => Reconnect,
            "JOIN" => Join,
            "PART" => Part,
            "MODE" => Mode,
            "353" => Names,
            "366" => NamesEnd,
            "PRIVMSG" => Privmsg,
            "WHISPER" => Whisper,
            "CLEARCHAT" => ClearChat,
            "CLEARMSG" => ClearMsg,
            "GLOBALUSERSTATE" => GlobalUserState,
            "HOSTTARGET" => HostTarget,
            "NOTICE" => Notice,
            "ROOMSTATE" => RoomState,
            "USERNOTICE" => UserNotice,
            "USERSTATE" => UserState,
            "CAP" => Capability,
            other => Other(other.to_owned()),
        };

        Ok((cmd, &data[end..]))
    }

    pub fn as_str(&self) -> &str {
        use Command::*;
        match self {
            Welcome => "001",
            Ping => "PING",
            Pong => "PONG",
            Reconnect => "RECONNECT",
            Join => "JOIN",
            Part => "PART",
            Mode => "MODE",
            Names => "NAMES",
            NamesEnd => "NAMES_END",
            Privmsg => "PRIVMSG",
            Whisper => "WHISPER",
            ClearChat => "CLEARCHAT",
            ClearMsg => "CLEARMSG",
            GlobalUserState => "GLOBALUSERSTATE",
            HostTarget => "HOSTTARGET",
            Notice => "NOTICE",
            RoomState => "ROOMSTATE",
            UserNotice => "USERNOTICE",
            UserState => "USERSTATE",
            Capability => "CAP",
            Other(other) => other,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Default, PartialEq, Debug)]
pub struct Tags<'a>(HashMap<&'a str, &'a str>);

impl<'a> Deref for Tags<'a> {
    type Target = HashMap<&'a str, &'a str>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> Tags<'a> {
    /// Parses IRC tags in the form
    ///
    /// `@key0=[value0];key1=[value1];...;keyN-1=[valueN-1];keyN=[valueN] `
    ///
    /// `[value]`s are optional, empty ones are dropped
    ///
    /// Returns (tags, remainder)
    pub fn parse(data: &'a str) -> Result<(Tags<'a>, &'a str)> {
        let data = match data.strip_prefix('@') {
            Some(v) => v,
            None => return Ok((Tags::default(), data)),
        };
        let (block, remainder) = match data.find(' ') {
            Some(end) => (&data[..end], &data[end..]),
            None => (data, ""),
        };

        let mut map = HashMap::new();
        for pair in block.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key.is_empty() {
                return Err(Error::InvalidTag(pair.into()));
            }
            if !value.is_empty() {
                map.insert(key, value);
            }
        }

        Ok((Tags(map), remainder))
    }

    /// Iterates the tags to find one with key == `key`.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).copied()
    }

    /// Returns the value with IRCv3 escapes (`\s`, `\:`, `\\`, `\r`, `\n`) resolved.
    pub fn get_ns(&self, key: &str) -> Option<String> {
        self.get(key).map(unescape)
    }

    /// Parses a number
    pub fn get_number<N>(&self, key: &str) -> Option<N>
    where
        N: std::str::FromStr,
    {
        self.get(key).and_then(|v| v.parse::<N>().ok())
    }

    /// Parses a numeric bool: `"1"` is true, anything else (or nothing) is false
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key) == Some("1")
    }

    /// Parses a comma-separated list of values
    pub fn get_csv(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(v) => v.split(',').filter(|v| !v.is_empty()).map(String::from).collect(),
            None => Vec::new(),
        }
    }

    /// Parses a millisecond precision UNIX timestamp as a UTC date/time
    pub fn get_date(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get_number::<i64>(key)
            .and_then(|v| Utc.timestamp_millis_opt(v).single())
    }

    /// Like `.get()`, but returns an `Error` in case the key doesn't exist
    pub fn require(&self, key: &str) -> Result<&'a str> {
        self.get(key).ok_or_else(|| Error::MissingTag(key.into()))
    }

    /// Copies every tag into an owned map, with values unescaped.
    pub fn to_owned_map(&self) -> HashMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| ((*k).to_owned(), unescape(v)))
            .collect()
    }
}

/// Resolves IRCv3 tag value escapes.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            // a lone trailing backslash is dropped
            None => (),
        }
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prefix<'a> {
    pub nick: Option<&'a str>,
    pub user: Option<&'a str>,
    pub host: &'a str,
}

impl<'a> Prefix<'a> {
    /// Parses an IRC prefix in one of the following forms:
    ///
    /// * `:host`
    /// * `:nick@host`
    /// * `:nick!user@host`
    ///
    /// Returns (prefix, remainder). Lines such as `PING :tmi.twitch.tv` have no prefix.
    pub fn parse(data: &'a str) -> (Option<Prefix<'a>>, &'a str) {
        let data = data.trim_start();
        let prefix = match data.strip_prefix(':') {
            Some(v) => v,
            None => return (None, data),
        };
        let end = prefix.find(' ').unwrap_or_else(|| prefix.len());
        let (prefix, remainder) = prefix.split_at(end);

        // on twitch, nick-only is actually host-only (because they're not fully
        // compliant with RFC2812) so in case we don't find '@', we treat
        // the prefix as just the 'host' part
        let (nick, user, host) = match prefix.split_once('@') {
            Some((nick_and_user, host)) => match nick_and_user.split_once('!') {
                // case: 'nick!user@host'
                Some((nick, user)) => (Some(nick), Some(user), host),
                // case: 'nick@host'
                None => (Some(nick_and_user), None, host),
            },
            // case: 'host'
            None => (None, None, prefix),
        };

        (Some(Prefix { nick, user, host }), remainder)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params<'a> {
    pub middle: Vec<&'a str>,
    pub trailing: Option<&'a str>,
}

impl<'a> Params<'a> {
    /// Parse a params list
    ///
    /// Valid form: `param0 param1 ... [:trailing param with spaces]`
    pub fn parse(data: &'a str) -> Params<'a> {
        let data = data.trim_start();
        let (middle, trailing) = if let Some(trailing) = data.strip_prefix(':') {
            ("", Some(trailing))
        } else {
            match data.find(" :") {
                Some(idx) => (&data[..idx], Some(&data[idx + 2..])),
                None => (data, None),
            }
        };
        Params {
            middle: middle.split(' ').filter(|p| !p.is_empty()).collect(),
            trailing,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_prefix_host_only() {
        assert_eq!(
            Some(Prefix {
                nick: None,
                user: None,
                host: "test.tmi.twitch.tv"
            }),
            Prefix::parse(":test.tmi.twitch.tv").0
        );
    }

    #[test]
    fn parse_prefix_host_and_nick() {
        assert_eq!(
            Some(Prefix {
                nick: Some("test"),
                user: None,
                host: "test.tmi.twitch.tv"
            }),
            Prefix::parse(":test@test.tmi.twitch.tv").0
        );
    }

    #[test]
    fn parse_prefix_full() {
        assert_eq!(
            Some(Prefix {
                nick: Some("test"),
                user: Some("test"),
                host: "test.tmi.twitch.tv"
            }),
            Prefix::parse(":test!test@test.tmi.twitch.tv").0
        );
    }

    #[test]
    fn parse_missing_prefix() {
        assert_eq!((None, "PING :tmi.twitch.tv"), Prefix::parse("PING :tmi.twitch.tv"));
    }

    #[test]
    fn parse_command() {
        assert_eq!(Command::Privmsg, Command::parse("PRIVMSG").unwrap().0);
        assert_eq!(Command::Names, Command::parse("353 x").unwrap().0);
        assert_eq!(Command::Other("372".into()), Command::parse("372").unwrap().0);
        assert_eq!(Error::MissingCommand, Command::parse("  ").unwrap_err());
    }

    #[test]
    fn split_lines() {
        let payload = "PING :tmi.twitch.tv\r\n\r\n:tmi.twitch.tv RECONNECT\n";
        assert_eq!(
            vec!["PING :tmi.twitch.tv", ":tmi.twitch.tv RECONNECT"],
            lines(payload).collect::<Vec<_>>()
        );
    }

    #[test]
    fn parse_ping() {
        let src = "PING :tmi.twitch.tv";
        let msg = Message::parse(src).unwrap();
        assert_eq!(Command::Ping, msg.cmd);
        assert_eq!(None, msg.prefix);
        assert_eq!(Some("tmi.twitch.tv"), msg.trailing());
    }

    #[test]
    fn parse_join() {
        let src = ":test!test@test.tmi.twitch.tv JOIN #channel";

        assert_eq!(
            Message {
                tags: Tags(HashMap::new()),
                prefix: Some(Prefix {
                    nick: Some("test"),
                    user: Some("test"),
                    host: "test.tmi.twitch.tv"
                }),
                cmd: Command::Join,
                params: Params {
                    middle: vec!["#channel"],
                    trailing: None
                },
                source: src
            },
            Message::parse(src).unwrap()
        );
        assert_eq!(Some("#channel"), Message::parse(src).unwrap().channel());
    }

    #[test]
    fn parse_names_channel() {
        let src = ":ronni.tmi.twitch.tv 353 ronni = #dallas :ronni fred wilma";
        let msg = Message::parse(src).unwrap();
        assert_eq!(Some("#dallas"), msg.channel());
        assert_eq!(Some("ronni fred wilma"), msg.trailing());
    }

    #[test]
    fn parse_star_channel() {
        let msg = Message::parse(":tmi.twitch.tv NOTICE * :Login authentication failed").unwrap();
        assert_eq!(Some(""), msg.channel());
    }

    #[test]
    fn parse_full_privmsg() {
        let src = "\
            @badge-info=;\
            badges=;\
            color=#0000FF;\
            display-name=JuN1oRRRR;\
            emotes=;\
            flags=;\
            id=e9d998c3-36f1-430f-89ec-6b887c28af36;\
            mod=0;\
            room-id=11148817;\
            subscriber=0;\
            tmi-sent-ts=1594545155039;\
            turbo=0;\
            user-id=29803735;\
            user-type= \
            :jun1orrrr!jun1orrrr@jun1orrrr.tmi.twitch.tv PRIVMSG #pajlada :dank cam\
        ";
        assert_eq!(
            Message {
                tags: Tags(
                    vec![
                        ("color", "#0000FF"),
                        ("display-name", "JuN1oRRRR"),
                        ("id", "e9d998c3-36f1-430f-89ec-6b887c28af36"),
                        ("mod", "0"),
                        ("room-id", "11148817"),
                        ("subscriber", "0"),
                        ("tmi-sent-ts", "1594545155039"),
                        ("turbo", "0"),
                        ("user-id", "29803735"),
                    ]
                    .into_iter()
                    .collect()
                ),
                prefix: Some(Prefix {
                    nick: Some("jun1orrrr"),
                    user: Some("jun1orrrr"),
                    host: "jun1orrrr.tmi.twitch.tv"
                }),
                cmd: Command::Privmsg,
                params: Params {
                    middle: vec!["#pajlada"],
                    trailing: Some("dank cam")
                },
                source: src
            },
            Message::parse(src).unwrap()
        );
    }

    #[test]
    fn parse_msg_with_extra_semicolons() {
        let src = "\
        @login=supibot;room-id=;target-msg-id=25fd76d9-4731-4907-978e-a391134ebd67;\
        tmi-sent-ts=-6795364578871 :tmi.twitch.tv CLEARMSG #randers :Pong! Uptime: 6h,\
        15m; Temperature: 54.8°C; Latency to TMI: 183ms; Commands used: 795\
        ";
        let msg = Message::parse(src).unwrap();
        assert_eq!(
            Tags(
                vec![
                    ("login", "supibot"),
                    ("target-msg-id", "25fd76d9-4731-4907-978e-a391134ebd67"),
                    ("tmi-sent-ts", "-6795364578871")
                ]
                .into_iter()
                .collect(),
            ),
            msg.tags
        );
        assert_eq!(Command::ClearMsg, msg.cmd);
        assert_eq!(
            Some("Pong! Uptime: 6h,15m; Temperature: 54.8°C; Latency to TMI: 183ms; Commands used: 795"),
            msg.trailing()
        );
    }

    #[test]
    fn tag_coercions() {
        let (tags, _) =
            Tags::parse("@mod=1;turbo=0;subscriber=true;emote-sets=0,33,50;bits=100 :x").unwrap();
        assert!(tags.get_bool("mod"));
        assert!(!tags.get_bool("turbo"));
        assert!(!tags.get_bool("subscriber"));
        assert!(!tags.get_bool("missing"));
        assert_eq!(vec!["0", "33", "50"], tags.get_csv("emote-sets"));
        assert_eq!(Some(100u64), tags.get_number("bits"));
        assert_eq!(None, tags.get_number::<u64>("mod-x"));
    }

    #[test]
    fn tag_unescape() {
        assert_eq!("a b;c\\d", unescape("a\\sb\\:c\\\\d"));
        assert_eq!("line\r\nend", unescape("line\\r\\nend"));
    }
}
