//! Outbound line formatting. Every line is CRLF-terminated.
//!
//! Channel arguments are expected in normalized form, see [`channel`].

/// Normalizes a channel name: lower-cased, with a leading `#`
pub fn channel(name: &str) -> String {
    let name = name.trim().trim_start_matches('#').to_lowercase();
    format!("#{}", name)
}

/// Line breaks in user text would split it into several commands
fn single_line(text: &str) -> String {
    text.replace(|c: char| c == '\r' || c == '\n', " ")
}

pub fn join(channel: &str) -> String {
    format!("JOIN {}\r\n", channel)
}

pub fn part(channel: &str) -> String {
    format!("PART {}\r\n", channel)
}

pub fn privmsg(channel: &str, message: &str) -> String {
    format!("PRIVMSG {} :{}\r\n", channel, single_line(message))
}

/// Whispers are sent as a `/w` command through the `#jtv` pseudo-channel
pub fn whisper(user: &str, message: &str) -> String {
    privmsg("#jtv", &format!("/w {} {}", user.to_lowercase(), message))
}

pub fn cap() -> String {
    "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership\r\n".into()
}

/// Accepts the token with or without its `oauth:` prefix
pub fn pass(token: &str) -> String {
    format!("PASS oauth:{}\r\n", token.trim_start_matches("oauth:"))
}

pub fn nick(login: &str) -> String {
    format!("NICK {}\r\n", login.to_lowercase())
}

pub fn ping() -> String {
    "PING :tmi.twitch.tv\r\n".into()
}

pub fn pong() -> String {
    "PONG :tmi.twitch.tv\r\n".into()
}
