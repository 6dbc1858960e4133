//! Slash commands sent through PRIVMSG and the events that confirm them.
//!
//! Each command waits for the first of its success or failure events on the
//! target channel. A success is either a NOTICE `msg-id` or, written in upper
//! case, a bare command such as `CLEARCHAT`. Commands without any success
//! event resolve as soon as they are sent.
use std::collections::HashSet;

use super::Chat;
use crate::{
    conn::SendOptions,
    event::Event,
    tmi::{events::NoticeEvent, write, Message},
    Error, Result,
};

pub(crate) struct SlashCommand {
    pub name: &'static str,
    pub success: &'static [&'static str],
    pub failure: &'static [&'static str],
}

/// Rejections of a plain chat message
pub(crate) const SAY_FAILURES: &[&str] = &[
    "msg_banned",
    "msg_channel_suspended",
    "msg_duplicate",
    "msg_emoteonly",
    "msg_followersonly",
    "msg_r9k",
    "msg_ratelimit",
    "msg_slowmode",
    "msg_subsonly",
    "msg_timedout",
];

macro_rules! commands {
    ($($konst:ident = $name:literal, [$($ok:literal),*], [$($err:literal),*];)*) => {
        $(
            const $konst: SlashCommand = SlashCommand {
                name: $name,
                success: &[$($ok),*],
                failure: &[$($err),*],
            };
        )*
    };
}

commands! {
    BAN = "ban", ["ban_success"], [
        "already_banned", "bad_ban_admin", "bad_ban_anon", "bad_ban_broadcaster",
        "bad_ban_global_mod", "bad_ban_mod", "bad_ban_self", "bad_ban_staff", "usage_ban"
    ];
    UNBAN = "unban", ["unban_success"], ["bad_unban_no_ban", "usage_unban"];
    CLEAR = "clear", ["CLEARCHAT"], [];
    COLOR = "color", ["color_changed"], ["turbo_only_color", "usage_color"];
    COMMERCIAL = "commercial", [], ["bad_commercial_error", "usage_commercial"];
    DELETE = "delete", ["delete_message_success"], [
        "bad_delete_message_broadcaster", "bad_delete_message_error",
        "bad_delete_message_mod", "usage_delete"
    ];
    EMOTE_ONLY = "emoteonly", ["emote_only_on"], ["already_emote_only_on", "usage_emote_only_on"];
    EMOTE_ONLY_OFF = "emoteonlyoff", ["emote_only_off"], [
        "already_emote_only_off", "usage_emote_only_off"
    ];
    FOLLOWERS_ONLY = "followers", ["followers_on", "followers_on_zero"], [
        "already_followers_on", "usage_followers_on"
    ];
    FOLLOWERS_ONLY_OFF = "followersoff", ["followers_off"], [
        "already_followers_off", "usage_followers_off"
    ];
    HELP = "help", ["cmds_available"], ["usage_help"];
    HOST = "host", ["host_on"], [
        "bad_host_hosting", "bad_host_rate_exceeded", "bad_host_error", "usage_host"
    ];
    UNHOST = "unhost", ["host_off"], ["not_hosting", "usage_unhost"];
    MARKER = "marker", [], ["usage_marker"];
    ME = "me", ["USERSTATE"], [];
    MOD = "mod", ["mod_success"], ["bad_mod_banned", "bad_mod_mod", "usage_mod"];
    UNMOD = "unmod", ["unmod_success"], ["bad_unmod_mod", "usage_unmod"];
    MODS = "mods", ["room_mods", "no_mods"], ["usage_mods"];
    R9K_BETA = "r9kbeta", ["r9k_on"], ["already_r9k_on", "usage_r9k_on"];
    R9K_BETA_OFF = "r9kbetaoff", ["r9k_off"], ["already_r9k_off", "usage_r9k_off"];
    RAID = "raid", [], ["raid_error_already_raiding", "raid_error_self", "usage_raid"];
    UNRAID = "unraid", ["unraid_success"], ["unraid_error_no_active_raid", "usage_unraid"];
    SLOW = "slow", ["slow_on"], ["usage_slow_on"];
    SLOW_OFF = "slowoff", ["slow_off"], ["usage_slow_off"];
    SUBSCRIBERS = "subscribers", ["subs_on"], ["already_subs_on", "usage_subs_on"];
    SUBSCRIBERS_OFF = "subscribersoff", ["subs_off"], ["already_subs_off", "usage_subs_off"];
    TIMEOUT = "timeout", ["timeout_success"], [
        "bad_timeout_admin", "bad_timeout_anon", "bad_timeout_broadcaster",
        "bad_timeout_duration", "bad_timeout_global_mod", "bad_timeout_mod",
        "bad_timeout_self", "bad_timeout_staff", "usage_timeout"
    ];
    UNTIMEOUT = "untimeout", ["untimeout_success"], ["untimeout_banned", "usage_untimeout"];
    VIP = "vip", ["vip_success"], [
        "bad_vip_grantee_already_vip", "bad_vip_grantee_banned",
        "bad_vip_max_vips_reached", "usage_vip"
    ];
    UNVIP = "unvip", ["unvip_success"], ["bad_unvip_grantee_not_vip", "usage_unvip"];
    VIPS = "vips", ["vips_success", "no_vips"], ["usage_vips"];
}

/// Every command may be refused for lack of permission
const ALWAYS_FAILS_WITH: &[&str] = &["no_permission"];

fn topic(id: &str, channel: &str) -> String {
    if id.chars().all(|c| c.is_ascii_uppercase()) {
        format!("{}/{}", id, channel)
    } else {
        format!("NOTICE/{}/{}", NoticeEvent::from_id(id), channel)
    }
}

pub(crate) fn notice_topics<'a>(
    ids: &'a [&'a str],
    channel: &'a str,
) -> impl Iterator<Item = String> + 'a {
    ids.iter().map(move |id| topic(id, channel))
}

fn line(slash: &SlashCommand, args: &[&str]) -> String {
    std::iter::once(format!("/{}", slash.name))
        .chain(args.iter().filter(|a| !a.is_empty()).map(|a| a.to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Chat {
    /// Sends `/<command> <args>` to `channel` and waits for its confirmation
    pub(crate) async fn command(
        &self,
        channel: &str,
        slash: &SlashCommand,
        args: &[&str],
    ) -> Result<Option<Event>> {
        self.require_authentication()?;
        let channel = write::channel(channel);
        let client = self.client()?;
        let command = line(slash, args);
        let options = SendOptions {
            is_moderator: self.is_moderator(&channel),
            ..SendOptions::default()
        };

        if slash.success.is_empty() {
            client.send(write::privmsg(&channel, &command), options).await?;
            return Ok(None);
        }

        let failures = notice_topics(slash.failure, &channel)
            .chain(notice_topics(ALWAYS_FAILS_WITH, &channel))
            .collect::<HashSet<_>>();
        let confirmed = self.inner.bus.waiter(
            notice_topics(slash.success, &channel)
                .chain(failures.iter().cloned())
                .collect::<Vec<_>>(),
        );
        let command_timeout = self.inner.config.lock().command_timeout;

        let event = tokio::time::timeout(command_timeout, async {
            client.send(write::privmsg(&channel, &command), options).await?;
            confirmed.await
        })
        .await
        .map_err(|_| Error::CommandTimeout(command.clone()))??;

        let name = event.name.to_string();
        if failures.contains(&name) {
            log::warn!("'{}' was rejected with {}", command, name);
            Err(Error::Rejected { command, event: name })
        } else {
            Ok(Some(event))
        }
    }

    async fn run(&self, channel: &str, slash: &SlashCommand, args: &[&str]) -> Result<()> {
        self.command(channel, slash, args).await.map(|_| ())
    }

    /// Names listed by a `room_mods`/`vips_success` NOTICE
    async fn list(&self, channel: &str, slash: &SlashCommand) -> Result<Vec<String>> {
        let event = self.command(channel, slash, &[]).await?;
        Ok(match event.as_ref().and_then(Event::as_message) {
            Some(Message::Notice(notice)) => notice.usernames.clone(),
            _ => Vec::new(),
        })
    }

    pub async fn ban(&self, channel: &str, user: &str, reason: Option<&str>) -> Result<()> {
        self.run(channel, &BAN, &[user, reason.unwrap_or("")]).await
    }

    pub async fn unban(&self, channel: &str, user: &str) -> Result<()> {
        self.run(channel, &UNBAN, &[user]).await
    }

    /// Resolves once the gateway reports the chat as cleared
    pub async fn clear(&self, channel: &str) -> Result<()> {
        self.run(channel, &CLEAR, &[]).await
    }

    /// Changes the username color, e.g. `blue` or `#1E90FF`
    pub async fn color(&self, channel: &str, color: &str) -> Result<()> {
        self.run(channel, &COLOR, &[color]).await
    }

    /// Resolves once sent; the gateway does not confirm commercials
    pub async fn commercial(&self, channel: &str, seconds: Option<u32>) -> Result<()> {
        let seconds = seconds.map(|s| s.to_string()).unwrap_or_default();
        self.run(channel, &COMMERCIAL, &[&seconds]).await
    }

    pub async fn delete(&self, channel: &str, message_id: &str) -> Result<()> {
        self.run(channel, &DELETE, &[message_id]).await
    }

    pub async fn emote_only(&self, channel: &str) -> Result<()> {
        self.run(channel, &EMOTE_ONLY, &[]).await
    }

    pub async fn emote_only_off(&self, channel: &str) -> Result<()> {
        self.run(channel, &EMOTE_ONLY_OFF, &[]).await
    }

    /// `duration` is the minimum follow age, e.g. `30m` or `1 week`
    pub async fn followers_only(&self, channel: &str, duration: Option<&str>) -> Result<()> {
        self.run(channel, &FOLLOWERS_ONLY, &[duration.unwrap_or("")]).await
    }

    pub async fn followers_only_off(&self, channel: &str) -> Result<()> {
        self.run(channel, &FOLLOWERS_ONLY_OFF, &[]).await
    }

    pub async fn help(&self, channel: &str) -> Result<()> {
        self.run(channel, &HELP, &[]).await
    }

    pub async fn host(&self, channel: &str, target: &str) -> Result<()> {
        let target = target.trim_start_matches('#');
        self.run(channel, &HOST, &[target]).await
    }

    pub async fn unhost(&self, channel: &str) -> Result<()> {
        self.run(channel, &UNHOST, &[]).await
    }

    /// Resolves once sent; the gateway does not confirm markers
    pub async fn marker(&self, channel: &str, description: Option<&str>) -> Result<()> {
        self.run(channel, &MARKER, &[description.unwrap_or("")]).await
    }

    /// Sends an action message (`/me`)
    pub async fn me(&self, channel: &str, text: &str) -> Result<()> {
        self.run(channel, &ME, &[text]).await
    }

    pub async fn mod_user(&self, channel: &str, user: &str) -> Result<()> {
        self.run(channel, &MOD, &[user]).await
    }

    pub async fn unmod_user(&self, channel: &str, user: &str) -> Result<()> {
        self.run(channel, &UNMOD, &[user]).await
    }

    /// Moderators of `channel`
    pub async fn mods(&self, channel: &str) -> Result<Vec<String>> {
        self.list(channel, &MODS).await
    }

    pub async fn r9k_beta(&self, channel: &str) -> Result<()> {
        self.run(channel, &R9K_BETA, &[]).await
    }

    pub async fn r9k_beta_off(&self, channel: &str) -> Result<()> {
        self.run(channel, &R9K_BETA_OFF, &[]).await
    }

    /// Resolves once sent; a successful raid is only announced to the target
    pub async fn raid(&self, channel: &str, target: &str) -> Result<()> {
        let target = target.trim_start_matches('#');
        self.run(channel, &RAID, &[target]).await
    }

    pub async fn unraid(&self, channel: &str) -> Result<()> {
        self.run(channel, &UNRAID, &[]).await
    }

    pub async fn slow(&self, channel: &str, seconds: Option<u32>) -> Result<()> {
        let seconds = seconds.map(|s| s.to_string()).unwrap_or_default();
        self.run(channel, &SLOW, &[&seconds]).await
    }

    pub async fn slow_off(&self, channel: &str) -> Result<()> {
        self.run(channel, &SLOW_OFF, &[]).await
    }

    pub async fn subscribers(&self, channel: &str) -> Result<()> {
        self.run(channel, &SUBSCRIBERS, &[]).await
    }

    pub async fn subscribers_off(&self, channel: &str) -> Result<()> {
        self.run(channel, &SUBSCRIBERS_OFF, &[]).await
    }

    pub async fn timeout(
        &self,
        channel: &str,
        user: &str,
        seconds: Option<u64>,
        reason: Option<&str>,
    ) -> Result<()> {
        let seconds = seconds.map(|s| s.to_string()).unwrap_or_default();
        self.run(channel, &TIMEOUT, &[user, &seconds, reason.unwrap_or("")]).await
    }

    pub async fn untimeout(&self, channel: &str, user: &str) -> Result<()> {
        self.run(channel, &UNTIMEOUT, &[user]).await
    }

    pub async fn vip(&self, channel: &str, user: &str) -> Result<()> {
        self.run(channel, &VIP, &[user]).await
    }

    pub async fn unvip(&self, channel: &str, user: &str) -> Result<()> {
        self.run(channel, &UNVIP, &[user]).await
    }

    /// VIPs of `channel`
    pub async fn vips(&self, channel: &str) -> Result<Vec<String>> {
        self.list(channel, &VIPS).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn command_lines() {
        assert_eq!("/ban ronni", line(&BAN, &["ronni", ""]));
        assert_eq!("/ban ronni spam", line(&BAN, &["ronni", "spam"]));
        assert_eq!("/timeout ronni 600 calm down", line(&TIMEOUT, &["ronni", "600", "calm down"]));
        assert_eq!("/clear", line(&CLEAR, &[]));
    }

    #[test]
    fn confirmation_topics() {
        assert_eq!("NOTICE/BAN_SUCCESS/#dallas", topic("ban_success", "#dallas"));
        assert_eq!("CLEARCHAT/#dallas", topic("CLEARCHAT", "#dallas"));
        assert_eq!("USERSTATE/#dallas", topic("USERSTATE", "#dallas"));
        assert_eq!(
            vec!["NOTICE/ROOM_MODS/#dallas", "NOTICE/NO_MODS/#dallas"],
            notice_topics(MODS.success, "#dallas").collect::<Vec<_>>()
        );
    }

    #[test]
    fn fire_and_forget_commands() {
        for slash in [&COMMERCIAL, &MARKER, &RAID].iter() {
            assert!(slash.success.is_empty(), "{}", slash.name);
        }
    }
}
