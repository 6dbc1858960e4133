//! Typed tag schemas
//!
//! Every schema picks the tags it knows about out of the raw [`irc::Tags`]
//! and keeps the rest in an `extra` map, so new tags added by the gateway are
//! never lost.
use std::collections::HashMap;

use crate::irc;

/// Badges whose value is a plain on/off flag. Everything else is a count
/// (subscriber months, bits tier, ...).
const BOOLEAN_BADGES: &[&str] = &[
    "admin",
    "broadcaster",
    "global_mod",
    "moderator",
    "partner",
    "premium",
    "staff",
    "turbo",
    "vip",
];

#[derive(Clone, Debug, PartialEq)]
pub enum BadgeValue {
    Flag(bool),
    Number(u64),
    Text(String),
}

/// Parses `moderator/1,subscriber/12` into `{moderator: Flag(true), subscriber: Number(12)}`
pub fn parse_badges(value: &str) -> HashMap<String, BadgeValue> {
    value
        .split(',')
        .filter_map(|badge| badge.split_once('/'))
        .map(|(name, version)| {
            let value = if BOOLEAN_BADGES.contains(&name) {
                BadgeValue::Flag(version == "1")
            } else {
                match version.parse::<u64>() {
                    Ok(n) => BadgeValue::Number(n),
                    Err(_) => BadgeValue::Text(irc::unescape(version)),
                }
            };
            (name.to_owned(), value)
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct Emote {
    pub id: String,
    pub start: usize,
    pub end: usize,
}

/// Parses `25:0-4,6-10/1902:12-16` into one [`Emote`] per occurrence
pub fn parse_emotes(value: &str) -> Vec<Emote> {
    let mut emotes = Vec::new();
    for emote in value.split('/') {
        let (id, ranges) = match emote.split_once(':') {
            Some(v) => v,
            None => continue,
        };
        for range in ranges.split(',') {
            if let Some((start, end)) = range.split_once('-') {
                if let (Ok(start), Ok(end)) = (start.parse(), end.parse()) {
                    emotes.push(Emote {
                        id: id.to_owned(),
                        start,
                        end,
                    });
                }
            }
        }
    }
    emotes
}

/// Collects every tag not listed in `known`
fn extra(tags: &irc::Tags, known: &[&str]) -> HashMap<String, String> {
    tags.iter()
        .filter(|(key, _)| !known.contains(*key))
        .map(|(key, value)| ((*key).to_owned(), irc::unescape(value)))
        .collect()
}

const USER_STATE_TAGS: &[&str] = &[
    "badge-info",
    "badges",
    "color",
    "display-name",
    "emotes",
    "emote-sets",
    "mod",
    "subscriber",
    "turbo",
    "user-id",
    "user-type",
];

/// Tags shared by GLOBALUSERSTATE, USERSTATE, PRIVMSG and USERNOTICE
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserStateTags {
    pub badge_info: HashMap<String, BadgeValue>,
    pub badges: HashMap<String, BadgeValue>,
    pub color: Option<String>,
    pub display_name: Option<String>,
    pub emotes: Vec<Emote>,
    pub emote_sets: Vec<String>,
    pub is_moderator: bool,
    pub is_subscriber: bool,
    pub is_turbo: bool,
    pub user_id: Option<String>,
    pub user_type: Option<String>,
    pub extra: HashMap<String, String>,
}

impl UserStateTags {
    pub fn parse(tags: &irc::Tags) -> UserStateTags {
        UserStateTags::parse_with(tags, &[])
    }

    /// Like `parse`, but also leaves the tags in `known` out of `extra`.
    pub fn parse_with(tags: &irc::Tags, known: &[&str]) -> UserStateTags {
        let mut all_known = USER_STATE_TAGS.to_vec();
        all_known.extend_from_slice(known);
        UserStateTags {
            badge_info: tags.get("badge-info").map(parse_badges).unwrap_or_default(),
            badges: tags.get("badges").map(parse_badges).unwrap_or_default(),
            color: tags.get("color").map(String::from),
            display_name: tags.get_ns("display-name"),
            emotes: tags.get("emotes").map(parse_emotes).unwrap_or_default(),
            emote_sets: tags.get_csv("emote-sets"),
            is_moderator: tags.get_bool("mod"),
            is_subscriber: tags.get_bool("subscriber"),
            is_turbo: tags.get_bool("turbo"),
            user_id: tags.get("user-id").map(String::from),
            user_type: tags.get("user-type").map(String::from),
            extra: extra(tags, &all_known),
        }
    }

    /// Whether this user may run moderation commands in the channel
    pub fn is_privileged(&self) -> bool {
        self.is_moderator || self.badges.get("broadcaster") == Some(&BadgeValue::Flag(true))
    }
}

/// `followers-only` is `-1` when off, `0` when any follower may chat, or the
/// minimum follow age in minutes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FollowersOnly {
    Off,
    On,
    Minutes(u64),
}

/// Chat settings of a room.
///
/// The ROOMSTATE sent on join carries every field; later ROOMSTATEs only carry
/// the setting that changed, which is why each field is optional.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoomState {
    pub broadcaster_lang: Option<String>,
    pub emote_only: Option<bool>,
    pub followers_only: Option<FollowersOnly>,
    pub r9k: Option<bool>,
    pub room_id: Option<String>,
    /// Seconds between messages, `0` when off
    pub slow: Option<u64>,
    pub subs_only: Option<bool>,
    pub extra: HashMap<String, String>,
}

impl RoomState {
    pub fn parse(tags: &irc::Tags) -> RoomState {
        let flag = |key| tags.get(key).map(|v| v == "1");
        RoomState {
            broadcaster_lang: tags.get("broadcaster-lang").map(String::from),
            emote_only: flag("emote-only"),
            followers_only: tags.get_number::<i64>("followers-only").map(|v| match v {
                v if v < 0 => FollowersOnly::Off,
                0 => FollowersOnly::On,
                v => FollowersOnly::Minutes(v as u64),
            }),
            r9k: flag("r9k"),
            room_id: tags.get("room-id").map(String::from),
            slow: tags.get_number("slow"),
            subs_only: flag("subs-only"),
            extra: extra(
                tags,
                &[
                    "broadcaster-lang",
                    "emote-only",
                    "followers-only",
                    "r9k",
                    "room-id",
                    "slow",
                    "subs-only",
                ],
            ),
        }
    }

    /// Applies the fields present in `update`
    pub fn merge(&mut self, update: &RoomState) {
        fn take<T: Clone>(current: &mut Option<T>, update: &Option<T>) {
            if update.is_some() {
                *current = update.clone();
            }
        }
        take(&mut self.broadcaster_lang, &update.broadcaster_lang);
        take(&mut self.emote_only, &update.emote_only);
        take(&mut self.followers_only, &update.followers_only);
        take(&mut self.r9k, &update.r9k);
        take(&mut self.room_id, &update.room_id);
        take(&mut self.slow, &update.slow);
        take(&mut self.subs_only, &update.subs_only);
        self.extra
            .extend(update.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClearChatTags {
    /// Seconds, absent for a permanent ban
    pub ban_duration: Option<u64>,
    pub ban_reason: Option<String>,
    pub room_id: Option<String>,
    pub target_user_id: Option<String>,
    pub extra: HashMap<String, String>,
}

impl ClearChatTags {
    pub fn parse(tags: &irc::Tags) -> ClearChatTags {
        ClearChatTags {
            ban_duration: tags.get_number("ban-duration"),
            ban_reason: tags.get_ns("ban-reason"),
            room_id: tags.get("room-id").map(String::from),
            target_user_id: tags.get("target-user-id").map(String::from),
            extra: extra(
                tags,
                &["ban-duration", "ban-reason", "room-id", "target-user-id", "tmi-sent-ts"],
            ),
        }
    }
}

/// The `msg-param-*` tags of a USERNOTICE
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserNoticeParameters {
    pub cumulative_months: Option<u64>,
    pub months: Option<u64>,
    pub should_share_streak: bool,
    pub streak_months: Option<u64>,
    pub sub_plan: Option<String>,
    pub sub_plan_name: Option<String>,
    pub gift_months: Option<u64>,
    pub recipient_display_name: Option<String>,
    pub recipient_id: Option<String>,
    pub recipient_user_name: Option<String>,
    pub mass_gift_count: Option<u64>,
    pub sender_count: Option<u64>,
    pub sender_login: Option<String>,
    pub sender_name: Option<String>,
    pub promo_gift_total: Option<u64>,
    pub promo_name: Option<String>,
    /// Raider's display name
    pub display_name: Option<String>,
    /// Raider's login
    pub login: Option<String>,
    pub viewer_count: Option<u64>,
    pub ritual_name: Option<String>,
    pub threshold: Option<u64>,
    /// Any other `msg-param-*` tag, keyed without the prefix
    pub extra: HashMap<String, String>,
}

const MSG_PARAM: &str = "msg-param-";

impl UserNoticeParameters {
    pub fn parse(tags: &irc::Tags) -> UserNoticeParameters {
        let param = |name: &str| format!("{}{}", MSG_PARAM, name);
        let number = |name: &str| tags.get_number::<u64>(&param(name));
        let text = |name: &str| tags.get_ns(&param(name));

        let known = [
            "cumulative-months",
            "months",
            "should-share-streak",
            "streak-months",
            "sub-plan",
            "sub-plan-name",
            "gift-months",
            "recipient-display-name",
            "recipient-id",
            "recipient-user-name",
            "mass-gift-count",
            "sender-count",
            "sender-login",
            "sender-name",
            "promo-gift-total",
            "promo-name",
            "displayName",
            "login",
            "viewerCount",
            "ritual-name",
            "threshold",
        ];
        let extra = tags
            .iter()
            .filter_map(|(key, value)| key.strip_prefix(MSG_PARAM).map(|name| (name, value)))
            .filter(|(name, _)| !known.contains(name))
            .map(|(name, value)| (name.to_owned(), irc::unescape(value)))
            .collect();

        UserNoticeParameters {
            cumulative_months: number("cumulative-months"),
            months: number("months"),
            should_share_streak: tags.get_bool(&param("should-share-streak")),
            streak_months: number("streak-months"),
            sub_plan: text("sub-plan"),
            sub_plan_name: text("sub-plan-name"),
            gift_months: number("gift-months"),
            recipient_display_name: text("recipient-display-name"),
            recipient_id: text("recipient-id"),
            recipient_user_name: text("recipient-user-name"),
            mass_gift_count: number("mass-gift-count"),
            sender_count: number("sender-count"),
            sender_login: text("sender-login"),
            sender_name: text("sender-name"),
            promo_gift_total: number("promo-gift-total"),
            promo_name: text("promo-name"),
            display_name: text("displayName"),
            login: text("login"),
            viewer_count: number("viewerCount"),
            ritual_name: text("ritual-name"),
            threshold: number("threshold"),
            extra,
        }
    }

    /// True if `tag` is one of the `msg-param-*` tags
    pub fn owns(tag: &str) -> bool {
        tag.starts_with(MSG_PARAM)
    }
}
