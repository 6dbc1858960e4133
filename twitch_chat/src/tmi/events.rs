//! Sub-classifications carried by typed messages.
//!
//! These make up the middle segment of a compound event name, e.g. the
//! `BAN_SUCCESS` in `NOTICE/BAN_SUCCESS/#dallas`.
use std::fmt;

/// Declares a closed `msg-id` enum with an `Other` escape hatch.
///
/// Each variant maps to the gateway's `msg-id`; the event name defaults to the
/// upper-cased id unless given explicitly with `=> "NAME"`.
macro_rules! msg_id_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident = $id:literal $(=> $event:literal)?),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)*
            Other(String),
        }

        impl $name {
            pub fn from_id(id: &str) -> $name {
                match id {
                    $($id => $name::$variant,)*
                    other => $name::Other(other.to_owned()),
                }
            }

            /// The raw `msg-id` this value was parsed from
            pub fn id(&self) -> &str {
                match self {
                    $($name::$variant => $id,)*
                    $name::Other(id) => id,
                }
            }

            /// The event name segment
            pub fn name(&self) -> String {
                match self {
                    $($name::$variant => msg_id_enum!(@event $id $(, $event)?),)*
                    $name::Other(id) => id.to_uppercase(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.name())
            }
        }
    };
    (@event $id:literal) => { $id.to_uppercase() };
    (@event $id:literal, $event:literal) => { String::from($event) };
}

msg_id_enum! {
    /// `msg-id` of a NOTICE
    pub enum NoticeEvent {
        LoginAuthenticationFailed = "login_authentication_failed",
        AlreadyBanned = "already_banned",
        AlreadyEmoteOnlyOff = "already_emote_only_off",
        AlreadyEmoteOnlyOn = "already_emote_only_on",
        AlreadyFollowersOff = "already_followers_off",
        AlreadyFollowersOn = "already_followers_on",
        AlreadyR9kOff = "already_r9k_off",
        AlreadyR9kOn = "already_r9k_on",
        AlreadySubsOff = "already_subs_off",
        AlreadySubsOn = "already_subs_on",
        BadBanAdmin = "bad_ban_admin",
        BadBanAnon = "bad_ban_anon",
        BadBanBroadcaster = "bad_ban_broadcaster",
        BadBanGlobalMod = "bad_ban_global_mod",
        BadBanMod = "bad_ban_mod",
        BadBanSelf = "bad_ban_self",
        BadBanStaff = "bad_ban_staff",
        BadCommercialError = "bad_commercial_error",
        BadDeleteMessageBroadcaster = "bad_delete_message_broadcaster",
        BadDeleteMessageError = "bad_delete_message_error",
        BadDeleteMessageMod = "bad_delete_message_mod",
        BadHostError = "bad_host_error",
        BadHostHosting = "bad_host_hosting",
        BadHostRateExceeded = "bad_host_rate_exceeded",
        BadModBanned = "bad_mod_banned",
        BadModMod = "bad_mod_mod",
        BadTimeoutAdmin = "bad_timeout_admin",
        BadTimeoutAnon = "bad_timeout_anon",
        BadTimeoutBroadcaster = "bad_timeout_broadcaster",
        BadTimeoutDuration = "bad_timeout_duration",
        BadTimeoutGlobalMod = "bad_timeout_global_mod",
        BadTimeoutMod = "bad_timeout_mod",
        BadTimeoutSelf = "bad_timeout_self",
        BadTimeoutStaff = "bad_timeout_staff",
        BadUnbanNoBan = "bad_unban_no_ban",
        BadUnmodMod = "bad_unmod_mod",
        BadUnvipGranteeNotVip = "bad_unvip_grantee_not_vip",
        BadVipGranteeAlreadyVip = "bad_vip_grantee_already_vip",
        BadVipGranteeBanned = "bad_vip_grantee_banned",
        BadVipMaxVipsReached = "bad_vip_max_vips_reached",
        BanSuccess = "ban_success",
        CmdsAvailable = "cmds_available",
        ColorChanged = "color_changed",
        DeleteMessageSuccess = "delete_message_success",
        EmoteOnlyOff = "emote_only_off",
        EmoteOnlyOn = "emote_only_on",
        FollowersOff = "followers_off",
        FollowersOn = "followers_on",
        FollowersOnZero = "followers_on_zero",
        HostOff = "host_off",
        HostOn = "host_on",
        HostsRemaining = "hosts_remaining",
        ModSuccess = "mod_success",
        MsgBanned = "msg_banned",
        MsgChannelSuspended = "msg_channel_suspended",
        MsgDuplicate = "msg_duplicate",
        MsgEmoteOnly = "msg_emoteonly",
        MsgFollowersOnly = "msg_followersonly",
        MsgR9k = "msg_r9k",
        MsgRatelimit = "msg_ratelimit",
        MsgSlowMode = "msg_slowmode",
        MsgSubsOnly = "msg_subsonly",
        MsgTimedOut = "msg_timedout",
        NoMods = "no_mods",
        NoPermission = "no_permission",
        NoVips = "no_vips",
        NotHosting = "not_hosting",
        R9kOff = "r9k_off",
        R9kOn = "r9k_on",
        RaidErrorAlreadyRaiding = "raid_error_already_raiding",
        RaidErrorSelf = "raid_error_self",
        RoomMods = "room_mods",
        SlowOff = "slow_off",
        SlowOn = "slow_on",
        SubsOff = "subs_off",
        SubsOn = "subs_on",
        TimeoutSuccess = "timeout_success",
        TurboOnlyColor = "turbo_only_color",
        UnbanSuccess = "unban_success",
        UnmodSuccess = "unmod_success",
        UnraidErrorNoActiveRaid = "unraid_error_no_active_raid",
        UnraidSuccess = "unraid_success",
        UntimeoutBanned = "untimeout_banned",
        UntimeoutSuccess = "untimeout_success",
        UnvipSuccess = "unvip_success",
        UsageBan = "usage_ban",
        UsageColor = "usage_color",
        UsageCommercial = "usage_commercial",
        UsageDelete = "usage_delete",
        UsageEmoteOnlyOff = "usage_emote_only_off",
        UsageEmoteOnlyOn = "usage_emote_only_on",
        UsageFollowersOff = "usage_followers_off",
        UsageFollowersOn = "usage_followers_on",
        UsageHelp = "usage_help",
        UsageHost = "usage_host",
        UsageMarker = "usage_marker",
        UsageMod = "usage_mod",
        UsageMods = "usage_mods",
        UsageR9kOff = "usage_r9k_off",
        UsageR9kOn = "usage_r9k_on",
        UsageRaid = "usage_raid",
        UsageSlowOff = "usage_slow_off",
        UsageSlowOn = "usage_slow_on",
        UsageSubsOff = "usage_subs_off",
        UsageSubsOn = "usage_subs_on",
        UsageTimeout = "usage_timeout",
        UsageUnban = "usage_unban",
        UsageUnhost = "usage_unhost",
        UsageUnmod = "usage_unmod",
        UsageUnraid = "usage_unraid",
        UsageUntimeout = "usage_untimeout",
        UsageUnvip = "usage_unvip",
        UsageVip = "usage_vip",
        UsageVips = "usage_vips",
        VipSuccess = "vip_success",
        VipsSuccess = "vips_success",
    }
}

msg_id_enum! {
    /// `msg-id` of a USERNOTICE
    pub enum UserNoticeEvent {
        Subscription = "sub" => "SUBSCRIPTION",
        Resubscription = "resub" => "RESUBSCRIPTION",
        SubscriptionGift = "subgift" => "SUBSCRIPTION_GIFT",
        AnonymousSubscriptionGift = "anonsubgift" => "SUBSCRIPTION_GIFT",
        SubscriptionGiftCommunity = "submysterygift" => "SUBSCRIPTION_GIFT_COMMUNITY",
        AnonymousSubscriptionGiftCommunity = "anonsubmysterygift" => "SUBSCRIPTION_GIFT_COMMUNITY",
        GiftPaidUpgrade = "giftpaidupgrade" => "GIFT_PAID_UPGRADE",
        AnonymousGiftPaidUpgrade = "anongiftpaidupgrade" => "GIFT_PAID_UPGRADE",
        Raid = "raid" => "RAID",
        Ritual = "ritual" => "RITUAL",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModeEvent {
    ModGained,
    ModLost,
}

impl fmt::Display for ModeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModeEvent::ModGained => "MOD_GAINED",
            ModeEvent::ModLost => "MOD_LOST",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrivmsgEvent {
    Cheer,
    HostedWithViewers,
    HostedWithoutViewers,
    HostedAuto,
}

impl fmt::Display for PrivmsgEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrivmsgEvent::Cheer => "CHEER",
            PrivmsgEvent::HostedWithViewers => "HOSTED_WITH_VIEWERS",
            PrivmsgEvent::HostedWithoutViewers => "HOSTED_WITHOUT_VIEWERS",
            PrivmsgEvent::HostedAuto => "HOSTED_AUTO",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClearChatEvent {
    UserBanned,
}

impl fmt::Display for ClearChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("USER_BANNED")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostTargetEvent {
    HostOn,
    HostOff,
}

impl fmt::Display for HostTargetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostTargetEvent::HostOn => "HOST_ON",
            HostTargetEvent::HostOff => "HOST_OFF",
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn notice_names() {
        assert_eq!(NoticeEvent::BanSuccess, NoticeEvent::from_id("ban_success"));
        assert_eq!("BAN_SUCCESS", NoticeEvent::BanSuccess.to_string());
        assert_eq!(
            "LOGIN_AUTHENTICATION_FAILED",
            NoticeEvent::LoginAuthenticationFailed.to_string()
        );
    }

    #[test]
    fn unknown_notice_is_upper_cased() {
        let event = NoticeEvent::from_id("some_new_thing");
        assert_eq!(NoticeEvent::Other("some_new_thing".into()), event);
        assert_eq!("some_new_thing", event.id());
        assert_eq!("SOME_NEW_THING", event.to_string());
    }

    #[test]
    fn user_notice_names() {
        assert_eq!("SUBSCRIPTION", UserNoticeEvent::from_id("sub").to_string());
        assert_eq!(
            "SUBSCRIPTION_GIFT_COMMUNITY",
            UserNoticeEvent::from_id("anonsubmysterygift").to_string()
        );
        assert_eq!("BITSBADGETIER", UserNoticeEvent::from_id("bitsbadgetier").to_string());
    }
}
