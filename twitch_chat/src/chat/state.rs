use std::collections::{HashMap, HashSet};

use crate::tmi::{
    tags::{RoomState, UserStateTags},
    Message,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Waiting,
    Connecting,
    Reconnecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// Last known state of a joined channel
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelState {
    pub room_state: RoomState,
    /// Only known for authenticated connections
    pub user_state: Option<UserStateTags>,
}

impl ChannelState {
    /// Whether moderator commands may go through the moderator queue
    pub fn is_moderator(&self) -> bool {
        self.user_state.as_ref().map_or(false, |u| u.is_privileged())
    }
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub channels: HashMap<String, ChannelState>,
    /// Channels with a JOIN in flight
    pub joining: HashSet<String>,
    pub global_user_state: Option<UserStateTags>,
}

impl State {
    /// Applies the state carried by `message`. `username` is our own login.
    pub fn apply(&mut self, message: &Message, username: &str) {
        match message {
            Message::RoomState(m) => {
                if let Some(channel) = self.tracked(&m.base.channel) {
                    channel.room_state.merge(&m.state);
                }
            }
            Message::UserState(m) => {
                if let Some(channel) = self.tracked(&m.base.channel) {
                    channel.user_state = Some(m.user.clone());
                }
            }
            Message::GlobalUserState(m) => self.global_user_state = Some(m.user.clone()),
            Message::Mode(m) if m.username == username => {
                let user = self
                    .channels
                    .get_mut(&m.base.channel)
                    .and_then(|channel| channel.user_state.as_mut());
                if let Some(user) = user {
                    user.is_moderator = m.is_moderator;
                }
            }
            Message::Part(base) if base.username == username => {
                self.channels.remove(&base.channel);
            }
            _ => (),
        }
    }

    /// State of a joined (or joining) channel, created on first use
    fn tracked(&mut self, channel: &str) -> Option<&mut ChannelState> {
        if self.channels.contains_key(channel) || self.joining.contains(channel) {
            Some(self.channels.entry(channel.to_owned()).or_default())
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.channels.clear();
        self.joining.clear();
    }
}
