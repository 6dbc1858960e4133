//! Twitch chat client
//!
//! * [`irc`](./irc) - parsing raw IRC messages, with Twitch-specific extensions
//!   (not RFC2812 compliant)
//! * [`tmi`](./tmi) - typed Twitch commands (PRIVMSG, ROOMSTATE, USERNOTICE,
//!   etc.) and the lines we write
//! * [`queue`](./queue) - rate-limited, prioritized send queue
//! * [`conn`](./conn) - one WebSocket connection to TMI
//! * [`chat`](./chat) - connection lifecycle, channel state and commands
//! * [`event`](./event) - compound event names and subscriptions
//! * [`api`](./api) - Helix REST client
//! * [`twitch`](./twitch) - chat and API sharing one identity

pub mod api;
pub mod chat;
pub mod config;
pub mod conn;
pub mod error;
pub mod event;
pub mod irc;
pub mod queue;
pub mod tmi;
pub mod twitch;

pub use api::Api;
pub use chat::{ChannelState, Chat, Status};
pub use config::{Config, Login, RefreshToken};
pub use conn::SendOptions;
pub use error::{Error, Result};
pub use event::{Event, EventName, Subscription};
pub use tmi::Message;
pub use twitch::{Twitch, TwitchConfig};
