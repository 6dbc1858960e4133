use std::{fmt, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ANONYMOUS_LOGIN: Regex = Regex::new(r"^justinfan\d+$").unwrap();
}

pub const TMI_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

#[derive(Clone, Debug, PartialEq)]
pub enum Login {
    Anonymous,
    Regular { login: String, token: String },
}

impl Default for Login {
    fn default() -> Self {
        Login::Anonymous
    }
}

impl Login {
    pub fn regular(login: impl Into<String>, token: impl Into<String>) -> Login {
        Login::Regular {
            login: login.into(),
            token: token.into(),
        }
    }

    /// `justinfan<N>` logins are anonymous even when a token is supplied
    pub fn is_anonymous(&self) -> bool {
        match self {
            Login::Anonymous => true,
            Login::Regular { login, .. } => ANONYMOUS_LOGIN.is_match(login),
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Login::Regular { token, .. } => Some(token),
            Login::Anonymous => None,
        }
    }
}

/// Called when the gateway or the API rejects the token. Resolves to a fresh
/// token.
#[derive(Clone)]
pub struct RefreshToken(Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>);

impl RefreshToken {
    pub fn new<F>(f: F) -> RefreshToken
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync + 'static,
    {
        RefreshToken(Arc::new(f))
    }

    pub async fn refresh(&self) -> anyhow::Result<String> {
        (self.0)().await
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshToken(..)")
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub credentials: Login,
    /// Known bots get a higher rate limit
    pub is_known: bool,
    /// Verified bots get a much higher rate limit, shared with moderator actions
    pub is_verified: bool,
    pub connection_timeout: Duration,
    pub join_timeout: Duration,
    pub command_timeout: Duration,
    pub url: String,
    /// Silence after which a PING is sent
    pub keep_alive_ping: Duration,
    /// Silence after which the connection is considered dead
    pub keep_alive_reconnect: Duration,
    pub reconnect_attempts: usize,
    pub on_authentication_failure: Option<RefreshToken>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            credentials: Login::Anonymous,
            is_known: false,
            is_verified: false,
            connection_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            url: TMI_URL.into(),
            keep_alive_ping: Duration::from_secs(150),
            keep_alive_reconnect: Duration::from_secs(200),
            reconnect_attempts: 10,
            on_authentication_failure: None,
        }
    }
}

impl Config {
    #[inline]
    pub fn is_anonymous(&self) -> bool {
        self.credentials.is_anonymous()
    }
}
