//! Chat plus REST client sharing one identity
use std::time::Duration;

use futures::FutureExt;

use crate::{
    api::{Api, WeakApi},
    chat::{Chat, WeakChat},
    config::{Config, Login, RefreshToken},
    Result,
};

#[derive(Clone, Debug)]
pub struct TwitchConfig {
    /// Anonymous unless both `username` and `token` are set
    pub username: Option<String>,
    pub token: Option<String>,
    /// The REST client is only built when this is set
    pub client_id: Option<String>,
    pub is_known: bool,
    pub is_verified: bool,
    pub connection_timeout: Duration,
    pub join_timeout: Duration,
    pub on_authentication_failure: Option<RefreshToken>,
}

impl Default for TwitchConfig {
    fn default() -> Self {
        let chat = Config::default();
        TwitchConfig {
            username: None,
            token: None,
            client_id: None,
            is_known: chat.is_known,
            is_verified: chat.is_verified,
            connection_timeout: chat.connection_timeout,
            join_timeout: chat.join_timeout,
            on_authentication_failure: None,
        }
    }
}

#[derive(Clone)]
pub struct Twitch {
    pub chat: Chat,
    pub api: Option<Api>,
}

impl Twitch {
    pub fn new(config: TwitchConfig) -> Result<Twitch> {
        let credentials = match (&config.username, &config.token) {
            (Some(username), Some(token)) => Login::regular(username.clone(), token.clone()),
            _ => Login::Anonymous,
        };
        let chat = Chat::new(Config {
            credentials,
            is_known: config.is_known,
            is_verified: config.is_verified,
            connection_timeout: config.connection_timeout,
            join_timeout: config.join_timeout,
            ..Config::default()
        });
        let api = match (&config.client_id, &config.token) {
            (Some(client_id), Some(token)) => Some(Api::new(client_id.clone(), token)?),
            _ => None,
        };

        if let Some(refresh) = config.on_authentication_failure {
            let shared =
                shared_refresh(refresh, chat.downgrade(), api.as_ref().map(Api::downgrade));
            chat.update_config(|c| c.on_authentication_failure = Some(shared.clone()));
            if let Some(api) = &api {
                api.set_refresh(Some(shared));
            }
        }

        Ok(Twitch { chat, api })
    }

    /// Replaces the token used by both clients. The chat picks it up on its
    /// next (re)connect.
    pub fn update_token(&self, token: &str) {
        set_chat_token(&self.chat, token);
        if let Some(api) = &self.api {
            api.set_token(token);
        }
    }
}

fn set_chat_token(chat: &Chat, new: &str) {
    chat.update_config(|config| {
        if let Login::Regular { token, .. } = &mut config.credentials {
            *token = new.to_owned();
        }
    });
}

/// Wraps the caller's callback so a token refreshed by either client reaches
/// both. Holds weak handles, so the clients can still be dropped.
fn shared_refresh(refresh: RefreshToken, chat: WeakChat, api: Option<WeakApi>) -> RefreshToken {
    RefreshToken::new(move || {
        let refresh = refresh.clone();
        let chat = chat.clone();
        let api = api.clone();
        async move {
            let token = refresh.refresh().await?;
            log::info!("Token refreshed");
            if let Some(chat) = chat.upgrade() {
                set_chat_token(&chat, &token);
            }
            if let Some(api) = api.and_then(|api| api.upgrade()) {
                api.set_token(&token);
            }
            Ok(token)
        }
        .boxed()
    })
}
