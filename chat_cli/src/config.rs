use std::fmt::{self, Display, Formatter};

#[derive(Clone, serde::Deserialize)]
pub struct Credentials {
    pub twitch_login: Option<String>,
    pub twitch_token: Option<String>,
}

#[derive(Clone)]
pub struct Config {
    pub channels: Vec<String>,
    pub is_known: bool,
    pub is_verified: bool,
    pub join_timeout_secs: u64,
    pub credentials: Option<Credentials>,
}

#[derive(Clone, serde::Deserialize)]
struct PartialConfig {
    channels: Option<Vec<String>>,
    is_known: Option<bool>,
    is_verified: Option<bool>,
    join_timeout_secs: Option<u64>,
    credentials: Option<Credentials>,
}

impl Config {
    pub fn init(path: &str) -> Config {
        log::debug!("Loading config from file '{}'", path);
        let cfg = match std::fs::read_to_string(path) {
            Ok(v) => v,
            Err(err) => {
                log::warn!("Failed to read config: {}; Falling back to defaults", err);
                String::new()
            }
        };
        let cfg = match toml::from_str::<PartialConfig>(&cfg) {
            Ok(value) => value.into(),
            Err(err) => {
                log::warn!("Error while reading config: {}; Falling back to defaults", err);
                Config::default()
            }
        };
        log::info!("Using config: {}", cfg);
        cfg
    }

    pub fn twitch(&self) -> twitch_chat::Config {
        let credentials = match &self.credentials {
            Some(Credentials {
                twitch_login: Some(login),
                twitch_token: Some(token),
            }) => twitch_chat::Login::regular(login.clone(), token.clone()),
            _ => twitch_chat::Login::Anonymous,
        };
        let defaults = twitch_chat::Config::default();
        twitch_chat::Config {
            credentials,
            is_known: self.is_known,
            is_verified: self.is_verified,
            join_timeout: std::time::Duration::from_secs(self.join_timeout_secs),
            ..defaults
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            channels: Vec::new(),
            is_known: false,
            is_verified: false,
            join_timeout_secs: 10,
            credentials: None,
        }
    }
}

impl From<PartialConfig> for Config {
    fn from(cfg: PartialConfig) -> Config {
        let defaults = Config::default();
        Config {
            channels: cfg.channels.unwrap_or(defaults.channels),
            is_known: cfg.is_known.unwrap_or(defaults.is_known),
            is_verified: cfg.is_verified.unwrap_or(defaults.is_verified),
            join_timeout_secs: cfg.join_timeout_secs.unwrap_or(defaults.join_timeout_secs),
            credentials: cfg.credentials,
        }
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Config {{")?;
        writeln!(f, "\tchannels = {:?},", self.channels)?;
        writeln!(f, "\tis_known = {},", self.is_known)?;
        writeln!(f, "\tis_verified = {},", self.is_verified)?;
        writeln!(f, "\tjoin_timeout_secs = {},", self.join_timeout_secs)?;
        writeln!(f, "\tcredentials = ...,")?;
        write!(f, "}}")
    }
}
