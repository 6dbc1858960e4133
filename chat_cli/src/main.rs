use anyhow::Result;
use twitch_chat::{event::Payload, Chat, Message};

mod config;
use config::Config;

fn init_logger() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    Ok(pretty_env_logger::try_init()?)
}

fn log_event(event: &twitch_chat::Event) {
    match &event.payload {
        Payload::Message(message) => match message.as_ref() {
            Message::Privmsg(m) => {
                log::info!("{} {}: {}", m.base.channel, m.base.username, m.text())
            }
            Message::Ping(_) | Message::Pong(_) => (),
            _ => log::debug!("{}", event.name),
        },
        Payload::Error(err) => log::error!("{}: {}", event.name, err),
        Payload::None => log::info!("{}", event.name),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger()?;

    let config = Config::init(&format!(
        "{}/Config.toml",
        std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into())
    ));
    let chat = Chat::new(config.twitch());
    let mut events = chat.events();

    chat.connect().await?;
    for channel in &config.channels {
        if let Err(err) = chat.join(channel).await {
            log::error!("Failed to join {}: {}", channel, err);
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break;
            },
            event = events.next() => match event {
                Some(event) => log_event(&event),
                None => break,
            }
        }
    }

    chat.disconnect().await;
    Ok(())
}
