use twitch_chat::{event::Payload, Chat, Config, Message};

#[tokio::main]
async fn main() -> twitch_chat::Result<()> {
    let chat = Chat::new(Config::default());
    chat.connect().await?;
    let mut messages = chat.subscribe(vec!["PRIVMSG"]);
    chat.join("moscowwbish").await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("CTRL-C");
                break;
            },
            event = messages.next() => match event {
                Some(event) => {
                    if let Payload::Message(message) = &event.payload {
                        if let Message::Privmsg(message) = message.as_ref() {
                            let name = message
                                .user
                                .display_name
                                .as_deref()
                                .unwrap_or(&message.base.username);
                            println!("{} {}: {}", message.base.channel, name, message.text());
                            if message.text().starts_with("!stop") {
                                break;
                            }
                        }
                    }
                },
                None => break,
            }
        }
    }

    chat.disconnect().await;
    Ok(())
}
