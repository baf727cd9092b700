//! Interactive console: talk to the echo bot from the terminal.

use std::{io::Write, sync::Arc};

use {
    anyhow::Result,
    parley_channels::{ConsoleConnector, console::PLATFORM},
    parley_config::{ChannelConfig, ParleyConfig},
    parley_sessions::SessionStore,
    serde_json::{Value, json},
    tokio::io::{AsyncBufReadExt, BufReader},
    tracing::warn,
};

use crate::echo;

/// Sender id used for the terminal user.
const CONSOLE_USER: &str = "1";

/// What one line of input means.
#[derive(Debug, PartialEq)]
enum Input {
    Quit,
    Skip,
    Body(Value),
}

fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Skip;
    }
    if matches!(line, "/exit" | "/quit") {
        return Input::Quit;
    }
    let sender = json!({ "id": CONSOLE_USER });
    match line.strip_prefix("/payload ") {
        Some(payload) => Input::Body(json!({ "sender": sender, "payload": payload.trim() })),
        None => Input::Body(json!({ "sender": sender, "message": { "text": line } })),
    }
}

fn prompt() {
    print!("You > ");
    let _ = std::io::stdout().flush();
}

pub async fn run(config: &ParleyConfig, store: Arc<dyn SessionStore>) -> Result<()> {
    // Replies print as they are sent, so wait for handlers before prompting.
    let channel = ChannelConfig {
        sync: true,
        ..config.channels.get(PLATFORM).cloned().unwrap_or_default()
    };
    let bot = echo::build_bot(
        ConsoleConnector::new().with_stdout(true),
        &channel,
        config.initial_state.clone(),
        store,
    );
    let handler = bot.request_handler()?;

    println!("Type a message, `/payload <value>` to send a payload, `/exit` to leave.");
    if channel.timer.enabled {
        println!(
            "Replies are batched: the bot waits {} ms after your first message.",
            channel.timer.initial_duration
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Input::Quit => break,
            Input::Skip => {},
            Input::Body(body) => {
                if let Err(err) = handler.handle(body, None).await {
                    warn!(error = %err, "console message failed");
                }
            },
        }
        prompt();
    }

    bot.shutdown().await;
    Ok(())
}
