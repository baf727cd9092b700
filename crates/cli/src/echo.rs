//! The bundled echo bot used by `serve` and `console`.

use std::sync::Arc;

use {
    parley_channels::{Context, ConsoleConnector, ConsoleContext},
    parley_config::ChannelConfig,
    parley_dispatch::{ActionRef, Batch, Bot, Step, fn_action},
    parley_sessions::SessionStore,
    serde_json::{Map, Value, json},
    tracing::debug,
};

/// Reply for one batch: every text echoed, payloads acknowledged.
fn replies(batch: &Batch<ConsoleContext>) -> Vec<String> {
    batch
        .iter()
        .map(|context| {
            let event = context.event();
            match (&event.text, &event.payload) {
                (Some(text), _) => format!("Echo: {text}"),
                (None, Some(payload)) => format!("Payload: {payload}"),
                (None, None) => "Sorry, I only understand text.".to_string(),
            }
        })
        .collect()
}

fn on_event() -> ActionRef<ConsoleContext> {
    fn_action("echo", |batch: &mut Batch<ConsoleContext>, _props| {
        Box::pin(async move {
            let lines = replies(batch);

            let last = batch.last_mut();
            let turns = last.state().get("turns").and_then(Value::as_u64).unwrap_or(0) + 1;
            let mut patch = Map::new();
            patch.insert("turns".into(), json!(turns));
            last.set_state(patch);
            debug!(session_id = ?last.session_id(), turns, "echoing");

            let first = batch.first_mut();
            for line in lines {
                first.send_text(line);
            }
            Ok(Step::Done)
        })
    })
}

fn on_error() -> ActionRef<ConsoleContext> {
    fn_action("apologize", |batch: &mut Batch<ConsoleContext>, props| {
        Box::pin(async move {
            if let Some(err) = props.error {
                debug!(error = %err, "echo handler failed");
            }
            batch.first_mut().send_text("Something went wrong.");
            Ok(Step::Done)
        })
    })
}

pub fn build_bot(
    connector: ConsoleConnector,
    channel: &ChannelConfig,
    initial_state: Map<String, Value>,
    store: Arc<dyn SessionStore>,
) -> Bot<ConsoleConnector> {
    let mut bot = Bot::builder(connector)
        .sync(channel.sync)
        .timer_config(channel.timer.clone())
        .initial_state(initial_state)
        .session_store(store)
        .build();
    bot.on_event(on_event()).on_error(on_error());
    bot
}
