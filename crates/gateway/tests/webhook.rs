//! Integration tests for webhook routes on a real listener.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{net::SocketAddr, sync::Arc};

use {
    async_trait::async_trait,
    parley_channels::{
        Connector, Context, ContextParams, Event, Preprocess,
        console::{ConsoleConnector, ConsoleContext},
    },
    parley_common::{RequestContext, Response},
    parley_dispatch::{Batch, Bot, Step, fn_action},
    parley_gateway::{WebhookRoute, build_gateway_app},
    parley_sessions::{MemorySessionStore, Session, SessionStore},
    serde_json::{Value, json},
    tokio::net::TcpListener,
};

/// Console platform behind a verification handshake: `GET` with
/// `hub.challenge` is answered directly.
#[derive(Default)]
struct Verified(ConsoleConnector);

#[async_trait]
impl Connector for Verified {
    type Context = ConsoleContext;

    fn platform(&self) -> &str {
        "verified"
    }

    fn map_request_to_events(&self, body: &Value) -> parley_channels::Result<Vec<Event>> {
        self.0.map_request_to_events(body)
    }

    async fn unique_session_key(
        &self,
        body: &Value,
        event: &Event,
        request: Option<&RequestContext>,
    ) -> parley_channels::Result<Option<String>> {
        self.0.unique_session_key(body, event, request).await
    }

    async fn update_session(
        &self,
        session: &mut Session,
        body: &Value,
        event: &Event,
    ) -> parley_channels::Result<()> {
        self.0.update_session(session, body, event).await
    }

    fn create_context(&self, params: ContextParams) -> ConsoleContext {
        self.0.create_context(params)
    }

    async fn preprocess(&self, request: &RequestContext) -> Preprocess {
        match (request.method.as_str(), request.query.get("hub.challenge")) {
            ("GET", Some(challenge)) => Preprocess::respond(Response::new(200).with_body(challenge)),
            _ => Preprocess::next(),
        }
    }
}

fn echo() -> parley_dispatch::ActionRef<ConsoleContext> {
    fn_action("echo", |batch: &mut Batch<ConsoleContext>, _props| {
        Box::pin(async move {
            let context = batch.first_mut();
            let text = context.event().text.clone().unwrap_or_default();
            let page = context.event().raw.get("pageId").cloned();
            context.send_text(format!("Echo: {text}"));
            if let Some(Value::String(page)) = page {
                context.send_text(format!("page {page}"));
            }
            Ok(Step::Done)
        })
    })
}

async fn start_server(sync: bool) -> SocketAddr {
    let mut console = Bot::builder(ConsoleConnector::new()).sync(sync).build();
    console.on_event(echo());
    let mut verified = Bot::builder(Verified::default()).sync(sync).build();
    verified.on_event(echo());

    let app = build_gateway_app(vec![
        WebhookRoute::new("console", "/webhooks/console", console.request_handler().unwrap()),
        WebhookRoute::new("verified", "/hooks/verified", verified.request_handler().unwrap()),
    ]);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn health_lists_channels() {
    let addr = start_server(true).await;
    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["channels"], json!(["console", "verified"]));
}

#[tokio::test]
async fn sync_webhook_returns_the_handler_response() {
    let addr = start_server(true).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/webhooks/console"))
        .json(&json!({"sender": {"id": "1"}, "message": {"text": "hi"}}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/json");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"replies": ["Echo: hi"]}));
}

#[tokio::test]
async fn query_parameters_join_the_body() {
    let addr = start_server(true).await;
    let body: Value = reqwest::Client::new()
        .post(format!("http://{addr}/webhooks/console?page_id=42"))
        .json(&json!({"message": {"text": "yo"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"replies": ["Echo: yo", "page 42"]}));
}

#[tokio::test]
async fn async_webhook_answers_empty_ok() {
    let addr = start_server(false).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/webhooks/console"))
        .json(&json!({"message": {"text": "hi"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "");
}

#[tokio::test]
async fn preprocess_can_answer_directly() {
    let addr = start_server(true).await;
    let resp = reqwest::get(format!(
        "http://{addr}/hooks/verified?hub.mode=subscribe&hub.challenge=c0ffee"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "c0ffee");
}

#[tokio::test]
async fn empty_delivery_is_a_bad_request() {
    let addr = start_server(true).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/webhooks/console"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn malformed_events_are_a_server_error() {
    let addr = start_server(true).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/webhooks/console"))
        .json(&json!({"events": "not a list"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
}

#[tokio::test]
async fn shared_router_keeps_handlers_alive() {
    let bot_store = Arc::new(MemorySessionStore::default());
    let mut bot = Bot::builder(ConsoleConnector::new())
        .sync(true)
        .session_store(bot_store.clone())
        .build();
    bot.on_event(echo());
    let app = build_gateway_app(vec![WebhookRoute::new(
        "console",
        "/webhooks/console",
        bot.request_handler().unwrap(),
    )]);
    drop(bot);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/webhooks/console"))
        .json(&json!({"sender": {"id": "9"}, "message": {"text": "still here"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(bot_store.read("console:9").await.unwrap().is_some());
}
