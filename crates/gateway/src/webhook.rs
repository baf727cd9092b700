//! Webhook endpoint: turns an HTTP delivery into a dispatch call.

use std::{collections::HashMap, sync::Arc};

use {
    async_trait::async_trait,
    axum::{
        body::{Body, Bytes},
        extract::{Query, State},
        http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
        response::{IntoResponse, Response as HttpResponse},
    },
    parley_channels::{Connector, Preprocess},
    parley_common::{RequestContext, Response},
    parley_dispatch::{Error as DispatchError, RequestHandler},
    serde_json::{Map, Value},
    tracing::{debug, error, warn},
};

/// Object-safe view of a bot's request handler, so channels of different
/// platforms can share one router.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    fn platform(&self) -> &str;

    async fn preprocess(&self, request: &RequestContext) -> Preprocess;

    async fn handle(
        &self,
        body: Value,
        request: RequestContext,
    ) -> parley_dispatch::Result<Option<Response>>;
}

#[async_trait]
impl<K: Connector> WebhookHandler for RequestHandler<K> {
    fn platform(&self) -> &str {
        self.connector().platform()
    }

    async fn preprocess(&self, request: &RequestContext) -> Preprocess {
        self.connector().preprocess(request).await
    }

    async fn handle(
        &self,
        body: Value,
        request: RequestContext,
    ) -> parley_dispatch::Result<Option<Response>> {
        RequestHandler::handle(self, body, Some(request)).await
    }
}

/// One mounted webhook.
#[derive(Clone)]
pub struct WebhookRoute {
    pub channel: String,
    pub path: String,
    pub handler: Arc<dyn WebhookHandler>,
}

impl WebhookRoute {
    pub fn new(
        channel: impl Into<String>,
        path: impl Into<String>,
        handler: impl WebhookHandler + 'static,
    ) -> Self {
        Self {
            channel: channel.into(),
            path: path.into(),
            handler: Arc::new(handler),
        }
    }
}

fn request_context(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    query: HashMap<String, String>,
    raw: &Bytes,
) -> RequestContext {
    let raw_body = String::from_utf8_lossy(raw).into_owned();
    let body = if raw.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(raw).unwrap_or(Value::Null)
    };
    let host = headers
        .get("host")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    RequestContext {
        id: headers
            .get("x-request-id")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string),
        method: method.to_string(),
        path: uri.path().to_string(),
        url: format!("https://{host}{uri}"),
        query,
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect(),
        raw_body,
        body,
        params: HashMap::new(),
    }
}

/// Query parameters overlaid by the body's own fields. `Null` when there
/// is neither.
fn merged_body(query: &HashMap<String, String>, body: &Value) -> Value {
    if query.is_empty() {
        return body.clone();
    }
    let mut merged: Map<String, Value> = query
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    match body {
        Value::Object(fields) => merged.extend(fields.clone()),
        Value::Null => {},
        other => return other.clone(),
    }
    Value::Object(merged)
}

fn render(response: Option<Response>) -> HttpResponse {
    let Some(response) = response else {
        return StatusCode::OK.into_response();
    };
    let status = StatusCode::from_u16(response.status_code()).unwrap_or(StatusCode::OK);
    let mut http = HttpResponse::new(Body::from(response.body.unwrap_or_default()));
    *http.status_mut() = status;
    for (name, value) in &response.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                http.headers_mut().insert(name, value);
            },
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }
    http
}

pub async fn webhook_handler(
    State(route): State<WebhookRoute>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    raw: Bytes,
) -> HttpResponse {
    let request = request_context(&method, &uri, &headers, query, &raw);
    let platform = route.handler.platform();

    let preprocess = route.handler.preprocess(&request).await;
    if !preprocess.should_next {
        debug!(channel = %route.channel, platform, "answered by preprocess");
        return render(preprocess.response);
    }

    let body = merged_body(&request.query, &request.body);
    match route.handler.handle(body, request).await {
        Ok(response) => render(response),
        Err(DispatchError::MissingBody) => {
            warn!(channel = %route.channel, platform, "webhook without body or query");
            (StatusCode::BAD_REQUEST, "missing request body").into_response()
        },
        Err(err) => {
            error!(channel = %route.channel, platform, error = %err, "webhook dispatch failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, serde_json::json};

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn body_fields_win_over_query() {
        let merged = merged_body(
            &query(&[("hub.mode", "subscribe"), ("id", "q")]),
            &json!({"id": "b"}),
        );
        assert_eq!(merged, json!({"hub.mode": "subscribe", "id": "b"}));
    }

    #[test]
    fn nothing_to_merge_stays_null() {
        assert_eq!(merged_body(&HashMap::new(), &Value::Null), Value::Null);
        assert_eq!(merged_body(&query(&[("a", "1")]), &Value::Null), json!({"a": "1"}));
    }

    #[test]
    fn request_context_lowercases_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Hub-Signature", HeaderValue::from_static("sha1=1"));
        headers.insert("host", HeaderValue::from_static("bot.example"));
        let uri: Uri = "/webhooks/console?x=1".parse().unwrap();
        let raw = Bytes::from_static(br#"{"a":1}"#);

        let ctx = request_context(&Method::POST, &uri, &headers, query(&[("x", "1")]), &raw);
        assert_eq!(ctx.header("x-hub-signature"), Some("sha1=1"));
        assert_eq!(ctx.path, "/webhooks/console");
        assert_eq!(ctx.url, "https://bot.example/webhooks/console?x=1");
        assert_eq!(ctx.body, json!({"a": 1}));
        assert_eq!(ctx.raw_body, r#"{"a":1}"#);
    }

    #[test]
    fn render_defaults_to_empty_ok() {
        let response = render(None);
        assert_eq!(response.status(), StatusCode::OK);

        let response = render(Some(
            Response::new(403)
                .with_header("content-type", "text/plain")
                .with_body("no"),
        ));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["content-type"], "text/plain");
    }
}
