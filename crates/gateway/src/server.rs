use std::{future::Future, net::SocketAddr};

use {
    axum::{
        Router,
        extract::State,
        response::{IntoResponse, Json},
        routing::get,
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use crate::webhook::{WebhookRoute, webhook_handler};

#[derive(Clone)]
struct HealthState {
    version: &'static str,
    channels: Vec<String>,
}

/// Build the router (shared between production startup and tests).
pub fn build_gateway_app(routes: Vec<WebhookRoute>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let health = HealthState {
        version: env!("CARGO_PKG_VERSION"),
        channels: routes.iter().map(|r| r.channel.clone()).collect(),
    };
    let mut router = Router::new().route("/health", get(health_handler).with_state(health));

    for route in routes {
        info!(channel = %route.channel, path = %route.path, platform = route.handler.platform(), "mounting webhook");
        let path = route.path.clone();
        router = router.route(
            &path,
            get(webhook_handler)
                .post(webhook_handler)
                .with_state(route),
        );
    }

    #[cfg(feature = "metrics")]
    let router = router.layer(axum::middleware::from_fn(
        crate::metrics_middleware::http_metrics_middleware,
    ));

    router.layer(TraceLayer::new_for_http()).layer(cors)
}

/// Serve `routes` on `bind:port` until `shutdown` resolves.
pub async fn start_gateway(
    bind: &str,
    port: u16,
    routes: Vec<WebhookRoute>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_gateway_app(routes);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "webhook server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "channels": state.channels,
    }))
}
