//! Minimal HTTP status endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};

use crate::config::Config;

/// `GET /status` and `GET /welcome`; everything else is a 404.
pub fn router(config: Arc<Config>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/welcome", get(welcome_handler))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(config)
}

async fn status_handler(State(config): State<Arc<Config>>) -> Json<Value> {
    Json(json!({
        "online": true,
        "welcome": config.welcome_msg,
    }))
}

async fn welcome_handler(State(config): State<Arc<Config>>) -> String {
    config.welcome_msg.clone()
}

pub async fn run(listener: tokio::net::TcpListener, config: Arc<Config>) {
    let local = listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    tracing::info!(addr = %local, "Status endpoint running");
    if let Err(err) = axum::serve(listener, router(config)).await {
        tracing::error!(error = %err, "Status endpoint stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_reports_welcome_message() {
        let mut config = Config::default();
        config.welcome_msg = "Shorah b'shem".to_string();
        let config = Arc::new(config);

        let Json(body) = status_handler(State(config.clone())).await;
        assert_eq!(body["online"], json!(true));
        assert_eq!(body["welcome"], json!("Shorah b'shem"));

        let welcome = welcome_handler(State(config)).await;
        assert_eq!(welcome, "Shorah b'shem");
    }
}
