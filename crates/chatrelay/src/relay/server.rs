//! HTTP server for the chat relay
//!
//! Routes:
//! - `POST /api/chat`: validate, enrich, then stream the model reply as SSE
//! - `GET /health`: liveness probe

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::compose::StreamComposer;
use super::error::ApiError;
use crate::chat::{parse_body, validate};
use crate::config::Config;
use crate::enrichment::{EnrichmentTrigger, Fetcher};
use crate::error::{RelayError, Result};
use crate::generation::{GenerationParams, Generator};

/// Shared, read-only application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Remote model producing the reply stream
    pub generator: Arc<dyn Generator>,
    /// Decides on and runs web enrichment
    pub trigger: EnrichmentTrigger,
    /// Sampling parameters applied to every request
    pub params: GenerationParams,
    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,
}

impl AppState {
    /// Wire collaborators together using the file configuration
    pub fn new(config: &Config, generator: Arc<dyn Generator>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            generator,
            trigger: EnrichmentTrigger::from_config(fetcher, &config.enrichment),
            params: GenerationParams::from_config(&config.generator),
            max_body_bytes: config.server.max_body_bytes,
        }
    }
}

/// The relay server
pub struct RelayServer {
    config: Config,
    generator: Arc<dyn Generator>,
    fetcher: Arc<dyn Fetcher>,
}

impl RelayServer {
    /// Create a new relay server with the given configuration and collaborators
    pub fn new(config: Config, generator: Arc<dyn Generator>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            generator,
            fetcher,
        }
    }

    /// Start the server and listen for requests until shutdown
    pub async fn serve(&self) -> Result<()> {
        let state = Arc::new(AppState::new(
            &self.config,
            self.generator.clone(),
            self.fetcher.clone(),
        ));
        let app = create_router(state);

        let addr: SocketAddr = self
            .config
            .server
            .listen_addr
            .parse()
            .map_err(|e| RelayError::Config(format!("Invalid listen address: {e}")))?;

        info!(
            "Generator: {}, fetcher: {}",
            self.generator.name(),
            self.fetcher.name()
        );
        if self.config.enrichment.enabled {
            info!(
                "Enrichment enabled for terms: {}",
                self.config.enrichment.trigger_terms.join(", ")
            );
        } else {
            info!("Enrichment disabled");
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Server(format!("Failed to bind to {addr}: {e}")))?;

        info!("Server running on {addr}");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RelayError::Server(format!("Server error: {e}")))?;

        info!("Relay server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes and middleware configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Handle a chat request
///
/// Validation and enrichment finish before any response is produced, so a
/// malformed body still gets a plain 400. Everything after that is streamed.
async fn chat_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let span = info_span!("chat", request_id = %Uuid::new_v4());
    relay_chat(state, body, span.clone()).instrument(span).await
}

async fn relay_chat(state: Arc<AppState>, body: Bytes, span: Span) -> Response {
    let conversation = match parse_body(&body).and_then(|value| validate(&value)) {
        Ok(conversation) => conversation,
        Err(e) => {
            warn!(
                error_type = "validation",
                error_message = %e,
                "Rejecting malformed chat request"
            );
            return ApiError::from(e).into_response();
        }
    };
    debug!(turns = conversation.len(), "Conversation validated");

    let enrichment = state.trigger.maybe_enrich(&conversation).await;
    debug!(records = enrichment.len(), "Enrichment step finished");

    StreamComposer::new(state.generator.clone(), state.params.clone())
        .respond(conversation, enrichment, span)
        .unwrap_or_else(IntoResponse::into_response)
}

/// Turn a handler panic into the standard 500 body
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    ApiError::Internal(format!("Handler panicked: {detail}")).into_response()
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::testing::{ScriptedGenerator, StaticFetcher};

    fn create_test_state() -> Arc<AppState> {
        Arc::new(AppState::new(
            &Config::default(),
            Arc::new(ScriptedGenerator::new(["ok"])),
            Arc::new(StaticFetcher::new(Vec::new())),
        ))
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_str = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert!(body_str.contains("\"status\":\"ok\""));
    }

    #[tokio::test]
    async fn test_chat_requires_post() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/chat")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let state = Arc::new(AppState {
            max_body_bytes: 16,
            ..(*create_test_state()).clone()
        });
        let app = create_router(state);
        let body = serde_json::json!({"messages": [{"role": "user", "content": "x".repeat(64)}]});

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_cors_preflight_allowed() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/chat")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_success());
        assert!(
            response
                .headers()
                .contains_key("access-control-allow-origin")
        );
    }

    #[test]
    fn test_panic_handler_returns_500() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
