//! HTTP chat API.
//!
//! `POST /chat` takes `{"prompt": "...", "use_groq": false}` and returns
//! `{"response": "..."}`. `GET /health` reports liveness.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{LlmProvider, Settings};
use crate::error::SvarError;
use crate::orchestrator::Orchestrator;
use crate::rag::RagEngine;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Shared application state.
struct AppState {
    engine: RagEngine,
    request_timeout: Duration,
}

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Serve, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'svar doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let request_timeout = Duration::from_secs(settings.server.request_timeout_secs);

    let orchestrator = Orchestrator::new(settings)?;
    let questions = orchestrator.store().question_count().await?;
    if questions == 0 {
        Output::warning("The graph is empty; every chat will get the fallback answer.");
    }
    let state = Arc::new(AppState {
        engine: orchestrator.rag_engine(),
        request_timeout,
    });

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Svar API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Chat", "POST /chat");
    Output::kv("Questions", &questions.to_string());
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct ChatRequest {
    prompt: String,
    #[serde(default)]
    use_groq: bool,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// HTTP status for a failed chat request.
fn status_for(err: &SvarError) -> StatusCode {
    match err {
        SvarError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        e if e.is_store_failure() => StatusCode::SERVICE_UNAVAILABLE,
        SvarError::Classification(_)
        | SvarError::Embedding(_)
        | SvarError::Generation(_)
        | SvarError::OpenAI(_)
        | SvarError::TextFetch(_)
        | SvarError::Http(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match request {
        Ok(req) => req,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let provider = if req.use_groq {
        LlmProvider::Groq
    } else {
        LlmProvider::OpenAI
    };

    let reply = tokio::time::timeout(state.request_timeout, state.engine.chat(&req.prompt, provider)).await;

    match reply {
        Ok(Ok(reply)) => {
            info!("Answered chat request with {} sources", reply.sources.len());
            Json(ChatResponse {
                response: reply.response,
            })
            .into_response()
        }
        Ok(Err(e)) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!("Chat request failed: {}", e);
            }
            error_response(status, e.to_string())
        }
        Err(_) => {
            warn!("Chat request timed out after {:?}", state.request_timeout);
            error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "The request took too long to answer. Please try again.".to_string(),
            )
        }
    }
}
