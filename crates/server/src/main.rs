//! # Tempest Server
//!
//! Axum front-end for the Tempest article-generation service. Exposes the
//! query endpoints (blocking and streaming), a health check, and the
//! generated OpenAPI document, with a request-id attached to every call.

mod logging;
mod middleware;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

use tempest_core::{
    context, DeepSeekPipeline, Error, GenerationService, ServiceConfig,
};

/// Application state
struct AppState {
    service: Arc<GenerationService>,
    started_at: Instant,
}

type SharedState = Arc<AppState>;

// === API Types ===

#[derive(Deserialize, ToSchema)]
struct QueryRequest {
    /// Research topic to generate an article about
    topic: String,
    /// Stream progress instead of waiting for the final article
    #[serde(default)]
    stream: bool,
}

#[derive(Serialize, ToSchema)]
struct QueryResponse {
    result: String,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    detail: String,
}

#[derive(Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    version: String,
    timestamp: String,
    uptime: u64,
}

#[derive(Parser)]
#[command(author, version, about = "Tempest - research-to-article generation service")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Start the Tempest server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Generate one article from the command line, no server
    Run {
        /// The topic to research
        topic: String,
    },
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tempest API",
        version = "0.1.0",
        description = "Research-to-article generation with in-memory artifact storage"
    ),
    paths(health_check, query, query_stream),
    components(schemas(QueryRequest, QueryResponse, ErrorResponse, HealthResponse))
)]
struct ApiDoc;

// === API Handlers ===

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "Tempest API is running"
    }))
}

/// Health check endpoint for monitoring
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let env_ok = ServiceConfig::environment_ok();
    let status = if env_ok { "healthy" } else { "unhealthy" };
    let uptime = state.started_at.elapsed().as_secs();

    info!(
        event = "health_check",
        request_id = %current_request_id(),
        status,
        env_ok,
        "health check performed"
    );

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime,
    })
}

/// Generate an article, blocking or streaming per the request flag
#[utoipa::path(
    post,
    path = "/query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Generated article", body = QueryResponse),
        (status = 429, description = "Search rate limit hit", body = ErrorResponse),
        (status = 500, description = "Generation failed", body = ErrorResponse)
    )
)]
async fn query(State(state): State<SharedState>, Json(req): Json<QueryRequest>) -> Response {
    info!(
        event = "query_request_received",
        request_id = %current_request_id(),
        topic = %req.topic,
        stream = req.stream,
        "query request received"
    );

    if req.stream {
        return stream_response(&state, &req.topic);
    }

    match state.service.generate(&req.topic).await {
        Ok(result) => Json(QueryResponse { result }).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Stream article generation progress and the final article
#[utoipa::path(
    post,
    path = "/query/stream",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Progress lines followed by the article", body = String, content_type = "text/plain")
    )
)]
async fn query_stream(State(state): State<SharedState>, Json(req): Json<QueryRequest>) -> Response {
    info!(
        event = "stream_request_received",
        request_id = %current_request_id(),
        topic = %req.topic,
        "stream request received"
    );

    stream_response(&state, &req.topic)
}

async fn serve_openapi() -> impl IntoResponse {
    let spec = ApiDoc::openapi().to_json().unwrap_or_default();
    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(spec))
        .unwrap()
}

// === Response Helpers ===

/// Build a chunked text/plain response from the service's progress stream.
///
/// A failed run terminates the stream with a human-readable error line;
/// chunks already sent are never retracted.
fn stream_response(state: &SharedState, topic: &str) -> Response {
    let chunks = state.service.generate_streaming(topic).map(|item| {
        Ok::<String, Infallible>(match item {
            Ok(chunk) => chunk,
            Err(e) => format!("❌ {}\n", user_message(&e)),
        })
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(chunks))
        .unwrap()
}

fn error_response(e: &Error) -> Response {
    error!(
        event = "query_failed",
        request_id = %current_request_id(),
        error = %e,
        "generation failed"
    );
    (
        error_status(e),
        Json(ErrorResponse {
            detail: user_message(e),
        }),
    )
        .into_response()
}

fn error_status(e: &Error) -> StatusCode {
    match e {
        Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Caller-facing message for a classified error.
///
/// Internal detail (stage, upstream messages, traces) stays in the logs.
fn user_message(e: &Error) -> String {
    match e {
        Error::RateLimited => e.to_string(),
        Error::Configuration { .. } => "service is not configured correctly".to_string(),
        Error::Resolution { .. } | Error::Pipeline { .. } => {
            "article generation failed".to_string()
        }
    }
}

fn current_request_id() -> String {
    context::current()
        .map(|id| id.to_string())
        .unwrap_or_default()
}

// === Server Entry ===

fn build_service() -> anyhow::Result<GenerationService> {
    let config = ServiceConfig::from_env()?;
    let engine = Arc::new(DeepSeekPipeline::new(&config));
    Ok(GenerationService::new(config, engine))
}

async fn run_server(port: u16) -> anyhow::Result<()> {
    let state: SharedState = Arc::new(AppState {
        service: Arc::new(build_service()?),
        started_at: Instant::now(),
    });

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/query", post(query))
        .route("/query/stream", post(query_stream))
        .route("/openapi.json", get(serve_openapi))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "tempest server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_once(topic: &str) -> anyhow::Result<()> {
    let service = build_service()?;
    let article = service.generate(topic).await?;
    println!("{article}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let args = Args::parse();
    match args.command {
        Some(CliCommand::Run { topic }) => run_once(&topic).await,
        Some(CliCommand::Serve { port }) => run_server(port).await,
        None => run_server(8080).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_maps_to_429() {
        assert_eq!(error_status(&Error::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            error_status(&Error::resolution("nothing")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_user_messages_do_not_leak_internals() {
        let msg = user_message(&Error::pipeline("research", "token abc123 rejected"));
        assert!(!msg.contains("abc123"));

        let msg = user_message(&Error::RateLimited);
        assert!(msg.contains("try again"));
    }
}
