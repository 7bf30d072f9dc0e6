//! HTTP services.
//!
//! Two independent axum applications, each started by its own
//! `relay serve` subcommand.
//!
//! # Ingestor
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/` | Storage event (structured or binary CloudEvent) |
//! | `GET`  | `/health` | Health check |
//!
//! Every handled event answers with the outcome body: 200 for success and
//! skipped outcomes, 500 for a failed one. A remote failure that outlived the
//! retry budget returns 500 with the error shape below. Either 500 makes the
//! event source redeliver.
//!
//! # Agent
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Retrieve, ground and answer a question |
//! | `GET`  | `/corpora` | Configured collections |
//! | `GET`  | `/health` | Health check |
//!
//! # Error Contract
//!
//! Every non-2xx response other than a failed import outcome has the same
//! shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use rag_relay_core::answer::AnswerComposer;
use rag_relay_core::models::GeneratedAnswer;

use crate::config::Config;
use crate::corpora::{list_corpora, CorpusEntry};
use crate::ingest::{parse_envelope, EventHandler};
use crate::platform::{connect, Backends};

/// Service name reported by the ingestor's health check.
pub const INGESTOR_SERVICE: &str = "rag-ingestor";
/// Service name reported by the agent's health check.
pub const AGENT_SERVICE: &str = "adk-agent";

/// State of the ingestor service.
pub struct IngestorState {
    pub handler: EventHandler,
}

impl IngestorState {
    pub fn new(config: &Config, backends: &Backends) -> Self {
        Self {
            handler: backends.event_handler(config),
        }
    }
}

/// State of the agent service.
pub struct AgentState {
    pub composer: AnswerComposer,
    pub corpora: Vec<CorpusEntry>,
}

impl AgentState {
    pub fn new(config: &Config, backends: &Backends) -> Self {
        Self {
            composer: backends.composer(config),
            corpora: list_corpora(config),
        }
    }
}

/// Starts the ingestor on `server.ingestor_bind` and runs until Ctrl-C.
pub async fn run_ingestor(config: &Config) -> anyhow::Result<()> {
    let backends = connect(config)?;
    let state = Arc::new(IngestorState::new(config, &backends));
    info!(
        routes = state.handler.router().routes().len(),
        "ingestor configured"
    );
    serve(&config.server.ingestor_bind, INGESTOR_SERVICE, ingestor_router(state)).await
}

/// Starts the agent on `server.agent_bind` and runs until Ctrl-C.
pub async fn run_agent(config: &Config) -> anyhow::Result<()> {
    let backends = connect(config)?;
    let state = Arc::new(AgentState::new(config, &backends));
    info!(
        model = state.composer.model_name(),
        corpora = state.composer.retriever().default_corpora().len(),
        "agent configured"
    );
    serve(&config.server.agent_bind, AGENT_SERVICE, agent_router(state)).await
}

async fn serve(bind_addr: &str, service: &str, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(service, "listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!(service, "shut down");
    Ok(())
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn ingestor_router(state: Arc<IngestorState>) -> Router {
    Router::new()
        .route("/", post(handle_event))
        .route("/health", get(handle_ingestor_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

pub fn agent_router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/query", post(handle_query))
        .route("/corpora", get(handle_corpora))
        .route("/health", get(handle_agent_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error converted into a JSON HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

fn health(service: &'static str) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_ingestor_health() -> Json<HealthResponse> {
    health(INGESTOR_SERVICE)
}

async fn handle_agent_health() -> Json<HealthResponse> {
    health(AGENT_SERVICE)
}

// ============ POST / (ingestor) ============

async fn handle_event(
    State(state): State<Arc<IngestorState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let envelope = parse_envelope(&body, header("ce-id"), header("ce-type"))
        .map_err(|e| bad_request(e.to_string()))?;

    let event_id = envelope
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let span = info_span!(
        "storage_event",
        event_id = %event_id,
        event_type = envelope.event_type.as_deref().unwrap_or("-"),
    );

    let outcome = state
        .handler
        .handle(&envelope.event)
        .instrument(span)
        .await
        .map_err(|e| {
            error!(event_id = %event_id, error = %e, "event processing failed");
            internal(e.to_string())
        })?;

    let status = if outcome.is_failure() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)).into_response())
}

// ============ POST /query (agent) ============

/// Request body of `POST /query`.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Collection names or corpus identifiers; absent or empty means all.
    #[serde(default, alias = "corpusFilter")]
    pub corpus_filter: Option<Vec<String>>,
    #[serde(default = "default_include_citations", alias = "includeCitations")]
    pub include_citations: bool,
}

fn default_include_citations() -> bool {
    true
}

async fn handle_query(
    State(state): State<Arc<AgentState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<GeneratedAnswer>, AppError> {
    let Json(request) = payload?;

    let query = request.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let answer = state
        .composer
        .answer(
            query,
            request.corpus_filter.as_deref(),
            request.include_citations,
        )
        .await;

    Ok(Json(answer))
}

// ============ GET /corpora (agent) ============

#[derive(Serialize)]
struct CorporaResponse {
    corpora: Vec<CorpusEntry>,
}

async fn handle_corpora(State(state): State<Arc<AgentState>>) -> Json<CorporaResponse> {
    Json(CorporaResponse {
        corpora: state.corpora.clone(),
    })
}
