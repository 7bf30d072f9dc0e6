use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use rag_relay::config::Config;
use rag_relay::ingest::IngestionClient;
use rag_relay::vertex::VertexPlatform;
use rag_relay_core::remote::{
    ChunkingParams, GenerationBackend, GenerationParams, IndexingBackend, RemoteError,
    RetrievalBackend, RetrievalRequest,
};
use rag_relay_core::retry::RetryPolicy;
use serde_json::{json, Value};

const TOKEN: &str = "test-token";
const PARENT: &str = "/v1/projects/acme/locations/us-central1";

type Log = Arc<Mutex<Vec<(String, String, Value)>>>;

async fn mock(
    State(log): State<Log>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if auth != format!("Bearer {}", TOKEN) {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    }

    let path = uri.path().to_string();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    log.lock()
        .unwrap()
        .push((method.to_string(), path.clone(), body));

    let corpora = format!("{}/ragCorpora", PARENT);
    match (method.as_str(), path.as_str()) {
        ("POST", p) if p == format!("{}:retrieveContexts", PARENT) => Json(json!({
            "contexts": {"contexts": [
                {"sourceUri": "gs://docs/legal/msa.pdf", "text": "30 days notice", "distance": 0.2},
                {"text": "no source here", "distance": 0.4},
            ]}
        }))
        .into_response(),
        ("POST", p) if p == format!("{}/legal/ragFiles:import", corpora) => {
            Json(json!({"name": "operations/import-1", "done": false})).into_response()
        }
        ("GET", "/v1/operations/import-1") => Json(json!({
            "name": "operations/import-1",
            "done": true,
            "response": {"importedRagFilesCount": "1"},
        }))
        .into_response(),
        ("POST", p) if p == format!("{}/gone/ragFiles:import", corpora) => Json(json!({
            "name": "operations/import-2",
            "done": true,
            "error": {"code": 5, "message": "RagCorpus gone not found"},
        }))
        .into_response(),
        ("POST", p) if p == format!("{}/busy/ragFiles:import", corpora) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"code": 503, "message": "try again later"}})),
        )
            .into_response(),
        ("GET", p) if p == format!("{}/legal", corpora) => Json(json!({
            "name": "projects/acme/locations/us-central1/ragCorpora/legal",
            "displayName": "legal",
        }))
        .into_response(),
        ("POST", p) if p == corpora => Json(json!({
            "name": "operations/create-1",
            "done": true,
            "response": {
                "name": "projects/acme/locations/us-central1/ragCorpora/777",
                "displayName": "training",
            },
        }))
        .into_response(),
        ("POST", p) if p.ends_with("/publishers/google/models/gemini-test:generateContent") => {
            Json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Thirty days "}, {"text": "notice."}]},
                    "finishReason": "STOP",
                }]
            }))
            .into_response()
        }
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"code": 404, "message": format!("{} not found", path)}})),
        )
            .into_response(),
    }
}

async fn start() -> (VertexPlatform, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(mock).with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = Config::default();
    config.platform.project_id = "acme".to_string();
    config.platform.endpoint = Some(format!("http://{}/v1", addr));
    config.platform.operation_poll_ms = 10;
    config.platform.timeout_secs = 5;
    config.generation.model = "gemini-test".to_string();

    let platform = VertexPlatform::with_token(&config, TOKEN.to_string()).unwrap();
    (platform, log)
}

fn corpus(id: &str) -> String {
    format!("projects/acme/locations/us-central1/ragCorpora/{}", id)
}

#[tokio::test]
async fn retrieve_spans_corpora_in_one_call() {
    let (platform, log) = start().await;

    let contexts = platform
        .retrieve_contexts(&RetrievalRequest {
            query: "notice period".to_string(),
            corpora: vec![corpus("legal"), corpus("technical")],
            top_k: 3,
            distance_threshold: None,
        })
        .await
        .unwrap();

    assert_eq!(contexts.len(), 2);
    assert_eq!(contexts[0].source_uri.as_deref(), Some("gs://docs/legal/msa.pdf"));
    assert_eq!(contexts[1].source_uri, None);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    let body = &log[0].2;
    assert_eq!(body["query"]["text"], "notice period");
    assert_eq!(body["query"]["ragRetrievalConfig"]["topK"], 3);
    assert_eq!(
        body["vertexRagStore"]["ragResources"][1]["ragCorpus"],
        corpus("technical")
    );
    assert!(body["vertexRagStore"].get("vectorDistanceThreshold").is_none());
}

#[tokio::test]
async fn import_polls_operation_until_done() {
    let (platform, log) = start().await;

    let imported = platform
        .import_files(
            &corpus("legal"),
            &["gs://docs/legal/msa.pdf".to_string()],
            &ChunkingParams::default(),
        )
        .await
        .unwrap();
    assert_eq!(imported, 1);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].0, "GET");
    assert_eq!(log[1].1, "/v1/operations/import-1");
    let chunking = &log[0].2["importRagFilesConfig"]["ragFileTransformationConfig"]
        ["ragFileChunkingConfig"]["fixedLengthChunking"];
    assert_eq!(chunking["chunkSize"], 1000);
    assert_eq!(chunking["chunkOverlap"], 200);
}

#[tokio::test]
async fn failed_operation_maps_grpc_code() {
    let (platform, _log) = start().await;
    let err = platform
        .import_files(
            &corpus("gone"),
            &["gs://docs/legal/msa.pdf".to_string()],
            &ChunkingParams::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::NotFound("RagCorpus gone not found".to_string())
    );
}

#[tokio::test]
async fn http_errors_are_classified() {
    let (platform, _log) = start().await;

    let missing = platform.get_corpus(&corpus("missing")).await.unwrap_err();
    assert!(matches!(missing, RemoteError::NotFound(_)));
    assert!(missing.is_terminal());

    let busy = platform
        .import_files(
            &corpus("busy"),
            &["gs://docs/x.pdf".to_string()],
            &ChunkingParams::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(
        busy,
        RemoteError::Status {
            status: 503,
            message: "try again later".to_string()
        }
    );
    assert!(!busy.is_terminal());
}

#[tokio::test]
async fn get_and_create_corpus() {
    let (platform, _log) = start().await;

    let legal = platform.get_corpus(&corpus("legal")).await.unwrap();
    assert_eq!(legal.display_name, "legal");

    let created = platform
        .create_corpus("training", "RAG corpus for training")
        .await
        .unwrap();
    assert_eq!(created.name, corpus("777"));
}

#[tokio::test]
async fn generate_joins_candidate_parts() {
    let (platform, log) = start().await;
    assert_eq!(platform.model_name(), "gemini-test");

    let text = platform
        .generate("prompt text", &GenerationParams::default())
        .await
        .unwrap();
    assert_eq!(text, "Thirty days notice.");

    let log = log.lock().unwrap();
    let body = &log[0].2;
    assert_eq!(body["contents"][0]["parts"][0]["text"], "prompt text");
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
}

#[tokio::test]
async fn ingestion_client_retries_transient_http_errors() {
    let (platform, log) = start().await;
    let client = IngestionClient::new(
        Arc::new(platform),
        ChunkingParams::default(),
        RetryPolicy::immediate(3),
    );

    let err = client
        .import_document(&corpus("busy"), "gs://docs/x.pdf", "x.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 503, .. }));
    assert_eq!(log.lock().unwrap().len(), 3);

    let rejected = client
        .import_document(&corpus("gone"), "gs://docs/x.pdf", "x.pdf")
        .await
        .unwrap();
    assert!(!rejected);
    assert_eq!(log.lock().unwrap().len(), 4);
}
