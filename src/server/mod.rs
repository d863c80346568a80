//! HTTP API for model inference
//!
//! Two endpoints over axum:
//!
//! - `POST /generate` - sampled completion, returned as one JSON object
//! - `POST /generate-stream` - greedy fragments, streamed as a chunked
//!   `text/plain` body

mod routes;
mod state;

use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;

pub use routes::{ApiError, ErrorResponse, GenerateRequest, GenerateResponse};
pub use state::AppState;

/// Builds the router with both generation routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(routes::generate_handler))
        .route("/generate-stream", post(routes::generate_stream_handler))
        .with_state(state)
}

/// Serves `state` on an already-bound listener until the process stops
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on http://{}", addr);
    }
    axum::serve(listener, create_router(state)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::inference::testing::{token_id, ScriptedModel};
    use crate::inference::LanguageModel;
    use crate::storage::InteractionLogger;
    use crate::types::Mode;

    async fn spawn_server(model: Arc<dyn LanguageModel>) -> (String, InteractionLogger, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let logger = InteractionLogger::new(dir.path().join("logs").join("log.jsonl"));
        let state = AppState::new(model, logger.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));

        (format!("http://{}", addr), logger, dir)
    }

    async fn wait_for_entries(logger: &InteractionLogger, count: usize) -> Vec<crate::types::InteractionEntry> {
        for _ in 0..100 {
            let entries = logger.read_entries().unwrap();
            if entries.len() >= count {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        logger.read_entries().unwrap()
    }

    #[tokio::test]
    async fn test_generate_returns_full_text_and_logs() {
        let model = ScriptedModel::sequence(&[" world", ".", "<eos>"]);
        let (base, logger, _dir) = spawn_server(model).await;

        let reply: GenerateResponse = reqwest::Client::new()
            .post(format!("{base}/generate"))
            .json(&serde_json::json!({ "prompt": "Hello" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(reply.response, "Hello world.");
        let entries = logger.read_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mode, Mode::Full);
        assert_eq!(entries[0].prompt, "Hello");
        assert_eq!(entries[0].response, "Hello world.");
    }

    #[tokio::test]
    async fn test_generate_error_is_success_shaped() {
        let model = ScriptedModel::failing("boom");
        let (base, logger, _dir) = spawn_server(model).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/generate"))
            .json(&GenerateRequest {
                prompt: "Hello".to_string(),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let reply: GenerateResponse = response.json().await.unwrap();
        assert_eq!(reply.response, "[ERROR: Inference failed: boom]");

        let entries = logger.read_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].response, "[ERROR: Inference failed: boom]");
    }

    #[tokio::test]
    async fn test_stream_single_period() {
        let model = ScriptedModel::always(".");
        let (base, logger, _dir) = spawn_server(model.clone()).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/generate-stream"))
            .json(&GenerateRequest {
                prompt: "Hello".to_string(),
            })
            .send()
            .await
            .unwrap();
        assert!(response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/plain")));

        let body = response.text().await.unwrap();
        assert_eq!(body, ".");
        assert_eq!(model.score_calls(), 1);

        let entries = wait_for_entries(&logger, 1).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mode, Mode::Stream);
        assert_eq!(entries[0].response, ".");
    }

    #[tokio::test]
    async fn test_stream_joins_fragments_in_order() {
        let model = ScriptedModel::sequence(&[" world", " and", " again", "!"]);
        let (base, logger, _dir) = spawn_server(model).await;

        let body = reqwest::Client::new()
            .post(format!("{base}/generate-stream"))
            .json(&GenerateRequest {
                prompt: "Hello".to_string(),
            })
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert_eq!(body, " world and again!");
        let entries = wait_for_entries(&logger, 1).await;
        assert_eq!(entries[0].response, " world and again!");
    }

    #[tokio::test]
    async fn test_stream_error_sends_marker() {
        let model = ScriptedModel::new(|_, call| match call {
            0 => Ok(token_id(" world")),
            _ => Err(crate::inference::EngineError::Inference("lost".into())),
        });
        let (base, logger, _dir) = spawn_server(model).await;

        let body = reqwest::Client::new()
            .post(format!("{base}/generate-stream"))
            .json(&GenerateRequest {
                prompt: "Hello".to_string(),
            })
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert_eq!(body, " world[ERROR: Inference failed: lost]");
        let entries = wait_for_entries(&logger, 1).await;
        assert_eq!(entries.len(), 1);
        // Same text the client received
        assert_eq!(entries[0].response, body);
    }

    #[tokio::test]
    async fn test_disconnect_stops_generation_and_logs_once() {
        let model = ScriptedModel::new(|_, _| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(token_id(" again"))
        });
        let (base, logger, _dir) = spawn_server(model.clone()).await;

        let mut response = reqwest::Client::new()
            .post(format!("{base}/generate-stream"))
            .json(&GenerateRequest {
                prompt: "Hello".to_string(),
            })
            .send()
            .await
            .unwrap();
        let first = response.chunk().await.unwrap().unwrap();
        assert_eq!(&first[..], b" again");
        drop(response);

        let entries = wait_for_entries(&logger, 1).await;
        assert_eq!(entries.len(), 1);

        // No second entry shows up later, and scoring has stopped well short of
        // the 60-token budget (a full run would take 3 s)
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(logger.read_entries().unwrap().len(), 1);
        let calls = model.score_calls();
        assert!(calls < 10, "generation kept running after disconnect: {calls} steps");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(model.score_calls(), calls);

        let response = &entries[0].response;
        let fragments = response.matches(" again").count();
        assert!(fragments >= 1 && fragments < 10);
        assert_eq!(response, &" again".repeat(fragments));
        // Never more than was generated
        assert!(fragments <= calls);
    }

    #[tokio::test]
    async fn test_generate_log_failure_is_500() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the log directory should be
        let blocker = dir.path().join("logs");
        std::fs::write(&blocker, "").unwrap();
        let logger = InteractionLogger::new(blocker.join("log.jsonl"));
        let state = AppState::new(ScriptedModel::always("<eos>"), logger);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/generate"))
            .json(&GenerateRequest {
                prompt: "Hello".to_string(),
            })
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = response.json().await.unwrap();
        assert!(body.error.starts_with("Failed to record interaction"));
    }

    #[tokio::test]
    async fn test_invalid_body_rejected() {
        let model = ScriptedModel::always(".");
        let (base, logger, _dir) = spawn_server(model.clone()).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/generate"))
            .json(&serde_json::json!({ "text": "Hello" }))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert_eq!(model.score_calls(), 0);
        assert!(logger.read_entries().unwrap().is_empty());
    }
}
