//! Request handlers

use std::convert::Infallible;
use std::panic::AssertUnwindSafe;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::generation::{FragmentStream, GenerationError};
use crate::server::state::AppState;
use crate::storage::{InteractionLogger, StorageError};
use crate::types::{error_marker, Mode};

/// Body of both generation routes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

/// Body of a `/generate` reply, also used for generation errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Failures that escape a handler as a non-200 status
///
/// Generation failures never get here: they are reported inside a normal
/// response as an error marker.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to record interaction: {0}")]
    Storage(#[from] StorageError),

    #[error("Request task failed: {0}")]
    Worker(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!("{}", self);
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// `POST /generate`
pub async fn generate_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let span = tracing::info_span!("request", id = %Uuid::new_v4(), mode = %Mode::Full);

    async move {
        tracing::info!(prompt_len = request.prompt.len(), "Full completion requested");

        let completer = state.completer().clone();
        let logger = state.logger().clone();
        let prompt = request.prompt;
        let current = Span::current();

        // Generation and the log write both block
        let recorded = tokio::task::spawn_blocking(move || {
            current.in_scope(|| {
                let response = match std::panic::catch_unwind(AssertUnwindSafe(|| {
                    completer.complete(&prompt)
                })) {
                    Ok(text) => text,
                    Err(_) => error_marker(GenerationError::Worker(
                        "generation panicked".to_string(),
                    )),
                };
                logger.record(&prompt, &response, Mode::Full).map(|_| response)
            })
        })
        .await
        .map_err(|e| ApiError::Worker(e.to_string()))?;

        let response = recorded?;
        Ok(Json(GenerateResponse { response }))
    }
    .instrument(span)
    .await
}

/// `POST /generate-stream`
pub async fn generate_stream_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    let span = tracing::info_span!("request", id = %Uuid::new_v4(), mode = %Mode::Stream);
    span.in_scope(|| tracing::info!(prompt_len = request.prompt.len(), "Stream requested"));

    let session = StreamSession {
        fragments: state.fragment_stream(&request.prompt),
        logger: state.logger().clone(),
        prompt: request.prompt,
        delivered: String::new(),
        span,
        logged: false,
    };

    let body = stream::unfold(Some(session), next_chunk).map(Ok::<_, Infallible>);

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}

/// One streamed request: the fragments plus the obligation to log them once
struct StreamSession {
    fragments: FragmentStream,
    logger: InteractionLogger,
    prompt: String,
    /// Text already handed to the response body
    ///
    /// Differs from the fragment transcript when the body is dropped while a
    /// step is still running: that step's fragment never reached the client.
    delivered: String,
    span: Span,
    logged: bool,
}

impl StreamSession {
    /// Logs everything handed to the body so far, exactly once
    fn finish_delivered(&mut self) {
        if self.logged {
            return;
        }
        self.logged = true;
        let _guard = self.span.enter();
        if let Err(e) = self.logger.record(&self.prompt, &self.delivered, Mode::Stream) {
            tracing::error!("Failed to record streamed interaction: {}", e);
        }
    }
}

impl Drop for StreamSession {
    // Body dropped before the sequence ended: the client went away
    fn drop(&mut self) {
        if self.logged {
            return;
        }
        self.span.in_scope(|| {
            tracing::info!(
                generated = self.fragments.emitted(),
                delivered_bytes = self.delivered.len(),
                "Stream dropped before completion"
            )
        });
        self.finish_delivered();
    }
}

/// Pulls exactly one fragment per poll of the response body
///
/// The pull and, once the sequence ends, the log write both run on the
/// blocking pool. If the body is dropped mid-pull, the session comes back
/// from the task with its fragment unrecorded and its `Drop` logs what the
/// client actually received.
async fn next_chunk(session: Option<StreamSession>) -> Option<(Bytes, Option<StreamSession>)> {
    let mut session = session?;

    let pulled = tokio::task::spawn_blocking(move || {
        let chunk = session.span.in_scope(|| match session.fragments.next() {
            Some(Ok(fragment)) => Some(Ok(fragment)),
            Some(Err(e)) => {
                tracing::warn!("Stream failed: {}", e);
                Some(Err(error_marker(&e)))
            }
            None => None,
        });

        match &chunk {
            Some(Ok(_)) => {}
            Some(Err(marker)) => {
                session.delivered.push_str(marker);
                session.finish_delivered();
            }
            None => session.finish_delivered(),
        }
        (session, chunk)
    })
    .await;

    match pulled {
        Ok((mut session, Some(Ok(fragment)))) => {
            session.delivered.push_str(&fragment);
            Some((Bytes::from(fragment), Some(session)))
        }
        Ok((_, Some(Err(marker)))) => Some((Bytes::from(marker), None)),
        Ok((_, None)) => None,
        Err(e) => {
            // The session was dropped (and logged) inside the failed task
            let marker = error_marker(GenerationError::Worker(e.to_string()));
            Some((Bytes::from(marker), None))
        }
    }
}
