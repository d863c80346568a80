//! CLI client
//!
//! Sends one prompt to the server in either mode, renders the reply to a
//! terminal (or any writer), and appends its own entry to a local
//! interaction log. Transport failures are printed and logged, never raised.

use std::io::Write;

use futures_util::StreamExt;
use serde::Deserialize;
use thiserror::Error;

use crate::server::GenerateRequest;
use crate::storage::InteractionLogger;
use crate::types::{error_marker, ClientConfig, Mode};

/// Shown when the server's JSON has no `response` field
pub const NO_RESPONSE: &str = "[No response]";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct FullReply {
    response: Option<String>,
}

/// HTTP client for both generation endpoints
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
    logger: InteractionLogger,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            logger: InteractionLogger::new(config.log_path.clone()),
            config,
        }
    }

    pub fn logger(&self) -> &InteractionLogger {
        &self.logger
    }

    /// Full mode: one request, one printed reply, one local log entry
    ///
    /// Returns what was logged.
    pub async fn send_full(&self, prompt: &str, out: &mut impl Write) -> String {
        let logged = match self.try_full(prompt, out).await {
            Ok(reply) => reply,
            Err(e) => {
                let _ = writeln!(out, "Error: {}", e);
                error_marker(e)
            }
        };
        self.log(prompt, &logged, Mode::Full);
        logged
    }

    /// Stream mode: chunks are written the moment they arrive
    ///
    /// Returns what was logged.
    pub async fn send_stream(&self, prompt: &str, out: &mut impl Write) -> String {
        let logged = match self.try_stream(prompt, out).await {
            Ok(streamed) => streamed,
            Err(e) => {
                let _ = writeln!(out, "Streaming Error: {}", e);
                error_marker(e)
            }
        };
        self.log(prompt, &logged, Mode::Stream);
        logged
    }

    async fn try_full(&self, prompt: &str, out: &mut impl Write) -> Result<String, ClientError> {
        let reply: FullReply = self
            .http
            .post(self.config.full_url())
            .json(&GenerateRequest {
                prompt: prompt.to_string(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let reply = reply.response.unwrap_or_else(|| NO_RESPONSE.to_string());
        writeln!(out, "Full Response:\n{}", reply)?;
        Ok(reply)
    }

    async fn try_stream(&self, prompt: &str, out: &mut impl Write) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.config.stream_url())
            .json(&GenerateRequest {
                prompt: prompt.to_string(),
            })
            .send()
            .await?
            .error_for_status()?;

        writeln!(out, "Streaming Response:")?;

        let mut streamed = String::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            pending.extend_from_slice(&chunk?);
            let text = drain_utf8(&mut pending);
            if !text.is_empty() {
                out.write_all(text.as_bytes())?;
                out.flush()?;
                streamed.push_str(&text);
            }
        }

        if !pending.is_empty() {
            let rest = String::from_utf8_lossy(&pending).into_owned();
            out.write_all(rest.as_bytes())?;
            streamed.push_str(&rest);
        }
        writeln!(out)?;
        Ok(streamed)
    }

    fn log(&self, prompt: &str, response: &str, mode: Mode) {
        if let Err(e) = self.logger.record(prompt, response, mode) {
            tracing::error!("Failed to write local log {:?}: {}", self.logger.path(), e);
        }
    }
}

/// Takes every complete UTF-8 character out of `buffer`
///
/// An incomplete trailing sequence stays in the buffer for the next chunk;
/// invalid bytes become U+FFFD.
fn drain_utf8(buffer: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(buffer) {
            Ok(text) => {
                out.push_str(text);
                buffer.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&buffer[..valid]));
                match e.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        buffer.drain(..valid + len);
                    }
                    None => {
                        buffer.drain(..valid);
                        return out;
                    }
                }
            }
        }
    }
}
