//! HTTP plumbing shared by the reqwest-based providers.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use crate::{HuginnError, Result};

/// Build the HTTP client a provider holds for its lifetime.
///
/// The per-call timeout is enforced by the retry loop, so the client only
/// bounds connection setup.
pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Pass successful responses through; map failures to [`HuginnError`].
///
/// `model` names the requested model for 404 reporting.
pub(crate) async fn check_response(response: Response, model: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HuginnError::AuthenticationFailed),
        StatusCode::NOT_FOUND => Err(HuginnError::ModelNotFound(model.to_string())),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(HuginnError::RateLimited { retry_after })
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(HuginnError::Api {
                status: status.as_u16(),
                message: error_message(&body).unwrap_or_else(|| status.to_string()),
            })
        }
    }
}

/// Pull a human-readable message out of a JSON error body.
///
/// Handles `{"error": {"message": ..}}` (OpenAI, Anthropic) and
/// `{"error": ".."}` (Ollama, HuggingFace); falls back to the raw body.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed: serde_json::Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => return Some(trimmed.to_string()),
    };
    let error = parsed.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(str::to_string)
}
