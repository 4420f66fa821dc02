// ============================================================
// Layer 6 — Ollama Generation Client
// ============================================================
// Blocking HTTP client for a local Ollama server's
// `/api/generate` endpoint. One request per call, no transport
// retries: the pipeline decides what to retry.
//
// Response bodies vary between servers and proxies; the text
// is taken from the first of:
//   {"response": "..."}
//   {"choices"|"results": [{"text"|"content": "..."} | "..."]}

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;

use crate::domain::error::GenerationError;
use crate::domain::traits::TextGenerator;

#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub base_url:    String,
    pub model:       String,
    pub temperature: f64,
}

#[derive(Clone)]
pub struct OllamaClient {
    client:   HttpClient,
    settings: LlmSettings,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model:   &'a str,
    prompt:  &'a str,
    stream:  bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
}

impl OllamaClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let client = HttpClient::builder()
            .build()
            .context("Failed to build HTTP client")?;
        let settings = LlmSettings {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            ..settings
        };
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.settings.base_url)
    }
}

impl TextGenerator for OllamaClient {
    fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError> {
        let req = GenerateRequest {
            model:   &self.settings.model,
            prompt,
            stream:  false,
            options: GenerateOptions { temperature: self.settings.temperature },
        };

        tracing::debug!(prompt_chars = prompt.len(), model = %self.settings.model, "generate");

        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                GenerationError::Timeout(timeout)
            } else {
                GenerationError::Transport(e.to_string())
            }
        };

        let response = self
            .client
            .post(self.endpoint())
            .timeout(timeout)
            .json(&req)
            .send()
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Transport(format!(
                "ollama returned {status}: {}",
                body.trim()
            )));
        }

        let body: Value = response.json().map_err(transport)?;
        response_text(&body).ok_or(GenerationError::EmptyResponse)
    }
}

/// Generated text from any of the accepted response shapes.
fn response_text(body: &Value) -> Option<String> {
    if let Some(text) = body.get("response").and_then(Value::as_str) {
        return non_empty(text);
    }

    for key in ["choices", "results"] {
        let Some(first) = body.get(key).and_then(Value::as_array).and_then(|a| a.first()) else {
            continue;
        };
        let text = match first {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => obj
                .get("text")
                .or_else(|| obj.get("content"))
                .and_then(Value::as_str),
            _ => None,
        };
        if let Some(text) = text {
            return non_empty(text);
        }
    }
    None
}

fn non_empty(s: &str) -> Option<String> {
    (!s.trim().is_empty()).then(|| s.to_string())
}
