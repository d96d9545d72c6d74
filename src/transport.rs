// src/transport.rs
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use std::time::{Duration, Instant};

use crate::config::ClientConfig;
use crate::errors::{EvalError, Result};
use crate::submission::{FieldValue, SubmissionRequest};

/// Raw outcome of one exchange with the evaluation service.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
    pub latency_ms: u64,
}

impl TransportReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Carries a validated submission to the evaluation service.
///
/// Implementations return `Ok` for any response the service produced,
/// success or not, and `Err` only when no response was obtained.
pub trait EvaluationTransport: Send + Sync {
    fn send(
        &self,
        request: &SubmissionRequest,
    ) -> impl std::future::Future<Output = Result<TransportReply>> + Send;
}

/// Multipart-over-HTTP transport backed by reqwest.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(client: Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    /// Builds a client honouring the configured timeout.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self::new(builder.build()?, config))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Queries the service's health endpoint and returns its reported status.
    pub async fn health(&self) -> Result<String> {
        let url = self.config.health_url();
        log::debug!("Checking evaluator health at {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EvalError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(EvalError::Request(format!(
                "Health check failed with status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: serde_json::Value = resp.json().await?;
        body.get("status")
            .and_then(|s| s.as_str())
            .map(str::to_string)
            .ok_or_else(|| EvalError::Request(format!("Unexpected health response: {}", body)))
    }
}

fn build_form(request: &SubmissionRequest) -> Result<Form> {
    let mut form = Form::new();
    for field in request.fields() {
        form = match field.value {
            FieldValue::File(blob) => {
                let part = Part::bytes(blob.bytes.to_vec())
                    .file_name(blob.name.clone())
                    .mime_str(&blob.mime())?;
                form.part(field.name, part)
            }
            FieldValue::Text(text) => form.text(field.name, text.to_string()),
        };
    }
    Ok(form)
}

impl EvaluationTransport for HttpTransport {
    async fn send(&self, request: &SubmissionRequest) -> Result<TransportReply> {
        let url = self.config.evaluate_url();
        let form = build_form(request)?;

        log::info!("📡 Submitting evaluation to {}", url);
        let start = Instant::now();

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| EvalError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| EvalError::Transport(e.to_string()))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        log::info!("📥 Evaluator response status: {} ({}ms)", status, latency_ms);

        Ok(TransportReply {
            status: status.as_u16(),
            body,
            latency_ms,
        })
    }
}
