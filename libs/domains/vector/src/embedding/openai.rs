use std::time::Duration;

use async_trait::async_trait;
use core_config::{
    ConfigError, FromEnv, env_optional, env_or_default, env_parse, env_parse_optional,
    env_required,
};
use database::common::retry_when;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::EmbeddingProvider;
use super::provider::{check_dimensions, realign_by_index, validate_texts};
use super::retry::{
    EmbeddingRetryPolicy, FailureKind, classify_status, classify_transport, is_retryable,
};
use crate::error::{VectorError, VectorResult};
use crate::models::EmbeddingModel;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible embedding endpoint configuration
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: EmbeddingModel,
    /// Requested output size for models that support shortening
    pub dimensions: Option<u32>,
    /// Per-attempt request timeout
    pub timeout_secs: u64,
    pub retry: EmbeddingRetryPolicy,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: EmbeddingModel::default(),
            dimensions: None,
            timeout_secs: 30,
            retry: EmbeddingRetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: EmbeddingModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_dimensions(mut self, dimensions: u32) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_retry(mut self, retry: EmbeddingRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Dimension of returned vectors
    pub fn output_dimension(&self) -> u32 {
        self.dimensions.unwrap_or_else(|| self.model.dimension())
    }
}

/// Environment variables:
/// - `OPENAI_API_KEY` (required)
/// - `OPENAI_BASE_URL` (default: `https://api.openai.com/v1`)
/// - `EMBEDDING_MODEL` (default: `text-embedding-3-small`)
/// - `EMBEDDING_DIMENSIONS` (optional; required for unknown models)
/// - `EMBEDDING_TIMEOUT_SECS` (default: 30)
/// - retry bounds, see [`EmbeddingRetryPolicy`]
impl FromEnv for OpenAIConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_key = env_required("OPENAI_API_KEY")?;
        let base_url =
            env_optional("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model_name = env_or_default("EMBEDDING_MODEL", "text-embedding-3-small");
        let dimensions = env_parse_optional("EMBEDDING_DIMENSIONS")?;
        let model = EmbeddingModel::from_name(&model_name, dimensions).map_err(|e| {
            ConfigError::ParseError {
                key: "EMBEDDING_MODEL".to_string(),
                details: e.to_string(),
            }
        })?;

        // Custom models already carry their dimension; only shortening models send it.
        let shortened = dimensions.filter(|_| model.supports_shortening());

        let mut config = Self::new(api_key)
            .with_base_url(base_url)
            .with_model(model)
            .with_timeout(env_parse("EMBEDDING_TIMEOUT_SECS", "30")?)
            .with_retry(EmbeddingRetryPolicy::from_env()?);
        config.dimensions = shortened;

        Ok(config)
    }
}

/// Embeddings over the OpenAI `/embeddings` wire contract.
///
/// Every attempt has its own timeout. Transient failures (timeouts, refused
/// or reset connections, 5xx) are retried with capped exponential backoff;
/// 4xx responses surface on the first attempt.
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> VectorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VectorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> VectorResult<Self> {
        Self::new(OpenAIConfig::from_env()?)
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// One request, no retries. Errors are already classified.
    async fn request_once(
        &self,
        request: &EmbeddingRequest<'_>,
    ) -> VectorResult<EmbeddingResponse> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let message = api_error_message(&body);
            return Err(match classify_status(status) {
                FailureKind::Transient => VectorError::TransientProvider {
                    attempts: 1,
                    message: format!("{}: {}", status, message),
                },
                FailureKind::Permanent => VectorError::PermanentProvider {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| VectorError::PermanentProvider {
            status: status.as_u16(),
            message: format!("malformed embedding response: {}", e),
        })
    }
}

fn transport_error(err: reqwest::Error) -> VectorError {
    match classify_transport(&err) {
        FailureKind::Transient => VectorError::TransientProvider {
            attempts: 1,
            message: err.to_string(),
        },
        FailureKind::Permanent => VectorError::PermanentProvider {
            status: err.status().map(|s| s.as_u16()).unwrap_or(0),
            message: err.to_string(),
        },
    }
}

/// Prefer the `{error: {message, type, code}}` envelope; fall back to the raw body.
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(ApiErrorEnvelope { error }) => {
            let mut message = error.message;
            if let Some(kind) = error.kind {
                message.push_str(&format!(" (type: {}", kind));
                if let Some(code) = error.code.filter(|c| !c.is_null()) {
                    message.push_str(&format!(", code: {}", code));
                }
                message.push(')');
            }
            message
        }
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.chars().take(512).collect(),
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model(&self) -> &str {
        self.config.model.model_name()
    }

    fn dimension(&self) -> u32 {
        self.config.output_dimension()
    }

    #[instrument(skip(self, texts), fields(model = %self.model(), count = texts.len()))]
    async fn embed_many(&self, texts: &[String]) -> VectorResult<Vec<Vec<f32>>> {
        validate_texts(texts)?;

        let request = EmbeddingRequest {
            model: self.config.model.model_name(),
            input: texts,
            encoding_format: "float",
            dimensions: self.config.dimensions,
        };

        let response = retry_when(
            || self.request_once(&request),
            &self.config.retry.to_retry_config(),
            is_retryable,
        )
        .await
        .map_err(|exhausted| match exhausted.error {
            VectorError::TransientProvider { message, .. } => VectorError::TransientProvider {
                attempts: exhausted.attempts,
                message,
            },
            other => other,
        })?;

        if let Some(usage) = &response.usage {
            debug!(total_tokens = usage.total_tokens, "Embedding usage");
        }

        let tagged = response
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        let vectors = realign_by_index(texts.len(), tagged)?;
        check_dimensions(self.dimension(), &vectors)?;

        Ok(vectors)
    }
}
