use log::{debug, error, info};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

use crate::config::ModelConfig;
use crate::error::{AppError, Result};

/// Oldest model server release whose chat endpoint is supported
pub const MIN_SERVER_VERSION: &str = "0.1.14";

const CHAT_ENDPOINT: &str = "/api/chat";
const VERSION_ENDPOINT: &str = "/api/version";

/// Endpoints that mutate or expose the server's model store
const DENIED_ENDPOINTS: &[&str] = &[
    "/api/push",
    "/api/create",
    "/api/delete",
    "/api/copy",
    "/api/blobs",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Client for the local model server. Every outbound call goes through
/// [`ModelClient::dispatch`].
#[derive(Clone, Debug)]
pub struct ModelClient {
    client: Client,
    config: ModelConfig,
}

impl ModelClient {
    /// Build the client without touching the network.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                AppError::ConfigurationInvalid(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Build the client and check the server is reachable and recent enough.
    pub async fn connect(config: &ModelConfig) -> Result<Self> {
        let client = Self::new(config)?;
        let version = client.server_version().await?;
        ensure_supported_version(&version, MIN_SERVER_VERSION)?;
        info!(
            "🤖 Model server {} is reachable (version {}, model {})",
            config.base_url(),
            version,
            config.model()
        );
        Ok(client)
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    pub async fn server_version(&self) -> Result<String> {
        let body = self.dispatch(Method::GET, VERSION_ENDPOINT, None).await?;
        body.get("version")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::VersionIncompatible {
                found: "unknown".to_string(),
                minimum: MIN_SERVER_VERSION.to_string(),
            })
    }

    /// One non-streaming completion; returns the assistant message text.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "model": self.config.model(),
            "messages": messages,
            "stream": false,
        });

        let response = self.dispatch(Method::POST, CHAT_ENDPOINT, Some(&body)).await?;

        response
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                error!("❌ Chat response has no message.content field");
                AppError::MalformedResponse("response is missing message.content".to_string())
            })
    }

    /// The single point through which requests leave the process. Rejects
    /// methods other than GET/POST and denied endpoints before any I/O.
    /// Bodies are never logged.
    pub async fn dispatch(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        check_method(&method)?;
        check_endpoint(endpoint)?;

        let url = format!("{}{}", self.config.base_url(), endpoint);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            error!("❌ {} {} failed after {:.2?}: {}", method, endpoint, started.elapsed(), e);
            if e.is_timeout() {
                AppError::RequestFailed(format!(
                    "{} timed out after {:?}",
                    endpoint,
                    self.config.timeout()
                ))
            } else if e.is_connect() {
                AppError::Connectivity(format!("Failed to connect to model server: {}", e))
            } else {
                AppError::RequestFailed(format!("{} {}: {}", method, endpoint, e))
            }
        })?;

        let status = response.status();
        info!("⏱️ {} {} -> {} in {:.2?}", method, endpoint, status, started.elapsed());

        if !status.is_success() {
            return Err(AppError::RequestFailed(format!(
                "{} {} returned status {}",
                method, endpoint, status
            )));
        }

        let parsed = response.json::<Value>().await.map_err(|e| {
            AppError::MalformedResponse(format!("{} returned a non-JSON body: {}", endpoint, e))
        })?;
        debug!("Parsed response body from {}", endpoint);
        Ok(parsed)
    }
}

fn check_method(method: &Method) -> Result<()> {
    if *method == Method::GET || *method == Method::POST {
        Ok(())
    } else {
        Err(AppError::RequestRejected(format!("HTTP method {} is not allowed", method)))
    }
}

fn check_endpoint(endpoint: &str) -> Result<()> {
    let path = endpoint.split(['?', '#']).next().unwrap_or(endpoint).to_ascii_lowercase();
    if !path.starts_with('/') || path.contains("..") {
        return Err(AppError::RequestRejected(format!(
            "endpoint '{}' is not a plain path",
            endpoint
        )));
    }
    let denied = DENIED_ENDPOINTS
        .iter()
        .any(|d| path == *d || path.starts_with(&format!("{}/", d)));
    if denied {
        return Err(AppError::RequestRejected(format!("endpoint '{}' is not allowed", endpoint)));
    }
    Ok(())
}

/// Dotted-numeric release components, e.g. `v0.5.7-rc1` -> `[0, 5, 7]`.
pub fn parse_version(raw: &str) -> Option<Vec<u64>> {
    let trimmed = raw.trim().trim_start_matches('v');
    let core = trimmed.split(['-', '+', ' ']).next()?;
    if core.is_empty() {
        return None;
    }
    core.split('.').map(|part| part.parse::<u64>().ok()).collect()
}

/// Compare two dotted versions, padding the shorter with zeros.
pub fn version_at_least(found: &[u64], minimum: &[u64]) -> bool {
    let len = found.len().max(minimum.len());
    for i in 0..len {
        let a = found.get(i).copied().unwrap_or(0);
        let b = minimum.get(i).copied().unwrap_or(0);
        if a != b {
            return a > b;
        }
    }
    true
}

pub fn ensure_supported_version(found: &str, minimum: &str) -> Result<()> {
    let incompatible = || AppError::VersionIncompatible {
        found: found.to_string(),
        minimum: minimum.to_string(),
    };
    let found_parts = parse_version(found).ok_or_else(incompatible)?;
    let minimum_parts = parse_version(minimum).ok_or_else(incompatible)?;
    if version_at_least(&found_parts, &minimum_parts) {
        Ok(())
    } else {
        Err(incompatible())
    }
}
