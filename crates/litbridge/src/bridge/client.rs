//! Generic JSON-over-HTTP call primitive.
//!
//! Every worker endpoint takes a JSON object and answers with a JSON object, so a
//! single `call` covers the whole surface. Typed wrappers live on
//! [`LitClient`](crate::LitClient); endpoints that are not modeled yet can still
//! be reached through `call` directly.

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::LITBRIDGE_VERSION;

/// A decoded worker reply.
pub type JsonObject = serde_json::Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to encode payload for {endpoint}: {source}")]
    Encode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
    #[error("{endpoint} returned {status}: {message}")]
    Worker {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl BridgeError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Stateless request/response bridge to a worker's HTTP address.
///
/// Cloning is cheap and clones share one connection pool. Calls carry no
/// timeout of their own; drop the future (or wrap it in
/// `tokio::time::timeout`) to abandon one.
#[derive(Debug, Clone)]
pub struct RequestBridge {
    base_url: String,
    client: reqwest::Client,
}

impl RequestBridge {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BridgeError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .user_agent(format!("litbridge/{}", LITBRIDGE_VERSION))
            // Loopback only; an HTTP_PROXY in the environment must not intercept it.
            .no_proxy()
            .build()
            .map_err(BridgeError::Client)?;

        Ok(Self { base_url, client })
    }

    pub fn loopback(host: &str, port: u16) -> Result<Self, BridgeError> {
        Self::new(format!("http://{}:{}", host, port))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    /// POST `payload` to `endpoint` and decode the reply as a JSON object.
    ///
    /// `None` sends an empty body. The body is decoded whatever the HTTP status,
    /// since the worker reports its own failures as JSON objects.
    pub async fn call<P>(&self, endpoint: &str, payload: Option<&P>) -> Result<JsonObject, BridgeError>
    where
        P: Serialize + ?Sized,
    {
        let (status, object) = self.send(endpoint, payload).await?;
        if !status.is_success() {
            tracing::warn!(%endpoint, status = status.as_u16(), "Worker returned non-success status");
        }
        Ok(object)
    }

    /// [`call`](Self::call) without a payload.
    pub async fn call_empty(&self, endpoint: &str) -> Result<JsonObject, BridgeError> {
        self.call::<()>(endpoint, None).await
    }

    /// POST and decode the reply into a typed record.
    ///
    /// Unlike [`call`](Self::call), a non-2xx status is an error here: typed
    /// records describe success bodies only.
    pub async fn call_typed<P, R>(&self, endpoint: &str, payload: Option<&P>) -> Result<R, BridgeError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let (status, object) = self.send(endpoint, payload).await?;

        if !status.is_success() {
            let message = match object.get("error") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => Value::Object(object).to_string(),
            };
            return Err(BridgeError::Worker {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_value(Value::Object(object)).map_err(|e| BridgeError::Decode {
            endpoint: endpoint.to_string(),
            reason: format!("unexpected response shape: {}", e),
        })
    }

    async fn send<P>(&self, endpoint: &str, payload: Option<&P>) -> Result<(StatusCode, JsonObject), BridgeError>
    where
        P: Serialize + ?Sized,
    {
        let body = match payload {
            Some(payload) => serde_json::to_vec(payload).map_err(|source| BridgeError::Encode {
                endpoint: endpoint.to_string(),
                source,
            })?,
            None => Vec::new(),
        };

        tracing::debug!(%endpoint, body_bytes = body.len(), "Bridge call");

        let transport = |source| BridgeError::Transport {
            endpoint: endpoint.to_string(),
            source,
        };

        let response = self
            .client
            .post(self.url(endpoint))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(transport)?;

        tracing::trace!(%endpoint, status = status.as_u16(), response_bytes = bytes.len(), "Bridge reply");

        Ok((status, decode_object(endpoint, &bytes)?))
    }
}

fn decode_object(endpoint: &str, bytes: &[u8]) -> Result<JsonObject, BridgeError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| BridgeError::Decode {
        endpoint: endpoint.to_string(),
        reason: format!("body is not valid JSON: {}", e),
    })?;

    match value {
        Value::Object(object) => Ok(object),
        other => Err(BridgeError::Decode {
            endpoint: endpoint.to_string(),
            reason: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
